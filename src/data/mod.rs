// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw recordings on disk and tensor batches.
//
// The merge path:
//
//   HDF5 files / .npz trees
//       │
//       ▼
//   H5Source / NpzSource   → aligned RecordBatches, chunk by chunk
//       │
//       ▼
//   LabelMap (domain)      → re-index onto the unified classes
//       │
//       ▼
//   Normalizer             → optional per-record unit-variance scaling
//       │
//       ▼
//   Segmenter              → optional re-slicing into shorter records
//       │
//       ▼
//   IqStore                → growable HDF5 file
//
// The serving path:
//
//   IqStore → IqDataset → SubsetDataset (splitter) → IqBatcher → DataLoader
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads IQ/label/SNR arrays out of arbitrary HDF5 files
pub mod h5_source;

/// Reads NumPy .npz recordings and discovers them in a tree
pub mod npz_source;

/// Per-record IQ normalization
pub mod preprocessor;

/// Re-slices records into shorter segments
pub mod segmenter;

/// The growable, aligned HDF5 store
pub mod store;

/// Implements Burn's Dataset trait over stores and CSV exports
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Deterministic train/valid/test partitioning
pub mod splitter;
