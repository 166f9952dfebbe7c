// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Files that travel alongside a store but are not part of it:
//
//   manifest.rs: JSON sidecar recording the class names and
//                per-source counts of a built store. Written
//                by merge / subset / resegment, read back by
//                inspect / split / export.
//
//   metrics.rs:  Prediction CSVs from a test run and the
//                accuracy / confusion / per-SNR report
//                computed from them.

/// Store manifest sidecar
pub mod manifest;

/// Prediction CSVs and evaluation metrics
pub mod metrics;
