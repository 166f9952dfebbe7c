// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types that define what the system works with:
// IQ records, class taxonomies, and the source/sink seams the
// pipeline is written against.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits
//     (ndarray is allowed for the IQ payload)

// In-memory batches of aligned IQ / label / SNR records
pub mod record;

// Class lists, label maps, one-hot helpers
pub mod taxonomy;

// Core abstractions (traits) that other layers implement
pub mod traits;
