// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Each use case owns a plain config struct and coordinates the
// data and infra layers to do one job:
//
//   merge      MergePlan (JSON) → one store + manifest
//   subset     keep a few classes of a store, re-indexed
//   resegment  cut long records into shorter ones
//   inspect    shapes, schema, class / SNR histograms
//   repair     truncate an interrupted store
//   split      seeded train / valid / test partition, served
//              through burn's DataLoader
//   export     store → CSV
//   report     prediction CSV → accuracy / confusion / per-SNR
//
// No printing here; the CLI decides how results are shown.

/// JSON description of a merge run
pub mod plan;

/// Chunked source → sink loop shared by the writers
pub mod transfer;

pub mod merge_use_case;
pub mod subset_use_case;
pub mod resegment_use_case;
pub mod inspect_use_case;
pub mod split_use_case;
pub mod export_use_case;
pub mod report_use_case;
