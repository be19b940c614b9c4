//! Upload bundles: whole-corpus deduplication by content fingerprint, a flat
//! document directory, and JSON + CSV manifests.

pub mod bundler;
pub mod manifest;

pub use bundler::{build_bundle, discover_documents, BundleOptions, BundleReport};
