//! `docharvest`: resumable document harvesting from message feeds, and
//! content-addressed upload bundles.
//!
//! The two halves only meet on disk. The [`scan`] side walks a feed and
//! downloads document attachments into a dated tree, committing its state
//! after every file. The [`bundle`] side takes any tree of documents,
//! deduplicates it by SHA-256 and writes a flat bundle with manifests.

pub mod bundle;
pub mod config;
pub mod error;
pub mod feed;
pub mod fingerprint;
pub mod model;
pub mod naming;
pub mod scan;
