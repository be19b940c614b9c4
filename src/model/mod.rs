//! Core data model types: feed messages, attachments, and manifest entries.

pub mod attachment;
pub mod manifest;
pub mod message;
