//! Incremental backup of a Substack publication's drafts and published posts.
//!
//! A cycle lists the remote items, picks the ones that changed since the cached
//! index ([`resolver`]), fetches their details ([`fetcher`]), writes their
//! bodies and the merged index ([`archive`], [`merge`]) and records the result
//! ([`status`]). [`orchestrator`] ties the steps together.

pub mod archive;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod resolver;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod substack;

pub use error::{BackupError, Result};
