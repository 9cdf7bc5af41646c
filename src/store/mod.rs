//! Persistent on-disk state shared across process restarts.
//!
//! Three small file formats live under one cache directory:
//! - `symbols.cache`: resolved hook targets, `key=kind:value` lines
//! - `request_<id>.cache`: one captured request per anchor id
//! - `currency_modified.state`: flag file gating the currency hooks
//!
//! Every format assumes a single writer at a time; the host serializes the
//! hook callbacks that touch these files, so no locking is used.

pub mod request_record;
pub mod state_flags;
pub mod symbol_cache;

pub use request_record::RequestRecord;
pub use state_flags::ModifiedState;
pub use symbol_cache::{CacheEntry, CacheKind, SymbolCache};

use std::path::{Path, PathBuf};

/// Locations of the cache files for one instrumented application.
///
/// The root is the application's external data directory plus `cache/`,
/// mirroring where the host app keeps its own scratch files.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Layout rooted at `<data_root>/<package>/cache`.
    #[must_use]
    pub fn for_package(data_root: &Path, package: &str) -> Self {
        Self { root: data_root.join(package).join("cache") }
    }

    /// Layout rooted at an explicit directory (used by tests and the CLI).
    #[must_use]
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn symbol_cache_path(&self) -> PathBuf {
        self.root.join("symbols.cache")
    }

    #[must_use]
    pub fn request_record_path(&self, request_id: i32) -> PathBuf {
        self.root.join(format!("request_{request_id}.cache"))
    }

    #[must_use]
    pub fn state_flags_path(&self) -> PathBuf {
        self.root.join("currency_modified.state")
    }
}
