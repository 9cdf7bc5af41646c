//! Line-oriented cache of resolved hook targets.
//!
//! Format: one `key=kind:value` entry per line, e.g.
//!
//! ```text
//! ScriptEngine_evalString=symbol:_ZN2se12ScriptEngine10evalStringEPKc
//! ScriptEngine_evalString=offset:0xbc8
//! ```
//!
//! `value` is either an exact export name (`symbol`) or a hexadecimal byte
//! delta from the anchor export (`offset`). Absolute addresses are never
//! written; offsets stay valid when the module is reloaded at a new base.
//!
//! Writes rebuild the whole file from a freshly merged map, so a key only
//! ever occupies one line and the last writer wins. A missing or unwritable
//! cache is a cache miss, never an error: resolution falls back to the
//! live strategies.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// What the cached value means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Exact export name, resolvable with a single table probe.
    Symbol,
    /// Hex byte delta from the anchor export.
    Offset,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheKind::Symbol => "symbol",
            CacheKind::Offset => "offset",
        })
    }
}

impl FromStr for CacheKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbol" => Ok(CacheKind::Symbol),
            "offset" => Ok(CacheKind::Offset),
            _ => Err(()),
        }
    }
}

/// One cached resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub kind: CacheKind,
    pub value: String,
}

/// Handle to the symbol cache file.
#[derive(Debug, Clone)]
pub struct SymbolCache {
    path: PathBuf,
}

impl SymbolCache {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Look up `key`, returning the first matching entry.
    ///
    /// Missing file, unreadable file, and lines with an unknown kind all
    /// count as "not cached".
    #[must_use]
    pub fn read(&self, key: &str) -> Option<CacheEntry> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            debug!("symbol cache not readable: {}", self.path.display());
            return None;
        };

        for line in content.lines() {
            let Some((line_key, data)) = line.split_once('=') else {
                continue;
            };
            if line_key != key {
                continue;
            }
            let Some((kind_str, value)) = data.split_once(':') else {
                continue;
            };
            let Ok(kind) = kind_str.parse::<CacheKind>() else {
                warn!("unknown cache kind '{kind_str}' for key '{key}', ignoring");
                continue;
            };
            info!("cache hit: {key} = {kind}:{value}");
            return Some(CacheEntry { kind, value: value.to_string() });
        }

        debug!("cache miss: {key}");
        None
    }

    /// Persist `key = kind:value`, replacing any previous entry for `key`.
    ///
    /// The file is rewritten from a merged map. Failure to create the
    /// directory or write the file is logged and swallowed: the entry is
    /// simply not cached for the next run.
    pub fn write(&self, key: &str, kind: CacheKind, value: &str) {
        let mut entries = self.load_all();
        entries.insert(key.to_string(), format!("{kind}:{value}"));

        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("cannot create cache directory {}: {e}", parent.display());
                return;
            }
        }

        let mut out = String::new();
        for (k, v) in &entries {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
        }

        match fs::write(&self.path, out) {
            Ok(()) => info!("cached: {key} = {kind}:{value}"),
            Err(e) => warn!("cannot write symbol cache {}: {e}", self.path.display()),
        }
    }

    fn load_all(&self) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        if let Ok(content) = fs::read_to_string(&self.path) {
            for line in content.lines() {
                if let Some((key, data)) = line.split_once('=') {
                    entries.insert(key.to_string(), data.to_string());
                }
            }
        }
        entries
    }
}
