//! Memory map parsing for the instrumented process.
//!
//! Reads `/proc/self/maps` and keeps the mappings that belong to the
//! application itself (native libraries and the APK image under the app's
//! private `data/` paths), keyed by file name. System libraries are
//! deliberately left out; every later discovery step only cares about the
//! app's own files.

use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::fs;

/// File name -> full mapped path, for the app's own mappings.
#[derive(Debug, Clone, Default)]
pub struct LibraryMap {
    entries: BTreeMap<String, String>,
}

impl LibraryMap {
    #[must_use]
    pub fn get(&self, library_name: &str) -> Option<&str> {
        self.entries.get(library_name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse maps-format text: `start-end perms offset dev inode pathname`.
///
/// Only lines whose path contains `data/` are considered, and only `.so`
/// and `base.apk` mappings are recorded.
#[must_use]
pub fn parse_maps_text(text: &str) -> LibraryMap {
    let mut entries = BTreeMap::new();

    for line in text.lines() {
        if !line.contains("data/") {
            continue;
        }
        let Some(path) = line.rsplit(' ').next().filter(|p| !p.is_empty()) else {
            continue;
        };
        let name = library_name(path);
        if name.ends_with(".so") || name == "base.apk" {
            entries.insert(name.to_string(), path.to_string());
        }
    }

    LibraryMap { entries }
}

/// Read and parse this process's own memory maps.
///
/// # Errors
/// Returns an error if `/proc/self/maps` cannot be read.
pub fn read_self_maps() -> Result<LibraryMap> {
    let text = fs::read_to_string("/proc/self/maps").context("Failed to read /proc/self/maps")?;
    let map = parse_maps_text(&text);
    info!("parsed maps, {} app-private mappings", map.len());
    Ok(map)
}

/// Trailing file name of a mapped path.
fn library_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
