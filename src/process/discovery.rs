//! From mapped paths to an instrumentation target.
//!
//! The chain: a known side library reveals the package name, the package
//! name locates the APK image, the APK's directory holds the native
//! library folder, and the biggest `.so` in it is the engine to hook.

use crate::process::LibraryMap;
use anyhow::{Context, Result};
use log::{debug, info};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// ABI subdirectory holding the app's native libraries.
const NATIVE_ABI_DIR: &str = "lib/arm64";

/// Pull the package name out of a mapped library path.
///
/// Two shapes occur in practice:
/// - `/data/data/<pkg>/files/lib...so`: the package is the path segment
///   before `/files/`;
/// - `/data/app/.../<pkg>-<mangled>/...`: the package is the last path
///   segment before the final `-suffix`.
///
/// A candidate without a dot is rejected; every real package id has one.
#[must_use]
pub fn extract_package_name(path: &str) -> Option<String> {
    if let Some(files_pos) = path.find("/files/") {
        let before = &path[..files_pos];
        if let Some(start) = before.rfind('/') {
            let candidate = &before[start + 1..];
            if candidate.contains('.') {
                return Some(candidate.to_string());
            }
        }
    }

    if path.contains("/data/app/") {
        let before_dash = &path[..path.rfind('-')?];
        let candidate = before_dash.rsplit('/').next()?;
        // Strip any version suffix a second dash would leave behind.
        let candidate = candidate.split('-').next()?;
        if candidate.contains('.') {
            return Some(candidate.to_string());
        }
    }

    None
}

/// Locate the APK image path for `package` in the library map, truncated
/// at the `base.apk` marker.
#[must_use]
pub fn find_base_apk_path(map: &LibraryMap, package: &str) -> Option<String> {
    if package.is_empty() {
        return None;
    }

    let pattern = Regex::new(&format!(".*{}.*base\\.apk", regex::escape(package))).ok()?;

    for (_, path) in map.iter() {
        if pattern.is_match(path) {
            let apk_pos = path.find("base.apk")?;
            let truncated = &path[..apk_pos + "base.apk".len()];
            info!("APK path: {truncated}");
            return Some(truncated.to_string());
        }
    }

    debug!("no base.apk mapping for package '{package}' yet");
    None
}

/// Native library directory next to the APK image.
#[must_use]
pub fn native_lib_dir(base_apk_path: &str) -> PathBuf {
    let app_dir = Path::new(base_apk_path).parent().unwrap_or_else(|| Path::new(""));
    app_dir.join(NATIVE_ABI_DIR)
}

/// Name of the largest `.so` in `dir`: the engine library dwarfs every
/// helper library shipped beside it.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn largest_library(dir: &Path) -> Result<Option<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut best: Option<(String, u64)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".so") {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let size = metadata.len();
        debug!("library candidate: {name} ({size} bytes)");
        if best.as_ref().is_none_or(|(_, best_size)| size > *best_size) {
            best = Some((name, size));
        }
    }

    if let Some((name, size)) = &best {
        info!("largest library: {name} ({size} bytes)");
    }
    Ok(best.map(|(name, _)| name))
}
