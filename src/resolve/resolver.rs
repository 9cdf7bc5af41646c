//! Turning a logical hook target into a concrete address.
//!
//! Strategies run in strict cost order and short-circuit on first success:
//!
//! 1. cached exact export name: one live table probe;
//! 2. cached byte offset from the anchor export: no enumeration at all;
//! 3. pattern search over the live export table: many runtimes only strip
//!    some symbols;
//! 4. byte-pattern scan of the module tail past the anchor: reserved for
//!    fully stripped targets, it walks megabytes of code.
//!
//! Whichever live strategy succeeds is written back to the cache so the
//! next run takes tier 1 or 2. Offsets are stored relative to the anchor
//! export, never as absolute addresses, so a module reloaded at a new base
//! keeps the cache valid.

use crate::domain::{Address, ResolveError};
use crate::intercept::{MemoryScan, ModuleHandle, SymbolSource};
use crate::resolve::ByteSignature;
use crate::store::{CacheKind, SymbolCache};
use log::{info, warn};
use regex::Regex;

/// Everything needed to locate one hook target.
#[derive(Debug, Clone)]
pub struct TargetSpec<'a> {
    /// Cache key, e.g. `ScriptEngine_evalString`.
    pub logical: &'a str,
    /// Reliably-named export used as the reference point for offsets and as
    /// the start of the scan window. Empty when the target has no usable
    /// anchor, which disables tiers 2 and 4.
    pub anchor: &'a str,
    /// Case-sensitive regex matched against export names in tier 3.
    pub export_pattern: &'a str,
    /// Byte signature for tier 4; `None` disables the scan tier.
    pub signature: Option<&'a ByteSignature>,
    /// Fixed adjustment added to a tier-4 match before it is returned.
    pub scan_adjust: u64,
}

/// Which tier produced the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CachedSymbol,
    CachedOffset,
    ExportScan,
    MemoryScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub address: Address,
    pub strategy: Strategy,
}

pub struct Resolver {
    cache: SymbolCache,
}

impl Resolver {
    #[must_use]
    pub fn new(cache: SymbolCache) -> Self {
        Self { cache }
    }

    /// Resolve `spec` against `module`, persisting the winning strategy.
    ///
    /// A stale cached symbol (name no longer in the export table) or a
    /// cached offset whose anchor is missing falls through to the live
    /// tiers and the cache entry is overwritten by whichever one succeeds.
    ///
    /// # Errors
    /// [`ResolveError::Pattern`] aborts only this resolution attempt;
    /// [`ResolveError::NotFound`] means every applicable tier failed and
    /// the caller should skip this hook.
    pub fn resolve<S>(
        &self,
        service: &S,
        module: &ModuleHandle,
        spec: &TargetSpec<'_>,
    ) -> Result<Resolution, ResolveError>
    where
        S: SymbolSource + MemoryScan,
    {
        if let Some(entry) = self.cache.read(spec.logical) {
            match entry.kind {
                CacheKind::Symbol => {
                    if let Some(address) = service.find_export_by_name(module, &entry.value) {
                        info!("{}: cached symbol '{}' at {address}", spec.logical, entry.value);
                        return Ok(Resolution { address, strategy: Strategy::CachedSymbol });
                    }
                    warn!(
                        "{}: cached symbol '{}' no longer resolves, re-searching",
                        spec.logical, entry.value
                    );
                }
                CacheKind::Offset => match self.from_cached_offset(service, module, spec, &entry.value)
                {
                    Some(address) => {
                        info!("{}: cached offset {} -> {address}", spec.logical, entry.value);
                        return Ok(Resolution { address, strategy: Strategy::CachedOffset });
                    }
                    None => {
                        warn!("{}: cached offset '{}' unusable, re-searching", spec.logical, entry.value);
                    }
                },
            }
        }

        if let Some(address) = self.export_scan(service, module, spec)? {
            return Ok(Resolution { address, strategy: Strategy::ExportScan });
        }

        if let Some(address) = self.memory_scan(service, module, spec) {
            return Ok(Resolution { address, strategy: Strategy::MemoryScan });
        }

        Err(ResolveError::NotFound(spec.logical.to_string()))
    }

    /// Tier 2. The arithmetic is trusted once cached; only a missing anchor
    /// or an unparsable delta falls through.
    fn from_cached_offset<S: SymbolSource>(
        &self,
        service: &S,
        module: &ModuleHandle,
        spec: &TargetSpec<'_>,
        value: &str,
    ) -> Option<Address> {
        if spec.anchor.is_empty() {
            return None;
        }
        let anchor = service.find_export_by_name(module, spec.anchor)?;
        let delta = parse_hex(value)?;
        Some(anchor.add(delta))
    }

    /// Tier 3: first export whose name matches the pattern wins.
    fn export_scan<S: SymbolSource>(
        &self,
        service: &S,
        module: &ModuleHandle,
        spec: &TargetSpec<'_>,
    ) -> Result<Option<Address>, ResolveError> {
        let pattern = Regex::new(spec.export_pattern)?;

        for symbol in service.exports(module) {
            if pattern.is_match(&symbol.name) {
                info!("{}: export '{}' matched at {}", spec.logical, symbol.name, symbol.address);
                self.cache.write(spec.logical, CacheKind::Symbol, &symbol.name);
                return Ok(Some(symbol.address));
            }
        }
        Ok(None)
    }

    /// Tier 4: scan from the anchor to the end of the module, take the
    /// first match plus the fixed adjustment, and persist the delta from
    /// the anchor.
    #[allow(clippy::cast_precision_loss)] // window size only feeds a log line
    fn memory_scan<S>(
        &self,
        service: &S,
        module: &ModuleHandle,
        spec: &TargetSpec<'_>,
    ) -> Option<Address>
    where
        S: SymbolSource + MemoryScan,
    {
        let signature = spec.signature?;
        if spec.anchor.is_empty() {
            return None;
        }
        let Some(anchor) = service.find_export_by_name(module, spec.anchor) else {
            warn!("{}: anchor export '{}' not found, cannot scan", spec.logical, spec.anchor);
            return None;
        };

        let window = module.tail_from(anchor);
        info!(
            "{}: scanning {:.2} MB past anchor {anchor}",
            spec.logical,
            window.len() as f64 / 1024.0 / 1024.0
        );

        let hit = service.scan(window, signature).next()?;
        let address = hit.add(spec.scan_adjust);
        let delta = address.offset_from(anchor);
        info!("{}: signature hit at {hit}, target {address} (anchor +{delta:#x})", spec.logical);
        self.cache.write(spec.logical, CacheKind::Offset, &format!("{delta:#x}"));
        Some(address)
    }
}

/// Parse a hex delta with or without a `0x` prefix.
fn parse_hex(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(trimmed, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_hex("0xbc8"), Some(0xbc8));
        assert_eq!(parse_hex("BC8"), Some(0xbc8));
        assert_eq!(parse_hex(" 0x10 "), Some(0x10));
        assert_eq!(parse_hex("zz"), None);
    }
}
