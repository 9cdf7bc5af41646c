//! Resolver tier behavior against a scripted interception service.

use hookscope::domain::{Address, InstallError, MemoryRange, ResolveError};
use hookscope::intercept::{
    ExportSymbol, HookInstaller, HookPoint, MemoryScan, ModuleHandle, SymbolSource,
};
use hookscope::resolve::{ByteSignature, Resolver, Strategy, TargetSpec};
use hookscope::store::{CacheKind, SymbolCache};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;

const MODULE_BASE: u64 = 0x7a_0000_0000;

/// Scripted stand-in for the interception primitive. Name probes,
/// enumeration and scans are counted separately so tests can assert which
/// tiers actually ran.
struct FakeService {
    /// Answers for single-name probes.
    named: HashMap<String, Address>,
    /// Entries yielded by full enumeration.
    listed: Vec<ExportSymbol>,
    /// Bytes mapped at `MODULE_BASE`.
    memory: Vec<u8>,
    find_calls: Cell<usize>,
    enum_calls: Cell<usize>,
    scan_calls: Cell<usize>,
}

impl FakeService {
    fn new() -> Self {
        Self {
            named: HashMap::new(),
            listed: Vec::new(),
            memory: Vec::new(),
            find_calls: Cell::new(0),
            enum_calls: Cell::new(0),
            scan_calls: Cell::new(0),
        }
    }

    fn with_export(mut self, name: &str, address: u64) -> Self {
        self.named.insert(name.to_string(), Address(address));
        self.listed.push(ExportSymbol { name: name.to_string(), address: Address(address) });
        self
    }

    /// Name resolves by probe but never shows up in enumeration.
    fn with_hidden_export(mut self, name: &str, address: u64) -> Self {
        self.named.insert(name.to_string(), Address(address));
        self
    }

    fn with_memory(mut self, bytes: Vec<u8>) -> Self {
        self.memory = bytes;
        self
    }
}

impl SymbolSource for FakeService {
    fn find_export_by_name(&self, _module: &ModuleHandle, name: &str) -> Option<Address> {
        self.find_calls.set(self.find_calls.get() + 1);
        self.named.get(name).copied()
    }

    fn exports<'a>(
        &'a self,
        _module: &'a ModuleHandle,
    ) -> Box<dyn Iterator<Item = ExportSymbol> + 'a> {
        self.enum_calls.set(self.enum_calls.get() + 1);
        Box::new(self.listed.iter().cloned())
    }
}

impl MemoryScan for FakeService {
    fn scan<'a>(
        &'a self,
        range: MemoryRange,
        signature: &'a ByteSignature,
    ) -> Box<dyn Iterator<Item = Address> + 'a> {
        self.scan_calls.set(self.scan_calls.get() + 1);
        let start = (range.start - MODULE_BASE) as usize;
        let end = ((range.end - MODULE_BASE) as usize).min(self.memory.len());
        let window = &self.memory[start.min(end)..end];
        Box::new(signature.find_in(window).map(move |off| Address(range.start + off as u64)))
    }
}

impl HookInstaller for FakeService {
    fn install(&self, _target: Address, _hook: HookPoint) -> Result<(), InstallError> {
        Ok(())
    }
}

fn module(memory_len: u64) -> ModuleHandle {
    ModuleHandle {
        name: "libcocos2djs.so".to_string(),
        path: PathBuf::from("/data/app/com.example.game-1/lib/arm64/libcocos2djs.so"),
        range: MemoryRange { start: MODULE_BASE, end: MODULE_BASE + memory_len.max(0x1000) },
    }
}

fn cache_in(dir: &tempfile::TempDir) -> SymbolCache {
    SymbolCache::new(dir.path().join("symbols.cache"))
}

fn spec<'a>(signature: Option<&'a ByteSignature>) -> TargetSpec<'a> {
    TargetSpec {
        logical: "Foo",
        anchor: "anchor_export",
        export_pattern: "Foo.*",
        signature,
        scan_adjust: 0,
    }
}

#[test]
fn test_cached_symbol_short_circuits_enumeration_and_scan() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    cache.write("Foo", CacheKind::Symbol, "Foo_impl_v2");

    let service = FakeService::new().with_export("Foo_impl_v2", MODULE_BASE + 0x400);
    let resolver = Resolver::new(cache);

    let resolution = resolver.resolve(&service, &module(0), &spec(None)).unwrap();
    assert_eq!(resolution.address, Address(MODULE_BASE + 0x400));
    assert_eq!(resolution.strategy, Strategy::CachedSymbol);
    assert_eq!(service.enum_calls.get(), 0);
    assert_eq!(service.scan_calls.get(), 0);
}

#[test]
fn test_stale_cached_symbol_falls_back_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    cache.write("Foo", CacheKind::Symbol, "Foo_gone");

    let service = FakeService::new().with_export("Foo_impl_v3", MODULE_BASE + 0x500);
    let resolver = Resolver::new(cache_in(&dir));

    let resolution = resolver.resolve(&service, &module(0), &spec(None)).unwrap();
    assert_eq!(resolution.strategy, Strategy::ExportScan);
    assert_eq!(resolution.address, Address(MODULE_BASE + 0x500));

    // The stale entry was replaced, not appended.
    let entry = cache_in(&dir).read("Foo").unwrap();
    assert_eq!(entry.kind, CacheKind::Symbol);
    assert_eq!(entry.value, "Foo_impl_v3");
    let content = std::fs::read_to_string(dir.path().join("symbols.cache")).unwrap();
    assert_eq!(content.lines().filter(|l| l.starts_with("Foo=")).count(), 1);
}

#[test]
fn test_export_scan_writes_back_and_second_call_needs_no_enumeration() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(cache_in(&dir));

    let service = FakeService::new().with_export("Foo_impl_v2", MODULE_BASE + 0x400);
    let first = resolver.resolve(&service, &module(0), &spec(None)).unwrap();
    assert_eq!(first.strategy, Strategy::ExportScan);

    let content = std::fs::read_to_string(dir.path().join("symbols.cache")).unwrap();
    assert!(content.contains("Foo=symbol:Foo_impl_v2"));

    // Second run: the export table can no longer be enumerated, but the
    // cached name still answers a direct probe.
    let service = FakeService::new().with_hidden_export("Foo_impl_v2", MODULE_BASE + 0x400);
    let second = resolver.resolve(&service, &module(0), &spec(None)).unwrap();
    assert_eq!(second.address, first.address);
    assert_eq!(second.strategy, Strategy::CachedSymbol);
    assert_eq!(service.enum_calls.get(), 0);
}

#[test]
fn test_cached_offset_is_anchor_relative() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    cache.write("Foo", CacheKind::Offset, "0xbc8");

    // The module moved: the anchor is somewhere new, the cached delta
    // still applies.
    let service = FakeService::new().with_hidden_export("anchor_export", MODULE_BASE + 0x9000);
    let resolver = Resolver::new(cache);

    let resolution = resolver.resolve(&service, &module(0), &spec(None)).unwrap();
    assert_eq!(resolution.strategy, Strategy::CachedOffset);
    assert_eq!(resolution.address, Address(MODULE_BASE + 0x9000 + 0xbc8));
    assert_eq!(service.enum_calls.get(), 0);
    assert_eq!(service.scan_calls.get(), 0);
}

#[test]
fn test_signature_scan_persists_anchor_delta() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(cache_in(&dir));
    let signature: ByteSignature = "DE AD ?? EF".parse().unwrap();

    // Anchor at +0x100; the signature sits at +0x140.
    let mut memory = vec![0u8; 0x200];
    memory[0x140..0x144].copy_from_slice(&[0xDE, 0xAD, 0x77, 0xEF]);
    let service = FakeService::new()
        .with_hidden_export("anchor_export", MODULE_BASE + 0x100)
        .with_memory(memory);

    let mut target = spec(Some(&signature));
    target.scan_adjust = 0xc;

    let resolution = resolver.resolve(&service, &module(0x200), &target).unwrap();
    assert_eq!(resolution.strategy, Strategy::MemoryScan);
    assert_eq!(resolution.address, Address(MODULE_BASE + 0x140 + 0xc));

    let entry = cache_in(&dir).read("Foo").unwrap();
    assert_eq!(entry.kind, CacheKind::Offset);
    assert_eq!(entry.value, format!("{:#x}", 0x40 + 0xc));

    // Next run resolves from the cached delta without scanning.
    let service = FakeService::new().with_hidden_export("anchor_export", MODULE_BASE + 0x100);
    let again = resolver.resolve(&service, &module(0x200), &target).unwrap();
    assert_eq!(again.strategy, Strategy::CachedOffset);
    assert_eq!(again.address, resolution.address);
    assert_eq!(service.scan_calls.get(), 0);
}

#[test]
fn test_all_tiers_failing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(cache_in(&dir));
    let signature: ByteSignature = "01 02 03 04".parse().unwrap();

    let service = FakeService::new()
        .with_hidden_export("anchor_export", MODULE_BASE + 0x100)
        .with_memory(vec![0u8; 0x200]);

    let err = resolver.resolve(&service, &module(0x200), &spec(Some(&signature))).unwrap_err();
    assert!(matches!(err, ResolveError::NotFound(name) if name == "Foo"));
}

#[test]
fn test_invalid_export_pattern_aborts_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(cache_in(&dir));
    let service = FakeService::new().with_export("Foo_impl", MODULE_BASE + 0x10);

    let target = TargetSpec {
        logical: "Foo",
        anchor: "",
        export_pattern: "Foo[",
        signature: None,
        scan_adjust: 0,
    };
    let err = resolver.resolve(&service, &module(0), &target).unwrap_err();
    assert!(matches!(err, ResolveError::Pattern(_)));
}

#[test]
fn test_export_pattern_is_case_sensitive() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(cache_in(&dir));
    let service = FakeService::new().with_export("foo_impl", MODULE_BASE + 0x10);

    let err = resolver.resolve(&service, &module(0), &spec(None)).unwrap_err();
    assert!(matches!(err, ResolveError::NotFound(_)));
}
