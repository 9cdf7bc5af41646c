//! File-backed export table and scan window.
//!
//! The in-process interception primitive owns the authoritative view of a
//! loaded module, but everything the resolver needs (export names and the
//! module's code bytes) is equally present in the `.so` on disk. This
//! source parses the ELF once and serves both queries from the parsed
//! image, translated to the module's live base address. Embedders that
//! only supply a patching primitive can lean on it for the read-only half
//! of the service.

use crate::domain::{Address, MemoryRange};
use crate::intercept::{ExportSymbol, MemoryScan, ModuleHandle, SymbolSource};
use crate::resolve::ByteSignature;
use anyhow::{Context, Result};
use log::debug;
use object::{Object, ObjectSection, ObjectSymbol};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct ElfSymbolSource {
    base: Address,
    /// Dynamic symbols in table order: (name, module-relative address).
    symbols: Vec<(String, u64)>,
    by_name: HashMap<String, u64>,
    /// Section images sorted by virtual address: (vaddr, bytes).
    sections: Vec<(u64, Vec<u8>)>,
}

impl ElfSymbolSource {
    /// Parse the module image at `path`, assuming it is mapped at `base`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid ELF.
    pub fn open(path: &Path, base: Address) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file = object::File::parse(&*data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut symbols = Vec::new();
        let mut by_name = HashMap::new();
        for sym in file.dynamic_symbols() {
            let Ok(name) = sym.name() else { continue };
            if name.is_empty() || sym.address() == 0 {
                continue;
            }
            symbols.push((name.to_string(), sym.address()));
            by_name.entry(name.to_string()).or_insert(sym.address());
        }

        let mut sections = Vec::new();
        for section in file.sections() {
            if section.address() == 0 {
                continue;
            }
            if let Ok(bytes) = section.data() {
                if !bytes.is_empty() {
                    sections.push((section.address(), bytes.to_vec()));
                }
            }
        }
        sections.sort_by_key(|(vaddr, _)| *vaddr);

        debug!(
            "parsed {}: {} dynamic symbols, {} sections",
            path.display(),
            symbols.len(),
            sections.len()
        );
        Ok(Self { base, symbols, by_name, sections })
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

impl SymbolSource for ElfSymbolSource {
    fn find_export_by_name(&self, _module: &ModuleHandle, name: &str) -> Option<Address> {
        self.by_name.get(name).map(|vaddr| self.base.add(*vaddr))
    }

    fn exports<'a>(
        &'a self,
        _module: &'a ModuleHandle,
    ) -> Box<dyn Iterator<Item = ExportSymbol> + 'a> {
        Box::new(self.symbols.iter().map(|(name, vaddr)| ExportSymbol {
            name: name.clone(),
            address: self.base.add(*vaddr),
        }))
    }
}

impl MemoryScan for ElfSymbolSource {
    #[allow(clippy::cast_possible_truncation)] // offsets are bounded by section length
    fn scan<'a>(
        &'a self,
        range: MemoryRange,
        signature: &'a ByteSignature,
    ) -> Box<dyn Iterator<Item = Address> + 'a> {
        let base = self.base.0;
        let iter = self.sections.iter().flat_map(move |(vaddr, bytes)| {
            let section_start = base + vaddr;
            let section_end = section_start + bytes.len() as u64;
            // Clamp the requested window to this section.
            let lo = range.start.max(section_start);
            let hi = range.end.min(section_end);
            let window: &[u8] =
                if lo < hi { &bytes[(lo - section_start) as usize..(hi - section_start) as usize] } else { &[] };
            signature.find_in(window).map(move |off| Address(lo + off as u64))
        });
        Box::new(iter)
    }
}
