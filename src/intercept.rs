//! Interface to the external binary-interception primitive.
//!
//! The primitive that performs the actual code patching, export-table
//! walking and memory scanning lives outside this crate; everything here
//! consumes it through narrow traits so the resolver and dispatcher can be
//! exercised against fakes. Callback-style enumeration in the underlying
//! service is surfaced as plain iterators.

use crate::domain::{Address, InstallError, MemoryRange};
use crate::resolve::ByteSignature;
use std::fmt;
use std::path::PathBuf;

/// A module loaded into the instrumented process.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    pub name: String,
    pub path: PathBuf,
    pub range: MemoryRange,
}

impl ModuleHandle {
    #[must_use]
    pub fn base(&self) -> Address {
        Address(self.range.start)
    }

    /// The mapped region from `from` to the end of the module: the search
    /// window for byte-pattern scans past an anchor export.
    #[must_use]
    pub fn tail_from(&self, from: Address) -> MemoryRange {
        MemoryRange { start: from.0.min(self.range.end), end: self.range.end }
    }
}

/// One entry of a module's export symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSymbol {
    pub name: String,
    pub address: Address,
}

/// Which replacement body the native glue should wire to a target address.
///
/// The crate supplies the hook behaviors (`engine::hooks`); the embedding
/// layer owns the actual trampolines and routes each intercepted call to
/// the matching context method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Frame scheduler tick; delta time gets scaled.
    SchedulerTick,
    /// Script engine eval entry; counted, passed through.
    ScriptEval,
    /// Outbound request send; parameters may be substituted.
    SendData,
    /// Response completion; payload tail is retained for diagnostics.
    HttpCompleted,
    /// Response JSON parse; originating text is surfaced.
    ParseJson,
    /// Native JSON object creation; handle becomes tracked.
    JsonCreate,
    /// Native JSON object disposal; handle stops being tracked.
    JsonDispose,
    /// Earned-currency update.
    CurrencySoft,
    /// Premium-currency update.
    CurrencyHard,
}

impl HookPoint {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            HookPoint::SchedulerTick => "scheduler_tick",
            HookPoint::ScriptEval => "script_eval",
            HookPoint::SendData => "send_data",
            HookPoint::HttpCompleted => "http_completed",
            HookPoint::ParseJson => "parse_json",
            HookPoint::JsonCreate => "json_create",
            HookPoint::JsonDispose => "json_dispose",
            HookPoint::CurrencySoft => "currency_soft",
            HookPoint::CurrencyHard => "currency_hard",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Module lookup over the process's loaded-module list.
pub trait ModuleCatalog {
    fn find_module(&self, name: &str) -> Option<ModuleHandle>;
}

/// Export-table access for one module.
pub trait SymbolSource {
    /// Single-probe lookup of an exact export name.
    fn find_export_by_name(&self, module: &ModuleHandle, name: &str) -> Option<Address>;

    /// Walk the full export table, lazily.
    fn exports<'a>(&'a self, module: &'a ModuleHandle)
        -> Box<dyn Iterator<Item = ExportSymbol> + 'a>;
}

/// Byte-pattern search over mapped memory.
pub trait MemoryScan {
    /// Addresses of signature matches inside `range`, lazily, in ascending
    /// order.
    fn scan<'a>(
        &'a self,
        range: MemoryRange,
        signature: &'a ByteSignature,
    ) -> Box<dyn Iterator<Item = Address> + 'a>;
}

/// The patching half of the primitive: redirect `target` through the
/// replacement body identified by `hook`, retaining a callable original.
pub trait HookInstaller {
    /// # Errors
    /// Returns [`InstallError`] when the primitive rejects the patch; the
    /// dispatcher logs it and continues with the remaining steps.
    fn install(&self, target: Address, hook: HookPoint) -> Result<(), InstallError>;
}

/// Everything the agent needs from the instrumented process.
pub trait InterceptService: ModuleCatalog + SymbolSource + MemoryScan + HookInstaller {}

impl<T: ModuleCatalog + SymbolSource + MemoryScan + HookInstaller> InterceptService for T {}
