//! Worker orchestration: from a cold process to installed hooks.
//!
//! One detached background worker runs the whole chain exactly once:
//! parse the memory maps, derive the package identity, wait for the APK
//! mapping and the engine module to appear, identify the engine, and
//! dispatch the hook plan. Everything after that happens inside the hook
//! bodies on the host's own threads.
//!
//! No failure in here may take the host down: the worker logs and exits,
//! leaving the process unhooked but healthy.

use crate::domain::Address;
use crate::engine::dispatch::{plan_for, Dispatcher, OffsetTable, DEFAULT_ANCHOR_EXPORT};
use crate::engine::hooks::{CurrencyPinner, EvalCounter, ResponseObserver, SpeedHook};
use crate::engine::{identify, HookContext};
use crate::intercept::{InterceptService, ModuleHandle};
use crate::jsontrack::{JsonHandleTracker, DEFAULT_TEXT_CEILING};
use crate::poll::{poll_until, PollOptions};
use crate::process::{
    extract_package_name, find_base_apk_path, largest_library, native_lib_dir, read_self_maps,
};
use crate::replay::{FingerprintPolicy, ReplayEngine};
use crate::report::DispatchReport;
use crate::resolve::Resolver;
use crate::store::{CacheLayout, ModifiedState, SymbolCache};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

/// Side library every target app ships; its mapped path carries the
/// package name.
const CPP_SHARED_LIB: &str = "libcpp_shared.so";

/// File the dispatch report is written to, inside the cache directory.
const REPORT_FILE: &str = "dispatch_report.json";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Delta-time multiplier for the scheduler hook.
    pub speed_multiplier: f32,
    /// The distinguished request id the replay engine captures.
    pub anchor_request_id: i32,
    /// Content fingerprint for requests that should replay despite a
    /// different id.
    pub fingerprint: FingerprintPolicy,
    /// Byte ceiling above which JSON texts are not tracked.
    pub json_text_ceiling: usize,
    /// Value the currency hooks pin to; `None` leaves the currency paths
    /// untouched.
    pub currency_target: Option<u32>,
    /// Root of per-app external data directories.
    pub data_root: std::path::PathBuf,
    /// Anchor export for offset caching and signature scans.
    pub anchor_export: String,
    /// Per-build offsets for unexported targets.
    pub offsets: OffsetTable,
    /// Retry pacing for path and module discovery.
    pub poll: PollOptions,
    /// Whether to drop a dispatch report next to the caches.
    pub write_report: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 4.0,
            anchor_request_id: 1000,
            fingerprint: FingerprintPolicy::default(),
            json_text_ceiling: DEFAULT_TEXT_CEILING,
            currency_target: None,
            data_root: std::path::PathBuf::from("/sdcard/Android/data"),
            anchor_export: DEFAULT_ANCHOR_EXPORT.to_string(),
            offsets: OffsetTable::default(),
            poll: PollOptions::default(),
            write_report: true,
        }
    }
}

pub struct Agent {
    config: AgentConfig,
    stop: Arc<AtomicBool>,
}

impl Agent {
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config, stop: Arc::new(AtomicBool::new(false)) }
    }

    /// Flag that cancels any wait the worker is currently in.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the full discovery-and-installation sequence on the calling
    /// thread.
    ///
    /// Returns the hook context (to be owned by the embedding glue and fed
    /// every intercepted call) and the per-step report.
    ///
    /// # Errors
    /// Discovery errors (package not derivable, module never loading,
    /// unreadable library directory) abort the sequence. Per-hook
    /// resolution and install failures do not; they are recorded in the
    /// report instead.
    pub fn run<S: InterceptService>(&self, service: &S) -> Result<(HookContext, DispatchReport)> {
        let maps = read_self_maps()?;

        let shared_path = maps
            .get(CPP_SHARED_LIB)
            .with_context(|| format!("{CPP_SHARED_LIB} not mapped, cannot derive package"))?;
        let package = extract_package_name(shared_path)
            .with_context(|| format!("no package name in path '{shared_path}'"))?;
        info!("package: {package}");

        let base_apk = poll_until(&self.config.poll, "base.apk mapping", &self.stop, || {
            read_self_maps().ok().and_then(|m| find_base_apk_path(&m, &package))
        })?;

        let lib_dir = native_lib_dir(&base_apk);
        let target_lib = largest_library(&lib_dir)?
            .with_context(|| format!("no native libraries in {}", lib_dir.display()))?;
        info!("target library: {target_lib}");

        let module = poll_until(&self.config.poll, "module load", &self.stop, || {
            service.find_module(&target_lib)
        })?;
        info!(
            "module {} at 0x{:x} ({} bytes)",
            module.name,
            module.range.start,
            module.range.len()
        );

        let engine = identify(&module.name);
        let layout = CacheLayout::for_package(&self.config.data_root, &package);
        let resolver = Resolver::new(SymbolCache::new(layout.symbol_cache_path()));
        let plan = plan_for(engine, &self.config.anchor_export, &self.config.offsets);

        let report = Dispatcher::new(service, &resolver).dispatch(engine, &module, &plan);
        let context = self.build_context(&layout, &module);

        if self.config.write_report {
            self.write_report(&layout, &report);
        }

        Ok((context, report))
    }

    /// Spawn the worker on a named background thread. `on_ready` receives
    /// the hook context and report once installation finishes; the embedder
    /// stashes the context where its trampolines can reach it.
    ///
    /// # Errors
    /// Only thread creation itself can fail here.
    pub fn spawn<S, F>(
        config: AgentConfig,
        service: S,
        on_ready: F,
    ) -> std::io::Result<thread::JoinHandle<()>>
    where
        S: InterceptService + Send + 'static,
        F: FnOnce(HookContext, DispatchReport) + Send + 'static,
    {
        thread::Builder::new().name("hookscope-worker".to_string()).spawn(move || {
            let agent = Agent::new(config);
            match agent.run(&service) {
                Ok((context, report)) => {
                    info!("worker done, {} hook(s) live", report.installed());
                    on_ready(context, report);
                }
                // The host keeps running unhooked; nothing propagates.
                Err(e) => error!("worker failed: {e:#}"),
            }
        })
    }

    fn build_context(&self, layout: &CacheLayout, module: &ModuleHandle) -> HookContext {
        let base: Address = module.base();
        HookContext {
            speed: SpeedHook::new(self.config.speed_multiplier),
            eval: EvalCounter::default(),
            replay: ReplayEngine::new(
                layout.clone(),
                self.config.anchor_request_id,
                self.config.fingerprint.clone(),
            ),
            json: JsonHandleTracker::new(self.config.json_text_ceiling),
            currency: CurrencyPinner::new(
                ModifiedState::new(layout.state_flags_path()),
                self.config.currency_target,
            ),
            responses: ResponseObserver::default(),
            soft_field: self.config.offsets.soft_field.map(|d| d.resolve(base)),
            hard_field: self.config.offsets.hard_field.map(|d| d.resolve(base)),
        }
    }

    fn write_report(&self, layout: &CacheLayout, report: &DispatchReport) {
        let path = layout.root().join(REPORT_FILE);
        let result = std::fs::create_dir_all(layout.root())
            .map_err(anyhow::Error::from)
            .and_then(|()| File::create(&path).map_err(anyhow::Error::from))
            .and_then(|file| report.write_json(BufWriter::new(file)).map_err(anyhow::Error::from));
        match result {
            Ok(()) => info!("dispatch report: {}", path.display()),
            Err(e) => warn!("cannot write dispatch report: {e}"),
        }
    }
}
