//! Mapping an identified engine to its hook plan and installing it.
//!
//! A plan is an ordered list of independent steps. Each step names a hook
//! point and how to find its address; resolution and installation failures
//! are logged per step and never abort the remaining steps: partial
//! instrumentation is the expected steady state on unfamiliar builds.

use crate::domain::Address;
use crate::engine::hooks::FieldDescriptor;
use crate::engine::EngineKind;
use crate::intercept::{HookInstaller, HookPoint, MemoryScan, ModuleHandle, SymbolSource};
use crate::report::{DispatchReport, StepOutcome, StepStatus};
use crate::resolve::{ByteSignature, Resolver, TargetSpec};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Export name of the JNI bridge the JS runtime always keeps: the anchor
/// for offset caching and signature scans.
pub const DEFAULT_ANCHOR_EXPORT: &str = "Java_com_cocos_lib_JsbBridge_nativeSendToScript";

/// Export-name pattern for the scheduler tick of the C++ runtime.
const SCHEDULER_TICK_PATTERN: &str = "Scheduler.*update";

/// Export-name pattern for the JS runtime's eval entry.
const SCRIPT_EVAL_PATTERN: &str = "ScriptEngine.*evalString";

/// Epilogue/prologue signature bracketing the unexported eval thunk:
/// `ret`, a tagged store, then another `ret`.
const SCRIPT_EVAL_SIGNATURE: &str = "C0 03 5F D6 00 ?? ?? 39 C0 03 5F D6";

/// The eval entry sits a fixed distance past the signature match.
const SCRIPT_EVAL_ADJUST: u64 = 0xc;

/// Per-build offsets for targets that are neither exported nor findable by
/// signature. Shipped as data (JSON beside the agent) because they change
/// with every engine build; an absent entry skips that hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetTable {
    pub send_data: Option<u64>,
    pub http_completed: Option<u64>,
    pub parse_json: Option<u64>,
    pub json_create: Option<u64>,
    pub json_dispose: Option<u64>,
    pub currency_soft: Option<u64>,
    pub currency_hard: Option<u64>,
    pub soft_field: Option<FieldDescriptor>,
    pub hard_field: Option<FieldDescriptor>,
}

/// How to find one hook's address.
#[derive(Debug, Clone)]
pub enum HookTarget {
    /// Fixed offset from the module base.
    BaseOffset { offset: u64 },
    /// Full tiered resolution through the symbol cache.
    Tiered {
        logical: &'static str,
        anchor: String,
        export_pattern: &'static str,
        signature: Option<ByteSignature>,
        scan_adjust: u64,
    },
}

#[derive(Debug, Clone)]
pub struct HookStep {
    pub point: HookPoint,
    pub target: HookTarget,
}

/// The ordered hook plan for an engine.
///
/// Unity, Unreal and Godot are identified but carry no hooks yet; an
/// unknown engine gets nothing.
#[must_use]
pub fn plan_for(engine: EngineKind, anchor_export: &str, offsets: &OffsetTable) -> Vec<HookStep> {
    match engine {
        EngineKind::CocosCpp => {
            let mut steps = vec![HookStep {
                point: HookPoint::SchedulerTick,
                target: HookTarget::Tiered {
                    logical: "Scheduler_update",
                    // The C++ runtime keeps its scheduler exported; no
                    // anchor means no offset caching and no scan tier.
                    anchor: String::new(),
                    export_pattern: SCHEDULER_TICK_PATTERN,
                    signature: None,
                    scan_adjust: 0,
                },
            }];
            for (point, offset) in [
                (HookPoint::SendData, offsets.send_data),
                (HookPoint::HttpCompleted, offsets.http_completed),
                (HookPoint::ParseJson, offsets.parse_json),
                (HookPoint::JsonCreate, offsets.json_create),
                (HookPoint::JsonDispose, offsets.json_dispose),
                (HookPoint::CurrencySoft, offsets.currency_soft),
                (HookPoint::CurrencyHard, offsets.currency_hard),
            ] {
                if let Some(offset) = offset {
                    steps.push(HookStep { point, target: HookTarget::BaseOffset { offset } });
                }
            }
            steps
        }
        EngineKind::CocosJs => {
            vec![HookStep {
                point: HookPoint::ScriptEval,
                target: HookTarget::Tiered {
                    logical: "ScriptEngine_evalString",
                    anchor: anchor_export.to_string(),
                    export_pattern: SCRIPT_EVAL_PATTERN,
                    signature: SCRIPT_EVAL_SIGNATURE.parse::<ByteSignature>().ok(),
                    scan_adjust: SCRIPT_EVAL_ADJUST,
                },
            }]
        }
        EngineKind::Unity | EngineKind::Unreal | EngineKind::Godot | EngineKind::Unknown => {
            Vec::new()
        }
    }
}

pub struct Dispatcher<'a, S> {
    service: &'a S,
    resolver: &'a Resolver,
}

impl<'a, S> Dispatcher<'a, S>
where
    S: SymbolSource + MemoryScan + HookInstaller,
{
    #[must_use]
    pub fn new(service: &'a S, resolver: &'a Resolver) -> Self {
        Self { service, resolver }
    }

    /// Install every step of the plan, recording per-step outcomes.
    pub fn dispatch(
        &self,
        engine: EngineKind,
        module: &ModuleHandle,
        plan: &[HookStep],
    ) -> DispatchReport {
        info!("engine: {engine}, module: {}, {} step(s)", module.name, plan.len());
        if plan.is_empty() {
            info!("no hooks planned for {engine}");
        }

        let steps = plan.iter().map(|step| self.run_step(module, step)).collect();
        let report =
            DispatchReport { engine: engine.to_string(), module: module.name.clone(), steps };
        info!("{}/{} hook(s) installed", report.installed(), plan.len());
        report
    }

    fn run_step(&self, module: &ModuleHandle, step: &HookStep) -> StepOutcome {
        let address = match &step.target {
            HookTarget::BaseOffset { offset } => module.base().add(*offset),
            HookTarget::Tiered { logical, anchor, export_pattern, signature, scan_adjust } => {
                let spec = TargetSpec {
                    logical,
                    anchor: anchor.as_str(),
                    export_pattern,
                    signature: signature.as_ref(),
                    scan_adjust: *scan_adjust,
                };
                match self.resolver.resolve(self.service, module, &spec) {
                    Ok(resolution) => resolution.address,
                    Err(e) => {
                        warn!("{}: resolution failed: {e}", step.point);
                        return StepOutcome {
                            hook: step.point.label().to_string(),
                            status: StepStatus::ResolveFailed,
                            address: None,
                            detail: Some(e.to_string()),
                        };
                    }
                }
            }
        };

        match self.service.install(address, step.point) {
            Ok(()) => {
                info!("{} installed at {address}", step.point);
                StepOutcome {
                    hook: step.point.label().to_string(),
                    status: StepStatus::Installed,
                    address: Some(address.to_string()),
                    detail: None,
                }
            }
            Err(e) => {
                warn!("{}: install failed: {e}", step.point);
                StepOutcome {
                    hook: step.point.label().to_string(),
                    status: StepStatus::InstallFailed,
                    address: Some(address.to_string()),
                    detail: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_signature_is_valid() {
        let sig: ByteSignature = SCRIPT_EVAL_SIGNATURE.parse().unwrap();
        assert_eq!(sig.len(), 12);
    }

    #[test]
    fn test_cocos_js_plan_is_single_tiered_step() {
        let plan = plan_for(EngineKind::CocosJs, DEFAULT_ANCHOR_EXPORT, &OffsetTable::default());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].point, HookPoint::ScriptEval);
        assert!(matches!(plan[0].target, HookTarget::Tiered { .. }));
    }

    #[test]
    fn test_cocos_cpp_plan_grows_with_offsets() {
        let bare = plan_for(EngineKind::CocosCpp, DEFAULT_ANCHOR_EXPORT, &OffsetTable::default());
        assert_eq!(bare.len(), 1);

        let offsets = OffsetTable {
            send_data: Some(0x3b_51dc),
            currency_soft: Some(0x38_80c0),
            ..OffsetTable::default()
        };
        let plan = plan_for(EngineKind::CocosCpp, DEFAULT_ANCHOR_EXPORT, &offsets);
        let points: Vec<HookPoint> = plan.iter().map(|s| s.point).collect();
        assert_eq!(
            points,
            vec![HookPoint::SchedulerTick, HookPoint::SendData, HookPoint::CurrencySoft]
        );
    }

    #[test]
    fn test_unhandled_engines_have_empty_plans() {
        for engine in [EngineKind::Unity, EngineKind::Unreal, EngineKind::Godot, EngineKind::Unknown]
        {
            assert!(plan_for(engine, DEFAULT_ANCHOR_EXPORT, &OffsetTable::default()).is_empty());
        }
    }

    #[test]
    fn test_offset_table_deserializes_from_partial_json() {
        let table: OffsetTable = serde_json::from_str(
            r#"{"send_data": 3887580, "soft_field": {"value_offset": 100, "key_offset": 104}}"#,
        )
        .unwrap();
        assert_eq!(table.send_data, Some(3_887_580));
        assert_eq!(table.soft_field, Some(FieldDescriptor { value_offset: 100, key_offset: 104 }));
        assert_eq!(table.parse_json, None);
    }
}
