//! Hook behaviors.
//!
//! Each intercepted function body in the native glue is a thin shim that
//! forwards into one of these methods and then calls the retained original
//! function. All mutable hook state lives in [`HookContext`], owned by the
//! embedder for the life of the process; the host serializes calls into a
//! given hook, so methods take `&mut self` and no locks are involved.

use crate::domain::{Address, CurrencyKind, JsonHandle};
use crate::jsontrack::JsonHandleTracker;
use crate::replay::{ReplayEngine, ReplayOutcome};
use crate::store::{ModifiedState, RequestRecord};
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Scales the host's frame delta time.
#[derive(Debug, Clone, Copy)]
pub struct SpeedHook {
    multiplier: f32,
}

impl SpeedHook {
    #[must_use]
    pub fn new(multiplier: f32) -> Self {
        Self { multiplier }
    }

    #[must_use]
    pub fn scale(&self, dt: f32) -> f32 {
        dt * self.multiplier
    }
}

/// Counts script evaluations flowing through the eval entry point.
#[derive(Debug, Default)]
pub struct EvalCounter {
    count: u64,
}

impl EvalCounter {
    /// Record one evaluation; returns the running total.
    pub fn on_eval(&mut self, source_len: usize) -> u64 {
        self.count += 1;
        debug!("script eval #{} ({source_len} bytes)", self.count);
        self.count
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Offsets of an XOR-obscured global value inside the engine module.
///
/// The engine stores sensitive globals as `stored = value ^ key`, with the
/// key in a sibling word. Offsets are relative to the module base so they
/// survive relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub value_offset: u64,
    pub key_offset: u64,
}

impl FieldDescriptor {
    /// Bind the descriptor to a concrete module base.
    #[must_use]
    pub fn resolve(self, base: Address) -> ResolvedField {
        ResolvedField { value_addr: base.add(self.value_offset), key_addr: base.add(self.key_offset) }
    }
}

/// A field descriptor bound to the module's load address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    value_addr: Address,
    key_addr: Address,
}

/// Decode a stored word with its key.
#[must_use]
pub fn decode(stored: u32, key: u32) -> u32 {
    stored ^ key
}

/// Encode a plain value for storage under `key`.
#[must_use]
pub fn encode(value: u32, key: u32) -> u32 {
    value ^ key
}

/// Word-granular access to the instrumented process's globals. The real
/// implementation lives in the embedding layer; tests substitute a map.
pub trait GlobalMemory {
    fn read_u32(&self, addr: Address) -> Option<u32>;
    fn write_u32(&mut self, addr: Address, value: u32) -> bool;
}

impl ResolvedField {
    /// Current decoded value, if both words are readable.
    pub fn current<M: GlobalMemory>(&self, memory: &M) -> Option<u32> {
        let stored = memory.read_u32(self.value_addr)?;
        let key = memory.read_u32(self.key_addr)?;
        Some(decode(stored, key))
    }

    /// Re-encode the field to hold `target` under `fresh_key`.
    pub fn pin<M: GlobalMemory>(&self, memory: &mut M, target: u32, fresh_key: u32) -> bool {
        memory.write_u32(self.key_addr, fresh_key)
            && memory.write_u32(self.value_addr, encode(target, fresh_key))
    }
}

/// What one currency interception did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// Field rewritten to the target value.
    Pinned { previous: Option<u32>, target: u32 },
    /// Gate closed: both paths already rewritten on an earlier run.
    PassThrough,
    /// No field descriptor configured or memory unreadable.
    Unavailable,
}

/// Pins the currency globals to a configured target, once per install.
///
/// The flag file makes the rewrite a one-shot across process restarts:
/// after both currency paths have been pinned, every later run goes
/// straight to the original function. The gate is read once per process
/// and remembered, matching the single check the hook sites want.
pub struct CurrencyPinner {
    state: ModifiedState,
    target: Option<u32>,
    rng: SmallRng,
    already_modified: Option<bool>,
}

impl CurrencyPinner {
    #[must_use]
    pub fn new(state: ModifiedState, target: Option<u32>) -> Self {
        Self { state, target, rng: SmallRng::from_entropy(), already_modified: None }
    }

    /// Handle one intercepted currency update. The caller forwards to the
    /// original function afterwards regardless of the outcome.
    pub fn on_update<M: GlobalMemory>(
        &mut self,
        kind: CurrencyKind,
        field: Option<&ResolvedField>,
        memory: &mut M,
    ) -> PinOutcome {
        let gate = *self
            .already_modified
            .get_or_insert_with(|| self.state.is_fully_modified());
        if gate {
            debug!("{kind} currency already modified on a previous run");
            return PinOutcome::PassThrough;
        }

        let Some(target) = self.target else {
            return PinOutcome::Unavailable;
        };
        let Some(field) = field else {
            warn!("{kind} currency field not configured");
            return PinOutcome::Unavailable;
        };

        let previous = field.current(memory);
        let fresh_key: u32 = self.rng.gen();
        if !field.pin(memory, target, fresh_key) {
            warn!("{kind} currency field not writable");
            return PinOutcome::Unavailable;
        }

        info!("{kind} currency {previous:?} -> {target}");
        self.state.mark(kind);
        PinOutcome::Pinned { previous, target }
    }
}

/// Watches completed responses and keeps the JSON tail of the most recent
/// `value1|value2|JSON` payload for diagnostics.
#[derive(Debug, Default)]
pub struct ResponseObserver {
    last_json: Option<String>,
}

impl ResponseObserver {
    /// Record one response body; returns the extracted JSON part, if the
    /// body has the two-separator shape.
    pub fn on_response(&mut self, body: &str) -> Option<&str> {
        let json = split_payload(body)?;
        debug!("response JSON tail, {} bytes", json.len());
        self.last_json = Some(json.to_string());
        self.last_json.as_deref()
    }

    #[must_use]
    pub fn last_json(&self) -> Option<&str> {
        self.last_json.as_deref()
    }
}

/// The JSON tail after the second `|` of a `value1|value2|JSON` body.
#[must_use]
pub fn split_payload(body: &str) -> Option<&str> {
    let first = body.find('|')?;
    let second = body[first + 1..].find('|')? + first + 1;
    let tail = &body[second + 1..];
    if tail.is_empty() {
        None
    } else {
        Some(tail)
    }
}

/// All hook state for one instrumented process, built by the agent and
/// owned by the embedding layer.
pub struct HookContext {
    pub speed: SpeedHook,
    pub eval: EvalCounter,
    pub replay: ReplayEngine,
    pub json: JsonHandleTracker,
    pub currency: CurrencyPinner,
    pub responses: ResponseObserver,
    /// Currency fields bound to the module base, when configured.
    pub soft_field: Option<ResolvedField>,
    pub hard_field: Option<ResolvedField>,
}

impl HookContext {
    /// Outbound request interception: returns the tuple to forward.
    pub fn on_send_data(&mut self, request: RequestRecord) -> (RequestRecord, ReplayOutcome) {
        info!(
            "outbound request {} (op {})",
            request.request_id, request.operation_type
        );
        self.replay.process(request)
    }

    /// JSON parse interception: surface the originating text, if tracked.
    pub fn on_parse_json(&self, operation_type: i32, handle: JsonHandle) {
        match self.json.text_of(handle) {
            Some(text) => {
                let head: String = text.chars().take(800).collect();
                info!("parse op {operation_type}, json {handle}: {head}");
            }
            None => debug!("parse op {operation_type}, json {handle} untracked"),
        }
    }

    /// Currency update interception for either kind.
    pub fn on_currency_update<M: GlobalMemory>(
        &mut self,
        kind: CurrencyKind,
        memory: &mut M,
    ) -> PinOutcome {
        let field = match kind {
            CurrencyKind::Soft => self.soft_field.as_ref(),
            CurrencyKind::Hard => self.hard_field.as_ref(),
        };
        self.currency.on_update(kind, field, memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeMemory(HashMap<u64, u32>);

    impl GlobalMemory for FakeMemory {
        fn read_u32(&self, addr: Address) -> Option<u32> {
            self.0.get(&addr.0).copied()
        }

        fn write_u32(&mut self, addr: Address, value: u32) -> bool {
            self.0.insert(addr.0, value);
            true
        }
    }

    #[test]
    fn test_speed_hook_scales_delta() {
        let hook = SpeedHook::new(4.0);
        assert!((hook.scale(0.016) - 0.064).abs() < f32::EPSILON);
    }

    #[test]
    fn test_eval_counter_increments() {
        let mut counter = EvalCounter::default();
        assert_eq!(counter.on_eval(10), 1);
        assert_eq!(counter.on_eval(20), 2);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let key = 0x5eed_1234;
        assert_eq!(decode(encode(17_971_286, key), key), 17_971_286);
    }

    #[test]
    fn test_resolved_field_reads_decoded_value() {
        let base = Address(0x7000_0000);
        let field = FieldDescriptor { value_offset: 0x18, key_offset: 0x1c }.resolve(base);

        let mut memory = FakeMemory(HashMap::new());
        memory.write_u32(Address(0x7000_0018), encode(500, 0xabcd));
        memory.write_u32(Address(0x7000_001c), 0xabcd);

        assert_eq!(field.current(&memory), Some(500));
    }

    #[test]
    fn test_pin_rewrites_value_and_key() {
        let base = Address(0x7000_0000);
        let field = FieldDescriptor { value_offset: 0x18, key_offset: 0x1c }.resolve(base);
        let mut memory = FakeMemory(HashMap::new());

        assert!(field.pin(&mut memory, 777, 0x1111_2222));
        assert_eq!(field.current(&memory), Some(777));
    }

    #[test]
    fn test_pinner_marks_state_and_gates_next_process() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("currency_modified.state");
        let base = Address(0x7000_0000);
        let field = FieldDescriptor { value_offset: 0, key_offset: 4 }.resolve(base);
        let mut memory = FakeMemory(HashMap::new());
        memory.write_u32(Address(0x7000_0000), encode(10, 9));
        memory.write_u32(Address(0x7000_0004), 9);

        let mut pinner =
            CurrencyPinner::new(ModifiedState::new(state_path.clone()), Some(1_000_000));
        let outcome = pinner.on_update(CurrencyKind::Soft, Some(&field), &mut memory);
        assert_eq!(outcome, PinOutcome::Pinned { previous: Some(10), target: 1_000_000 });
        assert_eq!(field.current(&memory), Some(1_000_000));

        pinner.on_update(CurrencyKind::Hard, Some(&field), &mut memory);

        // A fresh pinner (new process) sees both flags and passes through.
        let mut next = CurrencyPinner::new(ModifiedState::new(state_path), Some(1_000_000));
        let outcome = next.on_update(CurrencyKind::Soft, Some(&field), &mut memory);
        assert_eq!(outcome, PinOutcome::PassThrough);
    }

    #[test]
    fn test_pinner_gate_is_checked_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = ModifiedState::new(dir.path().join("currency_modified.state"));
        let base = Address(0x7000_0000);
        let field = FieldDescriptor { value_offset: 0, key_offset: 4 }.resolve(base);
        let mut memory = FakeMemory(HashMap::new());

        let mut pinner = CurrencyPinner::new(state.clone(), Some(5));
        pinner.on_update(CurrencyKind::Soft, Some(&field), &mut memory);
        pinner.on_update(CurrencyKind::Hard, Some(&field), &mut memory);

        // Both flags are now on disk, but this process resolved its gate
        // before the first rewrite and keeps pinning.
        let outcome = pinner.on_update(CurrencyKind::Soft, Some(&field), &mut memory);
        assert!(matches!(outcome, PinOutcome::Pinned { .. }));
    }

    #[test]
    fn test_pinner_without_target_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let state = ModifiedState::new(dir.path().join("currency_modified.state"));
        let mut memory = FakeMemory(HashMap::new());
        let base = Address(0x7000_0000);
        let field = FieldDescriptor { value_offset: 0, key_offset: 4 }.resolve(base);

        let mut pinner = CurrencyPinner::new(state, None);
        let outcome = pinner.on_update(CurrencyKind::Soft, Some(&field), &mut memory);
        assert_eq!(outcome, PinOutcome::Unavailable);
    }

    #[test]
    fn test_split_payload_extracts_json_tail() {
        assert_eq!(split_payload("0|ok|{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(split_payload("0|ok|"), None);
        assert_eq!(split_payload("no separators"), None);
        assert_eq!(split_payload("only|one"), None);
        // The tail may itself contain separators.
        assert_eq!(split_payload("1|2|{\"v\":\"a|b\"}"), Some("{\"v\":\"a|b\"}"));
    }

    #[test]
    fn test_response_observer_keeps_latest_tail() {
        let mut observer = ResponseObserver::default();
        assert_eq!(observer.on_response("1|x|{\"n\":1}"), Some("{\"n\":1}"));
        observer.on_response("not a payload");
        // Non-payload bodies leave the last JSON in place.
        assert_eq!(observer.last_json(), Some("{\"n\":1}"));
        observer.on_response("2|y|{\"n\":2}");
        assert_eq!(observer.last_json(), Some("{\"n\":2}"));
    }
}
