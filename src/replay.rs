//! Request cache & replay.
//!
//! The engine watches one distinguished request id (the anchor request).
//! The first time it passes through with no record on disk, the full
//! parameter tuple is persisted and the call proceeds untouched. Every
//! later sighting (same id, or any call whose payload carries the
//! fingerprint markers) has its three string arguments replaced wholesale
//! with the persisted triple before the call is forwarded.
//!
//! There is no in-memory state: record presence on disk is the only state
//! signal, which makes the engine stateless across restarts but
//! persistently stateful by content. Every failure path degrades to
//! forwarding the original parameters.

use crate::store::{CacheLayout, RequestRecord};
use log::{debug, info, warn};

/// Content fingerprint for "same request in disguise" detection.
///
/// A payload matches when it contains every marker substring. The marker
/// set is policy, not protocol: it is a heuristic over field names of the
/// sensitive payload and can produce false positives on unrelated requests
/// that happen to mention all markers.
#[derive(Debug, Clone)]
pub struct FingerprintPolicy {
    markers: Vec<String>,
}

impl FingerprintPolicy {
    #[must_use]
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    /// An empty marker set matches nothing.
    #[must_use]
    pub fn matches(&self, payload: &str) -> bool {
        !self.markers.is_empty() && self.markers.iter().all(|m| payload.contains(m.as_str()))
    }
}

impl Default for FingerprintPolicy {
    /// Field markers of the account-state payload the anchor request carries.
    fn default() -> Self {
        Self::new(vec!["uid".to_string(), "money".to_string(), "gold".to_string()])
    }
}

/// What the engine did with one intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// First sighting of the anchor id; parameters persisted, call
    /// forwarded unchanged.
    Captured,
    /// String arguments substituted from the persisted record.
    Replayed,
    /// Forwarded untouched (no match, or a store failure).
    Forwarded,
}

pub struct ReplayEngine {
    layout: CacheLayout,
    anchor_id: i32,
    policy: FingerprintPolicy,
}

impl ReplayEngine {
    #[must_use]
    pub fn new(layout: CacheLayout, anchor_id: i32, policy: FingerprintPolicy) -> Self {
        Self { layout, anchor_id, policy }
    }

    #[must_use]
    pub fn anchor_id(&self) -> i32 {
        self.anchor_id
    }

    /// Run one intercepted call through the capture/replay state machine,
    /// returning the tuple to forward to the original function.
    pub fn process(&self, request: RequestRecord) -> (RequestRecord, ReplayOutcome) {
        if request.request_id == self.anchor_id {
            return self.process_anchor(request);
        }

        let payload = request.string_args[0].as_deref().unwrap_or("");
        if self.policy.matches(payload) {
            debug!("request {} carries fingerprint markers", request.request_id);
            return self.substitute(request);
        }

        (request, ReplayOutcome::Forwarded)
    }

    fn process_anchor(&self, request: RequestRecord) -> (RequestRecord, ReplayOutcome) {
        let path = self.layout.request_record_path(self.anchor_id);

        if path.exists() {
            return self.substitute(request);
        }

        // First sighting: capture is observational, the call keeps its own
        // parameters.
        match request.save(&path) {
            Ok(()) => {
                info!("anchor request {} captured", self.anchor_id);
                (request, ReplayOutcome::Captured)
            }
            Err(e) => {
                warn!("cannot persist anchor request {}: {e}", self.anchor_id);
                (request, ReplayOutcome::Forwarded)
            }
        }
    }

    /// Replace the string triple wholesale; everything else stays the
    /// caller's own.
    fn substitute(&self, mut request: RequestRecord) -> (RequestRecord, ReplayOutcome) {
        let path = self.layout.request_record_path(self.anchor_id);
        let cached = match RequestRecord::load(&path) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("cached request unusable, forwarding original parameters: {e}");
                return (request, ReplayOutcome::Forwarded);
            }
        };

        for (slot, (original, replacement)) in
            request.string_args.iter_mut().zip(cached.string_args).enumerate()
        {
            info!(
                "  string{slot}: {} -> {}",
                preview(original.as_deref()),
                preview(replacement.as_deref())
            );
            *original = replacement;
        }
        info!(
            "request {} forwarded with cached parameters of {}",
            request.request_id, self.anchor_id
        );

        (request, ReplayOutcome::Replayed)
    }
}

/// Short loggable rendering of a string argument.
fn preview(value: Option<&str>) -> String {
    match value {
        None => "(null)".to_string(),
        Some("") => "(empty)".to_string(),
        Some(s) if s.len() > 100 => {
            let head: String = s.chars().take(100).collect();
            format!("[len={}] {head}...", s.len())
        }
        Some(s) => s.to_string(),
    }
}
