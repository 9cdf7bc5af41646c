//! Correlating native JSON object handles with their originating text.
//!
//! The host parses response payloads into opaque native objects; by the
//! time the parse hook sees one, the source text is gone. Two cooperating
//! hook sites keep a process-lifetime map: creation inserts
//! `handle -> text`, disposal removes it. The parse hook consults the map
//! for diagnostics only: an untracked handle is expected (created before
//! hooking began, or text over the ceiling) and simply skips the output.

use crate::domain::JsonHandle;
use log::debug;
use std::collections::HashMap;

/// Texts at or above this many bytes are never tracked. Bounds the map
/// against pathological payloads; entries are skipped, not truncated.
pub const DEFAULT_TEXT_CEILING: usize = 50_000;

#[derive(Debug)]
pub struct JsonHandleTracker {
    map: HashMap<JsonHandle, String>,
    ceiling: usize,
}

impl JsonHandleTracker {
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self { map: HashMap::new(), ceiling }
    }

    /// Record a freshly created object. Returns whether the handle is now
    /// tracked.
    pub fn on_create(&mut self, handle: JsonHandle, text: &str) -> bool {
        if handle.0 == 0 || text.is_empty() || text.len() >= self.ceiling {
            debug!("json {handle} not tracked (len {})", text.len());
            return false;
        }
        self.map.insert(handle, text.to_string());
        debug!("json {handle} tracked, {} bytes", text.len());
        true
    }

    /// Forget a disposed object. Removing an absent handle is a no-op.
    pub fn on_dispose(&mut self, handle: JsonHandle) {
        if self.map.remove(&handle).is_some() {
            debug!("json {handle} released");
        }
    }

    /// Source text for a live tracked handle.
    #[must_use]
    pub fn text_of(&self, handle: JsonHandle) -> Option<&str> {
        self.map.get(&handle).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for JsonHandleTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_CEILING)
    }
}
