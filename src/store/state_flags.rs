//! Flag file recording which currency paths have already been rewritten.
//!
//! One marker per line, each either present or absent:
//!
//! ```text
//! soft=1
//! hard=1
//! ```
//!
//! Each hook site marks its own flag; a mark re-reads the file first so the
//! other site's flag survives the rewrite. Only when both markers are
//! present does the "already modified" gate suppress further injection.

use crate::domain::CurrencyKind;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ModifiedState {
    path: PathBuf,
}

impl ModifiedState {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read both markers. A missing or unreadable file means neither path
    /// has been modified yet.
    #[must_use]
    pub fn flags(&self) -> (bool, bool) {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return (false, false);
        };
        let mut soft = false;
        let mut hard = false;
        for line in content.lines() {
            match line.trim() {
                "soft=1" => soft = true,
                "hard=1" => hard = true,
                _ => {}
            }
        }
        (soft, hard)
    }

    /// True only when both currency paths have been rewritten.
    #[must_use]
    pub fn is_fully_modified(&self) -> bool {
        let (soft, hard) = self.flags();
        soft && hard
    }

    /// Record that `kind` has been rewritten, preserving the other marker.
    ///
    /// Write failures are logged and swallowed; worst case the rewrite
    /// happens again on the next run.
    pub fn mark(&self, kind: CurrencyKind) {
        let (mut soft, mut hard) = self.flags();
        match kind {
            CurrencyKind::Soft => soft = true,
            CurrencyKind::Hard => hard = true,
        }

        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("cannot create state directory {}: {e}", parent.display());
                return;
            }
        }

        let mut out = String::new();
        if soft {
            out.push_str("soft=1\n");
        }
        if hard {
            out.push_str("hard=1\n");
        }

        match fs::write(&self.path, out) {
            Ok(()) => info!("marked {kind} currency as modified"),
            Err(e) => warn!("cannot write state file {}: {e}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_in(dir: &tempfile::TempDir) -> ModifiedState {
        ModifiedState::new(dir.path().join("currency_modified.state"))
    }

    #[test]
    fn test_fresh_state_is_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        assert_eq!(state.flags(), (false, false));
        assert!(!state.is_fully_modified());
    }

    #[test]
    fn test_single_mark_does_not_trip_gate() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);

        state.mark(CurrencyKind::Soft);
        assert_eq!(state.flags(), (true, false));
        assert!(!state.is_fully_modified());
    }

    #[test]
    fn test_marks_merge_in_either_order() {
        for first in [CurrencyKind::Soft, CurrencyKind::Hard] {
            let dir = tempfile::tempdir().unwrap();
            let state = state_in(&dir);

            let second = match first {
                CurrencyKind::Soft => CurrencyKind::Hard,
                CurrencyKind::Hard => CurrencyKind::Soft,
            };
            state.mark(first);
            state.mark(second);

            assert_eq!(state.flags(), (true, true));
            assert!(state.is_fully_modified());
        }
    }

    #[test]
    fn test_remark_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);

        state.mark(CurrencyKind::Hard);
        state.mark(CurrencyKind::Hard);

        let content = fs::read_to_string(dir.path().join("currency_modified.state")).unwrap();
        assert_eq!(content, "hard=1\n");
    }
}
