//! Dispatch report export.
//!
//! A machine-readable record of what the agent did to the process: which
//! engine it identified, which hooks installed, and why the rest did not.
//! Written as JSON next to the caches so a session can be inspected after
//! the fact without trawling logcat.

use serde::Serialize;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to serialize dispatch report: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Address resolved and patch accepted.
    Installed,
    /// No resolution strategy found the target.
    ResolveFailed,
    /// Address resolved but the interception primitive rejected the patch.
    InstallFailed,
    /// Step not applicable (e.g. no offset configured for this build).
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub hook: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub engine: String,
    pub module: String,
    pub steps: Vec<StepOutcome>,
}

impl DispatchReport {
    #[must_use]
    pub fn installed(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Installed).count()
    }

    /// Serialize the report as pretty JSON.
    ///
    /// # Errors
    /// Serialization or write failure; the agent logs it and moves on.
    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_with_counts() {
        let report = DispatchReport {
            engine: "Cocos2d-js (JavaScript)".to_string(),
            module: "libcocos2djs.so".to_string(),
            steps: vec![
                StepOutcome {
                    hook: "script_eval".to_string(),
                    status: StepStatus::Installed,
                    address: Some("0x7a00001000".to_string()),
                    detail: None,
                },
                StepOutcome {
                    hook: "send_data".to_string(),
                    status: StepStatus::Skipped,
                    address: None,
                    detail: Some("no offset configured".to_string()),
                },
            ],
        };

        assert_eq!(report.installed(), 1);

        let mut out = Vec::new();
        report.write_json(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"script_eval\""));
        assert!(text.contains("\"installed\""));
        assert!(text.contains("\"no offset configured\""));
    }
}
