//! Tooling-facing snapshot of the relayout core.

use crate::orchestrator::PassOutcome;
use crate::popup::PopupInfo;
use crate::relayout::RelayoutReport;
use crate::state::LayoutState;
use crate::validator::ConstraintReport;
use anyhow::{Context as _, Result};
use render_tree::NodeKey;
use serde::Serialize;

/// Monotonic counters since the context was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub scans: u64,
    pub cache_hits: u64,
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_restored: u64,
    pub passes_failed: u64,
    /// Validations whose token was superseded or cancelled before they ran.
    pub stale_dropped: u64,
    pub signals_emitted: u64,
    pub timers_purged: u64,
    pub resets: u64,
    pub rejected_transitions: u64,
    pub superseded_tokens: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StateEntry {
    pub root: NodeKey,
    pub state: LayoutState,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub active_popup: Option<PopupInfo>,
    pub states: Vec<StateEntry>,
    pub last_relayout: Option<RelayoutReport>,
    pub last_report: Option<ConstraintReport>,
    pub last_outcome: Option<PassOutcome>,
    pub counters: Counters,
    /// Virtual scheduler time.
    pub now_ms: f64,
    pub pending_timers: usize,
}

impl DiagnosticReport {
    /// Serialize the report as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if a value cannot be represented in JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize diagnostic report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Field names follow the camelCase convention used by the constraint report.
    ///
    /// # Errors
    /// Returns an error if serialization or parsing fails.
    #[test]
    fn serializes_camel_case() -> Result<()> {
        let report = DiagnosticReport {
            active_popup: None,
            states: vec![StateEntry {
                root: NodeKey(4),
                state: LayoutState::WaitingValidation,
            }],
            last_relayout: None,
            last_report: None,
            last_outcome: Some(PassOutcome::AwaitingValidation),
            counters: Counters {
                cache_hits: 2,
                ..Counters::default()
            },
            now_ms: 16.0,
            pending_timers: 1,
        };
        let value: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
        assert_eq!(value["counters"]["cacheHits"], 2);
        assert_eq!(value["states"][0]["state"], "WaitingValidation");
        assert_eq!(value["lastOutcome"], "AwaitingValidation");
        assert!(value["activePopup"].is_null());
        Ok(())
    }
}
