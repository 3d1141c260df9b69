// trace.rs — Decision traces.
//
// Every round records the protocol states it passed through and what each
// one found, so a decision can be explained after the fact. Traces are plain
// serde data and export to JSON for audit logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{Event, EventKind};

/// The states of the per-event decision protocol, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    Start,
    MergeChildren,
    PositiveFastPath,
    PositiveSearch,
    ResultFastPath,
    ResultSearch,
    NegativeCheck,
}

/// One step of a decision round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub state: ProtocolState,
    /// What the step checked or found.
    pub detail: String,
    /// Whether the round ended here.
    pub terminal: bool,
}

/// The outcome of a round in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TraceOutcome {
    Allow,
    Promoted { signature: String },
    Denied { signature: String },
    ResultAssigned { value: String },
    ResultStored { value: String },
}

/// Full record of one decision round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub round_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub signature: String,
    pub kind: EventKind,
    /// Rounds already in progress when this one started (0 = top level).
    pub nesting: usize,
    pub steps: Vec<ProtocolStep>,
    pub outcome: Option<TraceOutcome>,
}

impl DecisionTrace {
    pub fn begin(event: &Event, nesting: usize) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            started_at: Utc::now(),
            signature: event.pending_signature().to_string(),
            kind: event.kind(),
            nesting,
            steps: Vec::new(),
            outcome: None,
        }
    }

    pub fn step(&mut self, state: ProtocolState, detail: impl Into<String>) {
        self.steps.push(ProtocolStep {
            state,
            detail: detail.into(),
            terminal: false,
        });
    }

    /// Record the final step and the outcome.
    pub fn finish(&mut self, state: ProtocolState, detail: impl Into<String>, outcome: TraceOutcome) {
        self.steps.push(ProtocolStep {
            state,
            detail: detail.into(),
            terminal: true,
        });
        self.outcome = Some(outcome);
    }

    /// States visited, in order.
    pub fn states(&self) -> Vec<ProtocolState> {
        self.steps.iter().map(|s| s.state).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_records_terminal_step() {
        let mut trace = DecisionTrace::begin(&Event::action("pkg.Foo.bar()"), 0);
        trace.step(ProtocolState::Start, "pushed action");
        trace.finish(
            ProtocolState::MergeChildren,
            "no policy has an opinion",
            TraceOutcome::Allow,
        );
        assert_eq!(
            trace.states(),
            vec![ProtocolState::Start, ProtocolState::MergeChildren]
        );
        assert!(trace.steps.last().unwrap().terminal);
        assert!(!trace.steps[0].terminal);
        assert_eq!(trace.outcome, Some(TraceOutcome::Allow));
    }

    #[test]
    fn trace_serializes_to_json() {
        let mut trace = DecisionTrace::begin(&Event::action("pkg.Foo.secret()"), 1);
        trace.finish(
            ProtocolState::NegativeCheck,
            "negative automaton accepts pending action",
            TraceOutcome::Denied {
                signature: "pkg.Foo.secret()".into(),
            },
        );
        let json = trace.to_json().unwrap();
        assert!(json.contains("\"negative_check\""));
        assert!(json.contains("\"outcome\": \"denied\""));

        let restored: DecisionTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.round_id, trace.round_id);
        assert_eq!(restored.nesting, 1);
        assert_eq!(restored.kind, EventKind::Action);
    }
}
