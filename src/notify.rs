//! Fire-and-forget event delivery.
//!
//! The engine emits a `WorkflowEvent` after each state change it wants the
//! outside world to see. Delivery is best-effort by contract: a sink failure
//! is logged and swallowed, never propagated into the state transition that
//! produced the event.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{Actor, Deliverable, Phase, Project};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    ProjectCreated {
        project: Project,
    },
    PhaseActivated {
        phase: Phase,
    },
    DeliverableGenerated {
        deliverable: Deliverable,
    },
    ApprovalRecorded {
        deliverable: Deliverable,
        actor: Actor,
        approved: bool,
    },
    PhaseCompleted {
        phase: Phase,
    },
    ReportCompiled {
        phase_id: i64,
        report_id: i64,
    },
    ProjectCompleted {
        project: Project,
    },
}

pub trait NotificationSink: Send + Sync {
    /// Deliver an event for a project. Implementations must not block the
    /// caller and must not fail it: swallow and log.
    fn notify(&self, project_id: i64, event: &WorkflowEvent);
}

/// Sink backed by a tokio broadcast channel, feeding live dashboard
/// connections. Send errors mean no receivers are subscribed — a normal
/// condition, ignored.
pub struct BroadcastSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, project_id: i64, event: &WorkflowEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => {
                tracing::warn!(project_id, error = %e, "failed to serialize workflow event");
            }
        }
    }
}

/// Sink that discards every event. Useful when no dashboard is attached.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _project_id: i64, _event: &WorkflowEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhaseStatus;

    fn sample_phase() -> Phase {
        Phase {
            id: 3,
            project_id: 1,
            phase_number: 2,
            name: "Market research".into(),
            status: PhaseStatus::Completed,
            team_id: 1,
            started_at: Some("2026-08-01 10:00:00".into()),
            completed_at: Some("2026-08-02 09:30:00".into()),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WorkflowEvent::PhaseCompleted {
            phase: sample_phase(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PhaseCompleted\""));
        assert!(json.contains("\"phase_number\":2"));
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();

        sink.notify(1, &WorkflowEvent::PhaseCompleted { phase: sample_phase() });

        let received = rx.recv().await.unwrap();
        assert!(received.contains("PhaseCompleted"));
    }

    #[test]
    fn test_broadcast_sink_without_receivers_is_silent() {
        let sink = BroadcastSink::new(16);
        // No subscriber: must not panic or error.
        sink.notify(1, &WorkflowEvent::PhaseCompleted { phase: sample_phase() });
    }
}
