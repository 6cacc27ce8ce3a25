//! Report compilation for completed phases.
//!
//! Aggregates a phase's deliverable artifacts and feedback trails into one
//! consolidated record with summary metrics, plus an executive summary from
//! the reviewer adapter — degrading to a templated summary when that call
//! fails. Compilation is idempotent: the report row is keyed on the phase
//! and recompiling overwrites it.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::errors::{WorkflowError, WorkflowResult};
use crate::models::{ConsolidatedReport, Deliverable, FeedbackEntry, Phase};
use crate::reviewer::ReviewerAdapter;
use crate::store::DbHandle;

const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ReportCompiler {
    db: DbHandle,
    reviewer: Arc<dyn ReviewerAdapter>,
}

impl ReportCompiler {
    pub fn new(db: DbHandle, reviewer: Arc<dyn ReviewerAdapter>) -> Self {
        Self { db, reviewer }
    }

    pub async fn compile(&self, phase_id: i64) -> WorkflowResult<ConsolidatedReport> {
        let (phase, deliverables, feedback) = self
            .db
            .call(move |db| {
                let phase = db.get_phase(phase_id)?;
                let Some(phase) = phase else {
                    return Ok((None, Vec::new(), Vec::new()));
                };
                let deliverables = db.list_deliverables(phase_id)?;
                let mut feedback = Vec::new();
                for d in &deliverables {
                    feedback.push(db.list_feedback(d.id)?);
                }
                Ok((Some(phase), deliverables, feedback))
            })
            .await?;

        let phase = phase.ok_or_else(|| WorkflowError::not_found("phase", phase_id))?;

        let body = build_body(&deliverables, &feedback);
        let deliverable_count = deliverables.len() as i64;
        let artifact_count = deliverables
            .iter()
            .filter(|d| d.generated_content.is_some())
            .count() as i64;
        let duration_secs = phase_duration_secs(&phase);

        let executive_summary = match self.reviewer.summarize(&phase, &deliverables).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => templated_summary(&phase, deliverable_count, artifact_count),
            Err(e) => {
                tracing::warn!(
                    phase_id,
                    error = %e,
                    "executive summary call failed, using templated summary"
                );
                templated_summary(&phase, deliverable_count, artifact_count)
            }
        };

        let report = self
            .db
            .call(move |db| {
                db.upsert_report(
                    phase_id,
                    &executive_summary,
                    &body,
                    deliverable_count,
                    artifact_count,
                    duration_secs,
                )
            })
            .await?;

        tracing::info!(phase_id, report_id = report.id, "phase report compiled");
        Ok(report)
    }
}

fn build_body(deliverables: &[Deliverable], feedback: &[Vec<FeedbackEntry>]) -> serde_json::Value {
    let entries: Vec<_> = deliverables
        .iter()
        .zip(feedback)
        .map(|(d, trail)| {
            json!({
                "title": d.title,
                "kind": d.kind,
                "status": d.status,
                "content": d.generated_content,
                "feedback": trail
                    .iter()
                    .map(|f| json!({
                        "actor": f.actor,
                        "comment": f.comment,
                        "at": f.created_at,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "deliverables": entries })
}

fn templated_summary(phase: &Phase, deliverable_count: i64, artifact_count: i64) -> String {
    format!(
        "Phase '{}' completed with {} deliverables ({} with generated artifacts).",
        phase.name, deliverable_count, artifact_count
    )
}

/// Wall-clock seconds between the phase's start and completion stamps, when
/// both were recorded in the store's timestamp format.
fn phase_duration_secs(phase: &Phase) -> Option<i64> {
    let started = phase.started_at.as_deref()?;
    let completed = phase.completed_at.as_deref()?;
    let started = NaiveDateTime::parse_from_str(started, SQLITE_TIMESTAMP_FORMAT).ok()?;
    let completed = NaiveDateTime::parse_from_str(completed, SQLITE_TIMESTAMP_FORMAT).ok()?;
    Some((completed - started).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, DeliverableStatus, PhaseStatus};
    use crate::reviewer::{ReviewVerdict, StaticReviewer};
    use crate::store::WorkflowDb;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FailingReviewer;

    #[async_trait]
    impl ReviewerAdapter for FailingReviewer {
        async fn generate(&self, _: &Deliverable, _: Option<&str>) -> Result<String> {
            anyhow::bail!("model unavailable")
        }
        async fn review(&self, _: &Deliverable) -> Result<ReviewVerdict> {
            anyhow::bail!("model unavailable")
        }
        async fn summarize(&self, _: &Phase, _: &[Deliverable]) -> Result<String> {
            anyhow::bail!("model unavailable")
        }
    }

    async fn seeded_phase(db: &DbHandle) -> i64 {
        db.call(|db| {
            let project = db.create_project("Acme", 1)?;
            let team = db.create_team(project.id, "Acme team")?;
            let phase = db.create_phase(project.id, 1, "Discovery", team.id, &[])?;
            db.activate_phase_row(phase.id)?;
            let d1 = db.create_deliverable(phase.id, "Vision statement", "vision_statement")?;
            let d2 = db.create_deliverable(phase.id, "Competitor scan", "competitor_scan")?;
            db.record_generation(d1.id, "We build robots.", false)?;
            db.append_feedback(d1.id, Actor::Reviewer, "Crisp")?;
            db.apply_approval(d1.id, true, true, DeliverableStatus::Approved)?;
            db.apply_approval(d2.id, true, true, DeliverableStatus::Approved)?;
            db.complete_phase_if_active(phase.id)?;
            Ok(phase.id)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_compile_aggregates_deliverables() {
        let db = DbHandle::new(WorkflowDb::new_in_memory().unwrap());
        let phase_id = seeded_phase(&db).await;
        let compiler = ReportCompiler::new(db.clone(), Arc::new(StaticReviewer));

        let report = compiler.compile(phase_id).await.unwrap();
        assert_eq!(report.deliverable_count, 2);
        assert_eq!(report.artifact_count, 1);
        assert!(report.duration_secs.is_some());
        assert!(report.executive_summary.contains("Discovery"));

        let body = report.body.get("deliverables").unwrap().as_array().unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0]["title"], "Vision statement");
        assert_eq!(body[0]["feedback"][0]["comment"], "Crisp");
    }

    #[tokio::test]
    async fn test_compile_degrades_to_templated_summary() {
        let db = DbHandle::new(WorkflowDb::new_in_memory().unwrap());
        let phase_id = seeded_phase(&db).await;
        let compiler = ReportCompiler::new(db.clone(), Arc::new(FailingReviewer));

        let report = compiler.compile(phase_id).await.unwrap();
        assert!(
            report.executive_summary.contains("completed with 2 deliverables"),
            "expected templated summary, got: {}",
            report.executive_summary
        );
    }

    #[tokio::test]
    async fn test_compile_is_idempotent() {
        let db = DbHandle::new(WorkflowDb::new_in_memory().unwrap());
        let phase_id = seeded_phase(&db).await;
        let compiler = ReportCompiler::new(db.clone(), Arc::new(StaticReviewer));

        let first = compiler.compile(phase_id).await.unwrap();
        let second = compiler.compile(phase_id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.deliverable_count, second.deliverable_count);
    }

    #[tokio::test]
    async fn test_compile_missing_phase_is_not_found() {
        let db = DbHandle::new(WorkflowDb::new_in_memory().unwrap());
        let compiler = ReportCompiler::new(db, Arc::new(StaticReviewer));

        let err = compiler.compile(999).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn test_phase_duration_parsing() {
        let phase = Phase {
            id: 1,
            project_id: 1,
            phase_number: 1,
            name: "Discovery".into(),
            status: PhaseStatus::Completed,
            team_id: 1,
            started_at: Some("2026-08-01 10:00:00".into()),
            completed_at: Some("2026-08-01 11:30:00".into()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(phase_duration_secs(&phase), Some(5400));
    }
}
