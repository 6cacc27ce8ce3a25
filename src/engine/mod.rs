//! The phase state machine: every mutation of workflow state funnels
//! through the operations here.
//!
//! Transition rules:
//! - phases run strictly in order; activation checks the predecessor and is
//!   guarded by a conditional update on `pending`
//! - the `active → completed` flip is a compare-and-swap — under concurrent
//!   `try_advance` calls exactly one caller wins and runs the side effects
//!   (team deactivation, report compilation, next-phase activation,
//!   notification)
//! - side-effect failures are logged and surfaced but never roll back the
//!   completed status; each side effect is independently re-triggerable
//!
//! Reviewer and sink calls are issued outside the store mutex; their
//! failures surface as `Dependency` (reviewer) or are swallowed (sink).

use std::sync::Arc;
use std::time::Duration;

use crate::errors::{WorkflowError, WorkflowResult};
use crate::gate;
use crate::models::*;
use crate::notify::{NotificationSink, WorkflowEvent};
use crate::report::ReportCompiler;
use crate::reviewer::ReviewerAdapter;
use crate::store::DbHandle;
use crate::team::TeamLifecycleController;
use crate::template::{MemberTemplate, PhaseTemplate};

pub struct PhaseStateMachine {
    db: DbHandle,
    reviewer: Arc<dyn ReviewerAdapter>,
    sink: Arc<dyn NotificationSink>,
    teams: TeamLifecycleController,
    compiler: ReportCompiler,
    generation_timeout: Duration,
}

impl PhaseStateMachine {
    pub fn new(
        db: DbHandle,
        reviewer: Arc<dyn ReviewerAdapter>,
        sink: Arc<dyn NotificationSink>,
        generation_timeout: Duration,
    ) -> Self {
        let teams = TeamLifecycleController::new(db.clone());
        let compiler = ReportCompiler::new(db.clone(), Arc::clone(&reviewer));
        Self {
            db,
            reviewer,
            sink,
            teams,
            compiler,
            generation_timeout,
        }
    }

    pub fn teams(&self) -> &TeamLifecycleController {
        &self.teams
    }

    pub fn compiler(&self) -> &ReportCompiler {
        &self.compiler
    }

    // ── Project lifecycle ─────────────────────────────────────────────

    /// Create a project with its phases and team in one transaction, then
    /// activate phase 1 (instantiating its deliverables).
    pub async fn create_project(
        &self,
        name: &str,
        phases: Vec<PhaseTemplate>,
        roster: Vec<MemberTemplate>,
    ) -> WorkflowResult<Project> {
        if phases.is_empty() {
            return Err(WorkflowError::invalid_state(
                "project",
                0,
                "at least one phase template is required",
            ));
        }
        for (i, t) in phases.iter().enumerate() {
            if t.deliverables.is_empty() {
                return Err(WorkflowError::invalid_state(
                    "phase template",
                    (i + 1) as i64,
                    format!("phase '{}' defines no deliverables", t.name),
                ));
            }
        }

        let name_owned = name.to_string();
        let project = self
            .db
            .call(move |db| {
                db.in_transaction(|db| {
                    let project = db.create_project(&name_owned, phases.len() as i32)?;
                    let team = db.create_team(project.id, &format!("{} team", name_owned))?;
                    for m in &roster {
                        db.create_team_member(team.id, &m.name, &m.role)?;
                    }
                    for (i, t) in phases.iter().enumerate() {
                        db.create_phase(
                            project.id,
                            (i + 1) as i32,
                            &t.name,
                            team.id,
                            &t.deliverables,
                        )?;
                    }
                    Ok(project)
                })
            })
            .await?;

        self.sink.notify(
            project.id,
            &WorkflowEvent::ProjectCreated {
                project: project.clone(),
            },
        );
        tracing::info!(project_id = project.id, name = %project.name, "project created");

        self.activate_phase(project.id, 1).await?;

        let project_id = project.id;
        self.db
            .call(move |db| db.get_project(project_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))
    }

    /// Activate a phase. Phases can never be skipped or activated out of
    /// order: the target must be `pending` and its predecessor `completed`.
    pub async fn activate_phase(
        &self,
        project_id: i64,
        phase_number: i32,
    ) -> WorkflowResult<Phase> {
        let project = self
            .db
            .call(move |db| db.get_project(project_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))?;
        if phase_number < 1 || phase_number > project.phase_count {
            return Err(WorkflowError::sequence(
                project_id,
                phase_number,
                format!("project has {} phases", project.phase_count),
            ));
        }

        let phase = self
            .db
            .call(move |db| db.get_phase_by_number(project_id, phase_number))
            .await?
            .ok_or_else(|| WorkflowError::not_found("phase", phase_number as i64))?;
        if phase.status != PhaseStatus::Pending {
            return Err(WorkflowError::sequence(
                project_id,
                phase_number,
                format!("phase is {}, expected pending", phase.status),
            ));
        }
        if phase_number > 1 {
            let prev = self
                .db
                .call(move |db| db.get_phase_by_number(project_id, phase_number - 1))
                .await?
                .ok_or_else(|| WorkflowError::not_found("phase", (phase_number - 1) as i64))?;
            if prev.status != PhaseStatus::Completed {
                return Err(WorkflowError::sequence(
                    project_id,
                    phase_number,
                    format!(
                        "phase {} is {}, not completed",
                        phase_number - 1,
                        prev.status
                    ),
                ));
            }
        }

        let phase_id = phase.id;
        let won = self
            .db
            .call(move |db| db.activate_phase_row(phase_id))
            .await?;
        if !won {
            // Lost a race with a concurrent activation.
            return Err(WorkflowError::sequence(
                project_id,
                phase_number,
                "phase is no longer pending",
            ));
        }

        let template = self.db.call(move |db| db.phase_template(phase_id)).await?;
        if template.is_empty() {
            self.db.call(move |db| db.block_phase(phase_id)).await?;
            tracing::error!(
                project_id,
                phase_number,
                "phase template defines no deliverables; phase blocked"
            );
            return Err(WorkflowError::invalid_state(
                "phase",
                phase_id,
                "template defines no deliverables",
            ));
        }
        self.db
            .call(move |db| {
                db.in_transaction(|db| {
                    for t in &template {
                        db.create_deliverable(phase_id, &t.title, &t.kind)?;
                    }
                    Ok(())
                })
            })
            .await?;

        self.teams.activate(phase.team_id).await?;

        let phase = self
            .db
            .call(move |db| db.get_phase(phase_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("phase", phase_id))?;
        tracing::info!(project_id, phase_number, phase_id, "phase activated");
        self.sink.notify(
            project_id,
            &WorkflowEvent::PhaseActivated {
                phase: phase.clone(),
            },
        );
        Ok(phase)
    }

    /// Try to complete the project's active phase. Idempotent and safe to
    /// call from pollers and approval hooks: "not ready" is a normal result.
    /// Under concurrent invocation the phase CAS picks exactly one winner to
    /// run the completion side effects.
    pub async fn try_advance(&self, project_id: i64) -> WorkflowResult<AdvanceOutcome> {
        let project = self
            .db
            .call(move |db| db.get_project(project_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))?;

        let Some(active) = self
            .db
            .call(move |db| db.find_active_phase(project_id))
            .await?
        else {
            return Ok(AdvanceOutcome::not_ready(project.is_complete()));
        };

        let phase_id = active.id;
        let deliverables = self
            .db
            .call(move |db| db.list_deliverables(phase_id))
            .await?;
        if !gate::phase_ready(&deliverables) {
            return Ok(AdvanceOutcome::not_ready(false));
        }

        // The critical section: only the caller that flips active →
        // completed proceeds to the side effects.
        let won = self
            .db
            .call(move |db| db.complete_phase_if_active(phase_id))
            .await?;
        if !won {
            return Ok(AdvanceOutcome::not_ready(false));
        }
        tracing::info!(project_id, phase_id, phase_number = active.phase_number, "phase completed");

        if let Err(e) = self.teams.deactivate(active.team_id).await {
            tracing::error!(project_id, team_id = active.team_id, error = %e,
                "team deactivation failed after phase completion");
        }

        let report_error = match self.compiler.compile(phase_id).await {
            Ok(report) => {
                self.sink.notify(
                    project_id,
                    &WorkflowEvent::ReportCompiled {
                        phase_id,
                        report_id: report.id,
                    },
                );
                None
            }
            Err(e) => {
                // The phase stays completed: recompiling is safe, reopening
                // a completed phase is not.
                tracing::error!(project_id, phase_id, error = %e, "report compilation failed");
                Some(e.to_string())
            }
        };

        let completed = self
            .db
            .call(move |db| db.get_phase(phase_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("phase", phase_id))?;

        let mut outcome = AdvanceOutcome {
            advanced: true,
            new_phase: None,
            project_complete: false,
            report_error,
        };

        if active.phase_number < project.phase_count {
            match self.activate_phase(project_id, active.phase_number + 1).await {
                Ok(next) => outcome.new_phase = Some(next),
                Err(e) => {
                    tracing::error!(project_id, error = %e, "next phase activation failed");
                }
            }
            self.sink.notify(
                project_id,
                &WorkflowEvent::PhaseCompleted { phase: completed },
            );
        } else {
            let project = self
                .db
                .call(move |db| db.mark_project_complete(project_id))
                .await?;
            outcome.project_complete = true;
            tracing::info!(project_id, "project complete");
            self.sink
                .notify(project_id, &WorkflowEvent::ProjectCompleted { project });
        }

        Ok(outcome)
    }

    // ── Deliverable operations ────────────────────────────────────────

    /// Generate (or regenerate) a deliverable's content through the
    /// reviewer adapter. The deliverable is marked `in_progress` before the
    /// call, so a timeout or adapter failure leaves it retryable there.
    pub async fn generate_deliverable(
        &self,
        deliverable_id: i64,
        feedback: Option<String>,
    ) -> WorkflowResult<Deliverable> {
        let deliverable = self.load_deliverable(deliverable_id).await?;
        self.require_active_phase(&deliverable).await?;

        let update = gate::plan_generation(&deliverable, feedback.is_some());

        self.db
            .call(move |db| db.set_deliverable_status(deliverable_id, DeliverableStatus::InProgress))
            .await?;

        let generated = tokio::time::timeout(
            self.generation_timeout,
            self.reviewer.generate(&deliverable, feedback.as_deref()),
        )
        .await
        .map_err(|_| {
            WorkflowError::Dependency(anyhow::anyhow!(
                "content generation timed out after {:?}",
                self.generation_timeout
            ))
        })?
        .map_err(WorkflowError::Dependency)?;

        let reset_flags = update.reset_flags;
        let feedback_owned = feedback.clone();
        self.db
            .call(move |db| {
                db.record_generation(deliverable_id, &generated, reset_flags)?;
                if let Some(fb) = &feedback_owned {
                    db.append_feedback(deliverable_id, Actor::Owner, fb)?;
                }
                Ok(())
            })
            .await?;

        let deliverable = self.load_deliverable(deliverable_id).await?;
        tracing::info!(
            deliverable_id,
            regeneration = feedback.is_some(),
            "deliverable content generated"
        );
        self.notify_for(&deliverable, |d| WorkflowEvent::DeliverableGenerated {
            deliverable: d,
        })
        .await?;
        Ok(deliverable)
    }

    /// Record one party's approval verdict. The latest call per actor wins;
    /// a rejection is sticky until the deliverable is regenerated.
    pub async fn record_approval(
        &self,
        deliverable_id: i64,
        actor: Actor,
        approved: bool,
        comment: Option<String>,
    ) -> WorkflowResult<Deliverable> {
        let deliverable = self.load_deliverable(deliverable_id).await?;
        self.require_active_phase(&deliverable).await?;

        let update = gate::plan_approval(&deliverable, actor, approved)?;

        self.db
            .call(move |db| {
                db.apply_approval(
                    deliverable_id,
                    update.reviewer_approved,
                    update.owner_approved,
                    update.status,
                )?;
                if let Some(c) = &comment {
                    db.append_feedback(deliverable_id, actor, c)?;
                }
                Ok(())
            })
            .await?;

        let deliverable = self.load_deliverable(deliverable_id).await?;
        tracing::info!(deliverable_id, actor = %actor, approved, "approval recorded");
        self.notify_for(&deliverable, |d| WorkflowEvent::ApprovalRecorded {
            deliverable: d,
            actor,
            approved,
        })
        .await?;
        Ok(deliverable)
    }

    /// Run the automated review and record its verdict as the reviewer's
    /// approval. An adapter failure surfaces as `Dependency` — never an
    /// implicit approval.
    pub async fn request_review(&self, deliverable_id: i64) -> WorkflowResult<Deliverable> {
        let deliverable = self.load_deliverable(deliverable_id).await?;
        self.require_active_phase(&deliverable).await?;
        if deliverable.generated_content.is_none() {
            return Err(WorkflowError::invalid_state(
                "deliverable",
                deliverable_id,
                "no generated content to review",
            ));
        }

        let verdict = self
            .reviewer
            .review(&deliverable)
            .await
            .map_err(WorkflowError::Dependency)?;
        let comment = format!("[quality {:.2}] {}", verdict.quality_score, verdict.feedback);
        self.record_approval(deliverable_id, Actor::Reviewer, verdict.approved, Some(comment))
            .await
    }

    // ── Read accessors ────────────────────────────────────────────────

    pub async fn get_project(&self, project_id: i64) -> WorkflowResult<Project> {
        self.db
            .call(move |db| db.get_project(project_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("project", project_id))
    }

    pub async fn list_projects(&self) -> WorkflowResult<Vec<Project>> {
        Ok(self.db.call(|db| db.list_projects()).await?)
    }

    pub async fn get_deliverable(
        &self,
        deliverable_id: i64,
    ) -> WorkflowResult<(Deliverable, Vec<FeedbackEntry>)> {
        let deliverable = self.load_deliverable(deliverable_id).await?;
        let feedback = self
            .db
            .call(move |db| db.list_feedback(deliverable_id))
            .await?;
        Ok((deliverable, feedback))
    }

    pub async fn list_deliverables(&self, phase_id: i64) -> WorkflowResult<Vec<Deliverable>> {
        Ok(self
            .db
            .call(move |db| db.list_deliverables(phase_id))
            .await?)
    }

    pub async fn get_report(&self, phase_id: i64) -> WorkflowResult<Option<ConsolidatedReport>> {
        Ok(self.db.call(move |db| db.get_report(phase_id)).await?)
    }

    /// Per-phase completion detail plus an overall percentage. Completed
    /// phases count in full; the active phase contributes its approved
    /// fraction.
    pub async fn project_progress(&self, project_id: i64) -> WorkflowResult<ProjectProgress> {
        let project = self.get_project(project_id).await?;
        let phases = self.db.call(move |db| db.list_phases(project_id)).await?;

        let mut detail = Vec::with_capacity(phases.len());
        let mut score = 0.0f64;
        for phase in phases {
            let phase_id = phase.id;
            let deliverables = self
                .db
                .call(move |db| db.list_deliverables(phase_id))
                .await?;
            let total = deliverables.len();
            let approved = deliverables
                .iter()
                .filter(|d| d.status == DeliverableStatus::Approved)
                .count();
            score += match phase.status {
                PhaseStatus::Completed => 1.0,
                PhaseStatus::Active if total > 0 => approved as f64 / total as f64,
                _ => 0.0,
            };
            detail.push(PhaseProgress {
                phase,
                deliverable_total: total,
                deliverable_approved: approved,
            });
        }

        let overall_percent = if project.phase_count > 0 {
            ((score / project.phase_count as f64) * 100.0).round() as u8
        } else {
            0
        };

        Ok(ProjectProgress {
            project,
            phases: detail,
            overall_percent,
        })
    }

    // ── Internal helpers ──────────────────────────────────────────────

    async fn load_deliverable(&self, deliverable_id: i64) -> WorkflowResult<Deliverable> {
        self.db
            .call(move |db| db.get_deliverable(deliverable_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("deliverable", deliverable_id))
    }

    /// Deliverables are only mutable while their phase is active.
    async fn require_active_phase(&self, deliverable: &Deliverable) -> WorkflowResult<Phase> {
        let phase_id = deliverable.phase_id;
        let phase = self
            .db
            .call(move |db| db.get_phase(phase_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("phase", phase_id))?;
        if phase.status != PhaseStatus::Active {
            return Err(WorkflowError::invalid_state(
                "phase",
                phase.id,
                format!("phase is {}, expected active", phase.status),
            ));
        }
        Ok(phase)
    }

    async fn notify_for(
        &self,
        deliverable: &Deliverable,
        event: impl FnOnce(Deliverable) -> WorkflowEvent,
    ) -> WorkflowResult<()> {
        let phase_id = deliverable.phase_id;
        let phase = self
            .db
            .call(move |db| db.get_phase(phase_id))
            .await?
            .ok_or_else(|| WorkflowError::not_found("phase", phase_id))?;
        self.sink
            .notify(phase.project_id, &event(deliverable.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullSink;
    use crate::reviewer::{ReviewVerdict, StaticReviewer};
    use crate::store::WorkflowDb;
    use crate::template::{DeliverableTemplate, default_member_templates};
    use anyhow::Result;
    use async_trait::async_trait;

    fn two_phase_templates() -> Vec<PhaseTemplate> {
        vec![
            PhaseTemplate::new(
                "Discovery",
                vec![
                    DeliverableTemplate::new("Vision statement", "vision_statement"),
                    DeliverableTemplate::new("Competitor scan", "competitor_scan"),
                ],
            ),
            PhaseTemplate::new(
                "Market research",
                vec![DeliverableTemplate::new(
                    "Market research report",
                    "market_research",
                )],
            ),
        ]
    }

    fn engine() -> PhaseStateMachine {
        let db = DbHandle::new(WorkflowDb::new_in_memory().unwrap());
        PhaseStateMachine::new(
            db,
            Arc::new(StaticReviewer),
            Arc::new(NullSink),
            Duration::from_secs(5),
        )
    }

    async fn approve_both(engine: &PhaseStateMachine, deliverable_id: i64) {
        engine
            .record_approval(deliverable_id, Actor::Reviewer, true, None)
            .await
            .unwrap();
        engine
            .record_approval(deliverable_id, Actor::Owner, true, None)
            .await
            .unwrap();
    }

    struct SlowReviewer;

    #[async_trait]
    impl ReviewerAdapter for SlowReviewer {
        async fn generate(&self, _: &Deliverable, _: Option<&str>) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
        async fn review(&self, _: &Deliverable) -> Result<ReviewVerdict> {
            anyhow::bail!("unused")
        }
        async fn summarize(&self, _: &Phase, _: &[Deliverable]) -> Result<String> {
            anyhow::bail!("unused")
        }
    }

    #[tokio::test]
    async fn test_create_project_activates_phase_one() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();

        let progress = engine.project_progress(project.id).await.unwrap();
        assert_eq!(progress.phases.len(), 2);
        assert_eq!(progress.phases[0].phase.status, PhaseStatus::Active);
        assert_eq!(progress.phases[0].deliverable_total, 2);
        assert_eq!(progress.phases[1].phase.status, PhaseStatus::Pending);
        assert_eq!(progress.phases[1].deliverable_total, 0);
    }

    #[tokio::test]
    async fn test_create_project_rejects_empty_template() {
        let engine = engine();
        let err = engine
            .create_project(
                "Acme",
                vec![PhaseTemplate::new("Empty", vec![])],
                default_member_templates(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_activate_out_of_order_is_sequence_error() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();

        let err = engine.activate_phase(project.id, 2).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Sequence { phase_number: 2, .. }));
    }

    #[tokio::test]
    async fn test_generation_then_dual_approval() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        let phase_id = progress.phases[0].phase.id;
        let deliverables = engine.list_deliverables(phase_id).await.unwrap();
        let d = &deliverables[0];

        let generated = engine.generate_deliverable(d.id, None).await.unwrap();
        assert_eq!(generated.status, DeliverableStatus::Review);
        assert!(generated.generated_content.is_some());

        let after_reviewer = engine
            .record_approval(d.id, Actor::Reviewer, true, None)
            .await
            .unwrap();
        assert_eq!(after_reviewer.status, DeliverableStatus::Review);
        assert!(after_reviewer.reviewer_approved);

        let after_owner = engine
            .record_approval(d.id, Actor::Owner, true, Some("Ship it".into()))
            .await
            .unwrap();
        assert_eq!(after_owner.status, DeliverableStatus::Approved);

        let (_, feedback) = engine.get_deliverable(d.id).await.unwrap();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].comment, "Ship it");
    }

    #[tokio::test]
    async fn test_rejection_then_regeneration_resets_flags() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        let d = engine
            .list_deliverables(progress.phases[0].phase.id)
            .await
            .unwrap()
            .remove(0);

        engine.generate_deliverable(d.id, None).await.unwrap();
        engine
            .record_approval(d.id, Actor::Reviewer, true, None)
            .await
            .unwrap();
        let rejected = engine
            .record_approval(d.id, Actor::Owner, false, Some("Off-brand".into()))
            .await
            .unwrap();
        assert_eq!(rejected.status, DeliverableStatus::Rejected);
        assert!(rejected.reviewer_approved, "other party's flag is untouched");

        // Sticky: the owner cannot simply flip back to approved.
        let err = engine
            .record_approval(d.id, Actor::Owner, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));

        let regenerated = engine
            .generate_deliverable(d.id, Some("Match the brand voice".into()))
            .await
            .unwrap();
        assert_eq!(regenerated.status, DeliverableStatus::Review);
        assert!(!regenerated.reviewer_approved);
        assert!(!regenerated.owner_approved);
    }

    #[tokio::test]
    async fn test_request_review_records_reviewer_approval() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        let d = engine
            .list_deliverables(progress.phases[0].phase.id)
            .await
            .unwrap()
            .remove(0);

        // Reviewing before generation is an invalid state.
        let err = engine.request_review(d.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));

        engine.generate_deliverable(d.id, None).await.unwrap();
        let reviewed = engine.request_review(d.id).await.unwrap();
        assert!(reviewed.reviewer_approved);

        let (_, feedback) = engine.get_deliverable(d.id).await.unwrap();
        assert!(feedback.iter().any(|f| f.actor == Actor::Reviewer));
    }

    #[tokio::test]
    async fn test_generation_timeout_leaves_in_progress() {
        let db = DbHandle::new(WorkflowDb::new_in_memory().unwrap());
        let engine = PhaseStateMachine::new(
            db,
            Arc::new(SlowReviewer),
            Arc::new(NullSink),
            Duration::from_millis(20),
        );
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        let d = engine
            .list_deliverables(progress.phases[0].phase.id)
            .await
            .unwrap()
            .remove(0);

        let err = engine.generate_deliverable(d.id, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Dependency(_)));

        // Recoverable: the deliverable sits in_progress awaiting a retry.
        let (d, _) = engine.get_deliverable(d.id).await.unwrap();
        assert_eq!(d.status, DeliverableStatus::InProgress);
    }

    #[tokio::test]
    async fn test_try_advance_not_ready_until_all_approved() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        let phase_id = progress.phases[0].phase.id;
        let deliverables = engine.list_deliverables(phase_id).await.unwrap();

        let outcome = engine.try_advance(project.id).await.unwrap();
        assert!(!outcome.advanced);

        approve_both(&engine, deliverables[0].id).await;
        let outcome = engine.try_advance(project.id).await.unwrap();
        assert!(!outcome.advanced, "one unapproved deliverable must hold the phase");

        approve_both(&engine, deliverables[1].id).await;
        let outcome = engine.try_advance(project.id).await.unwrap();
        assert!(outcome.advanced);
        let next = outcome.new_phase.expect("phase 2 activated");
        assert_eq!(next.phase_number, 2);
        assert_eq!(next.status, PhaseStatus::Active);
        assert!(!outcome.project_complete);
    }

    #[tokio::test]
    async fn test_try_advance_completes_single_phase_project() {
        let engine = engine();
        let project = engine
            .create_project(
                "Acme",
                vec![PhaseTemplate::new(
                    "Discovery",
                    vec![
                        DeliverableTemplate::new("D1", "vision_statement"),
                        DeliverableTemplate::new("D2", "competitor_scan"),
                    ],
                )],
                default_member_templates(),
            )
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        let phase_id = progress.phases[0].phase.id;
        for d in engine.list_deliverables(phase_id).await.unwrap() {
            approve_both(&engine, d.id).await;
        }

        let outcome = engine.try_advance(project.id).await.unwrap();
        assert!(outcome.advanced);
        assert!(outcome.project_complete);
        assert!(outcome.new_phase.is_none());

        let report = engine.get_report(phase_id).await.unwrap().expect("report compiled");
        assert_eq!(report.deliverable_count, 2);

        let project = engine.get_project(project.id).await.unwrap();
        assert!(project.is_complete());

        // Further advances are no-ops on a terminal project.
        let outcome = engine.try_advance(project.id).await.unwrap();
        assert!(!outcome.advanced);
        assert!(outcome.project_complete);
    }

    #[tokio::test]
    async fn test_try_advance_is_idempotent_sequentially() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        for d in engine
            .list_deliverables(progress.phases[0].phase.id)
            .await
            .unwrap()
        {
            approve_both(&engine, d.id).await;
        }

        let first = engine.try_advance(project.id).await.unwrap();
        assert!(first.advanced);
        // Phase 2 is now active with unapproved deliverables: no-op.
        let second = engine.try_advance(project.id).await.unwrap();
        assert!(!second.advanced);
    }

    #[tokio::test]
    async fn test_progress_percent_tracks_phase_completion() {
        let engine = engine();
        let project = engine
            .create_project("Acme", two_phase_templates(), default_member_templates())
            .await
            .unwrap();

        let progress = engine.project_progress(project.id).await.unwrap();
        assert_eq!(progress.overall_percent, 0);

        let phase_id = progress.phases[0].phase.id;
        let deliverables = engine.list_deliverables(phase_id).await.unwrap();
        approve_both(&engine, deliverables[0].id).await;

        // 1 of 2 deliverables approved in phase 1 of 2 => 25%.
        let progress = engine.project_progress(project.id).await.unwrap();
        assert_eq!(progress.overall_percent, 25);

        approve_both(&engine, deliverables[1].id).await;
        engine.try_advance(project.id).await.unwrap();
        let progress = engine.project_progress(project.id).await.unwrap();
        assert_eq!(progress.overall_percent, 50);
    }
}
