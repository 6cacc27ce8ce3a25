//! Team lifecycle: activation, deactivation, and work assignment for the
//! agent pool bound to a project's phases.
//!
//! Teams are reusable — deactivation idles the members and clears their
//! assignments but never deletes anything.

use crate::errors::{WorkflowError, WorkflowResult};
use crate::models::{
    Assignment, Deliverable, DeliverableStatus, MemberStatus, TeamStatus,
};
use crate::store::DbHandle;

pub struct TeamLifecycleController {
    db: DbHandle,
}

impl TeamLifecycleController {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Bring a team online for a phase: mark it active and idle every
    /// non-executive member so they can receive work. Activating an
    /// already-active team is logged and ignored.
    pub async fn activate(&self, team_id: i64) -> WorkflowResult<()> {
        self.db
            .call(move |db| {
                let team = db
                    .get_team(team_id)?
                    .ok_or_else(|| anyhow::anyhow!("team {} missing", team_id))?;
                if team.status == TeamStatus::Active {
                    tracing::debug!(team_id, "team already active, skipping activation");
                    return Ok(());
                }
                db.set_team_status(team_id, TeamStatus::Active)?;
                let readied = db.set_members_idle(team_id)?;
                tracing::info!(team_id, readied, "team activated");
                Ok(())
            })
            .await
            .map_err(WorkflowError::Other)
    }

    /// Take a team offline after its phase completes: mark it inactive,
    /// idle every member, and clear their assignments. Idempotent.
    pub async fn deactivate(&self, team_id: i64) -> WorkflowResult<()> {
        self.db
            .call(move |db| {
                if db.get_team(team_id)?.is_none() {
                    anyhow::bail!("team {} missing", team_id);
                }
                db.set_team_status(team_id, TeamStatus::Inactive)?;
                let cleared = db.clear_member_assignments(team_id)?;
                tracing::info!(team_id, cleared, "team deactivated");
                Ok(())
            })
            .await
            .map_err(WorkflowError::Other)
    }

    /// First-fit matching of idle members to unassigned deliverables of the
    /// team's active phase, pending before in-progress. Executives never
    /// receive work. An empty result means no work or no capacity — not an
    /// error.
    pub async fn auto_assign(&self, team_id: i64) -> WorkflowResult<Vec<Assignment>> {
        let assignments = self
            .db
            .call(move |db| {
                let team = db
                    .get_team(team_id)?
                    .ok_or_else(|| anyhow::anyhow!("team {} missing", team_id))?;

                let Some(phase) = db.find_active_phase(team.project_id)? else {
                    return Ok(Vec::new());
                };
                if phase.team_id != team_id {
                    return Ok(Vec::new());
                }

                let idle: Vec<_> = db
                    .list_team_members(team_id)?
                    .into_iter()
                    .filter(|m| m.status == MemberStatus::Idle && !m.is_executive())
                    .collect();

                let open: Vec<Deliverable> = {
                    let mut ds: Vec<_> = db
                        .list_deliverables(phase.id)?
                        .into_iter()
                        .filter(|d| {
                            d.assignee_id.is_none()
                                && matches!(
                                    d.status,
                                    DeliverableStatus::Pending | DeliverableStatus::InProgress
                                )
                        })
                        .collect();
                    ds.sort_by_key(|d| (d.status != DeliverableStatus::Pending, d.id));
                    ds
                };

                let mut made = Vec::new();
                let mut idle = idle.into_iter();
                for deliverable in open {
                    let Some(member) = idle.next() else { break };
                    db.assign_member(member.id, deliverable.id)?;
                    db.set_deliverable_assignee(deliverable.id, member.id)?;
                    made.push(Assignment {
                        member_id: member.id,
                        member_name: member.name,
                        deliverable_id: deliverable.id,
                        deliverable_title: deliverable.title,
                    });
                }
                Ok(made)
            })
            .await
            .map_err(WorkflowError::Other)?;

        if !assignments.is_empty() {
            tracing::info!(team_id, count = assignments.len(), "auto-assigned deliverables");
        }
        Ok(assignments)
    }
}
