//! SQLite persistence for the workflow engine.
//!
//! All entity CRUD lives here, plus the two conditional updates the state
//! machine depends on: `activate_phase_row` (pending → active) and
//! `complete_phase_if_active` (active → completed). Both are keyed on the
//! phase id AND the expected prior status, so the rows-affected count picks
//! exactly one winner under concurrent callers.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::models::*;
use crate::template::DeliverableTemplate;

/// Async-safe handle to the workflow database.
///
/// Wraps `WorkflowDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<WorkflowDb>>,
}

impl DbHandle {
    pub fn new(db: WorkflowDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&WorkflowDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup initialization
    /// and tests; must NOT be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, WorkflowDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct WorkflowDb {
    conn: Connection,
}

impl WorkflowDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    phase_count INTEGER NOT NULL,
                    completed_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS teams (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'inactive',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS team_members (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    role TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'idle',
                    current_task INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS phases (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    phase_number INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    team_id INTEGER NOT NULL REFERENCES teams(id),
                    template TEXT NOT NULL DEFAULT '[]',
                    started_at TEXT,
                    completed_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(project_id, phase_number)
                );

                CREATE TABLE IF NOT EXISTS deliverables (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    phase_id INTEGER NOT NULL REFERENCES phases(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    reviewer_approved INTEGER NOT NULL DEFAULT 0,
                    owner_approved INTEGER NOT NULL DEFAULT 0,
                    generated_content TEXT,
                    assignee_id INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS feedback_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    deliverable_id INTEGER NOT NULL REFERENCES deliverables(id) ON DELETE CASCADE,
                    actor TEXT NOT NULL,
                    comment TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS reports (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    phase_id INTEGER NOT NULL UNIQUE REFERENCES phases(id),
                    executive_summary TEXT NOT NULL,
                    body TEXT NOT NULL,
                    deliverable_count INTEGER NOT NULL,
                    artifact_count INTEGER NOT NULL,
                    duration_secs INTEGER,
                    compiled_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_phases_project ON phases(project_id);
                CREATE INDEX IF NOT EXISTS idx_phases_status ON phases(project_id, status);
                CREATE INDEX IF NOT EXISTS idx_deliverables_phase ON deliverables(phase_id);
                CREATE INDEX IF NOT EXISTS idx_members_team ON team_members(team_id);
                CREATE INDEX IF NOT EXISTS idx_feedback_deliverable ON feedback_entries(deliverable_id);
                ",
            )
            .context("Failed to create tables")?;

        Ok(())
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(&self, name: &str, phase_count: i32) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (name, phase_count) VALUES (?1, ?2)",
                params![name, phase_count],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, phase_count, completed_at, created_at, updated_at
                 FROM projects WHERE id = ?1",
            )
            .context("Failed to prepare get_project")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    phase_count: row.get(2)?,
                    completed_at: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .context("Failed to query project")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read project row")?)),
            None => Ok(None),
        }
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, phase_count, completed_at, created_at, updated_at
                 FROM projects ORDER BY id",
            )
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    phase_count: row.get(2)?,
                    completed_at: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn mark_project_complete(&self, id: i64) -> Result<Project> {
        self.conn
            .execute(
                "UPDATE projects SET completed_at = datetime('now'), updated_at = datetime('now')
                 WHERE id = ?1 AND completed_at IS NULL",
                params![id],
            )
            .context("Failed to mark project complete")?;
        self.get_project(id)?
            .context("Project not found after completion update")
    }

    // ── Team CRUD ─────────────────────────────────────────────────────

    pub fn create_team(&self, project_id: i64, name: &str) -> Result<Team> {
        self.conn
            .execute(
                "INSERT INTO teams (project_id, name) VALUES (?1, ?2)",
                params![project_id, name],
            )
            .context("Failed to insert team")?;
        let id = self.conn.last_insert_rowid();
        self.get_team(id)?.context("Team not found after insert")
    }

    pub fn get_team(&self, id: i64) -> Result<Option<Team>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, name, status, created_at, updated_at
                 FROM teams WHERE id = ?1",
            )
            .context("Failed to prepare get_team")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(TeamRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    status: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .context("Failed to query team")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read team row")?;
                Ok(Some(r.into_team()?))
            }
            None => Ok(None),
        }
    }

    pub fn set_team_status(&self, id: i64, status: TeamStatus) -> Result<Team> {
        self.conn
            .execute(
                "UPDATE teams SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update team status")?;
        self.get_team(id)?.context("Team not found after status update")
    }

    // ── Team member CRUD ──────────────────────────────────────────────

    pub fn create_team_member(&self, team_id: i64, name: &str, role: &str) -> Result<TeamMember> {
        self.conn
            .execute(
                "INSERT INTO team_members (team_id, name, role) VALUES (?1, ?2, ?3)",
                params![team_id, name, role],
            )
            .context("Failed to insert team member")?;
        let id = self.conn.last_insert_rowid();
        self.get_team_member(id)?
            .context("Team member not found after insert")
    }

    pub fn get_team_member(&self, id: i64) -> Result<Option<TeamMember>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, team_id, name, role, status, current_task, created_at, updated_at
                 FROM team_members WHERE id = ?1",
            )
            .context("Failed to prepare get_team_member")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(MemberRow {
                    id: row.get(0)?,
                    team_id: row.get(1)?,
                    name: row.get(2)?,
                    role: row.get(3)?,
                    status: row.get(4)?,
                    current_task: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })
            .context("Failed to query team member")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read team member row")?;
                Ok(Some(r.into_member()?))
            }
            None => Ok(None),
        }
    }

    pub fn list_team_members(&self, team_id: i64) -> Result<Vec<TeamMember>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, team_id, name, role, status, current_task, created_at, updated_at
                 FROM team_members WHERE team_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_team_members")?;
        let rows = stmt
            .query_map(params![team_id], |row| {
                Ok(MemberRow {
                    id: row.get(0)?,
                    team_id: row.get(1)?,
                    name: row.get(2)?,
                    role: row.get(3)?,
                    status: row.get(4)?,
                    current_task: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })
            .context("Failed to query team members")?;
        let mut members = Vec::new();
        for row in rows {
            let r = row.context("Failed to read team member row")?;
            members.push(r.into_member()?);
        }
        Ok(members)
    }

    /// Set every non-executive member of a team to `idle`, ready for work.
    pub fn set_members_idle(&self, team_id: i64) -> Result<usize> {
        let count = self
            .conn
            .execute(
                "UPDATE team_members SET status = 'idle', updated_at = datetime('now')
                 WHERE team_id = ?1 AND role != ?2",
                params![team_id, EXECUTIVE_ROLE],
            )
            .context("Failed to idle team members")?;
        Ok(count)
    }

    /// Set every member of a team to `idle` and clear their assignments.
    pub fn clear_member_assignments(&self, team_id: i64) -> Result<usize> {
        let count = self
            .conn
            .execute(
                "UPDATE team_members SET status = 'idle', current_task = NULL,
                        updated_at = datetime('now')
                 WHERE team_id = ?1",
                params![team_id],
            )
            .context("Failed to clear member assignments")?;
        Ok(count)
    }

    pub fn assign_member(&self, member_id: i64, deliverable_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE team_members SET status = 'working', current_task = ?1,
                        updated_at = datetime('now')
                 WHERE id = ?2",
                params![deliverable_id, member_id],
            )
            .context("Failed to assign team member")?;
        Ok(())
    }

    // ── Phase CRUD ────────────────────────────────────────────────────

    pub fn create_phase(
        &self,
        project_id: i64,
        phase_number: i32,
        name: &str,
        team_id: i64,
        template: &[DeliverableTemplate],
    ) -> Result<Phase> {
        let template_json =
            serde_json::to_string(template).context("Failed to serialize phase template")?;
        self.conn
            .execute(
                "INSERT INTO phases (project_id, phase_number, name, team_id, template)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![project_id, phase_number, name, team_id, template_json],
            )
            .context("Failed to insert phase")?;
        let id = self.conn.last_insert_rowid();
        self.get_phase(id)?.context("Phase not found after insert")
    }

    pub fn get_phase(&self, id: i64) -> Result<Option<Phase>> {
        self.query_phase("WHERE id = ?1", params![id])
    }

    pub fn get_phase_by_number(&self, project_id: i64, phase_number: i32) -> Result<Option<Phase>> {
        self.query_phase(
            "WHERE project_id = ?1 AND phase_number = ?2",
            params![project_id, phase_number],
        )
    }

    /// The unique `active` phase of a project, if any. This scan is the only
    /// source of truth for "current phase" — it is never stored.
    pub fn find_active_phase(&self, project_id: i64) -> Result<Option<Phase>> {
        self.query_phase(
            "WHERE project_id = ?1 AND status = 'active'",
            params![project_id],
        )
    }

    fn query_phase(&self, filter: &str, args: impl rusqlite::Params) -> Result<Option<Phase>> {
        let sql = format!(
            "SELECT id, project_id, phase_number, name, status, team_id, started_at,
                    completed_at, created_at, updated_at
             FROM phases {}",
            filter
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare phase query")?;
        let mut rows = stmt
            .query_map(args, |row| {
                Ok(PhaseRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    phase_number: row.get(2)?,
                    name: row.get(3)?,
                    status: row.get(4)?,
                    team_id: row.get(5)?,
                    started_at: row.get(6)?,
                    completed_at: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            })
            .context("Failed to query phase")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read phase row")?;
                Ok(Some(r.into_phase()?))
            }
            None => Ok(None),
        }
    }

    pub fn list_phases(&self, project_id: i64) -> Result<Vec<Phase>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, phase_number, name, status, team_id, started_at,
                        completed_at, created_at, updated_at
                 FROM phases WHERE project_id = ?1 ORDER BY phase_number",
            )
            .context("Failed to prepare list_phases")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(PhaseRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    phase_number: row.get(2)?,
                    name: row.get(3)?,
                    status: row.get(4)?,
                    team_id: row.get(5)?,
                    started_at: row.get(6)?,
                    completed_at: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            })
            .context("Failed to query phases")?;
        let mut phases = Vec::new();
        for row in rows {
            let r = row.context("Failed to read phase row")?;
            phases.push(r.into_phase()?);
        }
        Ok(phases)
    }

    /// The deliverable template snapshotted onto a phase at creation.
    pub fn phase_template(&self, phase_id: i64) -> Result<Vec<DeliverableTemplate>> {
        let json: String = self
            .conn
            .query_row(
                "SELECT template FROM phases WHERE id = ?1",
                params![phase_id],
                |row| row.get(0),
            )
            .context("Failed to read phase template")?;
        serde_json::from_str(&json)
            .map_err(|e| anyhow::anyhow!("corrupt phase template JSON '{}': {}", json, e))
    }

    /// Conditionally flip a phase `pending → active`, stamping `started_at`.
    /// Returns false when the phase was not pending (lost the race or out of
    /// order) — the caller decides whether that is an error.
    pub fn activate_phase_row(&self, phase_id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE phases SET status = 'active', started_at = datetime('now'),
                        updated_at = datetime('now')
                 WHERE id = ?1 AND status = 'pending'",
                params![phase_id],
            )
            .context("Failed to activate phase")?;
        Ok(count == 1)
    }

    /// The compare-and-swap guarding phase completion: flip `active →
    /// completed` and stamp `completed_at` in one conditional update. Exactly
    /// one concurrent caller observes `true`; everyone else must stop before
    /// running completion side effects.
    pub fn complete_phase_if_active(&self, phase_id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE phases SET status = 'completed', completed_at = datetime('now'),
                        updated_at = datetime('now')
                 WHERE id = ?1 AND status = 'active'",
                params![phase_id],
            )
            .context("Failed to complete phase")?;
        Ok(count == 1)
    }

    pub fn block_phase(&self, phase_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE phases SET status = 'blocked', updated_at = datetime('now')
                 WHERE id = ?1 AND status = 'active'",
                params![phase_id],
            )
            .context("Failed to block phase")?;
        Ok(())
    }

    // ── Deliverable CRUD ──────────────────────────────────────────────

    pub fn create_deliverable(&self, phase_id: i64, title: &str, kind: &str) -> Result<Deliverable> {
        self.conn
            .execute(
                "INSERT INTO deliverables (phase_id, title, kind) VALUES (?1, ?2, ?3)",
                params![phase_id, title, kind],
            )
            .context("Failed to insert deliverable")?;
        let id = self.conn.last_insert_rowid();
        self.get_deliverable(id)?
            .context("Deliverable not found after insert")
    }

    pub fn get_deliverable(&self, id: i64) -> Result<Option<Deliverable>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, phase_id, title, kind, status, reviewer_approved, owner_approved,
                        generated_content, assignee_id, created_at, updated_at
                 FROM deliverables WHERE id = ?1",
            )
            .context("Failed to prepare get_deliverable")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(DeliverableRow {
                    id: row.get(0)?,
                    phase_id: row.get(1)?,
                    title: row.get(2)?,
                    kind: row.get(3)?,
                    status: row.get(4)?,
                    reviewer_approved: row.get(5)?,
                    owner_approved: row.get(6)?,
                    generated_content: row.get(7)?,
                    assignee_id: row.get(8)?,
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            })
            .context("Failed to query deliverable")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read deliverable row")?;
                Ok(Some(r.into_deliverable()?))
            }
            None => Ok(None),
        }
    }

    pub fn list_deliverables(&self, phase_id: i64) -> Result<Vec<Deliverable>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, phase_id, title, kind, status, reviewer_approved, owner_approved,
                        generated_content, assignee_id, created_at, updated_at
                 FROM deliverables WHERE phase_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_deliverables")?;
        let rows = stmt
            .query_map(params![phase_id], |row| {
                Ok(DeliverableRow {
                    id: row.get(0)?,
                    phase_id: row.get(1)?,
                    title: row.get(2)?,
                    kind: row.get(3)?,
                    status: row.get(4)?,
                    reviewer_approved: row.get(5)?,
                    owner_approved: row.get(6)?,
                    generated_content: row.get(7)?,
                    assignee_id: row.get(8)?,
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            })
            .context("Failed to query deliverables")?;
        let mut deliverables = Vec::new();
        for row in rows {
            let r = row.context("Failed to read deliverable row")?;
            deliverables.push(r.into_deliverable()?);
        }
        Ok(deliverables)
    }

    pub fn set_deliverable_status(&self, id: i64, status: DeliverableStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE deliverables SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update deliverable status")?;
        Ok(())
    }

    pub fn set_deliverable_assignee(&self, id: i64, member_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE deliverables SET status = 'in_progress', assignee_id = ?1,
                        updated_at = datetime('now')
                 WHERE id = ?2",
                params![member_id, id],
            )
            .context("Failed to assign deliverable")?;
        Ok(())
    }

    /// Write freshly generated content and move the deliverable to `review`.
    /// `reset_flags` clears both approval flags (a regeneration).
    pub fn record_generation(&self, id: i64, content: &str, reset_flags: bool) -> Result<()> {
        if reset_flags {
            self.conn
                .execute(
                    "UPDATE deliverables SET generated_content = ?1, status = 'review',
                            reviewer_approved = 0, owner_approved = 0,
                            updated_at = datetime('now')
                     WHERE id = ?2",
                    params![content, id],
                )
                .context("Failed to record regeneration")?;
        } else {
            self.conn
                .execute(
                    "UPDATE deliverables SET generated_content = ?1, status = 'review',
                            updated_at = datetime('now')
                     WHERE id = ?2",
                    params![content, id],
                )
                .context("Failed to record generation")?;
        }
        Ok(())
    }

    /// Write both approval flags and the status the gate computed for them.
    pub fn apply_approval(
        &self,
        id: i64,
        reviewer_approved: bool,
        owner_approved: bool,
        status: DeliverableStatus,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE deliverables SET reviewer_approved = ?1, owner_approved = ?2,
                        status = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                params![reviewer_approved, owner_approved, status.as_str(), id],
            )
            .context("Failed to apply approval")?;
        Ok(())
    }

    // ── Feedback ──────────────────────────────────────────────────────

    pub fn append_feedback(
        &self,
        deliverable_id: i64,
        actor: Actor,
        comment: &str,
    ) -> Result<FeedbackEntry> {
        self.conn
            .execute(
                "INSERT INTO feedback_entries (deliverable_id, actor, comment) VALUES (?1, ?2, ?3)",
                params![deliverable_id, actor.as_str(), comment],
            )
            .context("Failed to insert feedback entry")?;
        let id = self.conn.last_insert_rowid();
        let (deliverable_id, actor_str, comment, created_at) = self
            .conn
            .query_row(
                "SELECT deliverable_id, actor, comment, created_at
                 FROM feedback_entries WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .context("Feedback entry not found after insert")?;
        Ok(FeedbackEntry {
            id,
            deliverable_id,
            actor: actor_str
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid actor in database: '{}'", actor_str))?,
            comment,
            created_at,
        })
    }

    pub fn list_feedback(&self, deliverable_id: i64) -> Result<Vec<FeedbackEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, deliverable_id, actor, comment, created_at
                 FROM feedback_entries WHERE deliverable_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_feedback")?;
        let rows = stmt
            .query_map(params![deliverable_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("Failed to query feedback entries")?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, deliverable_id, actor_str, comment, created_at) =
                row.context("Failed to read feedback row")?;
            entries.push(FeedbackEntry {
                id,
                deliverable_id,
                actor: actor_str
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid actor in database: '{}'", actor_str))?,
                comment,
                created_at,
            });
        }
        Ok(entries)
    }

    // ── Reports ───────────────────────────────────────────────────────

    /// Write (or overwrite) the consolidated report for a phase.
    /// Keyed on phase_id, so recompiling is idempotent.
    pub fn upsert_report(
        &self,
        phase_id: i64,
        executive_summary: &str,
        body: &serde_json::Value,
        deliverable_count: i64,
        artifact_count: i64,
        duration_secs: Option<i64>,
    ) -> Result<ConsolidatedReport> {
        let body_json = serde_json::to_string(body).context("Failed to serialize report body")?;
        self.conn
            .execute(
                "INSERT INTO reports (phase_id, executive_summary, body, deliverable_count,
                                      artifact_count, duration_secs, compiled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
                 ON CONFLICT(phase_id) DO UPDATE SET
                    executive_summary = ?2,
                    body = ?3,
                    deliverable_count = ?4,
                    artifact_count = ?5,
                    duration_secs = ?6,
                    compiled_at = datetime('now')",
                params![
                    phase_id,
                    executive_summary,
                    body_json,
                    deliverable_count,
                    artifact_count,
                    duration_secs
                ],
            )
            .context("Failed to upsert report")?;
        self.get_report(phase_id)?
            .context("Report not found after upsert")
    }

    pub fn get_report(&self, phase_id: i64) -> Result<Option<ConsolidatedReport>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, phase_id, executive_summary, body, deliverable_count,
                        artifact_count, duration_secs, compiled_at
                 FROM reports WHERE phase_id = ?1",
            )
            .context("Failed to prepare get_report")?;
        let mut rows = stmt
            .query_map(params![phase_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .context("Failed to query report")?;
        match rows.next() {
            Some(row) => {
                let (id, phase_id, executive_summary, body_str, deliverable_count, artifact_count, duration_secs, compiled_at) =
                    row.context("Failed to read report row")?;
                let body: serde_json::Value = serde_json::from_str(&body_str)
                    .map_err(|e| anyhow::anyhow!("corrupt report body JSON: {}", e))?;
                Ok(Some(ConsolidatedReport {
                    id,
                    phase_id,
                    executive_summary,
                    body,
                    deliverable_count,
                    artifact_count,
                    duration_secs,
                    compiled_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Run a closure inside a transaction. Uses `unchecked_transaction`
    /// because the surrounding Mutex already guarantees exclusive access.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let value = f(self)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for reading phases before parsing the status
/// string into a typed value.
struct PhaseRow {
    id: i64,
    project_id: i64,
    phase_number: i32,
    name: String,
    status: String,
    team_id: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PhaseRow {
    fn into_phase(self) -> Result<Phase> {
        let status = PhaseStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse phase status")?;
        Ok(Phase {
            id: self.id,
            project_id: self.project_id,
            phase_number: self.phase_number,
            name: self.name,
            status,
            team_id: self.team_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct DeliverableRow {
    id: i64,
    phase_id: i64,
    title: String,
    kind: String,
    status: String,
    reviewer_approved: bool,
    owner_approved: bool,
    generated_content: Option<String>,
    assignee_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl DeliverableRow {
    fn into_deliverable(self) -> Result<Deliverable> {
        let status = DeliverableStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse deliverable status")?;
        Ok(Deliverable {
            id: self.id,
            phase_id: self.phase_id,
            title: self.title,
            kind: self.kind,
            status,
            reviewer_approved: self.reviewer_approved,
            owner_approved: self.owner_approved,
            generated_content: self.generated_content,
            assignee_id: self.assignee_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct TeamRow {
    id: i64,
    project_id: i64,
    name: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TeamRow {
    fn into_team(self) -> Result<Team> {
        let status = TeamStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse team status")?;
        Ok(Team {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct MemberRow {
    id: i64,
    team_id: i64,
    name: String,
    role: String,
    status: String,
    current_task: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl MemberRow {
    fn into_member(self) -> Result<TeamMember> {
        let status = MemberStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse member status")?;
        Ok(TeamMember {
            id: self.id,
            team_id: self.team_id,
            name: self.name,
            role: self.role,
            status,
            current_task: self.current_task,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
