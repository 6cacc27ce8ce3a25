use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A business project run by the agent company. Its phases are fixed at
/// creation; the "current" phase is never stored — it is derived from the
/// unique phase with status `active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub phase_count: i32,
    /// Set when the last phase completes; the project's terminal marker.
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
    Blocked,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid phase status: {}", s)),
        }
    }
}

/// One stage of a project. `phase_number` is 1-based, unique per project,
/// and immutable. Phases are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: i64,
    pub project_id: i64,
    pub phase_number: i32,
    pub name: String,
    pub status: PhaseStatus,
    pub team_id: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Pending,
    InProgress,
    Review,
    Approved,
    Rejected,
}

impl DeliverableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverableStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid deliverable status: {}", s)),
        }
    }
}

/// A unit of work within a phase requiring dual sign-off. The two approval
/// flags are independent; `status == Approved` holds exactly when both are
/// set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: i64,
    pub phase_id: i64,
    pub title: String,
    /// Template-defined type tag, e.g. `market_research`.
    pub kind: String,
    pub status: DeliverableStatus,
    pub reviewer_approved: bool,
    pub owner_approved: bool,
    pub generated_content: Option<String>,
    pub assignee_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Deliverable {
    /// Both parties have signed off.
    pub fn approval_complete(&self) -> bool {
        self.reviewer_approved && self.owner_approved
    }
}

/// Who acted on a deliverable. `System` appears only in feedback history
/// (engine-generated notes); approvals come from `Reviewer` or `Owner`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Reviewer,
    Owner,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reviewer => "reviewer",
            Self::Owner => "owner",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reviewer" => Ok(Self::Reviewer),
            "owner" => Ok(Self::Owner),
            "system" => Ok(Self::System),
            _ => Err(format!("Invalid actor: {}", s)),
        }
    }
}

/// One entry in a deliverable's append-only feedback log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: i64,
    pub deliverable_id: i64,
    pub actor: Actor,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    Inactive,
}

impl TeamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Invalid team status: {}", s)),
        }
    }
}

/// The worker pool bound to a project's phases. One team is created per
/// project and toggled active/inactive as phases start and finish; it is
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub status: TeamStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Idle,
    Working,
    Reviewing,
    Blocked,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Reviewing => "reviewing",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "working" => Ok(Self::Working),
            "reviewing" => Ok(Self::Reviewing),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid member status: {}", s)),
        }
    }
}

/// Role name reserved for the team lead; excluded from work assignment.
pub const EXECUTIVE_ROLE: &str = "executive";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: i64,
    pub team_id: i64,
    pub name: String,
    pub role: String,
    pub status: MemberStatus,
    /// Deliverable currently assigned to this member, if any.
    pub current_task: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl TeamMember {
    pub fn is_executive(&self) -> bool {
        self.role == EXECUTIVE_ROLE
    }
}

/// The immutable summary artifact produced when a phase completes.
/// Keyed one-to-one on the phase; recompiling overwrites the prior record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    pub id: i64,
    pub phase_id: i64,
    pub executive_summary: String,
    /// Aggregated deliverable artifacts as JSON.
    pub body: serde_json::Value,
    pub deliverable_count: i64,
    pub artifact_count: i64,
    /// Wall-clock seconds from phase start to completion, when both
    /// timestamps were recorded.
    pub duration_secs: Option<i64>,
    pub compiled_at: String,
}

/// One member-to-deliverable pairing made by auto-assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub member_id: i64,
    pub member_name: String,
    pub deliverable_id: i64,
    pub deliverable_title: String,
}

/// Result of a `try_advance` call. "Not ready" is a normal outcome
/// (`advanced == false`), never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    pub advanced: bool,
    pub new_phase: Option<Phase>,
    pub project_complete: bool,
    /// Report compilation failed during the transition. The phase stays
    /// completed; recompiling is safe.
    pub report_error: Option<String>,
}

impl AdvanceOutcome {
    pub fn not_ready(project_complete: bool) -> Self {
        Self {
            advanced: false,
            new_phase: None,
            project_complete,
            report_error: None,
        }
    }
}

// API view types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: Phase,
    pub deliverable_total: usize,
    pub deliverable_approved: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectProgress {
    pub project: Project,
    pub phases: Vec<PhaseProgress>,
    pub overall_percent: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_status_roundtrip() {
        for s in &["pending", "active", "completed", "blocked"] {
            let parsed: PhaseStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<PhaseStatus>().is_err());
    }

    #[test]
    fn test_deliverable_status_roundtrip() {
        for s in &["pending", "in_progress", "review", "approved", "rejected"] {
            let parsed: DeliverableStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<DeliverableStatus>().is_err());
    }

    #[test]
    fn test_actor_roundtrip() {
        for s in &["reviewer", "owner", "system"] {
            let parsed: Actor = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<Actor>().is_err());
    }

    #[test]
    fn test_member_status_roundtrip() {
        for s in &["idle", "working", "reviewing", "blocked"] {
            let parsed: MemberStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<MemberStatus>().is_err());
    }

    #[test]
    fn test_serde_produces_lowercase_strings() {
        assert_eq!(
            serde_json::to_string(&DeliverableStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(serde_json::to_string(&PhaseStatus::Active).unwrap(), "\"active\"");
        assert_eq!(serde_json::to_string(&Actor::Owner).unwrap(), "\"owner\"");
        assert_eq!(
            serde_json::to_string(&MemberStatus::Reviewing).unwrap(),
            "\"reviewing\""
        );
    }

    #[test]
    fn test_approval_complete_requires_both_flags() {
        let mut d = Deliverable {
            id: 1,
            phase_id: 1,
            title: "Market research".into(),
            kind: "market_research".into(),
            status: DeliverableStatus::Review,
            reviewer_approved: true,
            owner_approved: false,
            generated_content: Some("...".into()),
            assignee_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!d.approval_complete());
        d.owner_approved = true;
        assert!(d.approval_complete());
    }

    #[test]
    fn test_executive_detection() {
        let member = TeamMember {
            id: 1,
            team_id: 1,
            name: "Nova".into(),
            role: EXECUTIVE_ROLE.into(),
            status: MemberStatus::Reviewing,
            current_task: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(member.is_executive());
    }
}
