//! Phase templates: the fixed blueprint a project is created from.
//!
//! A template names each phase and the deliverable kinds it produces, plus
//! the roster of team members to seed. Templates are pure data — the engine
//! snapshots them onto the project at creation time, so later template
//! changes never touch projects already in flight.

use serde::{Deserialize, Serialize};

/// A deliverable to instantiate when its phase activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableTemplate {
    pub title: String,
    /// Type tag stored on the deliverable, e.g. `market_research`.
    pub kind: String,
}

impl DeliverableTemplate {
    pub fn new(title: &str, kind: &str) -> Self {
        Self {
            title: title.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// One phase of the project blueprint. Phase numbers are assigned from the
/// template's position in the list (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTemplate {
    pub name: String,
    pub deliverables: Vec<DeliverableTemplate>,
}

impl PhaseTemplate {
    pub fn new(name: &str, deliverables: Vec<DeliverableTemplate>) -> Self {
        Self {
            name: name.to_string(),
            deliverables,
        }
    }
}

/// A team member to seed at project creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberTemplate {
    pub name: String,
    pub role: String,
}

impl MemberTemplate {
    pub fn new(name: &str, role: &str) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
        }
    }
}

/// The default six-phase business blueprint.
pub fn default_phase_templates() -> Vec<PhaseTemplate> {
    vec![
        PhaseTemplate::new(
            "Discovery & strategy",
            vec![
                DeliverableTemplate::new("Vision statement", "vision_statement"),
                DeliverableTemplate::new("Competitor scan", "competitor_scan"),
            ],
        ),
        PhaseTemplate::new(
            "Market research",
            vec![
                DeliverableTemplate::new("Market research report", "market_research"),
                DeliverableTemplate::new("Customer personas", "customer_personas"),
                DeliverableTemplate::new("Pricing analysis", "pricing_analysis"),
            ],
        ),
        PhaseTemplate::new(
            "Branding",
            vec![
                DeliverableTemplate::new("Brand identity", "brand_identity"),
                DeliverableTemplate::new("Logo brief", "logo_brief"),
                DeliverableTemplate::new("Tone of voice guide", "tone_of_voice"),
            ],
        ),
        PhaseTemplate::new(
            "Product definition",
            vec![
                DeliverableTemplate::new("Product specification", "product_spec"),
                DeliverableTemplate::new("Feature roadmap", "feature_roadmap"),
            ],
        ),
        PhaseTemplate::new(
            "Website & copy",
            vec![
                DeliverableTemplate::new("Website copy", "website_copy"),
                DeliverableTemplate::new("Landing page outline", "landing_page"),
                DeliverableTemplate::new("SEO keyword set", "seo_keywords"),
            ],
        ),
        PhaseTemplate::new(
            "Launch",
            vec![
                DeliverableTemplate::new("Launch plan", "launch_plan"),
                DeliverableTemplate::new("Press release", "press_release"),
                DeliverableTemplate::new("Social campaign", "social_campaign"),
            ],
        ),
    ]
}

/// The default agent roster seeded onto every new project's team.
pub fn default_member_templates() -> Vec<MemberTemplate> {
    vec![
        MemberTemplate::new("Nova", crate::models::EXECUTIVE_ROLE),
        MemberTemplate::new("Atlas", "analyst"),
        MemberTemplate::new("Vega", "strategist"),
        MemberTemplate::new("Juno", "copywriter"),
        MemberTemplate::new("Orion", "designer"),
    ]
}
