//! CLI command handlers. Thin wrappers over the engine operations that
//! format results for the terminal.

use anyhow::Result;
use console::style;

use atelier::engine::PhaseStateMachine;
use atelier::models::{Actor, DeliverableStatus, PhaseStatus};
use atelier::template::{default_member_templates, default_phase_templates};

fn phase_glyph(status: PhaseStatus) -> console::StyledObject<&'static str> {
    match status {
        PhaseStatus::Pending => style("·").dim(),
        PhaseStatus::Active => style("▶").cyan(),
        PhaseStatus::Completed => style("✓").green(),
        PhaseStatus::Blocked => style("✗").red(),
    }
}

fn deliverable_glyph(status: DeliverableStatus) -> console::StyledObject<&'static str> {
    match status {
        DeliverableStatus::Pending => style("·").dim(),
        DeliverableStatus::InProgress => style("…").cyan(),
        DeliverableStatus::Review => style("?").yellow(),
        DeliverableStatus::Approved => style("✓").green(),
        DeliverableStatus::Rejected => style("✗").red(),
    }
}

pub async fn project_create(engine: &PhaseStateMachine, name: &str) -> Result<()> {
    let project = engine
        .create_project(name, default_phase_templates(), default_member_templates())
        .await?;
    println!(
        "{} project {} ({} phases), id {}",
        style("Created").green().bold(),
        style(&project.name).bold(),
        project.phase_count,
        project.id
    );
    project_status(engine, project.id).await
}

pub async fn project_list(engine: &PhaseStateMachine) -> Result<()> {
    let projects = engine.list_projects().await?;
    if projects.is_empty() {
        println!("No projects yet. Create one with {}.", style("atelier project create").bold());
        return Ok(());
    }
    for p in projects {
        let state = if p.is_complete() {
            style("complete").green()
        } else {
            style("in progress").cyan()
        };
        println!("  {:>4}  {}  [{}]", p.id, p.name, state);
    }
    Ok(())
}

pub async fn project_status(engine: &PhaseStateMachine, project_id: i64) -> Result<()> {
    let progress = engine.project_progress(project_id).await?;
    println!(
        "\n{} — {}% complete",
        style(&progress.project.name).bold(),
        progress.overall_percent
    );
    for p in &progress.phases {
        println!(
            "  {} phase {} {} ({}/{} approved)  [phase id {}]",
            phase_glyph(p.phase.status),
            p.phase.phase_number,
            p.phase.name,
            p.deliverable_approved,
            p.deliverable_total,
            p.phase.id,
        );
        if p.phase.status == PhaseStatus::Active {
            for d in engine.list_deliverables(p.phase.id).await? {
                println!(
                    "      {} {}  [deliverable id {}]",
                    deliverable_glyph(d.status),
                    d.title,
                    d.id
                );
            }
        }
    }
    Ok(())
}

pub async fn deliverable_generate(
    engine: &PhaseStateMachine,
    deliverable_id: i64,
    feedback: Option<String>,
) -> Result<()> {
    let d = engine.generate_deliverable(deliverable_id, feedback).await?;
    println!(
        "{} content for {} (status: {})",
        style("Generated").green().bold(),
        style(&d.title).bold(),
        d.status
    );
    Ok(())
}

pub async fn deliverable_approve(
    engine: &PhaseStateMachine,
    deliverable_id: i64,
    actor: Actor,
    approved: bool,
    comment: Option<String>,
) -> Result<()> {
    let d = engine
        .record_approval(deliverable_id, actor, approved, comment)
        .await?;
    let verdict = if approved {
        style("approved").green()
    } else {
        style("rejected").red()
    };
    println!(
        "{} {} by {} (status: {})",
        style(&d.title).bold(),
        verdict,
        actor,
        d.status
    );
    Ok(())
}

pub async fn deliverable_review(engine: &PhaseStateMachine, deliverable_id: i64) -> Result<()> {
    let d = engine.request_review(deliverable_id).await?;
    let verdict = if d.reviewer_approved {
        style("approved").green()
    } else {
        style("rejected").red()
    };
    println!("Automated review of {}: {}", style(&d.title).bold(), verdict);
    Ok(())
}

pub async fn deliverable_show(engine: &PhaseStateMachine, deliverable_id: i64) -> Result<()> {
    let (d, feedback) = engine.get_deliverable(deliverable_id).await?;
    println!("{} [{}]", style(&d.title).bold(), d.kind);
    println!(
        "  status: {}  reviewer: {}  owner: {}",
        d.status,
        if d.reviewer_approved { "✓" } else { "·" },
        if d.owner_approved { "✓" } else { "·" },
    );
    if let Some(content) = &d.generated_content {
        println!("\n{}", content);
    }
    if !feedback.is_empty() {
        println!("\n{}", style("Feedback").bold());
        for f in feedback {
            println!("  [{}] {} — {}", f.created_at, f.actor, f.comment);
        }
    }
    Ok(())
}

pub async fn team_assign(engine: &PhaseStateMachine, team_id: i64) -> Result<()> {
    let assignments = engine.teams().auto_assign(team_id).await?;
    if assignments.is_empty() {
        println!("No assignments made (no idle members or no open deliverables).");
        return Ok(());
    }
    for a in assignments {
        println!(
            "  {} {} → {}",
            style("assigned").cyan(),
            a.member_name,
            a.deliverable_title
        );
    }
    Ok(())
}

pub async fn advance(engine: &PhaseStateMachine, project_id: i64) -> Result<()> {
    let outcome = engine.try_advance(project_id).await?;
    if !outcome.advanced {
        println!("Not ready: the active phase still has unapproved deliverables.");
        return Ok(());
    }
    if let Some(err) = &outcome.report_error {
        println!(
            "{} report compilation failed (phase stays completed): {}",
            style("warning:").yellow().bold(),
            err
        );
    }
    if outcome.project_complete {
        println!("{} all phases complete.", style("Project finished!").green().bold());
    } else if let Some(next) = outcome.new_phase {
        println!(
            "{} phase {} {} is now active.",
            style("Advanced:").green().bold(),
            next.phase_number,
            next.name
        );
    }
    Ok(())
}

pub async fn report_compile(engine: &PhaseStateMachine, phase_id: i64) -> Result<()> {
    let report = engine.compiler().compile(phase_id).await?;
    println!(
        "{} report for phase {} ({} deliverables).",
        style("Compiled").green().bold(),
        phase_id,
        report.deliverable_count
    );
    Ok(())
}

pub async fn report_show(engine: &PhaseStateMachine, phase_id: i64) -> Result<()> {
    match engine.get_report(phase_id).await? {
        Some(report) => {
            println!("{}", style("Consolidated report").bold());
            println!(
                "  deliverables: {}  artifacts: {}  duration: {}",
                report.deliverable_count,
                report.artifact_count,
                report
                    .duration_secs
                    .map(|s| format!("{}s", s))
                    .unwrap_or_else(|| "n/a".to_string()),
            );
            println!("\n{}", report.executive_summary);
        }
        None => println!("No report compiled for phase {} yet.", phase_id),
    }
    Ok(())
}
