//! Reviewer adapter: the opaque language-model completion service.
//!
//! The engine consumes three capabilities — generate deliverable content,
//! produce a review verdict, write an executive summary — behind one trait.
//! `CommandReviewer` shells out to a configurable CLI and parses a JSON
//! verdict out of possibly-noisy output; `StaticReviewer` is a deterministic
//! offline implementation used for demos and tests. A failed call is never
//! an implicit approval.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

use crate::models::{Deliverable, Phase};

/// Verdict returned by the automated review of a deliverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub feedback: String,
}

impl ReviewVerdict {
    /// Parse a verdict out of model output, tolerating markdown fences and
    /// prose around the JSON object.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = if let Some(start) = raw.find('{') {
            if let Some(end) = raw.rfind('}') {
                &raw[start..=end]
            } else {
                raw
            }
        } else {
            raw
        };
        serde_json::from_str(cleaned).context("Failed to parse review verdict as JSON")
    }
}

#[async_trait]
pub trait ReviewerAdapter: Send + Sync {
    /// Produce content for a deliverable. `feedback` carries the revision
    /// context on regenerations.
    async fn generate(&self, deliverable: &Deliverable, feedback: Option<&str>) -> Result<String>;

    /// Review a deliverable's generated content and return a verdict.
    async fn review(&self, deliverable: &Deliverable) -> Result<ReviewVerdict>;

    /// Write an executive summary over a completed phase's deliverables.
    async fn summarize(&self, phase: &Phase, deliverables: &[Deliverable]) -> Result<String>;
}

const REVIEW_SYSTEM_PROMPT: &str = r#"You are a quality reviewer for business deliverables. Evaluate the deliverable below and respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "approved": true | false,
  "quality_score": 0.0,
  "feedback": "One short paragraph of actionable feedback"
}

Rules:
- Approve only work that is complete, specific, and internally consistent.
- quality_score is 0.0 to 1.0.
- Feedback must name concrete fixes when you reject.
"#;

/// Subprocess-backed adapter: pipes a prompt to a model CLI and captures
/// stdout. The command receives the prompt as its final argument, the way
/// `claude --print <prompt>` does.
pub struct CommandReviewer {
    cmd: String,
}

impl CommandReviewer {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
        }
    }

    async fn call_model(&self, prompt: &str) -> Result<String> {
        let output = Command::new(&self.cmd)
            .arg("--print")
            .arg(prompt)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn model command '{}'", self.cmd))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Model command exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
        }

        let stdout =
            String::from_utf8(output.stdout).context("Invalid UTF-8 in model output")?;
        Ok(stdout.trim().to_string())
    }

    fn generation_prompt(deliverable: &Deliverable, feedback: Option<&str>) -> String {
        let mut prompt = format!(
            "Produce the deliverable below for a new business venture.\n\n\
             ## Deliverable\n\
             **Title:** {}\n\
             **Type:** {}\n",
            deliverable.title, deliverable.kind,
        );
        if let Some(prior) = &deliverable.generated_content {
            prompt.push_str(&format!("\n## Previous version\n{}\n", prior));
        }
        if let Some(fb) = feedback {
            prompt.push_str(&format!("\n## Revision feedback\n{}\n", fb));
        }
        prompt.push_str("\nRespond with the deliverable content only.");
        prompt
    }

    fn review_prompt(deliverable: &Deliverable) -> String {
        format!(
            "{}\n## Deliverable\n**Title:** {}\n**Type:** {}\n\n## Content\n{}\n",
            REVIEW_SYSTEM_PROMPT,
            deliverable.title,
            deliverable.kind,
            deliverable.generated_content.as_deref().unwrap_or(""),
        )
    }

    fn summary_prompt(phase: &Phase, deliverables: &[Deliverable]) -> String {
        let mut prompt = format!(
            "Write a one-paragraph executive summary of the completed '{}' phase.\n\n",
            phase.name
        );
        for d in deliverables {
            prompt.push_str(&format!(
                "## {}\n{}\n\n",
                d.title,
                d.generated_content.as_deref().unwrap_or("(no content)")
            ));
        }
        prompt.push_str("Respond with the summary only.");
        prompt
    }
}

#[async_trait]
impl ReviewerAdapter for CommandReviewer {
    async fn generate(&self, deliverable: &Deliverable, feedback: Option<&str>) -> Result<String> {
        let prompt = Self::generation_prompt(deliverable, feedback);
        let content = self.call_model(&prompt).await?;
        if content.is_empty() {
            anyhow::bail!("Model returned empty content for '{}'", deliverable.title);
        }
        Ok(content)
    }

    async fn review(&self, deliverable: &Deliverable) -> Result<ReviewVerdict> {
        let prompt = Self::review_prompt(deliverable);
        let raw = self.call_model(&prompt).await?;
        ReviewVerdict::parse(&raw)
    }

    async fn summarize(&self, phase: &Phase, deliverables: &[Deliverable]) -> Result<String> {
        let prompt = Self::summary_prompt(phase, deliverables);
        self.call_model(&prompt).await
    }
}

/// Deterministic offline adapter. Generates templated content, approves
/// anything non-empty, and summarizes by listing deliverable titles. Used by
/// demo mode and tests; never calls out.
pub struct StaticReviewer;

#[async_trait]
impl ReviewerAdapter for StaticReviewer {
    async fn generate(&self, deliverable: &Deliverable, feedback: Option<&str>) -> Result<String> {
        let mut content = format!(
            "# {}\n\nDraft {} produced for review.",
            deliverable.title, deliverable.kind
        );
        if let Some(fb) = feedback {
            content.push_str(&format!("\n\nRevised per feedback: {}", fb));
        }
        Ok(content)
    }

    async fn review(&self, deliverable: &Deliverable) -> Result<ReviewVerdict> {
        let has_content = deliverable
            .generated_content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        Ok(ReviewVerdict {
            approved: has_content,
            quality_score: if has_content { 0.8 } else { 0.0 },
            feedback: if has_content {
                "Meets the bar for this phase.".to_string()
            } else {
                "No content to review.".to_string()
            },
        })
    }

    async fn summarize(&self, phase: &Phase, deliverables: &[Deliverable]) -> Result<String> {
        let titles: Vec<&str> = deliverables.iter().map(|d| d.title.as_str()).collect();
        Ok(format!(
            "Phase '{}' closed with {} deliverables: {}.",
            phase.name,
            deliverables.len(),
            titles.join(", ")
        ))
    }
}
