//! Message classification: ask a language model whether a message is actionable.
//!
//! The prompt and the reply format are provider-neutral; [`gemini`] carries
//! them over HTTP. Every message is classified on its own: no state is kept
//! between calls and nothing is cached.

mod gemini;

use serde::Deserialize;

use crate::model::{Message, Urgency, Verdict};

pub use gemini::GeminiClassifier;

/// Errors from a classification attempt. Never fatal to the monitor.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Timeout, network failure, quota or server error. Retry on a later cycle.
    #[error("classifier unavailable: {0}")]
    Transient(String),

    /// The reply could not be turned into a verdict. Retrying won't help.
    #[error("malformed classifier reply: {0}")]
    Malformed(String),
}

/// Decides whether one message needs action.
pub trait Classifier {
    fn classify(&mut self, message: &Message) -> Result<Verdict, ClassifyError>;
}

/// Build the instruction text for one message.
pub fn build_prompt(message: &Message) -> String {
    format!(
        r#"Analyze this email and determine if it contains actionable tasks that require the user's attention.

EMAIL DETAILS:
Subject: {subject}
From: {sender}
Date: {date}
Body: {body}

FILTERING CRITERIA:
- Skip promotional emails, newsletters, marketing content
- Skip automated notifications that don't require action
- Skip social media notifications, app updates
- Focus on emails requiring human response or action
- Prioritize work emails, personal requests, deadlines, meetings

Return JSON with this exact structure:
{{
    "has_task": true/false,
    "confidence": 0.0-1.0,
    "reasoning": "Brief explanation why this is/isn't actionable",
    "mission_briefing": {{
        "title": "Clear, actionable mission title (max 60 chars)",
        "urgency": "CRITICAL|HIGH|MEDIUM|LOW|INFO",
        "deadline": "Specific date/time or 'ASAP' or null",
        "action_required": "Specific next step to take",
        "context": "Brief context (1 sentence max)",
        "people_involved": ["person1", "person2"]
    }}
}}

URGENCY GUIDELINES:
- CRITICAL: Response needed within 2 hours (urgent meetings, emergencies)
- HIGH: Response needed today or tomorrow (important, time-sensitive requests)
- MEDIUM: Response needed within 3-7 days (follow-ups, scheduled tasks)
- LOW: Can be addressed when convenient
- INFO: No action required, just informational

If no actionable task is found, set "has_task": false and omit "mission_briefing".
Return ONLY valid JSON, no markdown or extra text."#,
        subject = message.subject,
        sender = message.sender,
        date = message.received_at,
        body = message.body,
    )
}

#[derive(Debug, Deserialize)]
struct Analysis {
    #[serde(default)]
    has_task: bool,
    confidence: Option<f32>,
    reasoning: Option<String>,
    mission_briefing: Option<Briefing>,
}

#[derive(Debug, Deserialize)]
struct Briefing {
    title: String,
    urgency: String,
    deadline: Option<String>,
    #[serde(default)]
    action_required: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    people_involved: Vec<String>,
}

/// Turn the model's reply into a verdict.
///
/// Tolerates a markdown code fence around the JSON.
pub fn parse_reply(reply: &str) -> Result<Verdict, ClassifyError> {
    let json = strip_code_fence(reply);
    let analysis: Analysis =
        serde_json::from_str(json).map_err(|e| ClassifyError::Malformed(e.to_string()))?;

    let reasoning = analysis.reasoning.unwrap_or_default();
    if !analysis.has_task {
        let mut verdict = Verdict::not_actionable(reasoning, json);
        verdict.confidence = analysis.confidence.unwrap_or_default();
        return Ok(verdict);
    }

    let briefing = analysis
        .mission_briefing
        .ok_or_else(|| ClassifyError::Malformed("has_task without mission_briefing".into()))?;
    let urgency: Urgency = briefing.urgency.parse().map_err(ClassifyError::Malformed)?;
    if briefing.title.trim().is_empty() {
        return Err(ClassifyError::Malformed("empty mission title".into()));
    }

    Ok(Verdict {
        actionable: true,
        urgency,
        summary: briefing.title.trim().to_string(),
        action: briefing.action_required.trim().to_string(),
        context: briefing.context.trim().to_string(),
        people: briefing
            .people_involved
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        deadline: briefing
            .deadline
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        confidence: analysis.confidence.unwrap_or_default(),
        reasoning,
        raw: json.to_string(),
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
