use std::fmt;

use anyhow::anyhow;
use indoc::formatdoc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    email::message::EmailMessage,
    error::{AppError, AppResult},
    server_config::ChatApiConfig,
    HttpClient,
};

const SYSTEM_PROMPT: &str =
    "You are an email assistant that summarizes emails concisely and identifies action items.";

/// Bodies are capped before prompting; anything past this many characters is
/// replaced with an ellipsis marker.
const BODY_CHAR_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// One summarized message. At most one of these per fetched email.
#[derive(Debug, Clone)]
pub struct EmailSummary {
    pub email: EmailMessage,
    pub summary: String,
    pub action_items: Vec<String>,
    pub priority: Priority,
}

impl EmailSummary {
    /// Deterministic stand-in used whenever the chat call fails or returns
    /// unusable output.
    fn fallback(email: &EmailMessage) -> EmailSummary {
        EmailSummary {
            summary: format!("Email from {}: {}", email.from, email.subject),
            action_items: Vec::new(),
            priority: Priority::Medium,
            email: email.clone(),
        }
    }
}

/// The structured answer requested from the model.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryJson {
    #[serde(default = "default_summary_text")]
    summary: String,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    priority: Priority,
}

fn default_summary_text() -> String {
    "Unable to generate summary".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatApiResponse {
    choices: Vec<ChatChoice>,
    usage: Option<PromptUsage>,
}

#[derive(Debug, Deserialize)]
struct PromptUsage {
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ChatApiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatApiErrorEnvelope {
    error: ChatApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiErrorEnvelope),
}

#[derive(Debug)]
pub struct Summarizer {
    http_client: HttpClient,
    config: ChatApiConfig,
}

impl Summarizer {
    /// The API key is a precondition for the whole run, checked once here
    /// rather than per message.
    pub fn new(http_client: HttpClient, config: &ChatApiConfig) -> AppResult<Summarizer> {
        if config.key.is_empty() {
            return Err(AppError::MissingConfig(vec!["OPENAI_API_KEY".to_string()]));
        }

        Ok(Summarizer {
            http_client,
            config: config.clone(),
        })
    }

    /// Summarizes strictly one message at a time, in input order. A message
    /// whose summarization errors out is logged and dropped; the rest of the
    /// run continues.
    pub async fn summarize_all(&self, emails: &[EmailMessage]) -> Vec<EmailSummary> {
        let mut summaries = Vec::with_capacity(emails.len());

        for email in emails {
            match self.summarize_one(email).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    tracing::error!("Error processing email {}: {}", email.id, e);
                }
            }
        }

        summaries
    }

    /// Transport errors, bad statuses, missing content, and malformed answer
    /// JSON all collapse into the fallback summary. An error envelope from
    /// the API itself still propagates.
    pub async fn summarize_one(&self, email: &EmailMessage) -> AppResult<EmailSummary> {
        match self.request_summary(email).await {
            Ok(parsed) => {
                Ok(EmailSummary {
                    email: email.clone(),
                    summary: parsed.summary,
                    action_items: parsed.action_items,
                    priority: parsed.priority,
                })
            }
            Err(AppError::ChatApi(message)) => Err(AppError::ChatApi(message)),
            Err(e) => {
                tracing::warn!("Chat call failed for email {}, using fallback: {}", email.id, e);
                Ok(EmailSummary::fallback(email))
            }
        }
    }

    async fn request_summary(&self, email: &EmailMessage) -> AppResult<SummaryJson> {
        let resp = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.key)
            .json(&json!({
                "model": &self.config.model,
                "temperature": self.config.temperature,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": build_prompt(email) }
                ],
                "response_format": { "type": "json_object" }
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("Chat API returned status {}", resp.status()).into());
        }

        let value = resp.json::<serde_json::Value>().await?;
        let parsed = serde_json::from_value::<ChatApiResponseOrError>(value.clone())
            .map_err(|_| anyhow!("Could not parse chat response: {}", value))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(envelope) => {
                return Err(AppError::ChatApi(envelope.error.message));
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        if let Some(usage) = &parsed.usage {
            tracing::debug!("Chat API used {} tokens", usage.total_tokens);
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("No content received from chat API"))?;

        serde_json::from_str::<SummaryJson>(&content)
            .map_err(|e| anyhow!("Malformed summary JSON: {}", e).into())
    }
}

fn build_prompt(email: &EmailMessage) -> String {
    let (body, truncated) = truncate_chars(&email.body, BODY_CHAR_LIMIT);

    formatdoc! {r#"
        Analyze the following email and provide:
        1. A brief summary (2-3 sentences)
        2. Action items (if any)
        3. Priority level (high/medium/low)

        Email Subject: {subject}
        From: {from}
        Date: {date}
        Body:
        {body}{marker}

        Respond in JSON format:
        {{
          "summary": "Brief summary here",
          "actionItems": ["action 1", "action 2"],
          "priority": "medium"
        }}"#,
        subject = email.subject,
        from = email.from,
        date = email.date,
        body = body,
        marker = if truncated { " ..." } else { "" },
    }
}

/// Truncation respects char boundaries; byte slicing would panic mid-glyph.
fn truncate_chars(s: &str, limit: usize) -> (&str, bool) {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => (&s[..idx], true),
        None => (s, false),
    }
}
