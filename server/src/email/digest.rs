use anyhow::Context;
use chrono::Utc;
use lettre::message::MultiPart;
use minijinja::render;
use serde::Serialize;

use crate::{email::client::GmailClient, error::AppResult, prompt::EmailSummary};

const DIGEST_FROM: &str = "Mail Digest <noreply@maildigest.app>";

const DIGEST_EMAIL_TEMPLATE: &str = r#"<html>
  <body style="font-family: sans-serif; color: #222;">
    <h2>Your email digest</h2>
    <p>{{ entries|length }} unread email(s) summarized on {{ date }}.</p>
    {% for entry in entries %}
    <div style="margin-bottom: 16px; padding: 12px; border: 1px solid #ddd; border-radius: 6px;">
      <h3 style="margin: 0 0 4px 0;">{{ loop.index }}. {{ entry.subject }}</h3>
      <p style="margin: 0; color: #666;">From: {{ entry.from }} &middot; Priority: {{ entry.priority }}</p>
      <p>{{ entry.summary }}</p>
      {% if entry.action_items %}
      <p style="margin-bottom: 4px;"><strong>Action items</strong></p>
      <ul style="margin-top: 0;">
        {% for item in entry.action_items %}
        <li>{{ item }}</li>
        {% endfor %}
      </ul>
      {% endif %}
    </div>
    {% endfor %}
  </body>
</html>"#;

#[derive(Debug, Serialize)]
struct DigestEntry {
    subject: String,
    from: String,
    priority: String,
    summary: String,
    action_items: Vec<String>,
}

impl From<&EmailSummary> for DigestEntry {
    fn from(summary: &EmailSummary) -> Self {
        DigestEntry {
            subject: summary.email.subject.clone(),
            from: summary.email.from.clone(),
            priority: summary.priority.to_string(),
            summary: summary.summary.clone(),
            action_items: summary.action_items.clone(),
        }
    }
}

/// Composes the per-run digest and sends it once through the mailbox
/// provider. Empty runs never reach this point; the handler short-circuits
/// before a dispatcher is built.
pub struct DigestMailer<'a> {
    client: &'a GmailClient,
}

impl<'a> DigestMailer<'a> {
    pub fn new(client: &'a GmailClient) -> DigestMailer<'a> {
        DigestMailer { client }
    }

    /// `"me"` is resolved to the mailbox owner's address right before
    /// composing; any other recipient is used as given. Send failures are
    /// fatal for the invocation.
    pub async fn send(&self, summaries: &[EmailSummary], recipient: &str) -> AppResult<()> {
        let to_address = if recipient == "me" {
            self.client
                .get_profile()
                .await?
                .email_address
                .context("Mailbox profile has no email address")?
        } else {
            recipient.to_string()
        };

        tracing::info!(
            "Sending digest of {} summarized email(s) to {}",
            summaries.len(),
            to_address
        );

        let raw_email = construct_digest(&to_address, summaries)?;
        self.client.send_message(&raw_email).await?;

        Ok(())
    }
}

fn construct_digest(to_address: &str, summaries: &[EmailSummary]) -> AppResult<Vec<u8>> {
    let date = Utc::now().format("%Y-%m-%d").to_string();
    let entries = summaries.iter().map(DigestEntry::from).collect::<Vec<_>>();

    let plain = render_plain(&date, &entries);
    let html = render!(DIGEST_EMAIL_TEMPLATE, date, entries);

    let email = lettre::Message::builder()
        .to(format!("<{to_address}>")
            .parse()
            .context("Could not parse digest recipient address")?)
        .from(DIGEST_FROM.parse().context("Could not parse digest sender")?)
        .subject(format!("Email digest for {date}"))
        .multipart(MultiPart::alternative_plain_html(plain, html))
        .context("Could not build digest message")?;

    Ok(email.formatted())
}

fn render_plain(date: &str, entries: &[DigestEntry]) -> String {
    let mut out = format!(
        "Your email digest\n{} unread email(s) summarized on {}.\n\n",
        entries.len(),
        date
    );

    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   From: {}\n   Priority: {}\n   Summary: {}\n",
            i + 1,
            entry.subject,
            entry.from,
            entry.priority,
            entry.summary
        ));

        if !entry.action_items.is_empty() {
            out.push_str("   Action items:\n");
            for item in &entry.action_items {
                out.push_str(&format!("     - {}\n", item));
            }
        }

        out.push('\n');
    }

    out
}
