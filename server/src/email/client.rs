use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use crate::{
    email::message::{EmailMessage, FullMessage, ListMessagesResponse},
    error::AppResult,
    server_config::GmailConfig,
    HttpClient,
};

pub const DEFAULT_FETCH_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct GmailApiRefreshTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: Option<String>,
    pub messages_total: Option<u64>,
    pub threads_total: Option<u64>,
}

/// Authenticated handle to one Gmail mailbox, scoped to reading and sending
/// mail. Construction does no network work; the short-lived access token is
/// exchanged from the refresh token on first use and cached for the rest of
/// the invocation.
#[derive(Debug)]
pub struct GmailClient {
    http_client: HttpClient,
    config: GmailConfig,
    access_token: OnceCell<String>,
}

impl GmailClient {
    pub fn new(http_client: HttpClient, config: GmailConfig) -> GmailClient {
        GmailClient {
            http_client,
            config,
            access_token: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base, path)
    }

    async fn access_token(&self) -> AppResult<&str> {
        self.access_token
            .get_or_try_init(|| self.exchange_refresh_token())
            .await
            .map(String::as_str)
    }

    async fn exchange_refresh_token(&self) -> AppResult<String> {
        let resp = self
            .http_client
            .post(&self.config.token_uri)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let resp = resp.json::<serde_json::Value>().await?;

        if resp.get("error").is_some() {
            let description = resp
                .get("error_description")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            tracing::error!("Error refreshing token: {:?}", resp);
            return Err(anyhow!("Could not refresh mailbox access token: {}", description).into());
        }

        let resp = serde_json::from_value::<GmailApiRefreshTokenResponse>(resp.clone())
            .map_err(|_| anyhow!("Unexpected oauth2 token response: {}", resp))?;

        Ok(resp.access_token)
    }

    pub async fn list_unread(&self, max_results: u32) -> AppResult<ListMessagesResponse> {
        let token = self.access_token().await?;
        let resp = self
            .http_client
            .get(self.url("messages"))
            .query(&[
                ("q", "is:unread".to_string()),
                ("maxResults", max_results.to_string()),
            ])
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Error listing messages ({}): {}", status, body).into());
        }

        let data = resp.json::<ListMessagesResponse>().await?;

        Ok(data)
    }

    pub async fn get_message(&self, message_id: &str) -> AppResult<FullMessage> {
        let token = self.access_token().await?;
        let resp = self
            .http_client
            .get(self.url(&format!("messages/{}", message_id)))
            .query(&[("format", "full")])
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Error getting message {} ({}): {}",
                message_id,
                status,
                body
            )
            .into());
        }

        resp.json::<FullMessage>()
            .await
            .context("Error parsing message")
            .map_err(Into::into)
    }

    /// Lists unread message ids (capped at `limit`, or [`DEFAULT_FETCH_LIMIT`])
    /// and retrieves each one in provider order. Zero matches is an empty
    /// Vec, not an error; any individual retrieval failure is fatal for the
    /// whole fetch.
    pub async fn fetch_unread(&self, limit: Option<u32>) -> AppResult<Vec<EmailMessage>> {
        let listing = self
            .list_unread(limit.unwrap_or(DEFAULT_FETCH_LIMIT))
            .await?;

        if listing.messages.is_empty() {
            tracing::info!("No unread emails found");
            return Ok(Vec::new());
        }

        let mut emails = Vec::with_capacity(listing.messages.len());
        for message_ref in listing.messages {
            let full = self.get_message(&message_ref.id).await?;
            emails.push(EmailMessage::from_full_message(full));
        }

        Ok(emails)
    }

    pub async fn get_profile(&self) -> AppResult<Profile> {
        let token = self.access_token().await?;
        let resp = self
            .http_client
            .get(self.url("profile"))
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(anyhow!("Error getting profile ({})", status).into());
        }

        Ok(resp.json::<Profile>().await?)
    }

    /// Sends one RFC 2822 message through the mailbox provider.
    pub async fn send_message(&self, raw_message: &[u8]) -> AppResult<()> {
        let token = self.access_token().await?;
        let raw = URL_SAFE.encode(raw_message);

        let resp = self
            .http_client
            .post(self.url("messages/send"))
            .bearer_auth(token)
            .json(&json!({ "raw": raw }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Error sending message ({}): {}", status, body).into());
        }

        Ok(())
    }
}
