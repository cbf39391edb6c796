use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

const MIME_TEXT_PLAIN: &str = "text/plain";
const MIME_TEXT_HTML: &str = "text/html";

/// `GET users/me/messages` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesResponse {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

/// `GET users/me/messages/{id}?format=full` response. Headers and body live
/// in a nested MIME-part tree under `payload`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePartBody {
    #[serde(default)]
    pub size: u64,
    /// base64url-encoded content, padded or not depending on the part.
    pub data: Option<String>,
}

/// Uniform in-memory record for one fetched message. Lives for a single
/// invocation and is dropped after the digest goes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub snippet: String,
    pub body: String,
}

impl EmailMessage {
    /// Missing headers get fixed placeholders instead of failing the run.
    pub fn from_full_message(msg: FullMessage) -> Self {
        let headers: &[Header] = msg
            .payload
            .as_ref()
            .map(|p| p.headers.as_slice())
            .unwrap_or_default();

        let subject =
            header_value(headers, "Subject").unwrap_or_else(|| "No Subject".to_string());
        let from = header_value(headers, "From").unwrap_or_else(|| "Unknown".to_string());
        let date = header_value(headers, "Date").unwrap_or_default();

        let body = msg.payload.as_ref().map(extract_body).unwrap_or_default();

        EmailMessage {
            id: msg.id,
            thread_id: msg.thread_id,
            subject,
            from,
            date,
            snippet: msg.snippet,
            body,
        }
    }
}

fn header_value(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Body extraction in strict priority order: inline payload data, then the
/// first `text/plain` sub-part carrying data, then `text/html`, else empty.
/// Only immediate sub-parts are scanned.
pub fn extract_body(payload: &MessagePart) -> String {
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        return decode_body_data(data);
    }

    if let Some(text) = find_part_text(&payload.parts, MIME_TEXT_PLAIN) {
        return text;
    }

    if let Some(text) = find_part_text(&payload.parts, MIME_TEXT_HTML) {
        return text;
    }

    String::new()
}

fn find_part_text(parts: &[MessagePart], mime_type: &str) -> Option<String> {
    parts
        .iter()
        .filter(|part| part.mime_type == mime_type)
        .find_map(|part| part.body.as_ref().and_then(|b| b.data.as_deref()))
        .map(decode_body_data)
}

/// base64url to UTF-8 text. Gmail pads inconsistently, so padding is
/// stripped before decoding; invalid UTF-8 is replaced, never fatal.
fn decode_body_data(data: &str) -> String {
    match URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Could not decode message body data: {}", e);
            String::new()
        }
    }
}
