use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    email::{client::GmailClient, digest::DigestMailer},
    error::{AppJsonResult, AppResult},
    prompt::{EmailSummary, Priority, Summarizer},
    ServerState,
};

/// The orchestration layer asks for more than the fetcher's default.
const FETCH_LIMIT: u32 = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeResponse {
    pub success: bool,
    pub message: String,
    pub emails_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<SummaryEntry>>,
}

#[derive(Debug, Serialize)]
pub struct SummaryEntry {
    pub subject: String,
    pub from: String,
    pub priority: Priority,
    pub summary: String,
}

impl SummarizeResponse {
    fn nothing_to_process() -> SummarizeResponse {
        SummarizeResponse {
            success: true,
            message: "No unread emails to process".to_string(),
            emails_processed: 0,
            summaries: None,
        }
    }

    fn sent(summaries: &[EmailSummary]) -> SummarizeResponse {
        let entries = summaries
            .iter()
            .map(|s| SummaryEntry {
                subject: s.email.subject.clone(),
                from: s.email.from.clone(),
                priority: s.priority,
                summary: s.summary.clone(),
            })
            .collect::<Vec<_>>();

        SummarizeResponse {
            success: true,
            message: "Email summary sent successfully".to_string(),
            emails_processed: summaries.len(),
            summaries: Some(entries),
        }
    }
}

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            // Trigger-style invocation: any method works, bodies are ignored.
            .route("/", any(handler_summarize))
            .route("/summarize", any(handler_summarize))
            .route("/healthz", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}

async fn handler_summarize(State(state): State<ServerState>) -> AppJsonResult<SummarizeResponse> {
    tracing::info!("Email summarizer invoked");
    run_digest(&state).await.map(Json)
}

/// One full pass: validate secrets, fetch unread mail, summarize each
/// message in order, send a single digest. Stateless across invocations.
async fn run_digest(state: &ServerState) -> AppResult<SummarizeResponse> {
    state.config.validate()?;

    let client = GmailClient::new(state.http_client.clone(), state.config.gmail.clone());

    tracing::info!("Fetching unread emails...");
    let emails = client.fetch_unread(Some(FETCH_LIMIT)).await?;

    if emails.is_empty() {
        tracing::info!("No unread emails to process");
        return Ok(SummarizeResponse::nothing_to_process());
    }

    tracing::info!("Found {} unread email(s)", emails.len());

    let summarizer = Summarizer::new(state.http_client.clone(), &state.config.chat)?;
    let summaries = summarizer.summarize_all(&emails).await;

    tracing::info!("Sending summary email...");
    let mailer = DigestMailer::new(&client);
    mailer.send(&summaries, state.config.recipient()).await?;

    Ok(SummarizeResponse::sent(&summaries))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use axum::{
        body::Body,
        extract::Path,
        http::{Request, StatusCode},
        routing::{get, post},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        server_config::{AppConfig, ChatApiConfig, GmailConfig},
        testing, HttpClient,
    };

    #[derive(Clone, Default)]
    struct UpstreamCounters {
        chat_calls: Arc<AtomicUsize>,
        send_calls: Arc<AtomicUsize>,
    }

    /// One loopback server standing in for both Gmail and the chat API.
    async fn spawn_upstreams(unread_ids: Vec<&'static str>, counters: UpstreamCounters) -> String {
        let chat_calls = counters.chat_calls.clone();
        let send_calls = counters.send_calls.clone();

        let router = Router::new()
            .route(
                "/token",
                post(|| async {
                    Json(json!({
                        "access_token": "tok",
                        "token_type": "Bearer",
                        "expires_in": 3599,
                        "scope": "gmail"
                    }))
                }),
            )
            .route(
                "/messages",
                get(move || {
                    let ids = unread_ids.clone();
                    async move {
                        let messages = ids
                            .iter()
                            .map(|id| json!({ "id": id, "threadId": format!("t-{id}") }))
                            .collect::<Vec<_>>();
                        Json(json!({
                            "messages": messages,
                            "resultSizeEstimate": messages.len()
                        }))
                    }
                }),
            )
            .route(
                "/messages/:id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "id": id,
                        "threadId": format!("t-{id}"),
                        "snippet": "snippet",
                        "payload": {
                            "mimeType": "text/plain",
                            "headers": [
                                { "name": "Subject", "value": format!("Subject {id}") },
                                { "name": "From", "value": "sender@example.com" }
                            ],
                            "body": { "size": 5, "data": "SGVsbG8=" }
                        }
                    }))
                }),
            )
            .route(
                "/profile",
                get(|| async { Json(json!({ "emailAddress": "owner@example.com" })) }),
            )
            .route(
                "/messages/send",
                post(move || {
                    let send_calls = send_calls.clone();
                    async move {
                        send_calls.fetch_add(1, Ordering::SeqCst);
                        Json(json!({ "id": "sent-1" }))
                    }
                }),
            )
            .route(
                "/chat",
                post(move || {
                    let chat_calls = chat_calls.clone();
                    async move {
                        chat_calls.fetch_add(1, Ordering::SeqCst);
                        Json(json!({
                            "choices": [{
                                "index": 0,
                                "message": {
                                    "role": "assistant",
                                    "content": r#"{"summary":"A summary.","actionItems":[],"priority":"low"}"#
                                },
                                "finish_reason": "stop"
                            }],
                            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
                        }))
                    }
                }),
            );

        testing::spawn_server(router).await
    }

    fn state_for(base: &str, api_key: &str) -> ServerState {
        ServerState {
            http_client: HttpClient::new(),
            config: AppConfig {
                gmail: GmailConfig {
                    client_id: "id".to_string(),
                    client_secret: "secret".to_string(),
                    refresh_token: "refresh".to_string(),
                    token_uri: format!("{base}/token"),
                    api_base: base.to_string(),
                },
                chat: ChatApiConfig {
                    key: api_key.to_string(),
                    endpoint: format!("{base}/chat"),
                    ..ChatApiConfig::default()
                },
                ..AppConfig::default()
            },
        }
    }

    async fn invoke(state: ServerState, uri: &str) -> (StatusCode, Value) {
        let app = AppRouter::create(state);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);

        (status, body)
    }

    #[tokio::test]
    async fn healthz_answers_unconditionally() {
        let state = state_for("http://127.0.0.1:9", "key");
        let app = AppRouter::create(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn missing_mailbox_secrets_fail_before_any_network_call() {
        let counters = UpstreamCounters::default();
        let base = spawn_upstreams(vec!["m1"], counters.clone()).await;

        let mut state = state_for(&base, "key");
        state.config.gmail.client_id = String::new();
        state.config.gmail.refresh_token = String::new();

        let (status, body) = invoke(state, "/summarize").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], json!(false));
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("GMAIL_CLIENT_ID"));
        assert!(error.contains("GMAIL_REFRESH_TOKEN"));
        assert_eq!(counters.chat_calls.load(Ordering::SeqCst), 0);
        assert_eq!(counters.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_unread_mail_short_circuits_before_summarize_and_send() {
        let counters = UpstreamCounters::default();
        let base = spawn_upstreams(vec![], counters.clone()).await;

        let (status, body) = invoke(state_for(&base, "key"), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["message"], json!("No unread emails to process"));
        assert_eq!(body["emailsProcessed"], json!(0));
        assert!(body.get("summaries").is_none());
        assert_eq!(counters.chat_calls.load(Ordering::SeqCst), 0);
        assert_eq!(counters.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn processed_mail_yields_summaries_and_one_send() {
        let counters = UpstreamCounters::default();
        let base = spawn_upstreams(vec!["m1", "m2"], counters.clone()).await;

        let (status, body) = invoke(state_for(&base, "key"), "/summarize").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["message"], json!("Email summary sent successfully"));
        assert_eq!(body["emailsProcessed"], json!(2));

        let summaries = body["summaries"].as_array().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0]["subject"], json!("Subject m1"));
        assert_eq!(summaries[0]["from"], json!("sender@example.com"));
        assert_eq!(summaries[0]["priority"], json!("low"));
        assert_eq!(summaries[0]["summary"], json!("A summary."));

        assert_eq!(counters.chat_calls.load(Ordering::SeqCst), 2);
        assert_eq!(counters.send_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_api_key_with_unread_mail_is_fatal() {
        let counters = UpstreamCounters::default();
        let base = spawn_upstreams(vec!["m1", "m2", "m3"], counters.clone()).await;

        let (status, body) = invoke(state_for(&base, ""), "/summarize").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
        assert_eq!(counters.chat_calls.load(Ordering::SeqCst), 0);
        assert_eq!(counters.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_routes_hit_the_fallback() {
        let state = state_for("http://127.0.0.1:9", "key");
        let app = AppRouter::create(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
