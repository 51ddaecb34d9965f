//! Audit request pipeline against the reasoning API.
//!
//! One audit is one request carrying the user query and a fixed instruction
//! prompt. Rate-limit responses are retried with exponential backoff; every
//! other failure is terminal for the call. The model's free-form answer is
//! expected to embed a single JSON object, which is cut out greedily (first `{`
//! to last `}`) and deserialized leniently into an [`AnalysisResult`].

use crate::engine::types::AnalysisResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, info, instrument, warn};

const GEMINI_API: &str = "https://generativelanguage.googleapis.com/v1beta";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Failures of a single audit call.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit query is empty")]
    EmptyQuery,
    #[error("An audit is already in flight")]
    AlreadyInFlight,
    #[error("No reasoning API key configured")]
    MissingCredential,
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: usize },
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("No JSON in response")]
    NoJson,
    #[error("Invalid JSON in response: {0}")]
    InvalidJson(String),
}

/// Raw HTTP outcome of one reasoning request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Carries a prepared request body to the reasoning API.
#[async_trait]
pub trait ReasoningTransport: Send + Sync {
    /// Whether an API credential is configured.
    fn has_credential(&self) -> bool;

    /// Send one request. Only connection-level failures are errors here;
    /// any HTTP status comes back as a response.
    async fn send(&self, body: &Value) -> Result<TransportResponse, AuditError>;
}

/// Reasoning transport for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(http: Client, api_key: Option<String>, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
            base_url: GEMINI_API.to_string(),
        }
    }
}

#[async_trait]
impl ReasoningTransport for GeminiClient {
    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, body), fields(model = %self.model))]
    async fn send(&self, body: &Value) -> Result<TransportResponse, AuditError> {
        let key = self.api_key.as_deref().ok_or(AuditError::MissingCredential)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", key)])
            .json(body)
            .send()
            .await
            .map_err(|e| AuditError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AuditError::Transport(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

/// Fixed auditor instruction naming the JSON shape the model must return.
pub fn system_prompt(query: &str) -> String {
    format!(
        r#"You are a professional cryptocurrency auditor. Analyze: "{query}".
Use Google Search to find real-time community sentiment and dev history.
IMPORTANT: You must return ONLY a JSON block. Do not write any conversational text.

JSON Schema:
{{
  "riskLevel": "LOW | MEDIUM | HIGH | CRITICAL",
  "verdict": "STRONG BUY | WATCH | AVOID",
  "confidence": number,
  "contractAddress": "string",
  "devProfile": {{ "reputation": "string", "history": "string" }},
  "socialSentiment": {{ "vibe": "string", "platformHighs": "string" }},
  "findings": ["finding 1", "finding 2"],
  "redFlags": ["flag 1"],
  "targets": {{"entry": "price", "exit": "price"}}
}}"#
    )
}

/// Request body: query, instruction, search tool enabled, all safety filters off.
pub fn build_request(query: &str) -> Value {
    let safety: Vec<Value> = SAFETY_CATEGORIES
        .iter()
        .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
        .collect();

    json!({
        "contents": [{ "parts": [{ "text": query }] }],
        "systemInstruction": { "parts": [{ "text": system_prompt(query) }] },
        "tools": [{ "google_search": {} }],
        "safetySettings": safety,
    })
}

/// Greedy span from the first `{` to the last `}`, if both exist in order.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Text of the first candidate, or the API's error message.
fn candidate_text(status: u16, body: &str) -> Result<String, AuditError> {
    let parsed: GenerateResponse = serde_json::from_str(body).unwrap_or_default();
    let api_error = |parsed: GenerateResponse| AuditError::Api {
        status,
        message: parsed
            .error
            .and_then(|e| e.message)
            .unwrap_or_else(|| "API Error".to_string()),
    };

    if !(200..300).contains(&status) {
        return Err(api_error(parsed));
    }

    let text = parsed
        .candidates
        .as_ref()
        .and_then(|candidates| candidates.first())
        .map(|candidate| {
            candidate
                .content
                .as_ref()
                .and_then(|content| content.parts.first())
                .and_then(|part| part.text.clone())
                .unwrap_or_default()
        });
    match text {
        Some(text) => Ok(text),
        None => Err(api_error(parsed)),
    }
}

/// Parse the embedded JSON object out of a model answer.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AuditError> {
    let span = extract_json(text).ok_or(AuditError::NoJson)?;
    serde_json::from_str(span).map_err(|e| AuditError::InvalidJson(e.to_string()))
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A claimed audit slot for one validated query.
pub struct AuditTicket<'a> {
    pipeline: &'a AuditPipeline,
    query: String,
    _guard: InFlightGuard<'a>,
}

impl AuditTicket<'_> {
    /// The trimmed query this ticket was issued for.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Send the request, retrying rate-limit responses, and parse the answer.
    #[instrument(skip(self), fields(query = %self.query))]
    pub async fn execute(self) -> Result<AnalysisResult, AuditError> {
        let pipeline = self.pipeline;
        let request = build_request(&self.query);
        let attempts = AtomicUsize::new(0);

        let text = RetryIf::start(
            pipeline.backoff(),
            || pipeline.attempt(&request, &attempts),
            |e: &AuditError| matches!(e, AuditError::RateLimited { .. }),
        )
        .await?;

        let result = parse_analysis(&text)?;
        info!(
            "Audit complete after {} attempt(s): {} risk",
            attempts.load(Ordering::Relaxed),
            result.risk_level.as_str()
        );
        Ok(result)
    }
}

/// Runs audits with an at-most-one-in-flight policy.
pub struct AuditPipeline {
    transport: Arc<dyn ReasoningTransport>,
    max_retries: usize,
    backoff_base_secs: u64,
    in_flight: AtomicBool,
}

impl AuditPipeline {
    pub fn new(transport: Arc<dyn ReasoningTransport>, max_retries: usize, backoff_base_secs: u64) -> Self {
        Self {
            transport,
            max_retries,
            backoff_base_secs,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_credential(&self) -> bool {
        self.transport.has_credential()
    }

    /// Delays before each retry: base^1, base^2, ... seconds.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.backoff_base_secs.max(1))
            .factor(1000)
            .take(self.max_retries)
    }

    /// Validate `query` and claim the in-flight slot.
    ///
    /// Rejects empty queries, a missing credential, and a concurrent audit
    /// before anything is sent. The slot is released when the ticket drops.
    pub fn begin(&self, query: &str) -> Result<AuditTicket<'_>, AuditError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AuditError::EmptyQuery);
        }
        if !self.transport.has_credential() {
            return Err(AuditError::MissingCredential);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AuditError::AlreadyInFlight);
        }
        Ok(AuditTicket {
            pipeline: self,
            query: query.to_string(),
            _guard: InFlightGuard(&self.in_flight),
        })
    }

    /// Run one audit for `query`.
    pub async fn run_audit(&self, query: &str) -> Result<AnalysisResult, AuditError> {
        self.begin(query)?.execute().await
    }

    async fn attempt(&self, request: &Value, attempts: &AtomicUsize) -> Result<String, AuditError> {
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let response = self.transport.send(request).await?;
        if response.status == 429 {
            warn!("Reasoning API rate limited (attempt {})", attempt);
            return Err(AuditError::RateLimited { attempts: attempt });
        }
        debug!("Reasoning API answered {} on attempt {}", response.status, attempt);
        candidate_text(response.status, &response.body)
    }
}
