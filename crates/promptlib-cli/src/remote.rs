//! HTTP client for the hosted document store.
//!
//! Reads go through the query endpoint, writes through the mutate endpoint
//! with `returnDocuments=true`, and the change feed is the listen endpoint's
//! server-sent event stream.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use promptlib_core::config::StoreConfig;
use promptlib_core::error::{StoreError, TransportError};
use promptlib_core::event::{EventError, RawChangeEvent};
use promptlib_core::store::{PromptStore, RawEventStream};
use promptlib_core::{Prompt, PromptDraft, PromptId, PromptPatch};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::sse::{SseDecoder, SseMessage};

const DOCUMENT_TYPE: &str = "prompt";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_QUERY: &str = r#"*[_type == "prompt"] | order(_createdAt desc) {
  _id, title, prompt, useCase, category, tags, dateAdded, isFavorite, featured, _createdAt, _updatedAt
}"#;
const LISTEN_QUERY: &str = r#"*[_type == "prompt"]"#;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Vec<Prompt>,
}

#[derive(Debug, Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Debug, Deserialize)]
struct MutateResult {
    #[serde(default)]
    document: Option<Prompt>,
}

/// [`PromptStore`] backed by the store's HTTP API.
pub struct HttpStore {
    config: StoreConfig,
    api: Client,
    /// No overall timeout; the listen stream stays open indefinitely.
    stream: Client,
}

impl HttpStore {
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the HTTP client cannot be built.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let api = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let stream = Client::builder()
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        info!(
            project = %config.redacted_project_id(),
            dataset = %config.dataset,
            "using hosted store"
        );
        Ok(Self {
            config,
            api,
            stream,
        })
    }

    fn base_url(&self, cdn: bool) -> String {
        let host = if cdn { "apicdn" } else { "api" };
        format!(
            "https://{}.{host}.sanity.io/v{}",
            self.config.project_id, self.config.api_version
        )
    }

    /// The CDN serves cached queries and cannot see private datasets.
    fn query_url(&self) -> String {
        let cdn = self.config.use_cdn && self.config.token.is_none();
        format!("{}/data/query/{}", self.base_url(cdn), self.config.dataset)
    }

    /// Listen and mutate only exist on the live API.
    fn live_url(&self, endpoint: &str) -> String {
        format!("{}/data/{endpoint}/{}", self.base_url(false), self.config.dataset)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn mutate(&self, mutation: Value) -> Result<Prompt, StoreError> {
        let token = self
            .config
            .require_token()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let response = self
            .api
            .post(self.live_url("mutate"))
            .query(&[("returnDocuments", "true"), ("visibility", "sync")])
            .bearer_auth(token)
            .json(&json!({ "mutations": [mutation] }))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let body: MutateResponse = decode(checked(response).await?).await?;
        body.results
            .into_iter()
            .next()
            .and_then(|result| result.document)
            .ok_or_else(|| StoreError::Malformed("mutation returned no document".into()))
    }
}

async fn checked(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| error_description(&body))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Pull `error.description` (or `message`) out of an error body.
fn error_description(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/description")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl PromptStore for HttpStore {
    async fn fetch_all(&self) -> Result<Vec<Prompt>, StoreError> {
        let request = self
            .api
            .get(self.query_url())
            .query(&[("query", LIST_QUERY)]);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let body: QueryResponse = decode(checked(response).await?).await?;
        let prompts: Vec<Prompt> = body
            .result
            .into_iter()
            .filter(|prompt| !prompt.id.is_draft())
            .collect();
        debug!(count = prompts.len(), "fetched prompts");
        Ok(prompts)
    }

    async fn create(&self, draft: &PromptDraft) -> Result<Prompt, StoreError> {
        let mut document =
            serde_json::to_value(draft).map_err(|e| StoreError::Malformed(e.to_string()))?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert("_type".into(), Value::from(DOCUMENT_TYPE));
        }
        self.mutate(json!({ "create": document })).await
    }

    async fn patch(&self, id: &PromptId, patch: &PromptPatch) -> Result<Prompt, StoreError> {
        self.mutate(json!({ "patch": { "id": id, "set": patch } }))
            .await
            .map_err(|err| match err {
                StoreError::Rejected { status: 404, .. } => StoreError::Missing(id.clone()),
                other => other,
            })
    }

    async fn listen(&self) -> Result<RawEventStream, TransportError> {
        let request = self
            .stream
            .get(self.live_url("listen"))
            .query(&[
                ("query", LISTEN_QUERY),
                ("includeResult", "true"),
                ("visibility", "query"),
            ])
            .header(header::ACCEPT, "text/event-stream");
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "listen returned {}",
                response.status()
            )));
        }

        let events = response
            .bytes_stream()
            .scan(SseDecoder::new(), |decoder, chunk| {
                let batch: Vec<Result<RawChangeEvent, TransportError>> = match chunk {
                    Ok(bytes) => decoder.push(&bytes).into_iter().filter_map(to_raw_event).collect(),
                    Err(e) => vec![Err(TransportError::Stream(e.to_string()))],
                };
                futures::future::ready(Some(stream::iter(batch)))
            })
            .flatten();
        Ok(events.boxed())
    }
}

/// Turn one SSE message into a raw feed event.
///
/// The event name carries the kind; the JSON body carries the rest.
/// Unpublished drafts are filtered out here.
fn to_raw_event(message: SseMessage) -> Option<Result<RawChangeEvent, TransportError>> {
    if message.event == "channelError" {
        let detail = serde_json::from_str::<Value>(&message.data)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(message.data);
        return Some(Err(TransportError::Channel(detail)));
    }

    let mut body = match serde_json::from_str::<Value>(&message.data) {
        Ok(Value::Object(body)) => body,
        Ok(_) => serde_json::Map::new(),
        Err(e) => {
            return Some(Err(EventError::Decode(format!(
                "undecodable {} event: {e}",
                message.event
            ))
            .into()));
        }
    };
    if body
        .get("documentId")
        .and_then(Value::as_str)
        .is_some_and(|id| PromptId::new(id).is_draft())
    {
        return None;
    }
    body.insert("type".into(), Value::from(message.event));

    Some(
        serde_json::from_value::<RawChangeEvent>(Value::Object(body))
            .map_err(|e| EventError::Decode(e.to_string()).into()),
    )
}
