//! CloudWatch Logs: the logs capability and the normalized event stream.
//!
//! `FilterLogEvents` is paginated by `nextToken`. [`log_event_stream`] hides
//! the pages behind one lazy stream: the next page is requested only when the
//! consumer has drained the current one, and every event comes out with its
//! millisecond timestamps decoded. Each call starts a fresh traversal.

use crate::client::AwsClient;
use crate::error::{AwsError, AwsResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SERVICE: &str = "logs";
const TARGET_PREFIX: &str = "Logs_20140328";

/// An event exactly as the service returned it.
pub type RawLogEvent = serde_json::Map<String, serde_json::Value>;

/// A log event with `timestamp` and `ingestionTime` decoded. Every other
/// field is carried through untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default)]
    pub log_stream_name: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ingestion_time: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LogEvent {
    pub fn from_raw(raw: RawLogEvent) -> AwsResult<Self> {
        serde_json::from_value(serde_json::Value::Object(raw))
            .map_err(|e| AwsError::parse(SERVICE, &format!("malformed log event: {}", e)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterLogEventsPage {
    pub events: Vec<RawLogEvent>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait LogsApi: Send + Sync {
    async fn filter_log_events(
        &self,
        log_group_name: &str,
        interleaved: bool,
        next_token: Option<&str>,
    ) -> AwsResult<FilterLogEventsPage>;
}

pub struct LogsClient {
    client: AwsClient,
}

impl LogsClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogsApi for LogsClient {
    async fn filter_log_events(
        &self,
        log_group_name: &str,
        interleaved: bool,
        next_token: Option<&str>,
    ) -> AwsResult<FilterLogEventsPage> {
        let mut body = serde_json::json!({
            "logGroupName": log_group_name,
            "interleaved": interleaved,
        });
        if let Some(token) = next_token {
            body["nextToken"] = serde_json::Value::String(token.to_string());
        }
        let target = format!("{}.FilterLogEvents", TARGET_PREFIX);
        self.client
            .json_target(SERVICE, &target, &body)
            .await
            .map_err(|e| e.with_action("FilterLogEvents"))?
            .json(SERVICE)
    }
}

pub type LogEventStream = BoxStream<'static, AwsResult<LogEvent>>;

/// Lazily page through every event in `log_group_name`.
pub fn log_event_stream(logs: Arc<dyn LogsApi>, log_group_name: String, interleaved: bool) -> LogEventStream {
    // `None` once the last page has been fetched; `Some(None)` before the first.
    let pages = stream::try_unfold(Some(None::<String>), move |state| {
        let logs = Arc::clone(&logs);
        let group = log_group_name.clone();
        async move {
            let token = match state {
                Some(token) => token,
                None => return Ok::<_, AwsError>(None),
            };
            let page = logs.filter_log_events(&group, interleaved, token.as_deref()).await?;
            log::debug!("Fetched {} log events from {}", page.events.len(), group);
            let next = page.next_token.map(Some);
            Ok(Some((page.events, next)))
        }
    });
    pages
        .map_ok(|events| stream::iter(events.into_iter().map(LogEvent::from_raw)))
        .try_flatten()
        .boxed()
}
