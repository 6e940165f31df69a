//! AgentGuard Stream - Redis Streams transport for asynchronous enrichment
//!
//! Two logical streams connect the interceptor to the enrichment worker:
//! `events` (interceptor → worker) and `insights` (worker → subscribers),
//! each capped at an approximate length so the stream never grows
//! unbounded. Delivery is at-least-once via consumer groups.

use agentguard_core::{Decision, EnrichmentInsight, Event, StreamError};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::BTreeMap;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;

/// Interceptor → worker stream name.
pub const EVENTS_STREAM: &str = "agentguard:events";
/// Worker → subscribers stream name.
pub const INSIGHTS_STREAM: &str = "agentguard:insights";
/// Approximate cap (`MAXLEN ~`) applied to both streams on every publish.
pub const STREAM_MAXLEN: usize = 10_000;

/// Flatten an [`Event`]'s identifying fields into the string-keyed mapping
/// the stream wire format requires.
pub fn event_to_fields(event: &Event) -> Vec<(String, String)> {
    let decision = match event.decision {
        Decision::Allow => "allow",
        Decision::Review => "review",
        Decision::Block => "block",
    };
    vec![
        ("event_id".to_string(), event.event_id.to_string()),
        ("session_id".to_string(), event.session_id.to_string()),
        ("agent_id".to_string(), event.agent_id.to_string()),
        ("tool_name".to_string(), event.action.tool_name.clone()),
        ("action_type".to_string(), event.action.action_type.to_string()),
        ("decision".to_string(), decision.to_string()),
        ("risk_score".to_string(), event.assessment.risk_score().to_string()),
        ("agent_goal".to_string(), event.agent_goal.clone()),
        ("framework".to_string(), event.framework.clone()),
        ("timestamp".to_string(), event.timestamp.to_rfc3339()),
    ]
}

/// Flatten a rendered [`EnrichmentInsight`] for the insights stream.
pub fn insight_to_fields(insight: &EnrichmentInsight) -> Vec<(String, String)> {
    vec![
        ("insight_id".to_string(), insight.insight_id.to_string()),
        ("event_id".to_string(), insight.event_id.to_string()),
        ("attack_pattern".to_string(), insight.attack_pattern.to_string()),
        ("confidence".to_string(), insight.confidence.to_string()),
        ("severity".to_string(), format!("{:?}", insight.severity).to_lowercase()),
        ("summary".to_string(), insight.summary.clone()),
        ("recommended_action".to_string(), insight.recommended_action.clone()),
        (
            "false_positive_likelihood".to_string(),
            insight.false_positive_likelihood.to_string(),
        ),
        ("created_at".to_string(), insight.created_at.to_rfc3339()),
    ]
}

/// A single stream entry as read back from Redis: its id plus the flat
/// field mapping it was published with.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

async fn connect(url: &str) -> Result<ConnectionManager, StreamError> {
    let client = redis::Client::open(url)
        .map_err(|e| StreamError::ConnectionFailed { reason: e.to_string() })?;
    client
        .get_connection_manager()
        .await
        .map_err(|e| StreamError::ConnectionFailed { reason: e.to_string() })
}

/// Connection-lazy publisher. Disabled (all publishes are no-ops) when
/// constructed without a URL — the interceptor falls back to in-process
/// enrichment in that case, never observing a transport error.
pub struct RedisStreamPublisher {
    url: Option<String>,
    conn: OnceCell<ConnectionManager>,
}

impl RedisStreamPublisher {
    pub fn new(url: Option<String>) -> Self {
        Self { url, conn: OnceCell::new() }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("REDIS_URL").ok())
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        let url = self.url.as_ref()?;
        match self.conn.get_or_try_init(|| connect(url)).await {
            Ok(conn) => Some(conn.clone()),
            Err(e) => {
                warn!(error = %e, "stream_publish_connect_failed");
                None
            }
        }
    }

    /// Publish an event to the `events` stream. A no-op (silently) if the
    /// publisher is disabled or the transport fails — callers must never
    /// see this as an error (§4.6).
    pub async fn publish_event(&self, event: &Event) {
        self.publish(EVENTS_STREAM, event_to_fields(event)).await;
    }

    /// Publish a rendered insight to the `insights` stream.
    pub async fn publish_insight(&self, insight: &EnrichmentInsight) {
        self.publish(INSIGHTS_STREAM, insight_to_fields(insight)).await;
    }

    async fn publish(&self, stream: &str, fields: Vec<(String, String)>) {
        let Some(mut conn) = self.connection().await else { return };
        let result: redis::RedisResult<String> = redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(STREAM_MAXLEN)
            .arg("*")
            .arg(&fields)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(error = %e, stream, "stream_publish_failed");
        }
    }
}

/// Consumer-group reader for one stream. Each `poll` reads up to 10 new
/// entries with a 500ms blocking wait; callers ack explicitly after a
/// handler succeeds.
pub struct RedisStreamConsumer {
    url: String,
    stream: String,
    group: String,
    consumer_name: String,
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisStreamConsumer {
    pub fn new(
        url: impl Into<String>,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            stream: stream.into(),
            group: group.into(),
            consumer_name: consumer_name.into(),
            conn: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, StreamError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = connect(&self.url).await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Idempotent: `BUSYGROUP` (group already exists) is treated as success.
    pub async fn ensure_group(&self) -> Result<(), StreamError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(StreamError::ConsumerGroup { reason: e.to_string() }),
        }
    }

    /// Read up to 10 undelivered entries, blocking up to 500ms.
    pub async fn poll(&self) -> Result<Vec<StreamMessage>, StreamError> {
        let mut conn = self.connection().await?;
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(10)
            .block(500);
        let reply: StreamReadReply = conn
            .xread_options(&[self.stream.as_str()], &[">"], &opts)
            .await
            .map_err(|e| StreamError::ConsumerGroup { reason: e.to_string() })?;

        let mut messages = Vec::new();
        for key in reply.keys {
            for id_entry in key.ids {
                let mut fields = BTreeMap::new();
                for (field, value) in id_entry.map {
                    if let redis::Value::BulkString(bytes) = value {
                        fields.insert(field, String::from_utf8_lossy(&bytes).into_owned());
                    }
                }
                messages.push(StreamMessage { id: id_entry.id, fields });
            }
        }
        Ok(messages)
    }

    pub async fn ack(&self, id: &str) -> Result<(), StreamError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[id])
            .await
            .map_err(|e| StreamError::ConsumerGroup { reason: e.to_string() })?;
        Ok(())
    }

    /// Poll once and run `handler` over every message, acking on success.
    /// A handler failure is logged and the entry is left unacknowledged so
    /// another consumer (or a retry) can pick it up.
    pub async fn run_once<F, Fut>(&self, mut handler: F) -> Result<usize, StreamError>
    where
        F: FnMut(StreamMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), StreamError>>,
    {
        let messages = self.poll().await?;
        let mut handled = 0;
        for message in messages {
            let id = message.id.clone();
            match handler(message).await {
                Ok(()) => {
                    self.ack(&id).await?;
                    handled += 1;
                }
                Err(e) => {
                    warn!(error = %e, entry_id = %id, "enrichment_triage_failed");
                }
            }
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentguard_core::{Action, ActionId, ActionType, AgentId, EventId, RiskAssessment, SessionId};
    use std::collections::BTreeMap as Map;

    fn sample_event() -> Event {
        Event {
            event_id: EventId::now_v7(),
            session_id: SessionId::now_v7(),
            agent_id: AgentId::now_v7(),
            agent_is_registered: true,
            agent_goal: "summarize PRs".to_string(),
            action: Action {
                action_id: ActionId::now_v7(),
                action_type: ActionType::ShellCommand,
                tool_name: "bash".to_string(),
                parameters: Map::new(),
                raw_payload: serde_json::Value::Null,
                timestamp: chrono::Utc::now(),
            },
            assessment: RiskAssessment::new(0.9, "r", vec!["x".to_string()], false, "m", 1.0).unwrap(),
            decision: Decision::Block,
            policy_violation: None,
            timestamp: chrono::Utc::now(),
            provenance: Map::new(),
            framework: "generic".to_string(),
        }
    }

    #[test]
    fn event_to_fields_carries_identifying_fields() {
        let event = sample_event();
        let fields = event_to_fields(&event);
        let as_map: BTreeMap<_, _> = fields.into_iter().collect();
        assert_eq!(as_map.get("tool_name"), Some(&"bash".to_string()));
        assert_eq!(as_map.get("decision"), Some(&"block".to_string()));
        assert_eq!(as_map.get("event_id"), Some(&event.event_id.to_string()));
    }

    #[tokio::test]
    async fn publisher_without_url_is_disabled_and_never_panics() {
        let publisher = RedisStreamPublisher::new(None);
        assert!(!publisher.is_enabled());
        publisher.publish_event(&sample_event()).await;
    }

    // Requires a local Redis reachable at REDIS_URL (or localhost default);
    // not run by default since this crate has no test-time Redis fixture.
    #[ignore]
    #[tokio::test]
    async fn publish_consume_ack_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let publisher = RedisStreamPublisher::new(Some(url.clone()));
        publisher.publish_event(&sample_event()).await;

        let consumer = RedisStreamConsumer::new(url, EVENTS_STREAM, "test-group", "test-consumer");
        consumer.ensure_group().await.unwrap();
        let messages = consumer.poll().await.unwrap();
        assert_eq!(messages.len(), 1);
        consumer.ack(&messages[0].id).await.unwrap();
    }
}
