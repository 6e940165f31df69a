//! Durable, PostgreSQL-backed `EventLedger`.
//!
//! Schema is versioned as an explicit, numbered set of idempotent DDL
//! statements rather than a migration-runner dependency (§4.5): every
//! statement is `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`,
//! safe to re-run on every process start.

use crate::memory::{build_agent_graph, build_timeline_summary};
use crate::{EventFilters, EventLedger};
use agentguard_core::{
    Action, ActionId, ActionType, AgentGraphData, AgentId, AgentProfile, Decision, EntityIdType,
    Event, EventId, GuardError, GuardResult, LedgerError, LedgerStats, PolicyViolation,
    RiskAssessment, SessionId, TimelineSummary,
};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::info;
use uuid::Uuid;

/// Numbered DDL statements, run in order on every [`PostgresEventLedger::ensure_schema`] call.
const SCHEMA_STATEMENTS: &[&str] = &[
    // 1: sessions roll-up table.
    r#"CREATE TABLE IF NOT EXISTS sessions (
        session_id UUID PRIMARY KEY,
        agent_id UUID NOT NULL,
        agent_goal TEXT NOT NULL,
        framework TEXT NOT NULL,
        first_seen TIMESTAMPTZ NOT NULL,
        last_seen TIMESTAMPTZ NOT NULL,
        action_count BIGINT NOT NULL DEFAULT 0,
        blocked_count BIGINT NOT NULL DEFAULT 0
    )"#,
    // 2: events, the append-only forensic record.
    r#"CREATE TABLE IF NOT EXISTS events (
        event_id UUID PRIMARY KEY,
        session_id UUID NOT NULL,
        agent_id UUID NOT NULL,
        agent_is_registered BOOLEAN NOT NULL,
        agent_goal TEXT NOT NULL,
        action_id UUID NOT NULL,
        action_type TEXT NOT NULL,
        tool_name TEXT NOT NULL,
        parameters JSONB NOT NULL,
        raw_payload JSONB NOT NULL,
        risk_score DOUBLE PRECISION NOT NULL,
        reason TEXT NOT NULL,
        indicators JSONB NOT NULL,
        is_goal_aligned BOOLEAN NOT NULL,
        analyzer_model TEXT NOT NULL,
        latency_ms DOUBLE PRECISION NOT NULL,
        decision TEXT NOT NULL,
        violation_rule_name TEXT,
        violation_rule_type TEXT,
        violation_detail TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        provenance JSONB NOT NULL,
        framework TEXT NOT NULL
    )"#,
    // 3: lookup indexes named in §4.5.
    "CREATE INDEX IF NOT EXISTS idx_events_session_id ON events (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_decision ON events (decision)",
    "CREATE INDEX IF NOT EXISTS idx_events_risk_score ON events (risk_score)",
    "CREATE INDEX IF NOT EXISTS idx_events_created_at_desc ON events (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_action_type ON events (action_type)",
    "CREATE INDEX IF NOT EXISTS idx_events_session_decision ON events (session_id, decision)",
];

fn backend_err(e: impl std::fmt::Display) -> GuardError {
    GuardError::Ledger(LedgerError::Backend { reason: e.to_string() })
}

fn decision_str(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "allow",
        Decision::Review => "review",
        Decision::Block => "block",
    }
}

fn action_type_str(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::ToolCall => "tool_call",
        ActionType::ShellCommand => "shell_command",
        ActionType::FileRead => "file_read",
        ActionType::FileWrite => "file_write",
        ActionType::HttpRequest => "http_request",
        ActionType::MemoryWrite => "memory_write",
        ActionType::CredentialAccess => "credential_access",
        ActionType::Unknown => "unknown",
    }
}

/// PostgreSQL-backed ledger over a `deadpool-postgres` connection pool.
pub struct PostgresEventLedger {
    pool: Pool,
}

impl PostgresEventLedger {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a connection pool from a `postgres://` DSN.
    pub fn connect(dsn: &str) -> GuardResult<Self> {
        let pg_config = tokio_postgres::Config::from_str(dsn).map_err(backend_err)?;
        let mut cfg = Config::new();
        cfg.host = pg_config.get_hosts().first().and_then(|h| match h {
            tokio_postgres::config::Host::Tcp(s) => Some(s.clone()),
            #[cfg(unix)]
            _ => None,
        });
        cfg.port = pg_config.get_ports().first().copied();
        cfg.dbname = pg_config.get_dbname().map(str::to_string);
        cfg.user = pg_config.get_user().map(str::to_string);
        cfg.password = pg_config.get_password().map(|p| String::from_utf8_lossy(p).into_owned());
        cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(backend_err)?;
        Ok(Self::new(pool))
    }

    /// Run the numbered DDL statements. Safe to call on every startup.
    pub async fn ensure_schema(&self) -> GuardResult<()> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        for (i, statement) in SCHEMA_STATEMENTS.iter().enumerate() {
            conn.batch_execute(statement).await.map_err(|e| {
                GuardError::Ledger(LedgerError::MigrationFailed {
                    reason: format!("statement {i}: {e}"),
                })
            })?;
        }
        info!(statements = SCHEMA_STATEMENTS.len(), "ledger_schema_ensured");
        Ok(())
    }

    fn row_to_event(row: &Row) -> Result<Event, GuardError> {
        let action_type_str: String = row.get("action_type");
        let action_type = match action_type_str.as_str() {
            "tool_call" => ActionType::ToolCall,
            "shell_command" => ActionType::ShellCommand,
            "file_read" => ActionType::FileRead,
            "file_write" => ActionType::FileWrite,
            "http_request" => ActionType::HttpRequest,
            "memory_write" => ActionType::MemoryWrite,
            "credential_access" => ActionType::CredentialAccess,
            _ => ActionType::Unknown,
        };
        let decision_str: String = row.get("decision");
        let decision = match decision_str.as_str() {
            "allow" => Decision::Allow,
            "review" => Decision::Review,
            "block" => Decision::Block,
            other => return Err(backend_err(format!("unknown decision '{other}'"))),
        };

        let indicators: Vec<String> =
            serde_json::from_value(row.get("indicators")).map_err(backend_err)?;

        let assessment = RiskAssessment::new(
            row.get("risk_score"),
            row.get::<_, String>("reason"),
            indicators,
            row.get("is_goal_aligned"),
            row.get::<_, String>("analyzer_model"),
            row.get("latency_ms"),
        )
        .map_err(backend_err)?;

        let violation_rule_name: Option<String> = row.get("violation_rule_name");
        let policy_violation = violation_rule_name.map(|rule_name| {
            PolicyViolation::new(
                rule_name,
                row.get::<_, Option<String>>("violation_rule_type").unwrap_or_default(),
                row.get::<_, Option<String>>("violation_detail").unwrap_or_default(),
                decision,
            )
        });

        let parameters: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(row.get("parameters")).map_err(backend_err)?;
        let provenance: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(row.get("provenance")).map_err(backend_err)?;
        let created_at = row.get("created_at");

        Ok(Event {
            event_id: EventId::new(row.get::<_, Uuid>("event_id")),
            session_id: SessionId::new(row.get::<_, Uuid>("session_id")),
            agent_id: AgentId::new(row.get::<_, Uuid>("agent_id")),
            agent_is_registered: row.get("agent_is_registered"),
            agent_goal: row.get("agent_goal"),
            action: Action {
                action_id: ActionId::new(row.get::<_, Uuid>("action_id")),
                action_type,
                tool_name: row.get("tool_name"),
                parameters,
                raw_payload: row.get("raw_payload"),
                timestamp: created_at,
            },
            assessment,
            decision,
            policy_violation,
            timestamp: created_at,
            provenance,
            framework: row.get("framework"),
        })
    }

    async fn events_for_agent(&self, agent_id: AgentId) -> GuardResult<Vec<Event>> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let rows = conn
            .query(
                "SELECT * FROM events WHERE agent_id = $1 ORDER BY created_at ASC",
                &[&agent_id.as_uuid()],
            )
            .await
            .map_err(backend_err)?;
        rows.iter().map(Self::row_to_event).collect()
    }
}

#[async_trait]
impl EventLedger for PostgresEventLedger {
    async fn append(&self, event: Event) -> GuardResult<()> {
        let conn = self.pool.get().await.map_err(backend_err)?;

        let indicators = serde_json::to_value(&event.assessment.indicators).map_err(backend_err)?;
        let parameters = serde_json::to_value(&event.action.parameters).map_err(backend_err)?;
        let provenance = serde_json::to_value(&event.provenance).map_err(backend_err)?;

        conn.execute(
            r#"INSERT INTO events (
                event_id, session_id, agent_id, agent_is_registered, agent_goal,
                action_id, action_type, tool_name, parameters, raw_payload,
                risk_score, reason, indicators, is_goal_aligned, analyzer_model, latency_ms,
                decision, violation_rule_name, violation_rule_type, violation_detail,
                created_at, provenance, framework
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23)
            ON CONFLICT (event_id) DO NOTHING"#,
            &[
                &event.event_id.as_uuid(),
                &event.session_id.as_uuid(),
                &event.agent_id.as_uuid(),
                &event.agent_is_registered,
                &event.agent_goal,
                &event.action.action_id.as_uuid(),
                &action_type_str(event.action.action_type),
                &event.action.tool_name,
                &parameters,
                &event.action.raw_payload,
                &event.assessment.risk_score(),
                &event.assessment.reason,
                &indicators,
                &event.assessment.is_goal_aligned,
                &event.assessment.analyzer_model,
                &event.assessment.latency_ms,
                &decision_str(event.decision),
                &event.policy_violation.as_ref().map(|v| v.rule_name.clone()),
                &event.policy_violation.as_ref().map(|v| v.rule_type.clone()),
                &event.policy_violation.as_ref().map(|v| v.detail.clone()),
                &event.timestamp,
                &provenance,
                &event.framework,
            ],
        )
        .await
        .map_err(backend_err)?;

        conn.execute(
            r#"INSERT INTO sessions (session_id, agent_id, agent_goal, framework, first_seen, last_seen, action_count, blocked_count)
               VALUES ($1, $2, $3, $4, $5, $5, 1, $6)
               ON CONFLICT (session_id) DO UPDATE SET
                   last_seen = EXCLUDED.last_seen,
                   action_count = sessions.action_count + 1,
                   blocked_count = sessions.blocked_count + EXCLUDED.blocked_count"#,
            &[
                &event.session_id.as_uuid(),
                &event.agent_id.as_uuid(),
                &event.agent_goal,
                &event.framework,
                &event.timestamp,
                &(event.decision == Decision::Block),
            ],
        )
        .await
        .map_err(backend_err)?;

        Ok(())
    }

    async fn get_event(&self, id: EventId) -> GuardResult<Option<Event>> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let row = conn
            .query_opt("SELECT * FROM events WHERE event_id = $1", &[&id.as_uuid()])
            .await
            .map_err(backend_err)?;
        row.map(|r| Self::row_to_event(&r)).transpose()
    }

    async fn list_events(&self, filters: EventFilters) -> GuardResult<Vec<Event>> {
        let conn = self.pool.get().await.map_err(backend_err)?;

        let mut clauses = Vec::new();
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();

        if let Some(session_id) = filters.session_id {
            params.push(Box::new(session_id.as_uuid()));
            clauses.push(format!("session_id = ${}", params.len()));
        }
        if let Some(decision) = filters.decision {
            params.push(Box::new(decision_str(decision)));
            clauses.push(format!("decision = ${}", params.len()));
        }
        if let Some(min_risk) = filters.min_risk {
            params.push(Box::new(min_risk));
            clauses.push(format!("risk_score >= ${}", params.len()));
        }
        if let Some(max_risk) = filters.max_risk {
            params.push(Box::new(max_risk));
            clauses.push(format!("risk_score <= ${}", params.len()));
        }
        if let Some(since) = filters.since {
            params.push(Box::new(since));
            clauses.push(format!("created_at >= ${}", params.len()));
        }
        if let Some(until) = filters.until {
            params.push(Box::new(until));
            clauses.push(format!("created_at <= ${}", params.len()));
        }

        let where_clause =
            if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
        let limit_clause = filters.limit.map(|l| format!(" LIMIT {l}")).unwrap_or_default();
        let query = format!(
            "SELECT * FROM events {where_clause} ORDER BY created_at DESC{limit_clause} OFFSET {}",
            filters.offset
        );

        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let rows = conn.query(&query, &param_refs).await.map_err(backend_err)?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn get_timeline(&self, session_id: SessionId) -> GuardResult<Vec<Event>> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let rows = conn
            .query(
                "SELECT * FROM events WHERE session_id = $1 ORDER BY created_at ASC",
                &[&session_id.as_uuid()],
            )
            .await
            .map_err(backend_err)?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn list_sessions(&self) -> GuardResult<Vec<SessionId>> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let rows = conn.query("SELECT session_id FROM sessions", &[]).await.map_err(backend_err)?;
        Ok(rows.iter().map(|r| SessionId::new(r.get::<_, Uuid>("session_id"))).collect())
    }

    async fn get_timeline_summary(&self, session_id: SessionId) -> GuardResult<Option<TimelineSummary>> {
        let timeline = self.get_timeline(session_id).await?;
        Ok(build_timeline_summary(session_id, &timeline))
    }

    async fn get_stats(&self) -> GuardResult<LedgerStats> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let row = conn
            .query_one(
                r#"SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE decision = 'block') AS blocked,
                    COUNT(*) FILTER (WHERE decision = 'review') AS reviewed,
                    COUNT(*) FILTER (WHERE decision = 'allow') AS allowed,
                    COALESCE(AVG(risk_score), 0.0) AS avg_risk,
                    (SELECT COUNT(*) FROM sessions) AS active_sessions
                   FROM events"#,
                &[],
            )
            .await
            .map_err(backend_err)?;

        Ok(LedgerStats {
            total_events: row.get::<_, i64>("total") as u64,
            blocked_events: row.get::<_, i64>("blocked") as u64,
            reviewed_events: row.get::<_, i64>("reviewed") as u64,
            allowed_events: row.get::<_, i64>("allowed") as u64,
            active_sessions: row.get::<_, i64>("active_sessions") as u64,
            avg_risk_score: row.get("avg_risk"),
        })
    }

    async fn list_agents(&self) -> GuardResult<Vec<AgentId>> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let rows = conn.query("SELECT DISTINCT agent_id FROM events", &[]).await.map_err(backend_err)?;
        Ok(rows.iter().map(|r| AgentId::new(r.get::<_, Uuid>("agent_id"))).collect())
    }

    async fn get_agent_profile(&self, agent_id: AgentId) -> GuardResult<Option<AgentProfile>> {
        // Aggregated server-side with MAX/BOOL_OR (§4.5); the trailing
        // tools/patterns/risk-trend windows are built from the 50 most
        // recent rows the same way the in-process backend does it.
        let events = self.events_for_agent(agent_id).await?;
        let Some(last) = events.last() else {
            return Ok(None);
        };

        let conn = self.pool.get().await.map_err(backend_err)?;
        let row = conn
            .query_one(
                r#"SELECT
                    MIN(created_at) AS first_seen,
                    MAX(created_at) AS last_seen,
                    COUNT(DISTINCT session_id) AS total_sessions,
                    COUNT(*) AS total_events,
                    COUNT(*) FILTER (WHERE decision = 'block') AS blocked,
                    COUNT(*) FILTER (WHERE decision = 'review') AS reviewed,
                    COUNT(*) FILTER (WHERE decision = 'allow') AS allowed,
                    AVG(risk_score) AS avg_risk,
                    MAX(risk_score) AS max_risk,
                    BOOL_OR(agent_is_registered) AS is_registered
                   FROM events WHERE agent_id = $1"#,
                &[&agent_id.as_uuid()],
            )
            .await
            .map_err(backend_err)?;

        const PROFILE_WINDOW: usize = 50;
        let recent: Vec<&Event> = events.iter().rev().take(PROFILE_WINDOW).collect();

        let mut tools_used = Vec::new();
        let mut attack_patterns = Vec::new();
        for event in recent.iter().rev() {
            if !tools_used.contains(&event.action.tool_name) {
                tools_used.push(event.action.tool_name.clone());
            }
            if event.decision != Decision::Allow {
                for indicator in &event.assessment.indicators {
                    if !attack_patterns.contains(indicator) {
                        attack_patterns.push(indicator.clone());
                    }
                }
            }
        }
        let risk_trend: Vec<f64> = recent.iter().rev().map(|e| e.assessment.risk_score()).collect();

        Ok(Some(AgentProfile {
            agent_id,
            agent_goal: last.agent_goal.clone(),
            is_registered: row.get("is_registered"),
            framework: last.framework.clone(),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
            total_sessions: row.get::<_, i64>("total_sessions") as u64,
            total_events: row.get::<_, i64>("total_events") as u64,
            blocked_events: row.get::<_, i64>("blocked") as u64,
            reviewed_events: row.get::<_, i64>("reviewed") as u64,
            allowed_events: row.get::<_, i64>("allowed") as u64,
            avg_risk_score: row.get("avg_risk"),
            max_risk_score: row.get("max_risk"),
            attack_patterns,
            tools_used,
            risk_trend,
        }))
    }

    async fn get_agent_graph(&self, agent_id: AgentId) -> GuardResult<AgentGraphData> {
        let events = self.events_for_agent(agent_id).await?;
        Ok(build_agent_graph(agent_id, &events))
    }
}
