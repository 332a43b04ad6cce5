use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::{
    alert::UnifiedAlert,
    store::{
        AlertEvent, AlertFilter, AlertRule, AlertStatistic, CandidateQuery, CorrelationRecord,
        CorrelationType, DatabaseConfig, EntityKey, MatchOperator, NamedCount, NodeMeta,
        NotificationRecord, NotificationStatus, PodMeta, SeverityCount, SilenceType,
        SilencedAlert, Silence, StatPeriod, StatisticsDelta, StatisticsFilter, StatisticsKey,
        Store, TrendPoint, WorkloadMeta,
    },
    Error, Result,
};

const ALERT_COLUMNS: &str = "id, source, alert_name, severity, status, starts_at, ends_at, \
    labels, annotations, workload_id, pod_name, pod_id, node_name, cluster_name, \
    raw_data, enriched_data, created_at, updated_at";

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to SQLite database: {}", config.sqlite_path.display());

        let connected = if config.is_in_memory() {
            // Every connection to ":memory:" is its own database, so keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str(":memory:")?)
                .await
        } else {
            if let Some(parent) = config.sqlite_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let options = SqliteConnectOptions::new()
                .filename(&config.sqlite_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await
        };
        let pool = connected.map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            Error::Sqlx(e)
        })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn alert_event_from_row(r: &SqliteRow) -> Result<AlertEvent> {
    let labels: HashMap<String, String> = serde_json::from_str(r.get("labels"))?;
    let annotations: HashMap<String, String> = serde_json::from_str(r.get("annotations"))?;
    let enriched_data = serde_json::from_str(r.get("enriched_data"))?;

    Ok(AlertEvent {
        alert: UnifiedAlert {
            id: r.get("id"),
            source: r.get::<String, _>("source").parse()?,
            alert_name: r.get("alert_name"),
            severity: r.get::<String, _>("severity").parse()?,
            status: r.get::<String, _>("status").parse()?,
            starts_at: r.get("starts_at"),
            ends_at: r.get("ends_at"),
            labels,
            annotations,
            workload_id: r.get("workload_id"),
            pod_name: r.get("pod_name"),
            pod_id: r.get("pod_id"),
            node_name: r.get("node_name"),
            cluster_name: r.get("cluster_name"),
            raw_data: serde_json::from_str(r.get("raw_data"))?,
            enriched_data,
        },
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn correlation_from_row(r: &SqliteRow) -> Result<CorrelationRecord> {
    Ok(CorrelationRecord {
        correlation_id: r.get("correlation_id"),
        alert_id: r.get("alert_id"),
        related_alert_id: r.get("related_alert_id"),
        correlation_type: r.get::<String, _>("correlation_type").parse()?,
        correlation_score: r.get("correlation_score"),
        correlation_reason: r.get("correlation_reason"),
        correlation_metadata: serde_json::from_str(r.get("correlation_metadata"))?,
        created_at: r.get("created_at"),
    })
}

fn silence_from_row(r: &SqliteRow) -> Result<Silence> {
    Ok(Silence {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
        enabled: r.get("enabled"),
        silence_type: r.get::<String, _>("silence_type").parse()?,
        label_matchers: serde_json::from_str(r.get("label_matchers"))?,
        alert_names: serde_json::from_str(r.get("alert_names"))?,
        resource_filters: serde_json::from_str(r.get("resource_filters"))?,
        match_expression: r.get("match_expression"),
        starts_at: r.get("starts_at"),
        ends_at: r.get("ends_at"),
        cluster_name: r.get("cluster_name"),
        reason: r.get("reason"),
        created_by: r.get("created_by"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn rule_from_row(r: &SqliteRow) -> Result<AlertRule> {
    Ok(AlertRule {
        id: r.get("id"),
        name: r.get("name"),
        cluster_name: r.get("cluster_name"),
        enabled: r.get("enabled"),
        alert_group: r.get("alert_group"),
        route_config: serde_json::from_str(r.get("route_config"))?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn notification_from_row(r: &SqliteRow) -> Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: r.get("id"),
        alert_id: r.get("alert_id"),
        channel: r.get("channel"),
        channel_config: serde_json::from_str(r.get("channel_config"))?,
        status: r.get::<String, _>("status").parse()?,
        sent_at: r.get("sent_at"),
        error_message: r.get("error_message"),
        payload: serde_json::from_str(r.get("payload"))?,
        created_at: r.get("created_at"),
    })
}

fn statistic_from_row(r: &SqliteRow) -> Result<AlertStatistic> {
    let date = NaiveDate::parse_from_str(r.get("stat_date"), "%Y-%m-%d")
        .map_err(|e| Error::Internal(format!("Invalid statistics date: {}", e)))?;

    Ok(AlertStatistic {
        key: StatisticsKey {
            date,
            hour: r.get::<i64, _>("stat_hour") as u32,
            period: r.get::<String, _>("period").parse()?,
            alert_name: r.get("alert_name"),
            source: r.get::<String, _>("source").parse()?,
            severity: r.get::<String, _>("severity").parse()?,
            workload_id: r.get("workload_id"),
            cluster_name: r.get("cluster_name"),
        },
        firing_count: r.get("firing_count"),
        resolved_count: r.get("resolved_count"),
        total_duration_seconds: r.get("total_duration_seconds"),
        avg_duration_seconds: r.get("avg_duration_seconds"),
        updated_at: r.get("updated_at"),
    })
}

/// SQLite treats a negative LIMIT as unbounded.
fn limit_or_all(limit: i64) -> i64 {
    if limit > 0 {
        limit
    } else {
        -1
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    // Alert events
    async fn insert_alert_event(&self, alert: &UnifiedAlert) -> Result<bool> {
        debug!("Inserting alert event: {}", alert.id);

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO alert_events (
                id, source, alert_name, severity, status, starts_at, ends_at,
                labels, annotations, workload_id, pod_name, pod_id, node_name, cluster_name,
                raw_data, enriched_data, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&alert.id)
        .bind(alert.source.to_string())
        .bind(&alert.alert_name)
        .bind(alert.severity.to_string())
        .bind(alert.status.to_string())
        .bind(alert.starts_at)
        .bind(alert.ends_at)
        .bind(serde_json::to_string(&alert.labels)?)
        .bind(serde_json::to_string(&alert.annotations)?)
        .bind(&alert.workload_id)
        .bind(&alert.pod_name)
        .bind(&alert.pod_id)
        .bind(&alert.node_name)
        .bind(&alert.cluster_name)
        .bind(serde_json::to_string(&alert.raw_data)?)
        .bind(serde_json::to_string(&alert.enriched_data)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_alert_event(&self, id: &str) -> Result<Option<AlertEvent>> {
        debug!("Getting alert event: {}", id);

        let row = sqlx::query(&format!("SELECT {} FROM alert_events WHERE id = ?1", ALERT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_event_from_row).transpose()
    }

    async fn get_alert_events(&self, ids: &[String]) -> Result<Vec<AlertEvent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Getting {} alert events", ids.len());

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM alert_events WHERE id IN (", ALERT_COLUMNS));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_event_from_row).collect()
    }

    async fn resolve_alert_event(&self, id: &str, ends_at: DateTime<Utc>) -> Result<()> {
        debug!("Resolving alert event: {}", id);

        sqlx::query(
            "UPDATE alert_events SET status = 'resolved', ends_at = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(ends_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_alert_events(&self, filter: &AlertFilter) -> Result<Vec<AlertEvent>> {
        debug!("Listing alert events: {:?}", filter);

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM alert_events WHERE 1 = 1", ALERT_COLUMNS));
        if let Some(source) = filter.source {
            qb.push(" AND source = ").push_bind(source.to_string());
        }
        if let Some(name) = &filter.alert_name {
            qb.push(" AND alert_name = ").push_bind(name.clone());
        }
        if let Some(severity) = filter.severity {
            qb.push(" AND severity = ").push_bind(severity.to_string());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(workload_id) = &filter.workload_id {
            qb.push(" AND workload_id = ").push_bind(workload_id.clone());
        }
        if let Some(pod_name) = &filter.pod_name {
            qb.push(" AND pod_name = ").push_bind(pod_name.clone());
        }
        if let Some(node_name) = &filter.node_name {
            qb.push(" AND node_name = ").push_bind(node_name.clone());
        }
        if let Some(cluster_name) = &filter.cluster_name {
            qb.push(" AND cluster_name = ").push_bind(cluster_name.clone());
        }
        if let Some(after) = filter.starts_after {
            qb.push(" AND starts_at >= ").push_bind(after);
        }
        if let Some(before) = filter.starts_before {
            qb.push(" AND starts_at <= ").push_bind(before);
        }
        qb.push(" ORDER BY starts_at DESC LIMIT ")
            .push_bind(limit_or_all(filter.limit))
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_event_from_row).collect()
    }

    async fn find_correlation_candidates(&self, query: &CandidateQuery) -> Result<Vec<AlertEvent>> {
        debug!("Finding correlation candidates for alert {}", query.exclude_id);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM alert_events WHERE status = 'firing' AND id != ",
            ALERT_COLUMNS
        ));
        qb.push_bind(query.exclude_id.clone())
            .push(" AND starts_at >= ")
            .push_bind(query.window_start)
            .push(" AND starts_at <= ")
            .push_bind(query.window_end);
        match &query.entity {
            Some(EntityKey::Workload(id)) => {
                qb.push(" AND workload_id = ").push_bind(id.clone());
            }
            Some(EntityKey::Pod(name)) => {
                qb.push(" AND pod_name = ").push_bind(name.clone());
            }
            Some(EntityKey::Node(name)) => {
                qb.push(" AND node_name = ").push_bind(name.clone());
            }
            None => {}
        }
        qb.push(" ORDER BY starts_at DESC LIMIT ").push_bind(query.limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_event_from_row).collect()
    }

    // Correlations
    async fn save_correlations(&self, records: &[CorrelationRecord]) -> Result<()> {
        debug!("Saving {} correlation rows", records.len());

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO alert_correlations (
                    correlation_id, alert_id, related_alert_id, correlation_type,
                    correlation_score, correlation_reason, correlation_metadata, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&record.correlation_id)
            .bind(&record.alert_id)
            .bind(&record.related_alert_id)
            .bind(record.correlation_type.to_string())
            .bind(record.correlation_score)
            .bind(&record.correlation_reason)
            .bind(serde_json::to_string(&record.correlation_metadata)?)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn list_correlations_for_alert(&self, alert_id: &str) -> Result<Vec<CorrelationRecord>> {
        debug!("Listing correlations for alert: {}", alert_id);

        let rows = sqlx::query(
            r#"
            SELECT correlation_id, alert_id, related_alert_id, correlation_type,
                   correlation_score, correlation_reason, correlation_metadata, created_at
            FROM alert_correlations
            WHERE alert_id = ?1 OR related_alert_id = ?1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(correlation_from_row).collect()
    }

    async fn list_correlation_group(&self, correlation_id: &str) -> Result<Vec<CorrelationRecord>> {
        debug!("Listing correlation group: {}", correlation_id);

        let rows = sqlx::query(
            r#"
            SELECT correlation_id, alert_id, related_alert_id, correlation_type,
                   correlation_score, correlation_reason, correlation_metadata, created_at
            FROM alert_correlations
            WHERE correlation_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(correlation_from_row).collect()
    }

    // Silences
    async fn save_silence(&self, silence: &Silence) -> Result<()> {
        debug!("Saving silence: {}", silence.id);

        sqlx::query(
            r#"
            INSERT INTO alert_silences (
                id, name, description, enabled, silence_type, label_matchers, alert_names,
                resource_filters, match_expression, starts_at, ends_at, cluster_name,
                reason, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                enabled = excluded.enabled,
                silence_type = excluded.silence_type,
                label_matchers = excluded.label_matchers,
                alert_names = excluded.alert_names,
                resource_filters = excluded.resource_filters,
                match_expression = excluded.match_expression,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                cluster_name = excluded.cluster_name,
                reason = excluded.reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&silence.id)
        .bind(&silence.name)
        .bind(&silence.description)
        .bind(silence.enabled)
        .bind(silence.silence_type.to_string())
        .bind(serde_json::to_string(&silence.label_matchers)?)
        .bind(serde_json::to_string(&silence.alert_names)?)
        .bind(serde_json::to_string(&silence.resource_filters)?)
        .bind(&silence.match_expression)
        .bind(silence.starts_at)
        .bind(silence.ends_at)
        .bind(&silence.cluster_name)
        .bind(&silence.reason)
        .bind(&silence.created_by)
        .bind(silence.created_at)
        .bind(silence.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_silence(&self, id: &str) -> Result<Option<Silence>> {
        debug!("Getting silence: {}", id);

        let row = sqlx::query("SELECT * FROM alert_silences WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(silence_from_row).transpose()
    }

    async fn list_silences(&self) -> Result<Vec<Silence>> {
        debug!("Listing silences");

        let rows = sqlx::query("SELECT * FROM alert_silences ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(silence_from_row).collect()
    }

    async fn list_active_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>> {
        debug!("Listing silences active at {}", now);

        let rows = sqlx::query(
            r#"
            SELECT * FROM alert_silences
            WHERE enabled = 1 AND starts_at <= ?1 AND (ends_at IS NULL OR ends_at >= ?1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(silence_from_row).collect()
    }

    async fn delete_silence(&self, id: &str) -> Result<bool> {
        debug!("Deleting silence: {}", id);

        let result = sqlx::query("DELETE FROM alert_silences WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_silenced_alert(&self, record: &SilencedAlert) -> Result<()> {
        debug!("Recording silenced alert {} under silence {}", record.alert_id, record.silence_id);

        sqlx::query(
            r#"
            INSERT INTO silenced_alerts (
                silence_id, alert_id, alert_name, cluster_name, silenced_at, reason, alert_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.silence_id)
        .bind(&record.alert_id)
        .bind(&record.alert_name)
        .bind(&record.cluster_name)
        .bind(record.silenced_at)
        .bind(&record.reason)
        .bind(serde_json::to_string(&record.alert_data)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_silenced_alerts(&self, alert_id: &str) -> Result<Vec<SilencedAlert>> {
        debug!("Listing silence audit rows for alert: {}", alert_id);

        let rows = sqlx::query(
            "SELECT * FROM silenced_alerts WHERE alert_id = ?1 ORDER BY silenced_at DESC",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(SilencedAlert {
                    silence_id: r.get("silence_id"),
                    alert_id: r.get("alert_id"),
                    alert_name: r.get("alert_name"),
                    cluster_name: r.get("cluster_name"),
                    silenced_at: r.get("silenced_at"),
                    reason: r.get("reason"),
                    alert_data: serde_json::from_str(r.get("alert_data"))?,
                })
            })
            .collect()
    }

    // Alert rules
    async fn save_alert_rule(&self, rule: &AlertRule) -> Result<()> {
        debug!("Saving alert rule: {}", rule.id);

        sqlx::query(
            r#"
            INSERT INTO alert_rules (
                id, name, cluster_name, enabled, alert_group, route_config, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                cluster_name = excluded.cluster_name,
                enabled = excluded.enabled,
                alert_group = excluded.alert_group,
                route_config = excluded.route_config,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.cluster_name)
        .bind(rule.enabled)
        .bind(&rule.alert_group)
        .bind(serde_json::to_string(&rule.route_config)?)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_alert_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        debug!("Getting alert rule: {}", id);

        let row = sqlx::query("SELECT * FROM alert_rules WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(rule_from_row).transpose()
    }

    async fn list_alert_rules(&self) -> Result<Vec<AlertRule>> {
        debug!("Listing alert rules");

        let rows = sqlx::query("SELECT * FROM alert_rules ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn list_enabled_rules_for_cluster(&self, cluster_name: &str) -> Result<Vec<AlertRule>> {
        debug!("Listing enabled alert rules for cluster: {:?}", cluster_name);

        let rows = sqlx::query(
            r#"
            SELECT * FROM alert_rules
            WHERE enabled = 1 AND (cluster_name = '' OR cluster_name = ?1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(cluster_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn delete_alert_rule(&self, id: &str) -> Result<bool> {
        debug!("Deleting alert rule: {}", id);

        let result = sqlx::query("DELETE FROM alert_rules WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Notifications
    async fn create_notification(&self, record: &NotificationRecord) -> Result<()> {
        debug!("Creating notification {} for alert {}", record.id, record.alert_id);

        sqlx::query(
            r#"
            INSERT INTO alert_notifications (
                id, alert_id, channel, channel_config, status, sent_at, error_message,
                payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.alert_id)
        .bind(&record.channel)
        .bind(serde_json::to_string(&record.channel_config)?)
        .bind(record.status.to_string())
        .bind(record.sent_at)
        .bind(&record.error_message)
        .bind(serde_json::to_string(&record.payload)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_notification(&self, record: &NotificationRecord) -> Result<()> {
        debug!("Updating notification {} -> {}", record.id, record.status);

        sqlx::query(
            r#"
            INSERT INTO alert_notifications (
                id, alert_id, channel, channel_config, status, sent_at, error_message,
                payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                sent_at = excluded.sent_at,
                error_message = excluded.error_message,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.alert_id)
        .bind(&record.channel)
        .bind(serde_json::to_string(&record.channel_config)?)
        .bind(record.status.to_string())
        .bind(record.sent_at)
        .bind(&record.error_message)
        .bind(serde_json::to_string(&record.payload)?)
        .bind(record.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_notifications(&self, alert_id: &str) -> Result<Vec<NotificationRecord>> {
        debug!("Listing notifications for alert: {}", alert_id);

        let rows = sqlx::query(
            "SELECT * FROM alert_notifications WHERE alert_id = ?1 ORDER BY created_at ASC",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    // Statistics
    async fn upsert_statistic(&self, delta: &StatisticsDelta) -> Result<()> {
        let key = &delta.key;
        debug!(
            "Upserting statistics {} {}h/{} for {}",
            key.date, key.hour, key.period, key.alert_name
        );

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO alert_statistics (
                stat_date, stat_hour, period, alert_name, source, severity, workload_id,
                cluster_name, firing_count, resolved_count, total_duration_seconds,
                avg_duration_seconds, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                CASE WHEN ?10 > 0 THEN ?11 / ?10 ELSE 0 END,
                ?12, ?12
            )
            ON CONFLICT(stat_date, stat_hour, period, alert_name, source, severity, workload_id, cluster_name)
            DO UPDATE SET
                firing_count = firing_count + excluded.firing_count,
                resolved_count = resolved_count + excluded.resolved_count,
                total_duration_seconds = total_duration_seconds + excluded.total_duration_seconds,
                avg_duration_seconds = CASE
                    WHEN resolved_count + excluded.resolved_count > 0
                    THEN (total_duration_seconds + excluded.total_duration_seconds)
                         / (resolved_count + excluded.resolved_count)
                    ELSE 0
                END,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(format_date(key.date))
        .bind(key.hour as i64)
        .bind(key.period.to_string())
        .bind(&key.alert_name)
        .bind(key.source.to_string())
        .bind(key.severity.to_string())
        .bind(&key.workload_id)
        .bind(&key.cluster_name)
        .bind(delta.firing)
        .bind(delta.resolved)
        .bind(delta.duration_seconds)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_statistics(&self, filter: &StatisticsFilter) -> Result<Vec<AlertStatistic>> {
        debug!("Listing statistics: {:?}", filter);

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM alert_statistics WHERE 1 = 1");
        if let Some(from) = filter.date_from {
            qb.push(" AND stat_date >= ").push_bind(format_date(from));
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND stat_date <= ").push_bind(format_date(to));
        }
        if let Some(period) = filter.period {
            qb.push(" AND period = ").push_bind(period.to_string());
        }
        if let Some(name) = &filter.alert_name {
            qb.push(" AND alert_name = ").push_bind(name.clone());
        }
        if let Some(cluster) = &filter.cluster_name {
            qb.push(" AND cluster_name = ").push_bind(cluster.clone());
        }
        qb.push(" ORDER BY stat_date DESC, stat_hour DESC LIMIT ")
            .push_bind(limit_or_all(filter.limit));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(statistic_from_row).collect()
    }

    async fn count_firing_by_severity(
        &self,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SeverityCount>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT severity, COUNT(*) AS count FROM alert_events WHERE status = 'firing' AND starts_at <= ",
        );
        qb.push_bind(until);
        if let Some(since) = since {
            qb.push(" AND starts_at >= ").push_bind(since);
        }
        qb.push(" GROUP BY severity ORDER BY severity");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| SeverityCount {
                severity: r.get("severity"),
                count: r.get("count"),
            })
            .collect())
    }

    async fn alert_trend(&self, since: DateTime<Utc>, bucket_format: &str) -> Result<Vec<TrendPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT strftime(?1, starts_at) AS bucket, severity, COUNT(*) AS count
            FROM alert_events
            WHERE starts_at >= ?2
            GROUP BY bucket, severity
            ORDER BY bucket ASC, severity ASC
            "#,
        )
        .bind(bucket_format)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| TrendPoint {
                bucket: r.get("bucket"),
                severity: r.get("severity"),
                count: r.get("count"),
            })
            .collect())
    }

    async fn top_alert_names(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<NamedCount>> {
        let rows = sqlx::query(
            r#"
            SELECT alert_name AS name, COUNT(*) AS count
            FROM alert_events
            WHERE starts_at >= ?1
            GROUP BY alert_name
            ORDER BY count DESC, name ASC
            LIMIT ?2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| NamedCount {
                name: r.get("name"),
                count: r.get("count"),
            })
            .collect())
    }

    async fn count_by_cluster(&self, since: DateTime<Utc>) -> Result<Vec<NamedCount>> {
        let rows = sqlx::query(
            r#"
            SELECT CASE WHEN cluster_name = '' THEN 'unknown' ELSE cluster_name END AS name,
                   COUNT(*) AS count
            FROM alert_events
            WHERE starts_at >= ?1
            GROUP BY name
            ORDER BY count DESC, name ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| NamedCount {
                name: r.get("name"),
                count: r.get("count"),
            })
            .collect())
    }

    // Entity metadata
    async fn get_workload(&self, workload_id: &str) -> Result<Option<WorkloadMeta>> {
        let row = sqlx::query("SELECT * FROM workloads WHERE workload_id = ?1")
            .bind(workload_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| WorkloadMeta {
            workload_id: r.get("workload_id"),
            name: r.get("name"),
            namespace: r.get("namespace"),
            kind: r.get("kind"),
            status: r.get("status"),
            cluster_name: r.get("cluster_name"),
        }))
    }

    async fn get_pod(&self, pod_id: &str) -> Result<Option<PodMeta>> {
        let row = sqlx::query("SELECT * FROM pods WHERE pod_id = ?1")
            .bind(pod_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| PodMeta {
            pod_id: r.get("pod_id"),
            name: r.get("name"),
            namespace: r.get("namespace"),
            phase: r.get("phase"),
            node_name: r.get("node_name"),
            gpu_allocated: r.get("gpu_allocated"),
        }))
    }

    async fn get_node(&self, name: &str) -> Result<Option<NodeMeta>> {
        let row = sqlx::query("SELECT * FROM nodes WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| NodeMeta {
            name: r.get("name"),
            address: r.get("address"),
            status: r.get("status"),
        }))
    }

    async fn save_workload(&self, workload: &WorkloadMeta) -> Result<()> {
        debug!("Saving workload metadata: {}", workload.workload_id);

        sqlx::query(
            r#"
            INSERT INTO workloads (workload_id, name, namespace, kind, status, cluster_name)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(workload_id) DO UPDATE SET
                name = excluded.name,
                namespace = excluded.namespace,
                kind = excluded.kind,
                status = excluded.status,
                cluster_name = excluded.cluster_name
            "#,
        )
        .bind(&workload.workload_id)
        .bind(&workload.name)
        .bind(&workload.namespace)
        .bind(&workload.kind)
        .bind(&workload.status)
        .bind(&workload.cluster_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_pod(&self, pod: &PodMeta) -> Result<()> {
        debug!("Saving pod metadata: {}", pod.pod_id);

        sqlx::query(
            r#"
            INSERT INTO pods (pod_id, name, namespace, phase, node_name, gpu_allocated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(pod_id) DO UPDATE SET
                name = excluded.name,
                namespace = excluded.namespace,
                phase = excluded.phase,
                node_name = excluded.node_name,
                gpu_allocated = excluded.gpu_allocated
            "#,
        )
        .bind(&pod.pod_id)
        .bind(&pod.name)
        .bind(&pod.namespace)
        .bind(&pod.phase)
        .bind(&pod.node_name)
        .bind(pod.gpu_allocated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_node(&self, node: &NodeMeta) -> Result<()> {
        debug!("Saving node metadata: {}", node.name);

        sqlx::query(
            r#"
            INSERT INTO nodes (name, address, status) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                address = excluded.address,
                status = excluded.status
            "#,
        )
        .bind(&node.name)
        .bind(&node.address)
        .bind(&node.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// String conversions for the enum columns

impl std::str::FromStr for CorrelationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "time" => Ok(CorrelationType::Time),
            "entity" => Ok(CorrelationType::Entity),
            "causal" => Ok(CorrelationType::Causal),
            "cross_source" => Ok(CorrelationType::CrossSource),
            _ => Err(Error::Validation(format!("Invalid correlation type: {}", s))),
        }
    }
}

impl std::fmt::Display for CorrelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationType::Time => write!(f, "time"),
            CorrelationType::Entity => write!(f, "entity"),
            CorrelationType::Causal => write!(f, "causal"),
            CorrelationType::CrossSource => write!(f, "cross_source"),
        }
    }
}

impl std::str::FromStr for SilenceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "label" => Ok(SilenceType::Label),
            "alert_name" => Ok(SilenceType::AlertName),
            "resource" => Ok(SilenceType::Resource),
            "expression" => Ok(SilenceType::Expression),
            _ => Err(Error::Validation(format!("Invalid silence type: {}", s))),
        }
    }
}

impl std::fmt::Display for SilenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SilenceType::Label => write!(f, "label"),
            SilenceType::AlertName => write!(f, "alert_name"),
            SilenceType::Resource => write!(f, "resource"),
            SilenceType::Expression => write!(f, "expression"),
        }
    }
}

impl std::fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchOperator::Equal => write!(f, "="),
            MatchOperator::NotEqual => write!(f, "!="),
            MatchOperator::Regex => write!(f, "=~"),
            MatchOperator::NotRegex => write!(f, "!~"),
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            _ => Err(Error::Validation(format!("Invalid notification status: {}", s))),
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StatPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hour" => Ok(StatPeriod::Hour),
            "day" => Ok(StatPeriod::Day),
            _ => Err(Error::Validation(format!("Invalid statistics period: {}", s))),
        }
    }
}

impl std::fmt::Display for StatPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatPeriod::Hour => write!(f, "hour"),
            StatPeriod::Day => write!(f, "day"),
        }
    }
}
