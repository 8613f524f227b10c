//! SQLite-backed metric cache and audit log with durable persistence.

use crate::{
    validate_records, AuditLog, AuditLogEntry, CanonicalMetric, MetricFilter, MetricStore,
    StoreError, StoreResult, StoredAuditLogEntry, StoredMetric,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use somna_types::{format_iso_date, parse_iso_date, MetricFields};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Typed metric columns, in the order [`metric_field_values`] binds them.
const METRIC_FIELD_COLUMNS: [&str; 24] = [
    "total_sleep_minutes",
    "deep_sleep_minutes",
    "rem_sleep_minutes",
    "light_sleep_minutes",
    "sleep_score",
    "sleep_efficiency",
    "restorative_sleep_minutes",
    "time_in_bed_minutes",
    "bedtime_start",
    "bedtime_end",
    "tosses_and_turns",
    "movements",
    "morning_alertness_minutes",
    "temperature_deviation",
    "average_body_temp_celsius",
    "avg_sleep_hrv",
    "night_rhr",
    "sleep_rhr",
    "readiness_score",
    "recovery_index",
    "movement_index",
    "active_minutes",
    "vo2_max",
    "metabolic_score",
];

/// Persistent SQLite store backend for cached metrics and audit entries.
#[derive(Debug)]
pub struct SqliteMetricStore {
    db_path: PathBuf,
}

impl SqliteMetricStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        initialize_schema(&connection)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }
}

fn initialize_schema(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS daily_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id TEXT NOT NULL,
            metric_date TEXT NOT NULL,
            total_sleep_minutes INTEGER NULL,
            deep_sleep_minutes INTEGER NULL,
            rem_sleep_minutes INTEGER NULL,
            light_sleep_minutes INTEGER NULL,
            sleep_score INTEGER NULL,
            sleep_efficiency REAL NULL,
            restorative_sleep_minutes INTEGER NULL,
            time_in_bed_minutes INTEGER NULL,
            bedtime_start TEXT NULL,
            bedtime_end TEXT NULL,
            tosses_and_turns INTEGER NULL,
            movements INTEGER NULL,
            morning_alertness_minutes INTEGER NULL,
            temperature_deviation REAL NULL,
            average_body_temp_celsius REAL NULL,
            avg_sleep_hrv REAL NULL,
            night_rhr REAL NULL,
            sleep_rhr REAL NULL,
            readiness_score REAL NULL,
            recovery_index REAL NULL,
            movement_index REAL NULL,
            active_minutes INTEGER NULL,
            vo2_max REAL NULL,
            metabolic_score REAL NULL,
            raw_payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (subject_id, metric_date)
        );

        CREATE INDEX IF NOT EXISTS idx_daily_metrics_date ON daily_metrics (metric_date);

        CREATE TABLE IF NOT EXISTS action_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            endpoint TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            request_payload TEXT NOT NULL,
            response_payload TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            client_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_action_logs_created_at ON action_logs (created_at);
        "#,
    )?;
    Ok(())
}

fn upsert_sql() -> String {
    let columns = METRIC_FIELD_COLUMNS.join(", ");
    let placeholders = (1..=METRIC_FIELD_COLUMNS.len() + 5)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = METRIC_FIELD_COLUMNS
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(",\n            ");
    format!(
        r#"
        INSERT INTO daily_metrics (
            subject_id, metric_date, raw_payload, created_at, updated_at, {columns}
        ) VALUES ({placeholders})
        ON CONFLICT (subject_id, metric_date) DO UPDATE SET
            {updates},
            raw_payload = excluded.raw_payload,
            updated_at = MAX(daily_metrics.updated_at, excluded.updated_at)
        "#
    )
}

fn select_metrics_sql(filter_clause: &str) -> String {
    format!(
        "SELECT subject_id, metric_date, raw_payload, created_at, updated_at, {} \
         FROM daily_metrics WHERE {filter_clause} \
         ORDER BY metric_date DESC, subject_id ASC LIMIT ?",
        METRIC_FIELD_COLUMNS.join(", "),
    )
}

#[async_trait]
impl MetricStore for SqliteMetricStore {
    async fn upsert_many(&self, records: &[CanonicalMetric]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        validate_records(records)?;

        let now = timestamp_to_db(Utc::now());
        let sql = upsert_sql();
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        {
            let mut statement = transaction.prepare(&sql)?;
            for record in records {
                let mut values = vec![
                    SqlValue::Text(record.subject_id.clone()),
                    SqlValue::Text(format_iso_date(record.date)),
                    SqlValue::Text(serialize_json(&record.raw_payload)?),
                    SqlValue::Text(now.clone()),
                    SqlValue::Text(now.clone()),
                ];
                values.extend(metric_field_values(&record.fields));
                statement.execute(params_from_iter(values))?;
            }
        }
        transaction.commit()?;
        Ok(records.len())
    }

    async fn list_cached(&self, filter: &MetricFilter) -> StoreResult<Vec<StoredMetric>> {
        let connection = self.open_connection()?;
        let sql = select_metrics_sql(
            "(?1 IS NULL OR subject_id = ?1) \
             AND (?2 IS NULL OR metric_date >= ?2) \
             AND (?3 IS NULL OR metric_date <= ?3)",
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement
            .query_map(
                params![
                    filter.subject_id,
                    filter.start_date.map(format_iso_date),
                    filter.end_date.map(format_iso_date),
                    limit_to_db(filter.limit),
                ],
                MetricRow::read,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(MetricRow::into_stored).collect()
    }

    async fn find_by_date(
        &self,
        subject_id: Option<&str>,
        date: NaiveDate,
    ) -> StoreResult<Option<StoredMetric>> {
        let connection = self.open_connection()?;
        let sql = select_metrics_sql("metric_date = ?1 AND (?2 IS NULL OR subject_id = ?2)");
        let row = connection
            .query_row(
                &sql,
                params![format_iso_date(date), subject_id, 1_i64],
                MetricRow::read,
            )
            .optional()?;
        row.map(MetricRow::into_stored).transpose()
    }
}

#[async_trait]
impl AuditLog for SqliteMetricStore {
    async fn append(&self, entry: AuditLogEntry) -> StoreResult<StoredAuditLogEntry> {
        let created_at = Utc::now();
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO action_logs (
                endpoint, tool_name, request_payload, response_payload,
                status_code, duration_ms, client_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.endpoint,
                entry.tool_name,
                serialize_json(&entry.request_payload)?,
                serialize_json(&entry.response_payload)?,
                i64::from(entry.status_code),
                u64_to_i64("duration_ms", entry.duration_ms)?,
                entry.client_id,
                timestamp_to_db(created_at),
            ],
        )?;
        Ok(StoredAuditLogEntry {
            id: connection.last_insert_rowid(),
            entry,
            created_at,
        })
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<StoredAuditLogEntry>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT id, endpoint, tool_name, request_payload, response_payload,
                   status_code, duration_ms, client_id, created_at
            FROM action_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = statement
            .query_map(params![limit_to_db(limit)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    id,
                    endpoint,
                    tool_name,
                    request_payload,
                    response_payload,
                    status_code,
                    duration_ms,
                    client_id,
                    created_at,
                )|
                 -> StoreResult<StoredAuditLogEntry> {
                    Ok(StoredAuditLogEntry {
                        id,
                        entry: AuditLogEntry {
                            endpoint,
                            tool_name,
                            request_payload: serde_json::from_str(&request_payload)?,
                            response_payload: serde_json::from_str(&response_payload)?,
                            status_code: u16::try_from(status_code).map_err(|_| {
                                StoreError::InvalidPersistedValue {
                                    field: "status_code",
                                    value: status_code.to_string(),
                                }
                            })?,
                            duration_ms: u64::try_from(duration_ms).map_err(|_| {
                                StoreError::InvalidPersistedValue {
                                    field: "duration_ms",
                                    value: duration_ms.to_string(),
                                }
                            })?,
                            client_id,
                        },
                        created_at: timestamp_from_db(&created_at)?,
                    })
                },
            )
            .collect()
    }
}

/// Raw `daily_metrics` row before date, instant and JSON columns are parsed.
struct MetricRow {
    subject_id: String,
    metric_date: String,
    raw_payload: String,
    created_at: String,
    updated_at: String,
    bedtime_start: Option<String>,
    bedtime_end: Option<String>,
    fields: MetricFields,
}

impl MetricRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            subject_id: row.get("subject_id")?,
            metric_date: row.get("metric_date")?,
            raw_payload: row.get("raw_payload")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            bedtime_start: row.get("bedtime_start")?,
            bedtime_end: row.get("bedtime_end")?,
            fields: MetricFields {
                total_sleep_minutes: row.get("total_sleep_minutes")?,
                deep_sleep_minutes: row.get("deep_sleep_minutes")?,
                rem_sleep_minutes: row.get("rem_sleep_minutes")?,
                light_sleep_minutes: row.get("light_sleep_minutes")?,
                sleep_score: row.get("sleep_score")?,
                sleep_efficiency: row.get("sleep_efficiency")?,
                restorative_sleep_minutes: row.get("restorative_sleep_minutes")?,
                time_in_bed_minutes: row.get("time_in_bed_minutes")?,
                bedtime_start: None,
                bedtime_end: None,
                tosses_and_turns: row.get("tosses_and_turns")?,
                movements: row.get("movements")?,
                morning_alertness_minutes: row.get("morning_alertness_minutes")?,
                temperature_deviation: row.get("temperature_deviation")?,
                average_body_temp_celsius: row.get("average_body_temp_celsius")?,
                avg_sleep_hrv: row.get("avg_sleep_hrv")?,
                night_rhr: row.get("night_rhr")?,
                sleep_rhr: row.get("sleep_rhr")?,
                readiness_score: row.get("readiness_score")?,
                recovery_index: row.get("recovery_index")?,
                movement_index: row.get("movement_index")?,
                active_minutes: row.get("active_minutes")?,
                vo2_max: row.get("vo2_max")?,
                metabolic_score: row.get("metabolic_score")?,
            },
        })
    }

    fn into_stored(self) -> StoreResult<StoredMetric> {
        let date = parse_iso_date(&self.metric_date).map_err(|_| {
            StoreError::InvalidPersistedValue {
                field: "metric_date",
                value: self.metric_date.clone(),
            }
        })?;
        let mut fields = self.fields;
        fields.bedtime_start = option_timestamp_from_db(self.bedtime_start)?;
        fields.bedtime_end = option_timestamp_from_db(self.bedtime_end)?;
        Ok(StoredMetric {
            metric: CanonicalMetric {
                subject_id: self.subject_id,
                date,
                fields,
                raw_payload: serde_json::from_str(&self.raw_payload)?,
            },
            created_at: timestamp_from_db(&self.created_at)?,
            updated_at: timestamp_from_db(&self.updated_at)?,
        })
    }
}

fn metric_field_values(fields: &MetricFields) -> [SqlValue; 24] {
    [
        integer_value(fields.total_sleep_minutes),
        integer_value(fields.deep_sleep_minutes),
        integer_value(fields.rem_sleep_minutes),
        integer_value(fields.light_sleep_minutes),
        integer_value(fields.sleep_score),
        real_value(fields.sleep_efficiency),
        integer_value(fields.restorative_sleep_minutes),
        integer_value(fields.time_in_bed_minutes),
        instant_value(fields.bedtime_start),
        instant_value(fields.bedtime_end),
        integer_value(fields.tosses_and_turns),
        integer_value(fields.movements),
        integer_value(fields.morning_alertness_minutes),
        real_value(fields.temperature_deviation),
        real_value(fields.average_body_temp_celsius),
        real_value(fields.avg_sleep_hrv),
        real_value(fields.night_rhr),
        real_value(fields.sleep_rhr),
        real_value(fields.readiness_score),
        real_value(fields.recovery_index),
        real_value(fields.movement_index),
        integer_value(fields.active_minutes),
        real_value(fields.vo2_max),
        real_value(fields.metabolic_score),
    ]
}

fn integer_value(value: Option<i64>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Integer)
}

fn real_value(value: Option<f64>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Real)
}

fn instant_value(value: Option<DateTime<Utc>>) -> SqlValue {
    value.map_or(SqlValue::Null, |instant| {
        SqlValue::Text(timestamp_to_db(instant))
    })
}

fn serialize_json<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(StoreError::from)
}

/// Fixed-width UTC timestamps so text comparison orders chronologically.
fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn option_timestamp_from_db(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(timestamp_from_db).transpose()
}

fn limit_to_db(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn u64_to_i64(field: &'static str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
