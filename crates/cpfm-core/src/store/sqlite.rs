//! SQLite row store
//!
//! Schema:
//! - cpfm_site_info: one heartbeat row per `site_id` (upserted)
//! - cpfm_feedbacks: append-only deactivation feedback
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text, which sorts and
//! compares correctly as plain strings.

use super::query::{format_ts, like_contains, QueryBuilder};
use super::{fold_plugin_name, FeedbackFilter, RowStore, StatusRow, TelemetryFilter, TelemetryRow};
use crate::error::{CoreError, Result};
use crate::event::{DataEvent, EventBus};
use chrono::{NaiveDate, NaiveDateTime};
use cpfm_types::{FeedbackRecord, NewFeedback, SiteTelemetryRecord, TIMESTAMP_FORMAT};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cpfm_site_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        site_id TEXT NOT NULL UNIQUE,
        plugin_name TEXT NOT NULL,
        plugin_version TEXT NOT NULL,
        plugin_initial TEXT NOT NULL DEFAULT '',
        domain TEXT NOT NULL DEFAULT '',
        email TEXT,
        server_info TEXT,
        extra_details TEXT,
        created_date TEXT NOT NULL,
        update_date TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_site_info_plugin ON cpfm_site_info(plugin_name);
    CREATE INDEX IF NOT EXISTS idx_site_info_update ON cpfm_site_info(update_date);

    CREATE TABLE IF NOT EXISTS cpfm_feedbacks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plugin_version TEXT NOT NULL,
        plugin_name TEXT NOT NULL,
        plugin_initial TEXT NOT NULL DEFAULT '',
        reason TEXT NOT NULL DEFAULT '',
        review TEXT NOT NULL DEFAULT '',
        domain TEXT NOT NULL DEFAULT '',
        email TEXT,
        extra_details TEXT,
        server_info TEXT,
        deactivation_date TEXT NOT NULL,
        site_id TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_feedbacks_site ON cpfm_feedbacks(site_id);
    CREATE INDEX IF NOT EXISTS idx_feedbacks_date ON cpfm_feedbacks(deactivation_date);
"#;

const UPSERT_TELEMETRY: &str = r#"
    INSERT INTO cpfm_site_info (
        site_id, plugin_name, plugin_version, plugin_initial, domain, email,
        server_info, extra_details, created_date, update_date
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(site_id) DO UPDATE SET
        plugin_name = excluded.plugin_name,
        plugin_version = excluded.plugin_version,
        plugin_initial = excluded.plugin_initial,
        domain = excluded.domain,
        email = excluded.email,
        server_info = excluded.server_info,
        extra_details = excluded.extra_details,
        update_date = excluded.update_date
"#;

/// SQLite-backed row store (thread-safe)
pub struct SqliteRowStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    events: Option<EventBus>,
}

impl SqliteRowStore {
    /// Create or open the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::StoreUnavailable {
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        let conn = Connection::open(path).map_err(CoreError::store("open"))?;

        // WAL lets the CLI read while an import is writing
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(CoreError::store("enable WAL"))?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database (tests, benches)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(CoreError::store("open"))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        register_functions(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(CoreError::store("create schema"))?;

        debug!(path = ?path, "Row store initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            events: None,
        })
    }

    /// Publish a [`DataEvent`] for every write
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn publish(&self, event: DataEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Insert or refresh a heartbeat; `created_date` of an existing row is kept
    ///
    /// The published event names the plugin the site was stored under
    /// before, when the write changes it.
    pub fn upsert_telemetry(&self, record: &SiteTelemetryRecord) -> Result<()> {
        let previous: Option<String> = {
            let conn = self.conn.lock();
            let previous = conn
                .query_row(
                    "SELECT plugin_name FROM cpfm_site_info WHERE site_id = ?",
                    [&record.site_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(CoreError::store("upsert_telemetry"))?;
            conn.execute(UPSERT_TELEMETRY, params_from_iter(telemetry_params(record)))
                .map_err(CoreError::store("upsert_telemetry"))?;
            previous
        };

        let previous_plugin_name = previous
            .filter(|old| fold_plugin_name(old) != fold_plugin_name(&record.plugin_name));
        self.publish(DataEvent::TelemetryUpserted {
            site_id: record.site_id.clone(),
            plugin_name: record.plugin_name.clone(),
            previous_plugin_name,
        });
        Ok(())
    }

    /// Upsert many heartbeats in one transaction
    pub fn import_telemetry(&self, records: &[SiteTelemetryRecord]) -> Result<usize> {
        {
            let mut conn = self.conn.lock();
            let tx = conn
                .transaction()
                .map_err(CoreError::store("begin import"))?;
            {
                let mut stmt = tx
                    .prepare_cached(UPSERT_TELEMETRY)
                    .map_err(CoreError::store("prepare import"))?;
                for record in records {
                    stmt.execute(params_from_iter(telemetry_params(record)))
                        .map_err(CoreError::store("import_telemetry"))?;
                }
            }
            tx.commit().map_err(CoreError::store("commit import"))?;
        }

        debug!(rows = records.len(), "Telemetry imported");
        self.publish(DataEvent::ImportCompleted {
            rows: records.len(),
        });
        Ok(records.len())
    }

    /// Append a feedback row, returning its id
    pub fn insert_feedback(&self, feedback: &NewFeedback) -> Result<i64> {
        let id = {
            let conn = self.conn.lock();
            conn.execute(
                r#"
                INSERT INTO cpfm_feedbacks (
                    plugin_version, plugin_name, plugin_initial, reason, review, domain,
                    email, extra_details, server_info, deactivation_date, site_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    feedback.plugin_version,
                    feedback.plugin_name,
                    feedback.plugin_initial,
                    feedback.reason,
                    feedback.review,
                    feedback.domain,
                    feedback.email,
                    feedback.extra_details,
                    feedback.server_info,
                    format_ts(&feedback.deactivation_date),
                    feedback.site_id,
                ],
            )
            .map_err(CoreError::store("insert_feedback"))?;
            conn.last_insert_rowid()
        };

        self.publish(DataEvent::FeedbackRecorded {
            site_id: feedback.site_id.clone(),
            plugin_name: feedback.plugin_name.clone(),
        });
        Ok(id)
    }

    /// Row counts of (telemetry, feedback)
    pub fn table_counts(&self) -> Result<(u64, u64)> {
        let conn = self.conn.lock();
        let telemetry: i64 = conn
            .query_row("SELECT COUNT(*) FROM cpfm_site_info", [], |row| row.get(0))
            .map_err(CoreError::store("count telemetry"))?;
        let feedback: i64 = conn
            .query_row("SELECT COUNT(*) FROM cpfm_feedbacks", [], |row| row.get(0))
            .map_err(CoreError::store("count feedback"))?;
        Ok((telemetry as u64, feedback as u64))
    }

    /// Full stored heartbeat for one site
    pub fn telemetry_by_site(&self, site_id: &str) -> Result<Option<SiteTelemetryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT site_id, plugin_name, plugin_version, plugin_initial, domain, email,
                       server_info, extra_details, created_date, update_date
                FROM cpfm_site_info WHERE site_id = ?
                "#,
            )
            .map_err(CoreError::store("telemetry_by_site"))?;
        let mut rows = stmt
            .query_map([site_id], |row| {
                Ok(SiteTelemetryRecord {
                    site_id: row.get(0)?,
                    plugin_name: row.get(1)?,
                    plugin_version: row.get(2)?,
                    plugin_initial: row.get(3)?,
                    domain: row.get(4)?,
                    email: row.get(5)?,
                    server_info: row.get(6)?,
                    extra_details: row.get(7)?,
                    created_date: Some(timestamp_at(row, 8)?),
                    update_date: timestamp_at(row, 9)?,
                })
            })
            .map_err(CoreError::store("telemetry_by_site"))?;
        rows.next()
            .transpose()
            .map_err(CoreError::store("telemetry_by_site"))
    }
}

/// SQLite's LOWER only folds ASCII; plugin filters need the same folding
/// as the cache keys.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "cpfm_fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let name: Option<String> = ctx.get(0)?;
            Ok(name.map(|n| fold_plugin_name(&n)))
        },
    )
    .map_err(CoreError::store("register cpfm_fold"))
}

fn telemetry_params(record: &SiteTelemetryRecord) -> Vec<Box<dyn rusqlite::ToSql>> {
    let created = record.created_date.unwrap_or(record.update_date);
    vec![
        Box::new(record.site_id.clone()),
        Box::new(record.plugin_name.clone()),
        Box::new(record.plugin_version.clone()),
        Box::new(record.plugin_initial.clone()),
        Box::new(record.domain.clone()),
        Box::new(record.email.clone()),
        Box::new(record.server_info.clone()),
        Box::new(record.extra_details.clone()),
        Box::new(format_ts(&created)),
        Box::new(format_ts(&record.update_date)),
    ]
}

/// Apply telemetry filters to a query over `cpfm_site_info si`
fn filtered(mut q: QueryBuilder, filter: &TelemetryFilter) -> QueryBuilder {
    if filter.require_plugin_name {
        q = q.and("TRIM(si.plugin_name) <> ''");
    }
    if let Some(name) = &filter.plugin_name {
        q = q.and_param("cpfm_fold(si.plugin_name) = ?", fold_plugin_name(name));
    }
    if let Some(range) = &filter.date_range {
        q = q.and_range("si.update_date", range);
    }
    if let Some(since) = &filter.updated_since {
        q = q.and_param("si.update_date >= ?", format_ts(since));
    }
    q
}

/// Parse a stored timestamp
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", text).into(),
        )
    })
}

/// NULL, blank and zero dates (`0000-00-00 00:00:00`) read as absent
fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text.as_deref().and_then(parse_timestamp))
}

impl RowStore for SqliteRowStore {
    fn telemetry_batch(
        &self,
        filter: &TelemetryFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TelemetryRow>> {
        let q = filtered(
            QueryBuilder::new(
                "SELECT si.site_id, si.plugin_name, si.plugin_version, si.server_info, \
                 si.extra_details, si.update_date FROM cpfm_site_info si",
            ),
            filter,
        )
        .push("ORDER BY si.site_id ASC")
        .page(limit, offset);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(q.sql())
            .map_err(CoreError::store("telemetry_batch"))?;
        let rows = stmt
            .query_map(q.params().as_slice(), |row| {
                Ok(TelemetryRow {
                    site_id: row.get(0)?,
                    plugin_name: row.get(1)?,
                    plugin_version: row.get(2)?,
                    server_info: row.get(3)?,
                    extra_details: row.get(4)?,
                    update_date: timestamp_at(row, 5)?,
                })
            })
            .map_err(CoreError::store("telemetry_batch"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CoreError::store("telemetry_batch"))?;
        Ok(rows)
    }

    fn status_rows(&self, filter: &TelemetryFilter) -> Result<Vec<StatusRow>> {
        let q = filtered(
            QueryBuilder::new(
                "SELECT TRIM(si.plugin_name), si.site_id, si.update_date, fb.last_deactivation \
                 FROM cpfm_site_info si \
                 LEFT JOIN (SELECT site_id, MAX(deactivation_date) AS last_deactivation \
                            FROM cpfm_feedbacks WHERE site_id IS NOT NULL GROUP BY site_id) fb \
                 ON fb.site_id = si.site_id",
            ),
            filter,
        )
        .push("ORDER BY si.id ASC");

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(q.sql())
            .map_err(CoreError::store("status_rows"))?;
        let rows = stmt
            .query_map(q.params().as_slice(), |row| {
                Ok(StatusRow {
                    plugin_name: row.get(0)?,
                    site_id: row.get(1)?,
                    update_date: timestamp_at(row, 2)?,
                    deactivation_date: optional_timestamp_at(row, 3)?,
                })
            })
            .map_err(CoreError::store("status_rows"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CoreError::store("status_rows"))?;
        Ok(rows)
    }

    fn daily_counts(&self, filter: &TelemetryFilter, days: usize) -> Result<Vec<(NaiveDate, u64)>> {
        let q = filtered(
            QueryBuilder::new(
                "SELECT DATE(si.update_date) AS day, COUNT(*) FROM cpfm_site_info si",
            ),
            filter,
        )
        .and("DATE(si.update_date) IS NOT NULL")
        .push("GROUP BY day ORDER BY day DESC")
        .limit(days);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(q.sql())
            .map_err(CoreError::store("daily_counts"))?;
        let rows = stmt
            .query_map(q.params().as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(CoreError::store("daily_counts"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CoreError::store("daily_counts"))?;

        Ok(rows
            .into_iter()
            .filter_map(|(day, count)| {
                NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .ok()
                    .map(|d| (d, count as u64))
            })
            .collect())
    }

    fn plugin_counts(&self, filter: &TelemetryFilter, limit: usize) -> Result<Vec<(String, u64)>> {
        let q = filtered(
            QueryBuilder::new(
                "SELECT TRIM(si.plugin_name) AS name, COUNT(*) AS n FROM cpfm_site_info si",
            ),
            filter,
        )
        .push("GROUP BY TRIM(si.plugin_name) ORDER BY n DESC, MIN(si.id) ASC")
        .limit(limit);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(q.sql())
            .map_err(CoreError::store("plugin_counts"))?;
        let rows = stmt
            .query_map(q.params().as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(CoreError::store("plugin_counts"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CoreError::store("plugin_counts"))?;
        Ok(rows)
    }

    fn plugin_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT DISTINCT TRIM(plugin_name) AS name FROM cpfm_site_info \
                 WHERE plugin_name IS NOT NULL AND TRIM(plugin_name) <> '' ORDER BY name ASC",
            )
            .map_err(CoreError::store("plugin_names"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(CoreError::store("plugin_names"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CoreError::store("plugin_names"))?;
        Ok(names)
    }

    fn query_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackRecord>> {
        let mut q = QueryBuilder::new(
            "SELECT id, plugin_name, plugin_version, plugin_initial, reason, review, domain, \
             email, extra_details, server_info, deactivation_date, site_id FROM cpfm_feedbacks",
        );
        if let Some(search) = filter
            .plugin_search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            q = q.and_param("plugin_name LIKE ? ESCAPE '\\'", like_contains(search));
        }
        if let Some(range) = &filter.date_range {
            q = q.and_range("deactivation_date", range);
        }
        q = q.push("ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            q = q.limit(limit);
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(q.sql())
            .map_err(CoreError::store("query_feedback"))?;
        let rows = stmt
            .query_map(q.params().as_slice(), |row| {
                Ok(FeedbackRecord {
                    id: row.get(0)?,
                    plugin_name: row.get(1)?,
                    plugin_version: row.get(2)?,
                    plugin_initial: row.get(3)?,
                    reason: row.get(4)?,
                    review: row.get(5)?,
                    domain: row.get(6)?,
                    email: row.get(7)?,
                    extra_details: row.get(8)?,
                    server_info: row.get(9)?,
                    deactivation_date: timestamp_at(row, 10)?,
                    site_id: row.get(11)?,
                })
            })
            .map_err(CoreError::store("query_feedback"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CoreError::store("query_feedback"))?;
        Ok(rows)
    }
}
