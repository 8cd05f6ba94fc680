use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::inquiry::domain::{
    Category, Department, Inquiry, InquiryDetails, InquiryId, Prediction, RoutingDecision,
    Sentiment, TriageStatistics, Urgency,
};
use crate::inquiry::repository::{
    DrainBatch, FailureDisposition, InquiryRepository, RepositoryError,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS inquiries (
    id                  TEXT PRIMARY KEY,
    subject             TEXT NOT NULL,
    body                TEXT NOT NULL,
    sender_email        TEXT NOT NULL,
    sender_name         TEXT,
    metadata            TEXT NOT NULL DEFAULT '{}',
    received_at         TEXT NOT NULL,
    processed           INTEGER NOT NULL DEFAULT 0,
    processing_attempts INTEGER NOT NULL DEFAULT 0,
    last_error          TEXT,
    poisoned            INTEGER NOT NULL DEFAULT 0,
    claimed_until       TEXT
);
CREATE INDEX IF NOT EXISTS idx_inquiries_processed_received
    ON inquiries (processed, received_at);
CREATE INDEX IF NOT EXISTS idx_inquiries_poisoned
    ON inquiries (poisoned);

CREATE TABLE IF NOT EXISTS predictions (
    inquiry_id           TEXT PRIMARY KEY REFERENCES inquiries (id),
    category             TEXT NOT NULL,
    category_confidence  REAL NOT NULL,
    sentiment            TEXT NOT NULL,
    sentiment_confidence REAL NOT NULL,
    urgency              TEXT NOT NULL,
    urgency_confidence   REAL NOT NULL,
    model_identifier     TEXT NOT NULL,
    classified_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS routing_decisions (
    inquiry_id        TEXT PRIMARY KEY REFERENCES inquiries (id),
    department        TEXT NOT NULL,
    consultant        TEXT,
    priority_score    INTEGER NOT NULL,
    escalated         INTEGER NOT NULL DEFAULT 0,
    response_deadline TEXT NOT NULL,
    decided_at        TEXT NOT NULL,
    reason            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_routing_department_escalated
    ON routing_decisions (department, escalated);
";

/// SQLite-backed implementation of the persistence contract.
///
/// Access is serialized behind a `Mutex<Connection>`; WAL mode plus a busy
/// timeout keep contention graceful when multiple processes share the file.
/// Result writes run inside a single transaction so readers never observe a
/// prediction without its routing decision.
pub struct SqliteInquiryRepository {
    conn: Mutex<Connection>,
    max_attempts: u32,
}

impl SqliteInquiryRepository {
    pub fn open(path: &Path, max_attempts: u32) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::from_connection(conn, max_attempts)
    }

    /// Private in-memory database; handy for tests and demos.
    pub fn in_memory(max_attempts: u32) -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::from_connection(conn, max_attempts)
    }

    fn from_connection(conn: Connection, max_attempts: u32) -> Result<Self, RepositoryError> {
        // WAL for concurrent readers, a busy timeout instead of hard
        // SQLITE_BUSY failures. journal_mode returns a row, so pragma_update
        // results are ignored deliberately.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        conn.execute_batch(SCHEMA).map_err(storage_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_attempts,
        })
    }
}

impl InquiryRepository for SqliteInquiryRepository {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        let mut conn = self.conn.lock().expect("sqlite connection poisoned");
        let tx = conn.transaction().map_err(storage_error)?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM inquiries WHERE id = ?1",
                [inquiry.id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        if exists.is_some() {
            return Err(RepositoryError::Conflict);
        }

        let metadata = serde_json::to_string(&inquiry.metadata)
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        tx.execute(
            "INSERT INTO inquiries
                 (id, subject, body, sender_email, sender_name, metadata, received_at,
                  processed, processing_attempts, last_error, poisoned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                inquiry.id.to_string(),
                inquiry.subject,
                inquiry.body,
                inquiry.sender_email,
                inquiry.sender_name,
                metadata,
                format_ts(inquiry.received_at),
                inquiry.processed,
                inquiry.processing_attempts,
                inquiry.last_error,
                inquiry.poisoned,
            ],
        )
        .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;

        Ok(inquiry)
    }

    fn fetch_unprocessed(
        &self,
        limit: usize,
        lease: Duration,
        exclude: &HashSet<InquiryId>,
    ) -> Result<DrainBatch, RepositoryError> {
        let mut conn = self.conn.lock().expect("sqlite connection poisoned");
        let tx = conn.transaction().map_err(storage_error)?;

        let now = Utc::now();
        let now_ts = format_ts(now);

        let skipped_in_flight: u64 = tx
            .query_row(
                "SELECT COUNT(*) FROM inquiries
                 WHERE processed = 0 AND poisoned = 0
                   AND claimed_until IS NOT NULL AND claimed_until > ?1",
                [&now_ts],
                |row| row.get(0),
            )
            .map_err(storage_error)?;

        let excluded_ids: Vec<String> = exclude.iter().map(InquiryId::to_string).collect();
        let exclusion_clause = if excluded_ids.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; excluded_ids.len()].join(", ");
            format!(" AND id NOT IN ({placeholders})")
        };
        let sql = format!(
            "SELECT id, subject, body, sender_email, sender_name, metadata,
                    received_at, processed, processing_attempts, last_error, poisoned
             FROM inquiries
             WHERE processed = 0 AND poisoned = 0
               AND (claimed_until IS NULL OR claimed_until <= ?){exclusion_clause}
             ORDER BY received_at ASC
             LIMIT ?"
        );

        let limit_param = limit as i64;
        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(excluded_ids.len() + 2);
        params.push(&now_ts);
        for id in &excluded_ids {
            params.push(id);
        }
        params.push(&limit_param);

        let inquiries = {
            let mut stmt = tx.prepare(&sql).map_err(storage_error)?;
            let rows = stmt
                .query_map(params.as_slice(), inquiry_from_row)
                .map_err(storage_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_error)?
        };

        let claimed_until = format_ts(now + lease);
        for inquiry in &inquiries {
            tx.execute(
                "UPDATE inquiries SET claimed_until = ?1 WHERE id = ?2",
                rusqlite::params![claimed_until, inquiry.id.to_string()],
            )
            .map_err(storage_error)?;
        }
        tx.commit().map_err(storage_error)?;

        Ok(DrainBatch {
            inquiries,
            skipped_in_flight,
        })
    }

    fn record_result(
        &self,
        inquiry_id: &InquiryId,
        prediction: &Prediction,
        decision: &RoutingDecision,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.conn.lock().expect("sqlite connection poisoned");
        let tx = conn.transaction().map_err(storage_error)?;

        let processed: Option<bool> = tx
            .query_row(
                "SELECT processed FROM inquiries WHERE id = ?1",
                [inquiry_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        match processed {
            None => return Err(RepositoryError::NotFound),
            Some(true) => return Err(RepositoryError::Conflict),
            Some(false) => {}
        }

        tx.execute(
            "INSERT INTO predictions
                 (inquiry_id, category, category_confidence, sentiment, sentiment_confidence,
                  urgency, urgency_confidence, model_identifier, classified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                inquiry_id.to_string(),
                prediction.category.label(),
                prediction.category_confidence,
                prediction.sentiment.label(),
                prediction.sentiment_confidence,
                prediction.urgency.label(),
                prediction.urgency_confidence,
                prediction.model_identifier,
                format_ts(prediction.classified_at),
            ],
        )
        .map_err(storage_error)?;

        tx.execute(
            "INSERT INTO routing_decisions
                 (inquiry_id, department, consultant, priority_score, escalated,
                  response_deadline, decided_at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                inquiry_id.to_string(),
                decision.department.label(),
                decision.consultant,
                decision.priority_score as i64,
                decision.escalated,
                format_ts(decision.response_deadline),
                format_ts(decision.decided_at),
                decision.reason,
            ],
        )
        .map_err(storage_error)?;

        tx.execute(
            "UPDATE inquiries
             SET processed = 1, claimed_until = NULL, last_error = NULL
             WHERE id = ?1",
            [inquiry_id.to_string()],
        )
        .map_err(storage_error)?;

        tx.commit().map_err(storage_error)
    }

    fn record_failure(
        &self,
        inquiry_id: &InquiryId,
        reason: &str,
    ) -> Result<FailureDisposition, RepositoryError> {
        let mut conn = self.conn.lock().expect("sqlite connection poisoned");
        let tx = conn.transaction().map_err(storage_error)?;

        let attempts: Option<u32> = tx
            .query_row(
                "SELECT processing_attempts FROM inquiries WHERE id = ?1",
                [inquiry_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        let Some(attempts) = attempts else {
            return Err(RepositoryError::NotFound);
        };

        let attempts = attempts + 1;
        let poisoned = attempts > self.max_attempts;
        tx.execute(
            "UPDATE inquiries
             SET processing_attempts = ?1, last_error = ?2, poisoned = ?3, claimed_until = NULL
             WHERE id = ?4",
            rusqlite::params![attempts, reason, poisoned, inquiry_id.to_string()],
        )
        .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;

        Ok(if poisoned {
            FailureDisposition::Poisoned { attempts }
        } else {
            FailureDisposition::Retained { attempts }
        })
    }

    fn find(&self, inquiry_id: &InquiryId) -> Result<Option<InquiryDetails>, RepositoryError> {
        let conn = self.conn.lock().expect("sqlite connection poisoned");
        let id = inquiry_id.to_string();

        let inquiry = conn
            .query_row(
                "SELECT id, subject, body, sender_email, sender_name, metadata,
                        received_at, processed, processing_attempts, last_error, poisoned
                 FROM inquiries WHERE id = ?1",
                [&id],
                inquiry_from_row,
            )
            .optional()
            .map_err(storage_error)?;
        let Some(inquiry) = inquiry else {
            return Ok(None);
        };

        let prediction = conn
            .query_row(
                "SELECT inquiry_id, category, category_confidence, sentiment,
                        sentiment_confidence, urgency, urgency_confidence,
                        model_identifier, classified_at
                 FROM predictions WHERE inquiry_id = ?1",
                [&id],
                prediction_from_row,
            )
            .optional()
            .map_err(storage_error)?;

        let decision = conn
            .query_row(
                "SELECT inquiry_id, department, consultant, priority_score, escalated,
                        response_deadline, decided_at, reason
                 FROM routing_decisions WHERE inquiry_id = ?1",
                [&id],
                decision_from_row,
            )
            .optional()
            .map_err(storage_error)?;

        Ok(Some(InquiryDetails {
            inquiry,
            prediction,
            decision,
        }))
    }

    fn statistics(&self, window: Duration) -> Result<TriageStatistics, RepositoryError> {
        let conn = self.conn.lock().expect("sqlite connection poisoned");
        let cutoff = format_ts(Utc::now() - window);

        let (total, processed): (u64, u64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(processed), 0)
                 FROM inquiries WHERE received_at >= ?1",
                [&cutoff],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(storage_error)?;

        let per_category = grouped_counts(
            &conn,
            "SELECT p.category, COUNT(*)
             FROM predictions p JOIN inquiries i ON i.id = p.inquiry_id
             WHERE i.received_at >= ?1
             GROUP BY p.category",
            &cutoff,
        )?;

        let per_department = grouped_counts(
            &conn,
            "SELECT r.department, COUNT(*)
             FROM routing_decisions r JOIN inquiries i ON i.id = r.inquiry_id
             WHERE i.received_at >= ?1
             GROUP BY r.department",
            &cutoff,
        )?;

        let escalated: u64 = conn
            .query_row(
                "SELECT COUNT(*)
                 FROM routing_decisions r JOIN inquiries i ON i.id = r.inquiry_id
                 WHERE i.received_at >= ?1 AND r.escalated = 1",
                [&cutoff],
                |row| row.get(0),
            )
            .map_err(storage_error)?;

        let escalation_rate = if total > 0 {
            escalated as f64 / total as f64
        } else {
            0.0
        };

        Ok(TriageStatistics {
            total,
            processed,
            per_category,
            per_department,
            escalated,
            escalation_rate,
        })
    }
}

fn grouped_counts(
    conn: &Connection,
    sql: &str,
    cutoff: &str,
) -> Result<BTreeMap<String, u64>, RepositoryError> {
    let mut stmt = conn.prepare(sql).map_err(storage_error)?;
    let rows = stmt
        .query_map([cutoff], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
        .map_err(storage_error)?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row.map_err(storage_error)?;
        counts.insert(key, count);
    }
    Ok(counts)
}

fn storage_error(err: rusqlite::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn parse_uuid(raw: &str) -> Result<InquiryId, rusqlite::Error> {
    raw.parse::<Uuid>().map(InquiryId).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn label_error(kind: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unknown {kind} label '{raw}'").into(),
    )
}

fn inquiry_from_row(row: &Row<'_>) -> Result<Inquiry, rusqlite::Error> {
    let id: String = row.get(0)?;
    let metadata_raw: String = row.get(5)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_raw)
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?;
    let received_at: String = row.get(6)?;

    Ok(Inquiry {
        id: parse_uuid(&id)?,
        subject: row.get(1)?,
        body: row.get(2)?,
        sender_email: row.get(3)?,
        sender_name: row.get(4)?,
        metadata,
        received_at: parse_ts(&received_at)?,
        processed: row.get(7)?,
        processing_attempts: row.get(8)?,
        last_error: row.get(9)?,
        poisoned: row.get(10)?,
    })
}

fn prediction_from_row(row: &Row<'_>) -> Result<Prediction, rusqlite::Error> {
    let id: String = row.get(0)?;
    let category: String = row.get(1)?;
    let sentiment: String = row.get(3)?;
    let urgency: String = row.get(5)?;
    let classified_at: String = row.get(8)?;

    Ok(Prediction {
        inquiry_id: parse_uuid(&id)?,
        category: Category::from_label(&category)
            .ok_or_else(|| label_error("category", &category))?,
        category_confidence: row.get(2)?,
        sentiment: Sentiment::from_label(&sentiment)
            .ok_or_else(|| label_error("sentiment", &sentiment))?,
        sentiment_confidence: row.get(4)?,
        urgency: Urgency::from_label(&urgency).ok_or_else(|| label_error("urgency", &urgency))?,
        urgency_confidence: row.get(6)?,
        model_identifier: row.get(7)?,
        classified_at: parse_ts(&classified_at)?,
    })
}

fn decision_from_row(row: &Row<'_>) -> Result<RoutingDecision, rusqlite::Error> {
    let id: String = row.get(0)?;
    let department: String = row.get(1)?;
    let priority_score: i64 = row.get(3)?;
    let response_deadline: String = row.get(5)?;
    let decided_at: String = row.get(6)?;

    Ok(RoutingDecision {
        inquiry_id: parse_uuid(&id)?,
        department: Department::from_label(&department)
            .ok_or_else(|| label_error("department", &department))?,
        consultant: row.get(2)?,
        priority_score: priority_score.clamp(0, 100) as u8,
        escalated: row.get(4)?,
        response_deadline: parse_ts(&response_deadline)?,
        decided_at: parse_ts(&decided_at)?,
        reason: row.get(7)?,
    })
}
