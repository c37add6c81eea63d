//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use super::{
    CreateTicketRequest, Ticket, TicketError, TicketFilter, TicketStatus, TicketStore,
    TicketSummary, TicketUpdate,
};

const TICKET_COLUMNS: &str = "id, customer_id, title, description, status, urgency, category, sentiment, resolution_response, draft_updated_by, created_at, updated_at";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        // The job store writes to the same file from its own connection.
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                urgency TEXT,
                category TEXT,
                sentiment INTEGER,
                resolution_response TEXT,
                draft_updated_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_customer_id ON tickets(customer_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at DESC);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let status_in: String;
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref customer_id) = filter.customer_id {
            conditions.push("customer_id = ?");
            params.push(Box::new(customer_id.clone()));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if !filter.statuses.is_empty() {
            status_in = format!(
                "status IN ({})",
                vec!["?"; filter.statuses.len()].join(", ")
            );
            conditions.push(status_in.as_str());
            for status in &filter.statuses {
                params.push(Box::new(status.as_str()));
            }
        }

        if let Some(urgency) = filter.urgency {
            conditions.push("urgency = ?");
            params.push(Box::new(urgency.as_str()));
        }

        if let Some(ref search) = filter.search {
            conditions.push("title LIKE ? ESCAPE '\\'");
            let escaped = search
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            params.push(Box::new(format!("%{}%", escaped)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn parse_column<T: FromStr<Err = String>>(idx: usize, value: &str) -> rusqlite::Result<T> {
        value
            .parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    }

    fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let status: String = row.get(4)?;
        let urgency: Option<String> = row.get(5)?;
        let category: Option<String> = row.get(6)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(Ticket {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: Self::parse_column(4, &status)?,
            urgency: urgency.map(|u| Self::parse_column(5, &u)).transpose()?,
            category: category.map(|c| Self::parse_column(6, &c)).transpose()?,
            sentiment: row.get(7)?,
            resolution_response: row.get(8)?,
            draft_updated_by: row.get(9)?,
            created_at: Self::parse_timestamp(10, &created_at)?,
            updated_at: Self::parse_timestamp(11, &updated_at)?,
        })
    }

    fn select_by_id(conn: &Connection, id: &str) -> Result<Option<Ticket>, TicketError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TicketError::Database(e.to_string())),
        }
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Self::now();

        conn.execute(
            "INSERT INTO tickets (id, customer_id, title, description, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.customer_id,
                request.title,
                request.description,
                TicketStatus::Pending.as_str(),
                now,
                now,
            ],
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Self::select_by_id(&conn, &id)?.ok_or(TicketError::NotFound(id))
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;
        Self::select_by_id(&conn, id)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut tickets = Vec::new();
        for row_result in rows {
            let ticket = row_result.map_err(|e| TicketError::Database(e.to_string()))?;
            tickets.push(ticket);
        }

        Ok(tickets)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(count)
    }

    fn conditional_update_status(
        &self,
        id: &str,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<usize, TicketError> {
        if !from.can_transition_to(to) {
            return Err(TicketError::InvalidTransition { from, to });
        }

        let conn = self.conn()?;

        conn.execute(
            "UPDATE tickets SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            params![to.as_str(), Self::now(), id, from.as_str()],
        )
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn conditional_update(
        &self,
        id: &str,
        from: TicketStatus,
        update: &TicketUpdate,
    ) -> Result<Option<Ticket>, TicketError> {
        if let Some(to) = update.status {
            if to != from && !from.can_transition_to(to) {
                return Err(TicketError::InvalidTransition { from, to });
            }
        }

        let mut assignments = vec!["updated_at = ?"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(Self::now())];

        if let Some(status) = update.status {
            assignments.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(urgency) = update.urgency {
            assignments.push("urgency = ?");
            params.push(Box::new(urgency.as_str()));
        }
        if let Some(category) = update.category {
            assignments.push("category = ?");
            params.push(Box::new(category.as_str()));
        }
        if let Some(sentiment) = update.sentiment {
            assignments.push("sentiment = ?");
            params.push(Box::new(sentiment));
        }
        if let Some(ref response) = update.resolution_response {
            assignments.push("resolution_response = ?");
            params.push(Box::new(response.clone()));
        }
        if let Some(ref updated_by) = update.draft_updated_by {
            assignments.push("draft_updated_by = ?");
            params.push(Box::new(updated_by.clone()));
        }

        params.push(Box::new(id.to_string()));
        params.push(Box::new(from.as_str()));

        let sql = format!(
            "UPDATE tickets SET {} WHERE id = ? AND status = ?",
            assignments.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        // Same lock for write and read-back so the returned row is the one we wrote.
        let conn = self.conn()?;

        let affected = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| TicketError::Database(e.to_string()))?;

        if affected == 0 {
            return Ok(None);
        }

        Self::select_by_id(&conn, id)
    }

    fn summary(&self, customer_id: Option<&str>) -> Result<TicketSummary, TicketError> {
        let conn = self.conn()?;

        let (total, resolved): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'RESOLVED' THEN 1 ELSE 0 END), 0) FROM tickets WHERE ?1 IS NULL OR customer_id = ?1",
                params![customer_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(TicketSummary {
            total,
            resolved,
            unresolved: total - resolved,
        })
    }
}
