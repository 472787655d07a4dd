//! Supervisor start intent persistence

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::models::{ServiceIntent, ServiceState};

impl Database {
    /// Get the last recorded start intent (stopped when never recorded)
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_service_state(&self) -> Result<ServiceState> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT desired_state, updated_at FROM service_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((state, updated_at)) => ServiceState {
                intent: ServiceIntent::parse_intent(&state).unwrap_or_default(),
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
            },
            None => ServiceState {
                intent: ServiceIntent::Stopped,
                updated_at: None,
            },
        })
    }

    /// Record the user's start/stop intent
    ///
    /// # Errors
    ///
    /// Returns an error if the database upsert fails
    pub fn set_service_intent(&self, intent: ServiceIntent) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO service_state (id, desired_state, updated_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                desired_state = excluded.desired_state,
                updated_at = excluded.updated_at",
            params![intent.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
