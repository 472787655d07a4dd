use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if database table creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Blocked apps table - one row per application identifier
    conn.execute(
        "CREATE TABLE IF NOT EXISTS blocked_apps (
            app_id TEXT PRIMARY KEY
        )",
        [],
    )?;

    // Settings table - ritual preferences, single row
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            prayer_mode TEXT NOT NULL,
            timer_duration_seconds INTEGER NOT NULL,
            overlay_command TEXT
        )",
        [],
    )?;

    // Service state table - last start/stop intent of the user
    conn.execute(
        "CREATE TABLE IF NOT EXISTS service_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            desired_state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
