//! Ritual settings persistence

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::models::{PrayerMode, Settings};

impl Database {
    /// Get settings, creating the defaults on first read
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_settings(&self) -> Result<Settings> {
        let result: Option<Settings> = self
            .conn()?
            .query_row(
                "SELECT prayer_mode, timer_duration_seconds, overlay_command
                 FROM settings WHERE id = 1",
                [],
                |row| {
                    let mode: String = row.get(0)?;
                    Ok(Settings {
                        prayer_mode: PrayerMode::parse_mode(&mode).unwrap_or_default(),
                        timer_duration_seconds: row.get(1)?,
                        overlay_command: row.get(2)?,
                    })
                },
            )
            .optional()?;

        if let Some(settings) = result {
            Ok(settings)
        } else {
            let settings = Settings::default_settings();
            self.update_settings(&settings)?;
            Ok(settings)
        }
    }

    /// Update settings
    ///
    /// # Errors
    ///
    /// Returns an error if validation or the database upsert fails
    pub fn update_settings(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;

        self.conn()?.execute(
            "INSERT INTO settings (id, prayer_mode, timer_duration_seconds, overlay_command)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                prayer_mode = excluded.prayer_mode,
                timer_duration_seconds = excluded.timer_duration_seconds,
                overlay_command = excluded.overlay_command",
            params![
                settings.prayer_mode.to_string(),
                settings.timer_duration_seconds,
                settings.overlay_command,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_database;
    use crate::models::{PrayerMode, Settings};

    #[test]
    fn test_defaults_created_on_first_read() {
        let (_dir, db) = temp_database();
        let settings = db.get_settings().unwrap();
        assert_eq!(settings, Settings::default_settings());
        assert_eq!(settings.timer_duration_seconds, 300);
    }

    #[test]
    fn test_update_settings_persists() {
        let (_dir, db) = temp_database();
        let settings = Settings {
            prayer_mode: PrayerMode::Voice,
            timer_duration_seconds: 600,
            overlay_command: Some("kemeselot-overlay --fullscreen".to_string()),
        };
        db.update_settings(&settings).unwrap();
        assert_eq!(db.get_settings().unwrap(), settings);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (_dir, db) = temp_database();
        let settings = Settings {
            timer_duration_seconds: 0,
            ..Settings::default()
        };
        assert!(db.update_settings(&settings).is_err());
        assert_eq!(db.get_settings().unwrap().timer_duration_seconds, 300);
    }
}
