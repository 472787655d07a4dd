//! Block policy persistence

use anyhow::{Context, Result};
use rusqlite::params;
use std::collections::BTreeSet;

use super::Database;
use crate::models::BlockPolicy;

impl Database {
    /// Replace the whole blocked-app set atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; the previous set is left untouched
    pub fn set_blocked_apps(&self, policy: &BlockPolicy) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM blocked_apps", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO blocked_apps (app_id) VALUES (?1)")?;
            for app in policy.apps() {
                stmt.execute(params![app])
                    .with_context(|| format!("Failed to store blocked app '{app}'"))?;
            }
        }
        tx.commit().context("Failed to commit blocked apps")?;

        log::debug!("Stored {} blocked apps", policy.len());
        Ok(())
    }

    /// Get the persisted block policy
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_blocked_apps(&self) -> Result<BlockPolicy> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT app_id FROM blocked_apps")?;
        let apps = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(BlockPolicy::new(apps))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_database;
    use crate::models::BlockPolicy;
    use crate::Database;

    #[test]
    fn test_empty_policy_by_default() {
        let (_dir, db) = temp_database();
        assert!(db.get_blocked_apps().unwrap().is_empty());
    }

    #[test]
    fn test_set_then_get_returns_same_set() {
        let (_dir, db) = temp_database();
        let policy = BlockPolicy::new(["com.instagram.android", "com.zhiliaoapp.musically"]);

        db.set_blocked_apps(&policy).unwrap();
        assert_eq!(db.get_blocked_apps().unwrap(), policy);
    }

    #[test]
    fn test_set_replaces_previous_set() {
        let (_dir, db) = temp_database();
        db.set_blocked_apps(&BlockPolicy::new(["a", "b"])).unwrap();
        db.set_blocked_apps(&BlockPolicy::new(["c"])).unwrap();

        let stored = db.get_blocked_apps().unwrap();
        assert_eq!(stored, BlockPolicy::new(["c"]));
    }

    #[test]
    fn test_set_empty_clears_policy() {
        let (_dir, db) = temp_database();
        db.set_blocked_apps(&BlockPolicy::new(["a"])).unwrap();
        db.set_blocked_apps(&BlockPolicy::default()).unwrap();
        assert!(db.get_blocked_apps().unwrap().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_policy_unchanged() {
        let (_dir, db) = temp_database();
        db.set_blocked_apps(&BlockPolicy::new(["old.app"])).unwrap();

        db.conn()
            .unwrap()
            .execute(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON blocked_apps
                 WHEN NEW.app_id = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
                [],
            )
            .unwrap();

        let result = db.set_blocked_apps(&BlockPolicy::new(["new.app", "poison"]));
        assert!(result.is_err());
        assert_eq!(db.get_blocked_apps().unwrap(), BlockPolicy::new(["old.app"]));
    }

    #[test]
    fn test_policy_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kemeselot.db");
        {
            let db = Database::new(Some(path.clone())).unwrap();
            db.set_blocked_apps(&BlockPolicy::new(["app.x"])).unwrap();
        }
        let reopened = Database::new(Some(path)).unwrap();
        assert!(reopened.get_blocked_apps().unwrap().is_blocked("app.x"));
    }
}
