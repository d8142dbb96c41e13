use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// Local durable state. Holds the vote overlay: one row per post the user
/// has voted on, direction +1 or -1, never 0.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn get_vote(&self, post_id: &str) -> Result<Option<i8>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT direction FROM votes WHERE post_id = ?1",
            params![post_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|dir| dir.map(|d| d as i8))
        .context("storage: query vote")
    }

    pub fn set_vote(&self, post_id: &str, direction: i8) -> Result<()> {
        if post_id.is_empty() {
            bail!("storage: post id required");
        }
        if direction != 1 && direction != -1 {
            bail!("storage: vote direction must be +1 or -1");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO votes (post_id, direction, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(post_id) DO UPDATE SET
  direction = excluded.direction,
  updated_at = excluded.updated_at
"#,
            params![post_id, direction as i64, unix_now()],
        )?;
        Ok(())
    }

    pub fn clear_vote(&self, post_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM votes WHERE post_id = ?1", params![post_id])?;
        Ok(())
    }

    pub fn all_votes(&self) -> Result<HashMap<String, i8>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT post_id, direction FROM votes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as i8))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let migrations = migrations();
    for (idx, sql) in migrations.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, unix_now()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS votes (
  post_id TEXT PRIMARY KEY,
  direction INTEGER NOT NULL CHECK (direction IN (-1, 1)),
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("campus-echo").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn votes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        store.set_vote("42", 1).unwrap();
        store.set_vote("7", -1).unwrap();
        store.set_vote("42", -1).unwrap();
        store.close().unwrap();

        let store = Store::open(Options { path: Some(path) }).unwrap();
        assert_eq!(store.get_vote("42").unwrap(), Some(-1));
        assert_eq!(store.get_vote("7").unwrap(), Some(-1));
        assert_eq!(store.get_vote("missing").unwrap(), None);
        let all = store.all_votes().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn clear_removes_the_row() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();
        store.set_vote("9", 1).unwrap();
        store.clear_vote("9").unwrap();
        assert_eq!(store.get_vote("9").unwrap(), None);
    }

    #[test]
    fn rejects_zero_direction() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();
        assert!(store.set_vote("9", 0).is_err());
    }
}
