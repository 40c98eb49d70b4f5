pub mod migrations;
pub mod queries;

use anyhow::Context;
use rusqlite::Connection;

/// Opens the booking database and brings its schema up to date.
///
/// `busy_timeout` lets a second writer wait for an open immediate
/// transaction instead of failing with `SQLITE_BUSY`.
pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("failed to open database at {path}"))?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;
    tracing::debug!(path = %path, "database ready");

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_guards_installed() {
        let conn = init_db(":memory:").unwrap();
        let names: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('index', 'trigger') ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(names.contains(&"idx_bookings_live_slot".to_string()));
        assert!(names.contains(&"bookings_weekly_limit_insert".to_string()));
        assert!(names.contains(&"bookings_no_revive".to_string()));

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }
}
