use chrono::{SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;

impl Db {
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entry WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO kv_entry (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
              value = excluded.value,
              updated_at = excluded.updated_at
            "#,
            params![key, value, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv_entry WHERE key = ?1", [key])?;
        Ok(rows > 0)
    }

    pub fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT key
            FROM kv_entry
            WHERE key LIKE ?1 ESCAPE '\'
            ORDER BY key ASC
            "#,
        )?;
        let rows = stmt.query_map([like_prefix(prefix)], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn delete_prefix(&mut self, prefix: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let rows = tx.execute(
            r#"DELETE FROM kv_entry WHERE key LIKE ?1 ESCAPE '\'"#,
            [like_prefix(prefix)],
        )?;
        tx.commit()?;
        Ok(rows)
    }

    pub fn count_entries(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv_entry", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
