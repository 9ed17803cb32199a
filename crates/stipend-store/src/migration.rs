//! Database schema migrations for SQLite.
//!
//! Simple versioned migrations: each migration is a SQL batch that
//! transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Workspaces: the custodial groups owning vaults
        CREATE TABLE workspaces (
            workspace_id BLOB PRIMARY KEY,    -- 16 bytes
            name TEXT NOT NULL,
            settings_address BLOB NOT NULL,   -- 32 bytes
            vault_address BLOB NOT NULL,      -- 32 bytes, derived
            creator BLOB NOT NULL,            -- 32 bytes
            program_allowlist BLOB,           -- CBOR array, NULL = default set
            created_at INTEGER NOT NULL
        );

        -- Agents: automated principals
        CREATE TABLE agents (
            agent_id BLOB PRIMARY KEY,        -- 16 bytes
            workspace_id BLOB NOT NULL,
            name TEXT NOT NULL,
            custody_key_id TEXT NOT NULL,
            public_key BLOB NOT NULL,         -- 32 bytes
            status TEXT NOT NULL,
            pop_public_key BLOB,              -- 32 bytes, nullable
            connect_code_hash BLOB,           -- 32 bytes, nullable
            connect_code_expires_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Sessions: the token hash is the unique lookup key
        CREATE TABLE sessions (
            session_id BLOB PRIMARY KEY,      -- 16 bytes
            agent_id BLOB NOT NULL,
            workspace_id BLOB NOT NULL,
            token_hash BLOB NOT NULL UNIQUE,  -- 32 bytes, Blake3 of raw token
            kind TEXT NOT NULL,
            protocol TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            last_used_at INTEGER,
            created_at INTEGER NOT NULL,
            family BLOB,                      -- 16 bytes, refresh only
            sequence INTEGER                  -- refresh only
        );

        -- Replay nonces: a jti may be consumed at most once
        CREATE TABLE replay_nonces (
            jti TEXT PRIMARY KEY,
            expires_at INTEGER NOT NULL
        );

        -- Spending limits: one rolling budget per agent
        CREATE TABLE spending_limits (
            agent_id BLOB PRIMARY KEY,
            token_mint BLOB NOT NULL,
            limit_amount INTEGER NOT NULL,
            spent_amount INTEGER NOT NULL,
            period_type TEXT NOT NULL,
            period_start INTEGER NOT NULL,
            onchain_key BLOB,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Transfer/execute requests
        CREATE TABLE transfer_requests (
            request_id BLOB PRIMARY KEY,
            workspace_id BLOB NOT NULL,
            agent_id BLOB NOT NULL,
            recipient BLOB NOT NULL,
            amount INTEGER NOT NULL,
            token_mint BLOB NOT NULL,
            note TEXT NOT NULL,
            justification TEXT NOT NULL,
            status TEXT NOT NULL,
            limit_snapshot BLOB,              -- CBOR, frozen at creation
            proposal_ref BLOB,
            error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Activity log: append-only, no update/delete paths exist
        CREATE TABLE activity_log (
            activity_id BLOB PRIMARY KEY,
            workspace_id BLOB NOT NULL,
            actor BLOB NOT NULL,              -- CBOR tagged union
            category TEXT NOT NULL,
            action TEXT NOT NULL,
            ledger_signature TEXT,
            amount INTEGER,
            metadata BLOB NOT NULL,           -- CBOR tagged union
            created_at INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_agents_workspace ON agents(workspace_id);
        CREATE INDEX idx_agents_connect_code ON agents(connect_code_hash);
        CREATE INDEX idx_sessions_agent ON sessions(agent_id);
        CREATE INDEX idx_sessions_expiry ON sessions(expires_at);
        CREATE INDEX idx_nonces_expiry ON replay_nonces(expires_at);
        CREATE INDEX idx_requests_agent ON transfer_requests(agent_id, created_at);
        CREATE INDEX idx_activity_workspace ON activity_log(workspace_id, created_at);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "workspaces",
            "agents",
            "sessions",
            "replay_nonces",
            "spending_limits",
            "transfer_requests",
            "activity_log",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
