// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded credential database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `session`: namespaced key (`{partition}/{slot}`) → JSON bytes

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::kv::{KeyValueStore, StoreResult};

/// Single table holding every session slot of every partition.
const SESSION: TableDefinition<&str, &[u8]> = TableDefinition::new("session");

/// Durable [`KeyValueStore`] on a redb file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSION)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSION)?;
        let value = table.get(key)?.map(|value| value.value().to_vec());
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn take(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let write_txn = self.db.begin_write()?;
        let taken = {
            let mut table = write_txn.open_table(SESSION)?;
            let removed = table.remove(key)?.map(|value| value.value().to_vec());
            removed
        };
        write_txn.commit()?;
        Ok(taken)
    }

    fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION)?;
            for key in keys {
                table.remove(*key)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
