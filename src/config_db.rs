use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Result;

/// Configured bibliography path -> insertion position.
const BIBLIOGRAPHIES: TableDefinition<&str, u64> =
    TableDefinition::new("bibliographies");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(BIBLIOGRAPHIES)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Bibliographies --

    /// Append a bibliography path. Returns `false` if it was already listed.
    pub fn add_bibliography(&self, path: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let added = {
            let mut table = txn.open_table(BIBLIOGRAPHIES)?;
            if table.get(path)?.is_some() {
                false
            } else {
                let mut next = 0;
                for entry in table.iter()? {
                    let (_k, v) = entry?;
                    next = next.max(v.value() + 1);
                }
                table.insert(path, next)?;
                true
            }
        };
        txn.commit()?;
        Ok(added)
    }

    pub fn remove_bibliography(&self, path: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(BIBLIOGRAPHIES)?;
            table.remove(path)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Configured bibliography paths in the order they were added.
    pub fn list_bibliographies(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BIBLIOGRAPHIES)?;
        let mut entries = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            entries.push((v.value(), k.value().to_string()));
        }
        entries.sort();
        Ok(entries.into_iter().map(|(_, path)| path).collect())
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
