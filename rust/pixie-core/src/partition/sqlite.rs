use super::{copy_blob, NamespaceReader, PartitionError, SecurePartition};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// Highest partition format this build can read.
pub const PARTITION_FORMAT_VERSION: u32 = 1;

/// A partition image stored in a SQLite file. The device side only ever
/// opens it read-only; [`SqlitePartition::create`] and
/// [`SqlitePartition::write_blob`] are for the simulator's image writer.
#[derive(Debug, Clone)]
pub struct SqlitePartition {
    path: PathBuf,
}

impl SqlitePartition {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates (or recreates) an empty partition image labelled `label`.
    pub fn create<P: AsRef<Path>>(path: P, label: &str) -> Result<Self, PartitionError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "DROP TABLE IF EXISTS nvs_entries;
             DROP TABLE IF EXISTS nvs_meta;

             CREATE TABLE nvs_meta (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                label           TEXT NOT NULL,
                format_version  INTEGER NOT NULL
             );

             CREATE TABLE nvs_entries (
                namespace       TEXT NOT NULL,
                key             TEXT NOT NULL,
                value           BLOB NOT NULL,
                PRIMARY KEY (namespace, key)
             );",
        )?;
        conn.execute(
            "INSERT INTO nvs_meta (id, label, format_version) VALUES (1, ?1, ?2)",
            params![label, PARTITION_FORMAT_VERSION],
        )?;
        Ok(Self::new(path))
    }

    pub fn write_blob(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), PartitionError> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT OR REPLACE INTO nvs_entries (namespace, key, value) VALUES (?1, ?2, ?3)",
            params![namespace, key, value],
        )?;
        Ok(())
    }

    fn open_read_only(&self, label: &str) -> Result<Connection, PartitionError> {
        if !self.path.exists() {
            return Err(PartitionError::NotFound(label.to_string()));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let has_meta: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'nvs_meta')",
            [],
            |row| row.get(0),
        )?;
        if !has_meta {
            return Err(PartitionError::NoFreePages(label.to_string()));
        }

        let meta = conn
            .query_row(
                "SELECT label, format_version FROM nvs_meta WHERE id = 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;
        let (stored_label, version) = match meta {
            Some(meta) => meta,
            None => return Err(PartitionError::NoFreePages(label.to_string())),
        };

        if stored_label != label {
            return Err(PartitionError::NotFound(label.to_string()));
        }
        if version > PARTITION_FORMAT_VERSION {
            return Err(PartitionError::NewVersionFound {
                label: label.to_string(),
                version,
            });
        }
        Ok(conn)
    }
}

impl SecurePartition for SqlitePartition {
    fn open_namespace(
        &self,
        label: &str,
        namespace: &str,
    ) -> Result<Box<dyn NamespaceReader + '_>, PartitionError> {
        let conn = self.open_read_only(label)?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM nvs_entries WHERE namespace = ?1)",
            params![namespace],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(PartitionError::NamespaceNotFound(namespace.to_string()));
        }

        log::debug!("opened partition {} namespace {} read-only", label, namespace);
        Ok(Box::new(SqliteNamespace {
            conn,
            namespace: namespace.to_string(),
        }))
    }
}

struct SqliteNamespace {
    conn: Connection,
    namespace: String,
}

impl NamespaceReader for SqliteNamespace {
    fn read_blob(&self, key: &str, out: &mut [u8]) -> Result<usize, PartitionError> {
        let value: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM nvs_entries WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        let value = zeroize::Zeroizing::new(
            value.ok_or_else(|| PartitionError::KeyNotFound(key.to_string()))?,
        );
        copy_blob(key, &value, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(dir: &TempDir) -> SqlitePartition {
        let partition = SqlitePartition::create(dir.path().join("nvs.db"), "attest").unwrap();
        partition.write_blob("secure", "attest", &[0xaa; 64]).unwrap();
        partition
    }

    #[test]
    fn test_read_blob() {
        let dir = TempDir::new().unwrap();
        let partition = sample(&dir);

        let ns = partition.open_namespace("attest", "secure").unwrap();
        let mut out = [0u8; 64];
        assert_eq!(ns.read_blob("attest", &mut out).unwrap(), 64);
        assert_eq!(out, [0xaa; 64]);
        assert!(matches!(
            ns.read_blob("pubkey-n", &mut out),
            Err(PartitionError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_open_errors() {
        let dir = TempDir::new().unwrap();
        let partition = sample(&dir);

        assert!(matches!(
            partition.open_namespace("factory", "secure"),
            Err(PartitionError::NotFound(_))
        ));
        assert!(matches!(
            partition.open_namespace("attest", "public"),
            Err(PartitionError::NamespaceNotFound(_))
        ));

        let missing = SqlitePartition::new(dir.path().join("absent.db"));
        assert!(matches!(
            missing.open_namespace("attest", "secure"),
            Err(PartitionError::NotFound(_))
        ));
    }

    #[test]
    fn test_unformatted_and_newer_partitions() {
        let dir = TempDir::new().unwrap();

        let blank_path = dir.path().join("blank.db");
        Connection::open(&blank_path)
            .unwrap()
            .execute_batch("CREATE TABLE junk (x INTEGER);")
            .unwrap();
        assert!(matches!(
            SqlitePartition::new(&blank_path).open_namespace("attest", "secure"),
            Err(PartitionError::NoFreePages(_))
        ));

        let partition = sample(&dir);
        Connection::open(partition.path())
            .unwrap()
            .execute("UPDATE nvs_meta SET format_version = 7 WHERE id = 1", [])
            .unwrap();
        assert!(matches!(
            partition.open_namespace("attest", "secure"),
            Err(PartitionError::NewVersionFound { version: 7, .. })
        ));
    }
}
