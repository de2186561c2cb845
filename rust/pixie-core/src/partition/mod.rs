//! Read-only key/value partitions holding the provisioned secure material.
//!
//! A partition is addressed by label and split into namespaces of named
//! blobs, following the layout of the firmware's NVS flash partitions.
//! [`MemoryPartition`] backs unit tests; [`SqlitePartition`] persists the
//! simulated device between CLI invocations.

mod sqlite;

pub use sqlite::{SqlitePartition, PARTITION_FORMAT_VERSION};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("partition {0}: no free pages, partition must be erased")]
    NoFreePages(String),
    #[error("partition {label}: written by newer format version {version}")]
    NewVersionFound { label: String, version: u32 },
    #[error("partition {0} not found")]
    NotFound(String),
    #[error("namespace {0} not found")]
    NamespaceNotFound(String),
    #[error("key {0} not found")]
    KeyNotFound(String),
    #[error("blob {key} is {actual} bytes, buffer holds {capacity}")]
    InvalidLength {
        key: String,
        actual: usize,
        capacity: usize,
    },
    #[error("partition storage: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub trait SecurePartition: Send + Sync {
    /// Opens `namespace` in partition `label` for reading.
    fn open_namespace(
        &self,
        label: &str,
        namespace: &str,
    ) -> Result<Box<dyn NamespaceReader + '_>, PartitionError>;
}

impl<T: SecurePartition + ?Sized> SecurePartition for std::sync::Arc<T> {
    fn open_namespace(
        &self,
        label: &str,
        namespace: &str,
    ) -> Result<Box<dyn NamespaceReader + '_>, PartitionError> {
        (**self).open_namespace(label, namespace)
    }
}

pub trait NamespaceReader {
    /// Copies blob `key` into the front of `out` and returns its length.
    /// Fails with [`PartitionError::InvalidLength`] if `out` is too small.
    fn read_blob(&self, key: &str, out: &mut [u8]) -> Result<usize, PartitionError>;
}

/// Simulated on-flash format state of a [`MemoryPartition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionFormat {
    #[default]
    Ready,
    NeedsErase,
    NewerVersion(u32),
}

#[derive(Debug, Default)]
pub struct MemoryPartition {
    label: String,
    format: PartitionFormat,
    namespaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    opens: AtomicUsize,
}

impl MemoryPartition {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn with_blob(mut self, namespace: &str, key: &str, value: &[u8]) -> Self {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        self
    }

    pub fn with_format(mut self, format: PartitionFormat) -> Self {
        self.format = format;
        self
    }

    /// Number of `open_namespace` calls made against this partition.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SecurePartition for MemoryPartition {
    fn open_namespace(
        &self,
        label: &str,
        namespace: &str,
    ) -> Result<Box<dyn NamespaceReader + '_>, PartitionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if label != self.label {
            return Err(PartitionError::NotFound(label.to_string()));
        }
        match self.format {
            PartitionFormat::Ready => {}
            PartitionFormat::NeedsErase => {
                return Err(PartitionError::NoFreePages(label.to_string()))
            }
            PartitionFormat::NewerVersion(version) => {
                return Err(PartitionError::NewVersionFound {
                    label: label.to_string(),
                    version,
                })
            }
        }

        let blobs = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| PartitionError::NamespaceNotFound(namespace.to_string()))?;
        Ok(Box::new(MemoryNamespace { blobs }))
    }
}

struct MemoryNamespace<'a> {
    blobs: &'a BTreeMap<String, Vec<u8>>,
}

impl NamespaceReader for MemoryNamespace<'_> {
    fn read_blob(&self, key: &str, out: &mut [u8]) -> Result<usize, PartitionError> {
        let value = self
            .blobs
            .get(key)
            .ok_or_else(|| PartitionError::KeyNotFound(key.to_string()))?;
        copy_blob(key, value, out)
    }
}

pub(crate) fn copy_blob(key: &str, value: &[u8], out: &mut [u8]) -> Result<usize, PartitionError> {
    if value.len() > out.len() {
        return Err(PartitionError::InvalidLength {
            key: key.to_string(),
            actual: value.len(),
            capacity: out.len(),
        });
    }
    out[..value.len()].copy_from_slice(value);
    Ok(value.len())
}
