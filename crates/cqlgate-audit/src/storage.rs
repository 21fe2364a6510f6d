//! Audit storage backends.

use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::logger::AuditFilter;

/// Events kept in memory by [`FileStorage`] for queries.
const MAX_CACHED_EVENTS: usize = 10_000;

/// Trait for audit storage backends.
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Store an audit event.
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Query audit events with filters, newest first.
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError>;
}

/// Human-readable lines on stdout.
#[derive(Debug, Default)]
pub struct ConsoleStorage;

impl ConsoleStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditStorage for ConsoleStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        println!("{}", event.to_log_line());
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(vec![])
    }
}

/// JSON Lines file plus a bounded in-memory cache of recent events.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
    events: RwLock<Vec<AuditEvent>>,
}

impl FileStorage {
    /// Create the storage, creating the parent directory if needed.
    ///
    /// The most recent events already in the file are loaded for queries.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AuditError::InitializationFailed(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let events = load(&path)?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            events: RwLock::new(events),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStorage for FileStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(&event)?;

        {
            let _guard = self.write_lock.lock().await;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{}", json)?;
        }

        let mut events = self
            .events
            .write()
            .map_err(|e| AuditError::StorageError(format!("audit cache poisoned: {}", e)))?;
        if events.len() >= MAX_CACHED_EVENTS {
            events.remove(0);
        }
        events.push(event);

        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        let events = self
            .events
            .read()
            .map_err(|e| AuditError::StorageError(format!("audit cache poisoned: {}", e)))?;

        let mut results: Vec<_> = events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        // Newest first.
        results.reverse();

        if let Some(offset) = filter.offset {
            results = results.into_iter().skip(offset).collect();
        }
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}

fn load(path: &Path) -> Result<Vec<AuditEvent>, AuditError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut events: Vec<AuditEvent> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable audit line");
                None
            }
        })
        .collect();
    let excess = events.len().saturating_sub(MAX_CACHED_EVENTS);
    events.drain(..excess);
    Ok(events)
}

/// File storage mirrored to the console.
pub struct DualStorage {
    file: FileStorage,
    console: ConsoleStorage,
}

impl DualStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Ok(Self {
            file: FileStorage::new(path)?,
            console: ConsoleStorage::new(),
        })
    }
}

#[async_trait]
impl AuditStorage for DualStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.console.store(event.clone()).await?;
        self.file.store(event).await
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.file.query(filter).await
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullStorage;

impl NullStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditStorage for NullStorage {
    async fn store(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(vec![])
    }
}
