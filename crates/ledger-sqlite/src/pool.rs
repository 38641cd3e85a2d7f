//! Very simple connection pool, adapted from `cdk-sql-common::pool` but
//! monomorphized to a single `rusqlite::Connection` resource type rather than
//! left generic over a `DatabasePool` trait, since this crate only ever
//! pools one kind of resource.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::SqliteError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a pooled [`rusqlite::Connection`] should point.
#[derive(Debug, Clone)]
pub enum Location {
    /// A private, in-memory database. Each connection created from this
    /// location is an independent, empty database, so a pool over it only
    /// ever makes sense with `max_size == 1`.
    Memory,
    /// A file on disk, shared by every connection in the pool.
    Path(PathBuf),
}

/// Generic connection pool over [`rusqlite::Connection`].
#[derive(Debug)]
pub struct Pool {
    location: Location,
    queue: Mutex<Vec<(Arc<AtomicBool>, Connection)>>,
    in_use: AtomicUsize,
    max_size: usize,
    waiter: Condvar,
}

/// A pooled [`rusqlite::Connection`], returned to the pool on drop.
pub struct PooledConnection {
    resource: Option<(Arc<AtomicBool>, Connection)>,
    pool: Arc<Pool>,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Ok(mut queue) = self.pool.queue.lock() {
                queue.push(resource);
                self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
                self.pool.waiter.notify_one();
            }
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self
            .resource
            .as_ref()
            .expect("resource taken before drop")
            .1
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .resource
            .as_mut()
            .expect("resource taken before drop")
            .1
    }
}

impl Pool {
    /// Creates a new pool against `location`, with room for `max_size`
    /// concurrent connections.
    pub fn new(location: Location, max_size: usize) -> Arc<Self> {
        Arc::new(Pool {
            location,
            queue: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
            max_size: max_size.max(1),
            waiter: Condvar::new(),
        })
    }

    fn open_connection(&self) -> Result<Connection, SqliteError> {
        let conn = match &self.location {
            Location::Memory => Connection::open_in_memory()?,
            Location::Path(path) => Connection::open(path)?,
        };
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Gets a connection from the pool, opening a new one if there is room,
    /// or blocking (with a timeout) until one is returned.
    pub fn get(self: &Arc<Self>) -> Result<PooledConnection, SqliteError> {
        let mut queue = self.queue.lock().map_err(|_| SqliteError::PoolPoisoned)?;
        let start = Instant::now();

        loop {
            if let Some((stale, conn)) = queue.pop() {
                if !stale.load(Ordering::SeqCst) {
                    self.in_use.fetch_add(1, Ordering::AcqRel);
                    drop(queue);
                    return Ok(PooledConnection {
                        resource: Some((stale, conn)),
                        pool: self.clone(),
                    });
                }
            }

            if self.in_use.load(Ordering::Relaxed) < self.max_size {
                self.in_use.fetch_add(1, Ordering::AcqRel);
                drop(queue);
                return match self.open_connection() {
                    Ok(conn) => Ok(PooledConnection {
                        resource: Some((Arc::new(AtomicBool::new(false)), conn)),
                        pool: self.clone(),
                    }),
                    Err(e) => {
                        self.in_use.fetch_sub(1, Ordering::AcqRel);
                        Err(e)
                    }
                };
            }

            let (lock, timeout_result) = self
                .waiter
                .wait_timeout(queue, DEFAULT_TIMEOUT)
                .map_err(|_| SqliteError::PoolPoisoned)?;
            queue = lock;
            if timeout_result.timed_out() {
                tracing::warn!(
                    "timed out waiting for a sqlite connection (pool size {}, waited {}ms)",
                    self.max_size,
                    start.elapsed().as_millis()
                );
                return Err(SqliteError::PoolTimeout);
            }
        }
    }
}
