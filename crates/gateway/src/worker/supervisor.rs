//! Worker registry and health supervision
//!
//! Owns every running worker, keyed by `(user, class)`. Starting a worker
//! for a key that already has one replaces it. Unhealthy workers are torn
//! down by [`Supervisor::sweep`]; recreating them is up to the caller, which
//! can fetch the stored credentials.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::error::{ConnectError, TransportError};
use crate::market_data::BookPublisher;
use crate::session::Credentials;
use crate::transport::SessionTransport;

use super::{WorkerConfig, WorkerHandle, WorkerKey, WorkerStatus};

struct WorkerRecord {
    handle: WorkerHandle,
    task: JoinHandle<()>,
}

impl WorkerRecord {
    async fn shutdown(self, timeout: Duration) {
        if !self.handle.request_shutdown(timeout).await {
            warn!(
                "[{}] Worker did not stop within {timeout:?}, aborting",
                self.handle.key()
            );
        }
        if !self.task.is_finished() {
            self.task.abort();
        }
    }
}

pub struct Supervisor {
    workers: DashMap<WorkerKey, WorkerRecord>,
    credentials: DashMap<WorkerKey, Credentials>,
    publisher: Arc<BookPublisher>,
    staleness: Duration,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(publisher: Arc<BookPublisher>, staleness: Duration, shutdown_timeout: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            credentials: DashMap::new(),
            publisher,
            staleness,
            shutdown_timeout,
        }
    }

    pub fn from_config(config: &GatewayConfig, publisher: Arc<BookPublisher>) -> Self {
        Self::new(
            publisher,
            config.supervision.staleness(),
            config.timeouts.shutdown(),
        )
    }

    /// Start (or replace) the worker for `config.key`
    pub async fn start<T, F, Fut>(
        &self,
        config: WorkerConfig,
        open: F,
    ) -> Result<WorkerHandle, ConnectError>
    where
        T: SessionTransport + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let key = config.key.clone();
        if self.stop(&key).await {
            info!("[{key}] Replacing existing worker");
        }

        let credentials = config.credentials.clone();
        let (handle, task) = super::spawn(config, Arc::clone(&self.publisher), open).await?;
        self.credentials.insert(key.clone(), credentials);
        if let Some(previous) = self.workers.insert(
            key.clone(),
            WorkerRecord {
                handle: handle.clone(),
                task,
            },
        ) {
            // A concurrent start for the same key won the race
            warn!("[{key}] Concurrent start, stopping the older worker");
            previous.shutdown(self.shutdown_timeout).await;
        }
        Ok(handle)
    }

    /// Stop a worker; true if one was running under `key`
    pub async fn stop(&self, key: &WorkerKey) -> bool {
        let Some((_, record)) = self.workers.remove(key) else {
            return false;
        };
        record.shutdown(self.shutdown_timeout).await;
        info!("[{key}] Worker removed");
        true
    }

    /// Stop and forget the credentials, so nothing recreates the worker
    pub async fn forget(&self, key: &WorkerKey) -> bool {
        self.credentials.remove(key);
        self.stop(key).await
    }

    pub fn get(&self, key: &WorkerKey) -> Option<WorkerHandle> {
        self.workers.get(key).map(|r| r.handle.clone())
    }

    pub fn credentials(&self, key: &WorkerKey) -> Option<Credentials> {
        self.credentials.get(key).map(|c| c.clone())
    }

    /// Alive and heard from within the staleness window
    pub fn is_healthy(&self, key: &WorkerKey) -> bool {
        self.workers
            .get(key)
            .is_some_and(|r| self.handle_is_healthy(&r.handle))
    }

    fn handle_is_healthy(&self, handle: &WorkerHandle) -> bool {
        let idle = handle.idle_for().to_std().unwrap_or(Duration::ZERO);
        handle.is_alive() && idle < self.staleness
    }

    /// Tear down every unhealthy worker; returns their keys
    pub async fn sweep(&self) -> Vec<WorkerKey> {
        let unhealthy: Vec<WorkerKey> = self
            .workers
            .iter()
            .filter(|r| !self.handle_is_healthy(&r.handle))
            .map(|r| r.key().clone())
            .collect();

        for key in &unhealthy {
            warn!("[{key}] Unhealthy, tearing down");
            self.stop(key).await;
        }
        unhealthy
    }

    pub fn health(&self) -> Vec<WorkerStatus> {
        let mut reports: Vec<WorkerStatus> = self
            .workers
            .iter()
            .map(|r| r.handle.status_report())
            .collect();
        reports.sort_by(|a, b| (&a.user_id, a.class.as_str()).cmp(&(&b.user_id, b.class.as_str())));
        reports
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop every worker
    pub async fn shutdown_all(&self) {
        let keys: Vec<WorkerKey> = self.workers.iter().map(|r| r.key().clone()).collect();
        for key in keys {
            self.stop(&key).await;
        }
        info!("All workers stopped");
    }
}
