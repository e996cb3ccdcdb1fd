//! Cloud backup sync: debounced pushes, bounded retry with backoff, and
//! authoritative pulls, all against a [`BackupClient`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{CloudSyncState, ImportSummary};
use crate::remote::{BackupClient, BackupRow, RemoteError};
use crate::store::{DietStore, SharedStore};

/// Quiet period after the last mutation before a push fires.
pub const PUSH_DEBOUNCE: Duration = Duration::from_secs(3);
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
/// First retry delay; each further attempt doubles it.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cloud backup is not configured")]
    NotConfigured,
    #[error("no cloud user id set")]
    MissingUserId,
    #[error("{}", .0.normalized())]
    Remote(#[from] RemoteError),
    #[error("remote backup could not be applied: {0}")]
    Import(String),
    #[error("failed to encode backup: {0}")]
    Encode(String),
}

impl SyncError {
    /// Configuration problems are reported immediately and never retried.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::MissingUserId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOrigin {
    Manual,
    Debounced,
    Retry,
}

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    next_id: u64,
    debounce: Option<Timer>,
    retry: Option<Timer>,
}

impl Timers {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn replace_timer(slot: &mut Option<Timer>, timer: Timer) {
    if let Some(old) = slot.replace(timer) {
        old.handle.abort();
    }
}

/// Called by a timer task when it fires. False means it was superseded.
fn claim_timer(slot: &mut Option<Timer>, id: u64) -> bool {
    if slot.as_ref().is_some_and(|t| t.id == id) {
        *slot = None;
        true
    } else {
        false
    }
}

fn cancel_timer(slot: &mut Option<Timer>) -> bool {
    slot.take().map(|t| t.handle.abort()).is_some()
}

/// Owns the debounce and retry timers and serialises remote operations.
///
/// Push and pull share a single-flight lock, so a pull never races a push.
pub struct SyncController {
    store: SharedStore,
    client: Option<Arc<dyn BackupClient>>,
    timers: Mutex<Timers>,
    flight: tokio::sync::Mutex<()>,
    runtime: Handle,
    this: Weak<SyncController>,
}

impl SyncController {
    /// Create the controller and hook it into the store so every committed
    /// mutation schedules a debounced push. Must be called inside a tokio runtime.
    pub fn new(
        store: SharedStore,
        client: Option<Arc<dyn BackupClient>>,
    ) -> anyhow::Result<Arc<Self>> {
        let runtime = Handle::try_current().context("Cloud sync needs a tokio runtime")?;
        let controller = Arc::new_cyclic(|this| Self {
            store: Arc::clone(&store),
            client,
            timers: Mutex::new(Timers::default()),
            flight: tokio::sync::Mutex::new(()),
            runtime,
            this: this.clone(),
        });

        let weak = Arc::downgrade(&controller);
        lock_store(&store).set_change_hook(Box::new(move |cloud| {
            if let Some(controller) = weak.upgrade() {
                controller.schedule_push_for(cloud);
            }
        }));
        Ok(controller)
    }

    #[must_use]
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    #[must_use]
    pub fn cloud_status(&self) -> CloudSyncState {
        self.with_store(|s| s.cloud().clone())
    }

    #[must_use]
    pub fn push_pending(&self) -> bool {
        self.lock_timers().debounce.is_some()
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut DietStore) -> T) -> T {
        let mut guard = lock_store(&self.store);
        f(&mut guard)
    }

    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_cloud(&self, f: impl FnOnce(&mut CloudSyncState)) {
        self.with_store(|s| s.update_cloud(f));
    }

    /// Timer-driven pushes have no caller to return to, so every failure
    /// lands in the cloud status.
    fn record_background_failure(&self, e: &SyncError) {
        if e.is_configuration() {
            warn!(error = %e, "background push skipped");
        }
        let message = e.to_string();
        self.update_cloud(|c| {
            c.syncing = false;
            c.error = Some(message);
        });
    }

    /// (Re)start the debounce window if automatic sync is active.
    pub fn schedule_push(&self) {
        let cloud = self.cloud_status();
        self.schedule_push_for(&cloud);
    }

    fn schedule_push_for(&self, cloud: &CloudSyncState) {
        if !cloud.auto_sync_active() || self.client.is_none() {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let mut timers = self.lock_timers();
        let id = timers.next_id();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(PUSH_DEBOUNCE).await;
            if !claim_timer(&mut this.lock_timers().debounce, id) {
                return;
            }
            if let Err(e) = this.push_with(PushOrigin::Debounced).await {
                this.record_background_failure(&e);
            }
        });
        replace_timer(&mut timers.debounce, Timer { id, handle });
        debug!("push scheduled");
    }

    /// Push the full backup now. The caller always receives the failure, in
    /// addition to it being recorded in the cloud status.
    pub async fn push_to_cloud(&self) -> Result<DateTime<Utc>, SyncError> {
        self.push_with(PushOrigin::Manual).await
    }

    fn require_config(&self) -> Result<(Arc<dyn BackupClient>, String), SyncError> {
        let client = self.client.clone().ok_or(SyncError::NotConfigured)?;
        let user_id = self
            .with_store(|s| s.cloud().user_id.clone())
            .filter(|u| !u.is_empty())
            .ok_or(SyncError::MissingUserId)?;
        Ok((client, user_id))
    }

    async fn push_with(&self, origin: PushOrigin) -> Result<DateTime<Utc>, SyncError> {
        let (client, user_id) = self.require_config()?;
        if origin != PushOrigin::Retry {
            cancel_timer(&mut self.lock_timers().retry);
            self.update_cloud(|c| {
                c.retry_attempts = 0;
                c.next_retry_at = None;
            });
        }

        let _flight = self.flight.lock().await;
        let payload = self.with_store(|s| {
            s.update_cloud(|c| {
                c.syncing = true;
                c.error = None;
            });
            s.export_all()
        });
        let data = match serde_json::to_value(&payload) {
            Ok(data) => data,
            Err(e) => {
                let message = e.to_string();
                self.update_cloud(|c| {
                    c.syncing = false;
                    c.error = Some(message.clone());
                });
                return Err(SyncError::Encode(message));
            }
        };
        let row = BackupRow {
            user_id: user_id.clone(),
            data,
            updated_at: Utc::now(),
        };

        match client.upsert(row).await {
            Ok(updated_at) => {
                cancel_timer(&mut self.lock_timers().retry);
                self.update_cloud(|c| {
                    c.syncing = false;
                    c.error = None;
                    c.last_sync_at = Some(updated_at);
                    c.retry_attempts = 0;
                    c.next_retry_at = None;
                });
                info!(user_id = %user_id, ?origin, %updated_at, "pushed backup");
                Ok(updated_at)
            }
            Err(e) => {
                let message = e.normalized();
                self.update_cloud(|c| {
                    c.syncing = false;
                    c.error = Some(message);
                });
                warn!(user_id = %user_id, ?origin, error = %e, "backup push failed");
                self.schedule_retry();
                Err(SyncError::Remote(e))
            }
        }
    }

    fn schedule_retry(&self) {
        let cloud = self.cloud_status();
        if !cloud.auto {
            return;
        }
        if cloud.retry_attempts >= MAX_RETRY_ATTEMPTS {
            warn!(attempts = cloud.retry_attempts, "giving up on automatic retries");
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let delay = RETRY_BASE_DELAY * 2u32.pow(cloud.retry_attempts);
        let attempt = cloud.retry_attempts + 1;
        let next_retry_at = Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
        self.update_cloud(|c| {
            c.retry_attempts = attempt;
            c.next_retry_at = Some(next_retry_at);
        });

        let mut timers = self.lock_timers();
        let id = timers.next_id();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !claim_timer(&mut this.lock_timers().retry, id) {
                return;
            }
            this.update_cloud(|c| c.next_retry_at = None);
            if let Err(e) = this.push_with(PushOrigin::Retry).await {
                debug!(attempt, "retry push failed");
                this.record_background_failure(&e);
            }
        });
        replace_timer(&mut timers.retry, Timer { id, handle });
        info!(attempt, delay_secs = delay.as_secs(), "retry scheduled");
    }

    /// Fetch the remote backup and overwrite all local state with it.
    pub async fn pull_from_cloud(&self) -> Result<ImportSummary, SyncError> {
        let (client, user_id) = self.require_config()?;
        let _flight = self.flight.lock().await;
        self.update_cloud(|c| {
            c.syncing = true;
            c.error = None;
        });

        let stored = match client.fetch(&user_id).await {
            Ok(stored) => stored,
            Err(e) => {
                let message = e.normalized();
                self.update_cloud(|c| {
                    c.syncing = false;
                    c.error = Some(message);
                });
                warn!(user_id = %user_id, error = %e, "backup pull failed");
                return Err(SyncError::Remote(e));
            }
        };

        let applied = self.with_store(|s| {
            let result = s.replace_from_remote(stored.data);
            s.update_cloud(|c| {
                c.syncing = false;
                match &result {
                    Ok(_) => {
                        c.error = None;
                        c.last_sync_at = Some(stored.updated_at);
                    }
                    Err(e) => c.error = Some(format!("{e:#}")),
                }
            });
            result
        });
        match applied {
            Ok(summary) => {
                // Local state now equals the remote copy; nothing left to push.
                cancel_timer(&mut self.lock_timers().debounce);
                info!(user_id = %user_id, days = summary.meal_days, "pulled backup");
                Ok(summary)
            }
            Err(e) => Err(SyncError::Import(format!("{e:#}"))),
        }
    }

    /// Check configuration, then make a read round-trip to the endpoint.
    pub async fn test_connection(&self) -> Result<(), SyncError> {
        let (client, user_id) = self.require_config()?;
        client.probe(&user_id).await?;
        Ok(())
    }

    /// Run a pending debounced push immediately, or wait for one in flight.
    pub async fn flush(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let pending = cancel_timer(&mut self.lock_timers().debounce);
        if pending {
            return self.push_with(PushOrigin::Debounced).await.map(Some);
        }
        drop(self.flight.lock().await);
        Ok(None)
    }

    /// Drop both timers without pushing.
    pub fn cancel_pending(&self) {
        {
            let mut timers = self.lock_timers();
            cancel_timer(&mut timers.debounce);
            cancel_timer(&mut timers.retry);
        }
        self.update_cloud(|c| c.next_retry_at = None);
    }
}

fn lock_store(store: &SharedStore) -> MutexGuard<'_, DietStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
