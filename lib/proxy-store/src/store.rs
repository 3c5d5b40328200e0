//! Revisioned store for services and their endpoints

use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::state::State;
use crate::txn::{ReadTx, WriteTx};
use crate::{Result, Revision, StoreError, StoreMetrics, LATEST};

/// Store holds every known service and endpoint behind a single revision
/// counter.
///
/// Writers go through [`Store::update`], one at a time. Readers go through
/// [`Store::view`], concurrently with each other but never alongside a
/// writer. Each committed update advances the revision by exactly one and
/// wakes every view waiting for it.
pub struct Store {
    state: RwLock<State>,
    revision_tx: watch::Sender<Revision>,
    metrics: Option<StoreMetrics>,
}

impl Store {
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(State::default()),
            revision_tx,
            metrics: None,
        }
    }

    /// Create a store that reports into `metrics`
    pub fn with_metrics(metrics: StoreMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new()
        }
    }

    pub fn metrics(&self) -> Option<&StoreMetrics> {
        self.metrics.as_ref()
    }

    /// Last committed revision
    pub fn revision(&self) -> Revision {
        *self.revision_tx.borrow()
    }

    /// Receiver that observes every revision change
    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.revision_tx.subscribe()
    }

    /// Run `f` with exclusive write access, then commit.
    ///
    /// The commit bumps the revision even when `f` changed nothing.
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut WriteTx<'_>) -> R,
    {
        let mut state = self.state.write().await;
        let started = Instant::now();
        let out = f(&mut WriteTx::new(&mut *state));
        self.commit(&mut *state, started);
        out
    }

    /// Blocking variant of [`Store::update`] for callers on plain threads.
    ///
    /// Panics when called from within an async runtime.
    pub fn blocking_update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut WriteTx<'_>) -> R,
    {
        let mut state = self.state.blocking_write();
        let started = Instant::now();
        let out = f(&mut WriteTx::new(&mut *state));
        self.commit(&mut *state, started);
        out
    }

    /// Wait until the revision reaches `min_revision`, then run `f` with
    /// shared read access. `LATEST` does not wait.
    ///
    /// Never returns if no update reaches `min_revision`; see
    /// [`Store::view_timeout`].
    pub async fn view<F, R>(&self, min_revision: Revision, f: F) -> R
    where
        F: FnOnce(&ReadTx<'_>) -> R,
    {
        let started = Instant::now();
        self.wait_for_revision(min_revision).await;
        self.observe_wait(started);

        let state = self.state.read().await;
        self.read(&*state, f)
    }

    /// Like [`Store::view`], giving up after `timeout` if `min_revision` is
    /// not reached.
    pub async fn view_timeout<F, R>(
        &self,
        min_revision: Revision,
        timeout: Duration,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(&ReadTx<'_>) -> R,
    {
        let started = Instant::now();
        let reached = tokio::time::timeout(timeout, self.wait_for_revision(min_revision))
            .await
            .is_ok();
        self.observe_wait(started);
        if !reached {
            return Err(StoreError::ViewTimeout {
                requested: min_revision,
                current: self.revision(),
            });
        }

        let state = self.state.read().await;
        Ok(self.read(&*state, f))
    }

    /// Blocking variant of [`Store::view`] for callers on plain threads.
    ///
    /// Panics when called from within an async runtime.
    pub fn blocking_view<F, R>(&self, min_revision: Revision, f: F) -> R
    where
        F: FnOnce(&ReadTx<'_>) -> R,
    {
        let started = Instant::now();
        futures::executor::block_on(self.wait_for_revision(min_revision));
        self.observe_wait(started);

        let state = self.state.blocking_read();
        self.read(&*state, f)
    }

    /// Resolve once the committed revision is at least `min_revision`
    pub async fn wait_for_revision(&self, min_revision: Revision) {
        if min_revision == LATEST {
            return;
        }
        let mut rx = self.revision_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once reached.
        let _ = rx.wait_for(|revision| *revision >= min_revision).await;
    }

    fn read<F, R>(&self, state: &State, f: F) -> R
    where
        F: FnOnce(&ReadTx<'_>) -> R,
    {
        let out = f(&ReadTx::new(state));
        if let Some(metrics) = &self.metrics {
            metrics.views_total.inc();
        }
        out
    }

    fn commit(&self, state: &mut State, started: Instant) {
        state.revision += 1;
        let revision = state.revision;
        // Published under the write lock so waiters see revisions in order.
        self.revision_tx.send_replace(revision);

        debug!(
            revision,
            services = state.service_count,
            endpoints = state.endpoint_count,
            "Committed store update"
        );

        if let Some(metrics) = &self.metrics {
            metrics.revision.set(revision as i64);
            metrics.updates_total.inc();
            metrics.update_duration_seconds.observe(started.elapsed().as_secs_f64());
            metrics.services.set(state.service_count as i64);
            metrics.endpoints.set(state.endpoint_count as i64);
        }
    }

    fn observe_wait(&self, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.view_wait_seconds.observe(started.elapsed().as_secs_f64());
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
