//! Per-site status cache and long-poll engine
//!
//! Each [`Site`] caches the last accepted [`TrackerStatus`] of one remote
//! conference. Reads of a fresh cache resolve immediately; reads of an
//! expired cache queue a one-shot waiter and start a single-flight refresh.
//! Long polls wait until the cached status definitely differs from the one
//! the client already knows, and while anyone is long-polling a background
//! task refreshes the cache shortly before it expires.
//!
//! All cache state sits behind one mutex per site. The lock is never held
//! across an `.await`: the remote fetch runs unlocked and re-acquires the
//! lock to apply its result.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::SiteConfig;
use crate::error::Error;
use crate::fetcher::StatusSource;
use crate::models::{Sequencer, TrackerStatus};

/// Pending loop signals; extra signals are redundant and dropped
const LOOP_SIGNAL_CAPACITY: usize = 2;

// ============================================================================
// Cache State
// ============================================================================

/// Mutable state guarded by the site lock
struct SiteState {
    /// Last accepted status
    status: TrackerStatus,

    /// When `status` was last written; `None` until the first update
    set_at: Option<Instant>,

    /// Single-flight guard for remote fetches
    refreshing: bool,

    /// Pending readers, released in insertion order by the next update
    waiters: Vec<oneshot::Sender<TrackerStatus>>,

    /// Number of active long polls
    interest: usize,

    /// Last registry lookup
    accessed_at: DateTime<Utc>,
}

impl SiteState {
    fn new() -> Self {
        Self {
            status: TrackerStatus::default(),
            set_at: None,
            refreshing: false,
            waiters: Vec::with_capacity(8),
            interest: 0,
            accessed_at: Utc::now(),
        }
    }

    /// When the cached status stops being fresh
    fn expiry(&self, config: &SiteConfig) -> Option<Instant> {
        let ttl = if self.status.is_unknown() {
            config.error_ttl()
        } else {
            config.fresh_ttl()
        };
        self.set_at.map(|at| at + ttl)
    }

    fn is_expired(&self, config: &SiteConfig, now: Instant) -> bool {
        self.expiry(config).map_or(true, |expiry| now > expiry)
    }

    /// True when the cache is fresh and provably newer than `candidate`
    ///
    /// A candidate with a sequencer beyond the cached one may describe a
    /// change this cache has not seen yet, so it never counts as differing.
    fn definitely_differs(&self, candidate: &TrackerStatus, config: &SiteConfig, now: Instant) -> bool {
        !self.is_expired(config, now)
            && candidate.status != self.status.status
            && candidate.sequencer <= self.status.sequencer
    }

    /// Whether `new` may replace the cached status
    fn accepts(&self, new: &TrackerStatus) -> bool {
        new.is_error() || self.status.is_unknown() || self.status.sequencer < new.sequencer
    }

    fn release_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(self.status.clone());
        }
    }
}

// ============================================================================
// Site
// ============================================================================

/// Cached status for one conference site
pub struct Site {
    /// Canonical site URL, always ending in `/`
    url: String,

    /// When the registry created this entry
    created_at: DateTime<Utc>,

    config: SiteConfig,

    source: Arc<dyn StatusSource>,

    state: Mutex<SiteState>,

    /// Wakes the background loop to re-evaluate its schedule
    looper: mpsc::Sender<()>,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("url", &self.url)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Site {
    /// Create a site and start its background refresh loop
    ///
    /// Must be called from within a tokio runtime. The loop ends when the
    /// last reference to the site is dropped.
    pub fn new(url: impl Into<String>, config: SiteConfig, source: Arc<dyn StatusSource>) -> Arc<Self> {
        let (looper, signals) = mpsc::channel(LOOP_SIGNAL_CAPACITY);
        let site = Arc::new(Self {
            url: url.into(),
            created_at: Utc::now(),
            config,
            source,
            state: Mutex::new(SiteState::new()),
            looper,
        });

        tokio::spawn(Self::status_loop(Arc::downgrade(&site), signals));
        site
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn accessed_at(&self) -> DateTime<Utc> {
        self.lock().accessed_at
    }

    /// Record a registry lookup
    pub fn touch(&self) {
        self.lock().accessed_at = Utc::now();
    }

    /// Cached status without any freshness check
    pub fn current(&self) -> TrackerStatus {
        self.lock().status.clone()
    }

    /// Number of active long polls
    pub fn interest(&self) -> usize {
        self.lock().interest
    }

    pub fn is_expired(&self) -> bool {
        self.lock().is_expired(&self.config, Instant::now())
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal_loop(&self) {
        // A full channel already guarantees a pending re-evaluation
        let _ = self.looper.try_send(());
    }

    /// Read the status, refreshing first if the cache has expired
    ///
    /// A fresh cache resolves immediately. Otherwise the caller waits for the
    /// next update, which is either the refresh started here or one already
    /// in flight.
    pub async fn status(self: &Arc<Self>) -> TrackerStatus {
        let receiver = {
            let mut state = self.lock();
            if !state.is_expired(&self.config, Instant::now()) {
                return state.status.clone();
            }

            let (sender, receiver) = oneshot::channel();
            state.waiters.push(sender);
            self.start_refresh(&mut state);
            receiver
        };

        match receiver.await {
            Ok(status) => status,
            Err(_) => self.current(),
        }
    }

    /// Apply a new status and release every waiter
    ///
    /// The cached value is replaced only by an error, when nothing is known
    /// yet, or by a strictly newer sequencer. Stale updates still refresh the
    /// freshness timestamp and wake waiters with the unchanged value.
    pub fn update(&self, status: TrackerStatus) {
        let mut state = self.lock();
        self.apply(&mut state, status);
    }

    fn apply(&self, state: &mut SiteState, status: TrackerStatus) {
        if state.accepts(&status) {
            tracing::debug!(site = %self.url, status = %status, "Status updated");
            state.status = status;
        } else {
            tracing::debug!(
                site = %self.url,
                cached = %state.status,
                ignored = %status,
                "Stale status update ignored"
            );
        }

        state.set_at = Some(Instant::now());
        state.release_waiters();
        self.signal_loop();
    }

    /// Fetch the remote status and apply it, unless a fetch is already running
    ///
    /// The fetch runs in its own task, so cancelling the caller never leaves
    /// the single-flight guard held.
    pub async fn refresh(self: &Arc<Self>) {
        let fetch = {
            let mut state = self.lock();
            self.start_refresh(&mut state)
        };

        if let Some(fetch) = fetch {
            if let Err(e) = fetch.await {
                tracing::warn!(site = %self.url, error = %e, "Refresh task failed");
            }
        }
    }

    /// Claim the single-flight guard and fetch in a new task
    fn start_refresh(self: &Arc<Self>, state: &mut SiteState) -> Option<JoinHandle<()>> {
        if state.refreshing {
            return None;
        }
        state.refreshing = true;

        let site = Arc::clone(self);
        Some(tokio::spawn(async move { site.fetch_and_apply().await }))
    }

    /// Caller must hold the single-flight guard
    async fn fetch_and_apply(&self) {
        let fetched = match self.source.fetch_status(&self.url).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(site = %self.url, error = %err, "Tracker status fetch failed");
                TrackerStatus::failed(Error::from(err))
            }
        };

        let mut state = self.lock();
        self.apply(&mut state, fetched);
        state.refreshing = false;
    }

    /// Wait until the cached status definitely differs from `candidate`
    ///
    /// Resolves immediately when the fresh cache already differs. Otherwise
    /// the call counts as interest in the site (enabling background refresh)
    /// and waits for updates, re-checking after each one. A `None` or zero
    /// `timeout` waits indefinitely. On timeout the best known status is
    /// returned; timing out is not an error.
    pub async fn wait_for_change(
        self: &Arc<Self>,
        candidate: TrackerStatus,
        timeout: Option<Duration>,
    ) -> TrackerStatus {
        let mut candidate = candidate;
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);

        {
            let mut state = self.lock();
            if state.definitely_differs(&candidate, &self.config, Instant::now()) {
                return state.status.clone();
            }

            state.interest += 1;
            if state.interest == 1 {
                self.signal_loop();
            }
        }
        let _interest = InterestGuard { site: self };

        loop {
            let receiver = {
                let mut state = self.lock();
                if state.definitely_differs(&candidate, &self.config, Instant::now()) {
                    break state.status.clone();
                }

                let (sender, receiver) = oneshot::channel();
                state.waiters.retain(|w| !w.is_closed());
                state.waiters.push(sender);
                receiver
            };

            let woken = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, receiver).await.is_ok(),
                None => {
                    let _ = receiver.await;
                    true
                }
            };

            if !woken {
                break self.current();
            }

            // The update may have been stale; only the cached sequencer counts now
            candidate.sequencer = Sequencer::ZERO;
        }
    }

    /// Background refresh loop, one per site
    ///
    /// Sleeps until shortly before expiry while anyone is long-polling, and
    /// otherwise parks until signalled by an update or a new long poll.
    async fn status_loop(site: Weak<Site>, mut signals: mpsc::Receiver<()>) {
        loop {
            let wake_at = match site.upgrade() {
                Some(site) => site.schedule(),
                None => return,
            };

            let alive = match wake_at {
                Some(at) => tokio::select! {
                    _ = tokio::time::sleep_until(at) => true,
                    signal = signals.recv() => signal.is_some(),
                },
                None => signals.recv().await.is_some(),
            };

            if !alive {
                return;
            }
        }
    }

    /// Next background wake-up; starts a refresh when one is already due
    fn schedule(self: &Arc<Self>) -> Option<Instant> {
        let mut state = self.lock();
        if state.interest == 0 {
            return None;
        }

        let due = state
            .expiry(&self.config)
            .and_then(|expiry| expiry.checked_sub(self.config.refresh_lead()));

        match due {
            Some(at) if Instant::now() < at => Some(at),
            _ => {
                tracing::debug!(site = %self.url, "Proactive refresh");
                self.start_refresh(&mut state);
                None
            }
        }
    }
}

/// Holds one unit of long-poll interest; released on drop, including when
/// the waiting future is cancelled
struct InterestGuard<'a> {
    site: &'a Site,
}

impl Drop for InterestGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.site.lock();
        state.interest = state.interest.saturating_sub(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
