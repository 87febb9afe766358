//! Common test utilities

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trackrelay::fetcher::{FetchError, StatusSource};
use trackrelay::site::{Site, SiteConfig, SiteRegistry};
use trackrelay::TrackerStatus;

pub const CONFERENCE: &str = "https://conf.example.org/2024/";

/// Status source that replays scripted answers and counts calls
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<TrackerStatus, String>>>,
    calls: AtomicUsize,
    delay: Duration,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every fetch takes `delay` before answering
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn push_ok(&self, status: &str, sequencer: f64) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TrackerStatus::new(status, sequencer)));
    }

    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self, _site_url: &str) -> Result<TrackerStatus, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(FetchError::Remote(message)),
            None => Err(FetchError::Remote("no scripted response".to_string())),
        }
    }
}

/// Create a standalone site backed by `source`
#[allow(dead_code)]
pub fn site_with(source: &Arc<ScriptedSource>) -> Arc<Site> {
    Site::new(CONFERENCE, SiteConfig::default(), source.clone())
}

/// Create a registry backed by `source`
#[allow(dead_code)]
pub fn registry_with(source: &Arc<ScriptedSource>) -> Arc<SiteRegistry> {
    Arc::new(SiteRegistry::new(source.clone(), SiteConfig::default()))
}
