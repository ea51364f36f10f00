//! Source health tracking and API-first failover.
//!
//! The API is cheaper and cleaner than scraping, so it is always preferred
//! while healthy. Consecutive failures degrade a source and eventually mark
//! it failed; a single success restores it fully. When both sources are
//! failed the API is still tried first on the next cycle, since it is the
//! one most likely to have quietly recovered.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::FallbackConfig;
use crate::error::Result;
use crate::models::{SourceHealth, SourceKind, SourceStatus};

#[derive(Debug, Clone)]
struct SourceState {
    status: SourceStatus,
    consecutive_failures: u32,
    last_success: Option<DateTime<Local>>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            status: SourceStatus::Unknown,
            consecutive_failures: 0,
            last_success: None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    api: SourceState,
    scraper: SourceState,
}

impl Inner {
    fn state_mut(&mut self, kind: SourceKind) -> &mut SourceState {
        match kind {
            SourceKind::Api => &mut self.api,
            SourceKind::Scraper => &mut self.scraper,
        }
    }

    fn state(&self, kind: SourceKind) -> &SourceState {
        match kind {
            SourceKind::Api => &self.api,
            SourceKind::Scraper => &self.scraper,
        }
    }
}

/// Thread-safe per-source health state machine.
#[derive(Debug)]
pub struct FallbackManager {
    config: FallbackConfig,
    inner: Mutex<Inner>,
}

impl Default for FallbackManager {
    fn default() -> Self {
        Self::new(FallbackConfig::default())
    }
}

impl FallbackManager {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn threshold(&self, kind: SourceKind) -> u32 {
        match kind {
            SourceKind::Api => self.config.api_failure_threshold,
            SourceKind::Scraper => self.config.scraper_failure_threshold,
        }
    }

    /// API-first selection. Unknown counts as usable; when both sources
    /// are failed the API is retried optimistically.
    pub fn preferred_source(&self) -> SourceKind {
        let inner = self.inner.lock().expect("fallback state lock not poisoned");

        if matches!(
            inner.api.status,
            SourceStatus::Healthy | SourceStatus::Unknown
        ) {
            return SourceKind::Api;
        }
        if matches!(
            inner.scraper.status,
            SourceStatus::Healthy | SourceStatus::Unknown
        ) {
            return SourceKind::Scraper;
        }
        SourceKind::Api
    }

    pub fn record_success(&self, kind: SourceKind, response_time: Duration) {
        let mut inner = self.inner.lock().expect("fallback state lock not poisoned");
        let state = inner.state_mut(kind);
        state.status = SourceStatus::Healthy;
        state.consecutive_failures = 0;
        state.last_success = Some(Local::now());

        info!(
            "{} source succeeded, response time: {:.2}s",
            kind.as_str(),
            response_time.as_secs_f64()
        );
    }

    pub fn record_failure(&self, kind: SourceKind, reason: &str) {
        let threshold = self.threshold(kind);
        let mut inner = self.inner.lock().expect("fallback state lock not poisoned");
        let state = inner.state_mut(kind);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.status = if state.consecutive_failures >= threshold {
            SourceStatus::Failed
        } else {
            SourceStatus::Degraded
        };

        warn!(
            "{} source failed ({} consecutive): {}",
            kind.as_str(),
            state.consecutive_failures,
            reason
        );
    }

    /// Only an API marked failed triggers a fallback; the scraper has
    /// nowhere further to fall.
    pub fn should_fallback(&self, current: SourceKind) -> bool {
        match current {
            SourceKind::Api => {
                let inner = self.inner.lock().expect("fallback state lock not poisoned");
                inner.api.status == SourceStatus::Failed
            }
            SourceKind::Scraper => false,
        }
    }

    pub fn fallback_source(&self, current: SourceKind) -> Option<SourceKind> {
        match current {
            SourceKind::Api => {
                let inner = self.inner.lock().expect("fallback state lock not poisoned");
                if inner.scraper.status != SourceStatus::Failed {
                    Some(SourceKind::Scraper)
                } else {
                    None
                }
            }
            SourceKind::Scraper => None,
        }
    }

    /// Manual operator reset back to the unknown state.
    pub fn reset_source_status(&self, kind: SourceKind) {
        let mut inner = self.inner.lock().expect("fallback state lock not poisoned");
        *inner.state_mut(kind) = SourceState::default();
        info!("{} source status reset", kind.as_str());
    }

    pub fn is_source_healthy(&self, kind: SourceKind) -> bool {
        let inner = self.inner.lock().expect("fallback state lock not poisoned");
        matches!(
            inner.state(kind).status,
            SourceStatus::Healthy | SourceStatus::Unknown
        )
    }

    pub fn health(&self, kind: SourceKind) -> SourceHealth {
        let inner = self.inner.lock().expect("fallback state lock not poisoned");
        let state = inner.state(kind);
        SourceHealth {
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            last_success: state.last_success,
        }
    }

    /// Operator-facing snapshot of both sources and the effective tunables.
    pub fn status_summary(&self) -> StatusSummary {
        StatusSummary {
            preferred_source: self.preferred_source(),
            api: self.health(SourceKind::Api),
            scraper: self.health(SourceKind::Scraper),
            config: self.config.clone(),
        }
    }
}

/// Serializable health snapshot for the status surface.
#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub preferred_source: SourceKind,
    pub api: SourceHealth,
    pub scraper: SourceHealth,
    pub config: FallbackConfig,
}

/// Outcome of one acquisition attempt through the coordinator.
#[derive(Debug)]
pub struct FetchOutcome {
    pub data: Option<String>,
    /// "api", "scraper", or "none".
    pub source: &'static str,
    pub used_fallback: bool,
}

/// A deferred fetch from one source, run at most once per cycle.
pub type SourceFetcher<'a> = BoxFuture<'a, Result<String>>;

/// Runs one acquisition cycle against the preferred source, falling back
/// to the scraper when the API crosses its failure threshold.
pub struct SourceFetchCoordinator {
    manager: std::sync::Arc<FallbackManager>,
}

impl SourceFetchCoordinator {
    pub fn new(manager: std::sync::Arc<FallbackManager>) -> Self {
        Self { manager }
    }

    pub async fn fetch_with_fallback<'a>(
        &self,
        api_fetcher: Option<SourceFetcher<'a>>,
        scraper_fetcher: Option<SourceFetcher<'a>>,
    ) -> FetchOutcome {
        let preferred = self.manager.preferred_source();
        let mut used_fallback = false;

        match preferred {
            SourceKind::Api => {
                if let Some(fetcher) = api_fetcher {
                    info!("trying API source");
                    let started = Instant::now();
                    match fetcher.await {
                        Ok(data) => {
                            self.manager
                                .record_success(SourceKind::Api, started.elapsed());
                            return FetchOutcome {
                                data: Some(data),
                                source: "api",
                                used_fallback: false,
                            };
                        }
                        Err(e) => {
                            self.manager.record_failure(SourceKind::Api, &e.to_string());

                            if self.manager.should_fallback(SourceKind::Api) {
                                if self.manager.fallback_source(SourceKind::Api)
                                    == Some(SourceKind::Scraper)
                                {
                                    if let Some(scraper) = scraper_fetcher {
                                        used_fallback = true;
                                        info!("falling back to scraper source");
                                        let started = Instant::now();
                                        match scraper.await {
                                            Ok(data) => {
                                                self.manager.record_success(
                                                    SourceKind::Scraper,
                                                    started.elapsed(),
                                                );
                                                return FetchOutcome {
                                                    data: Some(data),
                                                    source: "scraper",
                                                    used_fallback: true,
                                                };
                                            }
                                            Err(scraper_err) => {
                                                self.manager.record_failure(
                                                    SourceKind::Scraper,
                                                    &scraper_err.to_string(),
                                                );
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
            SourceKind::Scraper => {
                if let Some(fetcher) = scraper_fetcher {
                    info!("using scraper source");
                    let started = Instant::now();
                    match fetcher.await {
                        Ok(data) => {
                            self.manager
                                .record_success(SourceKind::Scraper, started.elapsed());
                            return FetchOutcome {
                                data: Some(data),
                                source: "scraper",
                                used_fallback: false,
                            };
                        }
                        Err(e) => {
                            self.manager
                                .record_failure(SourceKind::Scraper, &e.to_string());
                        }
                    }
                }
            }
        }

        warn!("no data source available this cycle");
        FetchOutcome {
            data: None,
            source: "none",
            used_fallback,
        }
    }
}
