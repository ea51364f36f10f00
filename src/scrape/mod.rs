//! Scrape cycle orchestration.
//!
//! Fans out over the registered parsers with bounded concurrency, renders
//! each parser's page under a fresh client identity, retries failed
//! attempts with jittered delays, and reshapes the surviving records into
//! the downstream feed format.

pub mod anti_detection;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::browser::PageRenderer;
use crate::config::{AntiDetectionConfig, ExecutionConfig};
use crate::error::{Error, Result};
use crate::models::{FeedItem, PriceRecord, ScrapePayload};
use crate::parsers::{default_parsers, PriceParser};
use anti_detection::{jitter, AntiDetection};

/// Drives one or more scrape cycles over a fixed parser set.
pub struct ScrapeOrchestrator {
    renderer: Arc<dyn PageRenderer>,
    parsers: Vec<Arc<dyn PriceParser>>,
    anti_detection: Arc<AntiDetection>,
    execution: ExecutionConfig,
}

impl ScrapeOrchestrator {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        execution: ExecutionConfig,
        anti_detection: AntiDetectionConfig,
    ) -> Self {
        Self {
            renderer,
            parsers: default_parsers(),
            anti_detection: Arc::new(AntiDetection::new(anti_detection)),
            execution,
        }
    }

    /// Replace the parser set. Used by tests and partial cycles.
    pub fn with_parsers(mut self, parsers: Vec<Arc<dyn PriceParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    /// Run one full cycle: every parser, bounded fan-out, per-attempt
    /// timeout and retries. Parser failures are contained; the cycle
    /// returns whatever the healthy parsers produced.
    pub async fn scrape_all(&self) -> Vec<PriceRecord> {
        let semaphore = Arc::new(Semaphore::new(self.execution.max_concurrent_parsers));
        let mut handles = Vec::with_capacity(self.parsers.len());

        for (index, parser) in self.parsers.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let renderer = Arc::clone(&self.renderer);
            let anti_detection = Arc::clone(&self.anti_detection);
            let execution = self.execution.clone();

            handles.push(tokio::spawn(async move {
                // Stagger parser start-up so page loads do not arrive in a burst.
                if index > 0 {
                    anti_detection.pause_between_parsers().await;
                }

                let Ok(_permit) = semaphore.acquire_owned().await else {
                    warn!("{}: admission gate closed, skipping", parser.name());
                    return Vec::new();
                };

                scrape_with_retries(&renderer, &anti_detection, &execution, &parser).await
            }));
        }

        let mut records = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(parsed) => records.extend(parsed),
                Err(e) => warn!("parser task failed: {}", e),
            }
        }

        // Cross-source sanity gate; parsers should already guarantee this.
        records.retain(|r| r.is_well_formed());

        info!("scrape cycle complete: {} records", records.len());
        records
    }

    /// One cycle shaped as the API-compatible JSON payload string.
    pub async fn scrape_feed(&self) -> Result<String> {
        let records = self.scrape_all().await;
        if records.is_empty() {
            return Err(Error::Validation(
                "no price records from any source".to_string(),
            ));
        }

        let payload = ScrapePayload::from_records(&records);
        serde_json::to_string_pretty(&payload)
            .map_err(|e| Error::Validation(format!("payload serialization failed: {}", e)))
    }

    /// Like [`scrape_feed`](Self::scrape_feed) but with an outer retry
    /// budget for whole-cycle failures. Each wait escalates with the
    /// attempt number.
    pub async fn scrape_feed_with_retry(
        &self,
        max_retries: u32,
        wait_range_secs: (u64, u64),
    ) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.scrape_feed().await {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    attempt += 1;
                    if attempt > max_retries {
                        warn!("scrape cycle failed after {} attempts: {}", attempt, e);
                        return Err(e);
                    }
                    let wait = jitter(wait_range_secs)
                        + jitter((1, 2)).mul_f64(f64::from(attempt - 1));
                    warn!(
                        "scrape cycle failed: {}. retrying in {:.2}s",
                        e,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Connectivity probe: render each parser's landing page and look for
    /// its title markers. Health surface only, no records.
    pub async fn probe_all(&self) -> Vec<(&'static str, bool)> {
        let mut results = Vec::with_capacity(self.parsers.len());

        for parser in &self.parsers {
            let identity = self.anti_detection.identity();
            let reachable = match self
                .renderer
                .render(
                    parser.base_url(),
                    "title",
                    Duration::from_secs(10),
                    &identity,
                )
                .await
            {
                Ok(html) => {
                    let title = page_title(&html);
                    let hit = parser.title_markers().iter().any(|m| title.contains(m));
                    if !hit {
                        warn!("{}: unexpected page title: {:?}", parser.name(), title);
                    }
                    hit
                }
                Err(e) => {
                    warn!("{}: probe failed: {}", parser.name(), e);
                    false
                }
            };
            results.push((parser.name(), reachable));
        }

        results
    }
}

/// One parser invocation with its per-attempt deadline and retry budget.
async fn scrape_with_retries(
    renderer: &Arc<dyn PageRenderer>,
    anti_detection: &AntiDetection,
    execution: &ExecutionConfig,
    parser: &Arc<dyn PriceParser>,
) -> Vec<PriceRecord> {
    for attempt in 0..=execution.retry_attempts {
        if attempt > 0 {
            let wait = jitter(execution.retry_delay_secs);
            debug!(
                "{}: retry {} in {:.2}s",
                parser.name(),
                attempt,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }

        match scrape_once(renderer, anti_detection, execution, parser).await {
            Ok(records) => {
                info!("{}: {} records", parser.name(), records.len());
                return records;
            }
            Err(e) => warn!("{}: attempt {} failed: {}", parser.name(), attempt + 1, e),
        }
    }

    warn!(
        "{}: giving up after {} attempts",
        parser.name(),
        execution.retry_attempts + 1
    );
    Vec::new()
}

async fn scrape_once(
    renderer: &Arc<dyn PageRenderer>,
    anti_detection: &AntiDetection,
    execution: &ExecutionConfig,
    parser: &Arc<dyn PriceParser>,
) -> Result<Vec<PriceRecord>> {
    let identity = anti_detection.identity();
    let request = parser.page();
    let deadline = Duration::from_secs(execution.parser_timeout_secs);

    // The render runs in its own task: when the attempt deadline fires
    // here, the renderer still runs to completion and releases its page.
    let renderer = Arc::clone(renderer);
    let attempt = tokio::spawn(async move {
        renderer
            .render(&request.url, request.wait_selector, deadline, &identity)
            .await
    });

    let html = match tokio::time::timeout(deadline, attempt).await {
        Ok(joined) => joined.map_err(|e| Error::Browser(format!("render task failed: {}", e)))??,
        Err(_) => {
            return Err(Error::timeout(
                parser.name().to_string(),
                execution.parser_timeout_secs,
            ))
        }
    };

    parser.parse(&html)
}

/// Extract the document title, empty when absent.
fn page_title(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    let title_sel = scraper::Selector::parse("title").unwrap();
    document
        .select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default()
}

/// Group records into feed items keyed by source, the shape downstream
/// consumers ingest.
pub fn group_by_source(records: &[PriceRecord]) -> BTreeMap<String, Vec<FeedItem>> {
    let mut grouped: BTreeMap<String, Vec<FeedItem>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.source.clone())
            .or_default()
            .push(FeedItem::from_record(record));
    }
    grouped
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::Currency;
    use crate::parsers::PageRequest;
    use crate::scrape::anti_detection::ClientIdentity;

    struct StubParser {
        name: &'static str,
        symbol: &'static str,
    }

    impl PriceParser for StubParser {
        fn name(&self) -> &'static str {
            self.name
        }

        fn base_url(&self) -> &'static str {
            "https://example.com/"
        }

        fn page(&self) -> PageRequest {
            PageRequest {
                url: format!("https://example.com/{}", self.name),
                wait_selector: "table",
            }
        }

        fn title_markers(&self) -> &'static [&'static str] {
            &["Example"]
        }

        fn parse(&self, _html: &str) -> Result<Vec<PriceRecord>> {
            Ok(vec![PriceRecord {
                source: self.name.to_string(),
                symbol: self.symbol.to_string(),
                price: 550.0,
                change: 1.0,
                change_percent: "+0.18%".to_string(),
                timestamp: "2026-08-25T10:00:00".to_string(),
                currency: Currency::Cny,
                volume: None,
                high: None,
                low: None,
                open: None,
                buy_price: None,
                sell_price: None,
            }])
        }
    }

    struct CountingRenderer {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for CountingRenderer {
        async fn render(
            &self,
            _url: &str,
            _wait: &str,
            _timeout: Duration,
            _identity: &ClientIdentity,
        ) -> Result<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("<html><title>Example</title></html>".to_string())
        }
    }

    struct FlakyRenderer {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PageRenderer for FlakyRenderer {
        async fn render(
            &self,
            _url: &str,
            _wait: &str,
            _timeout: Duration,
            _identity: &ClientIdentity,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Network("connection reset".to_string()));
            }
            Ok(String::new())
        }
    }

    struct SlowRenderer;

    #[async_trait]
    impl PageRenderer for SlowRenderer {
        async fn render(
            &self,
            _url: &str,
            _wait: &str,
            _timeout: Duration,
            _identity: &ClientIdentity,
        ) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    /// Holds a page lease for its whole deadline, like a real browser
    /// session waiting on a selector that never shows up.
    struct LeasingRenderer {
        open_pages: AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for LeasingRenderer {
        async fn render(
            &self,
            _url: &str,
            _wait: &str,
            timeout: Duration,
            _identity: &ClientIdentity,
        ) -> Result<String> {
            self.open_pages.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(timeout).await;
            self.open_pages.fetch_sub(1, Ordering::SeqCst);
            Err(Error::timeout("selector wait".to_string(), timeout.as_secs()))
        }
    }

    fn quiet_execution() -> ExecutionConfig {
        ExecutionConfig {
            max_concurrent_parsers: 2,
            parser_timeout_secs: 60,
            retry_attempts: 2,
            retry_delay_secs: (0, 0),
        }
    }

    fn quiet_anti_detection() -> AntiDetectionConfig {
        AntiDetectionConfig {
            rotate_user_agents: true,
            random_delays: false,
            delay_between_parsers_secs: (0, 0),
        }
    }

    fn stub_parsers(n: usize) -> Vec<Arc<dyn PriceParser>> {
        const NAMES: &[(&str, &str)] = &[
            ("alpha", "AU9999"),
            ("beta", "GOLD_TD"),
            ("gamma", "XAUUSD"),
            ("delta", "AUTD"),
            ("epsilon", "SPOT_GOLD"),
        ];
        NAMES[..n]
            .iter()
            .map(|&(name, symbol)| Arc::new(StubParser { name, symbol }) as Arc<dyn PriceParser>)
            .collect()
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_configured_bound() {
        let renderer = Arc::new(CountingRenderer {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let orchestrator = ScrapeOrchestrator::new(
            renderer.clone(),
            quiet_execution(),
            quiet_anti_detection(),
        )
        .with_parsers(stub_parsers(5));

        let records = orchestrator.scrape_all().await;
        assert_eq!(records.len(), 5);
        assert!(renderer.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failed_attempts_are_retried_then_succeed() {
        let renderer = Arc::new(FlakyRenderer {
            failures_left: AtomicU32::new(1),
            calls: AtomicU32::new(0),
        });
        let orchestrator = ScrapeOrchestrator::new(
            renderer.clone(),
            quiet_execution(),
            quiet_anti_detection(),
        )
        .with_parsers(stub_parsers(1));

        let records = orchestrator.scrape_all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_budget_is_exhausted_then_parser_contributes_nothing() {
        let renderer = Arc::new(FlakyRenderer {
            failures_left: AtomicU32::new(u32::MAX),
            calls: AtomicU32::new(0),
        });
        let orchestrator = ScrapeOrchestrator::new(
            renderer.clone(),
            quiet_execution(),
            quiet_anti_detection(),
        )
        .with_parsers(stub_parsers(1));

        let records = orchestrator.scrape_all().await;
        assert!(records.is_empty());
        // 1 initial attempt + 2 retries
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_render_still_releases_its_page() {
        let renderer = Arc::new(LeasingRenderer {
            open_pages: AtomicUsize::new(0),
        });
        let mut execution = quiet_execution();
        execution.retry_attempts = 0;
        let orchestrator =
            ScrapeOrchestrator::new(renderer.clone(), execution, quiet_anti_detection())
                .with_parsers(stub_parsers(1));

        let records = orchestrator.scrape_all().await;
        assert!(records.is_empty());

        // Let the detached render task finish its release path.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(renderer.open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_render_is_cut_off_by_the_attempt_deadline() {
        let mut execution = quiet_execution();
        execution.retry_attempts = 0;
        let orchestrator =
            ScrapeOrchestrator::new(Arc::new(SlowRenderer), execution, quiet_anti_detection())
                .with_parsers(stub_parsers(1));

        let records = orchestrator.scrape_all().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn feed_payload_has_api_shape() {
        let renderer = Arc::new(CountingRenderer {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let orchestrator =
            ScrapeOrchestrator::new(renderer, quiet_execution(), quiet_anti_detection())
                .with_parsers(stub_parsers(2));

        let payload = orchestrator.scrape_feed().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["status"], "success");
        assert_eq!(parsed["source"], "web_scraper");
        assert_eq!(parsed["items"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["items"][0]["url"], "");
    }

    #[tokio::test]
    async fn empty_cycle_is_an_error_for_the_feed() {
        let renderer = Arc::new(FlakyRenderer {
            failures_left: AtomicU32::new(u32::MAX),
            calls: AtomicU32::new(0),
        });
        let orchestrator =
            ScrapeOrchestrator::new(renderer, quiet_execution(), quiet_anti_detection())
                .with_parsers(stub_parsers(1));

        let err = orchestrator.scrape_feed().await;
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn outer_retry_gives_up_after_budget() {
        let renderer = Arc::new(FlakyRenderer {
            failures_left: AtomicU32::new(u32::MAX),
            calls: AtomicU32::new(0),
        });
        let mut execution = quiet_execution();
        execution.retry_attempts = 0;
        let orchestrator =
            ScrapeOrchestrator::new(renderer.clone(), execution, quiet_anti_detection())
                .with_parsers(stub_parsers(1));

        let err = orchestrator.scrape_feed_with_retry(2, (1, 2)).await;
        assert!(err.is_err());
        // 3 cycles of 1 attempt each
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_checks_title_markers() {
        let renderer = Arc::new(CountingRenderer {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let orchestrator =
            ScrapeOrchestrator::new(renderer, quiet_execution(), quiet_anti_detection())
                .with_parsers(stub_parsers(1));

        let results = orchestrator.probe_all().await;
        assert_eq!(results, vec![("alpha", true)]);
    }

    #[test]
    fn grouping_splits_records_by_source() {
        let parser_a = StubParser {
            name: "alpha",
            symbol: "AU9999",
        };
        let parser_b = StubParser {
            name: "beta",
            symbol: "GOLD_TD",
        };
        let mut records = parser_a.parse("").unwrap();
        records.extend(parser_b.parse("").unwrap());

        let grouped = group_by_source(&records);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["alpha"].len(), 1);
        assert_eq!(grouped["beta"][0].symbol, "GOLD_TD");
    }
}
