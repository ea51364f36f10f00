//! Site parsers for gold price pages.
//!
//! Each parser knows one site: which page to render, what to wait for, and
//! how to turn the rendered HTML into normalized [`PriceRecord`]s. Parsers
//! are pure over HTML text so they can be exercised against fixtures.

pub mod clean;

mod cngold;
mod sge;
mod sina;

use std::sync::Arc;

pub use cngold::CngoldParser;
pub use sge::SgeParser;
pub use sina::SinaParser;

use crate::error::Result;
use crate::models::PriceRecord;

/// The page a parser wants rendered for one scrape cycle.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    /// CSS selector whose presence marks the page as loaded.
    pub wait_selector: &'static str,
}

/// A site-specific price parser.
pub trait PriceParser: Send + Sync {
    /// Short lowercase identifier, used as the record source label.
    fn name(&self) -> &'static str;

    /// Site landing page, used for connectivity probes.
    fn base_url(&self) -> &'static str;

    /// The data page to render this cycle.
    fn page(&self) -> PageRequest;

    /// Keywords expected in the landing page title when the site is up.
    fn title_markers(&self) -> &'static [&'static str];

    /// Parse rendered HTML into normalized records.
    ///
    /// A structurally valid page with no matching rows yields an empty list.
    /// Only a page the parser cannot recognize at all is an error.
    fn parse(&self, html: &str) -> Result<Vec<PriceRecord>>;
}

/// All production parsers, in scrape order.
pub fn default_parsers() -> Vec<Arc<dyn PriceParser>> {
    vec![
        Arc::new(SgeParser::new()),
        Arc::new(CngoldParser::new()),
        Arc::new(SinaParser::new()),
    ]
}

/// Where on the page a candidate record was found. Lower priority value
/// wins when the same symbol appears in several regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRegion {
    Ticker,
    PrimaryTable,
    SecondaryTable,
    Unknown,
}

impl PageRegion {
    fn priority(self) -> u8 {
        match self {
            PageRegion::Ticker => 0,
            PageRegion::PrimaryTable => 1,
            PageRegion::SecondaryTable => 2,
            PageRegion::Unknown => 3,
        }
    }
}

/// Collapse duplicate symbols, keeping the candidate from the most
/// trustworthy page region, then order by the parser's symbol ranking.
pub(crate) fn dedupe_by_region<F>(
    candidates: Vec<(PageRegion, PriceRecord)>,
    symbol_rank: F,
) -> Vec<PriceRecord>
where
    F: Fn(&str) -> u32,
{
    let mut kept: Vec<(PageRegion, PriceRecord)> = Vec::new();

    for (region, record) in candidates {
        match kept.iter_mut().find(|(_, r)| r.symbol == record.symbol) {
            Some(existing) => {
                if region.priority() < existing.0.priority() {
                    *existing = (region, record);
                }
            }
            None => kept.push((region, record)),
        }
    }

    let mut records: Vec<PriceRecord> = kept.into_iter().map(|(_, r)| r).collect();
    records.sort_by_key(|r| symbol_rank(&r.symbol));
    records
}

/// Local wall-clock timestamp in the feed's format.
pub(crate) fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Final acceptance gate applied by every parser before emitting a record.
pub(crate) fn accept(record: PriceRecord) -> Option<PriceRecord> {
    if !record.is_well_formed() {
        tracing::debug!(
            "dropping malformed record: source={} symbol={} price={}",
            record.source,
            record.symbol,
            record.price
        );
        return None;
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;

    fn record(symbol: &str, price: f64) -> PriceRecord {
        PriceRecord {
            source: "test".to_string(),
            symbol: symbol.to_string(),
            price,
            change: 0.0,
            change_percent: "0.00%".to_string(),
            timestamp: "2026-08-25T10:00:00".to_string(),
            currency: Currency::Cny,
            volume: None,
            high: None,
            low: None,
            open: None,
            buy_price: None,
            sell_price: None,
        }
    }

    #[test]
    fn region_dedup_prefers_ticker_over_tables() {
        let records = dedupe_by_region(
            vec![
                (PageRegion::SecondaryTable, record("GOLD_TD", 551.0)),
                (PageRegion::Ticker, record("GOLD_TD", 550.0)),
                (PageRegion::PrimaryTable, record("GOLD_TD", 552.0)),
            ],
            |_| 0,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price, 550.0);
    }

    #[test]
    fn region_dedup_keeps_first_within_same_region() {
        let records = dedupe_by_region(
            vec![
                (PageRegion::PrimaryTable, record("GOLD_TD", 550.0)),
                (PageRegion::PrimaryTable, record("GOLD_TD", 551.0)),
            ],
            |_| 0,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price, 550.0);
    }

    #[test]
    fn region_dedup_sorts_by_symbol_rank() {
        let records = dedupe_by_region(
            vec![
                (PageRegion::PrimaryTable, record("SPOT_GOLD", 2400.0)),
                (PageRegion::PrimaryTable, record("GOLD_TD", 550.0)),
            ],
            |symbol| if symbol == "GOLD_TD" { 1 } else { 2 },
        );
        assert_eq!(records[0].symbol, "GOLD_TD");
        assert_eq!(records[1].symbol, "SPOT_GOLD");
    }

    #[test]
    fn accept_rejects_empty_symbol_and_bad_price() {
        assert!(accept(record("GOLD_TD", 550.0)).is_some());
        assert!(accept(record("", 550.0)).is_none());
        assert!(accept(record("GOLD_TD", 0.0)).is_none());
    }

    #[test]
    fn default_parser_set_is_stable() {
        let parsers = default_parsers();
        let names: Vec<&str> = parsers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["sge", "cngold", "sina"]);
    }
}
