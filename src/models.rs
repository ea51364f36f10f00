//! Core data types shared across the acquisition pipeline.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Currencies a quote may be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Cny,
    Usd,
    Eur,
    Jpy,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Cny => "CNY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Jpy => "JPY",
        }
    }
}

/// A single normalized price quote from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub source: String,
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: String,
    pub timestamp: String,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_price: Option<f64>,
}

impl PriceRecord {
    /// Minimal shape every downstream consumer relies on.
    pub fn is_well_formed(&self) -> bool {
        !self.source.is_empty()
            && !self.symbol.is_empty()
            && !self.timestamp.is_empty()
            && self.price > 0.0
    }
}

/// The two kinds of upstream data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Api,
    Scraper,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Api => "api",
            SourceKind::Scraper => "scraper",
        }
    }
}

/// Health classification of a source, driven by consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Healthy,
    Degraded,
    Failed,
    Unknown,
}

/// Read-only snapshot of one source's health.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Local>>,
}

/// One entry in the downstream feed format.
///
/// Scraped items carry empty `url`/`mobileUrl` so consumers can treat API
/// and scraper payloads uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    #[serde(rename = "mobileUrl")]
    pub mobile_url: String,
    pub source: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: String,
    pub symbol: String,
    pub currency: Currency,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(rename = "buyPrice", skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<f64>,
    #[serde(rename = "sellPrice", skip_serializing_if = "Option::is_none")]
    pub sell_price: Option<f64>,
}

impl FeedItem {
    pub fn from_record(record: &PriceRecord) -> Self {
        Self {
            title: format!(
                "{} {} {}",
                record.symbol, record.price, record.change_percent
            ),
            url: String::new(),
            mobile_url: String::new(),
            source: record.source.clone(),
            price: record.price,
            change: record.change,
            change_percent: record.change_percent.clone(),
            symbol: record.symbol.clone(),
            currency: record.currency,
            timestamp: record.timestamp.clone(),
            high: record.high,
            low: record.low,
            open: record.open,
            volume: record.volume.clone(),
            buy_price: record.buy_price,
            sell_price: record.sell_price,
        }
    }
}

/// API-shaped envelope emitted by the scraper path so both sources
/// validate through the same pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapePayload {
    pub status: String,
    pub source: String,
    pub timestamp: String,
    pub items: Vec<FeedItem>,
}

impl ScrapePayload {
    pub fn from_records(records: &[PriceRecord]) -> Self {
        let timestamp = records
            .first()
            .map(|r| r.timestamp.clone())
            .unwrap_or_else(|| Local::now().format("%Y-%m-%dT%H:%M:%S").to_string());

        Self {
            status: "success".to_string(),
            source: "web_scraper".to_string(),
            timestamp,
            items: records.iter().map(FeedItem::from_record).collect(),
        }
    }
}
