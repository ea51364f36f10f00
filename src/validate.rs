//! Payload validation and cross-source comparison.
//!
//! Four independent checks (structure, content, timeliness, consistency)
//! each start at 100 and only lose points; the payload score is the lowest
//! of the four. A payload is valid when it has no hard issues and scores at
//! least [`VALID_SCORE_FLOOR`].

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::config::ValidationConfig;

/// Minimum score a payload needs to count as valid.
pub const VALID_SCORE_FLOOR: f64 = 60.0;

/// Fields every item must carry.
const REQUIRED_FIELDS: &[&str] = &["price", "symbol", "timestamp"];

/// Outcome of validating one payload.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub score: f64,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: ValidationMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationMetadata {
    pub source: String,
    pub item_count: usize,
    pub issue_count: usize,
    pub warning_count: usize,
}

/// Outcome of comparing the API and scraper payloads for one cycle.
#[derive(Debug, Serialize)]
pub struct SourceComparison {
    pub api_validation: ValidationResult,
    pub scraper_validation: ValidationResult,
    /// 100 when shared symbols agree, dropping 10 points per average
    /// dollar of disagreement.
    pub consistency_score: f64,
    pub differences: Vec<String>,
}

pub struct DataValidator {
    rules: ValidationConfig,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl DataValidator {
    pub fn new(rules: ValidationConfig) -> Self {
        Self { rules }
    }

    /// Validate one payload (raw JSON text).
    pub fn validate(&self, data: &str, source: &str) -> ValidationResult {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut score = 100.0f64;

        let parsed: serde_json::Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                issues.push(format!("JSON parse failed: {}", e));
                return finish(source, 0.0, issues, warnings, 0);
            }
        };

        score = score.min(self.check_structure(&parsed, &mut issues, &mut warnings));

        let item_count = match parsed.get("items").and_then(|i| i.as_array()) {
            Some(items) => {
                score = score.min(self.check_content(items, &mut issues, &mut warnings));
                items.len()
            }
            None => {
                issues.push("missing items field".to_string());
                score -= 30.0;
                0
            }
        };

        score = score.min(self.check_timeliness(&parsed, &mut warnings));
        score = score.min(self.check_consistency(&parsed, &mut warnings));

        let score = score.clamp(0.0, 100.0);
        let result = finish(source, score, issues, warnings, item_count);
        info!(
            "validation complete: source={} score={:.1} valid={}",
            source, result.score, result.is_valid
        );
        result
    }

    fn check_structure(
        &self,
        data: &serde_json::Value,
        issues: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> f64 {
        let mut score = 100.0;

        match data.get("status").and_then(|s| s.as_str()) {
            None => {
                issues.push("missing status field".to_string());
                score -= 20.0;
            }
            Some("success") => {}
            Some(other) => {
                warnings.push(format!("status is not success: {}", other));
                score -= 10.0;
            }
        }

        if data.get("timestamp").is_none() {
            warnings.push("missing timestamp field".to_string());
            score -= 5.0;
        }
        if data.get("source").is_none() {
            warnings.push("missing source field".to_string());
            score -= 5.0;
        }

        score
    }

    fn check_content(
        &self,
        items: &[serde_json::Value],
        issues: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> f64 {
        let mut score = 100.0;

        let item_count = items.len();
        if item_count < self.rules.min_data_points {
            issues.push(format!("too few data points: {}", item_count));
            score -= 30.0;
        } else if item_count > self.rules.max_data_points {
            warnings.push(format!("too many data points: {}", item_count));
            score -= 10.0;
        }

        let mut valid_items = 0usize;
        for (index, item) in items.iter().enumerate() {
            if self.check_item(item, index, issues, warnings) >= VALID_SCORE_FLOOR {
                valid_items += 1;
            }
        }

        if item_count > 0 {
            let valid_ratio = valid_items as f64 / item_count as f64;
            if valid_ratio < 0.5 {
                issues.push(format!("valid item ratio too low: {:.2}", valid_ratio));
                score -= 40.0;
            } else if valid_ratio < 0.8 {
                warnings.push(format!("valid item ratio low: {:.2}", valid_ratio));
                score -= 15.0;
            }
        }

        score
    }

    fn check_item(
        &self,
        item: &serde_json::Value,
        index: usize,
        issues: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> f64 {
        let mut score = 100.0;

        for field in REQUIRED_FIELDS {
            if item.get(field).is_none() {
                issues.push(format!("item {} missing {} field", index, field));
                score -= 30.0;
            }
        }

        if let Some(price) = item.get("price") {
            match as_price(price) {
                Some(price) => {
                    let (min, max) = self.rules.price_range;
                    if !(min..=max).contains(&price) {
                        warnings.push(format!("item {} price outside band: {}", index, price));
                        score -= 20.0;
                    }
                }
                None => {
                    issues.push(format!("item {} has unparseable price: {}", index, price));
                    score -= 25.0;
                }
            }
        }

        if let Some(symbol) = item.get("symbol").and_then(|s| s.as_str()) {
            if symbol.trim().is_empty() {
                warnings.push(format!("item {} has empty symbol", index));
                score -= 10.0;
            }
        }

        score
    }

    fn check_timeliness(&self, data: &serde_json::Value, warnings: &mut Vec<String>) -> f64 {
        let mut score = 100.0;

        let parsed = data
            .get("timestamp")
            .and_then(|t| t.as_str())
            .and_then(parse_timestamp);

        match parsed {
            Some(data_time) => {
                let age_minutes =
                    (Local::now() - data_time).num_seconds() as f64 / 60.0;
                let max_age = self.rules.max_age_minutes as f64;
                if age_minutes > max_age {
                    warnings.push(format!("data is stale: {:.1} minutes old", age_minutes));
                    score -= (age_minutes - max_age).min(30.0);
                }
            }
            None => {
                warnings.push("timestamp could not be verified".to_string());
                score -= 10.0;
            }
        }

        score
    }

    fn check_consistency(&self, data: &serde_json::Value, warnings: &mut Vec<String>) -> f64 {
        let score = 100.0;

        let Some(items) = data.get("items").and_then(|i| i.as_array()) else {
            return score;
        };
        let prices: Vec<f64> = items
            .iter()
            .filter_map(|item| item.get("price").and_then(as_price))
            .collect();
        if prices.len() < 2 {
            return score;
        }

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max - min > self.rules.max_price_change {
            warnings.push(format!("intra-payload price spread too wide: {:.2}", max - min));
            return score - 15.0;
        }

        score
    }

    /// Validate both payloads and measure how well their shared symbols
    /// agree.
    pub fn compare(&self, api_data: &str, scraper_data: &str) -> SourceComparison {
        let api_validation = self.validate(api_data, "api");
        let scraper_validation = self.validate(scraper_data, "scraper");

        let mut differences = Vec::new();
        let mut consistency_score = 0.0;

        let api_parsed: Option<serde_json::Value> = serde_json::from_str(api_data).ok();
        let scraper_parsed: Option<serde_json::Value> = serde_json::from_str(scraper_data).ok();

        if let (Some(api), Some(scraper)) = (api_parsed, scraper_parsed) {
            let api_count = api
                .get("items")
                .and_then(|i| i.as_array())
                .map_or(0, |i| i.len());
            let scraper_count = scraper
                .get("items")
                .and_then(|i| i.as_array())
                .map_or(0, |i| i.len());
            if api_count.abs_diff(scraper_count) > 5 {
                differences.push(format!(
                    "item count gap: api={}, scraper={}",
                    api_count, scraper_count
                ));
            }

            let api_prices = extract_prices(&api);
            let scraper_prices = extract_prices(&scraper);

            let mut diffs = Vec::new();
            for (symbol, api_price) in &api_prices {
                let Some(scraper_price) = scraper_prices.get(symbol) else {
                    continue;
                };
                let diff = (api_price - scraper_price).abs();
                diffs.push(diff);

                if diff > self.rules.discrepancy_threshold {
                    differences.push(format!(
                        "{} price discrepancy: api={:.2}, scraper={:.2}",
                        symbol, api_price, scraper_price
                    ));
                }
            }

            if !diffs.is_empty() {
                let avg_diff = diffs.iter().sum::<f64>() / diffs.len() as f64;
                consistency_score = (100.0 - avg_diff * 10.0).max(0.0);
            }
        } else {
            differences.push("comparison skipped: unparseable payload".to_string());
        }

        SourceComparison {
            api_validation,
            scraper_validation,
            consistency_score,
            differences,
        }
    }
}

fn finish(
    source: &str,
    score: f64,
    issues: Vec<String>,
    warnings: Vec<String>,
    item_count: usize,
) -> ValidationResult {
    let is_valid = issues.is_empty() && score >= VALID_SCORE_FLOOR;
    ValidationResult {
        is_valid,
        score,
        metadata: ValidationMetadata {
            source: source.to_string(),
            item_count,
            issue_count: issues.len(),
            warning_count: warnings.len(),
        },
        issues,
        warnings,
    }
}

/// Prices arrive as numbers from the API and occasionally as strings from
/// scraped markup.
fn as_price(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local));
    }
    // Feed timestamps omit the offset; interpret them as local time.
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|naive| naive.and_local_timezone(Local).single())
}

fn extract_prices(data: &serde_json::Value) -> std::collections::BTreeMap<String, f64> {
    let mut prices = std::collections::BTreeMap::new();
    if let Some(items) = data.get("items").and_then(|i| i.as_array()) {
        for item in items {
            let symbol = item.get("symbol").and_then(|s| s.as_str());
            let price = item.get("price").and_then(as_price);
            if let (Some(symbol), Some(price)) = (symbol, price) {
                prices.insert(symbol.to_string(), price);
            }
        }
    }
    prices
}
