//! Text cleaning and symbol normalization shared by all site parsers.
//!
//! Scraped cells arrive with currency glyphs, thousands separators, arrows,
//! and placeholder tokens. Everything here is total: bad input degrades to
//! 0.0 / None rather than failing the row.

use std::sync::LazyLock;

use regex::Regex;

/// Plausible per-gram/per-ounce quote band. Values outside are treated as
/// scrape noise and zeroed.
pub const PRICE_RANGE: (f64, f64) = (100.0, 10000.0);

/// Plausible single-quote change band.
pub const CHANGE_RANGE: (f64, f64) = (-1000.0, 1000.0);

/// Placeholder tokens sites render for missing values.
const SENTINELS: &[&str] = &["--", "N/A", "", "null", "undefined"];

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)").expect("static regex"));

static SIGNED_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+-]?\d+\.?\d*)").expect("static regex"));

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+-]?\d+\.?\d*)%").expect("static regex"));

static STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[￥$¥,，\s]").expect("static regex"));

pub fn is_sentinel(text: &str) -> bool {
    SENTINELS.contains(&text.trim())
}

/// Extract a price from raw cell text.
///
/// Strips currency symbols and separators, then takes the first numeric
/// token. Returns 0.0 when no number is present or the value falls outside
/// [`PRICE_RANGE`].
pub fn clean_price(text: &str) -> f64 {
    if is_sentinel(text) {
        return 0.0;
    }

    let stripped = STRIP_RE.replace_all(text.trim(), "");
    let Some(caps) = NUMBER_RE.captures(&stripped) else {
        tracing::debug!("no numeric token in price text: {:?}", text);
        return 0.0;
    };

    match caps[1].parse::<f64>() {
        Ok(price) if (PRICE_RANGE.0..=PRICE_RANGE.1).contains(&price) => price,
        Ok(price) => {
            tracing::debug!("price outside plausible band: {}", price);
            0.0
        }
        Err(_) => 0.0,
    }
}

/// Extract (change, change_percent) from raw change text.
///
/// The change is the first signed numeric token, zeroed outside
/// [`CHANGE_RANGE`]. The percent is the first `%`-suffixed token; when the
/// text carries none, a percent string is synthesized from the change.
pub fn clean_change(text: &str) -> (f64, String) {
    if is_sentinel(text) {
        return (0.0, "0.00%".to_string());
    }

    let trimmed = text.trim();

    let mut change = SIGNED_NUMBER_RE
        .captures(trimmed)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(0.0);
    if !(CHANGE_RANGE.0..=CHANGE_RANGE.1).contains(&change) {
        tracing::debug!("change outside plausible band: {}", change);
        change = 0.0;
    }

    let percent = match PERCENT_RE.captures(trimmed) {
        Some(caps) => format!("{}%", &caps[1]),
        None if change != 0.0 => format!("{:+.2}%", change),
        None => "0.00%".to_string(),
    };

    (change, percent)
}

/// Normalize volume text, keeping the site's own formatting.
pub fn clean_volume(text: &str) -> Option<String> {
    if is_sentinel(text) {
        return None;
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Clean an optional numeric cell (high/low/open/buy/sell), dropping
/// values the price cleaner rejects.
pub fn clean_optional_price(text: &str) -> Option<f64> {
    let price = clean_price(text);
    if price > 0.0 {
        Some(price)
    } else {
        None
    }
}

/// Map site-specific contract and product names onto stable symbols.
/// Unmapped names pass through unchanged.
pub fn standardize_symbol(symbol: &str) -> String {
    let trimmed = symbol.trim();

    const MAPPING: &[(&str, &str)] = &[
        ("Au99.99", "AU9999"),
        ("Au(T+D)", "AUTD"),
        ("mAu(T+D)", "MAUTD"),
        ("Au99.95", "AU9995"),
        ("Au100g", "AU100G"),
        ("黄金T+D", "GOLD_TD"),
        ("现货黄金", "SPOT_GOLD"),
        ("黄金9999", "GOLD_9999"),
        ("纸黄金(人民币)", "PAPER_GOLD_CNY"),
        ("纸黄金(美元)", "PAPER_GOLD_USD"),
        ("XAUUSD", "XAUUSD"),
        ("沪金主力", "SHFE_GOLD_MAIN"),
    ];

    for (raw, standard) in MAPPING {
        if *raw == trimmed {
            return (*standard).to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_price_strips_currency_and_separators() {
        assert_eq!(clean_price("￥1,234.56"), 1234.56);
        assert_eq!(clean_price("$ 2,050"), 2050.0);
        assert_eq!(clean_price("  550.30 "), 550.3);
    }

    #[test]
    fn clean_price_zeroes_out_of_band_values() {
        assert_eq!(clean_price("5"), 0.0);
        assert_eq!(clean_price("99999"), 0.0);
        assert_eq!(clean_price("100"), 100.0);
        assert_eq!(clean_price("10000"), 10000.0);
    }

    #[test]
    fn clean_price_handles_sentinels_and_garbage() {
        assert_eq!(clean_price("--"), 0.0);
        assert_eq!(clean_price("N/A"), 0.0);
        assert_eq!(clean_price(""), 0.0);
        assert_eq!(clean_price("暂无数据"), 0.0);
    }

    #[test]
    fn clean_change_parses_sign_and_percent() {
        assert_eq!(clean_change("+2.50 +0.45%"), (2.5, "+0.45%".to_string()));
        assert_eq!(clean_change("-1.20 -0.22%"), (-1.2, "-0.22%".to_string()));
    }

    #[test]
    fn clean_change_synthesizes_percent_when_absent() {
        assert_eq!(clean_change("+3.1"), (3.1, "+3.10%".to_string()));
        assert_eq!(clean_change("-2"), (-2.0, "-2.00%".to_string()));
        assert_eq!(clean_change("0"), (0.0, "0.00%".to_string()));
    }

    #[test]
    fn clean_change_zeroes_out_of_band() {
        let (change, percent) = clean_change("+5000");
        assert_eq!(change, 0.0);
        assert_eq!(percent, "0.00%");
    }

    #[test]
    fn clean_volume_drops_sentinels() {
        assert_eq!(clean_volume("12,340"), Some("12,340".to_string()));
        assert_eq!(clean_volume("--"), None);
        assert_eq!(clean_volume("  "), None);
    }

    #[test]
    fn standardize_known_symbols() {
        assert_eq!(standardize_symbol("Au99.99"), "AU9999");
        assert_eq!(standardize_symbol("Au(T+D)"), "AUTD");
        assert_eq!(standardize_symbol("黄金T+D"), "GOLD_TD");
        assert_eq!(standardize_symbol("纸黄金(人民币)"), "PAPER_GOLD_CNY");
    }

    #[test]
    fn standardize_passes_unknown_symbols_through() {
        assert_eq!(standardize_symbol("Ag99.9"), "Ag99.9");
        assert_eq!(standardize_symbol(" 白银T+D "), "白银T+D");
    }
}
