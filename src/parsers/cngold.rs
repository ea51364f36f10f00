//! Cngold (金投网) gold quote parser.
//!
//! The page carries the same products in several places: a handful of
//! quote tables and a live ticker strip. The ticker updates fastest, so
//! it wins when a product shows up more than once.

use scraper::{Html, Selector};

use super::clean;
use super::{accept, dedupe_by_region, now_timestamp, PageRegion, PageRequest, PriceParser};
use crate::error::{Error, Result};
use crate::models::{Currency, PriceRecord};

/// Only the first few tables on the page hold quotes; the rest are news.
const MAX_TABLES: usize = 8;

/// Product name, currency, display priority.
const PRODUCTS: &[(&str, Currency, u32)] = &[
    ("黄金T+D", Currency::Cny, 1),
    ("现货黄金", Currency::Usd, 2),
    ("黄金9999", Currency::Cny, 3),
    ("纸黄金(人民币)", Currency::Cny, 4),
    ("纸黄金(美元)", Currency::Usd, 5),
    ("白银T+D", Currency::Cny, 6),
    ("现货白银", Currency::Usd, 7),
];

pub struct CngoldParser;

impl CngoldParser {
    pub fn new() -> Self {
        Self
    }

    fn product(name: &str) -> Option<(Currency, u32)> {
        PRODUCTS
            .iter()
            .find(|(raw, _, _)| *raw == name)
            .map(|(_, currency, priority)| (*currency, *priority))
    }

    fn symbol_rank(symbol: &str) -> u32 {
        PRODUCTS
            .iter()
            .find(|(raw, _, _)| clean::standardize_symbol(raw) == symbol)
            .map(|(_, _, priority)| *priority)
            .unwrap_or(99)
    }

    fn record(
        name: &str,
        price_text: &str,
        change_text: &str,
        buy_text: Option<&str>,
        sell_text: Option<&str>,
    ) -> Option<PriceRecord> {
        let (currency, _) = Self::product(name)?;
        let (change, change_percent) = clean::clean_change(change_text);

        accept(PriceRecord {
            source: "cngold".to_string(),
            symbol: clean::standardize_symbol(name),
            price: clean::clean_price(price_text),
            change,
            change_percent,
            timestamp: now_timestamp(),
            currency,
            volume: None,
            high: None,
            low: None,
            open: None,
            buy_price: buy_text.and_then(clean::clean_optional_price),
            sell_price: sell_text.and_then(clean::clean_optional_price),
        })
    }
}

impl Default for CngoldParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceParser for CngoldParser {
    fn name(&self) -> &'static str {
        "cngold"
    }

    fn base_url(&self) -> &'static str {
        "https://gold.cngold.org/"
    }

    fn page(&self) -> PageRequest {
        PageRequest {
            url: self.base_url().to_string(),
            wait_selector: "table",
        }
    }

    fn title_markers(&self) -> &'static [&'static str] {
        &["金投网", "黄金"]
    }

    fn parse(&self, html: &str) -> Result<Vec<PriceRecord>> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();
        let ticker_sel = Selector::parse(".hq-list li").unwrap();
        let ticker_name_sel = Selector::parse("a, .name").unwrap();
        let ticker_price_sel = Selector::parse(".price, .value").unwrap();
        let ticker_change_sel = Selector::parse(".change, .up, .down").unwrap();

        let has_tables = document.select(&table_sel).next().is_some();
        let has_ticker = document.select(&ticker_sel).next().is_some();
        if !has_tables && !has_ticker {
            return Err(Error::parser("cngold", "no quote tables or ticker in page"));
        }

        let mut candidates = Vec::new();

        for (table_index, table) in document.select(&table_sel).take(MAX_TABLES).enumerate() {
            let region = if table_index == 0 {
                PageRegion::PrimaryTable
            } else {
                PageRegion::SecondaryTable
            };

            for row in table.select(&row_sel) {
                let cells: Vec<String> = row
                    .select(&cell_sel)
                    .map(|c| c.text().collect::<String>().trim().to_string())
                    .collect();
                if cells.len() < 3 {
                    continue;
                }

                // name, price, change, [buy, sell]
                if let Some(record) = Self::record(
                    &cells[0],
                    &cells[1],
                    &cells[2],
                    cells.get(3).map(String::as_str),
                    cells.get(4).map(String::as_str),
                ) {
                    candidates.push((region, record));
                }
            }
        }

        for entry in document.select(&ticker_sel) {
            let name = entry
                .select(&ticker_name_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let price = entry
                .select(&ticker_price_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let change = entry
                .select(&ticker_change_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            if let Some(record) = Self::record(&name, &price, &change, None, None) {
                candidates.push((PageRegion::Ticker, record));
            }
        }

        let records = dedupe_by_region(candidates, Self::symbol_rank);
        tracing::debug!("cngold: parsed {} records", records.len());
        Ok(records)
    }
}
