//! Sina Finance precious metals parser.
//!
//! Sina labels the same instrument differently across page sections
//! (现货黄金 vs 国际金价 vs XAUUSD), so product matching goes through an
//! alias table with exact-then-substring matching.

use scraper::{Html, Selector};

use super::clean;
use super::{accept, dedupe_by_region, now_timestamp, PageRegion, PageRequest, PriceParser};
use crate::error::{Error, Result};
use crate::models::{Currency, PriceRecord};

const DATA_URL: &str = "https://finance.sina.com.cn/nmetal/";

const MAX_TABLES: usize = 5;
const MAX_QUOTE_WIDGETS: usize = 10;

struct Product {
    name: &'static str,
    currency: Currency,
    priority: u32,
    aliases: &'static [&'static str],
}

const PRODUCTS: &[Product] = &[
    Product {
        name: "XAUUSD",
        currency: Currency::Usd,
        priority: 1,
        aliases: &["现货黄金", "国际金价"],
    },
    Product {
        name: "沪金主力",
        currency: Currency::Cny,
        priority: 2,
        aliases: &["沪金", "AU主力"],
    },
    Product {
        name: "黄金T+D",
        currency: Currency::Cny,
        priority: 3,
        aliases: &["Au(T+D)", "黄金延期"],
    },
    Product {
        name: "XAGUSD",
        currency: Currency::Usd,
        priority: 4,
        aliases: &["现货白银", "国际银价"],
    },
    Product {
        name: "沪银主力",
        currency: Currency::Cny,
        priority: 5,
        aliases: &["沪银", "AG主力"],
    },
    Product {
        name: "白银T+D",
        currency: Currency::Cny,
        priority: 6,
        aliases: &["Ag(T+D)", "白银延期"],
    },
];

pub struct SinaParser;

impl SinaParser {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a page label to a canonical product: exact product name,
    /// exact alias, then alias-substring.
    fn match_product(name: &str) -> Option<&'static Product> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if let Some(product) = PRODUCTS.iter().find(|p| p.name == name) {
            return Some(product);
        }
        if let Some(product) = PRODUCTS
            .iter()
            .find(|p| p.aliases.iter().any(|a| *a == name))
        {
            return Some(product);
        }
        PRODUCTS
            .iter()
            .find(|p| p.aliases.iter().any(|a| name.contains(a)))
    }

    fn symbol_rank(symbol: &str) -> u32 {
        PRODUCTS
            .iter()
            .find(|p| clean::standardize_symbol(p.name) == symbol)
            .map(|p| p.priority)
            .unwrap_or(99)
    }

    fn table_record(cells: &[String], region: PageRegion) -> Option<(PageRegion, PriceRecord)> {
        // name, price, change, change%, [high, low, open, volume]
        if cells.len() < 4 {
            return None;
        }

        let product = Self::match_product(&cells[0])?;
        let combined_change = format!("{} {}", cells[2], cells[3]);
        let (change, change_percent) = clean::clean_change(&combined_change);

        let record = accept(PriceRecord {
            source: "sina".to_string(),
            symbol: clean::standardize_symbol(product.name),
            price: clean::clean_price(&cells[1]),
            change,
            change_percent,
            timestamp: now_timestamp(),
            currency: product.currency,
            volume: cells.get(7).and_then(|v| clean::clean_volume(v)),
            high: cells.get(4).and_then(|v| clean::clean_optional_price(v)),
            low: cells.get(5).and_then(|v| clean::clean_optional_price(v)),
            open: cells.get(6).and_then(|v| clean::clean_optional_price(v)),
            buy_price: None,
            sell_price: None,
        })?;

        Some((region, record))
    }
}

impl Default for SinaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceParser for SinaParser {
    fn name(&self) -> &'static str {
        "sina"
    }

    fn base_url(&self) -> &'static str {
        "https://finance.sina.com.cn/"
    }

    fn page(&self) -> PageRequest {
        PageRequest {
            url: DATA_URL.to_string(),
            wait_selector: "table, .data_table",
        }
    }

    fn title_markers(&self) -> &'static [&'static str] {
        &["新浪财经", "新浪网"]
    }

    fn parse(&self, html: &str) -> Result<Vec<PriceRecord>> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse(".data_table, .price_table, table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();
        let quote_sel = Selector::parse(".quote, .price_info").unwrap();
        let quote_name_sel = Selector::parse(".name, .title, h3, h4").unwrap();
        let quote_price_sel = Selector::parse(".price, .value, .current").unwrap();
        let quote_change_sel = Selector::parse(".change, .up, .down, .percent").unwrap();

        let has_tables = document.select(&table_sel).next().is_some();
        let has_quotes = document.select(&quote_sel).next().is_some();
        if !has_tables && !has_quotes {
            return Err(Error::parser("sina", "no price tables or quotes in page"));
        }

        let mut candidates = Vec::new();

        for (table_index, table) in document.select(&table_sel).take(MAX_TABLES).enumerate() {
            let region = if table_index == 0 {
                PageRegion::PrimaryTable
            } else {
                PageRegion::SecondaryTable
            };

            // First row is the header.
            for row in table.select(&row_sel).skip(1) {
                let cells: Vec<String> = row
                    .select(&cell_sel)
                    .map(|c| c.text().collect::<String>().trim().to_string())
                    .collect();

                if let Some(candidate) = Self::table_record(&cells, region) {
                    candidates.push(candidate);
                }
            }
        }

        for widget in document.select(&quote_sel).take(MAX_QUOTE_WIDGETS) {
            let name = widget
                .select(&quote_name_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let Some(product) = Self::match_product(&name) else {
                continue;
            };

            let price = widget
                .select(&quote_price_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let change_text = widget
                .select(&quote_change_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let (change, change_percent) = clean::clean_change(&change_text);

            if let Some(record) = accept(PriceRecord {
                source: "sina".to_string(),
                symbol: clean::standardize_symbol(product.name),
                price: clean::clean_price(&price),
                change,
                change_percent,
                timestamp: now_timestamp(),
                currency: product.currency,
                volume: None,
                high: None,
                low: None,
                open: None,
                buy_price: None,
                sell_price: None,
            }) {
                candidates.push((PageRegion::Ticker, record));
            }
        }

        let records = dedupe_by_region(candidates, Self::symbol_rank);
        tracing::debug!("sina: parsed {} records", records.len());
        Ok(records)
    }
}
