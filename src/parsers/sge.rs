//! Shanghai Gold Exchange daily quotation parser.

use chrono::{Local, NaiveDate};
use scraper::{Html, Selector};

use super::clean;
use super::{accept, dedupe_by_region, now_timestamp, PageRegion, PageRequest, PriceParser};
use crate::error::{Error, Result};
use crate::models::{Currency, PriceRecord};

const DATA_URL: &str = "https://www.sge.com.cn/sjzx/quotation_daily_new";

/// Exchange contracts worth keeping. Everything else on the page
/// (indices, deferred-fee rows) is skipped.
const TARGET_CONTRACTS: &[&str] = &[
    "Au99.99",
    "Au(T+D)",
    "mAu(T+D)",
    "Au99.95",
    "Au100g",
    "Ag99.9",
    "Ag(T+D)",
];

pub struct SgeParser;

impl SgeParser {
    pub fn new() -> Self {
        Self
    }

    /// Quotation URL for a single day.
    pub fn data_url_for(date: &str) -> String {
        format!("{}?start_date={}&end_date={}", DATA_URL, date, date)
    }

    /// The quotation table carries its own trade date; fold it into the
    /// record timestamp when well formed, otherwise fall back to now.
    fn row_timestamp(date_text: &str) -> String {
        let trimmed = date_text.trim();
        if clean::is_sentinel(trimmed) {
            return now_timestamp();
        }

        match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(date) => format!("{}T{}", date, Local::now().format("%H:%M:%S")),
            Err(_) => {
                tracing::debug!("unexpected quotation date format: {:?}", trimmed);
                now_timestamp()
            }
        }
    }

    fn contract_rank(symbol: &str) -> u32 {
        TARGET_CONTRACTS
            .iter()
            .position(|c| clean::standardize_symbol(c) == symbol)
            .map(|i| i as u32)
            .unwrap_or(u32::MAX)
    }

    fn parse_row(&self, cells: &[String]) -> Option<PriceRecord> {
        // date, contract, open, high, low, close, change, change%
        if cells.len() < 8 {
            return None;
        }

        let contract = cells[1].trim();
        if !TARGET_CONTRACTS.contains(&contract) {
            return None;
        }

        let combined_change = format!("{} {}", cells[6], cells[7]);
        let (change, change_percent) = clean::clean_change(&combined_change);

        accept(PriceRecord {
            source: "sge".to_string(),
            symbol: clean::standardize_symbol(contract),
            price: clean::clean_price(&cells[5]),
            change,
            change_percent,
            timestamp: Self::row_timestamp(&cells[0]),
            currency: Currency::Cny,
            volume: cells.get(9).and_then(|v| clean::clean_volume(v)),
            high: clean::clean_optional_price(&cells[3]),
            low: clean::clean_optional_price(&cells[4]),
            open: clean::clean_optional_price(&cells[2]),
            buy_price: None,
            sell_price: None,
        })
    }
}

impl Default for SgeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceParser for SgeParser {
    fn name(&self) -> &'static str {
        "sge"
    }

    fn base_url(&self) -> &'static str {
        "https://www.sge.com.cn/"
    }

    fn page(&self) -> PageRequest {
        let today = Local::now().format("%Y-%m-%d").to_string();
        PageRequest {
            url: Self::data_url_for(&today),
            wait_selector: "table",
        }
    }

    fn title_markers(&self) -> &'static [&'static str] {
        &["上海黄金交易所", "SGE"]
    }

    fn parse(&self, html: &str) -> Result<Vec<PriceRecord>> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();

        if document.select(&table_sel).next().is_none() {
            return Err(Error::parser("sge", "no quotation table in page"));
        }

        let mut candidates = Vec::new();
        for table in document.select(&table_sel) {
            // First row is the header.
            for row in table.select(&row_sel).skip(1) {
                let cells: Vec<String> = row
                    .select(&cell_sel)
                    .map(|c| c.text().collect::<String>().trim().to_string())
                    .collect();

                if let Some(record) = self.parse_row(&cells) {
                    candidates.push((PageRegion::PrimaryTable, record));
                }
            }
        }

        let records = dedupe_by_region(candidates, Self::contract_rank);
        tracing::debug!("sge: parsed {} records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotation_page(rows: &str) -> String {
        format!(
            "<html><body><table>\
             <tr><th>日期</th><th>合约</th><th>开盘价</th><th>最高价</th>\
             <th>最低价</th><th>收盘价</th><th>涨跌</th><th>涨跌幅</th>\
             <th>加权平均价</th><th>成交量</th><th>成交金额</th></tr>\
             {}\
             </table></body></html>",
            rows
        )
    }

    fn row(contract: &str, close: &str) -> String {
        format!(
            "<tr><td>2026-08-25</td><td>{}</td><td>548.00</td><td>552.10</td>\
             <td>547.20</td><td>{}</td><td>+2.50</td><td>+0.46%</td>\
             <td>550.00</td><td>12,340</td><td>6,789,000</td></tr>",
            contract, close
        )
    }

    #[test]
    fn parses_target_contracts() {
        let html = quotation_page(&format!(
            "{}{}",
            row("Au99.99", "550.50"),
            row("Au(T+D)", "549.80")
        ));
        let records = SgeParser::new().parse(&html).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "AU9999");
        assert_eq!(records[0].price, 550.50);
        assert_eq!(records[0].change, 2.5);
        assert_eq!(records[0].change_percent, "+0.46%");
        assert_eq!(records[0].currency, Currency::Cny);
        assert_eq!(records[0].volume.as_deref(), Some("12,340"));
        assert_eq!(records[0].high, Some(552.10));
        assert_eq!(records[1].symbol, "AUTD");
    }

    #[test]
    fn filters_contracts_outside_allow_list() {
        let html = quotation_page(&format!(
            "{}{}",
            row("Au99.99", "550.50"),
            row("Pt99.95", "231.00")
        ));
        let records = SgeParser::new().parse(&html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "AU9999");
    }

    #[test]
    fn drops_rows_with_implausible_close() {
        let html = quotation_page(&row("Au99.99", "--"));
        let records = SgeParser::new().parse(&html).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn folds_quotation_date_into_timestamp() {
        let html = quotation_page(&row("Au99.99", "550.50"));
        let records = SgeParser::new().parse(&html).unwrap();
        assert!(records[0].timestamp.starts_with("2026-08-25T"));
    }

    #[test]
    fn malformed_date_falls_back_to_now() {
        let ts = SgeParser::row_timestamp("2026/08/25");
        // Still a full timestamp, just not the quoted date.
        assert!(ts.contains('T'));
    }

    #[test]
    fn page_without_table_is_a_parser_error() {
        let err = SgeParser::new().parse("<html><body>maintenance</body></html>");
        assert!(matches!(err, Err(Error::Parser { .. })));
    }

    #[test]
    fn duplicate_contract_rows_collapse_to_one() {
        let html = quotation_page(&format!(
            "{}{}",
            row("Au99.99", "550.50"),
            row("Au99.99", "551.00")
        ));
        let records = SgeParser::new().parse(&html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price, 550.50);
    }

    #[test]
    fn records_sorted_by_contract_rank() {
        let html = quotation_page(&format!(
            "{}{}",
            row("Au(T+D)", "549.80"),
            row("Au99.99", "550.50")
        ));
        let records = SgeParser::new().parse(&html).unwrap();
        assert_eq!(records[0].symbol, "AU9999");
        assert_eq!(records[1].symbol, "AUTD");
    }

    #[test]
    fn data_url_embeds_both_dates() {
        let url = SgeParser::data_url_for("2026-08-25");
        assert!(url.contains("start_date=2026-08-25"));
        assert!(url.contains("end_date=2026-08-25"));
    }
}
