use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Raw quote-table row ───────────────────────────────────────────────────────

/// One `<tr>` of the convertible-bond quote table, as captured: every value
/// still a string, missing cells/attributes left as `None` for the cleaner
/// to classify. Addressing (class + ordinal, tooltip attributes, marker
/// scan) happens in `scraper::parsers`; typing happens in `scraper::cleaner`.
#[derive(Debug, Clone, Default)]
pub struct RawBondRow {
    /// Ordinal of the row within the source table.
    pub index: usize,
    /// Truncated outer HTML, kept for skipped-row diagnostics.
    pub source: String,

    // row attributes
    pub cb_id: Option<String>,
    pub cb_name: Option<String>,
    pub cb_code: Option<String>,
    /// Combined market prefix + stock code, e.g. "sh113001".
    pub stock_code: Option<String>,
    pub stock_name: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
    pub is_unlist: Option<String>,
    pub remain_amount: Option<String>,

    // cell texts (class + ordinal addressing)
    pub cb_percent: Option<String>,
    pub arbitrage_percent: Option<String>,
    pub stock_price: Option<String>,
    pub stock_percent: Option<String>,
    pub convert_stock_price: Option<String>,
    pub premium_rate: Option<String>,
    pub remain_price: Option<String>,
    pub issue_date: Option<String>,
    pub date_convert_distance: Option<String>,
    pub date_remain_distance: Option<String>,
    pub date_return_distance: Option<String>,
    pub market_cap: Option<String>,
    pub remain_to_cap: Option<String>,
    pub pb: Option<String>,
    pub rate_expire: Option<String>,
    pub rate_return: Option<String>,
    pub old_style: Option<String>,
    pub new_style: Option<String>,

    // tooltip (`title` attribute) captures
    pub remain_price_tax_title: Option<String>,
    pub pb_title: Option<String>,

    // marker scan over the name cell's spans
    pub is_repair_flag: bool,
    pub repair_flag_remark: Option<String>,
}

// ── Bond record ───────────────────────────────────────────────────────────────

/// Fully typed record for one convertible bond. Field names are the storage
/// schema and the report column keys; downstream consumers key on them.
///
/// Records are immutable after assembly. A later run producing the "same"
/// bond yields a new record with a new `id`; the persistence layer
/// reconciles on the natural key `(cb_id, cb_code)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BondRecord {
    /// Internal unique id, issued by the id source at assembly time.
    pub id: i64,
    pub cb_id: String,
    pub cb_code: String,
    pub cb_name: String,
    pub stock_code: String,
    pub stock_name: String,
    /// 2-char market segment prefix of the combined stock code ("sh"/"sz").
    pub market: String,

    pub price: f64,
    pub cb_percent: f64,
    pub stock_price: f64,
    pub stock_percent: f64,
    pub arbitrage_percent: f64,
    pub convert_stock_price: f64,
    pub premium_rate: f64,
    pub pb: f64,
    /// Conversion price / book value per share, lifted from the P/B cell's
    /// tooltip, not from its visible text.
    pub cb_to_pb: f64,

    pub remain_price: f64,
    pub remain_price_tax: f64,

    /// "Y" when the bond has not listed yet, "N" when listed.
    pub is_unlist: String,
    /// `%y-%m-%d`; None while unlisted.
    pub issue_date: Option<String>,
    // The three distances mix categorical states ("已到", "回售内") with
    // literal countdown text; they stay strings on purpose.
    pub date_convert_distance: String,
    pub date_remain_distance: String,
    pub date_return_distance: String,

    pub remain_amount: f64,
    pub market_cap: i64,
    pub remain_to_cap: f64,

    pub rate_expire: f64,
    /// Mixed numeric/sentinel source; kept raw.
    pub rate_return: String,

    pub old_style: f64,
    pub new_style: f64,
    pub rating: String,
    pub is_repair_flag: bool,
    pub repair_flag_remark: String,

    pub scraped_at: NaiveDateTime,
}
