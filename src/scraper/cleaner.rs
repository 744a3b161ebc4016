//! Typing layer of the field extractor: `RawBondRow` (captured strings) →
//! `BondRecord`. One bad field fails the whole row; no partial records.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{BondRecord, RawBondRow};

/// Yield-to-maturity floor. The source renders anything below it as a
/// "<-100" style sentinel; such readings are clamped to exactly this value.
pub const RATE_EXPIRE_FLOOR: f64 = -100.0;
const RATE_EXPIRE_FLOOR_SENTINEL: &str = "<-100";

/// Issue-date cell text meaning "lists today"; replaced by the run date.
pub const LISTS_TODAY: &str = "今日上市";

/// Label preceding the conversion-price-to-book value inside the P/B cell
/// tooltip. The value lives only there, never in the visible cell text.
pub const CB_TO_PB_LABEL: &str = "（转股价格/每股净资产）：";

/// The after-tax residual tooltip carries a fixed 2-character "税后" prefix.
const AFTER_TAX_PREFIX_CHARS: usize = 2;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Row-scoped extraction failure. The assembler records it and moves on to
/// the next row; it never aborts the batch.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}`: cannot parse `{value}` as a number")]
    InvalidNumber { field: &'static str, value: String },
    #[error("field `{field}`: malformed value `{value}`")]
    InvalidValue { field: &'static str, value: String },
    #[error("field `{field}`: tooltip has no `{label}` label")]
    MissingTooltipLabel { field: &'static str, label: &'static str },
}

// ── Field parsers ─────────────────────────────────────────────────────────────

fn require<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ExtractError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ExtractError::MissingField(field))
}

fn parse_f64(field: &'static str, s: &str) -> Result<f64, ExtractError> {
    s.trim().parse().map_err(|_| ExtractError::InvalidNumber {
        field,
        value: s.to_string(),
    })
}

/// "12.34%" → 12.34. A missing `%` suffix is tolerated.
fn parse_pct(field: &'static str, s: &str) -> Result<f64, ExtractError> {
    parse_f64(field, s.trim().trim_end_matches('%'))
}

/// "1,234.5" → 1234.5 (thousands separators stripped).
fn parse_grouped_f64(field: &'static str, s: &str) -> Result<f64, ExtractError> {
    parse_f64(field, &s.trim().replace(',', ""))
}

/// "123,456" → 123456.
fn parse_grouped_i64(field: &'static str, s: &str) -> Result<i64, ExtractError> {
    let cleaned = s.trim().replace(',', "");
    cleaned.parse().map_err(|_| ExtractError::InvalidNumber {
        field,
        value: s.to_string(),
    })
}

/// Yield-to-maturity, with the below-floor sentinel clamped. The sentinel
/// wins over any digits around it: "<-100.5%" → -100.0, not -100.5.
fn parse_rate_expire(s: &str) -> Result<f64, ExtractError> {
    if s.contains(RATE_EXPIRE_FLOOR_SENTINEL) {
        return Ok(RATE_EXPIRE_FLOOR);
    }
    parse_pct("rate_expire", s)
}

/// Pull the labeled conversion-price-to-book value out of the P/B tooltip.
/// The label is followed by the value on the same line.
fn parse_cb_to_pb(title: &str) -> Result<f64, ExtractError> {
    let rest = title
        .split_once(CB_TO_PB_LABEL)
        .map(|(_, rest)| rest)
        .ok_or(ExtractError::MissingTooltipLabel {
            field: "cb_to_pb",
            label: CB_TO_PB_LABEL,
        })?;
    let value = rest.lines().next().unwrap_or(rest);
    parse_f64("cb_to_pb", value)
}

/// After-tax residual: tooltip text minus its fixed 2-character prefix.
fn parse_remain_price_tax(title: &str) -> Result<f64, ExtractError> {
    let trimmed = title.trim();
    let boundary = trimmed
        .char_indices()
        .nth(AFTER_TAX_PREFIX_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    parse_f64("remain_price_tax", &trimmed[boundary..])
}

// ── Row cleaning ──────────────────────────────────────────────────────────────

/// Type and validate one captured row. `now` is the run timestamp; its date
/// substitutes for the "lists today" issue-date sentinel.
///
/// `id` is left at 0 here — the assembler attaches one from the id source
/// only after extraction has succeeded.
pub fn clean_bond_row(raw: &RawBondRow, now: NaiveDateTime) -> Result<BondRecord, ExtractError> {
    let combined = require(&raw.stock_code, "stock_code")?;
    if !combined.is_char_boundary(2) || combined.len() <= 2 {
        return Err(ExtractError::InvalidValue {
            field: "stock_code",
            value: combined.to_string(),
        });
    }
    let (market, stock_code) = combined.split_at(2);

    let is_unlist = require(&raw.is_unlist, "is_unlist")?.to_string();
    // Issue date exists only once the bond is listed; "今日上市" means the
    // cell has no date yet and the run date stands in.
    let issue_date = if is_unlist == "N" {
        let text = require(&raw.issue_date, "issue_date")?;
        Some(if text == LISTS_TODAY {
            now.date().format("%y-%m-%d").to_string()
        } else {
            text.to_string()
        })
    } else {
        None
    };

    Ok(BondRecord {
        id: 0,
        cb_id: require(&raw.cb_id, "cb_id")?.to_string(),
        cb_code: require(&raw.cb_code, "cb_code")?.to_string(),
        cb_name: require(&raw.cb_name, "cb_name")?.to_string(),
        stock_code: stock_code.to_string(),
        stock_name: require(&raw.stock_name, "stock_name")?.to_string(),
        market: market.to_string(),

        price: parse_f64("price", require(&raw.price, "price")?)?,
        cb_percent: parse_pct("cb_percent", require(&raw.cb_percent, "cb_percent")?)?,
        stock_price: parse_f64("stock_price", require(&raw.stock_price, "stock_price")?)?,
        stock_percent: parse_pct("stock_percent", require(&raw.stock_percent, "stock_percent")?)?,
        arbitrage_percent: parse_pct(
            "arbitrage_percent",
            require(&raw.arbitrage_percent, "arbitrage_percent")?,
        )?,
        convert_stock_price: parse_f64(
            "convert_stock_price",
            require(&raw.convert_stock_price, "convert_stock_price")?,
        )?,
        premium_rate: parse_pct("premium_rate", require(&raw.premium_rate, "premium_rate")?)?,
        pb: parse_f64("pb", require(&raw.pb, "pb")?)?,
        cb_to_pb: parse_cb_to_pb(require(&raw.pb_title, "pb_title")?)?,

        remain_price: parse_f64("remain_price", require(&raw.remain_price, "remain_price")?)?,
        remain_price_tax: parse_remain_price_tax(require(
            &raw.remain_price_tax_title,
            "remain_price_tax",
        )?)?,

        is_unlist,
        issue_date,
        // Mixed categorical/countdown semantics; deliberately left as text.
        date_convert_distance: require(&raw.date_convert_distance, "date_convert_distance")?
            .to_string(),
        date_remain_distance: require(&raw.date_remain_distance, "date_remain_distance")?
            .to_string(),
        date_return_distance: require(&raw.date_return_distance, "date_return_distance")?
            .to_string(),

        remain_amount: parse_f64("remain_amount", require(&raw.remain_amount, "remain_amount")?)?,
        market_cap: parse_grouped_i64("market_cap", require(&raw.market_cap, "market_cap")?)?,
        remain_to_cap: parse_pct("remain_to_cap", require(&raw.remain_to_cap, "remain_to_cap")?)?,

        rate_expire: parse_rate_expire(require(&raw.rate_expire, "rate_expire")?)?,
        rate_return: require(&raw.rate_return, "rate_return")?
            .trim_end_matches('%')
            .to_string(),

        old_style: parse_grouped_f64("old_style", require(&raw.old_style, "old_style")?)?,
        new_style: parse_grouped_f64("new_style", require(&raw.new_style, "new_style")?)?,
        rating: require(&raw.rating, "rating")?.to_string(),
        is_repair_flag: raw.is_repair_flag,
        repair_flag_remark: raw
            .repair_flag_remark
            .as_deref()
            .unwrap_or_default()
            .to_string(),

        scraped_at: now,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
