//! Record assembly: drive the cleaner over every captured row, attach ids,
//! and collect per-row failures without aborting the batch.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::idgen::{IdSource, IdSourceError};
use crate::models::{BondRecord, RawBondRow};
use crate::scraper::cleaner::{self, ExtractError};

/// One skipped row, kept for manual inspection.
#[derive(Debug)]
pub struct RowFailure {
    /// Ordinal of the row in the source table.
    pub index: usize,
    /// Truncated outer HTML of the offending row.
    pub source: String,
    pub error: ExtractError,
}

#[derive(Debug, Default)]
pub struct AssembleOutcome {
    pub records: Vec<BondRecord>,
    pub failures: Vec<RowFailure>,
    pub rows_seen: usize,
}

/// Convert captured rows into records, in source order.
///
/// A malformed row is recorded and skipped; the batch continues. An id
/// issuance failure is fatal — partially-id'd output would break the
/// natural-key/internal-id contract. Ids are requested only after a row has
/// extracted successfully, so skipped rows burn no ids.
pub fn assemble(
    rows: &[RawBondRow],
    ids: &mut dyn IdSource,
    now: NaiveDateTime,
) -> Result<AssembleOutcome, IdSourceError> {
    let mut outcome = AssembleOutcome {
        rows_seen: rows.len(),
        ..Default::default()
    };

    for raw in rows {
        match cleaner::clean_bond_row(raw, now) {
            Ok(mut record) => {
                record.id = ids.next_id()?;
                outcome.records.push(record);
            }
            Err(error) => {
                warn!("row {} skipped: {}", raw.index, error);
                outcome.failures.push(RowFailure {
                    index: raw.index,
                    source: raw.source.clone(),
                    error,
                });
            }
        }
    }

    info!(
        "assembled {} records from {} rows ({} skipped)",
        outcome.records.len(),
        outcome.rows_seen,
        outcome.failures.len()
    );
    Ok(outcome)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 7, 23)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap()
    }

    fn raw_row(index: usize, cb_code: &str) -> RawBondRow {
        RawBondRow {
            index,
            source: format!("<tr data-cbcode=\"{cb_code}\">…</tr>"),
            cb_id: Some(format!("1230{index:02}")),
            cb_name: Some("测试转债".into()),
            cb_code: Some(cb_code.into()),
            stock_code: Some("sh601001".into()),
            stock_name: Some("测试股份".into()),
            price: Some("102.35".into()),
            rating: Some("AA".into()),
            is_unlist: Some("N".into()),
            remain_amount: Some("12.5".into()),
            cb_percent: Some("1.23%".into()),
            arbitrage_percent: Some("-0.45%".into()),
            stock_price: Some("8.90".into()),
            stock_percent: Some("2.10%".into()),
            convert_stock_price: Some("7.80".into()),
            premium_rate: Some("15.60%".into()),
            remain_price: Some("112.40".into()),
            issue_date: Some("20-07-15".into()),
            date_convert_distance: Some("已到".into()),
            date_remain_distance: Some("3年125天".into()),
            date_return_distance: Some("回售内".into()),
            market_cap: Some("1,234,567".into()),
            remain_to_cap: Some("12.3%".into()),
            pb: Some("1.05".into()),
            rate_expire: Some("2.35%".into()),
            rate_return: Some("1.80%".into()),
            old_style: Some("1,180.5".into()),
            new_style: Some("1,210.0".into()),
            remain_price_tax_title: Some("税后108.23".into()),
            pb_title: Some("（转股价格/每股净资产）：1.82".into()),
            is_repair_flag: false,
            repair_flag_remark: None,
        }
    }

    #[test]
    fn one_bad_row_does_not_abort_the_batch() {
        let mut rows: Vec<RawBondRow> = (0..10).map(|i| raw_row(i, &format!("1130{i:02}"))).collect();
        rows[5].stock_price = None;

        let mut ids = crate::idgen::IdWorker::new(1).unwrap();
        let outcome = assemble(&rows, &mut ids, now()).unwrap();

        assert_eq!(outcome.rows_seen, 10);
        assert_eq!(outcome.records.len(), 9);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 5);
        assert_eq!(
            outcome.failures[0].error,
            ExtractError::MissingField("stock_price")
        );
    }

    #[test]
    fn order_and_id_monotonicity_are_preserved() {
        let rows: Vec<RawBondRow> = (0..5).map(|i| raw_row(i, &format!("1130{i:02}"))).collect();
        let mut ids = crate::idgen::IdWorker::new(1).unwrap();
        let outcome = assemble(&rows, &mut ids, now()).unwrap();

        let codes: Vec<&str> = outcome.records.iter().map(|r| r.cb_code.as_str()).collect();
        assert_eq!(codes, ["113000", "113001", "113002", "113003", "113004"]);
        assert!(outcome.records.windows(2).all(|w| w[0].id < w[1].id));
    }
}
