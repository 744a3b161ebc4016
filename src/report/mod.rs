//! Reporting boundary: write the full record table and each strategy subset
//! as one tabular sheet per name. Internal field names are renamed to
//! display labels here and nowhere else — the core schema stays
//! storage/report-agnostic.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::BondRecord;

/// Report column order and display labels, keyed by internal field name.
/// The internal `id` is not reported; it only travels to storage.
pub const DISPLAY_COLUMNS: &[(&str, &str)] = &[
    ("cb_id", "id"),
    ("cb_name", "可转债名称"),
    ("cb_code", "可转债代码"),
    ("stock_name", "股票名称"),
    ("stock_code", "股票代码"),
    ("market", "市场"),
    ("price", "转债价格"),
    ("cb_percent", "转债涨跌幅"),
    ("stock_price", "股价"),
    ("stock_percent", "股价涨跌幅"),
    ("arbitrage_percent", "日内套利"),
    ("convert_stock_price", "转股价格"),
    ("premium_rate", "转股溢价率"),
    ("pb", "市净率"),
    ("cb_to_pb", "转股价格/每股净资产"),
    ("remain_price", "剩余本息"),
    ("remain_price_tax", "税后剩余本息"),
    ("is_unlist", "是否上市"),
    ("issue_date", "发行日期"),
    ("date_convert_distance", "距离转股时间"),
    ("date_remain_distance", "距离到期时间"),
    ("date_return_distance", "距离回售时间"),
    ("remain_amount", "剩余规模"),
    ("market_cap", "股票市值"),
    ("remain_to_cap", "转债剩余/市值比例"),
    ("rate_expire", "到期收益率"),
    ("rate_return", "回售收益率"),
    ("old_style", "老式双底"),
    ("new_style", "新式双底"),
    ("rating", "债券评级"),
    ("is_repair_flag", "是否满足下修条件"),
    ("repair_flag_remark", "下修备注"),
];

fn field_text(r: &BondRecord, field: &str) -> String {
    match field {
        "cb_id" => r.cb_id.clone(),
        "cb_name" => r.cb_name.clone(),
        "cb_code" => r.cb_code.clone(),
        "stock_name" => r.stock_name.clone(),
        "stock_code" => r.stock_code.clone(),
        "market" => r.market.clone(),
        "price" => r.price.to_string(),
        "cb_percent" => r.cb_percent.to_string(),
        "stock_price" => r.stock_price.to_string(),
        "stock_percent" => r.stock_percent.to_string(),
        "arbitrage_percent" => r.arbitrage_percent.to_string(),
        "convert_stock_price" => r.convert_stock_price.to_string(),
        "premium_rate" => r.premium_rate.to_string(),
        "pb" => r.pb.to_string(),
        "cb_to_pb" => r.cb_to_pb.to_string(),
        "remain_price" => r.remain_price.to_string(),
        "remain_price_tax" => r.remain_price_tax.to_string(),
        "is_unlist" => r.is_unlist.clone(),
        "issue_date" => r.issue_date.clone().unwrap_or_default(),
        "date_convert_distance" => r.date_convert_distance.clone(),
        "date_remain_distance" => r.date_remain_distance.clone(),
        "date_return_distance" => r.date_return_distance.clone(),
        "remain_amount" => r.remain_amount.to_string(),
        "market_cap" => r.market_cap.to_string(),
        "remain_to_cap" => r.remain_to_cap.to_string(),
        "rate_expire" => r.rate_expire.to_string(),
        "rate_return" => r.rate_return.clone(),
        "old_style" => r.old_style.to_string(),
        "new_style" => r.new_style.to_string(),
        "rating" => r.rating.clone(),
        "is_repair_flag" => r.is_repair_flag.to_string(),
        "repair_flag_remark" => r.repair_flag_remark.clone(),
        _ => String::new(),
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

pub struct ReportWriter {
    out_dir: PathBuf,
    date: NaiveDate,
}

impl ReportWriter {
    pub fn new(out_dir: &Path, date: NaiveDate) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            date,
        }
    }

    fn sheet_path(&self, sheet_name: &str) -> PathBuf {
        self.out_dir
            .join(format!("{}_cb_list.{}.csv", self.date.format("%Y-%m-%d"), sheet_name))
    }

    /// Write one named sheet. Returns the path written.
    pub fn write_table(&self, records: &[BondRecord], sheet_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Could not create dir {:?}", self.out_dir))?;

        let path = self.sheet_path(sheet_name);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Could not open {:?}", path))?;

        writer.write_record(DISPLAY_COLUMNS.iter().map(|(_, label)| *label))?;
        for record in records {
            writer.write_record(DISPLAY_COLUMNS.iter().map(|(field, _)| field_text(record, field)))?;
        }
        writer.flush()?;

        info!("sheet `{}`: {} rows → {:?}", sheet_name, records.len(), path);
        Ok(path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
