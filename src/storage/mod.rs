use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, params};
use std::path::Path;
use tracing::info;

use crate::models::BondRecord;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS convertible_bond (
    -- internal id, re-issued per run; reconciliation keys on (cb_id, cb_code)
    id                      BIGINT   NOT NULL,
    cb_id                   VARCHAR  NOT NULL,
    cb_code                 VARCHAR  NOT NULL,
    cb_name                 VARCHAR  NOT NULL,
    stock_code              VARCHAR  NOT NULL,
    stock_name              VARCHAR  NOT NULL,
    market                  VARCHAR  NOT NULL,
    price                   DOUBLE   NOT NULL,
    cb_percent              DOUBLE   NOT NULL,
    stock_price             DOUBLE   NOT NULL,
    stock_percent           DOUBLE   NOT NULL,
    arbitrage_percent       DOUBLE   NOT NULL,
    convert_stock_price     DOUBLE   NOT NULL,
    premium_rate            DOUBLE   NOT NULL,
    pb                      DOUBLE   NOT NULL,
    cb_to_pb                DOUBLE   NOT NULL,
    remain_price            DOUBLE   NOT NULL,
    remain_price_tax        DOUBLE   NOT NULL,
    is_unlist               VARCHAR  NOT NULL,
    issue_date              VARCHAR,
    date_convert_distance   VARCHAR  NOT NULL,
    date_remain_distance    VARCHAR  NOT NULL,
    date_return_distance    VARCHAR  NOT NULL,
    remain_amount           DOUBLE   NOT NULL,
    market_cap              BIGINT   NOT NULL,
    remain_to_cap           DOUBLE   NOT NULL,
    rate_expire             DOUBLE   NOT NULL,
    rate_return             VARCHAR  NOT NULL,
    old_style               DOUBLE   NOT NULL,
    new_style               DOUBLE   NOT NULL,
    rating                  VARCHAR  NOT NULL,
    is_repair_flag          BOOLEAN  NOT NULL,
    repair_flag_remark      VARCHAR  NOT NULL,
    scraped_at              TIMESTAMP NOT NULL,
    PRIMARY KEY (cb_id, cb_code)
);

CREATE SEQUENCE IF NOT EXISTS ingest_run_seq;

CREATE TABLE IF NOT EXISTS ingest_runs (
    id                  BIGINT PRIMARY KEY,
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    rows_seen           INTEGER DEFAULT 0,
    records_extracted   INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_bond_code    ON convertible_bond (cb_code);
CREATE INDEX IF NOT EXISTS idx_bond_scraped ON convertible_bond (scraped_at);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Bonds ─────────────────────────────────────────────────────────────────

    /// Upsert records keyed on the natural key — idempotent, safe to re-run.
    /// The second write wins for every non-key field, internal id included.
    pub fn upsert_bonds(&self, records: &[BondRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO convertible_bond (
                id, cb_id, cb_code, cb_name, stock_code, stock_name, market,
                price, cb_percent, stock_price, stock_percent, arbitrage_percent,
                convert_stock_price, premium_rate, pb, cb_to_pb,
                remain_price, remain_price_tax,
                is_unlist, issue_date,
                date_convert_distance, date_remain_distance, date_return_distance,
                remain_amount, market_cap, remain_to_cap,
                rate_expire, rate_return, old_style, new_style,
                rating, is_repair_flag, repair_flag_remark, scraped_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (cb_id, cb_code) DO UPDATE SET
                id                    = excluded.id,
                cb_name               = excluded.cb_name,
                stock_code            = excluded.stock_code,
                stock_name            = excluded.stock_name,
                market                = excluded.market,
                price                 = excluded.price,
                cb_percent            = excluded.cb_percent,
                stock_price           = excluded.stock_price,
                stock_percent         = excluded.stock_percent,
                arbitrage_percent     = excluded.arbitrage_percent,
                convert_stock_price   = excluded.convert_stock_price,
                premium_rate          = excluded.premium_rate,
                pb                    = excluded.pb,
                cb_to_pb              = excluded.cb_to_pb,
                remain_price          = excluded.remain_price,
                remain_price_tax      = excluded.remain_price_tax,
                is_unlist             = excluded.is_unlist,
                issue_date            = excluded.issue_date,
                date_convert_distance = excluded.date_convert_distance,
                date_remain_distance  = excluded.date_remain_distance,
                date_return_distance  = excluded.date_return_distance,
                remain_amount         = excluded.remain_amount,
                market_cap            = excluded.market_cap,
                remain_to_cap         = excluded.remain_to_cap,
                rate_expire           = excluded.rate_expire,
                rate_return           = excluded.rate_return,
                old_style             = excluded.old_style,
                new_style             = excluded.new_style,
                rating                = excluded.rating,
                is_repair_flag        = excluded.is_repair_flag,
                repair_flag_remark    = excluded.repair_flag_remark,
                scraped_at            = excluded.scraped_at
        "#;

        for r in records {
            tx.execute(sql, params![
                r.id, r.cb_id, r.cb_code, r.cb_name, r.stock_code, r.stock_name, r.market,
                r.price, r.cb_percent, r.stock_price, r.stock_percent, r.arbitrage_percent,
                r.convert_stock_price, r.premium_rate, r.pb, r.cb_to_pb,
                r.remain_price, r.remain_price_tax,
                r.is_unlist, r.issue_date,
                r.date_convert_distance, r.date_remain_distance, r.date_return_distance,
                r.remain_amount, r.market_cap, r.remain_to_cap,
                r.rate_expire, r.rate_return, r.old_style, r.new_style,
                r.rating, r.is_repair_flag, r.repair_flag_remark, r.scraped_at,
            ])
            .with_context(|| format!("upsert bond {} {}", r.cb_id, r.cb_code))?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub fn bond_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM convertible_bond")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn list_bonds(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cb_code, cb_name FROM convertible_bond ORDER BY cb_code")?;
        let bonds: Vec<(String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(bonds)
    }

    pub fn latest_scraped_at(&self) -> Result<Option<NaiveDateTime>> {
        let mut s = self.conn.prepare("SELECT MAX(scraped_at) FROM convertible_bond")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Ingest run log ────────────────────────────────────────────────────────

    pub fn begin_ingest_run(&self) -> Result<i64> {
        let id: i64 = self
            .conn
            .query_row("SELECT nextval('ingest_run_seq')", [], |r| r.get(0))?;
        self.conn.execute(
            "INSERT INTO ingest_runs (id, started_at, status) VALUES (?, ?, 'running')",
            params![id, Utc::now().naive_utc()],
        )?;
        Ok(id)
    }

    pub fn finish_ingest_run(
        &self,
        run_id: i64,
        rows_seen: usize,
        records_extracted: usize,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"UPDATE ingest_runs SET
               finished_at = ?, status = ?,
               rows_seen = ?, records_extracted = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                rows_seen as i64,
                records_extracted as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn run_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM ingest_runs")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record(id: i64, price: f64) -> BondRecord {
        BondRecord {
            id,
            cb_id: "123001".into(),
            cb_code: "113001".into(),
            cb_name: "测试转债".into(),
            stock_code: "601001".into(),
            stock_name: "测试股份".into(),
            market: "sh".into(),
            price,
            cb_percent: 1.23,
            stock_price: 8.9,
            stock_percent: 2.1,
            arbitrage_percent: -0.45,
            convert_stock_price: 7.8,
            premium_rate: 15.6,
            pb: 1.05,
            cb_to_pb: 1.82,
            remain_price: 112.4,
            remain_price_tax: 108.23,
            is_unlist: "N".into(),
            issue_date: Some("20-07-15".into()),
            date_convert_distance: "已到".into(),
            date_remain_distance: "3年125天".into(),
            date_return_distance: "回售内".into(),
            remain_amount: 12.5,
            market_cap: 1_234_567,
            remain_to_cap: 12.3,
            rate_expire: 2.35,
            rate_return: "1.80".into(),
            old_style: 1180.5,
            new_style: 1210.0,
            rating: "AA+".into(),
            is_repair_flag: true,
            repair_flag_remark: String::new(),
            scraped_at: NaiveDate::from_ymd_opt(2022, 7, 23)
                .unwrap()
                .and_hms_opt(21, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn upsert_is_idempotent_on_the_natural_key() {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();

        repo.upsert_bonds(&[sample_record(1, 102.35)]).unwrap();
        // same bond scraped again in a later run: new internal id, new price
        repo.upsert_bonds(&[sample_record(2, 99.80)]).unwrap();

        assert_eq!(repo.bond_count().unwrap(), 1);
        let (id, price): (i64, f64) = repo
            .conn
            .query_row(
                "SELECT id, price FROM convertible_bond WHERE cb_id = '123001' AND cb_code = '113001'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(price, 99.80);
    }

    #[test]
    fn ingest_run_log_round_trip() {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();

        let run_id = repo.begin_ingest_run().unwrap();
        repo.finish_ingest_run(run_id, 10, 9, Some("1 rows skipped")).unwrap();

        assert_eq!(repo.run_count().unwrap(), 1);
        let status: String = repo
            .conn
            .query_row("SELECT status FROM ingest_runs WHERE id = ?", params![run_id], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "error");
    }

    #[test]
    fn migrations_are_re_runnable() {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo.run_migrations().unwrap();
        assert_eq!(repo.bond_count().unwrap(), 0);
    }
}
