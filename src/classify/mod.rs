//! Strategy classification: declarative filter rules deriving curated
//! subsets from the assembled record table. Each rule is evaluated
//! independently against the full set and preserves record order.

use tracing::info;

use crate::models::BondRecord;

// Rule thresholds.
const SAFE_PRICE_CEILING: f64 = 115.0;
const DOUBLE_LOW_PRICE_CEILING: f64 = 130.0;
const CB_TO_PB_FLOOR: f64 = 1.5;
const REMAIN_TO_CAP_FLOOR: f64 = 10.0;
const PREMIUM_RATE_CEILING: f64 = 10.0;

// Categorical states of the distance fields.
const CONVERT_REACHED: &str = "已到";
const RETURN_WINDOW: &str = "回售内";

// Remark phrases that disqualify a revision-eligible bond: the issuer has
// declined to exercise the revision right, or the no-revision promise
// window has not been reached yet.
const REVISION_DECLINED: &str = "暂不行使下修权利";
const REVISION_PROMISE_PENDING: &str = "距离不下修承诺";

/// A named, order-preserving subset of the record table.
#[derive(Debug)]
pub struct Subset {
    pub key: &'static str,
    /// Human-readable sheet name used at the reporting boundary.
    pub sheet_name: &'static str,
    pub records: Vec<BondRecord>,
}

/// Evaluate all strategy rules. Subset membership follows input order; the
/// subsets are independent of each other.
pub fn classify(records: &[BondRecord]) -> Vec<Subset> {
    let subsets = vec![
        Subset {
            key: "maturity_floor",
            sheet_name: "到期保底",
            records: maturity_floor(records),
        },
        Subset {
            key: "putback_lucky_draw",
            sheet_name: "回售摸彩",
            records: putback_lucky_draw(records),
        },
        Subset {
            key: "double_low",
            sheet_name: "低价格低溢价",
            records: double_low(records),
        },
    ];

    for s in &subsets {
        info!("{} ({}): {} bonds", s.sheet_name, s.key, s.records.len());
    }
    subsets
}

/// Positive yield to maturity on a cheap, revision-eligible bond that is
/// already convertible and big relative to its stock's market cap.
fn maturity_floor(records: &[BondRecord]) -> Vec<BondRecord> {
    let mut hits: Vec<BondRecord> = records
        .iter()
        .filter(|r| {
            r.rate_expire > 0.0
                && r.price < SAFE_PRICE_CEILING
                && r.date_convert_distance == CONVERT_REACHED
                && r.cb_to_pb > CB_TO_PB_FLOOR
                && r.is_repair_flag
                && r.remain_to_cap > REMAIN_TO_CAP_FLOOR
        })
        .cloned()
        .collect();

    // Textual exclusion is a post-filter over the rows that already matched:
    // the remark is irrelevant noise on everything else.
    hits.retain(|r| {
        !r.repair_flag_remark.contains(REVISION_DECLINED)
            && !r.repair_flag_remark.contains(REVISION_PROMISE_PENDING)
    });
    hits
}

/// Cheap, revision-eligible bonds inside their putback window.
fn putback_lucky_draw(records: &[BondRecord]) -> Vec<BondRecord> {
    records
        .iter()
        .filter(|r| {
            r.price < SAFE_PRICE_CEILING
                && r.date_return_distance == RETURN_WINDOW
                && r.cb_to_pb > CB_TO_PB_FLOOR
                && r.is_repair_flag
                && r.remain_to_cap > REMAIN_TO_CAP_FLOOR
        })
        .cloned()
        .collect()
}

/// Classic double-low screen: low price and low conversion premium.
fn double_low(records: &[BondRecord]) -> Vec<BondRecord> {
    records
        .iter()
        .filter(|r| {
            r.price < DOUBLE_LOW_PRICE_CEILING
                && r.date_convert_distance == CONVERT_REACHED
                && r.cb_to_pb > CB_TO_PB_FLOOR
                && r.remain_to_cap > REMAIN_TO_CAP_FLOOR
                && r.premium_rate < PREMIUM_RATE_CEILING
        })
        .cloned()
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// A record passing all three rules; tests tweak one field at a time.
    fn candidate(cb_code: &str) -> BondRecord {
        BondRecord {
            id: 1,
            cb_id: "123001".into(),
            cb_code: cb_code.into(),
            cb_name: "测试转债".into(),
            stock_code: "601001".into(),
            stock_name: "测试股份".into(),
            market: "sh".into(),
            price: 105.0,
            cb_percent: 0.5,
            stock_price: 8.9,
            stock_percent: 1.0,
            arbitrage_percent: 0.1,
            convert_stock_price: 7.8,
            premium_rate: 5.0,
            pb: 1.05,
            cb_to_pb: 1.8,
            remain_price: 112.4,
            remain_price_tax: 108.2,
            is_unlist: "N".into(),
            issue_date: Some("20-07-15".into()),
            date_convert_distance: CONVERT_REACHED.into(),
            date_remain_distance: "3年125天".into(),
            date_return_distance: RETURN_WINDOW.into(),
            remain_amount: 12.5,
            market_cap: 1_234_567,
            remain_to_cap: 15.0,
            rate_expire: 2.0,
            rate_return: "1.80".into(),
            old_style: 1180.5,
            new_style: 1210.0,
            rating: "AA".into(),
            is_repair_flag: true,
            repair_flag_remark: String::new(),
            scraped_at: NaiveDate::from_ymd_opt(2022, 7, 23)
                .unwrap()
                .and_hms_opt(21, 0, 0)
                .unwrap(),
        }
    }

    fn subset<'a>(subsets: &'a [Subset], key: &str) -> &'a Subset {
        subsets.iter().find(|s| s.key == key).unwrap()
    }

    #[test]
    fn candidate_matches_all_three_rules() {
        let subsets = classify(&[candidate("113001")]);
        for key in ["maturity_floor", "putback_lucky_draw", "double_low"] {
            assert_eq!(subset(&subsets, key).records.len(), 1, "{key}");
        }
    }

    #[test]
    fn maturity_floor_boundaries() {
        let mut negative_yield = candidate("113001");
        negative_yield.rate_expire = 0.0;
        let mut pricey = candidate("113002");
        pricey.price = 115.0;
        let mut not_convertible = candidate("113003");
        not_convertible.date_convert_distance = "125天".into();
        let mut no_flag = candidate("113004");
        no_flag.is_repair_flag = false;

        let subsets = classify(&[negative_yield, pricey, not_convertible, no_flag]);
        assert!(subset(&subsets, "maturity_floor").records.is_empty());
    }

    #[test]
    fn declined_revision_remark_is_excluded_from_maturity_floor_only() {
        let mut declined = candidate("113001");
        declined.repair_flag_remark = "公司公告：暂不行使下修权利（三个月）".into();
        let mut pending = candidate("113002");
        pending.repair_flag_remark = "距离不下修承诺结束还有 45 天".into();

        let subsets = classify(&[declined, pending]);
        assert!(subset(&subsets, "maturity_floor").records.is_empty());
        // still present in the other subsets — the exclusion is rule-local
        assert_eq!(subset(&subsets, "putback_lucky_draw").records.len(), 2);
        assert_eq!(subset(&subsets, "double_low").records.len(), 2);
    }

    #[test]
    fn putback_rule_requires_the_buyback_window() {
        let mut outside = candidate("113001");
        outside.date_return_distance = "2年30天".into();
        let subsets = classify(&[outside]);
        assert!(subset(&subsets, "putback_lucky_draw").records.is_empty());
    }

    #[test]
    fn double_low_allows_higher_price_but_caps_premium() {
        let mut mid_price = candidate("113001");
        mid_price.price = 125.0; // above the safe ceiling, below double-low's
        let mut high_premium = candidate("113002");
        high_premium.premium_rate = 10.0;

        let subsets = classify(&[mid_price, high_premium]);
        assert!(subset(&subsets, "maturity_floor").records.is_empty());
        let dl = &subset(&subsets, "double_low").records;
        assert_eq!(dl.len(), 1);
        assert_eq!(dl[0].cb_code, "113001");
    }

    #[test]
    fn subsets_preserve_input_order() {
        let records: Vec<BondRecord> = (0..6).map(|i| candidate(&format!("1130{i:02}"))).collect();
        let subsets = classify(&records);
        for s in &subsets {
            let codes: Vec<&str> = s.records.iter().map(|r| r.cb_code.as_str()).collect();
            let mut input = records.iter().map(|r| r.cb_code.as_str());
            // subset order must be a subsequence of input order
            assert!(codes.iter().all(|c| input.any(|i| i == *c)), "{}", s.key);
        }
    }
}
