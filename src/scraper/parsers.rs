//! DOM addressing layer of the field extractor: locate every attribute,
//! cell, and tooltip of a quote-table row and capture them as strings.
//! Nothing is typed or validated here — a missing cell stays `None` so the
//! cleaner can classify the failure per row.

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::RawBondRow;

/// Inline style marking a bond as eligible for downward revision. The name
/// cell renders one span per marker; the flag comes from this style, the
/// remark from that span's tooltip.
pub const REPAIR_FLAG_STYLE: &str = "color:blue";

/// How much outer HTML to keep per row for skipped-row diagnostics.
const SOURCE_SNIPPET_CHARS: usize = 240;

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("selector `{}`: {:?}", css, e))
}

/// Cell selectors shared across all rows of one parse.
struct RowSelectors {
    name: Selector,
    span: Selector,
    mov2: Selector,
    mov: Selector,
    stock_price: Selector,
    strike: Selector,
    premium: Selector,
    price2: Selector,
    bond_date: Selector,
    distance: Selector,
    market_cap: Selector,
    to_share: Selector,
    elasticity: Selector,
    expire: Selector,
    putback: Selector,
    double_bottom: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            name: sel("td.cb_name_id")?,
            span: sel("span")?,
            mov2: sel("td.cb_mov2_id")?,
            mov: sel("td.cb_mov_id")?,
            stock_price: sel("td.stock_price_id")?,
            strike: sel("td.cb_strike_id")?,
            premium: sel("td.cb_premium_id")?,
            price2: sel("td.cb_price2_id")?,
            bond_date: sel("td.bond_date_id")?,
            distance: sel("td.cb_t_id")?,
            market_cap: sel("td.market_cap")?,
            to_share: sel("td.cb_to_share")?,
            elasticity: sel("td.cb_elasticity_id")?,
            expire: sel("td.cb_BT_id")?,
            putback: sel("td.cb_AT_id")?,
            double_bottom: sel("td.cb_wa_id")?,
        })
    }
}

/// Capture every `<tr>` of the quote table. Works on the full page
/// (`table#cb_hq`) as well as on the bare tbody fragment the local cache
/// stores.
pub fn parse_quote_table(html: &str) -> Result<Vec<RawBondRow>> {
    let selectors = RowSelectors::new()?;
    let table_rows = sel("table#cb_hq tbody tr")?;
    let bare_rows = sel("tr")?;

    let doc = Html::parse_document(html);
    let captured: Vec<RawBondRow> = doc
        .select(&table_rows)
        .enumerate()
        .map(|(index, tr)| capture_row(tr, index, &selectors))
        .collect();
    if !captured.is_empty() {
        debug!("quote table: {} rows", captured.len());
        return Ok(captured);
    }

    // Cached documents hold the bare tbody fragment. The HTML5 tree builder
    // drops stray `<tr>` outside a table, so re-parse wrapped.
    let wrapped = Html::parse_document(&format!("<table><tbody>{}</tbody></table>", html));
    let captured: Vec<RawBondRow> = wrapped
        .select(&bare_rows)
        .enumerate()
        .map(|(index, tr)| capture_row(tr, index, &selectors))
        .collect();
    debug!("quote table (fragment): {} rows", captured.len());
    Ok(captured)
}

fn capture_row(row: ElementRef<'_>, index: usize, sels: &RowSelectors) -> RawBondRow {
    let attr = |name: &str| row.value().attr(name).map(str::to_string);

    let cell_text = |selector: &Selector, nth: usize| {
        row.select(selector)
            .nth(nth)
            .map(|el| el.text().collect::<String>().trim().to_string())
    };
    let cell_title = |selector: &Selector, nth: usize| {
        row.select(selector)
            .nth(nth)
            .and_then(|el| el.value().attr("title"))
            .map(|t| t.trim().to_string())
    };

    // Short-circuiting scan over the name cell's marker spans: the first
    // highlighted one decides the flag and supplies the remark.
    let mut is_repair_flag = false;
    let mut repair_flag_remark = None;
    if let Some(name_cell) = row.select(&sels.name).next() {
        if let Some(marker) = name_cell
            .select(&sels.span)
            .find(|span| span.value().attr("style") == Some(REPAIR_FLAG_STYLE))
        {
            is_repair_flag = true;
            repair_flag_remark = marker.value().attr("title").map(|t| t.trim().to_string());
        }
    }

    RawBondRow {
        index,
        source: row.html().chars().take(SOURCE_SNIPPET_CHARS).collect(),

        cb_id: attr("data-id"),
        cb_name: attr("data-cb_name"),
        cb_code: attr("data-cbcode"),
        stock_code: attr("data-stock_code"),
        stock_name: attr("data-stock_name"),
        price: attr("data-cb_price"),
        rating: attr("data-rating"),
        is_unlist: attr("data-unlist"),
        remain_amount: attr("data-remain_amount"),

        // The two movement cells share one class and differ only by
        // position: 0 = bond change, 1 = intraday arbitrage.
        cb_percent: cell_text(&sels.mov2, 0),
        arbitrage_percent: cell_text(&sels.mov2, 1),
        stock_price: cell_text(&sels.stock_price, 0),
        stock_percent: cell_text(&sels.mov, 0),
        convert_stock_price: cell_text(&sels.strike, 0),
        premium_rate: cell_text(&sels.premium, 0),
        remain_price: cell_text(&sels.price2, 1),
        issue_date: cell_text(&sels.bond_date, 0),
        date_convert_distance: cell_text(&sels.distance, 0),
        date_remain_distance: cell_text(&sels.distance, 1),
        date_return_distance: cell_text(&sels.distance, 2),
        market_cap: cell_text(&sels.market_cap, 0),
        remain_to_cap: cell_text(&sels.to_share, 0),
        pb: cell_text(&sels.elasticity, 0),
        rate_expire: cell_text(&sels.expire, 0),
        rate_return: cell_text(&sels.putback, 4),
        old_style: cell_text(&sels.double_bottom, 0),
        new_style: cell_text(&sels.double_bottom, 1),

        remain_price_tax_title: cell_title(&sels.price2, 1),
        pb_title: cell_title(&sels.elasticity, 0),

        is_repair_flag,
        repair_flag_remark,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// One realistic quote row, shaped like the live table.
    pub(crate) const ROW_HTML: &str = r#"
<tr data-id="123001" data-cb_name="测试转债" data-cbcode="113001"
    data-stock_code="sh601001" data-stock_name="测试股份" data-cb_price="102.35"
    data-rating="AA+" data-unlist="N" data-remain_amount="12.5">
  <td class="cb_name_id">
    <span>新</span>
    <span style="color:blue" title=" 已满足下修条件 ">修</span>
    <span style="color:blue" title="第二个标记">重</span>
  </td>
  <td class="cb_mov2_id">1.23%</td>
  <td class="stock_price_id">8.90</td>
  <td class="cb_mov_id">2.10%</td>
  <td class="cb_mov2_id">-0.45%</td>
  <td class="cb_strike_id">7.80</td>
  <td class="cb_premium_id">15.60%</td>
  <td class="cb_price2_id">100.00</td>
  <td class="cb_price2_id" title="税后108.23">112.40</td>
  <td class="bond_date_id">20-07-15</td>
  <td class="cb_t_id">已到</td>
  <td class="cb_t_id">3年125天</td>
  <td class="cb_t_id">回售内</td>
  <td class="market_cap">1,234,567</td>
  <td class="cb_to_share">12.3%</td>
  <td class="cb_elasticity_id" title="（转股价格/每股净资产）：1.82">1.05</td>
  <td class="cb_BT_id">2.35%</td>
  <td class="cb_AT_id">a</td>
  <td class="cb_AT_id">b</td>
  <td class="cb_AT_id">c</td>
  <td class="cb_AT_id">d</td>
  <td class="cb_AT_id">1.80%</td>
  <td class="cb_wa_id">1,180.5</td>
  <td class="cb_wa_id">1,210.0</td>
</tr>"#;

    #[test]
    fn captures_attributes_and_cells() {
        let rows = parse_quote_table(ROW_HTML).unwrap();
        assert_eq!(rows.len(), 1);
        let raw = &rows[0];

        assert_eq!(raw.cb_id.as_deref(), Some("123001"));
        assert_eq!(raw.stock_code.as_deref(), Some("sh601001"));
        assert_eq!(raw.is_unlist.as_deref(), Some("N"));

        // ordinal addressing of the shared-class movement cells
        assert_eq!(raw.cb_percent.as_deref(), Some("1.23%"));
        assert_eq!(raw.arbitrage_percent.as_deref(), Some("-0.45%"));

        // the second residual cell carries both the text and the tooltip
        assert_eq!(raw.remain_price.as_deref(), Some("112.40"));
        assert_eq!(raw.remain_price_tax_title.as_deref(), Some("税后108.23"));

        assert_eq!(raw.rate_return.as_deref(), Some("1.80%"));
        assert_eq!(raw.pb_title.as_deref(), Some("（转股价格/每股净资产）：1.82"));
        assert_eq!(raw.date_return_distance.as_deref(), Some("回售内"));
    }

    #[test]
    fn marker_scan_first_match_wins() {
        let rows = parse_quote_table(ROW_HTML).unwrap();
        assert!(rows[0].is_repair_flag);
        assert_eq!(rows[0].repair_flag_remark.as_deref(), Some("已满足下修条件"));
    }

    #[test]
    fn row_without_marker_is_not_flagged() {
        let html = ROW_HTML.replace("color:blue", "color:red");
        let rows = parse_quote_table(&html).unwrap();
        assert!(!rows[0].is_repair_flag);
        assert_eq!(rows[0].repair_flag_remark, None);
    }

    #[test]
    fn full_page_and_fragment_address_the_same_rows() {
        let page = format!("<table id=\"cb_hq\"><tbody>{}</tbody></table>", ROW_HTML);
        let from_page = parse_quote_table(&page).unwrap();
        let from_fragment = parse_quote_table(ROW_HTML).unwrap();
        assert_eq!(from_page.len(), 1);
        assert_eq!(from_page[0].cb_id, from_fragment[0].cb_id);
        assert_eq!(from_page[0].rate_return, from_fragment[0].rate_return);
    }

    #[test]
    fn missing_cells_stay_none() {
        let rows = parse_quote_table("<tr><td>表头</td></tr>").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cb_id, None);
        assert_eq!(rows[0].cb_percent, None);
        assert!(!rows[0].is_repair_flag);
    }

    #[test]
    fn parsed_fixture_cleans_into_a_record() {
        let rows = parse_quote_table(ROW_HTML).unwrap();
        let now = chrono::NaiveDate::from_ymd_opt(2022, 7, 23)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap();
        let rec = super::super::cleaner::clean_bond_row(&rows[0], now).unwrap();
        assert_eq!(rec.cb_code, "113001");
        assert_eq!(rec.remain_price_tax, 108.23);
        assert_eq!(rec.cb_to_pb, 1.82);
        assert_eq!(rec.rate_return, "1.80");
    }
}
