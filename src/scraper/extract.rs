use std::collections::HashMap;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::browser::driver::PageDriver;
use crate::scraper::task::ExtractedRoom;

/// Selector cascade for the room table. The target site has shipped several
/// generations of this markup; first match wins. The trailing entries scan
/// for any table whose class hints at a room listing.
const TABLE_SELECTORS: &[&str] = &[
    "#hprt-table",
    ".hprt-table",
    ".roomstable",
    ".roomsList",
    "table[class*='room']",
    "table[class*='hprt']",
];

/// Marker the page renders when the hotel has no rooms for the stay dates.
const NO_AVAILABILITY_SELECTOR: &str = "#no_availability_msg";

/// Per-row quantity selector whose id embeds the site-assigned room id.
const ROOM_SELECT: &str = "select[id^='hprt_nos_select_']";

/// Room id pattern inside the quantity select's element id.
const SELECT_ID_PATTERN: &str = r"hprt_nos_select_(\d+)_";

/// Selector cascades per field; first match wins, misses fall through.
const NAME_SELECTORS: &[&str] = &[".hprt-roomtype-icon-link", ".hprt-roomtype-link", ".room-name"];
const PRICE_SELECTORS: &[&str] = &[
    ".prco-valign-middle-helper",
    ".bui-price-display__value",
    ".prc-no-css",
];

/// Name used when a row has a recoverable remaining-count but no name.
const DEFAULT_ROOM_NAME: &str = "Standard Room";

/// Hotel name cascade, with the document title as a last resort.
const HOTEL_NAME_SELECTORS: &[&str] = &[
    "h2.pp-header__title",
    "#hp_hotel_name",
    ".hp__hotel-name",
    ".hotel-name",
    "h2.d2fee87262",
];

/// What one page yielded.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Room table located; rows extracted and deduplicated
    Found(Vec<ExtractedRoom>),

    /// Explicit no-availability marker present
    NoAvailability,

    /// Neither table nor marker present - the layout may have changed
    TableNotFound,
}

/// One raw table row before deduplication.
#[derive(Debug, Clone)]
struct RowData {
    identifier: Option<String>,
    name: Option<String>,
    rooms_left: u32,
    price: Option<f64>,
}

/// Locate the room table and extract its rows.
///
/// Row-level failures are logged and skip only that row; a missing field is
/// a default, never an error. The caller must already have navigated the
/// page.
pub async fn extract_rooms(page: &dyn PageDriver) -> Result<PageOutcome> {
    let Some(table_selector) = locate_table(page).await? else {
        if page.element_count(NO_AVAILABILITY_SELECTOR).await? > 0 {
            debug!("No room table, but the no-availability marker is present");
            return Ok(PageOutcome::NoAvailability);
        }
        warn!("Neither the room table nor the no-availability marker was found");
        return Ok(PageOutcome::TableNotFound);
    };
    debug!("Room table matched: {}", table_selector);

    let select_id_pattern =
        Regex::new(SELECT_ID_PATTERN).context("Invalid room id pattern")?;

    let row_base = format!("{} > tbody > tr", table_selector);
    let row_count = page.element_count(&row_base).await?;
    debug!("{} room rows found", row_count);

    let mut rows = Vec::with_capacity(row_count);
    for row_number in 1..=row_count {
        // CSS nth-child is 1-based
        let row_selector = format!("{}:nth-child({})", row_base, row_number);
        match read_row(page, &row_selector, &select_id_pattern).await {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => debug!("Row {} had no name and no rooms left, discarded", row_number),
            Err(e) => warn!("Row {} skipped: {:#}", row_number, e),
        }
    }

    Ok(PageOutcome::Found(collapse_rows(rows)))
}

/// Scrape the hotel's display name, falling back to the document title
/// (split at `|`, the site's usual `<name> | <site>` form).
pub async fn hotel_name(page: &dyn PageDriver) -> Result<Option<String>> {
    if let Some(name) = first_text(page, "", HOTEL_NAME_SELECTORS).await? {
        return Ok(Some(name));
    }

    let title = page.title().await?;
    if let Some((name, _)) = title.split_once('|') {
        let name = name.trim();
        if !name.is_empty() {
            return Ok(Some(name.to_string()));
        }
    }

    Ok(None)
}

async fn locate_table(page: &dyn PageDriver) -> Result<Option<&'static str>> {
    for selector in TABLE_SELECTORS {
        if page.element_count(selector).await? > 0 {
            return Ok(Some(*selector));
        }
    }
    Ok(None)
}

async fn read_row(
    page: &dyn PageDriver,
    row_selector: &str,
    select_id_pattern: &Regex,
) -> Result<Option<RowData>> {
    let identifier = row_identifier(page, row_selector, select_id_pattern).await?;
    let name = first_text(page, row_selector, NAME_SELECTORS).await?;
    let rooms_left = max_select_value(page, row_selector).await?;
    let price = first_text(page, row_selector, PRICE_SELECTORS)
        .await?
        .and_then(|text| clean_price(&text));

    // A row carrying neither a name nor a positive count is noise
    if name.is_none() && rooms_left == 0 {
        return Ok(None);
    }

    Ok(Some(RowData {
        identifier,
        name,
        rooms_left,
        price,
    }))
}

/// Recover the site-assigned room id for a row: the `data-block-id`
/// attribute first (prefix before the rate-plan suffix), then the embedded
/// quantity select's id pattern.
async fn row_identifier(
    page: &dyn PageDriver,
    row_selector: &str,
    select_id_pattern: &Regex,
) -> Result<Option<String>> {
    if let Some(block_id) = page.attr(row_selector, "data-block-id").await? {
        if let Some(room_id) = block_id.split('_').next() {
            if !room_id.is_empty() {
                return Ok(Some(room_id.to_string()));
            }
        }
    }

    let select_selector = format!("{} {}", row_selector, ROOM_SELECT);
    if let Some(select_id) = page.attr(&select_selector, "id").await? {
        if let Some(captures) = select_id_pattern.captures(&select_id) {
            return Ok(Some(captures[1].to_string()));
        }
    }

    Ok(None)
}

/// First non-empty text among the cascade's matches, scoped to a row
/// selector (or the whole page when the scope is empty).
async fn first_text(
    page: &dyn PageDriver,
    scope: &str,
    selectors: &[&str],
) -> Result<Option<String>> {
    for selector in selectors {
        let scoped = if scope.is_empty() {
            (*selector).to_string()
        } else {
            format!("{} {}", scope, selector)
        };
        if let Some(text) = page.text(&scoped).await? {
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
    Ok(None)
}

/// Remaining-count for a row: the maximum numeric value among the quantity
/// select's options. Zero when the select or its options are missing.
async fn max_select_value(page: &dyn PageDriver, row_selector: &str) -> Result<u32> {
    let option_selector = format!("{} {} option", row_selector, ROOM_SELECT);
    let values = page.attr_all(&option_selector, "value").await?;

    Ok(values
        .iter()
        .filter_map(|value| value.trim().parse::<u32>().ok())
        .max()
        .unwrap_or(0))
}

/// Normalize a raw price string: strip everything but digits and
/// separators, resolve the decimal separator, parse. `None` when nothing
/// parseable remains.
fn clean_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // Whichever separator appears last is the decimal one
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|price| *price > 0.0)
}

/// Collapse rows sharing a room identifier into one room, keeping the
/// maximum observed remaining-count and the minimum observed price. Rows
/// without an identifier are kept un-deduplicated and logged. First-seen
/// order is preserved.
fn collapse_rows(rows: Vec<RowData>) -> Vec<ExtractedRoom> {
    let mut rooms: Vec<ExtractedRoom> = Vec::with_capacity(rows.len());
    let mut by_identifier: HashMap<String, usize> = HashMap::new();

    for row in rows {
        match &row.identifier {
            Some(identifier) => {
                if let Some(&slot) = by_identifier.get(identifier) {
                    let existing = &mut rooms[slot];
                    existing.rooms_left = existing.rooms_left.max(row.rooms_left);
                    existing.price = match (existing.price, row.price) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    if existing.name == DEFAULT_ROOM_NAME {
                        if let Some(name) = row.name {
                            existing.name = name;
                        }
                    }
                    continue;
                }
                by_identifier.insert(identifier.clone(), rooms.len());
            }
            None => {
                warn!("Room row without a recoverable identifier kept un-deduplicated");
            }
        }

        rooms.push(ExtractedRoom {
            identifier: row.identifier,
            name: row.name.unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string()),
            rooms_left: row.rooms_left,
            price: row.price,
        });
    }

    rooms
}
