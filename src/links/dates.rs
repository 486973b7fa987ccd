use chrono::{DateTime, Duration, Local, NaiveDate};
use tracing::{debug, warn};
use url::Url;

/// The stay window every link is rewritten to: check-in plus a one-night
/// check-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayWindow {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
}

impl StayWindow {
    /// Compute the scrape horizon from the current local time.
    ///
    /// At or past `cutoff_hour` (default 21) the site has usually closed
    /// same-day sales, so check-in shifts to tomorrow; before it, check-in
    /// is today. Check-out is always the following day.
    pub fn from_now(now: DateTime<Local>, cutoff_hour: u32) -> Self {
        use chrono::Timelike;

        let mut checkin = now.date_naive();
        if now.hour() >= cutoff_hour {
            debug!(
                "Local hour {} is past the {}:00 cutoff, shifting check-in to tomorrow",
                now.hour(),
                cutoff_hour
            );
            checkin += Duration::days(1);
        }

        Self {
            checkin,
            checkout: checkin + Duration::days(1),
        }
    }
}

/// Rewrite the `checkin`/`checkout` query parameters of every link to the
/// given stay window, in `YYYY-MM-DD` form. All other query parameters are
/// preserved. Malformed URLs are logged and dropped; they never abort the
/// batch. Output ordering matches input ordering - sharding depends on it.
pub fn rewrite_links(raw_links: &[String], window: &StayWindow) -> Vec<Url> {
    let checkin = window.checkin.format("%Y-%m-%d").to_string();
    let checkout = window.checkout.format("%Y-%m-%d").to_string();

    let mut updated = Vec::with_capacity(raw_links.len());

    for link in raw_links {
        match Url::parse(link) {
            Ok(mut url) => {
                set_stay_params(&mut url, &checkin, &checkout);
                updated.push(url);
            }
            Err(e) => {
                warn!("Skipping malformed hotel link {}: {}", link, e);
            }
        }
    }

    updated
}

fn set_stay_params(url: &mut Url, checkin: &str, checkout: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "checkin" && key != "checkout")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair("checkin", checkin);
    pairs.append_pair("checkout", checkout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn before_cutoff_checkin_is_today() {
        let window = StayWindow::from_now(local(2025, 4, 17, 20, 0), 21);
        assert_eq!(window.checkin, NaiveDate::from_ymd_opt(2025, 4, 17).unwrap());
        assert_eq!(window.checkout, NaiveDate::from_ymd_opt(2025, 4, 18).unwrap());
    }

    #[test]
    fn past_cutoff_checkin_is_tomorrow() {
        let window = StayWindow::from_now(local(2025, 4, 17, 21, 30), 21);
        assert_eq!(window.checkin, NaiveDate::from_ymd_opt(2025, 4, 18).unwrap());
        assert_eq!(window.checkout, NaiveDate::from_ymd_opt(2025, 4, 19).unwrap());
    }

    #[test]
    fn rewrites_stale_dates_and_preserves_other_params() {
        let window = StayWindow {
            checkin: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2025, 5, 11).unwrap(),
        };
        let raw = vec![
            "https://example.com/hotel/tr/grand.html?checkin=2025-04-17&checkout=2025-04-18&group_adults=2".to_string(),
        ];

        let updated = rewrite_links(&raw, &window);
        assert_eq!(updated.len(), 1);

        let query: Vec<(String, String)> = updated[0]
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("checkin".to_string(), "2025-05-10".to_string())));
        assert!(query.contains(&("checkout".to_string(), "2025-05-11".to_string())));
        assert!(query.contains(&("group_adults".to_string(), "2".to_string())));
        // No duplicated date params
        assert_eq!(query.iter().filter(|(k, _)| k == "checkin").count(), 1);
    }

    #[test]
    fn adds_dates_to_links_without_query() {
        let window = StayWindow {
            checkin: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2025, 5, 11).unwrap(),
        };
        let raw = vec!["https://example.com/hotel/tr/plain.html".to_string()];

        let updated = rewrite_links(&raw, &window);
        assert_eq!(
            updated[0].as_str(),
            "https://example.com/hotel/tr/plain.html?checkin=2025-05-10&checkout=2025-05-11"
        );
    }

    #[test]
    fn malformed_links_are_dropped_and_order_preserved() {
        let window = StayWindow {
            checkin: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2025, 5, 11).unwrap(),
        };
        let raw = vec![
            "https://example.com/hotel/a.html".to_string(),
            "not a url at all".to_string(),
            "https://example.com/hotel/b.html".to_string(),
        ];

        let updated = rewrite_links(&raw, &window);
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].path(), "/hotel/a.html");
        assert_eq!(updated[1].path(), "/hotel/b.html");
    }
}
