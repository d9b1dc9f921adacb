use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::base::{self, PageFetcher};
use super::EventSource;
use crate::models::{DateWindow, RawListing};

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li [data-testid='search-event']").expect("eventbrite card selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3").expect("eventbrite title selector"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p:nth-of-type(1)").expect("eventbrite date selector"));
static LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p:nth-of-type(2)").expect("eventbrite location selector"));
static PRICE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[class*='priceWrapper'] p").expect("eventbrite price selector")
});
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.event-card-link").expect("eventbrite link selector"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.event-card-image").expect("eventbrite image selector"));

// Older search pages render a different card markup.
static LEGACY_CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.search-event-card-wrapper").expect("eventbrite legacy card selector")
});
static LEGACY_TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.eds-is-hidden-accessible").expect("eventbrite legacy title selector")
});
static LEGACY_DATE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".eds-event-card-content__sub-title").expect("eventbrite legacy date selector")
});
static LEGACY_LOCATION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[data-subcontent-key='location']")
        .expect("eventbrite legacy location selector")
});
static LEGACY_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.eds-event-card-content__action-link")
        .expect("eventbrite legacy link selector")
});
static LEGACY_IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("img.eds-event-card-content__image").expect("eventbrite legacy image selector")
});

/// Eventbrite search results for one city and search term, fetched over
/// plain HTTP.
pub struct Eventbrite {
    name: String,
    base_url: String,
    max_pages: usize,
    fetcher: Arc<dyn PageFetcher>,
}

impl Eventbrite {
    pub fn new(
        domain: &str,
        city: &str,
        term: &str,
        max_pages: usize,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            name: format!("eventbrite/{term}"),
            base_url: format!("https://{domain}/d/{city}/{term}/"),
            max_pages: max_pages.max(1),
            fetcher,
        }
    }

    pub fn search_url(&self, window: &DateWindow, page: usize) -> Result<String> {
        let start = window.start.format("%Y-%m-%d").to_string();
        let end = window.end.format("%Y-%m-%d").to_string();
        let mut url = reqwest::Url::parse_with_params(
            &self.base_url,
            [("start_date", start.as_str()), ("end_date", end.as_str())],
        )
        .with_context(|| format!("invalid search url {}", self.base_url))?;
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        Ok(url.into())
    }

    pub(crate) fn parse_document(&self, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for card in document.select(&CARD_SELECTOR) {
            let mut listing = RawListing::new();
            base::put(&mut listing, "title", base::first_text(&card, &TITLE_SELECTOR));
            base::put(&mut listing, "date", base::first_text(&card, &DATE_SELECTOR));
            base::put(
                &mut listing,
                "location",
                base::first_text(&card, &LOCATION_SELECTOR),
            );
            base::put(&mut listing, "price", base::first_text(&card, &PRICE_SELECTOR));
            base::put(
                &mut listing,
                "url",
                base::absolute_url(
                    &self.base_url,
                    base::first_attr(&card, &LINK_SELECTOR, "href"),
                ),
            );
            base::put(
                &mut listing,
                "image_url",
                base::first_attr(&card, &IMAGE_SELECTOR, "src"),
            );
            listings.push(listing);
        }

        for card in document.select(&LEGACY_CARD_SELECTOR) {
            let mut listing = RawListing::new();
            base::put(
                &mut listing,
                "title",
                base::first_text(&card, &LEGACY_TITLE_SELECTOR),
            );
            base::put(
                &mut listing,
                "date",
                base::first_text(&card, &LEGACY_DATE_SELECTOR),
            );
            // "Online event • Toronto, ON" -> "Toronto, ON"
            let location = base::first_text(&card, &LEGACY_LOCATION_SELECTOR).and_then(|text| {
                text.split('•')
                    .next_back()
                    .map(base::clean_text)
                    .filter(|part| !part.is_empty())
            });
            base::put(&mut listing, "location", location);
            base::put(
                &mut listing,
                "url",
                base::absolute_url(
                    &self.base_url,
                    base::first_attr(&card, &LEGACY_LINK_SELECTOR, "href"),
                ),
            );
            base::put(
                &mut listing,
                "image_url",
                base::first_attr(&card, &LEGACY_IMAGE_SELECTOR, "src"),
            );
            listings.push(listing);
        }

        listings
    }
}

impl EventSource for Eventbrite {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.base_url
    }

    /// Walks result pages until one adds no listing we have not seen yet.
    /// A failed first page fails the collector; a later one just ends the walk.
    fn collect(&self, window: &DateWindow) -> Result<Vec<RawListing>> {
        let mut listings = Vec::new();
        let mut seen_urls = HashSet::new();

        for page in 1..=self.max_pages {
            let url = self.search_url(window, page)?;
            info!("{}: fetching {url}", self.name);
            let html = match self.fetcher.fetch_html(&url) {
                Ok(html) => html,
                Err(err) if page > 1 => {
                    warn!(
                        "{}: stopping at page {page}, keeping {} listings: {err:#}",
                        self.name,
                        listings.len()
                    );
                    break;
                }
                Err(err) => return Err(err),
            };

            let mut added = 0;
            for listing in self.parse_document(&html) {
                let key = listing.get("url").unwrap_or_default().to_string();
                if key.is_empty() || seen_urls.insert(key) {
                    listings.push(listing);
                    added += 1;
                }
            }
            debug!("{}: page {page} added {added} listings", self.name);
            if added == 0 {
                break;
            }
        }

        base::fail_if_empty(&self.name, listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::base::HttpFetcher;
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    const SAMPLE_HTML: &str = r#"
    <ul class="search-results">
        <li>
            <div data-testid="search-event">
                <a class="event-card-link" href="https://www.eventbrite.ca/e/jazz-night-tickets-101">
                    <img class="event-card-image" src="https://img.evbuc.com/jazz.jpg">
                </a>
                <section class="event-card-details">
                    <h3>Jazz Night at The Rex</h3>
                    <p>Fri, Jun 14, 9:00 PM</p>
                    <p>The Rex Hotel Jazz &amp; Blues Bar</p>
                    <div class="Stack_root priceWrapper_abc123"><p>From CA$25.00</p></div>
                </section>
            </div>
        </li>
        <li>
            <div data-testid="search-event">
                <a class="event-card-link" href="/e/comedy-showcase-202"></a>
                <section class="event-card-details">
                    <h3>  Comedy   Showcase </h3>
                    <p>Saturday • 8:00 PM</p>
                </section>
            </div>
        </li>
    </ul>
    <div class="search-event-card-wrapper">
        <div class="eds-is-hidden-accessible">Harbourfront Market</div>
        <div class="eds-event-card-content__sub-title">Sun, Jun 16, 11:00 AM</div>
        <div data-subcontent-key="location">Harbourfront Centre • Toronto, ON</div>
        <a class="eds-event-card-content__action-link" href="https://www.eventbrite.ca/e/market-303">Market</a>
    </div>
    "#;

    fn collector() -> Eventbrite {
        Eventbrite::new(
            "www.eventbrite.ca",
            "canada--toronto",
            "events",
            3,
            Arc::new(HttpFetcher::new(None, None)),
        )
    }

    #[test]
    fn parses_current_and_legacy_cards() {
        let listings = collector().parse_document(SAMPLE_HTML);
        assert_eq!(listings.len(), 3);

        let jazz = &listings[0];
        assert_eq!(jazz.get("title"), Some("Jazz Night at The Rex"));
        assert_eq!(jazz.get("date"), Some("Fri, Jun 14, 9:00 PM"));
        assert_eq!(jazz.get("location"), Some("The Rex Hotel Jazz & Blues Bar"));
        assert_eq!(jazz.get("price"), Some("From CA$25.00"));
        assert_eq!(
            jazz.get("url"),
            Some("https://www.eventbrite.ca/e/jazz-night-tickets-101")
        );
        assert_eq!(jazz.get("image_url"), Some("https://img.evbuc.com/jazz.jpg"));

        let comedy = &listings[1];
        assert_eq!(comedy.get("title"), Some("Comedy Showcase"));
        assert_eq!(
            comedy.get("url"),
            Some("https://www.eventbrite.ca/e/comedy-showcase-202")
        );
        assert_eq!(comedy.get("price"), None);
        assert_eq!(comedy.get("image_url"), None);

        let market = &listings[2];
        assert_eq!(market.get("title"), Some("Harbourfront Market"));
        assert_eq!(market.get("location"), Some("Toronto, ON"));
        assert_eq!(
            market.get("url"),
            Some("https://www.eventbrite.ca/e/market-303")
        );
    }

    /// Serves canned pages by url; any other url is an HTTP error.
    struct CannedPages(HashMap<String, String>);

    impl PageFetcher for CannedPages {
        fn fetch_html(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("non-success status for {url}"))
        }
    }

    fn canned_collector(pages: &[(usize, &str)]) -> (Eventbrite, DateWindow) {
        let window = DateWindow::from_friday(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        let urls = collector();
        let pages = pages
            .iter()
            .map(|(page, html)| (urls.search_url(&window, *page).expect("url"), html.to_string()))
            .collect();
        let collector = Eventbrite::new(
            "www.eventbrite.ca",
            "canada--toronto",
            "events",
            3,
            Arc::new(CannedPages(pages)),
        );
        (collector, window)
    }

    #[test]
    fn later_page_failure_keeps_earlier_pages() {
        let (collector, window) = canned_collector(&[(1, SAMPLE_HTML)]);
        let listings = collector.collect(&window).expect("first page collected");
        assert_eq!(listings.len(), 3);
    }

    #[test]
    fn first_page_failure_fails_the_collector() {
        let (collector, window) = canned_collector(&[]);
        let err = collector.collect(&window).expect_err("no pages served");
        assert!(format!("{err:#}").contains("non-success status"));
    }

    #[test]
    fn repeated_page_ends_pagination() {
        let (collector, window) = canned_collector(&[(1, SAMPLE_HTML), (2, SAMPLE_HTML)]);
        assert_eq!(collector.collect(&window).expect("collected").len(), 3);
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(collector()
            .parse_document("<html><body><p>Access denied</p></body></html>")
            .is_empty());
    }

    #[test]
    fn builds_window_search_urls() {
        let window = DateWindow::from_friday(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        let collector = collector();
        assert_eq!(collector.name(), "eventbrite/events");
        assert_eq!(
            collector.search_url(&window, 1).expect("url"),
            "https://www.eventbrite.ca/d/canada--toronto/events/?start_date=2024-06-14&end_date=2024-06-16"
        );
        assert_eq!(
            collector.search_url(&window, 2).expect("url"),
            "https://www.eventbrite.ca/d/canada--toronto/events/?start_date=2024-06-14&end_date=2024-06-16&page=2"
        );
    }
}
