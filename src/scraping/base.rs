use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use scraper::{ElementRef, Selector};

use crate::models::RawListing;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

/// Copies `value` into `listing` under `key` when it is present.
pub fn put(listing: &mut RawListing, key: &str, value: Option<String>) {
    if let Some(value) = value {
        listing.insert(key, value);
    }
}

/// Blocking HTTP client shared by the collectors of one run.
///
/// The underlying client is built on first use so it is created (and later
/// used) from the collector's worker thread.
pub struct HttpFetcher {
    user_agent: String,
    proxy: Option<String>,
    timeout: Duration,
    client: OnceCell<Client>,
}

impl HttpFetcher {
    pub fn new(user_agent: Option<String>, proxy: Option<String>) -> Self {
        Self {
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            proxy,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| {
            let mut builder = Client::builder()
                .timeout(self.timeout)
                .user_agent(self.user_agent.as_str());
            if let Some(proxy) = &self.proxy {
                let proxy = reqwest::Proxy::all(proxy)
                    .with_context(|| format!("invalid proxy url {proxy}"))?;
                builder = builder.proxy(proxy);
            }
            builder.build().context("unable to build http client")
        })
    }

}

/// Anything that can hand back the HTML behind a url.
pub trait PageFetcher: Send + Sync {
    fn fetch_html(&self, url: &str) -> Result<String>;
}

impl PageFetcher for HttpFetcher {
    fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client()?
            .get(url)
            .send()
            .with_context(|| format!("request failed for {url}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status for {url}"))?;
        response
            .text()
            .with_context(|| format!("unable to read response body for {url}"))
    }
}

pub fn fail_if_empty<T>(source: &str, listings: Vec<T>) -> Result<Vec<T>> {
    if listings.is_empty() {
        Err(anyhow!("no events scraped for {source}"))
    } else {
        Ok(listings)
    }
}
