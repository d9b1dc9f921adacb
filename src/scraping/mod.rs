pub mod base;
pub mod eventbrite;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::{DateWindow, RawListing};

use base::{HttpFetcher, PageFetcher};

/// One site-specific collector. Implementations block until they have the
/// listings for `window` or give up with an error.
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;
    fn url(&self) -> &str;
    fn collect(&self, window: &DateWindow) -> anyhow::Result<Vec<RawListing>>;
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub url: String,
}

/// Builds the enabled collectors, in the order configured.
pub fn active_sources(config: &AppConfig) -> Vec<Arc<dyn EventSource>> {
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(
        config.user_agent.clone(),
        config.proxy_url.clone(),
    ));
    config
        .search_terms
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .map(|term| {
            Arc::new(eventbrite::Eventbrite::new(
                &config.eventbrite_domain,
                &config.city,
                term,
                config.max_pages,
                Arc::clone(&fetcher),
            )) as Arc<dyn EventSource>
        })
        .collect()
}

pub fn list_sources(sources: &[Arc<dyn EventSource>]) -> Vec<SourceInfo> {
    sources
        .iter()
        .map(|source| SourceInfo {
            name: source.name().to_string(),
            url: source.url().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_source_per_search_term() {
        let config = AppConfig {
            search_terms: vec!["music".to_string(), " ".to_string(), "comedy".to_string()],
            ..AppConfig::default()
        };
        let sources = active_sources(&config);
        let names: Vec<_> = list_sources(&sources)
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["eventbrite/music", "eventbrite/comedy"]);
    }
}
