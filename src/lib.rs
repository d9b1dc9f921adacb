pub mod config;
pub mod dedupe;
pub mod delivery;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod scraping;
pub mod utils;
pub mod window;

use std::time::Duration;

use anyhow::Context;
use log::warn;

use config::AppConfig;
use delivery::{FileDelivery, SmtpDelivery};
use pipeline::AggregationPipeline;
use report::{HtmlReport, ReportRenderer};

/// Wires collectors, renderer and deliveries from configuration.
///
/// The report is always saved to the output directory; it is also mailed
/// when `send_email` is set and a recipient is configured.
pub fn build_pipeline(config: &AppConfig, send_email: bool) -> anyhow::Result<AggregationPipeline> {
    let renderer: Box<dyn ReportRenderer> = match &config.template_path {
        Some(path) => Box::new(
            HtmlReport::from_template_file(path).context("unable to load report template")?,
        ),
        None => Box::new(HtmlReport::default()),
    };

    let mut pipeline = AggregationPipeline::new(scraping::active_sources(config), renderer)
        .with_weekend_policy(config.weekend_policy)
        .with_dedupe_policy(config.dedupe_policy)
        .with_collector_timeout(Duration::from_secs(config.collector_timeout_secs))
        .with_delivery(Box::new(FileDelivery::new(config.output_dir())));

    if send_email {
        if config.email_enabled() {
            let smtp = SmtpDelivery::from_config(config).context("email delivery misconfigured")?;
            pipeline = pipeline.with_delivery(Box::new(smtp));
        } else {
            warn!("no recipient configured; the report will only be saved to disk");
        }
    }

    Ok(pipeline)
}
