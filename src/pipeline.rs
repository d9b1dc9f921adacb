use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::dedupe::{dedupe, DedupePolicy, DEFAULT_DEDUPE_POLICY};
use crate::delivery::{Delivery, DeliveryReceipt};
use crate::models::{DateWindow, EventRecord, RawListing};
use crate::normalize::Normalizer;
use crate::report::{Report, ReportError, ReportRenderer};
use crate::scraping::EventSource;
use crate::window::{self, WeekendPolicy};

const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("report rendering failed: {0}")]
    Render(#[from] ReportError),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub listings: usize,
    pub kept: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub window: DateWindow,
    pub sources: Vec<SourceReport>,
    pub discarded: usize,
    pub duplicates: usize,
    pub events: usize,
}

impl RunSummary {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|source| source.error.is_some())
    }
}

/// Deduplicated events for one window, ready to render.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub window: DateWindow,
    pub events: Vec<EventRecord>,
    pub summary: RunSummary,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub report: Report,
    pub receipts: Vec<DeliveryReceipt>,
    pub delivery_failures: Vec<(String, String)>,
}

/// Resolves the weekend, runs every collector one after another, then
/// normalizes, deduplicates, renders and delivers.
///
/// A collector that errors, panics, times out or comes back empty adds
/// nothing; the run always carries on to the report.
pub struct AggregationPipeline {
    sources: Vec<Arc<dyn EventSource>>,
    renderer: Box<dyn ReportRenderer>,
    deliveries: Vec<Box<dyn Delivery>>,
    weekend_policy: WeekendPolicy,
    dedupe_policy: DedupePolicy,
    collector_timeout: Duration,
}

impl AggregationPipeline {
    pub fn new(sources: Vec<Arc<dyn EventSource>>, renderer: Box<dyn ReportRenderer>) -> Self {
        Self {
            sources,
            renderer,
            deliveries: Vec::new(),
            weekend_policy: WeekendPolicy::default(),
            dedupe_policy: DEFAULT_DEDUPE_POLICY,
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
        }
    }

    pub fn with_delivery(mut self, delivery: Box<dyn Delivery>) -> Self {
        self.deliveries.push(delivery);
        self
    }

    pub fn with_weekend_policy(mut self, policy: WeekendPolicy) -> Self {
        self.weekend_policy = policy;
        self
    }

    pub fn with_dedupe_policy(mut self, policy: DedupePolicy) -> Self {
        self.dedupe_policy = policy;
        self
    }

    pub fn with_collector_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    pub fn window(&self, today: NaiveDate) -> DateWindow {
        window::resolve(today, self.weekend_policy)
    }

    pub async fn aggregate(&self, today: NaiveDate) -> Aggregation {
        let window = self.window(today);
        let normalizer = Normalizer::new(today);
        info!(
            "collecting events for {window} from {} sources",
            self.sources.len()
        );

        let mut combined = Vec::new();
        let mut reports = Vec::with_capacity(self.sources.len());
        let mut discarded = 0;

        for source in &self.sources {
            let name = source.name().to_string();
            match self.collect_from(source, &window).await {
                Ok(listings) => {
                    let (mut records, dropped) = normalizer.normalize_all(&listings, &name);
                    if dropped > 0 {
                        info!("{name}: discarded {dropped} listings without title or url");
                    }
                    info!("{name}: {} listings, {} kept", listings.len(), records.len());
                    discarded += dropped;
                    reports.push(SourceReport {
                        name,
                        listings: listings.len(),
                        kept: records.len(),
                        error: None,
                    });
                    combined.append(&mut records);
                }
                Err(err) => {
                    warn!("{name}: skipped, {err}");
                    reports.push(SourceReport {
                        name,
                        listings: 0,
                        kept: 0,
                        error: Some(err),
                    });
                }
            }
        }

        let before = combined.len();
        let events = dedupe(combined, self.dedupe_policy);
        let duplicates = before - events.len();
        info!(
            "{} unique events for {window} ({duplicates} duplicates removed)",
            events.len()
        );

        Aggregation {
            window,
            summary: RunSummary {
                window,
                sources: reports,
                discarded,
                duplicates,
                events: events.len(),
            },
            events,
        }
    }

    async fn collect_from(
        &self,
        source: &Arc<dyn EventSource>,
        window: &DateWindow,
    ) -> Result<Vec<RawListing>, String> {
        let source = Arc::clone(source);
        let window = *window;
        let task = tokio::task::spawn_blocking(move || source.collect(&window));

        match tokio::time::timeout(self.collector_timeout, task).await {
            Err(_) => Err(format!(
                "timed out after {}s",
                self.collector_timeout.as_secs_f32()
            )),
            Ok(Err(join_err)) => Err(format!("collector crashed: {join_err}")),
            Ok(Ok(Err(err))) => Err(format!("{err:#}")),
            Ok(Ok(Ok(listings))) if listings.is_empty() => Err("returned no listings".to_string()),
            Ok(Ok(Ok(listings))) => Ok(listings),
        }
    }

    pub fn render(&self, aggregation: &Aggregation) -> Result<Report, PipelineError> {
        Ok(self
            .renderer
            .render(&aggregation.window, &aggregation.events)?)
    }

    /// Hands the report to every delivery; one failing does not stop the rest.
    pub fn deliver(&self, report: &Report) -> (Vec<DeliveryReceipt>, Vec<(String, String)>) {
        let mut receipts = Vec::new();
        let mut failures = Vec::new();
        for delivery in &self.deliveries {
            match delivery.deliver(report) {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => {
                    warn!("delivery via {} failed: {err}", delivery.describe());
                    failures.push((delivery.describe(), err.to_string()));
                }
            }
        }
        (receipts, failures)
    }

    pub async fn run(&self, today: NaiveDate) -> Result<RunOutcome, PipelineError> {
        let aggregation = self.aggregate(today).await;
        let report = self.render(&aggregation)?;
        let (receipts, delivery_failures) = self.deliver(&report);
        Ok(RunOutcome {
            summary: aggregation.summary,
            report,
            receipts,
            delivery_failures,
        })
    }
}
