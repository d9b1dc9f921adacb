use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::models::{DateWindow, EventRecord};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unable to read template {path:?}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
    #[error("unable to serialize events: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A finished, self-contained document ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub subject: String,
    pub file_name: String,
    pub html: String,
    pub event_count: usize,
}

pub trait ReportRenderer: Send + Sync {
    fn render(&self, window: &DateWindow, events: &[EventRecord]) -> Result<Report, ReportError>;
}

const ROWS_PLACEHOLDER: &str = "{{rows}}";

const DEFAULT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; width: 100%; }
td, th { border-bottom: 1px solid #ddd; padding: 6px; text-align: left; vertical-align: top; }
img { max-width: 120px; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<p>{{window}} &middot; {{count}} events</p>
<p>
<input id="filter" type="search" placeholder="Filter events">
<button id="export" type="button">Export CSV</button>
</p>
<table id="events">
<thead><tr><th></th><th>Event</th><th>When</th><th>Price</th><th>Where</th><th>Source</th></tr></thead>
<tbody>
{{rows}}
</tbody>
</table>
<script type="application/json" id="event-data">{{data}}</script>
<script>
const events = JSON.parse(document.getElementById("event-data").textContent);
document.getElementById("filter").addEventListener("input", (e) => {
  const needle = e.target.value.toLowerCase();
  document.querySelectorAll("#events tbody tr").forEach((row) => {
    row.hidden = !row.textContent.toLowerCase().includes(needle);
  });
});
document.getElementById("export").addEventListener("click", () => {
  const cols = ["title", "date", "price", "location", "url", "source"];
  const quote = (v) => '"' + String(v).replace(/"/g, '""') + '"';
  const lines = [cols.join(",")].concat(events.map((ev) => cols.map((c) => quote(ev[c])).join(",")));
  const link = document.createElement("a");
  link.href = URL.createObjectURL(new Blob([lines.join("\n")], { type: "text/csv" }));
  link.download = "events.csv";
  link.click();
});
</script>
</body>
</html>
"##;

/// Fills an HTML template with one table row per event plus the same events
/// as embedded JSON for the filter/export script.
pub struct HtmlReport {
    template: String,
}

impl Default for HtmlReport {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl HtmlReport {
    pub fn with_template(template: String) -> Result<Self, ReportError> {
        if !template.contains(ROWS_PLACEHOLDER) {
            return Err(ReportError::MissingPlaceholder(ROWS_PLACEHOLDER));
        }
        Ok(Self { template })
    }

    pub fn from_template_file(path: &Path) -> Result<Self, ReportError> {
        let template = fs::read_to_string(path).map_err(|source| ReportError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_template(template)
    }
}

impl ReportRenderer for HtmlReport {
    fn render(&self, window: &DateWindow, events: &[EventRecord]) -> Result<Report, ReportError> {
        let title = format!("Weekend events {}", window);
        let rows = events.iter().map(render_row).collect::<Vec<_>>().join("\n");
        let data = json_for_script(&export_rows(events))?;

        let html = fill(
            &self.template,
            &[
                ("title", escape_html(&title)),
                ("window", escape_html(&window_label(window))),
                ("count", events.len().to_string()),
                ("rows", rows),
                ("data", data),
            ],
        );

        Ok(Report {
            subject: title,
            file_name: format!("weekend_events_{}_{}.html", window.start, window.end),
            html,
            event_count: events.len(),
        })
    }
}

#[derive(Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    title: &'a str,
    date: String,
    price: &'a str,
    location: &'a str,
    image_url: &'a str,
    url: &'a str,
    source: &'a str,
}

fn export_rows(events: &[EventRecord]) -> Vec<ExportRow<'_>> {
    events
        .iter()
        .map(|event| ExportRow {
            id: &event.id,
            title: &event.title,
            date: event.date.to_string(),
            price: &event.price,
            location: &event.location,
            image_url: &event.image_url,
            url: &event.url,
            source: &event.source,
        })
        .collect()
}

fn window_label(window: &DateWindow) -> String {
    format!(
        "{} – {}",
        window.start.format("%A %B %-d"),
        window.end.format("%A %B %-d, %Y")
    )
}

fn render_row(event: &EventRecord) -> String {
    let image = if event.has_image() {
        format!(
            r#"<img src="{}" alt="" loading="lazy">"#,
            escape_html(&event.image_url)
        )
    } else {
        String::new()
    };
    format!(
        r#"<tr id="event-{id}"><td>{image}</td><td><a href="{url}">{title}</a></td><td>{date}</td><td>{price}</td><td>{location}</td><td>{source}</td></tr>"#,
        id = escape_html(&event.id),
        url = escape_html(&event.url),
        title = escape_html(&event.title),
        date = escape_html(&event.date.to_string()),
        price = escape_html(&event.price),
        location = escape_html(&event.location),
        source = escape_html(&event.source),
    )
}

/// Single pass over `{{name}}` placeholders so substituted text is never
/// scanned again. Unknown names are left as they are.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let value = after.find("}}").and_then(|close| {
            values
                .iter()
                .find(|(name, _)| *name == &after[..close])
                .map(|(_, value)| (close, value))
        });
        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

// JSON inside a <script> element must not be able to close the element.
fn json_for_script<T: Serialize>(value: &T) -> Result<String, ReportError> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}
