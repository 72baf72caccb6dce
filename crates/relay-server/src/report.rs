//! Self-test benchmark report (`/test/benchmark`).
//!
//! Rendered as Markdown, as a minimal HTML page, or as JSON carrying both,
//! depending on the request's `Accept` header.

use std::fmt::Write as _;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::deployment::{SERVER_VERSION, rfc3339};
use crate::hub::ServerSnapshot;

const HTML_HEAD: &str = r"<!DOCTYPE html>
<html>
<head>
    <title>Performance Report</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               max-width: 800px; margin: 40px auto; padding: 20px; line-height: 1.6; }
        h1 { color: #333; border-bottom: 2px solid #0066cc; padding-bottom: 10px; }
        h2 { color: #555; margin-top: 30px; }
        ul { list-style-type: none; padding-left: 0; }
        li { padding: 5px 0; }
        strong { color: #0066cc; }
        code { background: #f4f4f4; padding: 2px 6px; border-radius: 3px; }
    </style>
</head>
<body>
";

/// Benchmark results derived from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResults {
    /// When the report was generated.
    pub timestamp: String,
    /// Server status section.
    pub server: BenchmarkServer,
    /// Throughput section.
    pub metrics: BenchmarkMetrics,
    /// Time spent building the results.
    pub test_duration_ms: u64,
}

/// Server status in a benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkServer {
    /// Server version.
    pub version: String,
    /// Seconds since the hub started.
    pub uptime_seconds: f64,
    /// Live clients.
    pub connected_users: usize,
}

/// Throughput figures in a benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkMetrics {
    /// Messages accepted for fan-out.
    pub total_messages: u64,
    /// Payload bytes accepted for fan-out.
    pub total_bytes: u64,
    /// Average messages per second.
    pub messages_per_second: f64,
    /// Average bandwidth in megabits per second.
    pub bandwidth_mbps: f64,
}

/// JSON body when neither Markdown nor HTML was asked for.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResponse {
    /// Structured results.
    pub results: BenchmarkResults,
    /// The Markdown rendering.
    pub report_markdown: String,
    /// The HTML rendering.
    pub report_html: String,
}

/// Representation picked from the `Accept` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// `text/markdown`
    Markdown,
    /// `text/html`
    Html,
    /// Anything else.
    Json,
}

impl ReportFormat {
    /// Markdown wins over HTML when both appear.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(a) if a.contains("text/markdown") => Self::Markdown,
            Some(a) if a.contains("text/html") => Self::Html,
            _ => Self::Json,
        }
    }

    /// `Content-Type` for this representation.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Json => "application/json",
        }
    }
}

impl BenchmarkResults {
    /// Build results from a snapshot. `began` marks the start of the request.
    pub fn from_snapshot(snapshot: &ServerSnapshot, began: Instant) -> Self {
        Self {
            timestamp: rfc3339(Utc::now()),
            server: BenchmarkServer {
                version: SERVER_VERSION.into(),
                uptime_seconds: snapshot.uptime.as_secs_f64(),
                connected_users: snapshot.connected_users(),
            },
            metrics: BenchmarkMetrics {
                total_messages: snapshot.stats.total_messages,
                total_bytes: snapshot.stats.total_bytes_relayed,
                messages_per_second: snapshot.messages_per_second(),
                bandwidth_mbps: snapshot.bandwidth_mbps(),
            },
            test_duration_ms: u64::try_from(began.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Render the Markdown report.
#[allow(clippy::cast_precision_loss)]
pub fn render_markdown(results: &BenchmarkResults, commit: &str) -> String {
    let mut md = String::new();
    let mb = results.metrics.total_bytes as f64 / (1024.0 * 1024.0);

    // Writing to a String cannot fail
    let _ = write!(
        md,
        "# WebSocket Relay Server - Performance Report\n\n\
         **Generated:** {}\n\n\
         ## Server Status\n\n\
         - **Version:** {}\n\
         - **Uptime:** {:.0} seconds\n\
         - **Connected Users:** {}\n\
         \n## Performance Metrics\n\n\
         - **Total Messages:** {}\n\
         - **Total Data:** {:.2} MB\n\
         - **Throughput:** {:.2} msg/s\n\
         - **Bandwidth:** {:.2} Mbps\n\
         \n## Test Information\n\n\
         - **Test Duration:** {}ms\n\
         - **Deployment:** {}\n",
        results.timestamp,
        results.server.version,
        results.server.uptime_seconds,
        results.server.connected_users,
        results.metrics.total_messages,
        mb,
        results.metrics.messages_per_second,
        results.metrics.bandwidth_mbps,
        results.test_duration_ms,
        commit,
    );
    md
}

/// Line-by-line conversion of the report Markdown into a styled page.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut html = String::from(HTML_HEAD);
    for line in markdown.split('\n') {
        if let Some(rest) = line.strip_prefix("# ") {
            let _ = writeln!(html, "<h1>{rest}</h1>");
        } else if let Some(rest) = line.strip_prefix("## ") {
            let _ = writeln!(html, "<h2>{rest}</h2>");
        } else if let Some(rest) = line.strip_prefix("- ") {
            let _ = writeln!(html, "<li>{rest}</li>");
        } else if line.is_empty() {
            html.push_str("<br>\n");
        } else {
            let _ = writeln!(html, "<p>{line}</p>");
        }
    }
    html.push_str("</body></html>");
    html
}
