// Report formatting - text and JSON renderers behind one trait
//
// `ReportFormat` is the factory: parse the token, then `create_report()`.

use serde::ser::Error as _;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::AnalyticsError;

/// Insertion-ordered mapping handed to a report (a bundle or a slice of it)
pub type ReportData = serde_json::Map<String, Value>;

/// Renders report data to a string
pub trait Report {
    fn generate(&self, data: &ReportData) -> Result<String, AnalyticsError>;
}

// ============================================================================
// TEXT
// ============================================================================

/// One `key: value` line per top-level entry
///
/// Nested values are written in compact JSON, not pretty-printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReport;

impl Report for TextReport {
    fn generate(&self, data: &ReportData) -> Result<String, AnalyticsError> {
        let mut report = String::new();
        for (key, value) in data {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            report.push_str(&format!("{}: {}\n", key, rendered));
        }
        Ok(report)
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Pretty JSON, 4-space indent, non-ASCII kept as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReport;

impl Report for JsonReport {
    fn generate(&self, data: &ReportData) -> Result<String, AnalyticsError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        data.serialize(&mut serializer)?;

        String::from_utf8(buf)
            .map_err(|e| AnalyticsError::Serialization(serde_json::Error::custom(e)))
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
        }
    }

    pub fn create_report(&self) -> Box<dyn Report> {
        match self {
            ReportFormat::Text => Box::new(TextReport),
            ReportFormat::Json => Box::new(JsonReport),
        }
    }

    /// MIME type for HTTP downloads
    pub fn media_type(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text/plain",
            ReportFormat::Json => "application/json",
        }
    }

    /// Attachment file name for HTTP downloads
    pub fn file_name(&self) -> &'static str {
        match self {
            ReportFormat::Text => "report.txt",
            ReportFormat::Json => "report.json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(AnalyticsError::InvalidReportType(other.to_string())),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
