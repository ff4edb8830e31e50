use std::fmt::Write as _;
use std::str::FromStr;

use crate::scanner::ScanReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// One vulnerable domain per line. With `include_cname`, each line also
/// carries the CNAME target and the provider suffix that matched.
pub fn render_text(report: &ScanReport, include_cname: bool) -> String {
    let mut out = String::new();
    for record in &report.vulnerable {
        if include_cname {
            let _ = writeln!(out, "{} {} {}", record.domain, record.cname_target, record.provider);
        } else {
            let _ = writeln!(out, "{}", record.domain);
        }
    }
    out
}

pub fn render_json(report: &ScanReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn render(report: &ScanReport, format: OutputFormat, include_cname: bool) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report, include_cname)),
        OutputFormat::Json => render_json(report),
    }
}
