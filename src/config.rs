use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::ConfigError;
use crate::report::OutputFormat;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub domain: String,
    pub prefixes: Vec<String>,
    pub resolvers: Vec<SocketAddr>,
    pub output: PathBuf,
    pub output_format: OutputFormat,
    pub include_cname: bool,
    pub probe_concurrency: usize,
    pub scan_concurrency: usize,
    pub dns_timeout: Duration,
    pub http_timeout: Duration,
}

/// Normalize and validate the target domain.
pub fn parse_domain(raw: &str) -> Result<String, ConfigError> {
    let domain = raw.trim().trim_end_matches('.').to_lowercase();
    if is_valid_domain(&domain) && domain.contains('.') {
        Ok(domain)
    } else {
        Err(ConfigError::InvalidDomain(raw.to_string()))
    }
}

/// Hostname check for the target and for every `prefix.domain` built from
/// the wordlist. Rejects anything that would change the URL authority, such
/// as ports, paths, fragments or userinfo.
pub(crate) fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253 && domain.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Read subdomain prefixes, one per line. Blank lines and `#` comments are
/// skipped.
pub fn load_prefixes(path: &Path) -> Result<Vec<String>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut prefixes = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        prefixes.push(line.to_lowercase());
    }

    if prefixes.is_empty() {
        return Err(ConfigError::EmptyWordlist(path.to_path_buf()));
    }

    info!("Loaded {} prefixes from {}", prefixes.len(), path.display());
    Ok(prefixes)
}
