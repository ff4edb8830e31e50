use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};

use subtake::config::{load_prefixes, parse_domain, ScanConfig};
use subtake::dns::{load_resolvers, system_resolvers};
use subtake::probe::DEFAULT_PROBE_CONCURRENCY;
use subtake::report::OutputFormat;
use subtake::scanner::DEFAULT_SCAN_CONCURRENCY;

#[derive(Parser, Debug)]
#[command(name = "subtake")]
#[command(version, about = "Subdomain enumeration and takeover detection", long_about = None)]
pub struct Cli {
    /// Target domain
    #[arg(short, long, value_name = "DOMAIN")]
    pub domain: String,

    /// Wordlist of subdomain prefixes (one per line)
    #[arg(short = 't', long = "textfile", value_name = "FILE")]
    pub wordlist: PathBuf,

    /// File containing DNS resolvers (one per line); system resolvers if omitted
    #[arg(short, long, value_name = "FILE")]
    pub resolvers: Option<PathBuf>,

    /// Report file
    #[arg(short, long, default_value = "vulnerable_subdomains.txt", value_name = "FILE")]
    pub output: PathBuf,

    /// Report format (text or json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub output_format: OutputFormat,

    /// Append CNAME target and provider to each text report line
    #[arg(long)]
    pub include_cname: bool,

    /// Concurrent existence probes
    #[arg(short = 'c', long, default_value_t = DEFAULT_PROBE_CONCURRENCY, value_name = "N")]
    pub concurrency: usize,

    /// Concurrent takeover checks
    #[arg(long, default_value_t = DEFAULT_SCAN_CONCURRENCY, value_name = "N")]
    pub scan_concurrency: usize,

    /// DNS query timeout in seconds
    #[arg(long, default_value = "5", value_name = "SECS")]
    pub dns_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "5", value_name = "SECS")]
    pub http_timeout: u64,

    /// Show verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn to_config(&self) -> anyhow::Result<ScanConfig> {
        let domain = parse_domain(&self.domain)?;
        let prefixes = load_prefixes(&self.wordlist)?;
        let resolvers = match &self.resolvers {
            Some(path) => load_resolvers(path)?,
            None => system_resolvers(),
        };
        info!("Using {} DNS resolvers", resolvers.len());
        debug!("Resolvers: {:?}", resolvers);

        Ok(ScanConfig {
            domain,
            prefixes,
            resolvers,
            output: self.output.clone(),
            output_format: self.output_format,
            include_cname: self.include_cname,
            probe_concurrency: self.concurrency.max(1),
            scan_concurrency: self.scan_concurrency.max(1),
            dns_timeout: Duration::from_secs(self.dns_timeout),
            http_timeout: Duration::from_secs(self.http_timeout),
        })
    }
}
