use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use subtake::dns::HickoryResolver;
use subtake::http::HttpClient;
use subtake::report;
use subtake::scanner::TakeoverScanner;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = args.to_config()?;
    info!(
        "Domain: {}, Wordlist: {} ({} prefixes)",
        config.domain,
        args.wordlist.display(),
        config.prefixes.len()
    );

    let http = Arc::new(HttpClient::new(config.http_timeout)?);
    let resolver = Arc::new(HickoryResolver::new(config.resolvers.clone(), config.dns_timeout)?);

    let scanner = TakeoverScanner::new(&config.domain, http.clone(), http, resolver)
        .with_probe_concurrency(config.probe_concurrency)
        .with_scan_concurrency(config.scan_concurrency);

    let results = scanner.scan(&config.prefixes).await;
    let rendered = report::render(&results, config.output_format, config.include_cname)?;

    let mut file = File::create(&config.output)
        .with_context(|| format!("failed to create {}", config.output.display()))?;
    file.write_all(rendered.as_bytes())?;

    info!(
        "{} vulnerable subdomains written to {}",
        results.vulnerable.len(),
        config.output.display()
    );
    Ok(())
}
