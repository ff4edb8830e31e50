use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task;
use tracing::{debug, info, warn};

use crate::classify::{classify, needs_page, Verdict};
use crate::config::is_valid_domain;
use crate::dns::{CnameLookup, CnameResolver, LookupOutcome};
use crate::error::DnsFault;
use crate::http::PageFetcher;
use crate::probe::{probe_all, Prober, DEFAULT_PROBE_CONCURRENCY};

pub const DEFAULT_SCAN_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerabilityRecord {
    pub domain: String,
    pub cname_target: String,
    /// Catalog suffix of the signature that fired.
    pub provider: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_candidates: usize,
    pub reachable: Vec<String>,
    pub vulnerable: Vec<VulnerabilityRecord>,
}

/// Two-stage takeover scan: enumerate reachable subdomains from a wordlist,
/// then check the CNAME of each one against the signature catalog.
pub struct TakeoverScanner<P, F, R> {
    domain: String,
    prober: Arc<P>,
    fetcher: Arc<F>,
    resolver: Arc<R>,
    probe_concurrency: usize,
    scan_concurrency: usize,
}

impl<P, F, R> TakeoverScanner<P, F, R>
where
    P: Prober + 'static,
    F: PageFetcher + 'static,
    R: CnameResolver + 'static,
{
    pub fn new(domain: &str, prober: Arc<P>, fetcher: Arc<F>, resolver: Arc<R>) -> Self {
        Self {
            domain: domain.to_string(),
            prober,
            fetcher,
            resolver,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }

    pub fn with_probe_concurrency(mut self, limit: usize) -> Self {
        self.probe_concurrency = limit.max(1);
        self
    }

    pub fn with_scan_concurrency(mut self, limit: usize) -> Self {
        self.scan_concurrency = limit.max(1);
        self
    }

    /// Run both stages over `prefixes`.
    pub async fn scan(&self, prefixes: &[String]) -> ScanReport {
        let started_at = Utc::now();
        let candidates = candidate_domains(prefixes, &self.domain);
        let total_candidates = candidates.len();

        let reachable = self.enumerate(candidates).await;
        info!(
            "{} of {} candidates reachable under {}",
            reachable.len(),
            total_candidates,
            self.domain
        );

        let vulnerable = self.scan_vulnerabilities(reachable.clone()).await;
        for record in &vulnerable {
            info!(
                "Discovered vulnerable subdomain: {} (CNAME: {})",
                record.domain, record.cname_target
            );
        }

        ScanReport {
            target: self.domain.clone(),
            started_at,
            finished_at: Utc::now(),
            total_candidates,
            reachable,
            vulnerable,
        }
    }

    /// Stage one. Returns each reachable domain once, in completion order.
    pub async fn enumerate(&self, candidates: Vec<String>) -> Vec<String> {
        let results = probe_all(self.prober.clone(), candidates, self.probe_concurrency).await;

        let mut seen = HashSet::new();
        let mut reachable = Vec::new();
        for result in results {
            if result.reachable && seen.insert(result.domain.clone()) {
                info!("Discovered subdomain: {}", result.domain);
                reachable.push(result.domain);
            }
        }
        reachable
    }

    /// Stage two. Resolves and classifies every domain with at most
    /// `scan_concurrency` domains in progress. The result holds one record
    /// per vulnerable domain, sorted by domain.
    pub async fn scan_vulnerabilities(&self, domains: Vec<String>) -> Vec<VulnerabilityRecord> {
        let (tx, mut rx) = mpsc::channel(self.scan_concurrency * 2);
        let semaphore = Arc::new(Semaphore::new(self.scan_concurrency));

        let resolver = self.resolver.clone();
        let fetcher = self.fetcher.clone();
        let feeder = task::spawn(async move {
            for domain in domains {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let tx = tx.clone();
                let resolver = resolver.clone();
                let fetcher = fetcher.clone();

                task::spawn(async move {
                    let _permit = permit;
                    if let Some(record) = check_domain(domain, resolver, fetcher).await {
                        let _ = tx.send(record).await;
                    }
                });
            }
        });

        let mut seen = HashSet::new();
        let mut vulnerable = Vec::new();
        while let Some(record) = rx.recv().await {
            if seen.insert(record.domain.clone()) {
                vulnerable.push(record);
            }
        }
        let _ = feeder.await;

        vulnerable.sort_by(|a, b| a.domain.cmp(&b.domain));
        vulnerable
    }
}

async fn check_domain<R, F>(domain: String, resolver: Arc<R>, fetcher: Arc<F>) -> Option<VulnerabilityRecord>
where
    R: CnameResolver + 'static,
    F: PageFetcher + 'static,
{
    // resolve on its own task so a slow resolver does not hold this one
    let lookup = {
        let resolver = resolver.clone();
        let name = domain.clone();
        match task::spawn(async move { resolver.resolve_cname(&name).await }).await {
            Ok(lookup) => lookup,
            Err(e) => CnameLookup::failed(domain.as_str(), &DnsFault::Other(e.to_string())),
        }
    };

    let target = match (&lookup.outcome, lookup.target.as_deref()) {
        (LookupOutcome::Found, Some(target)) => target.to_string(),
        (outcome, _) => {
            info!("{} has no CNAME ({:?}), might be a bare A record", domain, outcome);
            return None;
        }
    };
    info!("{} has CNAME: {}", domain, target);

    let page = if needs_page(&lookup) {
        match fetcher.fetch(&domain).await {
            Ok(page) => Some(page),
            Err(fault) => {
                debug!("fetching {} failed: {}", domain, fault);
                None
            }
        }
    } else {
        None
    };

    match classify(&lookup, page.as_ref(), resolver.as_ref()).await {
        Verdict::Vulnerable(entry) => {
            warn!(
                "ALERT: potential subdomain takeover on {} ({} via {})",
                domain, target, entry.provider_suffix
            );
            Some(VulnerabilityRecord {
                domain,
                cname_target: target,
                provider: entry.provider_suffix,
            })
        }
        Verdict::Active => {
            info!("{} appears active", domain);
            None
        }
        Verdict::Indeterminate => {
            info!("{} could not be classified", domain);
            None
        }
    }
}

/// Build `prefix.domain` for every non-blank prefix. Names that are not
/// valid hostnames are skipped so they never reach the prober.
pub fn candidate_domains(prefixes: &[String], domain: &str) -> Vec<String> {
    prefixes
        .iter()
        .map(|prefix| prefix.trim())
        .filter(|prefix| !prefix.is_empty())
        .filter_map(|prefix| {
            let candidate = format!("{}.{}", prefix.trim_end_matches('.'), domain);
            if is_valid_domain(&candidate) {
                Some(candidate)
            } else {
                warn!("Skipping invalid candidate '{}'", candidate);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpFault;
    use crate::http::PageResponse;
    use crate::probe::ProbeResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeNet {
        reachable: HashSet<String>,
        cnames: HashMap<String, String>,
        pages: HashMap<String, PageResponse>,
        missing_targets: HashSet<String>,
        fetches: AtomicUsize,
        resolving: AtomicUsize,
        resolve_peak: AtomicUsize,
    }

    impl FakeNet {
        fn reachable(mut self, domain: &str) -> Self {
            self.reachable.insert(domain.to_string());
            self
        }

        fn cname(mut self, domain: &str, target: &str) -> Self {
            self.cnames.insert(domain.to_string(), target.to_string());
            self
        }

        fn page(mut self, domain: &str, status: u16, body: &str) -> Self {
            self.pages.insert(
                domain.to_string(),
                PageResponse {
                    status,
                    body: body.to_string(),
                },
            );
            self
        }

        fn missing(mut self, target: &str) -> Self {
            self.missing_targets.insert(target.to_string());
            self
        }
    }

    #[async_trait]
    impl Prober for FakeNet {
        async fn probe(&self, domain: &str) -> ProbeResult {
            if self.reachable.contains(domain) {
                ProbeResult::reachable(domain)
            } else {
                ProbeResult::unreachable(domain, HttpFault::Connection("refused".into()))
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeNet {
        async fn fetch(&self, domain: &str) -> Result<PageResponse, HttpFault> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.pages.get(domain).cloned().ok_or(HttpFault::Timeout)
        }
    }

    #[async_trait]
    impl CnameResolver for FakeNet {
        async fn resolve_cname(&self, domain: &str) -> CnameLookup {
            let now = self.resolving.fetch_add(1, Ordering::SeqCst) + 1;
            self.resolve_peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.resolving.fetch_sub(1, Ordering::SeqCst);

            match self.cnames.get(domain) {
                Some(target) => CnameLookup::found(domain, &format!("{}.", target)),
                None => CnameLookup::failed(domain, &DnsFault::NoRecord),
            }
        }

        async fn resolve_existence(&self, domain: &str) -> LookupOutcome {
            if self.missing_targets.contains(domain) {
                LookupOutcome::Nxdomain
            } else {
                LookupOutcome::Found
            }
        }
    }

    fn scanner(net: FakeNet) -> (Arc<FakeNet>, TakeoverScanner<FakeNet, FakeNet, FakeNet>) {
        let net = Arc::new(net);
        let scanner = TakeoverScanner::new("example.com", net.clone(), net.clone(), net.clone());
        (net, scanner)
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_bitbucket() {
        let (_, scanner) = scanner(
            FakeNet::default()
                .reachable("www.example.com")
                .reachable("shop.example.com")
                .cname("www.example.com", "mysite.bitbucket.io")
                .page("www.example.com", 404, "Repository not found"),
        );

        let report = scanner.scan(&words(&["www", "blog", "shop"])).await;

        let mut reachable = report.reachable.clone();
        reachable.sort();
        assert_eq!(reachable, vec!["shop.example.com", "www.example.com"]);
        assert_eq!(report.total_candidates, 3);
        assert_eq!(
            report.vulnerable,
            vec![VulnerabilityRecord {
                domain: "www.example.com".to_string(),
                cname_target: "mysite.bitbucket.io".to_string(),
                provider: "bitbucket.io",
            }]
        );
    }

    #[test]
    fn test_blank_prefixes_are_dropped() {
        let candidates = candidate_domains(&words(&["www", "", "  ", "api "]), "example.com");
        assert_eq!(candidates, vec!["www.example.com", "api.example.com"]);
    }

    #[test]
    fn test_prefixes_that_change_the_host_are_dropped() {
        let candidates = candidate_domains(
            &words(&["127.0.0.1:8080/", "evil.com#", "user@evil.com", "a/b", "dev-1", "api.v2"]),
            "example.com",
        );
        assert_eq!(candidates, vec!["dev-1.example.com", "api.v2.example.com"]);
    }

    #[tokio::test]
    async fn test_invalid_prefixes_are_never_probed() {
        let (_, scanner) = scanner(FakeNet::default().reachable("127.0.0.1:8080/.example.com"));

        let report = scanner.scan(&words(&["127.0.0.1:8080/"])).await;

        assert_eq!(report.total_candidates, 0);
        assert!(report.reachable.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_reported_once() {
        let (_, scanner) = scanner(
            FakeNet::default()
                .reachable("app.example.com")
                .cname("app.example.com", "gone.elasticbeanstalk.com")
                .missing("gone.elasticbeanstalk.com"),
        );

        let report = scanner.scan(&words(&["app", "app", "app"])).await;

        assert_eq!(report.reachable, vec!["app.example.com"]);
        assert_eq!(report.vulnerable.len(), 1);
        assert_eq!(report.vulnerable[0].provider, "elasticbeanstalk.com");
    }

    #[tokio::test]
    async fn test_nxdomain_entries_skip_fetch() {
        let (net, scanner) = scanner(
            FakeNet::default()
                .reachable("app.example.com")
                .cname("app.example.com", "live.azurewebsites.net"),
        );

        let report = scanner.scan(&words(&["app"])).await;

        assert!(report.vulnerable.is_empty());
        assert_eq!(net.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_reported() {
        let (net, scanner) = scanner(
            FakeNet::default()
                .reachable("cdn.example.com")
                .cname("cdn.example.com", "bucket.s3.amazonaws.com"),
        );

        let report = scanner.scan(&words(&["cdn"])).await;

        assert!(report.vulnerable.is_empty());
        assert_eq!(net.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stage_two_is_bounded() {
        let mut net = FakeNet::default();
        let mut domains = Vec::new();
        for i in 0..200 {
            let domain = format!("h{}.example.com", i);
            net = net.cname(&domain, "lb.example.net");
            domains.push(domain);
        }
        let (net, scanner) = scanner(net);
        let scanner = scanner.with_scan_concurrency(5);

        let vulnerable = scanner.scan_vulnerabilities(domains).await;

        assert!(vulnerable.is_empty());
        assert!(net.resolve_peak.load(Ordering::SeqCst) <= 5);
    }
}
