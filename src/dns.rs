use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hickory_client::client::{Client, ClientHandle};
use hickory_client::{ClientError, ClientErrorKind};
use hickory_client::proto::op::ResponseCode;
use hickory_client::proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_client::proto::runtime::TokioRuntimeProvider;
use hickory_client::proto::udp::UdpClientStream;
use hickory_client::proto::xfer::DnsResponse;
use hickory_client::proto::{ProtoError, ProtoErrorKind};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConfigError, DnsFault};

const SYSTEM_RESOLV_CONF: &str = "/etc/resolv.conf";
const FALLBACK_RESOLVERS: [&str; 2] = ["1.1.1.1:53", "8.8.8.8:53"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupOutcome {
    Found,
    NoRecord,
    Nxdomain,
    Timeout,
    Error,
}

impl From<&DnsFault> for LookupOutcome {
    fn from(fault: &DnsFault) -> Self {
        match fault {
            DnsFault::Timeout => LookupOutcome::Timeout,
            DnsFault::NoRecord => LookupOutcome::NoRecord,
            DnsFault::Nxdomain => LookupOutcome::Nxdomain,
            DnsFault::Other(_) => LookupOutcome::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CnameLookup {
    pub domain: String,
    /// Set iff `outcome` is [`LookupOutcome::Found`].
    pub target: Option<String>,
    pub outcome: LookupOutcome,
}

impl CnameLookup {
    pub fn found(domain: impl Into<String>, target: &str) -> Self {
        Self {
            domain: domain.into(),
            target: Some(strip_root(target).to_string()),
            outcome: LookupOutcome::Found,
        }
    }

    pub fn failed(domain: impl Into<String>, fault: &DnsFault) -> Self {
        Self {
            domain: domain.into(),
            target: None,
            outcome: fault.into(),
        }
    }
}

/// Capability used by the scanner and the classifier for every DNS question
/// they ask.
#[async_trait]
pub trait CnameResolver: Send + Sync {
    /// One CNAME query for `domain`. Never fails; faults are folded into the
    /// returned outcome.
    async fn resolve_cname(&self, domain: &str) -> CnameLookup;

    /// Whether `domain` exists at all. Returns `Found` for any answer,
    /// `NoRecord` for an empty NOERROR answer, `Nxdomain` when the name does
    /// not exist.
    async fn resolve_existence(&self, domain: &str) -> LookupOutcome;
}

/// Resolver adapter over hickory's UDP client.
///
/// Each query goes to the next resolver in rotation and is attempted once.
pub struct HickoryResolver {
    resolvers: Vec<SocketAddr>,
    timeout: Duration,
    next: AtomicUsize,
}

impl HickoryResolver {
    pub fn new(resolvers: Vec<SocketAddr>, timeout: Duration) -> Result<Self, ConfigError> {
        if resolvers.is_empty() {
            return Err(ConfigError::NoResolvers {
                source_name: "configuration".to_string(),
                invalid: 0,
            });
        }
        Ok(Self {
            resolvers,
            timeout,
            next: AtomicUsize::new(0),
        })
    }

    fn pick_resolver(&self) -> SocketAddr {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.resolvers.len();
        self.resolvers[idx]
    }

    async fn query(&self, domain: &str, record_type: RecordType) -> Result<DnsResponse, DnsFault> {
        let name = Name::from_str(&format!("{}.", strip_root(domain)))
            .map_err(|e| DnsFault::Other(format!("invalid name '{}': {}", domain, e)))?;
        let resolver = self.pick_resolver();
        let timeout = self.timeout;

        let exchange = async move {
            let conn = UdpClientStream::builder(resolver, TokioRuntimeProvider::default())
                .with_timeout(Some(timeout))
                .build();
            let (mut client, bg) = Client::connect(conn).await.map_err(|e| map_proto_error(&e))?;
            tokio::spawn(bg);
            client
                .query(name, DNSClass::IN, record_type)
                .await
                .map_err(map_client_error)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DnsFault::Timeout),
        }
    }
}

#[async_trait]
impl CnameResolver for HickoryResolver {
    async fn resolve_cname(&self, domain: &str) -> CnameLookup {
        let result = self
            .query(domain, RecordType::CNAME)
            .await
            .and_then(|resp| cname_from_response(&resp));

        match result {
            Ok(target) => CnameLookup::found(domain, &target),
            Err(fault) => {
                debug!("CNAME lookup for {} failed: {}", domain, fault);
                CnameLookup::failed(domain, &fault)
            }
        }
    }

    async fn resolve_existence(&self, domain: &str) -> LookupOutcome {
        match self.query(domain, RecordType::A).await {
            Ok(resp) => match resp.response_code() {
                ResponseCode::NXDomain => LookupOutcome::Nxdomain,
                ResponseCode::NoError if resp.answers().is_empty() => LookupOutcome::NoRecord,
                ResponseCode::NoError => LookupOutcome::Found,
                code => {
                    debug!("existence check for {} returned {}", domain, code);
                    LookupOutcome::Error
                }
            },
            Err(fault) => LookupOutcome::from(&fault),
        }
    }
}

fn cname_from_response(resp: &DnsResponse) -> Result<String, DnsFault> {
    match resp.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => return Err(DnsFault::Nxdomain),
        code => return Err(DnsFault::Other(format!("server answered {}", code))),
    }

    resp.answers()
        .iter()
        .find_map(|record| match record.data() {
            RData::CNAME(cname) => Some(cname.0.to_string()),
            _ => None,
        })
        .ok_or(DnsFault::NoRecord)
}

fn map_client_error(err: ClientError) -> DnsFault {
    match err.kind() {
        ClientErrorKind::Proto(proto) => map_proto_error(proto),
        ClientErrorKind::Timeout => DnsFault::Timeout,
        _ => DnsFault::Other(err.to_string()),
    }
}

fn map_proto_error(err: &ProtoError) -> DnsFault {
    if err.is_nx_domain() {
        return DnsFault::Nxdomain;
    }
    if err.is_no_records_found() {
        return DnsFault::NoRecord;
    }
    match err.kind() {
        ProtoErrorKind::Timeout => DnsFault::Timeout,
        _ => DnsFault::Other(err.to_string()),
    }
}

/// Drop the trailing root-label separator(s) from a DNS name.
pub fn strip_root(name: &str) -> &str {
    name.trim_end_matches('.')
}

/// Read resolvers from a file with one `ip` or `ip:port` per line.
pub fn load_resolvers(path: &Path) -> Result<Vec<SocketAddr>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (resolvers, invalid) = parse_resolver_lines(BufReader::new(file).lines().map_while(Result::ok));

    if resolvers.is_empty() {
        return Err(ConfigError::NoResolvers {
            source_name: path.display().to_string(),
            invalid,
        });
    }
    Ok(resolvers)
}

/// Nameservers from the system resolver configuration, or public resolvers
/// when none can be read.
pub fn system_resolvers() -> Vec<SocketAddr> {
    let from_conf = File::open(SYSTEM_RESOLV_CONF)
        .map(|file| {
            let lines = BufReader::new(file).lines().map_while(Result::ok).filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("nameserver"), Some(addr)) => Some(addr.to_string()),
                    _ => None,
                }
            });
            parse_resolver_lines(lines).0
        })
        .unwrap_or_default();

    if !from_conf.is_empty() {
        return from_conf;
    }

    warn!("no nameservers in {}, using public resolvers", SYSTEM_RESOLV_CONF);
    FALLBACK_RESOLVERS
        .iter()
        .filter_map(|addr| SocketAddr::from_str(addr).ok())
        .collect()
}

fn parse_resolver_lines(lines: impl Iterator<Item = String>) -> (Vec<SocketAddr>, usize) {
    let mut resolvers = Vec::new();
    let mut invalid = 0;

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let addr = SocketAddr::from_str(line)
            .ok()
            .or_else(|| IpAddr::from_str(line).ok().map(|ip| SocketAddr::new(ip, 53)));

        match addr {
            Some(addr) => resolvers.push(addr),
            None => {
                invalid += 1;
                warn!("Invalid resolver '{}'", line);
            }
        }
    }

    (resolvers, invalid)
}
