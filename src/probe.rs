use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task;
use tracing::debug;

use crate::error::HttpFault;

pub const DEFAULT_PROBE_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub domain: String,
    pub reachable: bool,
    /// Why the probe failed, when it did.
    pub fault: Option<HttpFault>,
}

impl ProbeResult {
    pub fn reachable(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            reachable: true,
            fault: None,
        }
    }

    pub fn unreachable(domain: impl Into<String>, fault: HttpFault) -> Self {
        Self {
            domain: domain.into(),
            reachable: false,
            fault: Some(fault),
        }
    }
}

/// Network-level existence check for a single host.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, domain: &str) -> ProbeResult;
}

/// Probe every domain with at most `concurrency` probes in flight.
///
/// Results come back in completion order. Duplicates in `domains` are
/// probed once per occurrence.
pub async fn probe_all<P>(prober: Arc<P>, domains: Vec<String>, concurrency: usize) -> Vec<ProbeResult>
where
    P: Prober + ?Sized + 'static,
{
    let total = domains.len();
    let (tx, mut rx) = mpsc::channel(concurrency.max(1) * 2);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let feeder = task::spawn(async move {
        for domain in domains {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let prober = prober.clone();

            task::spawn(async move {
                let _permit = permit;
                let result = prober.probe(&domain).await;
                let _ = tx.send(result).await;
            });
        }
    });

    let mut results = Vec::with_capacity(total);
    while let Some(result) = rx.recv().await {
        if let Some(fault) = &result.fault {
            debug!("{} unreachable: {}", result.domain, fault);
        }
        results.push(result);
    }

    let _ = feeder.await;
    results
}
