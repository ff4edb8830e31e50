use serde::Serialize;
use tracing::debug;

use crate::dns::{CnameLookup, CnameResolver, LookupOutcome};
use crate::http::PageResponse;
use crate::signatures::{entries_matching_suffix, Marker, SignatureEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The provider resource behind the CNAME looks unclaimed.
    Vulnerable(&'static SignatureEntry),
    Active,
    /// Not enough evidence either way: no CNAME, or the evidence a matching
    /// signature needs could not be gathered.
    Indeterminate,
}

/// Whether classifying `lookup` requires the page served for the domain.
pub fn needs_page(lookup: &CnameLookup) -> bool {
    match found_target(lookup) {
        Some(target) => entries_matching_suffix(target)
            .iter()
            .any(|entry| entry.marker.needs_page()),
        None => false,
    }
}

/// Decide whether the resource behind a CNAME has been deprovisioned.
///
/// `page` is `None` when it was not fetched or the fetch failed. A fetch
/// failure never produces `Vulnerable` on its own: a body or status entry
/// that cannot be checked makes the verdict `Indeterminate` unless another
/// entry fires. Entries are tried in catalog order and the first that fires
/// wins.
pub async fn classify<R>(lookup: &CnameLookup, page: Option<&PageResponse>, resolver: &R) -> Verdict
where
    R: CnameResolver + ?Sized,
{
    let Some(target) = found_target(lookup) else {
        return Verdict::Indeterminate;
    };

    let mut target_existence = None;
    let mut undecided = false;

    for entry in entries_matching_suffix(target) {
        let fired = match entry.marker {
            Marker::Nxdomain => {
                let outcome = match target_existence {
                    Some(outcome) => outcome,
                    None => {
                        let outcome = resolver.resolve_existence(target).await;
                        target_existence = Some(outcome);
                        outcome
                    }
                };
                match outcome {
                    LookupOutcome::Nxdomain => Some(true),
                    LookupOutcome::Found | LookupOutcome::NoRecord => Some(false),
                    LookupOutcome::Timeout | LookupOutcome::Error => None,
                }
            }
            Marker::Body(text) => page.map(|page| page.body.contains(text)),
            Marker::HttpStatus(code) => page.map(|page| page.status == code),
        };

        match fired {
            Some(true) => return Verdict::Vulnerable(entry),
            Some(false) => {}
            None => {
                debug!("{}: could not evaluate {} signature", lookup.domain, entry.provider_suffix);
                undecided = true;
            }
        }
    }

    if undecided {
        Verdict::Indeterminate
    } else {
        Verdict::Active
    }
}

fn found_target(lookup: &CnameLookup) -> Option<&str> {
    match lookup.outcome {
        LookupOutcome::Found => lookup.target.as_deref().filter(|t| !t.is_empty()),
        _ => None,
    }
}
