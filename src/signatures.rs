//! Static catalog of hosting-provider fingerprints that indicate an
//! unclaimed resource behind a CNAME.
//!
//! Entries are kept in table order. When several entries match the same
//! target they are all returned, and the classifier takes the first one
//! that fires.

use serde::Serialize;

/// What has to be observed for an entry to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Marker {
    /// The CNAME target itself does not exist in DNS.
    Nxdomain,
    /// The HTTP response carries this status code.
    HttpStatus(u16),
    /// The HTTP response body contains this text.
    Body(&'static str),
}

impl Marker {
    /// Whether this marker needs the HTTP response to be evaluated.
    pub fn needs_page(&self) -> bool {
        !matches!(self, Marker::Nxdomain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignatureEntry {
    pub provider_suffix: &'static str,
    pub marker: Marker,
}

const fn nx(provider_suffix: &'static str) -> SignatureEntry {
    SignatureEntry { provider_suffix, marker: Marker::Nxdomain }
}

const fn body(provider_suffix: &'static str, text: &'static str) -> SignatureEntry {
    SignatureEntry { provider_suffix, marker: Marker::Body(text) }
}

const fn status(provider_suffix: &'static str, code: u16) -> SignatureEntry {
    SignatureEntry { provider_suffix, marker: Marker::HttpStatus(code) }
}

// Sourced from can-i-take-over-xyz.
static CATALOG: &[SignatureEntry] = &[
    nx("elasticbeanstalk.com"),
    body("s3.amazonaws.com", "The specified bucket does not exist"),
    body("agilecrm.com", "Sorry, this page is no longer available."),
    body("airee.ru", "Ошибка 402. Сервис Айри.рф не оплачен"),
    body("animaapp.io", "The page you were looking for does not exist."),
    body("bitbucket.io", "Repository not found"),
    nx("trydiscourse.com"),
    body("furyns.com", "404: This page could not be found."),
    body("ghost.io", "Site unavailable;Failed to resolve DNS path for this host"),
    body("hatenablog.com", "404 Blog is not found"),
    body("helpjuice.com", "We could not find what youre looking for."),
    body("helpscoutdocs.com", "No settings were found for this company:"),
    status("helprace.com", 301),
    body("youtrack.cloud", "is not a registered InCloud YouTrack"),
    status("launchrock.com", 500),
    nx("cloudapp.net"),
    nx("cloudapp.azure.com"),
    nx("azurewebsites.net"),
    nx("blob.core.windows.net"),
    nx("azure-api.net"),
    nx("azurehdinsight.net"),
    nx("azureedge.net"),
    nx("azurecontainer.io"),
    nx("database.windows.net"),
    nx("azuredatalakestore.net"),
    nx("search.windows.net"),
    nx("azurecr.io"),
    nx("redis.cache.windows.net"),
    nx("servicebus.windows.net"),
    nx("visualstudio.com"),
    body(
        "ngrok.io",
        "The creators of this project are still working on making everything perfect!",
    ),
    body("s.strikinglydns.com", "PAGE NOT FOUND."),
    body("na-west1.surge.sh", "project not found"),
    body("surveysparrow.com", "Account not found."),
    body("read.uberflip.com", "The URL youve accessed does not provide a hub."),
    body("stats.uptimerobot.com", "page not found"),
    body("wordpress.com", "Do you want to register .*.wordpress.com?"),
    body(
        "worksites.net",
        "Hello! Sorry, but the website you&rsquo;re looking for doesn&rsquo;t exist.",
    ),
];

/// Every catalog entry, in table order.
pub fn catalog() -> &'static [SignatureEntry] {
    CATALOG
}

/// Entries whose provider suffix occurs anywhere in `target`.
///
/// Matching is substring-based so sharded hostnames such as
/// `eu.na-west1.surge.sh` still hit their provider. The target is compared
/// case-insensitively; suffixes in the table are lowercase.
pub fn entries_matching_suffix(target: &str) -> Vec<&'static SignatureEntry> {
    let target = target.to_ascii_lowercase();
    CATALOG
        .iter()
        .filter(|entry| target.contains(entry.provider_suffix))
        .collect()
}
