//! Product metadata lookups against the remote catalog
//!
//! One request per product identifier, no retries. Any failure (transport
//! error, non-2xx status, unparseable body) resolves to
//! [`ResolvedMetadata::fallback`] so the unit still gets archived.

use crate::config::{ID_PLACEHOLDER, MetadataConfig};
use crate::error::{Error, Result};
use crate::types::{FALLBACK_TITLE, ProductId, ResolvedMetadata, UNKNOWN_YEAR};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Outcome of [`MetadataResolver::resolve`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Title and year to name the archive with
    pub metadata: ResolvedMetadata,
    /// True when the lookup failed and the fallback was substituted
    pub fallback: bool,
}

/// Source of product titles and release years
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Perform the lookup, reporting failures
    async fn lookup(&self, id: &ProductId) -> Result<ResolvedMetadata>;

    /// Perform the lookup, substituting the fallback on failure
    async fn resolve(&self, id: &ProductId) -> Resolution {
        match self.lookup(id).await {
            Ok(metadata) => Resolution {
                metadata,
                fallback: false,
            },
            Err(e) => {
                warn!(product_id = %id, error = %e, "metadata lookup failed, using fallback");
                Resolution {
                    metadata: ResolvedMetadata::fallback(),
                    fallback: true,
                }
            }
        }
    }

    /// Name of this resolver for logging
    fn name(&self) -> &'static str;
}

/// HTTP client for a JSON product catalog
///
/// Expects `GET <endpoint with {id} replaced>` to answer with an object holding
/// `title` and `release_date` (year first, e.g. `2019-05-01T00:00:00+0300`).
pub struct CatalogClient {
    client: reqwest::Client,
    endpoint: String,
}

impl CatalogClient {
    /// Build a client from configuration
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        if !config.endpoint.contains(ID_PLACEHOLDER) {
            return Err(Error::Config {
                message: format!("endpoint must contain {}", ID_PLACEHOLDER),
                key: Some("metadata.endpoint".to_string()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("repack-watch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// URL queried for `id`
    pub fn url_for(&self, id: &ProductId) -> Result<url::Url> {
        let raw = self
            .endpoint
            .replace(ID_PLACEHOLDER, &urlencoding::encode(id.as_str()));
        url::Url::parse(&raw).map_err(|e| Error::Config {
            message: format!("invalid catalog URL {}: {}", raw, e),
            key: Some("metadata.endpoint".to_string()),
        })
    }
}

#[async_trait]
impl MetadataResolver for CatalogClient {
    async fn lookup(&self, id: &ProductId) -> Result<ResolvedMetadata> {
        let url = self.url_for(id)?;
        info!(product_id = %id, %url, "fetching product metadata");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!("catalog returned status {}", status)));
        }

        let body: serde_json::Value = response.json().await?;
        let metadata = parse_product(&body);
        debug!(product_id = %id, title = %metadata.title, year = %metadata.year, "metadata resolved");
        Ok(metadata)
    }

    fn name(&self) -> &'static str {
        "catalog-http"
    }
}

/// Extract title and year from a catalog response body
///
/// Missing fields degrade individually: no title gives the fallback title, no
/// usable date gives the unknown-year sentinel.
pub fn parse_product(body: &serde_json::Value) -> ResolvedMetadata {
    let title = body
        .get("title")
        .and_then(|t| t.as_str())
        .map(sanitize_title)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let year = body
        .get("release_date")
        .and_then(|d| d.as_str())
        .map(year_from_date)
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string());

    ResolvedMetadata { title, year }
}

/// Remove everything that is not a word character or whitespace
pub fn sanitize_title(title: &str) -> String {
    punctuation().replace_all(title, "").into_owned()
}

/// The leading year of a year-first date, or the unknown sentinel
pub fn year_from_date(date: &str) -> String {
    let year: String = date
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if year.len() == 4 {
        year
    } else {
        UNKNOWN_YEAR.to_string()
    }
}

#[allow(clippy::expect_used)]
fn punctuation() -> &'static Regex {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").expect("literal pattern is valid"))
}
