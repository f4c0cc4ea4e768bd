//! DigitalOcean DNS provider
//!
//! Manages DNS-01 TXT records through the DigitalOcean API.
//! API documentation: <https://docs.digitalocean.com/reference/api/api-reference/#tag/Domain-Records>

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::provider::{normalize_domain, DnsProvider, DnsProviderError, DnsResult, CHALLENGE_TTL};

/// DigitalOcean API base URL
pub const DIGITALOCEAN_API_BASE: &str = "https://api.digitalocean.com/v2";

const ZONES_PER_PAGE: u32 = 200;
const MAX_ZONE_PAGES: usize = 50;

/// DigitalOcean DNS provider
pub struct DigitalOceanProvider {
    client: Client,
    token: String,
    base_url: String,
    timeout: Duration,
    /// Cache of domain -> zone name
    zone_cache: Arc<RwLock<HashMap<String, String>>>,
}

impl DigitalOceanProvider {
    /// Create a provider talking to the public DigitalOcean API
    pub fn new(token: &str, timeout: Duration) -> DnsResult<Self> {
        Self::with_base_url(token, DIGITALOCEAN_API_BASE, timeout)
    }

    /// Create a provider against a custom API base URL
    pub fn with_base_url(token: &str, base_url: &str, timeout: Duration) -> DnsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            zone_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Find the zone that holds records for `domain`
    async fn zone_for(&self, domain: &str) -> DnsResult<String> {
        let normalized = normalize_domain(domain)
            .trim_end_matches('.')
            .to_ascii_lowercase();

        {
            let cache = self.zone_cache.read();
            if let Some(zone) = cache.get(&normalized) {
                trace!(domain = %domain, zone = %zone, "Zone found in cache");
                return Ok(zone.clone());
            }
        }

        let zones = self.list_zones().await?;
        let zone = find_matching_zone(&normalized, &zones)?.to_string();

        {
            let mut cache = self.zone_cache.write();
            cache.insert(normalized, zone.clone());
        }

        debug!(domain = %domain, zone = %zone, "Found zone for domain");
        Ok(zone)
    }

    /// List every domain on the account, following pagination
    async fn list_zones(&self) -> DnsResult<Vec<String>> {
        let mut zones = Vec::new();
        let mut next = Some(format!(
            "{}/domains?per_page={}",
            self.base_url, ZONES_PER_PAGE
        ));
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_ZONE_PAGES {
                return Err(DnsProviderError::ApiRequest(
                    "Too many pages while listing domains".to_string(),
                ));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| self.request_error("list domains", e))?;

            let response = check_auth(response).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(DnsProviderError::ApiRequest(format!(
                    "Failed to list domains: HTTP {} - {}",
                    status, body
                )));
            }

            let page: DomainsResponse = response.json().await.map_err(|e| {
                DnsProviderError::ApiRequest(format!("Failed to parse domains response: {}", e))
            })?;

            for domain in page.domains {
                zones.push(domain.name.to_ascii_lowercase());
            }
            next = page.links.and_then(|l| l.pages).and_then(|p| p.next);
        }

        trace!(count = zones.len(), "Listed DigitalOcean domains");
        Ok(zones)
    }

    fn request_error(&self, action: &str, e: reqwest::Error) -> DnsProviderError {
        if e.is_timeout() {
            DnsProviderError::Timeout {
                elapsed_secs: self.timeout.as_secs(),
            }
        } else {
            DnsProviderError::ApiRequest(format!("Failed to {}: {}", action, e))
        }
    }
}

impl fmt::Debug for DigitalOceanProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitalOceanProvider")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DnsProvider for DigitalOceanProvider {
    fn name(&self) -> &'static str {
        "digitalocean"
    }

    async fn create_txt_record(
        &self,
        domain: &str,
        record_name: &str,
        record_value: &str,
    ) -> DnsResult<String> {
        let zone = self.zone_for(domain).await?;

        let fqdn = format!("{}.{}", record_name, normalize_domain(domain).to_ascii_lowercase());
        let relative_name = record_name_for_zone(&fqdn, &zone);

        debug!(
            domain = %domain,
            zone = %zone,
            record_name = %relative_name,
            "Creating TXT record"
        );

        let request = CreateRecordRequest {
            r#type: "TXT",
            name: &relative_name,
            data: record_value,
            ttl: CHALLENGE_TTL,
        };

        let response = self
            .client
            .post(format!("{}/domains/{}/records", self.base_url, zone))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error("create record", e))?;

        let response = check_auth(response).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordCreation {
                record_name: relative_name,
                message: format!("HTTP {} - {}", status, body),
            });
        }

        let created: RecordResponse =
            response
                .json()
                .await
                .map_err(|e| DnsProviderError::RecordCreation {
                    record_name: relative_name.clone(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        let record_id = created.domain_record.id.to_string();
        debug!(record_id = %record_id, "TXT record created");
        Ok(record_id)
    }

    async fn delete_txt_record(&self, domain: &str, record_id: &str) -> DnsResult<()> {
        let zone = self.zone_for(domain).await?;

        debug!(zone = %zone, record_id = %record_id, "Deleting TXT record");

        let response = self
            .client
            .delete(format!(
                "{}/domains/{}/records/{}",
                self.base_url, zone, record_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.request_error("delete record", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        let response = check_auth(response).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordDeletion {
                record_id: record_id.to_string(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        debug!(record_id = %record_id, "TXT record deleted");
        Ok(())
    }
}

async fn check_auth(response: Response) -> DnsResult<Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DnsProviderError::Authentication(format!(
                "DigitalOcean rejected the auth token: HTTP {} - {}",
                status, body
            )))
        }
        _ => Ok(response),
    }
}

/// Find the longest zone that is `domain` itself or one of its parents
fn find_matching_zone<'a>(domain: &str, zones: &'a [String]) -> DnsResult<&'a str> {
    let mut current = domain;
    loop {
        if let Some(zone) = zones.iter().find(|z| z.as_str() == current) {
            return Ok(zone.as_str());
        }
        match current.find('.') {
            Some(pos) => current = &current[pos + 1..],
            None => break,
        }
    }

    Err(DnsProviderError::ZoneNotFound {
        domain: domain.to_string(),
    })
}

/// Record name relative to the zone apex, `@` for the apex itself
fn record_name_for_zone(fqdn: &str, zone: &str) -> String {
    if fqdn == zone {
        "@".to_string()
    } else if let Some(stripped) = fqdn.strip_suffix(&format!(".{}", zone)) {
        stripped.to_string()
    } else {
        fqdn.to_string()
    }
}

// DigitalOcean API types

#[derive(Debug, Deserialize)]
struct DomainsResponse {
    domains: Vec<Domain>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Domain {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
struct Pages {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    r#type: &'a str,
    name: &'a str,
    data: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    domain_record: DomainRecord,
}

#[derive(Debug, Deserialize)]
struct DomainRecord {
    id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_matching_zone_exact() {
        let zones = zones(&["example.com", "other.org"]);
        assert_eq!(
            find_matching_zone("example.com", &zones).unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_find_matching_zone_prefers_longest() {
        let zones = zones(&["example.com", "dev.example.com"]);
        assert_eq!(
            find_matching_zone("api.dev.example.com", &zones).unwrap(),
            "dev.example.com"
        );
        assert_eq!(
            find_matching_zone("www.example.com", &zones).unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_find_matching_zone_missing() {
        let zones = zones(&["example.com"]);
        let err = find_matching_zone("example.net", &zones).unwrap_err();
        assert!(matches!(err, DnsProviderError::ZoneNotFound { .. }));
    }

    #[test]
    fn test_record_name_for_zone() {
        assert_eq!(
            record_name_for_zone("_acme-challenge.example.com", "example.com"),
            "_acme-challenge"
        );
        assert_eq!(
            record_name_for_zone("_acme-challenge.api.example.com", "example.com"),
            "_acme-challenge.api"
        );
        assert_eq!(record_name_for_zone("example.com", "example.com"), "@");
    }

    #[test]
    fn test_debug_hides_token() {
        let provider =
            DigitalOceanProvider::new("dop_v1_secret", Duration::from_secs(30)).unwrap();
        assert!(!format!("{:?}", provider).contains("dop_v1_secret"));
    }
}
