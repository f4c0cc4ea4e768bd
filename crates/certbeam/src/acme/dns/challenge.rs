//! DNS-01 challenge management
//!
//! Publishes challenge TXT records through a [`DnsProvider`], waits for them to
//! become visible and removes them once the order is settled.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::propagation::{PropagationChecker, PropagationConfig};
use super::provider::{
    challenge_record_fqdn, normalize_domain, DnsProvider, DnsResult, ACME_CHALLENGE_RECORD,
};

/// A pending DNS-01 challenge
#[derive(Debug, Clone)]
pub struct Dns01ChallengeInfo {
    /// Identifier from the authorization, may be a wildcard
    pub domain: String,
    /// Full record name, e.g. `_acme-challenge.example.com`
    pub record_name: String,
    /// TXT value expected by the CA
    pub record_value: String,
    /// Challenge URL to notify once the record is visible
    pub url: String,
    /// Provider record id, set once the record exists
    pub record_id: Option<String>,
}

/// Build challenge info from an authorization's DNS-01 digest
pub fn create_challenge_info(
    domain: &str,
    dns_value: &str,
    challenge_url: &str,
) -> Dns01ChallengeInfo {
    Dns01ChallengeInfo {
        domain: domain.to_string(),
        record_name: challenge_record_fqdn(domain),
        record_value: dns_value.to_string(),
        url: challenge_url.to_string(),
        record_id: None,
    }
}

/// Coordinates record creation, propagation checks and cleanup
#[derive(Debug)]
pub struct Dns01ChallengeManager {
    provider: Arc<dyn DnsProvider>,
    propagation_checker: PropagationChecker,
}

impl Dns01ChallengeManager {
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        propagation_config: PropagationConfig,
    ) -> DnsResult<Self> {
        let propagation_checker = PropagationChecker::with_config(propagation_config)?;

        Ok(Self {
            provider,
            propagation_checker,
        })
    }

    /// Create the challenge record and wait until it has propagated
    ///
    /// `challenge.record_id` is set as soon as the record exists, so a failed
    /// propagation wait still leaves something for [`Self::cleanup`] to remove.
    pub async fn create_and_wait(&self, challenge: &mut Dns01ChallengeInfo) -> DnsResult<()> {
        info!(
            domain = %challenge.domain,
            record = %challenge.record_name,
            provider = %self.provider.name(),
            "Creating DNS-01 challenge record"
        );

        let record_id = self
            .provider
            .create_txt_record(
                normalize_domain(&challenge.domain),
                ACME_CHALLENGE_RECORD,
                &challenge.record_value,
            )
            .await?;

        debug!(
            domain = %challenge.domain,
            record_id = %record_id,
            "DNS record created, waiting for propagation"
        );
        challenge.record_id = Some(record_id);

        self.propagation_checker
            .wait_for_propagation(&challenge.domain, &challenge.record_value)
            .await?;

        info!(domain = %challenge.domain, "DNS-01 challenge record propagated");
        Ok(())
    }

    /// Remove a challenge record
    pub async fn cleanup(&self, challenge: &Dns01ChallengeInfo) -> DnsResult<()> {
        let Some(record_id) = &challenge.record_id else {
            debug!(domain = %challenge.domain, "No record ID to cleanup");
            return Ok(());
        };

        debug!(
            domain = %challenge.domain,
            record_id = %record_id,
            "Cleaning up DNS-01 challenge record"
        );

        if let Err(e) = self
            .provider
            .delete_txt_record(normalize_domain(&challenge.domain), record_id)
            .await
        {
            warn!(
                domain = %challenge.domain,
                record_id = %record_id,
                error = %e,
                "Failed to cleanup DNS-01 challenge record"
            );
            return Err(e);
        }

        info!(domain = %challenge.domain, "DNS-01 challenge record cleaned up");
        Ok(())
    }

    /// Remove every record, logging failures without stopping
    pub async fn cleanup_all(&self, challenges: &[Dns01ChallengeInfo]) {
        for challenge in challenges {
            if let Err(e) = self.cleanup(challenge).await {
                error!(
                    domain = %challenge.domain,
                    error = %e,
                    "Failed to cleanup challenge record"
                );
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::dns::provider::DnsProviderError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingProvider {
        deleted: Mutex<Vec<(String, String)>>,
        fail_delete: bool,
    }

    #[async_trait]
    impl DnsProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn create_txt_record(
            &self,
            _domain: &str,
            _record_name: &str,
            _record_value: &str,
        ) -> DnsResult<String> {
            Ok("1".to_string())
        }

        async fn delete_txt_record(&self, domain: &str, record_id: &str) -> DnsResult<()> {
            self.deleted
                .lock()
                .push((domain.to_string(), record_id.to_string()));
            if self.fail_delete {
                return Err(DnsProviderError::RecordDeletion {
                    record_id: record_id.to_string(),
                    message: "HTTP 500".to_string(),
                });
            }
            Ok(())
        }
    }

    fn manager(provider: Arc<RecordingProvider>) -> Dns01ChallengeManager {
        let config = PropagationConfig {
            nameservers: vec![SocketAddr::from(([127, 0, 0, 1], 53))],
            ..PropagationConfig::default()
        };
        Dns01ChallengeManager::new(provider, config).unwrap()
    }

    fn created(domain: &str, id: &str) -> Dns01ChallengeInfo {
        let mut info = create_challenge_info(domain, "digest", "https://ca.test/chall/1");
        info.record_id = Some(id.to_string());
        info
    }

    #[test]
    fn test_create_challenge_info() {
        let info = create_challenge_info(
            "example.com",
            "LoqXcYV8q5ONbJQxbmR7SCTNo3tiAXDfowyjxAjEuX0",
            "https://acme.example.com/challenge/123",
        );

        assert_eq!(info.domain, "example.com");
        assert_eq!(info.record_name, "_acme-challenge.example.com");
        assert_eq!(
            info.record_value,
            "LoqXcYV8q5ONbJQxbmR7SCTNo3tiAXDfowyjxAjEuX0"
        );
        assert_eq!(info.url, "https://acme.example.com/challenge/123");
        assert!(info.record_id.is_none());
    }

    #[test]
    fn test_wildcard_challenge_info() {
        let info =
            create_challenge_info("*.example.com", "digest", "https://acme.example.com/c/456");

        assert_eq!(info.domain, "*.example.com");
        assert_eq!(info.record_name, "_acme-challenge.example.com");
    }

    #[tokio::test]
    async fn test_cleanup_without_record_is_noop() {
        let provider = Arc::new(RecordingProvider::default());
        let manager = manager(provider.clone());

        let info = create_challenge_info("example.com", "digest", "https://ca.test/chall/1");
        manager.cleanup(&info).await.unwrap();

        assert!(provider.deleted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_uses_base_domain() {
        let provider = Arc::new(RecordingProvider::default());
        let manager = manager(provider.clone());

        manager
            .cleanup(&created("*.example.com", "42"))
            .await
            .unwrap();

        assert_eq!(
            provider.deleted.lock().as_slice(),
            &[("example.com".to_string(), "42".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_propagation_leaves_record_for_cleanup() {
        let provider = Arc::new(RecordingProvider::default());
        let config = PropagationConfig {
            check_interval: Duration::from_millis(10),
            timeout: Duration::ZERO,
            query_timeout: Some(Duration::from_millis(100)),
            nameservers: vec![SocketAddr::from(([127, 0, 0, 1], 9))],
            require_all: false,
        };
        let manager = Dns01ChallengeManager::new(provider.clone(), config).unwrap();

        let mut challenge =
            create_challenge_info("*.example.com", "digest", "https://ca.test/chall/1");
        let err = manager.create_and_wait(&mut challenge).await.unwrap_err();

        assert!(matches!(err, DnsProviderError::Timeout { .. }));
        assert_eq!(challenge.record_id.as_deref(), Some("1"));

        manager.cleanup_all(&[challenge]).await;

        assert_eq!(
            provider.deleted.lock().as_slice(),
            &[("example.com".to_string(), "1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cleanup_all_continues_after_failure() {
        let provider = Arc::new(RecordingProvider {
            fail_delete: true,
            ..RecordingProvider::default()
        });
        let manager = manager(provider.clone());

        let challenges = vec![
            created("example.com", "1"),
            create_challenge_info("skipped.example.com", "digest", "https://ca.test/chall/2"),
            created("www.example.com", "3"),
        ];
        manager.cleanup_all(&challenges).await;

        let deleted = provider.deleted.lock();
        assert_eq!(deleted.len(), 2);
        assert_eq!(deleted[1].1, "3");
        assert_eq!(manager.provider_name(), "recording");
    }
}
