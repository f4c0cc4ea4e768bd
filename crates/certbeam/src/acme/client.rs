//! ACME requester built on `instant-acme`
//!
//! Obtains one certificate for every configured domain through DNS-01
//! challenges published with a [`DnsProvider`].

use std::sync::Arc;
use std::time::Duration;

use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use rand::rngs::OsRng;
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use certbeam_config::{CertificateKeyType, UserConfig};

use super::bundle::CertificateBundle;
use super::dns::{
    create_challenge_info, DigitalOceanProvider, Dns01ChallengeInfo, Dns01ChallengeManager,
    DnsProvider, PropagationConfig,
};
use super::error::{AcmeError, StorageError};
use super::storage::{AccountStore, StoredAccount};

/// Timeout for DNS provider API calls
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Polls before giving up on an order becoming ready or valid
const MAX_POLL_ATTEMPTS: u32 = 10;
const BASE_POLL_DELAY: Duration = Duration::from_secs(1);
const MAX_POLL_DELAY: Duration = Duration::from_secs(10);

/// Obtains certificates for a [`UserConfig`]
#[derive(Debug)]
pub struct AcmeRequester {
    directory_url: String,
    contact_email: String,
    tos_agreed: bool,
    key_fingerprint: String,
    key_type: CertificateKeyType,
    domains: Vec<String>,
    account_store: AccountStore,
    challenges: Dns01ChallengeManager,
}

impl AcmeRequester {
    /// Requester publishing challenges through DigitalOcean with the resolved token
    pub async fn new(config: &UserConfig) -> Result<Self, AcmeError> {
        let provider = DigitalOceanProvider::new(config.auth_token(), PROVIDER_TIMEOUT)?;
        Self::with_provider(config, Arc::new(provider)).await
    }

    /// Requester using a custom DNS provider
    pub async fn with_provider(
        config: &UserConfig,
        provider: Arc<dyn DnsProvider>,
    ) -> Result<Self, AcmeError> {
        let propagation = PropagationConfig::from_user_config(config).await?;
        let challenges = Dns01ChallengeManager::new(provider, propagation)?;

        Ok(Self {
            directory_url: config.ca_directory().to_string(),
            contact_email: config.email().to_string(),
            tos_agreed: config.tos_agreed(),
            key_fingerprint: config.account_key().fingerprint().to_string(),
            key_type: config.key_type(),
            domains: config.domains().to_vec(),
            account_store: AccountStore::for_key(config.account_key_path()),
            challenges,
        })
    }

    /// Run one issuance and return the bundle
    pub async fn obtain(&self) -> Result<CertificateBundle, AcmeError> {
        info!(
            domains = ?self.domains,
            directory = %self.directory_url,
            provider = %self.challenges.provider_name(),
            "Requesting certificate"
        );

        let account = self.account().await?;

        let identifiers: Vec<Identifier> = self
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();

        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        debug!(status = ?order.state().status, "Order created");

        match &order.state().status {
            OrderStatus::Ready => {
                info!("Order already ready, skipping challenges");
            }
            OrderStatus::Pending => {
                let mut published = Vec::new();
                let validated = self.complete_challenges(&mut order, &mut published).await;
                self.challenges.cleanup_all(&published).await;
                validated?;
            }
            status => {
                return Err(AcmeError::OrderCreation(format!(
                    "Unexpected order status {:?}",
                    status
                )));
            }
        }

        let (chain_pem, private_key) = self.finalize(&mut order).await?;
        let bundle =
            CertificateBundle::from_chain(&chain_pem, private_key, &self.domains[0])?;

        match bundle.leaf_not_after() {
            Ok(not_after) => info!(
                domain = %bundle.domain,
                expires = %not_after,
                "Certificate issued"
            ),
            Err(e) => warn!(
                domain = %bundle.domain,
                error = %e,
                "Could not read certificate expiry"
            ),
        }

        Ok(bundle)
    }

    /// Reuse the account bound to the key, or register a new one
    async fn account(&self) -> Result<Account, AcmeError> {
        let stored = self
            .account_store
            .credentials_for(&self.key_fingerprint, &self.directory_url)?;

        if let Some(credentials) = stored {
            let credentials: AccountCredentials =
                serde_json::from_value(credentials).map_err(|e| {
                    AcmeError::AccountCreation(format!("Invalid stored account: {}", e))
                })?;
            let account = Account::from_credentials(credentials).await?;
            info!(contact = %self.contact_email, "Using existing ACME account");
            return Ok(account);
        }

        let contact = format!("mailto:{}", self.contact_email);
        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &[contact.as_str()],
                terms_of_service_agreed: self.tos_agreed,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await?;

        self.account_store.save(&StoredAccount {
            key_fingerprint: self.key_fingerprint.clone(),
            directory: self.directory_url.clone(),
            contact_email: Some(self.contact_email.clone()),
            credentials: serde_json::to_value(&credentials).map_err(StorageError::from)?,
        })?;

        info!(contact = %self.contact_email, "Registered new ACME account");
        Ok(account)
    }

    /// Publish every pending DNS-01 challenge and wait for the order to validate
    ///
    /// Records are pushed to `published` before creation so the caller can
    /// remove them whatever happens here.
    async fn complete_challenges(
        &self,
        order: &mut Order,
        published: &mut Vec<Dns01ChallengeInfo>,
    ) -> Result<(), AcmeError> {
        let authorizations = order.authorizations().await?;

        for authz in &authorizations {
            #[allow(irrefutable_let_patterns)]
            let Identifier::Dns(domain) = &authz.identifier else {
                continue;
            };

            match &authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => {
                    debug!(domain = %domain, "Authorization already valid");
                    continue;
                }
                status => {
                    return Err(AcmeError::ChallengeValidation {
                        domain: domain.clone(),
                        message: format!("Authorization is {:?}", status),
                    });
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Dns01)
                .ok_or_else(|| AcmeError::NoDns01Challenge(domain.clone()))?;

            let dns_value = order.key_authorization(challenge).dns_value();
            published.push(create_challenge_info(domain, &dns_value, &challenge.url));

            let index = published.len() - 1;
            self.challenges
                .create_and_wait(&mut published[index])
                .await?;
        }

        for challenge in published.iter() {
            debug!(domain = %challenge.domain, url = %challenge.url, "Marking challenge ready");
            order.set_challenge_ready(&challenge.url).await?;
        }

        self.wait_for_status(order, OrderStatus::Ready).await
    }

    /// Poll the order with capped exponential backoff until it reaches `target`
    async fn wait_for_status(
        &self,
        order: &mut Order,
        target: OrderStatus,
    ) -> Result<(), AcmeError> {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            tokio::time::sleep(poll_delay(attempt)).await;
            let state = order.refresh().await?;

            if state.status == target {
                debug!(status = ?state.status, attempt, "Order reached expected status");
                return Ok(());
            }

            if state.status == OrderStatus::Invalid {
                let message = state
                    .error
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "order became invalid".to_string());
                return Err(AcmeError::ChallengeValidation {
                    domain: self.domains.join(","),
                    message,
                });
            }

            debug!(status = ?state.status, attempt, "Order not ready yet");
        }

        Err(AcmeError::Timeout(format!(
            "Order did not become {:?} after {} attempts",
            target, MAX_POLL_ATTEMPTS
        )))
    }

    /// Finalize with a fresh certificate key and download the chain
    async fn finalize(&self, order: &mut Order) -> Result<(String, Zeroizing<String>), AcmeError> {
        let bits = self.key_type.bits();
        debug!(key_type = %self.key_type, "Generating certificate key");

        let key = tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut OsRng, bits))
            .await
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;

        let pkcs8 = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;
        let key_pair =
            KeyPair::from_pem(&pkcs8).map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;

        let mut params = CertificateParams::new(self.domains.clone())
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;
        params.distinguished_name = DistinguishedName::new();
        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;

        order.finalize(csr.der()).await?;

        for attempt in 1..=MAX_POLL_ATTEMPTS {
            if let Some(chain) = order.certificate().await? {
                let private_key = key
                    .to_pkcs1_pem(LineEnding::LF)
                    .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;
                return Ok((chain, private_key));
            }

            if order.state().status == OrderStatus::Invalid {
                return Err(AcmeError::Finalization("order became invalid".to_string()));
            }

            tokio::time::sleep(poll_delay(attempt)).await;
        }

        Err(AcmeError::Timeout("Certificate was not issued in time".to_string()))
    }
}

/// 1s, 2s, 4s, 8s then capped
fn poll_delay(attempt: u32) -> Duration {
    let delay = BASE_POLL_DELAY.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    delay.min(MAX_POLL_DELAY)
}
