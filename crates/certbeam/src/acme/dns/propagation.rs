//! DNS propagation checking for DNS-01 challenges
//!
//! Verifies that challenge TXT records are visible from the configured
//! resolvers before the ACME server is asked to validate them.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use certbeam_config::UserConfig;

use super::provider::{challenge_record_fqdn, DnsProviderError, DnsResult};

/// Overall time allowed for a record to propagate
pub const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Interval between propagation checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

const DNS_PORT: u16 = 53;

/// Configuration for propagation checking
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// Interval between checks
    pub check_interval: Duration,
    /// Maximum time to wait for propagation
    pub timeout: Duration,
    /// Per-query timeout, resolver default when `None`
    pub query_timeout: Option<Duration>,
    /// Nameservers to query (empty = system configuration)
    pub nameservers: Vec<SocketAddr>,
    /// Require every nameserver to see the record instead of any one
    pub require_all: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            timeout: DEFAULT_PROPAGATION_TIMEOUT,
            query_timeout: None,
            nameservers: Vec::new(),
            require_all: false,
        }
    }
}

impl PropagationConfig {
    /// Derive propagation settings from the run configuration
    ///
    /// `DISABLE_CP=false` turns on the every-resolver requirement.
    pub async fn from_user_config(config: &UserConfig) -> DnsResult<Self> {
        let query_timeout = Some(config.dns_timeout()).filter(|t| !t.is_zero());

        Ok(Self {
            query_timeout,
            nameservers: resolve_nameservers(config.dns_resolvers()).await?,
            require_all: !config.disable_cp(),
            ..Self::default()
        })
    }
}

/// Append the DNS port to a resolver entry that lacks one
pub fn with_default_port(entry: &str) -> String {
    let entry = entry.trim();
    if entry.parse::<SocketAddr>().is_ok() {
        return entry.to_string();
    }
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return SocketAddr::new(ip, DNS_PORT).to_string();
    }
    match entry.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => entry.to_string(),
        _ => format!("{}:{}", entry, DNS_PORT),
    }
}

/// Turn `host[:port]` resolver entries into socket addresses
///
/// Hostnames are looked up once with the system resolver.
pub async fn resolve_nameservers(entries: &[String]) -> DnsResult<Vec<SocketAddr>> {
    let mut nameservers = Vec::with_capacity(entries.len());

    for entry in entries {
        let target = with_default_port(entry);
        if let Ok(addr) = target.parse::<SocketAddr>() {
            nameservers.push(addr);
            continue;
        }

        let addr = tokio::net::lookup_host(target.as_str())
            .await
            .map_err(|e| {
                DnsProviderError::Configuration(format!("Invalid DNS resolver '{}': {}", entry, e))
            })?
            .next()
            .ok_or_else(|| {
                DnsProviderError::Configuration(format!(
                    "DNS resolver '{}' did not resolve to any address",
                    entry
                ))
            })?;
        nameservers.push(addr);
    }

    Ok(nameservers)
}

/// DNS propagation checker
pub struct PropagationChecker {
    config: PropagationConfig,
    resolvers: Vec<(String, TokioAsyncResolver)>,
}

impl PropagationChecker {
    /// Create a propagation checker with custom configuration
    pub fn with_config(config: PropagationConfig) -> DnsResult<Self> {
        let resolvers = Self::create_resolvers(&config)?;
        Ok(Self { config, resolvers })
    }

    fn resolver_opts(config: &PropagationConfig, mut opts: ResolverOpts) -> ResolverOpts {
        if let Some(timeout) = config.query_timeout {
            opts.timeout = timeout;
        }
        opts.attempts = 2;
        opts.cache_size = 0; // Every check must hit the network
        opts.try_tcp_on_error = true;
        opts
    }

    /// One resolver per configured nameserver, or the system resolver
    fn create_resolvers(
        config: &PropagationConfig,
    ) -> DnsResult<Vec<(String, TokioAsyncResolver)>> {
        if config.nameservers.is_empty() {
            let (resolver_config, opts) =
                hickory_resolver::system_conf::read_system_conf().map_err(|e| {
                    DnsProviderError::Configuration(format!(
                        "Failed to read system DNS configuration: {}",
                        e
                    ))
                })?;
            let opts = Self::resolver_opts(config, opts);
            return Ok(vec![(
                "system".to_string(),
                TokioAsyncResolver::tokio(resolver_config, opts),
            )]);
        }

        Ok(config
            .nameservers
            .iter()
            .map(|addr| {
                let mut resolver_config = ResolverConfig::new();
                resolver_config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
                let opts = Self::resolver_opts(config, ResolverOpts::default());
                let resolver = TokioAsyncResolver::tokio(resolver_config, opts);
                (addr.to_string(), resolver)
            })
            .collect())
    }

    /// Wait until `expected_value` is visible at the challenge record of `domain`
    pub async fn wait_for_propagation(&self, domain: &str, expected_value: &str) -> DnsResult<()> {
        let record_name = format!("{}.", challenge_record_fqdn(domain));
        let start = Instant::now();
        let deadline = start + self.config.timeout;

        debug!(
            record = %record_name,
            resolvers = self.resolvers.len(),
            require_all = self.config.require_all,
            timeout_secs = self.config.timeout.as_secs(),
            "Waiting for DNS propagation"
        );

        loop {
            let mut seen = 0;
            for (label, resolver) in &self.resolvers {
                match check_record(resolver, &record_name, expected_value).await {
                    Ok(true) => seen += 1,
                    Ok(false) => {
                        trace!(
                            record = %record_name,
                            resolver = %label,
                            "Record not yet propagated"
                        );
                    }
                    Err(e) => {
                        warn!(
                            record = %record_name,
                            resolver = %label,
                            error = %e,
                            "DNS lookup error"
                        );
                    }
                }
            }

            if is_propagated(seen, self.resolvers.len(), self.config.require_all) {
                debug!(
                    record = %record_name,
                    elapsed_secs = start.elapsed().as_secs(),
                    "DNS propagation confirmed"
                );
                return Ok(());
            }

            if Instant::now() + self.config.check_interval > deadline {
                return Err(DnsProviderError::Timeout {
                    elapsed_secs: start.elapsed().as_secs(),
                });
            }

            tokio::time::sleep(self.config.check_interval).await;
        }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }
}

impl fmt::Debug for PropagationChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.resolvers.iter().map(|(l, _)| l.as_str()).collect();
        f.debug_struct("PropagationChecker")
            .field("config", &self.config)
            .field("resolvers", &labels)
            .finish()
    }
}

fn is_propagated(seen: usize, total: usize, require_all: bool) -> bool {
    if require_all {
        total > 0 && seen == total
    } else {
        seen > 0
    }
}

/// Check if a TXT record holds the expected value
async fn check_record(
    resolver: &TokioAsyncResolver,
    record_name: &str,
    expected_value: &str,
) -> DnsResult<bool> {
    match resolver.txt_lookup(record_name).await {
        Ok(records) => Ok(records.iter().any(|record| {
            // Long TXT values arrive split into several character strings
            let value: String = record
                .txt_data()
                .iter()
                .map(|data| String::from_utf8_lossy(data))
                .collect();
            value == expected_value
        })),
        Err(e) if is_absent(&e) => Ok(false),
        Err(e) => Err(DnsProviderError::Lookup {
            record: record_name.to_string(),
            message: e.to_string(),
        }),
    }
}

fn is_absent(e: &ResolveError) -> bool {
    matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. })
}
