//! certbeam - Main entry point
//!
//! All settings come from the environment; the command line only controls
//! logging and whether to stop after validating configuration.
//!
//! The ACME account is recorded in `<ACCOUNT_KEY_FILE>.acme.json` and reused
//! only while the account key and CA directory stay the same.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use certbeam::acme::{AcmeRequester, OutputWriter};
use certbeam_config::{build_config, CredentialResolver, ProcessEnv, UserConfig};

const ACCOUNT_HELP: &str = "\
The key in ACCOUNT_KEY_FILE does not sign ACME requests. The first run registers an \
account and stores it as <ACCOUNT_KEY_FILE>.acme.json; an account.key copied from \
lego or another client therefore starts a new ACME account.";

/// certbeam - ACME DNS-01 certificate issuer
#[derive(Parser, Debug)]
#[command(name = "certbeam")]
#[command(author, version, about, long_about = None)]
#[command(after_help = ACCOUNT_HELP)]
struct Cli {
    /// Validate configuration and exit without contacting the CA
    #[arg(long = "check")]
    check: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;

    runtime.block_on(run(cli.check))
}

async fn run(check: bool) -> Result<()> {
    let env = ProcessEnv::from_env().context("Failed to read environment")?;
    let resolver = CredentialResolver::new().context("Failed to create credential resolver")?;
    let config = build_config(&env, &resolver)
        .await
        .context("Configuration is invalid")?;

    if check {
        log_summary(&config);
        println!("certbeam: configuration test is successful");
        return Ok(());
    }

    let requester = AcmeRequester::new(&config)
        .await
        .context("Failed to set up ACME requester")?;
    let bundle = requester
        .obtain()
        .await
        .context("Failed to obtain certificate")?;

    let [cert, key, issuer] = OutputWriter::new(config.output_directory())
        .write(config.alias(), &bundle)
        .context("Failed to write certificate files")?;

    info!(
        certificate = %cert.display(),
        key = %key.display(),
        issuer = %issuer.display(),
        "Certificate written"
    );
    Ok(())
}

fn log_summary(config: &UserConfig) {
    info!("Configuration test successful:");
    info!("  - domains: {}", config.domains().join(", "));
    info!("  - alias: {}", config.alias());
    info!("  - CA directory: {}", config.ca_directory());
    info!("  - certificate key: {}", config.key_type());
    info!(
        "  - account key: {} ({})",
        config.account_key_path().display(),
        config.account_key().algorithm()
    );
    info!("  - DNS token source: {:?}", config.token_source());
    if !config.dns_resolvers().is_empty() {
        info!("  - DNS resolvers: {}", config.dns_resolvers().join(", "));
    }
    info!("  - output directory: {}", config.output_directory().display());
}
