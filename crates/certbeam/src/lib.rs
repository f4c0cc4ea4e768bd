//! certbeam
//!
//! Issues TLS certificates from an ACME CA, proving domain control with
//! DNS-01 challenges published through DigitalOcean.
//!
//! Configuration is assembled by [`certbeam_config`]; this crate runs the
//! issuance and writes the result:
//!
//! ```ignore
//! use certbeam::acme::{AcmeRequester, OutputWriter};
//!
//! let requester = AcmeRequester::new(&config).await?;
//! let bundle = requester.obtain().await?;
//! OutputWriter::new(config.output_directory()).write(config.alias(), &bundle)?;
//! ```

pub mod acme;

pub use acme::{AcmeError, AcmeRequester, CertificateBundle, OutputWriter};
