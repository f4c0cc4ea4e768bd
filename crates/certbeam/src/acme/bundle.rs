//! Issued certificate bundle

use x509_parser::time::ASN1Time;
use zeroize::Zeroizing;

use super::error::AcmeError;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Everything one issuance produces
#[derive(Clone)]
pub struct CertificateBundle {
    /// Full chain PEM, leaf first
    pub certificate: String,
    /// Certificate private key PEM (PKCS#1)
    pub private_key: Zeroizing<String>,
    /// Chain minus the leaf
    pub issuer_certificate: String,
    /// First requested domain
    pub domain: String,
}

impl CertificateBundle {
    /// Split a PEM chain downloaded from the CA into a bundle
    pub fn from_chain(
        chain_pem: &str,
        private_key: Zeroizing<String>,
        domain: &str,
    ) -> Result<Self, AcmeError> {
        let blocks = pem::parse_many(chain_pem)
            .map_err(|e| AcmeError::CertificateParse(format!("Invalid PEM chain: {}", e)))?;

        let certificates: Vec<pem::Pem> = blocks
            .into_iter()
            .filter(|block| block.tag() == CERTIFICATE_TAG)
            .collect();

        if certificates.is_empty() {
            return Err(AcmeError::CertificateParse(
                "Chain contains no certificates".to_string(),
            ));
        }

        let issuer_certificate = pem::encode_many_config(
            &certificates[1..],
            pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
        );

        Ok(Self {
            certificate: chain_pem.to_string(),
            private_key,
            issuer_certificate,
            domain: domain.to_string(),
        })
    }

    /// Expiry of the leaf certificate
    pub fn leaf_not_after(&self) -> Result<ASN1Time, AcmeError> {
        let leaf = pem::parse(&self.certificate)
            .map_err(|e| AcmeError::CertificateParse(format!("Invalid leaf PEM: {}", e)))?;
        let (_, cert) = x509_parser::parse_x509_certificate(leaf.contents())
            .map_err(|e| AcmeError::CertificateParse(format!("Invalid X509 certificate: {}", e)))?;

        Ok(cert.validity().not_after)
    }
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("domain", &self.domain)
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}
