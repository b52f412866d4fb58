//! Decoded view of a peer certificate and its fingerprint.

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use sha2::Digest;
use sha2::Sha512;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

/// Digest used as a certificate's trust identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintAlgorithm {
    #[default]
    Sha512,
}

impl FingerprintAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Lowercase hex digest of `der`.
    pub fn fingerprint(self, der: &[u8]) -> String {
        match self {
            Self::Sha512 => hex::encode(Sha512::digest(der)),
        }
    }

    /// Length in hex characters of a digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha512 => 128,
        }
    }
}

/// Validity window, applicable names and raw bytes of one certificate.
///
/// Produced per connection attempt and dropped after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateView {
    pub not_before: i64,
    pub not_after: i64,
    pub domains: Vec<String>,
    der: Vec<u8>,
}

impl CertificateView {
    pub fn from_der(der: &[u8]) -> OrbiterResult<Self> {
        let (_, cert) = parse_x509_certificate(der).map_err(|error| {
            OrbiterError::new(
                ErrorKind::ErrorCert,
                "security.cert.decode_failed",
                format!("failed to decode certificate: {error}"),
            )
        })?;

        let validity = cert.validity();
        let mut domains = Vec::new();

        let alternative_names = cert.subject_alternative_name().map_err(|error| {
            OrbiterError::new(
                ErrorKind::ErrorCert,
                "security.cert.san_invalid",
                format!("failed to decode subject alternative names: {error}"),
            )
        })?;

        if let Some(extension) = alternative_names {
            for name in &extension.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => push_domain(&mut domains, dns),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(address) = ip_from_bytes(bytes) {
                            push_domain(&mut domains, &address);
                        }
                    }
                    _ => {}
                }
            }
        }

        // Names are taken from the subject only when no SAN entry applies.
        if domains.is_empty() {
            for attribute in cert.subject().iter_common_name() {
                if let Ok(common_name) = attribute.as_str() {
                    push_domain(&mut domains, common_name);
                }
            }
        }

        Ok(Self {
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
            domains,
            der: der.to_vec(),
        })
    }

    pub fn fingerprint(&self, algorithm: FingerprintAlgorithm) -> String {
        algorithm.fingerprint(&self.der)
    }

    pub fn is_not_yet_valid(&self, now: i64) -> bool {
        now < self.not_before
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.not_after
    }

    /// Case-insensitive name check; `*.` entries match exactly one label.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.domains
            .iter()
            .any(|domain| domain_matches(domain, &host))
    }
}

pub(crate) fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn push_domain(domains: &mut Vec<String>, name: &str) {
    let name = normalize_host(name);
    if !name.is_empty() && !domains.contains(&name) {
        domains.push(name);
    }
}

fn domain_matches(pattern: &str, host: &str) -> bool {
    if pattern == host {
        return true;
    }

    let Some(suffix) = pattern.strip_prefix("*.") else {
        return false;
    };

    match host.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest == suffix,
        None => false,
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<String> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Some(Ipv4Addr::from(octets).to_string());
    }

    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Some(Ipv6Addr::from(octets).to_string());
    }

    None
}
