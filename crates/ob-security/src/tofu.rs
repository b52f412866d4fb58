//! Trust-on-first-use store and certificate validation.

use crate::certificate::CertificateView;
use crate::certificate::FingerprintAlgorithm;
use crate::certificate::normalize_host;
use std::collections::BTreeMap;
use tracing::debug;
use tracing::info;

/// Classification of a presented certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    /// Known host whose pin matches, or whose pin has itself expired.
    Valid,
    /// Host absent from the store.
    ValidNew,
    /// Unexpired pin differs from the presented certificate.
    WrongFingerprint,
    NotValidYet,
    Expired,
    BadDomain,
    /// Certificate missing or undecodable.
    Error,
}

impl CertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::ValidNew => "valid-new",
            Self::WrongFingerprint => "wrong-fingerprint",
            Self::NotValidYet => "not-valid-yet",
            Self::Expired => "expired",
            Self::BadDomain => "bad-domain",
            Self::Error => "error",
        }
    }

    /// Validity-window or name mismatch; the caller decides whether to go on.
    pub fn is_invalid(self) -> bool {
        matches!(self, Self::NotValidYet | Self::Expired | Self::BadDomain)
    }
}

/// Pin for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRecord {
    pub algorithm: FingerprintAlgorithm,
    pub fingerprint: String,
    /// Unix seconds after which the pin no longer guards the host.
    pub expiry: i64,
    pub persistent: bool,
}

impl TrustRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry < now
    }
}

/// Host to pin mapping, mutated only through [`TrustStore::trust`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    records: BTreeMap<String, TrustRecord>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<&TrustRecord> {
        self.records.get(&normalize_host(host))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrustRecord)> + '_ {
        self.records
            .iter()
            .map(|(host, record)| (host.as_str(), record))
    }

    /// Records destined for durable storage, sorted by host.
    pub fn persistent_records(&self) -> impl Iterator<Item = (&str, &TrustRecord)> + '_ {
        self.iter().filter(|(_, record)| record.persistent)
    }

    /// Pins `fingerprint` for `host`, replacing any previous record.
    pub fn trust(
        &mut self,
        host: &str,
        algorithm: FingerprintAlgorithm,
        fingerprint: impl Into<String>,
        expiry: i64,
        persistent: bool,
    ) {
        let host = normalize_host(host);
        let fingerprint = fingerprint.into().to_ascii_lowercase();
        info!(
            host = host.as_str(),
            algorithm = algorithm.as_str(),
            persistent,
            "trusting certificate"
        );
        self.records.insert(
            host,
            TrustRecord {
                algorithm,
                fingerprint,
                expiry,
                persistent,
            },
        );
    }

    /// Pins the certificate in `view` until its own expiry.
    pub fn trust_certificate(&mut self, host: &str, view: &CertificateView, persistent: bool) {
        let algorithm = FingerprintAlgorithm::default();
        self.trust(
            host,
            algorithm,
            view.fingerprint(algorithm),
            view.not_after,
            persistent,
        );
    }
}

/// Outcome of [`validate_certificate`]; `certificate` is set whenever the
/// bytes decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub status: CertStatus,
    pub certificate: Option<CertificateView>,
}

/// Classifies the certificate presented by `host` at time `now`.
///
/// Checks run in order: decoding, validity window, name applicability, then
/// the stored pin. The store is never modified.
pub fn validate_certificate(
    der: Option<&[u8]>,
    host: &str,
    store: &TrustStore,
    now: i64,
) -> Validation {
    let Some(der) = der else {
        debug!(host, "no peer certificate presented");
        return Validation {
            status: CertStatus::Error,
            certificate: None,
        };
    };

    let view = match CertificateView::from_der(der) {
        Ok(view) => view,
        Err(error) => {
            debug!(host, %error, "peer certificate rejected");
            return Validation {
                status: CertStatus::Error,
                certificate: None,
            };
        }
    };

    let status = validate_view(&view, host, store, now);
    debug!(host, status = status.as_str(), "certificate validated");
    Validation {
        status,
        certificate: Some(view),
    }
}

/// Same as [`validate_certificate`] for an already decoded certificate.
pub fn validate_view(
    view: &CertificateView,
    host: &str,
    store: &TrustStore,
    now: i64,
) -> CertStatus {
    if view.is_not_yet_valid(now) {
        return CertStatus::NotValidYet;
    }

    if view.is_expired(now) {
        return CertStatus::Expired;
    }

    if !view.matches_host(host) {
        return CertStatus::BadDomain;
    }

    let Some(record) = store.get(host) else {
        return CertStatus::ValidNew;
    };

    if record.is_expired(now) {
        return CertStatus::Valid;
    }

    if view.fingerprint(record.algorithm) == record.fingerprint {
        CertStatus::Valid
    } else {
        CertStatus::WrongFingerprint
    }
}
