//! Certificate trust: TOFU pins, certificate decoding and trust policy.

pub mod certificate;
pub mod tofu;

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub use certificate::CertificateView;
pub use certificate::FingerprintAlgorithm;
pub use tofu::CertStatus;
pub use tofu::TrustRecord;
pub use tofu::TrustStore;
pub use tofu::Validation;
pub use tofu::validate_certificate;
pub use tofu::validate_view;

/// How the navigator reacts to certificates the store cannot vouch for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Pins for first-contact hosts are written to disk at shutdown.
    pub trust_new_permanently: bool,
    /// Window or name mismatches proceed with a visible warning.
    pub proceed_on_invalid_certificate: bool,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            trust_new_permanently: true,
            proceed_on_invalid_certificate: true,
        }
    }
}

impl TrustPolicy {
    pub fn ephemeral() -> Self {
        Self {
            trust_new_permanently: false,
            ..Self::default()
        }
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> OrbiterResult<i64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|error| {
        OrbiterError::new(
            ErrorKind::Internal,
            "security.clock_invalid",
            format!("system clock is before the Unix epoch: {error}"),
        )
    })?;

    i64::try_from(elapsed.as_secs()).map_err(|error| {
        OrbiterError::new(
            ErrorKind::Internal,
            "security.clock_invalid",
            format!("system clock is out of range: {error}"),
        )
    })
}
