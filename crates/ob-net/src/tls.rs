//! TLS handshake policy for capsule connections.

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use std::net::IpAddr;

/// Supported TLS protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

impl TlsVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_2 => "TLS1.2",
            Self::V1_3 => "TLS1.3",
        }
    }
}

/// Per-connection handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsHandshakeConfig {
    pub server_name: String,
    pub minimum_version: TlsVersion,
    pub maximum_version: TlsVersion,
    pub send_sni: bool,
}

/// Protocol bounds for every handshake.
///
/// Certificate chains are never checked against CA roots here; the peer
/// certificate is handed back to the caller for TOFU validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    pub minimum_version: TlsVersion,
    pub maximum_version: TlsVersion,
    pub require_sni: bool,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            minimum_version: TlsVersion::V1_2,
            maximum_version: TlsVersion::V1_3,
            require_sni: true,
        }
    }
}

impl TlsPolicy {
    pub fn validate(&self) -> OrbiterResult<()> {
        if self.minimum_version > self.maximum_version {
            return Err(OrbiterError::new(
                ErrorKind::Config,
                "net.tls.invalid_version_range",
                format!(
                    "minimum TLS version {} is above maximum {}",
                    self.minimum_version.as_str(),
                    self.maximum_version.as_str()
                ),
            ));
        }

        Ok(())
    }

    /// Handshake for `host`; SNI is omitted for raw IP addresses.
    pub fn handshake_config_for(&self, host: &str) -> OrbiterResult<TlsHandshakeConfig> {
        self.validate()?;

        if host.is_empty() {
            return Err(OrbiterError::new(
                ErrorKind::InvalidUrl,
                "net.tls.server_name_missing",
                "TLS handshake requires a host name",
            ));
        }

        Ok(TlsHandshakeConfig {
            server_name: host.to_owned(),
            minimum_version: self.minimum_version,
            maximum_version: self.maximum_version,
            send_sni: self.require_sni && !is_ip_address(host),
        })
    }
}

fn is_ip_address(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::TlsPolicy;
    use super::TlsVersion;

    #[test]
    fn validates_version_range() {
        let policy = TlsPolicy {
            minimum_version: TlsVersion::V1_3,
            maximum_version: TlsVersion::V1_2,
            ..TlsPolicy::default()
        };

        assert!(policy.validate().is_err());
        assert!(policy.handshake_config_for("example.org").is_err());
    }

    #[test]
    fn sni_is_skipped_for_ip_hosts() {
        let policy = TlsPolicy::default();
        let named = match policy.handshake_config_for("example.org") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(named.send_sni);
        assert_eq!(named.minimum_version, TlsVersion::V1_2);

        let literal = match policy.handshake_config_for("::1") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(!literal.send_sni);
    }

    #[test]
    fn inverted_version_range_is_rejected() {
        let modern = TlsPolicy {
            minimum_version: TlsVersion::V1_3,
            ..TlsPolicy::default()
        };
        assert!(modern.validate().is_ok());

        let inverted = TlsPolicy {
            minimum_version: TlsVersion::V1_3,
            maximum_version: TlsVersion::V1_2,
            ..TlsPolicy::default()
        };
        let validated = inverted.validate();
        assert!(validated.is_err());
        if let Err(error) = validated {
            assert_eq!(
                error.message,
                "minimum TLS version TLS1.3 is above maximum TLS1.2"
            );
        }
    }
}
