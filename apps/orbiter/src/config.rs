//! User configuration read from `<config_dir>/orbiter/config.toml`.

use ob_browser::BrowserOptions;
use ob_net::ClientOptions;
use ob_security::TrustPolicy;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing::warn;

const MAX_FILE_SIZE: u64 = 64 * 1024;

/// Settings parsed from TOML; every key is optional.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Page opened at startup when no URL is given on the command line.
    pub home: Option<String>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Request lines of this size or more, terminator included, are refused.
    pub max_request_bytes: usize,
    pub history_limit: usize,
    pub download_dir: Option<PathBuf>,
    pub trust_new_permanently: bool,
    pub proceed_on_invalid_certificate: bool,
    /// Never read or write the known-hosts file.
    pub ephemeral: bool,
}

impl Default for Config {
    fn default() -> Self {
        let client = ClientOptions::default();
        let trust = TrustPolicy::default();
        Self {
            home: None,
            connect_timeout_secs: client.connect_timeout.as_secs(),
            read_timeout_secs: client.read_timeout.as_secs(),
            max_request_bytes: client.max_request_bytes,
            history_limit: BrowserOptions::default().history_limit,
            download_dir: None,
            trust_new_permanently: trust.trust_new_permanently,
            proceed_on_invalid_certificate: trust.proceed_on_invalid_certificate,
            ephemeral: false,
        }
    }
}

impl Config {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_request_bytes: self.max_request_bytes,
            ..ClientOptions::default()
        }
    }

    /// Pins never outlive the process in ephemeral mode.
    pub fn trust_policy(&self, ephemeral: bool) -> TrustPolicy {
        TrustPolicy {
            trust_new_permanently: self.trust_new_permanently && !ephemeral,
            proceed_on_invalid_certificate: self.proceed_on_invalid_certificate,
        }
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            history_limit: self.history_limit,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("orbiter").join("config.toml"))
}

/// Loads the user config; any problem falls back to defaults.
pub fn load_config() -> Config {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => Config::default(),
    }
}

pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            if error.kind() == std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), "no config file");
            } else {
                warn!(path = %path.display(), %error, "failed to read config");
            }
            return Config::default();
        }
    };

    if content.len() as u64 > MAX_FILE_SIZE {
        warn!(bytes = content.len(), "config file too large, using defaults");
        return Config::default();
    }

    match toml::from_str(&content) {
        Ok(config) => config,
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse config");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use super::load_config_from;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;

    fn parse(text: &str) -> Config {
        match toml::from_str(text) {
            Ok(config) => config,
            Err(error) => panic!("{error}"),
        }
    }

    fn temp_config_path(name: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("orbiter-config-test-{stamp}-{name}.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("");
        assert_eq!(config, Config::default());
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.max_request_bytes, 1024);
        assert_eq!(config.history_limit, 1000);
        assert!(config.trust_new_permanently);
    }

    #[test]
    fn parses_kebab_case_keys() {
        let config = parse(
            r#"
home = "gemini://home.test/"
connect-timeout-secs = 3
read-timeout-secs = 30
max-request-bytes = 512
history-limit = 50
download-dir = "/tmp/capsules"
trust-new-permanently = false
proceed-on-invalid-certificate = false
ephemeral = true
"#,
        );

        assert_eq!(config.home.as_deref(), Some("gemini://home.test/"));
        assert_eq!(config.download_dir, Some(PathBuf::from("/tmp/capsules")));
        assert!(config.ephemeral);

        let client = config.client_options();
        assert_eq!(client.connect_timeout, Duration::from_secs(3));
        assert_eq!(client.read_timeout, Duration::from_secs(30));
        assert_eq!(client.max_request_bytes, 512);
        assert_eq!(config.browser_options().history_limit, 50);
        assert!(!config.trust_policy(false).proceed_on_invalid_certificate);
    }

    #[test]
    fn ephemeral_mode_never_pins_permanently() {
        let config = Config::default();
        assert!(config.trust_policy(false).trust_new_permanently);
        assert!(!config.trust_policy(true).trust_new_permanently);
    }

    #[test]
    fn broken_or_missing_files_fall_back_to_defaults() {
        let missing = temp_config_path("missing");
        assert_eq!(load_config_from(&missing), Config::default());

        let broken = temp_config_path("broken");
        if let Err(error) = fs::write(&broken, "history-limit = \"many\"") {
            panic!("{error}");
        }
        assert_eq!(load_config_from(&broken), Config::default());
        let _ = fs::remove_file(broken);

        let valid = temp_config_path("valid");
        if let Err(error) = fs::write(&valid, "history-limit = 7") {
            panic!("{error}");
        }
        assert_eq!(load_config_from(&valid).history_limit, 7);
        let _ = fs::remove_file(valid);
    }
}
