use crate::error::Error;
use crate::extract;
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Credentials and form field names for the target application's login
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Endpoint the credentials are POSTed to.
    pub login_url: String,

    /// Form field carrying the user name.
    #[serde(default = "default_form_username")]
    pub form_username: String,

    pub username: String,

    /// Form field carrying the password.
    #[serde(default = "default_form_password")]
    pub form_password: String,

    pub password: String,
}

/// Configuration for one discovery-and-replay run.
///
/// Validated once at startup and passed by reference into both the
/// discovery session and the replay engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// URL the crawl starts from.
    pub entry: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Additional hosts the fetch engine may request; the entry host is
    /// always allowed.
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Maximum traversal depth from the entry page.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of concurrent fetches.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// CSS selector matching actionable elements.
    #[serde(default = "default_link_selector")]
    pub link_selector: String,

    /// Whether discovered POST forms are actually submitted during
    /// traversal.
    #[serde(default)]
    pub do_post: bool,

    /// Login credentials; absent means the crawl runs unauthenticated.
    #[serde(default)]
    pub login: Option<LoginConfig>,

    /// Marker string whose presence in a response body proves the session
    /// is still authenticated.
    #[serde(default = "default_check_login")]
    pub check_login: String,

    /// Output file stem; a timestamp and format extension are appended.
    #[serde(default = "default_out_file")]
    pub out_file: String,

    #[serde(default)]
    pub out_format: OutputFormat,

    /// Regex patterns for URLs to include during traversal.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude; these win over includes.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// WebDriver endpoint used by the replay engine.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Path of the SQLite query-log store; absent means an in-memory
    /// store that only holds this run's marker statements.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Table the query-log rows live in.
    #[serde(default = "default_log_table")]
    pub log_table: String,

    /// Directory replay artifacts are written to.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ScanConfig {
    /// Create a configuration with default values for everything but the
    /// entry URL.
    pub fn new(entry: &str) -> Self {
        serde_json::from_value(serde_json::json!({ "entry": entry }))
            .expect("minimal config is deserializable")
    }

    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Check every value that later stages depend on. Called once before
    /// any work starts; failures here terminate the run.
    pub fn validate(&self) -> Result<(), Error> {
        let entry = self.entry_url()?;
        if entry.host_str().is_none() {
            return Err(Error::Config(format!("entry {} has no host", self.entry)));
        }

        extract::parse_selector(&self.link_selector)?;

        if let Some(login) = &self.login {
            Url::parse(&login.login_url).map_err(|source| Error::InvalidUrl {
                raw: login.login_url.clone(),
                source,
            })?;
        }

        if self.log_table.is_empty()
            || !self
                .log_table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "log table name {:?} is not a plain identifier",
                self.log_table
            )));
        }

        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".into()));
        }

        Ok(())
    }

    pub fn entry_url(&self) -> Result<Url, Error> {
        Url::parse(&self.entry).map_err(|source| Error::InvalidUrl {
            raw: self.entry.clone(),
            source,
        })
    }
}

fn default_user_agent() -> String {
    "linkaudit".to_string()
}

fn default_max_depth() -> usize {
    2
}

fn default_max_concurrency() -> usize {
    4
}

fn default_link_selector() -> String {
    "a[href], form, [onclick]".to_string()
}

fn default_check_login() -> String {
    "loggedin".to_string()
}

fn default_out_file() -> String {
    "output".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_log_table() -> String {
    "general_log".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_form_username() -> String {
    "username".to_string()
}

fn default_form_password() -> String {
    "password".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = ScanConfig::new("http://example.com/");
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.link_selector, "a[href], form, [onclick]");
        assert_eq!(config.check_login, "loggedin");
        assert_eq!(config.out_format, OutputFormat::Csv);
        assert!(config.login.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "entry": "http://example.com/",
                "max_depth": 5,
                "do_post": true,
                "out_format": "json",
                "login": {{
                    "login_url": "http://example.com/login",
                    "username": "u",
                    "password": "p"
                }}
            }}"#
        )
        .unwrap();

        let config = ScanConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_depth, 5);
        assert!(config.do_post);
        assert_eq!(config.out_format, OutputFormat::Json);
        let login = config.login.unwrap();
        assert_eq!(login.form_username, "username");
        assert_eq!(login.username, "u");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ScanConfig::new("not a url");
        assert!(config.validate().is_err());

        config = ScanConfig::new("http://example.com/");
        config.link_selector = "a[".to_string();
        assert!(config.validate().is_err());

        config = ScanConfig::new("http://example.com/");
        config.log_table = "general_log; drop".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_output_format_is_a_config_error() {
        let result: Result<ScanConfig, _> =
            serde_json::from_str(r#"{"entry": "http://x/", "out_format": "xml"}"#);
        assert!(result.is_err());
    }
}
