use thiserror::Error;

/// Crate-wide error type.
///
/// Per-link and per-action failures are caught at their loop boundary and
/// logged; only configuration and output errors terminate a run.
#[derive(Debug, Error)]
pub enum Error {
    /// An element's endpoint could not be resolved to an absolute URL.
    /// Skips the one action it was raised for.
    #[error("invalid url {raw:?}: {source}")]
    InvalidUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },

    /// The configured login submission failed. The crawl proceeds
    /// unauthenticated.
    #[error("login against {url} failed: {source}")]
    Login {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Browser navigation failed. Fatal to one link's replay only.
    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: fantoccini::error::CmdError,
    },

    /// No click target could be derived from the link's id, text or name.
    /// Fatal to one link's replay only.
    #[error("no resolvable click target on {url}")]
    NotResolvable { url: String },

    /// Locating or clicking the resolved target failed. Fatal to one
    /// link's replay only.
    #[error("action on {url} failed: {source}")]
    Action {
        url: String,
        #[source]
        source: fantoccini::error::CmdError,
    },

    /// Screenshot, page-source capture or artifact persistence failed.
    /// Fatal to one link's replay only.
    #[error("capture for {id} failed: {source}")]
    Capture {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The requested output format is not recognized. Process-level.
    #[error("unsupported output format {0:?}")]
    UnsupportedOutputFormat(String),

    /// Invalid configuration value. Process-level.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("webdriver session error: {0}")]
    Session(#[from] fantoccini::error::NewSessionError),

    #[error("webdriver command error: {0}")]
    Driver(#[from] fantoccini::error::CmdError),

    #[error("audit store error: {0}")]
    Store(#[from] tokio_rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}
