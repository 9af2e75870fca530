use clap::Parser;
use linkaudit::config::ScanConfig;
use linkaudit::error::Error;
use linkaudit::output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "linkaudit")]
#[command(about = "Discovers a site's actionable surface and audits each action in a real browser")]
#[command(version)]
pub struct Args {
    /// Entry URL to start discovery from
    pub entry: Option<String>,

    /// JSON configuration file; CLI flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output file stem (timestamp and extension are appended)
    #[arg(long)]
    pub out_file: Option<String>,

    /// Output format: csv or json
    #[arg(long)]
    pub out_format: Option<String>,

    /// Maximum traversal depth
    #[arg(short = 'd', long)]
    pub max_depth: Option<usize>,

    /// Number of concurrent fetch workers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Submit discovered POST forms during traversal
    #[arg(long)]
    pub do_post: bool,

    /// Replay the summarized link set through a browser after discovery
    #[arg(short, long)]
    pub replay: bool,

    /// WebDriver endpoint (WEBDRIVER_URL env var also works)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// SQLite query-log store path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Directory replay artifacts are written to
    #[arg(long)]
    pub artifacts: Option<PathBuf>,
}

impl Args {
    /// Resolve the effective configuration: the config file (or the bare
    /// entry URL) first, CLI overrides on top.
    pub fn into_config(self) -> Result<ScanConfig, Error> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_file(path)?,
            None => {
                let entry = self.entry.clone().ok_or_else(|| {
                    Error::Config("an entry URL or --config file is required".into())
                })?;
                ScanConfig::new(&entry)
            }
        };

        if let Some(entry) = self.entry {
            config.entry = entry;
        }
        if let Some(out_file) = self.out_file {
            config.out_file = out_file;
        }
        if let Some(out_format) = self.out_format {
            config.out_format = out_format.parse::<OutputFormat>()?;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if self.do_post {
            config.do_post = true;
        }
        if let Some(webdriver_url) = self.webdriver_url {
            config.webdriver_url = webdriver_url;
        }
        if let Some(db) = self.db {
            config.db_path = Some(db);
        }
        if let Some(artifacts) = self.artifacts {
            config.artifact_dir = artifacts;
        }

        Ok(config)
    }
}
