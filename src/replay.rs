use crate::audit::{AuditStore, MarkPhase};
use crate::config::ScanConfig;
use crate::error::Error;
use crate::link::{Link, Tag};
use crate::links::LinkSet;
use chrono::Local;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use rand::seq::SliceRandom;
use std::sync::Arc;
use url::Url;

const ID_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random-letter suffix appended to the timestamp. Wide enough that ids
/// generated within the same second cannot realistically collide.
const ID_SUFFIX_LEN: usize = 4;

/// Correlation token for one replayed action: a second-resolution local
/// timestamp plus random letters. The evidence query derives its time
/// window from the timestamp prefix.
pub fn browse_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| {
            *ID_LETTERS
                .choose(&mut rng)
                .expect("letter table is non-empty") as char
        })
        .collect();
    format!("{}{}", Local::now().format("%Y%m%d%H%M%S"), suffix)
}

/// The single click to perform for a link, resolved by priority: DOM id,
/// then visible text interpreted per element kind, then element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Id(String),
    LinkText(String),
    ButtonText(String),
    Name(String),
}

/// Derive the click target, or refuse when the link carries no usable
/// key at all.
pub fn resolve_target(link: &Link) -> Result<ClickTarget, Error> {
    if !link.attr_id.is_empty() {
        return Ok(ClickTarget::Id(link.attr_id.clone()));
    }
    if link.text.is_empty() {
        return Err(Error::NotResolvable {
            url: link.from.to_string(),
        });
    }
    Ok(match link.tag {
        Tag::Anchor => ClickTarget::LinkText(link.text.clone()),
        Tag::Form => ClickTarget::ButtonText(link.text.clone()),
        Tag::Clickable => ClickTarget::Name(link.text.clone()),
    })
}

/// Outcome of a replay batch. Failures are per-link and never abort the
/// batch.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub replayed: usize,
    pub failed: usize,
    /// Browse ids of the persisted artifact bundles.
    pub ids: Vec<String>,
}

/// Re-executes each link of a minimized set in a real browser,
/// bracketing every action with marker queries so it can be bound to
/// query-log evidence.
///
/// Deliberately sequential: one window, one link at a time. Interleaved
/// actions would make the start/end window ambiguous for correlation.
pub struct Replayer {
    config: Arc<ScanConfig>,
    store: Box<dyn AuditStore>,
}

impl Replayer {
    pub fn new(config: Arc<ScanConfig>, store: Box<dyn AuditStore>) -> Self {
        Self { config, store }
    }

    /// Replay every link in the set's iteration order. Returns an error
    /// only for batch-level failures (no WebDriver, no artifact
    /// directory); per-link failures are logged and counted.
    pub async fn run(&self, links: &LinkSet) -> Result<ReplaySummary, Error> {
        tokio::fs::create_dir_all(&self.config.artifact_dir).await?;

        let client = self.connect().await?;
        let main_window = client.window().await?;

        let mut summary = ReplaySummary::default();
        for link in links.iter() {
            match self.replay_link(&client, &main_window, link).await {
                Ok(id) => {
                    ::log::info!(
                        "replayed link: id={id} from={} to={}",
                        link.from,
                        link.to.as_ref().map(Url::as_str).unwrap_or("")
                    );
                    summary.replayed += 1;
                    summary.ids.push(id);
                }
                Err(e) => {
                    ::log::error!(
                        "replay failed: from={} to={} method={}: {e}",
                        link.from,
                        link.to.as_ref().map(Url::as_str).unwrap_or(""),
                        link.method.as_str()
                    );
                    summary.failed += 1;
                    close_stray_windows(&client, &main_window).await;
                }
            }
        }

        if let Err(e) = client.close().await {
            ::log::warn!("failed to close webdriver session: {e}");
        }
        Ok(summary)
    }

    async fn connect(&self) -> Result<Client, Error> {
        let webdriver_url = std::env::var("WEBDRIVER_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.config.webdriver_url.clone());
        ::log::debug!("connecting to webdriver at {webdriver_url}");
        Ok(ClientBuilder::native().connect(&webdriver_url).await?)
    }

    /// One link: fresh window, navigate, bracket the click with markers,
    /// capture artifacts, collect evidence. Every failure aborts only
    /// this link.
    async fn replay_link(
        &self,
        client: &Client,
        main_window: &WindowHandle,
        link: &Link,
    ) -> Result<String, Error> {
        let bid = browse_id();

        let window = client.new_window(true).await?;
        client.switch_to_window(window.handle).await?;

        client
            .goto(link.from.as_str())
            .await
            .map_err(|source| Error::Navigation {
                url: link.from.to_string(),
                source,
            })?;

        self.store.mark(MarkPhase::Start, &bid).await?;

        let target = resolve_target(link)?;
        self.click(client, &target, link).await?;

        self.store.mark(MarkPhase::End, &bid).await?;

        self.capture_artifacts(client, &bid).await?;

        let rows = self.store.evidence(&bid).await?;
        if rows.is_empty() {
            // Absence of server-side evidence is itself a finding.
            ::log::debug!("no query-log evidence for {bid}");
        }
        let path = self.config.artifact_dir.join(format!("{bid}.sql_log"));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&rows)?)
            .await
            .map_err(|source| Error::Capture {
                id: bid.clone(),
                source: Box::new(source),
            })?;

        client.close_window().await?;
        client.switch_to_window(main_window.clone()).await?;

        Ok(bid)
    }

    async fn click(&self, client: &Client, target: &ClickTarget, link: &Link) -> Result<(), Error> {
        let action_err = |source| Error::Action {
            url: link.from.to_string(),
            source,
        };
        let element = match target {
            ClickTarget::Id(id) => client.find(Locator::Id(id)).await,
            ClickTarget::LinkText(text) => client.find(Locator::LinkText(text)).await,
            ClickTarget::ButtonText(text) => {
                let xpath = button_xpath(text);
                client.find(Locator::XPath(&xpath)).await
            }
            ClickTarget::Name(name) => {
                let xpath = format!("//*[@name={}]", xpath_literal(name));
                client.find(Locator::XPath(&xpath)).await
            }
        }
        .map_err(action_err)?;
        element.click().await.map_err(action_err)
    }

    /// Screenshot and rendered page source, persisted under the browse
    /// id.
    async fn capture_artifacts(&self, client: &Client, bid: &str) -> Result<(), Error> {
        let capture_err = |source: Box<dyn std::error::Error + Send + Sync>| Error::Capture {
            id: bid.to_string(),
            source,
        };

        let shot = client
            .screenshot()
            .await
            .map_err(|e| capture_err(Box::new(e)))?;
        let png = self.config.artifact_dir.join(format!("{bid}.png"));
        tokio::fs::write(&png, &shot)
            .await
            .map_err(|e| capture_err(Box::new(e)))?;

        let html = client.source().await.map_err(|e| capture_err(Box::new(e)))?;
        let snapshot = self.config.artifact_dir.join(format!("{bid}.html"));
        tokio::fs::write(&snapshot, html.as_bytes())
            .await
            .map_err(|e| capture_err(Box::new(e)))?;

        Ok(())
    }
}

/// After a failed replay the extra window may still be open; close
/// everything but the main window so the next link starts clean.
async fn close_stray_windows(client: &Client, main_window: &WindowHandle) {
    let Ok(windows) = client.windows().await else {
        return;
    };
    for window in windows {
        if window != *main_window
            && client.switch_to_window(window).await.is_ok()
            && client.close_window().await.is_err()
        {
            ::log::warn!("failed to close stray window");
        }
    }
    if let Err(e) = client.switch_to_window(main_window.clone()).await {
        ::log::warn!("failed to return to main window: {e}");
    }
}

/// Match a `<button>` by its text or a button-typed `<input>` by its
/// value.
fn button_xpath(text: &str) -> String {
    let lit = xpath_literal(text);
    format!(
        "//button[normalize-space()={lit}] \
         | //input[(@type='submit' or @type='image' or @type='reset' or @type='button') \
         and @value={lit}]"
    )
}

/// Quote a string as an XPath literal, falling back to concat() when it
/// mixes both quote kinds.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s
            .split('\'')
            .map(|part| format!("'{part}'"))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
