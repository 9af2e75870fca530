use crate::config::ScanConfig;
use crate::crawlers::web::{FetchJob, PageFetch};
use crate::error::Error;
use crate::extract::{self, ElementCapture};
use crate::link::{Link, Method};
use crate::links::LinkSet;
use scraper::Selector;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use url::Url;

/// What became of one discovered action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Recorded and handed to the fetch engine for traversal.
    Enqueued,
    /// Exact duplicate or self-referential action; nothing recorded.
    Duplicate,
    /// Recorded, but the element had no target to traverse.
    NoTarget,
    /// Recorded, but inline-script targets are never traversed.
    InlineScript,
}

/// The crawl-time consumer of page fetches.
///
/// Invoked concurrently from every fetch worker; the link set behind the
/// mutex is the only shared mutable state, and it is only ever touched
/// through its `add`.
#[derive(Clone)]
pub struct Discovery {
    config: Arc<ScanConfig>,
    http: reqwest::Client,
    selector: Selector,
    links: Arc<Mutex<LinkSet>>,
}

impl Discovery {
    pub fn new(config: Arc<ScanConfig>, http: reqwest::Client) -> Result<Self, Error> {
        let selector = extract::parse_selector(&config.link_selector)?;
        Ok(Self {
            config,
            http,
            selector,
            links: Arc::new(Mutex::new(LinkSet::new())),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Snapshot of everything discovered so far.
    pub async fn links(&self) -> LinkSet {
        self.links.lock().await.clone()
    }

    /// Submit the configured credentials to the login endpoint. The
    /// cookie store on the shared client carries the session afterwards.
    pub async fn login(&self) -> Result<(), Error> {
        let Some(login) = &self.config.login else {
            return Ok(());
        };
        let form = vec![
            (login.form_username.clone(), login.username.clone()),
            (login.form_password.clone(), login.password.clone()),
        ];
        self.http
            .post(&login.login_url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| Error::Login {
                url: login.login_url.clone(),
                source,
            })?;
        ::log::info!("logged in via {}", login.login_url);
        Ok(())
    }

    /// A page proves the session is still authenticated by containing the
    /// configured marker. Unauthenticated crawls always pass.
    fn is_logged_in(&self, body: &str) -> bool {
        self.config.login.is_none() || body.contains(&self.config.check_login)
    }

    /// Process every actionable element of a fetched page.
    pub async fn on_page(&self, page: &PageFetch, job_tx: &mpsc::Sender<FetchJob>) {
        let captures = extract::extract_actions(&page.body, &self.selector);
        ::log::debug!("{}: {} actionable elements", page.url, captures.len());

        for capture in &captures {
            match self.process_capture(page, capture, job_tx).await {
                Ok(Disposition::Enqueued) => {}
                Ok(disposition) => {
                    ::log::debug!("{}: element not traversed: {disposition:?}", page.url)
                }
                Err(e) => ::log::error!("{}: failed to process element: {e}", page.url),
            }
        }
    }

    /// One discovered action: build, deduplicate, recover login if the
    /// session expired, then dispatch.
    async fn process_capture(
        &self,
        page: &PageFetch,
        capture: &ElementCapture,
        job_tx: &mpsc::Sender<FetchJob>,
    ) -> Result<Disposition, Error> {
        let link = Link::from_capture(&page.url, capture, &self.config.link_selector)?;
        log_link("found link", &link);

        let added = { self.links.lock().await.add(link.clone()) };
        if !added {
            log_link("already known or self-referential", &link);
            return Ok(Disposition::Duplicate);
        }

        if !self.is_logged_in(&page.body) {
            ::log::warn!("{}: logged-in marker missing, re-authenticating", page.url);
            // Recovery, not failure: the action below is still dispatched
            // exactly once, authenticated or not.
            if let Err(e) = self.login().await {
                ::log::error!("re-authentication failed: {e}");
            }
        }

        self.dispatch(&link, capture, page.depth, job_tx).await
    }

    /// Hand the action to the fetch engine: submit POST forms when
    /// enabled, otherwise request the target for further traversal.
    async fn dispatch(
        &self,
        link: &Link,
        capture: &ElementCapture,
        depth: usize,
        job_tx: &mpsc::Sender<FetchJob>,
    ) -> Result<Disposition, Error> {
        let Some(to) = &link.to else {
            return Ok(Disposition::NoTarget);
        };

        if link.method == Method::Post && self.config.do_post {
            let form = form_params(capture);
            ::log::debug!("submitting form to {to} with {} fields", form.len());
            self.enqueue(
                FetchJob::Post {
                    url: to.clone(),
                    form,
                    depth: depth + 1,
                },
                job_tx,
            )
            .await;
            return Ok(Disposition::Enqueued);
        }

        if link.is_inline_script() {
            log_link("inline-script target, recorded but not visited", link);
            return Ok(Disposition::InlineScript);
        }

        self.enqueue(
            FetchJob::Get {
                url: to.clone(),
                depth: depth + 1,
            },
            job_tx,
        )
        .await;
        Ok(Disposition::Enqueued)
    }

    async fn enqueue(&self, job: FetchJob, job_tx: &mpsc::Sender<FetchJob>) {
        let url: Url = job.url().clone();
        if job_tx.send(job).await.is_err() {
            ::log::error!("frontier closed, dropping {url}");
        }
    }
}

/// Name/value pairs of a form's data-bearing controls. Buttons submit
/// the form, they do not carry payload.
fn form_params(capture: &ElementCapture) -> Vec<(String, String)> {
    capture
        .controls
        .iter()
        .filter(|c| !c.is_button_like() && !c.name.is_empty())
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect()
}

fn log_link(msg: &str, link: &Link) {
    ::log::debug!(
        "{msg}: from={} to={} id={:?} onclick={:?} text={:?} tag={:?} method={}",
        link.from,
        link.to.as_ref().map(Url::as_str).unwrap_or(""),
        link.attr_id,
        link.attr_onclick,
        link.text,
        link.tag,
        link.method.as_str(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoginConfig;

    fn discovery(config: ScanConfig) -> Discovery {
        Discovery::new(Arc::new(config), reqwest::Client::new()).unwrap()
    }

    fn page(url: &str, body: &str) -> PageFetch {
        PageFetch {
            url: Url::parse(url).unwrap(),
            body: body.to_string(),
            depth: 0,
        }
    }

    #[tokio::test]
    async fn anchors_are_recorded_and_enqueued() {
        let session = discovery(ScanConfig::new("http://example.com/"));
        let (tx, mut rx) = mpsc::channel(16);

        let html = r#"<a href="/next">Next</a>"#;
        session.on_page(&page("http://example.com/", html), &tx).await;

        let links = session.links().await;
        assert_eq!(links.len(), 1);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.url().as_str(), "http://example.com/next");
        assert_eq!(job.depth(), 1);
        assert_eq!(job.method(), Method::Get);
    }

    #[tokio::test]
    async fn duplicates_and_self_loops_are_rejected() {
        let session = discovery(ScanConfig::new("http://example.com/"));
        let (tx, mut rx) = mpsc::channel(16);

        let html = r#"
            <a href="/next">Next</a>
            <a href="/next">Next</a>
            <a href="http://example.com/">Self</a>"#;
        session.on_page(&page("http://example.com/", html), &tx).await;

        let links = session.links().await;
        assert_eq!(links.len(), 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn inline_script_targets_are_recorded_but_not_enqueued() {
        let session = discovery(ScanConfig::new("http://example.com/"));
        let (tx, mut rx) = mpsc::channel(16);

        let html = r#"<a href="javascript:open()">Popup</a>"#;
        session.on_page(&page("http://example.com/", html), &tx).await;

        assert_eq!(session.links().await.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn post_forms_submit_data_controls_when_enabled() {
        let mut config = ScanConfig::new("http://example.com/");
        config.do_post = true;
        let session = discovery(config);
        let (tx, mut rx) = mpsc::channel(16);

        let html = r#"
            <form action="/search" method="post">
              <input type="text" name="q" value="term">
              <input type="hidden" name="csrf" value="tok">
              <input type="submit" name="go" value="Search">
            </form>"#;
        session.on_page(&page("http://example.com/", html), &tx).await;

        match rx.try_recv().unwrap() {
            FetchJob::Post { url, form, depth } => {
                assert_eq!(url.as_str(), "http://example.com/search");
                assert_eq!(depth, 1);
                assert_eq!(
                    form,
                    vec![
                        ("q".to_string(), "term".to_string()),
                        ("csrf".to_string(), "tok".to_string())
                    ]
                );
            }
            other => panic!("expected a POST job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_forms_fall_back_to_get_when_disabled() {
        let session = discovery(ScanConfig::new("http://example.com/"));
        let (tx, mut rx) = mpsc::channel(16);

        let html = r#"<form action="/search" method="post"><input type="submit" value="Go"></form>"#;
        session.on_page(&page("http://example.com/", html), &tx).await;

        assert!(matches!(rx.try_recv().unwrap(), FetchJob::Get { .. }));
    }

    #[test]
    fn login_marker_only_matters_for_authenticated_crawls() {
        let anonymous = discovery(ScanConfig::new("http://example.com/"));
        assert!(anonymous.is_logged_in("any body at all"));

        let mut config = ScanConfig::new("http://example.com/");
        config.login = Some(LoginConfig {
            login_url: "http://example.com/login".to_string(),
            form_username: "username".to_string(),
            username: "u".to_string(),
            form_password: "password".to_string(),
            password: "p".to_string(),
        });
        let authenticated = discovery(config);
        assert!(authenticated.is_logged_in("welcome, you are loggedin"));
        assert!(!authenticated.is_logged_in("session expired"));
    }
}
