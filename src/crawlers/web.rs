use crate::config::ScanConfig;
use crate::crawlers::session::Discovery;
use crate::error::Error;
use crate::filter::UrlFilter;
use crate::link::Method;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, mpsc};
use url::Url;

/// How long an idle worker waits for new frontier entries before
/// concluding the traversal queue is exhausted.
const IDLE_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(5);

/// One unit of traversal work on the frontier.
#[derive(Debug, Clone)]
pub enum FetchJob {
    Get {
        url: Url,
        depth: usize,
    },
    Post {
        url: Url,
        form: Vec<(String, String)>,
        depth: usize,
    },
}

impl FetchJob {
    pub fn url(&self) -> &Url {
        match self {
            FetchJob::Get { url, .. } | FetchJob::Post { url, .. } => url,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            FetchJob::Get { depth, .. } | FetchJob::Post { depth, .. } => *depth,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            FetchJob::Get { .. } => Method::Get,
            FetchJob::Post { .. } => Method::Post,
        }
    }

    /// Revisit-suppression key. Method is part of the key so a GET of a
    /// form's action does not shadow its submission.
    fn visited_key(&self) -> String {
        format!("{} {}", self.method().as_str(), self.url())
    }
}

/// A fetched page handed to the discovery session.
#[derive(Debug, Clone)]
pub struct PageFetch {
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
    pub depth: usize,
}

/// Run the traversal to exhaustion: spawn workers over a shared frontier
/// channel and wait for all of them to go idle.
///
/// The engine owns depth limiting, the domain allow-list and revisit
/// suppression; everything the session learns from a page comes back in
/// through the frontier sender it is handed per page.
pub async fn run(config: Arc<ScanConfig>, session: Discovery) -> Result<(), Error> {
    let entry = config.entry_url()?;
    ::log::info!("starting discovery at {}", entry);

    let filter = Arc::new(UrlFilter::new(
        &entry,
        &config.allowed_domains,
        &config.include_patterns,
        &config.exclude_patterns,
    )?);

    let (job_tx, job_rx) = mpsc::channel::<FetchJob>(10_000);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let visited = Arc::new(Mutex::new(HashSet::new()));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));

    job_tx
        .send(FetchJob::Get {
            url: entry,
            depth: 0,
        })
        .await
        .expect("frontier channel is open at startup");

    let mut workers = Vec::with_capacity(config.max_concurrency);
    for worker_id in 0..config.max_concurrency {
        workers.push(tokio::spawn(worker_loop(
            worker_id,
            Arc::clone(&config),
            session.clone(),
            Arc::clone(&filter),
            job_tx.clone(),
            Arc::clone(&job_rx),
            Arc::clone(&visited),
            Arc::clone(&semaphore),
        )));
    }
    drop(job_tx);

    for worker in workers {
        if let Err(e) = worker.await {
            ::log::error!("worker task panicked: {e}");
        }
    }

    ::log::info!("traversal queue exhausted");
    Ok(())
}

/// Process frontier jobs until the queue stays empty for the idle
/// timeout.
async fn worker_loop(
    worker_id: usize,
    config: Arc<ScanConfig>,
    session: Discovery,
    filter: Arc<UrlFilter>,
    job_tx: mpsc::Sender<FetchJob>,
    job_rx: Arc<Mutex<mpsc::Receiver<FetchJob>>>,
    visited: Arc<Mutex<HashSet<String>>>,
    semaphore: Arc<Semaphore>,
) {
    ::log::debug!("worker {worker_id} started");

    while let Some(mut job) = next_job(worker_id, &job_rx).await {
        if job.depth() > config.max_depth {
            ::log::debug!("worker {worker_id} dropping beyond-depth job: {}", job.url());
            continue;
        }

        if !filter.should_fetch(job.url()) {
            ::log::debug!("worker {worker_id} filtered out: {}", job.url());
            continue;
        }
        normalize_job(&mut job, &filter);

        if !mark_visited(&visited, &job).await {
            ::log::trace!("worker {worker_id} skipping revisit: {}", job.url());
            continue;
        }

        let _permit = semaphore
            .acquire()
            .await
            .expect("fetch semaphore is never closed");

        ::log::debug!(
            "worker {worker_id} fetching {} {}",
            job.method().as_str(),
            job.url()
        );
        match fetch(&session, &job).await {
            Ok(page) => session.on_page(&page, &job_tx).await,
            Err(e) => ::log::error!("worker {worker_id} failed to fetch {}: {e}", job.url()),
        }
    }

    ::log::debug!("worker {worker_id} idle, shutting down");
}

async fn next_job(
    worker_id: usize,
    job_rx: &Arc<Mutex<mpsc::Receiver<FetchJob>>>,
) -> Option<FetchJob> {
    let mut rx = job_rx.lock().await;
    match tokio::time::timeout(IDLE_TIMEOUT, rx.recv()).await {
        Ok(job) => job,
        Err(_) => {
            ::log::debug!("worker {worker_id} timed out waiting for frontier entries");
            None
        }
    }
}

fn normalize_job(job: &mut FetchJob, filter: &UrlFilter) {
    match job {
        FetchJob::Get { url, .. } | FetchJob::Post { url, .. } => {
            *url = filter.normalize(url);
        }
    }
}

/// Mark the job visited; false means another worker already took it.
async fn mark_visited(visited: &Arc<Mutex<HashSet<String>>>, job: &FetchJob) -> bool {
    let mut seen = visited.lock().await;
    seen.insert(job.visited_key())
}

async fn fetch(session: &Discovery, job: &FetchJob) -> Result<PageFetch, Error> {
    let http = session.http();
    let response = match job {
        FetchJob::Get { url, .. } => http.get(url.clone()).send().await?,
        FetchJob::Post { url, form, .. } => http.post(url.clone()).form(form).send().await?,
    };
    let url = response.url().clone();
    let body = response.text().await?;
    Ok(PageFetch {
        url,
        body,
        depth: job.depth(),
    })
}
