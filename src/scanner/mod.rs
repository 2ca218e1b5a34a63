pub mod classify;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::ScannerConfig;
use crate::error::{AppError, Result};
use crate::gateway::Gateway;
use crate::model::{PullRequestDescriptor, RepositoryRef, ScanStats};

/// Consecutive throttled API calls after which the whole scan gives up.
const MAX_CONSECUTIVE_THROTTLES: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Include draft pull requests instead of skipping them.
    pub include_drafts: bool,
    /// Stream every open pull request, not just the blocked ones.
    pub include_unblocked: bool,
}

/// Streams blocked pull requests for an organization without holding the
/// full result set in memory.
///
/// Repositories are scanned concurrently under one semaphore, page
/// fetches under another, and descriptors flow through a bounded channel
/// so slow consumers apply back-pressure to the GitHub API calls.
#[derive(Clone)]
pub struct Scanner {
    gateway: Arc<dyn Gateway>,
    config: ScannerConfig,
    options: ScanOptions,
}

/// Org-wide run of throttled API responses. Success on any task resets
/// it; errors that are not auth or rate-limit related leave it alone.
struct ThrottleTracker {
    consecutive: AtomicUsize,
    limit: usize,
}

impl ThrottleTracker {
    fn new(limit: usize) -> Self {
        Self {
            consecutive: AtomicUsize::new(0),
            limit,
        }
    }

    fn record_success(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &AppError) {
        if error.is_throttle() {
            self.consecutive.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn tripped(&self) -> bool {
        self.consecutive.load(Ordering::Relaxed) >= self.limit
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RepoCounts {
    examined: u64,
    blocked: u64,
}

impl Scanner {
    pub fn new(gateway: Arc<dyn Gateway>, config: ScannerConfig, options: ScanOptions) -> Self {
        Self {
            gateway,
            config,
            options,
        }
    }

    /// Start the scan. Returns the descriptor stream and a handle that
    /// yields counters once the stream closes.
    ///
    /// A fatal gateway error arrives as the final `Err` on the stream;
    /// per-repository failures are only logged and counted.
    pub fn scan(
        &self,
        org: &str,
    ) -> (
        mpsc::Receiver<Result<PullRequestDescriptor>>,
        JoinHandle<ScanStats>,
    ) {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let scanner = self.clone();
        let org = org.to_string();
        let handle = tokio::spawn(async move { scanner.drive(org, tx).await });
        (rx, handle)
    }

    async fn drive(self, org: String, tx: mpsc::Sender<Result<PullRequestDescriptor>>) -> ScanStats {
        let mut stats = ScanStats::default();
        let tracker = Arc::new(ThrottleTracker::new(MAX_CONSECUTIVE_THROTTLES));
        let repo_slots = Arc::new(Semaphore::new(self.config.repo_tasks));
        let page_slots = Arc::new(Semaphore::new(self.config.page_tasks));
        let mut workers: JoinSet<(RepositoryRef, Result<RepoCounts>)> = JoinSet::new();

        match self.gateway.count_repositories(&org).await {
            Ok(total) => {
                tracker.record_success();
                tracing::info!(org = %org, repositories = total, "Starting organization scan");
            }
            Err(e) => {
                // The first repository page will surface the same failure
                // as the terminal error if it persists.
                tracker.record_failure(&e);
                tracing::warn!(org = %org, error = %e, "Repository count unavailable");
            }
        }

        let mut cursor: Option<String> = None;
        let mut fatal: Option<AppError> = None;

        'paging: loop {
            if tx.is_closed() {
                tracing::debug!(org = %org, "Consumer dropped the stream, stopping scan");
                break;
            }

            let page = {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = page_slots.acquire().await.ok();
                self.gateway.page_repositories(&org, cursor.as_deref()).await
            };
            let page = match page {
                Ok(page) => {
                    tracker.record_success();
                    page
                }
                Err(e) => {
                    tracker.record_failure(&e);
                    fatal = Some(e);
                    break;
                }
            };

            for summary in page.repositories {
                while let Some(finished) = workers.try_join_next() {
                    self.absorb_worker(finished, &tracker, &mut stats, &mut fatal);
                }
                if fatal.is_some() {
                    break 'paging;
                }

                if summary.repo.is_archived || summary.open_pull_requests == 0 {
                    tracing::debug!(repo = %summary.repo, "Skipping repository");
                    continue;
                }
                stats.repositories_scanned += 1;

                let Ok(permit) = Arc::clone(&repo_slots).acquire_owned().await else {
                    break 'paging; // semaphore is never closed
                };
                let gateway = Arc::clone(&self.gateway);
                let pages = Arc::clone(&page_slots);
                let gate = Arc::clone(&tracker);
                let stream = tx.clone();
                let options = self.options;
                let repo = summary.repo.clone();
                workers.spawn(async move {
                    let _permit = permit;
                    let result = scan_repository(gateway, pages, gate, stream, &repo, options).await;
                    (repo, result)
                });
            }

            if fatal.is_some() || !page.has_next_page {
                break;
            }
            cursor = page.end_cursor;
            if cursor.is_none() {
                break;
            }
        }

        if fatal.is_none() {
            while let Some(finished) = workers.join_next().await {
                self.absorb_worker(finished, &tracker, &mut stats, &mut fatal);
                if fatal.is_some() {
                    break;
                }
            }
        }

        if let Some(e) = fatal {
            workers.abort_all();
            stats.aborted = true;
            tracing::error!(org = %org, error = %e, "Organization scan aborted");
            let _ = tx.send(Err(e)).await;
        } else {
            tracing::debug!(
                org = %org,
                repositories = stats.repositories_scanned,
                blocked = stats.blocked_found,
                "Organization scan finished"
            );
        }

        stats
    }

    fn absorb_worker(
        &self,
        finished: std::result::Result<(RepositoryRef, Result<RepoCounts>), tokio::task::JoinError>,
        tracker: &ThrottleTracker,
        stats: &mut ScanStats,
        fatal: &mut Option<AppError>,
    ) {
        match finished {
            Ok((_, Ok(counts))) => {
                stats.pull_requests_examined += counts.examined;
                stats.blocked_found += counts.blocked;
            }
            Ok((repo, Err(e))) => {
                stats.repositories_failed += 1;
                tracing::warn!(repo = %repo, error = %e, "Repository scan failed");
                if e.is_throttle() && tracker.tripped() {
                    *fatal = Some(e);
                }
            }
            Err(e) => {
                stats.repositories_failed += 1;
                tracing::error!(error = %e, "Repository scan task panicked");
            }
        }
    }
}

/// Page one repository's open pull requests, classify each, and forward
/// matches into the stream.
async fn scan_repository(
    gateway: Arc<dyn Gateway>,
    page_slots: Arc<Semaphore>,
    tracker: Arc<ThrottleTracker>,
    tx: mpsc::Sender<Result<PullRequestDescriptor>>,
    repo: &RepositoryRef,
    options: ScanOptions,
) -> Result<RepoCounts> {
    let mut counts = RepoCounts::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = {
            let _permit = page_slots.acquire().await.ok();
            gateway
                .page_pull_requests(&repo.owner, &repo.name, cursor.as_deref())
                .await
        };
        let page = match page {
            Ok(page) => {
                tracker.record_success();
                page
            }
            Err(e) => {
                tracker.record_failure(&e);
                return Err(e);
            }
        };

        for pr in page.pull_requests {
            counts.examined += 1;
            if pr.is_draft && !options.include_drafts {
                continue;
            }
            let blocked = classify::is_blocked(&pr);
            if blocked {
                counts.blocked += 1;
            } else if !options.include_unblocked {
                continue;
            }
            tracing::debug!(pr = %pr.slug(), blocked = blocked, "Streaming pull request");
            if tx.send(Ok(pr)).await.is_err() {
                // Consumer is gone; no point fetching further pages.
                return Ok(counts);
            }
        }

        if !page.has_next_page {
            break;
        }
        cursor = page.end_cursor;
        if cursor.is_none() {
            break;
        }
    }

    Ok(counts)
}
