use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::error::Result;
use crate::model::{PullRequestDescriptor, RemediationOutcome, RunSummary, ScanStats};
use crate::remediate::Remediator;
use crate::scanner::Scanner;
use crate::shutdown;

/// Fans a descriptor stream out to a bounded pool of remediations and
/// folds the results into one run summary.
pub struct Orchestrator {
    remediator: Arc<Remediator>,
    workers: usize,
}

impl Orchestrator {
    pub fn new(remediator: Arc<Remediator>, workers: usize) -> Self {
        Self {
            remediator,
            workers: workers.clamp(1, 32),
        }
    }

    /// Scan the organization and remediate every streamed pull request.
    pub async fn run(&self, scanner: &Scanner, org: &str) -> RunSummary {
        let (stream, stats_handle) = scanner.scan(org);

        let remediator = Arc::clone(&self.remediator);
        let outcomes = run_pool(stream, self.workers, move |pr| {
            let remediator = Arc::clone(&remediator);
            async move { remediator.remediate(&pr).await }
        })
        .await;

        let stats = match stats_handle.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Scanner task panicked");
                ScanStats {
                    aborted: true,
                    ..ScanStats::default()
                }
            }
        };

        RunSummary::from_parts(stats, outcomes)
    }
}

/// Pull descriptors off the stream and hand each to `handler`, at most
/// `workers` at a time. Outcomes come back in completion order.
///
/// Dispatch stops on a terminal stream error or a shutdown signal;
/// in-flight work always runs to completion and its outcomes are kept.
pub async fn run_pool<F, Fut>(
    mut stream: mpsc::Receiver<Result<PullRequestDescriptor>>,
    workers: usize,
    handler: F,
) -> Vec<RemediationOutcome>
where
    F: Fn(PullRequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemediationOutcome> + Send + 'static,
{
    let handler = Arc::new(handler);
    let limit = Arc::new(Semaphore::new(workers));
    let mut tasks: JoinSet<RemediationOutcome> = JoinSet::new();
    let mut outcomes = Vec::new();

    let shutdown = shutdown::wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            item = stream.recv() => match item {
                Some(Ok(pr)) => {
                    // Waiting for a permit here back-pressures the scanner
                    // through the bounded channel.
                    let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                        break; // semaphore is never closed
                    };
                    let handler = Arc::clone(&handler);
                    tasks.spawn(async move {
                        let _permit = permit;
                        handler(pr).await
                    });
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Scan failed, stopping dispatch");
                    break;
                }
                None => break,
            },
            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                collect(finished, &mut outcomes);
            }
            _ = &mut shutdown => break,
        }
    }

    // Unblocks the scanner if it is still producing.
    drop(stream);

    while let Some(finished) = tasks.join_next().await {
        collect(finished, &mut outcomes);
    }

    outcomes
}

fn collect(
    finished: std::result::Result<RemediationOutcome, tokio::task::JoinError>,
    outcomes: &mut Vec<RemediationOutcome>,
) {
    match finished {
        Ok(outcome) => outcomes.push(outcome),
        Err(e) => {
            // A panic in one remediation must not take down the run.
            tracing::error!(error = %e, "Remediation task panicked");
        }
    }
}
