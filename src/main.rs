use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pr_mend::cli::{self, Cli, Target};
use pr_mend::config::AppConfig;
use pr_mend::gateway::github::GitHubGateway;
use pr_mend::gateway::Gateway;
use pr_mend::model::{RunSummary, ScanStats};
use pr_mend::orchestrator::Orchestrator;
use pr_mend::remediate::Remediator;
use pr_mend::scanner::{ScanOptions, Scanner};
use pr_mend::workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_directive())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let target = cli::parse_target(&cli.target)?;
    let token = cli.resolve_token(&config)?;
    let options = cli.remediate_options()?;

    let gateway: Arc<dyn Gateway> = Arc::new(GitHubGateway::new(
        &config.github.api_url,
        &token,
        config.scanner.page_size,
    )?);

    let remediator = Arc::new(Remediator::new(
        Arc::clone(&gateway),
        WorkspaceManager::new(&config.workspace),
        options,
        config.git.identity(),
        Some(token),
    ));

    let summary = match target {
        Target::Organization(org) => {
            tracing::info!(org = %org, workers = cli.workers, "Starting run");
            let scanner = Scanner::new(
                Arc::clone(&gateway),
                config.scanner.clone(),
                ScanOptions {
                    include_drafts: cli.include_drafts,
                    include_unblocked: cli.all,
                },
            );
            let orchestrator = Orchestrator::new(Arc::clone(&remediator), cli.workers as usize);
            orchestrator.run(&scanner, &org).await
        }
        Target::PullRequest {
            owner,
            repo,
            number,
        } => {
            // Single-PR mode remediates unconditionally, blocked or not.
            let pr = gateway.fetch_pull_request(&owner, &repo, number).await?;
            let outcome = remediator.remediate(&pr).await;
            RunSummary::from_parts(ScanStats::default(), vec![outcome])
        }
    };

    tracing::info!(
        repositories = summary.repositories_scanned,
        examined = summary.pull_requests_examined,
        blocked = summary.blocked_found,
        fixed = summary.fixed,
        unchanged = summary.unchanged,
        dry_run_stopped = summary.dry_run_stopped,
        failed = summary.failed,
        "Run complete"
    );
    if summary.scan_aborted {
        tracing::warn!("Scan aborted before covering the whole organization");
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
