use clap::Parser;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::model::{ConflictStrategy, SyncStrategy};
use crate::remediate::fixes::FileFixRule;
use crate::remediate::RemediateOptions;

#[derive(Parser, Debug)]
#[command(
    name = "pr-mend",
    about = "Finds blocked pull requests across a GitHub organization and mends them",
    version
)]
pub struct Cli {
    /// Organization name, organization URL, or a single pull request URL.
    pub target: String,

    /// GitHub API token. Falls back to $GITHUB_TOKEN, then the config file.
    #[arg(long)]
    pub token: Option<String>,

    /// Rewrite the PR title from the first commit's subject.
    #[arg(long)]
    pub fix_title: bool,

    /// Rewrite the PR body from the first commit's message body.
    #[arg(long)]
    pub fix_body: bool,

    /// Apply a regex fix to files whose repo-relative path matches.
    #[arg(long, value_name = "FILE_REGEX", requires = "search")]
    pub fix_files: Option<String>,

    /// Pattern to search for inside matched files.
    #[arg(long, value_name = "REGEX", requires = "fix_files")]
    pub search: Option<String>,

    /// Replacement text for --search matches.
    #[arg(long, value_name = "TEXT", requires = "search")]
    pub replace: Option<String>,

    /// Delete whole lines matching --search instead of replacing.
    #[arg(long, requires = "search", conflicts_with = "replace")]
    pub remove_lines: bool,

    /// Only touch lines after one matching this pattern.
    #[arg(long, value_name = "REGEX", requires = "search")]
    pub context_start: Option<String>,

    /// Stop touching lines once one matches this pattern.
    #[arg(long, value_name = "REGEX", requires = "context_start")]
    pub context_end: Option<String>,

    /// Re-synchronize each PR branch with its base before fixing.
    #[arg(long, value_enum, default_value_t = SyncStrategy::None)]
    pub sync: SyncStrategy,

    /// What to do when sync hits conflicts.
    #[arg(long, value_enum, default_value_t = ConflictStrategy::Fail)]
    pub on_conflict: ConflictStrategy,

    /// Include draft pull requests in the scan.
    #[arg(long)]
    pub include_drafts: bool,

    /// Process every open pull request, not just the blocked ones.
    #[arg(long)]
    pub all: bool,

    /// Compute and report fixes without pushing, updating, or commenting.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Pull requests remediated concurrently.
    #[arg(
        long,
        short = 'j',
        default_value_t = 4,
        value_parser = clap::value_parser!(u64).range(1..=32)
    )]
    pub workers: u64,

    /// Log at debug level.
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Explicit log filter, e.g. "pr_mend=trace" (overrides -v/-q).
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Path to configuration file.
    #[arg(long, short = 'c')]
    pub config: Option<String>,
}

/// What the positional argument resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Organization(String),
    PullRequest {
        owner: String,
        repo: String,
        number: u64,
    },
}

/// Accepts a bare org name, an org/repo URL (reduced to its first path
/// segment), or a full pull request URL.
pub fn parse_target(raw: &str) -> Result<Target> {
    let trimmed = raw.trim().trim_end_matches('/');

    let path = trimmed
        .strip_prefix("https://github.com/")
        .or_else(|| trimmed.strip_prefix("http://github.com/"));

    if let Some(path) = path {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        return match segments.as_slice() {
            [owner, repo, "pull", number] => {
                let number = number.parse::<u64>().map_err(|_| {
                    AppError::Config(format!("Invalid pull request number in URL: {raw}"))
                })?;
                Ok(Target::PullRequest {
                    owner: (*owner).to_string(),
                    repo: (*repo).to_string(),
                    number,
                })
            }
            [org, ..] => Ok(Target::Organization((*org).to_string())),
            [] => Err(AppError::Config(format!("No organization in URL: {raw}"))),
        };
    }

    if trimmed.contains("github.com") {
        return Err(AppError::Config(format!("Unrecognized GitHub URL: {raw}")));
    }
    if trimmed.is_empty() || trimmed.contains('/') {
        return Err(AppError::Config(format!(
            "Invalid organization name: {raw}"
        )));
    }
    Ok(Target::Organization(trimmed.to_string()))
}

impl Cli {
    /// Flag beats environment beats config file.
    pub fn resolve_token(&self, config: &AppConfig) -> Result<String> {
        self.token
            .clone()
            .or_else(|| {
                std::env::var("GITHUB_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty())
            })
            .or_else(|| config.github_token().map(str::to_string))
            .ok_or_else(|| {
                AppError::Config(
                    "No GitHub token: pass --token, set GITHUB_TOKEN, or configure github.token"
                        .to_string(),
                )
            })
    }

    pub fn file_rules(&self) -> Result<Vec<FileFixRule>> {
        let (Some(file_pattern), Some(search)) = (&self.fix_files, &self.search) else {
            return Ok(Vec::new());
        };
        let rule = FileFixRule::new(
            file_pattern,
            search,
            self.replace.clone().unwrap_or_default(),
            self.remove_lines,
            self.context_start.as_deref(),
            self.context_end.as_deref(),
        )?;
        Ok(vec![rule])
    }

    pub fn remediate_options(&self) -> Result<RemediateOptions> {
        if !self.fix_title && !self.fix_body && self.fix_files.is_none() {
            return Err(AppError::Config(
                "Nothing to fix: pass --fix-title, --fix-body, or --fix-files with --search"
                    .to_string(),
            ));
        }
        Ok(RemediateOptions {
            fix_title: self.fix_title,
            fix_body: self.fix_body,
            file_rules: self.file_rules()?,
            sync: self.sync,
            on_conflict: self.on_conflict,
            dry_run: self.dry_run,
        })
    }

    pub fn log_directive(&self) -> &str {
        if let Some(filter) = &self.log_level {
            return filter;
        }
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
