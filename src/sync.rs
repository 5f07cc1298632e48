//! Sync Engine - full reconciliation of the mirror organization
//!
//! Lists both sides, sorts them by display name and walks them as a sorted
//! merge-join: every eligible source repository is either updated (a mirror
//! of the same name exists) or created. Mirror-only repositories are never
//! touched, so a full sync never deletes anything.

use crate::config::Config;
use crate::directory::{collect_pages, MirrorRecord, RepositoryRecord};
use crate::error::DirectoryError;
use crate::mirror::{Applied, Mirror};
use futures::stream::{self, FuturesUnordered, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Why a source repository is left out of a full sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Shared with the group or living in a subgroup, not owned by it
    ForeignNamespace,
    NotPublic,
    NoCommits,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::ForeignNamespace => "not owned by the organization",
            SkipReason::NotPublic => "not public",
            SkipReason::NoCommits => "no commits",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Skip(SkipReason),
    Create,
    Update,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Skip(reason) => write!(f, "skip ({})", reason),
            Classification::Create => f.write_str("create"),
            Classification::Update => f.write_str("update"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub repo: RepositoryRecord,
    pub classification: Classification,
}

/// Classified source listing, in ascending name order
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub actions: Vec<PlannedAction>,
}

impl SyncPlan {
    fn count(&self, wanted: impl Fn(&Classification) -> bool) -> usize {
        self.actions.iter().filter(|a| wanted(&a.classification)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| *c == Classification::Create)
    }

    pub fn updates(&self) -> usize {
        self.count(|c| *c == Classification::Update)
    }

    pub fn skipped(&self) -> usize {
        self.count(|c| matches!(c, Classification::Skip(_)))
    }
}

/// Result of one executed action
#[derive(Debug, Clone)]
pub struct RepoOutcome {
    pub name: String,
    pub classification: Classification,
    pub error: Option<String>,
}

/// Results from a complete sync operation
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
    pub outcomes: Vec<RepoOutcome>,
}

impl SyncSummary {
    /// `skipped` counts the plan's skips; outcomes that ended up skipped
    /// (withdrawn while the sync ran) are added to it
    fn compile(mut skipped: usize, mut outcomes: Vec<RepoOutcome>, duration: Duration) -> Self {
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut created = 0;
        let mut updated = 0;
        let mut failed = 0;
        for outcome in &outcomes {
            match (outcome.error.is_some(), outcome.classification) {
                (true, _) => failed += 1,
                (false, Classification::Create) => created += 1,
                (false, Classification::Update) => updated += 1,
                (false, Classification::Skip(_)) => skipped += 1,
            }
        }

        Self {
            created,
            updated,
            skipped,
            failed,
            duration,
            outcomes,
        }
    }
}

/// Exclusion filters that need no I/O, in evaluation order
pub fn prefilter(repo: &RepositoryRecord, organization: &str) -> Option<SkipReason> {
    if !repo.belongs_to(organization) {
        Some(SkipReason::ForeignNamespace)
    } else if !repo.visibility.is_public() {
        Some(SkipReason::NotPublic)
    } else {
        None
    }
}

/// Sorted merge-join of the source listing against the mirror names.
///
/// Both inputs must be sorted ascending by name. Entries already carrying a
/// skip reason are passed through without advancing the mirror cursor.
pub fn merge_join(
    sources: Vec<(RepositoryRecord, Option<SkipReason>)>,
    mirror_names: &[String],
) -> Vec<PlannedAction> {
    let mut cursor = 0;
    let mut actions = Vec::with_capacity(sources.len());

    for (repo, skip) in sources {
        let classification = match skip {
            Some(reason) => Classification::Skip(reason),
            None => {
                while cursor < mirror_names.len() && mirror_names[cursor] < repo.name {
                    cursor += 1;
                }
                if cursor < mirror_names.len() && mirror_names[cursor] == repo.name {
                    cursor += 1;
                    Classification::Update
                } else {
                    Classification::Create
                }
            }
        };
        actions.push(PlannedAction {
            repo,
            classification,
        });
    }

    actions
}

/// Full-sync driver
pub struct SyncEngine {
    mirror: Arc<Mirror>,
    source_org: String,
    mirror_org: String,
    max_parallel: usize,
    operation_timeout: Duration,
}

impl SyncEngine {
    pub fn new(mirror: Arc<Mirror>, config: &Config) -> Self {
        Self {
            mirror,
            source_org: config.source.organization.clone(),
            mirror_org: config.mirror_organization().to_string(),
            max_parallel: config.sync.max_parallel.max(1),
            operation_timeout: config.sync.timeout(),
        }
    }

    /// List both sides and classify every source repository without
    /// changing anything.
    pub async fn plan(&self) -> Result<SyncPlan, DirectoryError> {
        let source = self.mirror.source();
        let target = self.mirror.target();

        let mut sources: Vec<RepositoryRecord> = collect_pages("source repositories", |page| {
            source.list_public_repositories(&self.source_org, page)
        })
        .await?;
        let mut mirrors: Vec<MirrorRecord> = collect_pages("mirror repositories", |page| {
            target.list_repositories(&self.mirror_org, page)
        })
        .await?;

        info!(
            "Listed {} {} repositories and {} {} repositories",
            sources.len(),
            source.provider_name(),
            mirrors.len(),
            target.provider_name()
        );

        sources.sort_by(|a, b| a.name.cmp(&b.name));
        mirrors.sort_by(|a, b| a.name.cmp(&b.name));
        let mirror_names: Vec<String> = mirrors.into_iter().map(|m| m.name).collect();

        // Commit probes spawn git, so run them only for records that pass
        // the cheap filters, bounded like the actions themselves
        let probed: Vec<(RepositoryRecord, Option<SkipReason>)> = stream::iter(sources)
            .map(|repo| async move {
                let skip = match prefilter(&repo, &self.source_org) {
                    Some(reason) => Some(reason),
                    None if !self.mirror.has_commits(&repo).await => Some(SkipReason::NoCommits),
                    None => None,
                };
                (repo, skip)
            })
            .buffered(self.max_parallel)
            .collect()
            .await;

        let actions = merge_join(probed, &mirror_names);
        for action in &actions {
            debug!(repo = %action.repo.name, "{}", action.classification);
        }

        Ok(SyncPlan { actions })
    }

    /// Full sync: plan, rebuild the mirror set, execute creates and updates
    /// on a bounded pool. Listing failures abort before anything changes.
    pub async fn run(&self) -> Result<SyncSummary, DirectoryError> {
        let start_time = Instant::now();
        info!("Starting full sync");

        let plan = self.plan().await?;
        self.mirror.mirrors().reset();

        let skipped = plan.skipped();
        let semaphore = Semaphore::new(self.max_parallel);
        let semaphore = &semaphore;
        let mut futures = FuturesUnordered::new();

        for action in plan.actions {
            let classification = action.classification;
            if matches!(classification, Classification::Skip(_)) {
                continue;
            }

            let mirror = &self.mirror;
            let operation_timeout = self.operation_timeout;
            futures.push(async move {
                let repo = action.repo;
                let mut classification = classification;
                let error = match semaphore.acquire().await {
                    Err(e) => Some(format!("worker pool closed: {}", e)),
                    Ok(_permit) => {
                        let operation = async {
                            match classification {
                                Classification::Create => mirror.create(&repo).await,
                                _ => mirror.update(&repo).await,
                            }
                        };
                        let result = timeout(operation_timeout, operation).await;
                        match result {
                            Ok(Ok(Applied::Mirrored)) => None,
                            Ok(Ok(Applied::Withdrawn)) => {
                                classification = Classification::Skip(SkipReason::NotPublic);
                                None
                            }
                            Ok(Err(e)) => Some(e.to_string()),
                            Err(_) => Some(format!(
                                "timed out after {}s",
                                operation_timeout.as_secs()
                            )),
                        }
                    }
                };
                RepoOutcome {
                    name: repo.name,
                    classification,
                    error,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(outcome) = futures.next().await {
            match &outcome.error {
                Some(e) => error!(repo = %outcome.name, "Failed to {}: {}", outcome.classification, e),
                None => debug!(repo = %outcome.name, "{} done", outcome.classification),
            }
            outcomes.push(outcome);
        }

        let summary = SyncSummary::compile(skipped, outcomes, start_time.elapsed());

        if summary.failed > 0 {
            warn!("{} repositories failed to sync", summary.failed);
        }
        info!(
            "Full sync completed in {:.2}s: {} created, {} updated, {} skipped, {} failed",
            summary.duration.as_secs_f64(),
            summary.created,
            summary.updated,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }
}
