//! People-search enrichment.
//!
//! For each eligible user a search query is built from the strongest known
//! signal, sent to a [`PeopleSearch`] backend, and the ranked candidates are
//! merged into an [`Enrichment`] record with first-match-wins precedence per
//! field. Search failures are isolated per user; storage failures abort.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use lobgraph_search::{PeopleSearch, SearchResponse};
use lobgraph_shared::{Enrichment, LobGraphError, Result, User};
use lobgraph_storage::Storage;

use crate::progress::ProgressReporter;

/// Minimum bio length (in characters) for a bio-only query.
const MIN_BIO_CHARS: usize = 20;

/// Bio characters carried into a bio-only query.
const BIO_SNIPPET_CHARS: usize = 100;

/// Appended to single-signal queries to steer the search toward people.
const QUALIFIER: &str = "software engineer developer";

static LINKEDIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(?:[a-z0-9-]+\.)*linkedin\.com/in/").expect("linkedin regex")
});
static GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(?:www\.)?github\.com/[^/?#]+").expect("github regex")
});
static TWITTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/[^/?#]+")
        .expect("twitter regex")
});

// ---------------------------------------------------------------------------
// Query construction
// ---------------------------------------------------------------------------

/// Build the search query for `user`, or `None` when there is too little to
/// go on.
pub fn build_search_query(user: &User) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();

    if let Some(gh) = &user.github_username {
        terms.push(format!("github.com/{gh}"));
    }
    if let Some(tw) = &user.twitter_username {
        terms.push(format!("@{tw}"));
    }
    if let Some(site) = &user.website {
        terms.push(site.clone());
    }

    if terms.is_empty() {
        let about = user.about.as_deref().unwrap_or_default();
        if about.chars().count() < MIN_BIO_CHARS {
            return None;
        }
        let snippet: String = about
            .chars()
            .take(BIO_SNIPPET_CHARS)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        return Some(format!("{} {snippet}", user.username));
    }

    let mut query = terms.join(" ");
    if terms.len() == 1 && !has_role_context(&query) {
        query.push(' ');
        query.push_str(QUALIFIER);
    }
    Some(query)
}

fn has_role_context(term: &str) -> bool {
    let lower = term.to_lowercase();
    lower.contains("engineer") || lower.contains("developer")
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge ranked candidates into an enrichment record.
///
/// Returns `None` when the response has no candidates.
pub fn merge_candidates(username: &str, response: &SearchResponse) -> Option<Enrichment> {
    if response.candidates.is_empty() {
        return None;
    }

    let raw_response = match serde_json::to_string(&response.raw) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!(%username, error = %e, "raw search response not serializable, dropping it");
            None
        }
    };

    let mut record = Enrichment {
        username: username.to_string(),
        raw_response,
        enriched_at: Utc::now(),
        ..Default::default()
    };

    for candidate in &response.candidates {
        let url = candidate.url.as_str();

        if LINKEDIN_RE.is_match(url) {
            if record.linkedin_url.is_none() {
                record.linkedin_url = Some(candidate.url.clone());
                if let Some(title) = candidate.title.as_deref() {
                    apply_linkedin_title(&mut record, title);
                }
            }
        } else if GITHUB_RE.is_match(url) {
            if record.github_url.is_none() {
                record.github_url = Some(candidate.url.clone());
            }
        } else if TWITTER_RE.is_match(url) {
            if record.twitter_url.is_none() {
                record.twitter_url = Some(candidate.url.clone());
            }
        } else if !record.other_urls.iter().any(|u| u == url) {
            record.other_urls.push(candidate.url.clone());
        }
    }

    Some(record)
}

/// Profile titles read `Name - Title - Company | LinkedIn`.
fn apply_linkedin_title(record: &mut Enrichment, title: &str) {
    let title = title.trim().trim_end_matches("| LinkedIn").trim_end();
    if !title.contains(" - ") {
        return;
    }
    let mut segments = title.split(" - ").map(str::trim);

    fill_if_unset(&mut record.full_name, segments.next());
    fill_if_unset(&mut record.title, segments.next());
    fill_if_unset(&mut record.company, segments.next());
}

fn fill_if_unset(slot: &mut Option<String>, value: Option<&str>) {
    if slot.is_some() {
        return;
    }
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *slot = Some(v.to_string());
    }
}

// ---------------------------------------------------------------------------
// Per-user and batch runs
// ---------------------------------------------------------------------------

/// Search for one user and merge the result.
///
/// `Ok(None)` means there was no query or no candidates; `Err` is a search
/// failure for this user only.
pub async fn enrich_user<S: PeopleSearch>(
    search: &S,
    user: &User,
    num_results: u32,
) -> Result<Option<Enrichment>> {
    let Some(query) = build_search_query(user) else {
        debug!(username = %user.username, "insufficient data for a query");
        return Ok(None);
    };

    let response = search.search(&query, num_results).await?;
    Ok(merge_candidates(&user.username, &response))
}

/// Options for an enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Only build and report queries; no search calls, no writes.
    pub dry_run: bool,
    /// Cap on the number of eligible users processed.
    pub max_users: Option<usize>,
    /// Candidates requested per query.
    pub num_results: u32,
    /// Minimum delay between consecutive search calls.
    pub delay: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_users: None,
            num_results: 5,
            delay: Duration::from_millis(500),
        }
    }
}

/// Counts for an enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
    pub eligible: usize,
    pub enriched: usize,
    pub no_results: usize,
    pub no_query: usize,
    pub failed: usize,
    /// `(username, query)` pairs; filled only on dry runs.
    #[serde(skip)]
    pub planned: Vec<(String, String)>,
}

/// Enrich every eligible user (highest karma first).
///
/// `search` may be `None` only for a dry run.
#[instrument(skip_all, fields(dry_run = opts.dry_run, max = ?opts.max_users))]
pub async fn run_enrichment<S: PeopleSearch>(
    storage: &Storage,
    search: Option<&S>,
    opts: &EnrichOptions,
    progress: &dyn ProgressReporter,
) -> Result<EnrichSummary> {
    let mut users = storage.list_users_eligible_for_enrichment().await?;
    info!(eligible = users.len(), "found users eligible for enrichment");
    if let Some(max) = opts.max_users {
        users.truncate(max);
    }

    let mut summary = EnrichSummary {
        eligible: users.len(),
        ..Default::default()
    };

    if opts.dry_run {
        for user in &users {
            match build_search_query(user) {
                Some(query) => summary.planned.push((user.username.clone(), query)),
                None => summary.no_query += 1,
            }
        }
        return Ok(summary);
    }

    let search = search.ok_or_else(|| {
        LobGraphError::config("a people-search client is required unless running dry")
    })?;

    let run_id = storage.insert_run("enrich").await?;
    progress.phase("Enriching users");
    let total = users.len();
    let mut called = false;

    for (i, user) in users.iter().enumerate() {
        progress.item(&user.username, i + 1, total);

        if build_search_query(user).is_none() {
            summary.no_query += 1;
            continue;
        }

        if called {
            tokio::time::sleep(opts.delay).await;
        }
        called = true;

        match enrich_user(search, user, opts.num_results).await {
            Ok(Some(record)) => {
                storage.upsert_enrichment(&record).await?;
                debug!(
                    username = %user.username,
                    full_name = ?record.full_name,
                    linkedin = record.linkedin_url.is_some(),
                    "enriched"
                );
                summary.enriched += 1;
            }
            Ok(None) => {
                debug!(username = %user.username, "no results");
                summary.no_results += 1;
            }
            Err(e) => {
                warn!(username = %user.username, error = %e, "search failed");
                summary.failed += 1;
            }
        }
    }

    storage
        .finish_run(&run_id, &serde_json::to_string(&summary)?)
        .await?;

    progress.done(&format!(
        "enriched {}, no results {}, failed {}",
        summary.enriched, summary.no_results, summary.failed
    ));
    info!(
        enriched = summary.enriched,
        no_results = summary.no_results,
        failed = summary.failed,
        "enrichment complete"
    );
    Ok(summary)
}
