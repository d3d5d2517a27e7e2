//! Per-user profile scraping.
//!
//! Users are processed one at a time. A profile that cannot be fetched still
//! gets its username recorded, so the store knows about every listed user.

use serde::Serialize;
use tracing::{info, instrument, warn};

use lobgraph_forum::{Fetcher, ProfileExtractor, profile_url};
use lobgraph_shared::{Result, UserUpsert};
use lobgraph_storage::Storage;

use crate::progress::ProgressReporter;

/// Options for a scrape pass.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Forum origin the profile URLs are built from.
    pub base_url: String,
    /// Stop after this many profile fetches.
    pub max: Option<usize>,
    /// Re-scrape users that already have a successful scrape recorded.
    pub force: bool,
}

/// Counts for a scrape pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeSummary {
    pub listed: usize,
    pub scraped: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Scrape the profile of every username in `usernames`.
///
/// Fetch failures are counted and the bare username is upserted; storage
/// failures abort the pass.
#[instrument(skip_all, fields(users = usernames.len(), force = opts.force))]
pub async fn scrape_users(
    storage: &Storage,
    fetcher: &Fetcher,
    extractor: &ProfileExtractor,
    usernames: &[String],
    opts: &ScrapeOptions,
    progress: &dyn ProgressReporter,
) -> Result<ScrapeSummary> {
    let run_id = storage.insert_run("scrape").await?;
    let mut summary = ScrapeSummary {
        listed: usernames.len(),
        ..Default::default()
    };

    progress.phase("Scraping profiles");
    let total = usernames.len();

    for (i, username) in usernames.iter().enumerate() {
        if opts.max.is_some_and(|max| summary.scraped + summary.failed >= max) {
            info!(max = ?opts.max, "scrape limit reached");
            break;
        }

        progress.item(username, i + 1, total);

        if !opts.force {
            let existing = storage.get_user(username).await?;
            if existing.is_some_and(|u| u.scraped_at.is_some()) {
                summary.skipped += 1;
                continue;
            }
        }

        match fetcher.fetch(&profile_url(&opts.base_url, username)).await {
            Some(html) => {
                let facts = extractor.extract(&html, username);
                storage.upsert_user(&facts).await?;
                summary.scraped += 1;
            }
            None => {
                warn!(%username, "profile fetch failed, recording username only");
                storage.upsert_user(&UserUpsert::bare(username.as_str())).await?;
                summary.failed += 1;
            }
        }
    }

    storage
        .finish_run(&run_id, &serde_json::to_string(&summary)?)
        .await?;

    progress.done(&format!(
        "scraped {}, failed {}, skipped {}",
        summary.scraped, summary.failed, summary.skipped
    ));
    info!(
        scraped = summary.scraped,
        failed = summary.failed,
        skipped = summary.skipped,
        "scrape complete"
    );
    Ok(summary)
}

/// Ingest one locally saved profile page.
#[instrument(skip_all, fields(%username))]
pub async fn scrape_profile_html(
    storage: &Storage,
    extractor: &ProfileExtractor,
    username: &str,
    html: &str,
) -> Result<UserUpsert> {
    let facts = extractor.extract(html, username);
    storage.upsert_user(&facts).await?;
    Ok(facts)
}
