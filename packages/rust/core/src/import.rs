//! Bulk import of the invitation tree from a saved users page.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, instrument, warn};

use lobgraph_forum::{TreeFact, TreeParse, parse_user_tree};
use lobgraph_shared::{Result, UserUpsert};
use lobgraph_storage::Storage;

/// How many entries the karma and inviter leaderboards keep.
const LEADERBOARD_SIZE: usize = 10;

/// Outcome of a tree import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Whether the document contained the tree container at all.
    pub found: bool,
    /// Facts reconstructed (and upserted).
    pub total: usize,
    /// Top-level entries (no inviter).
    pub roots: usize,
    /// Entries flagged as inactive accounts.
    pub inactive: usize,
    /// Highest karma first.
    pub top_karma: Vec<(String, i64)>,
    /// Most invitations first.
    pub top_inviters: Vec<(String, usize)>,
}

/// Reconstruct the invitation tree from `html` and upsert every fact.
///
/// A document without the tree container is not an error: nothing is
/// written and the summary reports `found = false`.
#[instrument(skip_all, fields(bytes = html.len()))]
pub async fn import_tree(storage: &Storage, html: &str) -> Result<ImportSummary> {
    let facts = match parse_user_tree(html) {
        TreeParse::Found(facts) => facts,
        TreeParse::NotFound => {
            warn!("users page has no invitation tree, nothing imported");
            return Ok(ImportSummary::default());
        }
    };

    let run_id = storage.insert_run("import").await?;

    let upserts: Vec<UserUpsert> = facts
        .iter()
        .map(|fact| UserUpsert {
            username: fact.username.clone(),
            karma: Some(fact.karma),
            invited_by_username: fact.invited_by.clone(),
            ..Default::default()
        })
        .collect();
    storage.upsert_users(&upserts).await?;

    let summary = summarize(&facts);
    storage
        .finish_run(&run_id, &serde_json::to_string(&summary)?)
        .await?;

    info!(
        total = summary.total,
        roots = summary.roots,
        inactive = summary.inactive,
        "tree import complete"
    );
    Ok(summary)
}

fn summarize(facts: &[TreeFact]) -> ImportSummary {
    let mut by_karma: Vec<(String, i64)> = facts
        .iter()
        .map(|f| (f.username.clone(), f.karma))
        .collect();
    by_karma.sort_by(|a, b| b.1.cmp(&a.1));
    by_karma.truncate(LEADERBOARD_SIZE);

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for inviter in facts.iter().filter_map(|f| f.invited_by.as_deref()) {
        *counts.entry(inviter).or_default() += 1;
    }
    let mut top_inviters: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    top_inviters.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_inviters.truncate(LEADERBOARD_SIZE);

    ImportSummary {
        found: true,
        total: facts.len(),
        roots: facts.iter().filter(|f| f.invited_by.is_none()).count(),
        inactive: facts.iter().filter(|f| f.inactive).count(),
        top_karma: by_karma,
        top_inviters,
    }
}
