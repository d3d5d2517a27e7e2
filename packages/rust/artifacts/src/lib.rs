//! Export artifacts for the graph viewer.
//!
//! Two files are produced:
//!
//! ```text
//! <out_dir>/
//! ├── graph.json      nodes, edges, and summary stats
//! └── enriched.json   enrichment fields keyed by username
//! ```
//!
//! Field names are consumed as-is by the visualization front end and must not
//! change.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use lobgraph_shared::{Enrichment, InvitationEdge, LobGraphError, Result, User};

/// File name of the aggregate graph artifact.
pub const GRAPH_FILE: &str = "graph.json";

/// File name of the enrichment artifact.
pub const ENRICHED_FILE: &str = "enriched.json";

const MIN_NODE_SIZE: f64 = 3.0;
const MAX_NODE_SIZE: f64 = 30.0;

// ---------------------------------------------------------------------------
// graph.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: GraphStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub key: String,
    pub attributes: NodeAttributes,
}

/// Per-node attributes. Absent facts serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub label: String,
    pub karma: i64,
    pub created_at: Option<String>,
    pub about: String,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub website: Option<String>,
    pub invited_by: Option<String>,
    /// Visual size hint, log-scaled from karma.
    pub size: f64,
}

/// Directed invitation edge: `source` invited `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_users: usize,
    pub total_edges: usize,
    pub max_karma: i64,
    pub avg_karma: f64,
    pub top_inviters: Vec<TopInviter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopInviter {
    pub username: String,
    pub count: usize,
}

/// Size hint for a node: `3 + k^0.3` clamped to `[3, 30]`, with unknown or
/// non-positive karma treated as 1.
pub fn node_size(karma: Option<i64>) -> f64 {
    let k = match karma {
        Some(k) if k > 0 => k as f64,
        _ => 1.0,
    };
    (MIN_NODE_SIZE + k.powf(0.3)).clamp(MIN_NODE_SIZE, MAX_NODE_SIZE)
}

/// Assemble the graph artifact from stored users and derived edges.
///
/// Edges whose inviter is not a stored user are kept (see
/// [`dangling_edge_count`]).
pub fn build_graph(users: &[User], edges: &[InvitationEdge], top_n: usize) -> GraphExport {
    let nodes: Vec<Node> = users
        .iter()
        .map(|user| Node {
            key: user.username.clone(),
            attributes: NodeAttributes {
                label: user.username.clone(),
                karma: user.karma.unwrap_or(0),
                created_at: user.created_at.clone(),
                about: user.about.clone().unwrap_or_default(),
                github: user.github_username.clone(),
                twitter: user.twitter_username.clone(),
                website: user.website.clone(),
                invited_by: user.invited_by_username.clone(),
                size: node_size(user.karma),
            },
        })
        .collect();

    let graph_edges: Vec<Edge> = edges
        .iter()
        .map(|e| Edge {
            source: e.inviter.clone(),
            target: e.invitee.clone(),
        })
        .collect();

    let stats = compute_stats(users, edges, top_n);
    debug!(
        nodes = nodes.len(),
        edges = graph_edges.len(),
        max_karma = stats.max_karma,
        "built graph export"
    );

    GraphExport {
        nodes,
        edges: graph_edges,
        stats,
    }
}

/// Number of edges whose inviter has no user record.
pub fn dangling_edge_count(users: &[User], edges: &[InvitationEdge]) -> usize {
    let known: HashSet<&str> = users.iter().map(|u| u.username.as_str()).collect();
    edges
        .iter()
        .filter(|e| !known.contains(e.inviter.as_str()))
        .count()
}

fn compute_stats(users: &[User], edges: &[InvitationEdge], top_n: usize) -> GraphStats {
    let karmas: Vec<i64> = users.iter().filter_map(|u| u.karma).collect();
    let max_karma = karmas.iter().copied().max().unwrap_or(0);
    let avg_karma = if karmas.is_empty() {
        0.0
    } else {
        let mean = karmas.iter().sum::<i64>() as f64 / karmas.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        *counts.entry(edge.inviter.as_str()).or_default() += 1;
    }
    let mut top_inviters: Vec<TopInviter> = counts
        .into_iter()
        .map(|(username, count)| TopInviter {
            username: username.to_string(),
            count,
        })
        .collect();
    top_inviters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.username.cmp(&b.username)));
    top_inviters.truncate(top_n);

    GraphStats {
        total_users: users.len(),
        total_edges: edges.len(),
        max_karma,
        avg_karma,
        top_inviters,
    }
}

// ---------------------------------------------------------------------------
// enriched.json
// ---------------------------------------------------------------------------

/// Enrichment fields as exposed to the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProfile {
    pub full_name: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub other_urls: Vec<String>,
}

impl From<&Enrichment> for EnrichedProfile {
    fn from(e: &Enrichment) -> Self {
        Self {
            full_name: e.full_name.clone(),
            linkedin: e.linkedin_url.clone(),
            github: e.github_url.clone(),
            twitter: e.twitter_url.clone(),
            company: e.company.clone(),
            title: e.title.clone(),
            location: e.location.clone(),
            bio: e.bio.clone(),
            other_urls: e.other_urls.clone(),
        }
    }
}

/// Map of username to enrichment fields, sorted by username.
pub fn build_enriched(records: &[Enrichment]) -> BTreeMap<String, EnrichedProfile> {
    records
        .iter()
        .map(|r| (r.username.clone(), EnrichedProfile::from(r)))
        .collect()
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write pretty-printed JSON to `path`, creating parent directories.
///
/// The file is written to a temporary sibling first and renamed into place.
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| LobGraphError::io(parent, e))?;
        }
    }

    let json = serde_json::to_string_pretty(data)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LobGraphError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| LobGraphError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LobGraphError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}
