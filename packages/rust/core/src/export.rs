//! Export of the stored graph and enrichment data as JSON artifacts.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use lobgraph_artifacts::{
    ENRICHED_FILE, GRAPH_FILE, build_enriched, build_graph, dangling_edge_count, write_json,
};
use lobgraph_shared::Result;
use lobgraph_storage::Storage;

/// What an export wrote.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub users: usize,
    pub edges: usize,
    /// Edges whose inviter has no user row.
    pub dangling: usize,
    pub enriched: usize,
    pub graph_path: PathBuf,
    pub enriched_path: PathBuf,
}

/// Write `graph.json` and `enriched.json` into `out_dir`.
///
/// Only reads from `storage`, so a read-only handle is enough.
#[instrument(skip_all, fields(out_dir = %out_dir.display(), top_n))]
pub async fn export_all(storage: &Storage, out_dir: &Path, top_n: usize) -> Result<ExportSummary> {
    let users = storage.list_all_users().await?;
    let edges = storage.list_invitation_edges().await?;

    let dangling = dangling_edge_count(&users, &edges);
    if dangling > 0 {
        warn!(dangling, "some inviters are not in the user table");
    }

    let graph = build_graph(&users, &edges, top_n);
    let graph_path = out_dir.join(GRAPH_FILE);
    write_json(&graph_path, &graph)?;

    let records = storage.list_enrichments().await?;
    let enriched = build_enriched(&records);
    let enriched_path = out_dir.join(ENRICHED_FILE);
    write_json(&enriched_path, &enriched)?;

    info!(
        users = users.len(),
        edges = edges.len(),
        enriched = enriched.len(),
        "export complete"
    );

    Ok(ExportSummary {
        users: users.len(),
        edges: edges.len(),
        dangling,
        enriched: enriched.len(),
        graph_path,
        enriched_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lobgraph_shared::{Enrichment, UserUpsert};
    use uuid::Uuid;

    use crate::tests::test_storage_at;

    fn user(name: &str, karma: i64, inviter: Option<&str>) -> UserUpsert {
        UserUpsert {
            username: name.into(),
            karma: Some(karma),
            invited_by_username: inviter.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn export_writes_both_files_from_readonly_store() {
        let (storage, db_path) = test_storage_at().await;
        storage
            .upsert_users(&[
                user("alice", 10, None),
                user("bob", 20, Some("alice")),
                user("carol", 30, Some("alice")),
            ])
            .await
            .unwrap();
        storage
            .upsert_enrichment(&Enrichment {
                username: "bob".into(),
                full_name: Some("Bob B".into()),
                enriched_at: Utc::now(),
                ..Default::default()
            })
            .await
            .unwrap();
        drop(storage);

        let readonly = Storage::open_readonly(&db_path).await.unwrap();
        let out = std::env::temp_dir().join(format!("lobgraph_export_{}", Uuid::now_v7()));
        let summary = export_all(&readonly, &out, 10).await.unwrap();

        assert_eq!(summary.users, 3);
        assert_eq!(summary.edges, 2);
        assert_eq!(summary.dangling, 0);
        assert_eq!(summary.enriched, 1);

        let graph: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.graph_path).unwrap()).unwrap();
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(graph["edges"][0]["source"], "alice");
        assert_eq!(graph["stats"]["max_karma"], 30);
        assert_eq!(graph["stats"]["top_inviters"][0]["username"], "alice");

        let enriched: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.enriched_path).unwrap())
                .unwrap();
        assert_eq!(enriched["bob"]["full_name"], "Bob B");

        let _ = std::fs::remove_dir_all(&out);
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn unknown_inviter_edges_are_exported_and_counted() {
        let (storage, db_path) = test_storage_at().await;
        storage
            .upsert_users(&[user("alice", 10, None), user("bob", 5, Some("ghost"))])
            .await
            .unwrap();

        let out = std::env::temp_dir().join(format!("lobgraph_export_{}", Uuid::now_v7()));
        let summary = export_all(&storage, &out, 10).await.unwrap();
        assert_eq!(summary.edges, 1);
        assert_eq!(summary.dangling, 1);

        let graph: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.graph_path).unwrap()).unwrap();
        assert_eq!(graph["edges"][0]["source"], "ghost");
        assert_eq!(graph["edges"][0]["target"], "bob");

        let _ = std::fs::remove_dir_all(&out);
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn empty_store_exports_empty_graph() {
        let (storage, db_path) = test_storage_at().await;
        let out = std::env::temp_dir().join(format!("lobgraph_export_{}", Uuid::now_v7()));
        let summary = export_all(&storage, &out, 10).await.unwrap();

        assert_eq!(summary.users, 0);
        let graph: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.graph_path).unwrap()).unwrap();
        assert_eq!(graph["stats"]["total_users"], 0);
        assert_eq!(graph["stats"]["max_karma"], 0);

        let _ = std::fs::remove_dir_all(&out);
        let _ = std::fs::remove_file(&db_path);
    }
}
