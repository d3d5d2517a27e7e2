//! Pipeline passes for LobGraph.
//!
//! Each pass reads from or writes to the [`Storage`](lobgraph_storage::Storage)
//! handle it is given: tree import, profile scraping, people-search
//! enrichment and JSON export.

pub mod enrichment;
pub mod export;
pub mod import;
pub mod progress;
pub mod scrape;

pub use enrichment::{
    EnrichOptions, EnrichSummary, build_search_query, enrich_user, merge_candidates,
    run_enrichment,
};
pub use export::{ExportSummary, export_all};
pub use import::{ImportSummary, import_tree};
pub use progress::{ProgressReporter, SilentProgress};
pub use scrape::{ScrapeOptions, ScrapeSummary, scrape_profile_html, scrape_users};

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use lobgraph_storage::Storage;
    use uuid::Uuid;

    pub(crate) async fn test_storage_at() -> (Storage, PathBuf) {
        let tmp = std::env::temp_dir().join(format!("lobgraph_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();
        (storage, tmp)
    }

    pub(crate) async fn test_storage() -> Storage {
        test_storage_at().await.0
    }
}
