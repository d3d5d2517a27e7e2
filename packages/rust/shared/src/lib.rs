//! Shared types, error model, and configuration for lobgraph.
//!
//! This crate is the foundation depended on by all other lobgraph crates.
//! It provides:
//! - [`LobGraphError`], the unified error type
//! - Domain types ([`User`], [`UserUpsert`], [`Enrichment`], [`InvitationEdge`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], [`SearchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExportConfig, FetchConfig, FetchPolicyConfig, ForumConfig, PathsConfig,
    SearchConfig, SearchPolicyConfig, config_dir, config_file_path, forum_host, init_config,
    load_config, load_config_from, validate_api_key,
};
pub use error::{LobGraphError, Result};
pub use types::{Enrichment, InvitationEdge, User, UserUpsert};
