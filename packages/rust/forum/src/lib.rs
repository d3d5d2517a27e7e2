//! Forum page fetching and fact extraction.
//!
//! This crate provides:
//! - [`tree`]: invitation tree reconstruction from the users page
//! - [`profile`]: heuristic profile fact extraction
//! - [`user_list`]: username discovery from a saved listing page
//! - [`fetch`]: rate-limited, retrying page fetcher

pub mod fetch;
pub mod markup;
pub mod profile;
pub mod tree;
pub mod user_list;

pub use fetch::{Fetcher, profile_url};
pub use profile::ProfileExtractor;
pub use tree::{TreeFact, TreeParse, parse_user_tree};
pub use user_list::parse_user_list;
