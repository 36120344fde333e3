//! Reputation provider implementations.
//!
//! Supports:
//! - Static analyst lists (JSON)
//! - A SQLite store of previously obtained verdicts

mod static_list;
mod store;

pub use static_list::{StaticList, StaticListEntry, StaticListProvider, DEFAULT_ENGINE_COUNT};
pub use store::{ReputationStore, DEFAULT_STORE_ID};

use super::ReputationProvider;
use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Description of a provider to construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProviderSpec {
    /// Static list loaded from a JSON file
    StaticList { id: String, path: PathBuf },
    /// Static list given inline
    InlineList { id: String, list: StaticList },
    /// SQLite verdict store; the default location when no path is given
    Store {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// Create a reputation provider from its description.
pub fn create_provider(spec: &ProviderSpec) -> Result<Arc<dyn ReputationProvider>> {
    match spec {
        ProviderSpec::StaticList { id, path } => {
            Ok(Arc::new(StaticListProvider::from_json_file(id.clone(), path)?))
        }
        ProviderSpec::InlineList { id, list } => {
            Ok(Arc::new(StaticListProvider::new(id.clone(), list.clone())))
        }
        ProviderSpec::Store { id, path } => {
            let store = match path {
                Some(path) => ReputationStore::open(path)?,
                None => ReputationStore::open_default()?,
            };
            let store = match id {
                Some(id) => store.with_id(id.clone()),
                None => store,
            };
            Ok(Arc::new(store))
        }
    }
}
