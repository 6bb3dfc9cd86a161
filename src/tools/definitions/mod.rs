//! Tool definitions
//!
//! This module contains all GitLab MCP tool implementations.

pub mod merge_requests;
pub mod projects;
pub mod repository;

use crate::tools::ToolRegistry;
use serde::{Deserialize, Deserializer};

/// Register all tools with the registry
pub fn register_all_tools(registry: &mut ToolRegistry) {
    projects::register(registry);
    repository::register(registry);
    merge_requests::register(registry);
}

/// Accept a project id given either as `"group/app"`, `"42"` or `42`
pub(crate) fn project_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ProjectId {
        Path(String),
        Id(u64),
    }

    Ok(match ProjectId::deserialize(deserializer)? {
        ProjectId::Path(path) => path,
        ProjectId::Id(id) => id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Args {
        #[serde(deserialize_with = "project_id")]
        project_id: String,
    }

    #[test]
    fn test_project_id_accepts_number_and_path() {
        let args: Args = serde_json::from_value(json!({"project_id": 42})).unwrap();
        assert_eq!(args.project_id, "42");
        let args: Args = serde_json::from_value(json!({"project_id": "group/app"})).unwrap();
        assert_eq!(args.project_id, "group/app");
        assert!(serde_json::from_value::<Args>(json!({"project_id": true})).is_err());
    }
}
