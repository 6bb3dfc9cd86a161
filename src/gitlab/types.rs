//! GitLab API records
//!
//! Each record deserializes straight from the GitLab REST response and
//! serializes as tool output. Nested user and milestone objects are
//! flattened to their `username`/`title` on the way in.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Either the bare name or the GitLab object carrying it
#[derive(Deserialize)]
#[serde(untagged)]
enum Named {
    Name(String),
    User { username: String },
    Milestone { title: String },
}

impl Named {
    fn into_name(self) -> String {
        match self {
            Named::Name(name) => name,
            Named::User { username } => username,
            Named::Milestone { title } => title,
        }
    }
}

fn flatten_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Named::deserialize(deserializer).map(Named::into_name)
}

fn flatten_optional_name<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Named>::deserialize(deserializer)?.map(Named::into_name))
}

fn flatten_names<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let names = Option::<Vec<Named>>::deserialize(deserializer)?;
    Ok(names
        .unwrap_or_default()
        .into_iter()
        .map(Named::into_name)
        .collect())
}

/// GitLab project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path_with_namespace: String,
    pub web_url: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Merge request as it appears in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(deserialize_with = "flatten_name")]
    pub author: String,
    pub source_branch: String,
    pub target_branch: String,
    pub web_url: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub user_notes_count: u64,
}

/// Single merge request with review state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestDetails {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: String,
    #[serde(deserialize_with = "flatten_name")]
    pub author: String,
    pub source_branch: String,
    pub target_branch: String,
    pub web_url: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, deserialize_with = "flatten_optional_name")]
    pub merged_by: Option<String>,
    #[serde(default)]
    pub merged_at: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "flatten_optional_name")]
    pub milestone: Option<String>,
    #[serde(default, deserialize_with = "flatten_names")]
    pub assignees: Vec<String>,
    #[serde(default, deserialize_with = "flatten_names")]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub work_in_progress: bool,
    #[serde(default)]
    pub has_conflicts: bool,
    #[serde(default)]
    pub blocking_discussions_resolved: bool,
}

/// One file diff of a merge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestChange {
    pub old_path: String,
    pub new_path: String,
    pub a_mode: String,
    pub b_mode: String,
    pub new_file: bool,
    pub renamed_file: bool,
    pub deleted_file: bool,
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestChanges {
    pub changes: Vec<MergeRequestChange>,
}

/// Commit as listed for a merge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub short_id: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_date: String,
    pub committed_date: String,
}

/// Commit as listed for a branch or ref
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitListItem {
    pub id: String,
    pub short_id: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_date: String,
    pub committer_name: String,
    pub committed_date: String,
    pub web_url: String,
}

/// Single commit with parents and stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetails {
    pub id: String,
    pub short_id: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_date: String,
    pub committed_date: String,
    pub committer_name: String,
    pub web_url: String,
    #[serde(default)]
    pub parent_ids: Option<Vec<String>>,
    #[serde(default)]
    pub stats: Option<Value>,
}

/// GitLab pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub status: String,
    pub web_url: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Note (comment) on a merge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub body: String,
    #[serde(deserialize_with = "flatten_name")]
    pub author: String,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub system: Option<bool>,
    #[serde(default)]
    pub resolvable: Option<bool>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub position: Option<Value>,
}

/// Discussion thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: String,
    #[serde(default)]
    pub individual_note: bool,
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// Repository tree entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub mode: String,
}

/// File with its content decoded to UTF-8
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub file_path: String,
    pub file_name: String,
    pub size: u64,
    pub encoding: String,
    pub content: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub last_commit_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameCommit {
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub committed_date: String,
}

/// Lines attributed to one commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameEntry {
    pub commit: BlameCommit,
    pub lines: Vec<String>,
}

/// Blob search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSearchResult {
    pub basename: String,
    pub data: String,
    pub path: String,
    pub filename: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub startline: u64,
    pub project_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCommit {
    pub id: String,
    pub short_id: String,
    pub title: String,
    pub author_name: String,
    pub committed_date: String,
}

/// Repository branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub default: bool,
    pub web_url: String,
    pub commit: BranchCommit,
}

/// Outcome of a merge request action (approve, merge, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: String,
    pub mr_iid: u64,
}

impl ActionResult {
    pub fn new(status: impl Into<String>, mr_iid: u64) -> Self {
        Self {
            status: status.into(),
            mr_iid,
        }
    }
}

/// Filters for listing projects visible to the service account
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub search: Option<String>,
    pub owned: Option<bool>,
    pub membership: Option<bool>,
}

/// Filters for the instance-wide merge request search
#[derive(Debug, Clone, Default)]
pub struct MergeRequestFilter {
    pub state: Option<String>,
    pub scope: Option<String>,
    pub wip: Option<String>,
    pub author_username: Option<String>,
    pub assignee_username: Option<String>,
    pub search: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub updated_after: Option<String>,
    pub updated_before: Option<String>,
}
