//! Tool execution integration tests
//!
//! Tests individual tools with mocked GitLab API responses. Every project
//! here is visible to both identities; the interesting part is the request
//! each tool sends once authorized.

use rmcp::model::{CallToolResult, RawContent};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tanuki_gate::auth::{Credential, Principal};
use tanuki_gate::broker::BrokerProvider;
use tanuki_gate::config::{AppConfig, GitLabConfig};
use tanuki_gate::gitlab::{GitLabClient, ResourceClient, build_http_client};
use tanuki_gate::server::GitLabMcpHandler;
use tanuki_gate::tools::ToolRegistry;
use tanuki_gate::util::SecretString;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Create a handler whose service client targets the mock server
fn create_handler(mock_server: &MockServer) -> GitLabMcpHandler {
    let gitlab = GitLabConfig {
        url: mock_server.uri(),
        ..Default::default()
    };
    let http = build_http_client(&gitlab).unwrap();
    let credential = Credential::service(SecretString::new("service-token")).unwrap();
    let service: Arc<dyn ResourceClient> =
        Arc::new(GitLabClient::new(http.clone(), &gitlab, credential));

    GitLabMcpHandler::new(
        &AppConfig::default(),
        Arc::new(ToolRegistry::with_all_tools()),
        Arc::new(BrokerProvider::new(service, http, gitlab)),
    )
}

/// Mount a project both identities can resolve
async fn mount_authorized_project(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fproject"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "name": "project",
            "path_with_namespace": "group/project",
            "web_url": "https://gitlab.example.com/group/project"
        })))
        .expect(2)
        .mount(mock_server)
        .await;
}

async fn call(mock_server: &MockServer, tool: &str, args: Value) -> CallToolResult {
    let principal = Principal {
        token: SecretString::new("user-token"),
        client_id: "test-client".into(),
        scopes: BTreeSet::from(["api".to_string()]),
    };
    let args: Option<Map<String, Value>> = args.as_object().cloned();

    create_handler(mock_server)
        .call_tool_as(&principal, tool, args)
        .await
        .unwrap()
}

fn output(result: &CallToolResult) -> Value {
    assert_eq!(result.is_error, Some(false), "tool failed: {:?}", result);
    let text = result
        .content
        .iter()
        .find_map(|content| match &content.raw {
            RawContent::Text(text_content) => Some(text_content.text.clone()),
            _ => None,
        })
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

// ============================================================================
// Repository Tools Tests
// ============================================================================

#[tokio::test]
async fn test_get_file_content_decodes_base64() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/repository/files/src%2Fmain.rs"))
        .and(query_param("ref", "develop"))
        .and(header("PRIVATE-TOKEN", "service-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_name": "main.rs",
            "file_path": "src/main.rs",
            "size": 12,
            "encoding": "base64",
            "content": "Zm4gbWFpbigp\nIHt9",
            "ref": "develop",
            "last_commit_id": "abc123"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "get_file_content",
        json!({"project_id": "group/project", "file_path": "src/main.rs", "ref": "develop"}),
    )
    .await;

    let file = output(&result);
    assert_eq!(file["content"], "fn main() {}");
    assert_eq!(file["ref"], "develop");
}

#[tokio::test]
async fn test_get_file_content_defaults_ref_to_head() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/repository/files/README.md"))
        .and(query_param("ref", "HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_name": "README.md",
            "file_path": "README.md",
            "size": 5,
            "encoding": "text",
            "content": "hello",
            "ref": "HEAD",
            "last_commit_id": "abc123"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "get_file_content",
        json!({"project_id": "group/project", "file_path": "README.md"}),
    )
    .await;

    assert_eq!(output(&result)["content"], "hello");
}

#[tokio::test]
async fn test_list_branches_follows_pages() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    let branch = |name: &str| {
        json!({
            "name": name,
            "web_url": format!("https://gitlab.example.com/group/project/-/tree/{}", name),
            "commit": {
                "id": "abc123",
                "short_id": "abc",
                "title": "Initial commit",
                "author_name": "Alice",
                "committed_date": "2024-01-01T00:00:00Z"
            }
        })
    };

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/repository/branches"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([branch("main")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/repository/branches"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([branch("develop")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(&mock_server, "list_branches", json!({"project_id": "group/project"})).await;

    let branches = output(&result);
    assert_eq!(branches.as_array().unwrap().len(), 2);
    assert_eq!(branches[1]["name"], "develop");
}

#[tokio::test]
async fn test_search_code_uses_blob_scope() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/search"))
        .and(query_param("scope", "blobs"))
        .and(query_param("search", "TODO"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "basename": "main",
            "data": "// TODO: remove",
            "path": "src/main.rs",
            "filename": "src/main.rs",
            "ref": "main",
            "startline": 10,
            "project_id": 42
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "search_code",
        json!({"project_id": "group/project", "query": "TODO"}),
    )
    .await;

    assert_eq!(output(&result)[0]["path"], "src/main.rs");
}

// ============================================================================
// Merge Request Tools Tests
// ============================================================================

#[tokio::test]
async fn test_create_merge_request_body() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api/v4/projects/42/merge_requests"))
        .and(body_json(json!({
            "source_branch": "feature",
            "target_branch": "main",
            "title": "New feature"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "iid": 11,
            "title": "New feature",
            "state": "opened",
            "author": {"username": "automation"},
            "source_branch": "feature",
            "target_branch": "main",
            "web_url": "https://gitlab.example.com/group/project/-/merge_requests/11",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "create_merge_request",
        json!({
            "project_id": "group/project",
            "source_branch": "feature",
            "target_branch": "main",
            "title": "New feature",
            "description": ""
        }),
    )
    .await;

    let mr = output(&result);
    assert_eq!(mr["iid"], 11);
    assert_eq!(mr["author"], "automation");
}

#[tokio::test]
async fn test_merge_with_branch_removal() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("PUT"))
        .and(path("/api/v4/projects/42/merge_requests/5/merge"))
        .and(body_json(json!({"should_remove_source_branch": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"iid": 5, "state": "merged"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "merge_merge_request",
        json!({"project_id": "group/project", "mr_iid": 5, "should_remove_source_branch": true}),
    )
    .await;

    assert_eq!(output(&result), json!({"status": "merged", "mr_iid": 5}));
}

#[tokio::test]
async fn test_add_comment_returns_flattened_note() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api/v4/projects/42/merge_requests/5/notes"))
        .and(body_json(json!({"body": "Looks good"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 900,
            "body": "Looks good",
            "author": {"username": "automation", "name": "Automation"},
            "created_at": "2024-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "add_merge_request_comment",
        json!({"project_id": "group/project", "mr_iid": 5, "body": "Looks good"}),
    )
    .await;

    let note = output(&result);
    assert_eq!(note["id"], 900);
    assert_eq!(note["author"], "automation");
}

#[tokio::test]
async fn test_search_merge_requests_is_account_level() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/merge_requests"))
        .and(query_param("scope", "all"))
        .and(query_param("state", "opened"))
        .and(header("PRIVATE-TOKEN", "service-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = call(&mock_server, "search_merge_requests", json!({"state": "opened"})).await;

    assert_eq!(output(&result), json!([]));
}

#[tokio::test]
async fn test_gitlab_failure_after_authorization_is_error_result() {
    let mock_server = MockServer::start().await;
    mount_authorized_project(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/merge_requests/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Not found"})))
        .mount(&mock_server)
        .await;

    let result = call(
        &mock_server,
        "get_merge_request",
        json!({"project_id": "group/project", "mr_iid": 404}),
    )
    .await;

    assert_eq!(result.is_error, Some(true));
}
