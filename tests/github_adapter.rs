//! Wire-level tests for the GitHub adapter.
//!
//! Each test scripts the provider's responses with `ScriptedTransport` and
//! asserts on both the normalized result and the requests that were sent.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use gitshelf::github::{GitHubProvider, CONTENTS_LISTING_LIMIT};
use gitshelf::transport::scripted::ScriptedTransport;
use gitshelf::transport::{HttpResponse, Method, Transport};
use gitshelf::with_provider;
use gitshelf_core::error::{StoreError, SNIPPET_LEN};
use gitshelf_core::models::{EntryKind, GitHubSettings, ProviderSettings};
use gitshelf_core::Provider;
use serde_json::json;

fn settings() -> GitHubSettings {
    GitHubSettings {
        pat: "ghp_test".into(),
        owner: "acme".into(),
        repo: "notes".into(),
        branch: Some("main".into()),
        api_url: None,
    }
}

fn provider(transport: &Arc<ScriptedTransport>) -> GitHubProvider {
    let transport: Arc<dyn Transport> = transport.clone();
    GitHubProvider::new(settings(), transport)
}

fn file_json(path: &str, content: &str, sha: &str) -> serde_json::Value {
    // GitHub wraps base64 at 60 columns.
    let encoded = STANDARD.encode(content);
    let wrapped = encoded
        .as_bytes()
        .chunks(60)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    json!({
        "type": "file",
        "name": path.rsplit('/').next().unwrap(),
        "path": path,
        "sha": sha,
        "encoding": "base64",
        "content": wrapped,
    })
}

#[tokio::test]
async fn test_get_file_decodes_content_and_sends_auth() {
    let transport = Arc::new(ScriptedTransport::new());
    let body = "---\ntitle: Renew certs\n---\nrotate the TLS certificates before they expire\n";
    transport.push_json(200, file_json("tasks/a.md", body, "sha-1"));

    let file = provider(&transport).get_file("tasks/a.md").await.unwrap();
    assert_eq!(file.content, body);
    assert_eq!(file.sha, "sha-1");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::Get);
    assert_eq!(
        req.url,
        "https://api.github.com/repos/acme/notes/contents/tasks/a.md?ref=main"
    );
    assert!(req
        .headers
        .iter()
        .any(|(k, v)| k == "Authorization" && v == "Bearer ghp_test"));
    assert!(req
        .headers
        .iter()
        .any(|(k, v)| k == "Accept" && v == "application/vnd.github+json"));
}

#[tokio::test]
async fn test_get_file_metadata_unparseable_body_is_protocol_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let raw = format!("<html><body>{}</body></html>", "gateway hiccup ".repeat(40));
    transport.push(200, &raw);

    let err = provider(&transport)
        .get_file_metadata("tasks/a.md")
        .await
        .unwrap_err();
    match &err {
        StoreError::Protocol { snippet, body, .. } => {
            assert_eq!(body, &raw);
            assert!(snippet.chars().count() <= SNIPPET_LEN + 1);
            let prefix: String = raw.chars().take(SNIPPET_LEN).collect();
            assert!(snippet.starts_with(&prefix));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("<html><body>gateway hiccup"));
    assert!(message.len() < raw.len());
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(404, r#"{"message":"Not Found"}"#);
    let err = provider(&transport).get_file("tasks/none.md").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { ref path } if path == "tasks/none.md"));
}

#[tokio::test]
async fn test_large_file_falls_back_to_blob_api() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push_json(
            200,
            json!({"type": "file", "name": "big.md", "path": "tasks/big.md",
                   "sha": "blob-sha", "encoding": "none", "content": ""}),
        )
        .push_json(
            200,
            json!({"sha": "blob-sha", "encoding": "base64", "content": STANDARD.encode("big body")}),
        );

    let file = provider(&transport).get_file("tasks/big.md").await.unwrap();
    assert_eq!(file.content, "big body");
    assert_eq!(file.sha, "blob-sha");
    assert!(transport.requests()[1].url.ends_with("/git/blobs/blob-sha"));
}

#[tokio::test]
async fn test_list_two_files_yields_two_documents() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push_json(
            200,
            json!([
                {"type": "file", "name": "P1--2024-01-05--first.md", "path": "tasks/P1--2024-01-05--first.md", "sha": "s1"},
                {"type": "file", "name": ".gitkeep", "path": "tasks/.gitkeep", "sha": "s0"},
                {"type": "dir", "name": "archive", "path": "tasks/archive", "sha": "d1"},
                {"type": "file", "name": "legacy note.md", "path": "tasks/legacy note.md", "sha": "s2"},
            ]),
        )
        .push_json(200, file_json("tasks/P1--2024-01-05--first.md", "---\ntitle: First\n---\n", "s1"))
        .push_json(200, file_json("tasks/legacy note.md", "no header here\n", "s2"));

    let docs = provider(&transport).list_all("tasks", false).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.path.starts_with("tasks/")));
    assert_eq!(docs[0].title, "First");
    assert_eq!(docs[1].title, "legacy note");
    assert_eq!(docs[1].sha.as_deref(), Some("s2"));
    assert_eq!(transport.remaining(), 0);
    assert_eq!(
        transport.requests()[2].url,
        "https://api.github.com/repos/acme/notes/contents/tasks/legacy%20note.md?ref=main"
    );
}

#[tokio::test]
async fn test_update_sends_sha_and_branch() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(
        200,
        json!({"content": {"sha": "new-sha"}, "commit": {"sha": "commit-1"}}),
    );

    let result = provider(&transport)
        .create_or_update("tasks/a.md", "hello", "Edit a", Some("old-sha"))
        .await
        .unwrap();
    assert_eq!(result.sha, "new-sha");
    assert_eq!(result.commit_sha.as_deref(), Some("commit-1"));

    let req = &transport.requests()[0];
    assert_eq!(req.method, Method::Put);
    assert_eq!(
        req.url,
        "https://api.github.com/repos/acme/notes/contents/tasks/a.md"
    );
    let body = req.body.as_ref().unwrap();
    assert_eq!(body["sha"], "old-sha");
    assert_eq!(body["branch"], "main");
    assert_eq!(body["message"], "Edit a");
    assert_eq!(body["content"], STANDARD.encode("hello"));
}

#[tokio::test]
async fn test_stale_sha_is_conflict() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(409, r#"{"message":"tasks/a.md does not match old-sha"}"#);
    let err = provider(&transport)
        .create_or_update("tasks/a.md", "x", "Edit", Some("old-sha"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_create_on_existing_path_is_conflict() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(
        422,
        r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#,
    );
    let err = provider(&transport)
        .create_or_update("tasks/a.md", "x", "Create", None)
        .await
        .unwrap_err();
    match err {
        StoreError::Conflict { detail, .. } => assert!(detail.contains("already exists")),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(transport.requests()[0].body.as_ref().unwrap().get("sha").is_none());
}

#[tokio::test]
async fn test_server_error_is_transport_with_status() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_response(HttpResponse::new(503, "unavailable"));
    let err = provider(&transport).get_file("tasks/a.md").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Transport {
            status: Some(503),
            ..
        }
    ));
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(
        200,
        json!([
            {"sha": "c2", "html_url": "https://github.com/acme/notes/commit/c2",
             "commit": {"message": "Rename", "author": {"name": "Ada", "email": "ada@example.com", "date": "2024-02-01T10:00:00Z"}}},
            {"sha": "c1",
             "commit": {"message": "Create", "author": {"name": "Ada", "date": "2024-01-01T09:00:00Z"}}},
        ]),
    );

    let commits = provider(&transport).history("tasks/a.md").await.unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].sha, "c2");
    assert!(commits[0].date > commits[1].date);
    assert_eq!(commits[1].author_email, None);
    assert_eq!(
        transport.requests()[0].url,
        "https://api.github.com/repos/acme/notes/commits?path=tasks%2Fa.md&per_page=100&sha=main"
    );
}

fn commit_json(sha: &str, date: &str) -> serde_json::Value {
    json!({"sha": sha, "commit": {"message": sha, "author": {"name": "Ada", "date": date}}})
}

#[tokio::test]
async fn test_history_follows_link_header_to_last_page() {
    let transport = Arc::new(ScriptedTransport::new());
    let next = "https://api.github.com/repositories/7/commits?path=tasks%2Fa.md&per_page=100&sha=main&page=2";
    transport
        .push_response(
            HttpResponse::new(
                200,
                json!([commit_json("c3", "2024-03-01T00:00:00Z"), commit_json("c2", "2024-02-01T00:00:00Z")])
                    .to_string(),
            )
            .with_header(
                "Link",
                format!(r#"<{next}>; rel="next", <{next}>; rel="last""#),
            ),
        )
        .push_response(
            HttpResponse::new(200, json!([commit_json("c1", "2024-01-01T00:00:00Z")]).to_string())
                .with_header(
                    "Link",
                    r#"<https://api.github.com/repositories/7/commits?page=1>; rel="prev""#,
                ),
        );

    let commits = provider(&transport).history("tasks/a.md").await.unwrap();
    let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, ["c3", "c2", "c1"]);
    assert_eq!(transport.calls(), 2);
    assert_eq!(transport.requests()[1].url, next);
}

#[tokio::test]
async fn test_capped_listing_is_redone_through_trees_api() {
    let transport = Arc::new(ScriptedTransport::new());
    let capped: Vec<_> = (0..CONTENTS_LISTING_LIMIT)
        .map(|i| json!({"type": "file", "name": format!("n{i}.md"), "path": format!("tasks/n{i}.md"), "sha": "s"}))
        .collect();
    transport.push_json(200, json!(capped)).push_json(
        200,
        json!({
            "sha": "t1",
            "truncated": false,
            "tree": [
                {"path": "n0.md", "type": "blob", "sha": "s"},
                {"path": "n1000.md", "type": "blob", "sha": "s"},
                {"path": "archive", "type": "tree", "sha": "t2"},
                {"path": "vendored", "type": "commit", "sha": "c"},
            ]
        }),
    );

    let page = provider(&transport).list_page("tasks", None).await.unwrap();
    assert_eq!(page.next, None);
    assert_eq!(page.entries.len(), 3);
    assert_eq!(page.entries[1].path, "tasks/n1000.md");
    assert_eq!(page.entries[1].name, "n1000.md");
    assert_eq!(page.entries[2].kind, EntryKind::Dir);
    assert_eq!(
        transport.requests()[1].url,
        "https://api.github.com/repos/acme/notes/git/trees/main:tasks"
    );
}

#[tokio::test]
async fn test_truncated_tree_is_protocol_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let capped: Vec<_> = (0..CONTENTS_LISTING_LIMIT)
        .map(|i| json!({"type": "file", "name": format!("n{i}.md"), "path": format!("n{i}.md"), "sha": "s"}))
        .collect();
    transport
        .push_json(200, json!(capped))
        .push_json(200, json!({"sha": "t1", "truncated": true, "tree": []}));

    let err = provider(&transport).list_page("", None).await.unwrap_err();
    assert!(matches!(err, StoreError::Protocol { .. }));
    assert_eq!(
        transport.requests()[1].url,
        "https://api.github.com/repos/acme/notes/git/trees/main"
    );
}

#[tokio::test]
async fn test_at_commit_reads_with_commit_ref() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(200, file_json("tasks/a.md", "old", "sha-old"));
    let file = provider(&transport)
        .at_commit("tasks/a.md", "c1")
        .await
        .unwrap();
    assert_eq!(file.content, "old");
    assert!(transport.requests()[0].url.ends_with("?ref=c1"));
}

#[tokio::test]
async fn test_ensure_directory_creates_placeholder_only_when_missing() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .push(404, r#"{"message":"Not Found"}"#)
        .push_json(
            201,
            json!({"content": {"sha": "keep"}, "commit": {"sha": "c1"}}),
        )
        .push_json(
            200,
            json!([{"type": "file", "name": ".gitkeep", "path": "inbox/.gitkeep", "sha": "keep"}]),
        );

    let github = provider(&transport);
    github.ensure_directory("inbox").await.unwrap();
    github.ensure_directory("inbox").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].method, Method::Put);
    assert!(requests[1].url.ends_with("/contents/inbox/.gitkeep"));
    assert_eq!(requests[2].method, Method::Get);
}

#[tokio::test]
async fn test_incomplete_settings_fail_before_any_request() {
    for broken in [
        GitHubSettings {
            pat: String::new(),
            ..settings()
        },
        GitHubSettings {
            owner: "  ".into(),
            ..settings()
        },
        GitHubSettings {
            repo: String::new(),
            ..settings()
        },
    ] {
        let transport = Arc::new(ScriptedTransport::new());
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let err = match with_provider(&ProviderSettings::GitHub(broken), dyn_transport) {
            Ok(_) => panic!("incomplete settings accepted"),
            Err(e) => e,
        };
        match err {
            StoreError::Config { missing, .. } => assert_eq!(missing.len(), 1),
            other => panic!("expected config error, got {other:?}"),
        }
        assert_eq!(transport.calls(), 0);
    }
}
