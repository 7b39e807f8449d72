//! Integration tests for the workspace file tools, driven through the dispatcher.

use agent_tool_runtime::{ExecutionContext, ToolCall, ToolRegistry};
use serde_json::{Value as JsonValue, json};

struct Workspace {
    dir: tempfile::TempDir,
    registry: ToolRegistry,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            registry: ToolRegistry::builtin(None, "mmdc").unwrap(),
        }
    }

    async fn call(&self, name: &str, args: JsonValue) -> JsonValue {
        let ctx = ExecutionContext::new(self.dir.path());
        let json = self
            .registry
            .execute(&ToolCall::new(name, args.to_string()), &ctx)
            .await;
        serde_json::from_str(&json).unwrap()
    }
}

#[tokio::test]
async fn test_write_then_read_is_byte_identical() {
    let ws = Workspace::new();
    let content = "line one\nzwei: größe\n三\n\u{1F600} emoji\n\ttabbed\r\nwindows line\n";

    let written = ws
        .call("write_file", json!({"path": "docs/notes.md", "content": content}))
        .await;
    assert_eq!(written["success"], true);
    assert_eq!(written["bytes_written"], content.len());

    let read = ws.call("read_file", json!({"path": "docs/notes.md"})).await;
    assert_eq!(read["success"], true);
    assert_eq!(read["content"], content);
    assert_eq!(
        std::fs::read(ws.dir.path().join("docs/notes.md")).unwrap(),
        content.as_bytes()
    );
}

#[tokio::test]
async fn test_overwrite_replaces_content() {
    let ws = Workspace::new();
    ws.call("write_file", json!({"path": "a.txt", "content": "long original text"}))
        .await;
    ws.call("write_file", json!({"path": "a.txt", "content": "short"}))
        .await;
    let read = ws.call("read_file", json!({"path": "a.txt"})).await;
    assert_eq!(read["content"], "short");
}

#[tokio::test]
async fn test_escape_attempts_fail_and_write_nothing() {
    let ws = Workspace::new();
    for path in ["../outside.txt", "/tmp/agent-outside.txt", "a/../../b.txt"] {
        let result = ws
            .call("write_file", json!({"path": path, "content": "x"}))
            .await;
        assert_eq!(result["success"], false, "{path}");
        assert_eq!(
            result["message"],
            format!("Access to path outside workspace is not allowed: {path}")
        );
    }
}

#[tokio::test]
async fn test_list_directory_after_writes() {
    let ws = Workspace::new();
    ws.call("write_file", json!({"path": "b.txt", "content": "bb"}))
        .await;
    ws.call("write_file", json!({"path": "a/inner.txt", "content": ""}))
        .await;

    let listing = ws.call("list_directory", json!({})).await;
    assert_eq!(listing["success"], true);
    assert_eq!(listing["count"], 2);
    assert_eq!(listing["entries"][0]["name"], "a");
    assert_eq!(listing["entries"][0]["kind"], "directory");
    assert_eq!(listing["entries"][1]["name"], "b.txt");
    assert_eq!(listing["entries"][1]["size_bytes"], 2);
}

#[tokio::test]
async fn test_missing_argument_is_failure_envelope() {
    let ws = Workspace::new();
    let result = ws.call("write_file", json!({"path": "a.txt"})).await;
    assert_eq!(result["success"], false);
    assert!(
        result["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid arguments for write_file:")
    );
}

#[tokio::test]
async fn test_reading_a_directory_fails_cleanly() {
    let ws = Workspace::new();
    std::fs::create_dir(ws.dir.path().join("folder")).unwrap();
    let result = ws.call("read_file", json!({"path": "folder"})).await;
    assert_eq!(result["success"], false);
    assert!(result["message"].as_str().unwrap().contains("'folder'"));
}
