use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_URL: &str = "https://example.com/rust/ownership";
const HISTORY_FILE: &str = "messages_example_com_rust_ownership.json";

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn text_sse(parts: &[&str]) -> String {
    let mut body = String::from("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for part in parts {
        let event = json!({"choices": [{"delta": {"content": part}}]});
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn mount_answer(server: &MockServer, parts: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4.1-mini",
            "stream": true,
            "messages": [{"role": "system"}, {"role": "user", "content": "What is ownership?"}]
        })))
        .respond_with(sse_response(text_sse(parts)))
        .expect(1)
        .mount(server)
        .await;
}

fn ask(home: &TempDir, server: &MockServer) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("pagechat");
    cmd.env("PAGECHAT_HOME", home.path())
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", format!("{}/v1", server.uri()))
        .env_remove("RUST_LOG")
        .args(["ask", "--page", &fixture("article.json")]);
    cmd
}

#[tokio::test]
async fn test_ask_streams_answer_and_saves_history() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_answer(&server, &["Each value ", "has one **owner**."]).await;

    ask(&home, &server)
        .arg("What is ownership?")
        .assert()
        .success()
        .stdout(predicate::str::contains("Each value has one **owner**."));

    let stored = fs::read_to_string(home.path().join("store").join(HISTORY_FILE)).unwrap();
    let messages: Value = serde_json::from_str(&stored).unwrap();
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "What is ownership?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Each value has one **owner**.");
    assert!(messages[1]["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_ask_system_prompt_carries_page() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_answer(&server, &["ok"]).await;

    ask(&home, &server)
        .args(["--no-save", "What is ownership?"])
        .assert()
        .success();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("Title: Rust Ownership"));
    assert!(system.contains(&format!("URL: {PAGE_URL}")));
    assert!(system.contains("single owner"));
    assert!(!system.contains("Hidden promo"));
    assert!(!home.path().join("store").join(HISTORY_FILE).exists());
}

#[tokio::test]
async fn test_ask_html_prints_rendered_answer() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_answer(&server, &["Hello **wor", "ld**\n\n- a\n- b"]).await;

    ask(&home, &server)
        .args(["--html", "--no-save", "What is ownership?"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "<p>Hello <strong>world</strong></p>\n<ul><li>a</li><li>b</li></ul>",
        ));
}

#[tokio::test]
async fn test_ask_reports_provider_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    ask(&home, &server)
        .arg("What is ownership?")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Sorry, I encountered an error. Please check your API key and try again.",
        ))
        .stderr(predicate::str::contains("HTTP 401: Incorrect API key provided"));

    let stored = fs::read_to_string(home.path().join("store").join(HISTORY_FILE)).unwrap();
    let messages: Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(
        messages[1]["content"],
        "Sorry, I encountered an error. Please check your API key and try again."
    );
}

#[test]
fn test_ask_without_api_key_fails() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("pagechat")
        .env("PAGECHAT_HOME", home.path())
        .env_remove("OPENAI_API_KEY")
        .args(["ask", "--page", &fixture("article.json"), "Hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_ask_rejects_blank_question() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("pagechat")
        .env("PAGECHAT_HOME", home.path())
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", "http://127.0.0.1:9")
        .args(["ask", "--page", &fixture("article.json"), "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Question is empty"));
}
