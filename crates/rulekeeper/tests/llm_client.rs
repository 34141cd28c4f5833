mod support;

use rulekeeper::config::LlmConfig;
use rulekeeper::llm::{ChatBackend, ChatMessage, OpenAiClient};
use rulekeeper::Error;
use support::{header, FakeUpstream, TestServer};

const COMPLETION: &str =
    r#"{"id":"cmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"Looks good."}}]}"#;
const UNAUTHORIZED: &str =
    r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;

fn client_for(upstream: &FakeUpstream) -> OpenAiClient {
    OpenAiClient::new(&LlmConfig {
        base_url: format!("{}/", upstream.base_url()),
        model: "test-model".to_string(),
        max_tokens: 321,
        temperature: 0.5,
        timeout_secs: 5,
        ..LlmConfig::default()
    })
    .expect("client")
}

fn conversation() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You review rules."),
        ChatMessage::user("Always use pnpm."),
    ]
}

#[tokio::test]
async fn sends_bearer_auth_and_completion_body() {
    let upstream = FakeUpstream::start(vec![(200, COMPLETION)]).await;
    let client = client_for(&upstream);
    assert_eq!(
        client.endpoint(),
        format!("http://{}/v1/chat/completions", upstream.addr)
    );

    let reply = client
        .complete("sk-test-abc123", &conversation())
        .await
        .unwrap();
    assert_eq!(reply, "Looks good.");

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.request_line(), "POST /v1/chat/completions HTTP/1.1");
    assert_eq!(
        header(&request.head, "authorization"),
        Some("Bearer sk-test-abc123")
    );
    assert!(header(&request.head, "content-type")
        .unwrap()
        .starts_with("application/json"));

    let body = request.json();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["max_tokens"], 321);
    assert_eq!(body["temperature"], 0.5);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "You review rules.");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "Always use pnpm.");
}

#[tokio::test]
async fn error_status_becomes_upstream_error() {
    let upstream = FakeUpstream::start(vec![(401, UNAUTHORIZED), (200, COMPLETION)]).await;
    let client = client_for(&upstream);

    let err = client
        .complete("sk-wrong", &conversation())
        .await
        .unwrap_err();
    assert!(err.is_upstream_error());
    match err {
        Error::LlmUpstream { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("expected LlmUpstream, got {other:?}"),
    }

    // The client is reusable after a failure.
    let reply = client.complete("sk-right", &conversation()).await.unwrap();
    assert_eq!(reply, "Looks good.");
    assert_eq!(upstream.requests().len(), 2);
}

#[tokio::test]
async fn malformed_success_body_is_transport_error() {
    let upstream = FakeUpstream::start(vec![(200, "<html>gateway</html>")]).await;
    let client = client_for(&upstream);

    let err = client.complete("sk-test", &conversation()).await.unwrap_err();
    assert!(matches!(err, Error::LlmTransport(_)), "got {err:?}");
    assert!(err.is_upstream_error());
}

#[tokio::test]
async fn empty_choices_is_empty_response() {
    let upstream = FakeUpstream::start(vec![
        (200, r#"{"choices":[]}"#),
        (200, r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#),
    ])
    .await;
    let client = client_for(&upstream);

    for _ in 0..2 {
        let err = client.complete("sk-test", &conversation()).await.unwrap_err();
        assert!(matches!(err, Error::LlmEmptyResponse(_)), "got {err:?}");
    }
}

#[tokio::test]
async fn rejected_key_surfaces_as_bad_gateway() {
    let upstream = FakeUpstream::start(vec![(401, UNAUTHORIZED)]).await;
    let base_url = upstream.base_url();
    let server = TestServer::start_live(|c| c.llm.base_url = base_url).await;

    let (status, _) = server
        .post("/api/settings/api-key", r#"{"apiKey":"sk-live-abcdef123456"}"#)
        .await;
    assert_eq!(status, 200);

    let project = server.project("web", false);
    let base = format!("/api/projects/{}/postmortems", TestServer::segment(&project));
    let (_, body) = server.post(&base, r#"{"notes":"Used npm"}"#).await;
    let id = body["postmortem"]["id"].as_i64().unwrap();

    let (status, body) = server
        .post(&format!("/api/postmortems/{id}/analyze"), "")
        .await;
    assert_eq!(status, 502);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Incorrect API key provided"));

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        header(&requests[0].head, "authorization"),
        Some("Bearer sk-live-abcdef123456")
    );
    assert!(requests[0].json()["messages"][1]["content"]
        .as_str()
        .unwrap()
        .contains("Used npm"));

    let (_, body) = server.get(&format!("/api/postmortems/{id}")).await;
    assert!(body["postmortem"]["analyzedAt"].is_null());
}
