#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rulekeeper::llm::{ChatBackend, ChatMessage};
use rulekeeper::projects::ProjectPath;
use rulekeeper::{build_router, AppState, Config};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Chat backend that replays a canned reply and records every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    pub reply: Mutex<String>,
    pub seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedBackend {
    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().expect("reply lock") = reply.to_string();
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, api_key: &str, messages: &[ChatMessage]) -> rulekeeper::Result<String> {
        self.seen
            .lock()
            .expect("seen lock")
            .push((api_key.to_string(), messages.to_vec()));
        Ok(self.reply.lock().expect("reply lock").clone())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub backend: Arc<ScriptedBackend>,
    pub scan_root: PathBuf,
    pub config: Config,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Self {
        Self::launch(customize, false).await
    }

    /// Server whose analyzer talks to `llm.base_url` over HTTP.
    pub async fn start_live(customize: impl FnOnce(&mut Config)) -> Self {
        Self::launch(customize, true).await
    }

    async fn launch(customize: impl FnOnce(&mut Config), live: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let scan_root = dir.path().join("code");
        std::fs::create_dir_all(&scan_root).expect("create scan root");

        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().join("data"));
        config.scan.default_paths = vec![scan_root.clone()];
        config.llm.api_key_env = "RULEKEEPER_IT_KEY_THAT_IS_NEVER_SET".to_string();
        customize(&mut config);

        let backend = Arc::new(ScriptedBackend::default());
        let state = if live {
            AppState::open(config.clone())
        } else {
            AppState::with_backend(config.clone(), backend.clone())
        }
        .expect("open app state");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .await
                .expect("server");
        });

        Self {
            addr,
            backend,
            scan_root,
            config,
            _dir: dir,
        }
    }

    /// Create a project directory under the scan root.
    pub fn project(&self, name: &str, with_rules: bool) -> PathBuf {
        let project = self.scan_root.join(name);
        std::fs::create_dir_all(project.join(".git")).expect("create project");
        if with_rules {
            std::fs::create_dir_all(project.join(".cursor/rules")).expect("create rules dir");
        }
        project
    }

    pub fn segment(path: &Path) -> String {
        ProjectPath::encode(path)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        self.json("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: &str) -> (u16, Value) {
        self.json("POST", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> (u16, Value) {
        self.json("DELETE", path, None).await
    }

    async fn json(&self, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
        let (status, _, body) = send_raw_with_method(self.addr, method, path, &[], body).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or_else(|e| panic!("json body ({e}): {body}"))
        };
        (status, value)
    }
}

pub async fn send_raw_with_method(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(payload) = body {
        req.push_str("Content-Type: application/json\r\n");
        req.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    } else if method != "GET" && method != "OPTIONS" {
        req.push_str("Content-Length: 0\r\n");
    }
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    if let Some(payload) = body {
        req.push_str(payload);
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

/// A request received by [`FakeUpstream`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

/// Chat-completion provider stand-in: answers one connection per canned
/// response, in order, and records what it was sent.
pub struct FakeUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeUpstream {
    pub async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream");
        let addr = listener.local_addr().expect("upstream addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.expect("accept");
                let request = read_request(&mut stream).await;
                seen.lock().expect("requests lock").push(request);

                let response = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream
                    .write_all(response.as_bytes())
                    .await
                    .expect("write response");
                let _ = stream.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    /// Base URL to put in `llm.base_url`.
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.expect("read request");
        assert!(n > 0, "connection closed before request ended");
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            let length = header(head, "content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if body.len() >= length {
                return CapturedRequest {
                    head: head.to_string(),
                    body: body.to_string(),
                };
            }
        }
    }
}
