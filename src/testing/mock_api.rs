//! Loopback mock of the model gateway.
//!
//! Speaks just enough of the OpenAI-compatible `/chat/completions`
//! protocol to satisfy [`crate::api::GatewayClient`], so the real HTTP
//! client can be exercised without a live endpoint. Binds to an
//! OS-assigned port on 127.0.0.1.

use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};

/// Describes how the mock gateway answers a request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A plain assistant text message.
    Text(String),
    /// A response carrying tool calls: `(id, name, arguments)` triples.
    ToolCalls(Vec<(String, String, String)>),
    /// An HTTP error with the given status code and body.
    Error { status: u16, body: String },
}

pub struct MockGatewayServer {
    url: String,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub struct MockGatewayConfig {
    /// Responses served in FIFO order; the default is used once exhausted.
    pub responses: Vec<MockResponse>,
    pub default_response: MockResponse,
    pub latency_ms: u64,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            default_response: MockResponse::Text("mock answer".to_string()),
            latency_ms: 0,
        }
    }
}

#[derive(Default)]
pub struct MockGatewayBuilder {
    config: MockGatewayConfig,
}

impl MockGatewayBuilder {
    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.config.responses.push(MockResponse::Text(text.into()));
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<(String, String, String)>) -> Self {
        self.config.responses.push(MockResponse::ToolCalls(calls));
        self
    }

    pub fn with_error(mut self, status: u16, body: impl Into<String>) -> Self {
        self.config.responses.push(MockResponse::Error {
            status,
            body: body.into(),
        });
        self
    }

    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.config.latency_ms = ms;
        self
    }

    pub async fn build(self) -> MockGatewayServer {
        MockGatewayServer::start(self.config).await
    }
}

impl MockGatewayServer {
    pub fn builder() -> MockGatewayBuilder {
        MockGatewayBuilder::default()
    }

    pub async fn start(config: MockGatewayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock gateway");
        let addr = listener.local_addr().expect("failed to get local addr");
        let url = format!("http://{}", addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(listener, Arc::new(config), shutdown_rx));

        Self {
            url,
            shutdown_tx,
            handle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<MockGatewayConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let next_index = Arc::new(Mutex::new(0usize));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let config = Arc::clone(&config);
                        let index = Arc::clone(&next_index);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, config, index).await {
                                tracing::debug!("mock gateway connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::debug!("mock gateway accept error: {}", e),
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    config: Arc<MockGatewayConfig>,
    next_index: Arc<Mutex<usize>>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 16384];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    if !(request.starts_with("POST") && request.contains("/chat/completions")) {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
        stream.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    if config.latency_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(config.latency_ms)).await;
    }

    let response = {
        let mut index = next_index.lock().await;
        if *index < config.responses.len() {
            let response = config.responses[*index].clone();
            *index += 1;
            response
        } else {
            config.default_response.clone()
        }
    };

    match response {
        MockResponse::Text(text) => {
            let body = chat_body(json!({"role": "assistant", "content": text}), "stop");
            write_response(&mut stream, 200, &body).await
        }
        MockResponse::ToolCalls(calls) => {
            let tool_calls: Vec<_> = calls
                .into_iter()
                .map(|(id, name, arguments)| {
                    json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    })
                })
                .collect();
            let body = chat_body(
                json!({"role": "assistant", "content": null, "tool_calls": tool_calls}),
                "tool_calls",
            );
            write_response(&mut stream, 200, &body).await
        }
        MockResponse::Error { status, body } => write_response(&mut stream, status, &body).await,
    }
}

fn chat_body(message: serde_json::Value, finish_reason: &str) -> String {
    json!({
        "id": "mock-resp-1",
        "model": "mock-model",
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
    .to_string()
}

async fn write_response(
    stream: &mut tokio::net::TcpStream,
    status: u16,
    body: &str,
) -> std::io::Result<()> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body,
    );
    stream.write_all(response.as_bytes()).await
}
