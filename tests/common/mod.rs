//! Shared helpers for integration tests.

#![allow(dead_code)]

use camhook::store::MemoryStore;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

pub const ROOT: &str = r"Software\Microsoft\CapabilityAccessManager\ConsentStore\webcam";
pub const VALUE: &str = "LastUsedTimeStop";

pub fn entry(name: &str) -> String {
    format!(r"{ROOT}\{name}")
}

/// One request received by [`WebhookServer`].
#[derive(Debug)]
pub struct ReceivedRequest {
    pub path: String,
    pub body: Value,
}

/// Minimal HTTP/1.1 endpoint that records POSTs and answers with scripted statuses.
pub struct WebhookServer {
    pub base_url: String,
    requests: mpsc::UnboundedReceiver<ReceivedRequest>,
}

impl WebhookServer {
    /// Start listening. Requests are answered with `statuses` in order, then 200.
    pub async fn start(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let statuses = Arc::new(Mutex::new(VecDeque::from(statuses)));

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                let statuses = Arc::clone(&statuses);
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    loop {
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        let path = request_line
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or_default()
                            .to_string();

                        let mut content_length = 0usize;
                        loop {
                            let mut header = String::new();
                            if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
                                return;
                            }
                            let header = header.trim_end();
                            if header.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = header.split_once(':') {
                                if name.eq_ignore_ascii_case("content-length") {
                                    content_length = value.trim().parse().unwrap_or(0);
                                }
                            }
                        }

                        let mut body = vec![0u8; content_length];
                        if reader.read_exact(&mut body).await.is_err() {
                            return;
                        }
                        let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

                        let status = statuses.lock().await.pop_front().unwrap_or(200);
                        let response = format!(
                            "HTTP/1.1 {status} Scripted\r\ncontent-length: 0\r\n\r\n"
                        );
                        let _ = tx.send(ReceivedRequest { path, body });
                        if write.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self {
            base_url,
            requests: rx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn next_request(&mut self) -> ReceivedRequest {
        timeout(Duration::from_secs(10), self.requests.recv())
            .await
            .expect("no webhook request arrived")
            .expect("webhook server stopped")
    }
}

/// Wait until `path` has a live change notification registered.
pub async fn wait_registered(store: &MemoryStore, path: &str) {
    timeout(Duration::from_secs(10), async {
        while store.live_registrations(path) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("entry never registered a change notification");
}
