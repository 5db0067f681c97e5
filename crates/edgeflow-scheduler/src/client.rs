//! Deploy transport — pushes a function to an edge node.
//!
//! `DeployClient` is the seam the coordinator retries through.
//! `HttpDeployClient` speaks HTTP/1.1 to the node's `/deploy` endpoint with
//! a bearer credential.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use thiserror::Error;
use tracing::debug;

use edgeflow_core::{DeployRequest, EdgeNode};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A failed deployment attempt. Every variant is retryable.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("edge node rejected deployment with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("deployment request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode deploy payload: {0}")]
    Encode(String),
}

/// Sends a deploy payload to a node.
pub trait DeployClient: Send + Sync {
    fn deploy<'a>(
        &'a self,
        node: &'a EdgeNode,
        request: &'a DeployRequest,
    ) -> BoxFuture<'a, Result<(), DeployError>>;
}

/// HTTP/1.1 deploy client built on hyper.
#[derive(Debug, Clone)]
pub struct HttpDeployClient {
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpDeployClient {
    pub fn new(auth_token: Option<String>, timeout: Duration) -> Self {
        Self {
            auth_token,
            timeout,
        }
    }

    async fn post_deploy(&self, node: &EdgeNode, request: &DeployRequest) -> Result<(), DeployError> {
        let authority = node.authority();
        let body = serde_json::to_vec(request).map_err(|e| DeployError::Encode(e.to_string()))?;

        let stream = tokio::net::TcpStream::connect(&authority)
            .await
            .map_err(|e| DeployError::Transport(format!("connect {authority}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| DeployError::Transport(format!("handshake with {authority}: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "deploy connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/deploy")
            .header("host", authority.as_str())
            .header("content-type", "application/json")
            .header("user-agent", "edgeflow-scheduler/0.1");
        if let Some(token) = &self.auth_token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| DeployError::Encode(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| DeployError::Transport(format!("request to {authority}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = match resp.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => String::new(),
        };
        Err(DeployError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl DeployClient for HttpDeployClient {
    fn deploy<'a>(
        &'a self,
        node: &'a EdgeNode,
        request: &'a DeployRequest,
    ) -> BoxFuture<'a, Result<(), DeployError>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.post_deploy(node, request)).await {
                Ok(result) => result,
                Err(_) => Err(DeployError::Timeout(self.timeout)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_core::{NodeResources, RuntimeKind};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn node_at(port: u16) -> EdgeNode {
        EdgeNode {
            id: "n1".to_string(),
            address: "127.0.0.1".to_string(),
            port,
            resources: NodeResources { memory: 1024, cpus: 1 },
        }
    }

    fn request() -> DeployRequest {
        DeployRequest {
            id: "f1".to_string(),
            name: "echo".to_string(),
            code: "cat".to_string(),
            runtime: RuntimeKind::Shell,
            task_id: Some("t-42".to_string()),
        }
    }

    /// Read one HTTP request (headers + content-length body) as text.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn one_shot_server(response: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let req = read_request(&mut stream).await;
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            req
        });
        (port, handle)
    }

    #[tokio::test]
    async fn posts_payload_with_bearer_token() {
        let (port, server) = one_shot_server(
            "HTTP/1.1 201 Created\r\ncontent-type: application/json\r\ncontent-length: 2\r\n\r\n{}",
        )
        .await;

        let client = HttpDeployClient::new(Some("s3cret".to_string()), Duration::from_secs(5));
        client.deploy(&node_at(port), &request()).await.unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /deploy HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer s3cret"));
        assert!(raw.contains(r#""taskId":"t-42""#));
        assert!(raw.contains(r#""runtime":"shell""#));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (port, server) = one_shot_server(
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 17\r\n\r\n{\"error\":\"disk\"}\n",
        )
        .await;

        let client = HttpDeployClient::new(None, Duration::from_secs(5));
        let err = client.deploy(&node_at(port), &request()).await.unwrap_err();
        match err {
            DeployError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("disk"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpDeployClient::new(None, Duration::from_secs(5));
        let err = client.deploy(&node_at(port), &request()).await.unwrap_err();
        assert!(matches!(err, DeployError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let client = HttpDeployClient::new(None, Duration::from_millis(100));
        let err = client.deploy(&node_at(port), &request()).await.unwrap_err();
        assert!(matches!(err, DeployError::Timeout(_)));
        server.abort();
    }
}
