//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use super::remote::{ChatBackend, ChatError, ChatRequest};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Calls `{base_url}/chat/completions` with bearer authentication.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChat {
    /// Create a backend whose calls time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// The completions endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Build the JSON body for a request.
#[must_use]
pub fn request_body(request: &ChatRequest) -> Value {
    json!({
        "model": request.model,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.user },
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

/// Extract `choices[0].message.content` from a response body.
///
/// # Errors
///
/// Returns [`ChatError::MalformedResponse`] if the field is absent.
pub fn answer_text(body: &Value) -> Result<String, ChatError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| ChatError::MalformedResponse("no content in response choices".into()))
}

impl ChatBackend for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        debug!("POST {} model={}", self.endpoint(), request.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        answer_text(&body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4".into(),
            system: "sys".into(),
            user: "Sender Domain: a.com".into(),
            temperature: 0.5,
            max_tokens: 10,
        }
    }

    #[test]
    fn test_request_body() {
        let body = request_body(&request());
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Sender Domain: a.com");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 10);
    }

    #[test]
    fn test_answer_text() {
        let body = json!({ "choices": [{ "message": { "role": "assistant", "content": "yes" } }] });
        assert_eq!(answer_text(&body).unwrap(), "yes");

        let empty = json!({ "choices": [] });
        assert!(matches!(
            answer_text(&empty),
            Err(ChatError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let chat =
            OpenAiChat::new("http://localhost:8080/v1/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(chat.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    /// Serve one HTTP exchange on a local port, replying with `status` and
    /// `body`. The handle yields the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0_u8; 4096];
            while !request_complete(&raw) {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
            String::from_utf8(raw).unwrap()
        });

        (base_url, handle)
    }

    /// Whether `raw` holds the full head and a body of the advertised length.
    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    fn chat(base_url: &str) -> OpenAiChat {
        OpenAiChat::new(base_url, "sk-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_raw_content() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":" Yes "}}]}"#,
        )
        .await;

        let answer = chat(&base_url).complete(&request()).await.unwrap();
        assert_eq!(answer, " Yes ");

        let raw = server.await.unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /v1/chat/completions "));
        assert!(head.contains("authorization: bearer sk-test"));

        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, request_body(&request()));
    }

    #[tokio::test]
    async fn test_complete_maps_error_status() {
        let (base_url, server) = serve_once("500 Internal Server Error", "boom").await;

        let err = chat(&base_url).complete(&request()).await.unwrap_err();
        match err {
            ChatError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_rejects_undecodable_body() {
        let (base_url, server) = serve_once("200 OK", "<html>gateway</html>").await;

        let err = chat(&base_url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_requires_content() {
        let (base_url, server) = serve_once("200 OK", r#"{"choices":[]}"#).await;

        let err = chat(&base_url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
        server.await.unwrap();
    }
}
