//! HTTP client for a hosted chat model.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use url::Url;

use crate::config::InferenceConfig;
use crate::inference::{ChatMessage, InferenceBackend, InferenceError, InferenceReply};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// Posts `{ model, messages }` to a JSON endpoint and reads `{ response }`.
#[derive(Debug, Clone)]
pub struct HttpInferenceBackend {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpInferenceBackend {
    pub fn new(client: reqwest::Client, endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| InferenceError::Backend(format!("invalid endpoint: {e}")))?;
        Ok(Self::new(reqwest::Client::new(), endpoint, config.api_key.clone()))
    }

    async fn call(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, InferenceError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&CompletionRequest {
            model,
            messages: &messages,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let reply: InferenceReply = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| InferenceError::Backend(e.to_string()))?
            .json()
            .await
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        Ok(reply.response)
    }
}

impl InferenceBackend for HttpInferenceBackend {
    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'a, Result<String, InferenceError>> {
        self.call(model, messages).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    #[derive(serde::Deserialize)]
    struct Seen {
        model: String,
        messages: Vec<ChatMessage>,
    }

    #[tokio::test]
    async fn test_posts_model_and_messages() {
        let app = Router::new().route(
            "/chat",
            post(|Json(seen): Json<Seen>| async move {
                Json(InferenceReply {
                    response: format!("{}:{}", seen.model, seen.messages[0].content),
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let backend = HttpInferenceBackend::new(
            client,
            Url::parse(&format!("http://{}/chat", addr)).unwrap(),
            Some("secret".into()),
        );
        let reply = backend
            .complete("tiny", vec![ChatMessage::user("ping")])
            .await
            .unwrap();
        assert_eq!(reply, "tiny:ping");
    }

    #[tokio::test]
    async fn test_error_status_is_backend_error() {
        let app = Router::new().route(
            "/chat",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let backend =
            HttpInferenceBackend::new(client, Url::parse(&format!("http://{}/chat", addr)).unwrap(), None);
        let err = backend
            .complete("tiny", vec![ChatMessage::user("ping")])
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Backend(_)));
    }
}
