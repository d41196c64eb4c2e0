use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode, header};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::Config;

/// Fixed upstream timeout; slow upstream calls surface as 504 to clients
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest request body the gateway will buffer for forwarding
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Header the upstream store authenticates with
const API_KEY_HEADER: &str = "api-key";

#[derive(Debug, Error)]
enum GatewayError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Failed to read request body: {0}")]
    Body(String),
}

#[derive(Clone)]
struct GatewayState {
    client: reqwest::Client,
    store_url: String,
    api_key: String,
}

/// Build the forwarding router: a single catch-all that relays any path
/// and method to the upstream store with the server-held API key injected.
pub fn router(config: &Config) -> eyre::Result<Router> {
    let client = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()?;

    let state = GatewayState {
        client,
        store_url: config.store_url.clone(),
        api_key: config.store_api_key.clone(),
    };

    Ok(Router::new()
        .fallback(forward)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn forward(State(state): State<GatewayState>, request: Request) -> Response {
    match relay(&state, request).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn relay(state: &GatewayState, request: Request) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.store_url, path_and_query);

    debug!(method = %parts.method, url, "Forwarding request upstream");

    let mut upstream = state
        .client
        .request(parts.method.clone(), &url)
        .header(API_KEY_HEADER, &state.api_key);

    if let Some(content_type) = parts.headers.get(header::CONTENT_TYPE) {
        upstream = upstream.header(header::CONTENT_TYPE, content_type);
    }

    if parts.method != Method::GET && parts.method != Method::HEAD {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| GatewayError::Body(e.to_string()))?;
        upstream = upstream.body(bytes);
    }

    let upstream_response = upstream.send().await?;

    let status = upstream_response.status();
    let content_type = upstream_response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned();
    let bytes = upstream_response.bytes().await?;

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::Body(e.to_string()))
}

/// Map an upstream failure onto the three client-visible classes:
/// timed out upstream → 504, unreachable upstream → 502, anything else → 500.
fn classify(err: &reqwest::Error) -> StatusCode {
    if err.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else if err.is_connect() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(err: &GatewayError) -> Response {
    let (status, label) = match err {
        GatewayError::Upstream(inner) => {
            let status = classify(inner);
            let label = match status {
                StatusCode::GATEWAY_TIMEOUT => "upstream timeout",
                StatusCode::BAD_GATEWAY => "upstream unreachable",
                _ => "upstream error",
            };
            (status, label)
        }
        GatewayError::Body(_) => (StatusCode::BAD_REQUEST, "invalid request body"),
    };

    warn!(status = %status, error = %err, "Request failed");
    (
        status,
        axum::Json(json!({
            "error": label,
            "details": err.to_string(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn echo_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(|request: Request| async move {
            let (parts, body) = request.into_parts();
            let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES).await.unwrap();
            axum::Json(json!({
                "method": parts.method.as_str(),
                "path": parts.uri.path(),
                "query": parts.uri.query(),
                "apiKey": parts.headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()),
                "body": String::from_utf8_lossy(&bytes),
            }))
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn gateway_for(store_url: String) -> Router {
        router(&Config {
            store_url,
            store_api_key: "secret-key".to_string(),
            port: 0,
            environment: Environment::Development,
        })
        .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_path_query_and_injects_api_key() {
        let upstream = echo_upstream().await;
        let gateway = gateway_for(upstream);

        let response = gateway
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/collections/items/points?limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let echoed = body_json(response).await;
        assert_eq!(echoed["path"], "/collections/items/points");
        assert_eq!(echoed["query"], "limit=5");
        assert_eq!(echoed["apiKey"], "secret-key");
    }

    #[tokio::test]
    async fn test_forwards_post_body_verbatim() {
        let upstream = echo_upstream().await;
        let gateway = gateway_for(upstream);

        let response = gateway
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/collections/items/points")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"points":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        let echoed = body_json(response).await;
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["body"], r#"{"points":[]}"#);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_maps_to_502() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway = gateway_for(format!("http://{}", addr));
        let response = gateway
            .oneshot(
                Request::builder()
                    .uri("/collections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "upstream unreachable");
        assert!(body["details"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_timeout_classifies_as_504() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let _socket = socket;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                });
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let err = client
            .get(format!("http://{}/collections", addr))
            .send()
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(classify(&err), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_connect_error_classifies_as_502() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = reqwest::Client::new();
        let err = client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();

        assert!(err.is_connect());
        assert_eq!(classify(&err), StatusCode::BAD_GATEWAY);
    }
}
