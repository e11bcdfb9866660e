// The dispatcher: bridges raw hyper requests to the route table and back.
// Per request: match against the table, optionally read and parse a JSON
// body, invoke the handler, serialize its descriptor. Exactly once, no
// retry; every failure becomes a response.

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE, SERVER};
use hyper::{Request, Response};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{self, RequestContext};
use crate::config::AppState;
use crate::logger;
use crate::response;

pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let access_log = state.config.logging.access_log;

    if access_log {
        logger::log_request(&method, req.uri(), req.version());
    }
    logger::log_headers_count(req.headers().len(), state.config.logging.show_headers);

    if let Some(resp) = check_body_size(&req, state.config.http.max_body_size) {
        return Ok(respond(&state, resp));
    }

    // Match before touching the body; an unmatched request is answered
    // without draining anything. Method and pattern must both match.
    let Some(route) = api::find_route(&state.routes, &method, &path) else {
        return Ok(respond(&state, response::not_found()));
    };

    let body = match read_json_body(req, state.config.performance.read_timeout).await {
        Ok(body) => body,
        Err(resp) => return Ok(respond(&state, resp)),
    };

    let context = RequestContext {
        captures: api::extract_captures(route, &path),
        body,
        store: Arc::clone(&state.store),
    };

    let resp = match (route.handler)(context).await {
        Ok(api_response) => response::from_api(api_response),
        Err(err) => {
            logger::log_error(&format!("store operation failed: {err}"));
            response::internal_error()
        }
    };
    Ok(respond(&state, resp))
}

/// Reject requests whose declared Content-Length exceeds the limit before
/// any body is read. A missing or unparseable header skips the check.
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let size_str = req.headers().get("content-length")?.to_str().ok()?;
    match size_str.parse::<u64>() {
        Ok(size) if size > max_body_size => {
            logger::log_warning(&format!(
                "Request body too large: {size} bytes (max: {max_body_size})"
            ));
            Some(response::payload_too_large())
        }
        _ => None,
    }
}

/// Read and parse the request body, but only when the client declares
/// exactly `application/json`. The read is bounded by the configured
/// timeout so a stalled body stream ends in a 408 instead of an unbounded
/// wait. An empty JSON-typed body counts as no body at all; a body that
/// does not parse is a 400, not a hang.
async fn read_json_body<B>(
    req: Request<B>,
    read_timeout: u64,
) -> Result<Option<Value>, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        == Some("application/json");
    if !is_json {
        return Ok(None);
    }

    let collect = req.into_body().collect();
    let bytes = match tokio::time::timeout(Duration::from_secs(read_timeout), collect).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(err)) => {
            logger::log_warning(&format!("Failed to read request body: {err}"));
            return Err(response::ill_formed_json());
        }
        Err(_) => {
            logger::log_warning(&format!(
                "Request body read timed out after {read_timeout} seconds"
            ));
            return Err(response::request_timeout());
        }
    };

    if bytes.is_empty() {
        return Ok(None);
    }

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            logger::log_warning(&format!("Ill-formed JSON body: {err}"));
            Err(response::ill_formed_json())
        }
    }
}

/// Stamp the configured Server header onto every outgoing response and
/// access-log it. Content-Type is left alone; text bodies carry none.
fn respond(state: &AppState, mut resp: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    if let Ok(value) = HeaderValue::from_str(&state.config.http.server_name) {
        resp.headers_mut().insert(SERVER, value);
    }
    if state.config.logging.access_log {
        let size = resp.body().size_hint().exact().unwrap_or(0);
        logger::log_response(resp.status(), size);
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig, StorageBackend,
        StorageConfig,
    };
    use crate::store::{Post, PostStore};
    use hyper::{Method, StatusCode};
    use serde_json::json;

    fn test_state(store: PostStore) -> Arc<AppState> {
        test_state_with_timeout(store, 5)
    }

    fn test_state_with_timeout(store: PostStore, read_timeout: u64) -> Arc<AppState> {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
                workers: None,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                db_file: "database.json".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                access_log: false,
                show_headers: false,
            },
            performance: PerformanceConfig {
                keep_alive_timeout: 75,
                read_timeout,
                write_timeout: 5,
                max_connections: None,
            },
            http: HttpConfig {
                server_name: "blog-server/0.1".to_string(),
                max_body_size: 1024,
            },
        };

        Arc::new(AppState {
            config,
            routes: api::routes().unwrap(),
            store: Arc::new(store),
        })
    }

    fn seeded_store() -> PostStore {
        PostStore::memory(vec![Post {
            id: "a".to_string(),
            title: "A".to_string(),
            content: "c1".to_string(),
        }])
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn post_json(path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_string(resp: Response<Full<Bytes>>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unmatched_path_is_404_with_trailing_period() {
        let state = test_state(seeded_store());
        let resp = handle_request(get("/nothing-here"), state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(body_string(resp).await, "Not found.");
    }

    #[tokio::test]
    async fn test_unmatched_method_is_404() {
        let state = test_state(seeded_store());
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/posts")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = handle_request(req, state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(resp).await, "Not found.");
    }

    #[tokio::test]
    async fn test_list_posts_is_json_with_charset() {
        let state = test_state(seeded_store());
        let resp = handle_request(get("/posts"), state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!([{"id": "a", "title": "A", "content": "c1"}]));
    }

    #[tokio::test]
    async fn test_get_single_post() {
        let state = test_state(seeded_store());
        let resp = handle_request(get("/posts/a"), state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({"id": "a", "title": "A", "content": "c1"}));
    }

    #[tokio::test]
    async fn test_get_unknown_post_is_404_without_period() {
        let state = test_state(seeded_store());
        let resp = handle_request(get("/posts/zzz"), state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(resp).await, "Not found");
    }

    #[tokio::test]
    async fn test_create_then_list_scenario() {
        let state = test_state(seeded_store());

        let resp = handle_request(
            post_json("/posts", r#"{"title": "B", "content": "c2"}"#),
            Arc::clone(&state),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let created: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(created, json!({"id": "B", "title": "B", "content": "c2"}));

        let resp = handle_request(get("/posts"), state).await.unwrap();
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(
            body,
            json!([
                {"id": "a", "title": "A", "content": "c1"},
                {"id": "B", "title": "B", "content": "c2"}
            ])
        );
    }

    #[tokio::test]
    async fn test_create_derives_id_from_whitespace() {
        let state = test_state(PostStore::memory(Vec::new()));

        let resp = handle_request(
            post_json("/posts", r#"{"title": "hello world", "content": "x"}"#),
            Arc::clone(&state),
        )
        .await
        .unwrap();
        let created: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(created["id"], "hello_world");

        let resp = handle_request(get("/posts/hello_world"), state).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_without_json_content_type_has_no_body() {
        let state = test_state(seeded_store());
        // A body is present on the wire but the content type is not JSON,
        // so the dispatcher never reads it and the handler sees no body.
        let req = Request::builder()
            .method(Method::POST)
            .uri("/posts")
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from(r#"{"title":"t","content":"c"}"#)))
            .unwrap();
        let resp = handle_request(req, Arc::clone(&state)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Ill-formed request.");
        assert_eq!(state.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_with_empty_json_body_is_400() {
        let state = test_state(seeded_store());
        let resp = handle_request(post_json("/posts", ""), state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Ill-formed request.");
    }

    #[tokio::test]
    async fn test_malformed_json_is_400_not_a_hang() {
        let state = test_state(seeded_store());
        let resp = handle_request(post_json("/posts", "{not json"), Arc::clone(&state))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Ill-formed JSON.");
        assert_eq!(state.store.list().await.unwrap().len(), 1);
    }

    /// A body stream that never produces a frame and never ends, like a
    /// client that opened its write stream and walked away.
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Result<hyper::body::Frame<Bytes>, Self::Error>>> {
            std::task::Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_stalled_body_read_times_out_with_408() {
        let state = test_state_with_timeout(seeded_store(), 1);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/posts")
            .header("content-type", "application/json")
            .body(StalledBody)
            .unwrap();
        let resp = handle_request(req, Arc::clone(&state)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body_string(resp).await, "Request timeout.");
        assert_eq!(state.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_responses_carry_server_header() {
        let state = test_state(seeded_store());

        let resp = handle_request(get("/posts"), Arc::clone(&state)).await.unwrap();
        assert_eq!(resp.headers().get(SERVER).unwrap(), "blog-server/0.1");

        // Dispatcher-built error responses get the header too.
        let resp = handle_request(get("/nothing-here"), state).await.unwrap();
        assert_eq!(resp.headers().get(SERVER).unwrap(), "blog-server/0.1");
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_413() {
        let state = test_state(seeded_store());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/posts")
            .header("content-type", "application/json")
            .header("content-length", "999999")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = handle_request(req, state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_store_failure_is_500_response() {
        let path = std::env::temp_dir().join(format!(
            "blog_server_dispatch_corrupt_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "]]]").unwrap();

        let state = test_state(PostStore::file(&path));
        let resp = handle_request(get("/posts"), state).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "Internal server error.");

        let _ = std::fs::remove_file(&path);
    }
}
