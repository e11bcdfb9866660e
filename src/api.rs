// Route table: the supported endpoints declared as data, not code branches.
// Each entry pairs a URL pattern with a method literal and an async handler;
// the dispatcher in handler.rs scans this table in order.

use hyper::{Method, StatusCode};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::store::{PostStore, StoreError};

const NOT_FOUND_BODY: &str = "Not found";
const ILL_FORMED_BODY: &str = "Ill-formed request.";

/// What a handler hands back to the dispatcher: a status code plus either a
/// verbatim text body or a JSON value. The dispatcher serializes the two
/// variants differently.
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: ApiBody,
}

pub enum ApiBody {
    Text(String),
    Json(Value),
}

impl ApiResponse {
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiBody::Text(body.into()),
        }
    }

    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, StoreError> {
        Ok(Self {
            status,
            body: ApiBody::Json(serde_json::to_value(body)?),
        })
    }
}

/// Everything a handler gets to work with: the capture groups of the matched
/// pattern (whole match first), the parsed JSON body if one was sent, and
/// the shared store.
pub struct RequestContext {
    pub captures: Vec<Option<String>>,
    pub body: Option<Value>,
    pub store: Arc<PostStore>,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<ApiResponse, StoreError>> + Send>>;

/// A dispatch rule: URL pattern, method literal, handler.
pub struct Route {
    pub pattern: Regex,
    pub method: Method,
    pub handler: fn(RequestContext) -> HandlerFuture,
}

/// The route table, in registration order. The list and create routes share
/// a pattern and are told apart by method; the single-post route carries its
/// own anchored pattern, so matching never depends on registration order
/// alone.
pub fn routes() -> Result<Vec<Route>, regex::Error> {
    Ok(vec![
        Route {
            pattern: Regex::new(r"/posts$")?,
            method: Method::GET,
            handler: list_posts,
        },
        Route {
            pattern: Regex::new(r"^/posts/([a-zA-Z0-9_-]+)$")?,
            method: Method::GET,
            handler: get_post,
        },
        Route {
            pattern: Regex::new(r"/posts$")?,
            method: Method::POST,
            handler: create_post,
        },
    ])
}

/// First route whose pattern matches the path AND whose method matches.
pub fn find_route<'a>(routes: &'a [Route], method: &Method, path: &str) -> Option<&'a Route> {
    routes
        .iter()
        .find(|route| route.method == *method && route.pattern.is_match(path))
}

/// Capture groups of a matched route, whole match first.
pub fn extract_captures(route: &Route, path: &str) -> Vec<Option<String>> {
    route.pattern.captures(path).map_or_else(Vec::new, |caps| {
        caps.iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect()
    })
}

fn list_posts(ctx: RequestContext) -> HandlerFuture {
    Box::pin(async move {
        let posts = ctx.store.list().await?;
        ApiResponse::json(StatusCode::OK, &posts)
    })
}

fn get_post(ctx: RequestContext) -> HandlerFuture {
    Box::pin(async move {
        let Some(post_id) = ctx.captures.get(1).cloned().flatten() else {
            return Ok(ApiResponse::text(StatusCode::NOT_FOUND, NOT_FOUND_BODY));
        };

        match ctx.store.find(&post_id).await? {
            Some(post) => ApiResponse::json(StatusCode::OK, &post),
            None => Ok(ApiResponse::text(StatusCode::NOT_FOUND, NOT_FOUND_BODY)),
        }
    })
}

fn create_post(ctx: RequestContext) -> HandlerFuture {
    Box::pin(async move {
        let Some(body) = ctx.body else {
            return Ok(ApiResponse::text(StatusCode::BAD_REQUEST, ILL_FORMED_BODY));
        };

        // Presence checks only, no deeper schema validation.
        let (Some(title), Some(content)) = (
            body.get("title").and_then(Value::as_str),
            body.get("content").and_then(Value::as_str),
        ) else {
            return Ok(ApiResponse::text(StatusCode::BAD_REQUEST, ILL_FORMED_BODY));
        };

        let post = ctx.store.create(title, content).await?;
        ApiResponse::json(StatusCode::OK, &post)
    })
}
