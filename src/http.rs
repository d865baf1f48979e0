//! HTTP API for agora
//!
//! Identity comes from the trusted `X-Account-Id` header set by the gateway
//! in front of this service; requests without it are anonymous.
//!
//! ## Profiles
//! - `POST /accounts` - register an account
//! - `GET|PATCH /me/profile` - own profile
//! - `GET /profiles`, `GET /profiles/{id}` - directory and detail
//! - `POST /profiles/{id}/follow`, `POST /profiles/{id}/unfollow`
//! - `GET /profiles/my/pending-requests`
//! - `POST /profiles/requests/{follower_id}/accept|reject`
//!
//! ## Posts
//! - `GET|POST /posts` - feed / create
//! - `GET /posts/my`, `/posts/liked`, `/posts/recommended`
//! - `POST /posts/by-tag` - `{"tags": "rust, go", "mode": "all"}`
//! - `GET|PUT|PATCH|DELETE /posts/{id}`
//! - `GET|PUT|DELETE /posts/{id}/like`
//! - `GET /posts/{id}/thread`
//!
//! ## Comments
//! - `GET|POST /comments`
//! - `GET|PATCH|DELETE /comments/{id}`
//! - `GET /comments/{id}/children`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -d '{"email": "ada@example.com"}' http://localhost:8088/accounts
//!
//! curl -X POST -H "X-Account-Id: $ACCOUNT" \
//!      -d '{"title": "Hi", "content": "first #post", "status": "scheduled",
//!           "scheduledAt": "2030-01-01T09:00:00Z"}' \
//!      http://localhost:8088/posts
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::models::PostStatus;
use crate::db::{PageParams, Pagination, RequestContext};
use crate::error::StorageError;
use crate::services::comment_service::{CommentInput, CommentQuery};
use crate::services::post_service::{PostInput, PostQuery};
use crate::services::response::{
    created, error_response, json_response, method_not_allowed, no_content, not_found, ok,
    HandlerResult,
};
use crate::services::{FollowOutcome, Services};
use crate::tags::{parse_tag_filter, TagMode};
use crate::views::{
    AccountView, CommentView, FollowRequestView, FollowResultView, LikeStatusView, Page,
    PostListItem, PostView, ProfileFullView, ProfileListItem, ProfileView, RequestDecisionView,
    ThreadNodeView,
};

/// Header carrying the caller's account id
pub const ACCOUNT_HEADER: &str = "x-account-id";

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterBody {
    email: String,
}

#[derive(Debug, Deserialize)]
struct TagFilterBody {
    /// Comma- or space-separated tag names
    tags: String,
    #[serde(default)]
    mode: TagMode,
}

#[derive(Debug, Deserialize)]
struct CommentPatch {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct MyPostsQuery {
    status: Option<PostStatus>,
}

/// Everything routing needs, detached from the connection
struct ApiRequest {
    method: Method,
    path: String,
    query: String,
    account_id: Option<String>,
    body: Bytes,
}

impl ApiRequest {
    fn query<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_urlencoded::from_str(&self.query).map_err(|e| StorageError::Parse(e.to_string()))
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        if self.body.is_empty() {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

// ============================================================================
// Server
// ============================================================================

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    default_page_size: i64,
    max_page_size: i64,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr, config: &Config) -> Self {
        Self {
            services,
            bind_addr,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Read the request, then route it on the blocking pool
    async fn handle_request(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or_default().to_string();
        let account_id = req
            .headers()
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        debug!(method = %method, path = %path, "Incoming request");

        let body = match req.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return Ok(error_response(StorageError::Internal(format!(
                    "Failed to read body: {}",
                    e
                ))))
            }
        };

        let api = ApiRequest {
            method,
            path,
            query,
            account_id,
            body,
        };

        let server = self.clone();
        let response = match tokio::task::spawn_blocking(move || server.route(&api)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => error_response(e),
            Err(e) => error_response(StorageError::Internal(format!("handler panicked: {}", e))),
        };
        Ok(response)
    }

    fn page(&self, req: &ApiRequest) -> Result<Pagination, StorageError> {
        let params: PageParams = req.query()?;
        Pagination::from_params(params, self.default_page_size, self.max_page_size)
    }

    /// Route requests to handlers
    fn route(&self, req: &ApiRequest) -> HandlerResult {
        let segments: Vec<&str> = req.path.split('/').filter(|s| !s.is_empty()).collect();

        match (req.method.clone(), segments.as_slice()) {
            (Method::GET, ["health"]) => Ok(ok(&serde_json::json!({ "status": "ok" }))),
            (Method::POST, ["accounts"]) => {
                let body: RegisterBody = req.json()?;
                let account = self.services.profiles.register(&body.email)?;
                Ok(created(&AccountView::from(account)))
            }
            _ => {
                let ctx = self.services.profiles.context_for(req.account_id.as_deref())?;
                self.route_with_context(req, &ctx, &segments)
            }
        }
    }

    fn route_with_context(&self, req: &ApiRequest, ctx: &RequestContext, segments: &[&str]) -> HandlerResult {
        let s = &self.services;

        match (req.method.clone(), segments) {
            // Own profile
            (Method::GET, ["me", "profile"]) => Ok(ok(&ProfileFullView::own(s.profiles.me(ctx)?))),
            (Method::PATCH, ["me", "profile"]) => {
                let updated = s.profiles.update_me(ctx, req.json()?)?;
                Ok(ok(&ProfileFullView::own(updated)))
            }

            // Profiles & follow graph
            (Method::GET, ["profiles"]) => {
                let listed = s.profiles.list_profiles(ctx, self.page(req)?)?;
                Ok(ok(&Page::<ProfileListItem>::from(listed)))
            }
            (Method::GET, ["profiles", "my", "pending-requests"]) => {
                let requests: Vec<FollowRequestView> = s
                    .follows
                    .pending_requests(ctx)?
                    .into_iter()
                    .map(FollowRequestView::from)
                    .collect();
                Ok(ok(&requests))
            }
            (Method::POST, ["profiles", "requests", follower_id, "accept"]) => {
                let follow = s.follows.accept(ctx, follower_id)?;
                Ok(ok(&RequestDecisionView::from(follow)))
            }
            (Method::POST, ["profiles", "requests", follower_id, "reject"]) => {
                let follow = s.follows.reject(ctx, follower_id)?;
                Ok(ok(&RequestDecisionView::from(follow)))
            }
            (Method::GET, ["profiles", id]) => Ok(ok(&ProfileView::from(s.profiles.get_profile(ctx, id)?))),
            (Method::POST, ["profiles", id, "follow"]) => {
                let outcome = s.follows.follow(ctx, id)?;
                let status = match outcome {
                    FollowOutcome::Created(_) => StatusCode::CREATED,
                    FollowOutcome::Existing(_) => StatusCode::OK,
                    FollowOutcome::Pending(_) => StatusCode::ACCEPTED,
                };
                Ok(json_response(status, &FollowResultView::from(&outcome)))
            }
            (Method::POST, ["profiles", id, "unfollow"]) => {
                let outcome = s.follows.unfollow(ctx, id)?;
                Ok(ok(&FollowResultView::from(outcome)))
            }

            // Post listings
            (Method::GET, ["posts"]) => {
                let query: PostQuery = req.query()?;
                let listed = s.posts.feed(ctx, &query, self.page(req)?)?;
                Ok(ok(&Page::<PostListItem>::from(listed)))
            }
            (Method::GET, ["posts", "my"]) => {
                let query: MyPostsQuery = req.query()?;
                let listed = s.posts.my_posts(ctx, query.status, self.page(req)?)?;
                Ok(ok(&Page::<PostListItem>::from(listed)))
            }
            (Method::GET, ["posts", "liked"]) => {
                let listed = s.posts.liked(ctx, self.page(req)?)?;
                Ok(ok(&Page::<PostListItem>::from(listed)))
            }
            (Method::GET, ["posts", "recommended"]) => {
                let listed = s.posts.recommended(ctx, self.page(req)?)?;
                Ok(ok(&Page::<PostListItem>::from(listed)))
            }
            (Method::POST, ["posts", "by-tag"]) => {
                let body: TagFilterBody = req.json()?;
                let listed = s.posts.by_tag(ctx, parse_tag_filter(&body.tags), body.mode, self.page(req)?)?;
                Ok(ok(&Page::<PostListItem>::from(listed)))
            }

            // Single post
            (Method::POST, ["posts"]) => {
                let input: PostInput = req.json()?;
                Ok(created(&PostView::from(s.posts.create(ctx, input)?)))
            }
            (Method::GET, ["posts", id]) => Ok(ok(&PostView::from(s.posts.get(ctx, id)?))),
            (Method::PUT, ["posts", id]) => {
                let input: PostInput = req.json()?;
                Ok(ok(&PostView::from(s.posts.update(ctx, id, input, false)?)))
            }
            (Method::PATCH, ["posts", id]) => {
                let input: PostInput = req.json()?;
                Ok(ok(&PostView::from(s.posts.update(ctx, id, input, true)?)))
            }
            (Method::DELETE, ["posts", id]) => {
                s.posts.delete(ctx, id)?;
                Ok(no_content())
            }

            // Likes
            (Method::GET, ["posts", id, "like"]) => Ok(ok(&LikeStatusView::from(s.likes.status(ctx, id)?))),
            (Method::PUT, ["posts", id, "like"]) => Ok(ok(&LikeStatusView::from(s.likes.like(ctx, id)?))),
            (Method::DELETE, ["posts", id, "like"]) => {
                Ok(ok(&LikeStatusView::from(s.likes.unlike(ctx, id)?)))
            }

            // Comments
            (Method::GET, ["posts", id, "thread"]) => {
                let thread: Vec<ThreadNodeView> =
                    s.comments.thread(ctx, id)?.into_iter().map(ThreadNodeView::from).collect();
                Ok(ok(&thread))
            }
            (Method::GET, ["comments"]) => {
                let query: CommentQuery = req.query()?;
                let listed = s.comments.list(ctx, &query, self.page(req)?)?;
                Ok(ok(&Page::<CommentView>::from(listed)))
            }
            (Method::POST, ["comments"]) => {
                let input: CommentInput = req.json()?;
                Ok(created(&CommentView::from(s.comments.create(ctx, input)?)))
            }
            (Method::GET, ["comments", id]) => Ok(ok(&CommentView::from(s.comments.get(ctx, id)?))),
            (Method::PATCH, ["comments", id]) => {
                let patch: CommentPatch = req.json()?;
                Ok(ok(&CommentView::from(s.comments.update(ctx, id, &patch.content)?)))
            }
            (Method::DELETE, ["comments", id]) => {
                s.comments.delete(ctx, id)?;
                Ok(no_content())
            }
            (Method::GET, ["comments", id, "children"]) => {
                let replies: Vec<CommentView> =
                    s.comments.children(ctx, id)?.into_iter().map(CommentView::from).collect();
                Ok(ok(&replies))
            }

            (_, segments) if is_known_route(segments) => Ok(method_not_allowed()),
            _ => Ok(not_found("Not found")),
        }
    }
}

/// Paths that exist under some method
fn is_known_route(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["health"]
            | ["accounts"]
            | ["me", "profile"]
            | ["profiles"]
            | ["profiles", _]
            | ["profiles", _, "follow" | "unfollow" | "pending-requests"]
            | ["profiles", "requests", _, "accept" | "reject"]
            | ["posts"]
            | ["posts", _]
            | ["posts", _, "like" | "thread"]
            | ["comments"]
            | ["comments", _]
            | ["comments", _, "children"]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::scheduler::ManualScheduler;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> HttpServer {
        let db = Arc::new(Db::open_at(&dir.path().join("http.db"), 4, Duration::from_millis(500)).unwrap());
        let config = Config::default();
        let services = Arc::new(Services::new(db, Arc::new(ManualScheduler::new()), &config));
        HttpServer::new(services, "127.0.0.1:0".parse().unwrap(), &config)
    }

    fn request(method: Method, path: &str, account: Option<&str>, body: &str) -> ApiRequest {
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        ApiRequest {
            method,
            path: path.to_string(),
            query: query.to_string(),
            account_id: account.map(str::to_string),
            body: Bytes::from(body.to_string()),
        }
    }

    fn send(server: &HttpServer, req: ApiRequest) -> Response<Full<Bytes>> {
        server.route(&req).unwrap_or_else(error_response)
    }

    async fn json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn register(server: &HttpServer, email: &str) -> String {
        let resp = send(server, request(Method::POST, "/accounts", None, &format!(r#"{{"email": "{}"}}"#, email)));
        assert_eq!(resp.status(), StatusCode::CREATED);
        json(resp).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_and_unknown_routes() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);

        assert_eq!(send(&server, request(Method::GET, "/health", None, "")).status(), StatusCode::OK);
        assert_eq!(send(&server, request(Method::GET, "/nope", None, "")).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            send(&server, request(Method::DELETE, "/profiles", None, "")).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_unknown_account_is_unauthorized() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let resp = send(&server, request(Method::GET, "/me/profile", Some("ghost"), ""));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_anonymous_cannot_list_posts() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let resp = send(&server, request(Method::GET, "/posts", None, ""));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_post_and_read_it_back() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let account = register(&server, "ada@example.com").await;

        let resp = send(
            &server,
            request(
                Method::POST,
                "/posts",
                Some(&account),
                r#"{"title": "Hello", "content": "first #Rust post", "status": "published"}"#,
            ),
        );
        assert_eq!(resp.status(), StatusCode::CREATED);
        let post = json(resp).await;
        assert_eq!(post["status"], "published");
        assert_eq!(post["tags"][0], "rust");

        let id = post["id"].as_str().unwrap();
        let resp = send(&server, request(Method::GET, &format!("/posts/{}", id), Some(&account), ""));
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&server, request(Method::GET, "/posts/my?status=published", Some(&account), ""));
        let page = json(resp).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["title"], "Hello");
    }

    #[tokio::test]
    async fn test_post_validation_errors_are_field_mapped() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let account = register(&server, "ada@example.com").await;

        let resp = send(&server, request(Method::POST, "/posts", Some(&account), r#"{"content": "x"}"#));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["errors"]["title"][0], "This field is required.");
    }

    #[tokio::test]
    async fn test_follow_status_codes() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let ada = register(&server, "ada@example.com").await;
        let bob = register(&server, "bob@example.com").await;

        let bob_profile = json(send(&server, request(Method::GET, "/me/profile", Some(&bob), ""))).await;
        let bob_id = bob_profile["id"].as_str().unwrap().to_string();

        let path = format!("/profiles/{}/follow", bob_id);
        assert_eq!(send(&server, request(Method::POST, &path, Some(&ada), "")).status(), StatusCode::CREATED);
        assert_eq!(send(&server, request(Method::POST, &path, Some(&ada), "")).status(), StatusCode::OK);

        let resp = send(
            &server,
            request(Method::PATCH, "/me/profile", Some(&bob), r#"{"isPrivate": true}"#),
        );
        assert_eq!(resp.status(), StatusCode::OK);

        let unfollow = format!("/profiles/{}/unfollow", bob_id);
        let resp = send(&server, request(Method::POST, &unfollow, Some(&ada), ""));
        assert_eq!(json(resp).await["detail"], "Unfollow.");

        let resp = send(&server, request(Method::POST, &path, Some(&ada), ""));
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(json(resp).await["status"], "pending");
    }
}
