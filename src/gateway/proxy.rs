//! Forwards `/api/external/*` to the backend's `/api/internal/*` surface,
//! after the permission check in `super::permission` has cleared the
//! request. Two list endpoints get a role-based `user_ids` filter injected
//! before forwarding; a generic catch-all handles everything else,
//! including the ownership-claim interceptor on successful `PUT`s.

use std::io::Cursor;
use std::sync::Arc;

use rocket::data::{Data, ToByteUnit};
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::Responder;
use rocket::{delete, get, patch, post, put, Response, State};

use super::guard::AuthenticatedSession;
use super::permission::check_permission;
use super::state::GatewayState;

/// Request body is capped at 80KB, matching the original deployment's
/// `RequestSizeLimitMiddleware` for POST/PUT/PATCH bodies.
const MAX_BODY_BYTES: u64 = 80 * 1024;

pub struct RawRequest {
    method: Method,
    query: Option<String>,
    headers: Vec<(String, String)>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RawRequest {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = req
            .headers()
            .iter()
            .filter(|h| !h.name().as_str().eq_ignore_ascii_case("host"))
            .map(|h| (h.name().to_string(), h.value().to_string()))
            .collect();
        Outcome::Success(RawRequest { method: req.method(), query: req.uri().query().map(|q| q.to_string()), headers })
    }
}

/// Wraps a raw backend response so Rocket can stream it back with the
/// original status code and body untouched.
pub struct ProxiedResponse {
    pub status: Status,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl<'r> Responder<'r, 'static> for ProxiedResponse {
    fn respond_to(self, _req: &'r Request<'_>) -> rocket::response::Result<'static> {
        let mut builder = Response::build();
        builder.status(self.status).sized_body(self.body.len(), Cursor::new(self.body));
        if let Some(ct) = self.content_type {
            if let Some(content_type) = rocket::http::ContentType::parse_flexible(&ct) {
                builder.header(content_type);
            }
        }
        Ok(builder.finalize())
    }
}

fn gateway_error(status: Status, detail: &str) -> ProxiedResponse {
    ProxiedResponse { status, body: format!("{{\"detail\": \"{detail}\"}}").into_bytes(), content_type: Some("application/json".to_string()) }
}

async fn forward(
    state: &GatewayState,
    method: Method,
    url: &str,
    query: Option<&str>,
    headers: &[(String, String)],
    body: Vec<u8>,
    identity: Option<(&str, crate::models::Role)>,
) -> ProxiedResponse {
    let full_url = match query {
        Some(q) if !q.is_empty() => format!("{url}?{q}"),
        _ => url.to_string(),
    };

    let reqwest_method = match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        _ => reqwest::Method::GET,
    };

    let mut request = state.http.request(reqwest_method, &full_url).body(body);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    // The backend trusts these instead of re-validating a session cookie;
    // see `backend::guard::Identity`.
    if let Some((user_id, role)) = identity {
        request = request.header("X-User-Id", user_id);
        request = request.header("X-User-Role", if role == crate::models::Role::Admin { "admin" } else { "user" });
    }

    match request.send().await {
        Ok(response) => {
            let status = Status::from_code(response.status().as_u16()).unwrap_or(Status::BadGateway);
            let content_type = response.headers().get("content-type").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
            let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            ProxiedResponse { status, body, content_type }
        }
        Err(e) if e.is_timeout() => gateway_error(Status::GatewayTimeout, "Backend request timeout"),
        Err(_) => gateway_error(Status::BadGateway, "Backend request failed"),
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (urlencoding::decode(k).unwrap_or_default().into_owned(), urlencoding::decode(v).unwrap_or_default().into_owned()),
            None => (urlencoding::decode(pair).unwrap_or_default().into_owned(), String::new()),
        })
        .collect()
}

/// Drops any caller-supplied `user_ids` and replaces it with the session's
/// owned bot list, so a regular user can never widen a list query beyond
/// what they own.
fn inject_user_ids(query: Option<String>, owned_bots: &[String]) -> String {
    let mut pairs: Vec<(String, String)> = query.as_deref().map(parse_query).unwrap_or_default();
    pairs.retain(|(k, _)| k != "user_ids");
    for bot_id in owned_bots {
        pairs.push(("user_ids".to_string(), bot_id.clone()));
    }
    pairs.iter().map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))).collect::<Vec<_>>().join("&")
}

#[get("/api/external/users")]
pub async fn list_users(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest) -> ProxiedResponse {
    if session.0.role == crate::models::Role::User && session.0.owned_bots.is_empty() {
        return ProxiedResponse { status: Status::Ok, body: b"[]".to_vec(), content_type: Some("application/json".to_string()) };
    }

    let query = if session.0.role == crate::models::Role::User { Some(inject_user_ids(raw.query.clone(), &session.0.owned_bots)) } else { raw.query.clone() };

    let url = format!("{}/api/internal/users", state.config.backend_url);
    forward(state, Method::Get, &url, query.as_deref(), &raw.headers, Vec::new(), Some((&session.0.user_id, session.0.role))).await
}

#[get("/api/external/users/status")]
pub async fn list_users_status(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest) -> ProxiedResponse {
    if session.0.role == crate::models::Role::User && session.0.owned_bots.is_empty() {
        let body = serde_json::json!({"configurations": [], "count": 0}).to_string();
        return ProxiedResponse { status: Status::Ok, body: body.into_bytes(), content_type: Some("application/json".to_string()) };
    }

    let query = if session.0.role == crate::models::Role::User { Some(inject_user_ids(raw.query.clone(), &session.0.owned_bots)) } else { raw.query.clone() };

    let url = format!("{}/api/internal/users/status", state.config.backend_url);
    forward(state, Method::Get, &url, query.as_deref(), &raw.headers, Vec::new(), Some((&session.0.user_id, session.0.role))).await
}

async fn read_body(data: Data<'_>, method: Method) -> Result<Vec<u8>, ProxiedResponse> {
    if !matches!(method, Method::Post | Method::Put | Method::Patch) {
        return Ok(Vec::new());
    }
    match data.open(MAX_BODY_BYTES.bytes()).into_bytes().await {
        Ok(capped) if capped.is_complete() => Ok(capped.into_inner()),
        Ok(_) => Err(gateway_error(Status::PayloadTooLarge, "Request body too large")),
        Err(_) => Err(gateway_error(Status::InternalServerError, "Failed to read request body")),
    }
}

/// Generic proxy for everything not covered by the two list-endpoint
/// special cases above. `request_path` is the portion after
/// `/api/external/`.
async fn proxy_to_backend(state: &GatewayState, session: &AuthenticatedSession, raw: &RawRequest, request_path: &str, data: Data<'_>) -> ProxiedResponse {
    let full_path = format!("/api/external/{request_path}");

    let check = check_permission(&session.0.user_id, session.0.role, &full_path, &session.0.owned_bots, raw.method.as_str());
    if !check.allowed {
        state
            .audit
            .permission_denied(
                &session.0.user_id,
                if session.0.role == crate::models::Role::Admin { "admin" } else { "user" },
                &full_path,
                check.extracted_user_id.as_deref(),
                raw.method.as_str(),
                None,
            )
            .await;
        return gateway_error(Status::Forbidden, "Permission denied");
    }

    let body = match read_body(data, raw.method).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    let backend_url = format!("{}/api/internal/{request_path}", state.config.backend_url);
    let response = forward(state, raw.method, &backend_url, raw.query.as_deref(), &raw.headers, body, Some((&session.0.user_id, session.0.role))).await;

    if raw.method == Method::Put && response.status == Status::Ok {
        let parts: Vec<&str> = request_path.trim_matches('/').split('/').collect();
        let target_user_id = match parts.as_slice() {
            ["users", id] => Some(*id),
            ["ui", "users", id] => Some(*id),
            ["bots", id] => Some(*id),
            _ => None,
        };

        if let Some(target_user_id) = target_user_id {
            if !session.0.owned_bots.iter().any(|b| b == target_user_id) {
                state.credentials.add_owned_configuration(&session.0.user_id, target_user_id).await;
                state.sessions.add_owned_bot(&session.0.session_id, target_user_id).await;
            }
        }
    }

    response
}

#[get("/api/external/<path..>", rank = 10)]
pub async fn proxy_get(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest, path: std::path::PathBuf, data: Data<'_>) -> ProxiedResponse {
    proxy_to_backend(state, &session, &raw, &path.to_string_lossy(), data).await
}

#[post("/api/external/<path..>", rank = 10)]
pub async fn proxy_post(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest, path: std::path::PathBuf, data: Data<'_>) -> ProxiedResponse {
    proxy_to_backend(state, &session, &raw, &path.to_string_lossy(), data).await
}

#[put("/api/external/<path..>", rank = 10)]
pub async fn proxy_put(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest, path: std::path::PathBuf, data: Data<'_>) -> ProxiedResponse {
    proxy_to_backend(state, &session, &raw, &path.to_string_lossy(), data).await
}

#[delete("/api/external/<path..>", rank = 10)]
pub async fn proxy_delete(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest, path: std::path::PathBuf, data: Data<'_>) -> ProxiedResponse {
    proxy_to_backend(state, &session, &raw, &path.to_string_lossy(), data).await
}

#[patch("/api/external/<path..>", rank = 10)]
pub async fn proxy_patch(state: &State<Arc<GatewayState>>, session: AuthenticatedSession, raw: RawRequest, path: std::path::PathBuf, data: Data<'_>) -> ProxiedResponse {
    proxy_to_backend(state, &session, &raw, &path.to_string_lossy(), data).await
}
