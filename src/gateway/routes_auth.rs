use std::sync::Arc;

use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{get, post, Request, State};
use serde::{Deserialize, Serialize};

use crate::models::StaleSessionReason;

use super::guard::{AuthenticatedSession, ClientIp};
use super::state::GatewayState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<crate::models::Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

fn rate_limited(retry_after_secs: u64) -> (Status, Json<serde_json::Value>) {
    (
        Status::TooManyRequests,
        Json(serde_json::json!({
            "detail": "Too many login attempts. Please try again later.",
            "retry_after": retry_after_secs,
        })),
    )
}

fn locked(locked_until: chrono::DateTime<chrono::Utc>) -> (Status, Json<serde_json::Value>) {
    let retry_after = (locked_until - chrono::Utc::now()).num_seconds().max(0);
    (
        Status::Locked,
        Json(serde_json::json!({
            "detail": "Account is temporarily locked due to multiple failed login attempts.",
            "locked_until": locked_until.to_rfc3339(),
            "retry_after": retry_after,
        })),
    )
}

#[post("/api/external/auth/login", format = "json", data = "<body>")]
pub async fn login(
    state: &State<Arc<GatewayState>>,
    cookies: &CookieJar<'_>,
    ip: ClientIp,
    req: &Request<'_>,
    body: Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (Status, Json<serde_json::Value>)> {
    let ip_addr = Some(ip.0);

    if let Err(retry_after) = state.rate_limiter.check(ip_addr.as_deref().unwrap_or("unknown")) {
        return Err(rate_limited(retry_after));
    }

    let (is_locked, locked_until) = state.lockouts.check_lockout(&body.user_id).await;
    if is_locked {
        return Err(locked(locked_until.expect("is_locked implies locked_until")));
    }

    state.rate_limiter.record(ip_addr.as_deref().unwrap_or("unknown"));

    let Some(user) = state.credentials.authenticate(&body.user_id, &body.password).await else {
        let (just_locked, locked_until) = state.lockouts.record_failed_attempt(&body.user_id).await;
        state.audit.login_failed(&body.user_id, "invalid_credentials", ip_addr.clone()).await;

        if just_locked {
            let locked_until = locked_until.expect("just_locked implies locked_until");
            state
                .audit
                .account_locked(&body.user_id, crate::models::AccountLockout::MAX_FAILURES, locked_until, ip_addr)
                .await;
            return Err(locked(locked_until));
        }

        return Ok(Json(LoginResponse {
            success: false,
            message: "Invalid credentials".to_string(),
            user_id: None,
            role: None,
            session_id: None,
            first_name: None,
            language_code: None,
        }));
    };

    state.lockouts.clear_lockout(&body.user_id).await;
    state.rate_limiter.reset(ip_addr.as_deref().unwrap_or("unknown"));

    let user_agent = req.headers().get_one("User-Agent").map(|s| s.to_string());
    let session = state.sessions.create_session(&user.user_id, user.role, user.owned_bots.clone(), ip_addr.clone(), user_agent).await;

    state.audit.login_success(&user.user_id, if user.role == crate::models::Role::Admin { "admin" } else { "user" }, &session.session_id, ip_addr).await;

    let mut cookie = Cookie::new("session_id", session.session_id.clone());
    cookie.set_http_only(true);
    cookie.set_same_site(rocket::http::SameSite::Lax);
    cookie.set_max_age(rocket::time::Duration::hours(24));
    cookie.set_path("/");
    cookies.add(cookie);

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        user_id: Some(session.user_id),
        role: Some(session.role),
        session_id: Some(session.session_id),
        first_name: user.profile.name,
        language_code: Some(user.profile.language.unwrap_or_else(|| "en".to_string())),
    }))
}

#[post("/api/external/auth/logout")]
pub async fn logout(state: &State<Arc<GatewayState>>, cookies: &CookieJar<'_>, ip: ClientIp) -> Json<serde_json::Value> {
    if let Some(session_id) = cookies.get("session_id").map(|c| c.value().to_string()) {
        if let Some(session) = state.sessions.get_session(&session_id).await {
            state.audit.logout(&session.user_id, &session_id, Some(ip.0)).await;
            state.sessions.invalidate_session(&session_id, StaleSessionReason::LoggedOut).await;
        }
    }
    cookies.remove(Cookie::new("session_id", ""));
    Json(serde_json::json!({"success": true, "message": "Logout successful"}))
}

#[get("/api/external/auth/validate")]
pub async fn validate_session(_session: AuthenticatedSession) -> Json<serde_json::Value> {
    Json(serde_json::json!({"valid": true}))
}
