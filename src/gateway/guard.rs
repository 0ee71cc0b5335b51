//! Rocket request guards: client IP extraction (trusting a reverse proxy's
//! `X-Forwarded-For` ahead of the socket address) and the authenticated
//! session lookup that every protected route depends on.

use std::sync::Arc;

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;

use super::session::SessionContext;
use super::state::GatewayState;

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Resolves the `session_id` cookie against the session store. Forwards
/// (rather than erroring) when absent or invalid, so route handlers that
/// want a custom 401 body can still run; routes that just need "logged in
/// or bust" can depend on this guard directly and get a bare 401.
pub struct AuthenticatedSession(pub SessionContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedSession {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = req.guard::<&State<Arc<GatewayState>>>().await.succeeded() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let Some(session_id) = req.cookies().get("session_id").map(|c| c.value().to_string()) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        match state.sessions.get_session(&session_id).await {
            Some(session) => Outcome::Success(AuthenticatedSession(session.into())),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}
