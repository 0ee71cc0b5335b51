//! Identity for the internal API. The gateway has already authenticated
//! the caller; it forwards `X-User-Id`/`X-User-Role` so the backend (which
//! may also be driven directly in development) doesn't need its own
//! session store. Mirrors `auth_dependencies.get_current_user`'s
//! "Backend mode" header path.

use std::sync::Arc;

use mongodb::bson::doc;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::models::Role;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub owned_bots: Vec<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, bot_id: &str) -> bool {
        self.is_admin() || self.owned_bots.iter().any(|b| b == bot_id)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(user_id) = req.headers().get_one("X-User-Id") else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let Some(state) = req.rocket().state::<Arc<AppState>>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let user = state.db.user_auth_credentials.find_one(doc! {"user_id": user_id}).await.ok().flatten();
        let Some(user) = user else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        Outcome::Success(Identity { user_id: user.user_id, role: user.role, owned_bots: user.owned_bots })
    }
}

pub struct RequireAdmin(pub Identity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireAdmin {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match Identity::from_request(req).await {
            Outcome::Success(identity) if identity.is_admin() => Outcome::Success(RequireAdmin(identity)),
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, ())),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}
