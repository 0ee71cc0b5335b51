//! Authenticating reverse proxy in front of the backend's internal API:
//! login/session/lockout/audit plumbing plus the ownership-aware request
//! forwarder in `proxy`.

pub mod audit;
pub mod credentials;
pub mod guard;
pub mod lockout;
pub mod permission;
pub mod proxy;
pub mod rate_limiter;
pub mod routes_auth;
pub mod session;
pub mod state;

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{catch, Build, Rocket};
use rocket_cors::CorsOptions;

use crate::config::Config;
use crate::db::Db;

use state::GatewayState;

#[catch(429)]
fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"detail": "Too many requests"}))
}

#[catch(401)]
fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"detail": "Authentication required"}))
}

#[catch(404)]
fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"detail": "Not found"}))
}

pub fn build_rocket(db: Db, config: Config) -> Rocket<Build> {
    let state = Arc::new(GatewayState::new(db, config));
    state.spawn_background_tasks();

    let figment = rocket::Config::figment().merge(("limits.json", 1024 * 1024));

    let cors = CorsOptions::default().to_cors().expect("failed to build CORS fairing");

    rocket::custom(figment)
        .manage(state)
        .attach(cors)
        .register("/", rocket::catchers![too_many_requests, unauthorized, not_found])
        .mount(
            "/",
            rocket::routes![
                routes_auth::login,
                routes_auth::logout,
                routes_auth::validate_session,
                proxy::list_users,
                proxy::list_users_status,
                proxy::proxy_get,
                proxy::proxy_post,
                proxy::proxy_put,
                proxy::proxy_delete,
                proxy::proxy_patch,
            ],
        )
}
