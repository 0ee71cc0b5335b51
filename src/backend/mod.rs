//! The internal API the gateway proxies to: bot configuration and
//! lifecycle, account management, and the feature-level admin surfaces
//! (delivery queue, automatic-reply queue, group tracking history). Every
//! route trusts `X-User-Id`/`X-User-Role` from `guard::Identity`, set only
//! by a gateway that has already authenticated the caller — this service
//! is never meant to face the public internet directly.

pub mod automatic_bot_reply;
pub mod bots;
pub mod delivery_queue;
pub mod group_tracking;
pub mod guard;
pub mod resources;
pub mod users;

use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket::serde::json::Json;
use rocket::{catch, Build, Rocket};
use rocket_cors::CorsOptions;

use crate::config::Config;
use crate::db::Db;
use crate::state::AppState;

#[catch(401)]
fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"detail": "Authentication required"}))
}

#[catch(403)]
fn forbidden() -> Json<serde_json::Value> {
    Json(serde_json::json!({"detail": "Permission denied"}))
}

#[catch(404)]
fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"detail": "Not found"}))
}

pub async fn build_rocket(db: Db, config: Config) -> anyhow::Result<Rocket<Build>> {
    let state = AppState::build(db, config).await?;
    state.spawn_background_tasks();

    let figment = rocket::Config::figment().merge(("limits.json", 1024 * 1024));
    let cors = CorsOptions::default().to_cors().expect("failed to build CORS fairing");

    Ok(rocket::custom(figment)
        .manage(state)
        .attach(cors)
        .attach(AdHoc::on_shutdown("App Shutdown", |rocket| {
            Box::pin(async move {
                if let Some(state) = rocket.state::<Arc<AppState>>() {
                    state.shutdown().await;
                }
            })
        }))
        .register("/", rocket::catchers![unauthorized, forbidden, not_found])
        .mount(
            "/",
            rocket::routes![
                bots::list_bots,
                bots::list_bots_status,
                bots::get_configuration_schema,
                bots::get_bot_defaults,
                bots::get_bot_info,
                bots::get_bot_status,
                bots::get_bot_configuration,
                bots::save_bot_configuration,
                bots::patch_bot_configuration,
                bots::delete_bot,
                bots::link_bot,
                bots::unlink_bot,
                bots::reload_bot,
                users::list_users,
                users::list_users_status,
                users::get_user,
                users::create_user,
                users::update_user_full,
                users::update_user_partial,
                users::delete_user,
                users::reset_password,
                users::validate_user_id,
                users::validate_email,
                automatic_bot_reply::get_bot_queue,
                automatic_bot_reply::clear_all_bot_queues,
                automatic_bot_reply::clear_correspondent_queue,
                group_tracking::get_all_tracked_messages,
                group_tracking::get_group_tracked_messages,
                group_tracking::delete_all_tracked_messages,
                group_tracking::delete_group_tracked_messages,
                delivery_queue::get_delivery_queue,
                delivery_queue::delete_delivery_item,
                resources::list_timezones,
                resources::list_languages,
            ],
        ))
}
