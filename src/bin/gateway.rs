//! Gateway entrypoint: the only port exposed to the outside world.
//! Authenticates, rate-limits, and proxies everything through to the
//! backend's internal API.

use chatimposter::config::Config;
use chatimposter::db::Db;
use chatimposter::gateway::build_rocket;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let config = Config::from_env();
    let db = Db::connect(&config.mongodb_url, &config.database_name).await?;

    let _ = build_rocket(db, config).launch().await?;

    Ok(())
}
