//! Backend entrypoint: owns every bot's live session, the delivery queue,
//! group tracking scheduler, and LLM quota accounting. Only reachable
//! through the gateway in a real deployment, but binds its own port so it
//! can be run standalone in development.

use chatimposter::backend::build_rocket;
use chatimposter::config::Config;
use chatimposter::db::Db;
use chatimposter::gateway::credentials::CredentialsService;
use chatimposter::models::{Role, UserProfile};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "backend", about = "Chatimposter backend service")]
struct Cli {
    /// Create an admin user from BOOTSTRAP_ADMIN_USER_ID / BOOTSTRAP_ADMIN_PASSWORD and exit,
    /// instead of serving. Only path to the first admin account in a fresh database.
    #[arg(long)]
    bootstrap_admin: bool,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db = Db::connect(&config.mongodb_url, &config.database_name).await?;

    if cli.bootstrap_admin {
        let user_id = std::env::var("BOOTSTRAP_ADMIN_USER_ID").map_err(|_| anyhow::anyhow!("BOOTSTRAP_ADMIN_USER_ID must be set"))?;
        let password = std::env::var("BOOTSTRAP_ADMIN_PASSWORD").map_err(|_| anyhow::anyhow!("BOOTSTRAP_ADMIN_PASSWORD must be set"))?;

        let credentials = CredentialsService::new(db.clone());
        credentials
            .create_credentials(&user_id, &password, Role::Admin, 5, 3, 5.0, UserProfile::default())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        println!("created admin user '{user_id}'");
        return Ok(());
    }

    let _ = build_rocket(db, config).await?.launch().await?;

    Ok(())
}
