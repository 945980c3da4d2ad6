//! Huddle server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use huddle::prelude::*;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "huddle", version, about = "Ephemeral multi-participant rooms")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "HUDDLE_PORT")]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0", env = "HUDDLE_HOST")]
    host: String,

    /// File of KEY=value lines to load into the environment first
    #[arg(long, default_value = "package.env", env = "HUDDLE_ENV_FILE")]
    env_file: PathBuf,

    /// Version string reported to clients
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"), env = "IMAGE_VERSION")]
    image_version: String,

    /// Maximum number of live rooms
    #[arg(long, default_value_t = 500, env = "HUDDLE_MAX_ROOMS")]
    max_rooms: usize,

    /// Maximum participants per room
    #[arg(long, default_value_t = 20, env = "HUDDLE_MAX_USERS")]
    max_users: usize,

    /// Creation/completion info must be shorter than this many bytes
    #[arg(long, default_value_t = 1024, env = "HUDDLE_MAX_INFO_LEN")]
    max_info_len: usize,

    /// Room code length
    #[arg(long, default_value_t = 4, env = "HUDDLE_CODE_LEN")]
    code_len: usize,

    /// Events buffered per participant
    #[arg(long, default_value_t = 16, env = "HUDDLE_MAILBOX_CAPACITY")]
    mailbox_capacity: usize,

    /// Room lifetime in seconds
    #[arg(long, default_value_t = 300, env = "HUDDLE_ROOM_TTL_SECS")]
    room_ttl_secs: u64,

    /// Seconds a completed room lingers before deletion
    #[arg(long, default_value_t = 10, env = "HUDDLE_COMPLETION_GRACE_SECS")]
    completion_grace_secs: u64,
}

impl Args {
    fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_rooms: self.max_rooms,
            max_users: self.max_users,
            max_info_len: self.max_info_len,
            code_len: self.code_len,
            mailbox_capacity: self.mailbox_capacity,
            room_ttl: Duration::from_secs(self.room_ttl_secs),
            completion_grace: Duration::from_secs(self.completion_grace_secs),
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), HuddleError> {
    // The env file can set any of the variables below, so parse again once
    // it is loaded.
    let env_file = Args::parse().env_file;
    let env_loaded = dotenv::from_path(&env_file);
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=info".into()),
        )
        .init();

    match env_loaded {
        Ok(()) => tracing::info!(path = %env_file.display(), "loaded env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(path = %env_file.display(), error = %e, "ignoring env file"),
    }

    let addr = format!("{}:{}", args.host, args.port);
    let server = HuddleServer::builder()
        .bind(&addr)
        .registry_config(args.registry_config())
        .version(args.image_version.as_str())
        .build()
        .await?;

    tracing::info!(%addr, version = %args.image_version, "Huddle listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
