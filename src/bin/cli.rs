//! Usercast CLI
//!
//! Register users, list them, and follow registration status live.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::value::RawValue;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usercast::config::{cable_url_for, DEFAULT_API_BASE_URL};
use usercast::directory::DirectoryClient;
use usercast::form::{RegistrationForm, UploadedFile};
use usercast::realtime::{Channel, RelayConnection, UserEvent};
use usercast::status::{LiveStatus, TableQuery};
use usercast::{Reconciler, SortOrder};

#[derive(Parser)]
#[command(name = "usercast")]
#[command(about = "Live user-registration status CLI")]
#[command(version)]
struct Cli {
    /// Base URL of the user directory API
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Relay endpoint (derived from the API base URL when omitted)
    #[arg(long, env = "CABLE_URL")]
    cable_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        date_of_birth: String,
        /// File to upload with the registration
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the current user list
    Users {
        #[command(flatten)]
        view: ViewArgs,
        /// Page to show (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
    /// Follow registration status as events arrive
    Watch {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Publish a raw payload on a relay channel
    Publish {
        /// Channel (user_update, new_user)
        channel: String,
        /// JSON payload, relayed as-is
        payload: String,
    },
    /// Announce that a user has been synced downstream
    MarkSynced {
        /// User ID
        id: i64,
        /// Sync timestamp (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(clap::Args)]
struct ViewArgs {
    /// Only show users whose email contains this text
    #[arg(short, long)]
    filter: Option<String>,
    /// Sort by email (asc, desc)
    #[arg(short, long)]
    sort: Option<SortOrder>,
}

impl ViewArgs {
    fn query(self) -> TableQuery {
        let mut query = TableQuery {
            sort: self.sort,
            ..Default::default()
        };
        if let Some(filter) = self.filter {
            query.set_filter(filter);
        }
        query
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usercast=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let cable_url = match &cli.cable_url {
        Some(url) => url.clone(),
        None => cable_url_for(&cli.api_base_url)?,
    };

    match cli.command {
        Commands::Register {
            first_name,
            last_name,
            email,
            date_of_birth,
            file,
        } => {
            let file = UploadedFile::from_path(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let form = RegistrationForm {
                first_name,
                last_name,
                email,
                date_of_birth,
                file: Some(file),
            };

            let directory = DirectoryClient::new(&cli.api_base_url)?;
            let user = directory.create_user(form).await?;
            println!("Registered user #{}", user.id);
            println!("{}", serde_json::to_string_pretty(&user)?);
        }

        Commands::Users { view, page } => {
            let directory = DirectoryClient::new(&cli.api_base_url)?;
            let users = directory.list_users().await?;

            let mut query = view.query();
            query.page = page.saturating_sub(1);
            print!("{}", query.page_of(&users).render());
        }

        Commands::Watch { view } => {
            let directory = DirectoryClient::new(&cli.api_base_url)?;
            let connection = RelayConnection::connect(&cable_url)
                .await
                .with_context(|| format!("connecting to {}", cable_url))?;

            let reconciler = Reconciler::new();
            let changed = Arc::new(Notify::new());
            let notifier = changed.clone();
            let _subscription = reconciler.subscribe(move |_| notifier.notify_one());

            let mut live = LiveStatus::start(&directory, connection, reconciler).await;
            let query = view.query();

            let mut liveness = tokio::time::interval(Duration::from_secs(1));
            print!("{}", query.page_of(&live.reconciler().users()).render());
            loop {
                tokio::select! {
                    _ = changed.notified() => {
                        println!();
                        print!("{}", query.page_of(&live.reconciler().users()).render());
                    }
                    _ = liveness.tick() => {
                        if !live.is_live() {
                            eprintln!("Relay connection closed");
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            live.teardown();
        }

        Commands::Publish { channel, payload } => {
            let channel: Channel = channel.parse().map_err(anyhow::Error::msg)?;
            let payload = RawValue::from_string(payload).context("payload is not valid JSON")?;

            let mut connection = RelayConnection::connect(&cable_url).await?;
            connection.publish(channel, payload).await?;
            connection.close().await?;
            println!("Published on {}", channel);
        }

        Commands::MarkSynced { id, at } => {
            if id <= 0 {
                bail!("user id must be positive");
            }
            let at = at.unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

            let mut connection = RelayConnection::connect(&cable_url).await?;
            connection
                .publish_event(&UserEvent::sync_status(id, at.clone()))
                .await?;
            connection.close().await?;
            println!("Marked user #{} synced at {}", id, at);
        }
    }

    Ok(())
}
