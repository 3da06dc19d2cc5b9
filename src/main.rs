use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use moderator_console_client::auth::{AuthController, Credentials};
use moderator_console_client::client::{ApiClient, SessionEvent};
use moderator_console_client::config::{AppConfig, CliConfig, FileConfig};
use moderator_console_client::events::EventsApi;
use moderator_console_client::images::{EventImage, ImageSource, ImageSync};
use moderator_console_client::session::{CookieBackend, FileBackend, SessionStore};

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct CliArgs {
    /// Base URL of the moderator API, e.g. https://api.example.com.
    #[clap(long)]
    pub base_url: Option<String>,

    /// Directory for persisted session and cookie state.
    #[clap(long, default_value = ".moderator-console")]
    pub storage_dir: PathBuf,

    /// Domain attribute to stamp on persisted cookies.
    #[clap(long)]
    pub cookie_domain: Option<String>,

    /// Timeout in seconds for API requests.
    #[clap(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Path to a TOML config file. Values there override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and persist the session locally.
    Login { email: String, password: String },

    /// Clear the persisted session.
    Logout,

    /// Show the authenticated user's profile.
    Profile,

    /// Load the dashboard: events, lookups, company info and stats.
    Dashboard,

    /// Event operations.
    Events {
        #[command(subcommand)]
        command: EventCommand,
    },

    /// Event image operations.
    Images {
        #[command(subcommand)]
        command: ImageCommand,
    },
}

#[derive(Subcommand, Debug)]
enum EventCommand {
    /// List the events of the authenticated user's company.
    List,

    /// Create an event from an inline JSON payload.
    Create { payload: String },

    /// Update an event from an inline JSON payload.
    Update { event_id: u64, payload: String },

    /// Delete an event.
    Delete { event_id: u64 },

    /// Show the full details of an event.
    Details { event_id: u64 },
}

#[derive(Subcommand, Debug)]
enum ImageCommand {
    /// List the images of an event.
    List { event_id: u64 },

    /// Upload an image file to an event.
    Add {
        event_id: u64,
        file: PathBuf,
        #[clap(long)]
        alt_text: Option<String>,
    },

    /// Remove an image from an event.
    Remove { event_id: u64, image_id: u64 },

    /// Update an image's alt text.
    Update {
        event_id: u64,
        image_id: u64,
        alt_text: String,
    },

    /// Mark an image as the event's primary.
    SetPrimary { event_id: u64, image_id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        base_url: cli_args.base_url.clone(),
        storage_dir: Some(cli_args.storage_dir.clone()),
        cookie_domain: cli_args.cookie_domain.clone(),
        request_timeout_secs: cli_args.request_timeout_secs,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("Failed to create storage dir {:?}", config.storage_dir))?;

    let session = Arc::new(SessionStore::new(
        Box::new(FileBackend::new(config.session_file_path())),
        Box::new(CookieBackend::new(
            config.cookies_file_path(),
            config.cookie_domain.clone(),
        )),
    ));

    let client = ApiClient::new(&config.base_url, config.request_timeout_secs, session.clone())?;
    let auth = AuthController::new(client.clone()).with_retry_policy(config.retry.clone());

    let mut session_events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            match event {
                SessionEvent::Invalidated { status } => {
                    warn!(
                        "Session invalidated by the server (HTTP {}). Please log in again.",
                        status
                    );
                }
                SessionEvent::LoggedOut => {}
            }
        }
    });

    match cli_args.command {
        Command::Login { email, password } => {
            let success = auth
                .login(&Credentials { email, password })
                .await
                .map_err(|err| anyhow::anyhow!(classified_message(&err)))?;
            info!("Logged in ({:?} mode)", success.mode);
            print_json(&success.user)?;
        }
        Command::Logout => {
            auth.logout();
            info!("Logged out");
        }
        Command::Profile => {
            let user = require_login(&auth).await?;
            print_json(&user)?;
        }
        Command::Dashboard => {
            let user = require_login(&auth).await?;
            let events_api = EventsApi::new(client.clone());
            let dashboard = events_api.load_dashboard(&user).await;
            println!("Company: {}", dashboard.company.name);
            println!(
                "Events: {} total, {} active, company {}",
                dashboard.stats.total_events,
                dashboard.stats.active_events,
                dashboard.company.verification_label()
            );
            println!(
                "Lookups: {} categories, {} cities, {} countries",
                dashboard.categories.len(),
                dashboard.cities.len(),
                dashboard.countries.len()
            );
        }
        Command::Events { command } => {
            let user = require_login(&auth).await?;
            let events_api = EventsApi::new(client.clone());
            match command {
                EventCommand::List => {
                    let events = events_api.list_events(&user).await.map_err(to_anyhow)?;
                    print_json(&Value::Array(events))?;
                }
                EventCommand::Create { payload } => {
                    let event: Value =
                        serde_json::from_str(&payload).context("Invalid event JSON payload")?;
                    let created = events_api
                        .create_event(&user, &event)
                        .await
                        .map_err(to_anyhow)?;
                    print_json(&created)?;
                }
                EventCommand::Update { event_id, payload } => {
                    let event: Value =
                        serde_json::from_str(&payload).context("Invalid event JSON payload")?;
                    let updated = events_api
                        .update_event(event_id, &event)
                        .await
                        .map_err(to_anyhow)?;
                    print_json(&updated)?;
                }
                EventCommand::Delete { event_id } => {
                    events_api.delete_event(event_id).await.map_err(to_anyhow)?;
                    info!("Deleted event {}", event_id);
                }
                EventCommand::Details { event_id } => {
                    let details = events_api.event_details(event_id).await.map_err(to_anyhow)?;
                    print_json(&details)?;
                }
            }
        }
        Command::Images { command } => {
            require_login(&auth).await?;
            let image_sync = ImageSync::new(client.clone());
            match command {
                ImageCommand::List { event_id } => {
                    let images = image_sync.fetch_images(event_id).await.map_err(to_anyhow)?;
                    for image in &images {
                        let marker = if image.is_primary { " [primary]" } else { "" };
                        println!("{}  {}{}", image.id, image.url, marker);
                    }
                }
                ImageCommand::Add {
                    event_id,
                    file,
                    alt_text,
                } => {
                    let previous = image_sync.fetch_images(event_id).await.map_err(to_anyhow)?;
                    let mut desired = previous.clone();
                    desired.push(EventImage::new_local(ImageSource::File(file), alt_text));
                    let report = image_sync
                        .sync(event_id, &previous, &desired)
                        .await
                        .map_err(to_anyhow)?;
                    report_sync(&report);
                }
                ImageCommand::Remove { event_id, image_id } => {
                    let previous = image_sync.fetch_images(event_id).await.map_err(to_anyhow)?;
                    let desired: Vec<EventImage> = previous
                        .iter()
                        .filter(|image| image.id.as_persisted() != Some(image_id))
                        .cloned()
                        .collect();
                    if desired.len() == previous.len() {
                        bail!("Event {} has no image {}", event_id, image_id);
                    }
                    let report = image_sync
                        .sync(event_id, &previous, &desired)
                        .await
                        .map_err(to_anyhow)?;
                    report_sync(&report);
                }
                ImageCommand::Update {
                    event_id,
                    image_id,
                    alt_text,
                } => {
                    let updated = image_sync
                        .update_image(event_id, image_id, &serde_json::json!({"alt_text": alt_text}))
                        .await
                        .map_err(to_anyhow)?;
                    print_json(&updated)?;
                }
                ImageCommand::SetPrimary { event_id, image_id } => {
                    let mut images = image_sync.fetch_images(event_id).await.map_err(to_anyhow)?;
                    image_sync
                        .set_primary(event_id, image_id, &mut images)
                        .await
                        .map_err(to_anyhow)?;
                    info!("Image {} is now the primary of event {}", image_id, event_id);
                }
            }
        }
    }

    Ok(())
}

/// Validate the persisted session against the server; error out when no
/// valid session remains.
async fn require_login(auth: &AuthController) -> Result<Value> {
    auth.validate_session().await;
    match auth.user() {
        Some(user) => Ok(user),
        None => bail!("Not logged in. Run the login command first."),
    }
}

fn to_anyhow(err: moderator_console_client::ApiError) -> anyhow::Error {
    anyhow::anyhow!(classified_message(&err))
}

fn classified_message(err: &moderator_console_client::ApiError) -> String {
    moderator_console_client::classify(err).message
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_sync(report: &moderator_console_client::images::SyncReport) {
    info!(
        "Image sync done: {} uploaded, {} deleted, {} failed",
        report.uploaded,
        report.deleted,
        report.failures.len()
    );
    for failure in &report.failures {
        warn!(
            "Image {} ({:?}): {}",
            failure.image_id, failure.operation, failure.outcome.message
        );
    }
    for image in &report.images {
        let marker = if image.is_primary { " [primary]" } else { "" };
        println!("{}  {}{}", image.id, image.url, marker);
    }
}
