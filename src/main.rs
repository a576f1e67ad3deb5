use anyhow::{Context, Result};
use background_service::{BackgroundService, BadgeNotifier, HostChannel, TerminalBadge};
use backend_client::{Backend, BackendClient};
use clap::{Parser, Subcommand, ValueEnum};
use config_store::{ConfigStore, FileStore};
use panel::{Panel, PanelAction, PanelEvent};
use scrapedeck_core::{
    ActivityEvent, ActivityView, Configuration, CoreError, ErrorExt, ErrorReporter, PanelSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Control panel for the crawl automation backend", long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether the backend is online and what automation is doing
    Status,
    /// Trigger a manual scrape
    Scrape,
    /// Start or stop scheduled scraping
    Automation {
        #[arg(value_enum)]
        mode: Switch,
    },
    /// List scraped results
    Results,
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Drop the backend's stored browser session
    ClearSession,
    /// Keep the panel open and print activity until Ctrl-C
    Watch,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the saved configuration (secrets redacted)
    Show {
        /// Show what the backend holds instead of the local copy
        #[arg(long)]
        server: bool,
    },
    /// Validate, push and persist a configuration from a JSON file
    Save { file: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => PanelSettings::load_required(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => {
            let path = PanelSettings::default_settings_path();
            PanelSettings::load(&path)
                .with_context(|| format!("loading settings from {}", path.display()))?
        }
    };
    if let Some(url) = &args.backend_url {
        settings.backend_url = url.clone();
        settings.validate()?;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = Arc::new(BackendClient::from_settings(&settings)?);
    let store = ConfigStore::new(Arc::new(FileStore::new(settings.storage_path())));
    if args.backend_url.is_none() {
        if let Some(saved) = store.load().await {
            backend.set_base_url(&saved.backend_url)?;
        }
    }

    let service = BackgroundService::new(Arc::new(TerminalBadge), settings.request_timeout())?;
    let (host, _service_task) = service.spawn();
    let panel = Panel::new(
        &settings,
        backend.clone(),
        store.clone(),
        BadgeNotifier::new(host.clone()),
    );

    if let Err(e) = run(args.command, &panel, backend.as_ref(), &store, &host).await {
        ErrorReporter::report_error(&e);
        eprintln!("Error [{}]: {}", e.error_code(), e.user_friendly_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    command: Command,
    panel: &Panel,
    backend: &BackendClient,
    store: &ConfigStore,
    host: &HostChannel,
) -> Result<(), CoreError> {
    match command {
        Command::Status => {
            let base_url = backend.base_url();
            let online = host
                .check_backend_status(&format!("{}/status", base_url))
                .await;
            println!(
                "Backend {}: {}",
                base_url,
                if online { "Online" } else { "Offline" }
            );
            if online {
                let state = panel.controller().refresh_status().await?;
                println!("Automation: {}", state);
            }
        }
        Command::Scrape => {
            let result = panel.trigger_scrape().await?;
            if let Some(run) = panel.controller().last_scrape().await {
                println!(
                    "Scrape requested at {}: {:?}",
                    run.requested_at.format("%H:%M:%S UTC"),
                    run.status
                );
            }
            println!("{}", result.message);
            if result.ok {
                // Let the scheduled results refresh land
                let settle = panel.result_refresh_delay() + Duration::from_millis(500);
                tokio::time::sleep(settle).await;
                println!("{} result(s) available", panel.results().await.len());
            }
        }
        Command::Automation { mode } => {
            if let Err(e) = panel.controller().refresh_status().await {
                tracing::debug!("Could not read automation status before toggling: {}", e);
            }
            let state = panel
                .toggle_automation(matches!(mode, Switch::On))
                .await?;
            println!("Automation {}", state);
        }
        Command::Results => {
            panel.update(PanelAction::RefreshResults).await?;
            let results = panel.results().await;
            if results.is_empty() {
                println!("No results yet");
            }
            for result in results {
                println!(
                    "@{} [{}] {} (likes {}, comments {}, reposts {})",
                    result.username,
                    result.feed_source.as_deref().unwrap_or("feed"),
                    result.text,
                    result.likes,
                    result.comments,
                    result.reposts
                );
                for mint in &result.mints {
                    println!("    mint: {}", mint);
                }
            }
        }
        Command::Config { action } => match action {
            ConfigCommand::Show { server } => {
                let config = if server {
                    panel.fetch_server_config().await?
                } else {
                    store.load().await
                };
                match config {
                    Some(config) => println!("{:#?}", config),
                    None => println!("No configuration saved"),
                }
                println!(
                    "Contract address required: {}",
                    panel.contract_address_required().await
                );
            }
            ConfigCommand::Save { file } => {
                let raw = tokio::fs::read_to_string(&file).await?;
                let config: Configuration = serde_json::from_str(&raw)?;
                panel
                    .update(PanelAction::SaveConfiguration(Box::new(config)))
                    .await?;
                print_activity(&panel.activity().await, &mut Vec::new());
            }
        },
        Command::ClearSession => {
            panel.clear_session().await?;
            println!("Browser session cleared");
        }
        Command::Watch => watch(panel).await?,
    }
    Ok(())
}

async fn watch(panel: &Panel) -> Result<(), CoreError> {
    let mut events = panel.subscribe();
    panel.open().await;
    println!("Watching backend activity, Ctrl-C to stop");

    let mut printed = Vec::new();
    print_activity(&panel.activity().await, &mut printed);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PanelEvent::ActivityChanged(view)) => print_activity(&view, &mut printed),
                Ok(PanelEvent::BackendStatusChanged { online }) => {
                    println!("Backend {}", if online { "Online" } else { "Offline" });
                }
                Ok(PanelEvent::AutomationStateChanged(state)) => println!("Automation {}", state),
                Ok(PanelEvent::ResultsUpdated(results)) => {
                    println!("{} result(s)", results.len());
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} panel events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    panel.close().await;
    Ok(())
}

/// Print entries of `view` not printed before.
fn print_activity(view: &ActivityView, printed: &mut Vec<ActivityEvent>) {
    if let Some(placeholder) = view.placeholder() {
        println!("{}", placeholder);
        printed.clear();
        return;
    }
    for event in view.events() {
        if !printed.contains(event) {
            println!("[{}] {:?}: {}", event.timestamp, event.severity, event.message);
        }
    }
    *printed = view.events().to_vec();
}
