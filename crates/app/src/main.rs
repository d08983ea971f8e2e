use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nowify_core::{AppConfig, ProviderKind};
use nowify_engine::{spawn_engine, EngineConfig};
use nowify_providers::{build_provider_selector, http::build_client, ProviderSelector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod auth;
mod render;

use auth::Sessions;

#[derive(Parser, Debug)]
#[command(name = "nowify", about = "Now playing from Spotify, YouTube or Last.fm")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run {
        /// Overrides the configured provider (spotify, youtube, lastfm).
        #[arg(long, value_parser = parse_provider)]
        provider: Option<ProviderKind>,

        /// Print one JSON object per change instead of a summary line.
        #[arg(long)]
        json: bool,
    },
    Doctor,
    Status,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    ProviderKind::parse(value).ok_or_else(|| format!("unknown provider: {value}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run {
        provider: None,
        json: false,
    });
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg, &cfg_path).await
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Run { provider, json } => {
            let mut cfg = load_or_default(&cfg_path)?;
            if let Some(kind) = provider {
                cfg.provider = kind;
            }
            init_logging(&cfg.log_level);
            run(cfg, cfg_path, provider, json).await
        }
    }
}

struct Wiring {
    sessions: Sessions,
    selector: ProviderSelector,
}

fn wire(cfg: &AppConfig) -> Result<Wiring> {
    let client = build_client(Duration::from_millis(cfg.intervals.request_timeout_ms))
        .context("failed to build HTTP client")?;
    let sessions = Sessions::new(cfg, client);
    let selector = build_provider_selector(cfg, sessions.credentials())?;
    Ok(Wiring { sessions, selector })
}

async fn run(
    mut cfg: AppConfig,
    cfg_path: PathBuf,
    provider_override: Option<ProviderKind>,
    json: bool,
) -> Result<()> {
    for problem in cfg.validate() {
        warn!(%problem, "configuration problem");
    }

    let Wiring {
        sessions,
        mut selector,
    } = wire(&cfg)?;
    sessions.bootstrap(&cfg.spotify);

    let (engine, engine_task) = spawn_engine(EngineConfig::from_app_config(&cfg));
    let mut records = engine.subscribe();

    info!(provider = %selector.active_kind(), providers = ?selector.kinds(), "nowify started");
    if let Some(provider) = selector.active() {
        engine.switch_provider(provider).await?;
    }

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(
        cfg_path.clone(),
        cfg.intervals.file_watch_poll_ms,
        reload_tx,
    )
    .await?;

    emit(&records.borrow_and_update(), json)?;

    loop {
        tokio::select! {
            changed = records.changed() => {
                if changed.is_err() {
                    warn!("polling engine stopped unexpectedly");
                    break;
                }
                let record = records.borrow_and_update().clone();
                emit(&record, json)?;
            }
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(mut new_cfg) => {
                            if let Some(kind) = provider_override {
                                new_cfg.provider = kind;
                            }
                            sessions.apply_config(&cfg, &new_cfg);
                            if new_cfg.intervals != cfg.intervals {
                                warn!("interval changes take effect after restart");
                            }
                            if new_cfg.provider != selector.active_kind() {
                                if let Some(provider) = selector.switch(new_cfg.provider) {
                                    engine.switch_provider(provider).await?;
                                }
                            }
                            cfg = new_cfg;
                            info!("configuration reloaded");
                        }
                        Err(err) => {
                            error!(error=%err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    if engine.shutdown().await.is_ok() {
        engine_task.await.context("polling engine task failed")?;
    }
    Ok(())
}

fn emit(record: &nowify_core::PlaybackRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", render::json_line(record)?);
    } else {
        println!("{}", render::summary_line(record));
    }
    Ok(())
}

async fn doctor(cfg: &AppConfig, cfg_path: &Path) -> Result<()> {
    println!("== nowify doctor ==");
    println!(
        "Config file: {} ({})",
        cfg_path.display(),
        if cfg_path.exists() { "found" } else { "missing, using defaults" }
    );

    let problems = cfg.validate();
    if problems.is_empty() {
        println!("Config: ok");
    } else {
        for problem in &problems {
            println!("Config problem: {problem}");
        }
    }

    let Wiring { sessions, selector } = wire(cfg)?;
    let ready = |ok: bool| if ok { "present" } else { "missing" };
    println!("Spotify access token: {}", ready(sessions.spotify_ready()));
    println!(
        "Spotify refresh token: {}",
        ready(!cfg.spotify.refresh_token.trim().is_empty())
    );
    println!("YouTube access token: {}", ready(sessions.youtube_ready()));
    println!(
        "Last.fm api key / username: {}",
        ready(cfg.lastfm.is_complete())
    );

    let Some(provider) = selector.active() else {
        println!("Provider {} is not available", selector.active_kind());
        return Ok(());
    };
    println!("Provider checked: {}", provider.kind());
    match provider.now_playing().await {
        Some(record) => println!("Now playing: {}", render::summary_line(&record)),
        None => println!("No active playback (or the request failed, see logs)"),
    }

    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let Wiring { selector, .. } = wire(cfg)?;
    let Some(provider) = selector.active() else {
        println!("provider: {} (unavailable)", selector.active_kind());
        return Ok(());
    };

    println!("provider: {}", provider.kind());
    let mut record = provider
        .now_playing()
        .await
        .unwrap_or_else(|| nowify_core::PlaybackRecord::idle(Some(provider.kind())));
    if provider.supports_month_favorite() {
        record.top_track = provider.month_favorite().await;
    }

    println!("{}", render::summary_line(&record));
    for line in render::detail_lines(&record) {
        println!("{line}");
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("nowify").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg, |name| std::env::var(name).ok());
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // stdout carries the rendered records
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn spawn_reload_watchers(path: PathBuf, poll_ms: u64, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        let sleep = Duration::from_millis(poll_ms.max(2_000));
        loop {
            tokio::time::sleep(sleep).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                if tx_poll.send(()).await.is_err() {
                    break;
                }
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = value("NOWIFY_PROVIDER") {
        match ProviderKind::parse(&v) {
            Some(kind) => cfg.provider = kind,
            None => eprintln!("ignoring NOWIFY_PROVIDER={v}: unknown provider"),
        }
    }
    for (name, slot) in [
        ("NOWIFY_LOG_LEVEL", &mut cfg.log_level),
        ("NOWIFY_SPOTIFY_CLIENT_ID", &mut cfg.spotify.client_id),
        ("NOWIFY_SPOTIFY_CLIENT_SECRET", &mut cfg.spotify.client_secret),
        ("NOWIFY_SPOTIFY_ACCESS_TOKEN", &mut cfg.spotify.access_token),
        ("NOWIFY_SPOTIFY_REFRESH_TOKEN", &mut cfg.spotify.refresh_token),
        ("NOWIFY_YOUTUBE_ACCESS_TOKEN", &mut cfg.youtube.access_token),
        ("NOWIFY_LASTFM_API_KEY", &mut cfg.lastfm.api_key),
        ("NOWIFY_LASTFM_USERNAME", &mut cfg.lastfm.username),
    ] {
        if let Some(v) = value(name) {
            *slot = v;
        }
    }
}
