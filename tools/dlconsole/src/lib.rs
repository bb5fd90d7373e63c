pub mod app;
pub mod command;
pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod errors;
pub mod hotkeys;
pub mod intake;
pub mod line_buffer;
pub mod log_retention;
pub mod logging;
pub mod progress;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod tui;
pub mod types;
pub mod viewport;

use app::{run_headless, run_interactive, Intake};
use clap::{error::ErrorKind, CommandFactory, Parser};
use command::{build_run_request, CommandOptions, DownloadPreset};
use config::{load_config_with_base, resolve_log_path, AppConfig, CliOverrides};
use errors::ConsoleError;
use intake::IntakeServer;
use logging::{init_run_logger, log_event, JsonlLogger};
use runtime::{
    FileSystem, ProductionFileSystem, ProductionProcessHost, ProductionTerminal, RunRequest,
    Terminal, TerminalNotifier,
};
use serde_json::json;
use session::ConsoleSession;
use settings::{SettingsStore, SETTINGS_FILENAME};
use std::path::{Path, PathBuf};
use std::time::Duration;
use viewport::AutoFollowViewport;

#[derive(Debug, Clone, Parser)]
#[command(name = "dlconsole")]
#[command(about = "Terminal console for yt-dlp with live progress and an auto-following log")]
pub struct Cli {
    /// Video or playlist URL.
    pub url: Option<String>,
    /// best-mp4, audio-m4a, 1080p, 720p, 480p, 360p, list-formats, codec,
    /// live-from-start, thumbnail or subtitles.
    #[arg(long)]
    pub preset: Option<String>,
    /// Format id for the codec preset.
    #[arg(long)]
    pub codec: Option<String>,
    /// Subtitle language for the subtitles preset.
    #[arg(long = "sub-lang")]
    pub sub_lang: Option<String>,
    /// Read cookies from the configured browser. Remembered.
    #[arg(long, default_value_t = false, conflicts_with = "no_cookies")]
    pub cookies: bool,
    /// Stop reading browser cookies. Remembered.
    #[arg(long = "no-cookies", default_value_t = false)]
    pub no_cookies: bool,
    /// Browser to read cookies from. Remembered.
    #[arg(long)]
    pub browser: Option<String>,
    /// Completion notifications on or off. Remembered.
    #[arg(long, value_name = "BOOL")]
    pub notifications: Option<bool>,
    /// Accept URLs from the browser extension on the local intake port.
    #[arg(long, default_value_t = false)]
    pub serve: bool,
    #[arg(long)]
    pub save_dir: Option<PathBuf>,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub settings: Option<PathBuf>,
    /// Print output lines instead of drawing the console.
    #[arg(long, default_value_t = false)]
    pub headless: bool,
    /// Arguments passed to yt-dlp verbatim.
    #[arg(last = true)]
    pub tool_args: Vec<String>,
}

pub fn run() -> Result<i32, ConsoleError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| ConsoleError::Io(e.to_string()))?;
    run_with_runtime(&args, &cwd, &ProductionFileSystem, &ProductionTerminal)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    fs: &dyn FileSystem,
    terminal: &dyn Terminal,
) -> Result<i32, ConsoleError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(ConsoleError::Cli(error.to_string())),
        },
    };

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| cwd.join(".cache/dlconsole").join(SETTINGS_FILENAME));
    let mut store = SettingsStore::load(fs, &settings_path)?;

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        save_dir: cli.save_dir.clone(),
        preset: cli.preset.clone(),
        browser: cli.browser.clone(),
        use_cookies: cookie_choice(&cli),
        notifications: cli.notifications,
        serve: cli.serve,
    };
    let cfg = load_config_with_base(store.get().config_base(), &overrides, fs)?;

    init_run_logger(
        JsonlLogger::new(resolve_log_path(&cfg, cwd)).with_budget(cfg.logging.budget_bytes),
    );

    let headless = cli.headless || !terminal.stdout_is_tty();
    let serve = cfg.server.enabled && !headless;
    let preset = resolve_preset(&cli, &cfg)?;
    let options = CommandOptions::from_config(&cfg, "");
    let build = |url: &str, preset: &DownloadPreset| -> Result<RunRequest, ConsoleError> {
        let mut request = build_run_request(url, preset, &options)?;
        request.cwd = Some(cwd.to_path_buf());
        Ok(request)
    };

    // With the intake running the console may open empty and wait for URLs.
    let wait_for_intake = serve && cli.url.is_none() && cli.tool_args.is_empty();
    let initial = if wait_for_intake {
        None
    } else {
        Some(build(cli.url.as_deref().unwrap_or_default(), &preset)?)
    };
    remember_choices(&mut store, &cli, &preset);

    let viewport = AutoFollowViewport::new(1, 0)
        .with_tuning(cfg.viewport.overscan_rows, cfg.viewport.follow_tolerance);
    let mut session = ConsoleSession::new(viewport, cfg.notifications.enabled);
    let (host, mut events) = ProductionProcessHost::new();
    if let Some(request) = initial {
        session.start_run(&host, request)?;
    }

    if headless {
        let notifier = TerminalNotifier::new(false);
        return run_headless(&mut session, &mut events, &notifier, terminal);
    }

    let intake_preset = if preset.needs_url() {
        preset.clone()
    } else {
        DownloadPreset::BestMp4
    };
    let build_intake = |url: &str| build(url, &intake_preset);
    // The server stops listening when `_server` drops after the loop returns.
    let (_server, intake) = if serve {
        let (server, requests) = IntakeServer::bind(cfg.server.port)?;
        if wait_for_intake {
            session.set_status(format!("waiting for URLs on {}", server.local_addr()));
        }
        let intake = Intake {
            requests,
            build: &build_intake,
        };
        (Some(server), Some(intake))
    } else {
        (None, None)
    };

    let notifier = TerminalNotifier::new(true);
    run_interactive(
        &mut session,
        &host,
        &mut events,
        &notifier,
        intake,
        Duration::from_millis(cfg.viewport.paint_interval_ms),
    )
}

fn cookie_choice(cli: &Cli) -> Option<bool> {
    match (cli.cookies, cli.no_cookies) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

/// `--codec` and `--sub-lang` select their presets when `--preset` is absent.
fn resolve_preset(cli: &Cli, cfg: &AppConfig) -> Result<DownloadPreset, ConsoleError> {
    if !cli.tool_args.is_empty() {
        return Ok(DownloadPreset::Arbitrary(cli.tool_args.clone()));
    }
    let name = match (&cli.preset, &cli.codec, &cli.sub_lang) {
        (None, Some(_), _) => "codec",
        (None, None, Some(_)) => "subtitles",
        _ => cfg.download.preset.as_str(),
    };
    DownloadPreset::from_name(name, cli.codec.as_deref(), cli.sub_lang.as_deref())
}

fn remember_choices(store: &mut SettingsStore<'_>, cli: &Cli, preset: &DownloadPreset) {
    let mut results = Vec::new();
    if let Some(name) = &cli.preset {
        if store.get().preset != *name && !matches!(preset, DownloadPreset::Arbitrary(_)) {
            results.push(store.set_preset(name.clone()));
        }
    }
    if let Some(dir) = &cli.save_dir {
        let dir = dir.display().to_string();
        if store.get().save_dir != dir {
            results.push(store.set_save_dir(dir));
        }
    }
    if let Some(browser) = &cli.browser {
        if store.get().browser != *browser {
            results.push(store.set_browser(browser.clone()));
        }
    }
    if let Some(use_cookies) = cookie_choice(cli) {
        if store.get().use_cookies != use_cookies {
            results.push(store.set_use_cookies(use_cookies));
        }
    }
    if let Some(enabled) = cli.notifications {
        if store.get().send_notification != enabled {
            results.push(store.set_send_notification(enabled));
        }
    }
    for result in results {
        if let Err(err) = result {
            log_event(
                "warn",
                "settings_saved",
                json!({ "path": store.path().display().to_string(), "error": err.to_string() }),
            );
        }
    }
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}
