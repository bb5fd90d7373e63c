use crate::errors::ConsoleError;
use crate::intake::DEFAULT_INTAKE_PORT;
use crate::logging::DEFAULT_DISK_BUDGET_BYTES;
use crate::runtime::FileSystem;
use crate::viewport::{DEFAULT_FOLLOW_TOLERANCE, DEFAULT_OVERSCAN_ROWS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    pub preset: Option<String>,
    pub browser: Option<String>,
    pub use_cookies: Option<bool>,
    pub notifications: Option<bool>,
    pub serve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub tools: ToolsConfig,
    pub download: DownloadConfig,
    pub viewport: ViewportConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolsConfig {
    pub yt_dlp_path: String,
    pub ffmpeg_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadConfig {
    pub save_dir: Option<PathBuf>,
    pub browser: String,
    pub use_cookies: bool,
    pub preset: String,
    pub remote_components: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewportConfig {
    pub overscan_rows: usize,
    pub follow_tolerance: u64,
    pub paint_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationsConfig {
    pub enabled: bool,
}

/// Local URL intake for the browser extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: String,
    pub budget_bytes: u64,
}

pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tools: ToolsConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
            },
            download: DownloadConfig {
                save_dir: None,
                browser: "firefox".to_string(),
                use_cookies: false,
                preset: "best-mp4".to_string(),
                remote_components: true,
            },
            viewport: ViewportConfig {
                overscan_rows: DEFAULT_OVERSCAN_ROWS,
                follow_tolerance: DEFAULT_FOLLOW_TOLERANCE,
                paint_interval_ms: 50,
            },
            notifications: NotificationsConfig { enabled: true },
            logging: LoggingConfig {
                path: ".cache/dlconsole/console.jsonl".to_string(),
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
            server: ServerConfig {
                enabled: false,
                port: DEFAULT_INTAKE_PORT,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    tools: Option<PartialToolsConfig>,
    download: Option<PartialDownloadConfig>,
    viewport: Option<PartialViewportConfig>,
    notifications: Option<PartialNotificationsConfig>,
    logging: Option<PartialLoggingConfig>,
    server: Option<PartialServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialToolsConfig {
    yt_dlp_path: Option<String>,
    ffmpeg_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDownloadConfig {
    save_dir: Option<PathBuf>,
    browser: Option<String>,
    use_cookies: Option<bool>,
    preset: Option<String>,
    remote_components: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialViewportConfig {
    overscan_rows: Option<usize>,
    follow_tolerance: Option<u64>,
    paint_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialNotificationsConfig {
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialServerConfig {
    enabled: Option<bool>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<String>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    fs: &dyn FileSystem,
) -> Result<AppConfig, ConsoleError> {
    load_config_with_base(AppConfig::default(), overrides, fs)
}

/// Layers the config file and CLI overrides over `base`, which carries the
/// remembered user settings.
pub fn load_config_with_base(
    base: AppConfig,
    overrides: &CliOverrides,
    fs: &dyn FileSystem,
) -> Result<AppConfig, ConsoleError> {
    let mut cfg = base;

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| ConsoleError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(tools) = partial.tools {
        if let Some(value) = tools.yt_dlp_path {
            cfg.tools.yt_dlp_path = value;
        }
        if let Some(value) = tools.ffmpeg_path {
            cfg.tools.ffmpeg_path = value;
        }
    }

    if let Some(download) = partial.download {
        if let Some(value) = download.save_dir {
            cfg.download.save_dir = Some(value);
        }
        if let Some(value) = download.browser {
            cfg.download.browser = value;
        }
        if let Some(value) = download.use_cookies {
            cfg.download.use_cookies = value;
        }
        if let Some(value) = download.preset {
            cfg.download.preset = value;
        }
        if let Some(value) = download.remote_components {
            cfg.download.remote_components = value;
        }
    }

    if let Some(viewport) = partial.viewport {
        if let Some(value) = viewport.overscan_rows {
            cfg.viewport.overscan_rows = value;
        }
        if let Some(value) = viewport.follow_tolerance {
            cfg.viewport.follow_tolerance = value;
        }
        if let Some(value) = viewport.paint_interval_ms {
            cfg.viewport.paint_interval_ms = value;
        }
    }

    if let Some(notifications) = partial.notifications {
        if let Some(value) = notifications.enabled {
            cfg.notifications.enabled = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }

    if let Some(server) = partial.server {
        if let Some(value) = server.enabled {
            cfg.server.enabled = value;
        }
        if let Some(value) = server.port {
            cfg.server.port = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(save_dir) = &overrides.save_dir {
        cfg.download.save_dir = Some(save_dir.clone());
    }
    if let Some(preset) = &overrides.preset {
        cfg.download.preset = preset.clone();
    }
    if let Some(browser) = &overrides.browser {
        cfg.download.browser = browser.clone();
    }
    if let Some(use_cookies) = overrides.use_cookies {
        cfg.download.use_cookies = use_cookies;
    }
    if let Some(enabled) = overrides.notifications {
        cfg.notifications.enabled = enabled;
    }
    if overrides.serve {
        cfg.server.enabled = true;
    }
}

/// Resolves the log path against `base` unless it is already absolute.
pub fn resolve_log_path(cfg: &AppConfig, base: &Path) -> PathBuf {
    let path = Path::new(&cfg.logging.path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), ConsoleError> {
    if cfg.tools.yt_dlp_path.trim().is_empty() {
        return Err(ConsoleError::InvalidConfig(
            "tools.yt_dlp_path must not be empty".to_string(),
        ));
    }

    if cfg.viewport.paint_interval_ms == 0 {
        return Err(ConsoleError::InvalidConfig(
            "viewport.paint_interval_ms must be greater than zero".to_string(),
        ));
    }

    if cfg.viewport.follow_tolerance == 0 {
        return Err(ConsoleError::InvalidConfig(
            "viewport.follow_tolerance must be greater than zero".to_string(),
        ));
    }

    if cfg.server.enabled && cfg.server.port == 0 {
        return Err(ConsoleError::InvalidConfig(
            "server.port must be set when the server is enabled".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, resolve_log_path, AppConfig, CliOverrides};
    use crate::errors::ConsoleError;
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};

    fn overrides(path: &str) -> CliOverrides {
        CliOverrides {
            config_path: Some(PathBuf::from(path)),
            ..CliOverrides::default()
        }
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = load_config(&CliOverrides::default(), &FakeFileSystem::default())
            .expect("defaults");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.viewport.follow_tolerance, 2);
    }

    #[test]
    fn partial_sections_merge_over_defaults() {
        let fs = FakeFileSystem::with_file(
            "/cfg.toml",
            "[download]\nbrowser = \"chrome\"\n[viewport]\noverscan_rows = 8\n",
        );
        let cfg = load_config(&overrides("/cfg.toml"), &fs).expect("config");
        assert_eq!(cfg.download.browser, "chrome");
        assert_eq!(cfg.download.preset, "best-mp4");
        assert_eq!(cfg.viewport.overscan_rows, 8);
        assert_eq!(cfg.viewport.paint_interval_ms, 50);
    }

    #[test]
    fn cli_overrides_win_over_file_values() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[download]\npreset = \"audio-m4a\"\n");
        let mut cli = overrides("/cfg.toml");
        cli.preset = Some("720p".to_string());
        cli.browser = Some("chrome".to_string());
        cli.use_cookies = Some(true);
        cli.notifications = Some(false);
        let cfg = load_config(&cli, &fs).expect("config");
        assert_eq!(cfg.download.preset, "720p");
        assert_eq!(cfg.download.browser, "chrome");
        assert!(cfg.download.use_cookies);
        assert!(!cfg.notifications.enabled);
    }

    #[test]
    fn server_section_and_serve_flag() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[server]\nport = 8123\n");
        let cfg = load_config(&overrides("/cfg.toml"), &fs).expect("config");
        assert!(!cfg.server.enabled);
        assert_eq!(cfg.server.port, 8123);

        let mut cli = overrides("/cfg.toml");
        cli.serve = true;
        assert!(load_config(&cli, &fs).expect("config").server.enabled);

        let zero = FakeFileSystem::with_file("/cfg.toml", "[server]\nenabled = true\nport = 0\n");
        let err = load_config(&overrides("/cfg.toml"), &zero).expect_err("invalid");
        assert!(matches!(err, ConsoleError::InvalidConfig(_)));
    }

    #[test]
    fn zero_tolerance_is_rejected() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[viewport]\nfollow_tolerance = 0\n");
        let err = load_config(&overrides("/cfg.toml"), &fs).expect_err("invalid");
        assert!(matches!(err, ConsoleError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[viewport\n");
        let err = load_config(&overrides("/cfg.toml"), &fs).expect_err("parse");
        assert!(matches!(err, ConsoleError::ConfigParse(_)));
    }

    #[test]
    fn relative_log_path_is_anchored() {
        let cfg = AppConfig::default();
        assert_eq!(
            resolve_log_path(&cfg, Path::new("/home/me")),
            PathBuf::from("/home/me/.cache/dlconsole/console.jsonl")
        );
    }
}
