use crate::config::AppConfig;
use crate::errors::ConsoleError;
use crate::logging::log_event;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILENAME: &str = "settings.json";

/// User choices remembered between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub save_dir: String,
    pub browser: String,
    pub preset: String,
    pub use_cookies: bool,
    pub send_notification: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            save_dir: String::new(),
            browser: "firefox".to_string(),
            preset: "best-mp4".to_string(),
            use_cookies: false,
            send_notification: true,
        }
    }
}

impl Settings {
    /// Config defaults with the remembered choices applied.
    pub fn config_base(&self) -> AppConfig {
        let mut cfg = AppConfig::default();
        if !self.save_dir.trim().is_empty() {
            cfg.download.save_dir = Some(PathBuf::from(&self.save_dir));
        }
        if !self.browser.trim().is_empty() {
            cfg.download.browser = self.browser.clone();
        }
        if !self.preset.trim().is_empty() {
            cfg.download.preset = self.preset.clone();
        }
        cfg.download.use_cookies = self.use_cookies;
        cfg.notifications.enabled = self.send_notification;
        cfg
    }
}

pub struct SettingsStore<'a> {
    fs: &'a dyn FileSystem,
    path: PathBuf,
    settings: Settings,
}

impl<'a> SettingsStore<'a> {
    pub fn load(fs: &'a dyn FileSystem, path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let path = path.as_ref().to_path_buf();
        let settings = if fs.exists(&path) {
            let text = fs.read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|e| ConsoleError::Settings(e.to_string()))?
        } else {
            Settings::default()
        };
        Ok(Self { fs, path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn set_save_dir(&mut self, save_dir: impl Into<String>) -> Result<(), ConsoleError> {
        self.settings.save_dir = save_dir.into();
        self.persist("save_dir")
    }

    pub fn set_browser(&mut self, browser: impl Into<String>) -> Result<(), ConsoleError> {
        self.settings.browser = browser.into();
        self.persist("browser")
    }

    pub fn set_preset(&mut self, preset: impl Into<String>) -> Result<(), ConsoleError> {
        self.settings.preset = preset.into();
        self.persist("preset")
    }

    pub fn set_use_cookies(&mut self, use_cookies: bool) -> Result<(), ConsoleError> {
        self.settings.use_cookies = use_cookies;
        self.persist("use_cookies")
    }

    pub fn set_send_notification(&mut self, enabled: bool) -> Result<(), ConsoleError> {
        self.settings.send_notification = enabled;
        self.persist("send_notification")
    }

    fn persist(&self, field: &str) -> Result<(), ConsoleError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !self.fs.exists(parent) {
                self.fs.create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| ConsoleError::Settings(e.to_string()))?;
        self.fs.write_string(&self.path, &text)?;
        log_event(
            "info",
            "settings_saved",
            json!({ "field": field, "path": self.path.display().to_string() }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Settings, SettingsStore};
    use crate::errors::ConsoleError;
    use crate::runtime::{FakeFileSystem, FileSystem};
    use std::path::Path;

    #[test]
    fn missing_file_yields_defaults() {
        let fs = FakeFileSystem::default();
        let store = SettingsStore::load(&fs, "/cfg/settings.json").expect("load");
        assert_eq!(store.get(), &Settings::default());
        assert_eq!(store.get().browser, "firefox");
    }

    #[test]
    fn setters_persist_immediately() {
        let fs = FakeFileSystem::default();
        let mut store = SettingsStore::load(&fs, "/cfg/settings.json").expect("load");
        store.set_browser("chrome").expect("browser");
        store.set_send_notification(false).expect("notify");

        let saved = fs.file(Path::new("/cfg/settings.json")).expect("written");
        let reloaded = SettingsStore::load(&fs, "/cfg/settings.json").expect("reload");
        assert!(saved.contains("\"chrome\""));
        assert_eq!(reloaded.get().browser, "chrome");
        assert!(!reloaded.get().send_notification);
    }

    #[test]
    fn older_files_without_new_fields_still_load() {
        let fs = FakeFileSystem::with_file(
            "/cfg/settings.json",
            r#"{"save_dir":"/videos","browser":"edge"}"#,
        );
        let store = SettingsStore::load(&fs, "/cfg/settings.json").expect("load");
        assert_eq!(store.get().save_dir, "/videos");
        assert!(store.get().send_notification);
    }

    #[test]
    fn remembered_choices_seed_the_config() {
        let settings = Settings {
            save_dir: "/videos".to_string(),
            browser: "chrome".to_string(),
            preset: "720p".to_string(),
            use_cookies: true,
            send_notification: false,
        };
        let cfg = settings.config_base();
        assert_eq!(cfg.download.save_dir.as_deref(), Some(Path::new("/videos")));
        assert_eq!(cfg.download.browser, "chrome");
        assert_eq!(cfg.download.preset, "720p");
        assert!(cfg.download.use_cookies);
        assert!(!cfg.notifications.enabled);
        assert_eq!(Settings::default().config_base().download.save_dir, None);
    }

    #[test]
    fn corrupt_file_is_a_settings_error() {
        let fs = FakeFileSystem::default();
        fs.write_string(Path::new("/s.json"), "{nope").expect("seed");
        let err = SettingsStore::load(&fs, "/s.json").err().expect("corrupt");
        assert!(matches!(err, ConsoleError::Settings(_)));
    }
}
