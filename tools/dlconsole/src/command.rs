//! Builds the download tool's argument list from a preset.

use crate::config::{AppConfig, DEFAULT_FFMPEG_PATH};
use crate::errors::ConsoleError;
use crate::runtime::RunRequest;

const BEST_MP4_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
const AUDIO_M4A_FORMAT: &str = "bestaudio[ext=m4a]";
const TRACKING_PARAMS: [&str; 6] = ["si", "list", "index", "ab_channel", "pp", "spm_id_from"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadPreset {
    BestMp4,
    AudioM4a,
    Video1080,
    Video720,
    Video480,
    Video360,
    ListFormats,
    Codec(String),
    LiveFromStart,
    Thumbnail,
    Subtitles(String),
    Arbitrary(Vec<String>),
}

pub const PRESET_NAMES: [&str; 11] = [
    "best-mp4",
    "audio-m4a",
    "1080p",
    "720p",
    "480p",
    "360p",
    "list-formats",
    "codec",
    "live-from-start",
    "thumbnail",
    "subtitles",
];

impl DownloadPreset {
    /// Resolves a preset by name. `codec` and `sub_lang` feed the presets that
    /// need them; checking that they are present happens at build time.
    pub fn from_name(
        name: &str,
        codec: Option<&str>,
        sub_lang: Option<&str>,
    ) -> Result<Self, ConsoleError> {
        let preset = match name {
            "best-mp4" => Self::BestMp4,
            "audio-m4a" => Self::AudioM4a,
            "1080p" => Self::Video1080,
            "720p" => Self::Video720,
            "480p" => Self::Video480,
            "360p" => Self::Video360,
            "list-formats" => Self::ListFormats,
            "codec" => Self::Codec(codec.unwrap_or_default().to_string()),
            "live-from-start" => Self::LiveFromStart,
            "thumbnail" => Self::Thumbnail,
            "subtitles" => Self::Subtitles(sub_lang.unwrap_or_default().to_string()),
            other => {
                return Err(ConsoleError::InvalidConfig(format!(
                    "unknown preset `{other}` (expected one of: {})",
                    PRESET_NAMES.join(", ")
                )))
            }
        };
        Ok(preset)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BestMp4 => "best-mp4",
            Self::AudioM4a => "audio-m4a",
            Self::Video1080 => "1080p",
            Self::Video720 => "720p",
            Self::Video480 => "480p",
            Self::Video360 => "360p",
            Self::ListFormats => "list-formats",
            Self::Codec(_) => "codec",
            Self::LiveFromStart => "live-from-start",
            Self::Thumbnail => "thumbnail",
            Self::Subtitles(_) => "subtitles",
            Self::Arbitrary(_) => "arbitrary",
        }
    }

    pub fn needs_url(&self) -> bool {
        !matches!(self, Self::Arbitrary(_))
    }

    fn height_format_ids(&self) -> Option<&'static str> {
        match self {
            Self::Video1080 => Some("616/270/137/614/248/399"),
            Self::Video720 => Some("232/609/247/136/398"),
            Self::Video480 => Some("231/606/244/135/397"),
            Self::Video360 => Some("230/605/243/134/396"),
            _ => None,
        }
    }
}

/// `616/270` becomes `616+bestaudio/270+bestaudio`.
pub fn height_format(ids: &str) -> String {
    ids.split('/')
        .map(|id| format!("{id}+bestaudio"))
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptions {
    pub yt_dlp_path: String,
    pub ffmpeg_path: String,
    pub save_dir: String,
    pub browser: String,
    pub use_cookies: bool,
    pub remote_components: bool,
}

impl CommandOptions {
    pub fn from_config(cfg: &AppConfig, fallback_save_dir: &str) -> Self {
        let save_dir = cfg
            .download
            .save_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| fallback_save_dir.to_string());
        Self {
            yt_dlp_path: cfg.tools.yt_dlp_path.clone(),
            ffmpeg_path: cfg.tools.ffmpeg_path.clone(),
            save_dir,
            browser: cfg.download.browser.clone(),
            use_cookies: cfg.download.use_cookies,
            remote_components: cfg.download.remote_components,
        }
    }

    fn output_template(&self) -> String {
        let dir = self.save_dir.trim_end_matches(['/', '\\']);
        if dir.is_empty() {
            "%(title)s.%(ext)s".to_string()
        } else {
            format!("{dir}/%(title)s.%(ext)s")
        }
    }
}

pub fn build_run_request(
    url: &str,
    preset: &DownloadPreset,
    options: &CommandOptions,
) -> Result<RunRequest, ConsoleError> {
    let mut args = Vec::new();

    if preset.needs_url() {
        let url = validate_url(url)?;
        args.push(url);
    }

    let output = options.output_template();
    let download = |args: &mut Vec<String>, format: &str| {
        args.extend(["-o".to_string(), output.clone()]);
        args.extend(["-f".to_string(), format.to_string()]);
        args.push("--no-mtime".to_string());
    };

    match preset {
        DownloadPreset::BestMp4 => download(&mut args, BEST_MP4_FORMAT),
        DownloadPreset::AudioM4a => download(&mut args, AUDIO_M4A_FORMAT),
        DownloadPreset::Video1080
        | DownloadPreset::Video720
        | DownloadPreset::Video480
        | DownloadPreset::Video360 => {
            let ids = preset.height_format_ids().unwrap_or_default();
            download(&mut args, &height_format(ids));
        }
        DownloadPreset::ListFormats => {
            args.extend(["--list-formats".to_string(), "--skip-download".to_string()]);
        }
        DownloadPreset::Codec(id) => {
            if id.trim().is_empty() {
                return Err(ConsoleError::InvalidConfig(
                    "the codec preset needs a format id (--codec)".to_string(),
                ));
            }
            download(&mut args, id.trim());
        }
        DownloadPreset::LiveFromStart => {
            args.extend(["-o".to_string(), output.clone()]);
            args.push("--live-from-start".to_string());
            args.extend(["-f".to_string(), BEST_MP4_FORMAT.to_string()]);
            args.push("--no-mtime".to_string());
        }
        DownloadPreset::Thumbnail => {
            args.extend(["-o".to_string(), output.clone()]);
            args.extend([
                "--write-thumbnail".to_string(),
                "--skip-download".to_string(),
                "--no-mtime".to_string(),
            ]);
        }
        DownloadPreset::Subtitles(lang) => {
            if lang.trim().is_empty() {
                return Err(ConsoleError::InvalidConfig(
                    "the subtitles preset needs a language (--sub-lang)".to_string(),
                ));
            }
            args.extend(["-o".to_string(), output.clone()]);
            args.push("--write-auto-sub".to_string());
            args.extend(["--sub-lang".to_string(), lang.trim().to_string()]);
            args.push("--skip-download".to_string());
        }
        DownloadPreset::Arbitrary(extra) => {
            if extra.iter().all(|arg| arg.trim().is_empty()) {
                return Err(ConsoleError::InvalidConfig(
                    "no arguments given after `--`".to_string(),
                ));
            }
            args.extend(extra.iter().cloned());
        }
    }

    if options.use_cookies {
        args.extend(["--cookies-from-browser".to_string(), options.browser.clone()]);
    }
    if !options.ffmpeg_path.is_empty() && options.ffmpeg_path != DEFAULT_FFMPEG_PATH {
        args.extend(["--ffmpeg-location".to_string(), options.ffmpeg_path.clone()]);
    }
    if options.remote_components {
        args.extend(["--remote-components".to_string(), "ejs:github".to_string()]);
    }

    Ok(RunRequest {
        program: options.yt_dlp_path.clone(),
        args,
        cwd: None,
    })
}

fn validate_url(url: &str) -> Result<String, ConsoleError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ConsoleError::InvalidConfig("URL is empty".to_string()));
    }
    if !url.starts_with("http") {
        return Err(ConsoleError::InvalidConfig(format!(
            "not a URL: {}",
            abbreviate(url, 100)
        )));
    }
    Ok(sanitize_url(url))
}

fn abbreviate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head = text.chars().take(max_chars.saturating_sub(3)).collect::<String>();
    format!("{head}…")
}

/// Drops share-tracking query parameters. `list` survives on playlist URLs.
pub fn sanitize_url(url: &str) -> String {
    let url = url.trim();
    let Some((base, rest)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };
    let keep_list = url.contains("playlist");

    let kept = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
            let tracking = TRACKING_PARAMS.contains(&key);
            !tracking || (keep_list && key == "list")
        })
        .collect::<Vec<_>>();

    let mut cleaned = base.to_string();
    if !kept.is_empty() {
        cleaned.push('?');
        cleaned.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        cleaned.push('#');
        cleaned.push_str(fragment);
    }
    cleaned
}
