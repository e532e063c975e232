use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SOURCE_URL: &str = "stub://webcam";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_ANALYSIS_URL: &str = "http://127.0.0.1:5000/process_frame";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_DELAY_MS: u64 = 200;
const DEFAULT_REFRESH_HZ: u32 = 60;
const DEFAULT_LABEL_SCALE: u32 = 5;
const MAX_REFRESH_HZ: u32 = 240;

#[derive(Debug, Deserialize, Default)]
struct MoodcamConfigFile {
    source: Option<SourceConfigFile>,
    analysis: Option<AnalysisConfigFile>,
    #[serde(rename = "loop")]
    capture_loop: Option<LoopConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalysisConfigFile {
    url: Option<String>,
    timeout_secs: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct LoopConfigFile {
    delay_ms: Option<u64>,
    refresh_hz: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    preview_path: Option<PathBuf>,
    label_scale: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MoodcamConfig {
    pub source: SourceSettings,
    pub analysis: AnalysisSettings,
    pub capture_loop: LoopSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub url: String,
    /// `None` waits on the analysis service indefinitely.
    pub timeout: Option<Duration>,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub delay: Duration,
    pub refresh_hz: u32,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub preview_path: Option<PathBuf>,
    pub label_scale: u32,
}

impl Default for MoodcamConfig {
    fn default() -> Self {
        Self::from_file(MoodcamConfigFile::default())
    }
}

impl MoodcamConfig {
    /// Load defaults, then the file named by `MOODCAM_CONFIG`, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("MOODCAM_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => MoodcamConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MoodcamConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let analysis = file.analysis.unwrap_or_default();
        let capture_loop = file.capture_loop.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        Self {
            source: SourceSettings {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            analysis: AnalysisSettings {
                url: analysis
                    .url
                    .unwrap_or_else(|| DEFAULT_ANALYSIS_URL.to_string()),
                timeout: timeout_from_secs(analysis.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                jpeg_quality: analysis.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            capture_loop: LoopSettings {
                delay: Duration::from_millis(capture_loop.delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
                refresh_hz: capture_loop.refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ),
            },
            display: DisplaySettings {
                preview_path: display.preview_path,
                label_scale: display.label_scale.unwrap_or(DEFAULT_LABEL_SCALE),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("MOODCAM_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(url) = std::env::var("MOODCAM_ANALYSIS_URL") {
            if !url.trim().is_empty() {
                self.analysis.url = url;
            }
        }
        if let Ok(delay) = std::env::var("MOODCAM_DELAY_MS") {
            let ms: u64 = delay
                .parse()
                .map_err(|_| anyhow!("MOODCAM_DELAY_MS must be an integer number of milliseconds"))?;
            self.capture_loop.delay = Duration::from_millis(ms);
        }
        if let Ok(timeout) = std::env::var("MOODCAM_TIMEOUT_SECS") {
            let secs: u64 = timeout
                .parse()
                .map_err(|_| anyhow!("MOODCAM_TIMEOUT_SECS must be an integer number of seconds"))?;
            self.analysis.timeout = timeout_from_secs(secs);
        }
        if let Ok(path) = std::env::var("MOODCAM_PREVIEW_PATH") {
            if !path.trim().is_empty() {
                self.display.preview_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.analysis.url.trim().is_empty() {
            return Err(anyhow!("analysis url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "source size {}x{} must be non-zero",
                self.source.width,
                self.source.height
            ));
        }
        if !(1..=100).contains(&self.analysis.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be between 1 and 100"));
        }
        if !(1..=MAX_REFRESH_HZ).contains(&self.capture_loop.refresh_hz) {
            return Err(anyhow!(
                "refresh rate must be between 1 and {} Hz",
                MAX_REFRESH_HZ
            ));
        }
        if self.display.label_scale == 0 {
            return Err(anyhow!("label scale must be greater than zero"));
        }
        Ok(())
    }
}

/// Zero seconds disables the timeout.
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn read_config_file(path: &Path) -> Result<MoodcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
