use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Size of the fixed source buffer the reference benchmark compiled shaders from.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 16 * 1024;
pub const DEFAULT_FRAME_BUDGET: u64 = 1024;
pub const DEFAULT_TIME_STEP: f32 = 0.01;
pub const DEFAULT_IMAGE_SIZE: u32 = 512;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when a compute dispatch is handed a program that cannot run it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchPolicy {
    /// Treat the dispatch as a fatal programming error.
    #[default]
    Fail,
    /// Log and skip the dispatch, but only in release builds.
    SkipInRelease,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_frame_budget")]
    pub frame_budget: u64,
    #[serde(default = "default_time_step")]
    pub time_step: f32,
    #[serde(default = "default_true")]
    pub vsync: bool,
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
    #[serde(default)]
    pub image: ImageSection,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub shaders: ShaderSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSection {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderSection {
    #[serde(default = "default_kernel")]
    pub kernel: PathBuf,
    /// Optional replacement for the built-in blit vertex stage.
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    /// Optional replacement for the built-in blit fragment stage.
    #[serde(default)]
    pub fragment: Option<PathBuf>,
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

fn default_frame_budget() -> u64 {
    DEFAULT_FRAME_BUDGET
}

fn default_time_step() -> f32 {
    DEFAULT_TIME_STEP
}

fn default_true() -> bool {
    true
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_title() -> String {
    "Compute Shader Test".to_string()
}

fn default_kernel() -> PathBuf {
    PathBuf::from("shaders/ao.comp")
}

fn default_max_source_bytes() -> usize {
    DEFAULT_MAX_SOURCE_BYTES
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
        }
    }
}

impl Default for ShaderSection {
    fn default() -> Self {
        Self {
            kernel: default_kernel(),
            vertex: None,
            fragment: None,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frame_budget: DEFAULT_FRAME_BUDGET,
            time_step: DEFAULT_TIME_STEP,
            vsync: true,
            mismatch_policy: MismatchPolicy::default(),
            image: ImageSection::default(),
            window: WindowSection::default(),
            shaders: ShaderSection::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RunConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates the TOML file at `path`.
    ///
    /// Relative shader paths inside the file are resolved against the file's
    /// directory so a config can travel together with its kernels.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.shaders.rebase(base);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_budget == 0 {
            return Err(ConfigError::Invalid(
                "frame_budget must be greater than zero".into(),
            ));
        }

        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "time_step must be a finite, positive number (got {})",
                self.time_step
            )));
        }

        if self.image.width == 0 || self.image.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "image size must be non-zero (got {}x{})",
                self.image.width, self.image.height
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero (got {}x{})",
                self.window.width, self.window.height
            )));
        }

        if self.shaders.kernel.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("shaders.kernel may not be empty".into()));
        }

        if self.shaders.max_source_bytes == 0 {
            return Err(ConfigError::Invalid(
                "shaders.max_source_bytes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

impl ShaderSection {
    fn rebase(&mut self, base: &Path) {
        self.kernel = rebase_path(base, &self.kernel);
        self.vertex = self.vertex.as_deref().map(|path| rebase_path(base, path));
        self.fragment = self.fragment.as_deref().map(|path| rebase_path(base, path));
    }
}

fn rebase_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parses a `WIDTHxHEIGHT` string such as `512x512`.
pub fn parse_size(value: &str) -> Result<(u32, u32), ConfigError> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| ConfigError::Invalid(format!("size '{trimmed}' must look like WIDTHxHEIGHT")))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid width in size '{trimmed}'")))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid height in size '{trimmed}'")))?;
    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid(format!(
            "size '{trimmed}' must be non-zero in both dimensions"
        )));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
frame_budget = 256
time_step = 0.02
vsync = false
mismatch_policy = "skip-in-release"

[image]
width = 256
height = 128

[window]
title = "bench"
width = 800
height = 600

[shaders]
kernel = "kernels/ao.comp"
fragment = "blit.frag"
max_source_bytes = 32768
"#;

    #[test]
    fn parses_sample_config() {
        let config = RunConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.frame_budget, 256);
        assert!((config.time_step - 0.02).abs() < f32::EPSILON);
        assert!(!config.vsync);
        assert_eq!(config.mismatch_policy, MismatchPolicy::SkipInRelease);
        assert_eq!((config.image.width, config.image.height), (256, 128));
        assert_eq!(config.window.title, "bench");
        assert_eq!(config.shaders.kernel, PathBuf::from("kernels/ao.comp"));
        assert_eq!(config.shaders.vertex, None);
        assert_eq!(config.shaders.fragment, Some(PathBuf::from("blit.frag")));
        assert_eq!(config.shaders.max_source_bytes, 32768);
    }

    #[test]
    fn empty_config_uses_reference_defaults() {
        let config = RunConfig::from_toml_str("").expect("empty config");
        assert_eq!(config.frame_budget, 1024);
        assert_eq!((config.image.width, config.image.height), (512, 512));
        assert_eq!(config.shaders.max_source_bytes, 16384);
        assert_eq!(config.mismatch_policy, MismatchPolicy::Fail);
        assert!(config.vsync);
    }

    #[test]
    fn rejects_zero_budget() {
        let err = RunConfig::from_toml_str("frame_budget = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_image() {
        let err = RunConfig::from_toml_str("[image]\nwidth = 0\nheight = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_time_that_does_not_advance() {
        for step in ["0.0", "-0.01"] {
            let err = RunConfig::from_toml_str(&format!("time_step = {step}\n")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("time_step")));
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = RunConfig::from_toml_str("frames = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_rebases_relative_shader_paths() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        let path = dir.join("aoquad.toml");
        fs::write(&path, "[shaders]\nkernel = \"fill.comp\"\nvertex = \"/abs/blit.vert\"\n").unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.shaders.kernel, dir.join("fill.comp"));
        assert_eq!(config.shaders.vertex, Some(PathBuf::from("/abs/blit.vert")));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = RunConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("512x256").unwrap(), (512, 256));
        assert_eq!(parse_size(" 4X4 ").unwrap(), (4, 4));
        assert!(parse_size("0x4").is_err());
        assert!(parse_size("512").is_err());
        assert!(parse_size("axb").is_err());
    }
}
