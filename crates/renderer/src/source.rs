use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ResourceLoadError;
use crate::types::ShaderPaths;

/// Shader text read from disk, bounded by a byte ceiling.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    path: PathBuf,
    text: String,
}

impl ShaderSource {
    /// Reads the whole file at `path`, refusing anything above `max_bytes`.
    pub fn load(path: &Path, max_bytes: usize) -> Result<Self, ResourceLoadError> {
        let metadata = fs::metadata(path).map_err(|err| io_error(path, err))?;
        if metadata.len() > max_bytes as u64 {
            return Err(ResourceLoadError::TooLarge {
                path: path.to_path_buf(),
                len: metadata.len(),
                limit: max_bytes,
            });
        }

        let text = fs::read_to_string(path).map_err(|err| io_error(path, err))?;
        // The file may have grown between the two calls.
        if text.len() > max_bytes {
            return Err(ResourceLoadError::TooLarge {
                path: path.to_path_buf(),
                len: text.len() as u64,
                limit: max_bytes,
            });
        }
        if text.trim().is_empty() {
            return Err(ResourceLoadError::Empty {
                path: path.to_path_buf(),
            });
        }

        let source = Self {
            path: path.to_path_buf(),
            text,
        };
        info!(path = %path.display(), bytes = source.text.len(), "loaded shader source");
        debug!(
            path = %path.display(),
            version = source.version_directive().unwrap_or("<none>"),
            "shader version directive"
        );
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the argument of the leading `#version` directive, if any.
    pub fn version_directive(&self) -> Option<&str> {
        self.text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with("//"))
            .and_then(|line| line.strip_prefix("#version"))
            .map(str::trim)
    }
}

/// Every shader file a run needs, read up front so a missing file fails
/// before any window or device exists.
#[derive(Debug, Clone)]
pub struct PipelineSources {
    pub kernel: ShaderSource,
    pub vertex: Option<ShaderSource>,
    pub fragment: Option<ShaderSource>,
}

impl PipelineSources {
    pub fn load(paths: &ShaderPaths, max_bytes: usize) -> Result<Self, ResourceLoadError> {
        let optional = |path: &Option<PathBuf>| {
            path.as_deref()
                .map(|path| ShaderSource::load(path, max_bytes))
                .transpose()
        };
        Ok(Self {
            kernel: ShaderSource::load(&paths.kernel, max_bytes)?,
            vertex: optional(&paths.vertex)?,
            fragment: optional(&paths.fragment)?,
        })
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ResourceLoadError {
    if err.kind() == ErrorKind::NotFound {
        ResourceLoadError::Missing {
            path: path.to_path_buf(),
        }
    } else {
        ResourceLoadError::Unreadable {
            path: path.to_path_buf(),
            source: err,
        }
    }
}
