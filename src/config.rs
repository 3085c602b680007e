//! Server configuration, loaded from TOML.
//!
//! ```toml
//! bind = "127.0.0.1:3000"
//! media_root = "client"
//! inverted_range = "clamp"
//!
//! [media]
//! party = "party.mp4"
//!
//! [content_types]
//! flac = "audio/flac"
//! ```

use std::collections::BTreeMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::router::MediaLibrary;
use crate::{ContentTypes, InvertedRange};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("media entry {name:?} must be a relative path inside the media root, got {}", path.display())]
    MediaPath { name: String, path: PathBuf },

    #[error("content type {value:?} for extension {extension:?} is not a valid MIME type")]
    ContentType { extension: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the server listens on.
    pub bind: SocketAddr,
    /// Directory the `media` entries are relative to.
    pub media_root: PathBuf,
    pub inverted_range: InvertedRange,
    /// Logical media name, as used in `/media/{name}`, to file path.
    pub media: BTreeMap<String, PathBuf>,
    /// Extra or overriding extension to MIME type entries.
    pub content_types: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let media = [("party", "party.mp4"), ("bling", "bling.mp3"), ("bird", "bird.mp4")]
            .into_iter()
            .map(|(name, file)| (name.to_string(), PathBuf::from(file)))
            .collect();

        Config {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            media_root: PathBuf::from("client"),
            inverted_range: InvertedRange::default(),
            media,
            content_types: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml(&content)
    }

    /// Load `path` if given, otherwise fall back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in &self.media {
            let escapes = path.as_os_str().is_empty()
                || path
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(ConfigError::MediaPath { name: name.clone(), path: path.clone() });
            }
        }
        self.content_types()?;
        Ok(())
    }

    /// The built-in content types extended with the `[content_types]` table.
    pub fn content_types(&self) -> Result<ContentTypes, ConfigError> {
        let mut types = ContentTypes::default();
        for (extension, value) in &self.content_types {
            let content_type = value.parse().map_err(|_| ConfigError::ContentType {
                extension: extension.clone(),
                value: value.clone(),
            })?;
            types.insert(extension, content_type);
        }
        Ok(types)
    }

    pub fn library(&self) -> MediaLibrary {
        let mut library = MediaLibrary::default();
        for (name, path) in &self.media {
            library.insert(name, self.media_root.join(path));
        }
        library
    }
}
