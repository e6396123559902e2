// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use serde::de::DeserializeOwned;
use std::{fs, io, path::Path};
use thiserror::Error;
use tracing::{info, warn};

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Reads and parses a TOML config file. `Ok(None)` when the file does not exist.
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    toml::from_str::<T>(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
}

/// Missing file → defaults. Unreadable or malformed file → warning + defaults.
pub fn load_config_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_config::<T>(path) {
        Ok(Some(cfg)) => {
            info!("config loaded from {}", path.display());
            cfg
        }
        Ok(None) => T::default(),
        Err(e) => {
            warn!("{e}; using defaults");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::path::PathBuf;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    #[serde(default)]
    struct Sample {
        frames: u32,
        name: String,
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pacer-core-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_file_is_none() {
        let got = read_config::<Sample>(&scratch("does-not-exist.toml")).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = scratch("partial.toml");
        fs::write(&path, "frames = 3\n").unwrap();
        let got: Sample = load_config_or_default(&path);
        fs::remove_file(&path).ok();
        assert_eq!(
            got,
            Sample {
                frames: 3,
                name: String::new()
            }
        );
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let path = scratch("bad.toml");
        fs::write(&path, "frames = [[[").unwrap();
        let err = read_config::<Sample>(&path).unwrap_err();
        let fallback: Sample = load_config_or_default(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(fallback, Sample::default());
    }

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
