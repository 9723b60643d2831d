//! Typed configuration, loaded once at startup from a JSON file and re-readable on admin
//! request. Mirrors the shape the original pixel-canvas server used (`General`, `Connection`,
//! `Visuals`, `Game`, `Backup`, `Timelapse`, `Frontend`, `Admin`, `Http`, `Logging`), kept as
//! separate nested structs so each concern can be unit tested and defaulted independently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::const_settings::DEFAULT_DELTA_REDIRECT_THRESHOLD;
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct General {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ports {
    pub socket: u16,
    pub api: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Connection {
    pub host: String,
    pub ports: Ports,
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsBar {
    pub enabled: bool,
    pub size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Visuals {
    pub size: Size,
    pub statsbar: StatsBar,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Godmode {
    pub enabled: bool,
    pub pps: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Game {
    pub pps: f64,
    pub godmode: Godmode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Backup {
    pub enabled: bool,
    pub interval: u64,
    pub directory: String,
    pub delete: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timelapse {
    pub enabled: bool,
    pub interval: u64,
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Display {
    pub enabled: bool,
    pub fps: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    pub enabled: bool,
    pub enable_admin: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sockets {
    pub enabled: bool,
    pub enable_admin: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Web {
    pub force_reload: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Frontend {
    pub display: Display,
    pub api: Api,
    pub sockets: Sockets,
    pub web: Web,
}

/// Admin credentials and bearer-token secret. Never hard-coded: loaded from config, with a
/// loudly-logged insecure default token used only when the config omits one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Admin {
    pub username: String,
    pub password: String,
    #[serde(default = "Admin::default_token")]
    pub token: String,
}

impl Admin {
    fn default_token() -> String {
        "development-only-token-change-me".to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "Http::default_threshold")]
    pub delta_redirect_threshold: usize,
}

impl Http {
    fn default_threshold() -> usize {
        DEFAULT_DELTA_REDIRECT_THRESHOLD
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub level: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub general: General,
    pub connection: Connection,
    pub visuals: Visuals,
    pub game: Game,
    pub backup: Backup,
    pub timelapse: Timelapse,
    pub frontend: Frontend,
    pub admin: Admin,
    #[serde(default = "Config::default_http")]
    pub http: Http,
    pub logging: Logging,
}

impl Config {
    fn default_http() -> Http {
        Http {
            delta_redirect_threshold: DEFAULT_DELTA_REDIRECT_THRESHOLD,
        }
    }

    /// Loads and validates a config file. Any I/O failure becomes `ConfigError::NoConfig`;
    /// any parse/shape failure becomes `ConfigError::MalformedConfig`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&path).map_err(|_| ConfigError::NoConfig {
            path: path.clone(),
        })?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|source| ConfigError::MalformedConfig { path, source })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.frontend.api.enabled && !self.frontend.sockets.enabled {
            return Err(ConfigError::NoFrontend);
        }
        if self.admin.token == Admin::default_token() {
            warn!(
                "admin.token not set in config; using an insecure development default. \
                 Set `admin.token` before exposing this server."
            );
        }
        Ok(())
    }
}

/// A fully-populated `Config` for other modules' unit tests, so they don't each hand-roll a
/// sample JSON document just to get a `DispatchContext`/`ServerContext` building.
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn sample() -> Config {
        Config {
            general: General {
                name: "test-canvas".to_string(),
                version: "0.1.0".to_string(),
            },
            connection: Connection {
                host: "0.0.0.0".to_string(),
                ports: Ports { socket: 1234, api: 8080 },
                timeout: 30,
            },
            visuals: Visuals {
                size: Size { width: 10, height: 10 },
                statsbar: StatsBar { enabled: false, size: 0 },
            },
            game: Game {
                pps: 30.0,
                godmode: Godmode { enabled: true, pps: 1000.0 },
            },
            backup: Backup {
                enabled: false,
                interval: 600,
                directory: "backups".to_string(),
                delete: 0,
            },
            timelapse: Timelapse {
                enabled: false,
                interval: 600,
                directory: "timelapses".to_string(),
            },
            frontend: Frontend {
                display: Display { enabled: false, fps: 1 },
                api: Api { enabled: true, enable_admin: true },
                sockets: Sockets { enabled: true, enable_admin: true },
                web: Web { force_reload: false },
            },
            admin: Admin {
                username: "admin".to_string(),
                password: "swordfish".to_string(),
                token: "secret-token".to_string(),
            },
            http: Http {
                delta_redirect_threshold: DEFAULT_DELTA_REDIRECT_THRESHOLD,
            },
            logging: Logging { level: 2 },
        }
    }
}
