/// Runtime configuration read from the environment (and `.env`).
use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::DEFAULT_LOGIN_ATTEMPTS;
use crate::errors::{LecternError, LecternResult};
use crate::register::PersistMode;

pub const DEFAULT_LOGIN_URL: &str = "https://login.adelaide.edu.au";
pub const DEFAULT_MEDIA_URL: &str = "https://mymedia.adelaide.edu.au";
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
const MIN_CHUNK_SIZE: usize = 1024;

/// Settings shared by the harvester and downloader binaries.
#[derive(Debug, Clone)]
pub struct Config {
    pub register_path: PathBuf,
    pub lecture_dir: PathBuf,
    pub login_url: String,
    pub media_url: String,
    pub chunk_size: usize,
    pub persist_mode: PersistMode,
    pub resume_partial: bool,
    pub refresh_links: bool,
    pub assume_yes: bool,
    pub max_login_attempts: u32,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> LecternResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the raw value of a key.
    pub fn from_lookup<F>(lookup: F) -> LecternResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let chunk_size: usize = parse_or(&get, "LECTERN_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(LecternError::Config(format!(
                "LECTERN_CHUNK_SIZE must be at least {} bytes",
                MIN_CHUNK_SIZE
            )));
        }

        let persist_mode = match get("LECTERN_PERSIST") {
            Some(raw) => raw
                .parse::<PersistMode>()
                .map_err(|e| LecternError::Config(format!("LECTERN_PERSIST: {}", e)))?,
            None => PersistMode::default(),
        };

        Ok(Self {
            register_path: PathBuf::from(get("LECTERN_REGISTER").unwrap_or_else(|| "register.json".into())),
            lecture_dir: PathBuf::from(get("LECTERN_LECTURE_DIR").unwrap_or_else(|| "lectures".into())),
            login_url: trim_url(get("LECTERN_LOGIN_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.into())),
            media_url: trim_url(get("LECTERN_MEDIA_URL").unwrap_or_else(|| DEFAULT_MEDIA_URL.into())),
            chunk_size,
            persist_mode,
            resume_partial: parse_flag(&get, "LECTERN_RESUME", true)?,
            refresh_links: parse_flag(&get, "LECTERN_REFRESH_LINKS", false)?,
            assume_yes: parse_flag(&get, "LECTERN_ASSUME_YES", false)?,
            max_login_attempts: parse_or(&get, "LECTERN_MAX_LOGIN_ATTEMPTS", DEFAULT_LOGIN_ATTEMPTS)?.max(1),
            username: get("LECTERN_USERNAME"),
            password: lookup("LECTERN_PASSWORD").filter(|v| !v.is_empty()),
        })
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, LecternError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| LecternError::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_flag<G>(get: &G, key: &str, default: bool) -> Result<bool, LecternError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(LecternError::Config(format!("{}='{}' is not a boolean", key, v))),
    }
}
