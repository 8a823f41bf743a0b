use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

// Saved session credentials: API base URL plus the bearer token, stored
// under the user's config directory. The token is base64-encoded on disk,
// which keeps it out of casual greps but is not encryption.

#[derive(Serialize, Deserialize, Clone)]
pub struct Credentials {
    pub api_base: String,
    #[serde(default)]
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl Credentials {
    pub fn new(api_base: &str, username: &str, token: &str) -> Self {
        Credentials {
            api_base: api_base.to_string(),
            username: username.to_string(),
            token: Some(BASE64.encode(token)),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.as_ref().and_then(|encoded| {
            let bytes = BASE64.decode(encoded).ok()?;
            String::from_utf8(bytes).ok()
        })
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("amity");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("credentials.json"))
}

pub fn save_credentials(credentials: &Credentials) -> Result<()> {
    save_credentials_to(credentials, &config_path()?)
}

pub fn load_credentials() -> Result<Option<Credentials>> {
    load_credentials_from(&config_path()?)
}

pub fn save_credentials_to(credentials: &Credentials, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, credentials)?;

    info!("Credentials saved for {}", credentials.api_base);
    Ok(())
}

pub fn load_credentials_from(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let credentials: Credentials = serde_json::from_str(&contents)?;
    info!(
        "Loaded credentials for {} from {}",
        credentials.api_base,
        path.display()
    );

    Ok(Some(credentials))
}
