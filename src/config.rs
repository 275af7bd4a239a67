use std::{env, path::Path};

use log::{info, warn};

pub const STORE_URL_VAR: &str = "SUPABASE_URL";
pub const STORE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Where the weekly themes and the picks get written to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base url of the store, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    /// Service level key, sent both as `apikey` and as a bearer token
    pub api_key: String,
}

impl StoreConfig {
    pub fn new(base_url: &str, api_key: &str) -> StoreConfig {
        StoreConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Read the store settings from the environment.  Missing values are
    /// only warned about, the requests to the store will fail later.
    pub fn from_env() -> StoreConfig {
        let base_url = env::var(STORE_URL_VAR).unwrap_or_else(|_| {
            warn!("{} is not set", STORE_URL_VAR);
            String::new()
        });
        let api_key = env::var(STORE_KEY_VAR).unwrap_or_else(|_| {
            warn!("{} is not set", STORE_KEY_VAR);
            String::new()
        });
        StoreConfig::new(&base_url, &api_key)
    }

    /// Url of a table endpoint, e.g. `<base>/rest/v1/music_picks`
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

/// Load the `.env/<env>.env` file into the process environment, if there is
/// one.  Variables already set are not overwritten.
pub fn load_env_file(env_name: &str) {
    let path = format!(".env/{}.env", env_name);
    match dotenvy::from_path(Path::new(&path)) {
        Ok(_) => info!("Loaded environment from {}", path),
        Err(e) => info!("No environment file loaded from {}: {}", path, e),
    }
}
