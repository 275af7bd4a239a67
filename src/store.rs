use jiff::civil::Date;
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::AUTHORIZATION,
    StatusCode,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{config::StoreConfig, picks::PickType, week::week_end};

pub const THEMES_TABLE: &str = "weekly_themes";
pub const PICKS_TABLE: &str = "music_picks";

/// Every historical link points to the same streaming service
pub const PLATFORM: &str = "Spotify";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response: {0}")]
    UnexpectedBody(String),
}

/// Payload for a new row in the weekly themes table
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewTheme {
    pub curator_id: String,
    pub week_start_date: Date,
    pub week_end_date: Date,
    pub is_active: bool,
}

impl NewTheme {
    /// Historical themes are never the active one.
    pub fn historical(week_start: Date, curator_id: &str) -> NewTheme {
        NewTheme {
            curator_id: curator_id.to_string(),
            week_start_date: week_start,
            week_end_date: week_end(week_start),
            is_active: false,
        }
    }
}

/// Payload for a new row in the music picks table
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewPick {
    pub user_id: String,
    pub weekly_theme_id: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub platform: String,
    pub platform_url: String,
    pub pick_type: PickType,
    pub album_artwork_url: Option<String>,
}

/// The two create operations the backfill needs, plus a lookup used to
/// avoid inserting a link twice.
pub trait PickStore {
    /// Create a theme and return the id the store assigned to it.
    fn create_theme(&self, theme: &NewTheme) -> Result<String, StoreError>;
    fn insert_pick(&self, pick: &NewPick) -> Result<(), StoreError>;
    fn pick_exists(&self, platform_url: &str) -> Result<bool, StoreError>;
}

/// Store reached over a PostgREST style http api.  The json body sets the
/// content type, the key goes in both `apikey` and `Authorization`.
pub struct RestStore {
    client: Client,
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> RestStore {
        RestStore {
            client: Client::new(),
            config,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
    }
}

impl PickStore for RestStore {
    fn create_theme(&self, theme: &NewTheme) -> Result<String, StoreError> {
        let builder = self
            .client
            .post(self.config.table_url(THEMES_TABLE))
            .header("Prefer", "return=representation")
            .json(theme);
        let response = check_status(self.authorized(builder).send()?)?;
        theme_id(response.json::<Value>()?)
    }

    fn insert_pick(&self, pick: &NewPick) -> Result<(), StoreError> {
        let builder = self
            .client
            .post(self.config.table_url(PICKS_TABLE))
            .json(pick);
        check_status(self.authorized(builder).send()?)?;
        Ok(())
    }

    fn pick_exists(&self, platform_url: &str) -> Result<bool, StoreError> {
        let builder = self.client.get(self.config.table_url(PICKS_TABLE)).query(&[
            ("platform_url", format!("eq.{}", platform_url)),
            ("select", "id".to_string()),
        ]);
        let response = check_status(self.authorized(builder).send()?)?;
        match response.json::<Value>()? {
            Value::Array(rows) => Ok(!rows.is_empty()),
            other => Err(StoreError::UnexpectedBody(other.to_string())),
        }
    }
}

/// Only 200 and 201 count as success.
fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if is_success(status) {
        Ok(response)
    } else {
        let body = response.text().unwrap_or_default();
        Err(StoreError::Status { status, body })
    }
}

pub fn is_success(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

/// The id of the created theme is in the first element of the returned
/// representation.  It can be a uuid or a number depending on the schema.
pub fn theme_id(representation: Value) -> Result<String, StoreError> {
    match representation.get(0).and_then(|row| row.get("id")) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(StoreError::UnexpectedBody(representation.to_string())),
    }
}
