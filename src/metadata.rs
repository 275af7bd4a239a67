use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{blocking::Client, header::USER_AGENT};
use thiserror::Error;

use crate::picks::PickType;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// How long to wait for a preview page before giving up
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    static ref OG_TITLE: Regex = Regex::new(r#"<meta property="og:title" content="([^"]+)""#).unwrap();
    static ref OG_IMAGE: Regex = Regex::new(r#"<meta property="og:image" content="([^"]+)""#).unwrap();
    static ref LINK_ID: Regex = Regex::new(r"/(track|album)/([a-zA-Z0-9]+)").unwrap();
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Display metadata for a pick.  Empty strings when unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Album or track name
    pub name: String,
    pub artist: String,
    pub artwork_url: Option<String>,
}

pub trait MetadataSource {
    fn fetch(&self, url: &str) -> Result<TrackMetadata, FetchError>;
}

/// Get display metadata by reading the Open Graph tags of the link's page.
pub struct OpenGraphFetcher {
    client: Client,
}

impl OpenGraphFetcher {
    pub fn new() -> Result<OpenGraphFetcher, reqwest::Error> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(OpenGraphFetcher { client })
    }
}

impl MetadataSource for OpenGraphFetcher {
    fn fetch(&self, url: &str) -> Result<TrackMetadata, FetchError> {
        let html = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()?
            .text()?;
        Ok(parse_metadata(&html))
    }
}

/// Extract the metadata from the html of a preview page.  Missing tags are
/// not an error, the corresponding fields are left empty.
pub fn parse_metadata(html: &str) -> TrackMetadata {
    let (title, image) = extract_og_tags(html);
    let (name, artist) = match title {
        Some(title) => split_title(&title),
        None => (String::new(), String::new()),
    };
    TrackMetadata {
        name,
        artist,
        artwork_url: image,
    }
}

/// Content of the `og:title` and `og:image` meta tags
pub fn extract_og_tags(html: &str) -> (Option<String>, Option<String>) {
    (first_capture(&OG_TITLE, html), first_capture(&OG_IMAGE, html))
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|c| c[1].to_string())
}

/// Split a preview title into `(name, artist)`.
///
/// Titles come either as `Name · Artist` or as `Artist - Name`.  Anything
/// else is taken to be the name alone.
pub fn split_title(title: &str) -> (String, String) {
    if title.contains(" · ") {
        let mut parts = title.split(" · ");
        let name = parts.next().unwrap_or_default().trim().to_string();
        let artist = parts.next().unwrap_or_default().trim().to_string();
        (name, artist)
    } else if let Some((artist, name)) = title.split_once(" - ") {
        (name.trim().to_string(), artist.trim().to_string())
    } else {
        (title.to_string(), String::new())
    }
}

/// Platform identifier of a track or album link
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkId {
    pub kind: PickType,
    pub id: String,
}

/// Pull the kind and id out of a link like
/// `https://open.spotify.com/album/1NAmidJlEaVgA3MpcPFYGq?si=...`
pub fn extract_link_id(url: &str) -> Option<LinkId> {
    let caps = LINK_ID.captures(url)?;
    let kind = caps[1].parse::<PickType>().ok()?;
    Some(LinkId {
        kind,
        id: caps[2].to_string(),
    })
}
