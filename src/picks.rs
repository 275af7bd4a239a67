use jiff::civil::DateTime;
use serde::{Deserialize, Serialize};

/// A pick as it comes out of a source reader, nothing parsed yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPick {
    pub timestamp: String,
    pub person: String,
    pub pick_type: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pick {
    pub timestamp: DateTime,
    pub person: String,
    pub pick_type: PickType,
    pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickType {
    Track,
    Album,
}

impl std::str::FromStr for PickType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "track" => Ok(PickType::Track),
            "album" => Ok(PickType::Album),
            _ => Err(format!("Failed to parse {s} as PickType")),
        }
    }
}

impl std::fmt::Display for PickType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PickType::Track => write!(f, "track"),
            PickType::Album => write!(f, "album"),
        }
    }
}

/// The curator of a week is the person who posted the first album.  If
/// nobody posted an album, it's the person with the first pick of the week.
/// Return `None` only for an empty week.
pub fn resolve_curator(picks: &[Pick]) -> Option<&str> {
    picks
        .iter()
        .find(|p| p.pick_type == PickType::Album)
        .or_else(|| picks.first())
        .map(|p| p.person.as_str())
}
