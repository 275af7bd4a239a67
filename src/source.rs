use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    str::FromStr,
};

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use thiserror::Error;

use crate::{metadata::extract_link_id, picks::RawPick};

lazy_static! {
    /// `[12/15/23, 8:57:33 AM] Neil Tilston: message`
    static ref CHAT_LINE: Regex = Regex::new(
        r"^\[(\d{1,2}/\d{1,2}/\d{2}, \d{1,2}:\d{2}:\d{2}[ \x{202F}][AaPp][Mm])\] ([^:]+): (.*)$"
    )
    .unwrap();
    static ref STREAMING_LINK: Regex =
        Regex::new(r"https?://open\.spotify\.com/(?:intl-[a-z]+/)?(?:track|album)/[A-Za-z0-9]+[^\s)]*").unwrap();
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse csv source: {0}")]
    Csv(#[from] csv::Error),
}

/// Layout of the historical log
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    /// Headered csv with columns `timestamp,person,pick_type,url`
    Csv,
    /// Exported group chat, one message per line
    Chat,
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "chat" => Ok(SourceFormat::Chat),
            _ => Err(format!("Failed to parse {s} as SourceFormat")),
        }
    }
}

pub fn read_picks(path: &Path, format: SourceFormat) -> Result<Vec<RawPick>, SourceError> {
    let file = File::open(path)?;
    match format {
        SourceFormat::Csv => read_csv_picks(file),
        SourceFormat::Chat => read_chat_export(BufReader::new(file)),
    }
}

/// Read the picks from a csv table.  Extra columns are ignored, short rows
/// and rows that aren't valid utf-8 are skipped with a warning.
pub fn read_csv_picks<R: Read>(reader: R) -> Result<Vec<RawPick>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut picks = Vec::new();
    for record in rdr.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if !e.is_io_error() => {
                warn!("Skipping unreadable row: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if record.len() < 4 {
            warn!("Skipping short row {:?}", record);
            continue;
        }
        picks.push(RawPick {
            timestamp: record[0].to_string(),
            person: record[1].to_string(),
            pick_type: record[2].to_string(),
            url: record[3].to_string(),
        });
    }
    Ok(picks)
}

/// Read the picks from a chat export.  Each track or album link in a message
/// is a pick by the sender, the pick type is the kind of the link.  Lines
/// which are not messages (continuations, system notices) are ignored, lines
/// which are not valid utf-8 are skipped with a warning.
pub fn read_chat_export<R: BufRead>(reader: R) -> Result<Vec<RawPick>, SourceError> {
    let mut picks = Vec::new();
    for bytes in reader.split(b'\n') {
        let line = match String::from_utf8(bytes?) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping line which is not valid utf-8: {}", e);
                continue;
            }
        };
        let line = line
            .trim_end_matches('\r')
            .trim_start_matches(['\u{200e}', '\u{feff}']);
        let Some(caps) = CHAT_LINE.captures(line) else {
            continue;
        };
        for link in STREAMING_LINK.find_iter(&caps[3]) {
            let Some(link_id) = extract_link_id(link.as_str()) else {
                continue;
            };
            picks.push(RawPick {
                timestamp: caps[1].to_string(),
                person: caps[2].trim().to_string(),
                pick_type: link_id.kind.to_string(),
                url: link.as_str().to_string(),
            });
        }
    }
    Ok(picks)
}
