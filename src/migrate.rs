use std::collections::{BTreeMap, HashSet};

use jiff::civil::Date;
use log::{error, info, warn};

use crate::{
    directory::UserDirectory,
    metadata::{extract_link_id, MetadataSource, TrackMetadata},
    picks::{resolve_curator, Pick},
    store::{NewPick, NewTheme, PickStore, PLATFORM},
    week::week_end,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Don't insert a link that is already in the store, or that was already
    /// inserted earlier in this run.
    pub skip_existing: bool,
}

/// What happened during a run.  Skips and failures are not fatal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub themes_created: usize,
    pub weeks_skipped: usize,
    pub picks_inserted: usize,
    pub picks_failed: usize,
    pub picks_skipped: usize,
}

/// One row of the dry run table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeekPlan {
    pub week_start: Date,
    pub week_end: Date,
    pub curator: String,
    pub curator_id: Option<String>,
    pub pick_count: usize,
}

/// Resolve the curator of every week without touching the network.
pub fn plan(weeks: &BTreeMap<Date, Vec<Pick>>, directory: &UserDirectory) -> Vec<WeekPlan> {
    weeks
        .iter()
        .map(|(start, picks)| {
            let curator = resolve_curator(picks).unwrap_or_default().to_string();
            WeekPlan {
                week_start: *start,
                week_end: week_end(*start),
                curator_id: directory.user_id(&curator).map(|id| id.to_string()),
                curator,
                pick_count: picks.len(),
            }
        })
        .collect()
}

/// Write the weeks into the store, one theme per week and one row per pick.
pub struct Migration<'a, M: MetadataSource, S: PickStore> {
    directory: &'a UserDirectory,
    metadata: &'a M,
    store: &'a S,
    options: MigrationOptions,
    seen: HashSet<String>,
}

impl<'a, M: MetadataSource, S: PickStore> Migration<'a, M, S> {
    pub fn new(
        directory: &'a UserDirectory,
        metadata: &'a M,
        store: &'a S,
        options: MigrationOptions,
    ) -> Self {
        Migration {
            directory,
            metadata,
            store,
            options,
            seen: HashSet::new(),
        }
    }

    /// Process the weeks in chronological order.  A week whose curator is
    /// unknown or whose theme can't be created is skipped entirely, a pick
    /// that can't be written is skipped on its own.
    pub fn run(&mut self, weeks: &BTreeMap<Date, Vec<Pick>>) -> RunReport {
        let mut report = RunReport::default();
        for (week_start, picks) in weeks {
            let Some(theme_id) = self.create_theme(*week_start, picks) else {
                report.weeks_skipped += 1;
                report.picks_skipped += picks.len();
                continue;
            };
            report.themes_created += 1;
            info!("Created theme for week of {}", week_start);

            for pick in picks {
                match self.insert_pick(&theme_id, pick) {
                    PickOutcome::Inserted => report.picks_inserted += 1,
                    PickOutcome::Failed => report.picks_failed += 1,
                    PickOutcome::Skipped => report.picks_skipped += 1,
                }
            }
        }
        report
    }

    fn create_theme(&self, week_start: Date, picks: &[Pick]) -> Option<String> {
        let curator = resolve_curator(picks)?;
        let Some(curator_id) = self.directory.user_id(curator) else {
            warn!("Unknown curator: {}", curator);
            return None;
        };
        match self.store.create_theme(&NewTheme::historical(week_start, curator_id)) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Error creating theme: {}", e);
                error!("Failed to create theme for week {}", week_start);
                None
            }
        }
    }

    fn insert_pick(&mut self, theme_id: &str, pick: &Pick) -> PickOutcome {
        let Some(user_id) = self.directory.user_id(&pick.person) else {
            warn!("  Unknown user: {}", pick.person);
            return PickOutcome::Skipped;
        };
        if self.options.skip_existing && self.already_present(&pick.url) {
            info!("  Skip existing: {}", pick.url);
            return PickOutcome::Skipped;
        }

        let metadata = self.metadata.fetch(&pick.url).unwrap_or_else(|e| {
            error!("Error fetching metadata for {}: {}", pick.url, e);
            TrackMetadata::default()
        });
        let row = NewPick {
            user_id: user_id.to_string(),
            weekly_theme_id: theme_id.to_string(),
            title: metadata.name.clone(),
            album: metadata.name,
            artist: metadata.artist,
            platform: PLATFORM.to_string(),
            platform_url: pick.url.clone(),
            pick_type: pick.pick_type,
            album_artwork_url: metadata.artwork_url,
        };
        match self.store.insert_pick(&row) {
            Ok(()) => {
                self.seen.insert(dedup_key(&pick.url));
                info!("  Inserted {} by {}: {}", pick.pick_type, pick.person, row.album);
                PickOutcome::Inserted
            }
            Err(e) => {
                error!("Error inserting pick: {}", e);
                error!("  Failed to insert pick for {}", pick.person);
                PickOutcome::Failed
            }
        }
    }

    /// Check the link against what this run already inserted, then against
    /// the store.  If the store can't be asked, assume the link is new.
    fn already_present(&self, url: &str) -> bool {
        if self.seen.contains(&dedup_key(url)) {
            return true;
        }
        match self.store.pick_exists(url) {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Could not check for existing pick {}: {}", url, e);
                false
            }
        }
    }
}

enum PickOutcome {
    Inserted,
    Failed,
    Skipped,
}

/// Two links to the same album or track share a key, whatever their query
/// string.  Links without a recognizable id are compared without their
/// query string and trailing slashes.
pub fn dedup_key(url: &str) -> String {
    match extract_link_id(url) {
        Some(link) => format!("{}:{}", link.kind, link.id),
        None => url
            .split('?')
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use jiff::civil::date;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        directory::Member,
        metadata::FetchError,
        picks::{PickType, RawPick},
        store::StoreError,
        week::group_by_week,
    };

    /// Serves canned metadata, urls listed in `broken` fail
    #[derive(Default)]
    struct FakeMetadata {
        titles: HashMap<String, TrackMetadata>,
        broken: Vec<String>,
    }

    impl MetadataSource for FakeMetadata {
        fn fetch(&self, url: &str) -> Result<TrackMetadata, FetchError> {
            if self.broken.iter().any(|u| u == url) {
                // a request to a closed port gives a genuine reqwest error
                let e = reqwest::blocking::get("http://127.0.0.1:1/").unwrap_err();
                return Err(FetchError::Http(e));
            }
            Ok(self.titles.get(url).cloned().unwrap_or_default())
        }
    }

    /// Records what gets written.  Writes whose number is in `fail_*` fail.
    #[derive(Default)]
    struct FakeStore {
        themes: RefCell<Vec<NewTheme>>,
        picks: RefCell<Vec<NewPick>>,
        existing: Vec<String>,
        fail_themes: Vec<usize>,
        fail_picks: Vec<usize>,
        pick_attempts: RefCell<usize>,
    }

    fn rejected() -> StoreError {
        StoreError::Status {
            status: StatusCode::BAD_REQUEST,
            body: "{\"message\":\"rejected\"}".to_string(),
        }
    }

    impl PickStore for FakeStore {
        fn create_theme(&self, theme: &NewTheme) -> Result<String, StoreError> {
            self.themes.borrow_mut().push(theme.clone());
            let n = self.themes.borrow().len();
            if self.fail_themes.contains(&n) {
                return Err(rejected());
            }
            Ok(format!("theme-{}", n))
        }

        fn insert_pick(&self, pick: &NewPick) -> Result<(), StoreError> {
            *self.pick_attempts.borrow_mut() += 1;
            let attempt = *self.pick_attempts.borrow();
            if self.fail_picks.contains(&attempt) {
                return Err(rejected());
            }
            self.picks.borrow_mut().push(pick.clone());
            Ok(())
        }

        fn pick_exists(&self, platform_url: &str) -> Result<bool, StoreError> {
            Ok(self.existing.iter().any(|u| u == platform_url))
        }
    }

    fn directory() -> UserDirectory {
        UserDirectory::new(vec![
            Member {
                name: "Alice".to_string(),
                id: "id-alice".to_string(),
                aliases: vec![],
            },
            Member {
                name: "Bob".to_string(),
                id: "id-bob".to_string(),
                aliases: vec![],
            },
        ])
    }

    fn raw(timestamp: &str, person: &str, pick_type: &str, url: &str) -> RawPick {
        RawPick {
            timestamp: timestamp.to_string(),
            person: person.to_string(),
            pick_type: pick_type.to_string(),
            url: url.to_string(),
        }
    }

    fn metadata() -> FakeMetadata {
        let mut titles = HashMap::new();
        titles.insert(
            "https://open.spotify.com/album/a1".to_string(),
            TrackMetadata {
                name: "Midnights".to_string(),
                artist: "Taylor Swift".to_string(),
                artwork_url: Some("https://img/a1.jpg".to_string()),
            },
        );
        titles.insert(
            "https://open.spotify.com/track/t1".to_string(),
            TrackMetadata {
                name: "Anti-Hero".to_string(),
                artist: "Taylor Swift".to_string(),
                artwork_url: None,
            },
        );
        FakeMetadata {
            titles,
            broken: vec![],
        }
    }

    #[test]
    fn one_week_two_picks() {
        let weeks = group_by_week(vec![
            raw("12/12/23, 9:00:00 AM", "Bob", "track", "https://open.spotify.com/track/t1"),
            raw("12/14/23, 6:30:00 PM", "Alice", "album", "https://open.spotify.com/album/a1"),
        ]);
        let directory = directory();
        let metadata = metadata();
        let store = FakeStore::default();
        let report =
            Migration::new(&directory, &metadata, &store, MigrationOptions::default()).run(&weeks);

        assert_eq!(report.themes_created, 1);
        assert_eq!(report.picks_inserted, 2);
        let themes = store.themes.borrow();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0], NewTheme::historical(date(2023, 12, 11), "id-alice"));

        let picks = store.picks.borrow();
        assert_eq!(picks.len(), 2);
        assert!(picks.iter().all(|p| p.weekly_theme_id == "theme-1"));
        assert_eq!(picks[0].user_id, "id-bob");
        assert_eq!(picks[0].pick_type, PickType::Track);
        assert_eq!(picks[0].title, "Anti-Hero");
        assert_eq!(picks[0].album, "Anti-Hero");
        assert_eq!(picks[1].user_id, "id-alice");
        assert_eq!(picks[1].artist, "Taylor Swift");
        assert_eq!(picks[1].platform, "Spotify");
        assert_eq!(picks[1].album_artwork_url.as_deref(), Some("https://img/a1.jpg"));
    }

    #[test]
    fn failed_pick_does_not_stop_the_run() {
        let weeks = group_by_week(vec![
            raw("12/12/23, 9:00:00 AM", "Alice", "album", "https://open.spotify.com/album/a1"),
            raw("12/13/23, 9:00:00 AM", "Bob", "track", "https://open.spotify.com/track/t1"),
            raw("12/19/23, 9:00:00 AM", "Bob", "album", "https://open.spotify.com/album/a2"),
        ]);
        let directory = directory();
        let metadata = metadata();
        let store = FakeStore {
            fail_picks: vec![2],
            ..Default::default()
        };
        let report =
            Migration::new(&directory, &metadata, &store, MigrationOptions::default()).run(&weeks);

        assert_eq!(report.themes_created, 2);
        assert_eq!(report.picks_inserted, 2);
        assert_eq!(report.picks_failed, 1);
        let picks = store.picks.borrow();
        assert_eq!(picks[0].platform_url, "https://open.spotify.com/album/a1");
        assert_eq!(picks[0].weekly_theme_id, "theme-1");
        assert_eq!(picks[1].platform_url, "https://open.spotify.com/album/a2");
        assert_eq!(picks[1].weekly_theme_id, "theme-2");
    }

    #[test]
    fn unknown_curator_and_failed_theme_skip_the_week() {
        let weeks = group_by_week(vec![
            // curator unknown
            raw("12/05/23, 9:00:00 AM", "Mallory", "album", "https://open.spotify.com/album/m1"),
            raw("12/06/23, 9:00:00 AM", "Alice", "track", "https://open.spotify.com/track/t1"),
            // theme creation fails
            raw("12/12/23, 9:00:00 AM", "Alice", "album", "https://open.spotify.com/album/a1"),
            // fine, but one unknown user
            raw("12/19/23, 9:00:00 AM", "Bob", "album", "https://open.spotify.com/album/a2"),
            raw("12/20/23, 9:00:00 AM", "Mallory", "track", "https://open.spotify.com/track/m2"),
        ]);
        let directory = directory();
        let metadata = metadata();
        let store = FakeStore {
            fail_themes: vec![1],
            ..Default::default()
        };
        let report =
            Migration::new(&directory, &metadata, &store, MigrationOptions::default()).run(&weeks);

        assert_eq!(
            report,
            RunReport {
                themes_created: 1,
                weeks_skipped: 2,
                picks_inserted: 1,
                picks_failed: 0,
                picks_skipped: 4,
            }
        );
        // no theme attempted for the unknown curator's week
        assert_eq!(store.themes.borrow().len(), 2);
        let picks = store.picks.borrow();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].user_id, "id-bob");
        assert_eq!(picks[0].weekly_theme_id, "theme-2");
    }

    #[test]
    fn metadata_failure_still_inserts() {
        let weeks = group_by_week(vec![raw(
            "12/12/23, 9:00:00 AM",
            "Alice",
            "album",
            "https://open.spotify.com/album/broken",
        )]);
        let directory = directory();
        let metadata = FakeMetadata {
            broken: vec!["https://open.spotify.com/album/broken".to_string()],
            ..Default::default()
        };
        let store = FakeStore::default();
        let report =
            Migration::new(&directory, &metadata, &store, MigrationOptions::default()).run(&weeks);

        assert_eq!(report.picks_inserted, 1);
        let picks = store.picks.borrow();
        assert_eq!(picks[0].title, "");
        assert_eq!(picks[0].artist, "");
        assert_eq!(picks[0].album_artwork_url, None);
    }

    #[test]
    fn skip_existing_links() {
        let weeks = group_by_week(vec![
            raw("12/12/23, 9:00:00 AM", "Alice", "album", "https://open.spotify.com/album/a1?si=1"),
            raw("12/13/23, 9:00:00 AM", "Bob", "album", "https://open.spotify.com/album/a1?si=2"),
            raw("12/14/23, 9:00:00 AM", "Bob", "track", "https://open.spotify.com/track/t1"),
        ]);
        let directory = directory();
        let metadata = metadata();
        let store = FakeStore {
            existing: vec!["https://open.spotify.com/track/t1".to_string()],
            ..Default::default()
        };
        let options = MigrationOptions {
            skip_existing: true,
        };
        let report = Migration::new(&directory, &metadata, &store, options).run(&weeks);
        assert_eq!(report.picks_inserted, 1);
        assert_eq!(report.picks_skipped, 2);

        // without the guard everything is written again
        let store = FakeStore {
            existing: vec!["https://open.spotify.com/track/t1".to_string()],
            ..Default::default()
        };
        let report =
            Migration::new(&directory, &metadata, &store, MigrationOptions::default()).run(&weeks);
        assert_eq!(report.picks_inserted, 3);
    }

    #[test]
    fn failed_link_is_retried_later_in_the_run() {
        let weeks = group_by_week(vec![
            raw("12/12/23, 9:00:00 AM", "Alice", "album", "https://open.spotify.com/album/a1"),
            raw("12/19/23, 9:00:00 AM", "Bob", "album", "https://open.spotify.com/album/a1?si=2"),
        ]);
        let directory = directory();
        let metadata = metadata();
        let store = FakeStore {
            fail_picks: vec![1],
            ..Default::default()
        };
        let options = MigrationOptions {
            skip_existing: true,
        };
        let report = Migration::new(&directory, &metadata, &store, options).run(&weeks);

        assert_eq!(report.themes_created, 2);
        assert_eq!(report.picks_failed, 1);
        assert_eq!(report.picks_inserted, 1);
        assert_eq!(report.picks_skipped, 0);
        let picks = store.picks.borrow();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].platform_url, "https://open.spotify.com/album/a1?si=2");
        assert_eq!(picks[0].weekly_theme_id, "theme-2");
    }

    #[test]
    fn plan_weeks() {
        let weeks = group_by_week(vec![
            raw("12/12/23, 9:00:00 AM", "Bob", "track", "https://open.spotify.com/track/t1"),
            raw("12/13/23, 9:00:00 AM", "Alice", "album", "https://open.spotify.com/album/a1"),
            raw("12/19/23, 9:00:00 AM", "Mallory", "track", "https://open.spotify.com/track/m1"),
        ]);
        let rows = plan(&weeks, &directory());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].curator, "Alice");
        assert_eq!(rows[0].curator_id.as_deref(), Some("id-alice"));
        assert_eq!(rows[0].week_end, date(2023, 12, 17));
        assert_eq!(rows[0].pick_count, 2);
        assert_eq!(rows[1].curator, "Mallory");
        assert_eq!(rows[1].curator_id, None);
    }

    #[test]
    fn dedup_keys() {
        assert_eq!(
            dedup_key("https://open.spotify.com/album/a1?si=1"),
            dedup_key("https://open.spotify.com/album/a1")
        );
        assert_eq!(dedup_key("https://open.spotify.com/album/a1"), "album:a1");
        assert_eq!(
            dedup_key("https://example.com/some/page/?x=1"),
            "https://example.com/some/page"
        );
    }
}
