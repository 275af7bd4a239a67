use std::{error::Error, path::PathBuf};

use clap::Parser;
use log::{info, warn};
use picks_backfill::{
    config::{load_env_file, StoreConfig},
    directory::UserDirectory,
    metadata::OpenGraphFetcher,
    migrate::{plan, Migration, MigrationOptions, WeekPlan},
    source::{read_picks, SourceFormat},
    store::RestStore,
    week::group_by_week,
};
use tabled::{builder::Builder, settings::Style};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod.  Reads `.env/<env>.env` if present.
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// File with the historical picks
    #[arg(short, long)]
    input: PathBuf,

    /// Layout of the input file: csv or chat
    #[arg(short, long, default_value = "csv")]
    format: SourceFormat,

    /// Json file with the known members.  Defaults to the founding members.
    #[arg(short, long)]
    users: Option<PathBuf>,

    /// Show the weeks and their curators, don't write anything
    #[arg(long)]
    dry_run: bool,

    /// Don't insert links which are already in the store
    #[arg(long)]
    skip_existing: bool,
}

/// Make an ASCII table from the week plan
fn ascii_table(data: &[WeekPlan]) -> tabled::Table {
    let mut builder = Builder::new();
    builder.push_record(vec!["Week Start", "Week End", "Curator", "Curator Id", "Picks"]);
    for week in data {
        builder.push_record(vec![
            week.week_start.to_string(),
            week.week_end.to_string(),
            week.curator.clone(),
            week.curator_id.clone().unwrap_or_else(|| "unknown".to_string()),
            week.pick_count.to_string(),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    table
}

/// Run once to load the historical picks
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting historical data population...");
    load_env_file(&args.env);

    let directory = match &args.users {
        Some(path) => UserDirectory::from_path(path)?,
        None => UserDirectory::founding_members(),
    };
    if directory.is_empty() {
        warn!("The user directory is empty, every week will be skipped");
    }

    let raw = read_picks(&args.input, args.format)?;
    info!("Read {} picks from {}", raw.len(), args.input.display());
    let weeks = group_by_week(raw);
    info!("Found {} weeks", weeks.len());

    if args.dry_run {
        println!("{}", ascii_table(&plan(&weeks, &directory)));
        return Ok(());
    }

    let store = RestStore::new(StoreConfig::from_env());
    let fetcher = OpenGraphFetcher::new()?;
    let options = MigrationOptions {
        skip_existing: args.skip_existing,
    };
    let report = Migration::new(&directory, &fetcher, &store, options).run(&weeks);

    info!(
        "{} themes created, {} weeks skipped, {} picks inserted, {} failed, {} skipped",
        report.themes_created,
        report.weeks_skipped,
        report.picks_inserted,
        report.picks_failed,
        report.picks_skipped
    );
    info!("Historical data population complete!");
    Ok(())
}
