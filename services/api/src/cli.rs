use crate::demo::{run_demo, DemoArgs};
use crate::infra::{build_service, parse_instant};
use crate::server;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use reflection_rewards::config::RewardsConfig;
use reflection_rewards::error::AppError;
use reflection_rewards::rewards::{write_ledger_csv, EntryId, UserId};

#[derive(Parser, Debug)]
#[command(
    name = "Reflection Rewards",
    about = "Track weekly reflection streaks and the points they earn",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Record one journal entry and print the reward
    Record(RecordArgs),
    /// Print streak statistics for a user
    Stats(StatsArgs),
    /// Print a user's most recent ledger rows
    Ledger(LedgerArgs),
    /// Walk a scripted multi-week journaling run against an in-memory store
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct RecordArgs {
    #[arg(long)]
    pub(crate) user: String,
    #[arg(long)]
    pub(crate) entry: String,
    /// Week id (YYYY-Www), RFC 3339 timestamp or epoch millis. Defaults to now.
    #[arg(long, value_parser = parse_instant)]
    pub(crate) at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub(crate) struct StatsArgs {
    #[arg(long)]
    pub(crate) user: String,
    /// Evaluate "this week" as of this instant instead of now
    #[arg(long, value_parser = parse_instant)]
    pub(crate) at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub(crate) struct LedgerArgs {
    #[arg(long)]
    pub(crate) user: String,
    #[arg(long, default_value_t = 20)]
    pub(crate) limit: usize,
    /// Emit CSV instead of JSON
    #[arg(long)]
    pub(crate) csv: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Record(args) => run_record(args),
        Command::Stats(args) => run_stats(args),
        Command::Ledger(args) => run_ledger(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn load_rewards_config() -> Result<RewardsConfig, AppError> {
    Ok(RewardsConfig::load()?)
}

fn run_record(args: RecordArgs) -> Result<(), AppError> {
    let service = build_service(&load_rewards_config()?)?;
    let at = args.at.unwrap_or_else(Utc::now);
    let result = service.record_entry(&UserId(args.user), &EntryId(args.entry), at)?;
    print_json(&result)
}

fn run_stats(args: StatsArgs) -> Result<(), AppError> {
    let service = build_service(&load_rewards_config()?)?;
    let at = args.at.unwrap_or_else(Utc::now);
    let stats = service.streak_stats_at(&UserId(args.user), at)?;
    print_json(&stats)
}

fn run_ledger(args: LedgerArgs) -> Result<(), AppError> {
    let service = build_service(&load_rewards_config()?)?;
    let entries = service.recent_entries(&UserId(args.user), args.limit)?;
    if args.csv {
        write_ledger_csv(std::io::stdout().lock(), &entries)?;
        Ok(())
    } else {
        print_json(&entries)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}
