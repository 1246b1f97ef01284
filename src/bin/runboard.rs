use clap::{Parser, Subcommand};

use runboard::{Runboard, Season, StravaClient, SyncMode, SyncStatus};

#[derive(Parser)]
#[command(name = "runboard", about = "Running leaderboard CLI")]
struct Cli {
    /// Database path (default: ~/.runboard/runboard.db)
    #[arg(long)]
    db: Option<String>,

    /// Season year (default: the `year` config value, else the current year)
    #[arg(long)]
    year: Option<i32>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync activities from the provider to the local store
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
    /// Weekly and total statistics
    Stats {
        #[command(subcommand)]
        target: StatsTarget,
    },
    /// Manage registered users
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store status
    Status,
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Sync one user's activities
    User {
        /// User id or name
        identifier: String,
        /// Fetch only the most recent activities instead of the full season
        #[arg(long)]
        latest: bool,
    },
    /// Sync every registered user
    All {
        #[arg(long)]
        latest: bool,
    },
}

#[derive(Subcommand)]
enum StatsTarget {
    /// Per-user weekly series
    Weekly {
        /// Activity counts instead of distance
        #[arg(long)]
        count: bool,
        /// Running totals, tail-aligned across users
        #[arg(long)]
        cumulative: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Season totals per user
    Leaderboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// List registered users
    List,
    /// Register a user with provider credentials
    Add {
        /// Display name
        name: String,
        /// Provider athlete id
        #[arg(long)]
        provider_id: String,
        /// OAuth access token
        #[arg(long)]
        access_token: String,
        /// OAuth refresh token
        #[arg(long)]
        refresh_token: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Refresh a user's provider tokens without syncing
    Refresh {
        /// User id or name
        identifier: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn client_from_env(season: Season) -> anyhow::Result<StravaClient> {
    let client_id = std::env::var("STRAVA_CLIENT_ID")
        .map_err(|_| anyhow::anyhow!("STRAVA_CLIENT_ID is not set"))?;
    let client_secret = std::env::var("STRAVA_CLIENT_SECRET")
        .map_err(|_| anyhow::anyhow!("STRAVA_CLIENT_SECRET is not set"))?;
    Ok(StravaClient::new(client_id, client_secret, season))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => runboard::Database::open_at(path).await?,
        None => runboard::Database::open().await?,
    };

    let year_config = db
        .reader()
        .call(|conn| runboard::storage::repository::get_config(conn, "year"))
        .await?;
    // Precedence: --year flag, RUNBOARD_YEAR, stored config, current year.
    let override_year = cli
        .year
        .or_else(|| std::env::var("RUNBOARD_YEAR").ok().and_then(|v| v.trim().parse().ok()));
    let season = Season::resolve(override_year, year_config.as_deref());

    let app = Runboard::new(db, client_from_env(season)?, season);

    match cli.command {
        Commands::Status => print_status(&app).await?,
        Commands::Sync { target } => handle_sync(&app, target).await?,
        Commands::Stats { target } => handle_stats(&app, target).await?,
        Commands::Users { action } => handle_users(&app, action).await?,
        Commands::Config { action } => handle_config(&app, action).await?,
    }

    Ok(())
}

fn print_report(report: &runboard::SyncReport) {
    let status = match report.status {
        SyncStatus::Success => "ok",
        SyncStatus::PartialFailure => "partial",
        SyncStatus::Failed => "FAILED",
    };
    println!(
        "{:<20} {:<8} {} created, {} updated, {} unchanged, {} failed",
        report.user,
        status,
        report.created,
        report.updated,
        report.unchanged,
        report.failed.len()
    );
    if let Some(ref error) = report.error {
        println!("  {error}");
    }
}

async fn handle_sync(
    app: &Runboard<StravaClient>,
    target: SyncTarget,
) -> anyhow::Result<()> {
    match target {
        SyncTarget::User { identifier, latest } => {
            let mode = if latest { SyncMode::Latest } else { SyncMode::All };
            let report = app.sync_user(&identifier, mode).await?;
            print_report(&report);
        }
        SyncTarget::All { latest } => {
            let mode = if latest { SyncMode::Latest } else { SyncMode::All };
            let reports = app.sync_all(mode).await?;
            for report in &reports {
                print_report(report);
            }
            let failed = reports
                .iter()
                .filter(|r| r.status == SyncStatus::Failed)
                .count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} user syncs failed", reports.len());
            }
        }
    }
    Ok(())
}

async fn handle_stats(
    app: &Runboard<StravaClient>,
    target: StatsTarget,
) -> anyhow::Result<()> {
    match target {
        StatsTarget::Weekly {
            count,
            cumulative,
            json,
        } => {
            let series = if count {
                app.weekly_count(cumulative).await?
            } else {
                app.weekly_distance(cumulative).await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                let unit = if count { "" } else { " km" };
                for (user, points) in &series {
                    println!("{user}:");
                    for point in points {
                        println!("  week {:>2}: {}{unit}", point.week, point.value);
                    }
                }
            }
        }
        StatsTarget::Leaderboard { json } => {
            let board = app.leaderboard().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&board)?);
                return Ok(());
            }

            println!("Distance (km)");
            for entry in &board.distance {
                println!("  {:<20} {}", entry.user, entry.value);
            }
            println!("Activities (>= 5 min)");
            for entry in &board.count {
                println!("  {:<20} {}", entry.user, entry.value);
            }
            println!("Duration");
            for entry in &board.duration {
                println!(
                    "  {:<20} {}",
                    entry.user,
                    runboard::stats::format_duration(entry.value)
                );
            }
        }
    }
    Ok(())
}

async fn handle_users(
    app: &Runboard<StravaClient>,
    action: UsersAction,
) -> anyhow::Result<()> {
    match action {
        UsersAction::List => {
            let users = app.users().await?;
            if users.is_empty() {
                println!("No users registered.");
                return Ok(());
            }
            for user in &users {
                println!(
                    "{:>4}  {:<20} {}:{}",
                    user.id, user.name, user.provider, user.provider_id
                );
            }
        }
        UsersAction::Add {
            name,
            provider_id,
            access_token,
            refresh_token,
            email,
        } => {
            let id = app
                .add_user(
                    &name,
                    email.as_deref(),
                    "strava",
                    &provider_id,
                    &access_token,
                    &refresh_token,
                )
                .await?;
            println!("Registered {name} (id {id}).");
        }
        UsersAction::Refresh { identifier } => {
            let user = app.refresh_tokens(&identifier).await?;
            println!("Tokens refreshed for {}.", user.name);
        }
    }
    Ok(())
}

async fn handle_config(
    app: &Runboard<StravaClient>,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match app.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            app.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = app.config_list().await?;
            if items.is_empty() {
                println!("No config values set.");
            }
            for (key, value) in &items {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

async fn print_status(app: &Runboard<StravaClient>) -> anyhow::Result<()> {
    let stats = app
        .db()
        .reader()
        .call(|conn| {
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let activities: i64 =
                conn.query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
            let last_sync: Option<String> = conn
                .query_row(
                    "SELECT MAX(finished_at) FROM sync_runs WHERE status = 'completed'",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(None);
            Ok::<_, rusqlite::Error>((users, activities, last_sync))
        })
        .await?;

    let (users, activities, last_sync) = stats;
    println!("Store Status");
    println!("  Season:     {}", app.season().year());
    println!("  Users:      {users}");
    println!("  Activities: {activities}");
    println!(
        "  Last sync:  {}",
        last_sync.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}
