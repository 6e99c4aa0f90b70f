use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

use subsweep::app::Session;
use subsweep::backend::HttpBackend;
use subsweep::config::Config;
use subsweep::storage::{Database, DatabaseError, KvStore};
use subsweep::triage::{
    AnalysisEvent, AnalysisOutcome, AnalyzeOptions, Channel, Policy, SortKey, Summary, Tab,
    ViewState,
};
use subsweep::util::{fit_to_width, sanitize_title};

const TITLE_WIDTH: usize = 40;

/// Get the config directory path (~/.config/subsweep/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("subsweep"))
}

#[derive(Parser, Debug)]
#[command(
    name = "subsweep",
    about = "Find inactive channel subscriptions and remove them in bulk"
)]
struct Args {
    /// Config file (default: ~/.config/subsweep/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Recency threshold in months (overrides config)
    #[arg(long, global = true)]
    months: Option<u32>,

    /// Reset local state (analysis cache, favorites, history)
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in account and subscription counts
    Status,
    /// Look up the last upload of every pending channel
    Analyze,
    /// List channels
    List {
        /// all, target, star, deleted, or a category name
        #[arg(long, default_value = "all")]
        tab: Tab,
        /// Exact category name, including one spelled like a reserved tab
        #[arg(long, conflicts_with = "tab")]
        category: Option<String>,
        /// sub-desc, sub-asc, date-desc or date-asc
        #[arg(long)]
        sort: Option<SortKey>,
    },
    /// Toggle a channel's favorite flag
    Favorite { channel_id: String },
    /// Unsubscribe from channels
    Unsubscribe {
        /// Select every current target
        #[arg(long)]
        targets: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Channel or subscription ids
        ids: Vec<String>,
    },
    /// Show recently removed channels
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so listings on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        eprintln!("Created config directory: {}", config_dir.display());
    }

    // User-only access: the directory holds the session token and history
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(url) = &args.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(months) = args.months {
        config.threshold_months = months;
    }

    let db_path = config_dir.join("state.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete state database")?;
        println!("Local state reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of subsweep appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let session_token = std::env::var("SUBSWEEP_SESSION")
        .ok()
        .or_else(|| config.session_token.clone())
        .map(SecretString::from);
    let backend = HttpBackend::new(&config.backend_url, session_token, config.request_timeout())
        .context("Invalid backend configuration")?;

    let mut session = Session::start(backend, db, AnalyzeOptions::from_config(&config))
        .await
        .context("Failed to load subscriptions")?;
    let policy = Policy::new(config.threshold_months, Utc::now());

    match args.command {
        Command::Status => status(&session, &policy).await,
        Command::Analyze => analyze(&mut session, &policy).await,
        Command::List {
            tab,
            category,
            sort,
        } => {
            let view = ViewState {
                tab: category.map(Tab::Category).unwrap_or(tab),
                sort,
                threshold_months: config.threshold_months,
            };
            list(&session, &view, &policy);
            Ok(())
        }
        Command::Favorite { channel_id } => match session.toggle_favorite(&channel_id).await {
            Some(true) => {
                println!("Starred {channel_id}");
                Ok(())
            }
            Some(false) => {
                println!("Unstarred {channel_id}");
                Ok(())
            }
            None => anyhow::bail!("No channel with id {channel_id}"),
        },
        Command::Unsubscribe { targets, yes, ids } => {
            unsubscribe(&mut session, &policy, targets, yes, &ids).await
        }
        Command::History => {
            for channel in session.history() {
                print_row(channel, &policy);
            }
            Ok(())
        }
    }
}

fn print_summary(summary: &Summary) {
    println!(
        "Subscribed: {}  Pending: {}  Inactive: {}  Protected: {}  Starred: {}  Targets: {}",
        summary.subscribed,
        summary.pending,
        summary.old,
        summary.protected,
        summary.favorites,
        summary.targets
    );
}

fn print_row(channel: &Channel, policy: &Policy) {
    let class = policy.classify(channel);
    let marker = match (class.target, channel.is_favorite, channel.is_subscribed) {
        (_, _, false) => 'x',
        (true, _, _) => '!',
        (_, true, _) => '*',
        _ => ' ',
    };
    println!(
        "{} {} {:>10} {:<14} {}",
        marker,
        fit_to_width(&sanitize_title(&channel.title), TITLE_WIDTH),
        channel.subscriber_count,
        channel.activity_state.describe(policy.now),
        channel.channel_id
    );
}

async fn status<S: KvStore>(session: &Session<HttpBackend, S>, policy: &Policy) -> Result<()> {
    match session.user_info().await {
        Ok(info) if !info.name.is_empty() => println!("Signed in as {}", sanitize_title(&info.name)),
        Ok(_) => println!("Signed in"),
        Err(e) => tracing::warn!(error = %e, "Failed to fetch user info"),
    }
    print_summary(&session.summary(policy));
    Ok(())
}

async fn analyze<S: KvStore>(session: &mut Session<HttpBackend, S>, policy: &Policy) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(32);
    let printer = async move {
        while let Some(event) = rx.recv().await {
            match event {
                AnalysisEvent::Progress {
                    completed, total, ..
                } => {
                    eprint!("\rAnalyzing ({completed}/{total})");
                    let _ = std::io::stderr().flush();
                }
                AnalysisEvent::RateLimited { retry_in, .. } => {
                    tracing::debug!(retry_in_ms = retry_in.as_millis() as u64, "Waiting for rate limit");
                }
            }
        }
    };

    let (outcome, ()) = tokio::join!(session.analyze(Some(tx)), printer);
    match outcome {
        AnalysisOutcome::NothingToDo => println!("Nothing to analyze."),
        AnalysisOutcome::Completed {
            total, fallbacks, ..
        } => {
            eprintln!();
            println!("Analyzed {total} channels ({fallbacks} defaulted to no uploads).");
        }
        AnalysisOutcome::Aborted {
            completed,
            remaining,
        } => {
            eprintln!();
            anyhow::bail!(
                "Session expired after {completed} channels; {remaining} still pending. Sign in again and rerun."
            );
        }
    }
    print_summary(&session.summary(&Policy::new(policy.threshold_months, Utc::now())));
    Ok(())
}

fn list<S: KvStore>(session: &Session<HttpBackend, S>, view: &ViewState, policy: &Policy) {
    if let Tab::Category(category) = &view.tab {
        if !session.roster().categories().contains(&category.as_str()) {
            tracing::warn!(category = %category, "No channels in this category");
        }
    }
    for channel in session.view(view, policy.now) {
        print_row(channel, policy);
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn unsubscribe<S: KvStore>(
    session: &mut Session<HttpBackend, S>,
    policy: &Policy,
    targets: bool,
    yes: bool,
    ids: &[String],
) -> Result<()> {
    let mut selection: HashSet<String> = if targets {
        session.target_ids(policy)
    } else {
        HashSet::new()
    };
    // Accept channel ids as well as subscription ids
    selection.extend(ids.iter().map(|id| match session.roster().get(id) {
        Some(channel) => channel.subscription_id.clone(),
        None => id.clone(),
    }));

    if selection.is_empty() {
        println!("Nothing selected.");
        return Ok(());
    }
    if !yes && !confirm(&format!("Unsubscribe from {} channels?", selection.len()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let report = session
        .unsubscribe(&selection)
        .await
        .context("Bulk unsubscribe failed")?;
    println!(
        "succeeded {} / failed {}",
        report.success_count, report.fail_count
    );
    Ok(())
}
