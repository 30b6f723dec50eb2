use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use feedsync::config::Config;
use feedsync::feed::HttpFeedSource;
use feedsync::ingest::{self, Scheduler, Shutdown, ShutdownHandle};
use feedsync::storage::{Database, DatabaseError, User, DEFAULT_POST_LIMIT};
use feedsync::util::UrlPolicy;

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("feedsync");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "feedsync",
    version,
    about = "Scheduled RSS ingestion into SQLite"
)]
struct Args {
    /// Config file (default: ~/.config/feedsync/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides `database_path`
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Feeds fetched per tick, overrides `concurrency`
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Seconds between ticks, overrides `interval_secs`
    #[arg(long, global = true)]
    interval_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch feeds on a fixed interval until interrupted
    Run,
    /// Create a user and print its API key
    AddUser { name: String },
    /// Register a feed and follow it
    AddFeed {
        #[arg(long)]
        api_key: String,
        name: String,
        url: String,
    },
    /// Follow an existing feed
    Follow {
        #[arg(long)]
        api_key: String,
        feed_id: Uuid,
    },
    /// List the feeds a user follows, with follow ids
    Follows {
        #[arg(long)]
        api_key: String,
    },
    /// Remove a follow
    Unfollow {
        #[arg(long)]
        api_key: String,
        follow_id: Uuid,
    },
    /// Show the user an API key belongs to
    Whoami {
        #[arg(long)]
        api_key: String,
    },
    /// List every registered feed
    Feeds,
    /// Show recent posts from followed feeds
    Posts {
        #[arg(long)]
        api_key: String,
        #[arg(long, default_value_t = DEFAULT_POST_LIMIT)]
        limit: usize,
    },
    /// Run a single tick and exit
    FetchOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(database) = &args.database {
        config.database_path = Some(database.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(interval_secs) = args.interval_secs {
        config.interval_secs = interval_secs;
    }
    config.validate().context("Invalid configuration")?;

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            ensure_config_dir(&config_dir)?;
            config_dir.join("feeds.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database is locked by another process. Please try again.");
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let policy = UrlPolicy::new(config.allow_private_hosts);

    match args.command {
        Command::Run => {
            let scheduler = build_scheduler(&config, db)?;
            let (handle, shutdown) = ingest::shutdown::channel();
            listen_for_signals(handle)?;
            scheduler.run(shutdown).await;
        }
        Command::FetchOnce => {
            let scheduler = build_scheduler(&config, db)?;
            let summary = scheduler.tick(&Shutdown::never()).await;
            if summary.selection_failed {
                anyhow::bail!("Failed to select feeds to fetch");
            }
            println!(
                "Fetched {} feeds: {} ingested, {} failed, {} new posts",
                summary.selected, summary.ingested, summary.failed, summary.inserted
            );
        }
        Command::AddUser { name } => {
            let user = db.create_user(&name).await.context("Failed to create user")?;
            println!("Created user {} ({})", user.name, user.id);
            println!("API key: {}", user.api_key);
        }
        Command::AddFeed { api_key, name, url } => {
            let user = authenticate(&db, &api_key).await?;
            let url = policy
                .check(&url)
                .with_context(|| format!("Refusing feed URL '{}'", url))?;
            let feed = match db.create_feed(user.id, &name, url.as_str()).await {
                Ok(feed) => feed,
                Err(e) if e.is_duplicate() => anyhow::bail!("Feed '{}' is already registered", url),
                Err(e) => return Err(e).context("Failed to create feed"),
            };
            println!("Created feed {} ({})", feed.name, feed.id);
            let follows = db
                .list_feed_follows(user.id)
                .await
                .context("Failed to list follows")?;
            if let Some(follow) = follows.iter().find(|f| f.feed_id == feed.id) {
                println!("Following it (follow id {})", follow.id);
            }
        }
        Command::Follow { api_key, feed_id } => {
            let user = authenticate(&db, &api_key).await?;
            if db.get_feed(feed_id).await?.is_none() {
                anyhow::bail!("No feed with id {}", feed_id);
            }
            let follow = match db.create_feed_follow(user.id, feed_id).await {
                Ok(follow) => follow,
                Err(e) if e.is_duplicate() => anyhow::bail!("Already following feed {}", feed_id),
                Err(e) => return Err(e).context("Failed to follow feed"),
            };
            println!("Following feed {} (follow id {})", feed_id, follow.id);
        }
        Command::Follows { api_key } => {
            let user = authenticate(&db, &api_key).await?;
            let follows = db
                .list_feed_follows(user.id)
                .await
                .context("Failed to list follows")?;
            if follows.is_empty() {
                println!("Not following any feeds");
            }
            for follow in follows {
                println!("{}  feed {}", follow.id, follow.feed_id);
            }
        }
        Command::Whoami { api_key } => {
            let user = authenticate(&db, &api_key).await?;
            let created = chrono::DateTime::from_timestamp(user.created_at, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| user.created_at.to_string());
            println!("{} ({}), created {}", user.name, user.id, created);
        }
        Command::Unfollow { api_key, follow_id } => {
            let user = authenticate(&db, &api_key).await?;
            let removed = db
                .delete_feed_follow(follow_id, user.id)
                .await
                .context("Failed to unfollow feed")?;
            if !removed {
                anyhow::bail!("No follow with id {}", follow_id);
            }
            println!("Unfollowed ({})", follow_id);
        }
        Command::Feeds => {
            let feeds = db.list_feeds().await.context("Failed to list feeds")?;
            if feeds.is_empty() {
                println!("No feeds registered");
            }
            for feed in feeds {
                let fetched = feed
                    .last_fetched_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}  {}  {}  (fetched: {})", feed.id, feed.name, feed.url, fetched);
            }
        }
        Command::Posts { api_key, limit } => {
            let user = authenticate(&db, &api_key).await?;
            let posts = db
                .get_posts_for_user(user.id, limit)
                .await
                .context("Failed to load posts")?;
            for post in posts {
                let published = post
                    .published_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "----------".to_string());
                println!("{}  {}\n            {}", published, post.title, post.url);
            }
        }
    }

    Ok(())
}

fn build_scheduler(
    config: &Config,
    db: Database,
) -> Result<Scheduler<Database, HttpFeedSource>> {
    let options = config.scheduler_options()?;
    let source = HttpFeedSource::new(
        &config.user_agent,
        UrlPolicy::new(config.allow_private_hosts),
        config.max_feed_bytes,
    )
    .context("Failed to build HTTP client")?;
    Ok(Scheduler::new(Arc::new(db), Arc::new(source), options))
}

async fn authenticate(db: &Database, api_key: &str) -> Result<User> {
    db.get_user_by_api_key(api_key)
        .await
        .context("Failed to look up API key")?
        .ok_or_else(|| anyhow::anyhow!("Couldn't find user for the given API key"))
}

fn ensure_config_dir(config_dir: &std::path::Path) -> Result<()> {
    if config_dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    tracing::info!(path = %config_dir.display(), "Created config directory");

    // SEC-007: User-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

/// Trigger shutdown on the first SIGINT or SIGTERM.
fn listen_for_signals(handle: ShutdownHandle) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            }
            handle.trigger();
        });
    }
    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
        }
        handle.trigger();
    });
    Ok(())
}
