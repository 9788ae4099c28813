//! Command line client for the caching service. Fetched events are merged
//! into a local SQLite store and every listing is served from that store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use kestrel_api::feeds::search_directive;
use kestrel_api::{AccountFetcher, FeedRepository};
use kestrel_db::Database;
use kestrel_gateway::{CacheClient, Connection, EndpointConfig, ReconnectPolicy, ServerRole};
use kestrel_types::models::FeedCursor;

#[derive(Parser)]
#[command(name = "kestrel", version, about = "Caching-service client with a local event store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch pages of a feed directive and print its posts.
    Feed {
        directive: String,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Search notes; shorthand for the `search;<query>` directive.
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Print posts already stored for a directive, without network access.
    Cached {
        directive: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print a user's profile.
    Profile { pubkey: String },
    /// Print who a user follows and which topics they track.
    Follows { pubkey: String },
    /// Follow a directive live and report new posts until Ctrl-C.
    Watch { directive: String },
    /// Save a directive to the user feed list.
    AddFeed {
        directive: String,
        /// Display title; defaults to the directive.
        title: Option<String>,
    },
    /// Remove a directive from the user feed list.
    RemoveFeed { directive: String },
    /// List saved user feeds.
    Feeds,
}

struct Settings {
    db_path: PathBuf,
    page_size: u32,
    user_pubkey: Option<String>,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let db_path = std::env::var("KESTREL_DB_PATH").unwrap_or_else(|_| "kestrel.db".into());
        let page_size: u32 = std::env::var("KESTREL_PAGE_SIZE")
            .unwrap_or_else(|_| "20".into())
            .parse()?;
        let user_pubkey = std::env::var("KESTREL_USER_PUBKEY")
            .ok()
            .filter(|key| !key.is_empty());
        Ok(Self {
            db_path: PathBuf::from(db_path),
            page_size,
            user_pubkey,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kestrel=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&settings.db_path)?);

    // Only the caching role is used by the CLI
    let endpoints = Arc::new(EndpointConfig::from_env());
    let connection = Arc::new(Connection::new(
        ServerRole::Caching,
        endpoints,
        ReconnectPolicy::default(),
    ));
    let client = CacheClient::new(connection.clone());

    let feeds = FeedRepository::new(
        client.clone(),
        db,
        settings.page_size,
        settings.user_pubkey,
    );
    let accounts = AccountFetcher::new(client);

    let result = run(cli.command, &feeds, &accounts).await;
    connection.close().await;
    result
}

async fn run(
    command: Commands,
    feeds: &FeedRepository<CacheClient>,
    accounts: &AccountFetcher<CacheClient>,
) -> anyhow::Result<()> {
    match command {
        Commands::Feed { directive, pages } => print_pages(feeds, &directive, pages).await?,
        Commands::Search { query, pages } => {
            print_pages(feeds, &search_directive(&query), pages).await?
        }
        Commands::Cached { directive, limit } => {
            for post in feeds.cached_feed_page(&directive, None, limit).await? {
                print_json(&post)?;
            }
        }
        Commands::Profile { pubkey } => match accounts.fetch_user_profile_or_null(&pubkey).await? {
            Some(profile) => print_json(&profile)?,
            None => info!("No profile found for {}", pubkey),
        },
        Commands::Follows { pubkey } => {
            match accounts.fetch_user_follow_list_or_null(&pubkey).await? {
                Some(list) => print_json(&list)?,
                None => info!("No follow list found for {}", pubkey),
            }
        }
        Commands::Watch { directive } => watch(feeds, &directive).await?,
        Commands::AddFeed { directive, title } => {
            let title = title.unwrap_or_else(|| directive.clone());
            if !feeds.add_to_user_feeds(&directive, &title).await? {
                info!("{} is already in user feeds", directive);
            }
        }
        Commands::RemoveFeed { directive } => {
            if !feeds.remove_from_user_feeds(&directive).await? {
                info!("{} was not in user feeds", directive);
            }
        }
        Commands::Feeds => {
            for feed in feeds.user_feeds().await? {
                print_json(&feed)?;
            }
        }
    }
    Ok(())
}

async fn print_pages(
    feeds: &FeedRepository<CacheClient>,
    directive: &str,
    pages: usize,
) -> anyhow::Result<()> {
    let mut cursor: Option<FeedCursor> = None;
    for _ in 0..pages {
        let page = feeds.query_feed(directive, cursor.as_ref()).await?;
        if page.report.failed > 0 {
            info!("{}: skipped {} malformed events", directive, page.report.failed);
        }
        if page.posts.is_empty() {
            break;
        }
        for post in &page.posts {
            print_json(post)?;
        }
        cursor = page.next_cursor;
    }
    Ok(())
}

async fn watch(feeds: &FeedRepository<CacheClient>, directive: &str) -> anyhow::Result<()> {
    let mut stats = feeds.observe_sync_stats(directive);
    let watcher = feeds.watch_feed(directive);
    info!("Watching {} (Ctrl-C to stop)", directive);

    let report = async {
        while stats.changed().await.is_ok() {
            let count = stats.borrow_and_update().new_posts_count;
            info!("{}: {} new posts", directive, count);
        }
    };

    // Dropping the watcher on Ctrl-C cancels the live subscription
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = watcher.join() => info!("Live feed for {} ended", directive),
        _ = report => {}
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
