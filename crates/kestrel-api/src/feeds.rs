use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_stream::try_stream;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kestrel_db::Database;
use kestrel_gateway::{CacheClient, CacheRequest, GatewayError, LiveStream};
use kestrel_types::api::{FeedPagingContent, FeedRequestBody};
use kestrel_types::events::{EventKind, WireEvent};
use kestrel_types::models::{FeedCursor, FeedPost, FeedPostsSyncStats, FeedRemoteKey, UserFeed};

use crate::error::{KestrelError, Result};
use crate::processors::posts::post_from_event;
use crate::processors::{BatchReport, ProcessorRegistry};
use crate::sync::SyncStatsTracker;

/// Prefix of directives built from a free-text search.
pub const SEARCH_PREFIX: &str = "search;";

pub fn search_directive(query: &str) -> String {
    format!("{}{}", SEARCH_PREFIX, query)
}

pub fn is_search(directive: &str) -> bool {
    directive.starts_with(SEARCH_PREFIX)
}

pub fn is_trending(directive: &str) -> bool {
    directive.ends_with("trending")
}

pub fn is_popular(directive: &str) -> bool {
    directive.ends_with("popular")
}

pub fn is_most_zapped(directive: &str) -> bool {
    directive.ends_with("mostzapped4h")
}

/// Chronological feeds: anything not ranked by the server.
pub fn is_latest(directive: &str) -> bool {
    !is_trending(directive) && !is_popular(directive) && !is_most_zapped(directive)
}

/// Network side of the feed repository.
pub trait FeedApi: Send + Sync + 'static {
    type LiveFeed: Stream<Item = std::result::Result<WireEvent, GatewayError>> + Send + Unpin + 'static;

    /// One page of a directive, up to `EOSE`.
    fn get_feed(
        &self,
        body: FeedRequestBody,
    ) -> impl Future<Output = std::result::Result<Vec<WireEvent>, GatewayError>> + Send;

    /// Events pushed for a directive as they are published.
    fn live_feed(&self, body: FeedRequestBody) -> std::result::Result<Self::LiveFeed, GatewayError>;
}

impl FeedApi for CacheClient {
    type LiveFeed = LiveStream;

    async fn get_feed(
        &self,
        body: FeedRequestBody,
    ) -> std::result::Result<Vec<WireEvent>, GatewayError> {
        let request = CacheRequest::new("feed_directive", &body)?;
        Ok(self.query(request).await?.events)
    }

    fn live_feed(&self, body: FeedRequestBody) -> std::result::Result<LiveStream, GatewayError> {
        self.subscribe(CacheRequest::new("live_feed", &body)?)
    }
}

/// A page served from the store after merging the network response.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    /// Cursor of the last post, for the next page.
    pub next_cursor: Option<FeedCursor>,
    pub report: BatchReport,
}

struct MergeResult {
    report: BatchReport,
    /// Text notes linked to the directive for the first time.
    new_posts: Vec<String>,
}

/// Directive-scoped feeds. Every network result is merged into the store
/// first, and readers are always served from the store.
pub struct FeedRepository<A> {
    inner: Arc<RepoInner<A>>,
}

struct RepoInner<A> {
    api: A,
    db: Arc<Database>,
    registry: Arc<ProcessorRegistry>,
    sync: SyncStatsTracker,
    feeds_version: watch::Sender<u64>,
    page_size: u32,
    user_pubkey: Option<String>,
}

impl<A> Clone for FeedRepository<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: FeedApi> FeedRepository<A> {
    pub fn new(api: A, db: Arc<Database>, page_size: u32, user_pubkey: Option<String>) -> Self {
        Self::with_registry(api, db, Arc::new(ProcessorRegistry::standard()), page_size, user_pubkey)
    }

    pub fn with_registry(
        api: A,
        db: Arc<Database>,
        registry: Arc<ProcessorRegistry>,
        page_size: u32,
        user_pubkey: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RepoInner {
                api,
                db,
                registry,
                sync: SyncStatsTracker::new(),
                feeds_version: watch::Sender::new(0),
                page_size: page_size.max(1),
                user_pubkey,
            }),
        }
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    // -- Paged reads --

    /// Fetch the page after `cursor` from the server, merge it, then read
    /// that page back from the store.
    ///
    /// Fails with [`KestrelError::Decode`] when the server returned events
    /// and none of them could be merged.
    pub async fn query_feed(&self, directive: &str, cursor: Option<&FeedCursor>) -> Result<FeedPage> {
        let body = self.request_body(directive, cursor.map(|c| c.created_at), None);
        let events = self.inner.api.get_feed(body).await?;
        let total = events.len();

        let merge = self.merge(directive, events).await?;
        let report = merge.report;
        debug!(
            "{}: {} events, merged {}, failed {}, dropped {}, {} new posts",
            directive,
            total,
            report.merged,
            report.failed,
            report.dropped,
            merge.new_posts.len()
        );
        if report.failed > 0 && report.merged == 0 {
            return Err(KestrelError::Decode {
                failed: report.failed,
                total,
            });
        }

        let posts = self
            .cached_feed_page(directive, cursor, self.inner.page_size)
            .await?;
        Ok(FeedPage {
            next_cursor: posts.last().map(FeedPost::cursor),
            posts,
            report,
        })
    }

    /// Store-only read, newest first, strictly after `cursor`.
    pub async fn cached_feed_page(
        &self,
        directive: &str,
        cursor: Option<&FeedCursor>,
        limit: u32,
    ) -> Result<Vec<FeedPost>> {
        let directive = directive.to_string();
        let cursor = cursor.cloned();
        self.with_store(move |db, _| db.get_feed_page(&directive, cursor.as_ref(), limit))
            .await
    }

    /// Every post of a directive, page by page, until the server and the
    /// store both run out.
    pub fn feed_by_directive(&self, directive: &str) -> BoxStream<'static, Result<FeedPost>> {
        let repo = self.clone();
        let directive = directive.to_string();
        try_stream! {
            let mut cursor: Option<FeedCursor> = None;
            loop {
                let page = repo.query_feed(&directive, cursor.as_ref()).await?;
                if page.posts.is_empty() {
                    break;
                }
                cursor = page.next_cursor;
                for post in page.posts {
                    yield post;
                }
            }
        }
        .boxed()
    }

    pub async fn remote_key(&self, directive: &str) -> Result<Option<FeedRemoteKey>> {
        let directive = directive.to_string();
        self.with_store(move |db, _| db.get_feed_remote_key(&directive)).await
    }

    // -- User feeds --

    pub async fn add_to_user_feeds(&self, directive: &str, title: &str) -> Result<bool> {
        let directive_owned = directive.to_string();
        let title = title.to_string();
        let added = self
            .with_store(move |db, _| db.add_user_feed(&directive_owned, &title))
            .await?;
        if added {
            info!("Added {} to user feeds", directive);
            self.inner.feeds_version.send_modify(|v| *v += 1);
        }
        Ok(added)
    }

    /// Removing a directive that is not saved is a no-op.
    pub async fn remove_from_user_feeds(&self, directive: &str) -> Result<bool> {
        let directive_owned = directive.to_string();
        let removed = self
            .with_store(move |db, _| db.remove_user_feed(&directive_owned))
            .await?;
        if removed {
            info!("Removed {} from user feeds", directive);
            self.inner.feeds_version.send_modify(|v| *v += 1);
        }
        Ok(removed)
    }

    pub async fn user_feeds(&self) -> Result<Vec<UserFeed>> {
        self.with_store(|db, _| db.get_user_feeds()).await
    }

    /// Whether `directive` is saved, re-emitted only when the answer changes.
    pub fn observe_contains_feed(&self, directive: &str) -> BoxStream<'static, Result<bool>> {
        let repo = self.clone();
        let directive = directive.to_string();
        let mut version = self.inner.feeds_version.subscribe();
        try_stream! {
            let mut last: Option<bool> = None;
            loop {
                let _ = version.borrow_and_update();
                let key = directive.clone();
                let contains = repo.with_store(move |db, _| db.contains_user_feed(&key)).await?;
                if last != Some(contains) {
                    last = Some(contains);
                    yield contains;
                }
                if version.changed().await.is_err() {
                    break;
                }
            }
        }
        .boxed()
    }

    // -- Live sync --

    /// Live posts for `directive`, starting after the newest cached post.
    /// Each pushed event is merged before anything is yielded; only posts
    /// not already in the feed come out.
    pub fn stream_feed(&self, directive: &str) -> BoxStream<'static, Result<FeedPost>> {
        let repo = self.clone();
        let directive = directive.to_string();
        try_stream! {
            let key = directive.clone();
            let since = repo.with_store(move |db, _| db.newest_feed_post_time(&key)).await?;
            let body = repo.request_body(&directive, None, since);
            let mut live = repo.inner.api.live_feed(body)?;

            while let Some(event) = live.next().await {
                let event = event?;
                let merge = repo.merge(&directive, vec![event]).await?;
                for post_id in merge.new_posts {
                    let key = directive.clone();
                    let post = repo
                        .with_store(move |db, _| load_feed_post(db, &key, &post_id))
                        .await?;
                    if let Some(post) = post {
                        yield post;
                    }
                }
            }
        }
        .boxed()
    }

    /// Follow `directive` in the background, counting new posts into its
    /// sync stats until the watcher is cancelled or dropped.
    pub fn watch_feed(&self, directive: &str) -> FeedWatcher {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let repo = self.clone();
        let directive = directive.to_string();

        let handle = tokio::spawn(async move {
            let mut stream = repo.stream_feed(&directive);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(post)) => {
                            debug!("{}: new post {}", directive, post.post.post_id);
                            repo.inner.sync.record_new_posts(&directive, 1);
                        }
                        Some(Err(e)) => {
                            warn!("Live feed {} stopped: {}", directive, e);
                            break;
                        }
                        None => break,
                    }
                }
            }
            debug!("Stopped watching {}", directive);
        });

        FeedWatcher { token, handle }
    }

    /// The reader is at the top of `directive`: nothing is new any more.
    pub fn mark_feed_seen(&self, directive: &str) {
        self.inner.sync.reset(directive);
    }

    pub fn sync_stats(&self, directive: &str) -> FeedPostsSyncStats {
        self.inner.sync.get(directive)
    }

    pub fn observe_sync_stats(&self, directive: &str) -> watch::Receiver<FeedPostsSyncStats> {
        self.inner.sync.observe(directive)
    }

    // -- Internals --

    fn request_body(&self, directive: &str, until: Option<u64>, since: Option<u64>) -> FeedRequestBody {
        FeedRequestBody {
            directive: directive.to_string(),
            user_pubkey: self.inner.user_pubkey.clone(),
            limit: self.inner.page_size,
            until,
            since,
        }
    }

    /// Run the registry over `events`, link the text notes to `directive`
    /// and record the server's paging window.
    async fn merge(&self, directive: &str, events: Vec<WireEvent>) -> Result<MergeResult> {
        let directive = directive.to_string();
        self.with_store(move |db, registry| {
            let (paging, events): (Vec<WireEvent>, Vec<WireEvent>) = events
                .into_iter()
                .partition(|event| event.is_kind(EventKind::FeedPaging));

            let report = registry.process(db, &events)?;

            let mut new_posts = Vec::new();
            for event in &events {
                if !event.is_kind(EventKind::ShortTextNote) {
                    continue;
                }
                let Ok(post) = post_from_event(event) else {
                    continue;
                };
                if db.link_feed_posts(&directive, &[(post.post_id.clone(), post.created_at)])? > 0 {
                    new_posts.push(post.post_id);
                }
            }

            if let Some(paging) = paging.last() {
                match serde_json::from_str::<FeedPagingContent>(paging.content()) {
                    Ok(window) => db.upsert_feed_remote_key(&FeedRemoteKey {
                        directive: directive.clone(),
                        since: window.since,
                        until: window.until,
                    })?,
                    Err(e) => warn!("{}: ignoring malformed paging event: {}", directive, e),
                }
            }

            Ok(MergeResult { report, new_posts })
        })
        .await
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &ProcessorRegistry) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.inner.db.clone();
        let registry = self.inner.registry.clone();
        tokio::task::spawn_blocking(move || f(&db, &registry))
            .await
            .map_err(|e| anyhow!("store task failed: {}", e))?
            .map_err(KestrelError::Store)
    }
}

fn load_feed_post(db: &Database, directive: &str, post_id: &str) -> anyhow::Result<Option<FeedPost>> {
    let Some(post) = db.get_post(post_id)? else {
        warn!("{}: linked post {} is not stored", directive, post_id);
        return Ok(None);
    };
    Ok(Some(FeedPost {
        stats: db.get_post_stats(post_id)?,
        author: db.get_profile(&post.author_id)?,
        post,
    }))
}

/// Background follower created by [`FeedRepository::watch_feed`].
/// Dropping it cancels the live subscription.
pub struct FeedWatcher {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl FeedWatcher {
    pub fn cancel(self) {}

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until the watcher stops on its own (stream ended or failed).
    pub async fn join(mut self) {
        if let Err(e) = (&mut self.handle).await {
            warn!("Feed watcher task failed: {}", e);
        }
    }
}

impl Drop for FeedWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::stream;
    use tokio::sync::mpsc;

    use super::*;
    use crate::processors::fixtures::{note, raw, side_channel, signed};

    type LiveItem = std::result::Result<WireEvent, GatewayError>;

    #[derive(Default)]
    struct MockApi {
        pages: Mutex<VecDeque<std::result::Result<Vec<WireEvent>, GatewayError>>>,
        requests: Mutex<Vec<FeedRequestBody>>,
        live_requests: Mutex<Vec<FeedRequestBody>>,
        live: Mutex<Option<mpsc::UnboundedReceiver<LiveItem>>>,
    }

    impl MockApi {
        fn with_pages(pages: Vec<std::result::Result<Vec<WireEvent>, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                ..Self::default()
            })
        }

        fn live_channel(&self) -> mpsc::UnboundedSender<LiveItem> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.live.lock().unwrap() = Some(rx);
            tx
        }
    }

    impl FeedApi for Arc<MockApi> {
        type LiveFeed = BoxStream<'static, LiveItem>;

        async fn get_feed(&self, body: FeedRequestBody) -> std::result::Result<Vec<WireEvent>, GatewayError> {
            self.requests.lock().unwrap().push(body);
            self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn live_feed(&self, body: FeedRequestBody) -> std::result::Result<Self::LiveFeed, GatewayError> {
            self.live_requests.lock().unwrap().push(body);
            let rx = self
                .live
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| GatewayError::Connection("no live feed".into()))?;
            Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
        }
    }

    fn repository(api: &Arc<MockApi>, page_size: u32) -> FeedRepository<Arc<MockApi>> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        FeedRepository::new(api.clone(), db, page_size, Some("me".into()))
    }

    async fn next_value(stream: &mut BoxStream<'static, Result<bool>>) -> bool {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    fn ids(posts: &[FeedPost]) -> Vec<&str> {
        posts.iter().map(|p| p.post.post_id.as_str()).collect()
    }

    #[tokio::test]
    async fn query_feed_stores_then_serves() {
        let api = MockApi::with_pages(vec![Ok(vec![
            note("n2", 20),
            side_channel(10_000_100, r#"{"event_id":"n1","likes":12}"#),
            note("n1", 30),
            signed("m1", "author", 0, 1, r#"{"name":"writer"}"#),
            note("n3", 10),
            side_channel(10_000_113, r#"{"since":10,"until":30,"order_by":"created_at"}"#),
        ])]);
        let repo = repository(&api, 20);

        let page = repo.query_feed("latest", None).await.unwrap();

        assert_eq!(ids(&page.posts), vec!["n1", "n2", "n3"]);
        assert_eq!(page.posts[0].stats.as_ref().unwrap().likes, 12);
        assert_eq!(page.posts[0].author.as_ref().unwrap().name.as_deref(), Some("writer"));
        assert_eq!(page.next_cursor.as_ref().unwrap().post_id, "n3");
        assert_eq!(page.report.failed, 0);

        let key = repo.remote_key("latest").await.unwrap().unwrap();
        assert_eq!((key.since, key.until), (Some(10), Some(30)));

        let request = api.requests.lock().unwrap()[0].clone();
        assert_eq!(request.limit, 20);
        assert_eq!(request.until, None);
        assert_eq!(request.user_pubkey.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn paging_is_descending_without_duplicates() {
        let api = MockApi::with_pages(vec![
            Ok(vec![note("n5", 50), note("n4", 40)]),
            // Servers repeat the boundary post of an inclusive `until`.
            Ok(vec![note("n4", 40), note("n3", 30), note("n2", 30)]),
            Ok(vec![note("n1", 10)]),
        ]);
        let repo = repository(&api, 2);

        let posts: Vec<FeedPost> = repo
            .feed_by_directive("latest")
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(ids(&posts), vec!["n5", "n4", "n3", "n2", "n1"]);
        let untils: Vec<Option<u64>> = api.requests.lock().unwrap().iter().map(|r| r.until).collect();
        assert_eq!(untils, vec![None, Some(40), Some(30), Some(10)]);
    }

    #[tokio::test]
    async fn all_failed_batch_is_a_decode_error() {
        let api = MockApi::with_pages(vec![Ok(vec![
            signed("m1", "alice", 0, 1, "{not json"),
            side_channel(1, "unsigned note"),
        ])]);
        let repo = repository(&api, 20);

        let err = repo.query_feed("latest", None).await.unwrap_err();
        assert!(matches!(err, KestrelError::Decode { failed: 2, total: 2 }), "got {:?}", err);
    }

    #[tokio::test]
    async fn page_of_undecodable_payloads_is_a_decode_error() {
        let api = MockApi::with_pages(vec![Ok(vec![
            raw(serde_json::json!({ "id": "n1", "pubkey": "p", "created_at": 1, "content": "x", "sig": "s" })),
            raw(serde_json::json!({ "id": "n2", "pubkey": "p", "created_at": 1, "kind": "one", "content": "x", "sig": "s" })),
        ])]);
        let repo = repository(&api, 20);

        let err = repo.query_feed("latest", None).await.unwrap_err();
        assert!(matches!(err, KestrelError::Decode { failed: 2, total: 2 }), "got {:?}", err);
        assert_eq!(repo.database().count_feed_posts("latest").unwrap(), 0);
    }

    #[tokio::test]
    async fn one_malformed_item_still_serves_the_page() {
        let api = MockApi::with_pages(vec![Ok(vec![
            note("n1", 30),
            note("n2", 20),
            raw(serde_json::json!({ "id": "n3", "pubkey": "author", "created_at": "later", "kind": 1, "content": "x", "sig": "s" })),
            note("n4", 10),
            signed("m1", "author", 0, 1, r#"{"name":"writer"}"#),
        ])]);
        let repo = repository(&api, 20);

        let page = repo.query_feed("latest", None).await.unwrap();
        assert_eq!(page.report, BatchReport { merged: 4, failed: 1, dropped: 0 });
        assert_eq!(ids(&page.posts), vec!["n1", "n2", "n4"]);
        assert!(page.posts.iter().all(|p| p.author.is_some()));
    }

    #[tokio::test]
    async fn server_errors_propagate() {
        let api = MockApi::with_pages(vec![Err(GatewayError::Protocol("unknown directive".into()))]);
        let repo = repository(&api, 20);

        let err = repo.query_feed("nope", None).await.unwrap_err();
        assert!(matches!(err, KestrelError::Protocol(ref m) if m == "unknown directive"));
    }

    #[tokio::test]
    async fn contains_feed_emits_only_changes() {
        let api = MockApi::with_pages(Vec::new());
        let repo = repository(&api, 20);
        let mut contains = repo.observe_contains_feed("search;rust");

        assert!(!next_value(&mut contains).await);

        assert!(repo.add_to_user_feeds("search;rust", "Rust").await.unwrap());
        assert!(!repo.add_to_user_feeds("search;rust", "Rust").await.unwrap());
        assert!(next_value(&mut contains).await);

        assert!(repo.remove_from_user_feeds("search;rust").await.unwrap());
        assert!(!repo.remove_from_user_feeds("search;rust").await.unwrap());
        assert!(!next_value(&mut contains).await);

        assert!(repo.user_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watcher_counts_new_posts_and_resets_on_seen() {
        let api = MockApi::with_pages(vec![Ok(vec![note("n0", 100)])]);
        let live = api.live_channel();
        let repo = repository(&api, 20);
        repo.query_feed("latest", None).await.unwrap();

        let mut stats = repo.observe_sync_stats("latest");
        let watcher = repo.watch_feed("latest");

        live.send(Ok(note("n1", 110))).unwrap();
        stats.wait_for(|s| s.new_posts_count == 1).await.unwrap();
        assert_eq!(api.live_requests.lock().unwrap()[0].since, Some(100));

        repo.mark_feed_seen("latest");
        assert_eq!(repo.sync_stats("latest").new_posts_count, 0);

        live.send(Ok(note("n1", 110))).unwrap();
        live.send(Ok(side_channel(10_000_100, r#"{"event_id":"n1","likes":1}"#))).unwrap();
        live.send(Ok(note("n2", 120))).unwrap();
        live.send(Ok(note("n3", 130))).unwrap();
        stats.wait_for(|s| s.new_posts_count == 2).await.unwrap();
        assert_eq!(repo.database().get_post_stats("n1").unwrap().unwrap().likes, 1);

        watcher.cancel();
    }

    #[tokio::test]
    async fn cancelled_watcher_stops_merging() {
        let api = MockApi::with_pages(Vec::new());
        let live = api.live_channel();
        let repo = repository(&api, 20);

        let watcher = repo.watch_feed("latest");
        live.send(Ok(note("n1", 10))).unwrap();
        let mut stats = repo.observe_sync_stats("latest");
        stats.wait_for(|s| s.new_posts_count == 1).await.unwrap();

        watcher.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = live.send(Ok(note("n9", 20)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(repo.database().get_post("n9").unwrap().is_none());
        assert_eq!(repo.sync_stats("latest").new_posts_count, 1);
    }

    #[tokio::test]
    async fn live_failure_ends_the_watcher() {
        let api = MockApi::with_pages(Vec::new());
        let live = api.live_channel();
        let repo = repository(&api, 20);

        let watcher = repo.watch_feed("latest");
        live.send(Err(GatewayError::Connection("reset".into()))).unwrap();
        tokio::time::timeout(Duration::from_secs(5), watcher.join()).await.unwrap();
    }

    #[test]
    fn directive_classification() {
        assert!(is_trending("global;trending"));
        assert!(is_popular("global;popular"));
        assert!(is_most_zapped("global;mostzapped4h"));
        assert!(is_latest("me;latest"));
        assert!(!is_latest("global;trending"));

        let search = search_directive("rust async");
        assert_eq!(search, "search;rust async");
        assert!(is_search(&search));
        assert!(is_latest(&search));
    }
}
