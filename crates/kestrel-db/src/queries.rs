use crate::Database;
use anyhow::{Result, anyhow};
use kestrel_types::events::Tag;
use kestrel_types::models::{
    FeedCursor, FeedPost, FeedRemoteKey, FollowListRecord, PostRecord, PostStatsRecord,
    ProfileRecord, ProfileStatsRecord, UserFeed,
};
use rusqlite::{Connection, Row, params};

impl Database {
    // -- Posts --

    /// Insert posts that are not stored yet. Posts are immutable, so an
    /// existing row is never touched. Returns the ids that were new.
    pub fn insert_posts(&self, posts: &[PostRecord]) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO posts (post_id, author_id, created_at, tags, content, sig)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(post_id) DO NOTHING",
                )?;
                for post in posts {
                    let tags = serde_json::to_string(&post.tags)?;
                    let changed = stmt.execute(params![
                        post.post_id,
                        post.author_id,
                        sql_time(post.created_at)?,
                        tags,
                        post.content,
                        post.sig,
                    ])?;
                    if changed > 0 {
                        inserted.push(post.post_id.clone());
                    }
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    pub fn get_post(&self, post_id: &str) -> Result<Option<PostRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT post_id, author_id, created_at, tags, content, sig FROM posts WHERE post_id = ?1",
                [post_id],
                post_from_row,
            )
            .optional()
        })
    }

    // -- Profiles --

    /// Upsert profiles, keeping whichever version has the greater
    /// `(created_at, event_id)`. Re-applying a stored version is a no-op.
    pub fn upsert_profiles(&self, profiles: &[ProfileRecord]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO profiles (owner_id, event_id, created_at, raw, name, display_name,
                        about, picture, banner, website, internet_identifier, lightning_address)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(owner_id) DO UPDATE SET
                        event_id = excluded.event_id,
                        created_at = excluded.created_at,
                        raw = excluded.raw,
                        name = excluded.name,
                        display_name = excluded.display_name,
                        about = excluded.about,
                        picture = excluded.picture,
                        banner = excluded.banner,
                        website = excluded.website,
                        internet_identifier = excluded.internet_identifier,
                        lightning_address = excluded.lightning_address
                     WHERE excluded.created_at > profiles.created_at
                        OR (excluded.created_at = profiles.created_at
                            AND excluded.event_id > profiles.event_id)",
                )?;
                for p in profiles {
                    stmt.execute(params![
                        p.owner_id,
                        p.event_id,
                        sql_time(p.created_at)?,
                        p.raw,
                        p.name,
                        p.display_name,
                        p.about,
                        p.picture,
                        p.banner,
                        p.website,
                        p.internet_identifier,
                        p.lightning_address,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_profile(&self, owner_id: &str) -> Result<Option<ProfileRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT owner_id, event_id, created_at, raw, name, display_name, about, picture,
                        banner, website, internet_identifier, lightning_address
                 FROM profiles WHERE owner_id = ?1",
                [owner_id],
                |row| profile_from_row(row, 0),
            )
            .optional()
        })
    }

    // -- Stats --

    pub fn upsert_post_stats(&self, stats: &[PostStatsRecord]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO post_stats
                        (post_id, likes, replies, mentions, reposts, zaps, sats_zapped, score, score24h)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for s in stats {
                    stmt.execute(params![
                        s.post_id,
                        s.likes,
                        s.replies,
                        s.mentions,
                        s.reposts,
                        s.zaps,
                        s.sats_zapped,
                        s.score,
                        s.score24h,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_post_stats(&self, post_id: &str) -> Result<Option<PostStatsRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT post_id, likes, replies, mentions, reposts, zaps, sats_zapped, score, score24h
                 FROM post_stats WHERE post_id = ?1",
                [post_id],
                |row| post_stats_from_row(row, 0),
            )
            .optional()
        })
    }

    pub fn upsert_profile_stats(&self, stats: &[ProfileStatsRecord]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO profile_stats
                        (profile_id, following, followers, notes, replies, time_joined)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for s in stats {
                    stmt.execute(params![
                        s.profile_id,
                        s.following,
                        s.followers,
                        s.notes,
                        s.replies,
                        s.time_joined.map(sql_time).transpose()?,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_profile_stats(&self, profile_id: &str) -> Result<Option<ProfileStatsRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT profile_id, following, followers, notes, replies, time_joined
                 FROM profile_stats WHERE profile_id = ?1",
                [profile_id],
                |row| {
                    Ok(ProfileStatsRecord {
                        profile_id: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        notes: row.get(3)?,
                        replies: row.get(4)?,
                        time_joined: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
                    })
                },
            )
            .optional()
        })
    }

    // -- Follow lists --

    pub fn upsert_follow_lists(&self, lists: &[FollowListRecord]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO follow_lists (owner_id, event_id, created_at, following, interests)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(owner_id) DO UPDATE SET
                        event_id = excluded.event_id,
                        created_at = excluded.created_at,
                        following = excluded.following,
                        interests = excluded.interests
                     WHERE excluded.created_at > follow_lists.created_at
                        OR (excluded.created_at = follow_lists.created_at
                            AND excluded.event_id > follow_lists.event_id)",
                )?;
                for list in lists {
                    stmt.execute(params![
                        list.owner_id,
                        list.event_id,
                        sql_time(list.created_at)?,
                        serde_json::to_string(&list.following)?,
                        serde_json::to_string(&list.interests)?,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_follow_list(&self, owner_id: &str) -> Result<Option<FollowListRecord>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT owner_id, event_id, created_at, following, interests
                 FROM follow_lists WHERE owner_id = ?1",
                [owner_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
        })?;

        row.map(|(owner_id, event_id, created_at, following, interests)| {
            Ok(FollowListRecord {
                owner_id,
                event_id,
                created_at: created_at as u64,
                following: serde_json::from_str(&following)?,
                interests: serde_json::from_str(&interests)?,
            })
        })
        .transpose()
    }

    // -- Feeds --

    /// Attach posts to a directive. Returns how many links were new.
    pub fn link_feed_posts(&self, directive: &str, posts: &[(String, u64)]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut linked = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO feed_posts (directive, post_id, created_at)
                     VALUES (?1, ?2, ?3)",
                )?;
                for (post_id, created_at) in posts {
                    linked += stmt.execute(params![directive, post_id, sql_time(*created_at)?])?;
                }
            }
            tx.commit()?;
            Ok(linked)
        })
    }

    /// Read one page of a feed, newest first, strictly after `after` when given.
    pub fn get_feed_page(
        &self,
        directive: &str,
        after: Option<&FeedCursor>,
        limit: u32,
    ) -> Result<Vec<FeedPost>> {
        self.with_conn(|conn| query_feed_page(conn, directive, after, limit))
    }

    pub fn count_feed_posts(&self, directive: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM feed_posts WHERE directive = ?1",
                [directive],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Timestamp of the newest post linked to a directive.
    pub fn newest_feed_post_time(&self, directive: &str) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            let newest: Option<i64> = conn.query_row(
                "SELECT MAX(created_at) FROM feed_posts WHERE directive = ?1",
                [directive],
                |row| row.get(0),
            )?;
            Ok(newest.map(|t| t as u64))
        })
    }

    pub fn upsert_feed_remote_key(&self, key: &FeedRemoteKey) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO feed_remote_keys (directive, since, until) VALUES (?1, ?2, ?3)",
                params![
                    key.directive,
                    key.since.map(sql_time).transpose()?,
                    key.until.map(sql_time).transpose()?,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_feed_remote_key(&self, directive: &str) -> Result<Option<FeedRemoteKey>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT directive, since, until FROM feed_remote_keys WHERE directive = ?1",
                [directive],
                |row| {
                    Ok(FeedRemoteKey {
                        directive: row.get(0)?,
                        since: row.get::<_, Option<i64>>(1)?.map(|t| t as u64),
                        until: row.get::<_, Option<i64>>(2)?.map(|t| t as u64),
                    })
                },
            )
            .optional()
        })
    }

    // -- User feeds --

    /// Returns `true` if the directive was not saved before.
    pub fn add_user_feed(&self, directive: &str, title: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO user_feeds (directive, title) VALUES (?1, ?2)",
                params![directive, title],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns `true` if the directive was saved.
    pub fn remove_user_feed(&self, directive: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM user_feeds WHERE directive = ?1", [directive])?;
            Ok(changed > 0)
        })
    }

    pub fn contains_user_feed(&self, directive: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM user_feeds WHERE directive = ?1)",
                [directive],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn get_user_feeds(&self) -> Result<Vec<UserFeed>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT directive, title FROM user_feeds ORDER BY added_at, directive")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(UserFeed {
                        directive: row.get(0)?,
                        title: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_feed_page(
    conn: &Connection,
    directive: &str,
    after: Option<&FeedCursor>,
    limit: u32,
) -> Result<Vec<FeedPost>> {
    // Keyset pagination on (created_at, post_id); NULL cursor reads from the head.
    let mut stmt = conn.prepare(
        "SELECT p.post_id, p.author_id, p.created_at, p.tags, p.content, p.sig,
                s.post_id, s.likes, s.replies, s.mentions, s.reposts, s.zaps, s.sats_zapped,
                s.score, s.score24h,
                a.owner_id, a.event_id, a.created_at, a.raw, a.name, a.display_name, a.about,
                a.picture, a.banner, a.website, a.internet_identifier, a.lightning_address
         FROM feed_posts f
         JOIN posts p ON p.post_id = f.post_id
         LEFT JOIN post_stats s ON s.post_id = p.post_id
         LEFT JOIN profiles a ON a.owner_id = p.author_id
         WHERE f.directive = ?1
           AND (?2 IS NULL OR f.created_at < ?2 OR (f.created_at = ?2 AND f.post_id < ?3))
         ORDER BY f.created_at DESC, f.post_id DESC
         LIMIT ?4",
    )?;

    let rows = stmt
        .query_map(
            params![
                directive,
                after.map(|c| sql_time(c.created_at)).transpose()?,
                after.map(|c| c.post_id.as_str()).unwrap_or_default(),
                limit,
            ],
            |row| {
                let post = post_from_row(row)?;
                let stats = match row.get::<_, Option<String>>(6)? {
                    Some(_) => Some(post_stats_from_row(row, 6)?),
                    None => None,
                };
                let author = match row.get::<_, Option<String>>(15)? {
                    Some(_) => Some(profile_from_row(row, 15)?),
                    None => None,
                };
                Ok(FeedPost { post, stats, author })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// SQLite integers are signed; a timestamp past `i64::MAX` would sort as
/// negative, so it is rejected instead.
fn sql_time(t: u64) -> Result<i64> {
    i64::try_from(t).map_err(|_| anyhow!("timestamp {} is out of range", t))
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    let tags: String = row.get(3)?;
    let tags: Vec<Tag> = serde_json::from_str(&tags).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(PostRecord {
        post_id: row.get(0)?,
        author_id: row.get(1)?,
        created_at: row.get::<_, i64>(2)? as u64,
        tags,
        content: row.get(4)?,
        sig: row.get(5)?,
    })
}

fn post_stats_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<PostStatsRecord> {
    Ok(PostStatsRecord {
        post_id: row.get(at)?,
        likes: row.get(at + 1)?,
        replies: row.get(at + 2)?,
        mentions: row.get(at + 3)?,
        reposts: row.get(at + 4)?,
        zaps: row.get(at + 5)?,
        sats_zapped: row.get(at + 6)?,
        score: row.get(at + 7)?,
        score24h: row.get(at + 8)?,
    })
}

fn profile_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<ProfileRecord> {
    Ok(ProfileRecord {
        owner_id: row.get(at)?,
        event_id: row.get(at + 1)?,
        created_at: row.get::<_, i64>(at + 2)? as u64,
        raw: row.get(at + 3)?,
        name: row.get(at + 4)?,
        display_name: row.get(at + 5)?,
        about: row.get(at + 6)?,
        picture: row.get(at + 7)?,
        banner: row.get(at + 8)?,
        website: row.get(at + 9)?,
        internet_identifier: row.get(at + 10)?,
        lightning_address: row.get(at + 11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
