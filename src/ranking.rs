//! Time-windowed rankings and pagination over meme lists.

use crate::models::Meme;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::cmp::Ordering;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_HIGHLIGHTS: usize = 5;
pub const DEFAULT_TOP_MEMES: usize = 5;
pub const TRENDING_WINDOW_DAYS: i64 = 7;

/// Raw `?page=&limit=` values. Kept as strings so junk falls back to the
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageQuery {
    pub fn resolve(&self, default_limit: usize) -> PageRequest {
        PageRequest {
            page: positive(self.page.as_deref()).unwrap_or(1),
            limit: positive(self.limit.as_deref())
                .unwrap_or(default_limit)
                .min(MAX_PAGE_SIZE),
        }
    }

    pub fn limit_or(&self, default_limit: usize) -> usize {
        self.resolve(default_limit).limit
    }
}

fn positive(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok()).filter(|n| *n > 0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total: usize,
}

pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len();
    let skip = (request.page - 1).saturating_mul(request.limit);
    Page {
        items: items.into_iter().skip(skip).take(request.limit).collect(),
        current_page: request.page,
        total_pages: total.div_ceil(request.limit),
        total,
    }
}

/// Midnight of `now`'s calendar day in its own time zone.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

pub fn newest_first(memes: &mut [Meme]) {
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Most upvotes, then fewest downvotes, then newest.
fn champion_order(a: &Meme, b: &Meme) -> Ordering {
    b.votes
        .upvote_count()
        .cmp(&a.votes.upvote_count())
        .then(a.votes.downvote_count().cmp(&b.votes.downvote_count()))
        .then(b.created_at.cmp(&a.created_at))
}

/// Most upvotes, then newest.
fn upvote_order(a: &Meme, b: &Meme) -> Ordering {
    b.votes
        .upvote_count()
        .cmp(&a.votes.upvote_count())
        .then(b.created_at.cmp(&a.created_at))
}

fn best_since(memes: Vec<Meme>, since: DateTime<Utc>) -> Option<Meme> {
    memes
        .into_iter()
        .filter(|m| m.is_rankable() && m.created_at >= since)
        .min_by(champion_order)
}

/// Best published, unreported meme created since local midnight.
pub fn meme_of_the_day<Tz: TimeZone>(memes: Vec<Meme>, now: &DateTime<Tz>) -> Option<Meme> {
    best_since(memes, start_of_day(now))
}

/// Best published, unreported meme from the trailing seven days.
pub fn weekly_champion(memes: Vec<Meme>, now: DateTime<Utc>) -> Option<Meme> {
    best_since(memes, now - Duration::days(TRENDING_WINDOW_DAYS))
}

/// Rankable memes from the trailing window, by upvotes.
pub fn trending(memes: Vec<Meme>, now: DateTime<Utc>) -> Vec<Meme> {
    let since = now - Duration::days(TRENDING_WINDOW_DAYS);
    let mut recent: Vec<Meme> = memes
        .into_iter()
        .filter(|m| m.is_rankable() && m.created_at >= since)
        .collect();
    recent.sort_by(upvote_order);
    recent
}

/// A creator's published memes by upvotes, capped at `limit`.
pub fn top_by_upvotes(memes: Vec<Meme>, limit: usize) -> Vec<Meme> {
    let mut published: Vec<Meme> = memes.into_iter().filter(|m| !m.is_draft).collect();
    published.sort_by(upvote_order);
    published.truncate(limit);
    published
}
