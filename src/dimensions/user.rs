use super::time::parse_epoch_ms;
use crate::constants::NEXT_SONG_PAGE;
use crate::schema::{TableSpec, USERS};
use crate::staging::RawEvent;
use crate::warehouse::{TableRow, Value};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

impl TableRow for UserRow {
    fn table() -> &'static TableSpec {
        &USERS
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.user_id.into(),
            self.first_name.clone().into(),
            self.last_name.clone().into(),
            self.gender.clone().into(),
            self.level.clone().into(),
        ]
    }
}

/// Logged-out events carry an empty user id.
pub fn parse_user_id(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

pub fn is_song_play(event: &RawEvent) -> bool {
    event.page.as_deref() == Some(NEXT_SONG_PAGE)
}

type Recency<'a> = (
    i64,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

fn recency(ts: i64, event: &RawEvent) -> Recency<'_> {
    (
        ts,
        event.level.as_deref(),
        event.first_name.as_deref(),
        event.last_name.as_deref(),
        event.gender.as_deref(),
    )
}

/// One row per user from that user's most recent song play.
///
/// Equal timestamps fall back to the greater (level, first name, last name,
/// gender) so the choice never depends on event order.
pub fn build_users(events: &[RawEvent]) -> Vec<UserRow> {
    let mut latest: BTreeMap<i64, (Recency<'_>, &RawEvent)> = BTreeMap::new();

    for event in events.iter().filter(|e| is_song_play(e)) {
        let (Some(user_id), Some(ts)) = (
            parse_user_id(event.user_id.as_deref()),
            parse_epoch_ms(event.ts.as_deref()),
        ) else {
            continue;
        };
        let rank = recency(ts, event);
        latest
            .entry(user_id)
            .and_modify(|current| {
                if rank > current.0 {
                    *current = (rank, event);
                }
            })
            .or_insert((rank, event));
    }

    latest
        .into_iter()
        .map(|(user_id, (_, event))| UserRow {
            user_id,
            first_name: event.first_name.clone(),
            last_name: event.last_name.clone(),
            gender: event.gender.clone(),
            level: event.level.clone(),
        })
        .collect()
}
