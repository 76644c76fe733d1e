//! Property-based tests for postpack.
//!
//! These tests generate random inputs to find edge cases.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use postpack::channel::{ChannelIdentity, normalize_reference};
use postpack::context::CancelHandle;
use postpack::dedupe::dedupe;
use postpack::normalize::clean_markdown;
use postpack::paginator::paginate;
use postpack::record::PostRecord;
use postpack::request::{DateWindow, SortDirection, SortKey};
use postpack::sort::sort_records;
use postpack::transport::{RateLimitedTransport, RecordingSleeper, RetryPolicy};
use postpack::upstream::{FixtureUpstream, RawChannel, RawMessage};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Records with small id and counter ranges so duplicates and ties are common.
fn arb_record() -> impl Strategy<Value = PostRecord> {
    (0u64..30, 0i64..(60 * 24 * 20), 0u64..5, 0u64..5).prop_map(|(id, minutes, reactions, views)| {
        PostRecord::new(id, base() + Duration::minutes(minutes), format!("post {id}"))
            .with_reactions(reactions)
            .with_views(views)
    })
}

fn arb_records(max_len: usize) -> impl Strategy<Value = Vec<PostRecord>> {
    prop::collection::vec(arb_record(), 0..max_len)
}

fn arb_key() -> impl Strategy<Value = SortKey> {
    prop::sample::select(vec![SortKey::Date, SortKey::Reactions, SortKey::Views])
}

fn arb_direction() -> impl Strategy<Value = SortDirection> {
    prop::sample::select(vec![SortDirection::Asc, SortDirection::Desc])
}

fn key_of(record: &PostRecord, key: SortKey) -> i64 {
    match key {
        SortKey::Date => record.timestamp().timestamp(),
        SortKey::Reactions => record.reactions() as i64,
        SortKey::Views => record.views() as i64,
    }
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i64::from(n) - 1)
}

/// Walks a channel holding one post per day (ids and days `1..=posts`).
/// Returns the yielded ids and the number of history fetches.
fn walk_daily(posts: u32, from: u32, to: u32, page_size: u32) -> (Vec<u64>, usize) {
    let messages = (1..=posts)
        .map(|d| {
            let ts = day(d).and_hms_opt(12, 0, 0).unwrap().and_utc();
            RawMessage::new(u64::from(d), ts, "post")
        })
        .collect();
    let upstream = Arc::new(FixtureUpstream::new().with_channel(
        RawChannel {
            id: 3,
            title: "Daily".into(),
            username: Some("daily".into()),
        },
        messages,
    ));
    let transport = RateLimitedTransport::new(
        upstream.clone(),
        RetryPolicy::default(),
        Arc::new(RecordingSleeper::new()),
        CancelHandle::new(),
    );
    let channel = ChannelIdentity {
        id: 3,
        title: "Daily".into(),
        handle: "daily".into(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let ids = runtime.block_on(async {
        let mut walk = paginate(&transport, &channel, day(from), day(to)).with_page_size(page_size);
        walk.collect_all()
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect()
    });
    (ids, upstream.fetch_calls())
}

/// Fewest fetches that reach the first post older than the window, or the
/// end of history when there is none.
fn minimal_fetches(posts: u32, from: u32, to: u32, page_size: u32) -> usize {
    let (posts, from, to, page) = (posts as usize, from as usize, to as usize, page_size as usize);
    // The first page starts at the newest post not after the window.
    let start = posts.saturating_sub(to);
    if from >= 2 && posts >= 1 {
        let stop = posts - (from - 1).min(posts);
        (stop - start) / page + 1
    } else {
        let remaining = posts - start;
        remaining.div_ceil(page).max(1)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================
    // WINDOW PROPERTIES
    // ============================================

    /// Every instant of every day in the period is inside; the neighbours are not
    #[test]
    fn window_covers_whole_days(start in 0i64..3000, len in 0i64..60, second in 0i64..86_400) {
        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(start);
        let to = from + Duration::days(len);
        let window = DateWindow::from_dates(from, to);

        let first = from.and_hms_opt(0, 0, 0).unwrap().and_utc() + Duration::seconds(second);
        let last = to.and_hms_opt(0, 0, 0).unwrap().and_utc() + Duration::seconds(second);
        prop_assert!(window.contains(first));
        prop_assert!(window.contains(last));

        let before = window.start - Duration::seconds(1);
        prop_assert!(!window.contains(before));
        prop_assert!(window.is_older(before));
        prop_assert!(!window.contains(window.end));
        prop_assert!(window.is_newer(window.end));
    }

    // ============================================
    // PAGINATION PROPERTIES
    // ============================================

    /// Exactly the in-window posts, newest first, without fetching past the
    /// first older one
    #[test]
    fn paginator_yields_window_and_stops_early(
        posts in 0u32..30,
        from in 1u32..35,
        len in 0u32..10,
        page_size in 1u32..12,
    ) {
        let to = from + len;
        let (ids, fetches) = walk_daily(posts, from, to, page_size);

        let expected: Vec<u64> = (from..=to.min(posts)).rev().map(u64::from).collect();
        prop_assert_eq!(ids, expected);
        prop_assert_eq!(fetches, minimal_fetches(posts, from, to, page_size));
    }

    // ============================================
    // DEDUPE PROPERTIES
    // ============================================

    /// Output ids are unique and every input id survives
    #[test]
    fn dedupe_keeps_each_id_once(records in arb_records(40)) {
        let input_ids: HashSet<u64> = records.iter().map(PostRecord::id).collect();
        let result = dedupe(records);

        let output_ids: HashSet<u64> = result.iter().map(PostRecord::id).collect();
        prop_assert_eq!(output_ids.len(), result.len());
        prop_assert_eq!(output_ids, input_ids);
    }

    /// The first occurrence of an id is the one kept, in input order
    #[test]
    fn dedupe_keeps_first_occurrence(records in arb_records(40)) {
        let mut seen = HashSet::new();
        let expected: Vec<PostRecord> = records
            .iter()
            .filter(|r| seen.insert(r.id()))
            .cloned()
            .collect();
        prop_assert_eq!(dedupe(records), expected);
    }

    // ============================================
    // SORT PROPERTIES
    // ============================================

    /// Sorting yields a permutation ordered by the key
    #[test]
    fn sort_orders_by_key(mut records in arb_records(40), key in arb_key(), direction in arb_direction()) {
        let mut before: Vec<u64> = records.iter().map(PostRecord::id).collect();
        sort_records(&mut records, key, direction);

        for pair in records.windows(2) {
            let (a, b) = (key_of(&pair[0], key), key_of(&pair[1], key));
            match direction {
                SortDirection::Asc => prop_assert!(a <= b),
                SortDirection::Desc => prop_assert!(a >= b),
            }
        }

        let mut after: Vec<u64> = records.iter().map(PostRecord::id).collect();
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
    }

    /// Records with equal keys keep their incoming order in both directions
    #[test]
    fn sort_is_stable(records in arb_records(40), key in arb_key(), direction in arb_direction()) {
        // Tag each record with its input position through the text.
        let mut tagged: Vec<PostRecord> = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                PostRecord::new(r.id(), r.timestamp(), i.to_string())
                    .with_reactions(r.reactions())
                    .with_views(r.views())
            })
            .collect();
        sort_records(&mut tagged, key, direction);

        for pair in tagged.windows(2) {
            if key_of(&pair[0], key) == key_of(&pair[1], key) {
                let a: usize = pair[0].text().parse().unwrap();
                let b: usize = pair[1].text().parse().unwrap();
                prop_assert!(a < b);
            }
        }
    }

    /// Sorting twice gives the same result as sorting once
    #[test]
    fn sort_is_idempotent(mut records in arb_records(30), key in arb_key(), direction in arb_direction()) {
        sort_records(&mut records, key, direction);
        let once = records.clone();
        sort_records(&mut records, key, direction);
        prop_assert_eq!(once, records);
    }

    // ============================================
    // TEXT PROPERTIES
    // ============================================

    /// Cleaning never panics and is stable on its own output for plain words
    #[test]
    fn clean_markdown_plain_words_untouched(words in prop::collection::vec("[a-z]{1,8}", 0..10)) {
        let text = words.join(" ");
        prop_assert_eq!(clean_markdown(&text), text);
    }

    /// Valid handles normalize to themselves, with or without decoration
    #[test]
    fn reference_normalization(handle in "[A-Za-z][A-Za-z0-9_]{4,20}") {
        prop_assert_eq!(normalize_reference(&handle).unwrap(), handle.clone());
        let at = format!("@{}", handle);
        prop_assert_eq!(normalize_reference(&at).unwrap(), handle.clone());
        let link = format!("https://t.me/{}", handle);
        prop_assert_eq!(normalize_reference(&link).unwrap(), handle.clone());
        let preview = format!("t.me/s/{}/", handle);
        prop_assert_eq!(normalize_reference(&preview).unwrap(), handle);
    }
}
