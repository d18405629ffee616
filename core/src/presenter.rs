/// Filter, search and ordering for the inbox list
use crate::chat_types::{StatusFilter, Thread};
use crate::derivation::{counterpart, last_activity};

/// Threads matching `filter` and `query`, most recent activity first.
///
/// Ties on activity are ordered by id so the output does not depend on the
/// store's iteration order. The inputs are never modified.
pub fn present(threads: &[Thread], filter: StatusFilter, query: &str, viewer_id: &str) -> Vec<Thread> {
    let needle = query.trim().to_lowercase();

    let mut shown: Vec<Thread> = threads
        .iter()
        .filter(|t| filter.matches(t.status))
        .filter(|t| needle.is_empty() || matches_query(t, &needle, viewer_id))
        .cloned()
        .collect();

    shown.sort_by(|a, b| {
        last_activity(b)
            .cmp(&last_activity(a))
            .then_with(|| a.id.cmp(&b.id))
    });
    shown
}

fn matches_query(thread: &Thread, needle: &str, viewer_id: &str) -> bool {
    if counterpart(thread, viewer_id)
        .display_name()
        .to_lowercase()
        .contains(needle)
    {
        return true;
    }
    thread
        .message_text()
        .is_some_and(|text| text.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_types::{ChannelStatus, Participant};
    use chrono::{DateTime, TimeZone, Utc};

    const VIEWER: &str = "landlord-1";

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap()
    }

    fn thread(id: &str, status: ChannelStatus, name: (&str, &str), text: &str, hour: u32) -> Thread {
        Thread {
            id: id.into(),
            participant_a: Participant {
                id: format!("tenant-{}", id),
                first_name: name.0.into(),
                last_name: name.1.into(),
                avatar_url: None,
            },
            participant_b: Participant {
                id: VIEWER.into(),
                first_name: "Sam".into(),
                last_name: "Lee".into(),
                avatar_url: None,
            },
            status,
            last_message_text: Some(text.into()),
            last_message_at: Some(at(hour)),
            last_message_sender_id: Some(format!("tenant-{}", id)),
            read_at: None,
            created_at: at(0),
            updated_at: at(hour),
        }
    }

    fn sample() -> Vec<Thread> {
        vec![
            thread("a", ChannelStatus::Inquiry, ("Jane", "Doe"), "Is parking included?", 3),
            thread("b", ChannelStatus::Active, ("Omar", "Haddad"), "Rent sent", 5),
            thread("c", ChannelStatus::Inquiry, ("Lena", "Park"), "Viewing on Friday?", 4),
            thread("d", ChannelStatus::Ended, ("Ivy", "Chen"), "Keys returned", 1),
        ]
    }

    fn ids(threads: &[Thread]) -> Vec<&str> {
        threads.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_status_filter_returns_exact_subset() {
        let shown = present(&sample(), StatusFilter::Only(ChannelStatus::Inquiry), "", VIEWER);
        assert_eq!(ids(&shown), vec!["c", "a"]);
        assert!(shown.iter().all(|t| t.status == ChannelStatus::Inquiry));
    }

    #[test]
    fn test_search_is_case_insensitive_on_name() {
        let shown = present(&sample(), StatusFilter::All, "JANE", VIEWER);
        assert_eq!(ids(&shown), vec!["a"]);
    }

    #[test]
    fn test_search_matches_message_text() {
        let shown = present(&sample(), StatusFilter::All, "  park ", VIEWER);
        // "Park" surname and "parking" text
        assert_eq!(ids(&shown), vec!["c", "a"]);
    }

    #[test]
    fn test_orders_by_recency_then_id() {
        let mut threads = sample();
        threads.push(thread("aa", ChannelStatus::Active, ("Zoe", "Ray"), "Same hour", 5));

        let shown = present(&threads, StatusFilter::All, "", VIEWER);
        assert_eq!(ids(&shown), vec!["aa", "b", "c", "a", "d"]);
    }

    #[test]
    fn test_output_independent_of_input_order() {
        let forward = sample();
        let mut reversed = sample();
        reversed.reverse();

        assert_eq!(
            present(&forward, StatusFilter::All, "", VIEWER),
            present(&reversed, StatusFilter::All, "", VIEWER)
        );
    }

    #[test]
    fn test_two_thread_ordering_scenario() {
        let a = thread("A", ChannelStatus::Active, ("Jane", "Doe"), "older", 2);
        let b = thread("B", ChannelStatus::Active, ("Omar", "Haddad"), "newer", 6);
        let shown = present(&[a, b], StatusFilter::All, "", VIEWER);
        assert_eq!(ids(&shown), vec!["B", "A"]);
    }
}
