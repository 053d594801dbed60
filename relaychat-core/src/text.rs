//! Text helpers shared by the client: conversation titles and timestamps.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

pub const TITLE_MAX_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

/// Title for a new conversation, derived from its first user message.
///
/// The message is trimmed; anything longer than 50 characters becomes its
/// first 47 characters followed by `"..."`. Counting is per `char`, so a
/// multi-byte character is never split.
pub fn generate_title(message: &str) -> String {
    let clean = message.trim();
    if clean.chars().count() <= TITLE_MAX_CHARS {
        return clean.to_owned();
    }
    let keep = TITLE_MAX_CHARS - ELLIPSIS.len();
    let mut title: String = clean.chars().take(keep).collect();
    title.push_str(ELLIPSIS);
    title
}

/// Short, recency-dependent label for a timestamp.
///
/// Under a day: `"3:04 PM"`. Under a week: `"Mon 3:04 PM"`. Older:
/// `"Oct 5"`.
pub fn format_timestamp<Tz>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let age_hours = (now.clone() - ts.clone()).num_milliseconds() as f64 / 3_600_000.0;
    let pattern = if age_hours < 24.0 {
        "%-I:%M %p"
    } else if age_hours < 168.0 {
        "%a %-I:%M %p"
    } else {
        "%b %-d"
    };
    ts.format(pattern).to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn short_titles_are_kept() {
        assert_eq!(generate_title("Hello"), "Hello");
        assert_eq!(generate_title("  Hi \n"), "Hi");
        let exact = "x".repeat(50);
        assert_eq!(generate_title(&exact), exact);
    }

    #[test]
    fn long_titles_are_truncated_to_fifty() {
        let msg = "a".repeat(51);
        let title = generate_title(&msg);
        assert_eq!(title.chars().count(), 50);
        assert_eq!(title, format!("{}...", "a".repeat(47)));
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let msg = "😀".repeat(60);
        let title = generate_title(&msg);
        assert_eq!(title.chars().count(), 50);
        assert!(title.starts_with(&"😀".repeat(47)));
        assert!(title.ends_with("..."));
    }

    #[test]
    fn timestamp_labels_follow_age() {
        let now = Utc.with_ymd_and_hms(2024, 10, 18, 20, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2024, 10, 18, 15, 4, 0).unwrap();
        let this_week = now - Duration::days(3);
        let old = Utc.with_ymd_and_hms(2024, 10, 5, 9, 0, 0).unwrap();

        assert_eq!(format_timestamp(&recent, &now), "3:04 PM");
        assert_eq!(format_timestamp(&this_week, &now), "Tue 8:00 PM");
        assert_eq!(format_timestamp(&old, &now), "Oct 5");
    }
}
