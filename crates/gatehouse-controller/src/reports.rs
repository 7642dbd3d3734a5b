//! CSV export, usage analytics and per-holder reports over recorded
//! transactions.

use chrono::{DateTime, Local, TimeDelta, Timelike, Utc};
use gatehouse_core::{AccessStatus, CardCode, ReaderId, TodayCounts, Transaction};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Header row of the transaction export.
pub const CSV_HEADER: &str = "Timestamp,Name,Card Number,Reader,Status";

/// Number of holders listed in [`Analytics::top_users`].
pub const TOP_USERS: usize = 10;

/// Number of reads listed in [`UserReport::timeline`].
pub const TIMELINE_LEN: usize = 20;

/// Render transactions as CSV, one row per transaction in the given order.
///
/// Timestamps are controller local time. Commas in names become `;` so
/// rows never gain extra columns.
pub fn transactions_csv(transactions: &[Transaction]) -> String {
    let mut lines = Vec::with_capacity(transactions.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for tx in transactions {
        lines.push(format!(
            "{},{},{},{},{}",
            tx.timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            tx.name.replace(',', ";"),
            tx.card,
            tx.reader,
            tx.status,
        ));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUser {
    pub name: String,
    pub card: CardCode,
    pub count: u64,
}

/// Usage figures for a window of recent transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub period_days: u32,
    pub card_filter: Option<CardCode>,
    pub total_transactions: u64,
    pub status_breakdown: TodayCounts,
    /// Reader number -> transactions.
    pub reader_breakdown: BTreeMap<u8, u64>,
    /// Local hour (0-23) -> transactions; every hour is present.
    pub hourly_distribution: BTreeMap<u32, u64>,
    /// Local date (`YYYY-MM-DD`) -> transactions.
    pub daily_distribution: BTreeMap<String, u64>,
    pub peak_hour: Option<u32>,
    pub peak_day: Option<String>,
    pub busiest_reader: Option<u8>,
    pub top_users: Vec<TopUser>,
    pub unique_cards: usize,
}

/// First key holding the largest count.
fn peak<K: Clone>(counts: &BTreeMap<K, u64>) -> Option<K> {
    counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .fold(None, |best: Option<(&K, u64)>, (key, count)| match best {
            Some((_, top)) if top >= *count => best,
            _ => Some((key, *count)),
        })
        .map(|(key, _)| key.clone())
}

/// Summarize `transactions` from the last `days` days before `now`,
/// optionally only those of `card`.
pub fn analytics(
    transactions: &[Transaction],
    days: u32,
    card: Option<CardCode>,
    now: DateTime<Utc>,
) -> Analytics {
    let cutoff = now - TimeDelta::days(i64::from(days));
    let selected = transactions
        .iter()
        .filter(|tx| tx.timestamp >= cutoff)
        .filter(|tx| card.is_none_or(|c| tx.card == c));

    let mut status_breakdown = TodayCounts::default();
    let mut reader_breakdown = BTreeMap::new();
    let mut hourly_distribution: BTreeMap<u32, u64> = (0..24).map(|h| (h, 0)).collect();
    let mut daily_distribution = BTreeMap::new();
    let mut per_user: HashMap<(String, CardCode), u64> = HashMap::new();
    let mut cards = HashSet::new();

    for tx in selected {
        status_breakdown.record(tx.status);
        *reader_breakdown.entry(tx.reader.as_u8()).or_insert(0) += 1;

        let local = tx.timestamp.with_timezone(&Local);
        *hourly_distribution.entry(local.hour()).or_insert(0) += 1;
        *daily_distribution
            .entry(local.format("%Y-%m-%d").to_string())
            .or_insert(0) += 1;

        *per_user.entry((tx.name.clone(), tx.card)).or_insert(0) += 1;
        cards.insert(tx.card);
    }

    let mut top_users: Vec<TopUser> = per_user
        .into_iter()
        .map(|((name, card), count)| TopUser { name, card, count })
        .collect();
    top_users.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.card.cmp(&b.card))
    });
    top_users.truncate(TOP_USERS);

    Analytics {
        period_days: days,
        card_filter: card,
        total_transactions: status_breakdown.total,
        peak_hour: peak(&hourly_distribution),
        peak_day: peak(&daily_distribution),
        busiest_reader: peak(&reader_breakdown),
        status_breakdown,
        reader_breakdown,
        hourly_distribution,
        daily_distribution,
        top_users,
        unique_cards: cards.len(),
    }
}

/// Card holder a [`UserReport`] is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportUser {
    pub name: String,
    pub card: CardCode,
    pub id: String,
    pub ref_id: String,
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub reader: ReaderId,
    pub status: AccessStatus,
}

/// Access history of one card holder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserReport {
    pub user: ReportUser,
    pub period_days: u32,
    pub summary: TodayCounts,
    /// Reads per day over the period, to two decimals.
    pub avg_per_day: f64,
    pub favourite_hour: Option<u32>,
    pub most_used_reader: Option<u8>,
    pub first_access: Option<DateTime<Utc>>,
    pub last_access: Option<DateTime<Utc>>,
    /// Latest reads, newest first.
    pub timeline: Vec<TimelineEntry>,
    /// Local hour (0-23) -> reads; every hour is present.
    pub hourly_pattern: BTreeMap<u32, u64>,
    /// Reader number -> reads.
    pub reader_usage: BTreeMap<u8, u64>,
}

/// Report on `user`'s reads among `transactions` from the last `days` days
/// before `now`.
pub fn user_report(
    user: ReportUser,
    transactions: &[Transaction],
    days: u32,
    now: DateTime<Utc>,
) -> UserReport {
    let cutoff = now - TimeDelta::days(i64::from(days));
    let mut reads: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.card == user.card && tx.timestamp >= cutoff)
        .collect();
    reads.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut summary = TodayCounts::default();
    let mut hourly_pattern: BTreeMap<u32, u64> = (0..24).map(|h| (h, 0)).collect();
    let mut reader_usage = BTreeMap::new();
    for tx in &reads {
        summary.record(tx.status);
        let hour = tx.timestamp.with_timezone(&Local).hour();
        *hourly_pattern.entry(hour).or_insert(0) += 1;
        *reader_usage.entry(tx.reader.as_u8()).or_insert(0) += 1;
    }

    let avg_per_day = if days == 0 {
        0.0
    } else {
        (summary.total as f64 / f64::from(days) * 100.0).round() / 100.0
    };

    UserReport {
        user,
        period_days: days,
        avg_per_day,
        favourite_hour: peak(&hourly_pattern),
        most_used_reader: peak(&reader_usage),
        first_access: reads.last().map(|tx| tx.timestamp),
        last_access: reads.first().map(|tx| tx.timestamp),
        timeline: reads
            .iter()
            .take(TIMELINE_LEN)
            .map(|tx| TimelineEntry {
                timestamp: tx.timestamp,
                reader: tx.reader,
                status: tx.status,
            })
            .collect(),
        summary,
        hourly_pattern,
        reader_usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn tx(name: &str, card: u64, reader: u8, status: AccessStatus, ago_secs: i64) -> Transaction {
        Transaction::new(
            name,
            CardCode::new(card),
            ReaderId::new(reader).unwrap(),
            status,
            now() - TimeDelta::seconds(ago_secs),
        )
    }

    #[test]
    fn test_csv_header_and_rows() {
        let rows = vec![
            tx("Smith, John", 42, 2, AccessStatus::Granted, 0),
            tx("Unknown", 7, 1, AccessStatus::Denied, 60),
        ];
        let csv = transactions_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",Smith; John,42,2,Access Granted"));
        assert!(lines[2].ends_with(",Unknown,7,1,Access Denied"));
        assert!(lines.iter().all(|l| l.split(',').count() == 5));
    }

    #[test]
    fn test_csv_empty() {
        assert_eq!(transactions_csv(&[]), CSV_HEADER);
    }

    #[test]
    fn test_analytics_breakdowns() {
        let rows = vec![
            tx("Alice", 1, 1, AccessStatus::Granted, 10),
            tx("Alice", 1, 2, AccessStatus::Granted, 20),
            tx("Bob", 2, 2, AccessStatus::Granted, 30),
            tx("Unknown", 3, 2, AccessStatus::Denied, 40),
            tx("Blocked", 4, 3, AccessStatus::Blocked, 50),
        ];
        let report = analytics(&rows, 7, None, now());

        assert_eq!(report.total_transactions, 5);
        assert_eq!(report.status_breakdown.granted, 3);
        assert_eq!(report.status_breakdown.denied, 1);
        assert_eq!(report.status_breakdown.blocked, 1);
        assert_eq!(report.reader_breakdown[&2], 3);
        assert_eq!(report.busiest_reader, Some(2));
        assert_eq!(report.unique_cards, 4);
        assert_eq!(report.hourly_distribution.len(), 24);
        assert_eq!(report.hourly_distribution.values().sum::<u64>(), 5);
        assert_eq!(report.top_users[0].name, "Alice");
        assert_eq!(report.top_users[0].count, 2);
    }

    #[test]
    fn test_analytics_window_and_filter() {
        let rows = vec![
            tx("Alice", 1, 1, AccessStatus::Granted, 60),
            tx("Bob", 2, 1, AccessStatus::Granted, 120),
            tx("Alice", 1, 1, AccessStatus::Granted, 3 * 86_400),
        ];

        let one_day = analytics(&rows, 1, None, now());
        assert_eq!(one_day.total_transactions, 2);

        let alice = analytics(&rows, 7, Some(CardCode::new(1)), now());
        assert_eq!(alice.total_transactions, 2);
        assert_eq!(alice.unique_cards, 1);
        assert_eq!(alice.card_filter, Some(CardCode::new(1)));
    }

    #[test]
    fn test_analytics_empty_has_no_peaks() {
        let report = analytics(&[], 7, None, now());
        assert_eq!(report.total_transactions, 0);
        assert_eq!(report.peak_hour, None);
        assert_eq!(report.peak_day, None);
        assert_eq!(report.busiest_reader, None);
        assert!(report.top_users.is_empty());
    }

    fn alice() -> ReportUser {
        ReportUser {
            name: "Alice".into(),
            card: CardCode::new(1),
            id: "u1".into(),
            ref_id: "R1".into(),
            blocked: false,
        }
    }

    #[test]
    fn test_user_report_for_known_card() {
        let rows = vec![
            tx("Alice", 1, 2, AccessStatus::Granted, 3_600),
            tx("Bob", 2, 1, AccessStatus::Granted, 100),
            tx("Alice", 1, 2, AccessStatus::Granted, 7_200),
            tx("Blocked", 1, 1, AccessStatus::Blocked, 86_400),
            tx("Alice", 1, 3, AccessStatus::Granted, 10 * 86_400),
        ];
        let report = user_report(alice(), &rows, 7, now());

        assert_eq!(report.user, alice());
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.granted, 2);
        assert_eq!(report.summary.blocked, 1);
        assert_eq!(report.avg_per_day, 0.43);
        assert_eq!(report.most_used_reader, Some(2));
        assert_eq!(report.reader_usage.get(&3), None);
        assert_eq!(report.hourly_pattern.values().sum::<u64>(), 3);
        assert_eq!(report.last_access, Some(now() - TimeDelta::seconds(3_600)));
        assert_eq!(report.first_access, Some(now() - TimeDelta::seconds(86_400)));

        let times: Vec<_> = report.timeline.iter().map(|e| e.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(report.timeline[2].status, AccessStatus::Blocked);
    }

    #[test]
    fn test_user_report_timeline_is_capped() {
        let rows: Vec<_> = (0..30)
            .map(|i| tx("Alice", 1, 1, AccessStatus::Granted, i * 60))
            .collect();
        let report = user_report(alice(), &rows, 1, now());

        assert_eq!(report.summary.total, 30);
        assert_eq!(report.avg_per_day, 30.0);
        assert_eq!(report.timeline.len(), TIMELINE_LEN);
        assert_eq!(report.timeline[0].timestamp, now());
    }

    #[test]
    fn test_user_report_with_empty_history() {
        let report = user_report(alice(), &[], 30, now());

        assert_eq!(report.summary, TodayCounts::default());
        assert_eq!(report.avg_per_day, 0.0);
        assert_eq!(report.favourite_hour, None);
        assert_eq!(report.most_used_reader, None);
        assert_eq!(report.first_access, None);
        assert_eq!(report.last_access, None);
        assert!(report.timeline.is_empty());
        assert_eq!(report.hourly_pattern.len(), 24);
        assert!(report.reader_usage.is_empty());
    }

    #[test]
    fn test_peak_prefers_first_key_on_tie() {
        let counts = BTreeMap::from([(1u8, 2u64), (2, 5), (3, 5)]);
        assert_eq!(peak(&counts), Some(2));
    }
}
