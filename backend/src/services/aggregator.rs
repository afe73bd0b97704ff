use chrono::{DateTime, NaiveDate, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use crate::constants::*;
use crate::models::{Period, TimeBucket, TipEvent};

/// Buckets resolved tips into a chart series.
///
/// "day" uses 15-minute `HH:MM` slots of the current calendar day; every other period uses
/// `YYYY-MM-DD` slots. Calendar boundaries follow the configured display timezone.
#[derive(Debug, Clone)]
pub struct TimeBucketAggregator {
    timezone: Tz,
}

impl Default for TimeBucketAggregator {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl TimeBucketAggregator {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Buckets ordered by key. `now` anchors the calendar window used for filling.
    pub fn aggregate(
        &self,
        events: &[TipEvent],
        period: Period,
        fill_empty: bool,
        now: DateTime<Utc>,
    ) -> Vec<TimeBucket> {
        let today = now.with_timezone(&self.timezone).date_naive();

        let window = if fill_empty { self.window_keys(period, today) } else { None };
        let mut buckets: BTreeMap<String, TimeBucket> = window
            .iter()
            .flatten()
            .map(|key| (key.clone(), TimeBucket::empty(key.clone())))
            .collect();

        for event in events {
            let Some(key) = event.timestamp.and_then(|ts| self.bucket_key(period, ts, today)) else {
                continue;
            };

            let bucket = if window.is_some() {
                match buckets.get_mut(&key) {
                    Some(bucket) => bucket,
                    // outside the filled window
                    None => continue,
                }
            } else {
                buckets
                    .entry(key.clone())
                    .or_insert_with(|| TimeBucket::empty(key))
            };
            bucket.amount_sum = bucket.amount_sum.saturating_add(event.amount);
            bucket.tip_count += 1;
        }

        buckets.into_values().collect()
    }

    /// Slot for a resolved timestamp, `None` for the unresolved sentinel or, for "day",
    /// a timestamp outside the current calendar day.
    pub fn bucket_key(&self, period: Period, timestamp: u64, today: NaiveDate) -> Option<String> {
        if timestamp == UNRESOLVED_TIMESTAMP {
            return None;
        }
        let local = DateTime::<Utc>::from_timestamp(timestamp as i64, 0)?.with_timezone(&self.timezone);

        match period {
            Period::Day => {
                if local.date_naive() != today {
                    return None;
                }
                let slot_minute = local.minute() / DAY_BUCKET_MINUTES * DAY_BUCKET_MINUTES;
                Some(format!("{:02}:{:02}", local.hour(), slot_minute))
            }
            Period::Week | Period::Month | Period::All => Some(local.date_naive().format("%Y-%m-%d").to_string()),
        }
    }

    /// Every slot of the period's calendar window, or `None` when the period has no window.
    fn window_keys(&self, period: Period, today: NaiveDate) -> Option<Vec<String>> {
        match period {
            Period::Day => Some(
                (0..DAY_BUCKET_COUNT as u32)
                    .map(|slot| {
                        let minutes = slot * DAY_BUCKET_MINUTES;
                        format!("{:02}:{:02}", minutes / 60, minutes % 60)
                    })
                    .collect(),
            ),
            Period::Week => Some(trailing_days(today, WEEK_BUCKET_DAYS)),
            Period::Month => Some(trailing_days(today, MONTH_BUCKET_DAYS)),
            Period::All => None,
        }
    }
}

/// `days` calendar dates ending with `today`, oldest first
fn trailing_days(today: NaiveDate, days: i64) -> Vec<String> {
    (0..days)
        .rev()
        .map(|offset| (today - TimeDelta::days(offset)).format("%Y-%m-%d").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use chrono::TimeZone;

    fn tip(amount: u64, timestamp: Option<u64>) -> TipEvent {
        TipEvent {
            sender: "0xabc".to_string(),
            amount: U256::from(amount),
            block_number: 1,
            transaction_hash: "0x01".to_string(),
            timestamp,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn ts(hour: u32, minute: u32) -> u64 {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, minute, 0).unwrap().timestamp() as u64
    }

    #[test]
    fn test_day_fill_always_has_96_buckets() {
        let aggregator = TimeBucketAggregator::default();

        let empty = aggregator.aggregate(&[], Period::Day, true, noon());
        assert_eq!(empty.len(), 96);
        assert_eq!(empty[0].key, "00:00");
        assert_eq!(empty[95].key, "23:45");
        assert!(empty.iter().all(|b| b.amount_sum.is_zero()));

        let events = vec![tip(5, Some(ts(10, 7))), tip(7, Some(ts(10, 14))), tip(1, Some(ts(23, 59)))];
        let filled = aggregator.aggregate(&events, Period::Day, true, noon());
        assert_eq!(filled.len(), 96);
        let slot = filled.iter().find(|b| b.key == "10:00").unwrap();
        assert_eq!(slot.amount_sum, U256::from(12u64));
        assert_eq!(slot.tip_count, 2);
        assert_eq!(filled[95].amount_sum, U256::from(1u64));
    }

    #[test]
    fn test_unfilled_emits_only_active_buckets() {
        let aggregator = TimeBucketAggregator::default();
        let events = vec![tip(5, Some(ts(18, 30))), tip(3, Some(ts(1, 0))), tip(9, None), tip(4, Some(0))];

        let buckets = aggregator.aggregate(&events, Period::Day, false, noon());

        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["01:00", "18:30"]);
    }

    #[test]
    fn test_day_ignores_other_calendar_days() {
        let aggregator = TimeBucketAggregator::default();
        let yesterday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap().timestamp() as u64;

        let buckets = aggregator.aggregate(&[tip(5, Some(yesterday))], Period::Day, true, noon());

        assert!(buckets.iter().all(|b| b.amount_sum.is_zero()));
    }

    #[test]
    fn test_week_fill_covers_trailing_days() {
        let aggregator = TimeBucketAggregator::default();
        let two_days_ago = Utc.with_ymd_and_hms(2024, 3, 8, 23, 0, 0).unwrap().timestamp() as u64;
        let long_ago = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp() as u64;

        let buckets = aggregator.aggregate(
            &[tip(2, Some(two_days_ago)), tip(8, Some(long_ago))],
            Period::Week,
            true,
            noon(),
        );

        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].key, "2024-03-04");
        assert_eq!(buckets[6].key, "2024-03-10");
        assert_eq!(buckets[4].amount_sum, U256::from(2u64));
        assert_eq!(buckets.iter().map(|b| b.tip_count).sum::<usize>(), 1);
    }

    #[test]
    fn test_all_never_fills() {
        let aggregator = TimeBucketAggregator::default();
        let long_ago = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap().timestamp() as u64;

        let buckets = aggregator.aggregate(&[tip(8, Some(long_ago))], Period::All, true, noon());

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].key, "2023-06-01");
    }

    #[test]
    fn test_aggregation_is_order_independent() {
        let aggregator = TimeBucketAggregator::default();
        let mut events = vec![
            tip(5, Some(ts(3, 0))),
            tip(7, Some(ts(3, 10))),
            tip(11, Some(ts(9, 45))),
            tip(13, None),
        ];

        let first = aggregator.aggregate(&events, Period::Day, true, noon());
        events.reverse();
        let second = aggregator.aggregate(&events, Period::Day, true, noon());
        let third = aggregator.aggregate(&events, Period::Day, true, noon());

        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[test]
    fn test_display_timezone_moves_calendar_boundaries() {
        let tokyo = TimeBucketAggregator::new(chrono_tz::Asia::Tokyo);
        // 2024-03-10 16:30 UTC is 2024-03-11 01:30 in Tokyo
        let late = Utc.with_ymd_and_hms(2024, 3, 10, 16, 30, 0).unwrap();

        let buckets = tokyo.aggregate(&[tip(4, Some(late.timestamp() as u64))], Period::Day, false, late);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].key, "01:30");
    }

    #[test]
    fn test_sums_do_not_lose_precision() {
        let aggregator = TimeBucketAggregator::default();
        let huge = U256::MAX / U256::from(4u64);
        let mut a = tip(0, Some(ts(5, 0)));
        a.amount = huge;
        let mut b = a.clone();
        b.amount = U256::from(1u64);

        let buckets = aggregator.aggregate(&[a, b], Period::Day, false, noon());

        assert_eq!(buckets[0].amount_sum, huge + U256::from(1u64));
    }
}
