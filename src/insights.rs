//! Metric calculation over a client's reservation history.
//!
//! Every call recomputes the insight from scratch. Nothing here touches the
//! network or the database, so the whole module is driven by `now` to stay
//! deterministic under test.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeSet;

use crate::errors::AppError;
use crate::models::{Channel, ClientInsight, ReservationRecord, ReservationStatus};
use crate::strategies::{next_follow_up_date, select_strategy};

const MORNING_SLOTS: [&str; 3] = ["09:00", "10:00", "11:00"];
const AFTERNOON_SLOTS: [&str; 3] = ["14:00", "15:00", "16:00"];

/// Whole days elapsed between `then` and `now`. Timestamps in the future count as zero.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(0)
}

/// Churn-risk heuristic in [0, 100] from recency, spend and cancellations.
pub fn risk_score(days_since_last: i64, lifetime_value: &BigDecimal, cancellations: usize) -> u8 {
    let mut score: u64 = 0;

    score += if days_since_last > 90 {
        40
    } else if days_since_last > 60 {
        30
    } else if days_since_last > 30 {
        20
    } else if days_since_last > 14 {
        10
    } else {
        0
    };

    score += if *lifetime_value > BigDecimal::from(1000) {
        30
    } else if *lifetime_value > BigDecimal::from(500) {
        20
    } else if *lifetime_value > BigDecimal::from(100) {
        10
    } else {
        0
    };

    score += 5 * cancellations as u64;

    score.min(100) as u8
}

/// Active-interest heuristic in [0, 100] from recency and booking frequency.
pub fn engagement_score(days_since_last: i64, reservation_count: usize) -> u8 {
    let mut score: f64 = 100.0;

    score -= if days_since_last > 90 {
        60.0
    } else if days_since_last > 60 {
        40.0
    } else if days_since_last > 30 {
        20.0
    } else if days_since_last > 14 {
        10.0
    } else {
        0.0
    };

    let months = (days_since_last as f64 / 30.0).max(1.0);
    let frequency = reservation_count as f64 / months;
    score += (10.0 * frequency).min(30.0);

    score.round().clamp(0.0, 100.0) as u8
}

/// `email` always; `sms` as well when the client ever paid by mobile money.
pub fn preferred_channels(records: &[ReservationRecord]) -> Vec<Channel> {
    let mut channels = vec![Channel::Email];
    if records.iter().any(ReservationRecord::paid_with_mobile_money) {
        channels.push(Channel::Sms);
    }
    channels
}

/// Morning slots when the client books more often between 9h and 12h than
/// between 14h and 17h, afternoon slots otherwise.
pub fn best_contact_times(records: &[ReservationRecord]) -> Vec<String> {
    let (morning, afternoon) =
        records
            .iter()
            .fold((0usize, 0usize), |(morning, afternoon), record| {
                match record.created_at.hour() {
                    9..=12 => (morning + 1, afternoon),
                    14..=17 => (morning, afternoon + 1),
                    _ => (morning, afternoon),
                }
            });

    let slots = if morning > afternoon {
        MORNING_SLOTS
    } else {
        AFTERNOON_SLOTS
    };
    slots.iter().map(|s| s.to_string()).collect()
}

/// Distinct space types and non-empty activities.
pub fn interests(records: &[ReservationRecord]) -> BTreeSet<String> {
    let mut interests = BTreeSet::new();
    for record in records {
        if !record.space_type.trim().is_empty() {
            interests.insert(record.space_type.trim().to_string());
        }
        if let Some(activity) = record.activity.as_deref().map(str::trim) {
            if !activity.is_empty() {
                interests.insert(activity.to_string());
            }
        }
    }
    interests
}

/// Derives the full insight for one client.
///
/// The records do not need to be sorted; the most recent `created_at` is used
/// as the last activity. Fails with `NotFound` when the history is empty.
pub fn calculate_insight(
    client_email: &str,
    records: &[ReservationRecord],
    now: DateTime<Utc>,
) -> Result<ClientInsight, AppError> {
    let latest = records
        .iter()
        .max_by_key(|r| r.created_at)
        .ok_or_else(|| {
            AppError::NotFound(format!("No reservation history for client {}", client_email))
        })?;

    let last_activity_at = latest.created_at;
    let days_since_last = days_since(last_activity_at, now);

    let lifetime_value: BigDecimal = records
        .iter()
        .fold(BigDecimal::zero(), |acc, r| acc + &r.amount);
    let cancellation_count = records
        .iter()
        .filter(|r| r.status == ReservationStatus::Cancelled)
        .count();

    let risk = risk_score(days_since_last, &lifetime_value, cancellation_count);
    let engagement = engagement_score(days_since_last, records.len());

    let ltv = lifetime_value.to_f64().unwrap_or(0.0);
    let recommended_strategy = select_strategy(risk, engagement, days_since_last, ltv);
    let next_follow_up_at = next_follow_up_date(now, risk, engagement, days_since_last);

    let client_name = records
        .iter()
        .filter(|r| r.client_name.is_some())
        .max_by_key(|r| r.created_at)
        .and_then(|r| r.client_name.clone());
    let phone = records
        .iter()
        .filter(|r| r.phone.is_some())
        .max_by_key(|r| r.created_at)
        .and_then(|r| r.phone.clone());

    tracing::debug!(
        "Insight for {}: risk={} engagement={} days_since_last={} ltv={}",
        client_email,
        risk,
        engagement,
        days_since_last,
        lifetime_value
    );

    Ok(ClientInsight {
        client_email: client_email.to_string(),
        client_name,
        phone,
        risk_score: risk,
        engagement_score: engagement,
        lifetime_value,
        preferred_channels: preferred_channels(records),
        best_contact_times: best_contact_times(records),
        interests: interests(records),
        reservation_count: records.len(),
        cancellation_count,
        days_since_last_activity: days_since_last,
        last_activity_at,
        next_follow_up_at,
        recommended_strategy,
    })
}
