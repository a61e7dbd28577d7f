//! Fixed catalog of follow-up strategies and the rules that pick one.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Channel, FollowUpStrategy, Priority, StrategyId};

static CATALOG: [FollowUpStrategy; 5] = [
    FollowUpStrategy {
        id: StrategyId::WelcomeNewClient,
        name: "Bienvenue nouveau client",
        trigger_conditions: &["first_reservation", "days_since_last_activity < 7"],
        priority: Priority::Medium,
        channels: &[Channel::Email, Channel::Push],
        cooldown_days: 30,
    },
    FollowUpStrategy {
        id: StrategyId::InactiveClientReminder,
        name: "Relance client inactif",
        trigger_conditions: &["days_since_last_activity > 30"],
        priority: Priority::High,
        channels: &[Channel::Email, Channel::Sms],
        cooldown_days: 14,
    },
    FollowUpStrategy {
        id: StrategyId::HighValueClientRetention,
        name: "Fidélisation client VIP",
        trigger_conditions: &["lifetime_value > 500", "days_since_last_activity > 14"],
        priority: Priority::Urgent,
        channels: &[Channel::Email, Channel::Sms, Channel::Push],
        cooldown_days: 7,
    },
    FollowUpStrategy {
        id: StrategyId::CancellationFollowup,
        name: "Suivi après annulation",
        trigger_conditions: &["reservation_cancelled"],
        priority: Priority::High,
        channels: &[Channel::Email],
        cooldown_days: 3,
    },
    FollowUpStrategy {
        id: StrategyId::SeasonalPromotion,
        name: "Promotion saisonnière",
        trigger_conditions: &["active_client", "seasonal_campaign"],
        priority: Priority::Low,
        channels: &[Channel::Email, Channel::Push],
        cooldown_days: 21,
    },
];

/// All catalog entries in declaration order.
pub fn catalog() -> &'static [FollowUpStrategy] {
    &CATALOG
}

/// Looks up a catalog entry. Every `StrategyId` has exactly one entry.
pub fn strategy(id: StrategyId) -> &'static FollowUpStrategy {
    CATALOG
        .iter()
        .find(|s| s.id == id)
        .unwrap_or(&CATALOG[CATALOG.len() - 1])
}

/// Picks the strategy for a client. First matching rule wins.
///
/// `_engagement_score` is part of the signature for callers but does not
/// influence the outcome.
pub fn select_strategy(
    _risk_score: u8,
    _engagement_score: u8,
    days_since_last: i64,
    lifetime_value: f64,
) -> StrategyId {
    if lifetime_value > 500.0 && days_since_last > 14 {
        StrategyId::HighValueClientRetention
    } else if days_since_last > 30 {
        StrategyId::InactiveClientReminder
    } else if days_since_last < 7 {
        StrategyId::WelcomeNewClient
    } else {
        StrategyId::SeasonalPromotion
    }
}

/// When the next follow-up for a client should happen. Checks run in this
/// exact order and the first match wins.
pub fn next_follow_up_date(
    now: DateTime<Utc>,
    risk_score: u8,
    engagement_score: u8,
    days_since_last: i64,
) -> DateTime<Utc> {
    let days = if risk_score > 70 {
        1
    } else if risk_score > 50 {
        3
    } else if engagement_score < 30 {
        5
    } else if days_since_last > 60 {
        2
    } else {
        7
    };

    now + Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_one_entry_per_id() {
        for id in [
            StrategyId::WelcomeNewClient,
            StrategyId::InactiveClientReminder,
            StrategyId::HighValueClientRetention,
            StrategyId::CancellationFollowup,
            StrategyId::SeasonalPromotion,
        ] {
            assert_eq!(strategy(id).id, id);
            assert_eq!(catalog().iter().filter(|s| s.id == id).count(), 1);
            assert!(!strategy(id).channels.is_empty());
        }
    }

    #[test]
    fn test_selection_order() {
        // High value wins over inactivity
        assert_eq!(
            select_strategy(0, 0, 120, 800.0),
            StrategyId::HighValueClientRetention
        );
        assert_eq!(
            select_strategy(0, 0, 120, 500.0),
            StrategyId::InactiveClientReminder
        );
        assert_eq!(
            select_strategy(0, 0, 10, 900.0),
            StrategyId::SeasonalPromotion
        );
        assert_eq!(select_strategy(0, 0, 6, 0.0), StrategyId::WelcomeNewClient);
        assert_eq!(select_strategy(0, 0, 7, 0.0), StrategyId::SeasonalPromotion);
        assert_eq!(select_strategy(0, 0, 30, 0.0), StrategyId::SeasonalPromotion);
        assert_eq!(
            select_strategy(0, 0, 31, 0.0),
            StrategyId::InactiveClientReminder
        );
    }

    #[test]
    fn test_selection_ignores_engagement() {
        for engagement in [0, 39, 40, 100] {
            assert_eq!(
                select_strategy(10, engagement, 20, 100.0),
                StrategyId::SeasonalPromotion
            );
        }
    }

    #[test]
    fn test_next_follow_up_date_rules() {
        let now = Utc::now();
        assert_eq!(next_follow_up_date(now, 71, 100, 0), now + Duration::days(1));
        assert_eq!(next_follow_up_date(now, 51, 10, 90), now + Duration::days(3));
        assert_eq!(next_follow_up_date(now, 50, 29, 90), now + Duration::days(5));
        assert_eq!(next_follow_up_date(now, 50, 30, 61), now + Duration::days(2));
        assert_eq!(next_follow_up_date(now, 0, 100, 0), now + Duration::days(7));
    }
}
