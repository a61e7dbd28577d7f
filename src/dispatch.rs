use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};

use crate::insights::days_since;
use crate::models::{Channel, ClientInsight, FollowUpStrategy};

/// Decides whether a follow-up should be generated for this client now.
///
/// The strategy catalog's trigger conditions are not consulted here.
pub fn should_send_follow_up(insight: &ClientInsight, now: DateTime<Utc>) -> bool {
    let days = days_since(insight.last_activity_at, now);
    let ltv = ltv_as_f64(&insight.lifetime_value);

    insight.risk_score > 50
        || insight.engagement_score < 40
        || days > 30
        || (ltv > 500.0 && days > 14)
}

/// First channel of the strategy that the client prefers, falling back to email.
pub fn choose_channel(strategy: &FollowUpStrategy, insight: &ClientInsight) -> Channel {
    strategy
        .channels
        .iter()
        .copied()
        .find(|c| insight.preferred_channels.contains(c))
        .unwrap_or(Channel::Email)
}

fn ltv_as_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
