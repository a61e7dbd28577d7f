use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

// ============ Reservation History ============

/// Lifecycle status of a reservation as recorded by the booking site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            // The booking site has historically written both spellings.
            "cancelled" | "canceled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            other => Err(AppError::BadRequest(format!(
                "Unknown reservation status '{}'",
                other
            ))),
        }
    }
}

/// One historical booking event for a client. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRecord {
    /// Client identifier (email address).
    pub client_email: String,
    pub created_at: DateTime<Utc>,
    /// Amount paid. Never negative.
    pub amount: BigDecimal,
    pub status: ReservationStatus,
    /// Kind of space booked (e.g. "bureau privé", "salle de réunion").
    pub space_type: String,
    /// Activity declared at booking time.
    pub activity: Option<String>,
    /// Payment method label as stored by the payment flow.
    pub payment_method: Option<String>,
    pub phone: Option<String>,
    pub client_name: Option<String>,
}

impl ReservationRecord {
    /// Whether the reservation was paid with a mobile-money wallet.
    pub fn paid_with_mobile_money(&self) -> bool {
        self.payment_method
            .as_deref()
            .map(is_mobile_money_method)
            .unwrap_or(false)
    }
}

/// Recognises Orange Money / Airtel Money style payment labels.
pub fn is_mobile_money_method(method: &str) -> bool {
    let normalized: String = method
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect();

    matches!(
        normalized.as_str(),
        "orange_money" | "orangemoney" | "airtel_money" | "airtelmoney" | "mpesa" | "m_pesa"
            | "mobile_money"
    )
}

/// Raw row of the `reservations` table.
#[derive(Debug, Clone, FromRow)]
pub struct ReservationRow {
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub amount: Option<BigDecimal>,
    pub status: String,
    pub space_type: Option<String>,
    pub activity: Option<String>,
    pub payment_method: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
}

impl From<ReservationRow> for ReservationRecord {
    fn from(row: ReservationRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("Reservation for {} has {}; treating as pending", row.email, e);
            ReservationStatus::Pending
        });

        // Refunds are recorded as separate rows; a negative amount here is bad data.
        let amount = row
            .amount
            .filter(|a| *a > BigDecimal::zero())
            .unwrap_or_else(BigDecimal::zero);

        Self {
            client_email: row.email.trim().to_lowercase(),
            created_at: row.created_at,
            amount,
            status,
            space_type: row.space_type.unwrap_or_default(),
            activity: row.activity.filter(|a| !a.trim().is_empty()),
            payment_method: row.payment_method,
            phone: row.phone.filter(|p| !p.trim().is_empty()),
            client_name: row.full_name.filter(|n| !n.trim().is_empty()),
        }
    }
}

// ============ Channels & Strategies ============

/// Outbound channel a follow-up can be delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "push" => Ok(Channel::Push),
            other => Err(AppError::BadRequest(format!("Unknown channel '{}'", other))),
        }
    }
}

/// Identifier of an entry in the fixed strategy catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    WelcomeNewClient,
    InactiveClientReminder,
    HighValueClientRetention,
    CancellationFollowup,
    SeasonalPromotion,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::WelcomeNewClient => "welcome_new_client",
            StrategyId::InactiveClientReminder => "inactive_client_reminder",
            StrategyId::HighValueClientRetention => "high_value_client_retention",
            StrategyId::CancellationFollowup => "cancellation_followup",
            StrategyId::SeasonalPromotion => "seasonal_promotion",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome_new_client" => Ok(StrategyId::WelcomeNewClient),
            "inactive_client_reminder" => Ok(StrategyId::InactiveClientReminder),
            "high_value_client_retention" => Ok(StrategyId::HighValueClientRetention),
            "cancellation_followup" => Ok(StrategyId::CancellationFollowup),
            "seasonal_promotion" => Ok(StrategyId::SeasonalPromotion),
            other => Err(AppError::BadRequest(format!("Unknown strategy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(AppError::BadRequest(format!("Unknown priority '{}'", other))),
        }
    }
}

/// Static catalog entry describing an outreach strategy.
#[derive(Debug, Clone, Serialize)]
pub struct FollowUpStrategy {
    pub id: StrategyId,
    pub name: &'static str,
    /// Human-readable description of when the strategy applies. Not evaluated.
    pub trigger_conditions: &'static [&'static str],
    pub priority: Priority,
    /// Channels in order of preference.
    pub channels: &'static [Channel],
    /// Minimum number of days between two follow-ups of this strategy for one client.
    pub cooldown_days: i64,
}

// ============ Insights ============

/// Derived, never-persisted view of a client's engagement.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInsight {
    pub client_email: String,
    pub client_name: Option<String>,
    pub phone: Option<String>,
    /// Churn likelihood heuristic in [0, 100].
    pub risk_score: u8,
    /// Active-interest heuristic in [0, 100].
    pub engagement_score: u8,
    pub lifetime_value: BigDecimal,
    pub preferred_channels: Vec<Channel>,
    pub best_contact_times: Vec<String>,
    pub interests: BTreeSet<String>,
    pub reservation_count: usize,
    pub cancellation_count: usize,
    pub days_since_last_activity: i64,
    pub last_activity_at: DateTime<Utc>,
    pub next_follow_up_at: DateTime<Utc>,
    pub recommended_strategy: StrategyId,
}

// ============ Generated Follow-ups ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    Pending,
    /// Claimed by a sender; delivery is in progress.
    Sending,
    Sent,
    Cancelled,
    Failed,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpStatus::Pending => "pending",
            FollowUpStatus::Sending => "sending",
            FollowUpStatus::Sent => "sent",
            FollowUpStatus::Cancelled => "cancelled",
            FollowUpStatus::Failed => "failed",
        }
    }
}

impl FromStr for FollowUpStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FollowUpStatus::Pending),
            "sending" => Ok(FollowUpStatus::Sending),
            "sent" => Ok(FollowUpStatus::Sent),
            "cancelled" => Ok(FollowUpStatus::Cancelled),
            "failed" => Ok(FollowUpStatus::Failed),
            other => Err(AppError::BadRequest(format!(
                "Unknown follow-up status '{}'",
                other
            ))),
        }
    }
}

/// A single outreach message, persisted once and then only status-updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFollowUp {
    pub id: Uuid,
    pub client_email: String,
    pub strategy_id: StrategyId,
    pub subject: String,
    pub message: String,
    pub channel: Channel,
    pub scheduled_at: DateTime<Utc>,
    pub priority: Priority,
    /// Cosmetic value in [70, 100]; carries no statistical meaning.
    pub confidence: u8,
    pub generated_at: DateTime<Utc>,
    pub status: FollowUpStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Raw row of the `ai_follow_ups` table.
#[derive(Debug, Clone, FromRow)]
pub struct FollowUpRow {
    pub id: Uuid,
    pub client_email: String,
    pub strategy_id: String,
    pub subject: String,
    pub message: String,
    pub channel: String,
    pub scheduled_at: DateTime<Utc>,
    pub priority: String,
    pub confidence: i16,
    pub generated_at: DateTime<Utc>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<FollowUpRow> for GeneratedFollowUp {
    type Error = AppError;

    fn try_from(row: FollowUpRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            client_email: row.client_email,
            strategy_id: row.strategy_id.parse()?,
            subject: row.subject,
            message: row.message,
            channel: row.channel.parse()?,
            scheduled_at: row.scheduled_at,
            priority: row.priority.parse()?,
            confidence: row.confidence.clamp(0, 100) as u8,
            generated_at: row.generated_at,
            status: row.status.parse()?,
            sent_at: row.sent_at,
        })
    }
}
