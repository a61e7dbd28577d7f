/// Follow-up workflow shared by the HTTP handlers and the scheduler.
///
/// For one client:
/// 1. Load reservation history
/// 2. Compute the insight (risk, engagement, channels, interests)
/// 3. Gate: should this client be contacted now?
/// 4. Pick the strategy and render its message
/// 5. Persist the follow-up as `pending`
///
/// Sending happens later (`send_follow_up` / `dispatch_due_follow_ups`) and
/// only updates the follow-up's status.
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::channels::{ChannelRegistry, OutboundMessage};
use crate::content::generate_content;
use crate::dispatch::{choose_channel, should_send_follow_up};
use crate::db_storage::{FollowUpStore, ReservationSource};
use crate::errors::{AppError, ResultExt};
use crate::insights::calculate_insight;
use crate::models::{
    Channel, ClientInsight, FollowUpStatus, GeneratedFollowUp, ReservationRecord, StrategyId,
};
use crate::strategies::strategy;

/// Maximum number of due follow-ups sent in one dispatch pass.
const DISPATCH_BATCH_LIMIT: i64 = 500;

/// Why a client got no follow-up this time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// None of the contact triggers fired.
    NotDue,
    /// The same strategy was generated for this client within its cooldown.
    Cooldown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { follow_up: GeneratedFollowUp },
    Skipped { reason: SkipReason },
}

/// Counters of one automatic batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub clients_analyzed: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub follow_up_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Claimed by a concurrent sender or cancelled before this pass got to it.
    pub skipped: usize,
}

/// Aggregate view over recently generated follow-ups.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FollowUpStats {
    pub total: usize,
    pub by_status: BTreeMap<FollowUpStatus, usize>,
    pub by_channel: BTreeMap<Channel, usize>,
    pub by_strategy: BTreeMap<StrategyId, usize>,
    pub average_confidence: f64,
    /// Percentage of send attempts that succeeded (sent / (sent + failed)).
    pub success_rate: f64,
}

impl FollowUpStats {
    pub fn from_follow_ups(follow_ups: &[GeneratedFollowUp]) -> Self {
        let mut stats = FollowUpStats {
            total: follow_ups.len(),
            ..Default::default()
        };

        for f in follow_ups {
            *stats.by_status.entry(f.status).or_insert(0) += 1;
            *stats.by_channel.entry(f.channel).or_insert(0) += 1;
            *stats.by_strategy.entry(f.strategy_id).or_insert(0) += 1;
        }

        if !follow_ups.is_empty() {
            let sum: u64 = follow_ups.iter().map(|f| f.confidence as u64).sum();
            stats.average_confidence = sum as f64 / follow_ups.len() as f64;
        }

        let sent = stats.by_status.get(&FollowUpStatus::Sent).copied().unwrap_or(0);
        let failed = stats
            .by_status
            .get(&FollowUpStatus::Failed)
            .copied()
            .unwrap_or(0);
        if sent + failed > 0 {
            stats.success_rate = sent as f64 * 100.0 / (sent + failed) as f64;
        }

        stats
    }
}

/// Stateless follow-up service; collaborators are injected.
#[derive(Clone)]
pub struct FollowUpService {
    reservations: Arc<dyn ReservationSource>,
    follow_ups: Arc<dyn FollowUpStore>,
    channels: ChannelRegistry,
}

impl FollowUpService {
    pub fn new(
        reservations: Arc<dyn ReservationSource>,
        follow_ups: Arc<dyn FollowUpStore>,
        channels: ChannelRegistry,
    ) -> Self {
        Self {
            reservations,
            follow_ups,
            channels,
        }
    }

    /// Computes a fresh insight for one client.
    pub async fn analyze_client(&self, email: &str) -> Result<ClientInsight, AppError> {
        self.analyze_client_at(email, Utc::now()).await
    }

    pub async fn analyze_client_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<ClientInsight, AppError> {
        let email = normalize_email(email);
        let history = self.reservations.history_for_client(&email).await?;
        calculate_insight(&email, &history, now)
    }

    /// Runs the full pipeline for one client and persists a follow-up when due.
    pub async fn generate_follow_up(&self, email: &str) -> Result<GenerationOutcome, AppError> {
        self.generate_follow_up_at(email, Utc::now()).await
    }

    pub async fn generate_follow_up_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<GenerationOutcome, AppError> {
        let insight = self.analyze_client_at(email, now).await?;
        self.generate_from_insight(insight, now).await
    }

    /// Generates a follow-up with an explicitly chosen strategy, bypassing the
    /// contact triggers and the cooldown.
    pub async fn generate_follow_up_with_strategy(
        &self,
        email: &str,
        strategy_id: StrategyId,
    ) -> Result<GeneratedFollowUp, AppError> {
        let now = Utc::now();
        let insight = self.analyze_client_at(email, now).await?;
        tracing::info!(
            "Manual follow-up for {} with strategy {}",
            insight.client_email,
            strategy_id
        );
        self.persist_follow_up(&insight, strategy_id, now).await
    }

    async fn generate_from_insight(
        &self,
        insight: ClientInsight,
        now: DateTime<Utc>,
    ) -> Result<GenerationOutcome, AppError> {
        if !should_send_follow_up(&insight, now) {
            tracing::debug!("No follow-up due for {}", insight.client_email);
            return Ok(GenerationOutcome::Skipped {
                reason: SkipReason::NotDue,
            });
        }

        let strategy_id = insight.recommended_strategy;
        let cooldown = Duration::days(strategy(strategy_id).cooldown_days);
        if let Some(last) = self
            .follow_ups
            .last_generated_at(&insight.client_email, strategy_id)
            .await?
        {
            if now - last < cooldown {
                tracing::info!(
                    "Skipping {} for {}: last generated at {}",
                    strategy_id,
                    insight.client_email,
                    last
                );
                return Ok(GenerationOutcome::Skipped {
                    reason: SkipReason::Cooldown,
                });
            }
        }

        let follow_up = self.persist_follow_up(&insight, strategy_id, now).await?;
        Ok(GenerationOutcome::Generated { follow_up })
    }

    async fn persist_follow_up(
        &self,
        insight: &ClientInsight,
        strategy_id: StrategyId,
        now: DateTime<Utc>,
    ) -> Result<GeneratedFollowUp, AppError> {
        let entry = strategy(strategy_id);
        let content = generate_content(strategy_id, insight);

        let follow_up = GeneratedFollowUp {
            id: Uuid::new_v4(),
            client_email: insight.client_email.clone(),
            strategy_id,
            subject: content.subject,
            message: content.message,
            channel: choose_channel(entry, insight),
            scheduled_at: schedule_time(insight),
            priority: entry.priority,
            confidence: content.confidence,
            generated_at: now,
            status: FollowUpStatus::Pending,
            sent_at: None,
        };

        self.follow_ups.insert(&follow_up).await?;
        tracing::info!(
            "✓ Follow-up {} ({}) stored for {} via {}",
            follow_up.id,
            strategy_id,
            follow_up.client_email,
            follow_up.channel
        );
        Ok(follow_up)
    }

    /// Analyses every client with history and stores the follow-ups that are due.
    ///
    /// A failing client is logged and counted; it never aborts the batch.
    pub async fn generate_automatic_follow_ups(&self) -> Result<BatchReport, AppError> {
        self.generate_automatic_follow_ups_at(Utc::now()).await
    }

    pub async fn generate_automatic_follow_ups_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, AppError> {
        let history = self
            .reservations
            .all_history()
            .await
            .context("Automatic follow-up batch")?;
        let clients = group_by_client(history);

        tracing::info!("Starting automatic follow-ups for {} client(s)", clients.len());
        let mut report = BatchReport::default();

        for (email, records) in clients {
            report.clients_analyzed += 1;

            let outcome = match calculate_insight(&email, &records, now) {
                Ok(insight) => self.generate_from_insight(insight, now).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(GenerationOutcome::Generated { follow_up }) => {
                    report.generated += 1;
                    report.follow_up_ids.push(follow_up.id);
                }
                Ok(GenerationOutcome::Skipped { .. }) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("✗ Follow-up generation failed for {}: {}", email, e);
                }
            }
        }

        tracing::info!(
            "Automatic follow-ups complete: {} analyzed, {} generated, {} skipped, {} failed",
            report.clients_analyzed,
            report.generated,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Sends one pending follow-up through its channel and records the outcome.
    ///
    /// A send failure marks the follow-up `failed` and is not returned as an
    /// error; store failures are.
    pub async fn send_follow_up(&self, id: Uuid) -> Result<GeneratedFollowUp, AppError> {
        let follow_up = self.get_follow_up(id).await?;
        if follow_up.status != FollowUpStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "Follow-up {} is {} and cannot be sent",
                id,
                follow_up.status.as_str()
            )));
        }

        self.claim_and_send(follow_up).await?.ok_or_else(|| {
            AppError::BadRequest(format!("Follow-up {} is no longer pending", id))
        })
    }

    /// Claims the follow-up (`pending` -> `sending`), delivers it and writes
    /// the final status. `None` means another caller claimed it first.
    async fn claim_and_send(
        &self,
        mut follow_up: GeneratedFollowUp,
    ) -> Result<Option<GeneratedFollowUp>, AppError> {
        let id = follow_up.id;
        let claimed = self
            .follow_ups
            .transition_status(id, FollowUpStatus::Pending, FollowUpStatus::Sending, None)
            .await?;
        if !claimed {
            tracing::info!("⏭ Follow-up {} already claimed, not sending", id);
            return Ok(None);
        }

        let (status, sent_at) = match self.deliver(&follow_up).await {
            Ok(()) => (FollowUpStatus::Sent, Some(Utc::now())),
            Err(e) => {
                tracing::warn!("✗ Follow-up {} failed: {}", id, e);
                (FollowUpStatus::Failed, None)
            }
        };

        let recorded = self
            .follow_ups
            .transition_status(id, FollowUpStatus::Sending, status, sent_at)
            .await
            .with_context(|| format!("Recording {} outcome of follow-up {}", status.as_str(), id))?;
        if !recorded {
            return Err(AppError::InternalError(format!(
                "Follow-up {} left the sending state during delivery",
                id
            )));
        }

        follow_up.status = status;
        follow_up.sent_at = sent_at;
        Ok(Some(follow_up))
    }

    async fn deliver(&self, follow_up: &GeneratedFollowUp) -> Result<(), AppError> {
        let sender = self.channels.sender(follow_up.channel).ok_or_else(|| {
            AppError::SendFailure(format!("No sender configured for {}", follow_up.channel))
        })?;

        let phone = if follow_up.channel == Channel::Sms {
            self.latest_phone(&follow_up.client_email).await
        } else {
            None
        };

        let message = OutboundMessage {
            follow_up_id: follow_up.id,
            strategy_id: follow_up.strategy_id,
            client_email: follow_up.client_email.clone(),
            phone,
            subject: follow_up.subject.clone(),
            body: follow_up.message.clone(),
        };

        sender.send(&message).await
    }

    async fn latest_phone(&self, email: &str) -> Option<String> {
        match self.reservations.history_for_client(email).await {
            Ok(history) => history
                .into_iter()
                .filter(|r| r.phone.is_some())
                .max_by_key(|r| r.created_at)
                .and_then(|r| r.phone),
            Err(e) => {
                tracing::warn!("Could not look up phone for {}: {}", email, e);
                None
            }
        }
    }

    /// Sends every pending follow-up scheduled at or before `now`.
    pub async fn dispatch_due_follow_ups(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, AppError> {
        let due = self.follow_ups.due_pending(now, DISPATCH_BATCH_LIMIT).await?;
        tracing::info!("Dispatching {} due follow-up(s)", due.len());

        let mut report = DispatchReport::default();
        for follow_up in due {
            report.attempted += 1;
            let id = follow_up.id;
            match self.claim_and_send(follow_up).await {
                Ok(Some(f)) if f.status == FollowUpStatus::Sent => report.sent += 1,
                Ok(Some(_)) => report.failed += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("✗ Could not dispatch follow-up {}: {}", id, e);
                }
            }
        }

        Ok(report)
    }

    /// Cancels a pending follow-up.
    pub async fn cancel_follow_up(&self, id: Uuid) -> Result<GeneratedFollowUp, AppError> {
        let mut follow_up = self.get_follow_up(id).await?;
        if follow_up.status != FollowUpStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "Only pending follow-ups can be cancelled ({} is {})",
                id,
                follow_up.status.as_str()
            )));
        }

        let cancelled = self
            .follow_ups
            .transition_status(id, FollowUpStatus::Pending, FollowUpStatus::Cancelled, None)
            .await?;
        if !cancelled {
            return Err(AppError::BadRequest(format!(
                "Follow-up {} was claimed for sending and can no longer be cancelled",
                id
            )));
        }
        follow_up.status = FollowUpStatus::Cancelled;
        tracing::info!("Follow-up {} cancelled", id);
        Ok(follow_up)
    }

    pub async fn get_follow_up(&self, id: Uuid) -> Result<GeneratedFollowUp, AppError> {
        self.follow_ups
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Follow-up {} not found", id)))
    }

    /// Statistics over follow-ups generated in the last `days` days.
    pub async fn follow_up_stats(&self, days: i64) -> Result<FollowUpStats, AppError> {
        let since = Utc::now() - Duration::days(days.max(0));
        let follow_ups = self.follow_ups.generated_since(since).await?;
        Ok(FollowUpStats::from_follow_ups(&follow_ups))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Groups records by client, keeping first-seen client order.
pub fn group_by_client(records: Vec<ReservationRecord>) -> Vec<(String, Vec<ReservationRecord>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ReservationRecord>)> = Vec::new();

    for record in records {
        let email = normalize_email(&record.client_email);
        if email.is_empty() {
            continue;
        }
        match index.get(&email) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(email.clone(), groups.len());
                groups.push((email, vec![record]));
            }
        }
    }

    groups
}

/// The next follow-up day at the client's first preferred contact hour.
fn schedule_time(insight: &ClientInsight) -> DateTime<Utc> {
    let time = insight
        .best_contact_times
        .first()
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok());

    match time {
        Some(time) => insight
            .next_follow_up_at
            .date_naive()
            .and_time(time)
            .and_utc(),
        None => insight.next_follow_up_at,
    }
}
