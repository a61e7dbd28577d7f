//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use rust_followup_api::channels::{ChannelRegistry, ChannelSender, OutboundMessage};
use rust_followup_api::db_storage::{FollowUpStore, ReservationSource};
use rust_followup_api::errors::AppError;
use rust_followup_api::followup::FollowUpService;
use rust_followup_api::models::{
    Channel, FollowUpStatus, GeneratedFollowUp, ReservationRecord, ReservationStatus, StrategyId,
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub fn reservation(
    email: &str,
    days_ago: i64,
    amount: i64,
    status: ReservationStatus,
    now: DateTime<Utc>,
) -> ReservationRecord {
    ReservationRecord {
        client_email: email.to_string(),
        created_at: now - Duration::days(days_ago),
        amount: BigDecimal::from(amount),
        status,
        space_type: "bureau privé".to_string(),
        activity: Some("consulting".to_string()),
        payment_method: Some("card".to_string()),
        phone: None,
        client_name: Some("Amani".to_string()),
    }
}

#[derive(Default)]
pub struct MemoryReservations {
    pub records: Vec<ReservationRecord>,
    pub fail_all_history: bool,
}

impl MemoryReservations {
    pub fn new(records: Vec<ReservationRecord>) -> Self {
        Self {
            records,
            fail_all_history: false,
        }
    }
}

#[async_trait]
impl ReservationSource for MemoryReservations {
    async fn history_for_client(&self, email: &str) -> Result<Vec<ReservationRecord>, AppError> {
        let mut history: Vec<ReservationRecord> = self
            .records
            .iter()
            .filter(|r| r.client_email.eq_ignore_ascii_case(email.trim()))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    async fn all_history(&self) -> Result<Vec<ReservationRecord>, AppError> {
        if self.fail_all_history {
            return Err(AppError::PersistenceFailure("connection reset".to_string()));
        }
        Ok(self.records.clone())
    }
}

#[derive(Default)]
pub struct MemoryFollowUps {
    pub rows: Mutex<Vec<GeneratedFollowUp>>,
    /// Inserts for this client fail with a persistence error.
    pub fail_insert_for: Option<String>,
    /// Reads hand control back to the runtime after taking their snapshot,
    /// the way a pooled database read does.
    pub yield_on_read: bool,
}

impl MemoryFollowUps {
    pub fn failing_for(email: &str) -> Self {
        Self {
            fail_insert_for: Some(email.to_string()),
            ..Default::default()
        }
    }

    pub fn yielding() -> Self {
        Self {
            yield_on_read: true,
            ..Default::default()
        }
    }

    async fn pause(&self) {
        if self.yield_on_read {
            tokio::task::yield_now().await;
        }
    }

    pub fn all(&self) -> Vec<GeneratedFollowUp> {
        self.rows.lock().unwrap().clone()
    }

    pub fn seed(&self, follow_up: GeneratedFollowUp) {
        self.rows.lock().unwrap().push(follow_up);
    }
}

#[async_trait]
impl FollowUpStore for MemoryFollowUps {
    async fn insert(&self, follow_up: &GeneratedFollowUp) -> Result<(), AppError> {
        if self.fail_insert_for.as_deref() == Some(follow_up.client_email.as_str()) {
            return Err(AppError::PersistenceFailure("insert rejected".to_string()));
        }
        self.rows.lock().unwrap().push(follow_up.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GeneratedFollowUp>, AppError> {
        let row = self.rows.lock().unwrap().iter().find(|f| f.id == id).cloned();
        self.pause().await;
        Ok(row)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: FollowUpStatus,
        to: FollowUpStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|f| f.id == id && f.status == from) {
            Some(row) => {
                row.status = to;
                if sent_at.is_some() {
                    row.sent_at = sent_at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GeneratedFollowUp>, AppError> {
        let mut due: Vec<GeneratedFollowUp> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.status == FollowUpStatus::Pending && f.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|f| f.scheduled_at);
        due.truncate(limit as usize);
        self.pause().await;
        Ok(due)
    }

    async fn last_generated_at(
        &self,
        email: &str,
        strategy: StrategyId,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.client_email == email && f.strategy_id == strategy)
            .map(|f| f.generated_at)
            .max())
    }

    async fn generated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GeneratedFollowUp>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.generated_at >= since)
            .cloned()
            .collect())
    }
}

/// Sender that records messages and succeeds or fails on demand.
pub struct RecordingSender {
    pub channel: Channel,
    pub fail: bool,
    pub sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingSender {
    pub fn new(channel: Channel, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::SendFailure("provider returned 503".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct Harness {
    pub service: FollowUpService,
    pub store: Arc<MemoryFollowUps>,
    pub email: Arc<RecordingSender>,
}

pub fn harness(records: Vec<ReservationRecord>) -> Harness {
    harness_with(
        MemoryReservations::new(records),
        MemoryFollowUps::default(),
        false,
    )
}

pub fn harness_with(
    reservations: MemoryReservations,
    store: MemoryFollowUps,
    email_fails: bool,
) -> Harness {
    let store = Arc::new(store);
    let email = RecordingSender::new(Channel::Email, email_fails);
    let channels = ChannelRegistry::new().register(email.clone());
    let service = FollowUpService::new(Arc::new(reservations), store.clone(), channels);
    Harness {
        service,
        store,
        email,
    }
}
