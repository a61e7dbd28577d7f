/// Workflow tests for the follow-up service using in-memory collaborators
mod common;

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use common::*;
use rust_followup_api::errors::AppError;
use rust_followup_api::followup::{GenerationOutcome, SkipReason};
use rust_followup_api::models::{Channel, FollowUpStatus, ReservationStatus, StrategyId};

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_scenario_a_brand_new_client() {
        let now = Utc::now();
        let h = harness(vec![reservation(
            "new@cowork.cd",
            0,
            100,
            ReservationStatus::Confirmed,
            now,
        )]);

        let insight = h.service.analyze_client_at("new@cowork.cd", now).await.unwrap();
        assert_eq!(insight.days_since_last_activity, 0);
        assert_eq!(insight.risk_score, 0);
        assert_eq!(insight.engagement_score, 100);
        assert_eq!(insight.recommended_strategy, StrategyId::WelcomeNewClient);
        assert_eq!(insight.lifetime_value, BigDecimal::from(100));
    }

    #[tokio::test]
    async fn test_scenario_b_high_value_client() {
        let now = Utc::now();
        let h = harness(vec![reservation(
            "vip@cowork.cd",
            20,
            600,
            ReservationStatus::Completed,
            now,
        )]);

        let insight = h.service.analyze_client_at("vip@cowork.cd", now).await.unwrap();
        assert_eq!(insight.days_since_last_activity, 20);
        // +20 for lifetime value in (500, 1000], +10 for 14 < days <= 30
        assert_eq!(insight.risk_score, 30);
        assert_eq!(
            insight.recommended_strategy,
            StrategyId::HighValueClientRetention
        );
    }

    #[tokio::test]
    async fn test_scenario_c_inactive_client_with_cancellation() {
        let now = Utc::now();
        let h = harness(vec![
            reservation("gone@cowork.cd", 95, 10, ReservationStatus::Completed, now),
            reservation("gone@cowork.cd", 130, 0, ReservationStatus::Cancelled, now),
        ]);

        let insight = h.service.analyze_client_at("gone@cowork.cd", now).await.unwrap();
        assert_eq!(insight.risk_score, 45);
        assert_eq!(insight.cancellation_count, 1);
        assert_eq!(
            insight.recommended_strategy,
            StrategyId::InactiveClientReminder
        );
    }

    #[tokio::test]
    async fn test_scenario_d_no_history_is_not_found() {
        let h = harness(vec![]);

        let err = h.service.analyze_client("nobody@cowork.cd").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = h
            .service
            .generate_follow_up("nobody@cowork.cd")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(h.store.all().is_empty());
    }
}

#[cfg(test)]
mod generation_tests {
    use super::*;

    #[tokio::test]
    async fn test_persisted_follow_up_round_trip() {
        let now = Utc::now();
        let h = harness(vec![reservation(
            "vip@cowork.cd",
            20,
            600,
            ReservationStatus::Completed,
            now,
        )]);

        let outcome = h
            .service
            .generate_follow_up_at("vip@cowork.cd", now)
            .await
            .unwrap();
        let generated = match outcome {
            GenerationOutcome::Generated { follow_up } => follow_up,
            other => panic!("expected a follow-up, got {:?}", other),
        };

        let stored = h.service.get_follow_up(generated.id).await.unwrap();
        assert_eq!(stored.subject, generated.subject);
        assert_eq!(stored.message, generated.message);
        assert_eq!(stored.channel, generated.channel);
        assert_eq!(stored.status, FollowUpStatus::Pending);
        assert_eq!(stored.strategy_id, StrategyId::HighValueClientRetention);
        assert!((70..=100).contains(&stored.confidence));
        assert!(stored.scheduled_at > now);
        assert!(stored.message.contains("Amani"));
    }

    #[tokio::test]
    async fn test_quiet_client_is_skipped() {
        let now = Utc::now();
        let h = harness(vec![reservation(
            "new@cowork.cd",
            0,
            100,
            ReservationStatus::Confirmed,
            now,
        )]);

        let outcome = h
            .service
            .generate_follow_up_at("new@cowork.cd", now)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            GenerationOutcome::Skipped {
                reason: SkipReason::NotDue
            }
        ));
        assert!(h.store.all().is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_blocks_repeat_generation() {
        let now = Utc::now();
        let h = harness(vec![reservation(
            "vip@cowork.cd",
            20,
            600,
            ReservationStatus::Completed,
            now,
        )]);

        let first = h
            .service
            .generate_follow_up_at("vip@cowork.cd", now)
            .await
            .unwrap();
        assert!(matches!(first, GenerationOutcome::Generated { .. }));

        let second = h
            .service
            .generate_follow_up_at("vip@cowork.cd", now + Duration::days(1))
            .await
            .unwrap();
        assert!(matches!(
            second,
            GenerationOutcome::Skipped {
                reason: SkipReason::Cooldown
            }
        ));
        assert_eq!(h.store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_strategy_bypasses_gate() {
        let now = Utc::now();
        let h = harness(vec![reservation(
            "new@cowork.cd",
            0,
            100,
            ReservationStatus::Cancelled,
            now,
        )]);

        let follow_up = h
            .service
            .generate_follow_up_with_strategy("new@cowork.cd", StrategyId::CancellationFollowup)
            .await
            .unwrap();
        assert_eq!(follow_up.strategy_id, StrategyId::CancellationFollowup);
        assert_eq!(follow_up.channel, Channel::Email);
        assert_eq!(follow_up.subject, "Suite à votre annulation");
    }

    #[tokio::test]
    async fn test_persistence_failure_propagates() {
        let now = Utc::now();
        let h = harness_with(
            MemoryReservations::new(vec![reservation(
                "vip@cowork.cd",
                20,
                600,
                ReservationStatus::Completed,
                now,
            )]),
            MemoryFollowUps::failing_for("vip@cowork.cd"),
            false,
        );

        let err = h
            .service
            .generate_follow_up_at("vip@cowork.cd", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PersistenceFailure(_)));
    }
}

#[cfg(test)]
mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_isolates_client_failures() {
        let now = Utc::now();
        let records = vec![
            reservation("vip@cowork.cd", 20, 600, ReservationStatus::Completed, now),
            reservation("broken@cowork.cd", 95, 10, ReservationStatus::Completed, now),
            reservation("gone@cowork.cd", 95, 10, ReservationStatus::Completed, now),
            reservation("new@cowork.cd", 0, 100, ReservationStatus::Confirmed, now),
        ];
        let h = harness_with(
            MemoryReservations::new(records),
            MemoryFollowUps::failing_for("broken@cowork.cd"),
            false,
        );

        let report = h.service.generate_automatic_follow_ups_at(now).await.unwrap();
        assert_eq!(report.clients_analyzed, 4);
        assert_eq!(report.generated, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);

        let stored = h.store.all();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|f| f.client_email != "broken@cowork.cd"));
        assert!(stored
            .iter()
            .any(|f| f.strategy_id == StrategyId::InactiveClientReminder));
    }

    #[tokio::test]
    async fn test_batch_with_no_history_is_empty() {
        let h = harness(vec![]);
        let report = h.service.generate_automatic_follow_ups().await.unwrap();
        assert_eq!(report.clients_analyzed, 0);
        assert_eq!(report.generated, 0);
    }

    #[tokio::test]
    async fn test_batch_fails_when_history_unavailable() {
        let mut reservations = MemoryReservations::new(vec![]);
        reservations.fail_all_history = true;
        let h = harness_with(reservations, MemoryFollowUps::default(), false);

        let err = h.service.generate_automatic_follow_ups().await.unwrap_err();
        assert!(matches!(err.root(), AppError::PersistenceFailure(_)));
    }
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;

    async fn generated_id(h: &Harness, now: chrono::DateTime<Utc>) -> uuid::Uuid {
        match h
            .service
            .generate_follow_up_at("vip@cowork.cd", now)
            .await
            .unwrap()
        {
            GenerationOutcome::Generated { follow_up } => follow_up.id,
            other => panic!("expected a follow-up, got {:?}", other),
        }
    }

    fn vip(now: chrono::DateTime<Utc>) -> Vec<rust_followup_api::models::ReservationRecord> {
        vec![reservation(
            "vip@cowork.cd",
            20,
            600,
            ReservationStatus::Completed,
            now,
        )]
    }

    #[tokio::test]
    async fn test_successful_send_marks_sent() {
        let now = Utc::now();
        let h = harness(vip(now));
        let id = generated_id(&h, now).await;

        let sent = h.service.send_follow_up(id).await.unwrap();
        assert_eq!(sent.status, FollowUpStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert_eq!(h.email.sent_count(), 1);

        let stored = h.service.get_follow_up(id).await.unwrap();
        assert_eq!(stored.status, FollowUpStatus::Sent);

        // Already sent: cannot be sent again
        let err = h.service.send_follow_up(id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_send_failure_marks_failed_without_error() {
        let now = Utc::now();
        let h = harness_with(
            MemoryReservations::new(vip(now)),
            MemoryFollowUps::default(),
            true,
        );
        let id = generated_id(&h, now).await;

        let result = h.service.send_follow_up(id).await.unwrap();
        assert_eq!(result.status, FollowUpStatus::Failed);
        assert!(result.sent_at.is_none());
        assert_eq!(
            h.service.get_follow_up(id).await.unwrap().status,
            FollowUpStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_dispatch_only_sends_due_follow_ups() {
        let now = Utc::now();
        let h = harness(vip(now));
        generated_id(&h, now).await;

        let report = h.service.dispatch_due_follow_ups(now).await.unwrap();
        assert_eq!(report.attempted, 0);

        let report = h
            .service
            .dispatch_due_follow_ups(now + Duration::days(9))
            .await
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let now = Utc::now();
        let h = harness(vip(now));
        let id = generated_id(&h, now).await;

        let cancelled = h.service.cancel_follow_up(id).await.unwrap();
        assert_eq!(cancelled.status, FollowUpStatus::Cancelled);

        assert!(matches!(
            h.service.cancel_follow_up(id).await.unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            h.service.send_follow_up(id).await.unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(h
            .service
            .cancel_follow_up(uuid::Uuid::new_v4())
            .await
            .unwrap_err()
            .is_not_found());
    }

    fn yielding_harness(now: chrono::DateTime<Utc>) -> Harness {
        harness_with(
            MemoryReservations::new(vip(now)),
            MemoryFollowUps::yielding(),
            false,
        )
    }

    #[tokio::test]
    async fn test_concurrent_sends_deliver_once() {
        let now = Utc::now();
        let h = yielding_harness(now);
        let id = generated_id(&h, now).await;

        let (first, second) = tokio::join!(
            h.service.send_follow_up(id),
            h.service.send_follow_up(id)
        );

        assert_eq!(h.email.sent_count(), 1);
        let (won, lost) = match (first, second) {
            (Ok(f), Err(e)) | (Err(e), Ok(f)) => (f, e),
            other => panic!("expected exactly one send to win, got {:?}", other),
        };
        assert_eq!(won.status, FollowUpStatus::Sent);
        assert!(matches!(lost, AppError::BadRequest(_)));
        assert_eq!(
            h.service.get_follow_up(id).await.unwrap().status,
            FollowUpStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_cancel_racing_send_has_one_winner() {
        let now = Utc::now();
        let h = yielding_harness(now);
        let id = generated_id(&h, now).await;

        let (sent, cancelled) = tokio::join!(
            h.service.send_follow_up(id),
            h.service.cancel_follow_up(id)
        );

        let stored = h.service.get_follow_up(id).await.unwrap().status;
        match (sent, cancelled) {
            (Ok(f), Err(AppError::BadRequest(_))) => {
                assert_eq!(f.status, FollowUpStatus::Sent);
                assert_eq!(stored, FollowUpStatus::Sent);
                assert_eq!(h.email.sent_count(), 1);
            }
            (Err(AppError::BadRequest(_)), Ok(f)) => {
                assert_eq!(f.status, FollowUpStatus::Cancelled);
                assert_eq!(stored, FollowUpStatus::Cancelled);
                assert_eq!(h.email.sent_count(), 0);
            }
            other => panic!("expected exactly one winner, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_racing_manual_send_delivers_once() {
        let now = Utc::now();
        let h = yielding_harness(now);
        let id = generated_id(&h, now).await;
        let later = now + Duration::days(9);

        let (manual, report) = tokio::join!(
            h.service.send_follow_up(id),
            h.service.dispatch_due_follow_ups(later)
        );
        let report = report.unwrap();

        assert_eq!(h.email.sent_count(), 1);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 0);
        match manual {
            Ok(f) => {
                assert_eq!(f.status, FollowUpStatus::Sent);
                assert_eq!(report.skipped, 1);
            }
            Err(e) => {
                assert!(matches!(e, AppError::BadRequest(_)));
                assert_eq!(report.sent, 1);
            }
        }
    }

    #[tokio::test]
    async fn test_stats_reflect_send_outcomes() {
        let now = Utc::now();
        let h = harness(vip(now));
        let id = generated_id(&h, now).await;
        h.service.send_follow_up(id).await.unwrap();

        let stats = h.service.follow_up_stats(30).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_status[&FollowUpStatus::Sent], 1);
        assert_eq!(stats.success_rate, 100.0);
    }
}
