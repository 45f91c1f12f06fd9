//! Subscription ledger: issuing packages and taking lessons from them

use chrono::{DateTime, Local};
use spectrum_api::{Subscription, SubscriptionPlan};
use spectrum_store::{AuditEvent, AuditEventType, Store};
use spectrum_util::{StudentId, SubscriptionId};
use std::sync::Arc;
use tracing::info;

use crate::{CoreError, CoreResult};

#[derive(Clone)]
pub struct SubscriptionLedger {
    store: Arc<dyn Store>,
}

impl SubscriptionLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Take one lesson from the student's newest active subscription
    pub fn debit(&self, student_id: StudentId, now: DateTime<Local>) -> CoreResult<Subscription> {
        let subscription = self
            .store
            .debit_lesson(student_id, now)?
            .ok_or(CoreError::NoActiveSubscription)?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::LessonDebited {
                student_id,
                subscription_id: subscription.id,
                remaining_lessons: subscription.remaining_lessons,
            }));

        info!(
            student_id = %student_id,
            subscription_id = %subscription.id,
            remaining = subscription.remaining_lessons,
            "Lesson debited"
        );

        Ok(subscription)
    }

    pub fn issue(
        &self,
        student_id: StudentId,
        plan: &SubscriptionPlan,
        now: DateTime<Local>,
    ) -> CoreResult<Subscription> {
        let subscription = self
            .store
            .create_subscription(&plan.issue_for(student_id, now))?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SubscriptionIssued {
                subscription_id: subscription.id,
                student_id,
                lessons: subscription.total_lessons,
            }));

        info!(
            student_id = %student_id,
            subscription_id = %subscription.id,
            plan = %plan.id,
            "Subscription issued"
        );

        Ok(subscription)
    }

    pub fn delete(&self, id: SubscriptionId) -> CoreResult<()> {
        if !self.store.delete_subscription(id)? {
            return Err(CoreError::NotFound(format!("subscription {}", id)));
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SubscriptionDeleted {
                subscription_id: id,
            }));
        info!(subscription_id = %id, "Subscription deleted");

        Ok(())
    }

    pub fn active(
        &self,
        student_id: StudentId,
        now: DateTime<Local>,
    ) -> CoreResult<Option<Subscription>> {
        Ok(self.store.active_subscription(student_id, now)?)
    }

    /// Newest first
    pub fn list(&self, student_id: StudentId) -> CoreResult<Vec<Subscription>> {
        Ok(self.store.list_student_subscriptions(student_id)?)
    }

    pub fn list_all(&self) -> CoreResult<Vec<Subscription>> {
        Ok(self.store.list_all_subscriptions()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn monthly() -> SubscriptionPlan {
        SubscriptionPlan {
            id: "monthly".into(),
            label: "16 занятий".into(),
            lessons: 16,
            valid_days: Some(30),
        }
    }

    #[test]
    fn test_issue_and_debit() {
        let store = store();
        let ledger = SubscriptionLedger::new(store.clone());
        let anna = student(&store, 1, "Анна");
        let now = at(2025, 12, 10, 12);

        let issued = ledger.issue(anna.id, &monthly(), now).unwrap();
        assert_eq!(issued.remaining_lessons, 16);
        assert_eq!(ledger.active(anna.id, now).unwrap(), Some(issued.clone()));

        let debited = ledger.debit(anna.id, now).unwrap();
        assert_eq!(debited.id, issued.id);
        assert_eq!(debited.remaining_lessons, 15);

        let audits = store.get_recent_audits(10).unwrap();
        assert!(matches!(
            audits[0].event,
            AuditEventType::LessonDebited { remaining_lessons: 15, .. }
        ));
    }

    #[test]
    fn test_debit_without_subscription() {
        let store = store();
        let ledger = SubscriptionLedger::new(store.clone());
        let anna = student(&store, 1, "Анна");

        assert!(matches!(
            ledger.debit(anna.id, at(2025, 12, 10, 12)),
            Err(CoreError::NoActiveSubscription)
        ));
    }

    #[test]
    fn test_expired_plan_cannot_be_debited() {
        let store = store();
        let ledger = SubscriptionLedger::new(store.clone());
        let anna = student(&store, 1, "Анна");
        ledger.issue(anna.id, &monthly(), at(2025, 11, 1, 12)).unwrap();

        assert!(matches!(
            ledger.debit(anna.id, at(2025, 12, 10, 12)),
            Err(CoreError::NoActiveSubscription)
        ));
    }

    #[test]
    fn test_delete_and_list() {
        let store = store();
        let ledger = SubscriptionLedger::new(store.clone());
        let anna = student(&store, 1, "Анна");
        let now = at(2025, 12, 10, 12);
        let first = ledger.issue(anna.id, &monthly(), now).unwrap();
        ledger.issue(anna.id, &monthly(), now).unwrap();

        assert_eq!(ledger.list(anna.id).unwrap().len(), 2);
        ledger.delete(first.id).unwrap();
        assert_eq!(ledger.list_all().unwrap().len(), 1);
        assert!(matches!(ledger.delete(first.id), Err(CoreError::NotFound(_))));
    }
}
