//! Sign-up, cancellation and attendance against a training

use chrono::{DateTime, Local, NaiveDate};
use spectrum_api::{
    Attendance, AttendanceMark, Booking, DebitOutcome, MarkResult, Participant, TrainingStats,
    TrainingView,
};
use spectrum_store::{AttendanceMarkInput, AuditEvent, AuditEventType, Registration, Store};
use spectrum_util::{CoachId, StudentId, TrainingId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult, SubscriptionLedger, training_views};

/// Attendance mark requested by a coach
#[derive(Debug, Clone)]
pub struct MarkRequest {
    pub training_id: TrainingId,
    pub student_id: StudentId,
    pub recorded_by: Option<CoachId>,
    pub attended: bool,
    pub notes: Option<String>,
}

pub struct BookingEngine {
    store: Arc<dyn Store>,
    ledger: SubscriptionLedger,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            ledger: SubscriptionLedger::new(store.clone()),
            store,
        }
    }

    pub fn ledger(&self) -> &SubscriptionLedger {
        &self.ledger
    }

    /// Register a student for a training. Capacity and the existing
    /// registration are checked in the same store transaction as the insert.
    pub fn sign_up(&self, student_id: StudentId, training_id: TrainingId) -> CoreResult<Attendance> {
        let attendance = match self.store.register_attendance(training_id, student_id)? {
            Registration::Created(attendance) => attendance,
            Registration::AlreadyRegistered => return Err(CoreError::AlreadyRegistered),
            Registration::Full { capacity } => return Err(CoreError::TrainingFull { capacity }),
            Registration::TrainingMissing => {
                return Err(CoreError::NotFound(format!("training {}", training_id)));
            }
        };

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SignedUp {
                training_id,
                student_id,
            }));
        info!(training_id = %training_id, student_id = %student_id, "Student signed up");

        Ok(attendance)
    }

    /// Cancel a registration. Whether the training may still be cancelled
    /// is the caller's decision.
    pub fn cancel_sign_up(&self, student_id: StudentId, training_id: TrainingId) -> CoreResult<()> {
        if !self.store.cancel_registration(training_id, student_id)? {
            return Err(CoreError::NotRegistered);
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SignUpCancelled {
                training_id,
                student_id,
            }));
        info!(training_id = %training_id, student_id = %student_id, "Sign-up cancelled");

        Ok(())
    }

    /// Record attendance. A lesson is taken only when the student goes from
    /// absent to present; a failed debit is reported, not raised.
    pub fn mark_attendance(
        &self,
        request: &MarkRequest,
        now: DateTime<Local>,
    ) -> CoreResult<DebitOutcome> {
        let MarkRequest {
            training_id,
            student_id,
            recorded_by,
            attended,
            ..
        } = *request;

        let mark = AttendanceMarkInput {
            attended,
            notes: request.notes.clone(),
            recorded_by,
            recorded_at: now,
        };
        let previous = self
            .store
            .set_attended(training_id, student_id, &mark)?
            .ok_or(CoreError::NotRegistered)?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AttendanceMarked {
                training_id,
                student_id,
                attended,
                recorded_by,
            }));
        info!(
            training_id = %training_id,
            student_id = %student_id,
            attended,
            previous,
            "Attendance recorded"
        );

        if previous || !attended {
            debug!(training_id = %training_id, student_id = %student_id, "No debit required");
            return Ok(DebitOutcome::NotRequired);
        }

        match self.ledger.debit(student_id, now) {
            Ok(subscription) => Ok(DebitOutcome::Debited {
                subscription_id: subscription.id,
                remaining_lessons: subscription.remaining_lessons,
            }),
            Err(e) => {
                warn!(
                    training_id = %training_id,
                    student_id = %student_id,
                    error = %e,
                    "Attendance recorded but no lesson was debited"
                );
                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::DebitFailed {
                        student_id,
                        training_id,
                        reason: e.to_string(),
                    }));
                Ok(DebitOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Mark several students present, reporting each one separately
    pub fn mark_present(
        &self,
        training_id: TrainingId,
        student_ids: &[StudentId],
        recorded_by: Option<CoachId>,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<AttendanceMark>> {
        let participants = self.store.list_participants(training_id)?;

        let marks = student_ids
            .iter()
            .map(|&student_id| {
                let name = participants
                    .iter()
                    .find(|p| p.student_id == student_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();

                let request = MarkRequest {
                    training_id,
                    student_id,
                    recorded_by,
                    attended: true,
                    notes: None,
                };
                let result = match self.mark_attendance(&request, now) {
                    Ok(debit) => MarkResult::Marked { debit },
                    Err(e) => {
                        warn!(
                            training_id = %training_id,
                            student_id = %student_id,
                            error = %e,
                            "Attendance mark rejected"
                        );
                        MarkResult::Rejected {
                            reason: e.to_string(),
                        }
                    }
                };

                AttendanceMark {
                    student_id,
                    name,
                    result,
                }
            })
            .collect();

        Ok(marks)
    }

    pub fn training_stats(&self, training_id: TrainingId) -> CoreResult<TrainingStats> {
        Ok(self.store.training_stats(training_id)?)
    }

    pub fn participants(&self, training_id: TrainingId) -> CoreResult<Vec<Participant>> {
        Ok(self.store.list_participants(training_id)?)
    }

    /// A student's registrations for trainings dated within `from..=to`
    pub fn student_schedule(
        &self,
        student_id: StudentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CoreResult<Vec<Booking>> {
        Ok(self.store.list_student_bookings(student_id, from, to)?)
    }

    /// Registrations the student can still cancel
    pub fn upcoming_bookings(
        &self,
        student_id: StudentId,
        to: NaiveDate,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<Booking>> {
        let mut bookings = self.student_schedule(student_id, now.date_naive(), to)?;
        bookings.retain(|b| !b.training.training.has_started(&now));
        Ok(bookings)
    }

    /// Trainings the student could sign up for right now. Empty when the
    /// student has no active subscription.
    pub fn available_trainings(
        &self,
        student_id: StudentId,
        from: NaiveDate,
        to: NaiveDate,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<TrainingView>> {
        if self.ledger.active(student_id, now)?.is_none() {
            debug!(student_id = %student_id, "No active subscription, nothing to offer");
            return Ok(Vec::new());
        }

        let mut open = Vec::new();
        for training in self.store.list_trainings(from, to)? {
            if training.has_started(&now) {
                continue;
            }
            if let Some(capacity) = training.max_participants
                && self.store.count_registered(training.id)? >= capacity
            {
                continue;
            }
            if self
                .store
                .get_registration(training.id, student_id)?
                .is_some()
            {
                continue;
            }
            open.push(training);
        }

        training_views(self.store.as_ref(), open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn present(training_id: TrainingId, student_id: StudentId) -> MarkRequest {
        MarkRequest {
            training_id,
            student_id,
            recorded_by: None,
            attended: true,
            notes: None,
        }
    }

    #[test]
    fn test_sign_up_rules() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = training(&store, juniors.id, date(2025, 12, 9), (18, 0), (19, 0), None);
        let anna = student(&store, 1, "Анна");

        let attendance = engine.sign_up(anna.id, training.id).unwrap();
        assert!(!attendance.attended);
        assert!(matches!(
            engine.sign_up(anna.id, training.id),
            Err(CoreError::AlreadyRegistered)
        ));
        assert!(matches!(
            engine.sign_up(anna.id, TrainingId::new(999)),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_sign_up_full_at_capacity() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = capped_training(&store, juniors.id, date(2025, 12, 9), 2);

        for (tg, name) in [(1, "Анна"), (2, "Борис")] {
            let s = student(&store, tg, name);
            engine.sign_up(s.id, training.id).unwrap();
        }
        let late = student(&store, 3, "Вера");
        assert!(matches!(
            engine.sign_up(late.id, training.id),
            Err(CoreError::TrainingFull { capacity: 2 })
        ));
    }

    #[test]
    fn test_cancel_then_sign_up_again() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = training(&store, juniors.id, date(2025, 12, 9), (18, 0), (19, 0), None);
        let anna = student(&store, 1, "Анна");

        assert!(matches!(
            engine.cancel_sign_up(anna.id, training.id),
            Err(CoreError::NotRegistered)
        ));
        engine.sign_up(anna.id, training.id).unwrap();
        engine.cancel_sign_up(anna.id, training.id).unwrap();
        engine.sign_up(anna.id, training.id).unwrap();

        assert_eq!(engine.training_stats(training.id).unwrap().registered, 1);
    }

    #[test]
    fn test_attendance_debits_once() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = training(&store, juniors.id, date(2025, 12, 9), (18, 0), (19, 0), None);
        let anna = student(&store, 1, "Анна");
        let now = at(2025, 12, 9, 19);
        issue(&store, anna.id, 10, now);
        engine.sign_up(anna.id, training.id).unwrap();

        let first = engine.mark_attendance(&present(training.id, anna.id), now).unwrap();
        assert!(matches!(first, DebitOutcome::Debited { remaining_lessons: 9, .. }));

        let again = engine.mark_attendance(&present(training.id, anna.id), now).unwrap();
        assert_eq!(again, DebitOutcome::NotRequired);

        let absent = MarkRequest {
            attended: false,
            ..present(training.id, anna.id)
        };
        assert_eq!(engine.mark_attendance(&absent, now).unwrap(), DebitOutcome::NotRequired);

        assert_eq!(
            engine.ledger().active(anna.id, now).unwrap().unwrap().remaining_lessons,
            9
        );
    }

    #[test]
    fn test_attendance_without_subscription_still_recorded() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = training(&store, juniors.id, date(2025, 12, 9), (18, 0), (19, 0), None);
        let anna = student(&store, 1, "Анна");
        engine.sign_up(anna.id, training.id).unwrap();

        let outcome = engine
            .mark_attendance(&present(training.id, anna.id), at(2025, 12, 9, 19))
            .unwrap();
        assert!(matches!(outcome, DebitOutcome::Failed { .. }));

        let stats = engine.training_stats(training.id).unwrap();
        assert_eq!(stats.present, 1);
        assert!(matches!(
            store.get_recent_audits(1).unwrap()[0].event,
            AuditEventType::DebitFailed { .. }
        ));
    }

    #[test]
    fn test_mark_unregistered_student() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = training(&store, juniors.id, date(2025, 12, 9), (18, 0), (19, 0), None);
        let anna = student(&store, 1, "Анна");

        assert!(matches!(
            engine.mark_attendance(&present(training.id, anna.id), at(2025, 12, 9, 19)),
            Err(CoreError::NotRegistered)
        ));
    }

    #[test]
    fn test_mark_present_reports_each_student() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let training = training(&store, juniors.id, date(2025, 12, 9), (18, 0), (19, 0), None);
        let anna = student(&store, 1, "Анна");
        let boris = student(&store, 2, "Борис");
        let now = at(2025, 12, 9, 19);
        issue(&store, anna.id, 4, now);
        engine.sign_up(anna.id, training.id).unwrap();

        let marks = engine
            .mark_present(training.id, &[anna.id, boris.id], None, now)
            .unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].name, "Анна");
        assert!(matches!(
            marks[0].result,
            MarkResult::Marked {
                debit: DebitOutcome::Debited { remaining_lessons: 3, .. }
            }
        ));
        assert!(matches!(marks[1].result, MarkResult::Rejected { .. }));
    }

    #[test]
    fn test_available_trainings() {
        let store = store();
        let engine = BookingEngine::new(store.clone());
        let juniors = group(&store, "Юниоры");
        let day = date(2025, 12, 9);
        let now = at(2025, 12, 9, 12);
        let past = training(&store, juniors.id, day, (10, 0), (11, 0), None);
        let booked = training(&store, juniors.id, day, (15, 0), (16, 0), None);
        let full = capped_training(&store, juniors.id, day, 1);
        let open = training(&store, juniors.id, day, (20, 0), (21, 0), None);
        let anna = student(&store, 1, "Анна");
        let boris = student(&store, 2, "Борис");

        assert!(engine.available_trainings(anna.id, day, day, now).unwrap().is_empty());

        issue(&store, anna.id, 8, now);
        engine.sign_up(anna.id, booked.id).unwrap();
        engine.sign_up(boris.id, full.id).unwrap();

        let offered: Vec<_> = engine
            .available_trainings(anna.id, day, day, now)
            .unwrap()
            .into_iter()
            .map(|v| v.training.id)
            .collect();
        assert_eq!(offered, vec![open.id]);
        assert!(!offered.contains(&past.id));

        let upcoming = engine.upcoming_bookings(anna.id, day, now).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].training.group_name, "Юниоры");
    }
}
