//! Student sign-up and cancellation, and the coach's attendance marking

use chrono::{Days, NaiveDate};
use spectrum_api::{
    Booking, Failure, InputProblem, Outcome, Participant, Prompt, Reply, TrainingView, labels,
};
use spectrum_util::{CoachId, StudentId};

use super::flow::{Transition, input};
use super::input::{day_options, is_confirm, parse_day, parse_indices, parse_upcoming_day, pick};
use super::Ctx;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct SignUp {
    student_id: StudentId,
    step: SignUpStep,
}

#[derive(Debug, Clone)]
enum SignUpStep {
    Date {
        remaining_lessons: u32,
    },
    Training {
        date: NaiveDate,
        trainings: Vec<TrainingView>,
        remaining_lessons: u32,
    },
    Confirm {
        training: TrainingView,
        remaining_lessons: u32,
    },
}

impl SignUp {
    pub(crate) fn start(ctx: &Ctx<'_>, student_id: StudentId) -> CoreResult<Transition> {
        let Some(active) = ctx.booking.ledger().active(student_id, ctx.now)? else {
            return Ok(Transition::finish(Reply::failed(
                Failure::NoActiveSubscription,
            )));
        };
        Ok(Transition::next(Self {
            student_id,
            step: SignUpStep::Date {
                remaining_lessons: active.remaining_lessons,
            },
        }))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            SignUpStep::Date { .. } => Prompt::ChooseDate {
                options: day_options(),
            },
            SignUpStep::Training {
                date, trainings, ..
            } => Prompt::ChooseTraining {
                date: *date,
                trainings: trainings.clone(),
            },
            SignUpStep::Confirm {
                training,
                remaining_lessons,
            } => Prompt::ConfirmSignUp {
                training: training.clone(),
                remaining_lessons: *remaining_lessons,
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            SignUpStep::Date { remaining_lessons } => {
                let date = input!(self, parse_upcoming_day(text, ctx.now));
                let trainings =
                    ctx.booking
                        .available_trainings(self.student_id, date, date, ctx.now)?;
                if trainings.is_empty() {
                    return Ok(Transition::retry(
                        self,
                        InputProblem::NoTrainingsOnDate { date },
                    ));
                }
                SignUpStep::Training {
                    date,
                    trainings,
                    remaining_lessons: *remaining_lessons,
                }
            }
            SignUpStep::Training {
                trainings,
                remaining_lessons,
                ..
            } => SignUpStep::Confirm {
                training: input!(self, pick(trainings, text)).clone(),
                remaining_lessons: *remaining_lessons,
            },
            SignUpStep::Confirm { training, .. } => {
                if !is_confirm(text, labels::CONFIRM_SIGN_UP) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }

                // The listing may be stale by now
                let current = ctx.schedule.get_training(training.training.id)?;
                if current.training.has_started(&ctx.now) {
                    return Err(CoreError::TrainingStarted);
                }
                if ctx.booking.ledger().active(self.student_id, ctx.now)?.is_none() {
                    return Err(CoreError::NoActiveSubscription);
                }

                ctx.booking.sign_up(self.student_id, current.training.id)?;
                return Ok(Transition::finish(Reply::done(Outcome::SignedUp {
                    training: current,
                })));
            }
        };
        Ok(Transition::next(Self { step, ..self }))
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignUp {
    student_id: StudentId,
    step: CancelStep,
}

#[derive(Debug, Clone)]
enum CancelStep {
    Booking { bookings: Vec<Booking> },
    Confirm { booking: Booking },
}

impl CancelSignUp {
    pub(crate) fn start(ctx: &Ctx<'_>, student_id: StudentId) -> CoreResult<Transition> {
        let horizon = ctx.today() + Days::new(u64::from(ctx.config.scheduling.calendar_days));
        let bookings = ctx.booking.upcoming_bookings(student_id, horizon, ctx.now)?;
        if bookings.is_empty() {
            return Ok(Transition::finish(Reply::failed(Failure::NoBookings)));
        }
        Ok(Transition::next(Self {
            student_id,
            step: CancelStep::Booking { bookings },
        }))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            CancelStep::Booking { bookings } => Prompt::ChooseBooking {
                bookings: bookings.clone(),
            },
            CancelStep::Confirm { booking } => Prompt::ConfirmCancellation {
                booking: booking.clone(),
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            CancelStep::Booking { bookings } => CancelStep::Confirm {
                booking: input!(self, pick(bookings, text)).clone(),
            },
            CancelStep::Confirm { booking } => {
                if !is_confirm(text, labels::CONFIRM_CANCEL_SIGN_UP) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }

                let current = ctx.schedule.get_training(booking.training.training.id)?;
                if current.training.has_started(&ctx.now) {
                    return Err(CoreError::TrainingStarted);
                }

                ctx.booking.cancel_sign_up(self.student_id, current.training.id)?;
                return Ok(Transition::finish(Reply::done(Outcome::SignUpCancelled {
                    training: current,
                })));
            }
        };
        Ok(Transition::next(Self { step, ..self }))
    }
}

#[derive(Debug, Clone)]
pub struct MarkAttendance {
    coach_id: CoachId,
    step: MarkStep,
}

#[derive(Debug, Clone)]
enum MarkStep {
    Date,
    Training {
        date: NaiveDate,
        trainings: Vec<TrainingView>,
    },
    Attendees {
        training: TrainingView,
        participants: Vec<Participant>,
    },
    Confirm {
        training: TrainingView,
        attendees: Vec<Participant>,
    },
}

impl MarkAttendance {
    pub(crate) fn start(coach_id: CoachId) -> CoreResult<Transition> {
        Ok(Transition::next(Self {
            coach_id,
            step: MarkStep::Date,
        }))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            MarkStep::Date => Prompt::ChooseDate {
                options: day_options(),
            },
            MarkStep::Training { date, trainings } => Prompt::ChooseTraining {
                date: *date,
                trainings: trainings.clone(),
            },
            MarkStep::Attendees {
                training,
                participants,
            } => Prompt::ChooseAttendees {
                training: training.clone(),
                participants: participants.clone(),
            },
            MarkStep::Confirm {
                training,
                attendees,
            } => Prompt::ConfirmAttendance {
                training: training.clone(),
                attendees: attendees.clone(),
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            MarkStep::Date => {
                let date = input!(self, parse_day(text, ctx.today()));
                let mut trainings = ctx.schedule.coach_schedule(self.coach_id, date, date)?;
                trainings.retain(|t| t.training.has_started(&ctx.now));
                if trainings.is_empty() {
                    return Ok(Transition::retry(
                        self,
                        InputProblem::NoTrainingsOnDate { date },
                    ));
                }
                MarkStep::Training { date, trainings }
            }
            MarkStep::Training { trainings, .. } => {
                let training = input!(self, pick(trainings, text)).clone();
                let participants = ctx.booking.participants(training.training.id)?;
                if participants.is_empty() {
                    return Ok(Transition::finish(Reply::failed(Failure::NoParticipants)));
                }
                MarkStep::Attendees {
                    training,
                    participants,
                }
            }
            MarkStep::Attendees {
                training,
                participants,
            } => {
                let attendees = if text == labels::ALL_PRESENT {
                    participants.clone()
                } else {
                    input!(self, parse_indices(text, participants.len()))
                        .into_iter()
                        .map(|i| participants[i].clone())
                        .collect()
                };
                MarkStep::Confirm {
                    training: training.clone(),
                    attendees,
                }
            }
            MarkStep::Confirm {
                training,
                attendees,
            } => {
                if !is_confirm(text, labels::CONFIRM) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }
                let student_ids: Vec<StudentId> = attendees.iter().map(|p| p.student_id).collect();
                let marks = ctx.booking.mark_present(
                    training.training.id,
                    &student_ids,
                    Some(self.coach_id),
                    ctx.now,
                )?;
                return Ok(Transition::finish(Reply::done(Outcome::AttendanceRecorded {
                    training: training.clone(),
                    marks,
                })));
            }
        };
        Ok(Transition::next(Self { step, ..self }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use crate::testing::*;
    use spectrum_api::{DebitOutcome, Failure, InputProblem, MarkResult, Outcome, Prompt, Reply, labels};

    #[test]
    fn test_sign_up_needs_active_subscription() {
        let club = Club::new();
        let anna = club.student(1, "Анна");

        assert_eq!(
            club.send(&anna, labels::SIGN_UP, at(2025, 12, 10, 12)),
            Reply::failed(Failure::NoActiveSubscription)
        );
        assert!(club.idle(&anna));
    }

    #[test]
    fn test_sign_up_walkthrough() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let day = date(2025, 12, 11);
        training(&club.store, juniors.id, day, (10, 0), (11, 0), None);
        let evening = training(&club.store, juniors.id, day, (18, 0), (19, 0), None);
        let anna = club.student(1, "Анна");
        let now = at(2025, 12, 10, 12);
        issue(&club.store, club.student_id(&anna), 8, now);

        assert!(matches!(
            club.send(&anna, labels::SIGN_UP, now),
            Reply::Prompt { prompt: Prompt::ChooseDate { .. } }
        ));
        assert!(matches!(
            club.send(&anna, labels::DAY_AFTER_TOMORROW, now),
            Reply::Invalid { problem: InputProblem::NoTrainingsOnDate { .. }, .. }
        ));
        let Reply::Prompt {
            prompt: Prompt::ChooseTraining { trainings, .. },
        } = club.send(&anna, labels::TOMORROW, now)
        else {
            panic!("expected a training list");
        };
        assert_eq!(trainings.len(), 2);

        assert!(matches!(
            club.send(&anna, "2", now),
            Reply::Prompt { prompt: Prompt::ConfirmSignUp { remaining_lessons: 8, .. } }
        ));
        let Reply::Done {
            outcome: Outcome::SignedUp { training },
        } = club.send(&anna, labels::CONFIRM_SIGN_UP, now)
        else {
            panic!("sign-up failed");
        };
        assert_eq!(training.training.id, evening.id);
        assert_eq!(club.store.count_registered(evening.id).unwrap(), 1);
        assert!(club.idle(&anna));

        // Already booked trainings are not offered again
        club.send(&anna, labels::SIGN_UP, now);
        let Reply::Prompt {
            prompt: Prompt::ChooseTraining { trainings, .. },
        } = club.send(&anna, labels::TOMORROW, now)
        else {
            panic!("expected a training list");
        };
        assert_eq!(trainings.len(), 1);
    }

    #[test]
    fn test_sign_up_rechecks_at_confirmation() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let t = capped_training(&club.store, juniors.id, date(2025, 12, 11), 1);
        let anna = club.student(1, "Анна");
        let boris = club.student(2, "Борис");
        let now = at(2025, 12, 10, 12);
        issue(&club.store, club.student_id(&anna), 8, now);
        issue(&club.store, club.student_id(&boris), 8, now);

        for who in [&anna, &boris] {
            club.send(who, labels::SIGN_UP, now);
            club.send(who, labels::TOMORROW, now);
            club.send(who, "1", now);
        }
        assert!(matches!(
            club.send(&anna, labels::CONFIRM, now),
            Reply::Done { outcome: Outcome::SignedUp { .. } }
        ));
        assert_eq!(
            club.send(&boris, labels::CONFIRM, now),
            Reply::failed(Failure::TrainingFull { capacity: 1 })
        );
        assert_eq!(club.store.count_registered(t.id).unwrap(), 1);
    }

    #[test]
    fn test_sign_up_after_start_is_rejected() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        training(&club.store, juniors.id, date(2025, 12, 10), (18, 0), (19, 0), None);
        let anna = club.student(1, "Анна");
        let morning = at(2025, 12, 10, 12);
        issue(&club.store, club.student_id(&anna), 8, morning);

        for text in [labels::SIGN_UP, labels::TODAY, "1"] {
            club.send(&anna, text, morning);
        }
        assert_eq!(
            club.send(&anna, labels::CONFIRM_SIGN_UP, at(2025, 12, 10, 18)),
            Reply::failed(Failure::TrainingStarted)
        );
    }

    #[test]
    fn test_cancel_sign_up() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let t = training(&club.store, juniors.id, date(2025, 12, 11), (18, 0), (19, 0), None);
        let anna = club.student(1, "Анна");
        let now = at(2025, 12, 10, 12);

        assert_eq!(
            club.send(&anna, labels::CANCEL_SIGN_UP, now),
            Reply::failed(Failure::NoBookings)
        );

        club.store.register_attendance(t.id, club.student_id(&anna)).unwrap();
        assert!(matches!(
            club.send(&anna, labels::CANCEL_SIGN_UP, now),
            Reply::Prompt { prompt: Prompt::ChooseBooking { ref bookings } } if bookings.len() == 1
        ));
        assert!(matches!(
            club.send(&anna, "2", now),
            Reply::Invalid { problem: InputProblem::IndexOutOfRange { max: 1 }, .. }
        ));
        club.send(&anna, "1", now);
        assert!(matches!(
            club.send(&anna, labels::CONFIRM_CANCEL_SIGN_UP, now),
            Reply::Done { outcome: Outcome::SignUpCancelled { .. } }
        ));
        assert_eq!(club.store.count_registered(t.id).unwrap(), 0);
    }

    #[test]
    fn test_mark_attendance_debits_once() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let ivan = club.coach(100, "Иван");
        let day = date(2025, 12, 10);
        let t = training(&club.store, juniors.id, day, (10, 0), (11, 0), Some(club.coach_id(&ivan)));
        let anna = club.student(1, "Анна");
        let boris = club.student(2, "Борис");
        let now = at(2025, 12, 10, 12);
        let sub = issue(&club.store, club.student_id(&anna), 4, now);
        for who in [&anna, &boris] {
            club.store.register_attendance(t.id, club.student_id(who)).unwrap();
        }

        for text in [labels::MARK_ATTENDANCE, labels::TODAY, "1"] {
            club.send(&ivan, text, now);
        }
        assert!(matches!(
            club.send(&ivan, labels::ALL_PRESENT, now),
            Reply::Prompt { prompt: Prompt::ConfirmAttendance { ref attendees, .. } } if attendees.len() == 2
        ));
        let Reply::Done {
            outcome: Outcome::AttendanceRecorded { marks, .. },
        } = club.send(&ivan, labels::CONFIRM, now)
        else {
            panic!("attendance was not recorded");
        };

        let debit = |name: &str| {
            marks
                .iter()
                .find(|m| m.name == name)
                .map(|m| m.result.clone())
                .unwrap()
        };
        assert_eq!(
            debit("Анна"),
            MarkResult::Marked {
                debit: DebitOutcome::Debited {
                    subscription_id: sub.id,
                    remaining_lessons: 3
                }
            }
        );
        assert!(matches!(
            debit("Борис"),
            MarkResult::Marked { debit: DebitOutcome::Failed { .. } }
        ));

        // Marking again takes nothing more
        for text in [labels::MARK_ATTENDANCE, labels::TODAY, "1", "1", labels::CONFIRM] {
            club.send(&ivan, text, now);
        }
        assert_eq!(
            club.store.get_subscription(sub.id).unwrap().unwrap().remaining_lessons,
            3
        );
    }

    #[test]
    fn test_mark_attendance_only_started_trainings() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let ivan = club.coach(100, "Иван");
        let t = training(
            &club.store,
            juniors.id,
            date(2025, 12, 10),
            (18, 0),
            (19, 0),
            Some(club.coach_id(&ivan)),
        );
        let now = at(2025, 12, 10, 12);

        club.send(&ivan, labels::MARK_ATTENDANCE, now);
        assert!(matches!(
            club.send(&ivan, labels::TODAY, now),
            Reply::Invalid { problem: InputProblem::NoTrainingsOnDate { .. }, .. }
        ));

        let evening = at(2025, 12, 10, 19);
        club.send(&ivan, labels::TODAY, evening);
        assert_eq!(
            club.send(&ivan, "1", evening),
            Reply::failed(Failure::NoParticipants)
        );
        assert_eq!(club.store.training_stats(t.id).unwrap().registered, 0);
    }
}
