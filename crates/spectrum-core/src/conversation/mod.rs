//! Chat conversation state machine
//!
//! Every inbound message either advances the chat's active flow or, when
//! the chat is idle, is routed by its text: registration commands, menu
//! buttons and flow entry points. Cancellation is honoured at every step
//! and leaves no side effects. Input that does not fit the current step is
//! answered with the same prompt again; nothing is lost.

mod bookings;
mod flow;
mod input;
mod subscriptions;
mod trainings;

pub use bookings::{CancelSignUp, MarkAttendance, SignUp};
pub use flow::Flow;
pub use subscriptions::{AddSubscription, DeleteSubscription};
pub use trainings::{AddTraining, CreateFromTemplates, EditTraining, ViewSchedule};

use chrono::{DateTime, Days, Local, NaiveDate};
use spectrum_api::{Coach, Failure, Menu, NewUser, Outcome, Reply, Role, Student, User, labels};
use spectrum_config::ClubConfig;
use spectrum_store::{AuditEvent, AuditEventType, Store};
use spectrum_util::{ChatId, TelegramId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{BookingEngine, CoreError, CoreResult, ScheduleService, SessionStore, lock_session};
use flow::Transition;

const COACH_ENTRIES: [&str; 8] = [
    labels::ADD_TRAINING,
    labels::EDIT_TRAINING,
    labels::CREATE_FROM_TEMPLATES,
    labels::MY_SCHEDULE,
    labels::MARK_ATTENDANCE,
    labels::ADD_SUBSCRIPTION,
    labels::DELETE_SUBSCRIPTION,
    labels::STUDENTS,
];

const STUDENT_ENTRIES: [&str; 4] = [
    labels::SIGN_UP,
    labels::CANCEL_SIGN_UP,
    labels::MY_BOOKINGS,
    labels::MY_SUBSCRIPTION,
];

/// Everything a flow step may read or change
pub(crate) struct Ctx<'a> {
    pub(crate) store: &'a dyn Store,
    pub(crate) booking: &'a BookingEngine,
    pub(crate) schedule: &'a ScheduleService,
    pub(crate) config: &'a ClubConfig,
    pub(crate) now: DateTime<Local>,
}

impl Ctx<'_> {
    pub(crate) fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// Who sent a message, as far as the club is concerned
enum Actor {
    Unregistered,
    Coach { user: User, coach: Coach },
    Student { student: Student },
}

impl Actor {
    fn role(&self) -> Option<Role> {
        match self {
            Actor::Unregistered => None,
            Actor::Coach { .. } => Some(Role::Coach),
            Actor::Student { .. } => Some(Role::Student),
        }
    }
}

pub struct Conversation {
    store: Arc<dyn Store>,
    booking: BookingEngine,
    schedule: ScheduleService,
    config: ClubConfig,
    sessions: SessionStore,
}

impl Conversation {
    pub fn new(store: Arc<dyn Store>, config: ClubConfig) -> Self {
        Self {
            booking: BookingEngine::new(store.clone()),
            schedule: ScheduleService::new(store.clone(), config.scheduling.max_weeks),
            store,
            config,
            sessions: SessionStore::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn booking(&self) -> &BookingEngine {
        &self.booking
    }

    pub fn schedule(&self) -> &ScheduleService {
        &self.schedule
    }

    pub fn config(&self) -> &ClubConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Whether the chat is in the middle of a flow
    pub fn in_flow(&self, chat_id: ChatId) -> bool {
        self.sessions.contains(chat_id)
            && !lock_session(&self.sessions.slot(chat_id, Instant::now())).is_idle()
    }

    /// Drop sessions idle for longer than the configured TTL
    pub fn sweep_sessions(&self) -> usize {
        let removed = self
            .sessions
            .sweep(self.config.service.session_ttl, Instant::now());
        if removed > 0 {
            info!(removed, "Expired idle chat sessions");
        }
        removed
    }

    /// Handle one inbound chat message. The chat's session stays locked
    /// until the reply is built.
    pub fn handle(
        &self,
        chat_id: ChatId,
        sender: &NewUser,
        text: &str,
        now: DateTime<Local>,
    ) -> Reply {
        let text = text.trim();
        let slot = self.sessions.slot(chat_id, Instant::now());
        let mut session = lock_session(&slot);
        session.touch(Instant::now());

        let ctx = Ctx {
            store: self.store.as_ref(),
            booking: &self.booking,
            schedule: &self.schedule,
            config: &self.config,
            now,
        };

        let result = match session.take_flow() {
            Some(flow) if input::is_cancel(text) || text == "/start" => {
                info!(chat_id = %chat_id, flow = flow.name(), "Flow cancelled");
                return Reply::Cancelled;
            }
            Some(flow) => {
                debug!(chat_id = %chat_id, flow = flow.name(), "Advancing flow");
                flow.advance(text, &ctx)
            }
            None => self.dispatch(sender, text, &ctx),
        };

        match result {
            Ok(Transition::Next(flow)) => {
                let prompt = flow.prompt();
                session.set_flow(flow);
                Reply::prompt(prompt)
            }
            Ok(Transition::Retry(flow, problem)) => {
                debug!(chat_id = %chat_id, flow = flow.name(), ?problem, "Input rejected");
                let prompt = flow.prompt();
                session.set_flow(flow);
                Reply::invalid(problem, prompt)
            }
            Ok(Transition::Finish(reply)) => reply,
            Err(e) => {
                let failure = failure_for(&e);
                if failure == Failure::Internal {
                    error!(chat_id = %chat_id, error = %e, "Flow aborted");
                } else {
                    info!(chat_id = %chat_id, error = %e, "Flow ended without effect");
                }
                Reply::failed(failure)
            }
        }
    }

    /// Route a message from a chat with no flow in progress
    fn dispatch(&self, sender: &NewUser, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        match text {
            "/coach" => return self.register(sender, Role::Coach),
            "/student" => return self.register(sender, Role::Student),
            _ if input::is_cancel(text) => return Ok(Transition::finish(Reply::Cancelled)),
            _ => {}
        }

        let actor = self.actor(sender.telegram_id)?;
        let menu = |menu: Menu| -> CoreResult<Transition> {
            Ok(Transition::finish(Reply::Menu {
                menu,
                role: actor.role(),
            }))
        };

        match (&actor, text) {
            (_, labels::SCHEDULE_MANAGEMENT) => menu(Menu::ScheduleManagement),
            (_, labels::SUBSCRIPTION_MANAGEMENT) => menu(Menu::SubscriptionManagement),

            (Actor::Coach { user, coach }, labels::ADD_TRAINING) => {
                AddTraining::start(ctx, coach.id, user.id)
            }
            (Actor::Coach { coach, .. }, labels::EDIT_TRAINING) => EditTraining::start(coach.id),
            (Actor::Coach { user, coach }, labels::CREATE_FROM_TEMPLATES) => {
                CreateFromTemplates::start(ctx, coach.id, user.id)
            }
            (Actor::Coach { .. }, labels::MY_SCHEDULE) => ViewSchedule::start(),
            (Actor::Coach { coach, .. }, labels::MARK_ATTENDANCE) => MarkAttendance::start(coach.id),
            (Actor::Coach { .. }, labels::ADD_SUBSCRIPTION) => AddSubscription::start(ctx),
            (Actor::Coach { .. }, labels::DELETE_SUBSCRIPTION) => DeleteSubscription::start(ctx),
            (Actor::Coach { .. }, labels::STUDENTS) => done(Outcome::Students {
                students: self.store.list_students()?,
            }),

            (Actor::Student { student }, labels::SIGN_UP) => SignUp::start(ctx, student.id),
            (Actor::Student { student }, labels::CANCEL_SIGN_UP) => {
                CancelSignUp::start(ctx, student.id)
            }
            (Actor::Student { student }, labels::MY_BOOKINGS) => {
                let to = ctx.today()
                    + Days::new(u64::from(self.config.scheduling.calendar_days));
                done(Outcome::Bookings {
                    bookings: self.booking.student_schedule(student.id, ctx.today(), to)?,
                })
            }
            (Actor::Student { student }, labels::MY_SUBSCRIPTION) => {
                done(Outcome::SubscriptionStatus {
                    active: self.booking.ledger().active(student.id, ctx.now)?,
                })
            }

            (actor, text) if COACH_ENTRIES.contains(&text) || STUDENT_ENTRIES.contains(&text) => {
                let failure = match actor {
                    Actor::Unregistered => Failure::NotRegisteredUser,
                    Actor::Student { .. } => Failure::CoachOnly,
                    Actor::Coach { .. } => Failure::StudentOnly,
                };
                debug!(telegram_id = %sender.telegram_id, ?failure, "Entry point refused");
                Ok(Transition::finish(Reply::failed(failure)))
            }

            _ => menu(Menu::Main),
        }
    }

    fn actor(&self, telegram_id: TelegramId) -> CoreResult<Actor> {
        let Some(user) = self.store.user_by_telegram_id(telegram_id)? else {
            return Ok(Actor::Unregistered);
        };

        let actor = match user.role {
            Role::Coach => match self.store.coach_for_user(user.id)? {
                Some(coach) => Actor::Coach { user, coach },
                None => Actor::Unregistered,
            },
            Role::Student => match self.store.student_for_user(user.id)? {
                Some(student) => Actor::Student { student },
                None => Actor::Unregistered,
            },
        };
        Ok(actor)
    }

    fn register(&self, sender: &NewUser, role: Role) -> CoreResult<Transition> {
        if role == Role::Coach && !self.config.registration.allows_coach(sender.telegram_id) {
            warn!(telegram_id = %sender.telegram_id, "Coach registration refused");
            return Ok(Transition::finish(Reply::failed(
                Failure::CoachRegistrationClosed,
            )));
        }

        let user = self.store.upsert_user(sender, role)?;
        match role {
            Role::Coach => {
                self.store.ensure_coach(user.id)?;
            }
            Role::Student => {
                self.store.ensure_student(user.id)?;
            }
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::UserRegistered {
                user_id: user.id,
                telegram_id: user.telegram_id,
                role: role.as_str().to_string(),
            }));
        info!(
            user_id = %user.id,
            telegram_id = %user.telegram_id,
            role = role.as_str(),
            "User registered"
        );

        done(Outcome::RegisteredAs { role })
    }
}

fn done(outcome: Outcome) -> CoreResult<Transition> {
    Ok(Transition::finish(Reply::done(outcome)))
}

/// What the user is told when a step fails
fn failure_for(error: &CoreError) -> Failure {
    match error {
        CoreError::AlreadyRegistered => Failure::AlreadyRegistered,
        CoreError::NotRegistered => Failure::NotRegistered,
        CoreError::TrainingFull { capacity } => Failure::TrainingFull {
            capacity: *capacity,
        },
        CoreError::NoActiveSubscription => Failure::NoActiveSubscription,
        CoreError::TrainingStarted => Failure::TrainingStarted,
        CoreError::NotFound(_) => Failure::NotFound,
        CoreError::CoachUnavailable => Failure::CoachUnavailable,
        CoreError::SlotAlreadyExists { .. } => Failure::SlotTaken,
        CoreError::TrainingNotStarted
        | CoreError::TemplateParse { .. }
        | CoreError::Validation(_)
        | CoreError::Store(_) => Failure::Internal,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::*;
    use spectrum_api::{InputProblem, Prompt, User};
    use spectrum_util::{CoachId, StudentId};

    /// A conversation over an in-memory club, one chat per member
    pub struct Club {
        pub store: Arc<SqliteStore>,
        pub conversation: Conversation,
    }

    impl Club {
        pub fn new() -> Self {
            Self::with_config(ClubConfig::default())
        }

        pub fn with_config(config: ClubConfig) -> Self {
            let store = store();
            let conversation = Conversation::new(store.clone(), config);
            Self {
                store,
                conversation,
            }
        }

        pub fn profile(telegram_id: i64, first_name: &str) -> NewUser {
            NewUser {
                telegram_id: TelegramId::new(telegram_id),
                first_name: first_name.into(),
                last_name: None,
                username: None,
            }
        }

        fn register(&self, telegram_id: i64, first_name: &str, command: &str) -> NewUser {
            let who = Self::profile(telegram_id, first_name);
            let reply = self.send(&who, command, Local::now());
            assert!(
                matches!(reply, Reply::Done { outcome: Outcome::RegisteredAs { .. } }),
                "registration failed: {:?}",
                reply
            );
            who
        }

        pub fn coach(&self, telegram_id: i64, first_name: &str) -> NewUser {
            self.register(telegram_id, first_name, "/coach")
        }

        pub fn student(&self, telegram_id: i64, first_name: &str) -> NewUser {
            self.register(telegram_id, first_name, "/student")
        }

        pub fn send(&self, who: &NewUser, text: &str, now: DateTime<Local>) -> Reply {
            self.conversation
                .handle(ChatId::new(who.telegram_id.get()), who, text, now)
        }

        pub fn idle(&self, who: &NewUser) -> bool {
            !self.conversation.in_flow(ChatId::new(who.telegram_id.get()))
        }

        pub fn user(&self, who: &NewUser) -> User {
            self.store.user_by_telegram_id(who.telegram_id).unwrap().unwrap()
        }

        pub fn coach_id(&self, who: &NewUser) -> CoachId {
            self.store.coach_for_user(self.user(who).id).unwrap().unwrap().id
        }

        pub fn student_id(&self, who: &NewUser) -> StudentId {
            self.store.student_for_user(self.user(who).id).unwrap().unwrap().id
        }
    }

    #[test]
    fn test_registration_and_menu() {
        let club = Club::new();
        let anna = Club::profile(1, "Анна");
        let now = at(2025, 12, 10, 12);

        assert_eq!(
            club.send(&anna, "/start", now),
            Reply::Menu { menu: Menu::Main, role: None }
        );
        assert_eq!(
            club.send(&anna, "/student", now),
            Reply::done(Outcome::RegisteredAs { role: Role::Student })
        );
        assert_eq!(
            club.send(&anna, "/student", now),
            Reply::done(Outcome::RegisteredAs { role: Role::Student })
        );
        assert_eq!(club.store.list_students().unwrap().len(), 1);
        assert_eq!(
            club.send(&anna, "привет", now),
            Reply::Menu { menu: Menu::Main, role: Some(Role::Student) }
        );
    }

    #[test]
    fn test_coach_registration_allow_list() {
        let mut config = ClubConfig::default();
        config.registration.coach_telegram_ids = vec![TelegramId::new(100)];
        let club = Club::with_config(config);
        let now = at(2025, 12, 10, 12);

        let stranger = Club::profile(5, "Пётр");
        assert_eq!(
            club.send(&stranger, "/coach", now),
            Reply::failed(Failure::CoachRegistrationClosed)
        );
        assert!(club.store.user_by_telegram_id(stranger.telegram_id).unwrap().is_none());

        let ivan = club.coach(100, "Иван");
        assert_eq!(
            club.send(&ivan, labels::SCHEDULE_MANAGEMENT, now),
            Reply::Menu { menu: Menu::ScheduleManagement, role: Some(Role::Coach) }
        );
    }

    #[test]
    fn test_entry_points_check_role() {
        let club = Club::new();
        let ivan = club.coach(100, "Иван");
        let anna = club.student(1, "Анна");
        let stranger = Club::profile(5, "Пётр");
        let now = at(2025, 12, 10, 12);

        assert_eq!(
            club.send(&stranger, labels::ADD_TRAINING, now),
            Reply::failed(Failure::NotRegisteredUser)
        );
        assert_eq!(
            club.send(&stranger, labels::SIGN_UP, now),
            Reply::failed(Failure::NotRegisteredUser)
        );
        assert_eq!(
            club.send(&anna, labels::MARK_ATTENDANCE, now),
            Reply::failed(Failure::CoachOnly)
        );
        assert_eq!(
            club.send(&ivan, labels::CANCEL_SIGN_UP, now),
            Reply::failed(Failure::StudentOnly)
        );
        assert!(club.idle(&anna));
        assert!(club.idle(&ivan));
    }

    #[test]
    fn test_cancel_at_any_step_has_no_effect() {
        let club = Club::new();
        group(&club.store, "Юниоры");
        let ivan = club.coach(100, "Иван");
        let now = at(2025, 12, 10, 12);
        let steps = [labels::ADD_TRAINING, "1", labels::TOMORROW, "18:00", "1 час"];

        for depth in 1..=steps.len() {
            for text in &steps[..depth] {
                club.send(&ivan, text, now);
            }
            assert!(!club.idle(&ivan));
            let cancel = if depth % 2 == 0 { labels::CANCEL } else { labels::DECLINE };
            assert_eq!(club.send(&ivan, cancel, now), Reply::Cancelled);
            assert!(club.idle(&ivan));
        }

        let all = club
            .store
            .list_trainings(date(2025, 12, 1), date(2025, 12, 31))
            .unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn test_cancel_at_confirmation_changes_nothing() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        template(&club.store, juniors.id, 1, "10:00", "11:00", "Зал");
        let ivan = club.coach(100, "Иван");
        let anna = club.student(1, "Анна");
        let anna_id = club.student_id(&anna);
        // Wednesday
        let now = at(2025, 12, 10, 12);

        let started = training(&club.store, juniors.id, date(2025, 12, 10), (10, 0), (11, 0), Some(club.coach_id(&ivan)));
        let tomorrow = capped_training(&club.store, juniors.id, date(2025, 12, 11), 4);
        let owned = training(&club.store, juniors.id, date(2025, 12, 12), (18, 0), (19, 0), Some(club.coach_id(&ivan)));
        let sub = issue(&club.store, anna_id, 8, now);
        club.store.register_attendance(started.id, anna_id).unwrap();

        let walk_and_cancel = |who: &NewUser, steps: &[&str]| {
            let (last, before) = steps.split_last().unwrap();
            for text in before {
                club.send(who, text, now);
            }
            let reply = club.send(who, last, now);
            assert!(
                matches!(reply, Reply::Prompt { .. }),
                "expected a confirmation prompt after {:?}, got {:?}",
                steps,
                reply
            );
            assert_eq!(club.send(who, labels::CANCEL, now), Reply::Cancelled);
            assert!(club.idle(who));
        };

        walk_and_cancel(&ivan, &[labels::EDIT_TRAINING, "12.12.2025", "1", labels::DELETE_TRAINING]);
        assert!(club.store.get_training(owned.id).unwrap().is_some());

        walk_and_cancel(&anna, &[labels::SIGN_UP, labels::TOMORROW, "1"]);
        assert_eq!(club.store.count_registered(tomorrow.id).unwrap(), 0);

        walk_and_cancel(&ivan, &[labels::MARK_ATTENDANCE, labels::TODAY, "1", labels::ALL_PRESENT]);
        assert_eq!(club.store.get_subscription(sub.id).unwrap().unwrap().remaining_lessons, 8);
        assert_eq!(club.store.training_stats(started.id).unwrap().present, 0);

        walk_and_cancel(&ivan, &[labels::ADD_SUBSCRIPTION, "Анна", "1"]);
        walk_and_cancel(&ivan, &[labels::DELETE_SUBSCRIPTION, "1", "1"]);
        assert_eq!(club.store.list_all_subscriptions().unwrap().len(), 1);

        walk_and_cancel(&ivan, &[labels::CREATE_FROM_TEMPLATES, "2"]);
        let generated = club
            .store
            .list_trainings(date(2025, 12, 15), date(2025, 12, 28))
            .unwrap();
        assert!(generated.is_empty());
    }

    #[test]
    fn test_invalid_input_repeats_prompt() {
        let club = Club::new();
        let ivan = club.coach(100, "Иван");
        let now = at(2025, 12, 10, 12);

        let Reply::Prompt { prompt } = club.send(&ivan, labels::MY_SCHEDULE, now) else {
            panic!("expected a prompt");
        };
        for text in ["вчера", "32.13.2025", "01.12.2025-"] {
            let reply = club.send(&ivan, text, now);
            let Reply::Invalid { prompt: again, .. } = reply else {
                panic!("expected the step to be repeated, got {:?}", reply);
            };
            assert_eq!(again, prompt);
        }
        assert!(matches!(
            club.send(&ivan, labels::TODAY, now),
            Reply::Done { outcome: Outcome::Schedule { .. } }
        ));
    }

    #[test]
    fn test_start_resets_flow() {
        let club = Club::new();
        let ivan = club.coach(100, "Иван");
        let now = at(2025, 12, 10, 12);

        club.send(&ivan, labels::MY_SCHEDULE, now);
        assert_eq!(club.send(&ivan, "/start", now), Reply::Cancelled);
        assert_eq!(
            club.send(&ivan, "/start", now),
            Reply::Menu { menu: Menu::Main, role: Some(Role::Coach) }
        );
    }

    #[test]
    fn test_chats_do_not_share_state() {
        let club = Club::new();
        group(&club.store, "Юниоры");
        let ivan = club.coach(100, "Иван");
        let olga = club.coach(101, "Ольга");
        let now = at(2025, 12, 10, 12);

        club.send(&ivan, labels::ADD_TRAINING, now);
        club.send(&olga, labels::MY_SCHEDULE, now);
        assert!(matches!(
            club.send(&ivan, "1", now),
            Reply::Prompt { prompt: Prompt::ChooseDate { .. } }
        ));
        assert!(matches!(
            club.send(&olga, "1", now),
            Reply::Invalid { problem: InputProblem::InvalidDate, .. }
        ));
    }

    #[test]
    fn test_read_only_entries() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let ivan = club.coach(100, "Иван");
        let anna = club.student(1, "Анна");
        let now = at(2025, 12, 10, 12);
        let t = training(&club.store, juniors.id, date(2025, 12, 12), (18, 0), (19, 0), None);

        assert_eq!(
            club.send(&anna, labels::MY_SUBSCRIPTION, now),
            Reply::done(Outcome::SubscriptionStatus { active: None })
        );
        let sub = issue(&club.store, club.student_id(&anna), 8, now);
        assert_eq!(
            club.send(&anna, labels::MY_SUBSCRIPTION, now),
            Reply::done(Outcome::SubscriptionStatus { active: Some(sub) })
        );

        club.store.register_attendance(t.id, club.student_id(&anna)).unwrap();
        let Reply::Done {
            outcome: Outcome::Bookings { bookings },
        } = club.send(&anna, labels::MY_BOOKINGS, now)
        else {
            panic!("expected bookings");
        };
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].training.group_name, "Юниоры");

        let Reply::Done {
            outcome: Outcome::Students { students },
        } = club.send(&ivan, labels::STUDENTS, now)
        else {
            panic!("expected students");
        };
        assert_eq!(students.len(), 1);
        assert!(club.idle(&ivan));
    }

    #[test]
    fn test_concurrent_sign_ups_respect_capacity() {
        let club = Club::new();
        let juniors = group(&club.store, "Юниоры");
        let t = capped_training(&club.store, juniors.id, date(2025, 12, 11), 3);
        let now = at(2025, 12, 10, 12);

        let students: Vec<NewUser> = (1..=8)
            .map(|i| {
                let who = club.student(i, &format!("Ученик {}", i));
                issue(&club.store, club.student_id(&who), 4, now);
                for text in [labels::SIGN_UP, labels::TOMORROW, "1"] {
                    club.send(&who, text, now);
                }
                who
            })
            .collect();

        let club = &club;
        let replies: Vec<Reply> = std::thread::scope(|scope| {
            let handles: Vec<_> = students
                .iter()
                .map(|who| scope.spawn(move || club.send(who, labels::CONFIRM_SIGN_UP, now)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let signed_up = replies
            .iter()
            .filter(|r| matches!(r, Reply::Done { outcome: Outcome::SignedUp { .. } }))
            .count();
        let full = replies
            .iter()
            .filter(|r| **r == Reply::failed(Failure::TrainingFull { capacity: 3 }))
            .count();
        assert_eq!(signed_up, 3);
        assert_eq!(full, 5);
        assert_eq!(club.store.count_registered(t.id).unwrap(), 3);
    }
}
