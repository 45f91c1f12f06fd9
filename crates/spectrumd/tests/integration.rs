//! Integration tests for spectrumd
//!
//! These tests verify end-to-end behavior: chat flows against an on-disk
//! store, configuration files, and the IPC transport.

use chrono::{DateTime, Local, TimeZone};
use spectrum_api::{
    Command, DebitOutcome, Failure, MarkResult, NewGroup, NewUser, Outcome, Reply,
    ResponsePayload, Role, labels,
};
use spectrum_config::{ClubConfig, load_config};
use spectrum_core::Conversation;
use spectrum_ipc::{IpcClient, IpcServer, ServerMessage};
use spectrum_store::{SqliteStore, Store};
use spectrum_util::{ChatId, TelegramId};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn at(d: u32, hour: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 12, d, hour, 0, 0).unwrap()
}

fn person(telegram_id: i64, first_name: &str) -> NewUser {
    NewUser {
        telegram_id: TelegramId::new(telegram_id),
        first_name: first_name.into(),
        last_name: None,
        username: None,
    }
}

fn open(path: &Path, config: ClubConfig) -> (Arc<dyn Store>, Conversation) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(path).unwrap());
    let conversation = Conversation::new(store.clone(), config);
    (store, conversation)
}

fn say(conversation: &Conversation, who: &NewUser, text: &str, now: DateTime<Local>) -> Reply {
    conversation.handle(ChatId::new(who.telegram_id.get()), who, text, now)
}

fn juniors(store: &dyn Store) {
    store
        .create_group(&NewGroup {
            name: "Юниоры".into(),
            code: Some("JR".into()),
            age_min: Some(10),
            age_max: Some(14),
            description: None,
        })
        .unwrap();
}

#[test]
fn test_club_week_end_to_end() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("spectrumd.db");
    let (store, club) = open(&db_path, ClubConfig::default());
    juniors(store.as_ref());

    let ivan = person(100, "Иван");
    let anna = person(1, "Анна");
    let now = at(10, 12);

    assert_eq!(
        say(&club, &ivan, "/coach", now),
        Reply::done(Outcome::RegisteredAs { role: Role::Coach })
    );
    assert_eq!(
        say(&club, &anna, "/student", now),
        Reply::done(Outcome::RegisteredAs {
            role: Role::Student
        })
    );

    // Coach schedules tomorrow's training
    for text in [labels::ADD_TRAINING, "Юниоры", labels::TOMORROW, "18:00", "1 час"] {
        assert!(matches!(say(&club, &ivan, text, now), Reply::Prompt { .. }));
    }
    let Reply::Done {
        outcome: Outcome::TrainingCreated { training },
    } = say(&club, &ivan, labels::CONFIRM_CREATE_TRAINING, now)
    else {
        panic!("training was not created");
    };

    // Coach issues the never-expiring twelve-lesson plan
    for text in [labels::ADD_SUBSCRIPTION, "Анна", "2"] {
        say(&club, &ivan, text, now);
    }
    let Reply::Done {
        outcome: Outcome::SubscriptionIssued { subscription, .. },
    } = say(&club, &ivan, labels::CONFIRM, now)
    else {
        panic!("subscription was not issued");
    };
    assert_eq!(subscription.remaining_lessons, 12);

    // Student books it
    for text in [labels::SIGN_UP, labels::TOMORROW, "1"] {
        assert!(matches!(say(&club, &anna, text, now), Reply::Prompt { .. }));
    }
    let Reply::Done {
        outcome: Outcome::SignedUp { training: booked },
    } = say(&club, &anna, labels::CONFIRM_SIGN_UP, now)
    else {
        panic!("sign-up failed");
    };
    assert_eq!(booked.training.id, training.training.id);

    // The training has started; the coach marks attendance
    let later = at(11, 18);
    for text in [labels::MARK_ATTENDANCE, labels::TODAY, "1", labels::ALL_PRESENT] {
        assert!(matches!(say(&club, &ivan, text, later), Reply::Prompt { .. }));
    }
    let Reply::Done {
        outcome: Outcome::AttendanceRecorded { marks, .. },
    } = say(&club, &ivan, labels::CONFIRM, later)
    else {
        panic!("attendance was not recorded");
    };
    assert_eq!(
        marks[0].result,
        MarkResult::Marked {
            debit: DebitOutcome::Debited {
                subscription_id: subscription.id,
                remaining_lessons: 11
            }
        }
    );

    // Started trainings are no longer offered for cancellation
    assert_eq!(
        say(&club, &anna, labels::CANCEL_SIGN_UP, later),
        Reply::failed(Failure::NoBookings)
    );
    assert!(!club.in_flow(ChatId::new(1)));

    drop(club);
    drop(store);

    // Everything survives a restart
    let (store, club) = open(&db_path, ClubConfig::default());
    let user = store
        .user_by_telegram_id(TelegramId::new(1))
        .unwrap()
        .unwrap();
    let student = store.student_for_user(user.id).unwrap().unwrap();
    let active = club.booking().ledger().active(student.id, later).unwrap().unwrap();
    assert_eq!(active.remaining_lessons, 11);
    assert_eq!(
        club.booking().training_stats(training.training.id).unwrap().present,
        1
    );
}

#[test]
fn test_config_file_drives_conversation() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
config_version = 1

[registration]
coach_telegram_ids = [100]

[[plans]]
id = "drop-in"
label = "Разовое"
lessons = 1
valid_days = 1
"#,
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.plans.len(), 1);

    let (_store, club) = open(&dir.path().join("spectrumd.db"), config);
    let now = at(10, 12);
    let ivan = person(100, "Иван");
    let oleg = person(200, "Олег");
    let anna = person(1, "Анна");

    assert_eq!(
        say(&club, &oleg, "/coach", now),
        Reply::failed(Failure::CoachRegistrationClosed)
    );
    say(&club, &ivan, "/coach", now);
    say(&club, &anna, "/student", now);

    for text in [labels::ADD_SUBSCRIPTION, "Анна", "Разовое"] {
        say(&club, &ivan, text, now);
    }
    let Reply::Done {
        outcome: Outcome::SubscriptionIssued { subscription, .. },
    } = say(&club, &ivan, labels::CONFIRM, now)
    else {
        panic!("subscription was not issued");
    };
    assert_eq!(subscription.total_lessons, 1);
    assert_eq!(subscription.end_date, Some(at(11, 12)));
}

#[tokio::test]
async fn test_chat_message_over_ipc() {
    let dir = tempdir().unwrap();
    let socket_path = dir.path().join("spectrumd.sock");
    let (_store, club) = open(&dir.path().join("spectrumd.db"), ClubConfig::default());
    let club = Arc::new(club);

    let mut server = IpcServer::new(&socket_path);
    server.start().await.unwrap();
    let server = Arc::new(server);
    let mut messages = server.take_message_receiver().await.unwrap();
    let accept = server.clone();
    tokio::spawn(async move { accept.run().await });

    // A minimal service loop: every request goes to the conversation
    let responder = server.clone();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            let ServerMessage::Request { client_id, request } = msg else {
                continue;
            };
            let club = club.clone();
            let payload = tokio::task::spawn_blocking(move || match request.command {
                Command::ChatMessage {
                    chat_id,
                    sender,
                    text,
                } => ResponsePayload::Reply {
                    reply: club.handle(chat_id, &sender, &text, at(10, 12)),
                },
                _ => ResponsePayload::Pong,
            })
            .await
            .unwrap();
            let response = spectrum_api::Response::success(request.request_id, payload);
            responder.send_response(&client_id, response).await.unwrap();
        }
    });

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    let send = |text: &str| Command::ChatMessage {
        chat_id: ChatId::new(1),
        sender: person(1, "Анна"),
        text: text.into(),
    };

    let ResponsePayload::Reply { reply } = client.call(send(labels::SIGN_UP)).await.unwrap()
    else {
        panic!("expected a chat reply");
    };
    assert_eq!(reply, Reply::failed(Failure::NotRegisteredUser));

    let ResponsePayload::Reply { reply } = client.call(send("/student")).await.unwrap() else {
        panic!("expected a chat reply");
    };
    assert_eq!(
        reply,
        Reply::done(Outcome::RegisteredAs {
            role: Role::Student
        })
    );
}
