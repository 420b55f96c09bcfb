mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use common::TestClient;
use skynet::chat::{Account, AuthFailure, AuthOutcome, ChatError, Directory, StatusCode};

#[test]
fn lock_wins_over_correct_password_until_expiry() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let mut acct = Account::new("alice", "pw");
    acct.lock_until(t0 + Duration::seconds(60));

    assert_eq!(acct.authenticate("pw", t0), AuthOutcome::Locked);
    assert_eq!(acct.authenticate("wrong", t0 + Duration::seconds(59)), AuthOutcome::Locked);
    assert!(!acct.is_online());
    assert_eq!(acct.authenticate("pw", t0 + Duration::seconds(60)), AuthOutcome::Success);
    assert!(acct.is_online());
    assert_eq!(acct.last_login(), Some(t0 + Duration::seconds(60)));
}

#[test]
fn already_online_is_only_reported_for_the_right_password() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let mut acct = Account::new("alice", "pw");
    assert_eq!(acct.authenticate("pw", t0), AuthOutcome::Success);
    assert_eq!(acct.authenticate("pw", t0), AuthOutcome::AlreadyOnline);
    assert_eq!(acct.authenticate("nope", t0), AuthOutcome::WrongPassword);
    // Refusal leaves the earlier login untouched
    assert_eq!(acct.last_login(), Some(t0));

    acct.logout();
    assert_eq!(acct.authenticate("pw", t0 + Duration::seconds(5)), AuthOutcome::Success);
}

#[test]
fn outcomes_map_to_auth_failures() {
    assert_eq!(AuthOutcome::Success.into_result(), Ok(()));
    assert_eq!(AuthOutcome::Locked.into_result(), Err(AuthFailure::Locked));
    let err: ChatError = AuthFailure::AlreadyOnline.into();
    assert_eq!(err, ChatError::AuthFailure(AuthFailure::AlreadyOnline));
}

#[test]
fn recent_activity_window_is_inclusive() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let mut acct = Account::new("alice", "pw");
    assert!(!acct.is_recently_active(Duration::seconds(60), t0));

    acct.record_login(t0);
    assert!(acct.is_recently_active(Duration::seconds(60), t0 + Duration::seconds(60)));
    assert!(!acct.is_recently_active(Duration::seconds(60), t0 + Duration::seconds(61)));
    // Logging out does not erase the last login
    acct.logout();
    assert!(acct.is_recently_active(Duration::seconds(60), t0 + Duration::seconds(30)));
}

#[test]
fn block_list_is_a_set() {
    let mut acct = Account::new("bob", "pw");
    assert!(acct.block("alice"));
    assert!(!acct.block("alice"));
    assert!(acct.has_blocked("alice"));
    assert!(acct.unblock("alice"));
    assert!(!acct.unblock("alice"));
    assert!(!acct.has_blocked("alice"));
}

#[tokio::test]
async fn directory_lock_uses_configured_duration() {
    let dir = Directory::new(Duration::seconds(90));
    let acct = dir.create("alice", "pw").await.unwrap();

    let before = Utc::now();
    let until = dir.lock(&acct).await;
    let after = Utc::now();
    assert!(until >= before + Duration::seconds(90));
    assert!(until <= after + Duration::seconds(90));
    assert_eq!(dir.authenticate(&acct, "pw").await, AuthOutcome::Locked);
}

#[tokio::test]
async fn duplicate_usernames_are_rejected() {
    let dir = Directory::new(Duration::seconds(60));
    dir.create("alice", "pw").await.unwrap();
    match dir.create("alice", "other").await {
        Err(ChatError::DuplicateUsername(name)) => assert_eq!(name, "alice"),
        other => panic!("expected DuplicateUsername, got {:?}", other.map(|_| ())),
    }
    assert_eq!(dir.len().await, 1);
    // The first password still stands
    let acct = dir.lookup("alice").await.unwrap();
    assert_eq!(dir.authenticate(&acct, "pw").await, AuthOutcome::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_authentications_admit_exactly_one() {
    let dir = Arc::new(Directory::new(Duration::seconds(60)));
    let acct = dir.create("alice", "pw").await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let dir = dir.clone();
        let acct = acct.clone();
        tasks.push(tokio::spawn(async move { dir.authenticate(&acct, "pw").await }));
    }
    let mut outcomes = Vec::new();
    for t in tasks {
        outcomes.push(t.await.unwrap());
    }
    assert_eq!(outcomes.iter().filter(|o| **o == AuthOutcome::Success).count(), 1);
    assert!(outcomes.iter().all(|o| matches!(o, AuthOutcome::Success | AuthOutcome::AlreadyOnline)));
}

#[tokio::test]
async fn three_wrong_passwords_lock_the_account() {
    let ctx = common::context(&[("alice", "secret")]);
    let mut c = TestClient::connect(&ctx, "10.0.0.1");
    c.send("login");
    c.expect_contains("Username: ").await;
    c.send("alice");
    c.expect_contains("Password: ").await;

    c.send("bad1");
    c.expect_contains("You have 2 more chances to try.").await;
    c.send("bad2");
    c.expect_contains("You have 1 more chance to try.").await;
    c.send("bad3");
    let r = c.expect_code(StatusCode::Terminal).await;
    assert_eq!(r.body, "Invalid Password. Your account is locked for 60 seconds. Please try again later.");
    c.finished().await;

    // The right password is refused while the lock holds
    let mut c2 = TestClient::connect(&ctx, "10.0.0.1");
    c2.send("login");
    c2.expect_contains("Username: ").await;
    c2.send("alice");
    c2.expect_contains("Password: ").await;
    c2.send("secret");
    let r = c2.expect_code(StatusCode::Terminal).await;
    assert!(r.body.contains("locked"), "unexpected reply: {}", r.body);
    c2.finished().await;

    assert!(!ctx.presence.contains("alice").await);
    let acct = ctx.directory.lookup("alice").await.unwrap();
    assert!(!acct.lock().await.is_online());
}

#[tokio::test]
async fn lock_expires_after_configured_duration() {
    let mut settings = common::settings();
    settings.lock_duration = StdDuration::from_secs(1);
    settings.max_password_attempts = 1;
    let ctx = common::context_with(settings, &[("alice", "secret")]);

    let mut c = TestClient::connect(&ctx, "10.0.0.1");
    c.send("login");
    c.expect_contains("Username: ").await;
    c.send("alice");
    c.expect_contains("Password: ").await;
    c.send("wrong");
    let r = c.expect_code(StatusCode::Terminal).await;
    assert!(r.body.contains("locked for 1 seconds"));
    c.finished().await;

    tokio::time::sleep(StdDuration::from_millis(1100)).await;
    let _alice = TestClient::logged_in(&ctx, "10.0.0.1", "alice", "secret").await;
    assert!(ctx.presence.contains("alice").await);
}

#[tokio::test]
async fn second_login_for_an_online_account_is_refused() {
    let ctx = common::context(&[("alice", "secret")]);
    let _first = TestClient::logged_in(&ctx, "10.0.0.1", "alice", "secret").await;
    let first_id = ctx.presence.get("alice").await.unwrap().id();

    let mut second = TestClient::connect(&ctx, "10.0.0.2");
    second.send("login");
    second.expect_contains("Username: ").await;
    second.send("alice");
    second.expect_contains("Password: ").await;
    second.send("secret");
    let r = second.expect_code(StatusCode::Terminal).await;
    assert_eq!(r.body, "This account is already logged in.");
    second.finished().await;

    // The first session is untouched
    assert_eq!(ctx.presence.get("alice").await.unwrap().id(), first_id);
    assert!(ctx.directory.lookup("alice").await.unwrap().lock().await.is_online());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_session_logins_admit_exactly_one() {
    let ctx = common::context(&[("alice", "secret")]);
    let mut first = TestClient::connect(&ctx, "10.0.0.1");
    let mut second = TestClient::connect(&ctx, "10.0.0.2");
    for c in [&mut first, &mut second] {
        c.send("login");
        c.expect_contains("Username: ").await;
        c.send("alice");
        c.expect_contains("Password: ").await;
    }

    first.send("secret");
    second.send("secret");
    let settled = |r: &skynet::chat::Reply| r.body.starts_with("Login successful") || r.is_terminal();
    let (a, b) = tokio::join!(first.recv_until(settled), second.recv_until(settled));

    let successes = [&a, &b].iter().filter(|r| r.body.starts_with("Login successful")).count();
    assert_eq!(successes, 1, "replies: {:?} / {:?}", a, b);
    let (winner, loser) = if a.is_terminal() { (&second, &a) } else { (&first, &b) };
    assert_eq!(loser.code, StatusCode::Terminal);
    assert_eq!(loser.body, "This account is already logged in.");

    winner.wait_until_present("alice").await;
    assert_eq!(ctx.presence.len().await, 1);
}
