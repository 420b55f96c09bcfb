use skynet::chat::handshake::is_affirmative;
use skynet::chat::{Command, Endpoint, Reply, StatusCode};

#[test]
fn command_names_are_case_insensitive() {
    assert_eq!(Command::parse("LOGIN"), Command::Login);
    assert_eq!(Command::parse("  WhoElse  "), Command::WhoElse);
    assert_eq!(Command::parse("Logout"), Command::Logout);
    assert_eq!(Command::parse("?"), Command::Help);
    assert_eq!(Command::parse(""), Command::Empty);
    assert_eq!(Command::parse("   "), Command::Empty);
}

#[test]
fn message_keeps_inner_spacing_of_text() {
    assert_eq!(
        Command::parse("message bob hello   there "),
        Command::Message { to: "bob".into(), text: "hello   there".into() }
    );
    assert_eq!(Command::parse("message bob"), Command::Usage("message <user> <text>"));
    assert_eq!(Command::parse("message bob    "), Command::Usage("message <user> <text>"));
}

#[test]
fn argument_commands() {
    assert_eq!(Command::parse("broadcast hi all"), Command::Broadcast("hi all".into()));
    assert_eq!(Command::parse("block carol"), Command::Block("carol".into()));
    assert_eq!(Command::parse("unblock carol extra"), Command::Unblock("carol".into()));
    assert_eq!(Command::parse("startprivate bob"), Command::StartPrivate("bob".into()));
    assert_eq!(Command::parse("whoelsesince 60"), Command::WhoElseSince(60));
    assert_eq!(Command::parse("whoelsesince -5"), Command::Usage("whoelsesince <seconds>"));
    assert_eq!(Command::parse("block"), Command::Usage("block <user>"));
    assert_eq!(Command::parse("private bob hi"), Command::Private);
    assert_eq!(Command::parse("stopprivate bob"), Command::StopPrivate);
    assert_eq!(Command::parse("frobnicate now"), Command::Unknown("frobnicate".into()));
}

#[test]
fn affirmative_answers() {
    for yes in ["y", "Y", "yes", " YES ", "Yes"] {
        assert!(is_affirmative(yes), "{:?} should count as yes", yes);
    }
    for no in ["n", "no", "", "yep", "sure"] {
        assert!(!is_affirmative(no), "{:?} should not count as yes", no);
    }
}

#[test]
fn plain_replies_have_no_separator() {
    assert_eq!(Reply::info("Password: ").encode(), "0Password: ");
    assert_eq!(Reply::terminal("bye").encode(), "1bye");
    assert_eq!(Reply::question("accept? (y/n): ").encode(), "3accept? (y/n): ");
    assert!(Reply::terminal("bye").is_terminal());
}

#[test]
fn structured_replies_are_space_separated() {
    assert_eq!(Reply::port_request("bob", "alice").encode(), "4 bob alice");
    assert_eq!(Reply::private_closed("bob").encode(), "5 bob");
    let endpoint = Endpoint { caller: "alice".into(), callee: "bob".into(), host: "10.0.0.7".into(), port: 5000 };
    assert_eq!(endpoint.to_reply().to_string(), "2 alice bob 10.0.0.7 5000");
}

#[test]
fn replies_never_span_lines() {
    assert_eq!(Reply::info("one\ntwo\r\nthree").encode(), "0one two  three");
}

#[test]
fn parse_reads_back_status_lines() {
    let r = Reply::parse("0Username: ").unwrap();
    assert_eq!(r, Reply::info("Username: "));
    let r = Reply::parse("2 alice bob 127.0.0.1 5000").unwrap();
    assert_eq!(r.code, StatusCode::PrivateAccepted);
    assert_eq!(r.fields(), vec!["alice", "bob", "127.0.0.1", "5000"]);
    assert!(Reply::parse("").is_none());
    assert!(Reply::parse("9nope").is_none());
}

#[test]
fn status_digits() {
    for code in [
        StatusCode::Info,
        StatusCode::Terminal,
        StatusCode::PrivateAccepted,
        StatusCode::Question,
        StatusCode::PortRequest,
        StatusCode::PrivateClosed,
    ] {
        assert_eq!(StatusCode::from_digit(code.digit()), Some(code));
    }
    assert_eq!(StatusCode::Question.digit(), '3');
}
