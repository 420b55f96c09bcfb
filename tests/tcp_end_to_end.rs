use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skynet::chat::connection::MAX_LINE_LENGTH;
use skynet::chat::{ChatServer, Reply, ServerContext, StatusCode};
use skynet::config::Config;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_test::assert_ok;

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Client { lines: BufReader::new(reader).lines(), writer }
    }

    async fn send(&mut self, line: &str) {
        assert_ok!(self.writer.write_all(format!("{}\r\n", line).as_bytes()).await);
    }

    async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(3), self.lines.next_line())
            .await
            .expect("timed out reading from server")
            .unwrap()
    }

    async fn expect(&mut self, needle: &str) -> Reply {
        loop {
            let line = self.next_line().await.expect("server closed the connection");
            let reply = Reply::parse(&line).expect("status-coded line");
            if reply.body.contains(needle) {
                return reply;
            }
        }
    }

    async fn login(&mut self, user: &str, password: &str) {
        self.expect("Enter \"login\" to begin.").await;
        self.send("login").await;
        self.expect("Username: ").await;
        self.send(user).await;
        self.expect("Password: ").await;
        self.send(password).await;
        self.expect("Login successful").await;
    }
}

async fn start_server(dir: &TempDir) -> (Arc<ServerContext>, SocketAddr) {
    let creds = dir.path().join("credentials.txt");
    tokio::fs::write(&creds, "alice a\nbob b\n").await.unwrap();

    let mut config = Config::default();
    config.server.bind_address = "127.0.0.1".into();
    config.server.port = 0;
    config.storage.credentials_file = creds.to_str().unwrap().to_string();

    let mut server = ChatServer::new(config).await.unwrap();
    let ctx = server.context();
    let addr = server.bind().await.unwrap();
    tokio::spawn(async move { server.run().await });
    (ctx, addr)
}

async fn wait_for_presence(ctx: &ServerContext, user: &str, present: bool) {
    for _ in 0..150 {
        if ctx.presence.contains(user).await == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} present={} never observed", user, present);
}

#[tokio::test]
async fn chat_over_tcp() {
    let dir = TempDir::new().unwrap();
    let (ctx, addr) = start_server(&dir).await;

    let mut alice = Client::connect(addr).await;
    alice.login("alice", "a").await;
    wait_for_presence(&ctx, "alice", true).await;
    let mut bob = Client::connect(addr).await;
    bob.login("bob", "b").await;
    alice.expect("System: bob has logged in.").await;

    alice.send("message bob hi there").await;
    let r = bob.expect("alice:").await;
    assert_eq!(r.encode(), "0alice: hi there");

    alice.send("startprivate bob").await;
    let q = bob.expect("wants to have a private chat").await;
    assert_eq!(q.code, StatusCode::Question);
    bob.send("y").await;
    let p = bob.expect("alice").await;
    assert_eq!(p.encode(), "4 bob alice");
    bob.send("7000").await;
    let a = alice.expect("bob 127.0.0.1").await;
    assert_eq!(a.encode(), "2 alice bob 127.0.0.1 7000");

    bob.send("logout").await;
    let r = bob.expect("logged out").await;
    assert_eq!(r.code, StatusCode::Terminal);
    assert_eq!(bob.next_line().await, None);
    alice.expect("System: bob has logged out.").await;
    assert!(!ctx.presence.contains("bob").await);

    // Closing the socket without logging out frees the account too
    drop(alice);
    wait_for_presence(&ctx, "alice", false).await;
}

#[tokio::test]
async fn oversized_line_ends_the_connection() {
    let dir = TempDir::new().unwrap();
    let (ctx, addr) = start_server(&dir).await;

    let mut alice = Client::connect(addr).await;
    alice.login("alice", "a").await;
    wait_for_presence(&ctx, "alice", true).await;
    let mut bob = Client::connect(addr).await;
    bob.login("bob", "b").await;
    alice.expect("System: bob has logged in.").await;

    let huge = format!("broadcast {}", "A".repeat(MAX_LINE_LENGTH * 4));
    // The server may hang up before the whole line is written.
    let _ = alice.writer.write_all(format!("{}\n", huge).as_bytes()).await;

    wait_for_presence(&ctx, "alice", false).await;

    // bob hears about the logout but never sees the oversized line
    loop {
        let line = bob.next_line().await.expect("server closed the connection");
        assert!(!line.starts_with("0alice:"), "bob received a {} byte line", line.len());
        if line == "0System: alice has logged out." {
            break;
        }
    }
}
