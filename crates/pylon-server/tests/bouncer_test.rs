//! End-to-end bouncer tests over real TCP sockets.
//!
//! Each test stands up a fake IRC server, points a bouncer at it through a
//! `MemoryDatastore` record, and drives real client connections against the
//! bouncer's listener.

use std::time::Duration;

use pylon_core::NetworkCredentials;
use pylon_server::{Bouncer, BouncerConfig, Datastore, MemoryDatastore};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> String {
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line)).await.expect("read timed out").expect("read failed");
    // Strip only the terminator; "PASS " keeps its trailing space.
    line.strip_suffix("\r\n").unwrap_or(&line).to_string()
}

/// Start a bouncer with one stored network pointing at `upstream`.
///
/// Returns the bouncer's client-facing address.
async fn start_bouncer(upstream: &TcpListener) -> std::net::SocketAddr {
    let upstream_addr = upstream.local_addr().expect("listener address");

    let datastore = MemoryDatastore::new();
    let creds = NetworkCredentials::new(
        "127.0.0.1",
        upstream_addr.port(),
        "nick",
        "user",
        "Real Name",
    );
    datastore.store_network("example", &creds).expect("store network");

    let config = BouncerConfig { bind_address: "127.0.0.1:0".to_string() };
    let bouncer = Bouncer::bind(config, datastore).await.expect("bind bouncer");
    let addr = bouncer.local_addr().expect("bouncer address");
    tokio::spawn(bouncer.run());
    addr
}

/// Accept the bouncer's dial and consume the auth triad.
async fn accept_authenticated(
    upstream: &TcpListener,
) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (socket, _) = timeout(WAIT, upstream.accept()).await.expect("dial timed out").expect("accept");
    let (read, write) = socket.into_split();
    let mut reader = BufReader::new(read);

    assert_eq!(read_line(&mut reader).await, "PASS ");
    assert_eq!(read_line(&mut reader).await, "NICK nick");
    assert_eq!(read_line(&mut reader).await, "USER user 0 * :Real Name");

    (reader, write)
}

/// Connect a client and attach it to the named network.
async fn attach_client(
    addr: std::net::SocketAddr,
    network: &str,
) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let socket = timeout(WAIT, TcpStream::connect(addr))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    let (read, mut write) = socket.into_split();
    write.write_all(format!("PASS {network}\r\n").as_bytes()).await.expect("send PASS");
    (BufReader::new(read), write)
}

#[tokio::test]
async fn networks_added_at_runtime_are_dialed() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let upstream_addr = upstream.local_addr().expect("listener address");

    let datastore = MemoryDatastore::new();
    let config = BouncerConfig { bind_address: "127.0.0.1:0".to_string() };
    let bouncer = Bouncer::bind(config, datastore.clone()).await.expect("bind bouncer");
    let handle = bouncer.handle();
    tokio::spawn(bouncer.run());

    let creds = NetworkCredentials::new(
        "127.0.0.1",
        upstream_addr.port(),
        "nick",
        "user",
        "Real Name",
    );
    handle.add_network("example", creds).await.expect("add network");
    assert!(datastore.networks().expect("list networks").contains_key("example"));

    let (mut server_read, _server_write) = accept_authenticated(&upstream).await;

    // Removal deletes the record and hangs up the upstream socket.
    handle.remove_network("example").await.expect("remove network");
    assert!(datastore.networks().expect("list networks").is_empty());
    assert_eq!(read_line(&mut server_read).await, "");
}

#[tokio::test]
async fn ping_answered_without_clients() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    start_bouncer(&upstream).await;
    let (mut server_read, mut server_write) = accept_authenticated(&upstream).await;

    server_write.write_all(b"PING :abc\r\n").await.expect("send PING");
    assert_eq!(read_line(&mut server_read).await, "PONG :abc");
}

#[tokio::test]
async fn backlog_replayed_on_attach() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = start_bouncer(&upstream).await;
    let (_server_read, mut server_write) = accept_authenticated(&upstream).await;

    // Traffic arrives before any client exists.
    server_write.write_all(b":srv 001 nick :Welcome\r\n").await.expect("send welcome");
    server_write.write_all(b":alice!a@h PRIVMSG #c :backlog\r\n").await.expect("send chat");

    // The welcome numeric stays in the control log; only the chat line
    // reaches the client.
    let (mut client_read, _client_write) = attach_client(addr, "example").await;
    assert_eq!(read_line(&mut client_read).await, ":alice!a@h PRIVMSG #c :backlog");
}

#[tokio::test]
async fn client_lines_reach_the_network() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = start_bouncer(&upstream).await;
    let (mut server_read, _server_write) = accept_authenticated(&upstream).await;

    let (_client_read, mut client_write) = attach_client(addr, "example").await;
    client_write.write_all(b"PRIVMSG #c :hello\r\n").await.expect("send chat");

    assert_eq!(read_line(&mut server_read).await, "PRIVMSG #c :hello");
}

#[tokio::test]
async fn chat_order_survives_attach_during_flood() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = start_bouncer(&upstream).await;
    let (mut server_read, mut server_write) = accept_authenticated(&upstream).await;

    // Build a backlog, then use the keep-alive round trip as a barrier so
    // every line above it is classified before the client attaches.
    for i in 0..20 {
        server_write
            .write_all(format!(":alice!a@h PRIVMSG #c :msg {i}\r\n").as_bytes())
            .await
            .expect("send chat");
    }
    server_write.write_all(b"PING :sync\r\n").await.expect("send PING");
    assert_eq!(read_line(&mut server_read).await, "PONG :sync");

    // Flood live lines while the attach and its backlog replay are still in
    // flight. The replay must finish before any live line reaches the
    // client socket.
    let (mut client_read, _client_write) = attach_client(addr, "example").await;
    for i in 20..40 {
        server_write
            .write_all(format!(":alice!a@h PRIVMSG #c :msg {i}\r\n").as_bytes())
            .await
            .expect("send chat");
    }

    for i in 0..40 {
        assert_eq!(read_line(&mut client_read).await, format!(":alice!a@h PRIVMSG #c :msg {i}"));
    }
}

#[tokio::test]
async fn stored_channels_joined_after_auth() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let upstream_addr = upstream.local_addr().expect("listener address");

    let datastore = MemoryDatastore::new();
    let creds = NetworkCredentials::new(
        "127.0.0.1",
        upstream_addr.port(),
        "nick",
        "user",
        "Real Name",
    );
    datastore.store_network("example", &creds).expect("store network");
    datastore.store_channel("example", "#rust", None).expect("store channel");

    let config = BouncerConfig { bind_address: "127.0.0.1:0".to_string() };
    let bouncer = Bouncer::bind(config, datastore).await.expect("bind bouncer");
    tokio::spawn(bouncer.run());

    let (mut server_read, _server_write) = accept_authenticated(&upstream).await;
    assert_eq!(read_line(&mut server_read).await, "JOIN #rust");
}

#[tokio::test]
async fn channel_added_at_runtime_is_joined() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let upstream_addr = upstream.local_addr().expect("listener address");

    let datastore = MemoryDatastore::new();
    let config = BouncerConfig { bind_address: "127.0.0.1:0".to_string() };
    let bouncer = Bouncer::bind(config, datastore.clone()).await.expect("bind bouncer");
    let handle = bouncer.handle();
    tokio::spawn(bouncer.run());

    let creds = NetworkCredentials::new(
        "127.0.0.1",
        upstream_addr.port(),
        "nick",
        "user",
        "Real Name",
    );
    handle.add_network("example", creds).await.expect("add network");
    let (mut server_read, _server_write) = accept_authenticated(&upstream).await;

    handle.add_channel("example", "#keyed", Some("hunter2")).await.expect("add channel");
    assert!(datastore.channels(Some("example")).expect("list channels").contains_key("example:#keyed"));
    assert_eq!(read_line(&mut server_read).await, "JOIN #keyed hunter2");

    handle.remove_channel("example", "#keyed").await.expect("remove channel");
    assert!(datastore.channels(None).expect("list channels").is_empty());
    assert_eq!(read_line(&mut server_read).await, "PART #keyed");
}

#[tokio::test]
async fn live_chat_fans_out_to_both_clients() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = start_bouncer(&upstream).await;
    let (mut server_read, mut server_write) = accept_authenticated(&upstream).await;

    // Lines on one client socket are processed in order, so a PRIVMSG sent
    // right after PASS confirms the attachment once it arrives upstream.
    let (mut client_a_read, mut client_a_write) = attach_client(addr, "example").await;
    client_a_write.write_all(b"PRIVMSG #c :a-ready\r\n").await.expect("send marker");
    assert_eq!(read_line(&mut server_read).await, "PRIVMSG #c :a-ready");

    let (mut client_b_read, mut client_b_write) = attach_client(addr, "example").await;
    client_b_write.write_all(b"PRIVMSG #c :b-ready\r\n").await.expect("send marker");
    assert_eq!(read_line(&mut server_read).await, "PRIVMSG #c :b-ready");

    server_write.write_all(b":alice!a@h PRIVMSG #c :hi all\r\n").await.expect("send chat");
    assert_eq!(read_line(&mut client_a_read).await, ":alice!a@h PRIVMSG #c :hi all");
    assert_eq!(read_line(&mut client_b_read).await, ":alice!a@h PRIVMSG #c :hi all");
}
