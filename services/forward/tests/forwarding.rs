
use std::net::SocketAddr;

use harness::{eventually, ForwarderHandle, ScriptedBackend, TcpEchoBackend, TEST_TIMEOUT};
use portfwd::LogLevel;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    timeout(TEST_TIMEOUT, async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;
        let mut buf = vec![0u8; payload.len()];
        stream.read_exact(&mut buf).await?;
        Ok::<_, std::io::Error>(buf)
    })
    .await
    .expect("roundtrip timed out")
    .expect("roundtrip failed")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn port_only_local_forwards_to_echo() {
    let backend = TcpEchoBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("0", &format!("127.0.0.1:{}", backend.addr.port()))
        .await
        .unwrap();

    let reply = roundtrip(fwd.client_addr(), b"ping").await;
    assert_eq!(reply, b"ping");
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn ipv6_literals_bind_and_connect() {
    let backend = TcpEchoBackend::spawn("[::1]:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("[::1]:0", &format!("[::1]:{}", backend.addr.port()))
        .await
        .unwrap();

    assert_eq!(fwd.listen_addr.ip(), "::1".parse::<std::net::IpAddr>().unwrap());

    let reply = roundtrip(fwd.listen_addr, b"hello over v6").await;
    assert_eq!(reply, b"hello over v6");
}

#[tokio::test]
async fn writes_arrive_as_exact_concatenation() {
    let mut backend = ScriptedBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("127.0.0.1:0", &backend.addr.to_string())
        .await
        .unwrap();

    let mut client = TcpStream::connect(fwd.listen_addr).await.unwrap();
    let mut upstream = backend.next().await;

    let big: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let chunks: [&[u8]; 4] = [b"first ", b"\x00\x01\x02\xff", &big, b"last\n"];
    let expected: Vec<u8> = chunks.concat();

    let writer = tokio::spawn({
        let chunks: Vec<Vec<u8>> = chunks.iter().map(|c| c.to_vec()).collect();
        async move {
            for chunk in chunks {
                client.write_all(&chunk).await.unwrap();
            }
            client.shutdown().await.unwrap();
            client
        }
    });

    let mut received = Vec::new();
    timeout(TEST_TIMEOUT, upstream.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.len(), expected.len());
    assert!(received == expected, "request bytes differ");

    let mut client = writer.await.unwrap();

    let reply: Vec<u8> = big.iter().rev().copied().collect();
    let mut got = Vec::new();
    let (sent, read) = timeout(TEST_TIMEOUT, async {
        tokio::join!(
            async {
                upstream.write_all(&reply).await?;
                upstream.shutdown().await
            },
            client.read_to_end(&mut got),
        )
    })
    .await
    .unwrap();
    sent.unwrap();
    read.unwrap();
    assert!(got == reply, "response bytes differ");

    assert!(
        eventually(|| fwd.stat(|s| &s.sessions_closed) == 1).await,
        "session should finish once both directions ended"
    );
    assert_eq!(fwd.stat(|s| &s.bytes_to_upstream), expected.len() as u64);
    assert_eq!(fwd.stat(|s| &s.bytes_from_upstream), reply.len() as u64);
}

#[tokio::test]
async fn half_close_keeps_response_direction_open() {
    let mut backend = ScriptedBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("127.0.0.1:0", &backend.addr.to_string())
        .await
        .unwrap();

    let mut client = TcpStream::connect(fwd.listen_addr).await.unwrap();
    let mut upstream = backend.next().await;

    client.write_all(b"request").await.unwrap();
    client.shutdown().await.unwrap();

    // Upstream observes end of stream...
    let mut request = Vec::new();
    timeout(TEST_TIMEOUT, upstream.read_to_end(&mut request))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request, b"request");

    // ...while the reverse direction keeps working.
    upstream.write_all(b"response part 1, ").await.unwrap();
    let mut buf = [0u8; 17];
    timeout(TEST_TIMEOUT, client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"response part 1, ");

    upstream.write_all(b"part 2").await.unwrap();
    upstream.shutdown().await.unwrap();

    let mut rest = Vec::new();
    timeout(TEST_TIMEOUT, client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rest, b"part 2");
}

#[tokio::test]
async fn upstream_close_reaches_client() {
    let mut backend = ScriptedBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("127.0.0.1:0", &backend.addr.to_string())
        .await
        .unwrap();

    let mut client = TcpStream::connect(fwd.listen_addr).await.unwrap();
    let upstream = backend.next().await;
    drop(upstream);

    let mut buf = [0u8; 16];
    let result = timeout(TEST_TIMEOUT, client.read(&mut buf))
        .await
        .expect("client should see the upstream close");
    assert!(matches!(result, Ok(0) | Err(_)));

    drop(client);
    assert!(
        eventually(|| fwd.stat(|s| &s.sessions_closed) == 1).await,
        "session should be torn down"
    );
    assert_eq!(fwd.stat(|s| &s.sessions_active), 0);
}

#[tokio::test]
async fn client_close_reaches_upstream() {
    let mut backend = ScriptedBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("127.0.0.1:0", &backend.addr.to_string())
        .await
        .unwrap();

    let client = TcpStream::connect(fwd.listen_addr).await.unwrap();
    let mut upstream = backend.next().await;
    drop(client);

    let mut buf = [0u8; 16];
    let result = timeout(TEST_TIMEOUT, upstream.read(&mut buf))
        .await
        .expect("upstream should see the client close");
    assert!(matches!(result, Ok(0) | Err(_)));

    drop(upstream);
    assert!(
        eventually(|| fwd.stat(|s| &s.sessions_closed) == 1).await,
        "session should be torn down"
    );
}

#[tokio::test]
async fn unreachable_destination_closes_client() {
    let temp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = temp.local_addr().unwrap().port();
    drop(temp);

    let fwd = ForwarderHandle::spawn_with_level(
        "127.0.0.1:0",
        &format!("127.0.0.1:{dead_port}"),
        LogLevel::Lifecycle,
    )
    .await
    .unwrap();

    let mut client = TcpStream::connect(fwd.listen_addr).await.unwrap();
    let mut buf = [0u8; 16];
    let result = timeout(TEST_TIMEOUT, client.read(&mut buf))
        .await
        .expect("client should be closed after the failed dial");
    assert!(matches!(result, Ok(0) | Err(_)));

    assert!(eventually(|| fwd.stat(|s| &s.upstream_failed) == 1).await);
    assert_eq!(fwd.stat(|s| &s.upstream_connected), 0);

    // The listener keeps serving after a failed session.
    let mut again = TcpStream::connect(fwd.listen_addr).await.unwrap();
    let result = timeout(TEST_TIMEOUT, again.read(&mut buf)).await.unwrap();
    assert!(matches!(result, Ok(0) | Err(_)));
    assert!(eventually(|| fwd.stat(|s| &s.upstream_failed) == 2).await);
}

#[tokio::test]
async fn data_level_dumps_both_directions() {
    let backend = TcpEchoBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn_with_level(
        "127.0.0.1:0",
        &backend.addr.to_string(),
        LogLevel::Data,
    )
    .await
    .unwrap();

    let reply = roundtrip(fwd.listen_addr, b"ping").await;
    assert_eq!(reply, b"ping");

    let dump = fwd.dump_contents().await;
    assert!(contains(&dump, b"<REQ>Data:\nping<<END>>\n"));
    assert!(contains(&dump, b"<RES>Data:\nping<<END>>\n"));
}

#[tokio::test]
async fn level_toggle_applies_to_live_forwarder() {
    let backend = TcpEchoBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("127.0.0.1:0", &backend.addr.to_string())
        .await
        .unwrap();

    roundtrip(fwd.listen_addr, b"quiet").await;
    assert!(fwd.dump_contents().await.is_empty());

    assert_eq!(fwd.log_level.advance(), LogLevel::Lifecycle);
    roundtrip(fwd.listen_addr, b"still quiet").await;
    assert!(fwd.dump_contents().await.is_empty());

    assert_eq!(fwd.log_level.advance(), LogLevel::Data);
    roundtrip(fwd.listen_addr, b"loud\n").await;
    assert!(contains(&fwd.dump_contents().await, b"<REQ>Data:\nloud\n"));
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let backend = TcpEchoBackend::spawn("127.0.0.1:0").await.unwrap();
    let fwd = ForwarderHandle::spawn("127.0.0.1:0", &backend.addr.to_string())
        .await
        .unwrap();

    let addr = fwd.listen_addr;
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            tokio::spawn(async move {
                let payload = format!("session-{i}").into_bytes();
                let reply = roundtrip(addr, &payload).await;
                assert_eq!(reply, payload);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(backend.connection_count(), 8);
    assert_eq!(fwd.stat(|s| &s.sessions_accepted), 8);
}
