/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use snirelay::acl::RuleSet;
use snirelay::config::BindingConfig;
use snirelay::serve::{BindingServer, BindingStats, ConnectionIdAllocator};

fn client_hello_for(host: &str) -> Vec<u8> {
    let host = host.as_bytes();
    let mut sni_ext = Vec::new();
    sni_ext.extend_from_slice(&((host.len() + 3) as u16).to_be_bytes()); // list length
    sni_ext.push(0x00); // name type - domain
    sni_ext.extend_from_slice(&(host.len() as u16).to_be_bytes());
    sni_ext.extend_from_slice(host);

    let mut extensions = vec![0x00, 0x00]; // extension type - server name
    extensions.extend_from_slice(&(sni_ext.len() as u16).to_be_bytes());
    extensions.extend_from_slice(&sni_ext);

    let mut body = vec![0x03, 0x03]; // TLS 1.2
    body.extend_from_slice(&[0x5a; 32]); // random
    body.push(0x20);
    body.extend_from_slice(&[0xc3; 32]); // session id
    body.extend_from_slice(&[0x00, 0x04, 0x13, 0x02, 0x13, 0x01]); // cipher suites
    body.extend_from_slice(&[0x01, 0x00]); // compression methods
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut data = vec![0x16, 0x03, 0x01];
    data.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    data.push(0x01); // handshake type - client hello
    data.push(0x00);
    data.extend_from_slice(&(body.len() as u16).to_be_bytes());
    data.append(&mut body);
    data
}

async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

// a backend that accepts and then stays completely silent
async fn start_mute_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            open.push(stream);
        }
    });
    addr
}

async fn start_relay(
    target_port: u16,
    idle_close_seconds: i64,
    acl: Option<Arc<RuleSet>>,
    self_addrs: Option<Arc<AHashSet<IpAddr>>>,
) -> (SocketAddr, Arc<BindingStats>) {
    let config = BindingConfig {
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        target_port,
        idle_close_seconds,
    };
    let server = BindingServer::new(
        config,
        acl,
        self_addrs,
        Arc::new(ConnectionIdAllocator::default()),
    );
    let stats = server.stats().clone();
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    (addr, stats)
}

async fn wait_handled(stats: &BindingStats, count: i64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while stats.total_handled() < count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("sessions did not complete in time");
}

// read until EOF or error, both count as the relay having closed on us
async fn read_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 256];
    loop {
        match tokio::time::timeout(Duration::from_secs(10), stream.read(&mut buf))
            .await
            .expect("relay did not close the connection in time")
        {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let backend = start_echo_backend().await;
    let (relay, stats) = start_relay(backend.port(), 300, None, None).await;

    let hello = client_hello_for("127.0.0.1");
    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(&hello).await.unwrap();

    // the echoed hello proves the relay consumed it before our app data
    let mut echoed = vec![0u8; hello.len()];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, hello);

    client.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");

    client.shutdown().await.unwrap();
    read_closed(&mut client).await;
    wait_handled(&stats, 1).await;

    let total = (hello.len() + 4) as u64;
    assert_eq!(stats.uploaded(), total);
    assert_eq!(stats.downloaded(), total);
    assert_eq!(stats.active(), 0);
    assert_eq!(stats.total_handled(), 1);
}

#[tokio::test]
async fn concurrent_sessions() {
    const SESSIONS: usize = 8;

    let backend = start_echo_backend().await;
    let (relay, stats) = start_relay(backend.port(), 300, None, None).await;

    let mut tasks = Vec::new();
    for i in 0..SESSIONS {
        tasks.push(tokio::spawn(async move {
            let hello = client_hello_for("127.0.0.1");
            let msg = format!("message-{i}");
            let mut client = TcpStream::connect(relay).await.unwrap();
            client.write_all(&hello).await.unwrap();

            let mut echoed = vec![0u8; hello.len()];
            client.read_exact(&mut echoed).await.unwrap();

            client.write_all(msg.as_bytes()).await.unwrap();
            let mut echoed = vec![0u8; msg.len()];
            client.read_exact(&mut echoed).await.unwrap();
            assert_eq!(echoed, msg.as_bytes());
            client.shutdown().await.unwrap();
            read_closed(&mut client).await;
            (hello.len() + msg.len()) as u64
        }));
    }

    let mut total = 0u64;
    for task in tasks {
        total += task.await.unwrap();
    }
    wait_handled(&stats, SESSIONS as i64).await;

    assert_eq!(stats.total_handled(), SESSIONS as i64);
    assert_eq!(stats.active(), 0);
    assert!(stats.active() >= 0);
    assert_eq!(stats.uploaded(), total);
    assert_eq!(stats.downloaded(), total);
}

#[tokio::test]
async fn idle_session_is_closed() {
    let backend = start_mute_backend().await;
    let (relay, stats) = start_relay(backend.port(), 1, None, None).await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    client
        .write_all(&client_hello_for("127.0.0.1"))
        .await
        .unwrap();

    // both directions stay silent, the idle check must kill the session
    read_closed(&mut client).await;
    wait_handled(&stats, 1).await;
    assert_eq!(stats.active(), 0);
}

#[tokio::test]
async fn negative_idle_close_disables_the_check() {
    let backend = start_echo_backend().await;
    let (relay, _stats) = start_relay(backend.port(), -1, None, None).await;

    let hello = client_hello_for("127.0.0.1");
    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(&hello).await.unwrap();
    let mut echoed = vec![0u8; hello.len()];
    client.read_exact(&mut echoed).await.unwrap();

    // well past several idle check periods
    tokio::time::sleep(Duration::from_secs(3)).await;

    client.write_all(b"still-alive").await.unwrap();
    let mut echoed = vec![0u8; 11];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"still-alive");
}

#[tokio::test]
async fn denied_host_is_rejected() {
    let backend = start_echo_backend().await;
    let acl = RuleSet::load_json(
        r#"{"no_match_decision": "allow", "blacklist": ["host:127.0.0.1"]}"#,
    )
    .unwrap();
    let (relay, stats) = start_relay(backend.port(), 300, Some(Arc::new(acl)), None).await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    client
        .write_all(&client_hello_for("127.0.0.1"))
        .await
        .unwrap();

    read_closed(&mut client).await;
    wait_handled(&stats, 1).await;
    // rejected before any byte went upstream
    assert_eq!(stats.uploaded(), 0);
    assert_eq!(stats.downloaded(), 0);
}

#[tokio::test]
async fn self_loop_target_is_rejected() {
    let backend = start_echo_backend().await;
    let mut self_addrs = AHashSet::new();
    self_addrs.insert("127.0.0.1".parse::<IpAddr>().unwrap());
    let (relay, stats) = start_relay(backend.port(), 300, None, Some(Arc::new(self_addrs))).await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    client
        .write_all(&client_hello_for("127.0.0.1"))
        .await
        .unwrap();

    read_closed(&mut client).await;
    wait_handled(&stats, 1).await;
    assert_eq!(stats.uploaded(), 0);
    assert_eq!(stats.downloaded(), 0);
}

#[tokio::test]
async fn non_tls_garbage_is_dropped() {
    let backend = start_echo_backend().await;
    let (relay, stats) = start_relay(backend.port(), 300, None, None).await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    // more garbage than the hello buffer will ever hold
    let _ = client.write_all(&[0x47u8; 5000]).await;

    read_closed(&mut client).await;
    wait_handled(&stats, 1).await;
    assert_eq!(stats.uploaded(), 0);
    assert_eq!(stats.downloaded(), 0);
}
