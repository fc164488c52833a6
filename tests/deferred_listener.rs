//! Deferred binding and the plaintext gateway endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{argv, free_port, no_env, sandbox, PASSWORD};
use litd_gateway::config::{load_and_validate, Validators};
use litd_gateway::http::GatewayServer;
use litd_gateway::net::listener::ListenerError;
use litd_gateway::net::{DeferredListener, ListenAddress};
use litd_gateway::Shutdown;
use tokio::net::TcpStream;

async fn wait_until_bound(listener: &DeferredListener) {
    for _ in 0..100 {
        if listener.is_bound().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("listener never bound");
}

async fn get_with_retry(url: &str) -> reqwest::Response {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(url).send().await {
            return resp;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{url} never answered");
}

#[tokio::test]
async fn address_is_known_before_binding() {
    let addr = free_port();
    let listener = Arc::new(DeferredListener::new(ListenAddress::Tcp(addr)));

    assert_eq!(listener.addr(), &ListenAddress::Tcp(addr));
    assert!(!listener.is_bound().await);
    assert!(listener.bound_addr().await.is_none());
    assert!(TcpStream::connect(addr).await.is_err());

    let accepting = Arc::clone(&listener);
    let task = tokio::spawn(async move { accepting.accept().await.map(|(_, peer)| peer) });
    wait_until_bound(&listener).await;

    let client = TcpStream::connect(addr).await.unwrap();
    let peer = task.await.unwrap().unwrap();
    assert_eq!(peer.to_string(), client.local_addr().unwrap().to_string());
    assert_eq!(listener.addr(), &ListenAddress::Tcp(addr));
}

#[tokio::test]
async fn port_zero_reports_the_bound_port() {
    let listener = Arc::new(DeferredListener::new(
        ListenAddress::parse("127.0.0.1:0", 0).unwrap(),
    ));
    let accepting = Arc::clone(&listener);
    tokio::spawn(async move {
        let _ = accepting.accept().await;
    });
    wait_until_bound(&listener).await;

    match listener.bound_addr().await {
        Some(ListenAddress::Tcp(sock)) => assert_ne!(sock.port(), 0),
        other => panic!("unexpected bound address: {other:?}"),
    }
}

#[tokio::test]
async fn closed_listener_refuses_accept() {
    let listener = DeferredListener::new(ListenAddress::Tcp(free_port()));
    listener.close().await;
    assert!(listener.accept().await.is_err());
}

#[tokio::test]
async fn gateway_serves_health_and_status() {
    let (_tmp, defaults) = sandbox();
    let addr = free_port();
    let resolved = load_and_validate(
        &defaults,
        argv(&["--uipassword", PASSWORD, "--remote.lnd.network", "regtest"]),
        Validators::builtin(),
        no_env,
    )
    .unwrap();

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(&resolved.config);
    let task = tokio::spawn(
        server.serve(DeferredListener::new(ListenAddress::Tcp(addr)), shutdown.subscribe()),
    );

    let resp = get_with_retry(&format!("http://{addr}/health")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");

    let status: serde_json::Value = get_with_retry(&format!("http://{addr}/v1/status"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["mode"], "remote");
    assert_eq!(status["network"], "regtest");
    assert_eq!(status["lnd_rpc_server"], "localhost:10009");

    shutdown.trigger();
    let stopped = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn close_unblocks_a_pending_accept() {
    let addr = free_port();
    let listener = Arc::new(DeferredListener::new(ListenAddress::Tcp(addr)));

    let accepting = Arc::clone(&listener);
    let task = tokio::spawn(async move { accepting.accept().await.map(|_| ()) });
    wait_until_bound(&listener).await;

    listener.close().await;
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("accept still blocked after close")
        .unwrap();
    assert!(matches!(outcome, Err(ListenerError::Closed)));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn serving_on_an_occupied_port_fails() {
    let (_tmp, defaults) = sandbox();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();
    let resolved = load_and_validate(
        &defaults,
        argv(&["--uipassword", PASSWORD]),
        Validators::builtin(),
        no_env,
    )
    .unwrap();

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(&resolved.config);
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        server.serve(DeferredListener::new(ListenAddress::Tcp(addr)), shutdown.subscribe()),
    )
    .await
    .expect("serve kept running without a socket");

    let err = outcome.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
    drop(taken);
}
