//! The control listener over a real TCP connection.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use framecast::{
    SubscriptionRegistry,
    control::{ControlClient, ControlCommand, MAX_LINE_LENGTH, serve_control},
};
use rstest::{fixture, rstest};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;

struct Server {
    addr: SocketAddr,
    registry: Arc<SubscriptionRegistry>,
    token: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl Server {
    async fn stop(self) {
        self.token.cancel();
        timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server stops")
            .expect("server task joins")
            .expect("server exits cleanly");
    }
}

#[fixture]
async fn server() -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind control");
    let addr = listener.local_addr().expect("local addr");
    let registry = Arc::new(SubscriptionRegistry::new());
    let token = CancellationToken::new();
    let task = tokio::spawn(serve_control(
        listener,
        Arc::clone(&registry),
        token.clone(),
    ));
    Server {
        addr,
        registry,
        token,
        task,
    }
}

fn udp(port: u16) -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], port)) }

#[rstest]
#[tokio::test]
async fn subscriptions_are_managed_over_tcp(#[future] server: Server) {
    let server = server.await;
    let mut client = ControlClient::connect(server.addr).await.expect("connect");

    let reply = client
        .request(&ControlCommand::Subscribe {
            flow: "video1".into(),
            address: udp(5000),
        })
        .await
        .expect("subscribe");
    assert_eq!(reply, "status=ok flow=video1 address=127.0.0.1:5000");
    assert_eq!(server.registry.lookup("video1"), Some(udp(5000)));

    let reply = client.request(&ControlCommand::List).await.expect("list");
    assert_eq!(reply, "status=ok count=1 flows=video1@127.0.0.1:5000");

    let reply = client
        .request(&ControlCommand::Unsubscribe {
            flow: "video1".into(),
        })
        .await
        .expect("unsubscribe");
    assert_eq!(reply, "status=ok flow=video1 removed=true");
    assert!(server.registry.is_empty());

    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn bad_requests_get_error_replies(#[future] server: Server) {
    let server = server.await;
    let mut client = ControlClient::connect(server.addr).await.expect("connect");

    let reply = client.request_line("command=subscribe flow=video1").await.expect("reply");
    assert_eq!(reply, "status=error reason=missing \"address\"");

    let reply = client.request_line("command=list").await.expect("reply");
    assert_eq!(reply, "status=ok count=0 flows=");

    let long = format!("command=list pad={}", "x".repeat(MAX_LINE_LENGTH));
    let reply = client.request_line(&long).await.expect("reply");
    assert!(reply.starts_with("status=error reason=request exceeds"));
    assert!(client.request_line("command=list").await.is_err());

    let mut fresh = ControlClient::connect(server.addr).await.expect("reconnect");
    let reply = fresh.request_line("command=list").await.expect("reply");
    assert_eq!(reply, "status=ok count=0 flows=");

    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn clients_share_one_registry(#[future] server: Server) {
    let server = server.await;
    let mut first = ControlClient::connect(server.addr).await.expect("connect");
    let mut second = ControlClient::connect(server.addr).await.expect("connect");

    first
        .request_line("command=subscribe flow=audio1 address=127.0.0.1:6000")
        .await
        .expect("reply");
    let reply = second
        .request_line("command=subscribe flow=audio1 address=127.0.0.1:6001")
        .await
        .expect("reply");
    assert_eq!(
        reply,
        "status=ok flow=audio1 address=127.0.0.1:6001 replaced=127.0.0.1:6000"
    );

    // Open connections do not keep the server alive after cancellation.
    server.stop().await;
}
