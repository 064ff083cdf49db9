//! Integration test: Gateway <-> loopback venue
//!
//! Runs the full path over real TCP:
//! Gateway -> Worker -> Session -> FramedTransport -> Venue -> back

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fixgate_core::ConnectionClass;
use fixgate_gateway::codec::{DecodeOptions, Encoder, Field, ProtocolMessage, tags};
use fixgate_gateway::transport::{FramedTransport, SessionTransport, Subscriber};
use fixgate_gateway::{
    ConnectError, ConnectRequest, Credentials, Gateway, GatewayConfig, Request,
    RequestErrorKind, ResponseData, SessionState, TransportError,
};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

type Journal = Arc<Mutex<Vec<String>>>;

/// Accepts any password except `wrong`. Users named `flaky` lose their
/// connection on their first account request; users named `silent` get no
/// answer to anything after their first logon.
struct Venue {
    port: u16,
    journal: Journal,
}

impl Venue {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&journal);
        let sabotaged = Arc::new(Mutex::new(HashSet::new()));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&log), Arc::clone(&sabotaged)));
            }
        });
        Self { port, journal }
    }

    fn seen(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.journal.lock().iter().filter(|e| *e == entry).count()
    }
}

async fn serve(stream: TcpStream, journal: Journal, sabotaged: Arc<Mutex<HashSet<String>>>) {
    let mut venue = FramedTransport::new(
        stream,
        Encoder::new("FIX.4.4", "VENUE", "CLIENT"),
        DecodeOptions::default(),
        Duration::from_millis(100),
        1 << 16,
    );

    let Ok(Some(logon)) = venue.next_message().await else {
        return;
    };
    journal.lock().push("A".into());
    let user = logon.get(tags::USERNAME).unwrap_or_default().to_string();
    if logon.get(tags::PASSWORD) == Some("wrong") {
        let _ = venue.send("5", &[Field::new(tags::TEXT, "Invalid credentials")]).await;
        return;
    }
    if venue.send("A", &[]).await.is_err() {
        return;
    }
    let first_time = |user: &str| sabotaged.lock().insert(user.to_string());
    if user == "silent" && first_time(&user) {
        while let Ok(Some(_)) = venue.next_message().await {}
        return;
    }

    while let Ok(Some(msg)) = venue.next_message().await {
        let msg_type = msg.msg_type().unwrap_or_default().to_string();
        match msg_type.as_str() {
            "U1005" => {
                journal.lock().push("U1005".into());
                if user == "flaky" && first_time(&user) {
                    return;
                }
                let _ = venue.send("U1006", &account_info(&msg)).await;
            }
            "V" => {
                let kind = msg.get(tags::SUBSCRIPTION_REQUEST_TYPE).unwrap_or_default();
                journal.lock().push(format!("V{kind}"));
                if kind == "1" {
                    let _ = venue.send("W", &book(&msg)).await;
                }
            }
            "5" => {
                journal.lock().push("5".into());
                let _ = venue.send("5", &[]).await;
                return;
            }
            // Security list requests go unanswered
            other => journal.lock().push(other.to_string()),
        }
    }
}

fn account_info(request: &ProtocolMessage) -> Vec<Field> {
    let id = request.get(tags::ACCOUNT_INFO_REQ_ID).unwrap_or_default();
    vec![
        Field::new(tags::ACCOUNT_INFO_REQ_ID, id),
        Field::new(tags::ACCOUNT, "1001"),
        Field::new(tags::CURRENCY, "USD"),
        Field::new(tags::BALANCE, "10000.50"),
    ]
}

fn book(request: &ProtocolMessage) -> Vec<Field> {
    vec![
        Field::new(tags::MD_REQ_ID, request.get(tags::MD_REQ_ID).unwrap_or_default()),
        Field::new(tags::SYMBOL, request.get(tags::SYMBOL).unwrap_or_default()),
        Field::new(tags::NO_MD_ENTRIES, "2"),
        Field::new(tags::MD_ENTRY_TYPE, "0"),
        Field::new(tags::MD_ENTRY_PX, "1.0850"),
        Field::new(tags::MD_ENTRY_SIZE, "1000000"),
        Field::new(tags::MD_ENTRY_TYPE, "1"),
        Field::new(tags::MD_ENTRY_PX, "1.0852"),
        Field::new(tags::MD_ENTRY_SIZE, "500000"),
    ]
}

fn config(venue: &Venue) -> GatewayConfig {
    let mut config = GatewayConfig::default()
        .with_comp_ids("CLIENT", "VENUE")
        .with_plain_endpoint("127.0.0.1", venue.port);
    config.timeouts.logout_ack_secs = 1;
    config
}

fn gateway(venue: &Venue) -> Gateway {
    Gateway::new(config(venue)).unwrap()
}

fn connect_request(user: &str, class: ConnectionClass) -> ConnectRequest {
    ConnectRequest::new(user, class, Credentials::new(user, "secret"))
}

#[tokio::test]
async fn test_logon_then_account_info() {
    let _ = env_logger::try_init();
    let venue = Venue::start().await;
    let gateway = gateway(&venue);

    let session = gateway
        .connect(connect_request("alice", ConnectionClass::Trade), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(gateway.is_healthy(&session));
    let health = gateway.health();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].state, SessionState::Active);

    let response = gateway
        .submit(&session, &Request::AccountInfo, None)
        .await
        .unwrap();
    match response {
        ResponseData::AccountInfo(info) => {
            assert_eq!(info.account_id.as_deref(), Some("1001"));
            assert_eq!(info.currency.as_deref(), Some("USD"));
            assert_eq!(info.balance, Some(dec!(10000.50)));
        }
        other => panic!("unexpected {other:?}"),
    }

    gateway.disconnect(&session).await.unwrap();
    assert_eq!(venue.seen(), vec!["A", "U1005", "5"]);
}

#[tokio::test]
async fn test_logon_rejected() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);

    let request = ConnectRequest::new(
        "mallory",
        ConnectionClass::Trade,
        Credentials::new("mallory", "wrong"),
    );
    match gateway.connect(request, Duration::from_secs(5)).await {
        Err(ConnectError::SessionRejected { reason }) => {
            assert_eq!(reason, "Invalid credentials");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(gateway.health().is_empty());
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);
    let session = gateway
        .connect(connect_request("alice", ConnectionClass::Feed), Duration::from_secs(5))
        .await
        .unwrap();

    let started = Instant::now();
    let err = gateway
        .submit(&session, &Request::SecurityList, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind, RequestErrorKind::Timeout);
    assert!(elapsed >= Duration::from_secs(1), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1200), "returned after {elapsed:?}");
    // The session survives a lost answer
    assert!(gateway.is_healthy(&session));
}

#[tokio::test]
async fn test_subscribe_streams_books_until_unsubscribed() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);
    let session = gateway
        .connect(connect_request("alice", ConnectionClass::Feed), Duration::from_secs(5))
        .await
        .unwrap();

    let (subscription, mut stream) = gateway
        .subscribe_channel(&session, "EURUSD", Some(5))
        .await
        .unwrap();
    let book = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(book.symbol, "EURUSD");
    assert_eq!(book.best_bid, Some(dec!(1.0850)));
    assert_eq!(book.best_ask, Some(dec!(1.0852)));
    assert_eq!(book.mid, Some(dec!(1.0851)));
    assert_eq!(book.spread, Some(dec!(0.0002)));
    assert_eq!(gateway.subscriptions(&session).get("EURUSD"), Some(&1));

    gateway.unsubscribe(subscription.clone()).await.unwrap();
    // Repeating it is a no-op
    gateway.unsubscribe(subscription).await.unwrap();
    assert!(gateway.subscriptions(&session).is_empty());
    assert!(matches!(stream.next().await, Err(TransportError::ChannelClosed)));

    gateway.disconnect(&session).await.unwrap();
    assert_eq!(venue.count("V1"), 1);
    assert_eq!(venue.count("V2"), 1);
}

#[tokio::test]
async fn test_second_listener_shares_the_venue_stream() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);
    let session = gateway
        .connect(connect_request("alice", ConnectionClass::Feed), Duration::from_secs(5))
        .await
        .unwrap();

    let (first, _s1) = gateway.subscribe_channel(&session, "GBPUSD", None).await.unwrap();
    let (second, _s2) = gateway.subscribe_channel(&session, "GBPUSD", None).await.unwrap();
    assert_eq!(gateway.subscriptions(&session).get("GBPUSD"), Some(&2));
    assert_eq!(venue.count("V1"), 1);

    gateway.unsubscribe(first).await.unwrap();
    gateway.unsubscribe(second).await.unwrap();
    gateway.disconnect(&session).await.unwrap();
    assert_eq!(venue.count("V2"), 1);
}

#[tokio::test]
async fn test_market_data_needs_a_feed_session() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);
    let session = gateway
        .connect(connect_request("alice", ConnectionClass::Trade), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(gateway.subscribe_channel(&session, "EURUSD", None).await.is_err());
    let err = gateway
        .submit(&session, &Request::SecurityList, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, RequestErrorKind::Rejected);
    assert!(!venue.seen().iter().any(|m| m == "V1" || m == "x"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);
    let session = gateway
        .connect(connect_request("alice", ConnectionClass::Trade), Duration::from_secs(5))
        .await
        .unwrap();

    gateway.disconnect(&session).await.unwrap();
    gateway.disconnect(&session).await.unwrap();
    assert_eq!(venue.count("5"), 1);

    let err = gateway
        .submit(&session, &Request::AccountInfo, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, RequestErrorKind::SessionNotActive);
}

#[tokio::test]
async fn test_sessions_reconnect_after_connection_loss() {
    let venue = Venue::start().await;
    let gateway = gateway(&venue);
    let session = gateway
        .connect(connect_request("flaky", ConnectionClass::Trade), Duration::from_secs(5))
        .await
        .unwrap();

    let err = gateway
        .submit(&session, &Request::AccountInfo, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, RequestErrorKind::TransportFailure);

    // Let the failed worker finish its teardown
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!gateway.is_healthy(&session));

    let response = gateway
        .submit(&session, &Request::AccountInfo, None)
        .await
        .unwrap();
    assert!(matches!(response, ResponseData::AccountInfo(_)));
    assert_eq!(venue.count("A"), 2);
    gateway.disconnect(&session).await.unwrap();
}

#[tokio::test]
async fn test_request_fails_when_peer_goes_silent_then_reconnects() {
    let venue = Venue::start().await;
    let gateway = Gateway::new(config(&venue).with_heartbeat_secs(1)).unwrap();
    let session = gateway
        .connect(connect_request("silent", ConnectionClass::Trade), Duration::from_secs(5))
        .await
        .unwrap();

    // Three quiet heartbeat intervals and the worker gives up on the peer
    let started = Instant::now();
    let err = gateway
        .submit(&session, &Request::AccountInfo, Some(Duration::from_secs(10)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, RequestErrorKind::TransportFailure);
    assert!(started.elapsed() < Duration::from_secs(6), "{:?}", started.elapsed());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!gateway.is_healthy(&session));
    assert_eq!(gateway.health()[0].state, SessionState::Failed);

    let response = gateway
        .submit(&session, &Request::AccountInfo, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(matches!(response, ResponseData::AccountInfo(_)));
    assert_eq!(venue.count("A"), 2);
    assert!(gateway.is_healthy(&session));
    gateway.disconnect(&session).await.unwrap();
}
