//! End-to-end scenarios from spec §8, run against a local mock relay.
//!
//! The mock relay buffers every published frame per topic and replays the
//! backlog to a connection the moment it subscribes, mirroring how a real
//! WalletConnect bridge delivers a dApp's handshake request to a wallet that
//! only opens its socket after scanning the QR code.

use {
    bridge_connector::{
        client::{EVENT_CONNECT, EVENT_DISCONNECT, EVENT_SESSION_REQUEST},
        dispatcher::CALL_REQUEST,
        rpc::PeerMeta,
        Client, ClientOptions, InMemorySessionStore,
    },
    dashmap::DashMap,
    futures_util::{SinkExt, StreamExt},
    std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::sync::mpsc,
    warp::{ws::Message, Filter},
};

static NEXT_CONN_ID: AtomicUsize = AtomicUsize::new(0);

struct MockRelay {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct TopicState {
    backlog: Vec<String>,
    subscribers: Vec<(usize, mpsc::UnboundedSender<Message>)>,
}

impl MockRelay {
    fn start() -> Self {
        let topics: Arc<DashMap<String, TopicState>> = Arc::new(DashMap::new());
        let topics_filter = warp::any().map(move || topics.clone());

        let routes = warp::path::end()
            .and(warp::ws())
            .and(topics_filter)
            .map(|ws: warp::ws::Ws, topics: Arc<DashMap<String, TopicState>>| {
                ws.on_upgrade(move |socket| handle_connection(socket, topics))
            });

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        let handle = tokio::spawn(server);
        Self { addr, handle }
    }

    fn bridge_url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(socket: warp::ws::WebSocket, topics: Arc<DashMap<String, TopicState>>) {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Ok(text) = msg.to_str() else { continue };
        let Ok(frame) = serde_json::from_str::<serde_json::Value>(text) else { continue };
        let topic = frame.get("topic").and_then(|t| t.as_str()).unwrap_or_default().to_owned();
        match frame.get("type").and_then(|t| t.as_str()) {
            Some("sub") => {
                let mut state = topics.entry(topic).or_default();
                for backlogged in &state.backlog {
                    let _ = out_tx.send(Message::text(backlogged.clone()));
                }
                state.subscribers.push((conn_id, out_tx.clone()));
            }
            Some("pub") => {
                let mut state = topics.entry(topic).or_default();
                state.backlog.push(text.to_owned());
                // A real bridge never delivers a publisher's own frame back to
                // the connection that sent it; without this a client still
                // subscribed to a topic it just published on (the dApp on
                // `handshakeTopic`, waiting for the wallet's response) would
                // receive and reprocess its own request.
                state.subscribers.retain(|(id, s)| {
                    *id == conn_id || s.send(Message::text(text.to_owned())).is_ok()
                });
            }
            _ => {}
        }
    }
}

fn client_meta(name: &str) -> PeerMeta {
    PeerMeta {
        name: name.to_owned(),
        description: String::new(),
        url: "https://example.com".to_owned(),
        icons: vec![],
    }
}

/// Polls `client`'s snapshot key until it differs from `previous`, for a
/// rotation kicked off in a detached background task (the automatic
/// post-handshake exchange) rather than one the caller awaited directly.
async fn wait_for_key_change(client: &Client, previous: &[u8]) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let key = client.snapshot().key;
            if key != previous {
                return key;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("key rotation settles")
}

#[tokio::test]
async fn full_session_lifecycle() {
    let relay = MockRelay::start();
    let dapp_store = Arc::new(InMemorySessionStore::new());

    let dapp = Client::new(ClientOptions {
        bridge: Some(relay.bridge_url()),
        client_meta: client_meta("Test dApp"),
        store: Some(dapp_store.clone()),
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .await
    .expect("dapp constructs");

    let (connect_tx, mut connect_rx) = mpsc::unbounded_channel();
    dapp.on(
        EVENT_CONNECT,
        Arc::new(move |event| {
            let _ = connect_tx.send(event);
        }),
    );
    let (dapp_disconnect_tx, mut dapp_disconnect_rx) = mpsc::unbounded_channel();
    dapp.on(
        EVENT_DISCONNECT,
        Arc::new(move |_| {
            let _ = dapp_disconnect_tx.send(());
        }),
    );

    // Scenario 2: happy-path handshake — createSession publishes
    // wc_sessionRequest to the handshake topic and returns a `wc:` URI.
    let uri = dapp.create_session().await.expect("create_session succeeds");
    assert!(uri.starts_with("wc:"));
    let handshake_key = dapp.snapshot().key;

    let wallet = Client::new(ClientOptions {
        uri: Some(uri),
        client_meta: client_meta("Test Wallet"),
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .await
    .expect("wallet joins via uri");

    let (session_request_tx, mut session_request_rx) = mpsc::unbounded_channel();
    wallet.on(
        EVENT_SESSION_REQUEST,
        Arc::new(move |event| {
            let _ = session_request_tx.send(event);
        }),
    );
    let wallet_for_calls = wallet.clone();
    wallet.on(
        CALL_REQUEST,
        Arc::new(move |event| {
            let id = event["id"].as_u64().expect("call carries an id");
            let _ = wallet_for_calls.respond_call(id, serde_json::json!("0xdeadbeef"));
        }),
    );

    let session_request = tokio::time::timeout(Duration::from_secs(5), session_request_rx.recv())
        .await
        .expect("session request arrives")
        .expect("channel open");
    assert_eq!(session_request["peerId"], dapp.snapshot().client_id.to_string());

    // Scenario 3: approval.
    wallet
        .approve_session(1, vec!["0xabc".to_owned()])
        .await
        .expect("approve_session succeeds");

    let connect_event = tokio::time::timeout(Duration::from_secs(5), connect_rx.recv())
        .await
        .expect("connect event arrives")
        .expect("channel open");
    assert_eq!(connect_event["chain_id"], 1);
    assert_eq!(connect_event["accounts"][0], "0xabc");
    assert!(dapp.snapshot().connected);
    assert!(dapp_store.load().is_some());

    // Calling again while already connected is a precondition violation.
    assert!(matches!(
        wallet.approve_session(1, vec![]).await.unwrap_err(),
        bridge_connector::ConnectorError::PreconditionViolation(_)
    ));

    // Spec §4.7: the dApp auto-initiates a key exchange as soon as the
    // handshake completes. Wait for that rotation to settle before issuing
    // anything else, so it can't interleave with the calls below.
    let key_after_auto_exchange = wait_for_key_change(&dapp, &handshake_key).await;

    // Scenario 4: call round-trip.
    let result = dapp
        .send_transaction(serde_json::json!({"to": "0x1", "value": "0x0"}))
        .await
        .expect("send_transaction resolves");
    assert_eq!(result, serde_json::json!("0xdeadbeef"));

    // Scenario 5: key rotation — a further, explicitly-requested swap still
    // round-trips on top of the automatic one above. `initiate_key_exchange`
    // only returns once the peer's ack completed the local swap, so the new
    // key is already in place.
    dapp.initiate_key_exchange().await.expect("key exchange completes");
    let key_after_swap = dapp.snapshot().key;
    assert_eq!(key_after_swap.len(), 32);
    assert_ne!(key_after_swap, key_after_auto_exchange);

    let result_after_rotation = dapp
        .send_transaction(serde_json::json!({"to": "0x2", "value": "0x0"}))
        .await
        .expect("post-rotation call still resolves");
    assert_eq!(result_after_rotation, serde_json::json!("0xdeadbeef"));

    // Scenario 6: kill.
    dapp.kill_session().await.expect("kill_session succeeds");
    tokio::time::timeout(Duration::from_secs(5), dapp_disconnect_rx.recv())
        .await
        .expect("dapp sees its own disconnect");
    assert!(!dapp.snapshot().connected);
    assert!(dapp_store.load().is_none());
}

#[tokio::test]
async fn update_session_requires_connected_state() {
    let relay = MockRelay::start();
    let dapp = Client::new(ClientOptions {
        bridge: Some(relay.bridge_url()),
        client_meta: client_meta("Test dApp"),
        ..Default::default()
    })
    .await
    .expect("dapp constructs");

    let err = dapp.update_session(Some(1), None).await.unwrap_err();
    assert!(matches!(err, bridge_connector::ConnectorError::PreconditionViolation(_)));
}
