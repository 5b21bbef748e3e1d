//! The connector's public entry point (spec §4.6, §4.8).
//!
//! Wires the [`Transport`], the injected [`CryptoProvider`], the
//! [`KeyManager`], the [`Dispatcher`] and a [`SessionStore`] together behind
//! a single cloneable handle. All state lives behind the handle's `Inner`;
//! callers never see the background receive task.

use {
    crate::{
        crypto::{payload::SymKey, wrap, AeadCryptoProvider, CryptoProvider, Envelope},
        dispatcher::{Callback, Dispatcher},
        domain::Topic,
        error::{ConnectorError, Result},
        key_manager::KeyManager,
        pairing_uri::HandshakeUri,
        rpc::{
            self, ExchangeKeyParams, PeerMeta, Request, Response, ResponseOutcome,
            SessionApprovalResult, SessionRequestParams, SessionUpdateParams,
            METHOD_EXCHANGE_KEY, METHOD_SESSION_REQUEST, METHOD_SESSION_UPDATE,
        },
        session::SessionSnapshot,
        store::{InMemorySessionStore, SessionStore},
        transport::{Frame, Transport},
    },
    rand::Rng,
    serde_json::Value,
    std::{
        collections::HashMap,
        str::FromStr,
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::sync::oneshot,
};

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_SESSION_REQUEST: &str = "session_request";
pub const EVENT_SESSION_UPDATE: &str = "session_update";
pub const EVENT_PEER_META_UPDATE: &str = "peer_meta_update";

/// Constructor options. Exactly one of `bridge`, `uri` or `session` must be
/// set (spec §4.6): `bridge` starts a fresh session as the initiating side,
/// `uri` joins an existing handshake as the responding side, `session`
/// restores a previously persisted, already-connected session.
pub struct ClientOptions {
    pub bridge: Option<String>,
    pub uri: Option<String>,
    pub session: Option<SessionSnapshot>,
    pub client_meta: PeerMeta,
    pub store: Option<Arc<dyn SessionStore>>,
    pub crypto: Option<Arc<dyn CryptoProvider>>,
    /// How long a call waits for a peer response before failing with
    /// [`ConnectorError::Timeout`]. Defaults to 300 seconds.
    pub call_timeout: Duration,
    /// Caps the pre-connect transport send queue; `None` is unbounded.
    pub max_queue_len: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            bridge: None,
            uri: None,
            session: None,
            client_meta: PeerMeta::default(),
            store: None,
            crypto: None,
            call_timeout: Duration::from_millis(300_000),
            max_queue_len: None,
        }
    }
}

struct Inner {
    dispatcher: Dispatcher,
    transport: Transport,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn SessionStore>,
    key_manager: Mutex<KeyManager>,
    snapshot: Mutex<SessionSnapshot>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    call_timeout: Duration,
}

/// A cloneable handle to a connector session. Every clone shares the same
/// underlying state and background receive task.
#[derive(Clone)]
pub struct Client(Arc<Inner>);

fn random_topic() -> Topic {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    Topic::new(hex::encode(bytes))
}

fn key_from_bytes(bytes: &[u8]) -> Option<SymKey> {
    let mut key = [0u8; 32];
    if bytes.len() != key.len() {
        return None;
    }
    key.copy_from_slice(bytes);
    Some(key)
}

/// `wc_sessionRequest`/`wc_sessionUpdate`/`wc_exchangeKey` all carry their
/// params as a singleton array on the wire (spec §6); this pulls the one
/// element back out, or `Value::Null` if the peer sent something else.
fn singleton_param(params: &Value) -> Value {
    params.get(0).cloned().unwrap_or(Value::Null)
}

impl Client {
    /// Establishes a connector session per `options` (spec §4.6 invariant:
    /// exactly one of `bridge`/`uri`/`session` supplied; a `session` may
    /// also be implicitly picked up from `options.store`, per spec §6).
    pub async fn new(options: ClientOptions) -> Result<Self> {
        let supplied = [
            options.bridge.is_some(),
            options.uri.is_some(),
            options.session.is_some(),
        ]
        .into_iter()
        .filter(|b| *b)
        .count();

        let store = options.store.unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let session = options.session.or_else(|| {
            if supplied == 0 {
                store.load()
            } else {
                None
            }
        });
        if supplied != 1 && session.is_none() {
            return Err(ConnectorError::MissingInitialization);
        }

        let snapshot = if let Some(session) = session {
            session
        } else if let Some(uri) = options.uri {
            let parsed = HandshakeUri::from_str(&uri)?;
            SessionSnapshot {
                connected: false,
                bridge: parsed.bridge,
                key: parsed.key,
                client_id: random_topic(),
                peer_id: None,
                client_meta: options.client_meta,
                peer_meta: None,
                handshake_id: None,
                handshake_topic: Topic::new(parsed.handshake_topic),
                chain_id: None,
                accounts: vec![],
                terminated: false,
            }
        } else {
            let bridge = options.bridge.expect("exactly one initializer supplied");
            SessionSnapshot {
                connected: false,
                bridge,
                key: vec![],
                client_id: random_topic(),
                peer_id: None,
                client_meta: options.client_meta,
                peer_meta: None,
                handshake_id: None,
                handshake_topic: Topic::new(""),
                chain_id: None,
                accounts: vec![],
                terminated: false,
            }
        };

        let transport = Transport::new(snapshot.client_id.clone(), options.max_queue_len);
        if !snapshot.handshake_topic.is_empty() {
            transport.allow_topic(snapshot.handshake_topic.clone()).await;
        }
        if let Some(peer_id) = &snapshot.peer_id {
            transport.allow_topic(peer_id.clone()).await;
        }
        transport.connect(&snapshot.bridge).await?;

        let key_manager = KeyManager::new(key_from_bytes(&snapshot.key));

        let inner = Arc::new(Inner {
            dispatcher: Dispatcher::new(),
            transport,
            crypto: options.crypto.unwrap_or_else(|| Arc::new(AeadCryptoProvider)),
            store,
            key_manager: Mutex::new(key_manager),
            snapshot: Mutex::new(snapshot),
            pending: Mutex::new(HashMap::new()),
            call_timeout: options.call_timeout,
        });

        tokio::spawn(receive_loop(inner.clone()));

        Ok(Self(inner))
    }

    /// Registers `callback` for `event` (spec §4.5). See [`EVENT_CONNECT`]
    /// and siblings for the events this module emits itself.
    pub fn on(&self, event: impl Into<String>, callback: Callback) {
        self.0.dispatcher.on(event, callback);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.0.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }

    /// Generates a fresh handshake topic and key, publishes `wc_sessionRequest`
    /// to it, and returns the `wc:` URI to hand to the peer. Valid only from
    /// the Fresh state (spec §4.6).
    pub async fn create_session(&self) -> Result<String> {
        let key = self.0.crypto.generate_key();
        let handshake_topic = random_topic();
        let client_id;
        let client_meta;
        let bridge;
        let request_id;

        {
            let mut snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            if !snapshot.handshake_topic.is_empty() {
                return Err(ConnectorError::PreconditionViolation(
                    "create_session requires a fresh, unstarted session",
                ));
            }
            snapshot.key = key.to_vec();
            snapshot.handshake_topic = handshake_topic.clone();
            client_id = snapshot.client_id.clone();
            client_meta = snapshot.client_meta.clone();
            bridge = snapshot.bridge.clone();
        }
        self.0.key_manager.lock().expect("key manager mutex poisoned").set_key(key);
        self.0.transport.allow_topic(handshake_topic.clone()).await;

        let request = Request::new(
            METHOD_SESSION_REQUEST,
            serde_json::to_value([SessionRequestParams {
                peer_id: client_id.to_string(),
                peer_meta: client_meta,
            }])
            .expect("params always serialize"),
        );
        request_id = request.id;

        self.publish_envelope(handshake_topic.clone(), &request, &key)?;

        {
            let mut snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            snapshot.handshake_id = Some(request_id);
        }
        self.persist();

        Ok(HandshakeUri::new(handshake_topic.to_string(), bridge, key.to_vec()).to_string())
    }

    /// Approves an inbound handshake request (spec §4.6). Valid only once a
    /// `session_request` event has been observed and the session isn't
    /// already connected.
    pub async fn approve_session(&self, chain_id: i64, accounts: Vec<String>) -> Result<()> {
        let (handshake_topic, handshake_id, client_id, client_meta, key) = {
            let snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            if snapshot.connected {
                return Err(ConnectorError::PreconditionViolation(
                    "approve_session requires a pending, unconnected session",
                ));
            }
            let handshake_id = snapshot
                .handshake_id
                .ok_or(ConnectorError::PreconditionViolation("no pending handshake to approve"))?;
            let key = key_from_bytes(&snapshot.key).ok_or(ConnectorError::CryptoUnavailable)?;
            (
                snapshot.handshake_topic.clone(),
                handshake_id,
                snapshot.client_id.clone(),
                snapshot.client_meta.clone(),
                key,
            )
        };

        let result = SessionApprovalResult {
            approved: true,
            chain_id: Some(chain_id),
            accounts: Some(accounts.clone()),
            peer_id: Some(client_id.to_string()),
            peer_meta: Some(client_meta),
            message: None,
        };
        let response = Response::success(
            handshake_id,
            serde_json::to_value(result).expect("result always serializes"),
        );
        self.publish_envelope(handshake_topic.clone(), &response, &key)?;

        let peer_id = {
            let mut snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            snapshot.connected = true;
            snapshot.chain_id = Some(chain_id);
            snapshot.accounts = accounts;
            snapshot.peer_id.clone()
        };
        if let Some(peer_id) = peer_id {
            self.0.transport.allow_topic(peer_id).await;
        }
        self.0.transport.revoke_topic(&handshake_topic).await;
        self.persist();
        self.0.dispatcher.emit(EVENT_CONNECT, serde_json::to_value(self.snapshot()).unwrap_or(Value::Null));
        Ok(())
    }

    /// Rejects an inbound handshake request and terminates the session.
    pub async fn reject_session(&self, message: Option<String>) -> Result<()> {
        let (handshake_topic, handshake_id, key) = {
            let snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            let handshake_id = snapshot
                .handshake_id
                .ok_or(ConnectorError::PreconditionViolation("no pending handshake to reject"))?;
            let key = key_from_bytes(&snapshot.key).ok_or(ConnectorError::CryptoUnavailable)?;
            (snapshot.handshake_topic.clone(), handshake_id, key)
        };

        let result = SessionApprovalResult {
            approved: false,
            chain_id: None,
            accounts: None,
            peer_id: None,
            peer_meta: None,
            message,
        };
        let response = Response::success(
            handshake_id,
            serde_json::to_value(result).expect("result always serializes"),
        );
        self.publish_envelope(handshake_topic.clone(), &response, &key)?;
        self.terminate(&handshake_topic).await;
        Ok(())
    }

    /// Publishes `wc_sessionUpdate` to the peer and locally records whatever
    /// of `chain_id`/`accounts` was actually supplied (spec §4.6).
    pub async fn update_session(&self, chain_id: Option<i64>, accounts: Option<Vec<String>>) -> Result<()> {
        let (peer_id, key) = self.connected_peer_and_key()?;

        let params = SessionUpdateParams {
            approved: true,
            chain_id,
            accounts: accounts.clone(),
            message: None,
        };
        let request = Request::new(METHOD_SESSION_UPDATE, serde_json::to_value([params]).expect("params always serialize"));
        self.publish_envelope(peer_id, &request, &key)?;

        {
            let mut snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            if let Some(chain_id) = chain_id {
                snapshot.chain_id = Some(chain_id);
            }
            if let Some(accounts) = accounts {
                snapshot.accounts = accounts;
            }
        }
        self.persist();
        Ok(())
    }

    /// Terminates the session, notifies the peer, and erases the persisted
    /// snapshot (spec §4.6).
    pub async fn kill_session(&self) -> Result<()> {
        let (topic, key) = {
            let snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            let topic = snapshot
                .peer_id
                .clone()
                .filter(|_| snapshot.connected)
                .unwrap_or_else(|| snapshot.handshake_topic.clone());
            let key = key_from_bytes(&snapshot.key);
            (topic, key)
        };

        if let Some(key) = key {
            let params = SessionUpdateParams {
                approved: false,
                chain_id: None,
                accounts: None,
                message: None,
            };
            let request =
                Request::new(METHOD_SESSION_UPDATE, serde_json::to_value([params]).expect("params always serialize"));
            let _ = self.publish_envelope(topic.clone(), &request, &key);
        }

        self.terminate(&topic).await;
        self.0.transport.close();
        Ok(())
    }

    /// Requests the peer sign and broadcast a transaction. `params` is
    /// carried opaquely (spec §6: the connector doesn't validate RPC method
    /// semantics).
    pub async fn send_transaction(&self, params: Value) -> Result<Value> {
        self.call("eth_sendTransaction", params).await
    }

    pub async fn sign_message(&self, params: Value) -> Result<Value> {
        self.call("eth_sign", params).await
    }

    pub async fn sign_typed_data(&self, params: Value) -> Result<Value> {
        self.call("eth_signTypedData", params).await
    }

    /// Stages a new symmetric key and requests the peer adopt it (spec
    /// §4.7). Fails with [`ConnectorError::PreconditionViolation`] if a swap
    /// is already in flight.
    pub async fn initiate_key_exchange(&self) -> Result<()> {
        let next_key = self.0.crypto.generate_key();
        self.0
            .key_manager
            .lock()
            .expect("key manager mutex poisoned")
            .stage_next_key(next_key)
            .map_err(|_| ConnectorError::PreconditionViolation("a key exchange is already in flight"))?;

        let (client_id, client_meta) = {
            let snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            (snapshot.client_id.clone(), snapshot.client_meta.clone())
        };
        let params = ExchangeKeyParams {
            peer_id: client_id.to_string(),
            peer_meta: client_meta,
            next_key: hex::encode(next_key),
        };

        self.call(METHOD_EXCHANGE_KEY, serde_json::to_value([params]).expect("params always serialize"))
            .await?;

        let swapped = self.0.key_manager.lock().expect("key manager mutex poisoned").complete_swap();
        if swapped {
            let mut snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            snapshot.key = next_key.to_vec();
        }
        self.persist();
        Ok(())
    }

    /// Answers an inbound generic call request with a success result.
    pub fn respond_call(&self, id: u64, result: Value) -> Result<()> {
        let (peer_id, key) = self.connected_peer_and_key()?;
        self.publish_envelope(peer_id, &Response::success(id, result), &key)
    }

    /// Answers an inbound generic call request with an error.
    pub fn reject_call(&self, id: u64, message: impl Into<String>) -> Result<()> {
        let (peer_id, key) = self.connected_peer_and_key()?;
        self.publish_envelope(peer_id, &Response::error(id, message), &key)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let (peer_id, key) = self.connected_peer_and_key()?;
        let request = Request::new(method, params);
        let id = request.id;

        let (tx, rx) = oneshot::channel();
        self.0.pending.lock().expect("pending mutex poisoned").insert(id, tx);

        if let Err(e) = self.publish_envelope(peer_id, &request, &key) {
            self.0.pending.lock().expect("pending mutex poisoned").remove(&id);
            return Err(e);
        }

        let response = tokio::time::timeout(self.0.call_timeout, rx)
            .await
            .map_err(|_| {
                self.0.pending.lock().expect("pending mutex poisoned").remove(&id);
                ConnectorError::Timeout
            })?
            .map_err(|_| ConnectorError::TransportClosed)?;

        match response.outcome {
            ResponseOutcome::Success { result } => Ok(result),
            ResponseOutcome::Error { error } => Err(ConnectorError::RpcError(error.message)),
        }
    }

    fn connected_peer_and_key(&self) -> Result<(Topic, SymKey)> {
        let snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
        if !snapshot.connected {
            return Err(ConnectorError::PreconditionViolation("session is not connected"));
        }
        let peer_id = snapshot
            .peer_id
            .clone()
            .ok_or(ConnectorError::PreconditionViolation("no peer id on a connected session"))?;
        let key = key_from_bytes(&snapshot.key).ok_or(ConnectorError::CryptoUnavailable)?;
        Ok((peer_id, key))
    }

    fn publish_envelope(&self, topic: Topic, value: &impl serde::Serialize, key: &SymKey) -> Result<()> {
        let plaintext = serde_json::to_string(value).expect("rpc payloads always serialize");
        let envelope =
            wrap(self.0.crypto.as_ref(), &plaintext, Some(key)).ok_or(ConnectorError::CryptoUnavailable)?;
        let payload = serde_json::to_string(&envelope).expect("envelope always serializes");
        self.0
            .transport
            .send(Frame::publish(topic, payload))
            .map_err(ConnectorError::from)
    }

    async fn terminate(&self, topic: &Topic) {
        {
            let mut snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned");
            snapshot.terminated = true;
            snapshot.connected = false;
        }
        self.0.store.erase();
        self.0.transport.revoke_topic(topic).await;
        self.0.dispatcher.emit(EVENT_DISCONNECT, Value::Null);
    }

    fn persist(&self) {
        let snapshot = self.0.snapshot.lock().expect("snapshot mutex poisoned").clone();
        if snapshot.terminated {
            self.0.store.erase();
        } else {
            self.0.store.save(&snapshot);
        }
    }
}

/// Background task: decrypts and classifies every inbound frame, routes
/// responses to their waiting caller, and dispatches requests to
/// registered listeners or the connector's own handshake/update handling.
async fn receive_loop(inner: Arc<Inner>) {
    let client = Client(inner.clone());

    loop {
        let frame = match inner.transport.recv().await {
            Some(Ok(frame)) => frame,
            Some(Err(_)) => {
                inner.dispatcher.emit(EVENT_DISCONNECT, Value::Null);
                break;
            }
            None => break,
        };

        let envelope: Envelope = match serde_json::from_str(&frame.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "dropping frame with malformed envelope");
                continue;
            }
        };

        let key = key_from_bytes(&client.snapshot().key);
        let plaintext = match key.and_then(|key| crate::crypto::unwrap(inner.crypto.as_ref(), &envelope, Some(&key)))
        {
            Some(plaintext) => plaintext,
            None => {
                tracing::debug!(topic = %frame.topic, "dropping frame that failed to decrypt");
                continue;
            }
        };

        match rpc::classify(&plaintext) {
            Ok(rpc::Payload::Response(response)) => handle_inbound_response(&client, &inner, response),
            Ok(rpc::Payload::Request(request)) => handle_inbound_request(&client, &inner, request).await,
            Err(e) => tracing::warn!(error = %e, "dropping unrecognized payload"),
        }
    }
}

fn handle_inbound_response(client: &Client, inner: &Arc<Inner>, response: Response) {
    let waiter = inner.pending.lock().expect("pending mutex poisoned").remove(&response.id);
    if let Some(waiter) = waiter {
        let _ = waiter.send(response);
        return;
    }

    let is_handshake_response = client.snapshot().handshake_id == Some(response.id);
    if is_handshake_response {
        handle_handshake_response(client, inner, response);
    }
}

fn handle_handshake_response(client: &Client, inner: &Arc<Inner>, response: Response) {
    let result = match response.result() {
        Some(result) => result.clone(),
        None => return,
    };
    let approval: SessionApprovalResult = match serde_json::from_value(result) {
        Ok(approval) => approval,
        Err(e) => {
            tracing::warn!(error = %e, "malformed session approval result");
            return;
        }
    };
    if !approval.approved {
        let handshake_topic = client.snapshot().handshake_topic;
        let inner = inner.clone();
        let topic = handshake_topic;
        tokio::spawn(async move { Client(inner).terminate(&topic).await });
        return;
    }

    let peer_id = approval.peer_id.clone().map(Topic::new);
    let handshake_topic = {
        let mut snapshot = inner.snapshot.lock().expect("snapshot mutex poisoned");
        snapshot.connected = true;
        snapshot.peer_id = peer_id.clone();
        snapshot.peer_meta = approval.peer_meta.clone();
        snapshot.chain_id = approval.chain_id;
        snapshot.accounts = approval.accounts.unwrap_or_default();
        snapshot.handshake_topic.clone()
    };
    client.persist();

    let bg_client = client.clone();
    let bg_inner = inner.clone();
    tokio::spawn(async move {
        if let Some(peer_id) = peer_id {
            bg_inner.transport.allow_topic(peer_id).await;
        }
        bg_inner.transport.revoke_topic(&handshake_topic).await;

        // Spec §4.7: the initiator (the dApp — this handler only ever runs
        // for its own outstanding `wc_sessionRequest`) kicks off the first
        // key rotation as soon as the peer channel is live.
        if let Err(e) = bg_client.initiate_key_exchange().await {
            tracing::warn!(error = %e, "automatic post-handshake key exchange failed");
        }
    });
    inner
        .dispatcher
        .emit(EVENT_CONNECT, serde_json::to_value(client.snapshot()).unwrap_or(Value::Null));
}

async fn handle_inbound_request(client: &Client, inner: &Arc<Inner>, request: Request) {
    match request.method.as_str() {
        METHOD_SESSION_REQUEST => handle_session_request(inner, request).await,
        METHOD_SESSION_UPDATE => handle_session_update(client, inner, request),
        METHOD_EXCHANGE_KEY => handle_exchange_key(client, inner, request),
        _ => {
            let payload = serde_json::json!({ "id": request.id, "method": request.method, "params": request.params });
            inner.dispatcher.emit(&request.method, payload);
        }
    }
}

async fn handle_session_request(inner: &Arc<Inner>, request: Request) {
    let params: SessionRequestParams = match serde_json::from_value(singleton_param(&request.params)) {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "malformed session request params");
            return;
        }
    };

    {
        let mut snapshot = inner.snapshot.lock().expect("snapshot mutex poisoned");
        snapshot.handshake_id = Some(request.id);
        snapshot.peer_id = Some(Topic::new(params.peer_id.clone()));
        snapshot.peer_meta = Some(params.peer_meta.clone());
    }
    let peer_id = Topic::new(params.peer_id.clone());
    inner.transport.allow_topic(peer_id).await;

    inner
        .dispatcher
        .emit(EVENT_SESSION_REQUEST, serde_json::to_value(params).unwrap_or(Value::Null));
}

fn handle_session_update(client: &Client, inner: &Arc<Inner>, request: Request) {
    let params: SessionUpdateParams = match serde_json::from_value(singleton_param(&request.params)) {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "malformed session update params");
            return;
        }
    };

    if !params.approved {
        let topic = client.snapshot().peer_id.unwrap_or_else(|| client.snapshot().handshake_topic);
        let inner = inner.clone();
        tokio::spawn(async move { Client(inner).terminate(&topic).await });
        return;
    }

    {
        let mut snapshot = inner.snapshot.lock().expect("snapshot mutex poisoned");
        if let Some(chain_id) = params.chain_id {
            snapshot.chain_id = Some(chain_id);
        }
        if let Some(accounts) = params.accounts.clone() {
            snapshot.accounts = accounts;
        }
    }
    client.persist();
    inner
        .dispatcher
        .emit(EVENT_SESSION_UPDATE, serde_json::to_value(params).unwrap_or(Value::Null));
}

fn handle_exchange_key(client: &Client, inner: &Arc<Inner>, request: Request) {
    let params: ExchangeKeyParams = match serde_json::from_value(singleton_param(&request.params)) {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "malformed exchange key params");
            return;
        }
    };
    let next_key = match hex::decode(&params.next_key).ok().and_then(|bytes| key_from_bytes(&bytes)) {
        Some(key) => key,
        None => {
            tracing::warn!("malformed next_key in wc_exchangeKey request");
            return;
        }
    };

    let staged = inner.key_manager.lock().expect("key manager mutex poisoned").stage_next_key(next_key);
    let (peer_id, current_key) = match client.connected_peer_and_key() {
        Ok(pair) => pair,
        Err(_) => return,
    };

    if staged.is_err() {
        let _ = client.publish_envelope(
            peer_id,
            &Response::error(request.id, "a key exchange is already in flight"),
            &current_key,
        );
        return;
    }

    let swapped = inner.key_manager.lock().expect("key manager mutex poisoned").complete_swap();
    if swapped {
        let mut snapshot = inner.snapshot.lock().expect("snapshot mutex poisoned");
        snapshot.key = next_key.to_vec();
    }

    let previous_peer_meta = client.snapshot().peer_meta;
    {
        let mut snapshot = inner.snapshot.lock().expect("snapshot mutex poisoned");
        snapshot.peer_meta = Some(params.peer_meta.clone());
    }
    client.persist();

    if previous_peer_meta.as_ref().is_some_and(|prev| prev != &params.peer_meta) {
        inner
            .dispatcher
            .emit(EVENT_PEER_META_UPDATE, serde_json::to_value(&params.peer_meta).unwrap_or(Value::Null));
    }

    let _ = client.publish_envelope(peer_id, &Response::success(request.id, Value::Bool(true)), &current_key);
}
