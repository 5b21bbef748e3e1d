//! Relay transport (spec §4.3).
//!
//! A full-duplex connection to an untrusted relay ("bridge"). Frames
//! submitted before the socket is open are buffered and replayed, in
//! submission order, immediately after the `clientId` subscription is sent.
//! Inbound frames whose topic isn't in the active set are dropped silently;
//! malformed frames are fatal to the receive path, matching the "no
//! reconnect, single-shot socket" contract.

use {
    crate::domain::Topic,
    futures_util::{SinkExt, StreamExt},
    serde::{Deserialize, Serialize},
    std::{
        collections::{HashSet, VecDeque},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    },
    tokio::sync::{mpsc, oneshot, Mutex},
    tokio_tungstenite::tungstenite::Message as WsMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to the relay: {0}")]
    Connect(String),
    #[error("malformed relay frame: {0}")]
    MalformedFrame(String),
    #[error("the pre-connect send queue is full")]
    QueueFull,
    #[error("the relay connection is closed")]
    Closed,
}

/// Frame type discriminant: `"pub"` to publish, `"sub"` to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Pub,
    Sub,
}

/// A single relay wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: Topic,
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub payload: String,
}

impl Frame {
    pub fn publish(topic: Topic, payload: String) -> Self {
        Self {
            topic,
            frame_type: FrameType::Pub,
            payload,
        }
    }

    pub fn subscribe(topic: Topic) -> Self {
        Self {
            topic,
            frame_type: FrameType::Sub,
            payload: String::new(),
        }
    }
}

/// Rewrites `http(s)` bridge URLs to `ws(s)`; other schemes pass through.
pub fn bridge_to_ws_url(bridge: &str) -> String {
    if let Some(rest) = bridge.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = bridge.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        bridge.to_owned()
    }
}

enum Cmd {
    Send(Frame),
    Connect(String, oneshot::Sender<Result<(), TransportError>>),
    Close,
}

/// Handle to a relay connection. Cloning shares the same underlying actor,
/// queue and inbound stream.
#[derive(Clone)]
pub struct Transport {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<Result<Frame, TransportError>>>>,
    active_topics: Arc<Mutex<HashSet<Topic>>>,
    max_queue_len: Option<usize>,
    queued: Arc<AtomicUsize>,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

impl Transport {
    /// Creates a transport bound to `client_id`'s topic. The socket isn't
    /// opened yet; [`send`](Self::send) may be called immediately and
    /// frames are buffered until [`connect`](Self::connect) succeeds.
    pub fn new(client_id: Topic, max_queue_len: Option<usize>) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Cmd>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Frame, TransportError>>();
        let active_topics = Arc::new(Mutex::new(HashSet::from([client_id.clone()])));
        let reader_topics = active_topics.clone();

        tokio::spawn(async move {
            let mut queue: VecDeque<Frame> = VecDeque::new();
            let mut write = None;

            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    Cmd::Send(frame) => match &mut write {
                        Some(sink) => {
                            if send_frame(sink, &frame).await.is_err() {
                                let _ = inbound_tx.send(Err(TransportError::Closed));
                                break;
                            }
                        }
                        None => queue.push_back(frame),
                    },
                    Cmd::Connect(bridge, respond) => {
                        let ws_url = bridge_to_ws_url(&bridge);
                        match tokio_tungstenite::connect_async(&ws_url).await {
                            Ok((ws_stream, _)) => {
                                let (mut w, read) = ws_stream.split();

                                let sub_ok = send_frame(&mut w, &Frame::subscribe(client_id.clone()))
                                    .await
                                    .is_ok();

                                if !sub_ok {
                                    let _ = respond.send(Err(TransportError::Connect(
                                        "failed to send subscribe frame".into(),
                                    )));
                                    continue;
                                }

                                let mut drain_ok = true;
                                for frame in queue.drain(..) {
                                    if send_frame(&mut w, &frame).await.is_err() {
                                        drain_ok = false;
                                        break;
                                    }
                                }

                                write = Some(w);
                                let _ = respond.send(if drain_ok {
                                    Ok(())
                                } else {
                                    Err(TransportError::Closed)
                                });

                                let inbound_tx = inbound_tx.clone();
                                let reader_topics = reader_topics.clone();
                                tokio::spawn(read_loop(read, inbound_tx, reader_topics));
                            }
                            Err(e) => {
                                let _ = respond.send(Err(TransportError::Connect(e.to_string())));
                            }
                        }
                    }
                    Cmd::Close => {
                        if let Some(w) = &mut write {
                            let _ = w.close().await;
                        }
                        break;
                    }
                }
            }
        });

        Self {
            cmd_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            active_topics,
            max_queue_len,
            queued: Arc::new(AtomicUsize::new(0)),
            connected: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Opens the relay connection: connects the socket, sends the `sub`
    /// frame for `client_id`, then drains whatever was queued via `send`.
    pub async fn connect(&self, bridge: &str) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Cmd::Connect(bridge.to_owned(), tx))
            .map_err(|_| TransportError::Closed)?;
        let result = rx.await.map_err(|_| TransportError::Closed)?;
        if result.is_ok() {
            self.connected.store(true, Ordering::SeqCst);
        }
        result
    }

    /// Submits a frame for sending, queueing it if the socket isn't open
    /// yet. Frames are sent in submission order; the transport never
    /// reorders them. The queue cap only applies before the socket opens —
    /// once connected, frames are handed straight to the socket.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            if let Some(max) = self.max_queue_len {
                if self.queued.fetch_add(1, Ordering::SeqCst) >= max {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    return Err(TransportError::QueueFull);
                }
            }
        }
        self.cmd_tx
            .send(Cmd::Send(frame))
            .map_err(|_| TransportError::Closed)
    }

    /// Receives the next inbound frame whose topic is in the active set,
    /// silently dropping any others. Returns `None` once the socket closes,
    /// `Some(Err(_))` on a malformed frame or terminal transport error.
    pub async fn recv(&self) -> Option<Result<Frame, TransportError>> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }

    /// Adds `topic` to the set of topics this transport accepts inbound
    /// frames for, and tells the relay to actually forward them here by
    /// queuing a `sub` frame for it (the initial `sub` the relay receives on
    /// connect only covers `client_id` — every other topic this side needs
    /// to listen on, namely the handshake topic, must be subscribed to
    /// explicitly the same way any other frame is sent).
    pub async fn allow_topic(&self, topic: Topic) {
        self.active_topics.lock().await.insert(topic.clone());
        if let Err(e) = self.send(Frame::subscribe(topic.clone())) {
            tracing::warn!(%topic, error = %e, "failed to queue relay subscription");
        }
    }

    /// Removes `topic` from the active set (e.g. the handshake topic once
    /// `peerId` is known and the session is approved).
    pub async fn revoke_topic(&self, topic: &Topic) {
        self.active_topics.lock().await.remove(topic);
    }

    pub fn close(&self) {
        let _ = self.cmd_tx.send(Cmd::Close);
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), ()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let json = serde_json::to_string(frame).expect("frame always serializes");
    sink.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}

async fn read_loop<R>(
    mut read: R,
    inbound_tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    active_topics: Arc<Mutex<HashSet<Topic>>>,
) where
    R: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(incoming) = read.next().await {
        match incoming {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                Ok(frame) => {
                    let allowed = active_topics.lock().await.contains(&frame.topic);
                    if allowed {
                        if inbound_tx.send(Ok(frame)).is_err() {
                            break;
                        }
                    } else {
                        tracing::debug!(topic = %frame.topic, "dropping frame for inactive topic");
                    }
                }
                Err(e) => {
                    if inbound_tx
                        .send(Err(TransportError::MalformedFrame(e.to_string())))
                        .is_err()
                    {
                        break;
                    }
                }
            },
            Ok(WsMessage::Close(_)) => {
                let _ = inbound_tx.send(Err(TransportError::Closed));
                break;
            }
            Ok(_) => {
                // Non-text frames carry no protocol meaning here.
            }
            Err(e) => {
                let _ = inbound_tx.send(Err(TransportError::Connect(e.to_string())));
                break;
            }
        }
    }
}
