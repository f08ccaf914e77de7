use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use futures::{SinkExt, StreamExt, TryFutureExt};
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
    sync::{mpsc, RwLock},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use warp::ws::{Message, WebSocket};

use crate::envelope::Envelope;

/// Global unique connection id counter.
static NEXT_CONN_ID: AtomicUsize = AtomicUsize::new(1);

/// Envelopes kept per channel for history backfill.
pub const HISTORY_LIMIT: usize = 50;

/// Currently attached subscribers of one channel.
///
/// - Key is the connection id
/// - Value is a sender of `warp::ws::Message` wire frames
pub type Subscribers = Arc<RwLock<HashMap<usize, mpsc::UnboundedSender<Message>>>>;

/// All live channels by name. Weak pointers: a channel stays alive exactly as
/// long as some connection holds it, and a fresh attach after that gets a
/// fresh channel.
pub type ChannelRegistry = Arc<RwLock<HashMap<String, Weak<Channel>>>>;

/// One pub/sub topic: subscriber fan-out, a bounded history ring, and a
/// transcript file written off the hot path.
#[derive(Debug)]
pub struct Channel {
    pub name: String,
    pub subscribers: Subscribers,
    history: RwLock<VecDeque<Envelope>>,
    transcript_tx: mpsc::UnboundedSender<String>,
    cancellation_tx: mpsc::UnboundedSender<()>,
}

impl Channel {
    pub async fn new(name: String, subscribers: Subscribers) -> Channel {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let mut rx = UnboundedReceiverStream::new(rx);
        let (cancellation_tx, mut cancellation_rx) = mpsc::unbounded_channel::<()>();

        // Channel names may contain ':'; keep transcript file names portable.
        let file_name = format!(
            "{}_{}.log",
            name.replace(':', "_"),
            humantime::format_rfc3339(std::time::SystemTime::now())
        );

        // This task owns the transcript file and drains lines through a
        // BufWriter until the channel is dropped.
        tokio::task::spawn(async move {
            let file = match File::create(&file_name).await {
                Ok(file) => file,
                Err(e) => {
                    log::error!("cannot create transcript {}: {}", file_name, e);
                    return;
                }
            };
            let mut log_writer = BufWriter::new(file);
            loop {
                tokio::select! {
                    Some(line) = rx.next() => {
                        if let Err(e) = log_writer.write_all(format!("{}\n", line).as_bytes()).await {
                            log::error!("transcript write failed: {}", e);
                        }
                    },
                    Some(_) = cancellation_rx.recv() => {
                        break;
                    }
                }
            }
            if let Err(e) = log_writer.flush().await {
                log::error!("transcript flush failed: {}", e);
            }
        });

        Channel {
            name,
            subscribers,
            history: RwLock::new(VecDeque::new()),
            transcript_tx: tx,
            cancellation_tx,
        }
    }

    /// Queues one transcript line. Fire and forget.
    pub fn log_message(&self, envelope: &Envelope) {
        let _ = self.transcript_tx.send(format!(
            "{} <{}>: {}",
            envelope.timestamp, envelope.user, envelope.text
        ));
    }

    /// Records the envelope and fans it out to every subscriber except the
    /// publishing connection itself. Suppressing the publisher's echo here is
    /// what lets clients append their own messages optimistically without
    /// ever seeing them twice.
    pub async fn publish_from(&self, conn_id: usize, envelope: &Envelope) {
        self.log_message(envelope);
        {
            let mut history = self.history.write().await;
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(envelope.clone());
        }

        let frame = match serde_json::to_string(envelope) {
            Ok(json) => Message::text(json),
            Err(e) => {
                log::error!("cannot encode envelope: {}", e);
                return;
            }
        };
        for (&id, tx) in self.subscribers.read().await.iter() {
            if id != conn_id {
                if let Err(_disconnected) = tx.send(frame.clone()) {
                    // Subscriber is gone; its disconnect handling runs in
                    // its own task, nothing more to do here.
                }
            }
        }
    }

    /// Snapshot of retained history, oldest first.
    pub async fn recent(&self) -> Vec<Envelope> {
        self.history.read().await.iter().cloned().collect()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let _ = self.cancellation_tx.send(());
        log::info!("channel destroyed: {}", self.name);
    }
}

/// Looks up a live channel by name, creating it on first attach. Entries for
/// fully detached channels are reaped lazily on the way in.
pub async fn get_channel(channel_name: &str, channels: ChannelRegistry) -> Arc<Channel> {
    // One write guard across reap, lookup and insert: two first attaches to
    // the same name must land on the same channel object, never on two that
    // partition the room.
    let mut registry = channels.write().await;
    registry.retain(|_, channel_ptr| channel_ptr.strong_count() > 0);

    if let Some(channel) = registry.get(channel_name).and_then(Weak::upgrade) {
        log::debug!("channel reused: {}", channel_name);
        return channel;
    }

    let channel = Arc::new(Channel::new(channel_name.to_owned(), Subscribers::default()).await);
    registry.insert(channel_name.to_owned(), Arc::downgrade(&channel));
    log::info!("channel created: {}", channel_name);
    channel
}

/// Drives one attached websocket: history backfill first, then live frames,
/// until the peer hangs up.
pub async fn subscriber_connected(ws: WebSocket, channel: Arc<Channel>, client_id: String) {
    let my_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);

    log::info!("{} attached to {} (conn {})", client_id, channel.name, my_id);

    let (mut sub_ws_tx, mut sub_ws_rx) = ws.split();

    // Unbounded channel handles buffering and flushing of frames to the
    // websocket.
    let (tx, rx) = mpsc::unbounded_channel();
    let mut rx = UnboundedReceiverStream::new(rx);

    tokio::task::spawn(async move {
        while let Some(frame) = rx.next().await {
            sub_ws_tx
                .send(frame)
                .unwrap_or_else(|e| {
                    log::warn!("websocket send error: {}", e);
                })
                .await;
        }
    });

    // Register for live delivery before snapshotting history. A publish
    // writes history before it fans out, so once we are registered every
    // envelope reaches us live or lands in the snapshot; one racing the
    // window can do both, and receivers dedupe by envelope key. Registering
    // after the snapshot would instead let that publish slip through both.
    channel.subscribers.write().await.insert(my_id, tx.clone());
    for envelope in channel.recent().await {
        if let Ok(json) = serde_json::to_string(&envelope) {
            let _ = tx.send(Message::text(json));
        }
    }
    drop(tx);

    // Frames published by this connection, in the order the single read
    // loop sees them (per-publisher FIFO).
    while let Some(result) = sub_ws_rx.next().await {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("websocket error (conn {}): {}", my_id, e);
                break;
            }
        };
        subscriber_frame(my_id, frame, &channel).await;
    }

    // The read stream ended, so the peer detached.
    subscriber_disconnected(my_id, &channel).await;
}

async fn subscriber_frame(my_id: usize, frame: Message, channel: &Arc<Channel>) {
    // Skip any non-text frames (pings, binary, close).
    let frame = if let Ok(s) = frame.to_str() {
        s
    } else {
        return;
    };

    let envelope: Envelope = match serde_json::from_str(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::debug!("dropping malformed frame (conn {}): {}", my_id, e);
            return;
        }
    };
    if !envelope.is_valid() {
        log::debug!("dropping invalid envelope (conn {})", my_id);
        return;
    }

    channel.publish_from(my_id, &envelope).await;
}

async fn subscriber_disconnected(my_id: usize, channel: &Arc<Channel>) {
    log::info!("connection {} left {}", my_id, channel.name);
    channel.subscribers.write().await.remove(&my_id);
}
