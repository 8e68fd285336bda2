//! Core messenger implementation: one stream, two loops, a handshake.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::MessengerConfig;
use super::error::{MessengerError, MessengerResult};
use crate::message::{MessageRegistry, WireMessage};
use crate::provider::{Providers, TaskProvider, TimeProvider};
use crate::stream::Fanout;
use crate::wire::{
    self, DisconnectReason, FRAME_KIND_DISCONNECT, FRAME_KIND_MESSAGE, MessageHeader, WireError,
};

/// One queued outbound frame, already encoded to wire bytes.
struct OutboundItem {
    bytes: Vec<u8>,
    /// Present on disconnect requests; signalled after the frame is flushed.
    flushed: Option<oneshot::Sender<()>>,
    /// Whether the send loop ends once this frame is flushed.
    ends_run: bool,
}

/// State shared between the messenger handle and its background loops.
struct MessengerShared<M> {
    /// FIFO outbound queue. Survives run restarts: items queued while
    /// stopped are drained by the next run.
    outbound: VecDeque<OutboundItem>,

    /// Fan-out of decoded inbound payloads. Closed on stop; replaced with a
    /// fresh one by the next `start_executing`.
    messages: Rc<Fanout<M>>,

    /// Fan-out of disconnect notifications. Never closed; exactly one item
    /// is published per executing lifetime.
    disconnects: Rc<Fanout<DisconnectReason>>,

    /// Whether the current run has already published its disconnect
    /// notification.
    disconnect_published: bool,
}

/// Handles for one executing run of the two loops.
struct Run {
    send_shutdown: mpsc::UnboundedSender<()>,
    receive_shutdown: mpsc::UnboundedSender<()>,
    send_handle: JoinHandle<()>,
    receive_handle: JoinHandle<()>,
}

/// Owns one established connection and runs its protocol state machine.
///
/// The messenger splits the stream into halves, each driven by a spawned
/// local task while executing: a send loop draining the FIFO outbound queue
/// (write then flush, one frame at a time) and a receive loop doing
/// exact-size frame reads and resolving payloads against the
/// [`MessageRegistry`]. The loop tasks park the stream halves in shared
/// slots when they exit, so a later run (or a superseding
/// [`start_executing`](Self::start_executing)) picks them back up.
///
/// Lifecycle is `Idle -> Executing -> Stopped`, re-entrant through
/// `start_executing`. The generic stream parameter `S` is deliberately
/// independent of the provider bundle: the messenger never dials, it only
/// owns a stream someone else established, which also lets tests drive it
/// over an in-memory duplex pipe.
pub struct Messenger<M, S, P: Providers> {
    shared: Rc<RefCell<MessengerShared<M>>>,

    /// Wakes the send loop when the first item lands in an empty queue.
    data_to_send: Rc<Notify>,

    registry: Rc<MessageRegistry<M>>,

    /// Read half of the stream, parked here between runs.
    reader_slot: Rc<RefCell<Option<ReadHalf<S>>>>,

    /// Write half of the stream, parked here between runs.
    writer_slot: Rc<RefCell<Option<WriteHalf<S>>>>,

    run: Option<Run>,
    config: MessengerConfig,
    peer_addr: String,
    providers: P,
}

impl<M, S, P> Messenger<M, S, P>
where
    M: WireMessage + Clone + 'static,
    S: AsyncRead + AsyncWrite + Unpin + 'static,
    P: Providers,
{
    /// Create a messenger owning `stream`. Idle until
    /// [`start_executing`](Self::start_executing).
    pub fn new(
        providers: P,
        stream: S,
        peer_addr: impl Into<String>,
        registry: Rc<MessageRegistry<M>>,
        config: MessengerConfig,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            shared: Rc::new(RefCell::new(MessengerShared {
                outbound: VecDeque::new(),
                messages: Rc::new(Fanout::new()),
                disconnects: Rc::new(Fanout::new()),
                disconnect_published: false,
            })),
            data_to_send: Rc::new(Notify::new()),
            registry,
            reader_slot: Rc::new(RefCell::new(Some(reader))),
            writer_slot: Rc::new(RefCell::new(Some(writer))),
            run: None,
            config,
            peer_addr: peer_addr.into(),
            providers,
        }
    }

    /// The remote address captured at construction.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Whether a run is active and at least one of its loops is still alive.
    pub fn is_executing(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| !(run.send_handle.is_finished() && run.receive_handle.is_finished()))
    }

    /// Number of outbound items waiting to be written.
    pub fn queued_count(&self) -> usize {
        self.shared.borrow().outbound.len()
    }

    /// Subscribe to decoded inbound payloads, in wire arrival order.
    ///
    /// Subscribers attach and detach independently. Stopping the messenger
    /// ends every current subscriber's stream without an error; a
    /// subscription taken after a stop stays ended until the next
    /// [`start_executing`](Self::start_executing) installs a fresh stream.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<M> {
        self.shared.borrow().messages.subscribe()
    }

    /// Subscribe to disconnect notifications.
    ///
    /// Exactly one notification is published per executing lifetime,
    /// whether the connection ends by remote disconnect frame, by local
    /// [`disconnect`](Self::disconnect), or unexpectedly on EOF.
    pub fn subscribe_disconnects(&self) -> mpsc::UnboundedReceiver<DisconnectReason> {
        self.shared.borrow().disconnects.subscribe()
    }

    /// Enqueue a message for transmission. Fire-and-forget: never blocks
    /// and never fails synchronously.
    ///
    /// Frames go on the wire strictly in submission order. A payload that
    /// fails to serialize is dropped with an error log rather than
    /// poisoning the queue.
    pub fn send(&self, message: &M) {
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(
                    type_name = %message.type_name(),
                    %error,
                    "dropping outbound message that failed to serialize"
                );
                return;
            }
        };
        let bytes = match wire::encode_message_frame(message.type_name(), &payload) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(
                    type_name = %message.type_name(),
                    %error,
                    "dropping outbound message that failed to frame"
                );
                return;
            }
        };
        self.enqueue(OutboundItem {
            bytes,
            flushed: None,
            ends_run: false,
        });
    }

    /// Request a cooperative disconnect.
    ///
    /// Queues a disconnect frame behind any pending messages and resolves
    /// only after that frame has been written and flushed to the transport,
    /// then stops the messenger as a side effect. This is a local
    /// operation: nothing waits for the remote peer to acknowledge.
    ///
    /// Bounded by [`MessengerConfig::disconnect_timeout`]; on expiry the
    /// messenger is stopped anyway and the caller gets
    /// [`MessengerError::DisconnectTimeout`].
    pub async fn disconnect(&mut self, reason: DisconnectReason) -> MessengerResult<()> {
        let (flushed_tx, flushed_rx) = oneshot::channel();
        self.enqueue(OutboundItem {
            bytes: wire::encode_disconnect_frame(reason).to_vec(),
            flushed: Some(flushed_tx),
            ends_run: true,
        });

        let timeout = self.config.disconnect_timeout;
        let result = match self.providers.time().timeout(timeout, flushed_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(MessengerError::ConnectionClosed),
            Err(_) => Err(MessengerError::DisconnectTimeout { timeout }),
        };
        if result.is_err() {
            // Drop the unflushed disconnect frame so a later run does not
            // replay a stale handshake.
            self.shared
                .borrow_mut()
                .outbound
                .retain(|item| !item.ends_run);
            tracing::warn!(peer = %self.peer_addr, %reason, "disconnect frame was never flushed");
        }
        publish_disconnected(&self.shared, reason);
        self.stop_executing().await;
        result
    }

    /// Start the send and receive loops.
    ///
    /// Idempotent with respect to prior runs: an active run is cancelled
    /// and superseded, never doubled. Items queued while stopped are
    /// drained by the new run.
    pub async fn start_executing(&mut self) {
        self.halt_run().await;
        {
            let mut shared = self.shared.borrow_mut();
            if shared.messages.is_closed() {
                shared.messages = Rc::new(Fanout::new());
            }
            shared.disconnect_published = false;
        }

        let (send_shutdown, send_shutdown_rx) = mpsc::unbounded_channel();
        let (receive_shutdown, receive_shutdown_rx) = mpsc::unbounded_channel();
        let send_handle = self.providers.task().spawn_task(
            "messenger-send-loop",
            send_loop(
                self.shared.clone(),
                self.data_to_send.clone(),
                self.writer_slot.clone(),
                send_shutdown_rx,
            ),
        );
        let receive_handle = self.providers.task().spawn_task(
            "messenger-receive-loop",
            receive_loop(
                self.shared.clone(),
                self.registry.clone(),
                self.reader_slot.clone(),
                self.config.clone(),
                receive_shutdown_rx,
                send_shutdown.clone(),
            ),
        );
        self.run = Some(Run {
            send_shutdown,
            receive_shutdown,
            send_handle,
            receive_handle,
        });
        tracing::debug!(peer = %self.peer_addr, "messenger executing");

        // Wake the send loop in case items were queued while stopped.
        self.data_to_send.notify_one();
    }

    /// Stop both loops and close the inbound message stream. Idempotent; a
    /// later [`start_executing`](Self::start_executing) serves a fresh
    /// stream.
    pub async fn stop_executing(&mut self) {
        self.halt_run().await;
        self.shared.borrow().messages.close();
    }

    /// Signal the current run's loops and wait for both to park their
    /// stream halves.
    async fn halt_run(&mut self) {
        if let Some(run) = self.run.take() {
            let _ = run.send_shutdown.send(());
            let _ = run.receive_shutdown.send(());
            let _ = run.send_handle.await;
            let _ = run.receive_handle.await;
            tracing::debug!(peer = %self.peer_addr, "messenger run halted");
        }
    }

    fn enqueue(&self, item: OutboundItem) {
        let first_unsent = {
            let mut shared = self.shared.borrow_mut();
            let first_unsent = shared.outbound.is_empty();
            shared.outbound.push_back(item);
            first_unsent
        };
        if first_unsent {
            self.data_to_send.notify_one();
        }
    }
}

impl<M, S, P: Providers> Drop for Messenger<M, S, P> {
    /// Signal the loops so a dropped messenger releases its stream. Signal
    /// only; dropping never waits for the loops to finish.
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            let _ = run.send_shutdown.send(());
            let _ = run.receive_shutdown.send(());
        }
    }
}

/// Publish the disconnect notification, at most once per run.
fn publish_disconnected<M>(shared: &Rc<RefCell<MessengerShared<M>>>, reason: DisconnectReason) {
    let disconnects = {
        let mut shared = shared.borrow_mut();
        if shared.disconnect_published {
            return;
        }
        shared.disconnect_published = true;
        shared.disconnects.clone()
    };
    tracing::debug!(%reason, "connection ended");
    disconnects.publish(reason);
}

/// Background send loop: drains the outbound queue in FIFO order, flushing
/// after every frame before touching the next.
///
/// A write failure ends the loop with the in-flight frame lost; there is no
/// write retry. A flushed disconnect frame signals its completion and ends
/// the loop, leaving any later-queued items for the next run.
async fn send_loop<M, S>(
    shared: Rc<RefCell<MessengerShared<M>>>,
    data_to_send: Rc<Notify>,
    writer_slot: Rc<RefCell<Option<WriteHalf<S>>>>,
    mut shutdown_rx: mpsc::UnboundedReceiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(mut writer) = writer_slot.borrow_mut().take() else {
        tracing::error!("send loop started without a writer half");
        return;
    };

    'run: loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break 'run,
            _ = data_to_send.notified() => {}
        }
        loop {
            let item = shared.borrow_mut().outbound.pop_front();
            let Some(item) = item else {
                break;
            };
            // The write itself races shutdown: a stalled transport must not
            // keep the loop from being halted.
            tokio::select! {
                _ = shutdown_rx.recv() => break 'run,
                result = write_frame(&mut writer, &item.bytes) => {
                    if let Err(error) = result {
                        tracing::error!(%error, "write failed, ending send loop; in-flight frame lost");
                        break 'run;
                    }
                }
            }
            if let Some(flushed) = item.flushed {
                let _ = flushed.send(());
            }
            if item.ends_run {
                tracing::debug!("disconnect frame flushed, send loop ending");
                break 'run;
            }
        }
    }

    *writer_slot.borrow_mut() = Some(writer);
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// How one attempted frame read ended.
enum FrameOutcome {
    /// A decoded payload was published to subscribers.
    Delivered,
    /// The frame was consumed but dropped (unknown type or bad body); the
    /// stream is still in sync.
    Dropped,
    /// The remote sent a disconnect frame.
    Disconnected(DisconnectReason),
    /// The stream ended without a disconnect frame.
    Eof,
}

/// A transient receive failure: the loop restarts, budget permitting.
#[derive(Debug, Error)]
enum ReceiveError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Background receive loop: reads one frame at a time with exact-size reads
/// and dispatches on the kind byte.
///
/// Transient failures restart the loop under the same run, bounded by
/// [`MessengerConfig::max_receive_restarts`] consecutive failures; a
/// successfully processed frame resets the budget. EOF and disconnect
/// frames end the connection: the notification is published, the inbound
/// stream closes, and the send loop is told to stop.
async fn receive_loop<M, S>(
    shared: Rc<RefCell<MessengerShared<M>>>,
    registry: Rc<MessageRegistry<M>>,
    reader_slot: Rc<RefCell<Option<ReadHalf<S>>>>,
    config: MessengerConfig,
    mut shutdown_rx: mpsc::UnboundedReceiver<()>,
    send_shutdown: mpsc::UnboundedSender<()>,
) where
    M: Clone + 'static,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(mut reader) = reader_slot.borrow_mut().take() else {
        tracing::error!("receive loop started without a reader half");
        return;
    };

    let mut failures: u32 = 0;
    let ended = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break None,
            result = read_frame(&mut reader, &registry, &shared, &config) => match result {
                Ok(FrameOutcome::Delivered) | Ok(FrameOutcome::Dropped) => failures = 0,
                Ok(FrameOutcome::Disconnected(reason)) => break Some(reason),
                Ok(FrameOutcome::Eof) => break Some(DisconnectReason::Unexpected),
                Err(error) => {
                    failures += 1;
                    if failures > config.max_receive_restarts {
                        tracing::warn!(
                            %error,
                            failures,
                            "receive failures exhausted the restart budget, tearing connection down"
                        );
                        break Some(DisconnectReason::Unexpected);
                    }
                    tracing::warn!(%error, attempt = failures, "transient receive failure, restarting receive loop");
                }
            }
        }
    };

    if let Some(reason) = ended {
        publish_disconnected(&shared, reason);
        shared.borrow().messages.close();
        let _ = send_shutdown.send(());
    }
    *reader_slot.borrow_mut() = Some(reader);
}

/// Read and process one frame.
///
/// EOF at the frame boundary, or mid-frame, reports [`FrameOutcome::Eof`];
/// everything else either delivers, drops, or fails as a transient error.
async fn read_frame<M, R>(
    reader: &mut R,
    registry: &MessageRegistry<M>,
    shared: &Rc<RefCell<MessengerShared<M>>>,
    config: &MessengerConfig,
) -> Result<FrameOutcome, ReceiveError>
where
    M: Clone,
    R: AsyncRead + Unpin,
{
    let mut kind = [0u8; 1];
    if read_exact_or_eof(reader, &mut kind).await?.is_none() {
        return Ok(FrameOutcome::Eof);
    }

    match kind[0] {
        FRAME_KIND_MESSAGE => {
            let mut lens = [0u8; MessageHeader::SIZE];
            if read_exact_or_eof(reader, &mut lens).await?.is_none() {
                return Ok(FrameOutcome::Eof);
            }
            let header = MessageHeader::decode(&lens)?;
            if header.type_name_len > config.max_frame_size {
                return Err(WireError::FrameTooLarge {
                    size: header.type_name_len,
                    limit: config.max_frame_size,
                }
                .into());
            }
            if header.payload_len > config.max_frame_size {
                return Err(WireError::FrameTooLarge {
                    size: header.payload_len,
                    limit: config.max_frame_size,
                }
                .into());
            }

            let mut name_bytes = vec![0u8; header.type_name_len];
            if read_exact_or_eof(reader, &mut name_bytes).await?.is_none() {
                return Ok(FrameOutcome::Eof);
            }
            let mut payload = vec![0u8; header.payload_len];
            if read_exact_or_eof(reader, &mut payload).await?.is_none() {
                return Ok(FrameOutcome::Eof);
            }

            let type_name =
                std::str::from_utf8(&name_bytes).map_err(|error| WireError::InvalidTypeName {
                    valid_up_to: error.valid_up_to(),
                })?;
            match registry.decode(type_name, &payload) {
                None => {
                    tracing::warn!(type_name, "dropping frame with unregistered type name");
                    Ok(FrameOutcome::Dropped)
                }
                Some(Err(error)) => {
                    tracing::warn!(type_name, %error, "dropping frame whose body failed to decode");
                    Ok(FrameOutcome::Dropped)
                }
                Some(Ok(message)) => {
                    let messages = shared.borrow().messages.clone();
                    messages.publish(message);
                    Ok(FrameOutcome::Delivered)
                }
            }
        }
        FRAME_KIND_DISCONNECT => {
            let mut code = [0u8; 1];
            if read_exact_or_eof(reader, &mut code).await?.is_none() {
                return Ok(FrameOutcome::Eof);
            }
            match DisconnectReason::from_wire(code[0]) {
                Some(reason) => Ok(FrameOutcome::Disconnected(reason)),
                None => Err(WireError::InvalidDisconnectReason { code: code[0] }.into()),
            }
        }
        other => Err(WireError::InvalidFrameKind { kind: other }.into()),
    }
}

/// `read_exact` that reports EOF as `Ok(None)` instead of an error, so the
/// caller can tell a vanished peer apart from a transient read failure.
async fn read_exact_or_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<Option<()>, ReceiveError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(Some(())),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(error) => Err(error.into()),
    }
}
