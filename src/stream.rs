use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::cancel::StopSignal;
use crate::config::{Credentials, StreamConfig, StreamEndpoint};
use crate::extract::FrameExtractor;
use crate::frame::FrameHandle;
use crate::{http, ErrorKind, Result, StreamError};

/// Receives notifications of an [`MjpegStream`].
///
/// Notifications are delivered by [`MjpegStream::dispatch`] and
/// [`MjpegStream::dispatch_next`], on whatever thread calls them, never on
/// the network thread.
pub trait StreamSubscriber: Send + Sync {
    fn get_id(&self) -> String;
    fn notify_frame_ready(&self, event: FrameReadyEvent);
    fn notify_error(&self, event: StreamErrorEvent);
}

/// A new frame became current.
///
/// Frame events are skipped while the consumer has `event_capacity` of them
/// pending, so sequence numbers of consecutive events may jump.
#[derive(Debug, Clone)]
pub struct FrameReadyEvent {
    /// Sequence number of the frame, see [`FrameHandle::sequence`].
    pub sequence: u64,
    /// The frame that became current with this event. By the time the
    /// event is dispatched `current_frame()` may already hold a newer one.
    pub frame: Bytes,
}

/// The connection ended because of an error. Sent at most once per `open`.
#[derive(Debug, Clone)]
pub struct StreamErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StreamError> for StreamErrorEvent {
    fn from(err: &StreamError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    FrameReady(FrameReadyEvent),
    Error(StreamErrorEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing has been opened yet.
    Idle,
    /// Waiting for the HTTP response.
    Connecting,
    /// Reading frames.
    Streaming,
    /// Ended by `stop`.
    Stopped,
    /// Ended by an error, which has been sent as an event.
    Failed,
}

type Subscribers = Arc<RwLock<HashMap<String, Arc<dyn StreamSubscriber>>>>;
type SharedState = Arc<RwLock<StreamState>>;

/// One `open` call: its stop signal, its events and its reader thread.
struct Session {
    stop: StopSignal,
    state: SharedState,
    events: mpsc::Receiver<StreamEvent>,
    worker: Option<JoinHandle<()>>,
}

/// Client of an MJPEG-over-HTTP camera stream.
///
/// Typical flow:
/// 1. Create it with a `StreamConfig` and subscribe to notifications.
/// 2. Call `open` with the stream address. The connection is made and read
///    on a background thread; `open` returns immediately.
/// 3. Call `dispatch` from your own loop to receive notifications, or read
///    `current_frame` / `frame_handle().latest_since(..)` at your own pace.
/// 4. Call `stop` (or drop the stream) to end the connection.
///
/// Connection failures are never returned from `open`; they arrive as an
/// error notification. Retrying is left to the caller, by calling `open`
/// again.
pub struct MjpegStream {
    config: StreamConfig,
    frames: FrameHandle,
    subscribers: Subscribers,
    session: Option<Session>,
}

impl MjpegStream {
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            frames: FrameHandle::new(),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            session: None,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open `address` without credentials.
    pub fn open(&mut self, address: &str) {
        self.open_parsed(StreamEndpoint::parse(address));
    }

    /// Open `address`, sending basic credentials unless both are empty.
    pub fn open_with_credentials(
        &mut self,
        address: &str,
        username: &str,
        password: &str,
    ) {
        let endpoint = StreamEndpoint::parse(address).map(|endpoint| {
            endpoint.with_credentials(Credentials::new(username, password))
        });
        self.open_parsed(endpoint);
    }

    /// Start reading `endpoint` on a background thread.
    ///
    /// A connection that is still active is stopped first.
    pub fn open_endpoint(&mut self, endpoint: StreamEndpoint) {
        self.open_parsed(Ok(endpoint));
    }

    fn open_parsed(&mut self, endpoint: Result<StreamEndpoint>) {
        self.stop();

        let stop = StopSignal::new();
        let state = Arc::new(RwLock::new(StreamState::Connecting));
        // one slot more than frame events may use, kept for the error
        let capacity = self.config.event_capacity.saturating_add(1);
        let (tx, events) = mpsc::channel(capacity);

        let worker = endpoint.and_then(|endpoint| {
            info!("mjpeg/{}: opening stream", endpoint.label());
            let carrier = Carrier {
                label: endpoint.label(),
                endpoint,
                config: self.config.clone(),
                stop: stop.clone(),
                state: state.clone(),
                frames: self.frames.clone(),
                events: tx.clone(),
            };
            thread::Builder::new()
                .name("mjpeg-reader".to_string())
                .spawn(move || carrier.run())
                .map_err(StreamError::from)
        });

        let worker = match worker {
            Ok(worker) => Some(worker),
            Err(err) => {
                error!("mjpeg: unable to open stream: {}", err);
                set_state(&state, StreamState::Failed);
                // the channel is fresh, there is room for one event
                let _ = tx.try_send(StreamEvent::Error((&err).into()));
                None
            }
        };

        self.session = Some(Session {
            stop,
            state,
            events,
            worker,
        });
    }

    /// Ask the reader to stop. Returns immediately; an in-flight read is
    /// abandoned and no further frames are published. Stopping is not an
    /// error and produces no notification.
    pub fn stop(&self) {
        if let Some(session) = &self.session {
            if !session.stop.is_stopped() {
                debug!("mjpeg: stop requested");
                session.stop.stop();
            }
        }
    }

    /// Signal that stops the current connection from any thread.
    pub fn stop_handle(&self) -> Option<StopSignal> {
        self.session
            .as_ref()
            .map(|session| session.stop.clone())
    }

    /// Wait for the reader thread of the current connection to exit.
    ///
    /// Blocks the calling thread, call `stop` first unless the connection
    /// is expected to fail on its own.
    pub fn join(&mut self) {
        if let Some(worker) = self
            .session
            .as_mut()
            .and_then(|session| session.worker.take())
        {
            if worker.join().is_err() {
                warn!("mjpeg: reader thread panicked");
            }
        }
    }

    pub fn state(&self) -> StreamState {
        self.session
            .as_ref()
            .map(|session| get_state(&session.state))
            .unwrap_or(StreamState::Idle)
    }

    /// Whether the reader thread of the current connection is alive.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|session| session.worker.as_ref())
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Most recent complete frame, empty before the first one. Still
    /// readable after the stream stopped.
    pub fn current_frame(&self) -> Bytes {
        self.frames.current()
    }

    /// Handle to the current frame that can be moved to another thread.
    pub fn frame_handle(&self) -> FrameHandle {
        self.frames.clone()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn StreamSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber.get_id(), subscriber);
    }

    pub fn unsubscribe(&self, subscriber: Arc<dyn StreamSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscriber.get_id());
    }

    /// Next pending event, without waiting.
    pub fn poll_event(&mut self) -> Option<StreamEvent> {
        self.session.as_mut()?.events.try_recv().ok()
    }

    /// Wait for the next event. Returns `None` once the reader has exited
    /// and every event has been taken.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.session.as_mut()?.events.recv().await
    }

    /// Deliver every pending event to the subscribers on the calling
    /// thread. Never waits. Returns the number of events delivered.
    pub fn dispatch(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.poll_event() {
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    /// Wait for the next event and deliver it to the subscribers. Returns
    /// `false` once the reader has exited and every event was delivered.
    pub async fn dispatch_next(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.deliver(event);
                true
            }
            None => false,
        }
    }

    fn deliver(&self, event: StreamEvent) {
        let subscribers: Vec<Arc<dyn StreamSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        match event {
            StreamEvent::FrameReady(event) => subscribers
                .iter()
                .for_each(|s| s.notify_frame_ready(event.clone())),
            StreamEvent::Error(event) => subscribers
                .iter()
                .for_each(|s| s.notify_error(event.clone())),
        }
    }
}

impl Drop for MjpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the reader thread needs, moved into it on `open`.
struct Carrier {
    label: String,
    endpoint: StreamEndpoint,
    config: StreamConfig,
    stop: StopSignal,
    state: SharedState,
    frames: FrameHandle,
    events: mpsc::Sender<StreamEvent>,
}

impl Carrier {
    fn run(self) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match runtime {
            Ok(runtime) => runtime.block_on(self.serve()),
            Err(err) => {
                error!(
                    "mjpeg/{}: unable to start runtime: {}",
                    self.label, err
                );
                set_state(&self.state, StreamState::Failed);
                let err = StreamError::from(err);
                let event = StreamEvent::Error((&err).into());
                let _ = self.events.try_send(event);
            }
        }
    }

    async fn serve(self) {
        match self.read_frames().await {
            Ok(()) => {
                info!("mjpeg/{}: stream stopped", self.label);
                set_state(&self.state, StreamState::Stopped);
            }
            Err(err) if self.stop.is_stopped() => {
                debug!("mjpeg/{}: stopped while failing: {}", self.label, err);
                set_state(&self.state, StreamState::Stopped);
            }
            Err(err) => {
                error!("mjpeg/{}: {}", self.label, err);
                set_state(&self.state, StreamState::Failed);
                self.emit(StreamEvent::Error((&err).into())).await;
            }
        }
    }

    async fn read_frames(&self) -> Result<()> {
        if self.stop.is_stopped() {
            return Ok(());
        }

        let connected = tokio::select! {
            biased;
            _ = self.stop.stopped() => return Ok(()),
            connected = http::connect(&self.endpoint, &self.config) => {
                connected
            }
        };
        let (boundary, body) = connected?;
        set_state(&self.state, StreamState::Streaming);

        let mut extractor = FrameExtractor::new(
            body,
            boundary,
            &self.config,
            self.stop.clone(),
        );
        while let Some(frame) = extractor.next_frame().await? {
            if !self.publish(frame) {
                break;
            }
        }

        debug!(
            "mjpeg/{}: {} frames, {} bytes read, boundary {}",
            self.label,
            extractor.frames(),
            extractor.bytes_read(),
            extractor.boundary()
        );
        Ok(())
    }

    /// Make `frame` current and announce it. Returns `false` once stopped,
    /// in which case the frame is dropped.
    fn publish(&self, frame: Bytes) -> bool {
        let Some(sequence) =
            self.frames.publish_unless_stopped(&self.stop, frame.clone())
        else {
            debug!("mjpeg/{}: stopped, dropping last frame", self.label);
            return false;
        };

        // The last slot belongs to the error event.
        if self.events.capacity() <= 1 {
            trace!(
                "mjpeg/{}: consumer behind, frame #{} not announced",
                self.label,
                sequence
            );
            return true;
        }
        let event = FrameReadyEvent { sequence, frame };
        match self.events.try_send(StreamEvent::FrameReady(event)) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => {
                debug!("mjpeg/{}: stream dropped, stopping", self.label);
                false
            }
        }
    }

    /// Queue the error event, unless stopped first. Returns `false` when
    /// the event could not be queued.
    async fn emit(&self, event: StreamEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.stopped() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}

fn get_state(state: &SharedState) -> StreamState {
    *state.read().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(state: &SharedState, value: StreamState) {
    *state.write().unwrap_or_else(PoisonError::into_inner) = value;
}
