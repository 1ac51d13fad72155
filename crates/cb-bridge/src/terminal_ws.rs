use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use cb_core::session_name::SessionName;
use cb_session::pty::{PtyIo, SessionAttacher, TermSize};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use flume::r#async::SendFut;
use futures_util::future::OptionFuture;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http_api::ApiState;
use crate::protocol::{
    ClientFrame, Utf8Chunker, ATTACH_FAILED_REASON, DISCONNECT_NOTICE, INVALID_SESSION_REASON,
};

/// Ping interval, to detect half-open TCP connections.
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on sending the final frames during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client frames held while the pty is not accepting input.
const INPUT_BACKLOG: usize = 256;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;
type OutputDone = (WsSink, RelayEnd, Utf8Chunker);
type PendingSend = Pin<Box<SendFut<'static, Vec<u8>>>>;

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    pub session: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// GET /ws/terminal?session=<name> -- attach to a tmux session.
///
/// The handshake always completes. A missing or invalid name is answered
/// with a 1008 close before anything is spawned.
pub async fn terminal_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
    query: Result<Query<TerminalQuery>, QueryRejection>,
) -> Response {
    let raw = query.ok().and_then(|Query(q)| q.session);
    let validated = match raw.as_deref() {
        Some(raw) => state.registry.validate(raw).map_err(|e| e.to_string()),
        None => Err("missing session parameter".to_string()),
    };

    match validated {
        Ok(session) => {
            let attacher = state.attacher.clone();
            let size = state.initial_size;
            ws.on_upgrade(move |socket| run_relay(socket, session, attacher, size))
        }
        Err(reason) => {
            warn!(session = ?raw, %reason, "rejecting terminal connection");
            ws.on_upgrade(|socket| close_with(socket, close_code::POLICY, INVALID_SESSION_REASON))
        }
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, socket.send(Message::Close(Some(frame)))).await;
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Lifecycle of one relay connection. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayState {
    Active,
    Closing,
    Closed,
}

/// Which side ended the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The attached process exited.
    ProcessExited,
    /// The client closed the socket or it errored.
    ClientGone,
}

/// One accepted socket paired with one pty.
pub struct RelayConnection {
    session: SessionName,
    pty: Arc<dyn PtyIo>,
    state: RelayState,
}

impl RelayConnection {
    pub fn new(session: SessionName, pty: Arc<dyn PtyIo>) -> Self {
        Self {
            session,
            pty,
            state: RelayState::Active,
        }
    }

    pub fn session(&self) -> &SessionName {
        &self.session
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Move to `next` if it is later than the current state.
    pub fn advance(&mut self, next: RelayState) -> bool {
        if next <= self.state {
            return false;
        }
        debug!(session = %self.session, from = ?self.state, to = ?next, "relay state");
        self.state = next;
        true
    }

    /// Active → Closing, then signal the pty child. Later calls do nothing.
    pub fn begin_close(&mut self, end: RelayEnd) {
        if !self.advance(RelayState::Closing) {
            return;
        }
        info!(session = %self.session, ?end, "relay closing");
        if let Err(e) = self.pty.kill() {
            warn!(session = %self.session, error = %e, "failed to kill pty child");
        }
    }
}

/// Relay bytes between `socket` and a fresh pty attached to `session`
/// until either side ends, then tear both down.
pub async fn run_relay(
    socket: WebSocket,
    session: SessionName,
    attacher: Arc<dyn SessionAttacher>,
    size: TermSize,
) {
    // openpty and fork/exec block.
    let attach = {
        let session = session.clone();
        tokio::task::spawn_blocking(move || attacher.attach(&session, size))
    };
    let pty: Arc<dyn PtyIo> = match attach.await {
        Ok(Ok(pty)) => Arc::from(pty),
        Ok(Err(e)) => {
            warn!(session = %session, error = %e, "pty attach failed");
            close_with(socket, close_code::ERROR, ATTACH_FAILED_REASON).await;
            return;
        }
        Err(e) => {
            warn!(session = %session, error = %e, "pty attach task failed");
            close_with(socket, close_code::ERROR, ATTACH_FAILED_REASON).await;
            return;
        }
    };

    let mut conn = RelayConnection::new(session, pty.clone());
    info!(session = %conn.session(), "relay active");

    let (sink, stream) = socket.split();
    let token = CancellationToken::new();

    let mut outbound = tokio::spawn(pump_output(sink, pty.output(), token.clone()));
    let mut inbound = tokio::spawn(pump_input(stream, pty.clone(), token.clone()));

    // The first pump to finish decides how the relay ends. The pty is
    // signalled before waiting on the other one.
    let output_first = tokio::select! {
        res = &mut outbound => Some(res),
        res = &mut inbound => {
            if let Err(e) = res {
                warn!(session = %conn.session(), error = %e, "input task failed");
            }
            None
        }
    };
    token.cancel();

    let output = match output_first {
        Some(res) => {
            let output = match res {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!(session = %conn.session(), error = %e, "output task failed");
                    None
                }
            };
            let end = output
                .as_ref()
                .map_or(RelayEnd::ClientGone, |(_, end, _)| *end);
            conn.begin_close(end);
            join_bounded(inbound, "input").await;
            output
        }
        None => {
            conn.begin_close(RelayEnd::ClientGone);
            join_bounded(outbound, "output").await
        }
    };

    if let Some((sink, end, mut chunker)) = output {
        finish_socket(sink, end, &mut chunker).await;
    }
    conn.advance(RelayState::Closed);
    info!(session = %conn.session(), "relay closed");
}

/// Wait up to [`CLOSE_TIMEOUT`] for a pump that has already been
/// cancelled, aborting it if it does not stop.
async fn join_bounded<T>(mut handle: JoinHandle<T>, pump: &'static str) -> Option<T> {
    match tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(pump, error = %e, "relay task failed");
            None
        }
        Err(_) => {
            warn!(pump, "relay task did not stop, aborting");
            handle.abort();
            None
        }
    }
}

/// Send `msg` unless the relay is cancelled first. False means stop.
async fn send_or_cancel(sink: &mut WsSink, msg: Message, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        sent = sink.send(msg) => sent.is_ok(),
    }
}

/// Process → socket. Returns the sink for teardown and who ended the relay.
async fn pump_output(
    mut sink: WsSink,
    output: flume::Receiver<Vec<u8>>,
    token: CancellationToken,
) -> OutputDone {
    let mut chunker = Utf8Chunker::new();
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + WS_HEARTBEAT_INTERVAL,
        WS_HEARTBEAT_INTERVAL,
    );

    let end = loop {
        tokio::select! {
            _ = token.cancelled() => break RelayEnd::ClientGone,
            chunk = output.recv_async() => match chunk {
                Ok(bytes) => {
                    let Some(text) = chunker.push(&bytes) else { continue };
                    if !send_or_cancel(&mut sink, Message::Text(text.into()), &token).await {
                        break RelayEnd::ClientGone;
                    }
                }
                Err(_) => break RelayEnd::ProcessExited,
            },
            _ = heartbeat.tick() => {
                if !send_or_cancel(&mut sink, Message::Ping(Default::default()), &token).await {
                    debug!("heartbeat ping failed, connection lost");
                    break RelayEnd::ClientGone;
                }
            }
        }
    };
    token.cancel();
    (sink, end, chunker)
}

/// Socket → process, in receipt order.
///
/// The socket keeps being read while the pty is not accepting input, so a
/// client that goes away is noticed even when the child has stopped
/// reading stdin. Up to [`INPUT_BACKLOG`] frames are held meanwhile; past
/// that the socket is left unread.
async fn pump_input(mut stream: WsStream, pty: Arc<dyn PtyIo>, token: CancellationToken) {
    let input = pty.input();
    let mut backlog: VecDeque<ClientFrame> = VecDeque::new();
    let mut sending: Option<PendingSend> = None;

    loop {
        while sending.is_none() {
            match backlog.pop_front() {
                Some(ClientFrame::Resize(size)) => {
                    if let Err(e) = pty.resize(size) {
                        warn!(cols = size.cols, rows = size.rows, error = %e, "pty resize failed");
                    }
                }
                Some(ClientFrame::Input(bytes)) => {
                    sending = Some(Box::pin(input.clone().into_send_async(bytes)));
                }
                None => break,
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            Some(sent) = OptionFuture::from(sending.as_mut()), if sending.is_some() => {
                sending = None;
                if sent.is_err() {
                    break;
                }
            }
            msg = stream.next(), if backlog.len() < INPUT_BACKLOG => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => ClientFrame::decode(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => ClientFrame::Input(data.to_vec()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        break;
                    }
                };
                backlog.push_back(frame);
            }
        }
    }
    token.cancel();
}

/// Send the trailing output and disconnect notice when the process ended,
/// then close the socket.
async fn finish_socket(mut sink: WsSink, end: RelayEnd, chunker: &mut Utf8Chunker) {
    let close = async {
        if end == RelayEnd::ProcessExited {
            if let Some(tail) = chunker.flush() {
                sink.send(Message::Text(tail.into())).await?;
            }
            sink.send(Message::Text(Utf8Bytes::from_static(DISCONNECT_NOTICE))).await?;
            sink.send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: Utf8Bytes::from_static("Session disconnected"),
            })))
            .await?;
        }
        sink.close().await
    };
    match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "socket close failed"),
        Err(_) => debug!("socket close timed out"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::session_name::SessionPrefix;
    use cb_session::pty::Result as PtyResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPty {
        kills: AtomicUsize,
    }

    impl PtyIo for CountingPty {
        fn output(&self) -> flume::Receiver<Vec<u8>> {
            flume::unbounded().1
        }
        fn input(&self) -> flume::Sender<Vec<u8>> {
            flume::unbounded().0
        }
        fn resize(&self, _size: TermSize) -> PtyResult<()> {
            Ok(())
        }
        fn kill(&self) -> PtyResult<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn connection() -> (RelayConnection, Arc<CountingPty>) {
        let pty = Arc::new(CountingPty::default());
        let name = SessionPrefix::default().parse("mf-test").unwrap();
        (RelayConnection::new(name, pty.clone()), pty)
    }

    #[test]
    fn state_only_moves_forward() {
        let (mut conn, _) = connection();
        assert_eq!(conn.state(), RelayState::Active);

        assert!(conn.advance(RelayState::Closing));
        assert!(!conn.advance(RelayState::Active));
        assert!(conn.advance(RelayState::Closed));
        assert!(!conn.advance(RelayState::Closing));
        assert_eq!(conn.state(), RelayState::Closed);
    }

    #[test]
    fn begin_close_kills_the_child() {
        let (mut conn, pty) = connection();
        conn.begin_close(RelayEnd::ClientGone);
        assert_eq!(conn.state(), RelayState::Closing);
        assert_eq!(pty.kills.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn begin_close_signals_once() {
        let (mut conn, pty) = connection();
        conn.begin_close(RelayEnd::ProcessExited);
        conn.begin_close(RelayEnd::ClientGone);
        assert_eq!(pty.kills.load(Ordering::SeqCst), 1);
    }
}
