//! Single-flight request/response session against the Builder.
//!
//! A [`ProtocolSession`] runs one exchange at a time over a fresh TCP
//! connection: write the request lines, read the response according to
//! the request's [`CompletionPolicy`], write the shutdown token, close.
//!
//! The session is reusable. Once an exchange has succeeded or failed the
//! same instance accepts the next request, but a request made while an
//! exchange is still in flight is rejected immediately with
//! [`SessionError::ConcurrentRequest`] and does no I/O.
//!
//! [`ProtocolSession::begin`] is the single continuation primitive;
//! [`execute`](ProtocolSession::execute) awaits it and
//! [`execute_with_callback`](ProtocolSession::execute_with_callback)
//! hands its result to a closure.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use wise_core::{Endpoint, EndpointRegistry};

use crate::accumulator::{MarkerAccumulator, Record};
use crate::protocol::{CompletionPolicy, SessionRequest, FIELD_SEPARATOR, SHUTDOWN_TOKEN};

/// Size of each socket read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Lifecycle of a session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No exchange has run yet.
    Ready,
    /// An exchange is running; new requests are rejected.
    InFlight,
    /// The last exchange delivered a response.
    Succeeded,
    /// The last exchange ended with a transport error.
    Failed,
}

/// Raw Builder response, before any domain decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResponse {
    /// Text of the first packet received.
    Packet(String),
    /// Records recovered from a marker-terminated stream.
    Records(Vec<Record>),
}

impl SessionResponse {
    /// All fields in arrival order.
    ///
    /// A packet is split on `|` and line breaks; records are flattened.
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::Packet(text) => text
                .split(|c: char| c == FIELD_SEPARATOR || c == '\r' || c == '\n')
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Records(records) => records.iter().flatten().cloned().collect(),
        }
    }
}

/// A handle to reuse for sequential exchanges with the Builder.
///
/// Cloning yields another handle onto the same session, sharing its
/// single-flight state.
#[derive(Clone)]
pub struct ProtocolSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    registry: Arc<EndpointRegistry>,
    state: Mutex<SessionState>,
}

impl SessionInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `InFlight`, or reject when an exchange is already open.
    fn enter(&self) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        if *state == SessionState::InFlight {
            return Err(SessionError::ConcurrentRequest);
        }
        *state = SessionState::InFlight;
        Ok(())
    }

    fn finish(&self, succeeded: bool) {
        *self.lock_state() = if succeeded {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
    }
}

/// The pending result of an exchange started with [`ProtocolSession::begin`].
#[derive(Debug)]
#[must_use = "the exchange result is only observable through this handle"]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<SessionResponse, SessionError>>,
}

impl PendingResponse {
    /// Wait for the exchange to finish.
    pub async fn wait(self) -> Result<SessionResponse, SessionError> {
        self.rx.await.unwrap_or(Err(SessionError::Interrupted))
    }
}

impl ProtocolSession {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                registry,
                state: Mutex::new(SessionState::Ready),
            }),
        }
    }

    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        *self.inner.lock_state()
    }

    /// Start an exchange and return a handle to its result.
    ///
    /// Fails synchronously with [`SessionError::ConcurrentRequest`] when
    /// an exchange is already in flight; the running exchange is left
    /// untouched. The endpoint is read from the registry here, so later
    /// registry updates do not affect this exchange.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn begin(&self, request: SessionRequest) -> Result<PendingResponse, SessionError> {
        self.inner.enter()?;

        let endpoint = self.inner.registry.current();
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = run_exchange(&endpoint, &request).await;
            // State settles before the caller sees the result.
            inner.finish(result.is_ok());
            if tx.send(result).is_err() {
                tracing::debug!(
                    endpoint = %endpoint,
                    operation = %request.operation,
                    "Exchange result dropped, caller went away",
                );
            }
        });

        Ok(PendingResponse { rx })
    }

    /// Run an exchange and wait for its raw response.
    pub async fn execute(&self, request: SessionRequest) -> Result<SessionResponse, SessionError> {
        self.begin(request)?.wait().await
    }

    /// Run an exchange and pass its result to `callback` when done.
    ///
    /// A concurrent request is rejected synchronously and `callback` is
    /// not invoked in that case.
    pub fn execute_with_callback<F>(
        &self,
        request: SessionRequest,
        callback: F,
    ) -> Result<(), SessionError>
    where
        F: FnOnce(Result<SessionResponse, SessionError>) + Send + 'static,
    {
        let pending = self.begin(request)?;
        tokio::spawn(async move {
            callback(pending.wait().await);
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

async fn run_exchange(
    endpoint: &Endpoint,
    request: &SessionRequest,
) -> Result<SessionResponse, SessionError> {
    let transport = |source: std::io::Error| SessionError::Transport {
        endpoint: endpoint.to_string(),
        source,
    };

    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            tracing::error!(endpoint = %endpoint, error = %e, "Failed to connect to Builder");
            transport(e)
        })?;

    tracing::debug!(
        endpoint = %endpoint,
        operation = %request.operation,
        "Connected to Builder",
    );

    for line in request.request_lines() {
        write_line(&mut stream, &line).await.map_err(transport)?;
    }
    stream.flush().await.map_err(transport)?;

    let response = match request.completion {
        CompletionPolicy::SinglePacket => read_single_packet(&mut stream, endpoint).await,
        CompletionPolicy::MarkerTerminated => read_until_marker(&mut stream, endpoint).await,
    }
    .inspect_err(|e| {
        tracing::error!(
            endpoint = %endpoint,
            operation = %request.operation,
            error = %e,
            "Builder exchange failed",
        );
    })?;

    // The response is already in hand; a failing shutdown only gets logged.
    if let Err(e) = write_line(&mut stream, SHUTDOWN_TOKEN).await {
        tracing::warn!(endpoint = %endpoint, error = %e, "Failed to send shutdown token");
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(endpoint = %endpoint, error = %e, "Socket shutdown failed");
    }

    tracing::debug!(
        endpoint = %endpoint,
        operation = %request.operation,
        "Builder exchange complete",
    );

    Ok(response)
}

async fn write_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await
}

async fn read_single_packet(
    stream: &mut TcpStream,
    endpoint: &Endpoint,
) -> Result<SessionResponse, SessionError> {
    let mut packet = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    // A read can end inside a multi-byte character; keep reading until it is whole.
    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|source| SessionError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if n == 0 {
            if packet.is_empty() {
                return Err(SessionError::Closed {
                    endpoint: endpoint.to_string(),
                });
            }
            break;
        }

        packet.extend_from_slice(&buf[..n]);
        if !ends_mid_character(&packet) {
            break;
        }
    }

    Ok(SessionResponse::Packet(
        String::from_utf8_lossy(&packet).into_owned(),
    ))
}

/// Whether `bytes` end with an incomplete UTF-8 sequence.
fn ends_mid_character(bytes: &[u8]) -> bool {
    matches!(std::str::from_utf8(bytes), Err(e) if e.error_len().is_none())
}

async fn read_until_marker(
    stream: &mut TcpStream,
    endpoint: &Endpoint,
) -> Result<SessionResponse, SessionError> {
    let mut accumulator = MarkerAccumulator::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|source| SessionError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if n == 0 {
            return Err(SessionError::Closed {
                endpoint: endpoint.to_string(),
            });
        }

        if accumulator.push(&buf[..n]) {
            break;
        }
        tracing::trace!(
            endpoint = %endpoint,
            buffered = accumulator.len(),
            "Awaiting completion marker",
        );
    }

    Ok(SessionResponse::Records(accumulator.into_records()))
}

/// Errors surfaced by [`ProtocolSession`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session already has an exchange in flight. No I/O was attempted.
    #[error("A request is already in flight on this session")]
    ConcurrentRequest,

    /// Connecting, reading or writing the control socket failed.
    #[error("Transport error talking to Builder at {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The Builder closed the connection before the response completed.
    #[error("Builder at {endpoint} closed the connection before the response completed")]
    Closed { endpoint: String },

    /// The exchange task ended without reporting a result.
    #[error("Exchange ended without delivering a result")]
    Interrupted,
}
