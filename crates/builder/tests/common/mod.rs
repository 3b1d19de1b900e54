//! Fake Builder used by the session integration tests.
//!
//! Accepts a single connection, records the request lines, streams canned
//! response chunks, then records everything the client writes until it
//! closes the socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wise_core::{Endpoint, EndpointRegistry};

/// What the fake Builder observed during its single exchange.
#[derive(Debug)]
pub struct Observed {
    /// Every line the client wrote, in order.
    pub lines: Vec<String>,
    /// Whether a second connection arrived after the first closed.
    pub extra_connection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Immediate,
    Held,
    HangUp,
    HalfClose,
    DropOnAccept,
}

pub struct FakeBuilder {
    pub port: u16,
    release: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Observed>,
}

type Chunks = Vec<Vec<u8>>;

fn into_chunks<C: Into<Vec<u8>>>(chunks: Vec<C>) -> Chunks {
    chunks.into_iter().map(Into::into).collect()
}

impl FakeBuilder {
    /// Respond immediately after reading `request_lines` lines.
    pub async fn spawn<C: Into<Vec<u8>>>(request_lines: usize, chunks: Vec<C>) -> Self {
        Self::spawn_inner(request_lines, into_chunks(chunks), Mode::Immediate).await
    }

    /// Like [`spawn`](Self::spawn), but hold the response until
    /// [`release`](Self::release) is called.
    pub async fn spawn_held<C: Into<Vec<u8>>>(request_lines: usize, chunks: Vec<C>) -> Self {
        Self::spawn_inner(request_lines, into_chunks(chunks), Mode::Held).await
    }

    /// Send the chunks, then close the connection without waiting for
    /// the client.
    pub async fn spawn_hang_up<C: Into<Vec<u8>>>(request_lines: usize, chunks: Vec<C>) -> Self {
        Self::spawn_inner(request_lines, into_chunks(chunks), Mode::HangUp).await
    }

    /// Send the chunks, then shut down the sending side while still
    /// recording what the client writes until it closes the socket.
    pub async fn spawn_half_close<C: Into<Vec<u8>>>(request_lines: usize, chunks: Vec<C>) -> Self {
        Self::spawn_inner(request_lines, into_chunks(chunks), Mode::HalfClose).await
    }

    /// Accept the connection and drop it before reading anything.
    pub async fn spawn_drop_on_accept() -> Self {
        Self::spawn_inner(0, Vec::new(), Mode::DropOnAccept).await
    }

    async fn spawn_inner(request_lines: usize, chunks: Chunks, mode: Mode) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind fake builder");
        let port = listener.local_addr().expect("local addr").port();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept client");
            if mode == Mode::DropOnAccept {
                drop(socket);
                return Observed {
                    lines: Vec::new(),
                    extra_connection: false,
                };
            }
            let (read_half, mut write_half) = socket.into_split();
            let mut reader = BufReader::new(read_half).lines();
            let mut lines = Vec::new();

            while lines.len() < request_lines {
                match reader.next_line().await.expect("read request line") {
                    Some(line) => lines.push(line),
                    None => break,
                }
            }

            if mode == Mode::Held {
                let _ = release_rx.await;
            }

            for chunk in chunks {
                write_half
                    .write_all(&chunk)
                    .await
                    .expect("write chunk");
                write_half.flush().await.expect("flush chunk");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            if mode == Mode::HangUp {
                return Observed {
                    lines,
                    extra_connection: false,
                };
            }

            if mode == Mode::HalfClose {
                write_half.shutdown().await.expect("shut down write half");
            }

            while let Ok(Some(line)) = reader.next_line().await {
                lines.push(line);
            }
            drop(write_half);

            let extra_connection =
                tokio::time::timeout(Duration::from_millis(100), listener.accept())
                    .await
                    .is_ok();

            Observed {
                lines,
                extra_connection,
            }
        });

        Self {
            port,
            release: Some(release_tx),
            handle,
        }
    }

    pub fn registry(&self) -> Arc<EndpointRegistry> {
        Arc::new(EndpointRegistry::new(self.endpoint()))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    pub fn release(&mut self) {
        if let Some(tx) = self.release.take() {
            let _ = tx.send(());
        }
    }

    pub async fn finish(self) -> Observed {
        self.handle.await.expect("fake builder task")
    }
}

/// A port on which nothing is listening.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind probe listener");
    listener.local_addr().expect("local addr").port()
}
