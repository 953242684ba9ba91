/*
 * Created on Tue Jul 11 2023
 *
 * This file is a part of resqld
 * resqld is a free and open-source Redis-wire-compatible database server
 * written by Sayan Nandan ("the Author") with the vision of running the
 * full Redis command surface on top of transactional SQL-shaped storage
 * without compromising on protocol fidelity or performance.
 *
 * Copyright (c) 2023, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The connection
//!
//! One task per accepted socket, owning the socket exclusively from accept
//! to close. The run loop races three things: the next frame off the wire,
//! the next pub/sub push out of the hub queue, and the shutdown signal.
//! Because the loop is the only writer, every serialized element hits the
//! socket atomically: command replies and out-of-band pushes can interleave
//! with each other but never inside one another.
//!
//! Replies are strictly FIFO with requests: one frame is read, dispatched
//! and answered before the next frame is even parsed (pipelined frames wait
//! in the read buffer).

use {
    super::{BufferedSocketStream, ServerEnv, Terminator},
    crate::{
        actions::ExecCtx,
        auth::AuthProvider,
        protocol::{
            responses, serializer::serialize_into, Deserializer, Element, ParseError,
            ProtocolVersion,
        },
        pubsub::{PushReceiver, PushSender},
        queryengine::{self, txn::TransactionBuffer, Verdict},
        stats,
        storage::OpsHandle,
        IoResult,
    },
    bytes::{Buf, Bytes, BytesMut},
    chrono::{DateTime, Utc},
    std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt, BufWriter},
        sync::{broadcast, mpsc, Semaphore},
    },
};

/// Monotonic client ids, process-wide, never reused within a process
/// lifetime
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// A buffered socket: read side accumulates into a [`BytesMut`] the parser
/// nibbles at, write side is a [`BufWriter`] flushed per reply batch
pub struct Connection<C> {
    stream: BufWriter<C>,
    buffer: BytesMut,
}

/// What one read attempt produced
pub enum FrameOutcome {
    /// A whole frame
    Frame(Element),
    /// Clean EOF between frames
    Disconnected,
    /// Framing violation: emit a final error line and close
    Error(String),
}

impl<C: BufferedSocketStream> Connection<C> {
    pub fn new(stream: C) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(libresq::BUF_CAP),
        }
    }
    /// Read exactly one top-level frame, waiting for more bytes as needed.
    /// Pipelined frames behind it stay in the buffer
    pub async fn read_frame(&mut self) -> IoResult<FrameOutcome> {
        loop {
            if !self.buffer.is_empty() {
                match Deserializer::new(&self.buffer).parse() {
                    Ok((element, consumed)) => {
                        self.buffer.advance(consumed);
                        return Ok(FrameOutcome::Frame(element));
                    }
                    Err(ParseError::NotEnough) => {}
                    Err(ParseError::Protocol(reason)) => return Ok(FrameOutcome::Error(reason)),
                }
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Ok(if self.buffer.is_empty() {
                    FrameOutcome::Disconnected
                } else {
                    // the peer died mid-frame
                    FrameOutcome::Error("unexpected end of stream".to_owned())
                });
            }
        }
    }
    /// Serialize one element and write it out in a single buffered write
    pub async fn write_element(
        &mut self,
        element: &Element,
        proto: ProtocolVersion,
    ) -> IoResult<()> {
        let mut out = Vec::with_capacity(64);
        serialize_into(element, proto, &mut out);
        self.stream.write_all(&out).await
    }
    pub async fn write_raw(&mut self, raw: &[u8]) -> IoResult<()> {
        self.stream.write_all(raw).await
    }
    pub async fn flush(&mut self) -> IoResult<()> {
        self.stream.flush().await
    }
}

/// The per-client state bundle
pub struct ClientState {
    pub id: u64,
    pub name: Vec<u8>,
    pub lib_name: Vec<u8>,
    pub lib_version: Vec<u8>,
    pub proto: ProtocolVersion,
    pub addr: String,
    pub connected_at: DateTime<Utc>,
    /// `Some` exactly while the connection is in Transaction mode
    pub txn: Option<TransactionBuffer>,
}

impl ClientState {
    fn new(id: u64, addr: String) -> Self {
        Self {
            id,
            name: Vec::new(),
            lib_name: Vec::new(),
            lib_version: Vec::new(),
            proto: ProtocolVersion::V2,
            addr,
            connected_at: Utc::now(),
            txn: None,
        }
    }
}

/// The authn provider plus the per-connection authenticated bit. With authn
/// disabled a connection is born authenticated
pub struct AuthProviderHandle {
    provider: AuthProvider,
    auth_good: bool,
}

impl AuthProviderHandle {
    pub fn new(provider: AuthProvider) -> Self {
        let auth_good = !provider.is_enabled();
        Self {
            provider,
            auth_good,
        }
    }
    pub const fn authenticated(&self) -> bool {
        self.auth_good
    }
    pub fn set_auth(&mut self) {
        self.auth_good = true;
    }
    pub fn provider(&self) -> &AuthProvider {
        &self.provider
    }
}

/// A generic connection handler: works over any [`BufferedSocketStream`],
/// plain TCP or TLS
pub struct ConnectionHandler<C> {
    pub(crate) env: ServerEnv,
    pub(crate) con: Connection<C>,
    pub(crate) auth: AuthProviderHandle,
    pub(crate) state: ClientState,
    /// handed to the hub at subscribe time; the hub pushes frames through it
    pub(crate) push_tx: PushSender,
    push_rx: PushReceiver,
    climit: Arc<Semaphore>,
    shutdown: broadcast::Receiver<()>,
    /// dropped when the handler exits; the arbiter waits on the other end
    _term_sig_tx: mpsc::Sender<()>,
}

impl<C: BufferedSocketStream> ConnectionHandler<C> {
    pub fn new(
        env: ServerEnv,
        con: Connection<C>,
        climit: Arc<Semaphore>,
        shutdown: broadcast::Receiver<()>,
        _term_sig_tx: mpsc::Sender<()>,
        addr: String,
    ) -> Self {
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        stats::STATS.incr_connections();
        let (push_tx, push_rx) = tokio::sync::mpsc::unbounded_channel();
        let auth = AuthProviderHandle::new(env.auth.clone());
        Self {
            env,
            con,
            auth,
            state: ClientState::new(id, addr),
            push_tx,
            push_rx,
            climit,
            shutdown,
            _term_sig_tx,
        }
    }

    /// Build an execution context over the given ops handle, carrying a
    /// fresh terminator and the negotiated protocol version
    pub(crate) fn ctx_with(&self, handle: OpsHandle) -> ExecCtx {
        ExecCtx::new(
            handle,
            Terminator::new(self.shutdown.resubscribe()),
            self.state.proto,
        )
    }
    pub(crate) fn root_ctx(&self) -> ExecCtx {
        self.ctx_with(OpsHandle::Root(self.env.db.clone()))
    }

    /// Drive the connection until the peer hangs up, the protocol breaks or
    /// the server shuts down
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            let outcome = {
                let Self {
                    con,
                    push_rx,
                    shutdown,
                    state,
                    ..
                } = self;
                tokio::select! {
                    frame = con.read_frame() => Some(frame?),
                    push = push_rx.recv() => {
                        if let Some(frame) = push {
                            con.write_element(&frame, state.proto).await?;
                            con.flush().await?;
                        }
                        None
                    }
                    _ = shutdown.recv() => return Ok(()),
                }
            };
            let Some(outcome) = outcome else { continue };
            match outcome {
                FrameOutcome::Disconnected => return Ok(()),
                FrameOutcome::Error(reason) => return self.close_with_protocol_error(&reason).await,
                FrameOutcome::Frame(element) => match Self::parts_from(element) {
                    Err(reason) => return self.close_with_protocol_error(&reason).await,
                    Ok(parts) if parts.is_empty() => continue,
                    Ok(parts) => {
                        let verdict = queryengine::execute(self, &parts).await;
                        let proto = self.state.proto;
                        match verdict {
                            Verdict::Reply(element) => {
                                self.con.write_element(&element, proto).await?;
                                self.con.flush().await?;
                            }
                            Verdict::Replies(elements) => {
                                for element in &elements {
                                    self.con.write_element(element, proto).await?;
                                }
                                self.con.flush().await?;
                            }
                            Verdict::Terminate(element) => {
                                self.con.write_element(&element, proto).await?;
                                self.con.flush().await?;
                                return Ok(());
                            }
                        }
                    }
                },
            }
        }
    }

    /// A command frame is an array of bulk strings; anything else is a
    /// protocol violation. An empty array is a no-op the loop skips
    fn parts_from(element: Element) -> Result<Vec<Bytes>, String> {
        match element {
            Element::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Element::BulkString(payload) => Ok(Bytes::from(payload)),
                    other => Err(format!(
                        "expected bulk string in command frame, got {}",
                        type_name(&other)
                    )),
                })
                .collect(),
            Element::NilArray => Ok(Vec::new()),
            other => Err(format!(
                "expected array of bulk strings, got {}",
                type_name(&other)
            )),
        }
    }

    async fn close_with_protocol_error(&mut self, reason: &str) -> IoResult<()> {
        // best-effort: the peer may already be gone
        let _ = self
            .con
            .write_raw(&responses::protocol_error_line(reason))
            .await;
        let _ = self.con.flush().await;
        Ok(())
    }
}

fn type_name(element: &Element) -> &'static str {
    match element {
        Element::SimpleString(_) => "simple string",
        Element::Error(_) => "error",
        Element::Integer(_) => "integer",
        Element::BulkString(_) => "bulk string",
        Element::Array(_) => "array",
        Element::NilBulk | Element::NilArray | Element::Null => "null",
        Element::Boolean(_) => "boolean",
        Element::Double(_) => "double",
        Element::BigNumber(_) => "big number",
        Element::BulkError(_) => "bulk error",
        Element::VerbatimString(..) => "verbatim string",
        Element::Map(_) => "map",
        Element::Set(_) => "set",
        Element::Push(_) => "push",
    }
}

impl<C> Drop for ConnectionHandler<C> {
    fn drop(&mut self) {
        // hand the permit back even if the task panicked, and make sure the
        // hub forgets this client
        self.climit.add_permits(1);
        self.env.hub.disconnect(self.state.id);
    }
}
