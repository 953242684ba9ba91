/*
 * Created on Thu Jun 01 2023
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

//! # Database networking
//!
//! The listener/connection machinery: socket acceptance (plain TCP and TLS),
//! connection limits, the per-connection handler task and the graceful
//! shutdown choreography (broadcast the signal, close the listeners, wait on
//! the termination channel until every handler has dropped its sender).

use {
    crate::{
        auth::AuthProvider,
        config::PortConfig,
        pubsub::Hub,
        scripting::ScriptCache,
        storage::Backend,
        util::error::{Error, ResqResult},
    },
    std::{cell::Cell, net::IpAddr, sync::Arc, time::Duration},
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        sync::{broadcast, Semaphore},
        time,
    },
};

#[macro_use]
mod macros;
pub mod connection;
mod listener;
mod tcp;
mod tls;

pub use self::{
    connection::{ClientState, Connection, ConnectionHandler},
    listener::{BaseListener, MultiListener},
};

/// The maximum number of concurrent connections the server will entertain
pub const MAXIMUM_CONNECTION_LIMIT: usize = 50000;

/// This is a "marker trait" that ensures that no silly types are passed into
/// the [`Connection`] type
pub trait BufferedSocketStream: AsyncWriteExt + AsyncReadExt + Unpin + Send + Sync {}

/// A backoff implementation that is meant to be used in connection loops
pub(self) struct NetBackoff {
    c: Cell<u8>,
}

impl NetBackoff {
    /// The maximum backoff duration
    const MAX_BACKOFF: u8 = 64;
    pub const fn new() -> Self {
        Self { c: Cell::new(1) }
    }
    /// Wait for the current backoff duration
    pub async fn spin(&self) {
        time::sleep(Duration::from_secs(self.c.get() as _)).await;
        self.c.set(self.c.get() << 1);
    }
    /// Should we give up on the stream?
    pub fn should_disconnect(&self) -> bool {
        self.c.get() > Self::MAX_BACKOFF
    }
}

/// A wrapper around the shutdown broadcast. Cloning re-subscribes, so a
/// fresh clone never observes a signal that fired before it existed, which
/// is fine, because the signal is only ever fired once
pub struct Terminator {
    terminate: bool,
    signal: broadcast::Receiver<()>,
}

impl Terminator {
    pub fn new(signal: broadcast::Receiver<()>) -> Self {
        Self {
            terminate: false,
            signal,
        }
    }
    /// Wait for the termination signal. Returns immediately once the signal
    /// has been observed
    pub async fn receive_signal(&mut self) {
        if self.terminate {
            return;
        }
        let _ = self.signal.recv().await;
        self.terminate = true;
    }
}

impl Clone for Terminator {
    fn clone(&self) -> Self {
        Self {
            terminate: self.terminate,
            signal: self.signal.resubscribe(),
        }
    }
}

/// Everything a connection handler shares with the rest of the process: the
/// storage root, the pub/sub hub, the script cache and the auth provider
pub struct ServerEnv {
    pub db: Arc<dyn Backend>,
    pub hub: Arc<Hub>,
    pub scripts: Arc<ScriptCache>,
    pub auth: AuthProvider,
    pub pubsub_enabled: bool,
}

impl Clone for ServerEnv {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            hub: self.hub.clone(),
            scripts: self.scripts.clone(),
            auth: self.auth.clone(),
            pubsub_enabled: self.pubsub_enabled,
        }
    }
}

/// Initialize the database networking: bind every configured port and
/// return the listener bundle ready to run
pub async fn connect(
    ports: PortConfig,
    maxcon: usize,
    env: ServerEnv,
    signal: broadcast::Sender<()>,
) -> ResqResult<MultiListener> {
    let climit = Arc::new(Semaphore::new(maxcon));
    let base_listener_init = |host: IpAddr, port: u16| {
        BaseListener::init(&env, host, port, climit.clone(), signal.clone())
    };
    let description = ports.get_description();
    let server = match ports {
        PortConfig::InsecureOnly { host, port } => {
            MultiListener::new_insecure_only(base_listener_init(host, port).await?)
        }
        PortConfig::SecureOnly { host, ssl } => {
            MultiListener::new_secure_only(base_listener_init(host, ssl.port).await?, ssl)?
        }
        PortConfig::Multi { host, port, ssl } => {
            let secure_listener = base_listener_init(host, ssl.port).await?;
            let insecure_listener = base_listener_init(host, port).await?;
            MultiListener::new_multi(secure_listener, insecure_listener, ssl)?
        }
    };
    log::info!("Server started on {description}");
    Ok(server)
}

/// Map an I/O error into the crate error with binding context
pub fn bind_error(e: std::io::Error, port: u16) -> Error {
    Error::ioerror_extra(e, format!("binding to port {port}"))
}
