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

use {
    super::{
        tcp::Listener,
        tls::SslListener,
        ServerEnv,
    },
    crate::{
        config::SslOpts,
        util::error::ResqResult,
        IoResult,
    },
    core::future::Future,
    std::{net::IpAddr, sync::Arc},
    tokio::{
        net::TcpListener,
        sync::{broadcast, mpsc, Semaphore},
    },
};

/// The base TCP listener: everything a socket-flavored listener needs
pub struct BaseListener {
    /// what every spawned handler shares
    pub env: ServerEnv,
    /// the incoming connection listener (binding)
    pub listener: TcpListener,
    /// the maximum number of connections
    pub climit: Arc<Semaphore>,
    /// the shutdown broadcaster
    pub signal: broadcast::Sender<()>,
    // when all `Sender`s are dropped - the `Receiver` gets a `None` value;
    // we send a clone of `terminate_tx` to each handler
    pub terminate_tx: mpsc::Sender<()>,
    pub terminate_rx: mpsc::Receiver<()>,
}

impl BaseListener {
    pub async fn init(
        env: &ServerEnv,
        host: IpAddr,
        port: u16,
        climit: Arc<Semaphore>,
        signal: broadcast::Sender<()>,
    ) -> ResqResult<Self> {
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| super::bind_error(e, port))?;
        Ok(Self {
            env: env.clone(),
            listener,
            climit,
            signal,
            terminate_tx,
            terminate_rx,
        })
    }
    /// Wait for every handler spawned off this listener to drop its
    /// termination sender
    pub async fn release_self(self) {
        let Self {
            mut terminate_rx,
            terminate_tx,
            signal,
            ..
        } = self;
        drop(signal);
        drop(terminate_tx);
        let _ = terminate_rx.recv().await;
    }
}

/// Multiple listener interface: an abstraction over plain and TLS listeners
/// to facilitate listening on multiple ports at the same time
#[allow(clippy::large_enum_variant)]
pub enum MultiListener {
    SecureOnly(SslListener),
    InsecureOnly(Listener),
    Multi(Listener, SslListener),
}

async fn wait_on_port_futures(
    a: impl Future<Output = IoResult<()>>,
    b: impl Future<Output = IoResult<()>>,
) -> IoResult<()> {
    let (e1, e2) = tokio::join!(a, b);
    if let Err(e) = e1 {
        log::error!("Insecure listener failed with: {}", e);
    }
    if let Err(e) = e2 {
        log::error!("Secure listener failed with: {}", e);
    }
    Ok(())
}

impl MultiListener {
    pub fn new_insecure_only(base: BaseListener) -> Self {
        MultiListener::InsecureOnly(Listener::new(base))
    }
    pub fn new_secure_only(base: BaseListener, ssl: SslOpts) -> ResqResult<Self> {
        let listener =
            SslListener::new_pem_based_ssl_connection(ssl.key, ssl.chain, base, ssl.passfile)?;
        Ok(MultiListener::SecureOnly(listener))
    }
    pub fn new_multi(
        ssl_base_listener: BaseListener,
        tcp_base_listener: BaseListener,
        ssl: SslOpts,
    ) -> ResqResult<Self> {
        let secure_listener = SslListener::new_pem_based_ssl_connection(
            ssl.key,
            ssl.chain,
            ssl_base_listener,
            ssl.passfile,
        )?;
        let insecure_listener = Listener::new(tcp_base_listener);
        Ok(MultiListener::Multi(insecure_listener, secure_listener))
    }
    /// Run the configured listeners to completion
    pub async fn run_server(&mut self) -> IoResult<()> {
        match self {
            MultiListener::SecureOnly(secure_listener) => secure_listener.run().await,
            MultiListener::InsecureOnly(insecure_listener) => insecure_listener.run().await,
            MultiListener::Multi(insecure_listener, secure_listener) => {
                wait_on_port_futures(insecure_listener.run(), secure_listener.run()).await
            }
        }
    }
    /// Signal the ports to shut down and only return after every connection
    /// handler has terminated
    pub async fn finish_with_termsig(self) {
        match self {
            MultiListener::InsecureOnly(Listener { base, .. }) => base.release_self().await,
            MultiListener::SecureOnly(SslListener { base, .. }) => base.release_self().await,
            MultiListener::Multi(insecure, secure) => {
                insecure.base.release_self().await;
                secure.base.release_self().await;
            }
        }
    }
}
