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
        connection::{Connection, ConnectionHandler},
        listener::BaseListener,
        BufferedSocketStream, NetBackoff,
    },
    crate::IoResult,
    tokio::net::TcpStream,
};

impl BufferedSocketStream for TcpStream {}

/// The plain-TCP listener
pub struct Listener {
    pub base: BaseListener,
}

impl Listener {
    pub fn new(base: BaseListener) -> Self {
        Self { base }
    }
    /// Accept an incoming connection with exponential backoff on transient
    /// accept errors
    async fn accept(&mut self) -> IoResult<(TcpStream, std::net::SocketAddr)> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                Ok(peer) => return Ok(peer),
                Err(e) => {
                    if backoff.should_disconnect() {
                        // too many retries, goodbye user
                        return Err(e);
                    }
                }
            }
            // spin to wait for the backoff duration
            backoff.spin().await;
        }
    }
    /// Run the accept loop
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            // take the permit first, but we won't use it right now, that's
            // why we will forget it (the handler hands it back on drop)
            self.base.climit.acquire().await.unwrap().forget();
            /*
             SECURITY: Ignore any errors that may arise in the accept
             loop. If we apply the try operator here, we will immediately
             terminate the run loop causing the entire server to go down.
             Also, do not log any errors because many connection errors
             can arise and it will flood the log and might also result
             in a crash
            */
            let (stream, addr) = skip_loop_err!(self.accept().await);
            let mut chandle = ConnectionHandler::new(
                self.base.env.clone(),
                Connection::new(stream),
                self.base.climit.clone(),
                self.base.signal.subscribe(),
                self.base.terminate_tx.clone(),
                addr.to_string(),
            );
            tokio::spawn(async move {
                if let Err(e) = chandle.run().await {
                    log::error!("Error: {}", e);
                }
            });
        }
    }
}
