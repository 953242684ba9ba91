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
    crate::{
        util::error::{Error, ResqResult},
        IoResult,
    },
    openssl::{
        pkey::PKey,
        rsa::Rsa,
        ssl::{Ssl, SslAcceptor, SslFiletype, SslMethod},
    },
    std::{fs, pin::Pin},
    tokio::net::TcpStream,
    tokio_openssl::SslStream,
};

impl BufferedSocketStream for SslStream<TcpStream> {}

/// The TLS listener
pub struct SslListener {
    pub base: BaseListener,
    acceptor: SslAcceptor,
}

impl SslListener {
    pub fn new_pem_based_ssl_connection(
        key_file: String,
        chain_file: String,
        base: BaseListener,
        tls_passfile: Option<String>,
    ) -> ResqResult<Self> {
        let mut acceptor_builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())?;
        // cert is the same for both
        acceptor_builder.set_certificate_chain_file(chain_file)?;
        if let Some(tls_passfile) = tls_passfile {
            // first read in the private key
            let tls_private_key = fs::read(key_file)
                .map_err(|e| Error::ioerror_extra(e, "reading TLS private key"))?;
            // read the passphrase because the passphrase file stream was provided
            let tls_keyfile_stream = fs::read(tls_passfile)
                .map_err(|e| Error::ioerror_extra(e, "reading TLS passphrase file"))?;
            // decrypt the private key
            let pkey = Rsa::private_key_from_pem_passphrase(&tls_private_key, &tls_keyfile_stream)?;
            let pkey = PKey::from_rsa(pkey)?;
            // set the private key for the acceptor
            acceptor_builder.set_private_key(&pkey)?;
        } else {
            // no passphrase, needs interactive
            acceptor_builder.set_private_key_file(key_file, SslFiletype::PEM)?;
        }
        Ok(SslListener {
            base,
            acceptor: acceptor_builder.build(),
        })
    }
    async fn accept(&mut self) -> ResqResult<(SslStream<TcpStream>, std::net::SocketAddr)> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                // we get the encrypted stream which we need to decrypt by
                // using the acceptor
                Ok((stream, addr)) => {
                    let ssl = Ssl::new(self.acceptor.context())?;
                    let mut stream = SslStream::new(ssl, stream)?;
                    Pin::new(&mut stream).accept().await?;
                    return Ok((stream, addr));
                }
                Err(e) => {
                    if backoff.should_disconnect() {
                        // too many retries, goodbye user
                        return Err(e.into());
                    }
                }
            }
            // spin to wait for the backoff duration
            backoff.spin().await;
        }
    }
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            // take the permit first, but we won't use it right now, that's
            // why we will forget it (the handler hands it back on drop)
            self.base.climit.acquire().await.unwrap().forget();
            let (stream, addr) = match self.accept().await {
                Ok(peer) => peer,
                Err(e) => {
                    log::debug!("TLS accept failed with: {}", e);
                    continue;
                }
            };
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
