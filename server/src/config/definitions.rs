/*
 * Created on Sat Feb 11 2023
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

use std::{fmt, net::IpAddr, str::FromStr};

/// Which storage engine backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEngine {
    /// the bundled reference engine
    Memory,
    /// the SQL collaborator (separate crate)
    Postgres,
}

impl FromStr for StorageEngine {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub engine: StorageEngine,
    /// connection parameters handed verbatim to the engine
    pub url: Option<String>,
}

/// TLS configuration: PEM key and certificate chain, the port to listen on
/// and an optional passphrase file for the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslOpts {
    pub key: String,
    pub chain: String,
    pub port: u16,
    pub passfile: Option<String>,
}

/// Which sockets the server binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortConfig {
    InsecureOnly {
        host: IpAddr,
        port: u16,
    },
    SecureOnly {
        host: IpAddr,
        ssl: SslOpts,
    },
    Multi {
        host: IpAddr,
        port: u16,
        ssl: SslOpts,
    },
}

impl PortConfig {
    pub fn get_description(&self) -> String {
        match self {
            Self::InsecureOnly { host, port } => format!("resp://{host}:{port}"),
            Self::SecureOnly { host, ssl } => format!("resps://{host}:{}", ssl.port),
            Self::Multi { host, port, ssl } => format!(
                "resp://{host}:{port} and resps://{host}:{}",
                ssl.port
            ),
        }
    }
}

/// The fully-evaluated server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSet {
    pub ports: PortConfig,
    pub maxcon: usize,
    pub noart: bool,
    pub password: Option<String>,
    pub storage: StorageConfig,
    pub pubsub_enabled: bool,
    /// parsed for deployment parity; the metrics sink itself is a
    /// collaborator
    pub metrics_enabled: bool,
}
