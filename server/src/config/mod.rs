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

//! # Configuration
//!
//! Layered evaluation in ascending precedence: built-in defaults, then the
//! configuration file (`--withconfig`), then `RESQ_*` environment variables,
//! then command-line flags. Every item records which source set it; parse
//! failures land on the error stack with the offending key and source, and
//! a non-empty stack aborts the boot.

// external imports
use clap::{load_yaml, App};
// std imports
use core::str::FromStr;
use std::env::VarError;
use std::net::{IpAddr, Ipv4Addr};
// internal modules
mod cfgcli;
mod cfgenv;
mod cfgfile;
mod definitions;
mod feedback;
#[cfg(test)]
mod tests;
// internal imports
pub use self::definitions::*;
use self::feedback::{ConfigError, ErrorStack, WarningStack};
use crate::dbnet::MAXIMUM_CONNECTION_LIMIT;

// server defaults
const DEFAULT_IPV4: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
const DEFAULT_PORT: u16 = 6379;
// TLS defaults
const DEFAULT_SSL_PORT: u16 = 6380;

type StaticStr = &'static str;

#[derive(Debug)]
/// The outcome of a parse attempt for one configuration item from one
/// specific source
pub enum ConfigSourceParseResult<T> {
    Okay(T),
    Absent,
    ParseFailure,
}

/// A trait for configuration sources. Any type implementing this trait is
/// considered to be a valid source for configuration
pub trait TryFromConfigSource<T: Sized>: Sized {
    /// Check if the value is present
    fn is_present(&self) -> bool;
    /// Attempt to parse the value into the target type
    fn try_parse(self) -> ConfigSourceParseResult<T>;
}

impl<'a, T: FromStr + 'a> TryFromConfigSource<T> for Option<&'a str> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
    fn try_parse(self) -> ConfigSourceParseResult<T> {
        self.map(|s| {
            s.parse()
                .map(ConfigSourceParseResult::Okay)
                .unwrap_or(ConfigSourceParseResult::ParseFailure)
        })
        .unwrap_or(ConfigSourceParseResult::Absent)
    }
}

impl<T: FromStr> TryFromConfigSource<T> for Result<String, VarError> {
    fn is_present(&self) -> bool {
        !matches!(self, Err(VarError::NotPresent))
    }
    fn try_parse(self) -> ConfigSourceParseResult<T> {
        match self {
            Ok(s) => s
                .parse()
                .map(ConfigSourceParseResult::Okay)
                .unwrap_or(ConfigSourceParseResult::ParseFailure),
            Err(VarError::NotPresent) => ConfigSourceParseResult::Absent,
            Err(VarError::NotUnicode(_)) => ConfigSourceParseResult::ParseFailure,
        }
    }
}

/// Partial TLS settings while sources are still being folded in
#[derive(Debug, Default, PartialEq, Eq)]
struct SslPartial {
    key: Option<String>,
    chain: Option<String>,
    port: u16,
    passfile: Option<String>,
    only: bool,
}

/// The mutable model every source writes into, plus the feedback stacks
#[derive(Debug)]
pub struct Configset {
    /// tag of the source currently being evaluated (for messages)
    source: StaticStr,
    estack: ErrorStack,
    wstack: WarningStack,
    // server
    host: IpAddr,
    port: u16,
    noart: bool,
    maxcon: usize,
    // auth
    password: Option<String>,
    // storage
    storage_engine: StorageEngine,
    storage_url: Option<String>,
    // features
    pubsub_enabled: bool,
    metrics_enabled: bool,
    // tls
    ssl: SslPartial,
}

impl Configset {
    pub fn new_defaults() -> Self {
        Self {
            source: "default",
            estack: ErrorStack::new(),
            wstack: WarningStack::new(),
            host: DEFAULT_IPV4,
            port: DEFAULT_PORT,
            noart: false,
            maxcon: MAXIMUM_CONNECTION_LIMIT,
            password: None,
            storage_engine: StorageEngine::Memory,
            storage_url: None,
            pubsub_enabled: true,
            metrics_enabled: false,
            ssl: SslPartial {
                port: DEFAULT_SSL_PORT,
                ..SslPartial::default()
            },
        }
    }
    /// Switch the source tag before folding in the next layer
    pub fn set_source(&mut self, source: StaticStr) {
        self.source = source;
    }

    /// Fold one item in: absent leaves the current value, a parse failure
    /// goes on the error stack with the key and source
    fn fold<T>(&mut self, source: impl TryFromConfigSource<T>, target_key: StaticStr) -> Option<T> {
        match source.try_parse() {
            ConfigSourceParseResult::Okay(value) => Some(value),
            ConfigSourceParseResult::Absent => None,
            ConfigSourceParseResult::ParseFailure => {
                self.estack.push(format!(
                    "bad value for `{target_key}` (from: {})",
                    self.source
                ));
                None
            }
        }
    }

    pub fn server_tcp(
        &mut self,
        host: impl TryFromConfigSource<IpAddr>,
        host_key: StaticStr,
        port: impl TryFromConfigSource<u16>,
        port_key: StaticStr,
    ) {
        if let Some(host) = self.fold(host, host_key) {
            self.host = host;
        }
        if let Some(port) = self.fold(port, port_key) {
            self.port = port;
        }
    }
    pub fn server_noart(&mut self, noart: impl TryFromConfigSource<bool>, key: StaticStr) {
        if let Some(noart) = self.fold(noart, key) {
            self.noart = noart;
        }
    }
    pub fn server_maxcon(&mut self, maxcon: impl TryFromConfigSource<usize>, key: StaticStr) {
        if let Some(maxcon) = self.fold(maxcon, key) {
            if maxcon == 0 || maxcon > MAXIMUM_CONNECTION_LIMIT {
                self.estack.push(format!(
                    "`{key}` must be between 1 and {MAXIMUM_CONNECTION_LIMIT} (from: {})",
                    self.source
                ));
            } else {
                self.maxcon = maxcon;
            }
        }
    }
    pub fn auth_password(&mut self, password: impl TryFromConfigSource<String>, key: StaticStr) {
        if let Some(password) = self.fold(password, key) {
            if password.is_empty() {
                self.estack
                    .push(format!("`{key}` cannot be empty (from: {})", self.source));
            } else {
                self.password = Some(password);
            }
        }
    }
    pub fn storage_settings(
        &mut self,
        engine: impl TryFromConfigSource<StorageEngine>,
        engine_key: StaticStr,
        url: impl TryFromConfigSource<String>,
        url_key: StaticStr,
    ) {
        if let Some(engine) = self.fold(engine, engine_key) {
            self.storage_engine = engine;
        }
        if let Some(url) = self.fold(url, url_key) {
            self.storage_url = Some(url);
        }
    }
    pub fn pubsub_settings(&mut self, enabled: impl TryFromConfigSource<bool>, key: StaticStr) {
        if let Some(enabled) = self.fold(enabled, key) {
            self.pubsub_enabled = enabled;
        }
    }
    pub fn metrics_settings(&mut self, enabled: impl TryFromConfigSource<bool>, key: StaticStr) {
        if let Some(enabled) = self.fold(enabled, key) {
            self.metrics_enabled = enabled;
        }
    }
    #[allow(clippy::too_many_arguments)]
    pub fn tls_settings(
        &mut self,
        key: impl TryFromConfigSource<String>,
        key_key: StaticStr,
        chain: impl TryFromConfigSource<String>,
        chain_key: StaticStr,
        port: impl TryFromConfigSource<u16>,
        port_key: StaticStr,
        passfile: impl TryFromConfigSource<String>,
        passfile_key: StaticStr,
        only: impl TryFromConfigSource<bool>,
        only_key: StaticStr,
    ) {
        if let Some(key) = self.fold(key, key_key) {
            self.ssl.key = Some(key);
        }
        if let Some(chain) = self.fold(chain, chain_key) {
            self.ssl.chain = Some(chain);
        }
        if let Some(port) = self.fold(port, port_key) {
            self.ssl.port = port;
        }
        if let Some(passfile) = self.fold(passfile, passfile_key) {
            self.ssl.passfile = Some(passfile);
        }
        if let Some(only) = self.fold(only, only_key) {
            self.ssl.only = only;
        }
    }

    /// Finish evaluation: validate cross-item constraints and produce the
    /// final configuration
    pub fn into_config(self) -> Result<ConfigurationSet, ConfigError> {
        let Self {
            estack,
            wstack,
            host,
            port,
            noart,
            maxcon,
            password,
            storage_engine,
            storage_url,
            pubsub_enabled,
            metrics_enabled,
            ssl,
            ..
        } = self;
        if !estack.is_empty() {
            return Err(ConfigError::CfgError(estack));
        }
        wstack.announce();
        let ports = match (&ssl.key, &ssl.chain) {
            (Some(key), Some(chain)) => {
                let opts = SslOpts {
                    key: key.clone(),
                    chain: chain.clone(),
                    port: ssl.port,
                    passfile: ssl.passfile,
                };
                if ssl.only {
                    PortConfig::SecureOnly { host, ssl: opts }
                } else {
                    PortConfig::Multi {
                        host,
                        port,
                        ssl: opts,
                    }
                }
            }
            (None, None) => {
                if ssl.only {
                    return Err(ConfigError::ValidationError(
                        "sslonly requires a TLS key and certificate".to_owned(),
                    ));
                }
                PortConfig::InsecureOnly { host, port }
            }
            _ => {
                return Err(ConfigError::ValidationError(
                    "TLS needs both the private key and the certificate chain".to_owned(),
                ))
            }
        };
        if storage_engine == StorageEngine::Postgres && storage_url.is_none() {
            return Err(ConfigError::ValidationError(
                "the postgres storage engine needs a connection url".to_owned(),
            ));
        }
        Ok(ConfigurationSet {
            ports,
            maxcon,
            noart,
            password,
            storage: StorageConfig {
                engine: storage_engine,
                url: storage_url,
            },
            pubsub_enabled,
            metrics_enabled,
        })
    }
}

/// Evaluate every configuration source and return the final configuration
pub fn get_config() -> Result<ConfigurationSet, ConfigError> {
    let cfg_layout = load_yaml!("../cli.yml");
    let matches = App::from_yaml(cfg_layout).get_matches();
    let mut cfg = Configset::new_defaults();
    if let Some(file) = matches.value_of("config") {
        cfg.set_source("config file");
        cfgfile::apply_from(&mut cfg, file)?;
    }
    cfg.set_source("environment");
    cfgenv::parse_env(&mut cfg);
    cfg.set_source("command line");
    cfgcli::parse_cli(&matches, &mut cfg);
    cfg.into_config()
}
