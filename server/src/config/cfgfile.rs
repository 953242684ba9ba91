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

//! The YAML configuration file, lowest-precedence source after the built-in
//! defaults

use {
    super::{feedback::ConfigError, Configset},
    serde::Deserialize,
    std::fs,
};

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub pubsub: ToggleSection,
    #[serde(default)]
    pub metrics: ToggleSection,
    pub ssl: Option<SslSection>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub noart: Option<bool>,
    pub maxcon: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthSection {
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StorageSection {
    pub engine: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ToggleSection {
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SslSection {
    pub key: String,
    pub chain: String,
    pub port: Option<u16>,
    pub passin: Option<String>,
    pub only: Option<bool>,
}

/// Read `path`, parse it and fold it into the configset
pub fn apply_from(cfg: &mut Configset, path: &str) -> Result<(), ConfigError> {
    let raw = fs::read_to_string(path)?;
    let file: ConfigFile =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::CfgFileError(e.to_string()))?;
    apply(cfg, file);
    Ok(())
}

fn opt_string(value: &Option<String>) -> Option<&str> {
    value.as_deref()
}

fn opt_display<T: ToString>(value: &Option<T>) -> Option<String> {
    value.as_ref().map(T::to_string)
}

pub fn apply(cfg: &mut Configset, file: ConfigFile) {
    cfg.server_tcp(
        opt_string(&file.server.host),
        "server.host",
        opt_display(&file.server.port).as_deref(),
        "server.port",
    );
    if let Some(noart) = file.server.noart {
        cfg.server_noart(Some(noart.to_string().as_str()), "server.noart");
    }
    if let Some(maxcon) = file.server.maxcon {
        cfg.server_maxcon(Some(maxcon.to_string().as_str()), "server.maxcon");
    }
    cfg.auth_password(opt_string(&file.auth.password), "auth.password");
    cfg.storage_settings(
        opt_string(&file.storage.engine),
        "storage.engine",
        opt_string(&file.storage.url),
        "storage.url",
    );
    if let Some(enabled) = file.pubsub.enabled {
        cfg.pubsub_settings(Some(enabled.to_string().as_str()), "pubsub.enabled");
    }
    if let Some(enabled) = file.metrics.enabled {
        cfg.metrics_settings(Some(enabled.to_string().as_str()), "metrics.enabled");
    }
    if let Some(ssl) = file.ssl {
        cfg.tls_settings(
            Some(ssl.key.as_str()),
            "ssl.key",
            Some(ssl.chain.as_str()),
            "ssl.chain",
            opt_display(&ssl.port).as_deref(),
            "ssl.port",
            opt_string(&ssl.passin),
            "ssl.passin",
            opt_display(&ssl.only).as_deref(),
            "ssl.only",
        );
    }
}
