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

use super::*;

#[test]
fn defaults_evaluate_cleanly() {
    let cfg = Configset::new_defaults().into_config().unwrap();
    assert_eq!(
        cfg.ports,
        PortConfig::InsecureOnly {
            host: DEFAULT_IPV4,
            port: DEFAULT_PORT
        }
    );
    assert_eq!(cfg.maxcon, crate::dbnet::MAXIMUM_CONNECTION_LIMIT);
    assert!(cfg.password.is_none());
    assert_eq!(cfg.storage.engine, StorageEngine::Memory);
    assert!(cfg.pubsub_enabled);
    assert!(!cfg.metrics_enabled);
}

#[test]
fn cli_style_overrides_win() {
    let mut cfg = Configset::new_defaults();
    cfg.set_source("test");
    cfg.server_tcp(Some("0.0.0.0"), "--host", Some("7878"), "--port");
    cfg.server_maxcon(Some("128"), "--maxcon");
    cfg.auth_password(Some("hunter2"), "--password");
    let cfg = cfg.into_config().unwrap();
    assert_eq!(
        cfg.ports,
        PortConfig::InsecureOnly {
            host: "0.0.0.0".parse().unwrap(),
            port: 7878
        }
    );
    assert_eq!(cfg.maxcon, 128);
    assert_eq!(cfg.password.as_deref(), Some("hunter2"));
}

#[test]
fn bad_values_land_on_the_error_stack() {
    let mut cfg = Configset::new_defaults();
    cfg.set_source("test");
    cfg.server_tcp(
        Some("not-an-ip"),
        "--host",
        Some("99999999"),
        "--port",
    );
    cfg.server_maxcon(Some("0"), "--maxcon");
    match cfg.into_config() {
        Err(feedback::ConfigError::CfgError(stack)) => assert_eq!(stack.len(), 3),
        other => panic!("expected an error stack, got {other:?}"),
    }
}

#[test]
fn tls_needs_both_halves() {
    let mut cfg = Configset::new_defaults();
    cfg.set_source("test");
    cfg.tls_settings(
        Some("key.pem"),
        "--sslkey",
        None::<&str>,
        "--sslchain",
        None::<&str>,
        "--sslport",
        None::<&str>,
        "--tlspassin",
        None::<&str>,
        "--sslonly",
    );
    assert!(matches!(
        cfg.into_config(),
        Err(feedback::ConfigError::ValidationError(_))
    ));
}

#[test]
fn config_file_layer_applies() {
    let raw = r#"
server:
  host: 127.0.0.1
  port: 7071
  maxcon: 450
auth:
  password: rust-is-okay
storage:
  engine: memory
pubsub:
  enabled: false
"#;
    let file: cfgfile::ConfigFile = serde_yaml::from_str(raw).unwrap();
    let mut cfg = Configset::new_defaults();
    cfg.set_source("config file");
    cfgfile::apply(&mut cfg, file);
    let cfg = cfg.into_config().unwrap();
    assert_eq!(cfg.maxcon, 450);
    assert_eq!(cfg.password.as_deref(), Some("rust-is-okay"));
    assert!(!cfg.pubsub_enabled);
    assert_eq!(
        cfg.ports,
        PortConfig::InsecureOnly {
            host: "127.0.0.1".parse().unwrap(),
            port: 7071
        }
    );
}
