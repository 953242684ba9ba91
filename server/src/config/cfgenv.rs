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

//! The `RESQ_*` environment variables, between the config file and the
//! command line in precedence

use {super::Configset, std::env};

pub fn parse_env(cfg: &mut Configset) {
    cfg.server_tcp(
        env::var("RESQ_HOST"),
        "RESQ_HOST",
        env::var("RESQ_PORT"),
        "RESQ_PORT",
    );
    cfg.server_noart(env::var("RESQ_NOART"), "RESQ_NOART");
    cfg.server_maxcon(env::var("RESQ_MAXCON"), "RESQ_MAXCON");
    cfg.auth_password(env::var("RESQ_PASSWORD"), "RESQ_PASSWORD");
    cfg.storage_settings(
        env::var("RESQ_STORAGE_ENGINE"),
        "RESQ_STORAGE_ENGINE",
        env::var("RESQ_STORAGE_URL"),
        "RESQ_STORAGE_URL",
    );
    cfg.pubsub_settings(env::var("RESQ_PUBSUB"), "RESQ_PUBSUB");
    cfg.metrics_settings(env::var("RESQ_METRICS"), "RESQ_METRICS");
    cfg.tls_settings(
        env::var("RESQ_SSL_KEY"),
        "RESQ_SSL_KEY",
        env::var("RESQ_SSL_CHAIN"),
        "RESQ_SSL_CHAIN",
        env::var("RESQ_SSL_PORT"),
        "RESQ_SSL_PORT",
        env::var("RESQ_SSL_PASSIN"),
        "RESQ_SSL_PASSIN",
        env::var("RESQ_SSL_ONLY"),
        "RESQ_SSL_ONLY",
    );
}
