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

//! Command-line flags, the highest-precedence source

use {super::Configset, clap::ArgMatches};

/// Presence-only flags parse as booleans through this shim
struct Flag(bool);

impl super::TryFromConfigSource<bool> for Flag {
    fn is_present(&self) -> bool {
        self.0
    }
    fn try_parse(self) -> super::ConfigSourceParseResult<bool> {
        if self.0 {
            super::ConfigSourceParseResult::Okay(true)
        } else {
            super::ConfigSourceParseResult::Absent
        }
    }
}

pub fn parse_cli(matches: &ArgMatches<'_>, cfg: &mut Configset) {
    cfg.server_tcp(
        matches.value_of("host"),
        "--host",
        matches.value_of("port"),
        "--port",
    );
    cfg.server_noart(Flag(matches.is_present("noart")), "--noart");
    cfg.server_maxcon(matches.value_of("maxcon"), "--maxcon");
    cfg.auth_password(matches.value_of("password"), "--password");
    cfg.storage_settings(
        matches.value_of("storageengine"),
        "--storage-engine",
        matches.value_of("storageurl"),
        "--storage-url",
    );
    if matches.is_present("nopubsub") {
        cfg.pubsub_settings(Some("false"), "--no-pubsub");
    }
    cfg.metrics_settings(Flag(matches.is_present("metrics")), "--metrics");
    cfg.tls_settings(
        matches.value_of("sslkey"),
        "--sslkey",
        matches.value_of("sslchain"),
        "--sslchain",
        matches.value_of("sslport"),
        "--sslport",
        matches.value_of("tlspassin"),
        "--tlspassin",
        Flag(matches.is_present("sslonly")),
        "--sslonly",
    );
}
