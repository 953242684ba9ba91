/*
 * Created on Fri Jun 09 2023
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
    parking_lot::RwLock,
    sha1::{Digest, Sha1},
    std::collections::HashMap,
};

/// Lowercase hex SHA-1 of a script body, the cache key EVALSHA uses
pub fn sha1_hex(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// The process-global script cache: lowercase hex SHA-1 to script source.
/// Reads dominate (every EVALSHA), so a reader-writer lock it is
#[derive(Default)]
pub struct ScriptCache {
    map: RwLock<HashMap<String, Vec<u8>>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }
    /// Store a script and return its SHA. EVAL and SCRIPT LOAD both land
    /// here; storing the same body twice is a no-op
    pub fn load(&self, source: &[u8]) -> String {
        let sha = sha1_hex(source);
        self.map
            .write()
            .entry(sha.clone())
            .or_insert_with(|| source.to_vec());
        sha
    }
    pub fn get(&self, sha: &str) -> Option<Vec<u8>> {
        // sha lookups are case-insensitive on the wire
        self.map.read().get(&sha.to_ascii_lowercase()).cloned()
    }
    pub fn contains(&self, sha: &str) -> bool {
        self.map.read().contains_key(&sha.to_ascii_lowercase())
    }
    pub fn flush(&self) {
        self.map.write().clear();
    }
}
