/*
 * Created on Tue Apr 04 2023
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

use crate::util::error::{Error, ResqResult};

/// The authn provider. Cloned into every connection handler; holds the
/// password hash (never the password) when authn is enabled
#[derive(Clone)]
pub struct AuthProvider {
    origin: Option<Vec<u8>>,
}

impl AuthProvider {
    /// No password configured: every connection starts authenticated
    pub const fn new_disabled() -> Self {
        Self { origin: None }
    }
    pub fn new(password: &str) -> ResqResult<Self> {
        let hash = rcrypt::hash(password, rcrypt::DEFAULT_COST)
            .map_err(|e| Error::other(format!("failed to hash the password: {e:?}")))?;
        Ok(Self { origin: Some(hash) })
    }
    pub const fn is_enabled(&self) -> bool {
        self.origin.is_some()
    }
    /// Check a login attempt. Always false when authn is disabled (there is
    /// nothing to log in to; connections are already authenticated)
    pub fn verify(&self, password: &[u8]) -> bool {
        match self.origin.as_deref() {
            Some(hash) => rcrypt::verify(password, hash).unwrap_or(false),
            None => false,
        }
    }
}
