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

//! # Authn
//!
//! The password gate. One password per deployment, held as an rcrypt
//! (bcrypt) hash from the moment the config is evaluated; the plaintext
//! never outlives startup. `AUTH` and `HELLO .. AUTH` both land here.
//! Usernames exist only for wire compatibility: `default` is the real one
//! and anything else is accepted and ignored.

mod provider;

pub use provider::AuthProvider;

/// The default (and only meaningful) username
pub const USER_DEFAULT: &[u8] = b"default";
