/*
 * Created on Sun Jan 01 2023
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

//! The core library for resqld
//!
//! This contains the little that is shared between the server binary and any
//! companion tooling: version/URL constants and terminal helpers

pub mod util;

/// The current version of the suite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// The URL of the project
pub const URL: &str = "https://github.com/resqld/resqld";
/// The size of the per-connection read buffer in bytes
pub const BUF_CAP: usize = 8 * 1024; // 8 KB per-connection
