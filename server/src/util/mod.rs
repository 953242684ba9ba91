/*
 * Created on Mon Jan 09 2023
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

#[macro_use]
pub mod macros;
pub mod compiler;
pub mod error;
pub mod glob;

use std::process;

const EXITCODE_ONE: i32 = 0x01;

/// Terminate the process with exit code 1
pub fn exit_error() -> ! {
    process::exit(EXITCODE_ONE)
}

/// Format a double the way the wire (and the stored form of float counters)
/// wants it: `inf`/`-inf`/`nan` spelled out, integral values without a
/// fractional part, everything else in the shortest round-trippable decimal
/// form with no trailing zeros
pub fn format_f64(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 {
            "inf".to_owned()
        } else {
            "-inf".to_owned()
        };
    }
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value == value.trunc() && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
