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

//! Error strings with a fixed wire form. Everything a client can provoke by
//! getting the protocol, its arguments or its state machine wrong lives here
//! so the exact spelling exists in exactly one place

use crate::consts;

pub mod groups {
    //! Wire-visible error strings shared by more than one command
    use crate::consts;
    consts! {
        pub E_WRONGTYPE: &str =
            "WRONGTYPE Operation against a key holding the wrong kind of value";
        pub E_NOT_INTEGER: &str = "ERR value is not an integer or out of range";
        pub E_NOT_FLOAT: &str = "ERR value is not a valid float";
        pub E_SYNTAX: &str = "ERR syntax error";
        pub E_NOAUTH: &str = "NOAUTH Authentication required.";
        pub E_WRONGPASS: &str =
            "WRONGPASS invalid username-password pair or user is disabled.";
        pub E_NOPROTO: &str = "NOPROTO unsupported protocol version";
        pub E_MULTI_NESTED: &str = "ERR MULTI calls can not be nested";
        pub E_EXEC_WITHOUT_MULTI: &str = "ERR EXEC without MULTI";
        pub E_DISCARD_WITHOUT_MULTI: &str = "ERR DISCARD without MULTI";
        pub E_EXECABORT: &str =
            "EXECABORT Transaction discarded because of previous errors";
        pub E_NOSCRIPT: &str = "NOSCRIPT No matching script. Please use EVAL.";
        pub E_NOTBUSY: &str = "NOTBUSY No scripts in execution right now.";
        pub E_SCRIPT_FORBIDDEN: &str =
            "ERR This Redis command is not allowed from a script";
        pub E_NO_SUCH_KEY: &str = "ERR no such key";
        pub E_SELECT_INVALID_DB: &str = "ERR DB index is out of range";
        pub E_SUBSCRIBE_IN_MULTI: &str =
            "ERR SUBSCRIBE is not allowed in transactions";
        pub E_BIT_NOT_BOOL: &str = "ERR bit is not an integer or out of range";
        pub E_OFFSET_OUT_OF_RANGE: &str = "ERR bit offset is not an integer or out of range";
        pub E_TIMEOUT_INVALID: &str = "ERR timeout is not a float or out of range";
        pub E_TIMEOUT_NEGATIVE: &str = "ERR timeout is negative";
        pub E_MIN_MAX_NOT_FLOAT: &str = "ERR min or max is not a float";
    }
}

consts! {
    /// What goes into the `server` field of the HELLO reply. Clients sniff
    /// this, so it has to read `redis`
    pub SERVER_NAME: &str = "redis";
    /// The Redis version the command surface tracks
    pub COMPAT_VERSION: &str = "7.0.0";
}

/// `ERR wrong number of arguments for '<cmd>' command`
pub fn wrong_arity(cmd: &str) -> String {
    format!(
        "ERR wrong number of arguments for '{}' command",
        cmd.to_ascii_lowercase()
    )
}

/// `ERR unknown command '<CMD>'`
pub fn unknown_command(cmd: &str) -> String {
    format!("ERR unknown command '{cmd}'")
}

/// The final line a connection sees before a protocol-triggered close
pub fn protocol_error_line(reason: &str) -> Vec<u8> {
    format!("-ERR Protocol error: {reason}\r\n").into_bytes()
}
