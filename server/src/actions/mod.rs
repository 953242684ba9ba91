/*
 * Created on Wed Apr 12 2023
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

//! # Actions
//!
//! Actions are the data commands: you provide arguments, they produce a
//! reply element. Every action is written exactly once against the abstract
//! [`ExecCtx`]; whether it runs against the storage root, inside an EXEC
//! transaction or from a Lua script is entirely the caller's business.

#[macro_use]
mod macros;
pub mod bitmaps;
pub mod hashes;
pub mod hll;
pub mod keys;
pub mod lists;
pub mod server;
pub mod sets;
pub mod strings;
pub mod zsets;
#[cfg(test)]
mod tests;

use {
    crate::{
        dbnet::Terminator,
        protocol::{responses, responses::groups, Element, ProtocolVersion},
        storage::{
            error::{StorageError, StorageErrorKind},
            DataOps, OpsHandle,
        },
        util::compiler,
    },
    bytes::Bytes,
};

/// A generic result for actions
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors that can occur while running actions. Both variants are recovered
/// by replying on the wire; a `Storage` error of the `Fatal` kind
/// additionally tears the connection down
#[derive(Debug, PartialEq)]
pub enum ActionError {
    Error(String),
    Storage(StorageError),
}

impl ActionError {
    /// The wire form of the error
    pub fn into_element(self) -> Element {
        match self {
            Self::Error(e) => Element::Error(e),
            Self::Storage(e) => Element::Error(match e.kind {
                StorageErrorKind::WrongType => groups::E_WRONGTYPE.to_owned(),
                StorageErrorKind::NotInteger => groups::E_NOT_INTEGER.to_owned(),
                StorageErrorKind::NotFloat => groups::E_NOT_FLOAT.to_owned(),
                StorageErrorKind::KeyNotFound => groups::E_NO_SUCH_KEY.to_owned(),
                StorageErrorKind::Transient | StorageErrorKind::Fatal => {
                    format!("ERR {}", e.message)
                }
            }),
        }
    }
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_fatal())
    }
}

impl From<StorageError> for ActionError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<String> for ActionError {
    fn from(e: String) -> Self {
        Self::Error(e)
    }
}

impl From<&str> for ActionError {
    fn from(e: &str) -> Self {
        Self::Error(e.to_owned())
    }
}

/// The execution context an action runs in: the ops capability, the
/// connection's termination signal (blocking pops race it) and the
/// negotiated protocol version (decides map-vs-flat reply shapes).
/// Cloning is cheap, which is what lets a script closure own one
pub struct ExecCtx {
    pub handle: OpsHandle,
    pub term: Terminator,
    pub proto: ProtocolVersion,
}

impl ExecCtx {
    pub fn new(handle: OpsHandle, term: Terminator, proto: ProtocolVersion) -> Self {
        Self {
            handle,
            term,
            proto,
        }
    }
    pub fn ops(&self) -> &dyn DataOps {
        self.handle.ops()
    }
    pub const fn in_txn(&self) -> bool {
        self.handle.in_txn()
    }
}

impl Clone for ExecCtx {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            term: self.term.clone(),
            proto: self.proto,
        }
    }
}

/// The arity gate. Every action calls this before anything else; a mismatch
/// produces the canonical wrong-arity error and never touches storage
pub fn ensure_length(cmd: &str, len: usize, is_valid: fn(usize) -> bool) -> ActionResult<()> {
    if compiler::likely(is_valid(len)) {
        Ok(())
    } else {
        Err(ActionError::Error(responses::wrong_arity(cmd)))
    }
}

/// Parse a client-provided integer argument (base 10, signed 64-bit). Any
/// deviation is the canonical not-an-integer error
pub fn parse_int(arg: &[u8]) -> ActionResult<i64> {
    let s = core::str::from_utf8(arg).map_err(|_| groups::E_NOT_INTEGER)?;
    if s.starts_with('+') {
        return Err(groups::E_NOT_INTEGER.into());
    }
    s.parse::<i64>().map_err(|_| groups::E_NOT_INTEGER.into())
}

/// Parse a client-provided double. `inf`, `+inf` and `-inf` are legal
/// (case-insensitively), `nan` is not
pub fn parse_float(arg: &[u8]) -> ActionResult<f64> {
    let s = core::str::from_utf8(arg).map_err(|_| groups::E_NOT_FLOAT)?;
    let parsed = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        lower => lower
            .parse::<f64>()
            .map_err(|_| ActionError::from(groups::E_NOT_FLOAT))?,
    };
    if parsed.is_nan() {
        return Err(groups::E_NOT_FLOAT.into());
    }
    Ok(parsed)
}

/// Exclusive score bounds are approximated by an epsilon offset pushed
/// towards the interval; scores closer than this to the bound will be
/// misclassified (storage-side filtering is the real fix)
const SCORE_EPSILON: f64 = 1e-9;

/// Parse a `(`-prefixed exclusive or plain inclusive score bound. `is_min`
/// decides which direction the exclusivity epsilon leans
pub fn parse_score_bound(arg: &[u8], is_min: bool) -> ActionResult<f64> {
    match arg.split_first() {
        Some((b'(', rest)) => {
            let score = parse_float_minmax(rest)?;
            Ok(if is_min {
                score + SCORE_EPSILON
            } else {
                score - SCORE_EPSILON
            })
        }
        _ => parse_float_minmax(arg),
    }
}

fn parse_float_minmax(arg: &[u8]) -> ActionResult<f64> {
    parse_float(arg).map_err(|_| ActionError::from(groups::E_MIN_MAX_NOT_FLOAT))
}

/// Case-insensitive option keyword comparison
pub fn opt_eq(arg: &[u8], keyword: &str) -> bool {
    arg.eq_ignore_ascii_case(keyword.as_bytes())
}

/// Borrowing view of an argument list as raw slices, the shape the storage
/// capability wants for multi-key calls
pub fn as_slices(args: &[Bytes]) -> Vec<&[u8]> {
    args.iter().map(|arg| arg.as_ref()).collect()
}
