/*
 * Created on Wed Feb 01 2023
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

//! # The RESP protocol
//!
//! This module implements both sides of the REdis Serialization Protocol:
//! the [`Deserializer`] turns a byte stream into [`Element`]s and the
//! serializer turns [`Element`]s back into wire bytes, downgrading RESP3-only
//! types on RESP2 connections. The codec is fully binary-safe: bulk payloads
//! are raw bytes and are never UTF-8 validated.
//!
//! Framing is incremental. A parse attempt over a partially-received buffer
//! returns [`ParseError::NotEnough`] and the connection simply reads more
//! bytes; a successful parse reports how many bytes it consumed so that
//! pipelined frames behind it survive in the buffer.

// modules
pub mod deserializer;
pub mod responses;
pub mod serializer;
#[cfg(test)]
mod tests;

pub use self::deserializer::Deserializer;

/// An element parsed off (or written onto) the wire. One variant per RESP
/// type symbol, RESP2 and RESP3 combined
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// `+`: a simple (unprefixed-length) string
    SimpleString(Vec<u8>),
    /// `-`: an error string
    Error(String),
    /// `:`: a signed 64-bit integer
    Integer(i64),
    /// `$`: a length-prefixed byte string
    BulkString(Vec<u8>),
    /// `*`: an ordered collection of elements
    Array(Vec<Element>),
    /// `$-1`: the nil bulk string
    NilBulk,
    /// `*-1`: the nil array
    NilArray,
    /// `_`: the RESP3 null
    Null,
    /// `#`: a RESP3 boolean
    Boolean(bool),
    /// `,`: a RESP3 double
    Double(f64),
    /// `(`: a RESP3 big number (kept as its decimal string)
    BigNumber(String),
    /// `!`: a RESP3 bulk error
    BulkError(String),
    /// `=`: a RESP3 verbatim string: three-byte format tag + payload
    VerbatimString([u8; 3], Vec<u8>),
    /// `%`: a RESP3 map of ordered key/value pairs
    Map(Vec<(Element, Element)>),
    /// `~`: a RESP3 set
    Set(Vec<Element>),
    /// `>`: a RESP3 out-of-band push
    Push(Vec<Element>),
}

impl Element {
    /// The canonical `+OK` reply
    pub fn ok() -> Self {
        Element::SimpleString(b"OK".to_vec())
    }
    /// The `+QUEUED` reply sent for commands buffered inside MULTI
    pub fn queued() -> Self {
        Element::SimpleString(b"QUEUED".to_vec())
    }
    /// A simple string from anything stringy
    pub fn simple(s: impl Into<Vec<u8>>) -> Self {
        Element::SimpleString(s.into())
    }
    /// A bulk string from anything stringy
    pub fn bulk(s: impl Into<Vec<u8>>) -> Self {
        Element::BulkString(s.into())
    }
    /// An error reply
    pub fn err(e: impl ToString) -> Self {
        Element::Error(e.to_string())
    }
    /// An array of bulk strings
    pub fn string_array(items: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Element::Array(items.into_iter().map(Element::BulkString).collect())
    }
    pub const fn is_error(&self) -> bool {
        matches!(self, Element::Error(_) | Element::BulkError(_))
    }
}

/// The protocol version negotiated on a connection. Every connection starts
/// at [`ProtocolVersion::V2`]; `HELLO 3` upgrades it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V2,
    V3,
}

impl ProtocolVersion {
    pub const fn number(&self) -> i64 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

#[derive(Debug, PartialEq)]
/// Errors that can arise while parsing a frame
pub enum ParseError {
    /// The buffer doesn't hold a full frame yet. Not a failure; read more
    NotEnough,
    /// The frame is malformed. The connection must be closed after a
    /// best-effort error line
    Protocol(String),
}

impl ParseError {
    pub fn protocol(reason: impl ToString) -> Self {
        Self::Protocol(reason.to_string())
    }
}

/// A generic result to indicate parsing errors through the [`ParseError`] enum
pub type ParseResult<T> = Result<T, ParseError>;
