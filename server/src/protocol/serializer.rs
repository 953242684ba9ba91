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

//! # RESP serializer
//!
//! Serialization is protocol-version aware: a RESP2 peer must never see a
//! RESP3-exclusive type on its socket, so the RESP3 variants degrade to their
//! closest RESP2 shape (maps flatten into arrays, booleans become integers,
//! nulls become nil bulks, doubles become bulk strings, and so on).
//!
//! Every element is serialized into an in-memory buffer before it touches the
//! socket, which is what makes a single element an atomic write with respect
//! to out-of-band pub/sub pushes.

use {
    super::{Element, ProtocolVersion},
    crate::util::format_f64,
};

/// Serialize `element` into `out` in the shape `proto` permits
pub fn serialize_into(element: &Element, proto: ProtocolVersion, out: &mut Vec<u8>) {
    match element {
        Element::SimpleString(s) => {
            out.push(b'+');
            out.extend_from_slice(s);
            out.extend_from_slice(b"\r\n");
        }
        Element::Error(e) => {
            out.push(b'-');
            out.extend_from_slice(e.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Element::Integer(int) => {
            out.push(b':');
            out.extend_from_slice(int.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Element::BulkString(payload) => write_bulk(b'$', payload, out),
        Element::Array(elements) => {
            write_aggregate_header(b'*', elements.len(), out);
            for element in elements {
                serialize_into(element, proto, out);
            }
        }
        Element::NilBulk => match proto {
            ProtocolVersion::V2 => out.extend_from_slice(b"$-1\r\n"),
            ProtocolVersion::V3 => out.extend_from_slice(b"_\r\n"),
        },
        Element::NilArray => match proto {
            ProtocolVersion::V2 => out.extend_from_slice(b"*-1\r\n"),
            ProtocolVersion::V3 => out.extend_from_slice(b"_\r\n"),
        },
        Element::Null => match proto {
            ProtocolVersion::V2 => out.extend_from_slice(b"$-1\r\n"),
            ProtocolVersion::V3 => out.extend_from_slice(b"_\r\n"),
        },
        Element::Boolean(b) => match proto {
            ProtocolVersion::V2 => {
                out.extend_from_slice(if *b { b":1\r\n" } else { b":0\r\n" });
            }
            ProtocolVersion::V3 => {
                out.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" });
            }
        },
        Element::Double(d) => match proto {
            ProtocolVersion::V2 => write_bulk(b'$', format_double(*d).as_bytes(), out),
            ProtocolVersion::V3 => {
                out.push(b',');
                out.extend_from_slice(format_double(*d).as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        },
        Element::BigNumber(digits) => match proto {
            ProtocolVersion::V2 => write_bulk(b'$', digits.as_bytes(), out),
            ProtocolVersion::V3 => {
                out.push(b'(');
                out.extend_from_slice(digits.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        },
        Element::BulkError(e) => match proto {
            ProtocolVersion::V2 => {
                out.push(b'-');
                out.extend_from_slice(e.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            ProtocolVersion::V3 => write_bulk(b'!', e.as_bytes(), out),
        },
        Element::VerbatimString(format, payload) => match proto {
            ProtocolVersion::V2 => write_bulk(b'$', payload, out),
            ProtocolVersion::V3 => {
                let mut full = Vec::with_capacity(payload.len() + 4);
                full.extend_from_slice(format);
                full.push(b':');
                full.extend_from_slice(payload);
                write_bulk(b'=', &full, out);
            }
        },
        Element::Map(pairs) => match proto {
            // RESP2 never sees a map; it gets the flat key/value array
            ProtocolVersion::V2 => {
                write_aggregate_header(b'*', pairs.len() * 2, out);
                for (key, value) in pairs {
                    serialize_into(key, proto, out);
                    serialize_into(value, proto, out);
                }
            }
            ProtocolVersion::V3 => {
                write_aggregate_header(b'%', pairs.len(), out);
                for (key, value) in pairs {
                    serialize_into(key, proto, out);
                    serialize_into(value, proto, out);
                }
            }
        },
        Element::Set(elements) => {
            let tsymbol = match proto {
                ProtocolVersion::V2 => b'*',
                ProtocolVersion::V3 => b'~',
            };
            write_aggregate_header(tsymbol, elements.len(), out);
            for element in elements {
                serialize_into(element, proto, out);
            }
        }
        Element::Push(elements) => {
            let tsymbol = match proto {
                ProtocolVersion::V2 => b'*',
                ProtocolVersion::V3 => b'>',
            };
            write_aggregate_header(tsymbol, elements.len(), out);
            for element in elements {
                serialize_into(element, proto, out);
            }
        }
    }
}

fn write_bulk(tsymbol: u8, payload: &[u8], out: &mut Vec<u8>) {
    out.push(tsymbol);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
}

fn write_aggregate_header(tsymbol: u8, len: usize, out: &mut Vec<u8>) {
    out.push(tsymbol);
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Format a double for the wire. See [`crate::util::format_f64`]
pub fn format_double(d: f64) -> String {
    format_f64(d)
}
