/*
 * Created on Sun Feb 19 2023
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

use super::{
    serializer::{format_double, serialize_into},
    Deserializer, Element, ParseError, ProtocolVersion,
};

fn parse(buf: &[u8]) -> Result<(Element, usize), ParseError> {
    Deserializer::new(buf).parse()
}

fn parse_one(buf: &[u8]) -> Element {
    let (element, consumed) = parse(buf).unwrap();
    assert_eq!(consumed, buf.len(), "parser left bytes behind");
    element
}

fn ser(element: &Element, proto: ProtocolVersion) -> Vec<u8> {
    let mut out = Vec::new();
    serialize_into(element, proto, &mut out);
    out
}

#[test]
fn parse_simple_string() {
    assert_eq!(parse_one(b"+OK\r\n"), Element::SimpleString(b"OK".to_vec()));
    assert_eq!(parse_one(b"+\r\n"), Element::SimpleString(vec![]));
}

#[test]
fn parse_error() {
    assert_eq!(
        parse_one(b"-ERR unknown command 'FOO'\r\n"),
        Element::Error("ERR unknown command 'FOO'".to_owned())
    );
}

#[test]
fn parse_integer() {
    assert_eq!(parse_one(b":1024\r\n"), Element::Integer(1024));
    assert_eq!(parse_one(b":-42\r\n"), Element::Integer(-42));
    assert_eq!(
        parse_one(b":9223372036854775807\r\n"),
        Element::Integer(i64::MAX)
    );
}

#[test]
fn parse_integer_rejects_garbage() {
    assert!(matches!(parse(b":\r\n"), Err(ParseError::Protocol(_))));
    assert!(matches!(parse(b": 1\r\n"), Err(ParseError::Protocol(_))));
    assert!(matches!(parse(b":1 \r\n"), Err(ParseError::Protocol(_))));
    assert!(matches!(parse(b":12a\r\n"), Err(ParseError::Protocol(_))));
    // one past i64::MAX
    assert!(matches!(
        parse(b":9223372036854775808\r\n"),
        Err(ParseError::Protocol(_))
    ));
}

#[test]
fn parse_bulk_string() {
    assert_eq!(
        parse_one(b"$5\r\nhello\r\n"),
        Element::BulkString(b"hello".to_vec())
    );
    assert_eq!(parse_one(b"$0\r\n\r\n"), Element::BulkString(vec![]));
    assert_eq!(parse_one(b"$-1\r\n"), Element::NilBulk);
}

#[test]
fn parse_bulk_string_binary_safe() {
    assert_eq!(
        parse_one(b"$6\r\n\x00\xff\r\n\x01a\r\n"),
        Element::BulkString(b"\x00\xff\r\n\x01a".to_vec())
    );
}

#[test]
fn parse_bulk_negative_length_is_error_not_panic() {
    assert!(matches!(parse(b"$-2\r\n"), Err(ParseError::Protocol(_))));
    assert!(matches!(parse(b"$-100\r\n"), Err(ParseError::Protocol(_))));
    assert!(matches!(parse(b"*-2\r\n"), Err(ParseError::Protocol(_))));
}

#[test]
fn parse_bulk_missing_terminator() {
    assert!(matches!(
        parse(b"$5\r\nhelloXX"),
        Err(ParseError::Protocol(_))
    ));
}

#[test]
fn parse_array() {
    assert_eq!(
        parse_one(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"),
        Element::Array(vec![
            Element::BulkString(b"GET".to_vec()),
            Element::BulkString(b"foo".to_vec()),
        ])
    );
    assert_eq!(parse_one(b"*0\r\n"), Element::Array(vec![]));
    assert_eq!(parse_one(b"*-1\r\n"), Element::NilArray);
}

#[test]
fn parse_nested_array() {
    assert_eq!(
        parse_one(b"*2\r\n*1\r\n:1\r\n+ok\r\n"),
        Element::Array(vec![
            Element::Array(vec![Element::Integer(1)]),
            Element::SimpleString(b"ok".to_vec()),
        ])
    );
}

#[test]
fn parse_resp3_scalars() {
    assert_eq!(parse_one(b"_\r\n"), Element::Null);
    assert_eq!(parse_one(b"#t\r\n"), Element::Boolean(true));
    assert_eq!(parse_one(b"#f\r\n"), Element::Boolean(false));
    assert_eq!(parse_one(b",3.25\r\n"), Element::Double(3.25));
    assert_eq!(parse_one(b",inf\r\n"), Element::Double(f64::INFINITY));
    assert_eq!(
        parse_one(b"(3492890328409238509324850943850943825024385\r\n"),
        Element::BigNumber("3492890328409238509324850943850943825024385".to_owned())
    );
}

#[test]
fn parse_resp3_aggregates() {
    assert_eq!(
        parse_one(b"%1\r\n+proto\r\n:3\r\n"),
        Element::Map(vec![(
            Element::SimpleString(b"proto".to_vec()),
            Element::Integer(3)
        )])
    );
    assert_eq!(
        parse_one(b"~2\r\n:1\r\n:2\r\n"),
        Element::Set(vec![Element::Integer(1), Element::Integer(2)])
    );
    assert_eq!(
        parse_one(b">2\r\n+message\r\n+hi\r\n"),
        Element::Push(vec![
            Element::SimpleString(b"message".to_vec()),
            Element::SimpleString(b"hi".to_vec()),
        ])
    );
    assert_eq!(
        parse_one(b"=15\r\ntxt:Some string\r\n"),
        Element::VerbatimString(*b"txt", b"Some string".to_vec())
    );
}

#[test]
fn parse_unknown_type_byte() {
    assert!(matches!(parse(b"@5\r\n"), Err(ParseError::Protocol(_))));
}

#[test]
fn parse_lone_lf_rejected() {
    assert!(matches!(parse(b"+OK\n"), Err(ParseError::Protocol(_))));
    assert!(matches!(parse(b":12\n"), Err(ParseError::Protocol(_))));
}

#[test]
fn parse_incomplete_returns_not_enough() {
    for case in [
        &b"+OK"[..],
        b"$5\r\nhel",
        b"$5\r\nhello",
        b"*2\r\n$3\r\nGET\r\n",
        b":12",
        b"*1\r\n",
        b"%1\r\n+k\r\n",
    ] {
        assert!(
            matches!(parse(case), Err(ParseError::NotEnough)),
            "case {case:?}"
        );
    }
}

#[test]
fn parse_reports_consumed_for_pipelining() {
    let buf = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
    let (element, consumed) = parse(buf).unwrap();
    assert_eq!(
        element,
        Element::Array(vec![Element::BulkString(b"PING".to_vec())])
    );
    assert_eq!(consumed, 14);
    let (element2, consumed2) = parse(&buf[consumed..]).unwrap();
    assert_eq!(element2, element);
    assert_eq!(consumed2, 14);
}

#[test]
fn parse_nesting_bomb_rejected() {
    let mut buf = Vec::new();
    for _ in 0..64 {
        buf.extend_from_slice(b"*1\r\n");
    }
    buf.extend_from_slice(b":1\r\n");
    assert!(matches!(parse(&buf), Err(ParseError::Protocol(_))));
}

#[test]
fn serialize_resp2_basics() {
    assert_eq!(ser(&Element::ok(), ProtocolVersion::V2), b"+OK\r\n");
    assert_eq!(
        ser(&Element::err("ERR oops"), ProtocolVersion::V2),
        b"-ERR oops\r\n"
    );
    assert_eq!(ser(&Element::Integer(7), ProtocolVersion::V2), b":7\r\n");
    assert_eq!(
        ser(&Element::bulk(*b"bar"), ProtocolVersion::V2),
        b"$3\r\nbar\r\n"
    );
    assert_eq!(ser(&Element::NilBulk, ProtocolVersion::V2), b"$-1\r\n");
    assert_eq!(ser(&Element::NilArray, ProtocolVersion::V2), b"*-1\r\n");
}

#[test]
fn serialize_resp3_nils() {
    assert_eq!(ser(&Element::NilBulk, ProtocolVersion::V3), b"_\r\n");
    assert_eq!(ser(&Element::NilArray, ProtocolVersion::V3), b"_\r\n");
    assert_eq!(ser(&Element::Null, ProtocolVersion::V3), b"_\r\n");
}

#[test]
fn serialize_map_downgrades_on_resp2() {
    let map = Element::Map(vec![(
        Element::bulk(*b"f1"),
        Element::bulk(*b"v1"),
    )]);
    assert_eq!(
        ser(&map, ProtocolVersion::V2),
        b"*2\r\n$2\r\nf1\r\n$2\r\nv1\r\n"
    );
    assert_eq!(
        ser(&map, ProtocolVersion::V3),
        b"%1\r\n$2\r\nf1\r\n$2\r\nv1\r\n"
    );
}

#[test]
fn serialize_push_and_bool_downgrade() {
    let push = Element::Push(vec![Element::bulk(*b"message")]);
    assert_eq!(ser(&push, ProtocolVersion::V2), b"*1\r\n$7\r\nmessage\r\n");
    assert_eq!(ser(&push, ProtocolVersion::V3), b">1\r\n$7\r\nmessage\r\n");
    assert_eq!(ser(&Element::Boolean(true), ProtocolVersion::V2), b":1\r\n");
    assert_eq!(ser(&Element::Boolean(true), ProtocolVersion::V3), b"#t\r\n");
}

#[test]
fn serialize_double() {
    assert_eq!(ser(&Element::Double(3.25), ProtocolVersion::V3), b",3.25\r\n");
    assert_eq!(ser(&Element::Double(10.0), ProtocolVersion::V3), b",10\r\n");
    assert_eq!(
        ser(&Element::Double(3.25), ProtocolVersion::V2),
        b"$4\r\n3.25\r\n"
    );
}

#[test]
fn double_formatting() {
    assert_eq!(format_double(10.0), "10");
    assert_eq!(format_double(-3.0), "-3");
    assert_eq!(format_double(3.5), "3.5");
    assert_eq!(format_double(f64::INFINITY), "inf");
    assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    // no trailing zeros ever
    assert_eq!(format_double(10.5), "10.5");
    assert_eq!(format_double(0.1), "0.1");
}

#[test]
fn round_trip() {
    // every non-Map/Set/Push element must round-trip exactly on RESP3
    let samples = vec![
        Element::SimpleString(b"OK".to_vec()),
        Element::Error("ERR nope".to_owned()),
        Element::Integer(-123456),
        Element::BulkString(b"\x00\x01\xfe\xff".to_vec()),
        Element::BulkString(vec![]),
        Element::Array(vec![
            Element::Integer(1),
            Element::BulkString(b"two".to_vec()),
            Element::Array(vec![Element::SimpleString(b"three".to_vec())]),
        ]),
        Element::Null,
        Element::Boolean(false),
        Element::Double(2.5),
        Element::BigNumber("123456789012345678901234567890".to_owned()),
        Element::BulkError("SOMEERR deep".to_owned()),
        Element::VerbatimString(*b"txt", b"verbatim".to_vec()),
    ];
    for sample in samples {
        let bytes = ser(&sample, ProtocolVersion::V3);
        let (parsed, consumed) = parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, sample, "failed for {sample:?}");
    }
}
