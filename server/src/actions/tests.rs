/*
 * Created on Thu Jun 01 2023
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
    super::{bitmaps, hashes, hll, keys, lists, server, sets, strings, zsets, ExecCtx},
    crate::{
        dbnet::Terminator,
        protocol::{Element, ProtocolVersion},
        queryengine::run_data_command,
        storage::{memory::MemoryEngine, OpsHandle},
    },
    bytes::Bytes,
    std::sync::Arc,
    tokio::sync::broadcast,
};

/// A context over a fresh engine. The broadcast sender must outlive the
/// context or blocking pops would see a shutdown
fn fresh() -> (ExecCtx, broadcast::Sender<()>) {
    let (tx, rx) = broadcast::channel(1);
    let ctx = ExecCtx::new(
        OpsHandle::Root(Arc::new(MemoryEngine::new())),
        Terminator::new(rx),
        ProtocolVersion::V2,
    );
    (ctx, tx)
}

fn args(parts: &[&[u8]]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
}

macro_rules! a {
    ($($part:expr),*) => {
        &args(&[$($part.as_ref()),*])
    };
}

fn bulk(s: &[u8]) -> Element {
    Element::BulkString(s.to_vec())
}

fn int(i: i64) -> Element {
    Element::Integer(i)
}

fn assert_err_starts(result: super::ActionResult<Element>, prefix: &str) {
    match result.map_err(super::ActionError::into_element) {
        Err(Element::Error(e)) | Ok(Element::Error(e)) => {
            assert!(e.starts_with(prefix), "error `{e}` missing prefix `{prefix}`")
        }
        other => panic!("expected error starting with `{prefix}`, got {other:?}"),
    }
}

#[tokio::test]
async fn arity_gate_fires_before_storage() {
    let (ctx, _sig) = fresh();
    assert_err_starts(
        strings::get(&ctx, a!["k", "extra"]).await,
        "ERR wrong number of arguments for 'get'",
    );
    assert_err_starts(
        strings::set(&ctx, a!["only-key"]).await,
        "ERR wrong number of arguments for 'set'",
    );
    // nothing was written
    assert_eq!(ctx.ops().db_size().await.unwrap(), 0);
}

#[tokio::test]
async fn set_get_roundtrip_and_missing_nil() {
    let (ctx, _sig) = fresh();
    assert_eq!(strings::set(&ctx, a!["foo", "bar"]).await.unwrap(), Element::ok());
    assert_eq!(strings::get(&ctx, a!["foo"]).await.unwrap(), bulk(b"bar"));
    assert_eq!(
        strings::get(&ctx, a!["missing"]).await.unwrap(),
        Element::NilBulk
    );
}

#[tokio::test]
async fn set_binary_payload_survives() {
    let (ctx, _sig) = fresh();
    let payload: &[u8] = b"\x00\xff\r\n\x01binary";
    strings::set(&ctx, a!["k", payload]).await.unwrap();
    assert_eq!(strings::get(&ctx, a!["k"]).await.unwrap(), bulk(payload));
}

#[tokio::test]
async fn set_nx_xx_get_flags() {
    let (ctx, _sig) = fresh();
    assert_eq!(
        strings::set(&ctx, a!["k", "v1", "NX"]).await.unwrap(),
        Element::ok()
    );
    assert_eq!(
        strings::set(&ctx, a!["k", "v2", "nx"]).await.unwrap(),
        Element::NilBulk
    );
    assert_eq!(
        strings::set(&ctx, a!["k", "v2", "XX", "GET"]).await.unwrap(),
        bulk(b"v1")
    );
    assert_eq!(
        strings::set(&ctx, a!["other", "x", "XX"]).await.unwrap(),
        Element::NilBulk
    );
    assert_err_starts(
        strings::set(&ctx, a!["k", "v", "NX", "XX"]).await,
        "ERR syntax error",
    );
}

#[tokio::test]
async fn set_with_expiry_and_ttl_sentinels() {
    let (ctx, _sig) = fresh();
    assert_eq!(keys::ttl(&ctx, a!["k"]).await.unwrap(), int(-2));
    strings::set(&ctx, a!["k", "v"]).await.unwrap();
    assert_eq!(keys::ttl(&ctx, a!["k"]).await.unwrap(), int(-1));
    strings::set(&ctx, a!["k", "v", "EX", "100"]).await.unwrap();
    match keys::ttl(&ctx, a!["k"]).await.unwrap() {
        Element::Integer(ttl) => assert!((99..=100).contains(&ttl)),
        other => panic!("unexpected ttl reply {other:?}"),
    }
    assert_eq!(keys::persist(&ctx, a!["k"]).await.unwrap(), int(1));
    assert_eq!(keys::ttl(&ctx, a!["k"]).await.unwrap(), int(-1));
    assert_err_starts(
        strings::set(&ctx, a!["k", "v", "EX", "0"]).await,
        "ERR invalid expire time",
    );
}

#[tokio::test]
async fn incr_family() {
    let (ctx, _sig) = fresh();
    assert_eq!(strings::incr(&ctx, a!["counter"]).await.unwrap(), int(1));
    assert_eq!(
        strings::incrby(&ctx, a!["counter", "10"]).await.unwrap(),
        int(11)
    );
    assert_eq!(strings::decr(&ctx, a!["counter"]).await.unwrap(), int(10));
    assert_eq!(
        strings::decrby(&ctx, a!["counter", "4"]).await.unwrap(),
        int(6)
    );
    strings::set(&ctx, a!["counter", "hi"]).await.unwrap();
    assert_err_starts(
        strings::incr(&ctx, a!["counter"]).await,
        "ERR value is not an integer or out of range",
    );
}

#[tokio::test]
async fn incrbyfloat_minimal_repr() {
    let (ctx, _sig) = fresh();
    assert_eq!(
        strings::incrbyfloat(&ctx, a!["f", "10.5"]).await.unwrap(),
        bulk(b"10.5")
    );
    assert_eq!(
        strings::incrbyfloat(&ctx, a!["f", "0.5"]).await.unwrap(),
        bulk(b"11")
    );
    assert_err_starts(
        strings::incrbyfloat(&ctx, a!["f", "nan"]).await,
        "ERR value is not a valid float",
    );
}

#[tokio::test]
async fn expire_with_nonpositive_ttl_deletes() {
    let (ctx, _sig) = fresh();
    strings::set(&ctx, a!["k", "v"]).await.unwrap();
    assert_eq!(keys::expire(&ctx, a!["k", "-1"]).await.unwrap(), int(1));
    assert_eq!(strings::get(&ctx, a!["k"]).await.unwrap(), Element::NilBulk);
}

#[tokio::test]
async fn keys_and_scan_pagination() {
    let (ctx, _sig) = fresh();
    for i in 0..25 {
        strings::set(&ctx, a![format!("key:{i:02}"), "v"]).await.unwrap();
    }
    strings::set(&ctx, a!["other", "v"]).await.unwrap();
    match keys::keys(&ctx, a!["key:*"]).await.unwrap() {
        Element::Array(found) => assert_eq!(found.len(), 25),
        other => panic!("unexpected KEYS reply {other:?}"),
    }
    // walk the cursor to the end
    let mut cursor = b"0".to_vec();
    let mut seen = 0;
    loop {
        let reply = keys::scan(
            &ctx,
            a![cursor, "MATCH", "key:*", "COUNT", "10"],
        )
        .await
        .unwrap();
        let Element::Array(parts) = reply else {
            panic!("unexpected SCAN reply")
        };
        let Element::BulkString(next) = &parts[0] else {
            panic!("bad cursor")
        };
        let Element::Array(page) = &parts[1] else {
            panic!("bad page")
        };
        seen += page.len();
        if next == b"0" {
            break;
        }
        cursor = next.clone();
    }
    assert_eq!(seen, 25);
}

#[tokio::test]
async fn type_rename_copy() {
    let (ctx, _sig) = fresh();
    strings::set(&ctx, a!["s", "v"]).await.unwrap();
    lists::rpush(&ctx, a!["l", "x"]).await.unwrap();
    assert_eq!(
        keys::key_type(&ctx, a!["s"]).await.unwrap(),
        Element::simple("string")
    );
    assert_eq!(
        keys::key_type(&ctx, a!["l"]).await.unwrap(),
        Element::simple("list")
    );
    assert_eq!(
        keys::key_type(&ctx, a!["none"]).await.unwrap(),
        Element::simple("none")
    );
    assert_err_starts(keys::rename(&ctx, a!["ghost", "x"]).await, "ERR no such key");
    assert_eq!(keys::copy(&ctx, a!["s", "s2"]).await.unwrap(), int(1));
    assert_eq!(
        keys::copy(&ctx, a!["s", "s2", "DB", "1"]).await.map_err(super::ActionError::into_element),
        Err(Element::Error(
            crate::protocol::responses::groups::E_SELECT_INVALID_DB.to_owned()
        ))
    );
}

#[tokio::test]
async fn wrongtype_error_shape() {
    let (ctx, _sig) = fresh();
    lists::rpush(&ctx, a!["l", "x"]).await.unwrap();
    assert_err_starts(strings::get(&ctx, a!["l"]).await, "WRONGTYPE");
    assert_err_starts(hashes::hget(&ctx, a!["l", "f"]).await, "WRONGTYPE");
}

#[tokio::test]
async fn hgetall_shape_follows_protocol() {
    let (mut ctx, _sig) = fresh();
    hashes::hset(&ctx, a!["h", "f1", "v1"]).await.unwrap();
    assert_eq!(
        hashes::hgetall(&ctx, a!["h"]).await.unwrap(),
        Element::Array(vec![bulk(b"f1"), bulk(b"v1")])
    );
    ctx.proto = ProtocolVersion::V3;
    assert_eq!(
        hashes::hgetall(&ctx, a!["h"]).await.unwrap(),
        Element::Map(vec![(bulk(b"f1"), bulk(b"v1"))])
    );
}

#[tokio::test]
async fn hash_counters() {
    let (ctx, _sig) = fresh();
    assert_eq!(
        hashes::hincrby(&ctx, a!["h", "n", "5"]).await.unwrap(),
        int(5)
    );
    assert_eq!(
        hashes::hincrbyfloat(&ctx, a!["h", "n", "0.5"]).await.unwrap(),
        bulk(b"5.5")
    );
    assert_eq!(hashes::hlen(&ctx, a!["h"]).await.unwrap(), int(1));
    assert_eq!(
        hashes::hmget(&ctx, a!["h", "n", "ghost"]).await.unwrap(),
        Element::Array(vec![bulk(b"5.5"), Element::NilBulk])
    );
}

#[tokio::test]
async fn list_family_basics() {
    let (ctx, _sig) = fresh();
    lists::rpush(&ctx, a!["l", "a", "b", "c"]).await.unwrap();
    assert_eq!(
        lists::lrange(&ctx, a!["l", "0", "-1"]).await.unwrap(),
        Element::Array(vec![bulk(b"a"), bulk(b"b"), bulk(b"c")])
    );
    assert_eq!(
        lists::lpos(&ctx, a!["l", "b"]).await.unwrap(),
        int(1)
    );
    assert_eq!(
        lists::lpos(&ctx, a!["l", "nope"]).await.unwrap(),
        Element::NilBulk
    );
    assert_eq!(
        lists::rpoplpush(&ctx, a!["l", "dst"]).await.unwrap(),
        bulk(b"c")
    );
    assert_eq!(lists::llen(&ctx, a!["dst"]).await.unwrap(), int(1));
    assert_eq!(
        lists::lpop(&ctx, a!["l", "2"]).await.unwrap(),
        Element::Array(vec![bulk(b"a"), bulk(b"b")])
    );
    assert_eq!(
        lists::lpop(&ctx, a!["l"]).await.unwrap(),
        Element::NilBulk
    );
}

#[tokio::test]
async fn blpop_returns_immediately_on_hit() {
    let (ctx, _sig) = fresh();
    lists::rpush(&ctx, a!["q", "job"]).await.unwrap();
    assert_eq!(
        lists::blpop(&ctx, a!["empty", "q", "0"]).await.unwrap(),
        Element::Array(vec![bulk(b"q"), bulk(b"job")])
    );
}

#[tokio::test(start_paused = true)]
async fn blpop_timeout_expires() {
    let (ctx, _sig) = fresh();
    let started = tokio::time::Instant::now();
    let reply = lists::blpop(&ctx, a!["empty", "0.2"]).await.unwrap();
    assert_eq!(reply, Element::NilArray);
    let waited = started.elapsed();
    assert!(
        waited >= std::time::Duration::from_millis(200),
        "gave up after {waited:?}"
    );
    assert!(
        waited < std::time::Duration::from_millis(300),
        "overslept: {waited:?}"
    );
}

#[tokio::test]
async fn blpop_negative_timeout_rejected() {
    let (ctx, _sig) = fresh();
    assert_err_starts(
        lists::blpop(&ctx, a!["q", "-1"]).await,
        "ERR timeout is negative",
    );
}

#[tokio::test]
async fn set_family_algebra() {
    let (ctx, _sig) = fresh();
    sets::sadd(&ctx, a!["a", "1", "2", "3"]).await.unwrap();
    sets::sadd(&ctx, a!["b", "2", "3", "4"]).await.unwrap();
    assert_eq!(
        sets::sinter(&ctx, a!["a", "b"]).await.unwrap(),
        Element::Array(vec![bulk(b"2"), bulk(b"3")])
    );
    assert_eq!(
        sets::sdiff(&ctx, a!["a", "b"]).await.unwrap(),
        Element::Array(vec![bulk(b"1")])
    );
    assert_eq!(
        sets::sunionstore(&ctx, a!["dst", "a", "b"]).await.unwrap(),
        int(4)
    );
    assert_eq!(sets::scard(&ctx, a!["dst"]).await.unwrap(), int(4));
    assert_eq!(
        sets::smismember(&ctx, a!["a", "1", "9"]).await.unwrap(),
        Element::Array(vec![int(1), int(0)])
    );
}

#[tokio::test]
async fn zset_range_scenario() {
    let (ctx, _sig) = fresh();
    assert_eq!(
        zsets::zadd(&ctx, a!["z", "1", "one", "2", "two", "3", "three"])
            .await
            .unwrap(),
        int(3)
    );
    assert_eq!(
        zsets::zrange(&ctx, a!["z", "0", "-1", "WITHSCORES"])
            .await
            .unwrap(),
        Element::Array(vec![
            bulk(b"one"),
            bulk(b"1"),
            bulk(b"two"),
            bulk(b"2"),
            bulk(b"three"),
            bulk(b"3"),
        ])
    );
    // exclusive lower bound, +inf upper, LIMIT 0 1
    assert_eq!(
        zsets::zrangebyscore(&ctx, a!["z", "(1", "+inf", "LIMIT", "0", "1"])
            .await
            .unwrap(),
        Element::Array(vec![bulk(b"two")])
    );
    assert_eq!(
        zsets::zrank(&ctx, a!["z", "three"]).await.unwrap(),
        int(2)
    );
    assert_eq!(
        zsets::zrevrank(&ctx, a!["z", "three"]).await.unwrap(),
        int(0)
    );
    assert_eq!(
        zsets::zcount(&ctx, a!["z", "1", "2"]).await.unwrap(),
        int(2)
    );
}

#[tokio::test]
async fn zset_pop_and_algebra() {
    let (ctx, _sig) = fresh();
    zsets::zadd(&ctx, a!["z1", "1", "a", "2", "b"]).await.unwrap();
    zsets::zadd(&ctx, a!["z2", "10", "b", "20", "c"]).await.unwrap();
    assert_eq!(
        zsets::zunionstore(&ctx, a!["dst", "2", "z1", "z2"]).await.unwrap(),
        int(3)
    );
    assert_eq!(
        zsets::zscore(&ctx, a!["dst", "b"]).await.unwrap(),
        bulk(b"12")
    );
    assert_eq!(
        zsets::zinterstore(&ctx, a!["dsti", "2", "z1", "z2", "AGGREGATE", "MAX"])
            .await
            .unwrap(),
        int(1)
    );
    assert_eq!(
        zsets::zscore(&ctx, a!["dsti", "b"]).await.unwrap(),
        bulk(b"10")
    );
    assert_eq!(
        zsets::zpopmax(&ctx, a!["z2"]).await.unwrap(),
        Element::Array(vec![bulk(b"c"), bulk(b"20")])
    );
}

#[tokio::test]
async fn zadd_flag_validation() {
    let (ctx, _sig) = fresh();
    assert_err_starts(
        zsets::zadd(&ctx, a!["z", "NX", "XX", "1", "m"]).await,
        "ERR GT, LT, and/or NX",
    );
    zsets::zadd(&ctx, a!["z", "1", "m"]).await.unwrap();
    zsets::zadd(&ctx, a!["z", "NX", "5", "m"]).await.unwrap();
    assert_eq!(zsets::zscore(&ctx, a!["z", "m"]).await.unwrap(), bulk(b"1"));
}

#[tokio::test]
async fn bitmap_family() {
    let (ctx, _sig) = fresh();
    assert_eq!(bitmaps::setbit(&ctx, a!["b", "7", "1"]).await.unwrap(), int(0));
    assert_eq!(bitmaps::getbit(&ctx, a!["b", "7"]).await.unwrap(), int(1));
    assert_eq!(bitmaps::getbit(&ctx, a!["b", "6"]).await.unwrap(), int(0));
    assert_eq!(strings::get(&ctx, a!["b"]).await.unwrap(), bulk(b"\x01"));
    assert_eq!(bitmaps::bitcount(&ctx, a!["b"]).await.unwrap(), int(1));
    strings::set(&ctx, a!["s", "foobar"]).await.unwrap();
    assert_eq!(bitmaps::bitcount(&ctx, a!["s"]).await.unwrap(), int(26));
    assert_eq!(
        bitmaps::bitcount(&ctx, a!["s", "1", "1"]).await.unwrap(),
        int(6)
    );
    assert_eq!(
        bitmaps::bitcount(&ctx, a!["s", "5", "30", "BIT"]).await.unwrap(),
        int(17)
    );
    assert_eq!(
        bitmaps::bitpos(&ctx, a!["s", "1"]).await.unwrap(),
        int(1)
    );
}

#[tokio::test]
async fn bitop_and_bitfield() {
    let (ctx, _sig) = fresh();
    strings::set(&ctx, a!["x", "abc"]).await.unwrap();
    strings::set(&ctx, a!["y", "abd"]).await.unwrap();
    assert_eq!(
        bitmaps::bitop(&ctx, a!["XOR", "dst", "x", "y"]).await.unwrap(),
        int(3)
    );
    assert_eq!(
        strings::get(&ctx, a!["dst"]).await.unwrap(),
        bulk(b"\x00\x00\x07")
    );
    assert_eq!(
        bitmaps::bitfield(
            &ctx,
            a!["bf", "SET", "u8", "#1", "255", "INCRBY", "u8", "#1", "10", "GET", "u8", "8"]
        )
        .await
        .unwrap(),
        Element::Array(vec![int(0), int(9), int(9)])
    );
    assert_err_starts(
        bitmaps::bitfield(&ctx, a!["bf", "GET", "u64", "0"]).await,
        "ERR Invalid bitfield type",
    );
}

#[tokio::test]
async fn hyperloglog_family() {
    let (ctx, _sig) = fresh();
    assert_eq!(
        hll::pfadd(&ctx, a!["p1", "a", "b"]).await.unwrap(),
        int(1)
    );
    assert_eq!(hll::pfadd(&ctx, a!["p1", "a"]).await.unwrap(), int(0));
    hll::pfadd(&ctx, a!["p2", "b", "c"]).await.unwrap();
    assert_eq!(hll::pfcount(&ctx, a!["p1", "p2"]).await.unwrap(), int(3));
    assert_eq!(hll::pfmerge(&ctx, a!["dst", "p1", "p2"]).await.unwrap(), Element::ok());
    assert_eq!(hll::pfcount(&ctx, a!["dst"]).await.unwrap(), int(3));
}

#[tokio::test]
async fn server_family() {
    let (ctx, _sig) = fresh();
    strings::set(&ctx, a!["k", "v"]).await.unwrap();
    assert_eq!(server::dbsize(&ctx, a![]).await.unwrap(), int(1));
    match server::info(&ctx, a![]).await.unwrap() {
        Element::BulkString(body) => {
            let body = String::from_utf8(body).unwrap();
            assert!(body.contains("# Server"));
            assert!(body.contains("# Stats"));
            assert!(body.contains("# Keyspace"));
            assert!(body.contains("db0:keys=1"));
        }
        other => panic!("unexpected INFO reply {other:?}"),
    }
    assert_eq!(server::flushall(&ctx, a![]).await.unwrap(), Element::ok());
    assert_eq!(server::dbsize(&ctx, a![]).await.unwrap(), int(0));
}

#[tokio::test]
async fn dispatch_is_case_insensitive() {
    let (ctx, _sig) = fresh();
    for spelling in ["SET", "set", "SeT"] {
        let result = run_data_command(&ctx, &spelling.to_ascii_uppercase(), a!["k", "v"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Element::ok());
    }
    assert!(run_data_command(&ctx, "NOTACOMMAND", a![]).await.is_none());
}
