/*
 * Created on Sat Jun 17 2023
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
    super::{eval, evalsha, script_command, sha1_hex, ScriptCache},
    crate::{
        actions::ExecCtx,
        dbnet::Terminator,
        protocol::{Element, ProtocolVersion},
        storage::{memory::MemoryEngine, DataOps, OpsHandle},
    },
    bytes::Bytes,
    std::sync::Arc,
    tokio::sync::broadcast,
};

struct Env {
    cache: ScriptCache,
    ctx: ExecCtx,
    engine: Arc<MemoryEngine>,
    _signal: broadcast::Sender<()>,
}

fn env() -> Env {
    let engine = Arc::new(MemoryEngine::new());
    let (tx, rx) = broadcast::channel(1);
    Env {
        cache: ScriptCache::new(),
        ctx: ExecCtx::new(
            OpsHandle::Root(engine.clone()),
            Terminator::new(rx),
            ProtocolVersion::V2,
        ),
        engine,
        _signal: tx,
    }
}

fn args(parts: &[&[u8]]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
}

async fn run(env: &Env, script: &[u8], tail: &[&[u8]]) -> Element {
    let mut full: Vec<&[u8]> = vec![script];
    full.extend_from_slice(tail);
    eval(&env.cache, &env.ctx, &args(&full)).await.unwrap()
}

fn bulk(s: &[u8]) -> Element {
    Element::BulkString(s.to_vec())
}

#[tokio::test]
async fn return_scalar_conversions() {
    let e = env();
    assert_eq!(run(&e, b"return 1", &[b"0"]).await, Element::Integer(1));
    assert_eq!(run(&e, b"return 'str'", &[b"0"]).await, bulk(b"str"));
    assert_eq!(run(&e, b"return true", &[b"0"]).await, Element::Integer(1));
    assert_eq!(run(&e, b"return false", &[b"0"]).await, Element::NilBulk);
    assert_eq!(run(&e, b"return nil", &[b"0"]).await, Element::NilBulk);
    // integer-valued numbers become integers, fractional ones become bulks
    assert_eq!(run(&e, b"return 2 + 2.0", &[b"0"]).await, Element::Integer(4));
    assert_eq!(run(&e, b"return 3.5", &[b"0"]).await, bulk(b"3.5"));
}

#[tokio::test]
async fn return_table_conversions() {
    let e = env();
    assert_eq!(
        run(&e, b"return {1, 'two', 3}", &[b"0"]).await,
        Element::Array(vec![
            Element::Integer(1),
            bulk(b"two"),
            Element::Integer(3)
        ])
    );
    // the array stops at the first nil
    assert_eq!(
        run(&e, b"return {1, nil, 3}", &[b"0"]).await,
        Element::Array(vec![Element::Integer(1)])
    );
    assert_eq!(
        run(&e, b"return {err='MYERR boom'}", &[b"0"]).await,
        Element::Error("MYERR boom".to_owned())
    );
    assert_eq!(
        run(&e, b"return {ok='FINE'}", &[b"0"]).await,
        Element::SimpleString(b"FINE".to_vec())
    );
    assert_eq!(
        run(&e, b"return redis.error_reply('bad thing')", &[b"0"]).await,
        Element::Error("bad thing".to_owned())
    );
    assert_eq!(
        run(&e, b"return redis.status_reply('GOOD')", &[b"0"]).await,
        Element::SimpleString(b"GOOD".to_vec())
    );
}

#[tokio::test]
async fn keys_and_argv_are_one_indexed() {
    let e = env();
    assert_eq!(
        run(
            &e,
            b"return {KEYS[1], KEYS[2], ARGV[1], #KEYS, #ARGV}",
            &[b"2", b"k1", b"k2", b"a1"]
        )
        .await,
        Element::Array(vec![
            bulk(b"k1"),
            bulk(b"k2"),
            bulk(b"a1"),
            Element::Integer(2),
            Element::Integer(1)
        ])
    );
}

#[tokio::test]
async fn call_reaches_storage() {
    let e = env();
    e.engine
        .set(b"foo", b"bar".to_vec(), None, false)
        .await
        .unwrap();
    assert_eq!(
        run(&e, b"return redis.call('GET', KEYS[1])", &[b"1", b"foo"]).await,
        bulk(b"bar")
    );
    assert_eq!(
        run(
            &e,
            b"redis.call('SET', KEYS[1], ARGV[1]) return redis.call('GET', KEYS[1])",
            &[b"1", b"dst", b"42"]
        )
        .await,
        bulk(b"42")
    );
    // numbers flow through as decimal strings
    assert_eq!(
        run(&e, b"return redis.call('INCRBY', KEYS[1], 5)", &[b"1", b"n"]).await,
        Element::Integer(5)
    );
    // nil bulk converts to false, so a missing key reads falsy
    assert_eq!(
        run(
            &e,
            b"if redis.call('GET', 'ghost') then return 1 else return 0 end",
            &[b"0"]
        )
        .await,
        Element::Integer(0)
    );
}

#[tokio::test]
async fn call_aborts_on_error_pcall_returns_it() {
    let e = env();
    // wrong arity through redis.call aborts the whole script
    let reply = run(&e, b"redis.call('SET') return 'unreached'", &[b"0"]).await;
    match reply {
        Element::Error(e) => assert!(
            e.contains("wrong number of arguments"),
            "unexpected abort message `{e}`"
        ),
        other => panic!("expected an abort, got {other:?}"),
    }
    // and no side effect happened
    assert_eq!(e.engine.db_size().await.unwrap(), 0);
    // pcall hands the error to the script as {err=..}
    let reply = run(
        &e,
        b"local r = redis.pcall('SET') return r.err",
        &[b"0"],
    )
    .await;
    match reply {
        Element::BulkString(message) => {
            let message = String::from_utf8_lossy(&message);
            assert!(message.contains("wrong number of arguments"));
        }
        other => panic!("expected the error text, got {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_verbs_abort_with_no_side_effect() {
    let e = env();
    for verb in ["SUBSCRIBE", "PUBLISH", "MULTI", "EXEC", "WATCH", "EVAL", "SCRIPT"] {
        let script = format!("return redis.call('{verb}')");
        let reply = run(&e, script.as_bytes(), &[b"0"]).await;
        match reply {
            Element::Error(e) => assert!(
                e.contains("not allowed from a script"),
                "verb {verb}: unexpected error `{e}`"
            ),
            other => panic!("verb {verb}: expected an error, got {other:?}"),
        }
    }
    assert_eq!(e.engine.db_size().await.unwrap(), 0);
}

#[tokio::test]
async fn sha1hex_and_cache_round_trip() {
    let e = env();
    assert_eq!(
        run(&e, b"return redis.sha1hex('abc')", &[b"0"]).await,
        bulk(b"a9993e364706816aba3e25717850c26c9cd0d89d")
    );
    let source: &[u8] = b"return 'cached'";
    let sha = sha1_hex(source);
    // EVAL populates the cache implicitly
    assert_eq!(run(&e, source, &[b"0"]).await, bulk(b"cached"));
    let via_sha = evalsha(&e.cache, &e.ctx, &args(&[sha.as_bytes(), b"0"]))
        .await
        .unwrap();
    assert_eq!(via_sha, bulk(b"cached"));
}

#[tokio::test]
async fn evalsha_unknown_is_noscript() {
    let e = env();
    let reply = evalsha(
        &e.cache,
        &e.ctx,
        &args(&[b"deadbeefdeadbeefdeadbeefdeadbeefdeadbeef", b"0"]),
    )
    .await
    .unwrap_err()
    .into_element();
    match reply {
        Element::Error(e) => assert!(e.starts_with("NOSCRIPT")),
        other => panic!("expected NOSCRIPT, got {other:?}"),
    }
}

#[tokio::test]
async fn script_subcommands() {
    let e = env();
    let sha = match script_command(&e.cache, &args(&[b"LOAD", b"return 7"]))
        .await
        .unwrap()
    {
        Element::BulkString(sha) => sha,
        other => panic!("unexpected SCRIPT LOAD reply {other:?}"),
    };
    assert_eq!(sha.len(), 40);
    assert_eq!(
        script_command(&e.cache, &args(&[b"EXISTS", &sha, b"00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff"]))
            .await
            .unwrap(),
        Element::Array(vec![Element::Integer(1), Element::Integer(0)])
    );
    assert_eq!(
        evalsha(&e.cache, &e.ctx, &args(&[&sha, b"0"])).await.unwrap(),
        Element::Integer(7)
    );
    assert_eq!(
        script_command(&e.cache, &args(&[b"FLUSH", b"ASYNC"]))
            .await
            .unwrap(),
        Element::ok()
    );
    assert_eq!(
        script_command(&e.cache, &args(&[b"EXISTS", &sha]))
            .await
            .unwrap(),
        Element::Array(vec![Element::Integer(0)])
    );
    let kill = script_command(&e.cache, &args(&[b"KILL"]))
        .await
        .unwrap_err()
        .into_element();
    match kill {
        Element::Error(e) => assert!(e.starts_with("NOTBUSY")),
        other => panic!("expected NOTBUSY, got {other:?}"),
    }
}

#[tokio::test]
async fn numkeys_validation() {
    let e = env();
    let err = eval(&e.cache, &e.ctx, &args(&[b"return 1", b"-1"]))
        .await
        .unwrap_err()
        .into_element();
    match err {
        Element::Error(e) => assert!(e.contains("can't be negative")),
        other => panic!("unexpected reply {other:?}"),
    }
    let err = eval(&e.cache, &e.ctx, &args(&[b"return 1", b"3", b"only-one"]))
        .await
        .unwrap_err()
        .into_element();
    match err {
        Element::Error(e) => assert!(e.contains("greater than number of args")),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn lua_runtime_errors_are_wrapped() {
    let e = env();
    let reply = run(&e, b"this is not lua", &[b"0"]).await;
    match reply {
        Element::Error(e) => assert!(e.starts_with("ERR Error running script")),
        other => panic!("expected a script error, got {other:?}"),
    }
}
