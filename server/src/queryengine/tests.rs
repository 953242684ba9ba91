/*
 * Created on Mon Jul 03 2023
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

//! End-to-end tests over an in-memory duplex socket: real frames in, real
//! frames out, through the full connection state machine

use {
    crate::{
        auth::AuthProvider,
        dbnet::{BufferedSocketStream, Connection, ConnectionHandler, ServerEnv},
        protocol::{Deserializer, Element, ParseError},
        pubsub::Hub,
        scripting::ScriptCache,
        storage::memory::MemoryEngine,
        dbnet::MAXIMUM_CONNECTION_LIMIT,
    },
    std::sync::Arc,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
        sync::{broadcast, mpsc, Semaphore},
    },
};

impl BufferedSocketStream for DuplexStream {}

/// A miniature server: shared env + shutdown plumbing, one handler task per
/// connected test client
struct Harness {
    env: ServerEnv,
    signal: broadcast::Sender<()>,
    climit: Arc<Semaphore>,
    terminate_tx: mpsc::Sender<()>,
}

impl Harness {
    fn new(password: Option<&str>) -> Self {
        let (signal, _) = broadcast::channel(1);
        let (terminate_tx, _terminate_rx) = mpsc::channel(1);
        let auth = match password {
            Some(password) => AuthProvider::new(password).unwrap(),
            None => AuthProvider::new_disabled(),
        };
        Self {
            env: ServerEnv {
                db: Arc::new(MemoryEngine::new()),
                hub: Arc::new(Hub::new()),
                scripts: Arc::new(ScriptCache::new()),
                auth,
                pubsub_enabled: true,
            },
            signal,
            climit: Arc::new(Semaphore::new(MAXIMUM_CONNECTION_LIMIT)),
            terminate_tx,
        }
    }
    fn connect(&self) -> TestClient {
        let (client, server) = tokio::io::duplex(1 << 16);
        let mut handler = ConnectionHandler::new(
            self.env.clone(),
            Connection::new(server),
            self.climit.clone(),
            self.signal.subscribe(),
            self.terminate_tx.clone(),
            "127.0.0.1:0".to_owned(),
        );
        tokio::spawn(async move {
            let _ = handler.run().await;
        });
        TestClient {
            stream: client,
            buffer: Vec::new(),
        }
    }
}

struct TestClient {
    stream: DuplexStream,
    buffer: Vec<u8>,
}

fn frame(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
    out
}

macro_rules! c {
    ($($part:expr),*) => {
        &[$($part.as_ref()),*][..]
    };
}

impl TestClient {
    async fn send(&mut self, parts: &[&[u8]]) {
        self.stream.write_all(&frame(parts)).await.unwrap();
    }
    async fn send_raw(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).await.unwrap();
    }
    /// Read exactly one reply element
    async fn recv(&mut self) -> Element {
        loop {
            if !self.buffer.is_empty() {
                match Deserializer::new(&self.buffer).parse() {
                    Ok((element, consumed)) => {
                        self.buffer.drain(..consumed);
                        return element;
                    }
                    Err(ParseError::NotEnough) => {}
                    Err(ParseError::Protocol(e)) => panic!("bad reply frame: {e}"),
                }
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n != 0, "server closed the connection unexpectedly");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
    async fn query(&mut self, parts: &[&[u8]]) -> Element {
        self.send(parts).await;
        self.recv().await
    }
    /// Expect the server to close (EOF), draining whatever it wrote last
    async fn expect_eof(&mut self) -> Vec<u8> {
        let mut tail = self.buffer.clone();
        loop {
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk).await {
                Ok(0) => return tail,
                Ok(n) => tail.extend_from_slice(&chunk[..n]),
                Err(_) => return tail,
            }
        }
    }
}

fn bulk(s: &[u8]) -> Element {
    Element::BulkString(s.to_vec())
}

fn ok() -> Element {
    Element::ok()
}

fn assert_error_contains(element: &Element, needle: &str) {
    match element {
        Element::Error(e) => assert!(e.contains(needle), "error `{e}` missing `{needle}`"),
        other => panic!("expected error containing `{needle}`, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_set_get_missing() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_eq!(client.query(c!["SET", "foo", "bar"]).await, ok());
    assert_eq!(client.query(c!["GET", "foo"]).await, bulk(b"bar"));
    assert_eq!(client.query(c!["GET", "missing"]).await, Element::NilBulk);
}

#[tokio::test]
async fn scenario_counter() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_eq!(client.query(c!["INCR", "counter"]).await, Element::Integer(1));
    assert_eq!(
        client.query(c!["INCRBY", "counter", "10"]).await,
        Element::Integer(11)
    );
    assert_eq!(client.query(c!["SET", "counter", "hi"]).await, ok());
    assert_error_contains(
        &client.query(c!["INCR", "counter"]).await,
        "value is not an integer or out of range",
    );
}

#[tokio::test]
async fn scenario_multi_exec() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_eq!(client.query(c!["MULTI"]).await, ok());
    assert_eq!(client.query(c!["SET", "a", "1"]).await, Element::queued());
    assert_eq!(client.query(c!["SET", "b", "2"]).await, Element::queued());
    assert_eq!(
        client.query(c!["EXEC"]).await,
        Element::Array(vec![ok(), ok()])
    );
    assert_eq!(client.query(c!["GET", "a"]).await, bulk(b"1"));
    assert_eq!(client.query(c!["GET", "b"]).await, bulk(b"2"));
}

#[tokio::test]
async fn multi_runtime_errors_do_not_abort() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.query(c!["RPUSH", "l", "x"]).await;
    client.query(c!["MULTI"]).await;
    client.query(c!["INCR", "l"]).await; // wrong type at run time
    client.query(c!["SET", "k", "v"]).await;
    let replies = client.query(c!["EXEC"]).await;
    match replies {
        Element::Array(replies) => {
            assert_error_contains(&replies[0], "WRONGTYPE");
            assert_eq!(replies[1], ok());
        }
        other => panic!("unexpected EXEC reply {other:?}"),
    }
    assert_eq!(client.query(c!["GET", "k"]).await, bulk(b"v"));
}

#[tokio::test]
async fn execabort_on_queue_time_error() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.query(c!["MULTI"]).await;
    assert_error_contains(
        &client.query(c!["NOTACOMMAND"]).await,
        "unknown command",
    );
    assert_eq!(client.query(c!["SET", "k", "v"]).await, Element::queued());
    assert_error_contains(&client.query(c!["EXEC"]).await, "EXECABORT");
    // the buffer is gone and nothing was written
    assert_eq!(client.query(c!["GET", "k"]).await, Element::NilBulk);
    assert_error_contains(&client.query(c!["EXEC"]).await, "EXEC without MULTI");
}

#[tokio::test]
async fn transaction_state_machine_edges() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_error_contains(&client.query(c!["DISCARD"]).await, "DISCARD without MULTI");
    client.query(c!["MULTI"]).await;
    assert_error_contains(&client.query(c!["MULTI"]).await, "MULTI calls can not be nested");
    assert_error_contains(
        &client.query(c!["WATCH", "k"]).await,
        "WATCH inside MULTI is not allowed",
    );
    assert_error_contains(
        &client.query(c!["SUBSCRIBE", "ch"]).await,
        "SUBSCRIBE is not allowed in transactions",
    );
    // the SUBSCRIBE attempt dirtied the transaction
    assert_error_contains(&client.query(c!["EXEC"]).await, "EXECABORT");
    // outside a transaction WATCH is an acknowledged no-op
    assert_eq!(client.query(c!["WATCH", "k"]).await, ok());
    assert_eq!(client.query(c!["UNWATCH"]).await, ok());
}

#[tokio::test]
async fn discard_drops_the_queue() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.query(c!["MULTI"]).await;
    client.query(c!["SET", "k", "v"]).await;
    assert_eq!(client.query(c!["DISCARD"]).await, ok());
    assert_eq!(client.query(c!["GET", "k"]).await, Element::NilBulk);
}

#[tokio::test]
async fn scenario_hello_and_map_shapes() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.query(c!["HSET", "h", "f1", "v1"]).await;
    // RESP2: flat array
    assert_eq!(
        client.query(c!["HGETALL", "h"]).await,
        Element::Array(vec![bulk(b"f1"), bulk(b"v1")])
    );
    let hello = client.query(c!["HELLO", "3"]).await;
    match hello {
        Element::Map(pairs) => {
            assert!(pairs.contains(&(bulk(b"proto"), Element::Integer(3))));
            assert!(pairs.contains(&(bulk(b"role"), bulk(b"master"))));
            assert!(pairs.contains(&(bulk(b"mode"), bulk(b"standalone"))));
        }
        other => panic!("expected a map from HELLO 3, got {other:?}"),
    }
    // RESP3: a real map now
    assert_eq!(
        client.query(c!["HGETALL", "h"]).await,
        Element::Map(vec![(bulk(b"f1"), bulk(b"v1"))])
    );
    // nil is the RESP3 null now
    assert_eq!(client.query(c!["GET", "nope"]).await, Element::Null);
}

#[tokio::test]
async fn hello_rejects_bad_proto() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_error_contains(&client.query(c!["HELLO", "4"]).await, "NOPROTO");
    assert_error_contains(&client.query(c!["HELLO", "abc"]).await, "NOPROTO");
    // and the connection still works, still on RESP2
    assert_eq!(client.query(c!["PING"]).await, Element::simple("PONG"));
}

#[tokio::test]
async fn auth_gate() {
    let harness = Harness::new(Some("hunter2"));
    let mut client = harness.connect();
    assert_error_contains(&client.query(c!["GET", "k"]).await, "NOAUTH");
    // PING is allowed through the gate
    assert_eq!(client.query(c!["PING"]).await, Element::simple("PONG"));
    assert_error_contains(&client.query(c!["AUTH", "wrong"]).await, "WRONGPASS");
    assert_eq!(client.query(c!["AUTH", "hunter2"]).await, ok());
    assert_eq!(client.query(c!["SET", "k", "v"]).await, ok());
    // username form: accepted, username ignored
    let mut second = harness.connect();
    assert_eq!(
        second.query(c!["AUTH", "default", "hunter2"]).await,
        ok()
    );
}

#[tokio::test]
async fn hello_auth_combined() {
    let harness = Harness::new(Some("hunter2"));
    let mut client = harness.connect();
    assert_error_contains(&client.query(c!["HELLO", "3"]).await, "NOAUTH");
    let hello = client
        .query(c!["HELLO", "3", "AUTH", "default", "hunter2", "SETNAME", "conn-1"])
        .await;
    assert!(matches!(hello, Element::Map(_)));
    assert_eq!(client.query(c!["CLIENT", "GETNAME"]).await, bulk(b"conn-1"));
}

#[tokio::test]
async fn client_subcommands() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    let id = match client.query(c!["CLIENT", "ID"]).await {
        Element::Integer(id) => id,
        other => panic!("unexpected CLIENT ID reply {other:?}"),
    };
    assert!(id > 0);
    assert_eq!(client.query(c!["CLIENT", "GETNAME"]).await, bulk(b""));
    assert_eq!(client.query(c!["CLIENT", "SETNAME", "me"]).await, ok());
    assert_error_contains(
        &client.query(c!["CLIENT", "SETNAME", "no spaces"]).await,
        "Client names",
    );
    assert_eq!(
        client.query(c!["CLIENT", "SETINFO", "LIB-NAME", "resq-test"]).await,
        ok()
    );
    match client.query(c!["CLIENT", "INFO"]).await {
        Element::BulkString(line) => {
            let line = String::from_utf8(line).unwrap();
            assert!(line.contains(&format!("id={id}")));
            assert!(line.contains("name=me"));
            assert!(line.contains("lib-name=resq-test"));
        }
        other => panic!("unexpected CLIENT INFO reply {other:?}"),
    }
    // monotonic ids
    let mut second = harness.connect();
    match second.query(c!["CLIENT", "ID"]).await {
        Element::Integer(second_id) => assert!(second_id > id),
        other => panic!("unexpected CLIENT ID reply {other:?}"),
    }
}

#[tokio::test]
async fn select_and_command() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_eq!(client.query(c!["SELECT", "0"]).await, ok());
    assert_error_contains(&client.query(c!["SELECT", "1"]).await, "out of range");
    assert_eq!(client.query(c!["COMMAND"]).await, Element::Array(vec![]));
    match client.query(c!["COMMAND", "COUNT"]).await {
        Element::Integer(count) => assert_eq!(count, super::ALL_VERBS.len() as i64),
        other => panic!("unexpected COMMAND COUNT reply {other:?}"),
    }
}

#[tokio::test]
async fn unknown_command_spelling_is_echoed() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_error_contains(
        &client.query(c!["FrobniCate"]).await,
        "unknown command 'FrobniCate'",
    );
}

#[tokio::test]
async fn dispatch_is_case_insensitive_on_the_wire() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    assert_eq!(client.query(c!["sEt", "k", "v"]).await, ok());
    assert_eq!(client.query(c!["get", "k"]).await, bulk(b"v"));
}

#[tokio::test]
async fn pipelined_replies_keep_order() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    let mut batch = Vec::new();
    batch.extend_from_slice(&frame(c!["SET", "k", "1"]));
    batch.extend_from_slice(&frame(c!["INCR", "k"]));
    batch.extend_from_slice(&frame(c!["GET", "k"]));
    client.send_raw(&batch).await;
    assert_eq!(client.recv().await, ok());
    assert_eq!(client.recv().await, Element::Integer(2));
    assert_eq!(client.recv().await, bulk(b"2"));
}

#[tokio::test]
async fn quit_closes_cleanly() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.send(c!["QUIT"]).await;
    let tail = client.expect_eof().await;
    assert_eq!(tail, b"+OK\r\n");
}

#[tokio::test]
async fn protocol_error_closes_with_final_line() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.send_raw(b"$-2\r\n").await;
    let tail = client.expect_eof().await;
    let tail = String::from_utf8_lossy(&tail);
    assert!(
        tail.starts_with("-ERR Protocol error:"),
        "unexpected close line: {tail}"
    );
}

#[tokio::test]
async fn pubsub_publish_delivery_and_mode_restriction() {
    let harness = Harness::new(None);
    let mut subscriber = harness.connect();
    let mut publisher = harness.connect();
    assert_eq!(
        subscriber.query(c!["SUBSCRIBE", "news"]).await,
        Element::Array(vec![bulk(b"subscribe"), bulk(b"news"), Element::Integer(1)])
    );
    // in pub/sub mode, data commands are refused
    assert_error_contains(
        &subscriber.query(c!["GET", "k"]).await,
        "only (P|S)SUBSCRIBE",
    );
    // but PING is fine
    assert_eq!(subscriber.query(c!["PING"]).await, Element::simple("PONG"));
    assert_eq!(
        publisher.query(c!["PUBLISH", "news", "hello"]).await,
        Element::Integer(1)
    );
    assert_eq!(
        subscriber.recv().await,
        Element::Array(vec![bulk(b"message"), bulk(b"news"), bulk(b"hello")])
    );
    // unsubscribing the last channel leaves pub/sub mode
    assert_eq!(
        subscriber.query(c!["UNSUBSCRIBE"]).await,
        Element::Array(vec![
            bulk(b"unsubscribe"),
            bulk(b"news"),
            Element::Integer(0)
        ])
    );
    assert_eq!(subscriber.query(c!["SET", "k", "v"]).await, ok());
}

#[tokio::test]
async fn pattern_subscriptions_deliver_pmessage() {
    let harness = Harness::new(None);
    let mut subscriber = harness.connect();
    let mut publisher = harness.connect();
    assert_eq!(
        subscriber.query(c!["PSUBSCRIBE", "news.*"]).await,
        Element::Array(vec![
            bulk(b"psubscribe"),
            bulk(b"news.*"),
            Element::Integer(1)
        ])
    );
    assert_eq!(
        publisher.query(c!["PUBLISH", "news.tech", "42"]).await,
        Element::Integer(1)
    );
    assert_eq!(
        subscriber.recv().await,
        Element::Array(vec![
            bulk(b"pmessage"),
            bulk(b"news.*"),
            bulk(b"news.tech"),
            bulk(b"42")
        ])
    );
    assert_eq!(
        publisher.query(c!["PUBLISH", "sports", "x"]).await,
        Element::Integer(0)
    );
}

#[tokio::test]
async fn resp3_subscriber_gets_push_frames() {
    let harness = Harness::new(None);
    let mut subscriber = harness.connect();
    let mut publisher = harness.connect();
    subscriber.query(c!["HELLO", "3"]).await;
    match subscriber.query(c!["SUBSCRIBE", "ch"]).await {
        Element::Push(parts) => assert_eq!(parts[0], bulk(b"subscribe")),
        other => panic!("expected a push frame, got {other:?}"),
    }
    publisher.query(c!["PUBLISH", "ch", "x"]).await;
    match subscriber.recv().await {
        Element::Push(parts) => {
            assert_eq!(parts[0], bulk(b"message"));
            assert_eq!(parts[2], bulk(b"x"));
        }
        other => panic!("expected a push frame, got {other:?}"),
    }
}

#[tokio::test]
async fn reset_restores_normal_mode() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    client.query(c!["CLIENT", "SETNAME", "before"]).await;
    client.query(c!["MULTI"]).await;
    assert_eq!(
        client.query(c!["RESET"]).await,
        Element::simple("RESET")
    );
    assert_error_contains(&client.query(c!["EXEC"]).await, "EXEC without MULTI");
    assert_eq!(client.query(c!["CLIENT", "GETNAME"]).await, bulk(b""));
}

#[tokio::test]
async fn binary_safety_on_the_wire() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    let payload: &[u8] = b"\x00\x01\xff\r\n$5\r\nfake\x00";
    assert_eq!(client.query(c!["SET", "bin", payload]).await, ok());
    assert_eq!(client.query(c!["GET", "bin"]).await, bulk(payload));
}

#[tokio::test]
async fn exec_runs_against_one_transaction() {
    let harness = Harness::new(None);
    let mut client = harness.connect();
    // a value written before the transaction is visible inside it
    client.query(c!["SET", "base", "1"]).await;
    client.query(c!["MULTI"]).await;
    client.query(c!["INCR", "base"]).await;
    client.query(c!["INCR", "base"]).await;
    assert_eq!(
        client.query(c!["EXEC"]).await,
        Element::Array(vec![Element::Integer(2), Element::Integer(3)])
    );
    assert_eq!(client.query(c!["GET", "base"]).await, bulk(b"3"));
}
