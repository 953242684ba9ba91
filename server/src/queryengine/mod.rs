/*
 * Created on Sun Jun 25 2023
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

//! # The query engine
//!
//! The router. Given a decoded command, decide who runs it: the raw
//! connection-state handlers, the pub/sub glue, the transaction machinery,
//! the scripting sub-engine or the data executor, in that order of
//! precedence. Verb matching is case-insensitive; the data executor is
//! reached through [`run_data_command`], which is also the re-entry point
//! for EXEC re-dispatch and `redis.call`.

pub mod state;
pub mod subscribe;
#[cfg(test)]
mod tests;
pub mod txn;

use {
    crate::{
        actions::{self, ActionResult, ExecCtx},
        dbnet::{BufferedSocketStream, ConnectionHandler},
        protocol::{responses, responses::groups, Element},
        scripting, stats,
    },
    bytes::Bytes,
};

/// What the router decided should happen on the wire
pub enum Verdict {
    /// One reply element
    Reply(Element),
    /// Several reply elements in order (subscribe confirmations)
    Replies(Vec<Element>),
    /// Write this final element, then close the connection
    Terminate(Element),
}

/// Every verb this server understands, uppercase. COMMAND COUNT reports the
/// length; the transaction buffer consults it at enqueue time
pub static ALL_VERBS: &[&str] = &[
    // connection state
    "PING", "ECHO", "QUIT", "AUTH", "HELLO", "RESET", "SELECT", "COMMAND", "CLIENT",
    // pub/sub
    "SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PUBLISH",
    // transactions
    "MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH",
    // scripting
    "EVAL", "EVALSHA", "SCRIPT",
    // strings
    "GET", "SET", "SETNX", "SETEX", "PSETEX", "MGET", "MSET", "MSETNX", "APPEND", "STRLEN",
    "GETRANGE", "SETRANGE", "GETDEL", "GETEX", "GETSET", "INCR", "DECR", "INCRBY", "DECRBY",
    "INCRBYFLOAT",
    // keys
    "DEL", "UNLINK", "EXISTS", "EXPIRE", "PEXPIRE", "EXPIREAT", "PEXPIREAT", "TTL", "PTTL",
    "PERSIST", "KEYS", "TYPE", "RENAME", "COPY", "SCAN",
    // hashes
    "HGET", "HSET", "HSETNX", "HDEL", "HGETALL", "HMGET", "HMSET", "HEXISTS", "HKEYS", "HVALS",
    "HLEN", "HINCRBY", "HINCRBYFLOAT", "HSCAN",
    // lists
    "LPUSH", "RPUSH", "LPOP", "RPOP", "LLEN", "LRANGE", "LINDEX", "LSET", "LREM", "LTRIM",
    "LINSERT", "LPOS", "RPOPLPUSH", "BLPOP", "BRPOP",
    // sets
    "SADD", "SREM", "SMEMBERS", "SISMEMBER", "SMISMEMBER", "SCARD", "SSCAN", "SINTER",
    "SINTERSTORE", "SUNION", "SUNIONSTORE", "SDIFF", "SDIFFSTORE",
    // sorted sets
    "ZADD", "ZRANGE", "ZRANGEBYSCORE", "ZREMRANGEBYSCORE", "ZREMRANGEBYRANK", "ZSCORE", "ZCARD",
    "ZREM", "ZINCRBY", "ZPOPMIN", "ZPOPMAX", "ZRANK", "ZREVRANK", "ZCOUNT", "ZSCAN",
    "ZUNIONSTORE", "ZINTERSTORE",
    // bitmaps
    "SETBIT", "GETBIT", "BITCOUNT", "BITPOS", "BITOP", "BITFIELD",
    // hyperloglog
    "PFADD", "PFCOUNT", "PFMERGE",
    // server
    "INFO", "DBSIZE", "FLUSHDB", "FLUSHALL",
];

pub fn is_known_verb(verb: &str) -> bool {
    ALL_VERBS.contains(&verb)
}

/// Verbs that bypass the transaction buffer while a MULTI is open
fn immediate_in_txn(verb: &str) -> bool {
    matches!(
        verb,
        "MULTI" | "EXEC" | "DISCARD" | "WATCH" | "UNWATCH" | "RESET"
    )
}

/// Verbs a connection in pub/sub mode is still allowed to issue
fn allowed_in_pubsub(verb: &str) -> bool {
    matches!(
        verb,
        "SUBSCRIBE" | "PSUBSCRIBE" | "UNSUBSCRIBE" | "PUNSUBSCRIBE" | "PING" | "QUIT" | "RESET"
    )
}

/// Verbs the auth gate lets through before authentication
fn allowed_before_auth(verb: &str) -> bool {
    matches!(verb, "PING" | "AUTH" | "HELLO" | "QUIT" | "RESET")
}

/// The top-level dispatch for one decoded command frame
pub async fn execute<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    parts: &[Bytes],
) -> Verdict {
    stats::STATS.incr_commands();
    let verb_raw = &parts[0];
    let verb = String::from_utf8_lossy(verb_raw).to_ascii_uppercase();
    let args = &parts[1..];
    if !handler.auth.authenticated() && !allowed_before_auth(&verb) {
        return Verdict::Reply(Element::err(groups::E_NOAUTH));
    }
    {
        let (channels, patterns) = handler.env.hub.subscription_counts(handler.state.id);
        if channels + patterns > 0 && !allowed_in_pubsub(&verb) {
            return Verdict::Reply(Element::Error(format!(
                "ERR Can't execute '{}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context",
                verb.to_ascii_lowercase()
            )));
        }
    }
    if handler.state.txn.is_some() && !immediate_in_txn(&verb) {
        return txn::enqueue(handler, &verb, parts);
    }
    dispatch(handler, &verb, verb_raw, args).await
}

async fn dispatch<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    verb: &str,
    verb_raw: &[u8],
    args: &[Bytes],
) -> Verdict {
    match verb {
        "QUIT" => Verdict::Terminate(Element::ok()),
        "RESET" => state::reset(handler),
        "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE" | "PUNSUBSCRIBE" | "PUBLISH" => {
            subscribe::run(handler, verb, args)
        }
        "MULTI" => txn::multi(handler),
        "EXEC" => txn::exec(handler).await,
        "DISCARD" => txn::discard(handler),
        "WATCH" => txn::watch(handler, args),
        "UNWATCH" => txn::unwatch(handler, args),
        "EVAL" | "EVALSHA" | "SCRIPT" => {
            let ctx = handler.root_ctx();
            into_verdict(run_scripting(handler, &ctx, verb, args).await)
        }
        _ => {
            if let Some(result) = state::run_immediate(handler, verb, args).await {
                return into_verdict(result);
            }
            let ctx = handler.root_ctx();
            match run_data_command(&ctx, verb, args).await {
                Some(result) => into_verdict(result),
                None => Verdict::Reply(Element::Error(responses::unknown_command(
                    &String::from_utf8_lossy(verb_raw),
                ))),
            }
        }
    }
}

/// Re-dispatch for one queued command inside EXEC: connection-state verbs,
/// scripting and the data executor are all reachable; the transaction verbs
/// themselves never get queued
pub async fn execute_queued<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    ctx: &ExecCtx,
    verb: &str,
    verb_raw: &[u8],
    args: &[Bytes],
) -> Element {
    let result = match verb {
        "QUIT" => Ok(Element::ok()),
        "EVAL" | "EVALSHA" | "SCRIPT" => run_scripting(handler, ctx, verb, args).await,
        _ => {
            if let Some(result) = state::run_immediate(handler, verb, args).await {
                result
            } else {
                match run_data_command(ctx, verb, args).await {
                    Some(result) => result,
                    None => {
                        return Element::Error(responses::unknown_command(
                            &String::from_utf8_lossy(verb_raw),
                        ))
                    }
                }
            }
        }
    };
    match result {
        Ok(element) => element,
        Err(e) => e.into_element(),
    }
}

async fn run_scripting<C: BufferedSocketStream>(
    handler: &ConnectionHandler<C>,
    ctx: &ExecCtx,
    verb: &str,
    args: &[Bytes],
) -> ActionResult<Element> {
    let cache = handler.env.scripts.as_ref();
    match verb {
        "EVAL" => scripting::eval(cache, ctx, args).await,
        "EVALSHA" => scripting::evalsha(cache, ctx, args).await,
        _ => scripting::script_command(cache, args).await,
    }
}

fn into_verdict(result: ActionResult<Element>) -> Verdict {
    match result {
        Ok(element) => Verdict::Reply(element),
        Err(e) if e.is_fatal() => Verdict::Terminate(e.into_element()),
        Err(e) => Verdict::Reply(e.into_element()),
    }
}

/// The data-command table. `None` means "not a data verb"; the caller
/// decides whether that is an unknown command or something for another
/// layer. This is the single dispatch point shared by the normal path, the
/// EXEC re-dispatch and `redis.call`
pub async fn run_data_command(
    ctx: &ExecCtx,
    verb: &str,
    args: &[Bytes],
) -> Option<ActionResult<Element>> {
    use actions::{bitmaps, hashes, hll, keys, lists, server, sets, strings, zsets};
    Some(match verb {
        // strings
        "GET" => strings::get(ctx, args).await,
        "SET" => strings::set(ctx, args).await,
        "SETNX" => strings::setnx(ctx, args).await,
        "SETEX" => strings::setex(ctx, args).await,
        "PSETEX" => strings::psetex(ctx, args).await,
        "MGET" => strings::mget(ctx, args).await,
        "MSET" => strings::mset(ctx, args).await,
        "MSETNX" => strings::msetnx(ctx, args).await,
        "APPEND" => strings::append(ctx, args).await,
        "STRLEN" => strings::strlen(ctx, args).await,
        "GETRANGE" => strings::getrange(ctx, args).await,
        "SETRANGE" => strings::setrange(ctx, args).await,
        "GETDEL" => strings::getdel(ctx, args).await,
        "GETEX" => strings::getex(ctx, args).await,
        "GETSET" => strings::getset(ctx, args).await,
        "INCR" => strings::incr(ctx, args).await,
        "DECR" => strings::decr(ctx, args).await,
        "INCRBY" => strings::incrby(ctx, args).await,
        "DECRBY" => strings::decrby(ctx, args).await,
        "INCRBYFLOAT" => strings::incrbyfloat(ctx, args).await,
        // keys
        "DEL" | "UNLINK" => keys::del(ctx, args).await,
        "EXISTS" => keys::exists(ctx, args).await,
        "EXPIRE" => keys::expire(ctx, args).await,
        "PEXPIRE" => keys::pexpire(ctx, args).await,
        "EXPIREAT" => keys::expireat(ctx, args).await,
        "PEXPIREAT" => keys::pexpireat(ctx, args).await,
        "TTL" => keys::ttl(ctx, args).await,
        "PTTL" => keys::pttl(ctx, args).await,
        "PERSIST" => keys::persist(ctx, args).await,
        "KEYS" => keys::keys(ctx, args).await,
        "TYPE" => keys::key_type(ctx, args).await,
        "RENAME" => keys::rename(ctx, args).await,
        "COPY" => keys::copy(ctx, args).await,
        "SCAN" => keys::scan(ctx, args).await,
        // hashes
        "HGET" => hashes::hget(ctx, args).await,
        "HSET" => hashes::hset(ctx, args).await,
        "HSETNX" => hashes::hsetnx(ctx, args).await,
        "HDEL" => hashes::hdel(ctx, args).await,
        "HGETALL" => hashes::hgetall(ctx, args).await,
        "HMGET" => hashes::hmget(ctx, args).await,
        "HMSET" => hashes::hmset(ctx, args).await,
        "HEXISTS" => hashes::hexists(ctx, args).await,
        "HKEYS" => hashes::hkeys(ctx, args).await,
        "HVALS" => hashes::hvals(ctx, args).await,
        "HLEN" => hashes::hlen(ctx, args).await,
        "HINCRBY" => hashes::hincrby(ctx, args).await,
        "HINCRBYFLOAT" => hashes::hincrbyfloat(ctx, args).await,
        "HSCAN" => hashes::hscan(ctx, args).await,
        // lists
        "LPUSH" => lists::lpush(ctx, args).await,
        "RPUSH" => lists::rpush(ctx, args).await,
        "LPOP" => lists::lpop(ctx, args).await,
        "RPOP" => lists::rpop(ctx, args).await,
        "LLEN" => lists::llen(ctx, args).await,
        "LRANGE" => lists::lrange(ctx, args).await,
        "LINDEX" => lists::lindex(ctx, args).await,
        "LSET" => lists::lset(ctx, args).await,
        "LREM" => lists::lrem(ctx, args).await,
        "LTRIM" => lists::ltrim(ctx, args).await,
        "LINSERT" => lists::linsert(ctx, args).await,
        "LPOS" => lists::lpos(ctx, args).await,
        "RPOPLPUSH" => lists::rpoplpush(ctx, args).await,
        "BLPOP" => lists::blpop(ctx, args).await,
        "BRPOP" => lists::brpop(ctx, args).await,
        // sets
        "SADD" => sets::sadd(ctx, args).await,
        "SREM" => sets::srem(ctx, args).await,
        "SMEMBERS" => sets::smembers(ctx, args).await,
        "SISMEMBER" => sets::sismember(ctx, args).await,
        "SMISMEMBER" => sets::smismember(ctx, args).await,
        "SCARD" => sets::scard(ctx, args).await,
        "SSCAN" => sets::sscan(ctx, args).await,
        "SINTER" => sets::sinter(ctx, args).await,
        "SINTERSTORE" => sets::sinterstore(ctx, args).await,
        "SUNION" => sets::sunion(ctx, args).await,
        "SUNIONSTORE" => sets::sunionstore(ctx, args).await,
        "SDIFF" => sets::sdiff(ctx, args).await,
        "SDIFFSTORE" => sets::sdiffstore(ctx, args).await,
        // sorted sets
        "ZADD" => zsets::zadd(ctx, args).await,
        "ZRANGE" => zsets::zrange(ctx, args).await,
        "ZRANGEBYSCORE" => zsets::zrangebyscore(ctx, args).await,
        "ZREMRANGEBYSCORE" => zsets::zremrangebyscore(ctx, args).await,
        "ZREMRANGEBYRANK" => zsets::zremrangebyrank(ctx, args).await,
        "ZSCORE" => zsets::zscore(ctx, args).await,
        "ZCARD" => zsets::zcard(ctx, args).await,
        "ZREM" => zsets::zrem(ctx, args).await,
        "ZINCRBY" => zsets::zincrby(ctx, args).await,
        "ZPOPMIN" => zsets::zpopmin(ctx, args).await,
        "ZPOPMAX" => zsets::zpopmax(ctx, args).await,
        "ZRANK" => zsets::zrank(ctx, args).await,
        "ZREVRANK" => zsets::zrevrank(ctx, args).await,
        "ZCOUNT" => zsets::zcount(ctx, args).await,
        "ZSCAN" => zsets::zscan(ctx, args).await,
        "ZUNIONSTORE" => zsets::zunionstore(ctx, args).await,
        "ZINTERSTORE" => zsets::zinterstore(ctx, args).await,
        // bitmaps
        "SETBIT" => bitmaps::setbit(ctx, args).await,
        "GETBIT" => bitmaps::getbit(ctx, args).await,
        "BITCOUNT" => bitmaps::bitcount(ctx, args).await,
        "BITPOS" => bitmaps::bitpos(ctx, args).await,
        "BITOP" => bitmaps::bitop(ctx, args).await,
        "BITFIELD" => bitmaps::bitfield(ctx, args).await,
        // hyperloglog
        "PFADD" => hll::pfadd(ctx, args).await,
        "PFCOUNT" => hll::pfcount(ctx, args).await,
        "PFMERGE" => hll::pfmerge(ctx, args).await,
        // server
        "INFO" => server::info(ctx, args).await,
        "DBSIZE" => server::dbsize(ctx, args).await,
        "FLUSHDB" => server::flushdb(ctx, args).await,
        "FLUSHALL" => server::flushall(ctx, args).await,
        _ => return None,
    })
}
