/*
 * Created on Fri Jun 09 2023
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

//! # The scripting sub-engine
//!
//! EVAL/EVALSHA/SCRIPT over a sandboxed Lua 5.4 state. Scripts run
//! synchronously on the calling connection's task and re-enter the executor
//! through `redis.call`/`redis.pcall` against the connection's *current*
//! ops handle: the open transaction when an EVAL was queued inside MULTI,
//! the storage root otherwise. A fresh Lua state is built per execution:
//! nothing leaks between scripts, and there is nothing to interrupt, which
//! is why SCRIPT KILL always answers NOTBUSY.

mod cache;
mod runtime;
#[cfg(test)]
mod tests;

pub use cache::{sha1_hex, ScriptCache};

use {
    crate::{
        actionerr,
        actions::{ensure_length, opt_eq, parse_int, ActionResult, ExecCtx},
        protocol::{responses::groups, Element},
    },
    bytes::Bytes,
};

/// Verbs a script may never issue: anything that touches connection state,
/// subscriptions or the transaction machinery, and scripting itself
const FORBIDDEN_IN_SCRIPTS: &[&str] = &[
    "SUBSCRIBE",
    "PSUBSCRIBE",
    "UNSUBSCRIBE",
    "PUNSUBSCRIBE",
    "PUBLISH",
    "MULTI",
    "EXEC",
    "DISCARD",
    "WATCH",
    "UNWATCH",
    "EVAL",
    "EVALSHA",
    "SCRIPT",
];

pub fn is_forbidden_in_scripts(verb: &str) -> bool {
    FORBIDDEN_IN_SCRIPTS.contains(&verb)
}

/// Split `numkeys key... arg...` off an EVAL/EVALSHA tail
fn split_keys_args(cmd: &str, args: &[Bytes]) -> ActionResult<(Vec<Bytes>, Vec<Bytes>)> {
    ensure_length(cmd, args.len(), |len| len >= 2)?;
    let numkeys = parse_int(&args[1])?;
    if numkeys < 0 {
        actionerr!("ERR Number of keys can't be negative");
    }
    let numkeys = numkeys as usize;
    if numkeys > args.len() - 2 {
        actionerr!("ERR Number of keys can't be greater than number of args");
    }
    let keys = args[2..2 + numkeys].to_vec();
    let argv = args[2 + numkeys..].to_vec();
    Ok((keys, argv))
}

/// EVAL: cache the script under its SHA, then run it
pub async fn eval(cache: &ScriptCache, ctx: &ExecCtx, args: &[Bytes]) -> ActionResult<Element> {
    let (keys, argv) = split_keys_args("eval", args)?;
    let source = args[0].to_vec();
    cache.load(&source);
    runtime::run_script(ctx, &source, keys, argv).await
}

/// EVALSHA: run a previously-cached script by hash
pub async fn evalsha(cache: &ScriptCache, ctx: &ExecCtx, args: &[Bytes]) -> ActionResult<Element> {
    let (keys, argv) = split_keys_args("evalsha", args)?;
    let sha = String::from_utf8_lossy(&args[0]).into_owned();
    let source = match cache.get(&sha) {
        Some(source) => source,
        None => actionerr!(groups::E_NOSCRIPT),
    };
    runtime::run_script(ctx, &source, keys, argv).await
}

/// The SCRIPT container command
pub async fn script_command(cache: &ScriptCache, args: &[Bytes]) -> ActionResult<Element> {
    ensure_length("script", args.len(), |len| len >= 1)?;
    let sub = &args[0];
    if opt_eq(sub, "LOAD") {
        ensure_length("script|load", args.len(), |len| len == 2)?;
        Ok(Element::bulk(cache.load(&args[1])))
    } else if opt_eq(sub, "EXISTS") {
        ensure_length("script|exists", args.len(), |len| len >= 2)?;
        Ok(Element::Array(
            args[1..]
                .iter()
                .map(|sha| {
                    let sha = String::from_utf8_lossy(sha);
                    Element::Integer(cache.contains(&sha) as i64)
                })
                .collect(),
        ))
    } else if opt_eq(sub, "FLUSH") {
        // the ASYNC/SYNC argument is accepted and has no bearing here
        if args.len() > 2 {
            actionerr!(groups::E_SYNTAX);
        }
        if let Some(mode) = args.get(1) {
            if !(opt_eq(mode, "ASYNC") || opt_eq(mode, "SYNC")) {
                actionerr!(groups::E_SYNTAX);
            }
        }
        cache.flush();
        Ok(Element::ok())
    } else if opt_eq(sub, "KILL") {
        // scripts run synchronously on the calling task; there is never one
        // to kill from another connection's point of view
        actionerr!(groups::E_NOTBUSY)
    } else {
        Err(crate::actions::ActionError::Error(format!(
            "ERR Unknown SCRIPT subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(sub)
        )))
    }
}
