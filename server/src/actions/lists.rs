/*
 * Created on Sun Apr 30 2023
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

//! The list family, blocking pops included
//!
//! BLPOP/BRPOP are polling loops: scan the keys in order, sleep
//! [`BLOCKING_POLL_INTERVAL`] between rounds, give up at the deadline (or
//! never, for timeout 0). The loop also races the connection's termination
//! signal so a shutdown unblocks every parked client with a nil reply.

use {
    super::{ensure_length, opt_eq, parse_float, parse_int, ActionError, ExecCtx},
    crate::protocol::{responses::groups, Element},
    bytes::Bytes,
    std::time::Duration,
    tokio::time::Instant,
};

/// How long a blocked pop sleeps between polls
pub const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn to_vecs(args: &[Bytes]) -> Vec<Vec<u8>> {
    args.iter().map(|arg| arg.to_vec()).collect()
}

action! {
    fn lpush(ctx, args) {
        ensure_length("lpush", args.len(), |len| len >= 2)?;
        let len = ctx.ops().l_push(&args[0], to_vecs(&args[1..])).await?;
        Ok(Element::Integer(len as i64))
    }
    fn rpush(ctx, args) {
        ensure_length("rpush", args.len(), |len| len >= 2)?;
        let len = ctx.ops().r_push(&args[0], to_vecs(&args[1..])).await?;
        Ok(Element::Integer(len as i64))
    }
    fn lpop(ctx, args) {
        ensure_length("lpop", args.len(), |len| len == 1 || len == 2)?;
        pop(ctx, args, true).await
    }
    fn rpop(ctx, args) {
        ensure_length("rpop", args.len(), |len| len == 1 || len == 2)?;
        pop(ctx, args, false).await
    }
    fn llen(ctx, args) {
        ensure_length("llen", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().l_len(&args[0]).await? as i64))
    }
    fn lrange(ctx, args) {
        ensure_length("lrange", args.len(), |len| len == 3)?;
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let items = ctx.ops().l_range(&args[0], start, stop).await?;
        Ok(Element::string_array(items))
    }
    fn lindex(ctx, args) {
        ensure_length("lindex", args.len(), |len| len == 2)?;
        let index = parse_int(&args[1])?;
        match ctx.ops().l_index(&args[0], index).await? {
            Some(value) => Ok(Element::BulkString(value)),
            None => Ok(Element::NilBulk),
        }
    }
    fn lset(ctx, args) {
        ensure_length("lset", args.len(), |len| len == 3)?;
        let index = parse_int(&args[1])?;
        ctx.ops().l_set(&args[0], index, args[2].to_vec()).await?;
        Ok(Element::ok())
    }
    fn lrem(ctx, args) {
        ensure_length("lrem", args.len(), |len| len == 3)?;
        let count = parse_int(&args[1])?;
        let removed = ctx.ops().l_rem(&args[0], count, &args[2]).await?;
        Ok(Element::Integer(removed as i64))
    }
    fn ltrim(ctx, args) {
        ensure_length("ltrim", args.len(), |len| len == 3)?;
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        ctx.ops().l_trim(&args[0], start, stop).await?;
        Ok(Element::ok())
    }
    fn linsert(ctx, args) {
        ensure_length("linsert", args.len(), |len| len == 4)?;
        let before = if opt_eq(&args[1], "BEFORE") {
            true
        } else if opt_eq(&args[1], "AFTER") {
            false
        } else {
            actionerr!(groups::E_SYNTAX);
        };
        let len = ctx
            .ops()
            .l_insert(&args[0], before, &args[2], args[3].to_vec())
            .await?;
        Ok(Element::Integer(len))
    }
    fn lpos(ctx, args) {
        ensure_length("lpos", args.len(), |len| len >= 2)?;
        let (mut rank, mut count, mut maxlen) = (1i64, None::<u64>, 0u64);
        let mut rest = args[2..].iter();
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "RANK") {
                rank = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                if rank == 0 {
                    actionerr!("ERR RANK can't be zero");
                }
            } else if opt_eq(opt, "COUNT") {
                let n = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                if n < 0 {
                    actionerr!("ERR COUNT can't be negative");
                }
                count = Some(n as u64);
            } else if opt_eq(opt, "MAXLEN") {
                let n = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                if n < 0 {
                    actionerr!("ERR MAXLEN can't be negative");
                }
                maxlen = n as u64;
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        let items = ctx.ops().l_range(&args[0], 0, -1).await?;
        let matches = find_positions(&items, &args[1], rank, maxlen);
        Ok(match count {
            None => matches
                .first()
                .map_or(Element::NilBulk, |index| Element::Integer(*index)),
            Some(0) => Element::Array(matches.into_iter().map(Element::Integer).collect()),
            Some(n) => Element::Array(
                matches
                    .into_iter()
                    .take(n as usize)
                    .map(Element::Integer)
                    .collect(),
            ),
        })
    }
    fn rpoplpush(ctx, args) {
        ensure_length("rpoplpush", args.len(), |len| len == 2)?;
        match ctx.ops().r_pop_l_push(&args[0], &args[1]).await? {
            Some(value) => Ok(Element::BulkString(value)),
            None => Ok(Element::NilBulk),
        }
    }
    fn blpop(ctx, args) {
        ensure_length("blpop", args.len(), |len| len >= 2)?;
        blocking_pop(ctx, args, true).await
    }
    fn brpop(ctx, args) {
        ensure_length("brpop", args.len(), |len| len >= 2)?;
        blocking_pop(ctx, args, false).await
    }
}

async fn pop(ctx: &ExecCtx, args: &[Bytes], front: bool) -> super::ActionResult<Element> {
    if args.len() == 1 {
        let value = if front {
            ctx.ops().l_pop(&args[0]).await?
        } else {
            ctx.ops().r_pop(&args[0]).await?
        };
        return Ok(match value {
            Some(value) => Element::BulkString(value),
            None => Element::NilBulk,
        });
    }
    let count = parse_int(&args[1])?;
    if count < 0 {
        actionerr!(groups::E_NOT_INTEGER);
    }
    let mut popped = Vec::new();
    for _ in 0..count {
        let value = if front {
            ctx.ops().l_pop(&args[0]).await?
        } else {
            ctx.ops().r_pop(&args[0]).await?
        };
        match value {
            Some(value) => popped.push(Element::BulkString(value)),
            None => break,
        }
    }
    Ok(if popped.is_empty() {
        Element::NilArray
    } else {
        Element::Array(popped)
    })
}

fn find_positions(items: &[Vec<u8>], needle: &[u8], rank: i64, maxlen: u64) -> Vec<i64> {
    let limit = if maxlen == 0 {
        items.len()
    } else {
        (maxlen as usize).min(items.len())
    };
    let mut skip = rank.unsigned_abs() - 1;
    let mut positions = Vec::new();
    if rank > 0 {
        for (index, item) in items.iter().enumerate().take(limit) {
            if item.as_slice() == needle {
                if skip > 0 {
                    skip -= 1;
                } else {
                    positions.push(index as i64);
                }
            }
        }
    } else {
        for (index, item) in items.iter().enumerate().rev().take(limit) {
            if item.as_slice() == needle {
                if skip > 0 {
                    skip -= 1;
                } else {
                    positions.push(index as i64);
                }
            }
        }
    }
    positions
}

/// The polling loop behind BLPOP/BRPOP. Inside a transaction the loop
/// degrades to a single pass (blocking against an open transaction would
/// park the connection forever)
async fn blocking_pop(
    ctx: &ExecCtx,
    args: &[Bytes],
    front: bool,
) -> super::ActionResult<Element> {
    let (keys, timeout_arg) = args.split_at(args.len() - 1);
    let timeout = parse_float(&timeout_arg[0])
        .map_err(|_| ActionError::from(groups::E_TIMEOUT_INVALID))?;
    if timeout < 0.0 {
        actionerr!(groups::E_TIMEOUT_NEGATIVE);
    }
    if !timeout.is_finite() {
        actionerr!(groups::E_TIMEOUT_INVALID);
    }
    let deadline = if timeout == 0.0 {
        None
    } else {
        Some(Instant::now() + Duration::from_secs_f64(timeout))
    };
    let mut term = ctx.term.clone();
    loop {
        for key in keys {
            let value = if front {
                ctx.ops().l_pop(key).await?
            } else {
                ctx.ops().r_pop(key).await?
            };
            if let Some(value) = value {
                return Ok(Element::Array(vec![
                    Element::BulkString(key.to_vec()),
                    Element::BulkString(value),
                ]));
            }
        }
        if ctx.in_txn() {
            // a queued blocking pop polls exactly once
            return Ok(Element::NilArray);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(Element::NilArray);
        }
        tokio::select! {
            _ = tokio::time::sleep(BLOCKING_POLL_INTERVAL) => {}
            _ = term.receive_signal() => return Ok(Element::NilArray),
        }
    }
}
