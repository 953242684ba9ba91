/*
 * Created on Mon May 08 2023
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

//! The sorted-set family
//!
//! ZADD's NX/XX/GT/LT/CH flags are parsed and checked for mutual exclusion
//! here; NX rides through to storage, the rest are accepted and recorded as
//! a storage-side gap. Rank/count/algebra commands without a dedicated
//! storage operation are composed from `z_range*` enumerations.

use {
    super::{
        as_slices, ensure_length,
        keys::{parse_cursor, parse_scan_opts, scan_window},
        opt_eq, parse_float, parse_int, parse_score_bound, ExecCtx,
    },
    crate::{
        protocol::{responses::groups, Element},
        util::{format_f64, glob},
    },
    bytes::Bytes,
    std::collections::BTreeMap,
};

fn scored_reply(members: Vec<(Vec<u8>, f64)>, withscores: bool) -> Element {
    let mut out = Vec::with_capacity(members.len() * if withscores { 2 } else { 1 });
    for (member, score) in members {
        out.push(Element::BulkString(member));
        if withscores {
            out.push(Element::bulk(format_f64(score)));
        }
    }
    Element::Array(out)
}

/// `dst numkeys key [key ...] [WEIGHTS w ...] [AGGREGATE SUM|MIN|MAX]`
/// parsing shared by ZUNIONSTORE/ZINTERSTORE
struct StoreArgs {
    destination: Bytes,
    keys: Vec<Bytes>,
    weights: Vec<f64>,
    aggregate: Aggregate,
}

#[derive(Clone, Copy)]
enum Aggregate {
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Sum => a + b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }
}

fn parse_store_args(cmd: &str, args: &[Bytes]) -> super::ActionResult<StoreArgs> {
    ensure_length(cmd, args.len(), |len| len >= 3)?;
    let numkeys = parse_int(&args[1])?;
    if numkeys <= 0 {
        actionerr!("ERR at least 1 input key is needed for ZUNIONSTORE/ZINTERSTORE");
    }
    let numkeys = numkeys as usize;
    if args.len() < 2 + numkeys {
        actionerr!(groups::E_SYNTAX);
    }
    let keys = args[2..2 + numkeys].to_vec();
    let mut weights = vec![1.0; numkeys];
    let mut aggregate = Aggregate::Sum;
    let mut rest = args[2 + numkeys..].iter();
    while let Some(opt) = rest.next() {
        if opt_eq(opt, "WEIGHTS") {
            for weight in weights.iter_mut() {
                *weight = parse_float(rest.next().ok_or(groups::E_SYNTAX)?)?;
            }
        } else if opt_eq(opt, "AGGREGATE") {
            let which = rest.next().ok_or(groups::E_SYNTAX)?;
            aggregate = if opt_eq(which, "SUM") {
                Aggregate::Sum
            } else if opt_eq(which, "MIN") {
                Aggregate::Min
            } else if opt_eq(which, "MAX") {
                Aggregate::Max
            } else {
                actionerr!(groups::E_SYNTAX);
            };
        } else {
            actionerr!(groups::E_SYNTAX);
        }
    }
    Ok(StoreArgs {
        destination: args[0].clone(),
        keys,
        weights,
        aggregate,
    })
}

async fn store_combined(
    ctx: &ExecCtx,
    store: StoreArgs,
    intersect: bool,
) -> super::ActionResult<Element> {
    let mut acc: BTreeMap<Vec<u8>, f64> = BTreeMap::new();
    let mut seen_count: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
    for (key, weight) in store.keys.iter().zip(store.weights.iter()) {
        for (member, score) in ctx.ops().z_range(key, 0, -1, false).await? {
            let weighted = score * weight;
            *seen_count.entry(member.clone()).or_insert(0) += 1;
            acc.entry(member)
                .and_modify(|current| *current = store.aggregate.apply(*current, weighted))
                .or_insert(weighted);
        }
    }
    let sources = store.keys.len();
    let members: Vec<(f64, Vec<u8>)> = acc
        .into_iter()
        .filter(|(member, _)| !intersect || seen_count[member] == sources)
        .map(|(member, score)| (score, member))
        .collect();
    ctx.ops().del(&[&store.destination]).await?;
    let card = members.len();
    if card > 0 {
        ctx.ops().z_add(&store.destination, members, false).await?;
    }
    Ok(Element::Integer(card as i64))
}

action! {
    fn zadd(ctx, args) {
        ensure_length("zadd", args.len(), |len| len >= 3)?;
        let key = &args[0];
        let (mut nx, mut xx, mut gt, mut lt, mut ch) = (false, false, false, false, false);
        let mut cursor = 1;
        while cursor < args.len() {
            let arg = &args[cursor];
            if opt_eq(arg, "NX") {
                nx = true;
            } else if opt_eq(arg, "XX") {
                xx = true;
            } else if opt_eq(arg, "GT") {
                gt = true;
            } else if opt_eq(arg, "LT") {
                lt = true;
            } else if opt_eq(arg, "CH") {
                ch = true;
            } else {
                break;
            }
            cursor += 1;
        }
        if (nx && xx) || (nx && (gt || lt)) || (gt && lt) {
            actionerr!("ERR GT, LT, and/or NX options at the same time are not compatible");
        }
        let _ = (xx, gt, lt, ch); // parsed and validated; not carried by storage yet
        let rest = &args[cursor..];
        if rest.is_empty() || rest.len() % 2 != 0 {
            actionerr!(groups::E_SYNTAX);
        }
        let mut members = Vec::with_capacity(rest.len() / 2);
        for pair in rest.chunks_exact(2) {
            let score = parse_float(&pair[0])?;
            members.push((score, pair[1].to_vec()));
        }
        let added = ctx.ops().z_add(key, members, nx).await?;
        Ok(Element::Integer(added as i64))
    }
    fn zrange(ctx, args) {
        ensure_length("zrange", args.len(), |len| len >= 3)?;
        let (mut byscore, mut rev, mut withscores) = (false, false, false);
        let (mut offset, mut count) = (0i64, -1i64);
        let mut rest = args[3..].iter();
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "BYSCORE") {
                byscore = true;
            } else if opt_eq(opt, "BYLEX") {
                actionerr!("ERR syntax error, BYLEX is not supported");
            } else if opt_eq(opt, "REV") {
                rev = true;
            } else if opt_eq(opt, "WITHSCORES") {
                withscores = true;
            } else if opt_eq(opt, "LIMIT") {
                offset = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                count = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        if (offset, count) != (0, -1) && !byscore {
            actionerr!(
                "ERR syntax error, LIMIT is only supported in combination with either BYSCORE or BYLEX"
            );
        }
        let members = if byscore {
            // in REV form the bounds arrive highest-first
            let (min_arg, max_arg) = if rev {
                (&args[2], &args[1])
            } else {
                (&args[1], &args[2])
            };
            let min = parse_score_bound(min_arg, true)?;
            let max = parse_score_bound(max_arg, false)?;
            ctx.ops()
                .z_range_by_score(&args[0], min, max, rev, offset, count)
                .await?
        } else {
            let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
            ctx.ops().z_range(&args[0], start, stop, rev).await?
        };
        Ok(scored_reply(members, withscores))
    }
    fn zrangebyscore(ctx, args) {
        ensure_length("zrangebyscore", args.len(), |len| len >= 3)?;
        let min = parse_score_bound(&args[1], true)?;
        let max = parse_score_bound(&args[2], false)?;
        let mut withscores = false;
        let (mut offset, mut count) = (0i64, -1i64);
        let mut rest = args[3..].iter();
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "WITHSCORES") {
                withscores = true;
            } else if opt_eq(opt, "LIMIT") {
                offset = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                count = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        let members = ctx
            .ops()
            .z_range_by_score(&args[0], min, max, false, offset, count)
            .await?;
        Ok(scored_reply(members, withscores))
    }
    fn zremrangebyscore(ctx, args) {
        ensure_length("zremrangebyscore", args.len(), |len| len == 3)?;
        let min = parse_score_bound(&args[1], true)?;
        let max = parse_score_bound(&args[2], false)?;
        let removed = ctx.ops().z_rem_range_by_score(&args[0], min, max).await?;
        Ok(Element::Integer(removed as i64))
    }
    fn zremrangebyrank(ctx, args) {
        ensure_length("zremrangebyrank", args.len(), |len| len == 3)?;
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let removed = ctx.ops().z_rem_range_by_rank(&args[0], start, stop).await?;
        Ok(Element::Integer(removed as i64))
    }
    fn zscore(ctx, args) {
        ensure_length("zscore", args.len(), |len| len == 2)?;
        match ctx.ops().z_score(&args[0], &args[1]).await? {
            Some(score) => Ok(Element::bulk(format_f64(score))),
            None => Ok(Element::NilBulk),
        }
    }
    fn zcard(ctx, args) {
        ensure_length("zcard", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().z_card(&args[0]).await? as i64))
    }
    fn zrem(ctx, args) {
        ensure_length("zrem", args.len(), |len| len >= 2)?;
        let removed = ctx.ops().z_rem(&args[0], &as_slices(&args[1..])).await?;
        Ok(Element::Integer(removed as i64))
    }
    fn zincrby(ctx, args) {
        ensure_length("zincrby", args.len(), |len| len == 3)?;
        let delta = parse_float(&args[1])?;
        let new = ctx.ops().z_incr_by(&args[0], delta, &args[2]).await?;
        Ok(Element::bulk(format_f64(new)))
    }
    fn zpopmin(ctx, args) {
        ensure_length("zpopmin", args.len(), |len| len == 1 || len == 2)?;
        let count = pop_count(args)?;
        let popped = ctx.ops().z_pop_min(&args[0], count).await?;
        Ok(scored_reply(popped, true))
    }
    fn zpopmax(ctx, args) {
        ensure_length("zpopmax", args.len(), |len| len == 1 || len == 2)?;
        let count = pop_count(args)?;
        let popped = ctx.ops().z_pop_max(&args[0], count).await?;
        Ok(scored_reply(popped, true))
    }
    fn zrank(ctx, args) {
        ensure_length("zrank", args.len(), |len| len == 2)?;
        rank_of(ctx, args, false).await
    }
    fn zrevrank(ctx, args) {
        ensure_length("zrevrank", args.len(), |len| len == 2)?;
        rank_of(ctx, args, true).await
    }
    fn zcount(ctx, args) {
        ensure_length("zcount", args.len(), |len| len == 3)?;
        let min = parse_score_bound(&args[1], true)?;
        let max = parse_score_bound(&args[2], false)?;
        let members = ctx
            .ops()
            .z_range_by_score(&args[0], min, max, false, 0, -1)
            .await?;
        Ok(Element::Integer(members.len() as i64))
    }
    fn zscan(ctx, args) {
        ensure_length("zscan", args.len(), |len| len >= 2)?;
        let cursor = parse_cursor(&args[1])?;
        let (pattern, count) = parse_scan_opts(&args[2..])?;
        let members: Vec<(Vec<u8>, f64)> = ctx
            .ops()
            .z_range(&args[0], 0, -1, false)
            .await?
            .into_iter()
            .filter(|(member, _)| glob::matches(&pattern, member))
            .collect();
        let (next, page) = scan_window(members, cursor, count);
        Ok(Element::Array(vec![
            Element::bulk(next.to_string()),
            scored_reply(page, true),
        ]))
    }
    fn zunionstore(ctx, args) {
        let store = parse_store_args("zunionstore", args)?;
        store_combined(ctx, store, false).await
    }
    fn zinterstore(ctx, args) {
        let store = parse_store_args("zinterstore", args)?;
        store_combined(ctx, store, true).await
    }
}

fn pop_count(args: &[Bytes]) -> super::ActionResult<u64> {
    if args.len() == 2 {
        let count = parse_int(&args[1])?;
        if count < 0 {
            return Err(super::ActionError::Error(groups::E_NOT_INTEGER.to_owned()));
        }
        Ok(count as u64)
    } else {
        Ok(1)
    }
}

async fn rank_of(ctx: &ExecCtx, args: &[Bytes], rev: bool) -> super::ActionResult<Element> {
    let members = ctx.ops().z_range(&args[0], 0, -1, rev).await?;
    Ok(members
        .iter()
        .position(|(member, _)| member.as_slice() == &args[1][..])
        .map_or(Element::NilBulk, |rank| Element::Integer(rank as i64)))
}
