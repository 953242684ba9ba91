/*
 * Created on Fri Apr 21 2023
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

//! The keyspace family

use {
    super::{as_slices, ensure_length, opt_eq, parse_int},
    crate::protocol::{responses::groups, Element},
    std::time::Duration,
};

/// The default page size SCAN and friends use when COUNT isn't given
pub const SCAN_DEFAULT_COUNT: usize = 10;

/// Shared cursor-window plumbing for SCAN/HSCAN/SSCAN/ZSCAN: page over a
/// stable full enumeration. The items are whatever the per-type caller
/// enumerated (keys, field/value pairs, members)
pub fn scan_window<T>(items: Vec<T>, cursor: u64, count: usize) -> (u64, Vec<T>) {
    let cursor = cursor as usize;
    if cursor >= items.len() {
        return (0, Vec::new());
    }
    let end = (cursor + count).min(items.len());
    let next = if end == items.len() { 0 } else { end as u64 };
    let page = items
        .into_iter()
        .skip(cursor)
        .take(end - cursor)
        .collect();
    (next, page)
}

/// Parse `[MATCH pattern] [COUNT n]` as SCAN and its typed cousins accept
/// them. Returns `(pattern, count)`
pub fn parse_scan_opts(args: &[bytes::Bytes]) -> super::ActionResult<(Vec<u8>, usize)> {
    let mut pattern: Vec<u8> = b"*".to_vec();
    let mut count = SCAN_DEFAULT_COUNT;
    let mut rest = args.iter();
    while let Some(opt) = rest.next() {
        if opt_eq(opt, "MATCH") {
            pattern = rest.next().ok_or(groups::E_SYNTAX)?.to_vec();
        } else if opt_eq(opt, "COUNT") {
            let n = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
            if n <= 0 {
                actionerr!(groups::E_SYNTAX);
            }
            count = n as usize;
        } else {
            actionerr!(groups::E_SYNTAX);
        }
    }
    Ok((pattern, count))
}

pub fn parse_cursor(arg: &[u8]) -> super::ActionResult<u64> {
    core::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| super::ActionError::Error("ERR invalid cursor".to_owned()))
}

fn scan_reply(next: u64, items: Vec<Element>) -> Element {
    Element::Array(vec![
        Element::bulk(next.to_string()),
        Element::Array(items),
    ])
}

action! {
    fn del(ctx, args) {
        ensure_length("del", args.len(), |len| len >= 1)?;
        let removed = ctx.ops().del(&as_slices(args)).await?;
        Ok(Element::Integer(removed as i64))
    }
    fn exists(ctx, args) {
        ensure_length("exists", args.len(), |len| len >= 1)?;
        let found = ctx.ops().exists(&as_slices(args)).await?;
        Ok(Element::Integer(found as i64))
    }
    fn expire(ctx, args) {
        ensure_length("expire", args.len(), |len| len == 2)?;
        let secs = parse_int(&args[1])?;
        apply_expiry(ctx, &args[0], secs.saturating_mul(1000)).await
    }
    fn pexpire(ctx, args) {
        ensure_length("pexpire", args.len(), |len| len == 2)?;
        let millis = parse_int(&args[1])?;
        apply_expiry(ctx, &args[0], millis).await
    }
    fn expireat(ctx, args) {
        ensure_length("expireat", args.len(), |len| len == 2)?;
        let at_secs = parse_int(&args[1])?;
        let delta = at_secs.saturating_mul(1000) - chrono::Utc::now().timestamp_millis();
        apply_expiry(ctx, &args[0], delta).await
    }
    fn pexpireat(ctx, args) {
        ensure_length("pexpireat", args.len(), |len| len == 2)?;
        let at_millis = parse_int(&args[1])?;
        let delta = at_millis - chrono::Utc::now().timestamp_millis();
        apply_expiry(ctx, &args[0], delta).await
    }
    fn ttl(ctx, args) {
        ensure_length("ttl", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().ttl(&args[0]).await?))
    }
    fn pttl(ctx, args) {
        ensure_length("pttl", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().pttl(&args[0]).await?))
    }
    fn persist(ctx, args) {
        ensure_length("persist", args.len(), |len| len == 1)?;
        let changed = ctx.ops().persist(&args[0]).await?;
        Ok(Element::Integer(changed as i64))
    }
    fn keys(ctx, args) {
        ensure_length("keys", args.len(), |len| len == 1)?;
        let keys = ctx.ops().keys(&args[0]).await?;
        Ok(Element::string_array(keys))
    }
    fn key_type(ctx, args) {
        ensure_length("type", args.len(), |len| len == 1)?;
        let tag = ctx.ops().key_type(&args[0]).await?;
        Ok(Element::simple(tag.as_str()))
    }
    fn rename(ctx, args) {
        ensure_length("rename", args.len(), |len| len == 2)?;
        ctx.ops().rename(&args[0], &args[1]).await?;
        Ok(Element::ok())
    }
    fn copy(ctx, args) {
        ensure_length("copy", args.len(), |len| len >= 2)?;
        let mut replace = false;
        let mut rest = args[2..].iter();
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "REPLACE") {
                replace = true;
            } else if opt_eq(opt, "DB") {
                // single-database deployment: only db 0 exists
                let db = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                if db != 0 {
                    actionerr!(groups::E_SELECT_INVALID_DB);
                }
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        let copied = ctx.ops().copy(&args[0], &args[1], replace).await?;
        Ok(Element::Integer(copied as i64))
    }
    fn scan(ctx, args) {
        ensure_length("scan", args.len(), |len| len >= 1)?;
        let cursor = parse_cursor(&args[0])?;
        let (pattern, count) = parse_scan_opts(&args[1..])?;
        let keys = ctx.ops().keys(&pattern).await?;
        let (next, page) = scan_window(keys, cursor, count);
        Ok(scan_reply(
            next,
            page.into_iter().map(Element::BulkString).collect(),
        ))
    }
}

/// EXPIRE and all its spellings funnel here with a millisecond delta. A
/// non-positive delta deletes the key outright, which is what the wire
/// semantics demand
async fn apply_expiry(
    ctx: &super::ExecCtx,
    key: &[u8],
    delta_millis: i64,
) -> super::ActionResult<Element> {
    if delta_millis <= 0 {
        let removed = ctx.ops().del(&[key]).await?;
        return Ok(Element::Integer((removed > 0) as i64));
    }
    let applied = ctx
        .ops()
        .expire(key, Duration::from_millis(delta_millis as u64))
        .await?;
    Ok(Element::Integer(applied as i64))
}
