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

//! The string family

use {
    super::{ensure_length, opt_eq, parse_float, parse_int, ActionError},
    crate::{
        protocol::{responses::groups, Element},
        util::format_f64,
    },
    std::time::Duration,
};

/// How a SET/GETEX call touches the key's deadline
enum TtlDirective {
    /// Leave whatever deadline the key has (SET only reaches this through
    /// KEEPTTL; GETEX through no option at all)
    Keep,
    /// Drop the deadline (plain SET; GETEX PERSIST)
    Clear,
    /// A fresh relative deadline
    After(Duration),
    /// An absolute deadline that already passed: the key dies instead
    Expired,
}

fn parse_expiry(unit_ms: bool, raw: i64, cmd: &str) -> Result<Duration, ActionError> {
    if raw <= 0 {
        return Err(ActionError::Error(format!(
            "ERR invalid expire time in '{cmd}' command"
        )));
    }
    Ok(if unit_ms {
        Duration::from_millis(raw as u64)
    } else {
        Duration::from_secs(raw as u64)
    })
}

/// Absolute unix timestamps (EXAT/PXAT) become a relative duration here; a
/// timestamp in the past is a delete
fn expiry_at(unit_ms: bool, raw: i64) -> TtlDirective {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let target_ms = if unit_ms { raw } else { raw.saturating_mul(1000) };
    if target_ms <= now_ms {
        TtlDirective::Expired
    } else {
        TtlDirective::After(Duration::from_millis((target_ms - now_ms) as u64))
    }
}

action! {
    fn get(ctx, args) {
        ensure_length("get", args.len(), |len| len == 1)?;
        match ctx.ops().get(&args[0]).await? {
            Some(value) => Ok(Element::BulkString(value)),
            None => Ok(Element::NilBulk),
        }
    }
    fn set(ctx, args) {
        ensure_length("set", args.len(), |len| len >= 2)?;
        let (key, value) = (&args[0], &args[1]);
        let mut ttl = TtlDirective::Clear;
        let (mut nx, mut xx, mut want_old) = (false, false, false);
        let mut rest = args[2..].iter();
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "EX") || opt_eq(opt, "PX") {
                let raw = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                ttl = TtlDirective::After(parse_expiry(opt_eq(opt, "PX"), raw, "set")?);
            } else if opt_eq(opt, "EXAT") || opt_eq(opt, "PXAT") {
                let raw = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                ttl = expiry_at(opt_eq(opt, "PXAT"), raw);
            } else if opt_eq(opt, "KEEPTTL") {
                ttl = TtlDirective::Keep;
            } else if opt_eq(opt, "NX") {
                nx = true;
            } else if opt_eq(opt, "XX") {
                xx = true;
            } else if opt_eq(opt, "GET") {
                want_old = true;
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        if nx && xx {
            actionerr!(groups::E_SYNTAX);
        }
        let ops = ctx.ops();
        // the GET flavor (and the NX/XX guards) need the previous value; a
        // wrong-typed key must error out before anything is written
        let old = if want_old { ops.get(key).await? } else { None };
        let key_exists = if nx || xx {
            ops.exists(&[key]).await? > 0
        } else {
            false
        };
        if (nx && key_exists) || (xx && !key_exists) {
            return Ok(if want_old {
                old.map_or(Element::NilBulk, Element::BulkString)
            } else {
                Element::NilBulk
            });
        }
        match ttl {
            TtlDirective::Expired => {
                ops.del(&[key]).await?;
            }
            TtlDirective::Keep => ops.set(key, value.to_vec(), None, true).await?,
            TtlDirective::Clear => ops.set(key, value.to_vec(), None, false).await?,
            TtlDirective::After(d) => ops.set(key, value.to_vec(), Some(d), false).await?,
        }
        Ok(if want_old {
            old.map_or(Element::NilBulk, Element::BulkString)
        } else {
            Element::ok()
        })
    }
    fn setnx(ctx, args) {
        ensure_length("setnx", args.len(), |len| len == 2)?;
        let created = ctx.ops().set_nx(&args[0], args[1].to_vec()).await?;
        Ok(Element::Integer(created as i64))
    }
    fn setex(ctx, args) {
        ensure_length("setex", args.len(), |len| len == 3)?;
        let ttl = parse_expiry(false, parse_int(&args[1])?, "setex")?;
        ctx.ops().set(&args[0], args[2].to_vec(), Some(ttl), false).await?;
        Ok(Element::ok())
    }
    fn psetex(ctx, args) {
        ensure_length("psetex", args.len(), |len| len == 3)?;
        let ttl = parse_expiry(true, parse_int(&args[1])?, "psetex")?;
        ctx.ops().set(&args[0], args[2].to_vec(), Some(ttl), false).await?;
        Ok(Element::ok())
    }
    fn mget(ctx, args) {
        ensure_length("mget", args.len(), |len| len >= 1)?;
        let keys = super::as_slices(args);
        let values = ctx.ops().mget(&keys).await?;
        Ok(Element::Array(
            values
                .into_iter()
                .map(|v| v.map_or(Element::NilBulk, Element::BulkString))
                .collect(),
        ))
    }
    fn mset(ctx, args) {
        ensure_length("mset", args.len(), |len| len >= 2 && len % 2 == 0)?;
        let pairs = args
            .chunks_exact(2)
            .map(|pair| (pair[0].to_vec(), pair[1].to_vec()))
            .collect();
        ctx.ops().mset(pairs).await?;
        Ok(Element::ok())
    }
    fn msetnx(ctx, args) {
        ensure_length("msetnx", args.len(), |len| len >= 2 && len % 2 == 0)?;
        let keys: Vec<&[u8]> = args.iter().step_by(2).map(|k| k.as_ref()).collect();
        if ctx.ops().exists(&keys).await? > 0 {
            return Ok(Element::Integer(0));
        }
        let pairs = args
            .chunks_exact(2)
            .map(|pair| (pair[0].to_vec(), pair[1].to_vec()))
            .collect();
        ctx.ops().mset(pairs).await?;
        Ok(Element::Integer(1))
    }
    fn append(ctx, args) {
        ensure_length("append", args.len(), |len| len == 2)?;
        let len = ctx.ops().append(&args[0], &args[1]).await?;
        Ok(Element::Integer(len as i64))
    }
    fn strlen(ctx, args) {
        ensure_length("strlen", args.len(), |len| len == 1)?;
        let len = ctx.ops().strlen(&args[0]).await?;
        Ok(Element::Integer(len as i64))
    }
    fn getrange(ctx, args) {
        ensure_length("getrange", args.len(), |len| len == 3)?;
        let (start, end) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let chunk = ctx.ops().get_range(&args[0], start, end).await?;
        Ok(Element::BulkString(chunk))
    }
    fn setrange(ctx, args) {
        ensure_length("setrange", args.len(), |len| len == 3)?;
        let offset = parse_int(&args[1])?;
        if offset < 0 {
            actionerr!("ERR offset is out of range");
        }
        let len = ctx.ops().set_range(&args[0], offset as u64, &args[2]).await?;
        Ok(Element::Integer(len as i64))
    }
    fn getdel(ctx, args) {
        ensure_length("getdel", args.len(), |len| len == 1)?;
        match ctx.ops().get_del(&args[0]).await? {
            Some(value) => Ok(Element::BulkString(value)),
            None => Ok(Element::NilBulk),
        }
    }
    fn getex(ctx, args) {
        ensure_length("getex", args.len(), |len| len >= 1)?;
        let key = &args[0];
        let mut ttl = TtlDirective::Keep;
        let mut rest = args[1..].iter();
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "EX") || opt_eq(opt, "PX") {
                let raw = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                ttl = TtlDirective::After(parse_expiry(opt_eq(opt, "PX"), raw, "getex")?);
            } else if opt_eq(opt, "EXAT") || opt_eq(opt, "PXAT") {
                let raw = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                ttl = expiry_at(opt_eq(opt, "PXAT"), raw);
            } else if opt_eq(opt, "PERSIST") {
                ttl = TtlDirective::Clear;
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        let value = match ttl {
            TtlDirective::Keep => ctx.ops().get(key).await?,
            TtlDirective::Clear => ctx.ops().get_ex(key, None, true).await?,
            TtlDirective::After(d) => ctx.ops().get_ex(key, Some(d), false).await?,
            TtlDirective::Expired => {
                let value = ctx.ops().get(key).await?;
                ctx.ops().del(&[key]).await?;
                value
            }
        };
        Ok(value.map_or(Element::NilBulk, Element::BulkString))
    }
    fn getset(ctx, args) {
        ensure_length("getset", args.len(), |len| len == 2)?;
        match ctx.ops().get_set(&args[0], args[1].to_vec()).await? {
            Some(old) => Ok(Element::BulkString(old)),
            None => Ok(Element::NilBulk),
        }
    }
    fn incr(ctx, args) {
        ensure_length("incr", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().incr(&args[0], 1).await?))
    }
    fn decr(ctx, args) {
        ensure_length("decr", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().incr(&args[0], -1).await?))
    }
    fn incrby(ctx, args) {
        ensure_length("incrby", args.len(), |len| len == 2)?;
        let delta = parse_int(&args[1])?;
        Ok(Element::Integer(ctx.ops().incr(&args[0], delta).await?))
    }
    fn decrby(ctx, args) {
        ensure_length("decrby", args.len(), |len| len == 2)?;
        let delta = parse_int(&args[1])?
            .checked_neg()
            .ok_or(groups::E_NOT_INTEGER)?;
        Ok(Element::Integer(ctx.ops().incr(&args[0], delta).await?))
    }
    fn incrbyfloat(ctx, args) {
        ensure_length("incrbyfloat", args.len(), |len| len == 2)?;
        let delta = parse_float(&args[1])?;
        let new = ctx.ops().incr_by_float(&args[0], delta).await?;
        Ok(Element::bulk(format_f64(new)))
    }
}
