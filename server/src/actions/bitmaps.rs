/*
 * Created on Tue May 16 2023
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

//! The bitmap family
//!
//! SETBIT/GETBIT/BITCOUNT/BITPOS/BITOP ride on plain `get`/`set`; only
//! BITFIELD has a dedicated storage operation (its read-modify-write slots
//! can't be composed race-free from outside). OVERFLOW is parsed and always
//! applied as WRAP.

use {
    super::{ensure_length, opt_eq, parse_int},
    crate::{
        protocol::{responses::groups, Element},
        storage::{BitfieldEncoding, BitfieldOp},
    },
    bytes::Bytes,
};

/// Offsets address at most 4 GiB of bitmap, the classic limit
const MAX_BIT_OFFSET: i64 = 4 * 1024 * 1024 * 1024 * 8 - 1;

fn parse_bit_offset(arg: &[u8]) -> super::ActionResult<u64> {
    let offset = parse_int(arg).map_err(|_| groups::E_OFFSET_OUT_OF_RANGE)?;
    if !(0..=MAX_BIT_OFFSET).contains(&offset) {
        actionerr!(groups::E_OFFSET_OUT_OF_RANGE);
    }
    Ok(offset as u64)
}

fn get_bit(bytes: &[u8], offset: u64) -> u8 {
    let byte = (offset / 8) as usize;
    let bit = 7 - (offset % 8) as u32;
    bytes.get(byte).map_or(0, |b| (b >> bit) & 1)
}

enum RangeUnit {
    Byte,
    Bit,
}

/// Resolve an optional `[start end [BYTE|BIT]]` tail into an inclusive bit
/// range over a value of `len` bytes. `None` means the selection is empty
fn resolve_bit_range(
    len: usize,
    start: i64,
    end: i64,
    unit: &RangeUnit,
) -> Option<(u64, u64)> {
    let total: i64 = match unit {
        RangeUnit::Byte => len as i64,
        RangeUnit::Bit => (len * 8) as i64,
    };
    if total == 0 {
        return None;
    }
    let mut start = if start < 0 { total + start } else { start };
    let mut end = if end < 0 { total + end } else { end };
    if start < 0 {
        start = 0;
    }
    if end >= total {
        end = total - 1;
    }
    if start > end || start >= total || end < 0 {
        return None;
    }
    Some(match unit {
        RangeUnit::Byte => ((start * 8) as u64, (end * 8 + 7) as u64),
        RangeUnit::Bit => (start as u64, end as u64),
    })
}

action! {
    fn setbit(ctx, args) {
        ensure_length("setbit", args.len(), |len| len == 3)?;
        let offset = parse_bit_offset(&args[1])?;
        let bit = parse_int(&args[2]).map_err(|_| groups::E_BIT_NOT_BOOL)?;
        if bit != 0 && bit != 1 {
            actionerr!(groups::E_BIT_NOT_BOOL);
        }
        let mut bytes = ctx.ops().get(&args[0]).await?.unwrap_or_default();
        let needed = (offset / 8 + 1) as usize;
        if bytes.len() < needed {
            bytes.resize(needed, 0);
        }
        let old = get_bit(&bytes, offset);
        let byte = (offset / 8) as usize;
        let shift = 7 - (offset % 8) as u32;
        bytes[byte] = (bytes[byte] & !(1 << shift)) | ((bit as u8) << shift);
        ctx.ops().set(&args[0], bytes, None, true).await?;
        Ok(Element::Integer(old as i64))
    }
    fn getbit(ctx, args) {
        ensure_length("getbit", args.len(), |len| len == 2)?;
        let offset = parse_bit_offset(&args[1])?;
        let bytes = ctx.ops().get(&args[0]).await?.unwrap_or_default();
        Ok(Element::Integer(get_bit(&bytes, offset) as i64))
    }
    fn bitcount(ctx, args) {
        ensure_length("bitcount", args.len(), |len| matches!(len, 1 | 3 | 4))?;
        let bytes = ctx.ops().get(&args[0]).await?.unwrap_or_default();
        let range = if args.len() == 1 {
            resolve_bit_range(bytes.len(), 0, -1, &RangeUnit::Byte)
        } else {
            let (start, end) = (parse_int(&args[1])?, parse_int(&args[2])?);
            let unit = parse_range_unit(args.get(3))?;
            resolve_bit_range(bytes.len(), start, end, &unit)
        };
        let count = match range {
            Some((lo, hi)) => (lo..=hi).filter(|bit| get_bit(&bytes, *bit) == 1).count(),
            None => 0,
        };
        Ok(Element::Integer(count as i64))
    }
    fn bitpos(ctx, args) {
        ensure_length("bitpos", args.len(), |len| (2..=5).contains(&len))?;
        let target = parse_int(&args[1]).map_err(|_| groups::E_BIT_NOT_BOOL)?;
        if target != 0 && target != 1 {
            actionerr!("ERR The bit argument must be 1 or 0.");
        }
        let target = target as u8;
        let bytes = ctx.ops().get(&args[0]).await?.unwrap_or_default();
        let explicit_end = args.len() >= 4;
        let (start, end) = (
            if args.len() >= 3 { parse_int(&args[2])? } else { 0 },
            if explicit_end { parse_int(&args[3])? } else { -1 },
        );
        let unit = parse_range_unit(args.get(4))?;
        let range = resolve_bit_range(bytes.len(), start, end, &unit);
        let found = range.and_then(|(lo, hi)| {
            (lo..=hi).find(|bit| get_bit(&bytes, *bit) == target)
        });
        Ok(Element::Integer(match found {
            Some(bit) => bit as i64,
            // searching for a clear bit with no explicit end acts as if the
            // value were followed by infinite zeros
            None if target == 0 && !explicit_end => (bytes.len() * 8) as i64,
            None => -1,
        }))
    }
    fn bitop(ctx, args) {
        ensure_length("bitop", args.len(), |len| len >= 3)?;
        let operation = &args[0];
        let destination = &args[1];
        let sources = &args[2..];
        if opt_eq(operation, "NOT") && sources.len() != 1 {
            actionerr!("ERR BITOP NOT must be called with a single source key.");
        }
        let mut values = Vec::with_capacity(sources.len());
        for source in sources {
            values.push(ctx.ops().get(source).await?.unwrap_or_default());
        }
        let result = if opt_eq(operation, "NOT") {
            values[0].iter().map(|b| !b).collect::<Vec<u8>>()
        } else {
            let width = values.iter().map(Vec::len).max().unwrap_or(0);
            let fold: fn(u8, u8) -> u8 = if opt_eq(operation, "AND") {
                |a, b| a & b
            } else if opt_eq(operation, "OR") {
                |a, b| a | b
            } else if opt_eq(operation, "XOR") {
                |a, b| a ^ b
            } else {
                actionerr!(groups::E_SYNTAX);
            };
            (0..width)
                .map(|index| {
                    values
                        .iter()
                        .map(|value| value.get(index).copied().unwrap_or(0))
                        .reduce(fold)
                        .unwrap_or(0)
                })
                .collect()
        };
        let len = result.len();
        if len == 0 {
            ctx.ops().del(&[destination]).await?;
        } else {
            ctx.ops().set(destination, result, None, false).await?;
        }
        Ok(Element::Integer(len as i64))
    }
    fn bitfield(ctx, args) {
        ensure_length("bitfield", args.len(), |len| len >= 1)?;
        let mut ops = Vec::new();
        let mut rest = args[1..].iter();
        while let Some(sub) = rest.next() {
            if opt_eq(sub, "GET") {
                let enc = parse_encoding(rest.next().ok_or(groups::E_SYNTAX)?)?;
                let offset = parse_field_offset(rest.next().ok_or(groups::E_SYNTAX)?, enc)?;
                ops.push(BitfieldOp::Get { enc, offset });
            } else if opt_eq(sub, "SET") {
                let enc = parse_encoding(rest.next().ok_or(groups::E_SYNTAX)?)?;
                let offset = parse_field_offset(rest.next().ok_or(groups::E_SYNTAX)?, enc)?;
                let value = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                ops.push(BitfieldOp::Set { enc, offset, value });
            } else if opt_eq(sub, "INCRBY") {
                let enc = parse_encoding(rest.next().ok_or(groups::E_SYNTAX)?)?;
                let offset = parse_field_offset(rest.next().ok_or(groups::E_SYNTAX)?, enc)?;
                let delta = parse_int(rest.next().ok_or(groups::E_SYNTAX)?)?;
                ops.push(BitfieldOp::IncrBy { enc, offset, delta });
            } else if opt_eq(sub, "OVERFLOW") {
                // parsed for compatibility; the engine always wraps
                let mode = rest.next().ok_or(groups::E_SYNTAX)?;
                if !(opt_eq(mode, "WRAP") || opt_eq(mode, "SAT") || opt_eq(mode, "FAIL")) {
                    actionerr!("ERR Invalid OVERFLOW type specified");
                }
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
        if ops.is_empty() {
            return Ok(Element::Array(Vec::new()));
        }
        let replies = ctx.ops().bitfield(&args[0], &ops).await?;
        Ok(Element::Array(
            replies
                .into_iter()
                .map(|reply| reply.map_or(Element::NilBulk, Element::Integer))
                .collect(),
        ))
    }
}

fn parse_range_unit(arg: Option<&Bytes>) -> super::ActionResult<RangeUnit> {
    match arg {
        None => Ok(RangeUnit::Byte),
        Some(arg) if opt_eq(arg, "BYTE") => Ok(RangeUnit::Byte),
        Some(arg) if opt_eq(arg, "BIT") => Ok(RangeUnit::Bit),
        Some(_) => Err(super::ActionError::Error(groups::E_SYNTAX.to_owned())),
    }
}

/// `u1`..`u63` / `i1`..`i64`
fn parse_encoding(arg: &[u8]) -> super::ActionResult<BitfieldEncoding> {
    let bad = || {
        super::ActionError::Error(
            "ERR Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is."
                .to_owned(),
        )
    };
    let (signed, digits) = match arg.split_first() {
        Some((b'i', digits)) => (true, digits),
        Some((b'u', digits)) => (false, digits),
        _ => return Err(bad()),
    };
    let bits = core::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<u8>().ok())
        .ok_or_else(bad)?;
    let max = if signed { 64 } else { 63 };
    if bits == 0 || bits > max {
        return Err(bad());
    }
    Ok(BitfieldEncoding { signed, bits })
}

/// A plain bit offset, or `#N` for the N-th slot of this encoding's width
fn parse_field_offset(arg: &[u8], enc: BitfieldEncoding) -> super::ActionResult<u64> {
    match arg.split_first() {
        Some((b'#', rest)) => {
            let slot = parse_int(rest).map_err(|_| groups::E_OFFSET_OUT_OF_RANGE)?;
            if slot < 0 {
                actionerr!(groups::E_OFFSET_OUT_OF_RANGE);
            }
            (slot as u64)
                .checked_mul(enc.bits as u64)
                .filter(|offset| *offset <= MAX_BIT_OFFSET as u64)
                .ok_or_else(|| super::ActionError::Error(groups::E_OFFSET_OUT_OF_RANGE.to_owned()))
        }
        _ => parse_bit_offset(arg),
    }
}
