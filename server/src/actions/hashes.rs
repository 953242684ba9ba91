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

//! The hash family

use {
    super::{
        ensure_length,
        keys::{parse_cursor, parse_scan_opts, scan_window},
        parse_float, parse_int,
    },
    crate::{
        protocol::{Element, ProtocolVersion},
        util::{format_f64, glob},
    },
};

fn field_pairs(args: &[bytes::Bytes]) -> Vec<(Vec<u8>, Vec<u8>)> {
    args.chunks_exact(2)
        .map(|pair| (pair[0].to_vec(), pair[1].to_vec()))
        .collect()
}

action! {
    fn hget(ctx, args) {
        ensure_length("hget", args.len(), |len| len == 2)?;
        match ctx.ops().h_get(&args[0], &args[1]).await? {
            Some(value) => Ok(Element::BulkString(value)),
            None => Ok(Element::NilBulk),
        }
    }
    fn hset(ctx, args) {
        ensure_length("hset", args.len(), |len| len >= 3 && len % 2 == 1)?;
        let created = ctx.ops().h_set(&args[0], field_pairs(&args[1..])).await?;
        Ok(Element::Integer(created as i64))
    }
    fn hmset(ctx, args) {
        ensure_length("hmset", args.len(), |len| len >= 3 && len % 2 == 1)?;
        ctx.ops().h_set(&args[0], field_pairs(&args[1..])).await?;
        Ok(Element::ok())
    }
    fn hsetnx(ctx, args) {
        ensure_length("hsetnx", args.len(), |len| len == 3)?;
        let created = ctx
            .ops()
            .h_set_nx(&args[0], &args[1], args[2].to_vec())
            .await?;
        Ok(Element::Integer(created as i64))
    }
    fn hdel(ctx, args) {
        ensure_length("hdel", args.len(), |len| len >= 2)?;
        let fields = super::as_slices(&args[1..]);
        let removed = ctx.ops().h_del(&args[0], &fields).await?;
        Ok(Element::Integer(removed as i64))
    }
    /// On RESP3 this is a real map; RESP2 gets the flat field/value array
    fn hgetall(ctx, args) {
        ensure_length("hgetall", args.len(), |len| len == 1)?;
        let pairs = ctx.ops().h_get_all(&args[0]).await?;
        Ok(match ctx.proto {
            ProtocolVersion::V3 => Element::Map(
                pairs
                    .into_iter()
                    .map(|(f, v)| (Element::BulkString(f), Element::BulkString(v)))
                    .collect(),
            ),
            ProtocolVersion::V2 => Element::Array(
                pairs
                    .into_iter()
                    .flat_map(|(f, v)| [Element::BulkString(f), Element::BulkString(v)])
                    .collect(),
            ),
        })
    }
    fn hmget(ctx, args) {
        ensure_length("hmget", args.len(), |len| len >= 2)?;
        let fields = super::as_slices(&args[1..]);
        let values = ctx.ops().h_mget(&args[0], &fields).await?;
        Ok(Element::Array(
            values
                .into_iter()
                .map(|v| v.map_or(Element::NilBulk, Element::BulkString))
                .collect(),
        ))
    }
    fn hexists(ctx, args) {
        ensure_length("hexists", args.len(), |len| len == 2)?;
        let found = ctx.ops().h_exists(&args[0], &args[1]).await?;
        Ok(Element::Integer(found as i64))
    }
    fn hkeys(ctx, args) {
        ensure_length("hkeys", args.len(), |len| len == 1)?;
        Ok(Element::string_array(ctx.ops().h_keys(&args[0]).await?))
    }
    fn hvals(ctx, args) {
        ensure_length("hvals", args.len(), |len| len == 1)?;
        Ok(Element::string_array(ctx.ops().h_vals(&args[0]).await?))
    }
    fn hlen(ctx, args) {
        ensure_length("hlen", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().h_len(&args[0]).await? as i64))
    }
    fn hincrby(ctx, args) {
        ensure_length("hincrby", args.len(), |len| len == 3)?;
        let delta = parse_int(&args[2])?;
        let new = ctx.ops().h_incr_by(&args[0], &args[1], delta).await?;
        Ok(Element::Integer(new))
    }
    fn hincrbyfloat(ctx, args) {
        ensure_length("hincrbyfloat", args.len(), |len| len == 3)?;
        let delta = parse_float(&args[2])?;
        let new = ctx.ops().h_incr_by_float(&args[0], &args[1], delta).await?;
        Ok(Element::bulk(format_f64(new)))
    }
    fn hscan(ctx, args) {
        ensure_length("hscan", args.len(), |len| len >= 2)?;
        let cursor = parse_cursor(&args[1])?;
        let (pattern, count) = parse_scan_opts(&args[2..])?;
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = ctx
            .ops()
            .h_get_all(&args[0])
            .await?
            .into_iter()
            .filter(|(field, _)| glob::matches(&pattern, field))
            .collect();
        let (next, page) = scan_window(pairs, cursor, count);
        Ok(Element::Array(vec![
            Element::bulk(next.to_string()),
            Element::Array(
                page.into_iter()
                    .flat_map(|(f, v)| [Element::BulkString(f), Element::BulkString(v)])
                    .collect(),
            ),
        ]))
    }
}
