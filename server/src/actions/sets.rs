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

//! The set family
//!
//! The algebra (SINTER/SUNION/SDIFF and the *STORE variants) is composed
//! from plain member enumerations at this layer; multi-key atomicity is the
//! transaction's business, exactly like everywhere else.

use {
    super::{
        as_slices, ensure_length,
        keys::{parse_cursor, parse_scan_opts, scan_window},
        ExecCtx,
    },
    crate::{
        protocol::{Element, ProtocolVersion},
        util::glob,
    },
    bytes::Bytes,
    std::collections::BTreeSet,
};

fn to_vecs(args: &[Bytes]) -> Vec<Vec<u8>> {
    args.iter().map(|arg| arg.to_vec()).collect()
}

enum SetAlgebra {
    Inter,
    Union,
    Diff,
}

async fn combine(
    ctx: &ExecCtx,
    keys: &[Bytes],
    op: SetAlgebra,
) -> super::ActionResult<BTreeSet<Vec<u8>>> {
    let mut acc: BTreeSet<Vec<u8>> = ctx.ops().s_members(&keys[0]).await?.into_iter().collect();
    for key in &keys[1..] {
        let other: BTreeSet<Vec<u8>> = ctx.ops().s_members(key).await?.into_iter().collect();
        match op {
            SetAlgebra::Inter => acc = acc.intersection(&other).cloned().collect(),
            SetAlgebra::Union => acc.extend(other),
            SetAlgebra::Diff => acc = acc.difference(&other).cloned().collect(),
        }
    }
    Ok(acc)
}

/// Store the combined members at `destination`, replacing whatever was
/// there, and reply with the cardinality
async fn combine_store(
    ctx: &ExecCtx,
    destination: &[u8],
    keys: &[Bytes],
    op: SetAlgebra,
) -> super::ActionResult<Element> {
    let members = combine(ctx, keys, op).await?;
    ctx.ops().del(&[destination]).await?;
    let card = members.len();
    if card > 0 {
        ctx.ops()
            .s_add(destination, members.into_iter().collect())
            .await?;
    }
    Ok(Element::Integer(card as i64))
}

fn members_reply(ctx: &ExecCtx, members: impl IntoIterator<Item = Vec<u8>>) -> Element {
    let elements = members.into_iter().map(Element::BulkString).collect();
    match ctx.proto {
        ProtocolVersion::V3 => Element::Set(elements),
        ProtocolVersion::V2 => Element::Array(elements),
    }
}

action! {
    fn sadd(ctx, args) {
        ensure_length("sadd", args.len(), |len| len >= 2)?;
        let added = ctx.ops().s_add(&args[0], to_vecs(&args[1..])).await?;
        Ok(Element::Integer(added as i64))
    }
    fn srem(ctx, args) {
        ensure_length("srem", args.len(), |len| len >= 2)?;
        let removed = ctx.ops().s_rem(&args[0], &as_slices(&args[1..])).await?;
        Ok(Element::Integer(removed as i64))
    }
    fn smembers(ctx, args) {
        ensure_length("smembers", args.len(), |len| len == 1)?;
        let members = ctx.ops().s_members(&args[0]).await?;
        Ok(members_reply(ctx, members))
    }
    fn sismember(ctx, args) {
        ensure_length("sismember", args.len(), |len| len == 2)?;
        let found = ctx.ops().s_is_member(&args[0], &args[1]).await?;
        Ok(Element::Integer(found as i64))
    }
    fn smismember(ctx, args) {
        ensure_length("smismember", args.len(), |len| len >= 2)?;
        let mut out = Vec::with_capacity(args.len() - 1);
        for member in &args[1..] {
            let found = ctx.ops().s_is_member(&args[0], member).await?;
            out.push(Element::Integer(found as i64));
        }
        Ok(Element::Array(out))
    }
    fn scard(ctx, args) {
        ensure_length("scard", args.len(), |len| len == 1)?;
        Ok(Element::Integer(ctx.ops().s_card(&args[0]).await? as i64))
    }
    fn sscan(ctx, args) {
        ensure_length("sscan", args.len(), |len| len >= 2)?;
        let cursor = parse_cursor(&args[1])?;
        let (pattern, count) = parse_scan_opts(&args[2..])?;
        let members: Vec<Vec<u8>> = ctx
            .ops()
            .s_members(&args[0])
            .await?
            .into_iter()
            .filter(|member| glob::matches(&pattern, member))
            .collect();
        let (next, page) = scan_window(members, cursor, count);
        Ok(Element::Array(vec![
            Element::bulk(next.to_string()),
            Element::Array(page.into_iter().map(Element::BulkString).collect()),
        ]))
    }
    fn sinter(ctx, args) {
        ensure_length("sinter", args.len(), |len| len >= 1)?;
        let members = combine(ctx, args, SetAlgebra::Inter).await?;
        Ok(members_reply(ctx, members))
    }
    fn sinterstore(ctx, args) {
        ensure_length("sinterstore", args.len(), |len| len >= 2)?;
        combine_store(ctx, &args[0], &args[1..], SetAlgebra::Inter).await
    }
    fn sunion(ctx, args) {
        ensure_length("sunion", args.len(), |len| len >= 1)?;
        let members = combine(ctx, args, SetAlgebra::Union).await?;
        Ok(members_reply(ctx, members))
    }
    fn sunionstore(ctx, args) {
        ensure_length("sunionstore", args.len(), |len| len >= 2)?;
        combine_store(ctx, &args[0], &args[1..], SetAlgebra::Union).await
    }
    fn sdiff(ctx, args) {
        ensure_length("sdiff", args.len(), |len| len >= 1)?;
        let members = combine(ctx, args, SetAlgebra::Diff).await?;
        Ok(members_reply(ctx, members))
    }
    fn sdiffstore(ctx, args) {
        ensure_length("sdiffstore", args.len(), |len| len >= 2)?;
        combine_store(ctx, &args[0], &args[1..], SetAlgebra::Diff).await
    }
}
