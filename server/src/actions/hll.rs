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

//! The HyperLogLog family. Cardinality estimation is the storage engine's
//! problem; this layer only shapes arguments and replies

use {
    super::{as_slices, ensure_length},
    crate::protocol::Element,
};

action! {
    fn pfadd(ctx, args) {
        ensure_length("pfadd", args.len(), |len| len >= 1)?;
        let elements = args[1..].iter().map(|arg| arg.to_vec()).collect();
        let changed = ctx.ops().pf_add(&args[0], elements).await?;
        Ok(Element::Integer(changed as i64))
    }
    fn pfcount(ctx, args) {
        ensure_length("pfcount", args.len(), |len| len >= 1)?;
        let count = ctx.ops().pf_count(&as_slices(args)).await?;
        Ok(Element::Integer(count as i64))
    }
    fn pfmerge(ctx, args) {
        ensure_length("pfmerge", args.len(), |len| len >= 1)?;
        ctx.ops().pf_merge(&args[0], &as_slices(&args[1..])).await?;
        Ok(Element::ok())
    }
}
