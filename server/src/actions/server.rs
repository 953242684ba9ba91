/*
 * Created on Wed May 24 2023
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

//! The server family: INFO, DBSIZE and the flushes (a single-database
//! deployment makes FLUSHALL a spelling of FLUSHDB)

use {
    super::ensure_length,
    crate::{
        protocol::{responses, Element},
        stats,
    },
    std::fmt::Write,
};

action! {
    fn info(ctx, args) {
        ensure_length("info", args.len(), |len| len <= 1)?;
        let keys = ctx.ops().db_size().await?;
        let mut out = String::new();
        let _ = write!(
            out,
            "# Server\r\n\
             redis_version:{compat}\r\n\
             resqld_version:{version}\r\n\
             redis_mode:standalone\r\n\
             os:{os}\r\n\
             process_id:{pid}\r\n\
             uptime_in_seconds:{uptime}\r\n\
             \r\n\
             # Stats\r\n\
             total_connections_received:{conns}\r\n\
             total_commands_processed:{cmds}\r\n\
             \r\n\
             # Keyspace\r\n\
             db0:keys={keys},expires=0,avg_ttl=0\r\n",
            compat = responses::COMPAT_VERSION,
            version = libresq::VERSION,
            os = std::env::consts::OS,
            pid = std::process::id(),
            uptime = stats::uptime_seconds(),
            conns = stats::STATS.connections_received(),
            cmds = stats::STATS.commands_processed(),
        );
        Ok(Element::bulk(out))
    }
    fn dbsize(ctx, args) {
        ensure_length("dbsize", args.len(), |len| len == 0)?;
        Ok(Element::Integer(ctx.ops().db_size().await? as i64))
    }
    fn flushdb(ctx, args) {
        ensure_length("flushdb", args.len(), |len| len <= 1)?;
        ctx.ops().flush_db().await?;
        Ok(Element::ok())
    }
    fn flushall(ctx, args) {
        ensure_length("flushall", args.len(), |len| len <= 1)?;
        ctx.ops().flush_db().await?;
        Ok(Element::ok())
    }
}
