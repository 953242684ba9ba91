/*
 * Created on Mon Jul 03 2023
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

//! The pub/sub glue: the subscribe-family verbs against the hub. Message
//! delivery itself never passes through here; the hub pushes frames into
//! the connection's queue and the writer loop drains it

use {
    super::Verdict,
    crate::{
        dbnet::{BufferedSocketStream, ConnectionHandler},
        protocol::{responses, Element},
    },
    bytes::Bytes,
};

fn to_vecs(args: &[Bytes]) -> Vec<Vec<u8>> {
    args.iter().map(|arg| arg.to_vec()).collect()
}

fn confirmation(kind: &str, subject: Option<Vec<u8>>, count: usize) -> Element {
    Element::Push(vec![
        Element::bulk(kind),
        subject.map_or(Element::NilBulk, Element::BulkString),
        Element::Integer(count as i64),
    ])
}

pub fn run<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    verb: &str,
    args: &[Bytes],
) -> Verdict {
    if !handler.env.pubsub_enabled {
        return Verdict::Reply(Element::err("ERR pub/sub support is disabled"));
    }
    let hub = handler.env.hub.clone();
    let client_id = handler.state.id;
    match verb {
        "SUBSCRIBE" => {
            if args.is_empty() {
                return wrong_arity("subscribe");
            }
            let counts = hub.subscribe(client_id, &handler.push_tx, &to_vecs(args));
            Verdict::Replies(
                counts
                    .into_iter()
                    .map(|(channel, count)| confirmation("subscribe", Some(channel), count))
                    .collect(),
            )
        }
        "PSUBSCRIBE" => {
            if args.is_empty() {
                return wrong_arity("psubscribe");
            }
            let counts = hub.psubscribe(client_id, &handler.push_tx, &to_vecs(args));
            Verdict::Replies(
                counts
                    .into_iter()
                    .map(|(pattern, count)| confirmation("psubscribe", Some(pattern), count))
                    .collect(),
            )
        }
        "UNSUBSCRIBE" => {
            let channels = (!args.is_empty()).then(|| to_vecs(args));
            let entries = hub.unsubscribe(client_id, channels.as_deref());
            Verdict::Replies(
                entries
                    .into_iter()
                    .map(|(channel, count)| confirmation("unsubscribe", channel, count))
                    .collect(),
            )
        }
        "PUNSUBSCRIBE" => {
            let patterns = (!args.is_empty()).then(|| to_vecs(args));
            let entries = hub.punsubscribe(client_id, patterns.as_deref());
            Verdict::Replies(
                entries
                    .into_iter()
                    .map(|(pattern, count)| confirmation("punsubscribe", pattern, count))
                    .collect(),
            )
        }
        // PUBLISH
        _ => {
            if args.len() != 2 {
                return wrong_arity("publish");
            }
            let delivered = hub.publish(&args[0], &args[1]);
            Verdict::Reply(Element::Integer(delivered as i64))
        }
    }
}

fn wrong_arity(cmd: &str) -> Verdict {
    Verdict::Reply(Element::Error(responses::wrong_arity(cmd)))
}
