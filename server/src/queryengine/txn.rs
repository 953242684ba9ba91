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

//! # MULTI/EXEC
//!
//! The transaction buffer lives on the client state between MULTI and
//! EXEC/DISCARD. Queued commands are not interpreted beyond a known-verb
//! check; anything suspicious sets the sticky error bit (and is still
//! appended), and EXEC answers EXECABORT without ever opening a storage
//! transaction. A clean EXEC opens exactly one transaction, re-dispatches
//! the queue against it in FIFO order, collects every reply (errors
//! included; a runtime error inside MULTI aborts nothing) and commits.
//!
//! WATCH/UNWATCH are acknowledged no-ops: the storage collaborator provides
//! transaction isolation, so there is no modified-key bookkeeping here.

use {
    super::{execute_queued, Verdict},
    crate::{
        dbnet::{BufferedSocketStream, ConnectionHandler},
        protocol::{responses::groups, Element},
        storage::OpsHandle,
    },
    bytes::Bytes,
};

/// The per-connection command queue between MULTI and EXEC
#[derive(Default)]
pub struct TransactionBuffer {
    /// the queued frames, verb first, FIFO
    pub queue: Vec<Vec<Bytes>>,
    /// sticky: a queue-time error happened; EXEC must abort
    pub has_error: bool,
}

/// Buffer one command frame while in Transaction mode
pub fn enqueue<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    verb: &str,
    parts: &[Bytes],
) -> Verdict {
    let Some(buffer) = handler.state.txn.as_mut() else {
        return Verdict::Reply(Element::err(groups::E_EXEC_WITHOUT_MULTI));
    };
    if matches!(verb, "SUBSCRIBE" | "PSUBSCRIBE") {
        buffer.has_error = true;
        return Verdict::Reply(Element::err(groups::E_SUBSCRIBE_IN_MULTI));
    }
    buffer.queue.push(parts.to_vec());
    if super::is_known_verb(verb) {
        Verdict::Reply(Element::queued())
    } else {
        buffer.has_error = true;
        Verdict::Reply(Element::Error(crate::protocol::responses::unknown_command(
            &String::from_utf8_lossy(&parts[0]),
        )))
    }
}

pub fn multi<C: BufferedSocketStream>(handler: &mut ConnectionHandler<C>) -> Verdict {
    if handler.state.txn.is_some() {
        return Verdict::Reply(Element::err(groups::E_MULTI_NESTED));
    }
    handler.state.txn = Some(TransactionBuffer::default());
    Verdict::Reply(Element::ok())
}

pub fn discard<C: BufferedSocketStream>(handler: &mut ConnectionHandler<C>) -> Verdict {
    match handler.state.txn.take() {
        Some(_) => Verdict::Reply(Element::ok()),
        None => Verdict::Reply(Element::err(groups::E_DISCARD_WITHOUT_MULTI)),
    }
}

pub fn watch<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    args: &[Bytes],
) -> Verdict {
    if handler.state.txn.is_some() {
        return Verdict::Reply(Element::err("ERR WATCH inside MULTI is not allowed"));
    }
    if args.is_empty() {
        return Verdict::Reply(Element::Error(
            crate::protocol::responses::wrong_arity("watch"),
        ));
    }
    Verdict::Reply(Element::ok())
}

pub fn unwatch<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    args: &[Bytes],
) -> Verdict {
    let _ = handler;
    if !args.is_empty() {
        return Verdict::Reply(Element::Error(
            crate::protocol::responses::wrong_arity("unwatch"),
        ));
    }
    Verdict::Reply(Element::ok())
}

/// EXEC: the heart of the transaction path
pub async fn exec<C: BufferedSocketStream>(handler: &mut ConnectionHandler<C>) -> Verdict {
    let buffer = match handler.state.txn.take() {
        Some(buffer) => buffer,
        None => return Verdict::Reply(Element::err(groups::E_EXEC_WITHOUT_MULTI)),
    };
    if buffer.has_error {
        return Verdict::Reply(Element::err(groups::E_EXECABORT));
    }
    let txn = match handler.env.db.begin().await {
        Ok(txn) => txn,
        Err(e) => {
            return Verdict::Reply(Element::Error(format!(
                "ERR EXEC failed: {}",
                e.message
            )))
        }
    };
    let ctx = handler.ctx_with(OpsHandle::Txn(txn.clone()));
    let mut replies = Vec::with_capacity(buffer.queue.len());
    for parts in &buffer.queue {
        let verb = String::from_utf8_lossy(&parts[0]).to_ascii_uppercase();
        let reply = execute_queued(handler, &ctx, &verb, &parts[0], &parts[1..]).await;
        replies.push(reply);
    }
    match txn.commit().await {
        Ok(()) => Verdict::Reply(Element::Array(replies)),
        Err(e) => {
            let _ = txn.rollback().await;
            Verdict::Reply(Element::Error(format!("ERR EXEC failed: {}", e.message)))
        }
    }
}
