/*
 * Created on Sun Jun 25 2023
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

//! The connection-state verbs: everything that reads or mutates the
//! per-client bundle and never touches storage

use {
    super::{Verdict, ALL_VERBS},
    crate::{
        actionerr,
        actions::{ensure_length, opt_eq, parse_int, ActionError, ActionResult},
        dbnet::{BufferedSocketStream, ConnectionHandler},
        protocol::{responses, responses::groups, Element, ProtocolVersion},
    },
    bytes::Bytes,
};

/// Handle a connection-state verb that produces a single reply element.
/// Returns `None` for verbs that belong to other layers
pub async fn run_immediate<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    verb: &str,
    args: &[Bytes],
) -> Option<ActionResult<Element>> {
    Some(match verb {
        "PING" => ping(args),
        "ECHO" => echo(args),
        "AUTH" => auth(handler, args),
        "HELLO" => hello(handler, args),
        "SELECT" => select(args),
        "COMMAND" => command(args),
        "CLIENT" => client(handler, args),
        _ => return None,
    })
}

fn ping(args: &[Bytes]) -> ActionResult<Element> {
    ensure_length("ping", args.len(), |len| len <= 1)?;
    Ok(match args.first() {
        Some(message) => Element::BulkString(message.to_vec()),
        None => Element::simple("PONG"),
    })
}

fn echo(args: &[Bytes]) -> ActionResult<Element> {
    ensure_length("echo", args.len(), |len| len == 1)?;
    Ok(Element::BulkString(args[0].to_vec()))
}

fn auth<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    args: &[Bytes],
) -> ActionResult<Element> {
    ensure_length("auth", args.len(), |len| len == 1 || len == 2)?;
    if !handler.auth.provider().is_enabled() {
        actionerr!(
            "ERR Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?"
        );
    }
    // with two arguments the first is a username; only `default` is real but
    // any name is accepted (and ignored)
    let password = args.last().map(|p| p.as_ref()).unwrap_or_default();
    if handler.auth.provider().verify(password) {
        handler.auth.set_auth();
        Ok(Element::ok())
    } else {
        actionerr!(groups::E_WRONGPASS)
    }
}

fn hello<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    args: &[Bytes],
) -> ActionResult<Element> {
    let mut proto = handler.state.proto;
    let mut rest = args.iter();
    if let Some(requested) = rest.next() {
        proto = match parse_int(requested) {
            Ok(2) => ProtocolVersion::V2,
            Ok(3) => ProtocolVersion::V3,
            _ => actionerr!(groups::E_NOPROTO),
        };
        while let Some(opt) = rest.next() {
            if opt_eq(opt, "AUTH") {
                let _username = rest.next().ok_or(groups::E_SYNTAX)?;
                let password = rest.next().ok_or(groups::E_SYNTAX)?;
                if !handler.auth.provider().is_enabled() {
                    actionerr!(
                        "ERR Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?"
                    );
                }
                if !handler.auth.provider().verify(password) {
                    actionerr!(groups::E_WRONGPASS);
                }
                handler.auth.set_auth();
            } else if opt_eq(opt, "SETNAME") {
                let name = rest.next().ok_or(groups::E_SYNTAX)?;
                validate_client_name(name)?;
                handler.state.name = name.to_vec();
            } else {
                actionerr!(groups::E_SYNTAX);
            }
        }
    }
    if !handler.auth.authenticated() {
        actionerr!(
            "NOAUTH HELLO must be called with the client already authenticated, otherwise the HELLO AUTH <user> <pass> option can be used to authenticate the client and select the RESP protocol version at the same time"
        );
    }
    handler.state.proto = proto;
    Ok(Element::Map(vec![
        (
            Element::bulk("server"),
            Element::bulk(responses::SERVER_NAME),
        ),
        (
            Element::bulk("version"),
            Element::bulk(responses::COMPAT_VERSION),
        ),
        (Element::bulk("proto"), Element::Integer(proto.number())),
        (
            Element::bulk("id"),
            Element::Integer(handler.state.id as i64),
        ),
        (Element::bulk("mode"), Element::bulk("standalone")),
        (Element::bulk("role"), Element::bulk("master")),
        (Element::bulk("modules"), Element::Array(Vec::new())),
    ]))
}

fn select(args: &[Bytes]) -> ActionResult<Element> {
    ensure_length("select", args.len(), |len| len == 1)?;
    match parse_int(&args[0]) {
        // a single-database deployment: only db 0 exists
        Ok(0) => Ok(Element::ok()),
        Ok(_) => Err(ActionError::Error(groups::E_SELECT_INVALID_DB.to_owned())),
        Err(e) => Err(e),
    }
}

fn command(args: &[Bytes]) -> ActionResult<Element> {
    match args.first() {
        None => Ok(Element::Array(Vec::new())),
        Some(sub) if opt_eq(sub, "COUNT") => {
            Ok(Element::Integer(ALL_VERBS.len() as i64))
        }
        Some(sub) if opt_eq(sub, "DOCS") => Ok(Element::Array(Vec::new())),
        Some(sub) => Err(ActionError::Error(format!(
            "ERR Unknown subcommand or wrong number of arguments for '{}'. Try COMMAND COUNT",
            String::from_utf8_lossy(sub)
        ))),
    }
}

fn client<C: BufferedSocketStream>(
    handler: &mut ConnectionHandler<C>,
    args: &[Bytes],
) -> ActionResult<Element> {
    ensure_length("client", args.len(), |len| len >= 1)?;
    let sub = &args[0];
    if opt_eq(sub, "ID") {
        ensure_length("client|id", args.len(), |len| len == 1)?;
        Ok(Element::Integer(handler.state.id as i64))
    } else if opt_eq(sub, "GETNAME") {
        ensure_length("client|getname", args.len(), |len| len == 1)?;
        Ok(Element::BulkString(handler.state.name.clone()))
    } else if opt_eq(sub, "SETNAME") {
        ensure_length("client|setname", args.len(), |len| len == 2)?;
        validate_client_name(&args[1])?;
        handler.state.name = args[1].to_vec();
        Ok(Element::ok())
    } else if opt_eq(sub, "SETINFO") {
        ensure_length("client|setinfo", args.len(), |len| len == 3)?;
        if opt_eq(&args[1], "LIB-NAME") {
            handler.state.lib_name = args[2].to_vec();
        } else if opt_eq(&args[1], "LIB-VER") {
            handler.state.lib_version = args[2].to_vec();
        } else {
            actionerr!(groups::E_SYNTAX);
        }
        Ok(Element::ok())
    } else if opt_eq(sub, "INFO") {
        ensure_length("client|info", args.len(), |len| len == 1)?;
        Ok(Element::bulk(describe_client(handler)))
    } else if opt_eq(sub, "LIST") {
        // one line per connection; this handler only knows itself
        ensure_length("client|list", args.len(), |len| len == 1)?;
        let mut line = describe_client(handler);
        line.push('\n');
        Ok(Element::bulk(line))
    } else {
        Err(ActionError::Error(format!(
            "ERR Unknown subcommand or wrong number of arguments for '{}'. Try CLIENT HELP.",
            String::from_utf8_lossy(sub)
        )))
    }
}

fn describe_client<C: BufferedSocketStream>(handler: &ConnectionHandler<C>) -> String {
    let state = &handler.state;
    let (channels, patterns) = handler.env.hub.subscription_counts(state.id);
    format!(
        "id={} addr={} name={} age={} sub={} psub={} multi={} resp={} lib-name={} lib-ver={}",
        state.id,
        state.addr,
        String::from_utf8_lossy(&state.name),
        (chrono::Utc::now() - state.connected_at).num_seconds(),
        channels,
        patterns,
        state
            .txn
            .as_ref()
            .map_or(-1, |txn| txn.queue.len() as i64),
        state.proto.number(),
        String::from_utf8_lossy(&state.lib_name),
        String::from_utf8_lossy(&state.lib_version),
    )
}

fn validate_client_name(name: &[u8]) -> ActionResult<()> {
    if name
        .iter()
        .any(|b| *b < b'!' || *b > b'~')
    {
        actionerr!("ERR Client names cannot contain spaces, newlines or special characters.");
    }
    Ok(())
}

/// RESET: back to a pristine Normal state, keeping only authentication and
/// the negotiated protocol version
pub fn reset<C: BufferedSocketStream>(handler: &mut ConnectionHandler<C>) -> Verdict {
    handler.state.txn = None;
    handler.state.name.clear();
    handler.env.hub.disconnect(handler.state.id);
    Verdict::Reply(Element::simple("RESET"))
}
