/*
 * Created on Sat Jun 17 2023
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

//! # The Lua runtime
//!
//! One sandboxed Lua 5.4 state per execution, restricted to the table,
//! string and math libraries. `KEYS`/`ARGV` are 1-indexed tables of byte
//! strings; the `redis` table carries the call surface. Value conversion in
//! both directions follows the classic RESP2 mapping (nil becomes `false`,
//! arrays are 1-indexed tables, `{ok=..}`/`{err=..}` wrap statuses and
//! errors).

use {
    super::{cache::sha1_hex, is_forbidden_in_scripts},
    crate::{
        actions::{ActionResult, ExecCtx},
        protocol::{responses::groups, Element, ProtocolVersion},
        queryengine,
        util::format_f64,
    },
    bytes::Bytes,
    mlua::{Lua, LuaOptions, StdLib, Value as LuaValue, Variadic},
    std::fmt,
};

/// A `redis.call` abort: the wrapped message *is* the EVAL error reply
#[derive(Debug)]
struct ScriptAbort(String);

impl fmt::Display for ScriptAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ScriptAbort {}

/// Walk the mlua error chain looking for a [`ScriptAbort`]
fn extract_abort(err: &mlua::Error) -> Option<String> {
    match err {
        mlua::Error::CallbackError { cause, .. } => extract_abort(cause),
        mlua::Error::ExternalError(external) => external
            .downcast_ref::<ScriptAbort>()
            .map(|abort| abort.0.clone()),
        mlua::Error::WithContext { cause, .. } => extract_abort(cause),
        _ => None,
    }
}

/// Execute `source` with the given KEYS/ARGV against the context's current
/// ops handle
pub async fn run_script(
    ctx: &ExecCtx,
    source: &[u8],
    keys: Vec<Bytes>,
    argv: Vec<Bytes>,
) -> ActionResult<Element> {
    // scripts always see the RESP2 value mapping, whatever the connection
    // negotiated; only the final reply is serialized per the real protocol
    let mut script_ctx = ctx.clone();
    script_ctx.proto = ProtocolVersion::V2;
    match run_script_inner(&script_ctx, source, keys, argv).await {
        Ok(element) => Ok(element),
        Err(lua_err) => match extract_abort(&lua_err) {
            Some(message) => Ok(Element::Error(message)),
            None => Ok(Element::Error(format!(
                "ERR Error running script: {}",
                first_line(&lua_err.to_string())
            ))),
        },
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}

async fn run_script_inner(
    ctx: &ExecCtx,
    source: &[u8],
    keys: Vec<Bytes>,
    argv: Vec<Bytes>,
) -> mlua::Result<Element> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;
    {
        let globals = lua.globals();
        globals.set("KEYS", byte_table(&lua, &keys)?)?;
        globals.set("ARGV", byte_table(&lua, &argv)?)?;
        globals.set("redis", redis_table(&lua, ctx)?)?;
    }
    let value = lua
        .load(source)
        .set_name("user_script")
        .eval_async::<LuaValue>()
        .await?;
    lua_to_resp(&value)
}

fn byte_table<'lua>(lua: &'lua Lua, items: &[Bytes]) -> mlua::Result<mlua::Table<'lua>> {
    let table = lua.create_table_with_capacity(items.len(), 0)?;
    for (index, item) in items.iter().enumerate() {
        table.set(index + 1, lua.create_string(item)?)?;
    }
    Ok(table)
}

fn redis_table<'lua>(lua: &'lua Lua, ctx: &ExecCtx) -> mlua::Result<mlua::Table<'lua>> {
    let redis = lua.create_table()?;

    let call_ctx = ctx.clone();
    redis.set(
        "call",
        lua.create_async_function(move |lua, args: Variadic<LuaValue>| {
            let ctx = call_ctx.clone();
            async move {
                match dispatch_from_script(&ctx, &args).await {
                    Ok(element) if element.is_error() => {
                        let message = match element {
                            Element::Error(e) | Element::BulkError(e) => e,
                            _ => unreachable!(),
                        };
                        Err(mlua::Error::external(ScriptAbort(message)))
                    }
                    Ok(element) => resp_to_lua(lua, element),
                    Err(message) => Err(mlua::Error::external(ScriptAbort(message))),
                }
            }
        })?,
    )?;

    let pcall_ctx = ctx.clone();
    redis.set(
        "pcall",
        lua.create_async_function(move |lua, args: Variadic<LuaValue>| {
            let ctx = pcall_ctx.clone();
            async move {
                match dispatch_from_script(&ctx, &args).await {
                    Ok(element) if element.is_error() => {
                        let message = match element {
                            Element::Error(e) | Element::BulkError(e) => e,
                            _ => unreachable!(),
                        };
                        err_table(lua, &message)
                    }
                    Ok(element) => resp_to_lua(lua, element),
                    Err(message) => err_table(lua, &message),
                }
            }
        })?,
    )?;

    redis.set(
        "error_reply",
        lua.create_function(|lua, message: mlua::String| {
            let table = lua.create_table()?;
            table.set("err", message)?;
            Ok(table)
        })?,
    )?;
    redis.set(
        "status_reply",
        lua.create_function(|lua, message: mlua::String| {
            let table = lua.create_table()?;
            table.set("ok", message)?;
            Ok(table)
        })?,
    )?;
    redis.set(
        "sha1hex",
        lua.create_function(|lua, data: mlua::String| {
            lua.create_string(sha1_hex(data.as_bytes()))
        })?,
    )?;
    redis.set(
        "log",
        lua.create_function(|_, _args: Variadic<LuaValue>| Ok(()))?,
    )?;
    // log level constants, accepted and ignored along with redis.log itself
    redis.set("LOG_DEBUG", 0)?;
    redis.set("LOG_VERBOSE", 1)?;
    redis.set("LOG_NOTICE", 2)?;
    redis.set("LOG_WARNING", 3)?;
    Ok(redis)
}

fn err_table<'lua>(lua: &'lua Lua, message: &str) -> mlua::Result<LuaValue<'lua>> {
    let table = lua.create_table()?;
    table.set("err", lua.create_string(message)?)?;
    Ok(LuaValue::Table(table))
}

/// Run one `redis.call`/`redis.pcall` invocation: convert the arguments,
/// gate the verb, re-enter the executor. The error arm is a plain message
/// (the caller decides whether it aborts or becomes `{err=..}`)
async fn dispatch_from_script(
    ctx: &ExecCtx,
    args: &[LuaValue<'_>],
) -> Result<Element, String> {
    if args.is_empty() {
        return Err("ERR Please specify at least one argument for this redis lib call".to_owned());
    }
    let mut parts: Vec<Bytes> = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(lua_arg_to_bytes(arg)?);
    }
    let verb = String::from_utf8_lossy(&parts[0]).to_ascii_uppercase();
    if is_forbidden_in_scripts(&verb) {
        return Err(groups::E_SCRIPT_FORBIDDEN.to_owned());
    }
    let rest = &parts[1..];
    match verb.as_str() {
        // the two stateless conveniences scripts are allowed
        "PING" => Ok(Element::simple("PONG")),
        "ECHO" if rest.len() == 1 => Ok(Element::BulkString(rest[0].to_vec())),
        _ => match queryengine::run_data_command(ctx, &verb, rest).await {
            Some(Ok(element)) => Ok(element),
            Some(Err(action_err)) => match action_err.into_element() {
                Element::Error(message) => Err(message),
                _ => Err("ERR Error running script".to_owned()),
            },
            None => Err("ERR Unknown Redis command called from script".to_owned()),
        },
    }
}

fn lua_arg_to_bytes(value: &LuaValue<'_>) -> Result<Bytes, String> {
    match value {
        LuaValue::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        LuaValue::Integer(i) => Ok(Bytes::from(i.to_string())),
        LuaValue::Number(n) => Ok(Bytes::from(format_f64(*n))),
        _ => Err(
            "ERR Lua redis lib command arguments must be strings or integers".to_owned(),
        ),
    }
}

/// RESP reply to Lua value, the classic RESP2 mapping
fn resp_to_lua<'lua>(lua: &'lua Lua, element: Element) -> mlua::Result<LuaValue<'lua>> {
    Ok(match element {
        Element::SimpleString(s) => {
            let table = lua.create_table()?;
            table.set("ok", lua.create_string(s)?)?;
            LuaValue::Table(table)
        }
        Element::Error(e) | Element::BulkError(e) => {
            let table = lua.create_table()?;
            table.set("err", lua.create_string(e)?)?;
            LuaValue::Table(table)
        }
        Element::Integer(i) => LuaValue::Integer(i),
        Element::BulkString(payload) | Element::VerbatimString(_, payload) => {
            LuaValue::String(lua.create_string(payload)?)
        }
        Element::NilBulk | Element::NilArray | Element::Null => LuaValue::Boolean(false),
        Element::Boolean(b) => {
            if b {
                LuaValue::Integer(1)
            } else {
                LuaValue::Boolean(false)
            }
        }
        Element::Double(d) => LuaValue::Number(d),
        Element::BigNumber(digits) => LuaValue::String(lua.create_string(digits)?),
        Element::Array(elements) | Element::Set(elements) | Element::Push(elements) => {
            let table = lua.create_table_with_capacity(elements.len(), 0)?;
            for (index, element) in elements.into_iter().enumerate() {
                table.set(index + 1, resp_to_lua(lua, element)?)?;
            }
            LuaValue::Table(table)
        }
        Element::Map(pairs) => {
            // scripts see the flat RESP2 shape
            let table = lua.create_table_with_capacity(pairs.len() * 2, 0)?;
            let mut index = 1;
            for (key, value) in pairs {
                table.set(index, resp_to_lua(lua, key)?)?;
                table.set(index + 1, resp_to_lua(lua, value)?)?;
                index += 2;
            }
            LuaValue::Table(table)
        }
    })
}

/// Lua value to RESP reply
fn lua_to_resp(value: &LuaValue<'_>) -> mlua::Result<Element> {
    Ok(match value {
        LuaValue::Nil => Element::NilBulk,
        LuaValue::Boolean(false) => Element::NilBulk,
        LuaValue::Boolean(true) => Element::Integer(1),
        LuaValue::Integer(i) => Element::Integer(*i),
        LuaValue::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.2e18 {
                Element::Integer(*n as i64)
            } else {
                Element::bulk(format_f64(*n))
            }
        }
        LuaValue::String(s) => Element::BulkString(s.as_bytes().to_vec()),
        LuaValue::Table(table) => {
            if let Ok(err) = table.get::<_, mlua::String>("err") {
                return Ok(Element::Error(
                    String::from_utf8_lossy(err.as_bytes()).into_owned(),
                ));
            }
            if let Ok(ok) = table.get::<_, mlua::String>("ok") {
                return Ok(Element::SimpleString(ok.as_bytes().to_vec()));
            }
            // the standard "Lua array" convention: integer keys from 1,
            // stopping at the first nil
            let mut elements = Vec::new();
            let mut index = 1;
            loop {
                let item: LuaValue = table.get(index)?;
                if matches!(item, LuaValue::Nil) {
                    break;
                }
                elements.push(lua_to_resp(&item)?);
                index += 1;
            }
            Element::Array(elements)
        }
        // functions, userdata and friends have no wire shape
        _ => Element::NilBulk,
    })
}
