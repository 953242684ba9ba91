/*
 * Created on Sun Jan 01 2023
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

//! # resqld
//!
//! The `resqld` crate is the database server: the RESP2/RESP3 codec, the
//! per-connection state machine, the command executor over an abstract
//! storage capability, MULTI/EXEC, pub/sub and the Lua scripting sub-engine.
//! See the individual modules for their respective documentation.

use {
    env_logger::Builder,
    std::env,
};

#[macro_use]
mod util;
mod actions;
mod arbiter;
mod auth;
mod config;
mod dbnet;
mod protocol;
mod pubsub;
mod queryengine;
mod scripting;
mod stats;
mod storage;

/// A shorthand we use all over the networking layer
pub type IoResult<T> = std::io::Result<T>;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
/// Jemallocator - this is the default memory allocator for platforms other
/// than msvc
static GLOBAL: Jemalloc = Jemalloc;

/// The terminal art for `!noart` configurations
static TEXT: &str = "
██████  ███████ ███████  ██████  ██      ██████
██   ██ ██      ██      ██    ██ ██      ██   ██
██████  █████   ███████ ██    ██ ██      ██   ██
██   ██ ██           ██ ██ ▄▄ ██ ██      ██   ██
██   ██ ███████ ███████  ██████  ███████ ██████
                            ▀▀                  ";

fn main() {
    Builder::new()
        .parse_filters(&env::var("RESQ_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let cfg = match config::get_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("{}", e);
            libresq::util::write_error("Startup failed. Please check the configuration");
            util::exit_error();
        }
    };
    if !cfg.noart {
        println!("{TEXT}");
    }
    log::info!("resqld v{} | {}", libresq::VERSION, libresq::URL);
    stats::mark_started();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to build the runtime: {}", e);
            util::exit_error();
        }
    };
    if let Err(e) = runtime.block_on(arbiter::run(cfg)) {
        log::error!("Server failed with: {}", e);
        libresq::util::write_error("The server had to exit abnormally");
        util::exit_error();
    }
    log::info!("Goodbye :)");
}
