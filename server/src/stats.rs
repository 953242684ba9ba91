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

//! Process-wide counters surfaced by INFO. Plain atomics; relaxed ordering
//! is all a monotonically-increasing statistic needs

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

pub struct Stats {
    connections_received: AtomicU64,
    commands_processed: AtomicU64,
}

pub static STATS: Stats = Stats {
    connections_received: AtomicU64::new(0),
    commands_processed: AtomicU64::new(0),
};

static STARTED_AT: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

impl Stats {
    pub fn incr_connections(&self) {
        self.connections_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_commands(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn connections_received(&self) -> u64 {
        self.connections_received.load(Ordering::Relaxed)
    }
    pub fn commands_processed(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }
}

/// Stamp process start. Called once from `main`; INFO reads the uptime off it
pub fn mark_started() {
    let _ = STARTED_AT.set(Instant::now());
}

pub fn uptime_seconds() -> u64 {
    STARTED_AT
        .get()
        .map_or(0, |started| started.elapsed().as_secs())
}
