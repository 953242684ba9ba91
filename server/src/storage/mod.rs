/*
 * Created on Wed Mar 01 2023
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

//! # The storage capability
//!
//! The executor is written exactly once, against [`DataOps`]. Two families of
//! objects satisfy it: a [`Backend`] root (every call is its own implicit
//! transaction) and an open [`Transaction`] (threaded through MULTI/EXEC and
//! scripts). Which one a command runs against is decided by the connection's
//! [`OpsHandle`], never by the command itself.
//!
//! The SQL engine lives in a collaborator crate that implements these traits;
//! this crate bundles [`memory::MemoryEngine`], a reference engine that backs
//! the standalone mode and the test-suite.
//!
//! Cancellation rides on the task scope: dropping the future of any call
//! aborts it, which is how the connection teardown path abandons in-flight
//! storage work.

pub mod error;
pub mod memory;
#[cfg(test)]
mod tests;

use {
    self::error::StorageResult,
    crate::{config::StorageConfig, util::error::ResqResult},
    async_trait::async_trait,
    std::{sync::Arc, time::Duration},
};

/// The logical type a key currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    String,
    List,
    Hash,
    Set,
    Zset,
    None,
}

impl TypeTag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Hash => "hash",
            Self::Set => "set",
            Self::Zset => "zset",
            Self::None => "none",
        }
    }
}

/// Width and signedness of a BITFIELD slot (`u8`..`u63`, `i1`..`i64`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitfieldEncoding {
    pub signed: bool,
    pub bits: u8,
}

/// One sub-operation of a BITFIELD call. OVERFLOW is parsed upstream and is
/// always applied as WRAP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitfieldOp {
    Get {
        enc: BitfieldEncoding,
        offset: u64,
    },
    Set {
        enc: BitfieldEncoding,
        offset: u64,
        value: i64,
    },
    IncrBy {
        enc: BitfieldEncoding,
        offset: u64,
        delta: i64,
    },
}

/// The full data-plane surface the executor consumes. Inputs are raw byte
/// strings; anything that smells like text stays uninterpreted here
#[async_trait]
pub trait DataOps: Send + Sync {
    // strings
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    async fn set(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
        keepttl: bool,
    ) -> StorageResult<()>;
    async fn set_nx(&self, key: &[u8], value: Vec<u8>) -> StorageResult<bool>;
    async fn mget(&self, keys: &[&[u8]]) -> StorageResult<Vec<Option<Vec<u8>>>>;
    async fn mset(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> StorageResult<()>;
    async fn incr(&self, key: &[u8], delta: i64) -> StorageResult<i64>;
    async fn incr_by_float(&self, key: &[u8], delta: f64) -> StorageResult<f64>;
    async fn append(&self, key: &[u8], suffix: &[u8]) -> StorageResult<u64>;
    async fn strlen(&self, key: &[u8]) -> StorageResult<u64>;
    async fn get_range(&self, key: &[u8], start: i64, end: i64) -> StorageResult<Vec<u8>>;
    async fn set_range(&self, key: &[u8], offset: u64, patch: &[u8]) -> StorageResult<u64>;
    async fn get_ex(
        &self,
        key: &[u8],
        ttl: Option<Duration>,
        persist: bool,
    ) -> StorageResult<Option<Vec<u8>>>;
    async fn get_del(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    async fn get_set(&self, key: &[u8], value: Vec<u8>) -> StorageResult<Option<Vec<u8>>>;
    async fn bitfield(&self, key: &[u8], ops: &[BitfieldOp]) -> StorageResult<Vec<Option<i64>>>;
    // keys
    async fn del(&self, keys: &[&[u8]]) -> StorageResult<u64>;
    async fn exists(&self, keys: &[&[u8]]) -> StorageResult<u64>;
    async fn expire(&self, key: &[u8], after: Duration) -> StorageResult<bool>;
    async fn ttl(&self, key: &[u8]) -> StorageResult<i64>;
    async fn pttl(&self, key: &[u8]) -> StorageResult<i64>;
    async fn persist(&self, key: &[u8]) -> StorageResult<bool>;
    async fn keys(&self, pattern: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
    async fn key_type(&self, key: &[u8]) -> StorageResult<TypeTag>;
    async fn rename(&self, from: &[u8], to: &[u8]) -> StorageResult<()>;
    async fn copy(&self, from: &[u8], to: &[u8], replace: bool) -> StorageResult<bool>;
    // hashes
    async fn h_get(&self, key: &[u8], field: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    async fn h_set(&self, key: &[u8], pairs: Vec<(Vec<u8>, Vec<u8>)>) -> StorageResult<u64>;
    async fn h_set_nx(&self, key: &[u8], field: &[u8], value: Vec<u8>) -> StorageResult<bool>;
    async fn h_del(&self, key: &[u8], fields: &[&[u8]]) -> StorageResult<u64>;
    async fn h_get_all(&self, key: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
    async fn h_mget(&self, key: &[u8], fields: &[&[u8]]) -> StorageResult<Vec<Option<Vec<u8>>>>;
    async fn h_exists(&self, key: &[u8], field: &[u8]) -> StorageResult<bool>;
    async fn h_keys(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
    async fn h_vals(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
    async fn h_len(&self, key: &[u8]) -> StorageResult<u64>;
    async fn h_incr_by(&self, key: &[u8], field: &[u8], delta: i64) -> StorageResult<i64>;
    async fn h_incr_by_float(&self, key: &[u8], field: &[u8], delta: f64) -> StorageResult<f64>;
    // lists
    async fn l_push(&self, key: &[u8], values: Vec<Vec<u8>>) -> StorageResult<u64>;
    async fn r_push(&self, key: &[u8], values: Vec<Vec<u8>>) -> StorageResult<u64>;
    async fn l_pop(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    async fn r_pop(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    async fn l_len(&self, key: &[u8]) -> StorageResult<u64>;
    async fn l_range(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<Vec<Vec<u8>>>;
    async fn l_index(&self, key: &[u8], index: i64) -> StorageResult<Option<Vec<u8>>>;
    async fn l_set(&self, key: &[u8], index: i64, value: Vec<u8>) -> StorageResult<()>;
    async fn l_rem(&self, key: &[u8], count: i64, value: &[u8]) -> StorageResult<u64>;
    async fn l_trim(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<()>;
    async fn l_insert(
        &self,
        key: &[u8],
        before: bool,
        pivot: &[u8],
        value: Vec<u8>,
    ) -> StorageResult<i64>;
    async fn r_pop_l_push(&self, source: &[u8], destination: &[u8])
        -> StorageResult<Option<Vec<u8>>>;
    // sets
    async fn s_add(&self, key: &[u8], members: Vec<Vec<u8>>) -> StorageResult<u64>;
    async fn s_rem(&self, key: &[u8], members: &[&[u8]]) -> StorageResult<u64>;
    async fn s_members(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
    async fn s_is_member(&self, key: &[u8], member: &[u8]) -> StorageResult<bool>;
    async fn s_card(&self, key: &[u8]) -> StorageResult<u64>;
    // sorted sets
    async fn z_add(
        &self,
        key: &[u8],
        members: Vec<(f64, Vec<u8>)>,
        nx: bool,
    ) -> StorageResult<u64>;
    async fn z_range(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
        rev: bool,
    ) -> StorageResult<Vec<(Vec<u8>, f64)>>;
    async fn z_range_by_score(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        rev: bool,
        offset: i64,
        count: i64,
    ) -> StorageResult<Vec<(Vec<u8>, f64)>>;
    async fn z_score(&self, key: &[u8], member: &[u8]) -> StorageResult<Option<f64>>;
    async fn z_rem(&self, key: &[u8], members: &[&[u8]]) -> StorageResult<u64>;
    async fn z_card(&self, key: &[u8]) -> StorageResult<u64>;
    async fn z_incr_by(&self, key: &[u8], delta: f64, member: &[u8]) -> StorageResult<f64>;
    async fn z_pop_min(&self, key: &[u8], count: u64) -> StorageResult<Vec<(Vec<u8>, f64)>>;
    async fn z_pop_max(&self, key: &[u8], count: u64) -> StorageResult<Vec<(Vec<u8>, f64)>>;
    async fn z_rem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<u64>;
    async fn z_rem_range_by_score(&self, key: &[u8], min: f64, max: f64) -> StorageResult<u64>;
    // hyperloglog
    async fn pf_add(&self, key: &[u8], elements: Vec<Vec<u8>>) -> StorageResult<bool>;
    async fn pf_count(&self, keys: &[&[u8]]) -> StorageResult<u64>;
    async fn pf_merge(&self, destination: &[u8], sources: &[&[u8]]) -> StorageResult<()>;
    // server
    async fn db_size(&self) -> StorageResult<u64>;
    async fn flush_db(&self) -> StorageResult<()>;
}

/// An open storage transaction. `commit` is idempotent after success
#[async_trait]
pub trait Transaction: DataOps {
    async fn commit(&self) -> StorageResult<()>;
    async fn rollback(&self) -> StorageResult<()>;
}

/// The storage root. Every [`DataOps`] call against it runs as its own
/// implicit single-statement transaction
#[async_trait]
pub trait Backend: DataOps {
    async fn begin(&self) -> StorageResult<Arc<dyn Transaction>>;
}

/// The capability a command executes against: the backend root or an open
/// transaction. Cloning is cheap (shared handles), which is what lets a Lua
/// script close over the same capability its calling connection holds
#[derive(Clone)]
pub enum OpsHandle {
    Root(Arc<dyn Backend>),
    Txn(Arc<dyn Transaction>),
}

impl OpsHandle {
    pub fn ops(&self) -> &dyn DataOps {
        match self {
            Self::Root(backend) => backend.as_ref(),
            Self::Txn(txn) => txn.as_ref(),
        }
    }
    pub const fn in_txn(&self) -> bool {
        matches!(self, Self::Txn(_))
    }
}

/// Open the configured storage engine. The SQL engine registers itself
/// through this factory from its own crate; the bundled reference engine is
/// always available
pub async fn open(cfg: &StorageConfig) -> ResqResult<Arc<dyn Backend>> {
    match cfg.engine {
        crate::config::StorageEngine::Memory => {
            log::info!("Initialized the bundled in-memory storage engine");
            Ok(Arc::new(memory::MemoryEngine::new()))
        }
        crate::config::StorageEngine::Postgres => Err(crate::util::error::Error::Storage(
            error::StorageError::fatal(format!(
                "storage engine 'postgres' is not built into this binary (requested url: {})",
                cfg.url.as_deref().unwrap_or("<unset>")
            )),
        )),
    }
}
