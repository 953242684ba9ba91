/*
 * Created on Fri Mar 10 2023
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

//! # The bundled in-memory engine
//!
//! A complete [`DataOps`]/[`Backend`] implementation over a typed in-memory
//! table. This is what the standalone mode and the test-suite run against;
//! the SQL collaborator implements the same traits out-of-tree.
//!
//! Expiry is lazy: a key past its deadline is treated as absent by reads and
//! purged by the next write that touches it. Transactions are snapshot
//! isolated: `begin` clones the table, every op inside the transaction hits
//! the clone, and `commit` swaps the clone back in (last commit wins; the
//! SQL collaborator owns real conflict handling).
//!
//! The `pf_*` family keeps exact member sets instead of sketches, which is
//! observably identical at test-scale cardinalities.

use {
    super::{
        error::{StorageError, StorageResult},
        Backend, BitfieldEncoding, BitfieldOp, DataOps, Transaction, TypeTag,
    },
    crate::util::{format_f64, glob},
    async_trait::async_trait,
    parking_lot::{Mutex, RwLock},
    std::{
        collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
        sync::Arc,
        time::{Duration, Instant},
    },
};

#[derive(Clone, Debug)]
enum Value {
    Str(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    Zset(BTreeMap<Vec<u8>, f64>),
    Hll(BTreeSet<Vec<u8>>),
}

impl Value {
    const fn type_tag(&self) -> TypeTag {
        match self {
            Self::Str(_) => TypeTag::String,
            Self::List(_) => TypeTag::List,
            Self::Hash(_) => TypeTag::Hash,
            Self::Set(_) => TypeTag::Set,
            Self::Zset(_) => TypeTag::Zset,
            // redis reports hyperloglogs as plain strings
            Self::Hll(_) => TypeTag::String,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    const fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
    fn expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Instant::now())
    }
}

#[derive(Clone, Default, Debug)]
struct Table {
    map: HashMap<Vec<u8>, Entry>,
}

impl Table {
    fn live(&self, key: &[u8]) -> Option<&Entry> {
        self.map.get(key).filter(|entry| !entry.expired())
    }
    fn purge_expired(&mut self, key: &[u8]) {
        if self.map.get(key).is_some_and(Entry::expired) {
            self.map.remove(key);
        }
    }
    fn live_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.purge_expired(key);
        self.map.get_mut(key)
    }
    fn remove_live(&mut self, key: &[u8]) -> Option<Entry> {
        self.purge_expired(key);
        self.map.remove(key)
    }
}

macro_rules! typed {
    ($entry:expr, $variant:ident) => {
        match &$entry.value {
            Value::$variant(inner) => Ok(inner),
            _ => Err(StorageError::wrong_type()),
        }
    };
}

macro_rules! entry_of {
    // fetch-or-create a typed entry, erroring out on a type clash
    ($table:expr, $key:expr, $variant:ident, $init:expr) => {{
        $table.purge_expired($key);
        let entry = $table
            .map
            .entry($key.to_vec())
            .or_insert_with(|| Entry::new(Value::$variant($init)));
        match &mut entry.value {
            Value::$variant(inner) => Ok(inner),
            _ => Err(StorageError::wrong_type()),
        }
    }};
}

/// Absolute deadline for a relative ttl. A duration so large it overflows the
/// clock is as good as "never expires"
fn deadline(after: Duration) -> Option<Instant> {
    Instant::now().checked_add(after)
}

/// Inclusive start/stop indexes with negative-from-the-end semantics, clamped
/// into the collection. `None` means the selection is empty
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

/// Strict int64 parse over raw bytes: optional minus, digits, nothing else
fn parse_stored_i64(bytes: &[u8]) -> StorageResult<i64> {
    let (neg, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() || digits.len() > 19 {
        return Err(StorageError::not_integer());
    }
    let mut acc: i64 = 0;
    for dig in digits {
        if !dig.is_ascii_digit() {
            return Err(StorageError::not_integer());
        }
        acc = acc
            .checked_mul(10)
            .and_then(|acc| {
                let d = (dig - b'0') as i64;
                if neg {
                    acc.checked_sub(d)
                } else {
                    acc.checked_add(d)
                }
            })
            .ok_or_else(StorageError::not_integer)?;
    }
    Ok(acc)
}

fn parse_stored_f64(bytes: &[u8]) -> StorageResult<f64> {
    let s = core::str::from_utf8(bytes).map_err(|_| StorageError::not_float())?;
    let parsed = s.parse::<f64>().map_err(|_| StorageError::not_float())?;
    if parsed.is_nan() {
        return Err(StorageError::not_float());
    }
    Ok(parsed)
}

/// Sorted-set members ordered by `(score, member)`, the canonical zset order
fn zset_sorted(zset: &BTreeMap<Vec<u8>, f64>) -> Vec<(Vec<u8>, f64)> {
    let mut members: Vec<(Vec<u8>, f64)> =
        zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    members.sort_by(|(am, asc), (bm, bsc)| {
        asc.partial_cmp(bsc)
            .unwrap_or(core::cmp::Ordering::Equal)
            .then_with(|| am.cmp(bm))
    });
    members
}

// bitfield plumbing: bit 0 is the MSB of byte 0, exactly like the wire format

fn bf_load_raw(bytes: &[u8], offset: u64, bits: u8) -> u64 {
    let mut raw: u64 = 0;
    for i in 0..bits as u64 {
        let pos = offset + i;
        let byte = (pos / 8) as usize;
        let bit = 7 - (pos % 8) as u32;
        let b = bytes.get(byte).map_or(0, |v| (v >> bit) & 1);
        raw = (raw << 1) | b as u64;
    }
    raw
}

fn bf_decode(raw: u64, enc: BitfieldEncoding) -> i64 {
    if enc.signed {
        if enc.bits == 64 {
            raw as i64
        } else if (raw >> (enc.bits - 1)) & 1 == 1 {
            (raw | (!0u64 << enc.bits)) as i64
        } else {
            raw as i64
        }
    } else {
        raw as i64
    }
}

fn bf_store(bytes: &mut Vec<u8>, offset: u64, bits: u8, value: i64) {
    let needed = ((offset + bits as u64 + 7) / 8) as usize;
    if bytes.len() < needed {
        bytes.resize(needed, 0);
    }
    for i in 0..bits as u64 {
        let pos = offset + i;
        let byte = (pos / 8) as usize;
        let bit = 7 - (pos % 8) as u32;
        let bit_value = ((value >> (bits as u64 - 1 - i)) & 1) as u8;
        bytes[byte] = (bytes[byte] & !(1 << bit)) | (bit_value << bit);
    }
}

/// Truncate `value` into the encoding's width (WRAP overflow semantics)
fn bf_wrap(value: i64, enc: BitfieldEncoding) -> i64 {
    if enc.bits == 64 {
        return value;
    }
    let mask = (1u64 << enc.bits) - 1;
    bf_decode((value as u64) & mask, enc)
}

/// The shared table. All the actual data-plane logic lives here as sync
/// methods; the async trait impls below are thin delegations
struct Store(RwLock<Table>);

impl Store {
    fn new() -> Self {
        Self(RwLock::new(Table::default()))
    }

    // strings

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(Some(typed!(entry, Str)?.clone())),
            None => Ok(None),
        }
    }
    fn set(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
        keepttl: bool,
    ) -> StorageResult<()> {
        let mut table = self.0.write();
        table.purge_expired(key);
        let expires_at = match (ttl, keepttl) {
            (Some(d), _) => deadline(d),
            (None, true) => table.map.get(key).and_then(|e| e.expires_at),
            (None, false) => None,
        };
        table.map.insert(
            key.to_vec(),
            Entry {
                value: Value::Str(value),
                expires_at,
            },
        );
        Ok(())
    }
    fn set_nx(&self, key: &[u8], value: Vec<u8>) -> StorageResult<bool> {
        let mut table = self.0.write();
        table.purge_expired(key);
        if table.map.contains_key(key) {
            return Ok(false);
        }
        table.map.insert(key.to_vec(), Entry::new(Value::Str(value)));
        Ok(true)
    }
    fn mget(&self, keys: &[&[u8]]) -> StorageResult<Vec<Option<Vec<u8>>>> {
        let table = self.0.read();
        Ok(keys
            .iter()
            .map(|key| match table.live(key) {
                // mget skips over wrong-typed keys with a nil, it never errors
                Some(Entry {
                    value: Value::Str(s),
                    ..
                }) => Some(s.clone()),
                _ => None,
            })
            .collect())
    }
    fn mset(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> StorageResult<()> {
        let mut table = self.0.write();
        for (key, value) in pairs {
            table.map.insert(key, Entry::new(Value::Str(value)));
        }
        Ok(())
    }
    fn incr(&self, key: &[u8], delta: i64) -> StorageResult<i64> {
        let mut table = self.0.write();
        let current = match table.live_mut(key) {
            Some(entry) => parse_stored_i64(typed!(entry, Str)?)?,
            None => 0,
        };
        let new = current
            .checked_add(delta)
            .ok_or_else(StorageError::not_integer)?;
        let expires_at = table.map.get(key).and_then(|e| e.expires_at);
        table.map.insert(
            key.to_vec(),
            Entry {
                value: Value::Str(new.to_string().into_bytes()),
                expires_at,
            },
        );
        Ok(new)
    }
    fn incr_by_float(&self, key: &[u8], delta: f64) -> StorageResult<f64> {
        let mut table = self.0.write();
        let current = match table.live_mut(key) {
            Some(entry) => parse_stored_f64(typed!(entry, Str)?)?,
            None => 0.0,
        };
        let new = current + delta;
        if new.is_nan() || new.is_infinite() {
            return Err(StorageError::not_float());
        }
        let expires_at = table.map.get(key).and_then(|e| e.expires_at);
        table.map.insert(
            key.to_vec(),
            Entry {
                value: Value::Str(format_f64(new).into_bytes()),
                expires_at,
            },
        );
        Ok(new)
    }
    fn append(&self, key: &[u8], suffix: &[u8]) -> StorageResult<u64> {
        let mut table = self.0.write();
        match table.live_mut(key) {
            Some(entry) => {
                let s = match &mut entry.value {
                    Value::Str(s) => s,
                    _ => return Err(StorageError::wrong_type()),
                };
                s.extend_from_slice(suffix);
                Ok(s.len() as u64)
            }
            None => {
                table
                    .map
                    .insert(key.to_vec(), Entry::new(Value::Str(suffix.to_vec())));
                Ok(suffix.len() as u64)
            }
        }
    }
    fn strlen(&self, key: &[u8]) -> StorageResult<u64> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Str)?.len() as u64),
            None => Ok(0),
        }
    }
    fn get_range(&self, key: &[u8], start: i64, end: i64) -> StorageResult<Vec<u8>> {
        let table = self.0.read();
        let entry = match table.live(key) {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        let s = typed!(entry, Str)?;
        match normalize_range(s.len(), start, end) {
            Some((lo, hi)) => Ok(s[lo..=hi].to_vec()),
            None => Ok(Vec::new()),
        }
    }
    fn set_range(&self, key: &[u8], offset: u64, patch: &[u8]) -> StorageResult<u64> {
        let mut table = self.0.write();
        let s = entry_of!(table, key, Str, Vec::new())?;
        if patch.is_empty() {
            return Ok(s.len() as u64);
        }
        let end = offset as usize + patch.len();
        if s.len() < end {
            s.resize(end, 0);
        }
        s[offset as usize..end].copy_from_slice(patch);
        Ok(s.len() as u64)
    }
    fn get_ex(
        &self,
        key: &[u8],
        ttl: Option<Duration>,
        persist: bool,
    ) -> StorageResult<Option<Vec<u8>>> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let value = typed!(entry, Str)?.clone();
        if persist {
            entry.expires_at = None;
        } else if let Some(d) = ttl {
            entry.expires_at = deadline(d);
        }
        Ok(Some(value))
    }
    fn get_del(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let mut table = self.0.write();
        match table.live(key) {
            Some(entry) => {
                let value = typed!(entry, Str)?.clone();
                table.map.remove(key);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
    fn get_set(&self, key: &[u8], value: Vec<u8>) -> StorageResult<Option<Vec<u8>>> {
        let mut table = self.0.write();
        let old = match table.live(key) {
            Some(entry) => Some(typed!(entry, Str)?.clone()),
            None => None,
        };
        // getset drops any ttl, like a plain set
        table.map.insert(key.to_vec(), Entry::new(Value::Str(value)));
        Ok(old)
    }
    fn bitfield(&self, key: &[u8], ops: &[BitfieldOp]) -> StorageResult<Vec<Option<i64>>> {
        let mut table = self.0.write();
        let read_only = ops
            .iter()
            .all(|op| matches!(op, BitfieldOp::Get { .. }));
        if read_only && table.live(key).is_none() {
            // an all-GET call must not materialize the key
            return Ok(ops
                .iter()
                .map(|op| match op {
                    BitfieldOp::Get { enc, offset } => {
                        Some(bf_decode(bf_load_raw(&[], *offset, enc.bits), *enc))
                    }
                    _ => None,
                })
                .collect());
        }
        let bytes = entry_of!(table, key, Str, Vec::new())?;
        let mut replies = Vec::with_capacity(ops.len());
        for op in ops {
            match *op {
                BitfieldOp::Get { enc, offset } => {
                    replies.push(Some(bf_decode(bf_load_raw(bytes, offset, enc.bits), enc)));
                }
                BitfieldOp::Set { enc, offset, value } => {
                    let old = bf_decode(bf_load_raw(bytes, offset, enc.bits), enc);
                    bf_store(bytes, offset, enc.bits, bf_wrap(value, enc));
                    replies.push(Some(old));
                }
                BitfieldOp::IncrBy { enc, offset, delta } => {
                    let old = bf_decode(bf_load_raw(bytes, offset, enc.bits), enc);
                    let new = bf_wrap(old.wrapping_add(delta), enc);
                    bf_store(bytes, offset, enc.bits, new);
                    replies.push(Some(new));
                }
            }
        }
        Ok(replies)
    }

    // keys

    fn del(&self, keys: &[&[u8]]) -> StorageResult<u64> {
        let mut table = self.0.write();
        let mut removed = 0;
        for key in keys {
            if table.remove_live(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
    fn exists(&self, keys: &[&[u8]]) -> StorageResult<u64> {
        let table = self.0.read();
        Ok(keys.iter().filter(|key| table.live(key).is_some()).count() as u64)
    }
    fn expire(&self, key: &[u8], after: Duration) -> StorageResult<bool> {
        let mut table = self.0.write();
        match table.live_mut(key) {
            Some(entry) => {
                entry.expires_at = deadline(after);
                Ok(true)
            }
            None => Ok(false),
        }
    }
    fn ttl(&self, key: &[u8]) -> StorageResult<i64> {
        self.pttl(key).map(|ms| match ms {
            -2 | -1 => ms,
            ms => (ms + 999) / 1000,
        })
    }
    fn pttl(&self, key: &[u8]) -> StorageResult<i64> {
        let table = self.0.read();
        match table.live(key) {
            None => Ok(-2),
            Some(Entry {
                expires_at: None, ..
            }) => Ok(-1),
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => Ok(at.saturating_duration_since(Instant::now()).as_millis() as i64),
        }
    }
    fn persist(&self, key: &[u8]) -> StorageResult<bool> {
        let mut table = self.0.write();
        match table.live_mut(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
    fn keys(&self, pattern: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let table = self.0.read();
        let mut keys: Vec<Vec<u8>> = table
            .map
            .iter()
            .filter(|(_, entry)| !entry.expired())
            .filter(|(key, _)| glob::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
    fn key_type(&self, key: &[u8]) -> StorageResult<TypeTag> {
        let table = self.0.read();
        Ok(table
            .live(key)
            .map_or(TypeTag::None, |entry| entry.value.type_tag()))
    }
    fn rename(&self, from: &[u8], to: &[u8]) -> StorageResult<()> {
        let mut table = self.0.write();
        match table.remove_live(from) {
            Some(entry) => {
                table.map.insert(to.to_vec(), entry);
                Ok(())
            }
            None => Err(StorageError::key_not_found()),
        }
    }
    fn copy(&self, from: &[u8], to: &[u8], replace: bool) -> StorageResult<bool> {
        let mut table = self.0.write();
        let entry = match table.live(from) {
            Some(entry) => entry.clone(),
            None => return Ok(false),
        };
        table.purge_expired(to);
        if table.map.contains_key(to) && !replace {
            return Ok(false);
        }
        table.map.insert(to.to_vec(), entry);
        Ok(true)
    }

    // hashes

    fn h_get(&self, key: &[u8], field: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Hash)?.get(field).cloned()),
            None => Ok(None),
        }
    }
    fn h_set(&self, key: &[u8], pairs: Vec<(Vec<u8>, Vec<u8>)>) -> StorageResult<u64> {
        let mut table = self.0.write();
        let hash = entry_of!(table, key, Hash, BTreeMap::new())?;
        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }
    fn h_set_nx(&self, key: &[u8], field: &[u8], value: Vec<u8>) -> StorageResult<bool> {
        let mut table = self.0.write();
        let hash = entry_of!(table, key, Hash, BTreeMap::new())?;
        if hash.contains_key(field) {
            Ok(false)
        } else {
            hash.insert(field.to_vec(), value);
            Ok(true)
        }
    }
    fn h_del(&self, key: &[u8], fields: &[&[u8]]) -> StorageResult<u64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let hash = match &mut entry.value {
            Value::Hash(h) => h,
            _ => return Err(StorageError::wrong_type()),
        };
        let mut removed = 0;
        for field in fields {
            if hash.remove(*field).is_some() {
                removed += 1;
            }
        }
        if hash.is_empty() {
            table.map.remove(key);
        }
        Ok(removed)
    }
    fn h_get_all(&self, key: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Hash)?
                .iter()
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect()),
            None => Ok(Vec::new()),
        }
    }
    fn h_mget(&self, key: &[u8], fields: &[&[u8]]) -> StorageResult<Vec<Option<Vec<u8>>>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => {
                let hash = typed!(entry, Hash)?;
                Ok(fields.iter().map(|f| hash.get(*f).cloned()).collect())
            }
            None => Ok(fields.iter().map(|_| None).collect()),
        }
    }
    fn h_exists(&self, key: &[u8], field: &[u8]) -> StorageResult<bool> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Hash)?.contains_key(field)),
            None => Ok(false),
        }
    }
    fn h_keys(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Hash)?.keys().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }
    fn h_vals(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Hash)?.values().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }
    fn h_len(&self, key: &[u8]) -> StorageResult<u64> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Hash)?.len() as u64),
            None => Ok(0),
        }
    }
    fn h_incr_by(&self, key: &[u8], field: &[u8], delta: i64) -> StorageResult<i64> {
        let mut table = self.0.write();
        let hash = entry_of!(table, key, Hash, BTreeMap::new())?;
        let current = match hash.get(field) {
            Some(v) => parse_stored_i64(v)?,
            None => 0,
        };
        let new = current
            .checked_add(delta)
            .ok_or_else(StorageError::not_integer)?;
        hash.insert(field.to_vec(), new.to_string().into_bytes());
        Ok(new)
    }
    fn h_incr_by_float(&self, key: &[u8], field: &[u8], delta: f64) -> StorageResult<f64> {
        let mut table = self.0.write();
        let hash = entry_of!(table, key, Hash, BTreeMap::new())?;
        let current = match hash.get(field) {
            Some(v) => parse_stored_f64(v)?,
            None => 0.0,
        };
        let new = current + delta;
        if new.is_nan() || new.is_infinite() {
            return Err(StorageError::not_float());
        }
        hash.insert(field.to_vec(), format_f64(new).into_bytes());
        Ok(new)
    }

    // lists

    fn l_push(&self, key: &[u8], values: Vec<Vec<u8>>) -> StorageResult<u64> {
        let mut table = self.0.write();
        let list = entry_of!(table, key, List, VecDeque::new())?;
        for value in values {
            list.push_front(value);
        }
        Ok(list.len() as u64)
    }
    fn r_push(&self, key: &[u8], values: Vec<Vec<u8>>) -> StorageResult<u64> {
        let mut table = self.0.write();
        let list = entry_of!(table, key, List, VecDeque::new())?;
        for value in values {
            list.push_back(value);
        }
        Ok(list.len() as u64)
    }
    fn l_pop(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.list_pop(key, true)
    }
    fn r_pop(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.list_pop(key, false)
    }
    fn list_pop(&self, key: &[u8], front: bool) -> StorageResult<Option<Vec<u8>>> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let list = match &mut entry.value {
            Value::List(l) => l,
            _ => return Err(StorageError::wrong_type()),
        };
        let popped = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        if list.is_empty() {
            table.map.remove(key);
        }
        Ok(popped)
    }
    fn l_len(&self, key: &[u8]) -> StorageResult<u64> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, List)?.len() as u64),
            None => Ok(0),
        }
    }
    fn l_range(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<Vec<Vec<u8>>> {
        let table = self.0.read();
        let entry = match table.live(key) {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        let list = typed!(entry, List)?;
        match normalize_range(list.len(), start, stop) {
            Some((lo, hi)) => Ok(list.iter().skip(lo).take(hi - lo + 1).cloned().collect()),
            None => Ok(Vec::new()),
        }
    }
    fn l_index(&self, key: &[u8], index: i64) -> StorageResult<Option<Vec<u8>>> {
        let table = self.0.read();
        let entry = match table.live(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let list = typed!(entry, List)?;
        let index = if index < 0 {
            list.len() as i64 + index
        } else {
            index
        };
        if index < 0 {
            return Ok(None);
        }
        Ok(list.get(index as usize).cloned())
    }
    fn l_set(&self, key: &[u8], index: i64, value: Vec<u8>) -> StorageResult<()> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Err(StorageError::key_not_found()),
        };
        let list = match &mut entry.value {
            Value::List(l) => l,
            _ => return Err(StorageError::wrong_type()),
        };
        let index = if index < 0 {
            list.len() as i64 + index
        } else {
            index
        };
        match usize::try_from(index).ok().and_then(|i| list.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StorageError::transient("index out of range")),
        }
    }
    fn l_rem(&self, key: &[u8], count: i64, value: &[u8]) -> StorageResult<u64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let list = match &mut entry.value {
            Value::List(l) => l,
            _ => return Err(StorageError::wrong_type()),
        };
        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;
        let mut kept: VecDeque<Vec<u8>> = VecDeque::with_capacity(list.len());
        if count >= 0 {
            for item in list.drain(..) {
                if removed < limit && item == value {
                    removed += 1;
                } else {
                    kept.push_back(item);
                }
            }
        } else {
            for item in list.drain(..).rev() {
                if removed < limit && item == value {
                    removed += 1;
                } else {
                    kept.push_front(item);
                }
            }
        }
        *list = kept;
        if list.is_empty() {
            table.map.remove(key);
        }
        Ok(removed as u64)
    }
    fn l_trim(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<()> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let list = match &mut entry.value {
            Value::List(l) => l,
            _ => return Err(StorageError::wrong_type()),
        };
        match normalize_range(list.len(), start, stop) {
            Some((lo, hi)) => {
                list.truncate(hi + 1);
                list.drain(..lo);
            }
            None => list.clear(),
        }
        if list.is_empty() {
            table.map.remove(key);
        }
        Ok(())
    }
    fn l_insert(
        &self,
        key: &[u8],
        before: bool,
        pivot: &[u8],
        value: Vec<u8>,
    ) -> StorageResult<i64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let list = match &mut entry.value {
            Value::List(l) => l,
            _ => return Err(StorageError::wrong_type()),
        };
        match list.iter().position(|item| item == pivot) {
            Some(pos) => {
                let at = if before { pos } else { pos + 1 };
                list.insert(at, value);
                Ok(list.len() as i64)
            }
            None => Ok(-1),
        }
    }
    fn r_pop_l_push(
        &self,
        source: &[u8],
        destination: &[u8],
    ) -> StorageResult<Option<Vec<u8>>> {
        let mut table = self.0.write();
        // verify the destination type before popping anything
        if let Some(entry) = table.live(destination) {
            typed!(entry, List)?;
        }
        let entry = match table.live_mut(source) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let list = match &mut entry.value {
            Value::List(l) => l,
            _ => return Err(StorageError::wrong_type()),
        };
        let value = match list.pop_back() {
            Some(value) => value,
            None => return Ok(None),
        };
        if list.is_empty() {
            table.map.remove(source);
        }
        let dst = entry_of!(table, destination, List, VecDeque::new())?;
        dst.push_front(value.clone());
        Ok(Some(value))
    }

    // sets

    fn s_add(&self, key: &[u8], members: Vec<Vec<u8>>) -> StorageResult<u64> {
        let mut table = self.0.write();
        let set = entry_of!(table, key, Set, BTreeSet::new())?;
        let mut added = 0;
        for member in members {
            if set.insert(member) {
                added += 1;
            }
        }
        Ok(added)
    }
    fn s_rem(&self, key: &[u8], members: &[&[u8]]) -> StorageResult<u64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let set = match &mut entry.value {
            Value::Set(s) => s,
            _ => return Err(StorageError::wrong_type()),
        };
        let mut removed = 0;
        for member in members {
            if set.remove(*member) {
                removed += 1;
            }
        }
        if set.is_empty() {
            table.map.remove(key);
        }
        Ok(removed)
    }
    fn s_members(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Set)?.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }
    fn s_is_member(&self, key: &[u8], member: &[u8]) -> StorageResult<bool> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Set)?.contains(member)),
            None => Ok(false),
        }
    }
    fn s_card(&self, key: &[u8]) -> StorageResult<u64> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Set)?.len() as u64),
            None => Ok(0),
        }
    }

    // sorted sets

    fn z_add(&self, key: &[u8], members: Vec<(f64, Vec<u8>)>, nx: bool) -> StorageResult<u64> {
        let mut table = self.0.write();
        let zset = entry_of!(table, key, Zset, BTreeMap::new())?;
        let mut added = 0;
        for (score, member) in members {
            if nx && zset.contains_key(&member) {
                continue;
            }
            if zset.insert(member, score).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }
    fn z_range(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
        rev: bool,
    ) -> StorageResult<Vec<(Vec<u8>, f64)>> {
        let table = self.0.read();
        let entry = match table.live(key) {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        let mut sorted = zset_sorted(typed!(entry, Zset)?);
        if rev {
            sorted.reverse();
        }
        match normalize_range(sorted.len(), start, stop) {
            Some((lo, hi)) => Ok(sorted[lo..=hi].to_vec()),
            None => Ok(Vec::new()),
        }
    }
    fn z_range_by_score(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        rev: bool,
        offset: i64,
        count: i64,
    ) -> StorageResult<Vec<(Vec<u8>, f64)>> {
        let table = self.0.read();
        let entry = match table.live(key) {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        let mut matching: Vec<(Vec<u8>, f64)> = zset_sorted(typed!(entry, Zset)?)
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .collect();
        if rev {
            matching.reverse();
        }
        let offset = offset.max(0) as usize;
        let take = if count < 0 {
            usize::MAX
        } else {
            count as usize
        };
        Ok(matching.into_iter().skip(offset).take(take).collect())
    }
    fn z_score(&self, key: &[u8], member: &[u8]) -> StorageResult<Option<f64>> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Zset)?.get(member).copied()),
            None => Ok(None),
        }
    }
    fn z_rem(&self, key: &[u8], members: &[&[u8]]) -> StorageResult<u64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let zset = match &mut entry.value {
            Value::Zset(z) => z,
            _ => return Err(StorageError::wrong_type()),
        };
        let mut removed = 0;
        for member in members {
            if zset.remove(*member).is_some() {
                removed += 1;
            }
        }
        if zset.is_empty() {
            table.map.remove(key);
        }
        Ok(removed)
    }
    fn z_card(&self, key: &[u8]) -> StorageResult<u64> {
        let table = self.0.read();
        match table.live(key) {
            Some(entry) => Ok(typed!(entry, Zset)?.len() as u64),
            None => Ok(0),
        }
    }
    fn z_incr_by(&self, key: &[u8], delta: f64, member: &[u8]) -> StorageResult<f64> {
        let mut table = self.0.write();
        let zset = entry_of!(table, key, Zset, BTreeMap::new())?;
        let new = zset.get(member).copied().unwrap_or(0.0) + delta;
        if new.is_nan() {
            return Err(StorageError::not_float());
        }
        zset.insert(member.to_vec(), new);
        Ok(new)
    }
    fn z_pop_min(&self, key: &[u8], count: u64) -> StorageResult<Vec<(Vec<u8>, f64)>> {
        self.zset_pop(key, count, false)
    }
    fn z_pop_max(&self, key: &[u8], count: u64) -> StorageResult<Vec<(Vec<u8>, f64)>> {
        self.zset_pop(key, count, true)
    }
    fn zset_pop(&self, key: &[u8], count: u64, max: bool) -> StorageResult<Vec<(Vec<u8>, f64)>> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        let zset = match &mut entry.value {
            Value::Zset(z) => z,
            _ => return Err(StorageError::wrong_type()),
        };
        let mut sorted = zset_sorted(zset);
        if max {
            sorted.reverse();
        }
        let popped: Vec<(Vec<u8>, f64)> =
            sorted.into_iter().take(count as usize).collect();
        for (member, _) in &popped {
            zset.remove(member);
        }
        if zset.is_empty() {
            table.map.remove(key);
        }
        Ok(popped)
    }
    fn z_rem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<u64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let zset = match &mut entry.value {
            Value::Zset(z) => z,
            _ => return Err(StorageError::wrong_type()),
        };
        let sorted = zset_sorted(zset);
        let removed = match normalize_range(sorted.len(), start, stop) {
            Some((lo, hi)) => {
                for (member, _) in &sorted[lo..=hi] {
                    zset.remove(member);
                }
                (hi - lo + 1) as u64
            }
            None => 0,
        };
        if zset.is_empty() {
            table.map.remove(key);
        }
        Ok(removed)
    }
    fn z_rem_range_by_score(&self, key: &[u8], min: f64, max: f64) -> StorageResult<u64> {
        let mut table = self.0.write();
        let entry = match table.live_mut(key) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let zset = match &mut entry.value {
            Value::Zset(z) => z,
            _ => return Err(StorageError::wrong_type()),
        };
        let doomed: Vec<Vec<u8>> = zset
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, _)| member.clone())
            .collect();
        for member in &doomed {
            zset.remove(member);
        }
        if zset.is_empty() {
            table.map.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    // hyperloglog

    fn pf_add(&self, key: &[u8], elements: Vec<Vec<u8>>) -> StorageResult<bool> {
        let mut table = self.0.write();
        let hll = entry_of!(table, key, Hll, BTreeSet::new())?;
        let mut changed = false;
        for element in elements {
            changed |= hll.insert(element);
        }
        Ok(changed)
    }
    fn pf_count(&self, keys: &[&[u8]]) -> StorageResult<u64> {
        let table = self.0.read();
        let mut union: BTreeSet<&Vec<u8>> = BTreeSet::new();
        for key in keys {
            if let Some(entry) = table.live(key) {
                union.extend(typed!(entry, Hll)?.iter());
            }
        }
        Ok(union.len() as u64)
    }
    fn pf_merge(&self, destination: &[u8], sources: &[&[u8]]) -> StorageResult<()> {
        let mut table = self.0.write();
        let mut merged: BTreeSet<Vec<u8>> = BTreeSet::new();
        for source in sources {
            if let Some(entry) = table.live(source) {
                merged.extend(typed!(entry, Hll)?.iter().cloned());
            }
        }
        let dst = entry_of!(table, destination, Hll, BTreeSet::new())?;
        dst.extend(merged);
        Ok(())
    }

    // server

    fn db_size(&self) -> StorageResult<u64> {
        let table = self.0.read();
        Ok(table.map.values().filter(|e| !e.expired()).count() as u64)
    }
    fn flush_db(&self) -> StorageResult<()> {
        self.0.write().map.clear();
        Ok(())
    }
}

macro_rules! impl_data_ops {
    ($ty:ty, $store:ident) => {
        #[async_trait]
        impl DataOps for $ty {
            async fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
                self.$store.get(key)
            }
            async fn set(
                &self,
                key: &[u8],
                value: Vec<u8>,
                ttl: Option<Duration>,
                keepttl: bool,
            ) -> StorageResult<()> {
                self.$store.set(key, value, ttl, keepttl)
            }
            async fn set_nx(&self, key: &[u8], value: Vec<u8>) -> StorageResult<bool> {
                self.$store.set_nx(key, value)
            }
            async fn mget(&self, keys: &[&[u8]]) -> StorageResult<Vec<Option<Vec<u8>>>> {
                self.$store.mget(keys)
            }
            async fn mset(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> StorageResult<()> {
                self.$store.mset(pairs)
            }
            async fn incr(&self, key: &[u8], delta: i64) -> StorageResult<i64> {
                self.$store.incr(key, delta)
            }
            async fn incr_by_float(&self, key: &[u8], delta: f64) -> StorageResult<f64> {
                self.$store.incr_by_float(key, delta)
            }
            async fn append(&self, key: &[u8], suffix: &[u8]) -> StorageResult<u64> {
                self.$store.append(key, suffix)
            }
            async fn strlen(&self, key: &[u8]) -> StorageResult<u64> {
                self.$store.strlen(key)
            }
            async fn get_range(&self, key: &[u8], start: i64, end: i64) -> StorageResult<Vec<u8>> {
                self.$store.get_range(key, start, end)
            }
            async fn set_range(
                &self,
                key: &[u8],
                offset: u64,
                patch: &[u8],
            ) -> StorageResult<u64> {
                self.$store.set_range(key, offset, patch)
            }
            async fn get_ex(
                &self,
                key: &[u8],
                ttl: Option<Duration>,
                persist: bool,
            ) -> StorageResult<Option<Vec<u8>>> {
                self.$store.get_ex(key, ttl, persist)
            }
            async fn get_del(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
                self.$store.get_del(key)
            }
            async fn get_set(&self, key: &[u8], value: Vec<u8>) -> StorageResult<Option<Vec<u8>>> {
                self.$store.get_set(key, value)
            }
            async fn bitfield(
                &self,
                key: &[u8],
                ops: &[BitfieldOp],
            ) -> StorageResult<Vec<Option<i64>>> {
                self.$store.bitfield(key, ops)
            }
            async fn del(&self, keys: &[&[u8]]) -> StorageResult<u64> {
                self.$store.del(keys)
            }
            async fn exists(&self, keys: &[&[u8]]) -> StorageResult<u64> {
                self.$store.exists(keys)
            }
            async fn expire(&self, key: &[u8], after: Duration) -> StorageResult<bool> {
                self.$store.expire(key, after)
            }
            async fn ttl(&self, key: &[u8]) -> StorageResult<i64> {
                self.$store.ttl(key)
            }
            async fn pttl(&self, key: &[u8]) -> StorageResult<i64> {
                self.$store.pttl(key)
            }
            async fn persist(&self, key: &[u8]) -> StorageResult<bool> {
                self.$store.persist(key)
            }
            async fn keys(&self, pattern: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
                self.$store.keys(pattern)
            }
            async fn key_type(&self, key: &[u8]) -> StorageResult<TypeTag> {
                self.$store.key_type(key)
            }
            async fn rename(&self, from: &[u8], to: &[u8]) -> StorageResult<()> {
                self.$store.rename(from, to)
            }
            async fn copy(&self, from: &[u8], to: &[u8], replace: bool) -> StorageResult<bool> {
                self.$store.copy(from, to, replace)
            }
            async fn h_get(&self, key: &[u8], field: &[u8]) -> StorageResult<Option<Vec<u8>>> {
                self.$store.h_get(key, field)
            }
            async fn h_set(
                &self,
                key: &[u8],
                pairs: Vec<(Vec<u8>, Vec<u8>)>,
            ) -> StorageResult<u64> {
                self.$store.h_set(key, pairs)
            }
            async fn h_set_nx(
                &self,
                key: &[u8],
                field: &[u8],
                value: Vec<u8>,
            ) -> StorageResult<bool> {
                self.$store.h_set_nx(key, field, value)
            }
            async fn h_del(&self, key: &[u8], fields: &[&[u8]]) -> StorageResult<u64> {
                self.$store.h_del(key, fields)
            }
            async fn h_get_all(&self, key: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
                self.$store.h_get_all(key)
            }
            async fn h_mget(
                &self,
                key: &[u8],
                fields: &[&[u8]],
            ) -> StorageResult<Vec<Option<Vec<u8>>>> {
                self.$store.h_mget(key, fields)
            }
            async fn h_exists(&self, key: &[u8], field: &[u8]) -> StorageResult<bool> {
                self.$store.h_exists(key, field)
            }
            async fn h_keys(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
                self.$store.h_keys(key)
            }
            async fn h_vals(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
                self.$store.h_vals(key)
            }
            async fn h_len(&self, key: &[u8]) -> StorageResult<u64> {
                self.$store.h_len(key)
            }
            async fn h_incr_by(
                &self,
                key: &[u8],
                field: &[u8],
                delta: i64,
            ) -> StorageResult<i64> {
                self.$store.h_incr_by(key, field, delta)
            }
            async fn h_incr_by_float(
                &self,
                key: &[u8],
                field: &[u8],
                delta: f64,
            ) -> StorageResult<f64> {
                self.$store.h_incr_by_float(key, field, delta)
            }
            async fn l_push(&self, key: &[u8], values: Vec<Vec<u8>>) -> StorageResult<u64> {
                self.$store.l_push(key, values)
            }
            async fn r_push(&self, key: &[u8], values: Vec<Vec<u8>>) -> StorageResult<u64> {
                self.$store.r_push(key, values)
            }
            async fn l_pop(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
                self.$store.l_pop(key)
            }
            async fn r_pop(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
                self.$store.r_pop(key)
            }
            async fn l_len(&self, key: &[u8]) -> StorageResult<u64> {
                self.$store.l_len(key)
            }
            async fn l_range(
                &self,
                key: &[u8],
                start: i64,
                stop: i64,
            ) -> StorageResult<Vec<Vec<u8>>> {
                self.$store.l_range(key, start, stop)
            }
            async fn l_index(&self, key: &[u8], index: i64) -> StorageResult<Option<Vec<u8>>> {
                self.$store.l_index(key, index)
            }
            async fn l_set(&self, key: &[u8], index: i64, value: Vec<u8>) -> StorageResult<()> {
                self.$store.l_set(key, index, value)
            }
            async fn l_rem(&self, key: &[u8], count: i64, value: &[u8]) -> StorageResult<u64> {
                self.$store.l_rem(key, count, value)
            }
            async fn l_trim(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<()> {
                self.$store.l_trim(key, start, stop)
            }
            async fn l_insert(
                &self,
                key: &[u8],
                before: bool,
                pivot: &[u8],
                value: Vec<u8>,
            ) -> StorageResult<i64> {
                self.$store.l_insert(key, before, pivot, value)
            }
            async fn r_pop_l_push(
                &self,
                source: &[u8],
                destination: &[u8],
            ) -> StorageResult<Option<Vec<u8>>> {
                self.$store.r_pop_l_push(source, destination)
            }
            async fn s_add(&self, key: &[u8], members: Vec<Vec<u8>>) -> StorageResult<u64> {
                self.$store.s_add(key, members)
            }
            async fn s_rem(&self, key: &[u8], members: &[&[u8]]) -> StorageResult<u64> {
                self.$store.s_rem(key, members)
            }
            async fn s_members(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
                self.$store.s_members(key)
            }
            async fn s_is_member(&self, key: &[u8], member: &[u8]) -> StorageResult<bool> {
                self.$store.s_is_member(key, member)
            }
            async fn s_card(&self, key: &[u8]) -> StorageResult<u64> {
                self.$store.s_card(key)
            }
            async fn z_add(
                &self,
                key: &[u8],
                members: Vec<(f64, Vec<u8>)>,
                nx: bool,
            ) -> StorageResult<u64> {
                self.$store.z_add(key, members, nx)
            }
            async fn z_range(
                &self,
                key: &[u8],
                start: i64,
                stop: i64,
                rev: bool,
            ) -> StorageResult<Vec<(Vec<u8>, f64)>> {
                self.$store.z_range(key, start, stop, rev)
            }
            async fn z_range_by_score(
                &self,
                key: &[u8],
                min: f64,
                max: f64,
                rev: bool,
                offset: i64,
                count: i64,
            ) -> StorageResult<Vec<(Vec<u8>, f64)>> {
                self.$store.z_range_by_score(key, min, max, rev, offset, count)
            }
            async fn z_score(&self, key: &[u8], member: &[u8]) -> StorageResult<Option<f64>> {
                self.$store.z_score(key, member)
            }
            async fn z_rem(&self, key: &[u8], members: &[&[u8]]) -> StorageResult<u64> {
                self.$store.z_rem(key, members)
            }
            async fn z_card(&self, key: &[u8]) -> StorageResult<u64> {
                self.$store.z_card(key)
            }
            async fn z_incr_by(
                &self,
                key: &[u8],
                delta: f64,
                member: &[u8],
            ) -> StorageResult<f64> {
                self.$store.z_incr_by(key, delta, member)
            }
            async fn z_pop_min(
                &self,
                key: &[u8],
                count: u64,
            ) -> StorageResult<Vec<(Vec<u8>, f64)>> {
                self.$store.z_pop_min(key, count)
            }
            async fn z_pop_max(
                &self,
                key: &[u8],
                count: u64,
            ) -> StorageResult<Vec<(Vec<u8>, f64)>> {
                self.$store.z_pop_max(key, count)
            }
            async fn z_rem_range_by_rank(
                &self,
                key: &[u8],
                start: i64,
                stop: i64,
            ) -> StorageResult<u64> {
                self.$store.z_rem_range_by_rank(key, start, stop)
            }
            async fn z_rem_range_by_score(
                &self,
                key: &[u8],
                min: f64,
                max: f64,
            ) -> StorageResult<u64> {
                self.$store.z_rem_range_by_score(key, min, max)
            }
            async fn pf_add(&self, key: &[u8], elements: Vec<Vec<u8>>) -> StorageResult<bool> {
                self.$store.pf_add(key, elements)
            }
            async fn pf_count(&self, keys: &[&[u8]]) -> StorageResult<u64> {
                self.$store.pf_count(keys)
            }
            async fn pf_merge(
                &self,
                destination: &[u8],
                sources: &[&[u8]],
            ) -> StorageResult<()> {
                self.$store.pf_merge(destination, sources)
            }
            async fn db_size(&self) -> StorageResult<u64> {
                self.$store.db_size()
            }
            async fn flush_db(&self) -> StorageResult<()> {
                self.$store.flush_db()
            }
        }
    };
}

/// The bundled engine: a [`Backend`] over the shared [`Store`]
pub struct MemoryEngine {
    store: Arc<Store>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store::new()),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl_data_ops!(MemoryEngine, store);

#[async_trait]
impl Backend for MemoryEngine {
    async fn begin(&self) -> StorageResult<Arc<dyn Transaction>> {
        let snapshot = self.store.0.read().clone();
        Ok(Arc::new(MemoryTransaction {
            parent: self.store.clone(),
            local: Store(RwLock::new(snapshot)),
            state: Mutex::new(TxnState::Open),
        }))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Open,
    Committed,
    RolledBack,
}

/// A snapshot-isolated transaction over the memory engine
pub struct MemoryTransaction {
    parent: Arc<Store>,
    local: Store,
    state: Mutex<TxnState>,
}

impl_data_ops!(MemoryTransaction, local);

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        match *state {
            // commit is idempotent after success
            TxnState::Committed => Ok(()),
            TxnState::RolledBack => Err(StorageError::transient(
                "transaction was already rolled back",
            )),
            TxnState::Open => {
                *self.parent.0.write() = self.local.0.read().clone();
                *state = TxnState::Committed;
                Ok(())
            }
        }
    }
    async fn rollback(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        match *state {
            TxnState::Committed => Err(StorageError::transient(
                "transaction was already committed",
            )),
            _ => {
                *state = TxnState::RolledBack;
                Ok(())
            }
        }
    }
}
