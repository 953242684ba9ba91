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

use std::fmt;

pub type StorageResult<T> = Result<T, StorageError>;

/// What went wrong inside the storage engine. The kind decides the wire
/// string the executor emits and whether the connection survives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The key exists but holds a value of an incompatible type
    WrongType,
    /// A value that had to be a 64-bit integer wasn't (or overflowed)
    NotInteger,
    /// A value that had to be a double wasn't (or the op produced NaN/inf)
    NotFloat,
    /// An operation that requires the key to exist didn't find it
    KeyNotFound,
    /// The backend hiccupped; the command failed but the connection survives
    Transient,
    /// The backend is gone; tear the connection down
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl ToString) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
    pub fn wrong_type() -> Self {
        Self::new(StorageErrorKind::WrongType, "wrong value type")
    }
    pub fn not_integer() -> Self {
        Self::new(StorageErrorKind::NotInteger, "not a 64-bit integer")
    }
    pub fn not_float() -> Self {
        Self::new(StorageErrorKind::NotFloat, "not a valid double")
    }
    pub fn key_not_found() -> Self {
        Self::new(StorageErrorKind::KeyNotFound, "no such key")
    }
    pub fn transient(message: impl ToString) -> Self {
        Self::new(StorageErrorKind::Transient, message)
    }
    pub fn fatal(message: impl ToString) -> Self {
        Self::new(StorageErrorKind::Fatal, message)
    }
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, StorageErrorKind::Fatal)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
