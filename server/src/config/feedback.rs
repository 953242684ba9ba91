/*
 * Created on Sat Feb 11 2023
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

//! Warnings and errors accumulated while evaluating configuration sources

use {
    core::{fmt, ops},
    std::io::Error as IoError,
};

#[derive(Debug, PartialEq, Eq, Default)]
/// A stack of warnings that the evaluation gathered. Warnings never stop
/// the boot; they are announced once, together
pub struct WarningStack {
    stack: Vec<String>,
}

impl WarningStack {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, warning: impl ToString) {
        self.stack.push(warning.to_string());
    }
    /// Announce the warnings to the logger
    pub fn announce(&self) {
        for warning in &self.stack {
            log::warn!("{}", warning);
        }
    }
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq, Default)]
/// A stack of errors. A non-empty stack at the end of evaluation is fatal
pub struct ErrorStack {
    stack: Vec<String>,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, error: impl ToString) {
        self.stack.push(error.to_string());
    }
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.stack {
            writeln!(f, "- {error}")?;
        }
        Ok(())
    }
}

impl ops::Deref for ErrorStack {
    type Target = [String];
    fn deref(&self) -> &Self::Target {
        &self.stack
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// An error while reading the configuration file
    OSError(IoError),
    /// The configuration file did not parse
    CfgFileError(String),
    /// One or more configuration items failed to evaluate
    CfgError(ErrorStack),
    /// A validation failure across items (for example TLS with no cert)
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OSError(e) => write!(f, "OS error while reading configuration: {e}"),
            Self::CfgFileError(e) => write!(f, "bad configuration file: {e}"),
            Self::CfgError(stack) => write!(f, "configuration errors:\n{stack}"),
            Self::ValidationError(e) => write!(f, "bad configuration: {e}"),
        }
    }
}

impl From<IoError> for ConfigError {
    fn from(e: IoError) -> Self {
        Self::OSError(e)
    }
}
