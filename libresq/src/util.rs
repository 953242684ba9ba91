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

//! Terminal helpers shared across the suite

use {
    std::io::Write,
    termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor},
};

/// Write an error message to stderr in red
pub fn write_error(estr: impl ToString) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let ret: std::io::Result<()> = (|| {
        stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(&mut stderr, "error: {}", estr.to_string())?;
        stderr.reset()
    })();
    if ret.is_err() {
        // never panic on a dead terminal, the message matters more
        eprintln!("error: {}", estr.to_string());
    }
}

/// Write a warning to stderr in yellow
pub fn write_warning(wstr: impl ToString) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let ret: std::io::Result<()> = (|| {
        stderr.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(&mut stderr, "warning: {}", wstr.to_string())?;
        stderr.reset()
    })();
    if ret.is_err() {
        eprintln!("warning: {}", wstr.to_string());
    }
}
