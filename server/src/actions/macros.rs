/*
 * Created on Wed Apr 12 2023
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

#[macro_export]
/// ## The action macro
///
/// Every data command has the same shape: it gets the execution context and
/// the argument slice, and produces a reply element or an action error. This
/// macro adds all of that fuss (signature, visibility, asyncness) so an
/// action body reads like the command semantics and nothing else
macro_rules! action {
    (
        $($(#[$attr:meta])*
        fn $fname:ident($ctx:ident, $args:ident)
        $block:block)*
    ) => {
        $($(#[$attr])*
        pub async fn $fname(
            $ctx: &crate::actions::ExecCtx,
            $args: &[::bytes::Bytes],
        ) -> crate::actions::ActionResult<crate::protocol::Element>
        $block)*
    };
}

#[macro_export]
/// Bail out of an action with a wire error
macro_rules! actionerr {
    ($e:expr) => {
        return Err(crate::actions::ActionError::Error($e.to_string()))
    };
}
