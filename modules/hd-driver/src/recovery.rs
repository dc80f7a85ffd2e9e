// Copyright (C) 2019-2021  Pierre Krieger
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Decides what happens to a request after a failed command.

use crate::{config::Config, controller::ControllerState, request::RequestQueue};

/// What [`record_failure`] has decided.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The request stays at the head of the queue and will be retried.
    Retry,
    /// The request will be retried after the controller has been reset.
    Escalated,
    /// The error budget of the request is exhausted. It has been removed from the queue.
    Abandoned,
    /// The queue was empty.
    NoRequest,
}

/// Accounts for a failed attempt at the request at the head of `queue`.
pub fn record_failure<TQueue>(
    queue: &mut TQueue,
    state: &mut ControllerState,
    config: &Config,
) -> FailureOutcome
where
    TQueue: RequestQueue + ?Sized,
{
    let errors = match queue.current() {
        Some(request) => request.increment_errors(),
        None => return FailureOutcome::NoRequest,
    };

    if errors >= config.max_errors {
        log::debug!("Giving up request after {} errors", errors);
        queue.end_request(false);
        return FailureOutcome::Abandoned;
    }

    if errors > config.escalation_threshold() {
        state.reset_pending = true;
        return FailureOutcome::Escalated;
    }

    FailureOutcome::Retry
}
