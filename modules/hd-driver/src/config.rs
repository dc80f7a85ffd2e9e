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

/// Tunables of the driver.
///
/// The default values are the ones expected by AT-compatible controllers and shouldn't need to
/// be changed except for testing purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of status register reads while waiting for the controller to be ready.
    pub ready_poll_limit: u32,
    /// Maximum number of status register reads while waiting for the controller to request the
    /// first sector of a write.
    pub drq_poll_limit: u32,
    /// Number of spin iterations between entering and leaving the reset state.
    pub reset_delay_cycles: u32,
    /// Number of failed attempts after which a request is abandoned. Once more than half of this
    /// budget is spent, the controller is reset before the next attempt.
    pub max_errors: u8,
}

impl Config {
    /// Number of failures above which the controller gets reset.
    pub fn escalation_threshold(&self) -> u8 {
        self.max_errors / 2
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ready_poll_limit: 10000,
            drq_poll_limit: 3000,
            reset_delay_cycles: 100,
            max_errors: 7,
        }
    }
}
