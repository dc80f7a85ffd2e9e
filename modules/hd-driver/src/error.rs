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

//! Errors returned by the driver.
//!
//! Hardware failures of individual commands are not errors from the point of view of the API.
//! They are handled by the retry protocol and, in the worst case, reported by completing the
//! request with `success` set to `false`. The errors below correspond to programming or
//! configuration mistakes, after which the system is expected to halt.

/// Unrecoverable error while talking to the controller.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum FatalError {
    /// A command was about to be sent with a drive or head number that the controller can't
    /// address.
    #[display(fmt = "Trying to write bad sector (drive {}, head {})", drive, head)]
    BadAddress { drive: u8, head: u8 },
    /// The controller never became ready to accept a command.
    #[display(fmt = "HD controller not ready")]
    ControllerNotReady,
}

/// Error during [`HdDriver::setup`](crate::HdDriver::setup).
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SetupError {
    /// Setup has already been performed. Calling it a second time has no effect.
    #[display(fmt = "Disk setup has already been performed")]
    AlreadyInitialized,
    /// Reading the first sector of the drive has failed.
    #[display(fmt = "Unable to read partition table of drive {}", drive)]
    PartitionTableUnreadable { drive: u8 },
    /// The first sector of the drive doesn't end with the `0x55, 0xaa` signature.
    #[display(fmt = "Bad partition table on drive {}", drive)]
    BadPartitionTable { drive: u8 },
}

/// Error when building a [`Request`](crate::Request).
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RequestError {
    /// The buffer has a length of zero.
    #[display(fmt = "Request doesn't cover any sector")]
    EmptyBuffer,
    /// The length of the buffer isn't a multiple of the sector size.
    #[display(fmt = "Buffer length {} isn't a multiple of the sector size", _0)]
    UnalignedBuffer(usize),
    /// The controller can't transfer that many sectors with a single command.
    #[display(fmt = "Too many sectors in a single request: {}", _0)]
    TooManySectors(usize),
}

/// Error returned by the asynchronous functions of [`HdDevice`](crate::HdDevice).
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum IoError {
    /// The request couldn't be built.
    #[display(fmt = "{}", _0)]
    BadRequest(RequestError),
    /// The driver is in an unrecoverable state.
    #[display(fmt = "{}", _0)]
    Fatal(FatalError),
    /// The request has been rejected, or has failed too many times.
    #[display(fmt = "I/O error, dev {:04x}, sector {}", device, sector)]
    Failed { device: u16, sector: u32 },
    /// The driver has been destroyed before the request completed.
    #[display(fmt = "Request has been dropped")]
    Dropped,
}

impl From<RequestError> for IoError {
    fn from(err: RequestError) -> IoError {
        IoError::BadRequest(err)
    }
}

impl From<FatalError> for IoError {
    fn from(err: FatalError) -> IoError {
        IoError::Fatal(err)
    }
}
