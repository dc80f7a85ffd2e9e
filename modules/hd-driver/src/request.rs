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

//! Block requests and the queue they are serviced from.

use crate::{error::RequestError, SECTOR_SIZE};

use alloc::{collections::VecDeque, vec, vec::Vec};
use core::{convert::TryFrom as _, fmt};
use futures::channel::oneshot;

/// Maximum number of sectors that a single command can transfer.
pub const MAX_SECTORS_PER_REQUEST: usize = 255;

/// Direction of a transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Transfer of consecutive sectors between a partition and a memory buffer.
///
/// While the request is being serviced, the driver advances its start sector and buffer cursor
/// after each sector and decrements the number of remaining sectors.
pub struct Request {
    /// Minor number of the device: `drive * 5 + slot`.
    device: u16,
    direction: Direction,
    /// Next sector to transfer, relative to the start of the partition.
    sector: u32,
    /// Number of sectors that remain to be transferred.
    nr_sectors: u32,
    buffer: Vec<u8>,
    /// Offset within `buffer` of the next sector to transfer.
    cursor: usize,
    /// Number of failed attempts since the last successful sector transfer.
    errors: u8,
}

impl Request {
    /// Builds a request that reads `nr_sectors` sectors starting at `sector`.
    pub fn read(device: u16, sector: u32, nr_sectors: usize) -> Result<Self, RequestError> {
        let len = nr_sectors
            .checked_mul(SECTOR_SIZE)
            .ok_or(RequestError::TooManySectors(nr_sectors))?;
        Request::new(device, Direction::Read, sector, vec![0; len])
    }

    /// Builds a request that writes `data` starting at `sector`.
    pub fn write(device: u16, sector: u32, data: Vec<u8>) -> Result<Self, RequestError> {
        Request::new(device, Direction::Write, sector, data)
    }

    /// Builds a request covering as many sectors as `buffer` holds.
    pub fn new(
        device: u16,
        direction: Direction,
        sector: u32,
        buffer: Vec<u8>,
    ) -> Result<Self, RequestError> {
        if buffer.is_empty() {
            return Err(RequestError::EmptyBuffer);
        }
        if buffer.len() % SECTOR_SIZE != 0 {
            return Err(RequestError::UnalignedBuffer(buffer.len()));
        }
        let count = buffer.len() / SECTOR_SIZE;
        if count > MAX_SECTORS_PER_REQUEST {
            return Err(RequestError::TooManySectors(count));
        }

        Ok(Request {
            device,
            direction,
            sector,
            nr_sectors: u32::try_from(count).map_err(|_| RequestError::TooManySectors(count))?,
            buffer,
            cursor: 0,
            errors: 0,
        })
    }

    pub fn device(&self) -> u16 {
        self.device
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Next sector to transfer, relative to the start of the partition.
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// Number of sectors that haven't been transferred yet.
    pub fn remaining_sectors(&self) -> u32 {
        self.nr_sectors
    }

    /// Number of failed attempts since the last successful sector transfer.
    pub fn errors(&self) -> u8 {
        self.errors
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    pub(crate) fn increment_errors(&mut self) -> u8 {
        self.errors = self.errors.saturating_add(1);
        self.errors
    }

    pub(crate) fn clear_errors(&mut self) {
        self.errors = 0;
    }

    /// Sector of the buffer under the cursor.
    pub(crate) fn current_sector(&self) -> &[u8] {
        &self.buffer[self.cursor..self.cursor + SECTOR_SIZE]
    }

    pub(crate) fn current_sector_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.cursor..self.cursor + SECTOR_SIZE]
    }

    /// Marks the sector under the cursor as transferred. Returns the number of remaining
    /// sectors.
    pub(crate) fn finish_sector(&mut self) -> u32 {
        debug_assert!(self.nr_sectors > 0);
        self.nr_sectors -= 1;
        if self.nr_sectors != 0 {
            self.sector += 1;
            self.cursor += SECTOR_SIZE;
        }
        self.nr_sectors
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Request")
            .field("device", &self.device)
            .field("direction", &self.direction)
            .field("sector", &self.sector)
            .field("nr_sectors", &self.nr_sectors)
            .field("cursor", &self.cursor)
            .field("errors", &self.errors)
            .finish()
    }
}

/// Queue of requests serviced by the driver.
///
/// The driver only ever looks at the head of the queue. Requests are serviced in queue order.
pub trait RequestQueue {
    /// Returns the request at the head of the queue.
    fn current(&mut self) -> Option<&mut Request>;

    /// Removes the request at the head of the queue and reports its outcome to whoever is
    /// waiting for it. If `success` is false, the content of the buffer must be considered as
    /// not up to date.
    ///
    /// Does nothing if the queue is empty.
    fn end_request(&mut self, success: bool);

    fn is_empty(&self) -> bool;
}

/// Request that has been removed from a [`FifoQueue`].
#[derive(Debug)]
pub struct Finished {
    pub request: Request,
    /// If false, the content of the buffer isn't up to date.
    pub success: bool,
}

/// Simple first-in-first-out implementation of [`RequestQueue`].
#[derive(Default)]
pub struct FifoQueue {
    entries: VecDeque<(Request, oneshot::Sender<Finished>)>,
}

impl FifoQueue {
    pub fn new() -> Self {
        FifoQueue::default()
    }

    /// Pushes a request at the back of the queue. The returned receiver yields the request once
    /// it has been removed from the queue with [`RequestQueue::end_request`].
    pub fn push(&mut self, request: Request) -> oneshot::Receiver<Finished> {
        let (tx, rx) = oneshot::channel();
        self.entries.push_back((request, tx));
        rx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl RequestQueue for FifoQueue {
    fn current(&mut self) -> Option<&mut Request> {
        self.entries.front_mut().map(|(request, _)| request)
    }

    fn end_request(&mut self, success: bool) {
        let (request, sender) = match self.entries.pop_front() {
            Some(entry) => entry,
            None => return,
        };

        if !success {
            log::warn!(
                "I/O error, dev {:04x}, sector {}",
                request.device,
                request.sector
            );
        }

        // The receiver might have been dropped, in which case nobody cares about the outcome.
        let _ = sender.send(Finished { request, success });
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FifoQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(request, _)| request))
            .finish()
    }
}
