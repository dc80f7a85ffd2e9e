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

use crate::{
    driver::HdDriver,
    error::{FatalError, IoError},
    hw::PortAccess,
    request::{FifoQueue, Finished, Request},
};

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use futures::channel::oneshot;
use spinning_top::{Spinlock, SpinlockGuard};

/// Shareable handle around an [`HdDriver`].
///
/// Requests can be submitted from any thread of execution, while the interrupt handler calls
/// [`HdDevice::interrupt`]. The driver is protected by a spinlock, which is only held for the
/// duration of a dispatch or of an interrupt handler.
///
/// The interrupt handler never spins on this lock. An interrupt that arrives while the lock is
/// held, for example right after [`HdDevice::submit`] has written a command, is recorded and
/// handled by the holder before it releases the lock.
pub struct HdDevice<THw> {
    driver: Spinlock<HdDriver<THw, FifoQueue>>,
    /// Interrupts that haven't been passed to the driver yet.
    deferred_interrupts: AtomicUsize,
}

impl<THw> HdDevice<THw>
where
    THw: PortAccess,
{
    /// Wraps around a driver on which [`HdDriver::setup`] has been called.
    pub fn new(driver: HdDriver<THw, FifoQueue>) -> Self {
        HdDevice {
            driver: Spinlock::new(driver),
            deferred_interrupts: AtomicUsize::new(0),
        }
    }

    /// Pushes a request at the back of the queue, and starts servicing it if the controller is
    /// idle.
    ///
    /// The returned receiver yields the request once it has completed.
    pub fn submit(&self, request: Request) -> Result<oneshot::Receiver<Finished>, FatalError> {
        let mut driver = self.driver.lock();
        let receiver = driver.queue_mut().push(request);
        driver.dispatch()?;
        self.release(driver)?;
        Ok(receiver)
    }

    /// Must be called when the controller raises an interrupt.
    ///
    /// Can be called while another call to a method of this object is in progress on the same
    /// CPU, in which case the interrupt is handled once that other call finishes.
    pub fn interrupt(&self) -> Result<(), FatalError> {
        self.deferred_interrupts.fetch_add(1, Ordering::AcqRel);
        match self.driver.try_lock() {
            Some(driver) => self.release(driver),
            None => Ok(()),
        }
    }

    /// Handles the deferred interrupts, then unlocks the driver.
    fn release<'a>(
        &'a self,
        mut driver: SpinlockGuard<'a, HdDriver<THw, FifoQueue>>,
    ) -> Result<(), FatalError> {
        loop {
            for _ in 0..self.deferred_interrupts.swap(0, Ordering::AcqRel) {
                driver.on_interrupt()?;
            }
            drop(driver);

            // An interrupt might have been recorded between the swap and the unlock.
            if self.deferred_interrupts.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            driver = match self.driver.try_lock() {
                Some(d) => d,
                None => return Ok(()),
            };
        }
    }

    /// Reads `nr_sectors` sectors starting at `sector` of the given minor device.
    pub async fn read(
        &self,
        device: u16,
        sector: u32,
        nr_sectors: usize,
    ) -> Result<Vec<u8>, IoError> {
        let request = Request::read(device, sector, nr_sectors)?;
        let finished = self.submit(request)?.await.map_err(|_| IoError::Dropped)?;
        check(finished).map(Request::into_buffer)
    }

    /// Writes `data` starting at `sector` of the given minor device.
    pub async fn write(&self, device: u16, sector: u32, data: Vec<u8>) -> Result<(), IoError> {
        let request = Request::write(device, sector, data)?;
        let finished = self.submit(request)?.await.map_err(|_| IoError::Dropped)?;
        check(finished).map(|_| ())
    }

    /// Destroys the handle and returns the driver.
    pub fn into_inner(self) -> HdDriver<THw, FifoQueue> {
        self.driver.into_inner()
    }
}

fn check(finished: Finished) -> Result<Request, IoError> {
    if finished.success {
        Ok(finished.request)
    } else {
        Err(IoError::Failed {
            device: finished.request.device(),
            sector: finished.request.sector(),
        })
    }
}
