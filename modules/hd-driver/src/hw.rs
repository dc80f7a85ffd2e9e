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

//! Access to the I/O ports of the controller.

/// Abstraction over the I/O ports.
///
/// The driver doesn't assume that it can execute port instructions itself. Instead, every access
/// to the controller, the CMOS, or the interrupt controller goes through this trait.
///
/// # Safety
///
/// Implementations must forward the reads and writes to the ports they are asked for, in the
/// order in which they are performed, without merging or reordering them. The controller
/// interprets the order of writes as part of the protocol.
pub unsafe trait PortAccess {
    /// Reads a `u8` from a port.
    unsafe fn read_port_u8(&self, port: u16) -> u8;
    /// Writes a `u8` on a port.
    unsafe fn write_port_u8(&self, port: u16, data: u8);
    /// Reads a `u16` from a port.
    unsafe fn read_port_u16(&self, port: u16) -> u16;
    /// Writes a `u16` on a port.
    unsafe fn write_port_u16(&self, port: u16, data: u16);

    /// Reads `out.len()` words from the same port, similar to `rep insw`.
    unsafe fn read_port_u16_repeated(&self, port: u16, out: &mut [u16]) {
        for word in out {
            *word = self.read_port_u16(port);
        }
    }

    /// Writes all the words of `data` on the same port, similar to `rep outsw`.
    unsafe fn write_port_u16_repeated(&self, port: u16, data: &[u16]) {
        for word in data {
            self.write_port_u16(port, *word);
        }
    }
}

unsafe impl<'a, T: ?Sized + PortAccess> PortAccess for &'a T {
    unsafe fn read_port_u8(&self, port: u16) -> u8 {
        (**self).read_port_u8(port)
    }

    unsafe fn write_port_u8(&self, port: u16, data: u8) {
        (**self).write_port_u8(port, data)
    }

    unsafe fn read_port_u16(&self, port: u16) -> u16 {
        (**self).read_port_u16(port)
    }

    unsafe fn write_port_u16(&self, port: u16, data: u16) {
        (**self).write_port_u16(port, data)
    }

    unsafe fn read_port_u16_repeated(&self, port: u16, out: &mut [u16]) {
        (**self).read_port_u16_repeated(port, out)
    }

    unsafe fn write_port_u16_repeated(&self, port: u16, data: &[u16]) {
        (**self).write_port_u16_repeated(port, data)
    }
}

/// Implementation of [`PortAccess`] that uses the `in` and `out` instructions of the CPU.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Ports;

#[cfg(target_arch = "x86_64")]
unsafe impl PortAccess for X86Ports {
    unsafe fn read_port_u8(&self, port: u16) -> u8 {
        use x86_64::structures::port::PortRead as _;
        u8::read_from_port(port)
    }

    unsafe fn write_port_u8(&self, port: u16, data: u8) {
        use x86_64::structures::port::PortWrite as _;
        u8::write_to_port(port, data)
    }

    unsafe fn read_port_u16(&self, port: u16) -> u16 {
        use x86_64::structures::port::PortRead as _;
        u16::read_from_port(port)
    }

    unsafe fn write_port_u16(&self, port: u16, data: u16) {
        use x86_64::structures::port::PortWrite as _;
        u16::write_to_port(port, data)
    }
}
