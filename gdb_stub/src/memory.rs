//! Target memory access seam.

/// A contained memory fault: the access did not complete and the stub keeps
/// running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemFault {
    pub addr: u32,
}

/// Bulk access to target memory.
///
/// Implementations must contain faults (typically by cooperating with the
/// platform's bus-error path) rather than letting them propagate into the
/// stub, and must make patched code visible to the instruction stream via
/// `flush_icache`.
pub trait MemoryBus {
    fn read(&mut self, addr: u32, dst: &mut [u8]) -> Result<(), MemFault>;
    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), MemFault>;

    /// Make `len` bytes at `addr` coherent with the instruction stream
    /// after a code-modifying write.
    fn flush_icache(&mut self, addr: u32, len: u32);

    fn read_u16(&mut self, addr: u32) -> Result<u16, MemFault> {
        let mut raw = [0u8; 2];
        self.read(addr, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemFault> {
        self.write(addr, &value.to_le_bytes())
    }
}

/// Raw volatile access to the current address space.
///
/// Fault containment comes from the surrounding platform: while the stub
/// services `m`/`M`, the kernel's bus-error handler must report the fault
/// instead of re-entering the stub. Callers own that arrangement.
pub struct DirectMemory;

impl DirectMemory {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for DirectMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for DirectMemory {
    fn read(&mut self, addr: u32, dst: &mut [u8]) -> Result<(), MemFault> {
        let ptr = addr as usize as *const u8;
        for (idx, slot) in dst.iter_mut().enumerate() {
            // SAFETY: caller ensures the range is mapped readable.
            unsafe {
                *slot = core::ptr::read_volatile(ptr.add(idx));
            }
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), MemFault> {
        let ptr = addr as usize as *mut u8;
        for (idx, byte) in src.iter().copied().enumerate() {
            // SAFETY: caller ensures the range is mapped writable.
            unsafe {
                core::ptr::write_volatile(ptr.add(idx), byte);
            }
        }
        Ok(())
    }

    fn flush_icache(&mut self, _addr: u32, _len: u32) {
        // The platform wires its cache maintenance primitive in here; a
        // plain DirectMemory has none.
    }
}
