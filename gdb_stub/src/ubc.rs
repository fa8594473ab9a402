//! Hardware breakpoint/watchpoint channels.
//!
//! The user break controller provides a small fixed pool of channels, each
//! matching an address against instruction fetch or operand access with an
//! operand-size qualifier. [`BreakBank`] is the typed view of that register
//! bank; [`BreakController`] owns the allocation policy.

/// Number of hardware break channels.
pub const CHANNEL_COUNT: usize = 2;

/// Largest operand width a channel can match, in bytes.
pub const MAX_OPERAND_LEN: u32 = 8;

/// Address-mask register value selecting "all address bits compared".
pub const MASK_ALL_BITS: u8 = 0x4;

/// What a channel should trigger on. Wire type codes 0..=4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakKind {
    /// Memory-patch breakpoints are left to the host's fallback.
    Software,
    HardwareExec,
    WatchWrite,
    WatchRead,
    WatchAccess,
}

impl BreakKind {
    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Software),
            1 => Some(Self::HardwareExec),
            2 => Some(Self::WatchWrite),
            3 => Some(Self::WatchRead),
            4 => Some(Self::WatchAccess),
            _ => None,
        }
    }

    /// Bus-cycle selector bits of the channel control register: instruction
    /// fetch vs operand access in [5:4], read/write in [3:2].
    fn type_code(self) -> u16 {
        match self {
            Self::Software => 0x00,
            Self::HardwareExec => 0x14,
            Self::WatchWrite => 0x28,
            Self::WatchRead => 0x24,
            Self::WatchAccess => 0x2c,
        }
    }
}

/// Programmed state of one channel. `control == 0` means free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BreakChannel {
    pub addr: u32,
    pub mask: u8,
    pub control: u16,
}

/// Typed access to the hardware channel bank.
pub trait BreakBank {
    fn channel(&self, index: usize) -> BreakChannel;
    fn program(&mut self, index: usize, channel: BreakChannel);
    /// Disable a channel, leaving its address register alone.
    fn clear(&mut self, index: usize);
    /// Reset the bank-wide control register before programming channels.
    fn reset_common(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakError {
    /// Kind the hardware does not take; the host falls back on its own.
    Unsupported,
    LengthTooLarge,
    /// Every channel is in use.
    Exhausted,
    /// No channel matches the removal request.
    NotFound,
}

/// Operand-size field: 1/2/4/8 bytes encode as 1..=4.
fn size_bits(len: u32) -> u16 {
    let mut bits = 0u16;
    let mut rest = len;
    loop {
        bits += 1;
        rest >>= 1;
        if rest == 0 {
            break;
        }
    }
    bits
}

fn encode_control(kind: BreakKind, len: u32) -> u16 {
    kind.type_code() | size_bits(len)
}

/// Channel pool manager: first-free-scan allocation, exact
/// `(address, control)` match on removal.
pub struct BreakController<B> {
    bank: B,
}

impl<B: BreakBank> BreakController<B> {
    pub fn new(bank: B) -> Self {
        Self { bank }
    }

    pub fn insert(&mut self, kind: BreakKind, addr: u32, len: u32) -> Result<(), BreakError> {
        if addr == 0 {
            // Hosts probe address 0; succeeding without programming anything
            // keeps the channel free for a real breakpoint.
            return Ok(());
        }
        if matches!(kind, BreakKind::Software) {
            return Err(BreakError::Unsupported);
        }
        if len > MAX_OPERAND_LEN {
            return Err(BreakError::LengthTooLarge);
        }

        let control = encode_control(kind, len);
        self.bank.reset_common();
        for index in 0..CHANNEL_COUNT {
            if self.bank.channel(index).control == 0 {
                self.bank.program(
                    index,
                    BreakChannel {
                        addr,
                        mask: MASK_ALL_BITS,
                        control,
                    },
                );
                log::debug!("break channel {index} set at {addr:#010x}");
                return Ok(());
            }
        }
        Err(BreakError::Exhausted)
    }

    pub fn remove(&mut self, kind: BreakKind, addr: u32, len: u32) -> Result<(), BreakError> {
        if addr == 0 {
            return Ok(());
        }
        if matches!(kind, BreakKind::Software) {
            return Err(BreakError::Unsupported);
        }
        if len > MAX_OPERAND_LEN {
            return Err(BreakError::LengthTooLarge);
        }

        let control = encode_control(kind, len);
        for index in 0..CHANNEL_COUNT {
            let channel = self.bank.channel(index);
            if channel.addr == addr && channel.control == control {
                self.bank.clear(index);
                log::debug!("break channel {index} cleared at {addr:#010x}");
                return Ok(());
            }
        }
        Err(BreakError::NotFound)
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }
}

/// The real register bank: per-channel address/mask/control registers at a
/// fixed stride from the block base, plus one common control register.
pub struct MmioBreakBank {
    base: usize,
}

/// Default block base on the reference target.
pub const UBC_BASE: usize = 0xff20_0000;

const CHANNEL_STRIDE: usize = 0xc;
const ADDR_OFFSET: usize = 0x0;
const MASK_OFFSET: usize = 0x4;
const CONTROL_OFFSET: usize = 0x8;
const COMMON_OFFSET: usize = 0x20;

impl MmioBreakBank {
    /// `base` must be the break controller's register block; all accesses
    /// are volatile at fixed offsets from it.
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    fn channel_base(&self, index: usize) -> usize {
        self.base + index * CHANNEL_STRIDE
    }
}

impl BreakBank for MmioBreakBank {
    fn channel(&self, index: usize) -> BreakChannel {
        let base = self.channel_base(index);
        // SAFETY: construction pins `base` to the device register block.
        unsafe {
            BreakChannel {
                addr: core::ptr::read_volatile((base + ADDR_OFFSET) as *const u32),
                mask: core::ptr::read_volatile((base + MASK_OFFSET) as *const u8),
                control: core::ptr::read_volatile((base + CONTROL_OFFSET) as *const u16),
            }
        }
    }

    fn program(&mut self, index: usize, channel: BreakChannel) {
        let base = self.channel_base(index);
        // SAFETY: construction pins `base` to the device register block.
        unsafe {
            core::ptr::write_volatile((base + ADDR_OFFSET) as *mut u32, channel.addr);
            core::ptr::write_volatile((base + MASK_OFFSET) as *mut u8, channel.mask);
            core::ptr::write_volatile((base + CONTROL_OFFSET) as *mut u16, channel.control);
        }
    }

    fn clear(&mut self, index: usize) {
        let base = self.channel_base(index);
        // SAFETY: construction pins `base` to the device register block.
        unsafe {
            core::ptr::write_volatile((base + CONTROL_OFFSET) as *mut u16, 0);
        }
    }

    fn reset_common(&mut self) {
        // SAFETY: construction pins `base` to the device register block.
        unsafe {
            core::ptr::write_volatile((self.base + COMMON_OFFSET) as *mut u16, 0);
        }
    }
}
