//! Saved execution context and the protocol-ordered register table.
//!
//! The wire order of the `g`/`G` register blob is a compatibility contract
//! with the host: general-purpose registers first, then control/status
//! registers, then the floating-point bank. [`REG_ORDER`] is the single
//! definition of that order; both directions walk it.

use crate::hex;

/// T (test/true) bit of the status register, consulted by conditional
/// branches.
pub const SR_T_BIT: u32 = 0x0001;

/// Registers saved by the exception entry path, in the kernel's frame
/// layout. Not owned by the stub; the stub reads and writes it in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExceptionContext {
    pub r: [u32; 16],
    pub pc: u32,
    pub pr: u32,
    pub gbr: u32,
    pub vbr: u32,
    pub mach: u32,
    pub macl: u32,
    pub sr: u32,
    pub fpul: u32,
    pub fpscr: u32,
    pub fr: [u32; 16],
}

/// One protocol register slot, resolved to a context field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegSlot {
    Gpr(u8),
    Pc,
    Pr,
    Gbr,
    Vbr,
    Mach,
    Macl,
    Sr,
    Fpul,
    Fpscr,
    Fpr(u8),
}

pub const REG_COUNT: usize = 41;
pub const REG_SIZE: usize = 4;
/// Length of the raw register blob; the wire form is twice this in hex
/// digits.
pub const REG_BYTES: usize = REG_COUNT * REG_SIZE;

use RegSlot::*;

/// Protocol index -> register slot.
pub const REG_ORDER: [RegSlot; REG_COUNT] = [
    Gpr(0),
    Gpr(1),
    Gpr(2),
    Gpr(3),
    Gpr(4),
    Gpr(5),
    Gpr(6),
    Gpr(7),
    Gpr(8),
    Gpr(9),
    Gpr(10),
    Gpr(11),
    Gpr(12),
    Gpr(13),
    Gpr(14),
    Gpr(15),
    Pc,
    Pr,
    Gbr,
    Vbr,
    Mach,
    Macl,
    Sr,
    Fpul,
    Fpscr,
    Fpr(0),
    Fpr(1),
    Fpr(2),
    Fpr(3),
    Fpr(4),
    Fpr(5),
    Fpr(6),
    Fpr(7),
    Fpr(8),
    Fpr(9),
    Fpr(10),
    Fpr(11),
    Fpr(12),
    Fpr(13),
    Fpr(14),
    Fpr(15),
];

impl ExceptionContext {
    pub fn get(&self, slot: RegSlot) -> u32 {
        match slot {
            Gpr(n) => self.r[n as usize],
            Pc => self.pc,
            Pr => self.pr,
            Gbr => self.gbr,
            Vbr => self.vbr,
            Mach => self.mach,
            Macl => self.macl,
            Sr => self.sr,
            Fpul => self.fpul,
            Fpscr => self.fpscr,
            Fpr(n) => self.fr[n as usize],
        }
    }

    pub fn set(&mut self, slot: RegSlot, value: u32) {
        match slot {
            Gpr(n) => self.r[n as usize] = value,
            Pc => self.pc = value,
            Pr => self.pr = value,
            Gbr => self.gbr = value,
            Vbr => self.vbr = value,
            Mach => self.mach = value,
            Macl => self.macl = value,
            Sr => self.sr = value,
            Fpul => self.fpul = value,
            Fpscr => self.fpscr = value,
            Fpr(n) => self.fr[n as usize] = value,
        }
    }

    /// Encode every slot in protocol order as hex, target byte order.
    /// Returns the number of characters written (`2 * REG_BYTES`).
    pub fn encode_registers(&self, dst: &mut [u8]) -> usize {
        let mut idx = 0usize;
        for slot in REG_ORDER {
            idx += hex::encode_hex(&self.get(slot).to_le_bytes(), &mut dst[idx..]);
        }
        idx
    }

    /// Decode a full register blob in protocol order. `src` must hold at
    /// least `2 * REG_BYTES` hex digits.
    pub fn decode_registers(&mut self, src: &[u8]) -> Result<(), ()> {
        if src.len() < REG_BYTES * 2 {
            return Err(());
        }
        let mut idx = 0usize;
        for slot in REG_ORDER {
            let mut raw = [0u8; REG_SIZE];
            hex::decode_hex(&src[idx..idx + REG_SIZE * 2], &mut raw)?;
            self.set(slot, u32::from_le_bytes(raw));
            idx += REG_SIZE * 2;
        }
        Ok(())
    }
}
