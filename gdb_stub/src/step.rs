//! Single-step synthesis: decode the instruction at the program counter,
//! plant a trap at the one address control can reach next, undo on re-entry.

use crate::context::{ExceptionContext, SR_T_BIT};
use crate::memory::{MemFault, MemoryBus};

/// `trapa #0x20`, the opcode planted at the step target. The handler bound
/// to trap 0x20 recognizes it as step completion.
pub const STEP_TRAP_OPCODE: u16 = 0xc320;

const COND_BR_MASK: u16 = 0xff00;
const UCOND_DBR_MASK: u16 = 0xe000;
const UCOND_RBR_MASK: u16 = 0xf0df;
const TRAPA_MASK: u16 = 0xff00;

const BT_INSTR: u16 = 0x8900;
const BTS_INSTR: u16 = 0x8d00;
const BF_INSTR: u16 = 0x8b00;
const BFS_INSTR: u16 = 0x8f00;
/// `bra`; the 0xe000 mask also catches `bsr` (0xb000), which transfers
/// control the same way.
const BRA_INSTR: u16 = 0xa000;
/// `jsr @rn`; the 0xf0df mask also catches `jmp @rn` (0x402b).
const JSR_INSTR: u16 = 0x400b;
const RTS_INSTR: u16 = 0x000b;
const RTE_INSTR: u16 = 0x002b;
const TRAPA_INSTR: u16 = 0xc300;

/// Control-transfer effect of one instruction word. Pure decode result; the
/// architecture specifics stay behind this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlTransfer {
    /// Conditional branch: taken when the T bit equals `when_true`.
    /// `delay_slot` marks the `/s` variants whose not-taken successor is
    /// two instructions ahead (no trap may sit in a delay slot).
    BranchCond {
        disp: i32,
        when_true: bool,
        delay_slot: bool,
    },
    /// PC-relative unconditional branch (`bra`, `bsr`).
    BranchUncond { disp: i32 },
    /// Register-indirect transfer (`jsr @rn`, `jmp @rn`).
    CallIndirect { reg: usize },
    /// `rts`: target is the saved return address.
    Return,
    /// `rte`: target is the saved context slot (r15 in the frame).
    ExceptionReturn,
    /// `trapa #imm`: target is the vector-derived address `imm << 2`.
    Trap { imm: u8 },
    /// Anything else falls through to the next sequential instruction.
    Fallthrough,
}

/// Sign-extended 8-bit displacement, in bytes.
fn cond_disp(opcode: u16) -> i32 {
    i32::from((opcode & 0x00ff) as u8 as i8) << 1
}

/// Sign-extended 12-bit displacement, in bytes.
fn uncond_disp(opcode: u16) -> i32 {
    ((i32::from(opcode & 0x0fff) << 20) >> 20) << 1
}

pub fn classify(opcode: u16) -> ControlTransfer {
    match opcode & COND_BR_MASK {
        BT_INSTR => {
            return ControlTransfer::BranchCond {
                disp: cond_disp(opcode),
                when_true: true,
                delay_slot: false,
            }
        }
        BTS_INSTR => {
            return ControlTransfer::BranchCond {
                disp: cond_disp(opcode),
                when_true: true,
                delay_slot: true,
            }
        }
        BF_INSTR => {
            return ControlTransfer::BranchCond {
                disp: cond_disp(opcode),
                when_true: false,
                delay_slot: false,
            }
        }
        BFS_INSTR => {
            return ControlTransfer::BranchCond {
                disp: cond_disp(opcode),
                when_true: false,
                delay_slot: true,
            }
        }
        _ => {}
    }

    if opcode & UCOND_DBR_MASK == BRA_INSTR {
        return ControlTransfer::BranchUncond {
            disp: uncond_disp(opcode),
        };
    }
    if opcode & UCOND_RBR_MASK == JSR_INSTR {
        return ControlTransfer::CallIndirect {
            reg: usize::from((opcode >> 8) & 0xf),
        };
    }
    if opcode == RTS_INSTR {
        return ControlTransfer::Return;
    }
    if opcode == RTE_INSTR {
        return ControlTransfer::ExceptionReturn;
    }
    if opcode & TRAPA_MASK == TRAPA_INSTR {
        return ControlTransfer::Trap {
            imm: (opcode & 0x00ff) as u8,
        };
    }
    ControlTransfer::Fallthrough
}

/// Address of the next instruction to execute after the one at `ctx.pc`.
///
/// Branch targets are relative to `pc + 4` (the branch's own delay-slot
/// accounting on this architecture).
pub fn next_pc(opcode: u16, ctx: &ExceptionContext) -> u32 {
    match classify(opcode) {
        ControlTransfer::BranchCond {
            disp,
            when_true,
            delay_slot,
        } => {
            let t_set = ctx.sr & SR_T_BIT != 0;
            if t_set == when_true {
                ctx.pc.wrapping_add(4).wrapping_add(disp as u32)
            } else if delay_slot {
                ctx.pc.wrapping_add(4)
            } else {
                ctx.pc.wrapping_add(2)
            }
        }
        ControlTransfer::BranchUncond { disp } => {
            ctx.pc.wrapping_add(4).wrapping_add(disp as u32)
        }
        ControlTransfer::CallIndirect { reg } => ctx.r[reg],
        ControlTransfer::Return => ctx.pr,
        ControlTransfer::ExceptionReturn => ctx.r[15],
        ControlTransfer::Trap { imm } => u32::from(imm) << 2,
        ControlTransfer::Fallthrough => ctx.pc.wrapping_add(2),
    }
}

/// One armed single-step: the patched address and the displaced word.
/// At most one exists per session; it must be undone on the next stub entry
/// of any kind, before any command is serviced.
#[derive(Clone, Copy, Debug)]
pub struct StepPatch {
    addr: u32,
    saved: u16,
}

impl StepPatch {
    /// Decode at `ctx.pc`, plant the step trap at the successor address.
    pub fn arm<M: MemoryBus>(mem: &mut M, ctx: &ExceptionContext) -> Result<Self, MemFault> {
        let opcode = mem.read_u16(ctx.pc)?;
        let target = next_pc(opcode, ctx);
        let saved = mem.read_u16(target)?;
        mem.write_u16(target, STEP_TRAP_OPCODE)?;
        mem.flush_icache(target, 2);
        Ok(Self {
            addr: target,
            saved,
        })
    }

    /// Restore the displaced instruction word.
    pub fn undo<M: MemoryBus>(self, mem: &mut M) -> Result<(), MemFault> {
        mem.write_u16(self.addr, self.saved)?;
        mem.flush_icache(self.addr, 2);
        Ok(())
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }
}
