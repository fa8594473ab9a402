//! Exception entry glue: one process-wide registered stub, entered by thin
//! handlers bound to the monitored exception vectors.

use spin::Mutex;

use crate::context::ExceptionContext;
use crate::session::Resume;

/// Trap number the single-step engine plants ([`crate::step::STEP_TRAP_OPCODE`]).
pub const STUB_STEP_TRAP: u8 = 0x20;
/// Trap number programs use to break into the debugger on purpose.
pub const USER_BREAK_TRAP: u8 = 0xff;

/// Exception causes the stub monitors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionVector {
    IllegalInstr,
    SlotIllegalInstr,
    DataAddressRead,
    DataAddressWrite,
    UserBreak,
    Trap,
    Other,
}

impl ExceptionVector {
    /// Unix-style signal number reported to the host as the stop reason.
    pub fn signal(self) -> u8 {
        match self {
            Self::IllegalInstr | Self::SlotIllegalInstr => 4,
            Self::DataAddressRead | Self::DataAddressWrite => 10,
            Self::Trap => 5,
            Self::UserBreak | Self::Other => 7,
        }
    }
}

/// Entry point the registered session implements.
pub trait DebugStub {
    fn enter(&mut self, vector: ExceptionVector, ctx: &mut ExceptionContext) -> Resume;
}

#[derive(Clone, Copy)]
struct StubSlot(*mut dyn DebugStub);

// SAFETY: the slot is written once at startup and only dereferenced on the
// serialized exception path.
unsafe impl Send for StubSlot {}

static STUB: Mutex<Option<StubSlot>> = Mutex::new(None);

/// Register the process-wide debug session.
pub fn register_stub(stub: &'static mut dyn DebugStub) {
    let ptr: *mut dyn DebugStub = stub;
    *STUB.lock() = Some(StubSlot(ptr));
}

/// Run the registered session for one exception. Without a registered
/// session the target just resumes.
pub fn dispatch(vector: ExceptionVector, ctx: &mut ExceptionContext) -> Resume {
    let slot = { *STUB.lock() };
    let Some(slot) = slot else {
        return Resume::Continue;
    };
    // SAFETY: the pointer originates from a registered `&'static mut`.
    unsafe { &mut *slot.0 }.enter(vector, ctx)
}

/// Handler signature the vector-table collaborator accepts.
pub type Handler = fn(&mut ExceptionContext) -> Resume;

/// The collaborator's "register a handler per exception vector" surface.
pub trait VectorTable {
    fn set_exception_handler(&mut self, vector: ExceptionVector, handler: Handler);
    fn set_trap_handler(&mut self, trap: u8, handler: Handler);
}

/// Bind the monitored vectors and the stub's two trap numbers.
pub fn install<V: VectorTable>(table: &mut V) {
    table.set_exception_handler(ExceptionVector::IllegalInstr, illegal_instr_entry);
    table.set_exception_handler(ExceptionVector::SlotIllegalInstr, slot_illegal_instr_entry);
    table.set_exception_handler(ExceptionVector::DataAddressRead, data_read_entry);
    table.set_exception_handler(ExceptionVector::DataAddressWrite, data_write_entry);
    table.set_exception_handler(ExceptionVector::UserBreak, user_break_entry);
    table.set_trap_handler(STUB_STEP_TRAP, step_trap_entry);
    table.set_trap_handler(USER_BREAK_TRAP, break_request_entry);
}

pub fn illegal_instr_entry(ctx: &mut ExceptionContext) -> Resume {
    dispatch(ExceptionVector::IllegalInstr, ctx)
}

pub fn slot_illegal_instr_entry(ctx: &mut ExceptionContext) -> Resume {
    dispatch(ExceptionVector::SlotIllegalInstr, ctx)
}

pub fn data_read_entry(ctx: &mut ExceptionContext) -> Resume {
    dispatch(ExceptionVector::DataAddressRead, ctx)
}

pub fn data_write_entry(ctx: &mut ExceptionContext) -> Resume {
    dispatch(ExceptionVector::DataAddressWrite, ctx)
}

pub fn user_break_entry(ctx: &mut ExceptionContext) -> Resume {
    dispatch(ExceptionVector::UserBreak, ctx)
}

/// Entry for the stub's own step trap. The trapped opcode is the stub's
/// patch, not the program's instruction, so the program counter is rewound
/// one instruction width before dispatch; the original word is restored at
/// session entry.
pub fn step_trap_entry(ctx: &mut ExceptionContext) -> Resume {
    ctx.pc = ctx.pc.wrapping_sub(2);
    dispatch(ExceptionVector::Trap, ctx)
}

/// Entry for a program's own break-into-debugger trap.
pub fn break_request_entry(ctx: &mut ExceptionContext) -> Resume {
    dispatch(ExceptionVector::Trap, ctx)
}
