#![no_std]

//! In-target GDB Remote Serial Protocol stub.
//!
//! The stub is entered from CPU exception context and owns the processor
//! until the host debugger resumes or kills the target. Everything the stub
//! touches outside its own state is a trait seam: the byte transport
//! ([`debug_channel::DebugChannel`]), target memory ([`memory::MemoryBus`]),
//! the hardware break channels ([`ubc::BreakBank`]), the kernel thread
//! registry ([`threads::ThreadRegistry`]), and the exception vector table
//! ([`entry::VectorTable`]).

pub mod context;
pub mod entry;
pub mod hex;
pub mod memory;
pub mod packet;
pub mod session;
pub mod step;
pub mod threads;
pub mod ubc;

/// Maximum number of bytes in one inbound/outbound packet payload. Must be
/// at least twice [`context::REG_BYTES`] for register packets.
pub const BUF_MAX: usize = 1024;

pub use context::ExceptionContext;
pub use entry::ExceptionVector;
pub use memory::{MemFault, MemoryBus};
pub use session::{DebugSession, Resume};
pub use threads::{ThreadId, ThreadRegistry};
pub use ubc::{BreakBank, BreakController, BreakError, BreakKind};
