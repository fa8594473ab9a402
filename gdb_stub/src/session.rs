//! Command dispatcher: the loop the stub runs while it owns the processor.
//!
//! Entered with the faulting thread's saved context, the session reports the
//! stop reason, then serves host commands until one of them resumes or kills
//! the target. Replies are built in stack buffers; the session itself holds
//! only the transport, the seams, and the one-shot step patch.

use debug_channel::DebugChannel;

use crate::context::ExceptionContext;
use crate::entry::{self, ExceptionVector};
use crate::hex::{self, Scanner};
use crate::memory::MemoryBus;
use crate::packet;
use crate::step::StepPatch;
use crate::threads::{ThreadId, ThreadRegistry, TLS_HEADER_BYTES};
use crate::ubc::{BreakBank, BreakController, BreakError, BreakKind};
use crate::BUF_MAX;

const REPLY_OK: &[u8] = b"OK";
const REPLY_EMPTY: &[u8] = b"";
/// Unparseable `m` argument, or a removal that matched no channel.
const ERR_BAD_ARGS: &[u8] = b"E06";
/// Unparseable `M`/`Z`/`z` arguments.
const ERR_MALFORMED: &[u8] = b"E02";
/// The target memory access faulted.
const ERR_MEM_FAULT: &[u8] = b"E30";
/// Watch operand wider than a channel can match.
const ERR_WATCH_TOO_WIDE: &[u8] = b"E51";
/// Every hardware break channel is in use.
const ERR_NO_CHANNEL: &[u8] = b"E50";
const ERR_BAD_TID: &[u8] = b"E.invalid thread id";
const ERR_THREAD_DEAD: &[u8] = b"E.thread not alive";
const ERR_NO_TLS: &[u8] = b"E.no tls block";
const ERR_BAD_FORMAT: &[u8] = b"E.invalid packet format";

/// How the target leaves the stub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Resume execution at the (possibly rewritten) program counter.
    Continue,
    /// Resume with a step trap armed at the successor instruction.
    Step,
    /// The host gave up on the target; the platform decides what that means.
    Kill,
}

/// One debug session over a byte channel.
pub struct DebugSession<C, M, B, T> {
    chan: C,
    mem: M,
    breaks: BreakController<B>,
    threads: T,
    step: Option<StepPatch>,
    last_signal: u8,
    verbose: bool,
}

impl<C, M, B, T> DebugSession<C, M, B, T>
where
    C: DebugChannel,
    M: MemoryBus,
    B: BreakBank,
    T: ThreadRegistry,
{
    pub fn new(chan: C, mem: M, bank: B, threads: T) -> Self {
        Self {
            chan,
            mem,
            breaks: BreakController::new(bank),
            threads,
            step: None,
            last_signal: 0,
            verbose: false,
        }
    }

    /// Service one exception: restore any armed step patch, report the stop,
    /// then run commands until the host resumes the target.
    pub fn on_exception(
        &mut self,
        vector: ExceptionVector,
        ctx: &mut ExceptionContext,
    ) -> Result<Resume, C::Error> {
        self.last_signal = vector.signal();
        self.disarm_step();
        log::info!("stopped with signal {} at {:#010x}", self.last_signal, ctx.pc);
        self.report_stop()?;
        self.command_loop(ctx)
    }

    /// Address the current step patch occupies, if one is armed.
    pub fn step_target(&self) -> Option<u32> {
        self.step.as_ref().map(StepPatch::addr)
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.chan
    }

    pub fn into_parts(self) -> (C, M, BreakController<B>, T) {
        (self.chan, self.mem, self.breaks, self.threads)
    }

    fn command_loop(&mut self, ctx: &mut ExceptionContext) -> Result<Resume, C::Error> {
        loop {
            let mut buf = [0u8; BUF_MAX];
            let frame = packet::recv_packet(&mut self.chan, &mut buf)?;
            let payload = &buf[frame.offset..frame.offset + frame.len];

            let Some(&command) = payload.first() else {
                self.reply(REPLY_EMPTY)?;
                continue;
            };
            if self.verbose {
                log::debug!("command '{}', {} byte payload", char::from(command), payload.len());
            }

            match command {
                b'?' => self.report_stop()?,
                b'g' => self.cmd_read_registers(ctx)?,
                b'G' => self.cmd_write_registers(&payload[1..], ctx)?,
                b'm' => self.cmd_read_memory(&payload[1..])?,
                b'M' => self.cmd_write_memory(&payload[1..])?,
                b'Z' => self.cmd_break(&payload[1..], true)?,
                b'z' => self.cmd_break(&payload[1..], false)?,
                b'q' => self.cmd_query(&payload[1..])?,
                b'T' => self.cmd_thread_alive(&payload[1..])?,
                b'c' => {
                    if let Some(addr) = Scanner::new(&payload[1..]).hex_u32() {
                        ctx.pc = addr;
                    }
                    return Ok(Resume::Continue);
                }
                b's' => {
                    if let Some(addr) = Scanner::new(&payload[1..]).hex_u32() {
                        ctx.pc = addr;
                    }
                    self.arm_step(ctx);
                    return Ok(Resume::Step);
                }
                b'k' => return Ok(Resume::Kill),
                b'd' => {
                    self.verbose = !self.verbose;
                    self.reply(REPLY_EMPTY)?;
                }
                _ => self.reply(REPLY_EMPTY)?,
            }
        }
    }

    fn reply(&mut self, payload: &[u8]) -> Result<(), C::Error> {
        packet::send_packet(&mut self.chan, payload)
    }

    /// `S<nn>` stop reply for the signal recorded at entry.
    fn report_stop(&mut self) -> Result<(), C::Error> {
        let out = [
            b'S',
            hex::high_digit(self.last_signal),
            hex::low_digit(self.last_signal),
        ];
        self.reply(&out)
    }

    fn disarm_step(&mut self) {
        if let Some(patch) = self.step.take() {
            if patch.undo(&mut self.mem).is_err() {
                log::error!("failed to restore instruction at {:#010x}", patch.addr());
            }
        }
    }

    fn arm_step(&mut self, ctx: &ExceptionContext) {
        match StepPatch::arm(&mut self.mem, ctx) {
            Ok(patch) => self.step = Some(patch),
            // The resume degenerates to a plain continue.
            Err(fault) => log::warn!("cannot arm single step near {:#010x}", fault.addr),
        }
    }

    fn cmd_read_registers(&mut self, ctx: &ExceptionContext) -> Result<(), C::Error> {
        let mut out = [0u8; BUF_MAX];
        let len = ctx.encode_registers(&mut out);
        self.reply(&out[..len])
    }

    fn cmd_write_registers(
        &mut self,
        body: &[u8],
        ctx: &mut ExceptionContext,
    ) -> Result<(), C::Error> {
        match ctx.decode_registers(body) {
            Ok(()) => self.reply(REPLY_OK),
            Err(()) => self.reply(ERR_BAD_ARGS),
        }
    }

    /// `m<addr>,<len>`: hex dump of target memory.
    fn cmd_read_memory(&mut self, body: &[u8]) -> Result<(), C::Error> {
        let mut s = Scanner::new(body);
        let (Some(addr), true, Some(len)) = (s.hex_u32(), s.expect(b','), s.hex_u32()) else {
            return self.reply(ERR_BAD_ARGS);
        };
        let len = len as usize;
        if len > BUF_MAX / 2 {
            return self.reply(ERR_BAD_ARGS);
        }

        let mut raw = [0u8; BUF_MAX / 2];
        if self.mem.read(addr, &mut raw[..len]).is_err() {
            return self.reply(ERR_MEM_FAULT);
        }
        let mut out = [0u8; BUF_MAX];
        let written = hex::encode_hex(&raw[..len], &mut out);
        self.reply(&out[..written])
    }

    /// `M<addr>,<len>:<hex>`: patch target memory, then make the change
    /// visible to the instruction stream.
    fn cmd_write_memory(&mut self, body: &[u8]) -> Result<(), C::Error> {
        let mut s = Scanner::new(body);
        let (Some(addr), true, Some(len), true) =
            (s.hex_u32(), s.expect(b','), s.hex_u32(), s.expect(b':'))
        else {
            return self.reply(ERR_MALFORMED);
        };
        let len = len as usize;
        if len > BUF_MAX / 2 {
            return self.reply(ERR_MALFORMED);
        }

        let mut raw = [0u8; BUF_MAX / 2];
        match hex::decode_hex(s.rest(), &mut raw) {
            Ok(decoded) if decoded == len => {}
            _ => return self.reply(ERR_MALFORMED),
        }
        if self.mem.write(addr, &raw[..len]).is_err() {
            return self.reply(ERR_MEM_FAULT);
        }
        self.mem.flush_icache(addr, len as u32);
        self.reply(REPLY_OK)
    }

    /// `Z<type>,<addr>,<len>` / `z<type>,<addr>,<len>`.
    fn cmd_break(&mut self, body: &[u8], insert: bool) -> Result<(), C::Error> {
        let Some((&type_ch, rest)) = body.split_first() else {
            return self.reply(ERR_MALFORMED);
        };
        let Some(kind) = BreakKind::from_wire(type_ch.wrapping_sub(b'0')) else {
            // Types this target never supports get the not-implemented reply.
            return self.reply(REPLY_EMPTY);
        };
        let mut s = Scanner::new(rest);
        let (true, Some(addr), true, Some(len)) =
            (s.expect(b','), s.hex_u32(), s.expect(b','), s.hex_u32())
        else {
            return self.reply(ERR_MALFORMED);
        };

        let result = if insert {
            self.breaks.insert(kind, addr, len)
        } else {
            self.breaks.remove(kind, addr, len)
        };
        let token = match result {
            Ok(()) => REPLY_OK,
            Err(BreakError::Unsupported) => REPLY_EMPTY,
            Err(BreakError::LengthTooLarge) => ERR_WATCH_TOO_WIDE,
            Err(BreakError::Exhausted) => ERR_NO_CHANNEL,
            Err(BreakError::NotFound) => ERR_BAD_ARGS,
        };
        self.reply(token)
    }

    fn cmd_query(&mut self, body: &[u8]) -> Result<(), C::Error> {
        if body == b"C" {
            let tid = self.threads.current();
            let out = [
                b'Q',
                b'C',
                hex::high_digit(tid.0 as u8),
                hex::low_digit(tid.0 as u8),
            ];
            self.reply(&out)
        } else if body == b"fThreadInfo" {
            self.reply_thread_list()
        } else if body == b"sThreadInfo" {
            // The whole list fits in one first reply.
            self.reply(b"l")
        } else if let Some(rest) = body.strip_prefix(b"ThreadExtraInfo,") {
            self.reply_thread_label(rest)
        } else if let Some(rest) = body.strip_prefix(b"GetTLSAddr:") {
            self.reply_tls_addr(rest)
        } else {
            self.reply(REPLY_EMPTY)
        }
    }

    fn reply_thread_list(&mut self) -> Result<(), C::Error> {
        let mut out = [0u8; BUF_MAX];
        out[0] = b'm';
        let mut idx = 1usize;
        self.threads.each(&mut |tid| {
            if idx + 3 > BUF_MAX {
                return false;
            }
            if idx > 1 {
                out[idx] = b',';
                idx += 1;
            }
            out[idx] = hex::high_digit(tid.0 as u8);
            out[idx + 1] = hex::low_digit(tid.0 as u8);
            idx += 2;
            true
        });
        self.reply(&out[..idx])
    }

    fn reply_thread_label(&mut self, body: &[u8]) -> Result<(), C::Error> {
        let Some(tid) = Scanner::new(body).hex_u32() else {
            return self.reply(ERR_BAD_TID);
        };
        match self.threads.label(ThreadId(tid)) {
            Some(label) => {
                let mut out = [0u8; BUF_MAX];
                let written = hex::encode_hex(label.as_bytes(), &mut out);
                self.reply(&out[..written])
            }
            None => self.reply(ERR_BAD_TID),
        }
    }

    /// `qGetTLSAddr:<tid>,<offset>,<lm>`. The load-module argument is parsed
    /// and ignored; the target links everything statically.
    fn reply_tls_addr(&mut self, body: &[u8]) -> Result<(), C::Error> {
        let mut s = Scanner::new(body);
        let (Some(tid), true, Some(offset), true, Some(_lm)) = (
            s.hex_u32(),
            s.expect(b','),
            s.hex_u32(),
            s.expect(b','),
            s.hex_u32(),
        ) else {
            return self.reply(ERR_BAD_FORMAT);
        };

        let id = ThreadId(tid);
        if !self.threads.is_alive(id) {
            return self.reply(ERR_BAD_TID);
        }
        match self.threads.tls_base(id) {
            Some(base) => {
                let addr = base.wrapping_add(TLS_HEADER_BYTES).wrapping_add(offset);
                let mut out = [0u8; 8];
                hex::encode_hex(&addr.to_le_bytes(), &mut out);
                self.reply(&out)
            }
            None => self.reply(ERR_NO_TLS),
        }
    }

    fn cmd_thread_alive(&mut self, body: &[u8]) -> Result<(), C::Error> {
        match Scanner::new(body).hex_u32() {
            Some(tid) if self.threads.is_alive(ThreadId(tid)) => self.reply(REPLY_OK),
            Some(_) => self.reply(ERR_THREAD_DEAD),
            None => self.reply(REPLY_EMPTY),
        }
    }
}

impl<C, M, B, T> entry::DebugStub for DebugSession<C, M, B, T>
where
    C: DebugChannel,
    M: MemoryBus,
    B: BreakBank,
    T: ThreadRegistry,
{
    fn enter(&mut self, vector: ExceptionVector, ctx: &mut ExceptionContext) -> Resume {
        match self.on_exception(vector, ctx) {
            Ok(resume) => resume,
            Err(_) => {
                // Nothing left to talk over; let the target run.
                log::error!("debug channel failed, resuming target");
                Resume::Continue
            }
        }
    }
}
