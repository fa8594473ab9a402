//! Shared fixtures: a scripted byte channel, a sparse memory model, a fake
//! break-channel bank, a canned thread registry, and wire-format helpers.

#![allow(dead_code)]

use std::collections::BTreeMap;

use gdb_stub::ubc::{BreakChannel, CHANNEL_COUNT};
use gdb_stub::{BreakBank, MemFault, MemoryBus, ThreadId, ThreadRegistry};

/// The scripted input ran dry.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelClosed;

/// Channel that replays a fixed input and records everything written.
pub struct ScriptChannel {
    input: Vec<u8>,
    pos: usize,
    pub output: Vec<u8>,
}

impl ScriptChannel {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input,
            pos: 0,
            output: Vec::new(),
        }
    }
}

impl debug_channel::DebugChannel for ScriptChannel {
    type Error = ChannelClosed;

    fn get(&mut self) -> Result<u8, ChannelClosed> {
        let byte = *self.input.get(self.pos).ok_or(ChannelClosed)?;
        self.pos += 1;
        Ok(byte)
    }

    fn put(&mut self, byte: u8) -> Result<(), ChannelClosed> {
        self.output.push(byte);
        Ok(())
    }
}

/// Byte-granular memory where only seeded addresses exist; touching anything
/// else faults, which stands in for a bus error.
#[derive(Default)]
pub struct SparseMemory {
    bytes: BTreeMap<u32, u8>,
    pub flushes: Vec<(u32, u32)>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, addr: u32, data: &[u8]) {
        for (idx, &byte) in data.iter().enumerate() {
            self.bytes.insert(addr + idx as u32, byte);
        }
    }

    pub fn seed_u16(&mut self, addr: u32, value: u16) {
        self.seed(addr, &value.to_le_bytes());
    }

    pub fn get(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|idx| self.bytes[&(addr + idx as u32)])
            .collect()
    }

    pub fn get_u16(&self, addr: u32) -> u16 {
        let raw = self.get(addr, 2);
        u16::from_le_bytes([raw[0], raw[1]])
    }
}

impl MemoryBus for SparseMemory {
    fn read(&mut self, addr: u32, dst: &mut [u8]) -> Result<(), MemFault> {
        for (idx, slot) in dst.iter_mut().enumerate() {
            let at = addr + idx as u32;
            *slot = *self.bytes.get(&at).ok_or(MemFault { addr: at })?;
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), MemFault> {
        for idx in 0..src.len() {
            let at = addr + idx as u32;
            if !self.bytes.contains_key(&at) {
                return Err(MemFault { addr: at });
            }
        }
        for (idx, &byte) in src.iter().enumerate() {
            self.bytes.insert(addr + idx as u32, byte);
        }
        Ok(())
    }

    fn flush_icache(&mut self, addr: u32, len: u32) {
        self.flushes.push((addr, len));
    }
}

/// In-memory stand-in for the hardware channel bank.
#[derive(Default)]
pub struct TestBank {
    pub channels: [BreakChannel; CHANNEL_COUNT],
    pub common_resets: usize,
}

impl BreakBank for TestBank {
    fn channel(&self, index: usize) -> BreakChannel {
        self.channels[index]
    }

    fn program(&mut self, index: usize, channel: BreakChannel) {
        self.channels[index] = channel;
    }

    fn clear(&mut self, index: usize) {
        self.channels[index].control = 0;
    }

    fn reset_common(&mut self) {
        self.common_resets += 1;
    }
}

/// Canned thread registry: `(tid, label, tls base)` rows.
pub struct TestThreads {
    pub current: ThreadId,
    pub rows: Vec<(u32, &'static str, Option<u32>)>,
}

impl ThreadRegistry for TestThreads {
    fn current(&self) -> ThreadId {
        self.current
    }

    fn each(&self, visit: &mut dyn FnMut(ThreadId) -> bool) {
        for &(tid, _, _) in &self.rows {
            if !visit(ThreadId(tid)) {
                return;
            }
        }
    }

    fn label(&self, id: ThreadId) -> Option<&str> {
        self.rows
            .iter()
            .find(|&&(tid, _, _)| tid == id.0)
            .map(|&(_, label, _)| label)
    }

    fn tls_base(&self, id: ThreadId) -> Option<u32> {
        self.rows
            .iter()
            .find(|&&(tid, _, _)| tid == id.0)
            .and_then(|&(_, _, base)| base)
    }
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Frame a payload the way the host would send it.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let sum = checksum(payload);
    let mut out = vec![b'$'];
    out.extend_from_slice(payload);
    out.push(b'#');
    out.push(to_hex(sum >> 4));
    out.push(to_hex(sum & 0xf));
    out
}

fn to_hex(nibble: u8) -> u8 {
    b"0123456789abcdef"[nibble as usize]
}

/// Input script for a whole session: an ACK for the initial stop reply, then
/// each command framed and followed by an ACK for the stub's reply.
pub fn session_script(commands: &[&[u8]]) -> Vec<u8> {
    let mut script = vec![b'+'];
    for command in commands {
        script.extend(frame(command));
        script.push(b'+');
    }
    script
}

/// Extract the stub's reply payloads from recorded wire output: frames are
/// checksum-verified over the bytes as emitted, then run-length expanded.
/// ACKs, NAKs, and sequence-id echoes between frames are skipped.
pub fn reply_payloads(wire: &[u8]) -> Vec<Vec<u8>> {
    let mut replies = Vec::new();
    let mut pos = 0usize;
    while pos < wire.len() {
        if wire[pos] != b'$' {
            pos += 1;
            continue;
        }
        pos += 1;
        let body_start = pos;
        while wire[pos] != b'#' {
            pos += 1;
        }
        let body = &wire[body_start..pos];
        let sent = u8::from_str_radix(
            std::str::from_utf8(&wire[pos + 1..pos + 3]).unwrap(),
            16,
        )
        .unwrap();
        assert_eq!(sent, checksum(body), "frame checksum mismatch");
        pos += 3;
        replies.push(expand_rle(body));
    }
    replies
}

fn expand_rle(body: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    let mut idx = 0usize;
    while idx < body.len() {
        if body[idx] == b'*' {
            let run = usize::from(body[idx + 1] - b' ') + 4;
            let byte = *out.last().unwrap();
            // The literal byte before the marker already counts toward the run.
            out.extend(std::iter::repeat(byte).take(run - 1));
            idx += 2;
        } else {
            out.push(body[idx]);
            idx += 1;
        }
    }
    out
}
