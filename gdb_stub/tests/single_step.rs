mod common;

use common::{session_script, ScriptChannel, SparseMemory, TestBank, TestThreads};
use gdb_stub::context::SR_T_BIT;
use gdb_stub::step::{next_pc, StepPatch, STEP_TRAP_OPCODE};
use gdb_stub::{DebugSession, ExceptionContext, ExceptionVector, Resume, ThreadId};

const PC: u32 = 0x8c00_0100;

fn ctx_at(pc: u32) -> ExceptionContext {
    ExceptionContext {
        pc,
        ..Default::default()
    }
}

#[test]
fn conditional_branch_taken() {
    let mut ctx = ctx_at(PC);
    ctx.sr = SR_T_BIT;
    // bt with displacement field 3: target is pc + 4 + 6.
    assert_eq!(next_pc(0x8903, &ctx), PC + 10);
    // bf with T set falls through.
    assert_eq!(next_pc(0x8b03, &ctx), PC + 2);
}

#[test]
fn conditional_branch_not_taken() {
    let ctx = ctx_at(PC);
    assert_eq!(next_pc(0x8903, &ctx), PC + 2);
    // bf with T clear is taken.
    assert_eq!(next_pc(0x8b03, &ctx), PC + 10);
}

#[test]
fn delay_slot_variant_skips_the_slot_when_not_taken() {
    let ctx = ctx_at(PC);
    // bt/s not taken: the successor is past the delay slot.
    assert_eq!(next_pc(0x8d03, &ctx), PC + 4);
    let mut ctx = ctx_at(PC);
    ctx.sr = SR_T_BIT;
    // bf/s not taken likewise.
    assert_eq!(next_pc(0x8f03, &ctx), PC + 4);
    // Taken, the target is the same as the non-slot variant.
    assert_eq!(next_pc(0x8d03, &ctx), PC + 10);
}

#[test]
fn negative_displacements_sign_extend() {
    let mut ctx = ctx_at(PC);
    ctx.sr = SR_T_BIT;
    // bt with field 0xfc: -4 instructions, so pc + 4 - 8.
    assert_eq!(next_pc(0x89fc, &ctx), PC - 4);
    // bra with field 0xffe: pc + 4 - 4.
    assert_eq!(next_pc(0xaffe, &ctx), PC);
}

#[test]
fn unconditional_branches_and_calls() {
    let ctx = ctx_at(PC);
    // bra +10
    assert_eq!(next_pc(0xa005, &ctx), PC + 14);
    // bsr transfers the same way.
    assert_eq!(next_pc(0xb005, &ctx), PC + 14);

    let mut ctx = ctx_at(PC);
    ctx.r[3] = 0x8c02_0000;
    ctx.r[5] = 0x8c03_0000;
    // jsr @r3
    assert_eq!(next_pc(0x430b, &ctx), 0x8c02_0000);
    // jmp @r5
    assert_eq!(next_pc(0x452b, &ctx), 0x8c03_0000);
}

#[test]
fn returns_and_traps() {
    let mut ctx = ctx_at(PC);
    ctx.pr = 0x8c04_0000;
    ctx.r[15] = 0x8c05_0000;
    // rts
    assert_eq!(next_pc(0x000b, &ctx), 0x8c04_0000);
    // rte returns through the saved stack slot.
    assert_eq!(next_pc(0x002b, &ctx), 0x8c05_0000);
    // trapa #0x21 vectors through imm << 2.
    assert_eq!(next_pc(0xc321, &ctx), 0x84);
}

#[test]
fn ordinary_instruction_falls_through() {
    let ctx = ctx_at(PC);
    // mov #0, r1
    assert_eq!(next_pc(0xe100, &ctx), PC + 2);
}

#[test]
fn patch_plants_trap_and_undo_restores() {
    let mut mem = SparseMemory::new();
    let mut ctx = ctx_at(PC);
    ctx.sr = SR_T_BIT;
    mem.seed_u16(PC, 0x8903);
    mem.seed_u16(PC + 10, 0xaaaa);

    let patch = StepPatch::arm(&mut mem, &ctx).unwrap();
    assert_eq!(patch.addr(), PC + 10);
    assert_eq!(mem.get_u16(PC + 10), STEP_TRAP_OPCODE);
    assert!(mem.flushes.contains(&(PC + 10, 2)));

    patch.undo(&mut mem).unwrap();
    assert_eq!(mem.get_u16(PC + 10), 0xaaaa);
}

#[test]
fn arming_faults_on_unmapped_code() {
    let mut mem = SparseMemory::new();
    let ctx = ctx_at(PC);
    assert!(StepPatch::arm(&mut mem, &ctx).is_err());
}

#[test]
fn session_arms_on_step_and_restores_on_reentry() {
    let mut mem = SparseMemory::new();
    mem.seed_u16(PC, 0xe100);
    mem.seed_u16(PC + 2, 0x1234);

    let threads = TestThreads {
        current: ThreadId(1),
        rows: vec![(1, "main", None)],
    };
    let chan = ScriptChannel::new(session_script(&[b"s"]));
    let mut session = DebugSession::new(chan, mem, TestBank::default(), threads);
    let mut ctx = ctx_at(PC);

    let resume = session.on_exception(ExceptionVector::Trap, &mut ctx).unwrap();
    assert_eq!(resume, Resume::Step);
    assert_eq!(session.step_target(), Some(PC + 2));

    *session.channel_mut() = ScriptChannel::new(session_script(&[b"c"]));
    let resume = session.on_exception(ExceptionVector::Trap, &mut ctx).unwrap();
    assert_eq!(resume, Resume::Continue);
    assert_eq!(session.step_target(), None);

    let (_, mem, _, _) = session.into_parts();
    assert_eq!(mem.get_u16(PC + 2), 0x1234);
}
