//! Seam onto the kernel's live thread registry.
//!
//! The registry is externally owned and may mutate between calls; the stub
//! only reads whatever snapshot the kernel's iteration API provides.

/// Opaque thread id. The wire form is a 2-hex-digit number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadId(pub u32);

/// Bytes between a thread's TLS control block and the start of its static
/// TLS data; host-requested offsets are relative to the latter.
pub const TLS_HEADER_BYTES: u32 = 8;

pub trait ThreadRegistry {
    /// The thread whose context the stub is currently servicing.
    fn current(&self) -> ThreadId;

    /// Visit live threads in registry order; the visitor returns `false`
    /// to stop early.
    fn each(&self, visit: &mut dyn FnMut(ThreadId) -> bool);

    /// Human-readable label for a live thread.
    fn label(&self, id: ThreadId) -> Option<&str>;

    /// Base address of the thread's TLS control block.
    fn tls_base(&self, id: ThreadId) -> Option<u32>;

    fn is_alive(&self, id: ThreadId) -> bool {
        let mut found = false;
        self.each(&mut |tid| {
            if tid == id {
                found = true;
                return false;
            }
            true
        });
        found
    }
}
