//! Root registry: the places the collector starts tracing from.
//!
//! Three root sources are tracked besides static class memory:
//!
//! - **PDA frame slots**: each execution context registers the address of
//!   its current frame-pointer slot, so the collector always sees the frame
//!   the context is executing, even as the slot is re-pointed.
//! - **Frame monitors**: per-context views of the full call stack, letting
//!   the collector walk every pushed frame.
//! - **JIT frames**: frames whose declared slots live in JIT-owned memory.
//!   These are not registered directly; the PDA walk discovers them and
//!   defers them onto this list for the JIT worker.
//!
//! Registration is safe to call from any mutator thread; every mutation
//! takes the same lock the corresponding mark worker holds.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use vela_runtime::{StackFrame, StackFrameMonitor};

/// Address of an execution context's frame-pointer slot.
///
/// Wraps the raw double-pointer so the registry's sets are `Send`; the
/// collector only dereferences it while mutators are parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FrameSlot(pub *const *mut StackFrame);

// Safety: the slot address is only dereferenced during the mark phase,
// when the owning mutator is not running.
unsafe impl Send for FrameSlot {}

/// Address of a registered frame monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MonitorPtr(pub *const StackFrameMonitor);

// Safety: as for FrameSlot.
unsafe impl Send for MonitorPtr {}

/// A frame pointer deferred for the JIT worker.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct JitFrame(pub *const StackFrame);

// Safety: as for FrameSlot.
unsafe impl Send for JitFrame {}

/// The collector's root sets.
#[derive(Debug, Default)]
pub struct RootRegistry {
    pda_frames: Mutex<FxHashSet<FrameSlot>>,
    pda_monitors: Mutex<FxHashSet<MonitorPtr>>,
    jit_frames: Mutex<Vec<JitFrame>>,
}

impl RootRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution context's frame-pointer slot.
    pub fn add_pda_frame(&self, slot: *const *mut StackFrame) {
        self.pda_frames.lock().insert(FrameSlot(slot));
    }

    /// Unregister a frame-pointer slot.
    pub fn remove_pda_frame(&self, slot: *const *mut StackFrame) {
        self.pda_frames.lock().remove(&FrameSlot(slot));
    }

    /// Register a call-stack monitor.
    pub fn add_monitor(&self, monitor: *const StackFrameMonitor) {
        self.pda_monitors.lock().insert(MonitorPtr(monitor));
    }

    /// Unregister a call-stack monitor.
    pub fn remove_monitor(&self, monitor: *const StackFrameMonitor) {
        self.pda_monitors.lock().remove(&MonitorPtr(monitor));
    }

    /// Defer a JIT-resident frame for the JIT mark worker.
    pub fn add_jit_frame(&self, frame: *const StackFrame) {
        self.jit_frames.lock().push(JitFrame(frame));
    }

    /// Snapshot the registered frame slots.
    pub fn snapshot_frames(&self) -> Vec<FrameSlot> {
        self.pda_frames.lock().iter().copied().collect()
    }

    /// Snapshot the registered monitors.
    pub fn snapshot_monitors(&self) -> Vec<MonitorPtr> {
        self.pda_monitors.lock().iter().copied().collect()
    }

    /// Take the deferred JIT frame list, leaving it empty.
    pub fn take_jit_frames(&self) -> Vec<JitFrame> {
        std::mem::take(&mut *self.jit_frames.lock())
    }

    /// Number of registered frame slots.
    pub fn pda_frame_count(&self) -> usize {
        self.pda_frames.lock().len()
    }

    /// Number of registered monitors.
    pub fn monitor_count(&self) -> usize {
        self.pda_monitors.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_registration() {
        let registry = RootRegistry::new();
        let slot = 0x1000 as *const *mut StackFrame;

        registry.add_pda_frame(slot);
        registry.add_pda_frame(slot);
        assert_eq!(registry.pda_frame_count(), 1);

        registry.remove_pda_frame(slot);
        assert_eq!(registry.pda_frame_count(), 0);
    }

    #[test]
    fn test_jit_frames_drain() {
        let registry = RootRegistry::new();
        registry.add_jit_frame(0x2000 as *const StackFrame);
        registry.add_jit_frame(0x3000 as *const StackFrame);

        assert_eq!(registry.take_jit_frames().len(), 2);
        assert!(registry.take_jit_frames().is_empty());
    }
}
