//! Stop-the-world mark-and-sweep collection.
//!
//! # Cycle shape
//!
//! ```text
//! collect_all ──try_lock──▶ mark ──join──▶ sweep ──▶ adapt soft cap
//!                            │
//!                            ├── worker: static class memory
//!                            ├── worker: operand stack
//!                            └── worker: PDA frames ──spawns──▶ JIT frames
//! ```
//!
//! The mark workers partition the root set: static class declarations, the
//! triggering thread's operand stack, and the registered PDA frames and
//! monitors. The PDA walk separates JIT-resident frames onto the deferred
//! list and launches the JIT worker before tracing its own partition. Mark
//! bits are header words toggled with atomic swaps, so a block reached
//! from two roots is traced exactly once.
//!
//! The sweep is serial: it partitions the allocation registry into live
//! (mark cleared) and dead (returned to the size-class pools), then
//! adjusts the soft cap: it grows eightfold after a run of fruitless
//! cycles, and dropping to a quarter after a run of productive cycles on a
//! grown heap.

use crate::heap::{MemoryManager, SweepState, MARKED_OFFSET};
use crate::{COLLECTED_COUNT, EXTRA_BUF_SIZE, UNCOLLECTED_COUNT};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::Scope;
use std::time::{Duration, Instant};
use vela_runtime::{MemoryKind, MemoryTag, StackClass, StackFrame};

/// Snapshot of regular (non-JIT) frames gathered by the PDA walk; sized
/// for typical call-stack depths without allocating.
type FrameList = SmallVec<[*const StackFrame; 32]>;

/// Object-array payload: element count word.
const ARRAY_COUNT: usize = 0;
/// Object-array payload: dimension count word.
const ARRAY_DIM: usize = 1;
/// Scratch words at the base of a JIT frame that may hold references.
const JIT_SCRATCH_SLOTS: usize = 6;

/// Outcome of one collection cycle.
#[derive(Debug, Clone)]
pub struct CollectionResult {
    /// Wall time of the cycle.
    pub duration: Duration,
    /// Payload bytes returned to the pools.
    pub bytes_freed: usize,
    /// Allocations reclaimed.
    pub objects_freed: usize,
    /// Allocations surviving the cycle.
    pub live_objects: usize,
}

/// The triggering thread's operand stack, shipped to the stack worker.
#[derive(Clone, Copy)]
struct OpStackView {
    base: *const usize,
    len: i64,
}

// Safety: the view is only read during the mark phase, while the owning
// mutator is parked inside collect_all.
unsafe impl Send for OpStackView {}

impl MemoryManager {
    /// Run a full collection rooted at the given operand stack.
    ///
    /// Returns `false` without collecting if another thread holds the
    /// sweep lock; that cycle will have done the work.
    ///
    /// # Safety
    ///
    /// `op_stack` must be readable for `stack_pos` words, every registered
    /// root must still be valid, and no mutator may run until this call
    /// returns.
    pub unsafe fn collect_all(&self, op_stack: *const usize, stack_pos: i64) -> bool {
        let Some(mut sweep) = self.sweep.try_lock() else {
            return false;
        };

        let start = Instant::now();
        // Safety: forwarded caller contract.
        unsafe { self.mark_roots(op_stack, stack_pos) };
        let result = self.sweep_phase(&mut sweep, start);
        sweep.cycles += 1;
        sweep.last = Some(result);
        true
    }

    /// Outcome of the most recent collection cycle.
    pub fn last_collection(&self) -> Option<CollectionResult> {
        self.sweep.lock().last.clone()
    }

    /// Completed collection cycles.
    pub fn collection_cycles(&self) -> u64 {
        self.sweep.lock().cycles
    }

    // =========================================================================
    // Mark phase
    // =========================================================================

    unsafe fn mark_roots(&self, op_stack: *const usize, stack_pos: i64) {
        let view = OpStackView {
            base: op_stack,
            len: stack_pos,
        };

        std::thread::scope(|s| {
            s.spawn(|| self.check_static());
            // Safety: view outlives the scope; mutators are parked.
            s.spawn(move || unsafe { self.check_stack(view) });
            // Safety: registered roots are valid for the duration of the scope.
            s.spawn(move || unsafe { self.check_pda_roots(s) });
        });
    }

    /// Mark the block at `mem`, returning `true` exactly once per cycle.
    ///
    /// The mark word is swapped atomically, so concurrent workers reaching
    /// the same block agree on a single tracer.
    fn mark(&self, mem: usize) -> bool {
        if mem == 0 {
            return false;
        }
        // Safety: mem is a payload address; the mark word sits
        // MARKED_OFFSET words below it, aligned and valid for atomic access.
        let flag =
            unsafe { &*((mem as *mut usize).sub(MARKED_OFFSET) as *const AtomicUsize) };
        flag.swap(1, Ordering::AcqRel) == 0
    }

    /// Resolve the class of a payload, if it is a known object.
    ///
    /// Trusted references (`is_obj`) read the header directly; untrusted
    /// words are confirmed against the allocation registry first.
    fn resolve_class(&self, mem: usize, is_obj: bool) -> Option<&StackClass> {
        if !is_obj && !self.is_allocated(mem) {
            return None;
        }
        // Safety: mem is live, either trusted by the declaration walk or
        // confirmed by the registry above.
        let tag = unsafe { self.tag_of(mem) }?;
        if tag != MemoryTag::Nil {
            return None;
        }
        // Safety: as above.
        let id = unsafe { self.size_or_cls_of(mem) };
        self.prgm.class(id)
    }

    /// Trace one reference.
    ///
    /// Known objects are marked and their instance declarations walked.
    /// Anything else that proves to be a live allocation is treated as a
    /// possible opaque array: flat arrays are merely marked, while `Nil`
    /// and `Int` tagged payloads have their elements scanned as candidate
    /// references.
    fn check_object(&self, mem: usize, is_obj: bool) {
        if mem == 0 {
            return;
        }

        if let Some(cls) = self.resolve_class(mem, is_obj) {
            if self.mark(mem) {
                // Safety: mem is a live object payload of cls.
                unsafe { self.check_memory(mem as *const usize, &cls.instance_dclrs) };
            }
        } else if self.is_allocated(mem) && self.mark(mem) {
            // Safety: registry-confirmed live payload.
            let tag = unsafe { self.tag_of(mem) };
            if matches!(tag, Some(MemoryTag::Nil) | Some(MemoryTag::Int)) {
                // Safety: live Nil/Int payloads carry the array header.
                unsafe {
                    let array = mem as *const usize;
                    let count = array.add(ARRAY_COUNT).read();
                    let dim = array.add(ARRAY_DIM).read();
                    let elements = array.add(2 + dim);
                    for k in 0..count {
                        self.check_object(elements.add(k).read(), false);
                    }
                }
            }
        }
    }

    /// Walk a declared memory block, tracing every reference slot.
    ///
    /// # Safety
    ///
    /// `mem` must be readable for the total width of `dclrs`.
    unsafe fn check_memory(&self, mem: *const usize, dclrs: &[vela_runtime::StackDclr]) {
        let mut cursor = mem;
        for dclr in dclrs {
            match dclr.kind {
                MemoryKind::Func => {
                    // Safety: Func slots are two words wide.
                    let (packed, closure) = unsafe { (cursor.read(), cursor.add(1).read()) };
                    let virtual_cls_id = (packed >> 16) & 0xFFFF;
                    let mthd_id = packed & 0xFFFF;
                    if self.mark(closure) {
                        if let Some(cls) = self.prgm.class(virtual_cls_id) {
                            // Safety: the closure block matches the lambda's
                            // captured-variable layout.
                            unsafe {
                                self.check_memory(
                                    closure as *const usize,
                                    cls.closure_dclrs(mthd_id),
                                );
                            }
                        }
                    }
                    cursor = unsafe { cursor.add(2) };
                }

                MemoryKind::Int | MemoryKind::Char | MemoryKind::Byte | MemoryKind::Float => {
                    cursor = unsafe { cursor.add(1) };
                }

                MemoryKind::ByteArray
                | MemoryKind::CharArray
                | MemoryKind::IntArray
                | MemoryKind::FloatArray => {
                    // Safety: one-word slot holding an array payload or null.
                    self.mark(unsafe { cursor.read() });
                    cursor = unsafe { cursor.add(1) };
                }

                MemoryKind::Obj => {
                    // Safety: one-word slot holding an object payload or null.
                    self.check_object(unsafe { cursor.read() }, true);
                    cursor = unsafe { cursor.add(1) };
                }

                MemoryKind::ObjArray => {
                    // Safety: one-word slot holding an array payload or null.
                    let array = unsafe { cursor.read() };
                    if self.mark(array) {
                        // Safety: marked non-null object arrays carry the
                        // count/dims header followed by element references.
                        unsafe {
                            let array = array as *const usize;
                            let count = array.add(ARRAY_COUNT).read();
                            let dim = array.add(ARRAY_DIM).read();
                            let elements = array.add(2 + dim);
                            for k in 0..count {
                                self.check_object(elements.add(k).read(), true);
                            }
                        }
                    }
                    cursor = unsafe { cursor.add(1) };
                }
            }
        }
    }

    /// Static-root worker: every class's static memory block.
    fn check_static(&self) {
        for cls in self.prgm.classes() {
            cls.with_class_mem(|mem| {
                // Safety: the block was sized from the class declarations.
                unsafe { self.check_memory(mem.as_ptr(), &cls.class_dclrs) };
            });
        }
    }

    /// Operand-stack worker: every live word that names an allocation.
    unsafe fn check_stack(&self, view: OpStackView) {
        let mut pos = view.len;
        while pos > 0 {
            pos -= 1;
            // Safety: caller guaranteed view.len readable words.
            let word = unsafe { view.base.add(pos as usize).read() };
            if self.is_allocated(word) {
                self.check_object(word, false);
            }
        }
    }

    /// PDA-root worker: snapshot registered frames and monitors, defer
    /// JIT-resident frames, launch the JIT worker, trace the rest.
    unsafe fn check_pda_roots<'scope>(&'scope self, scope: &'scope Scope<'scope, '_>) {
        let mut frames: FrameList = FrameList::new();

        let defer = |frame: *const StackFrame, frames: &mut FrameList| {
            // Safety: registered frames stay valid while mutators are parked.
            if unsafe { (*frame).jit_mem.is_null() } {
                frames.push(frame);
            } else {
                self.roots.add_jit_frame(frame);
            }
        };

        for slot in self.roots.snapshot_frames() {
            // Safety: registered slots stay valid while mutators are parked.
            let frame = unsafe { slot.0.read() };
            if !frame.is_null() {
                defer(frame, &mut frames);
            }
        }

        for monitor in self.roots.snapshot_monitors() {
            // Safety: registered monitors stay valid while mutators are parked.
            let monitor = unsafe { &*monitor.0 };
            let call_stack_pos = unsafe { monitor.call_stack_pos.read() };
            if call_stack_pos > 0 {
                let cur_frame = unsafe { monitor.cur_frame.read() };
                if !cur_frame.is_null() {
                    defer(cur_frame, &mut frames);
                }
                for i in (0..call_stack_pos).rev() {
                    // Safety: call_stack holds call_stack_pos pushed frames.
                    let frame = unsafe { monitor.call_stack.add(i as usize).read() };
                    if !frame.is_null() {
                        defer(frame, &mut frames);
                    }
                }
            }
        }

        // Deferred list is complete; the JIT worker can run alongside the
        // regular frame walk.
        // Safety: deferred frames stay valid for the scope's duration.
        scope.spawn(move || unsafe { self.check_jit_roots() });

        for frame in frames {
            // Safety: frame validity per registration contract.
            let frame = unsafe { &*frame };
            let Some(method) = self
                .prgm
                .class(frame.cls_id)
                .and_then(|c| c.method(frame.mthd_id))
            else {
                continue;
            };

            let mut mem = frame.mem as *const usize;
            if !method.is_lambda {
                // Safety: slot 0 holds self for non-lambda methods.
                self.check_object(unsafe { mem.read() }, true);
            }
            // Safety: frames reserve the temp slot their method declares.
            mem = unsafe { mem.add(if method.has_and_or { 2 } else { 1 }) };
            // Safety: the locals block covers the declared slots.
            unsafe { self.check_memory(mem, &method.dclrs) };
        }
    }

    /// JIT-root worker: trace frames whose declared slots live in
    /// JIT-owned memory.
    ///
    /// The JIT packs slots in the opposite order from the interpreter on
    /// most targets (back-to-front; front-to-back on aarch64), and keeps a
    /// region of [`JIT_SCRATCH_SLOTS`] temp words that may hold references
    /// during inter-method calls, scanned against the registry.
    unsafe fn check_jit_roots(&self) {
        for jit_frame in self.roots.take_jit_frames() {
            // Safety: deferred frames stay valid while mutators are parked.
            let frame = unsafe { &*jit_frame.0 };
            let Some(method) = self
                .prgm
                .class(frame.cls_id)
                .and_then(|c| c.method(frame.mthd_id))
            else {
                continue;
            };

            let mem = frame.jit_mem as *const usize;
            if mem.is_null() {
                continue;
            }

            if !method.is_lambda {
                // Safety: frame.mem[0] holds self for non-lambda methods.
                self.check_object(unsafe { (frame.mem as *const usize).read() }, true);
            }

            #[cfg(target_arch = "aarch64")]
            let scratch = {
                // Safety: the word below the block is JIT scratch space.
                let start = unsafe { mem.sub(1) };
                let mut cursor = mem;
                if method.has_and_or {
                    cursor = unsafe { cursor.add(1) };
                }
                for dclr in method.dclrs.iter() {
                    cursor = unsafe { self.check_jit_slot(cursor, dclr) };
                }
                start
            };

            #[cfg(not(target_arch = "aarch64"))]
            let scratch = {
                let mut cursor = mem;
                for dclr in method.dclrs.iter().rev() {
                    cursor = unsafe { self.check_jit_slot(cursor, dclr) };
                }
                cursor
            };

            for i in 0..JIT_SCRATCH_SLOTS {
                #[cfg(target_arch = "aarch64")]
                // Safety: scratch words run downward from the block base.
                let word = unsafe { scratch.sub(i).read() };
                #[cfg(not(target_arch = "aarch64"))]
                // Safety: scratch words follow the declared slots.
                let word = unsafe { scratch.add(i).read() };

                if self.is_allocated(word) {
                    self.check_object(word, false);
                }
            }
        }
    }

    /// Trace one JIT slot, returning the advanced cursor.
    unsafe fn check_jit_slot(
        &self,
        cursor: *const usize,
        dclr: &vela_runtime::StackDclr,
    ) -> *const usize {
        // The slot semantics match the interpreter's declaration walk; only
        // the surrounding ordering differs.
        // Safety: cursor covers the slot's declared width.
        unsafe {
            match dclr.kind {
                MemoryKind::Func => {
                    self.check_memory(cursor, std::slice::from_ref(dclr));
                    cursor.add(2)
                }
                _ => {
                    self.check_memory(cursor, std::slice::from_ref(dclr));
                    cursor.add(1)
                }
            }
        }
    }

    // =========================================================================
    // Sweep phase
    // =========================================================================

    fn sweep_phase(&self, sweep: &mut SweepState, start: Instant) -> CollectionResult {
        let mut allocated = self.allocated.lock();
        let registry = std::mem::take(&mut allocated.registry);
        let pre_count = registry.len();

        let mut live = FxHashSet::default();
        let mut dead: Vec<usize> = Vec::new();
        let mut bytes_freed = 0usize;

        for mem in registry {
            // Safety: registry members are live payload addresses.
            let flag =
                unsafe { &*((mem as *mut usize).sub(MARKED_OFFSET) as *const AtomicUsize) };
            if flag.swap(0, Ordering::AcqRel) != 0 {
                live.insert(mem);
                continue;
            }

            // Safety: as above.
            let (tag, size_or_cls) = unsafe { (self.tag_of(mem), self.size_or_cls_of(mem)) };
            let mem_size = match tag {
                Some(MemoryTag::Nil) => self
                    .prgm
                    .class(size_or_cls)
                    .map_or(size_or_cls, |cls| cls.instance_size),
                _ => size_or_cls,
            };

            allocated.used_bytes = allocated.used_bytes.saturating_sub(mem_size);
            bytes_freed += mem_size;
            dead.push(mem);
        }

        let live_objects = live.len();
        let objects_freed = dead.len();
        self.adapt_mem_max(sweep, live_objects, pre_count);
        allocated.registry = live;
        drop(allocated);

        let mut free_cache = self.free_cache.lock();
        let soft_cap = self.mem_max();
        for mem in dead {
            // Safety: rewinding past the metadata words and the chunk
            // header recovers the allocator's chunk pointer.
            unsafe {
                let raw = (mem as *mut usize).sub(EXTRA_BUF_SIZE + 1);
                free_cache.add_free(raw, soft_cap);
            }
        }

        CollectionResult {
            duration: start.elapsed(),
            bytes_freed,
            objects_freed,
            live_objects,
        }
    }

    /// Soft-cap hysteresis.
    ///
    /// A cycle that frees at most one block counts as fruitless; enough of
    /// those in a row grow the cap eightfold. Productive cycles on a grown
    /// heap eventually drop it to a quarter, clamped back up on underflow.
    fn adapt_mem_max(&self, sweep: &mut SweepState, live: usize, pre_count: usize) {
        if live >= pre_count.saturating_sub(1) {
            if sweep.uncollected_count < UNCOLLECTED_COUNT {
                sweep.uncollected_count += 1;
            } else {
                self.mem_max
                    .store(self.mem_max() << 3, Ordering::Relaxed);
                sweep.uncollected_count = 0;
            }
        } else if self.mem_max() != self.initial_max {
            if sweep.collected_count < COLLECTED_COUNT {
                sweep.collected_count += 1;
            } else {
                let mut next = (self.mem_max() >> 1) / 2;
                if next == 0 {
                    next = self.initial_max << 3;
                }
                self.mem_max.store(next, Ordering::Relaxed);
                sweep.collected_count = 0;
            }
        }
    }
}
