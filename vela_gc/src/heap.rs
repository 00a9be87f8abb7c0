//! The memory manager: allocation, the live-object registry, and the
//! payload header layout.
//!
//! # Payload layout
//!
//! Callers only ever see payload pointers. The collector's metadata lives
//! at negative word offsets from the payload:
//!
//! ```text
//!   raw chunk:  [ chunk_size | MARKED | TYPE | SIZE_OR_CLS | payload … ]
//!                              -3       -2     -1            ^ returned
//! ```
//!
//! `TYPE` holds a [`MemoryTag`]: `Nil` for object instances, an array tag
//! otherwise. `SIZE_OR_CLS` holds the class id for objects and the payload
//! byte size for arrays. `MARKED` is the collector's mark word, toggled
//! atomically during the mark phase.

use crate::dispatch::VirtualMethodTable;
use crate::pool::PoolAllocator;
use crate::roots::RootRegistry;
use crate::{EXTRA_BUF_SIZE, MEM_MAX};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vela_core::VmError;
use vela_runtime::{MemoryTag, StackFrame, StackFrameMonitor, StackMethod, StackProgram};

const WORD: usize = std::mem::size_of::<usize>();

/// Word offset of the mark flag below the payload.
pub(crate) const MARKED_OFFSET: usize = 3;
/// Word offset of the type tag below the payload.
pub(crate) const TYPE_OFFSET: usize = 2;
/// Word offset of the size-or-class word below the payload.
pub(crate) const SIZE_OR_CLS_OFFSET: usize = 1;

/// Registry of live payload pointers plus the live-byte count.
#[derive(Debug, Default)]
pub(crate) struct AllocatedState {
    /// Every live payload address, exactly once.
    pub registry: FxHashSet<usize>,
    /// Sum of live instance/array payload sizes.
    pub used_bytes: usize,
}

/// Adaptive-cap hysteresis counters; only touched under the sweep lock.
#[derive(Debug, Default)]
pub(crate) struct SweepState {
    pub uncollected_count: usize,
    pub collected_count: usize,
    pub cycles: u64,
    pub last: Option<crate::collector::CollectionResult>,
}

/// The Vela memory manager.
///
/// One manager owns the heap for one VM instance: the size-class pools,
/// the allocation registry, the root registry, and the virtual-dispatch
/// cache. Construction replaces the historical global init; dropping the
/// manager releases every pool.
pub struct MemoryManager {
    pub(crate) prgm: Arc<StackProgram>,
    pub(crate) allocated: Mutex<AllocatedState>,
    pub(crate) free_cache: Mutex<PoolAllocator>,
    pub(crate) roots: RootRegistry,
    pub(crate) dispatch: VirtualMethodTable,
    pub(crate) sweep: Mutex<SweepState>,
    pub(crate) mem_max: AtomicUsize,
    pub(crate) initial_max: usize,
}

// Safety: all shared state is behind the manager's lock set; the raw
// addresses stored in the registries are only dereferenced during the mark
// phase, when mutators are parked.
unsafe impl Send for MemoryManager {}
unsafe impl Sync for MemoryManager {}

impl MemoryManager {
    /// Create a manager over a loaded program with the default soft cap.
    pub fn new(prgm: Arc<StackProgram>) -> Self {
        Self::with_mem_max(prgm, MEM_MAX)
    }

    /// Create a manager with a custom initial soft cap.
    pub fn with_mem_max(prgm: Arc<StackProgram>, mem_max: usize) -> Self {
        Self {
            prgm,
            allocated: Mutex::new(AllocatedState::default()),
            free_cache: Mutex::new(PoolAllocator::new()),
            roots: RootRegistry::new(),
            dispatch: VirtualMethodTable::new(),
            sweep: Mutex::new(SweepState::default()),
            mem_max: AtomicUsize::new(mem_max),
            initial_max: mem_max,
        }
    }

    /// The loaded program.
    #[inline]
    pub fn program(&self) -> &StackProgram {
        &self.prgm
    }

    /// Current live heap bytes.
    pub fn used_bytes(&self) -> usize {
        self.allocated.lock().used_bytes
    }

    /// Current live allocation count.
    pub fn allocation_count(&self) -> usize {
        self.allocated.lock().registry.len()
    }

    /// Current soft cap.
    #[inline]
    pub fn mem_max(&self) -> usize {
        self.mem_max.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate an instance of the class `cls_id`.
    ///
    /// If the allocation would push live bytes past the soft cap and
    /// `collect` is set, a full collection runs first, rooted at the given
    /// operand stack. Returns the payload pointer, or null for an unknown
    /// class id.
    ///
    /// # Safety
    ///
    /// `op_stack` must be readable for `stack_pos` words, and every
    /// registered root must be valid if a collection triggers.
    pub unsafe fn allocate_object(
        &self,
        cls_id: usize,
        op_stack: *const usize,
        stack_pos: i64,
        collect: bool,
    ) -> *mut usize {
        let Some(cls) = self.prgm.class(cls_id) else {
            return std::ptr::null_mut();
        };
        let size = cls.instance_size;

        if collect && self.used_bytes() + size > self.mem_max() {
            // Safety: forwarded caller contract.
            unsafe { self.collect_all(op_stack, stack_pos) };
        }

        let payload = self.raw_allocate(size, MemoryTag::Nil, cls_id);

        let mut allocated = self.allocated.lock();
        allocated.used_bytes += size;
        allocated.registry.insert(payload as usize);

        payload
    }

    /// Allocate an array of `size` elements of the tagged element type.
    ///
    /// `size` counts elements the caller will address, including the count
    /// and dimension header words of object/int arrays. Sizes ≤ 0 are
    /// fatal; the caller validates before reaching the allocator.
    ///
    /// # Safety
    ///
    /// As for [`Self::allocate_object`].
    pub unsafe fn allocate_array(
        &self,
        size: i64,
        tag: MemoryTag,
        op_stack: *const usize,
        stack_pos: i64,
        collect: bool,
    ) -> *mut usize {
        if size <= 0 {
            fatal(VmError::InvalidAllocationSize { size });
        }

        let calc_size = match tag {
            MemoryTag::ByteArray => size as usize,
            MemoryTag::CharArray => size as usize * std::mem::size_of::<char>(),
            MemoryTag::Int => size as usize * WORD,
            MemoryTag::Float => size as usize * std::mem::size_of::<f64>(),
            MemoryTag::Nil => fatal(VmError::InvalidAllocationType),
        };

        if collect && self.used_bytes() + calc_size > self.mem_max() {
            // Safety: forwarded caller contract.
            unsafe { self.collect_all(op_stack, stack_pos) };
        }

        let payload = self.raw_allocate(calc_size, tag, calc_size);

        let mut allocated = self.allocated.lock();
        allocated.used_bytes += calc_size;
        allocated.registry.insert(payload as usize);

        payload
    }

    /// Carve a chunk, stamp the metadata words, return the payload pointer.
    fn raw_allocate(&self, payload_bytes: usize, tag: MemoryTag, size_or_cls: usize) -> *mut usize {
        let ask = payload_bytes + WORD * EXTRA_BUF_SIZE;
        let meta = self.free_cache.lock().get_memory(ask);

        // Safety: meta points at EXTRA_BUF_SIZE header words plus at least
        // payload_bytes of zeroed storage.
        unsafe {
            let payload = meta.add(EXTRA_BUF_SIZE);
            payload.sub(TYPE_OFFSET).write(tag as usize);
            payload.sub(SIZE_OR_CLS_OFFSET).write(size_or_cls);
            payload
        }
    }

    // =========================================================================
    // Header access
    // =========================================================================

    /// Read an allocation's type tag.
    ///
    /// # Safety
    ///
    /// `mem` must be a live payload address produced by this manager.
    #[inline]
    pub(crate) unsafe fn tag_of(&self, mem: usize) -> Option<MemoryTag> {
        // Safety: caller contract.
        MemoryTag::from_word(unsafe { (mem as *const usize).sub(TYPE_OFFSET).read() })
    }

    /// Read an allocation's size-or-class word.
    ///
    /// # Safety
    ///
    /// `mem` must be a live payload address produced by this manager.
    #[inline]
    pub(crate) unsafe fn size_or_cls_of(&self, mem: usize) -> usize {
        // Safety: caller contract.
        unsafe { (mem as *const usize).sub(SIZE_OR_CLS_OFFSET).read() }
    }

    /// Whether `mem` is a registered live payload address.
    pub(crate) fn is_allocated(&self, mem: usize) -> bool {
        self.allocated.lock().registry.contains(&mem)
    }

    // =========================================================================
    // Root registration
    // =========================================================================

    /// Register an execution context's frame-pointer slot.
    ///
    /// # Safety
    ///
    /// `slot` must remain a valid frame-pointer slot until unregistered,
    /// and the frame it names must be stable whenever a collection runs.
    pub unsafe fn add_pda_frame(&self, slot: *const *mut StackFrame) {
        self.roots.add_pda_frame(slot);
    }

    /// Unregister a frame-pointer slot.
    pub fn remove_pda_frame(&self, slot: *const *mut StackFrame) {
        self.roots.remove_pda_frame(slot);
    }

    /// Register a call-stack monitor.
    ///
    /// # Safety
    ///
    /// `monitor` and the stack bookkeeping it points into must remain
    /// valid until unregistered.
    pub unsafe fn add_monitor(&self, monitor: *const StackFrameMonitor) {
        self.roots.add_monitor(monitor);
    }

    /// Unregister a call-stack monitor.
    pub fn remove_monitor(&self, monitor: *const StackFrameMonitor) {
        self.roots.remove_monitor(monitor);
    }

    // =========================================================================
    // Virtual dispatch
    // =========================================================================

    /// Cached virtual-method resolution for the dispatch triple.
    pub fn get_virtual_entry(
        &self,
        concrete_cls: usize,
        virtual_cls_id: usize,
        virtual_mthd_id: usize,
    ) -> Option<&StackMethod> {
        let (cls_id, mthd_id) = self
            .dispatch
            .get(concrete_cls, virtual_cls_id, virtual_mthd_id)?;
        self.prgm.class(cls_id)?.method(mthd_id)
    }

    /// Record a virtual-method resolution for the dispatch triple.
    pub fn add_virtual_entry(
        &self,
        concrete_cls: usize,
        virtual_cls_id: usize,
        virtual_mthd_id: usize,
        method: &StackMethod,
    ) {
        self.dispatch.insert(
            concrete_cls,
            virtual_cls_id,
            virtual_mthd_id,
            (method.cls_id, method.id),
        );
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.allocated.get_mut().registry.clear();
        self.free_cache.get_mut().clear_free(true);
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let allocated = self.allocated.lock();
        f.debug_struct("MemoryManager")
            .field("live_objects", &allocated.registry.len())
            .field("used_bytes", &allocated.used_bytes)
            .field("mem_max", &self.mem_max())
            .finish()
    }
}

/// Report a fatal memory error and terminate the VM.
pub(crate) fn fatal(err: VmError) -> ! {
    eprintln!(">>> {err} <<<");
    std::process::exit(1);
}
