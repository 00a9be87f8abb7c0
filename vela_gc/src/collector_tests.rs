//! Tests for the mark-and-sweep collector.

use crate::heap::MemoryManager;
use std::sync::Arc;
use vela_runtime::{
    MemoryKind, MemoryTag, StackClass, StackDclr, StackFrame, StackFrameMonitor, StackMethod,
    StackProgram,
};

const WORD: usize = std::mem::size_of::<usize>();

// =============================================================================
// Fixtures
// =============================================================================

/// Class ids used throughout: 0 = Unit (no fields), 1 = Node (one object
/// field), 2 = Pair (two object fields).
fn test_program() -> Arc<StackProgram> {
    let mut prgm = StackProgram::new();
    prgm.add_class(StackClass::new(0, "Test.Unit", WORD, vec![], vec![]), -1, &[]);
    prgm.add_class(
        StackClass::new(
            1,
            "Test.Node",
            WORD,
            vec![StackDclr::new(MemoryKind::Obj, "Test.Node:next")],
            vec![],
        ),
        -1,
        &[],
    );
    prgm.add_class(
        StackClass::new(
            2,
            "Test.Pair",
            2 * WORD,
            vec![
                StackDclr::new(MemoryKind::Obj, "Test.Pair:first"),
                StackDclr::new(MemoryKind::Obj, "Test.Pair:second"),
            ],
            vec![],
        ),
        -1,
        &[],
    );
    Arc::new(prgm)
}

fn alloc(mgr: &MemoryManager, cls_id: usize) -> *mut usize {
    unsafe { mgr.allocate_object(cls_id, std::ptr::null(), 0, false) }
}

fn collect_rooted(mgr: &MemoryManager, roots: &[usize]) -> bool {
    unsafe { mgr.collect_all(roots.as_ptr(), roots.len() as i64) }
}

// =============================================================================
// Reclamation
// =============================================================================

#[test]
fn test_unreachable_objects_reclaimed() {
    let mgr = MemoryManager::new(test_program());
    for _ in 0..10 {
        assert!(!alloc(&mgr, 0).is_null());
    }
    assert_eq!(mgr.allocation_count(), 10);
    assert_eq!(mgr.used_bytes(), 10 * WORD);

    assert!(collect_rooted(&mgr, &[]));

    assert_eq!(mgr.allocation_count(), 0);
    assert_eq!(mgr.used_bytes(), 0);

    let result = mgr.last_collection().unwrap();
    assert_eq!(result.objects_freed, 10);
    assert_eq!(result.bytes_freed, 10 * WORD);
    assert_eq!(result.live_objects, 0);
}

#[test]
fn test_reachable_chain_survives_and_marks_clear() {
    let mgr = MemoryManager::new(test_program());

    let c = alloc(&mgr, 0);
    let b = alloc(&mgr, 1);
    let a = alloc(&mgr, 1);
    unsafe {
        b.write(c as usize);
        a.write(b as usize);
    }

    // root only the head of the chain
    assert!(collect_rooted(&mgr, &[a as usize]));
    assert_eq!(mgr.allocation_count(), 3);
    assert_eq!(mgr.used_bytes(), 3 * WORD);

    // marks were cleared by the sweep: an unrooted cycle reclaims all three
    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 0);
}

#[test]
fn test_cyclic_graph_terminates_and_survives() {
    let mgr = MemoryManager::new(test_program());

    let a = alloc(&mgr, 1);
    let b = alloc(&mgr, 1);
    unsafe {
        a.write(b as usize);
        b.write(a as usize);
    }

    assert!(collect_rooted(&mgr, &[a as usize]));
    assert_eq!(mgr.allocation_count(), 2);

    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 0);
}

#[test]
fn test_object_array_element_dropped() {
    let mgr = MemoryManager::new(test_program());

    // 100 elements, 1 dimension: [count, dims, dim0, e0..e99]
    let array = unsafe { mgr.allocate_array(103, MemoryTag::Int, std::ptr::null(), 0, false) };
    unsafe {
        array.write(100);
        array.add(1).write(1);
        array.add(2).write(100);
    }

    let mut elements = Vec::new();
    for i in 0..100 {
        let element = alloc(&mgr, 0);
        elements.push(element as usize);
        unsafe { array.add(3 + i).write(element as usize) };
    }
    assert_eq!(mgr.allocation_count(), 101);

    // drop element 50 before collecting
    unsafe { array.add(3 + 50).write(0) };

    assert!(collect_rooted(&mgr, &[array as usize]));
    assert_eq!(mgr.allocation_count(), 100);
    assert_eq!(mgr.last_collection().unwrap().objects_freed, 1);
}

#[test]
fn test_flat_array_marked_not_scanned() {
    let mgr = MemoryManager::new(test_program());

    let bytes = unsafe { mgr.allocate_array(64, MemoryTag::ByteArray, std::ptr::null(), 0, false) };
    assert_eq!(mgr.used_bytes(), 64);

    assert!(collect_rooted(&mgr, &[bytes as usize]));
    assert_eq!(mgr.allocation_count(), 1);

    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.used_bytes(), 0);
}

#[test]
fn test_stack_words_that_are_not_pointers_ignored() {
    let mgr = MemoryManager::new(test_program());
    let live = alloc(&mgr, 0);

    // garbage words must not confuse the stack walk
    let roots = [0usize, 42, usize::MAX, live as usize, 7];
    assert!(collect_rooted(&mgr, &roots));
    assert_eq!(mgr.allocation_count(), 1);
}

// =============================================================================
// PDA roots
// =============================================================================

#[test]
fn test_pda_frame_roots_survive() {
    let prgm = {
        let mut prgm = StackProgram::new();
        prgm.add_class(StackClass::new(0, "Test.Unit", WORD, vec![], vec![]), -1, &[]);
        let mut cls = StackClass::new(1, "Test.Runner", WORD, vec![], vec![]);
        cls.add_method(StackMethod::new(
            0,
            1,
            "Test.Runner:go",
            vec![StackDclr::new(MemoryKind::Obj, "Test.Runner:go:held")],
        ));
        prgm.add_class(cls, -1, &[]);
        Arc::new(prgm)
    };
    let mgr = MemoryManager::new(prgm.clone());

    let self_obj = alloc(&mgr, 0);
    let held = alloc(&mgr, 0);

    // locals: [self, held]
    let mut locals = [self_obj as usize, held as usize];
    let method = prgm.class(1).unwrap().method(0).unwrap();
    let mut frame = StackFrame::interpreted(method, locals.as_mut_ptr());
    let mut frame_ptr: *mut StackFrame = &mut frame;
    let slot: *const *mut StackFrame = &frame_ptr;

    unsafe { mgr.add_pda_frame(slot) };
    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 2);

    mgr.remove_pda_frame(slot);
    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 0);
    let _ = frame_ptr;
}

#[test]
fn test_monitor_walks_call_stack() {
    let prgm = {
        let mut prgm = StackProgram::new();
        prgm.add_class(StackClass::new(0, "Test.Unit", WORD, vec![], vec![]), -1, &[]);
        let mut cls = StackClass::new(1, "Test.Runner", WORD, vec![], vec![]);
        cls.add_method(StackMethod::new(
            0,
            1,
            "Test.Runner:go",
            vec![StackDclr::new(MemoryKind::Obj, "Test.Runner:go:held")],
        ));
        prgm.add_class(cls, -1, &[]);
        Arc::new(prgm)
    };
    let mgr = MemoryManager::new(prgm.clone());
    let method = prgm.class(1).unwrap().method(0).unwrap();

    let pushed_obj = alloc(&mgr, 0);
    let current_obj = alloc(&mgr, 0);

    let mut pushed_locals = [0usize, pushed_obj as usize];
    let mut pushed = StackFrame::interpreted(method, pushed_locals.as_mut_ptr());

    let mut current_locals = [0usize, current_obj as usize];
    let mut current = StackFrame::interpreted(method, current_locals.as_mut_ptr());

    let call_stack: [*mut StackFrame; 1] = [&mut pushed];
    let call_stack_pos: i64 = 1;
    let cur_frame: *mut StackFrame = &mut current;

    let monitor = StackFrameMonitor::new(call_stack.as_ptr(), &call_stack_pos, &cur_frame);
    unsafe { mgr.add_monitor(&monitor) };

    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 2);

    mgr.remove_monitor(&monitor);
    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 0);
}

// =============================================================================
// Closures
// =============================================================================

#[test]
fn test_function_slot_traces_closure() {
    let prgm = {
        let mut prgm = StackProgram::new();
        prgm.add_class(StackClass::new(0, "Test.Unit", WORD, vec![], vec![]), -1, &[]);
        // class 1 declares one function-valued instance slot; its lambda
        // (method 3) captures one object
        let mut cls = StackClass::new(
            1,
            "Test.Callback",
            3 * WORD,
            vec![StackDclr::new(MemoryKind::Func, "Test.Callback:op")],
            vec![],
        );
        cls.add_closure_dclrs(3, vec![StackDclr::new(MemoryKind::Obj, "Test.Callback:op:cap")]);
        prgm.add_class(cls, -1, &[]);
        Arc::new(prgm)
    };
    let mgr = MemoryManager::new(prgm);

    let captured = alloc(&mgr, 0);
    // closure block: one captured object reference
    let closure = unsafe { mgr.allocate_array(1, MemoryTag::Int, std::ptr::null(), 0, false) };
    unsafe { closure.write(captured as usize) };

    // holder payload: packed (cls 1, method 3) + closure pointer
    let holder = alloc(&mgr, 1);
    unsafe {
        holder.write((1usize << 16) | 3);
        holder.add(1).write(closure as usize);
    }

    assert!(collect_rooted(&mgr, &[holder as usize]));
    assert_eq!(mgr.allocation_count(), 3);

    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 0);
}

// =============================================================================
// Closure blocks are declaration-walked, so the Int-array header is not
// interpreted; the block above is reached only through its Func slot.
// =============================================================================

// =============================================================================
// JIT frames
// =============================================================================

#[test]
fn test_jit_frame_slots_and_scratch_traced() {
    let prgm = {
        let mut prgm = StackProgram::new();
        prgm.add_class(StackClass::new(0, "Test.Unit", WORD, vec![], vec![]), -1, &[]);
        let mut cls = StackClass::new(1, "Test.Runner", WORD, vec![], vec![]);
        cls.add_method(StackMethod::new(
            0,
            1,
            "Test.Runner:go",
            vec![
                StackDclr::new(MemoryKind::Int, "Test.Runner:go:n"),
                StackDclr::new(MemoryKind::Obj, "Test.Runner:go:held"),
            ],
        ));
        prgm.add_class(cls, -1, &[]);
        Arc::new(prgm)
    };
    let mgr = MemoryManager::new(prgm.clone());
    let method = prgm.class(1).unwrap().method(0).unwrap();

    let self_obj = alloc(&mgr, 0);
    let held = alloc(&mgr, 0);
    let scratch_obj = alloc(&mgr, 0);

    // JIT block (non-aarch64 order): declarations back-to-front, then the
    // six scratch words
    #[cfg(not(target_arch = "aarch64"))]
    let mut jit_block = {
        let mut block = [0usize; 8];
        block[0] = held as usize; // Obj, declared last
        block[1] = 7; // Int, declared first
        block[2] = scratch_obj as usize;
        block
    };
    #[cfg(target_arch = "aarch64")]
    let mut jit_block = {
        // [scratch..., start] then declarations front-to-back
        let mut block = [0usize; 9];
        block[7] = 7; // Int at block start
        block[8] = held as usize; // Obj
        block[6] = scratch_obj as usize;
        block
    };

    #[cfg(not(target_arch = "aarch64"))]
    let jit_mem = jit_block.as_mut_ptr();
    #[cfg(target_arch = "aarch64")]
    let jit_mem = unsafe { jit_block.as_mut_ptr().add(7) };

    let mut locals = [self_obj as usize];
    let mut frame = StackFrame::jitted(method, locals.as_mut_ptr(), jit_mem);
    let mut frame_ptr: *mut StackFrame = &mut frame;
    let slot: *const *mut StackFrame = &frame_ptr;

    unsafe { mgr.add_pda_frame(slot) };
    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 3);

    mgr.remove_pda_frame(slot);
    assert!(collect_rooted(&mgr, &[]));
    assert_eq!(mgr.allocation_count(), 0);
    let _ = frame_ptr;
}

// =============================================================================
// Contention and adaptation
// =============================================================================

#[test]
fn test_collect_contended_returns_false() {
    let mgr = MemoryManager::new(test_program());
    let guard = mgr.sweep.lock();
    assert!(!collect_rooted(&mgr, &[]));
    drop(guard);
    assert!(collect_rooted(&mgr, &[]));
}

#[test]
fn test_mem_max_grows_after_fruitless_cycles() {
    let mgr = MemoryManager::with_mem_max(test_program(), 1024);
    let live = alloc(&mgr, 0);
    let roots = [live as usize];

    let initial = mgr.mem_max();
    for _ in 0..crate::UNCOLLECTED_COUNT + 1 {
        assert!(collect_rooted(&mgr, &roots));
    }
    assert_eq!(mgr.mem_max(), initial << 3);
}

#[test]
fn test_mem_max_shrinks_after_productive_cycles() {
    let mgr = MemoryManager::with_mem_max(test_program(), 1024);
    let live = alloc(&mgr, 0);
    let roots = [live as usize];

    // grow first
    for _ in 0..crate::UNCOLLECTED_COUNT + 1 {
        assert!(collect_rooted(&mgr, &roots));
    }
    let grown = mgr.mem_max();
    assert!(grown > 1024);

    // productive cycles: reclaim two garbage objects per cycle
    for _ in 0..crate::COLLECTED_COUNT + 1 {
        let _ = alloc(&mgr, 0);
        let _ = alloc(&mgr, 0);
        assert!(collect_rooted(&mgr, &roots));
    }
    assert_eq!(mgr.mem_max(), (grown >> 1) / 2);
}

#[test]
fn test_virtual_dispatch_cache() {
    let prgm = {
        let mut prgm = StackProgram::new();
        let mut cls = StackClass::new(0, "Test.Impl", WORD, vec![], vec![]);
        cls.add_method(StackMethod::new(4, 0, "Test.Impl:run", vec![]));
        prgm.add_class(cls, -1, &[]);
        Arc::new(prgm)
    };
    let mgr = MemoryManager::new(prgm.clone());

    assert!(mgr.get_virtual_entry(0, 9, 4).is_none());

    let method = prgm.class(0).unwrap().method(4).unwrap();
    mgr.add_virtual_entry(0, 9, 4, method);

    let hit = mgr.get_virtual_entry(0, 9, 4).unwrap();
    assert_eq!(hit.name, "Test.Impl:run");
    assert!(mgr.get_virtual_entry(1, 9, 4).is_none());
}
