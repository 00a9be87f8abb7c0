//! End-to-end heap scenarios through the public memory-manager API.

use std::sync::Arc;
use vela_gc::{valid_object_cast, MemoryManager};
use vela_runtime::{MemoryKind, MemoryTag, StackClass, StackDclr, StackProgram};

const WORD: usize = std::mem::size_of::<usize>();

/// Hierarchy: Base (0) ◀─ Shape (1) ◀─ Circle (2), Circle implements
/// Drawable (3); Blob (4) stands apart.
fn cast_program() -> Arc<StackProgram> {
    let mut prgm = StackProgram::new();
    prgm.add_class(StackClass::new(0, "System.Base", WORD, vec![], vec![]), -1, &[]);
    prgm.add_class(StackClass::new(1, "Geo.Shape", WORD, vec![], vec![]), 0, &[]);
    prgm.add_class(StackClass::new(2, "Geo.Circle", WORD, vec![], vec![]), 1, &[3]);
    prgm.add_class(StackClass::new(3, "Geo.Drawable", WORD, vec![], vec![]), 0, &[]);
    prgm.add_class(StackClass::new(4, "Geo.Blob", WORD, vec![], vec![]), 0, &[]);
    Arc::new(prgm)
}

#[test]
fn heap_accounting_returns_to_baseline() {
    let mut prgm = StackProgram::new();
    prgm.add_class(StackClass::new(0, "App.Leaf", 8, vec![], vec![]), -1, &[]);
    let mgr = MemoryManager::new(Arc::new(prgm));

    let baseline = mgr.used_bytes();
    for _ in 0..10 {
        let mem = unsafe { mgr.allocate_object(0, std::ptr::null(), 0, false) };
        assert!(!mem.is_null());
    }
    assert!(mgr.used_bytes() > baseline);

    assert!(unsafe { mgr.collect_all(std::ptr::null(), 0) });
    assert_eq!(mgr.used_bytes(), baseline);
}

#[test]
fn rooted_graph_survives_collection() {
    let mut prgm = StackProgram::new();
    prgm.add_class(
        StackClass::new(
            0,
            "App.Cons",
            WORD,
            vec![StackDclr::new(MemoryKind::Obj, "App.Cons:tail")],
            vec![],
        ),
        -1,
        &[],
    );
    let mgr = MemoryManager::new(Arc::new(prgm));

    let c = unsafe { mgr.allocate_object(0, std::ptr::null(), 0, false) };
    let b = unsafe { mgr.allocate_object(0, std::ptr::null(), 0, false) };
    let a = unsafe { mgr.allocate_object(0, std::ptr::null(), 0, false) };
    unsafe {
        a.write(b as usize);
        b.write(c as usize);
    }

    let stack = [a as usize];
    assert!(unsafe { mgr.collect_all(stack.as_ptr(), 1) });
    assert_eq!(mgr.allocation_count(), 3);
}

#[test]
fn array_slot_nulled_reclaims_exactly_one() {
    let mut prgm = StackProgram::new();
    prgm.add_class(StackClass::new(0, "App.Leaf", WORD, vec![], vec![]), -1, &[]);
    let mgr = MemoryManager::new(Arc::new(prgm));

    let array = unsafe { mgr.allocate_array(103, MemoryTag::Int, std::ptr::null(), 0, false) };
    unsafe {
        array.write(100);
        array.add(1).write(1);
        array.add(2).write(100);
        for i in 0..100 {
            let element = mgr.allocate_object(0, std::ptr::null(), 0, false);
            array.add(3 + i).write(element as usize);
        }
        array.add(3 + 50).write(0);
    }

    let stack = [array as usize];
    assert!(unsafe { mgr.collect_all(stack.as_ptr(), 1) });
    assert_eq!(mgr.allocation_count(), 100);
}

#[test]
fn cast_walks_parents_and_interfaces() {
    let prgm = cast_program();
    let mgr = MemoryManager::new(prgm.clone());

    let circle = unsafe { mgr.allocate_object(2, std::ptr::null(), 0, false) } as usize;
    let hierarchy = prgm.hierarchy();
    let interfaces = prgm.interfaces();

    unsafe {
        // exact, parent chain, root, interface
        assert_eq!(valid_object_cast(circle, 2, hierarchy, interfaces), Some(circle));
        assert_eq!(valid_object_cast(circle, 1, hierarchy, interfaces), Some(circle));
        assert_eq!(valid_object_cast(circle, 0, hierarchy, interfaces), Some(circle));
        assert_eq!(valid_object_cast(circle, 3, hierarchy, interfaces), Some(circle));
        // unrelated class
        assert_eq!(valid_object_cast(circle, 4, hierarchy, interfaces), None);
    }
}

#[test]
fn cast_rejects_raw_arrays() {
    let prgm = cast_program();
    let mgr = MemoryManager::new(prgm.clone());

    let array = unsafe { mgr.allocate_array(4, MemoryTag::Int, std::ptr::null(), 0, false) } as usize;
    unsafe {
        assert_eq!(
            valid_object_cast(array, 0, prgm.hierarchy(), prgm.interfaces()),
            None
        );
    }
}

#[test]
fn no_double_free_across_cycles() {
    let mut prgm = StackProgram::new();
    prgm.add_class(StackClass::new(0, "App.Leaf", WORD, vec![], vec![]), -1, &[]);
    let mgr = MemoryManager::new(Arc::new(prgm));

    // churn: allocate, reclaim, reallocate the same size class
    for _ in 0..5 {
        for _ in 0..20 {
            let mem = unsafe { mgr.allocate_object(0, std::ptr::null(), 0, false) };
            assert!(!mem.is_null());
        }
        assert!(unsafe { mgr.collect_all(std::ptr::null(), 0) });
        assert_eq!(mgr.allocation_count(), 0);
        assert_eq!(mgr.used_bytes(), 0);
    }
}
