//! Runtime object cast validation.

use crate::heap::SIZE_OR_CLS_OFFSET;
use crate::heap::TYPE_OFFSET;
use vela_runtime::{MemoryTag, INF_ENDING};

/// Validate a cast of the object at `mem` to class `to_id`.
///
/// The source class id is read from the object header, then the parent
/// chain is walked (`hierarchy[id]` gives the parent id or −1), and each
/// class on the chain has its interface row checked. Returns the payload
/// address on success, `None` on failure. Raw arrays (non-`Nil` header
/// tags) never cast.
///
/// # Safety
///
/// `mem` must be a live payload address produced by the memory manager,
/// and the tables must cover every class id reachable from its header.
pub unsafe fn valid_object_cast(
    mem: usize,
    to_id: i64,
    hierarchy: &[i64],
    interfaces: &[Vec<i64>],
) -> Option<usize> {
    // Safety: caller contract.
    let tag = unsafe { (mem as *const usize).sub(TYPE_OFFSET).read() };
    if MemoryTag::from_word(tag) != Some(MemoryTag::Nil) {
        return None;
    }
    // Safety: caller contract.
    let id = unsafe { (mem as *const usize).sub(SIZE_OR_CLS_OFFSET).read() } as i64;
    if id < 0 || id as usize >= hierarchy.len() {
        return None;
    }

    // parent chain
    let mut virtual_cls_id = id;
    while virtual_cls_id != -1 {
        if virtual_cls_id == to_id {
            return Some(mem);
        }
        virtual_cls_id = hierarchy[virtual_cls_id as usize];
    }

    // interfaces along the parent chain
    let mut virtual_cls_id = id;
    while virtual_cls_id != -1 {
        for &inf_id in &interfaces[virtual_cls_id as usize] {
            if inf_id <= INF_ENDING {
                break;
            }
            if inf_id == to_id {
                return Some(mem);
            }
        }
        virtual_cls_id = hierarchy[virtual_cls_id as usize];
    }

    None
}
