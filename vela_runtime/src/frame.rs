//! Interpreter stack frames and per-context frame monitors.
//!
//! A frame's locals live in a raw word block (`mem`); slot 0 holds `self`
//! for non-lambda methods, followed by the method's declared slots in
//! layout order. Methods compiled with short-circuit logical operators
//! reserve one extra temp word between `self` and the declarations.
//!
//! JIT-compiled activations additionally expose `jit_mem`, a block owned by
//! the JIT whose layout differs from the interpreter's (see the collector's
//! JIT root walk).

use crate::descriptor::StackMethod;

/// One interpreter activation record.
///
/// The interpreter owns the backing storage; the collector only ever reads
/// through the raw pointers while the mutators are parked.
#[derive(Debug)]
pub struct StackFrame {
    /// Owning class id of the executing method.
    pub cls_id: usize,
    /// Executing method id.
    pub mthd_id: usize,
    /// Locals block; `mem[0]` is `self` for non-lambda methods.
    pub mem: *mut usize,
    /// JIT-resident locals block, or null for interpreted activations.
    pub jit_mem: *mut usize,
}

impl StackFrame {
    /// Create an interpreted frame over a locals block.
    pub fn interpreted(method: &StackMethod, mem: *mut usize) -> Self {
        Self {
            cls_id: method.cls_id,
            mthd_id: method.id,
            mem,
            jit_mem: std::ptr::null_mut(),
        }
    }

    /// Create a JIT frame: `mem` still holds `self` at slot 0, while the
    /// declared slots live in `jit_mem`.
    pub fn jitted(method: &StackMethod, mem: *mut usize, jit_mem: *mut usize) -> Self {
        Self {
            cls_id: method.cls_id,
            mthd_id: method.id,
            mem,
            jit_mem,
        }
    }
}

/// A per-execution-context view of the running call stack.
///
/// Each interpreter thread (and each coroutine) registers one monitor so
/// the collector can walk every active frame: the array of pushed frames,
/// the current stack position, and the frame currently executing (which is
/// not yet pushed).
#[derive(Debug, Clone, Copy)]
pub struct StackFrameMonitor {
    /// Base of the context's frame-pointer array.
    pub call_stack: *const *mut StackFrame,
    /// Pointer to the context's live stack position.
    pub call_stack_pos: *const i64,
    /// Pointer to the context's current-frame slot.
    pub cur_frame: *const *mut StackFrame,
}

impl StackFrameMonitor {
    /// Create a monitor over a context's stack bookkeeping.
    pub fn new(
        call_stack: *const *mut StackFrame,
        call_stack_pos: *const i64,
        cur_frame: *const *mut StackFrame,
    ) -> Self {
        Self {
            call_stack,
            call_stack_pos,
            cur_frame,
        }
    }
}
