//! # Vela Runtime
//!
//! The descriptor graph the Vela VM executes against, and the stack-frame
//! structures the interpreter threads maintain.
//!
//! The compiler emits class and method descriptors; the loader materializes
//! them into a [`StackProgram`]. The memory manager consumes the program
//! read-only: it walks class declarations to find heap references, resolves
//! closure layouts for function-valued locals, and consults the hierarchy
//! and interface tables for runtime cast checks.

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod descriptor;
pub mod frame;

pub use descriptor::{
    MemoryKind, MemoryTag, StackClass, StackDclr, StackMethod, StackProgram, INF_ENDING,
};
pub use frame::{StackFrame, StackFrameMonitor};
