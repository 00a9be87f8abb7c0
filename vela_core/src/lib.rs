//! # Vela Core
//!
//! Shared vocabulary for the Vela toolchain.
//!
//! This crate provides the types every other Vela component speaks in:
//!
//! - **Source locations**: file/line pairs attached to diagnostics and nodes
//! - **Type system values**: the [`Type`] value object used by the compiler
//!   front-end and mirrored by the VM's descriptor graph
//! - **Signature encoding**: the canonical string form of method signatures
//!   used for overload resolution and virtual-method matching
//! - **Error definitions**: fatal VM error conditions

#![warn(missing_docs)]

pub mod error;
pub mod span;
pub mod types;

pub use error::{VmError, VmResult};
pub use span::SourceLoc;
pub use types::{encode_function_type, encode_type, parse_type, Type, TypeKind};

/// Toolchain version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fully qualified name of the root class every class inherits from.
pub const SYSTEM_BASE_NAME: &str = "System.Base";
