//! # Vela Analyzer
//!
//! The contextual-analysis pass of the Vela compiler front-end.
//!
//! The parser produces a [`ast::Program`]; this crate types it: bundle and
//! alias resolution, inheritance and interface conformance, statement and
//! expression typing, overload selection with implicit boxing, lambda
//! lowering with captures, and generic instantiation against both program
//! classes and linked-library classes.
//!
//! # Usage
//!
//! ```
//! use vela_analyzer::{analyze, builder::ProgramBuilder, CompilerOptions, Linker};
//! use vela_analyzer::ast::MethodKind;
//! use vela_core::Type;
//!
//! let mut b = ProgramBuilder::new("hello.vl");
//! b.bundle("App");
//! let cls = b.class("Hello");
//! let main = b.method(
//!     cls,
//!     "Main",
//!     MethodKind::Function,
//!     &[("args", Type::class("System.String").with_dimension(1))],
//!     Type::nil(),
//! );
//! b.make_static(main);
//!
//! let (program, symbols) = b.finish();
//! let result = analyze(
//!     program,
//!     symbols,
//!     Linker::new(),
//!     CompilerOptions::executable("hello.vl"),
//! );
//! assert!(result.is_ok());
//! ```
//!
//! Errors come back as an ordered batch; the analyzer reports as many
//! problems as it can in one run rather than stopping at the first.

#![warn(missing_docs)]

pub mod analyzer;
pub mod ast;
pub mod builder;
pub mod errors;
pub mod library;
pub mod options;
pub mod symbols;

pub use analyzer::{analyze, ContextAnalyzer};
pub use errors::ErrorBatch;
pub use library::{Linker, LibraryAlias, LibraryClass, LibraryEnum, LibraryMethod};
pub use options::{CompilerOptions, OptLevel, TargetKind};
