//! # bfjit Library
//!
//! Just-in-time compile and run brainfuck on x86-64 System-V hosts.
//! * `lexer` and `parser` turn source text into a tree-shaped IR
//! * `optimizer` rewrites the tree until a full cycle changes nothing
//! * `emitter` lowers the tree to machine code in a caller's buffer
//! * `jit` owns the executable mapping, the tape, and the host I/O
//!
//! The pipeline is strictly one-way: each stage consumes the previous
//! stage's tree and the program only runs after the whole image is
//! emitted.  Parse failures travel as `Error` nodes and turn fatal at
//! emission, so a broken program costs nothing but a diagnostic.
//!
//! ## Example
//!
//! ```rs
//! use bfjit::{jit,optimizer,parser};
//! let ast = optimizer::optimize(parser::parse_slice(b"+++."));
//! let jit = jit::Jit::compile(&ast).expect("compile failed");
//! jit.run();
//! ```

pub mod ir;
pub mod lexer;
pub mod parser;
pub mod optimizer;
pub mod emitter;
pub mod jit;

/// Compiler Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("program contained errors")]
    SourceErrors,
    #[error("loop escaped the loop emission path")]
    StrayLoop,
    #[error("code buffer cannot hold the program")]
    CodeBufferFull,
    #[error("could not map executable memory")]
    MmapFailed,
}
