//! A multi-pass, section-based assembler.
//!
//! This crate provides the target-independent parts of an assembler:
//! tokenizing and parsing source files, linking `.include`d files together,
//! evaluating expressions, and assembling statements into sections and symbols.
//! The target-specific parts (encoding instructions, placing sections in memory,
//! and writing the output) are plugged in through traits.
//!
//! # Usage
//!
//! A single file can be parsed into statements directly:
//! ```
//! use sectasm::parse::parse_source;
//! use sectasm::parse::lex::LexRules;
//!
//! let file = parse_source("start: nop\n.byte 1, 2\n", &LexRules::default());
//! assert!(!file.has_errors());
//! assert_eq!(file.stmts.len(), 2);
//! ```
//!
//! To assemble a program, an [`asm::Assembler`] needs a [`link::SourceProvider`]
//! (where source files come from) and an [`asm::InstructionEncoder`] for the target:
//! ```
//! use sectasm::asm::{Assembler, EncodeErr, EncodeErrKind, EvalContext, InstructionEncoder, TextFormat};
//! use sectasm::ast::Instruction;
//! use sectasm::link::MemProvider;
//!
//! struct Nop;
//! impl InstructionEncoder for Nop {
//!     fn estimate_size(&self, instr: &Instruction, _: &mut EvalContext<'_>) -> Result<u64, EncodeErr> {
//!         match instr.mnemonic.as_str() {
//!             "nop" => Ok(1),
//!             m => Err(EncodeErr::new(EncodeErrKind::UnknownMnemonic(m.to_string()), instr.span.clone())),
//!         }
//!     }
//!     fn encode(&self, _: &Instruction, _: &mut EvalContext<'_>) -> Result<Vec<u8>, EncodeErr> {
//!         Ok(vec![0x90])
//!     }
//! }
//!
//! let provider = MemProvider::default()
//!     .with_file("main.s", ".include \"defs.s\"\n.text\nnop\n.byte COUNT\n")
//!     .with_file("defs.s", ".set COUNT, 3\n");
//!
//! let outcome = Assembler::new(provider, Nop)
//!     .with_writer(TextFormat)
//!     .assemble("main.s")
//!     .unwrap(); // <-- only fails if linking fails
//!
//! assert!(outcome.is_ok());
//! let listing = String::from_utf8(outcome.output.unwrap()).unwrap();
//! assert!(listing.contains("90 03"));
//! ```
//!
//! If more granularity is needed, [`asm::Assembler::pipeline`] runs the phases one at a time.
//! See the [`asm`] module for more details.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod eval;
pub mod link;
pub mod asm;
pub mod err;
