// Assembling
mod ops;
pub use ops::{decode, encode, Opcode};
mod parser;
pub use parser::{assemble, Assembler};
mod program;
pub use program::{Program, ProgramLine};

// Running
mod memory;
pub use memory::{Backing, Memory, MEMORY_SIZE};
mod runtime;
pub use runtime::{Machine, MAX_CALL_DEPTH, MAX_STACK_SIZE};

mod error;
pub use error::{Access, AsmErrorKind, AssemblyError, ErrorKind, MachineError, Span};

pub mod env;
pub mod output;
