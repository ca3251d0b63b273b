use std::fmt::{self, Display};

use miette::{Diagnostic, LabeledSpan, SourceCode, SourceSpan};
use thiserror::Error;

/// Flat classification of every failure the core can report.
///
/// Drivers match on this instead of on the detailed error enums.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ErrorKind {
    AddressOutOfBounds,
    NumberOverflow,
    StackOverflow,
    StackUnderflow,
    InfiniteRecursion,
    UndefinedOperation,
    UndefinedLabel,
    /// A label defined more than once
    Namespace,
    Parse,
    UninitializedAccumulator,
    /// `step` or `run` called on a halted machine
    ProgramCompleted,
    /// A bounded run used up its step budget
    StepLimit,
}

/// Which kind of memory access went out of bounds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    Fetch,
    Read,
    Write,
    Load,
}

impl Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Fetch => f.write_str("fetching the next instruction"),
            Access::Read => f.write_str("reading memory"),
            Access::Write => f.write_str("writing memory"),
            Access::Load => f.write_str("loading the program"),
        }
    }
}

// Runtime errors

#[derive(Clone, PartialEq, Eq, Debug, Error, Diagnostic)]
pub enum MachineError {
    #[error("address {addr} is out of bounds while {access} (memory holds 4096 words)")]
    #[diagnostic(
        code(machine::address),
        help("valid addresses range from 0 to 4095")
    )]
    AddressOutOfBounds { addr: i64, access: Access },

    #[error("M[0x{addr:04x}] = {value}: value does not fit in a 16-bit word")]
    #[diagnostic(
        code(machine::overflow),
        help("memory cells hold values from -32768 to 65535")
    )]
    NumberOverflow { addr: usize, value: i64 },

    #[error("SP({sp:04x}) -= {amount} overflows the stack (at most 2048 words)")]
    #[diagnostic(code(machine::stack_overflow))]
    StackOverflow { sp: i32, amount: i32 },

    #[error("SP({sp:04x}) += {amount} underflows the stack")]
    #[diagnostic(
        code(machine::stack_underflow),
        help("check that every PUSH has a matching POP")
    )]
    StackUnderflow { sp: i32, amount: i32 },

    #[error("tried to return with no matching call")]
    #[diagnostic(code(machine::stack_underflow))]
    UnmatchedReturn,

    #[error("infinite recursion detected: call depth reached {depth}")]
    #[diagnostic(
        code(machine::recursion),
        help("subroutine calls may nest at most 100 deep")
    )]
    InfiniteRecursion { depth: u32 },

    #[error("undefined operation 0x{code:02x} at address {pc}")]
    #[diagnostic(
        code(machine::undefined_op),
        help("execution may have run into a data word")
    )]
    UndefinedOperation { code: u8, pc: u16 },

    #[error("accumulator used at address {pc} before it was set")]
    #[diagnostic(
        code(machine::uninit_ac),
        help("load a value with LOCO, LODD or POP first")
    )]
    UninitializedAccumulator { pc: u16 },

    #[error("program completed")]
    #[diagnostic(code(machine::completed), help("reset the machine to run it again"))]
    ProgramCompleted,

    #[error("program did not halt within {limit} steps")]
    #[diagnostic(code(machine::step_limit))]
    StepLimit { limit: u64 },
}

impl MachineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AddressOutOfBounds { .. } => ErrorKind::AddressOutOfBounds,
            Self::NumberOverflow { .. } => ErrorKind::NumberOverflow,
            Self::StackOverflow { .. } => ErrorKind::StackOverflow,
            Self::StackUnderflow { .. } | Self::UnmatchedReturn => ErrorKind::StackUnderflow,
            Self::InfiniteRecursion { .. } => ErrorKind::InfiniteRecursion,
            Self::UndefinedOperation { .. } => ErrorKind::UndefinedOperation,
            Self::UninitializedAccumulator { .. } => ErrorKind::UninitializedAccumulator,
            Self::ProgramCompleted => ErrorKind::ProgramCompleted,
            Self::StepLimit { .. } => ErrorKind::StepLimit,
        }
    }
}

// Assembler errors

#[derive(Clone, PartialEq, Eq, Debug, Error, Diagnostic)]
pub enum AsmErrorKind {
    #[error("undefined operation: {mnemonic}")]
    #[diagnostic(
        code(asm::undefined_op),
        help("mnemonics are upper case, e.g. LODD, PUSH, DEFN")
    )]
    UndefinedOperation { mnemonic: String },

    #[error("undefined label '{name}'")]
    #[diagnostic(code(asm::undefined_label))]
    UndefinedLabel { name: String },

    #[error("duplicate definition of label {name} (first defined on line {first_line})")]
    #[diagnostic(
        code(asm::duplicate_label),
        help("labels are only allowed once per file")
    )]
    DuplicateLabel { name: String, first_line: usize },

    #[error("unexpected label at token {position}")]
    #[diagnostic(
        code(asm::misplaced_label),
        help("a label must be the first token on its line, and only one is allowed")
    )]
    MisplacedLabel { position: usize },

    #[error("label has no name")]
    #[diagnostic(code(asm::empty_label))]
    EmptyLabel,

    #[error("unexpected token '{token}'")]
    #[diagnostic(
        code(asm::unexpected_token),
        help("lines take the form `label: OP arg ; comment`")
    )]
    UnexpectedToken { token: String },

    #[error("literal {literal} does not fit in a 16-bit word")]
    #[diagnostic(code(asm::overflow), help("literals range from 0 to 65535"))]
    NumberOverflow { literal: String },

    #[error("program does not fit in memory (at most 4096 words)")]
    #[diagnostic(code(asm::too_large))]
    ProgramTooLarge,
}

impl AsmErrorKind {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UndefinedOperation { .. } => ErrorKind::UndefinedOperation,
            Self::UndefinedLabel { .. } => ErrorKind::UndefinedLabel,
            Self::DuplicateLabel { .. } => ErrorKind::Namespace,
            Self::MisplacedLabel { .. } | Self::EmptyLabel | Self::UnexpectedToken { .. } => {
                ErrorKind::Parse
            }
            Self::NumberOverflow { .. } => ErrorKind::NumberOverflow,
            Self::ProgramTooLarge => ErrorKind::AddressOutOfBounds,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::UndefinedOperation { .. } => "unknown mnemonic",
            Self::UndefinedLabel { .. } => "undefined label",
            Self::DuplicateLabel { .. } => "duplicate label",
            Self::MisplacedLabel { .. } => "misplaced label",
            Self::EmptyLabel => "empty label",
            Self::UnexpectedToken { .. } => "unexpected token",
            Self::NumberOverflow { .. } => "out-of-range literal",
            Self::ProgramTooLarge => "no address left for this instruction",
        }
    }
}

/// Byte range within a single source line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn offs(&self) -> usize {
        self.offs
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::from((value.offs, value.len))
    }
}

/// The single failure reported by an aborted assembly.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("error on line {line}: {kind}")]
pub struct AssemblyError {
    /// 1-based source line number
    line: usize,
    /// Offending line, as written
    text: String,
    span: Option<Span>,
    kind: AsmErrorKind,
}

impl AssemblyError {
    pub fn new(line: usize, text: impl Into<String>, span: Option<Span>, kind: AsmErrorKind) -> Self {
        AssemblyError {
            line,
            text: text.into(),
            span,
            kind,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn detail(&self) -> &AsmErrorKind {
        &self.kind
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind.kind()
    }
}

impl Diagnostic for AssemblyError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        self.kind.code()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        self.kind.help()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.text)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        let label = LabeledSpan::at(span, self.kind.label());
        let labels: Box<dyn Iterator<Item = LabeledSpan>> = Box::new(std::iter::once(label));
        Some(labels)
    }
}
