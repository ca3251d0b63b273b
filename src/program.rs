use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::error::{Access, AsmErrorKind, MachineError};
use crate::memory::{Backing, MEMORY_SIZE};

// Symbol table of label -> address, kept in definition order
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Single line of source alongside the word it assembled to.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProgramLine {
    /// 1-based line number
    number: usize,
    text: String,
    word: Option<u16>,
    address: Option<u16>,
    /// Payload of a `dbg_` comment, passed through untouched
    directive: Option<String>,
}

impl ProgramLine {
    pub(crate) fn new(number: usize, text: impl Into<String>) -> Self {
        ProgramLine {
            number,
            text: text.into(),
            word: None,
            address: None,
            directive: None,
        }
    }

    pub(crate) fn with_word(mut self, word: Option<u16>) -> Self {
        self.word = word;
        self
    }

    pub(crate) fn with_directive(mut self, directive: Option<String>) -> Self {
        self.directive = directive;
        self
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Assembled instruction, `None` for blank, comment and label-only lines.
    pub fn word(&self) -> Option<u16> {
        self.word
    }

    pub fn address(&self) -> Option<u16> {
        self.address
    }

    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Symbol {
    address: u16,
    /// Line the label was written on
    line: usize,
}

/// Assembled program image: the source lines, the words they produced and the label table.
///
/// Read-only once the assembler hands it out; a [`Machine`](crate::Machine) records its writes
/// in its own memory overlay.
#[derive(Clone, Debug, Default)]
pub struct Program {
    lines: Vec<ProgramLine>,
    /// Address -> index into `lines`
    addresses: Vec<usize>,
    symbols: FxMap<String, Symbol>,
}

impl Program {
    /// Append a line, allocating the next address if it carries a word.
    pub(crate) fn add_line(&mut self, mut line: ProgramLine) -> Result<Option<u16>, AsmErrorKind> {
        let address = match line.word {
            Some(_) => {
                let address = self.addresses.len();
                if address >= MEMORY_SIZE {
                    return Err(AsmErrorKind::ProgramTooLarge);
                }
                self.addresses.push(self.lines.len());
                Some(address as u16)
            }
            None => None,
        };
        line.address = address;
        self.lines.push(line);
        Ok(address)
    }

    pub(crate) fn add_symbol(
        &mut self,
        name: &str,
        address: u16,
        line: usize,
    ) -> Result<(), AsmErrorKind> {
        if let Some(first_line) = self.label_line(name) {
            return Err(AsmErrorKind::DuplicateLabel {
                name: name.to_string(),
                first_line,
            });
        }
        tracing::debug!(label = name, address, line, "bound label");
        self.symbols.insert(name.to_string(), Symbol { address, line });
        Ok(())
    }

    /// Line on which `name` was defined, if it has been.
    pub(crate) fn label_line(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).map(|sym| sym.line)
    }

    /// Overwrite the word of an already added line.
    pub(crate) fn patch(&mut self, index: usize, word: u16) {
        if let Some(line) = self.lines.get_mut(index) {
            debug_assert!(line.word.is_some(), "patched a line without an instruction");
            line.word = Some(word);
        }
    }

    pub(crate) fn line_at_index(&self, index: usize) -> Option<&ProgramLine> {
        self.lines.get(index)
    }

    pub fn get_instruction(&self, addr: usize) -> Result<u16, MachineError> {
        self.word(addr).ok_or(MachineError::AddressOutOfBounds {
            addr: addr as i64,
            access: Access::Read,
        })
    }

    pub fn resolve_label(&self, name: &str) -> Result<u16, AsmErrorKind> {
        self.symbols
            .get(name)
            .map(|sym| sym.address)
            .ok_or_else(|| AsmErrorKind::UndefinedLabel {
                name: name.to_string(),
            })
    }

    /// First label defined for `addr`.
    pub fn label_at(&self, addr: u16) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, sym)| sym.address == addr)
            .map(|(name, _)| name.as_str())
    }

    pub fn line_for_address(&self, addr: usize) -> Option<&ProgramLine> {
        self.addresses.get(addr).map(|&index| &self.lines[index])
    }

    /// Address of the instruction on 1-based line `number`, if it has one.
    pub fn address_for_line(&self, number: usize) -> Option<u16> {
        self.line(number).and_then(ProgramLine::address)
    }

    /// Source line by 1-based number.
    pub fn line(&self, number: usize) -> Option<&ProgramLine> {
        number.checked_sub(1).and_then(|index| self.lines.get(index))
    }

    pub fn lines(&self) -> &[ProgramLine] {
        &self.lines
    }

    /// Labels with their addresses, in order of definition.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, u16)> {
        self.symbols
            .iter()
            .map(|(name, sym)| (name.as_str(), sym.address))
    }

    /// Assembled words in address order.
    pub fn words(&self) -> impl Iterator<Item = u16> + '_ {
        self.addresses
            .iter()
            .filter_map(|&index| self.lines[index].word)
    }

    /// Amount of memory the program occupies.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl Backing for Program {
    fn len(&self) -> usize {
        Program::len(self)
    }

    fn word(&self, addr: usize) -> Option<u16> {
        self.line_for_address(addr).and_then(ProgramLine::word)
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a ProgramLine;
    type IntoIter = std::slice::Iter<'a, ProgramLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
