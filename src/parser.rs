use std::num::ParseIntError;

use crate::error::{AsmErrorKind, AssemblyError, Span};
use crate::ops::{self, Opcode};
use crate::program::{Program, ProgramLine};

/// Comment prefix marking a directive for the debugger.
const DEBUG_MARKER: &str = "dbg_";

/// Assemble a complete source text into a program.
pub fn assemble(src: &str) -> Result<Program, AssemblyError> {
    Assembler::new().assemble(src.lines())
}

/// Two-pass assembler.
///
/// The first pass encodes every line, binding labels to addresses as they are reached and
/// leaving a zero operand wherever a label is referenced. The second pass patches those operands
/// with the resolved addresses. Any error aborts the whole assembly.
#[derive(Debug, Default)]
pub struct Assembler {
    program: Program,
    /// Labels waiting for the next instruction, with the line they were written on
    pending: Vec<(String, usize)>,
    /// References to resolve once every label is known
    lookups: Vec<Lookup>,
}

/// Label reference left for the second pass.
#[derive(Debug)]
struct Lookup {
    /// 0-based index of the referencing line
    index: usize,
    name: String,
    span: Span,
}

/// Failure inside a single line, before line information is attached.
struct LineError {
    kind: AsmErrorKind,
    span: Option<Span>,
}

impl LineError {
    fn at(kind: AsmErrorKind, span: Span) -> Self {
        LineError {
            kind,
            span: Some(span),
        }
    }
}

impl From<AsmErrorKind> for LineError {
    fn from(kind: AsmErrorKind) -> Self {
        LineError { kind, span: None }
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume source lines and produce a fully resolved program.
    pub fn assemble<I, S>(mut self, lines: I) -> Result<Program, AssemblyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Pass 1: encode
        for (index, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            self.assemble_line(index, line).map_err(|err| {
                AssemblyError::new(index + 1, line.trim_end(), err.span, err.kind)
            })?;
        }
        for (name, line) in self.pending.drain(..) {
            tracing::warn!(label = %name, line, "label does not precede any instruction");
        }

        // Pass 2: resolve label references
        self.resolve()?;

        tracing::info!(
            words = self.program.len(),
            labels = self.program.symbols().count(),
            "assembled program"
        );
        Ok(self.program)
    }

    fn assemble_line(&mut self, index: usize, line: &str) -> Result<(), LineError> {
        let number = index + 1;
        let text = line.trim_end();

        // Everything after the first `;` is a comment
        let (code, comment) = match text.find(';') {
            Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
            None => (text, None),
        };
        let directive = comment.and_then(|comment| {
            comment
                .find(DEBUG_MARKER)
                .map(|idx| comment[idx + DEBUG_MARKER.len()..].trim().to_string())
        });

        let mut label = None;
        let mut op = None;
        let mut operand = None;
        for (position, (span, tok)) in split_tokens(code).into_iter().enumerate() {
            if let Some(name) = tok.strip_suffix(':') {
                if position != 0 {
                    return Err(LineError::at(
                        AsmErrorKind::MisplacedLabel {
                            position: position + 1,
                        },
                        span,
                    ));
                }
                if name.is_empty() {
                    return Err(LineError::at(AsmErrorKind::EmptyLabel, span));
                }
                label = Some((name, span));
            } else if op.is_none() {
                let parsed = tok.parse::<Opcode>().map_err(|_| {
                    LineError::at(
                        AsmErrorKind::UndefinedOperation {
                            mnemonic: tok.to_string(),
                        },
                        span,
                    )
                })?;
                op = Some((parsed, tok));
            } else if operand.is_none() {
                operand = Some((tok, span));
            } else {
                return Err(LineError::at(
                    AsmErrorKind::UnexpectedToken {
                        token: tok.to_string(),
                    },
                    span,
                ));
            }
        }

        if let Some((name, span)) = label {
            let first_line = self.program.label_line(name).or_else(|| {
                self.pending
                    .iter()
                    .find(|(pending, _)| pending == name)
                    .map(|(_, line)| *line)
            });
            if let Some(first_line) = first_line {
                return Err(LineError::at(
                    AsmErrorKind::DuplicateLabel {
                        name: name.to_string(),
                        first_line,
                    },
                    span,
                ));
            }
            self.pending.push((name.to_string(), number));
        }

        let word = match op {
            Some((op, mnemonic)) => {
                let arg = match operand {
                    None => 0,
                    Some((tok, span)) => match parse_literal(tok) {
                        Some(Ok(val)) => {
                            // `DEFN` is meant to fill the whole word
                            if val > op.operand_max() && mnemonic != "DEFN" {
                                tracing::warn!(
                                    line = number,
                                    %op,
                                    operand = val,
                                    "operand is too wide for its instruction"
                                );
                            }
                            val
                        }
                        Some(Err(_)) => {
                            return Err(LineError::at(
                                AsmErrorKind::NumberOverflow {
                                    literal: tok.to_string(),
                                },
                                span,
                            ))
                        }
                        None => {
                            self.lookups.push(Lookup {
                                index,
                                name: tok.to_string(),
                                span,
                            });
                            0
                        }
                    },
                };
                Some(ops::encode(op.code(), arg))
            }
            None => None,
        };

        let pgm_line = ProgramLine::new(number, text)
            .with_word(word)
            .with_directive(directive);
        if let Some(address) = self.program.add_line(pgm_line)? {
            for (name, line) in self.pending.drain(..) {
                self.program.add_symbol(&name, address, line)?;
            }
        }
        Ok(())
    }

    fn resolve(&mut self) -> Result<(), AssemblyError> {
        for lookup in std::mem::take(&mut self.lookups) {
            let address = self
                .program
                .resolve_label(&lookup.name)
                .map_err(|kind| self.error_at(&lookup, kind))?;
            let Some(word) = self
                .program
                .line_at_index(lookup.index)
                .and_then(ProgramLine::word)
            else {
                continue;
            };

            let (code, _) = ops::decode(word);
            if Opcode::from_code(code).is_some_and(|op| address > op.operand_max()) {
                tracing::warn!(
                    line = lookup.index + 1,
                    label = %lookup.name,
                    address,
                    "label address is too wide for its instruction"
                );
            }
            self.program.patch(lookup.index, ops::encode(code, address));
            tracing::debug!(line = lookup.index + 1, label = %lookup.name, address, "patched reference");
        }
        Ok(())
    }

    fn error_at(&self, lookup: &Lookup, kind: AsmErrorKind) -> AssemblyError {
        let text = self
            .program
            .line_at_index(lookup.index)
            .map_or("", ProgramLine::text);
        AssemblyError::new(lookup.index + 1, text, Some(lookup.span), kind)
    }
}

/// Whitespace separated tokens, with their position in the line.
fn split_tokens(code: &str) -> Vec<(Span, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    // Trailing space flushes the last token
    for (idx, c) in code.char_indices().chain([(code.len(), ' ')]) {
        match (start, c.is_whitespace()) {
            (None, false) => start = Some(idx),
            (Some(begin), true) => {
                tokens.push((Span::new(begin, idx - begin), &code[begin..idx]));
                start = None;
            }
            _ => (),
        }
    }
    tokens
}

/// Decimal or `0x` hexadecimal literal. `None` means the token names a label.
fn parse_literal(tok: &str) -> Option<Result<u16, ParseIntError>> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(u16::from_str_radix(hex, 16));
        }
        return None;
    }
    if tok.chars().all(|c| c.is_ascii_digit()) {
        return Some(tok.parse());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn words(src: &str) -> Vec<u16> {
        assemble(src).unwrap().words().collect()
    }

    fn failure(src: &str) -> AssemblyError {
        assemble(src).unwrap_err()
    }

    #[test]
    fn store_and_halt() {
        let src = "LOCO 5\nSTOD 100\nhalt: JUMP halt";
        assert_eq!(words(src), vec![0x7005, 0x1064, 0x6002]);
    }

    #[test]
    fn forward_reference() {
        let pgm = assemble(
            r#"
            JUMP done
            LOCO 1
            done: JUMP done
            "#,
        )
        .unwrap();
        let done = pgm.resolve_label("done").unwrap();
        assert_eq!(done, 2);
        assert_eq!(pgm.get_instruction(0).unwrap(), ops::encode(Opcode::Jump.code(), done));
    }

    #[test]
    fn label_binds_to_next_instruction() {
        let pgm = assemble("LOCO 1\nstart:\n; comment\n\n  LOCO 2\n").unwrap();
        assert_eq!(pgm.resolve_label("start").unwrap(), 1);
        assert_eq!(pgm.address_for_line(2), None);
        assert_eq!(pgm.address_for_line(5), Some(1));
        assert_eq!(pgm.lines().len(), 5);
    }

    #[test]
    fn stacked_labels_share_address() {
        let pgm = assemble("first:\nsecond:\n  PUSH\n").unwrap();
        assert_eq!(pgm.resolve_label("first").unwrap(), 0);
        assert_eq!(pgm.resolve_label("second").unwrap(), 0);
        assert_eq!(pgm.label_at(0), Some("first"));
    }

    #[test]
    fn duplicate_label() {
        let err = failure("a: LOCO 1\nb: LOCO 2\n\na: LOCO 3");
        assert_eq!(err.kind(), ErrorKind::Namespace);
        assert_eq!(err.line(), 4);
        assert_eq!(err.text(), "a: LOCO 3");
        assert_eq!(err.span(), Some(Span::new(0, 2)));

        // Both still waiting for an instruction
        let err = failure("a:\na:\nLOCO 1");
        assert_eq!(err.kind(), ErrorKind::Namespace);
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn undefined_label() {
        let err = failure("LOCO 1\n  JUMP nowhere ; oops");
        assert_eq!(err.kind(), ErrorKind::UndefinedLabel);
        assert_eq!(err.line(), 2);
        assert_eq!(err.text(), "  JUMP nowhere ; oops");
        assert_eq!(err.span(), Some(Span::new(7, 7)));
    }

    #[test]
    fn undefined_operation() {
        let err = failure("LOCO 1\nFROB 2");
        assert_eq!(err.kind(), ErrorKind::UndefinedOperation);
        assert_eq!(err.line(), 2);
        assert_eq!(
            err.detail(),
            &AsmErrorKind::UndefinedOperation {
                mnemonic: "FROB".into()
            }
        );
    }

    #[test]
    fn misplaced_labels() {
        assert_eq!(failure("LOCO x:").kind(), ErrorKind::Parse);
        assert_eq!(failure("a: b: LOCO 1").kind(), ErrorKind::Parse);
        assert_eq!(failure(": LOCO 1").kind(), ErrorKind::Parse);
    }

    #[test]
    fn too_many_tokens() {
        let err = failure("LOCO 1 2");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.span(), Some(Span::new(7, 1)));
    }

    #[test]
    fn literals() {
        assert_eq!(words("LOCO 0x10\nLOCO 0XfF\nLOCO 007"), vec![0x7010, 0x70FF, 0x7007]);
        assert_eq!(words("DEFN 65535\nDEFN 0xBEEF"), vec![0xFFFF, 0xBEEF]);
        assert_eq!(failure("DEFN 65536").kind(), ErrorKind::NumberOverflow);
        assert_eq!(failure("DEFN 0x10000").kind(), ErrorKind::NumberOverflow);
        // Not a literal, so a (missing) label
        assert_eq!(failure("LOCO 0xZZ").kind(), ErrorKind::UndefinedLabel);
        assert_eq!(failure("LOCO -1").kind(), ErrorKind::UndefinedLabel);
    }

    #[test]
    fn stack_instructions() {
        assert_eq!(
            words("PUSH\nPOP\nINSP 3\nDESP 2\nSWAP\nRETN"),
            vec![0xF400, 0xF600, 0xFC03, 0xFE02, 0xFA00, 0xF800]
        );
    }

    #[test]
    fn patching_keeps_opcode() {
        let src = r#"
            CALL sub
            PSHI data
            POPI data
        sub: RETN
        data: DEFN 7
        "#;
        assert_eq!(words(src), vec![0xE003, 0xF004, 0xF204, 0xF800, 0x0007]);
    }

    #[test]
    fn comments_and_directives() {
        let pgm = assemble("LOCO 1;trailing\nLOCO 2 ; dbg_break here\n; dbg_print\n; plain").unwrap();
        assert_eq!(pgm.words().collect::<Vec<_>>(), vec![0x7001, 0x7002]);
        let directives = pgm
            .lines()
            .iter()
            .map(ProgramLine::directive)
            .collect::<Vec<_>>();
        assert_eq!(directives, vec![None, Some("break here"), Some("print"), None]);
    }

    #[test]
    fn dangling_label_is_unbound() {
        let pgm = assemble("LOCO 1\nend:").unwrap();
        assert!(pgm.resolve_label("end").is_err());
        assert_eq!(pgm.len(), 1);
    }

    #[test]
    fn deterministic() {
        let src = "a: LOCO 3\n JUMP b\nb: JUMP b";
        assert_eq!(words(src), words(src));
    }

    #[test]
    fn accepts_any_line_source() {
        let lines = vec![String::from("LOCO 5"), String::from("x: JUMP x")];
        let pgm = Assembler::new().assemble(lines).unwrap();
        assert_eq!(pgm.len(), 2);
        assert_eq!(pgm.line(2).map(ProgramLine::text), Some("x: JUMP x"));
    }

    #[test]
    fn tokens_with_spans() {
        let toks = split_tokens("  lbl:\tLOCO  5 ");
        assert_eq!(
            toks,
            vec![
                (Span::new(2, 4), "lbl:"),
                (Span::new(7, 4), "LOCO"),
                (Span::new(13, 1), "5"),
            ]
        );
        assert!(split_tokens("   ").is_empty());
    }
}
