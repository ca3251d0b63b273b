use std::fmt::Write as _;

use colored::Colorize;

use crate::memory::Backing;
use crate::program::{Program, ProgramLine};
use crate::runtime::Machine;

/// Layout used to list an assembled program.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, clap::ValueEnum)]
pub enum ListingFormat {
    /// Every source line prefixed with its line number
    #[default]
    Numbered,
    /// Address, word and label columns in front of each instruction
    Baudet,
}

/// Render the whole program in the given format.
pub fn listing(program: &Program, format: ListingFormat) -> String {
    let mut out = String::new();
    for line in program {
        let rendered = match format {
            ListingFormat::Numbered => Some(numbered(line)),
            ListingFormat::Baudet => baudet(program, line),
        };
        if let Some(rendered) = rendered {
            out.push_str(&rendered);
            out.push('\n');
        }
    }
    out
}

/// `   4: text`
pub fn numbered(line: &ProgramLine) -> String {
    format!("{:4}: {}", line.number(), line.text())
}

/// Instruction lines as `addr word label: text`; other lines keep any text besides their label.
fn baudet(program: &Program, line: &ProgramLine) -> Option<String> {
    let text = strip_label(line.text());
    match (line.address(), line.word()) {
        (Some(addr), Some(word)) => {
            let label = program
                .label_at(addr)
                .map(|label| format!("{label}:"))
                .unwrap_or_default();
            Some(format!("{addr:03x} {word:04x} {label:<20} {text}"))
        }
        _ if text.is_empty() => None,
        _ => Some(text),
    }
}

/// Drop a leading `label:` token. Only the first two tokens are split off and rejoined with a
/// single space; the rest of the line is kept as written.
fn strip_label(text: &str) -> String {
    let mut rest = text.trim();
    let mut pieces = Vec::new();
    for _ in 0..2 {
        if rest.is_empty() {
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        pieces.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    if pieces.first().is_some_and(|first| first.ends_with(':')) {
        pieces.remove(0);
    }
    pieces.join(" ")
}

/// Register dump. `minimal` output is uncoloured, one `NAME value` pair per line.
pub fn registers<B: Backing>(machine: &Machine<B>, minimal: bool) -> String {
    let ac = machine.ac();
    if minimal {
        let ac = ac.map_or_else(|| "-".to_string(), |ac| ac.to_string());
        return format!(
            "PC {}\nSP {}\nAC {}\nDEPTH {}\n",
            machine.pc(),
            machine.sp(),
            ac,
            machine.depth()
        );
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", "┌──────────────────────────────┐".dimmed());
    let _ = writeln!(
        out,
        "{}          {}{}",
        "│".dimmed(),
        "hex        int".italic(),
        "      │".dimmed()
    );
    let rows = [
        ("PC", Some(machine.pc() as i32)),
        ("SP", Some(machine.sp())),
        ("AC", ac.map(i32::from)),
        ("DP", Some(machine.depth() as i32)),
    ];
    for (name, value) in rows {
        let value = match value {
            Some(value) => format!("0x{:04x}  {value:>9}", value as u16),
            None => format!("{:<6}  {:>9}", "unset", "-"),
        };
        let _ = writeln!(out, "{} {}  {value}    {}", "│".dimmed(), name.bold(), "│".dimmed());
    }
    let _ = writeln!(out, "{}", "└──────────────────────────────┘".dimmed());
    out
}

/// Single memory cell as `M[addr] = value`.
pub fn cell(addr: usize, value: u16, minimal: bool) -> String {
    if minimal {
        return format!("M[{addr}] {value}");
    }
    format!(
        "{} = 0x{value:04x} {value:>6} {:>6}",
        format!("M[0x{addr:03x}]").bold(),
        value as i16
    )
}
