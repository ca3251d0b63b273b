use std::fmt;
use std::str::FromStr;

/// Top nibble shared by every stack-form opcode.
const STACK_NIBBLE: u16 = 0b1111;

/// Every operation understood by the machine.
///
/// Standard-form operations carry a 4-bit opcode in the top nibble of the word and a 12-bit
/// operand. Stack-form operations all start with `0b1111` and carry a full 8-bit opcode followed
/// by an 8-bit operand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    /// Load direct, `ac <- mem[x]`. Doubles as `DEFN` to lay down a raw data word.
    Lodd,
    /// Store direct, `mem[x] <- ac`
    Stod,
    /// Add direct, `ac <- ac + mem[x]`
    Addd,
    /// Subtract direct, `ac <- ac - mem[x]`
    Subd,
    /// Jump if `ac >= 0`
    Jpos,
    /// Jump if `ac == 0`
    Jzer,
    /// Unconditional jump. Jumping to itself halts the machine.
    Jump,
    /// Load constant, `ac <- x`
    Loco,
    /// Load local, `ac <- mem[sp + x]`
    Lodl,
    /// Store local, `mem[sp + x] <- ac`
    Stol,
    /// Add local, `ac <- ac + mem[sp + x]`
    Addl,
    /// Subtract local, `ac <- ac - mem[sp + x]`
    Subl,
    /// Jump if `ac < 0`
    Jneg,
    /// Jump if `ac != 0`
    Jnze,
    /// Push return address and jump to subroutine
    Call,
    /// Push indirect, `mem[--sp] <- mem[x]`
    Pshi,
    /// Pop indirect, `mem[x] <- mem[sp++]`
    Popi,
    /// Push accumulator
    Push,
    /// Pop into accumulator
    Pop,
    /// Return from subroutine
    Retn,
    /// Exchange `ac` and `sp`
    Swap,
    /// Increment stack pointer by `x`
    Insp,
    /// Decrement stack pointer by `x`
    Desp,
}

impl Opcode {
    pub const ALL: [Opcode; 23] = [
        Opcode::Lodd,
        Opcode::Stod,
        Opcode::Addd,
        Opcode::Subd,
        Opcode::Jpos,
        Opcode::Jzer,
        Opcode::Jump,
        Opcode::Loco,
        Opcode::Lodl,
        Opcode::Stol,
        Opcode::Addl,
        Opcode::Subl,
        Opcode::Jneg,
        Opcode::Jnze,
        Opcode::Call,
        Opcode::Pshi,
        Opcode::Popi,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Retn,
        Opcode::Swap,
        Opcode::Insp,
        Opcode::Desp,
    ];

    /// Byte placed in the op field of an encoded word.
    pub const fn code(self) -> u8 {
        match self {
            Opcode::Lodd => 0x00,
            Opcode::Stod => 0x10,
            Opcode::Addd => 0x20,
            Opcode::Subd => 0x30,
            Opcode::Jpos => 0x40,
            Opcode::Jzer => 0x50,
            Opcode::Jump => 0x60,
            Opcode::Loco => 0x70,
            Opcode::Lodl => 0x80,
            Opcode::Stol => 0x90,
            Opcode::Addl => 0xA0,
            Opcode::Subl => 0xB0,
            Opcode::Jneg => 0xC0,
            Opcode::Jnze => 0xD0,
            Opcode::Call => 0xE0,
            Opcode::Pshi => 0xF0,
            Opcode::Popi => 0xF2,
            Opcode::Push => 0xF4,
            Opcode::Pop => 0xF6,
            Opcode::Retn => 0xF8,
            Opcode::Swap => 0xFA,
            Opcode::Insp => 0xFC,
            Opcode::Desp => 0xFE,
        }
    }

    /// Reverse of [`Opcode::code`]. `0x00` always resolves to `LODD`, never to its `DEFN` alias.
    pub const fn from_code(code: u8) -> Option<Opcode> {
        let op = match code {
            0x00 => Opcode::Lodd,
            0x10 => Opcode::Stod,
            0x20 => Opcode::Addd,
            0x30 => Opcode::Subd,
            0x40 => Opcode::Jpos,
            0x50 => Opcode::Jzer,
            0x60 => Opcode::Jump,
            0x70 => Opcode::Loco,
            0x80 => Opcode::Lodl,
            0x90 => Opcode::Stol,
            0xA0 => Opcode::Addl,
            0xB0 => Opcode::Subl,
            0xC0 => Opcode::Jneg,
            0xD0 => Opcode::Jnze,
            0xE0 => Opcode::Call,
            0xF0 => Opcode::Pshi,
            0xF2 => Opcode::Popi,
            0xF4 => Opcode::Push,
            0xF6 => Opcode::Pop,
            0xF8 => Opcode::Retn,
            0xFA => Opcode::Swap,
            0xFC => Opcode::Insp,
            0xFE => Opcode::Desp,
            _ => return None,
        };
        Some(op)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Lodd => "LODD",
            Opcode::Stod => "STOD",
            Opcode::Addd => "ADDD",
            Opcode::Subd => "SUBD",
            Opcode::Jpos => "JPOS",
            Opcode::Jzer => "JZER",
            Opcode::Jump => "JUMP",
            Opcode::Loco => "LOCO",
            Opcode::Lodl => "LODL",
            Opcode::Stol => "STOL",
            Opcode::Addl => "ADDL",
            Opcode::Subl => "SUBL",
            Opcode::Jneg => "JNEG",
            Opcode::Jnze => "JNZE",
            Opcode::Call => "CALL",
            Opcode::Pshi => "PSHI",
            Opcode::Popi => "POPI",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Retn => "RETN",
            Opcode::Swap => "SWAP",
            Opcode::Insp => "INSP",
            Opcode::Desp => "DESP",
        }
    }

    pub const fn is_stack_form(self) -> bool {
        is_stack_code(self.code())
    }

    /// Widest operand that survives encoding without spilling into the op field.
    pub const fn operand_max(self) -> u16 {
        if self.is_stack_form() {
            0xFF
        } else {
            0xFFF
        }
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Raw data words share the load opcode
        if s == "DEFN" {
            return Ok(Opcode::Lodd);
        }
        Opcode::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const fn is_stack_code(code: u8) -> bool {
    (code as u16) >> 4 == STACK_NIBBLE
}

/// Pack an opcode byte and operand into one instruction word.
///
/// Standard-form operands are deliberately left unmasked so that a `DEFN` literal can occupy the
/// whole word.
pub fn encode(code: u8, operand: u16) -> u16 {
    if is_stack_code(code) {
        (code as u16) << 8 | (operand & 0xFF)
    } else {
        ((code & 0xF0) as u16) << 8 | operand
    }
}

/// Split an instruction word into its opcode byte and operand.
pub fn decode(word: u16) -> (u8, u16) {
    if word >> 12 == STACK_NIBBLE {
        (((word & 0xFF00) >> 8) as u8, word & 0xFF)
    } else {
        (((word & 0xF000) >> 8) as u8, word & 0xFFF)
    }
}
