use crate::error::{Access, MachineError};
use crate::memory::{Backing, Memory, MEMORY_SIZE};
use crate::ops::{self, Opcode};

/// Maximum amount of words the stack may grow to.
pub const MAX_STACK_SIZE: usize = 2048;

/// Maximum nesting of `CALL`s.
pub const MAX_CALL_DEPTH: u32 = 100;

/// Empty-stack position, one past the top of memory.
const STACK_TOP: i32 = MEMORY_SIZE as i32;

/// Lowest address the stack pointer may reach.
const STACK_FLOOR: i32 = (MEMORY_SIZE - MAX_STACK_SIZE) as i32;

type Result<T> = std::result::Result<T, MachineError>;

/// Complete machine state during execution.
///
/// A failed [`Machine::step`] may leave some side effects applied, so the machine must be
/// [reset](Machine::reset) before it is run again.
#[derive(Debug)]
pub struct Machine<B> {
    memory: Memory<B>,
    /// Program counter
    pc: u16,
    /// Stack pointer. Normally within `2048..=4096`, but `SWAP` can load anything.
    sp: i32,
    /// Accumulator, `None` until first set
    ac: Option<i16>,
    /// Current nesting of `CALL`s
    depth: u32,
    /// Set by a `JUMP` to itself
    ended: bool,
    /// Instructions completed since the last reset
    steps: u64,
}

impl<B: Backing> Machine<B> {
    pub fn new(backing: B) -> Result<Self> {
        Ok(Machine {
            memory: Memory::new(backing)?,
            pc: 0,
            sp: STACK_TOP,
            ac: None,
            depth: 0,
            ended: false,
            steps: 0,
        })
    }

    /// Restore every register and discard all memory writes.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.pc = 0;
        self.sp = STACK_TOP;
        self.ac = None;
        self.depth = 0;
        self.ended = false;
        self.steps = 0;
    }

    /// Execute until the program halts.
    pub fn run(&mut self) -> Result<()> {
        if self.ended {
            return Err(MachineError::ProgramCompleted);
        }
        while !self.ended {
            self.step()?;
        }
        Ok(())
    }

    /// Execute until the program halts, failing if it takes more than `limit` steps.
    pub fn run_limited(&mut self, limit: u64) -> Result<()> {
        if self.ended {
            return Err(MachineError::ProgramCompleted);
        }
        for _ in 0..limit {
            self.step()?;
            if self.ended {
                return Ok(());
            }
        }
        Err(MachineError::StepLimit { limit })
    }

    /// Fetch, decode and execute a single instruction.
    pub fn step(&mut self) -> Result<()> {
        if self.ended {
            return Err(MachineError::ProgramCompleted);
        }
        let pc = self.pc;
        let word = self.memory.read(pc as usize).map_err(|err| match err {
            MachineError::AddressOutOfBounds { addr, .. } => MachineError::AddressOutOfBounds {
                addr,
                access: Access::Fetch,
            },
            err => err,
        })?;

        let (code, arg) = ops::decode(word);
        let op = Opcode::from_code(code).ok_or(MachineError::UndefinedOperation { code, pc })?;
        tracing::trace!(pc, %op, arg, sp = self.sp, ac = ?self.ac, "executing");

        self.execute(op, arg)?;
        self.steps += 1;

        // Anything which did not move the PC falls through to the next word
        if self.pc == pc {
            self.pc += 1;
        }
        Ok(())
    }

    fn execute(&mut self, op: Opcode, arg: u16) -> Result<()> {
        match op {
            Opcode::Lodd => self.ac = Some(self.load(arg as usize)?),
            Opcode::Stod => {
                let ac = self.acc()?;
                self.memory.write(arg as usize, ac as i64)?;
            }
            Opcode::Loco => self.ac = Some(arg as i16),
            Opcode::Addd => {
                let val = self.load(arg as usize)?;
                self.ac = Some(self.acc()?.wrapping_add(val));
            }
            Opcode::Subd => {
                let val = self.load(arg as usize)?;
                self.ac = Some(self.acc()?.wrapping_sub(val));
            }
            Opcode::Jump => self.jump(arg),
            Opcode::Jzer => self.branch(arg, |ac| ac == 0)?,
            Opcode::Jnze => self.branch(arg, |ac| ac != 0)?,
            Opcode::Jneg => self.branch(arg, |ac| ac < 0)?,
            Opcode::Jpos => self.branch(arg, |ac| ac >= 0)?,
            Opcode::Lodl => {
                let addr = self.local(arg, Access::Read)?;
                self.ac = Some(self.load(addr)?);
            }
            Opcode::Stol => {
                let addr = self.local(arg, Access::Write)?;
                let ac = self.acc()?;
                self.memory.write(addr, ac as i64)?;
            }
            Opcode::Addl => {
                let addr = self.local(arg, Access::Read)?;
                let val = self.load(addr)?;
                self.ac = Some(self.acc()?.wrapping_add(val));
            }
            Opcode::Subl => {
                let addr = self.local(arg, Access::Read)?;
                let val = self.load(addr)?;
                self.ac = Some(self.acc()?.wrapping_sub(val));
            }
            Opcode::Call => self.call(arg)?,
            Opcode::Retn => self.retn()?,
            Opcode::Push => {
                let ac = self.acc()?;
                self.push(ac as i64)?;
            }
            Opcode::Pop => self.ac = Some(self.pop()? as i16),
            Opcode::Pshi => {
                let val = self.memory.read(arg as usize)?;
                self.push(val as i64)?;
            }
            Opcode::Popi => {
                let val = self.pop()?;
                self.memory.write(arg as usize, val as i64)?;
            }
            Opcode::Swap => {
                let ac = self.acc()?;
                // `sp` never leaves the i16 range: it only grows up to 4096 or is loaded from `ac`
                self.ac = Some(self.sp as i16);
                self.sp = ac as i32;
            }
            Opcode::Insp => self.insp(arg as i32)?,
            Opcode::Desp => self.desp(arg as i32)?,
        }
        Ok(())
    }

    fn acc(&self) -> Result<i16> {
        self.ac
            .ok_or(MachineError::UninitializedAccumulator { pc: self.pc })
    }

    /// Read a word as a signed value.
    fn load(&self, addr: usize) -> Result<i16> {
        Ok(self.memory.read(addr)? as i16)
    }

    /// Address `offs` words above the stack pointer.
    fn local(&self, offs: u16, access: Access) -> Result<usize> {
        let addr = self.sp as i64 + offs as i64;
        usize::try_from(addr)
            .ok()
            .filter(|addr| *addr < MEMORY_SIZE)
            .ok_or(MachineError::AddressOutOfBounds { addr, access })
    }

    fn jump(&mut self, target: u16) {
        // Jumping to the current instruction is the halt convention
        if target == self.pc {
            self.ended = true;
            tracing::info!(pc = self.pc, steps = self.steps + 1, "program halted");
        }
        self.pc = target;
    }

    fn branch(&mut self, target: u16, cond: impl FnOnce(i16) -> bool) -> Result<()> {
        if cond(self.acc()?) {
            self.pc = target;
        }
        Ok(())
    }

    fn call(&mut self, target: u16) -> Result<()> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(MachineError::InfiniteRecursion { depth: self.depth });
        }
        self.depth += 1;
        // Return to the word after the call
        self.push(self.pc as i64 + 1)?;
        self.pc = target;
        Ok(())
    }

    fn retn(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(MachineError::UnmatchedReturn);
        }
        self.depth -= 1;
        self.pc = self.pop()?;
        Ok(())
    }

    fn insp(&mut self, amount: i32) -> Result<()> {
        if self.sp + amount > STACK_TOP {
            return Err(MachineError::StackUnderflow {
                sp: self.sp,
                amount,
            });
        }
        self.sp += amount;
        Ok(())
    }

    fn desp(&mut self, amount: i32) -> Result<()> {
        if self.sp - amount < STACK_FLOOR {
            return Err(MachineError::StackOverflow {
                sp: self.sp,
                amount,
            });
        }
        self.sp -= amount;
        Ok(())
    }

    fn push(&mut self, val: i64) -> Result<()> {
        self.desp(1)?;
        let sp = self.local(0, Access::Write)?;
        self.memory.write(sp, val)
    }

    fn pop(&mut self) -> Result<u16> {
        // Check for an empty stack before touching memory
        if self.sp + 1 > STACK_TOP {
            return Err(MachineError::StackUnderflow {
                sp: self.sp,
                amount: 1,
            });
        }
        let sp = self.local(0, Access::Read)?;
        let val = self.memory.read(sp)?;
        self.insp(1)?;
        Ok(val)
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn sp(&self) -> i32 {
        self.sp
    }

    pub fn ac(&self) -> Option<i16> {
        self.ac
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Read memory without executing anything.
    pub fn peek(&self, addr: usize) -> Result<u16> {
        self.memory.read(addr)
    }

    pub fn memory(&self) -> &Memory<B> {
        &self.memory
    }
}
