//! Instruction Decoder
//!
//! Decoding is deterministic and side-effect free: an address plus a raw
//! 32-bit word produces exactly one [`Instruction`] by consulting the fixed
//! opcode table. There is no recovery path for unknown encodings. A word the
//! table cannot place means either a malformed image was fed to the
//! disassembler or the table itself is incomplete, and both are bugs to fix
//! at development time, so the decoder panics loudly instead of returning an
//! error the caller would have to invent a meaning for.

use std::fmt;

use smallvec::SmallVec;

use super::operand::Operand;
use super::tables::{self, InstructionEntry, InstructionFlags};

/// A resolved mnemonic: the table entry plus optional rendering suffix and
/// display-name override. Pseudo-mnemonics (`nop`, `move`, `li`, `b`) share
/// the underlying entry with the instruction they alias and only replace the
/// displayed name.
#[derive(Clone, Copy)]
pub struct Opcode {
    pub entry: &'static InstructionEntry,
    pub suffix: Option<&'static str>,
    pub name_override: Option<&'static str>,
}

impl Opcode {
    pub fn new(entry: &'static InstructionEntry) -> Self {
        Self {
            entry,
            suffix: None,
            name_override: None,
        }
    }

    pub fn with_suffix(entry: &'static InstructionEntry, suffix: &'static str) -> Self {
        Self {
            entry,
            suffix: Some(suffix),
            name_override: None,
        }
    }

    pub fn with_name(entry: &'static InstructionEntry, name_override: &'static str) -> Self {
        Self {
            entry,
            suffix: None,
            name_override: Some(name_override),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name_override.unwrap_or(self.entry.name);
        match self.suffix {
            Some(suffix) => write!(f, "{}{}", name, suffix),
            None => write!(f, "{}", name),
        }
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opcode({})", self)
    }
}

/// One decoded instruction.
///
/// Everything but `breakpoint_id` is fixed at decode time. The breakpoint
/// association is owned by the debugger side; the decoder never sets it.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Address the word was fetched from.
    pub address: u32,
    /// Raw 32-bit instruction word.
    pub code: u32,
    /// Resolved mnemonic.
    pub opcode: Opcode,
    /// Operands in display order. Inline capacity of four covers every
    /// table entry without a heap allocation.
    pub operands: SmallVec<[Operand; 4]>,
    /// Id of the breakpoint attached to this line, if any.
    pub breakpoint_id: Option<u32>,
}

impl Instruction {
    /// Decode a single word. Panics if the opcode table has no entry for the
    /// encoding or the entry's formatter cannot produce operands.
    #[inline]
    pub fn decode(address: u32, word: u32) -> Instruction {
        let entry = match tables::lookup(word) {
            Some(entry) => entry,
            None => panic!(
                "no opcode table entry for word 0x{:08X} at 0x{:08X}",
                word, address
            ),
        };
        let (opcode, operands) = match (entry.format)(address, word, entry) {
            Some(formatted) => formatted,
            None => panic!(
                "operand formatting failed for {} (word 0x{:08X} at 0x{:08X})",
                entry.name, word, address
            ),
        };
        Instruction {
            address,
            code: word,
            opcode,
            operands,
            breakpoint_id: None,
        }
    }

    /// Conditional branch with a relative target.
    pub fn is_branch(&self) -> bool {
        self.opcode.entry.flags.contains(InstructionFlags::IS_CONDBRANCH)
    }

    /// Unconditional jump (register or absolute target).
    pub fn is_jump(&self) -> bool {
        self.opcode.entry.flags.contains(InstructionFlags::IS_JUMP)
    }

    /// Reads memory.
    pub fn is_load(&self) -> bool {
        self.opcode.entry.flags.contains(InstructionFlags::IN_MEM)
    }

    /// Writes memory.
    pub fn is_store(&self) -> bool {
        self.opcode.entry.flags.contains(InstructionFlags::OUT_MEM)
    }

    /// The operand list rendered the way the disassembly view prints it.
    pub fn operands_string(&self) -> String {
        let mut text = String::new();
        for (n, operand) in self.operands.iter().enumerate() {
            let last = n == self.operands.len() - 1;
            text.push(' ');
            text.push_str(&operand.to_string());
            if !last {
                text.push(',');
            }
        }
        text
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.opcode, self.operands_string())
    }
}
