//! Allegrex Opcode Tables
//!
//! A fixed, preloaded table drives decoding: every entry carries the
//! mnemonic, classification flag bits and a formatter that turns a raw word
//! into the operand list. The decoder does a two-stage dispatch:
//!
//! 1. Primary opcode (bits 26-31).
//! 2. For SPECIAL (0) the function field (bits 0-5), for REGIMM (1) the rt
//!    field (bits 16-20), for COP0 (16) the rs field, and for the VFPU
//!    arithmetic groups (24, 25, 60) the sub-operation field (bits 23-25).
//!
//! The table intentionally covers the instructions the control and
//! inspection core needs to reason about (branches, jumps, memory traffic,
//! the stack adjustment idiom, syscalls, a representative VFPU set). A word
//! with no entry is a malformed image or an incomplete table, which the
//! decoder treats as a fatal programming error rather than a recoverable
//! condition.

use bitflags::bitflags;
use smallvec::SmallVec;

use super::decoder::Opcode;
use super::operand::{DataShape, JumpTarget, Operand, Register};

bitflags! {
    /// Classification bits carried by each table entry. The method body
    /// builder and the debugger derive control and data flow facts from
    /// these rather than from per-mnemonic knowledge.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstructionFlags: u32 {
        /// Conditional branch with a relative target.
        const IS_CONDBRANCH = 1 << 0;
        /// Unconditional jump (register or absolute target).
        const IS_JUMP = 1 << 1;
        /// Reads memory.
        const IN_MEM = 1 << 2;
        /// Writes memory.
        const OUT_MEM = 1 << 3;
    }
}

/// Result of an entry's formatting routine.
pub type FormatResult = Option<(Opcode, SmallVec<[Operand; 4]>)>;

/// Formatter: address and raw word in, rendered opcode plus operands out.
pub type FormatFn = fn(address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult;

/// One row of the opcode table.
pub struct InstructionEntry {
    pub name: &'static str,
    pub flags: InstructionFlags,
    pub format: FormatFn,
}

const NONE: InstructionFlags = InstructionFlags::empty();

// Field extraction helpers. Allegrex is a MIPS32 derivative, so the usual
// field layout applies.
fn rs(word: u32) -> u8 {
    ((word >> 21) & 0x1F) as u8
}
fn rt(word: u32) -> u8 {
    ((word >> 16) & 0x1F) as u8
}
fn rd(word: u32) -> u8 {
    ((word >> 11) & 0x1F) as u8
}
fn sa(word: u32) -> u8 {
    ((word >> 6) & 0x1F) as u8
}
fn simm16(word: u32) -> i32 {
    (word & 0xFFFF) as i16 as i32
}
fn uimm16(word: u32) -> i32 {
    (word & 0xFFFF) as i32
}

/// Absolute target of a relative branch: next word plus shifted offset.
fn branch_target(address: u32, word: u32) -> u32 {
    address
        .wrapping_add(4)
        .wrapping_add((simm16(word) << 2) as u32)
}

/// Absolute target of a J-format jump within the current 256 MB segment.
fn jump_target(address: u32, word: u32) -> u32 {
    (address.wrapping_add(4) & 0xF000_0000) | ((word & 0x03FF_FFFF) << 2)
}

/// VFPU size bits (bit 7 and bit 15) to vector data shape.
fn vfpu_vector_shape(word: u32) -> DataShape {
    match ((word >> 15) & 1) << 1 | ((word >> 7) & 1) {
        0 => DataShape::Single,
        1 => DataShape::Pair,
        2 => DataShape::Triple,
        _ => DataShape::Quad,
    }
}

/// VFPU size bits to matrix data shape. A single has no matrix form.
fn vfpu_matrix_shape(word: u32) -> DataShape {
    match ((word >> 15) & 1) << 1 | ((word >> 7) & 1) {
        1 => DataShape::Matrix2x2,
        2 => DataShape::Matrix3x3,
        3 => DataShape::Matrix4x4,
        _ => DataShape::Invalid,
    }
}

fn vfpu_suffix(word: u32) -> &'static str {
    match ((word >> 15) & 1) << 1 | ((word >> 7) & 1) {
        0 => ".s",
        1 => ".p",
        2 => ".t",
        _ => ".q",
    }
}

/// Names for the COP0 registers the kernel side actually touches.
const COP0_NAMES: [&str; 32] = [
    "Index", "Random", "EntryLo0", "EntryLo1", "Context", "PageMask", "Wired", "HWREna",
    "BadVAddr", "Count", "EntryHi", "Compare", "Status", "Cause", "EPC", "PRId", "Config",
    "LLAddr", "WatchLo", "WatchHi", "XContext", "cop0r21", "cop0r22", "Debug", "DEPC", "PerfCnt",
    "ErrCtl", "CacheErr", "TagLo", "TagHi", "ErrorEPC", "DESAVE",
];

// ---------------------------------------------------------------------------
// Formatters
// ---------------------------------------------------------------------------

fn fmt_rtype3(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    // addu/or against $zero are the canonical register move idiom.
    if rt(word) == 0 && (entry.name == "addu" || entry.name == "or") {
        let operands = SmallVec::from_slice(&[
            Operand::Register(Register::gpr(rd(word))),
            Operand::Register(Register::gpr(rs(word))),
        ]);
        return Some((Opcode::with_name(entry, "move"), operands));
    }
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rd(word))),
        Operand::Register(Register::gpr(rs(word))),
        Operand::Register(Register::gpr(rt(word))),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_shift_imm(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    // The all-zero word is the architectural no-op.
    if word == 0 {
        return Some((Opcode::with_name(entry, "nop"), SmallVec::new()));
    }
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rd(word))),
        Operand::Register(Register::gpr(rt(word))),
        Operand::immediate(i32::from(sa(word)), 1),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_shift_reg(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rd(word))),
        Operand::Register(Register::gpr(rt(word))),
        Operand::Register(Register::gpr(rs(word))),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_jr(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[Operand::JumpTarget(JumpTarget::Register(
        Register::gpr(rs(word)),
    ))]);
    Some((Opcode::new(entry), operands))
}

fn fmt_jalr(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let target = Operand::JumpTarget(JumpTarget::Register(Register::gpr(rs(word))));
    let operands = if rd(word) == 31 {
        SmallVec::from_slice(&[target])
    } else {
        SmallVec::from_slice(&[Operand::Register(Register::gpr(rd(word))), target])
    };
    Some((Opcode::new(entry), operands))
}

fn fmt_mf_hilo(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[Operand::Register(Register::gpr(rd(word)))]);
    Some((Opcode::new(entry), operands))
}

fn fmt_mt_hilo(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[Operand::Register(Register::gpr(rs(word)))]);
    Some((Opcode::new(entry), operands))
}

fn fmt_muldiv(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rs(word))),
        Operand::Register(Register::gpr(rt(word))),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_trap(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let code = ((word >> 6) & 0xF_FFFF) as i32;
    let operands = SmallVec::from_slice(&[Operand::immediate(code, 4)]);
    Some((Opcode::new(entry), operands))
}

fn fmt_arith_imm(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    // addiu against $zero is the load-immediate idiom.
    if rs(word) == 0 && entry.name == "addiu" {
        let operands = SmallVec::from_slice(&[
            Operand::Register(Register::gpr(rt(word))),
            Operand::immediate(simm16(word), 2),
        ]);
        return Some((Opcode::with_name(entry, "li"), operands));
    }
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rt(word))),
        Operand::Register(Register::gpr(rs(word))),
        Operand::immediate(simm16(word), 2),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_logic_imm(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    if rs(word) == 0 && entry.name == "ori" {
        let operands = SmallVec::from_slice(&[
            Operand::Register(Register::gpr(rt(word))),
            Operand::immediate(uimm16(word), 2),
        ]);
        return Some((Opcode::with_name(entry, "li"), operands));
    }
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rt(word))),
        Operand::Register(Register::gpr(rs(word))),
        Operand::immediate(uimm16(word), 2),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_lui(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rt(word))),
        Operand::immediate(uimm16(word), 2),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_branch_cmp(address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let target = Operand::BranchTarget(branch_target(address, word));
    // beq $zero, $zero is the unconditional branch idiom.
    if rs(word) == 0 && rt(word) == 0 && entry.name == "beq" {
        return Some((Opcode::with_name(entry, "b"), SmallVec::from_slice(&[target])));
    }
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rs(word))),
        Operand::Register(Register::gpr(rt(word))),
        target,
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_branch_z(address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rs(word))),
        Operand::BranchTarget(branch_target(address, word)),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_jump(address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[Operand::JumpTarget(JumpTarget::Address(jump_target(
        address, word,
    )))]);
    Some((Opcode::new(entry), operands))
}

fn fmt_mem(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rt(word))),
        Operand::MemoryAccess {
            base: Register::gpr(rs(word)),
            offset: simm16(word),
        },
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_cop0_move(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let operands = SmallVec::from_slice(&[
        Operand::Register(Register::gpr(rt(word))),
        Operand::Annotation(COP0_NAMES[rd(word) as usize]),
    ]);
    Some((Opcode::new(entry), operands))
}

fn fmt_vfpu_arith(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let shape = vfpu_vector_shape(word);
    let operands = SmallVec::from_slice(&[
        Operand::VfpuRegister {
            ordinal: (word & 0x7F) as u8,
            shape,
            transposed: false,
        },
        Operand::VfpuRegister {
            ordinal: ((word >> 8) & 0x7F) as u8,
            shape,
            transposed: false,
        },
        Operand::VfpuRegister {
            ordinal: ((word >> 16) & 0x7F) as u8,
            shape,
            transposed: false,
        },
    ]);
    Some((Opcode::with_suffix(entry, vfpu_suffix(word)), operands))
}

fn fmt_vfpu_mmul(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    let shape = vfpu_matrix_shape(word);
    let operands = SmallVec::from_slice(&[
        Operand::VfpuRegister {
            ordinal: (word & 0x7F) as u8,
            shape,
            transposed: false,
        },
        // The hardware multiplies with the left matrix transposed.
        Operand::VfpuRegister {
            ordinal: ((word >> 8) & 0x7F) as u8,
            shape,
            transposed: true,
        },
        Operand::VfpuRegister {
            ordinal: ((word >> 16) & 0x7F) as u8,
            shape,
            transposed: false,
        },
    ]);
    Some((Opcode::with_suffix(entry, vfpu_suffix(word)), operands))
}

fn fmt_vfpu_mem(_address: u32, word: u32, entry: &'static InstructionEntry) -> FormatResult {
    // vt's two high bits live in the low bits of the word; the offset field
    // is a signed multiple of four bytes.
    let vt = (((word >> 16) & 0x1F) | ((word & 3) << 5)) as u8;
    let operands = SmallVec::from_slice(&[
        Operand::VfpuRegister {
            ordinal: vt,
            shape: DataShape::Quad,
            transposed: false,
        },
        Operand::MemoryAccess {
            base: Register::gpr(rs(word)),
            offset: (word & 0xFFFC) as i16 as i32,
        },
    ]);
    Some((Opcode::new(entry), operands))
}

// ---------------------------------------------------------------------------
// Table rows
// ---------------------------------------------------------------------------

macro_rules! entry {
    ($ident:ident, $name:literal, $flags:expr, $format:ident) => {
        static $ident: InstructionEntry = InstructionEntry {
            name: $name,
            flags: $flags,
            format: $format,
        };
    };
}

// SPECIAL (primary opcode 0), keyed by the function field.
entry!(SLL, "sll", NONE, fmt_shift_imm);
entry!(SRL, "srl", NONE, fmt_shift_imm);
entry!(SRA, "sra", NONE, fmt_shift_imm);
entry!(SLLV, "sllv", NONE, fmt_shift_reg);
entry!(SRLV, "srlv", NONE, fmt_shift_reg);
entry!(SRAV, "srav", NONE, fmt_shift_reg);
entry!(JR, "jr", InstructionFlags::IS_JUMP, fmt_jr);
entry!(JALR, "jalr", InstructionFlags::IS_JUMP, fmt_jalr);
entry!(SYSCALL, "syscall", NONE, fmt_trap);
entry!(BREAK, "break", NONE, fmt_trap);
entry!(MFHI, "mfhi", NONE, fmt_mf_hilo);
entry!(MTHI, "mthi", NONE, fmt_mt_hilo);
entry!(MFLO, "mflo", NONE, fmt_mf_hilo);
entry!(MTLO, "mtlo", NONE, fmt_mt_hilo);
entry!(MULT, "mult", NONE, fmt_muldiv);
entry!(MULTU, "multu", NONE, fmt_muldiv);
entry!(DIV, "div", NONE, fmt_muldiv);
entry!(DIVU, "divu", NONE, fmt_muldiv);
entry!(ADDU, "addu", NONE, fmt_rtype3);
entry!(SUBU, "subu", NONE, fmt_rtype3);
entry!(AND, "and", NONE, fmt_rtype3);
entry!(OR, "or", NONE, fmt_rtype3);
entry!(XOR, "xor", NONE, fmt_rtype3);
entry!(NOR, "nor", NONE, fmt_rtype3);
entry!(SLT, "slt", NONE, fmt_rtype3);
entry!(SLTU, "sltu", NONE, fmt_rtype3);

// REGIMM (primary opcode 1), keyed by the rt field.
entry!(BLTZ, "bltz", InstructionFlags::IS_CONDBRANCH, fmt_branch_z);
entry!(BGEZ, "bgez", InstructionFlags::IS_CONDBRANCH, fmt_branch_z);
entry!(BLTZAL, "bltzal", InstructionFlags::IS_CONDBRANCH, fmt_branch_z);
entry!(BGEZAL, "bgezal", InstructionFlags::IS_CONDBRANCH, fmt_branch_z);

// Primary opcodes.
entry!(J, "j", InstructionFlags::IS_JUMP, fmt_jump);
entry!(JAL, "jal", InstructionFlags::IS_JUMP, fmt_jump);
entry!(BEQ, "beq", InstructionFlags::IS_CONDBRANCH, fmt_branch_cmp);
entry!(BNE, "bne", InstructionFlags::IS_CONDBRANCH, fmt_branch_cmp);
entry!(BLEZ, "blez", InstructionFlags::IS_CONDBRANCH, fmt_branch_z);
entry!(BGTZ, "bgtz", InstructionFlags::IS_CONDBRANCH, fmt_branch_z);
entry!(ADDI, "addi", NONE, fmt_arith_imm);
entry!(ADDIU, "addiu", NONE, fmt_arith_imm);
entry!(SLTI, "slti", NONE, fmt_arith_imm);
entry!(SLTIU, "sltiu", NONE, fmt_arith_imm);
entry!(ANDI, "andi", NONE, fmt_logic_imm);
entry!(ORI, "ori", NONE, fmt_logic_imm);
entry!(XORI, "xori", NONE, fmt_logic_imm);
entry!(LUI, "lui", NONE, fmt_lui);
entry!(MFC0, "mfc0", NONE, fmt_cop0_move);
entry!(MTC0, "mtc0", NONE, fmt_cop0_move);
entry!(LB, "lb", InstructionFlags::IN_MEM, fmt_mem);
entry!(LH, "lh", InstructionFlags::IN_MEM, fmt_mem);
entry!(LW, "lw", InstructionFlags::IN_MEM, fmt_mem);
entry!(LBU, "lbu", InstructionFlags::IN_MEM, fmt_mem);
entry!(LHU, "lhu", InstructionFlags::IN_MEM, fmt_mem);
entry!(SB, "sb", InstructionFlags::OUT_MEM, fmt_mem);
entry!(SH, "sh", InstructionFlags::OUT_MEM, fmt_mem);
entry!(SW, "sw", InstructionFlags::OUT_MEM, fmt_mem);

// VFPU arithmetic (primary opcodes 24 and 25), keyed by bits 23-25.
entry!(VADD, "vadd", NONE, fmt_vfpu_arith);
entry!(VSUB, "vsub", NONE, fmt_vfpu_arith);
entry!(VDIV, "vdiv", NONE, fmt_vfpu_arith);
entry!(VMUL, "vmul", NONE, fmt_vfpu_arith);
entry!(VDOT, "vdot", NONE, fmt_vfpu_arith);

// VFPU matrix group (primary opcode 60).
entry!(VMMUL, "vmmul", NONE, fmt_vfpu_mmul);

// VFPU quad load/store (primary opcodes 54 and 62).
entry!(LV_Q, "lv.q", InstructionFlags::IN_MEM, fmt_vfpu_mem);
entry!(SV_Q, "sv.q", InstructionFlags::OUT_MEM, fmt_vfpu_mem);

/// Find the table entry for a raw instruction word, if one exists.
pub fn lookup(word: u32) -> Option<&'static InstructionEntry> {
    match word >> 26 {
        // SPECIAL: dispatch on the function field.
        0 => match word & 0x3F {
            0 => Some(&SLL),
            2 => Some(&SRL),
            3 => Some(&SRA),
            4 => Some(&SLLV),
            6 => Some(&SRLV),
            7 => Some(&SRAV),
            8 => Some(&JR),
            9 => Some(&JALR),
            12 => Some(&SYSCALL),
            13 => Some(&BREAK),
            16 => Some(&MFHI),
            17 => Some(&MTHI),
            18 => Some(&MFLO),
            19 => Some(&MTLO),
            24 => Some(&MULT),
            25 => Some(&MULTU),
            26 => Some(&DIV),
            27 => Some(&DIVU),
            33 => Some(&ADDU),
            35 => Some(&SUBU),
            36 => Some(&AND),
            37 => Some(&OR),
            38 => Some(&XOR),
            39 => Some(&NOR),
            42 => Some(&SLT),
            43 => Some(&SLTU),
            _ => None,
        },
        // REGIMM: dispatch on the rt field.
        1 => match (word >> 16) & 0x1F {
            0 => Some(&BLTZ),
            1 => Some(&BGEZ),
            16 => Some(&BLTZAL),
            17 => Some(&BGEZAL),
            _ => None,
        },
        2 => Some(&J),
        3 => Some(&JAL),
        4 => Some(&BEQ),
        5 => Some(&BNE),
        6 => Some(&BLEZ),
        7 => Some(&BGTZ),
        8 => Some(&ADDI),
        9 => Some(&ADDIU),
        10 => Some(&SLTI),
        11 => Some(&SLTIU),
        12 => Some(&ANDI),
        13 => Some(&ORI),
        14 => Some(&XORI),
        15 => Some(&LUI),
        // COP0: dispatch on the rs field.
        16 => match (word >> 21) & 0x1F {
            0 => Some(&MFC0),
            4 => Some(&MTC0),
            _ => None,
        },
        // VFPU0/VFPU1: dispatch on the sub-operation field.
        24 => match (word >> 23) & 7 {
            0 => Some(&VADD),
            1 => Some(&VSUB),
            7 => Some(&VDIV),
            _ => None,
        },
        25 => match (word >> 23) & 7 {
            0 => Some(&VMUL),
            1 => Some(&VDOT),
            _ => None,
        },
        32 => Some(&LB),
        33 => Some(&LH),
        35 => Some(&LW),
        36 => Some(&LBU),
        37 => Some(&LHU),
        40 => Some(&SB),
        41 => Some(&SH),
        43 => Some(&SW),
        54 => Some(&LV_Q),
        // VFPU matrix group.
        60 => match (word >> 23) & 7 {
            0 => Some(&VMMUL),
            _ => None,
        },
        62 => Some(&SV_Q),
        _ => None,
    }
}
