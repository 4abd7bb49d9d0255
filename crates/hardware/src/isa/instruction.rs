//! The `Instruction` type and its execute semantics.
//!
//! An `Instruction` carries the raw 32-bit encoding, its format, the fetch
//! pc, and the branch prediction made at fetch time. Fields (`rd`, `rs1`,
//! `rs2`, immediate) are extracted on demand and are format-aware: a format
//! that lacks a field yields register 0 / immediate 0, so downstream logic
//! never renames or waits on garbage bits.

use std::fmt;

use super::abi::XREG_NAMES;
use super::opcodes::{extra, major, rv32i, rv32m, MaskedLiteral};

/// RISC-V instruction formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrFormat {
    /// Register-register.
    R,
    /// Register-immediate, loads, JALR.
    I,
    /// Stores.
    S,
    /// Conditional branches.
    B,
    /// JAL.
    J,
    /// LUI / AUIPC.
    U,
}

/// Functional-unit classes an instruction dispatches to.
///
/// `None` covers the EXIT sentinel and any encoding that consumes an ROB
/// slot but no functional unit (FENCE-class and unrecognized encodings).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuType {
    /// Integer ALU.
    Alu,
    /// Branch unit.
    Bru,
    /// Load/store unit.
    Lsu,
    /// Multiplier.
    Mul,
    /// Divider.
    Div,
    /// No functional unit.
    None,
}

/// Branch prediction attached to an instruction at fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BranchPredictBundle {
    /// Whether the frontend predicted a taken control transfer.
    pub taken: bool,
    /// The predicted target, meaningful only when `taken`.
    pub target: u32,
}

/// Outcome of executing an instruction on a functional unit.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecuteResult {
    /// The prediction made at fetch disagrees with the actual outcome.
    pub mispredict: bool,
    /// Actual branch direction (always true for JAL/JALR).
    pub actual_taken: bool,
    /// ALU result, link address, or effective address for memory ops.
    pub result: u32,
    /// Resolved control-transfer target.
    pub jump_target: u32,
}

/// A fetched instruction travelling through the pipeline.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// Raw 32-bit encoding.
    pub raw: u32,
    /// Decoded format.
    pub format: InstrFormat,
    /// Fetch program counter.
    pub pc: u32,
    /// Branch prediction made at fetch.
    pub predict: BranchPredictBundle,
}

impl PartialEq<MaskedLiteral> for Instruction {
    fn eq(&self, lit: &MaskedLiteral) -> bool {
        lit.matches(self.raw)
    }
}

impl Instruction {
    /// Wraps a raw encoding fetched at `pc`.
    pub fn new(raw: u32, pc: u32, predict: BranchPredictBundle) -> Self {
        Self {
            raw,
            format: format_of(raw),
            pc,
            predict,
        }
    }

    /// A canonical NOP (`addi x0, x0, 0`).
    pub fn nop() -> Self {
        Self::new(0x13, 0, BranchPredictBundle::default())
    }

    /// Destination register, or 0 for formats without one.
    pub fn rd(&self) -> usize {
        match self.format {
            InstrFormat::S | InstrFormat::B => 0,
            _ => ((self.raw >> 7) & 0x1F) as usize,
        }
    }

    /// First source register, or 0 for formats without one.
    pub fn rs1(&self) -> usize {
        match self.format {
            InstrFormat::U | InstrFormat::J => 0,
            _ => ((self.raw >> 15) & 0x1F) as usize,
        }
    }

    /// Second source register, or 0 for formats without one.
    pub fn rs2(&self) -> usize {
        match self.format {
            InstrFormat::R | InstrFormat::S | InstrFormat::B => {
                ((self.raw >> 20) & 0x1F) as usize
            }
            _ => 0,
        }
    }

    /// Sign-extended immediate for the instruction's format.
    pub fn imm(&self) -> u32 {
        let raw = self.raw;
        match self.format {
            InstrFormat::R => 0,
            InstrFormat::I => ((raw as i32) >> 20) as u32,
            InstrFormat::S => {
                let imm = ((raw >> 25) << 5) | ((raw >> 7) & 0x1F);
                sign_extend(imm, 12)
            }
            InstrFormat::B => {
                let imm = (((raw >> 31) & 0x1) << 12)
                    | (((raw >> 7) & 0x1) << 11)
                    | (((raw >> 25) & 0x3F) << 5)
                    | (((raw >> 8) & 0xF) << 1);
                sign_extend(imm, 13)
            }
            InstrFormat::U => raw & 0xFFFF_F000,
            InstrFormat::J => {
                let imm = (((raw >> 31) & 0x1) << 20)
                    | (((raw >> 12) & 0xFF) << 12)
                    | (((raw >> 20) & 0x1) << 11)
                    | (((raw >> 21) & 0x3FF) << 1);
                sign_extend(imm, 21)
            }
        }
    }

    /// True for LB/LH/LW/LBU/LHU.
    pub fn is_load(&self) -> bool {
        self.raw & 0x7F == major::LOAD
    }

    /// True for SB/SH/SW.
    pub fn is_store(&self) -> bool {
        self.raw & 0x7F == major::STORE
    }

    /// Classifies the instruction into its functional-unit class.
    pub fn fu_type(&self) -> FuType {
        if *self == extra::EXIT {
            return FuType::None;
        }
        match self.raw & 0x7F {
            major::LOAD | major::STORE => FuType::Lsu,
            major::BRANCH | major::JAL | major::JALR => FuType::Bru,
            major::LUI | major::AUIPC | major::OP_IMM => FuType::Alu,
            major::OP => {
                if (self.raw >> 25) & 0x7F == rv32m::FUNCT7_MULDIV {
                    if (self.raw >> 12) & 0x4 == 0 {
                        FuType::Mul
                    } else {
                        FuType::Div
                    }
                } else {
                    FuType::Alu
                }
            }
            _ => FuType::None,
        }
    }

    /// Executes the instruction on the given functional unit with captured
    /// operands, producing the result bundle the ROB records.
    ///
    /// For the LSU class the result is the effective address; the memory
    /// access itself happens in the execute pipeline. Calling this with
    /// `FuType::None` is a contract violation.
    pub fn execute(&self, unit: FuType, op1: u32, op2: u32) -> ExecuteResult {
        match unit {
            FuType::Alu => ExecuteResult {
                result: self.execute_alu(op1, op2),
                ..ExecuteResult::default()
            },
            FuType::Mul => ExecuteResult {
                result: self.execute_mul(op1, op2),
                ..ExecuteResult::default()
            },
            FuType::Div => ExecuteResult {
                result: self.execute_div(op1, op2),
                ..ExecuteResult::default()
            },
            FuType::Lsu => ExecuteResult {
                result: op1.wrapping_add(self.imm()),
                ..ExecuteResult::default()
            },
            FuType::Bru => self.execute_bru(op1, op2),
            FuType::None => panic!("FuType::None has no execute semantics: {self}"),
        }
    }

    fn execute_alu(&self, op1: u32, op2: u32) -> u32 {
        let imm = self.imm();
        if *self == rv32i::LUI {
            imm
        } else if *self == rv32i::AUIPC {
            self.pc.wrapping_add(imm)
        } else if *self == rv32i::ADDI {
            op1.wrapping_add(imm)
        } else if *self == rv32i::SLTI {
            u32::from((op1 as i32) < (imm as i32))
        } else if *self == rv32i::SLTIU {
            u32::from(op1 < imm)
        } else if *self == rv32i::XORI {
            op1 ^ imm
        } else if *self == rv32i::ORI {
            op1 | imm
        } else if *self == rv32i::ANDI {
            op1 & imm
        } else if *self == rv32i::SLLI {
            op1 << (imm & 0x1F)
        } else if *self == rv32i::SRLI {
            op1 >> (imm & 0x1F)
        } else if *self == rv32i::SRAI {
            ((op1 as i32) >> (imm & 0x1F)) as u32
        } else if *self == rv32i::ADD {
            op1.wrapping_add(op2)
        } else if *self == rv32i::SUB {
            op1.wrapping_sub(op2)
        } else if *self == rv32i::SLL {
            op1 << (op2 & 0x1F)
        } else if *self == rv32i::SLT {
            u32::from((op1 as i32) < (op2 as i32))
        } else if *self == rv32i::SLTU {
            u32::from(op1 < op2)
        } else if *self == rv32i::XOR {
            op1 ^ op2
        } else if *self == rv32i::SRL {
            op1 >> (op2 & 0x1F)
        } else if *self == rv32i::SRA {
            ((op1 as i32) >> (op2 & 0x1F)) as u32
        } else if *self == rv32i::OR {
            op1 | op2
        } else if *self == rv32i::AND {
            op1 & op2
        } else {
            panic!("unknown ALU instruction: {self}")
        }
    }

    fn execute_mul(&self, op1: u32, op2: u32) -> u32 {
        if *self == rv32m::MUL {
            op1.wrapping_mul(op2)
        } else if *self == rv32m::MULH {
            ((i64::from(op1 as i32) * i64::from(op2 as i32)) >> 32) as u32
        } else if *self == rv32m::MULHSU {
            ((i64::from(op1 as i32) * i64::from(op2)) >> 32) as u32
        } else if *self == rv32m::MULHU {
            ((u64::from(op1) * u64::from(op2)) >> 32) as u32
        } else {
            panic!("unknown MUL instruction: {self}")
        }
    }

    fn execute_div(&self, op1: u32, op2: u32) -> u32 {
        let (lhs, rhs) = (op1 as i32, op2 as i32);
        if *self == rv32m::DIV {
            if rhs == 0 {
                u32::MAX
            } else if lhs == i32::MIN && rhs == -1 {
                op1
            } else {
                (lhs / rhs) as u32
            }
        } else if *self == rv32m::DIVU {
            if op2 == 0 {
                u32::MAX
            } else {
                op1 / op2
            }
        } else if *self == rv32m::REM {
            if rhs == 0 {
                op1
            } else if lhs == i32::MIN && rhs == -1 {
                0
            } else {
                (lhs % rhs) as u32
            }
        } else if *self == rv32m::REMU {
            if op2 == 0 {
                op1
            } else {
                op1 % op2
            }
        } else {
            panic!("unknown DIV instruction: {self}")
        }
    }

    fn execute_bru(&self, op1: u32, op2: u32) -> ExecuteResult {
        let (lhs, rhs) = (op1 as i32, op2 as i32);
        if *self == rv32i::JAL {
            return self.resolve_jump(self.pc.wrapping_add(self.imm()));
        }
        if *self == rv32i::JALR {
            return self.resolve_jump(op1.wrapping_add(self.imm()) & !1);
        }
        let taken = if *self == rv32i::BEQ {
            op1 == op2
        } else if *self == rv32i::BNE {
            op1 != op2
        } else if *self == rv32i::BLT {
            lhs < rhs
        } else if *self == rv32i::BGE {
            lhs >= rhs
        } else if *self == rv32i::BLTU {
            op1 < op2
        } else if *self == rv32i::BGEU {
            op1 >= op2
        } else {
            panic!("unknown BRU instruction: {self}")
        };
        let target = self.pc.wrapping_add(self.imm());
        ExecuteResult {
            mispredict: taken != self.predict.taken
                || (taken && self.predict.target != target),
            actual_taken: taken,
            result: 0,
            jump_target: target,
        }
    }

    /// Resolves an unconditional jump: the link address is the result, and
    /// the fetch-time prediction must have both hit and named this target.
    fn resolve_jump(&self, target: u32) -> ExecuteResult {
        ExecuteResult {
            mispredict: !(self.predict.taken && self.predict.target == target),
            actual_taken: true,
            result: self.pc.wrapping_add(4),
            jump_target: target,
        }
    }
}

/// Decodes the instruction format from the major opcode field.
fn format_of(raw: u32) -> InstrFormat {
    match raw & 0x7F {
        major::LUI | major::AUIPC => InstrFormat::U,
        major::JAL => InstrFormat::J,
        major::BRANCH => InstrFormat::B,
        major::STORE => InstrFormat::S,
        major::OP => InstrFormat::R,
        // JALR, loads, OP-IMM, and everything unrecognized (EXIT, FENCE,
        // SYSTEM) read naturally as I-format.
        _ => InstrFormat::I,
    }
}

/// Sign-extends the low `bits` bits of `value`.
fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as u32
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rd = XREG_NAMES[self.rd()];
        let rs1 = XREG_NAMES[self.rs1()];
        let rs2 = XREG_NAMES[self.rs2()];
        let imm = self.imm() as i32;
        let mnemonic = mnemonic_of(self);
        match (self.format, self.fu_type()) {
            _ if *self == extra::EXIT => write!(f, "exit"),
            (InstrFormat::U, _) => write!(f, "{mnemonic} {rd}, {:#x}", self.imm() >> 12),
            (InstrFormat::J, _) => write!(f, "{mnemonic} {rd}, {imm}"),
            (InstrFormat::B, _) => write!(f, "{mnemonic} {rs1}, {rs2}, {imm}"),
            (InstrFormat::S, _) => write!(f, "{mnemonic} {rs2}, {imm}({rs1})"),
            (InstrFormat::I, FuType::Lsu) => write!(f, "{mnemonic} {rd}, {imm}({rs1})"),
            (InstrFormat::I, _) => write!(f, "{mnemonic} {rd}, {rs1}, {imm}"),
            (InstrFormat::R, _) => write!(f, "{mnemonic} {rd}, {rs1}, {rs2}"),
        }
    }
}

/// Mnemonic lookup for diagnostics; unknown encodings render as raw hex.
fn mnemonic_of(inst: &Instruction) -> String {
    const TABLE: &[(MaskedLiteral, &str)] = &[
        (rv32i::LUI, "lui"),
        (rv32i::AUIPC, "auipc"),
        (rv32i::JAL, "jal"),
        (rv32i::JALR, "jalr"),
        (rv32i::BEQ, "beq"),
        (rv32i::BNE, "bne"),
        (rv32i::BLT, "blt"),
        (rv32i::BGE, "bge"),
        (rv32i::BLTU, "bltu"),
        (rv32i::BGEU, "bgeu"),
        (rv32i::LB, "lb"),
        (rv32i::LH, "lh"),
        (rv32i::LW, "lw"),
        (rv32i::LBU, "lbu"),
        (rv32i::LHU, "lhu"),
        (rv32i::SB, "sb"),
        (rv32i::SH, "sh"),
        (rv32i::SW, "sw"),
        (rv32i::SLLI, "slli"),
        (rv32i::SRLI, "srli"),
        (rv32i::SRAI, "srai"),
        (rv32i::ADDI, "addi"),
        (rv32i::SLTI, "slti"),
        (rv32i::SLTIU, "sltiu"),
        (rv32i::XORI, "xori"),
        (rv32i::ORI, "ori"),
        (rv32i::ANDI, "andi"),
        (rv32i::ADD, "add"),
        (rv32i::SUB, "sub"),
        (rv32i::SLL, "sll"),
        (rv32i::SLT, "slt"),
        (rv32i::SLTU, "sltu"),
        (rv32i::XOR, "xor"),
        (rv32i::SRL, "srl"),
        (rv32i::SRA, "sra"),
        (rv32i::OR, "or"),
        (rv32i::AND, "and"),
        (rv32m::MUL, "mul"),
        (rv32m::MULH, "mulh"),
        (rv32m::MULHSU, "mulhsu"),
        (rv32m::MULHU, "mulhu"),
        (rv32m::DIV, "div"),
        (rv32m::DIVU, "divu"),
        (rv32m::REM, "rem"),
        (rv32m::REMU, "remu"),
    ];
    for (lit, name) in TABLE {
        if lit.matches(inst.raw) {
            return (*name).to_string();
        }
    }
    format!("0x{:08x}", inst.raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(raw: u32) -> Instruction {
        Instruction::new(raw, 0x8000_0000, BranchPredictBundle::default())
    }

    #[test]
    fn field_extraction_is_format_aware() {
        // sw x5, 8(x10) — S-format: no rd.
        let sw = inst(0x0055_2423);
        assert_eq!(sw.rd(), 0);
        assert_eq!(sw.rs1(), 10);
        assert_eq!(sw.rs2(), 5);
        assert_eq!(sw.imm(), 8);

        // lui x7, 0x80400 — U-format: no rs1/rs2, even though the raw bits
        // under those fields are nonzero.
        let lui = inst(0x8040_03B7);
        assert_eq!(lui.rd(), 7);
        assert_eq!(lui.rs1(), 0);
        assert_eq!(lui.rs2(), 0);
        assert_eq!(lui.imm(), 0x8040_0000);
    }

    #[test]
    fn negative_immediates_sign_extend() {
        // addi x1, x0, -1
        let addi = inst(0xFFF0_0093);
        assert_eq!(addi.imm(), 0xFFFF_FFFF);
        // jal x0, -16
        let jal = inst(0xFF1F_F06F);
        assert_eq!(jal.imm() as i32, -16);
    }

    #[test]
    fn fu_classification() {
        assert_eq!(inst(0x0000_0033).fu_type(), FuType::Alu); // add
        assert_eq!(inst(0x0200_0033).fu_type(), FuType::Mul); // mul
        assert_eq!(inst(0x0200_4033).fu_type(), FuType::Div); // div
        assert_eq!(inst(0x0000_0003).fu_type(), FuType::Lsu); // lb
        assert_eq!(inst(0x0000_0063).fu_type(), FuType::Bru); // beq
        assert_eq!(inst(0x0000_000b).fu_type(), FuType::None); // exit
        assert_eq!(inst(0x0000_000F).fu_type(), FuType::None); // fence
    }

    #[test]
    fn alu_basics() {
        let add = inst(0x0000_0033);
        assert_eq!(add.execute(FuType::Alu, 5, 7).result, 12);
        let sub = inst(0x4000_0033);
        assert_eq!(sub.execute(FuType::Alu, 5, 7).result, 0xFFFF_FFFE);
        let sra = inst(0x4000_5033);
        assert_eq!(sra.execute(FuType::Alu, 0x8000_0000, 4).result, 0xF800_0000);
    }

    #[test]
    fn division_edge_cases() {
        let div = inst(0x0200_4033);
        let rem = inst(0x0200_6033);
        let divu = inst(0x0200_5033);
        let remu = inst(0x0200_7033);
        // Divide by zero.
        assert_eq!(div.execute(FuType::Div, 42, 0).result, u32::MAX);
        assert_eq!(divu.execute(FuType::Div, 42, 0).result, u32::MAX);
        assert_eq!(rem.execute(FuType::Div, 42, 0).result, 42);
        assert_eq!(remu.execute(FuType::Div, 42, 0).result, 42);
        // Signed overflow.
        let min = i32::MIN as u32;
        assert_eq!(div.execute(FuType::Div, min, u32::MAX).result, min);
        assert_eq!(rem.execute(FuType::Div, min, u32::MAX).result, 0);
    }

    #[test]
    fn mulh_variants() {
        let mulh = inst(0x0200_1033);
        let mulhu = inst(0x0200_3033);
        assert_eq!(
            mulh.execute(FuType::Mul, 0xFFFF_FFFF, 0xFFFF_FFFF).result,
            0 // (-1) * (-1) = 1, high word 0
        );
        assert_eq!(
            mulhu.execute(FuType::Mul, 0xFFFF_FFFF, 0xFFFF_FFFF).result,
            0xFFFF_FFFE
        );
    }

    #[test]
    fn taken_branch_without_prediction_mispredicts() {
        // beq x1, x2, +8 at pc 0x80000000
        let beq = inst(0x0020_8463);
        let res = beq.execute(FuType::Bru, 3, 3);
        assert!(res.actual_taken);
        assert!(res.mispredict);
        assert_eq!(res.jump_target, 0x8000_0008);

        let res = beq.execute(FuType::Bru, 3, 4);
        assert!(!res.actual_taken);
        assert!(!res.mispredict);
    }

    #[test]
    fn predicted_branch_commits_clean() {
        let mut beq = inst(0x0020_8463);
        beq.predict = BranchPredictBundle {
            taken: true,
            target: 0x8000_0008,
        };
        let res = beq.execute(FuType::Bru, 1, 1);
        assert!(!res.mispredict);
        // Correct direction, wrong target still mispredicts.
        beq.predict.target = 0x8000_0004;
        assert!(beq.execute(FuType::Bru, 1, 1).mispredict);
        // Predicted taken but actually not taken mispredicts.
        assert!(beq.execute(FuType::Bru, 1, 2).mispredict);
    }

    #[test]
    fn jal_links_and_targets() {
        // jal x1, +16
        let jal = inst(0x0100_00EF);
        let res = jal.execute(FuType::Bru, 0, 0);
        assert!(res.mispredict);
        assert!(res.actual_taken);
        assert_eq!(res.result, 0x8000_0004);
        assert_eq!(res.jump_target, 0x8000_0010);
    }

    #[test]
    fn lsu_computes_effective_address() {
        // lw x2, 4(x10)
        let lw = inst(0x0045_2103);
        assert_eq!(lw.execute(FuType::Lsu, 0x8040_0000, 0).result, 0x8040_0004);
        // sw x2, -4(x10)
        let sw = inst(0xFE25_2E23);
        assert_eq!(sw.execute(FuType::Lsu, 0x8040_0010, 0).result, 0x8040_000C);
    }

    #[test]
    fn display_renders_mnemonics() {
        assert_eq!(inst(0x0055_2423).to_string(), "sw t0, 8(a0)");
        assert_eq!(inst(0x0000_000b).to_string(), "exit");
    }
}
