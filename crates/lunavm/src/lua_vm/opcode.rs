/*----------------------------------------------------------------------
  Lua 5.1 instruction codec

  Instruction format (32-bit):
  - iABC:  [B(9) | C(9) | A(8) | Op(6)]
  - iABx:  [Bx(18)      | A(8) | Op(6)]
  - iAsBx: [sBx(18)     | A(8) | Op(6)]   sBx is Bx biased by 131071

  An RK operand selects a constant when bit 8 is set (value >= 256,
  constant index value - 256) and a register otherwise.
----------------------------------------------------------------------*/

/// Instruction format modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    IABC,
    IABx,
    IAsBx,
}

/// Argument modes (OpArgMask in lopcodes.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArg {
    /// Argument is not used
    NotUsed,
    /// Argument is used as a plain value
    Used,
    /// Argument is a register or a jump offset
    Register,
    /// Argument is a constant index or an RK operand
    RegConst,
}

/// The complete Lua 5.1 opcode set (38 opcodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,  // R[A] := R[B]
    LoadK,     // R[A] := K[Bx]
    LoadBool,  // R[A] := (bool)B; if C, pc++
    LoadNil,   // R[A..=B] := nil
    GetUpval,  // R[A] := UpValue[B]
    GetGlobal, // R[A] := Gbl[K[Bx]]
    GetTable,  // R[A] := R[B][RK(C)]
    SetGlobal, // Gbl[K[Bx]] := R[A]
    SetUpval,  // UpValue[B] := R[A]
    SetTable,  // R[A][RK(B)] := RK(C)
    NewTable,  // R[A] := {} (array hint B, hash hint C)
    Self_,     // R[A+1] := R[B]; R[A] := R[B][RK(C)]
    Add,       // R[A] := RK(B) + RK(C)
    Sub,       // R[A] := RK(B) - RK(C)
    Mul,       // R[A] := RK(B) * RK(C)
    Div,       // R[A] := RK(B) / RK(C)
    Mod,       // R[A] := RK(B) % RK(C)
    Pow,       // R[A] := RK(B) ^ RK(C)
    Unm,       // R[A] := -R[B]
    Not,       // R[A] := not R[B]
    Len,       // R[A] := #R[B]
    Concat,    // R[A] := R[B] .. ... .. R[C]
    Jmp,       // pc += sBx
    Eq,        // if (RK(B) == RK(C)) != A then pc++
    Lt,        // if (RK(B) <  RK(C)) != A then pc++
    Le,        // if (RK(B) <= RK(C)) != A then pc++
    Test,      // if (bool)R[A] != C then pc++
    TestSet,   // if (bool)R[B] == C then R[A] := R[B] else pc++
    Call,      // R[A..A+C-2] := R[A](R[A+1..A+B-1])
    TailCall,  // return R[A](R[A+1..A+B-1])
    Return,    // return R[A..A+B-2]
    ForLoop,   // R[A] += R[A+2]; if in range then pc += sBx, R[A+3] := R[A]
    ForPrep,   // R[A] -= R[A+2]; pc += sBx
    TForLoop,  // R[A+3..A+2+C] := R[A](R[A+1], R[A+2]); loop while R[A+3] != nil
    SetList,   // R[A][(C-1)*50 + i] := R[A+i], 1 <= i <= B
    Close,     // close upvalues for registers >= A
    Closure,   // R[A] := closure(Proto[Bx]); consumes nups pseudo-instructions
    Vararg,    // R[A..A+B-2] := vararg
}

/// Number of opcodes in the instruction set
pub const NUM_OPCODES: usize = 38;

const OPCODES: [OpCode; NUM_OPCODES] = [
    OpCode::Move,
    OpCode::LoadK,
    OpCode::LoadBool,
    OpCode::LoadNil,
    OpCode::GetUpval,
    OpCode::GetGlobal,
    OpCode::GetTable,
    OpCode::SetGlobal,
    OpCode::SetUpval,
    OpCode::SetTable,
    OpCode::NewTable,
    OpCode::Self_,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::Pow,
    OpCode::Unm,
    OpCode::Not,
    OpCode::Len,
    OpCode::Concat,
    OpCode::Jmp,
    OpCode::Eq,
    OpCode::Lt,
    OpCode::Le,
    OpCode::Test,
    OpCode::TestSet,
    OpCode::Call,
    OpCode::TailCall,
    OpCode::Return,
    OpCode::ForLoop,
    OpCode::ForPrep,
    OpCode::TForLoop,
    OpCode::SetList,
    OpCode::Close,
    OpCode::Closure,
    OpCode::Vararg,
];

/// Static description of one opcode (luaP_opmodes / luaP_opnames)
pub struct OpInfo {
    pub name: &'static str,
    /// Operator is a test: the next instruction must be a jump
    pub is_test: bool,
    /// Instruction writes register A
    pub sets_a: bool,
    pub arg_b: OpArg,
    pub arg_c: OpArg,
    pub mode: OpMode,
}

const fn op(
    name: &'static str,
    is_test: bool,
    sets_a: bool,
    arg_b: OpArg,
    arg_c: OpArg,
    mode: OpMode,
) -> OpInfo {
    OpInfo {
        name,
        is_test,
        sets_a,
        arg_b,
        arg_c,
        mode,
    }
}

use OpArg::{NotUsed, RegConst, Register, Used};
use OpMode::{IABC, IABx, IAsBx};

/// Per-opcode argument description, indexed by opcode number
pub static OP_INFO: [OpInfo; NUM_OPCODES] = [
    op("MOVE", false, true, Register, NotUsed, IABC),
    op("LOADK", false, true, RegConst, NotUsed, IABx),
    op("LOADBOOL", false, true, Used, Used, IABC),
    op("LOADNIL", false, true, Used, NotUsed, IABC),
    op("GETUPVAL", false, true, Used, NotUsed, IABC),
    op("GETGLOBAL", false, true, RegConst, NotUsed, IABx),
    op("GETTABLE", false, true, Register, RegConst, IABC),
    op("SETGLOBAL", false, false, RegConst, NotUsed, IABx),
    op("SETUPVAL", false, false, Used, NotUsed, IABC),
    op("SETTABLE", false, false, RegConst, RegConst, IABC),
    op("NEWTABLE", false, true, Used, Used, IABC),
    op("SELF", false, true, Register, RegConst, IABC),
    op("ADD", false, true, RegConst, RegConst, IABC),
    op("SUB", false, true, RegConst, RegConst, IABC),
    op("MUL", false, true, RegConst, RegConst, IABC),
    op("DIV", false, true, RegConst, RegConst, IABC),
    op("MOD", false, true, RegConst, RegConst, IABC),
    op("POW", false, true, RegConst, RegConst, IABC),
    op("UNM", false, true, Register, NotUsed, IABC),
    op("NOT", false, true, Register, NotUsed, IABC),
    op("LEN", false, true, Register, NotUsed, IABC),
    op("CONCAT", false, true, Register, Register, IABC),
    op("JMP", false, false, Register, NotUsed, IAsBx),
    op("EQ", true, false, RegConst, RegConst, IABC),
    op("LT", true, false, RegConst, RegConst, IABC),
    op("LE", true, false, RegConst, RegConst, IABC),
    op("TEST", true, false, NotUsed, Used, IABC),
    op("TESTSET", true, true, Register, Used, IABC),
    op("CALL", false, true, Used, Used, IABC),
    op("TAILCALL", false, true, Used, Used, IABC),
    op("RETURN", false, false, Used, NotUsed, IABC),
    op("FORLOOP", false, true, Register, NotUsed, IAsBx),
    op("FORPREP", false, true, Register, NotUsed, IAsBx),
    op("TFORLOOP", false, false, NotUsed, Used, IABC),
    op("SETLIST", false, false, Used, Used, IABC),
    op("CLOSE", false, false, NotUsed, NotUsed, IABC),
    op("CLOSURE", false, true, Used, NotUsed, IABx),
    op("VARARG", false, true, Used, NotUsed, IABC),
];

impl OpCode {
    #[inline(always)]
    pub fn from_u8(byte: u8) -> Option<Self> {
        OPCODES.get(byte as usize).copied()
    }

    #[inline(always)]
    pub fn info(self) -> &'static OpInfo {
        &OP_INFO[self as usize]
    }

    #[inline(always)]
    pub fn name(self) -> &'static str {
        self.info().name
    }

    #[inline(always)]
    pub fn mode(self) -> OpMode {
        self.info().mode
    }
}

/// One 32-bit instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    // Size of each field
    pub const SIZE_OP: u32 = 6;
    pub const SIZE_A: u32 = 8;
    pub const SIZE_C: u32 = 9;
    pub const SIZE_B: u32 = 9;
    pub const SIZE_BX: u32 = Self::SIZE_C + Self::SIZE_B; // 18

    // Position of each field
    pub const POS_OP: u32 = 0;
    pub const POS_A: u32 = Self::POS_OP + Self::SIZE_OP; // 6
    pub const POS_C: u32 = Self::POS_A + Self::SIZE_A; // 14
    pub const POS_B: u32 = Self::POS_C + Self::SIZE_C; // 23
    pub const POS_BX: u32 = Self::POS_C; // 14

    // Maximum values
    pub const MAX_A: u32 = (1 << Self::SIZE_A) - 1;
    pub const MAX_B: u32 = (1 << Self::SIZE_B) - 1;
    pub const MAX_C: u32 = (1 << Self::SIZE_C) - 1;
    pub const MAX_BX: u32 = (1 << Self::SIZE_BX) - 1;

    /// Bias for the signed Bx field
    pub const OFFSET_SBX: i32 = (Self::MAX_BX >> 1) as i32; // 131071

    /// Bit marking an RK operand as a constant index
    pub const BITRK: u32 = 1 << (Self::SIZE_B - 1); // 256

    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_u8((self.0 & ((1 << Self::SIZE_OP) - 1)) as u8)
    }

    #[inline(always)]
    pub fn a(self) -> u32 {
        (self.0 >> Self::POS_A) & Self::MAX_A
    }

    #[inline(always)]
    pub fn b(self) -> u32 {
        (self.0 >> Self::POS_B) & Self::MAX_B
    }

    #[inline(always)]
    pub fn c(self) -> u32 {
        (self.0 >> Self::POS_C) & Self::MAX_C
    }

    #[inline(always)]
    pub fn bx(self) -> u32 {
        (self.0 >> Self::POS_BX) & Self::MAX_BX
    }

    #[inline(always)]
    pub fn sbx(self) -> i32 {
        self.bx() as i32 - Self::OFFSET_SBX
    }

    // RK helpers: an operand value >= 256 names constants[value - 256]

    #[inline(always)]
    pub fn is_constant(operand: u32) -> bool {
        operand & Self::BITRK != 0
    }

    #[inline(always)]
    pub fn constant_index(operand: u32) -> usize {
        (operand & !Self::BITRK) as usize
    }

    /// Encode a register index as an RK constant operand
    #[inline(always)]
    pub fn rk_constant(index: u32) -> u32 {
        index | Self::BITRK
    }

    // Encoders (used by the chunk writer tests and the test suite)

    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Instruction {
        Instruction(
            (op as u32) << Self::POS_OP
                | (a & Self::MAX_A) << Self::POS_A
                | (b & Self::MAX_B) << Self::POS_B
                | (c & Self::MAX_C) << Self::POS_C,
        )
    }

    pub fn abx(op: OpCode, a: u32, bx: u32) -> Instruction {
        Instruction(
            (op as u32) << Self::POS_OP
                | (a & Self::MAX_A) << Self::POS_A
                | (bx & Self::MAX_BX) << Self::POS_BX,
        )
    }

    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Instruction {
        Self::abx(op, a, (sbx + Self::OFFSET_SBX) as u32)
    }
}
