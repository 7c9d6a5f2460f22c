use std::fmt;

use crate::u4;

/// Raw fields of a 16-bit instruction word.
///
/// Every `u16` produces a well-formed record; whether the combination means anything is
/// decided by [`Opcode::decode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u16,
    /// Lowest 12 bits: an address or literal.
    pub nnn: u16,
    /// Lowest 8 bits.
    pub nn: u8,
    /// Lowest 4 bits.
    pub n: u4,
    /// Second nibble: a register index.
    pub x: u4,
    /// Third nibble: a register index.
    pub y: u4,
}

impl Instruction {
    pub fn new(opcode: u16) -> Self {
        Self {
            opcode,
            nnn: opcode & 0x0FFF,
            nn: (opcode & 0x00FF) as u8,
            n: u4::low(opcode as u8),
            x: u4::low((opcode >> 8) as u8),
            y: u4::low((opcode >> 4) as u8),
        }
    }

    /// Top nibble, selecting the primary opcode family.
    pub fn family(&self) -> u8 {
        ((self.opcode >> 12) & 0xF) as u8
    }
}

/// CHIP-8 instruction opcodes.
///
/// The fields (x, y, n, nn, nnn) correspond to the operands encoded in the opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// 1nnn - Jump to location nnn.
    Jump { nnn: u16 },
    /// Bnnn - Jump to location nnn + V0.
    JumpWithOffset { nnn: u16 },

    /// 2nnn - Call subroutine at nnn.
    Call { nnn: u16 },
    /// 00EE - Return from a subroutine.
    Return,

    /// 3xnn - Skip next instruction if Vx == nn.
    SkipRegEqualImm { x: u4, nn: u8 },
    /// 4xnn - Skip next instruction if Vx != nn.
    SkipRegNotEqualImm { x: u4, nn: u8 },
    /// 5xy0 - Skip next instruction if Vx == Vy.
    SkipRegEqualReg { x: u4, y: u4 },
    /// 9xy0 - Skip next instruction if Vx != Vy.
    SkipRegNotEqualReg { x: u4, y: u4 },

    /// 6xnn - Set Vx = nn.
    SetRegImm { x: u4, nn: u8 },
    /// 7xnn - Set Vx = Vx + nn.
    AddRegImm { x: u4, nn: u8 },
    /// Annn - Set I = nnn.
    SetIndexImm { nnn: u16 },
    /// Fx1E - Set I = I + Vx.
    AddIndexReg { x: u4 },

    /// 8xyN - ALU operations
    ALU { x: u4, y: u4, op: OpcodeALU },
    /// Cxnn - Set Vx = random byte AND nn.
    Random { x: u4, nn: u8 },

    /// 00E0 - Clear the display.
    ClearDisplay,
    /// Dxyn - Display sprite.
    Draw { x: u4, y: u4, n: u4 },

    /// Ex9E - Skip next instruction if key with the value of Vx is pressed.
    SkipIfPressed { x: u4 },
    /// ExA1 - Skip next instruction if key with the value of Vx is not pressed.
    SkipIfNotPressed { x: u4 },
    /// Fx0A - Wait for a key press, store the value of the key in Vx.
    WaitForKey { x: u4 },

    /// Fx07 - Set Vx = delay timer value.
    ReadDelayTimer { x: u4 },
    /// Fx15 - Set delay timer = Vx.
    SetDelayTimer { x: u4 },
    /// Fx18 - Set sound timer = Vx.
    SetSoundTimer { x: u4 },

    /// Fx29 - Set I = location of sprite for digit Vx.
    FontChar { x: u4 },
    /// Fx33 - Store BCD representation of Vx in memory locations I, I+1, and I+2.
    BCD { x: u4 },

    /// Fx55 - Store registers V0 through Vx in memory starting at location I.
    StoreRegs { x: u4 },
    /// Fx65 - Read registers V0 through Vx from memory starting at location I.
    LoadRegs { x: u4 },

    /// Any combination outside the table above. Executes as a no-op.
    Unknown(u16),
}

/// ALU operations for the 8xyN instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpcodeALU {
    /// 8xy0 - Vx = Vy
    Set,
    /// 8xy1 - Vx = Vx OR Vy
    Or,
    /// 8xy2 - Vx = Vx AND Vy
    And,
    /// 8xy3 - Vx = Vx XOR Vy
    Xor,
    /// 8xy4 - Vx = Vx + Vy, VF = carry
    Add,
    /// 8xy5 - Vx = Vx - Vy, VF = NOT borrow
    Sub,
    /// 8xy6 - Vx = Vx SHR 1, VF = shifted out bit
    ShiftRight,
    /// 8xy7 - Vx = Vy - Vx, VF = NOT borrow
    SubReverse,
    /// 8xyE - Vx = Vx SHL 1, VF = shifted out bit
    ShiftLeft,
}

impl Opcode {
    /// Decode a 16-bit raw opcode into an `Opcode` enum variant.
    pub fn decode(opcode: u16) -> Self {
        let instruction = Instruction::new(opcode);
        let Instruction {
            nnn, nn, n, x, y, ..
        } = instruction;

        let nibble = (instruction.family(), x.get(), y.get(), n.get());

        match nibble {
            // Family 0 only looks at the low byte
            (0x0, _, 0xE, 0x0) => Opcode::ClearDisplay,
            (0x0, _, 0xE, 0xE) => Opcode::Return,
            (0x1, _, _, _) => Opcode::Jump { nnn },
            (0x2, _, _, _) => Opcode::Call { nnn },
            (0x3, _, _, _) => Opcode::SkipRegEqualImm { x, nn },
            (0x4, _, _, _) => Opcode::SkipRegNotEqualImm { x, nn },
            (0x5, _, _, 0x0) => Opcode::SkipRegEqualReg { x, y },
            (0x6, _, _, _) => Opcode::SetRegImm { x, nn },
            (0x7, _, _, _) => Opcode::AddRegImm { x, nn },
            (0x8, _, _, _) => Opcode::ALU {
                x,
                y,
                op: match nibble.3 {
                    0x0 => OpcodeALU::Set,
                    0x1 => OpcodeALU::Or,
                    0x2 => OpcodeALU::And,
                    0x3 => OpcodeALU::Xor,
                    0x4 => OpcodeALU::Add,
                    0x5 => OpcodeALU::Sub,
                    0x6 => OpcodeALU::ShiftRight,
                    0x7 => OpcodeALU::SubReverse,
                    0xE => OpcodeALU::ShiftLeft,
                    _ => return Opcode::Unknown(opcode),
                },
            },
            // Unlike 5xy0, the low nibble is not checked
            (0x9, _, _, _) => Opcode::SkipRegNotEqualReg { x, y },
            (0xA, _, _, _) => Opcode::SetIndexImm { nnn },
            (0xB, _, _, _) => Opcode::JumpWithOffset { nnn },
            (0xC, _, _, _) => Opcode::Random { x, nn },
            (0xD, _, _, _) => Opcode::Draw { x, y, n },
            (0xE, _, 0x9, 0xE) => Opcode::SkipIfPressed { x },
            (0xE, _, 0xA, 0x1) => Opcode::SkipIfNotPressed { x },
            (0xF, _, 0x0, 0xA) => Opcode::WaitForKey { x },
            (0xF, _, 0x0, 0x7) => Opcode::ReadDelayTimer { x },
            (0xF, _, 0x1, 0x5) => Opcode::SetDelayTimer { x },
            (0xF, _, 0x1, 0x8) => Opcode::SetSoundTimer { x },
            (0xF, _, 0x1, 0xE) => Opcode::AddIndexReg { x },
            (0xF, _, 0x2, 0x9) => Opcode::FontChar { x },
            (0xF, _, 0x3, 0x3) => Opcode::BCD { x },
            (0xF, _, 0x5, 0x5) => Opcode::StoreRegs { x },
            (0xF, _, 0x6, 0x5) => Opcode::LoadRegs { x },

            _ => Opcode::Unknown(opcode),
        }
    }
}

/// Assembly-style mnemonic, used for tracing and disassembly.
impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Opcode::ClearDisplay => write!(f, "CLS"),
            Opcode::Return => write!(f, "RET"),
            Opcode::Jump { nnn } => write!(f, "JP {nnn:#05X}"),
            Opcode::JumpWithOffset { nnn } => write!(f, "JP V0, {nnn:#05X}"),
            Opcode::Call { nnn } => write!(f, "CALL {nnn:#05X}"),
            Opcode::SkipRegEqualImm { x, nn } => write!(f, "SE V{x:X}, {nn:#04X}"),
            Opcode::SkipRegNotEqualImm { x, nn } => write!(f, "SNE V{x:X}, {nn:#04X}"),
            Opcode::SkipRegEqualReg { x, y } => write!(f, "SE V{x:X}, V{y:X}"),
            Opcode::SkipRegNotEqualReg { x, y } => write!(f, "SNE V{x:X}, V{y:X}"),
            Opcode::SetRegImm { x, nn } => write!(f, "LD V{x:X}, {nn:#04X}"),
            Opcode::AddRegImm { x, nn } => write!(f, "ADD V{x:X}, {nn:#04X}"),
            Opcode::SetIndexImm { nnn } => write!(f, "LD I, {nnn:#05X}"),
            Opcode::AddIndexReg { x } => write!(f, "ADD I, V{x:X}"),
            Opcode::ALU { x, y, op } => match op {
                OpcodeALU::Set => write!(f, "LD V{x:X}, V{y:X}"),
                OpcodeALU::Or => write!(f, "OR V{x:X}, V{y:X}"),
                OpcodeALU::And => write!(f, "AND V{x:X}, V{y:X}"),
                OpcodeALU::Xor => write!(f, "XOR V{x:X}, V{y:X}"),
                OpcodeALU::Add => write!(f, "ADD V{x:X}, V{y:X}"),
                OpcodeALU::Sub => write!(f, "SUB V{x:X}, V{y:X}"),
                OpcodeALU::ShiftRight => write!(f, "SHR V{x:X}"),
                OpcodeALU::SubReverse => write!(f, "SUBN V{x:X}, V{y:X}"),
                OpcodeALU::ShiftLeft => write!(f, "SHL V{x:X}"),
            },
            Opcode::Random { x, nn } => write!(f, "RND V{x:X}, {nn:#04X}"),
            Opcode::Draw { x, y, n } => write!(f, "DRW V{x:X}, V{y:X}, {n:X}"),
            Opcode::SkipIfPressed { x } => write!(f, "SKP V{x:X}"),
            Opcode::SkipIfNotPressed { x } => write!(f, "SKNP V{x:X}"),
            Opcode::WaitForKey { x } => write!(f, "LD V{x:X}, K"),
            Opcode::ReadDelayTimer { x } => write!(f, "LD V{x:X}, DT"),
            Opcode::SetDelayTimer { x } => write!(f, "LD DT, V{x:X}"),
            Opcode::SetSoundTimer { x } => write!(f, "LD ST, V{x:X}"),
            Opcode::FontChar { x } => write!(f, "LD F, V{x:X}"),
            Opcode::BCD { x } => write!(f, "LD B, V{x:X}"),
            Opcode::StoreRegs { x } => write!(f, "LD [I], V{x:X}"),
            Opcode::LoadRegs { x } => write!(f, "LD V{x:X}, [I]"),
            Opcode::Unknown(opcode) => write!(f, "DW {opcode:#06X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_instruction_fields() {
        let ins = Instruction::new(0xD12F);
        assert_eq!(ins.family(), 0xD);
        assert_eq!(ins.nnn, 0x12F);
        assert_eq!(ins.nn, 0x2F);
        assert_eq!(ins.n, u4::new(0xF));
        assert_eq!(ins.x, u4::new(0x1));
        assert_eq!(ins.y, u4::new(0x2));
    }

    #[test]
    fn decodes_every_family() {
        let x = u4::new(0xA);
        let y = u4::new(0xB);

        let cases = [
            (0x00E0, Opcode::ClearDisplay),
            (0x00EE, Opcode::Return),
            (0x1234, Opcode::Jump { nnn: 0x234 }),
            (0x2345, Opcode::Call { nnn: 0x345 }),
            (0x3A12, Opcode::SkipRegEqualImm { x, nn: 0x12 }),
            (0x4A12, Opcode::SkipRegNotEqualImm { x, nn: 0x12 }),
            (0x5AB0, Opcode::SkipRegEqualReg { x, y }),
            (0x6A12, Opcode::SetRegImm { x, nn: 0x12 }),
            (0x7A12, Opcode::AddRegImm { x, nn: 0x12 }),
            (0x8AB4, Opcode::ALU { x, y, op: OpcodeALU::Add }),
            (0x8ABE, Opcode::ALU { x, y, op: OpcodeALU::ShiftLeft }),
            (0x9AB0, Opcode::SkipRegNotEqualReg { x, y }),
            (0xA123, Opcode::SetIndexImm { nnn: 0x123 }),
            (0xB123, Opcode::JumpWithOffset { nnn: 0x123 }),
            (0xCA0F, Opcode::Random { x, nn: 0x0F }),
            (0xDAB5, Opcode::Draw { x, y, n: u4::new(5) }),
            (0xEA9E, Opcode::SkipIfPressed { x }),
            (0xEAA1, Opcode::SkipIfNotPressed { x }),
            (0xFA07, Opcode::ReadDelayTimer { x }),
            (0xFA0A, Opcode::WaitForKey { x }),
            (0xFA15, Opcode::SetDelayTimer { x }),
            (0xFA18, Opcode::SetSoundTimer { x }),
            (0xFA1E, Opcode::AddIndexReg { x }),
            (0xFA29, Opcode::FontChar { x }),
            (0xFA33, Opcode::BCD { x }),
            (0xFA55, Opcode::StoreRegs { x }),
            (0xFA65, Opcode::LoadRegs { x }),
        ];

        for (raw, expected) in cases {
            assert_eq!(Opcode::decode(raw), expected, "decoding {raw:#06X}");
        }
    }

    #[test]
    fn unrecognized_combinations_decode_as_unknown() {
        for raw in [0x0000, 0x00E1, 0x03E1, 0x5AB1, 0x8AB8, 0xEA00, 0xFA99] {
            assert_eq!(Opcode::decode(raw), Opcode::Unknown(raw));
        }
    }

    #[test]
    fn lenient_discriminators_still_decode() {
        assert_eq!(Opcode::decode(0x01E0), Opcode::ClearDisplay);
        assert_eq!(Opcode::decode(0x03EE), Opcode::Return);
        assert_eq!(
            Opcode::decode(0x9AB1),
            Opcode::SkipRegNotEqualReg {
                x: u4::new(0xA),
                y: u4::new(0xB)
            }
        );
    }

    #[test]
    fn mnemonics() {
        assert_eq!(Opcode::decode(0x00E0).to_string(), "CLS");
        assert_eq!(Opcode::decode(0x1234).to_string(), "JP 0x234");
        assert_eq!(Opcode::decode(0x6A12).to_string(), "LD VA, 0x12");
        assert_eq!(Opcode::decode(0x8AB5).to_string(), "SUB VA, VB");
        assert_eq!(Opcode::decode(0xD125).to_string(), "DRW V1, V2, 5");
        assert_eq!(Opcode::decode(0xF355).to_string(), "LD [I], V3");
        assert_eq!(Opcode::decode(0xFFFF).to_string(), "DW 0xFFFF");
    }
}
