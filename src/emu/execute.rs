use super::{
    Chip8, Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, FONT_GLYPH_SIZE, FONT_START_ADDRESS,
    Opcode, OpcodeALU,
};
use crate::u4;

const VF: usize = 0xF;

impl Chip8 {
    /// Applies one decoded instruction. The program counter already points past it.
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        match opcode {
            Opcode::ClearDisplay => {
                self.display = [[false; DISPLAY_X]; DISPLAY_Y];
                return Ok(Chip8Result::DisplayUpdated);
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                self.stack.push(self.pc, nnn)?;
                self.pc = nnn;
            }
            Opcode::Return => {
                self.pc = self.stack.pop()?;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                self.skip_if(self.v[x] == nn);
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                self.skip_if(self.v[x] != nn);
            }
            Opcode::SkipRegEqualReg { x, y } => {
                self.skip_if(self.v[x] == self.v[y]);
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                self.skip_if(self.v[x] != self.v[y]);
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = rand::random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                return self.execute_draw(x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                self.skip_if(self.keypad[u4::low(self.v[x])]);
            }
            Opcode::SkipIfNotPressed { x } => {
                self.skip_if(!self.keypad[u4::low(self.v[x])]);
            }
            Opcode::WaitForKey { x } => {
                self.execute_wait_for_key(x);
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                self.i = FONT_START_ADDRESS as u16 + u16::from(self.v[x]) * FONT_GLYPH_SIZE;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                *self.mem_get(self.i)? = value / 100;
                *self.mem_get(self.i.wrapping_add(1))? = (value / 10) % 10;
                *self.mem_get(self.i.wrapping_add(2))? = value % 10;
            }
            Opcode::StoreRegs { x } => {
                for reg_index in 0..=usize::from(x) {
                    *self.mem_get(self.i.wrapping_add(reg_index as u16))? = self.v[reg_index];
                }
            }
            Opcode::LoadRegs { x } => {
                for reg_index in 0..=usize::from(x) {
                    self.v[reg_index] = *self.mem_get(self.i.wrapping_add(reg_index as u16))?;
                }
            }
            Opcode::Unknown(opcode) => {
                log::debug!(
                    "Ignoring unknown opcode {opcode:#06X} at {:#05X}",
                    self.pc.wrapping_sub(2)
                );
            }
        };

        Ok(Chip8Result::Continue)
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    // VF is written before Vx, so when x is F the result wins over the flag.
    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        let vx = self.v[x];
        let vy = self.v[y];

        match op {
            OpcodeALU::Set => self.v[x] = vy,
            OpcodeALU::Or => self.v[x] = vx | vy,
            OpcodeALU::And => self.v[x] = vx & vy,
            OpcodeALU::Xor => self.v[x] = vx ^ vy,
            OpcodeALU::Add => {
                let (res, overflow) = vx.overflowing_add(vy);
                self.v[VF] = u8::from(overflow);
                self.v[x] = res;
            }
            OpcodeALU::Sub => {
                self.v[VF] = u8::from(vx >= vy);
                self.v[x] = vx.wrapping_sub(vy);
            }
            OpcodeALU::SubReverse => {
                self.v[VF] = u8::from(vy >= vx);
                self.v[x] = vy.wrapping_sub(vx);
            }
            OpcodeALU::ShiftRight => {
                self.v[VF] = vx & 1;
                self.v[x] = vx >> 1;
            }
            OpcodeALU::ShiftLeft => {
                self.v[VF] = vx >> 7;
                self.v[x] = vx << 1;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<Chip8Result, Chip8Error> {
        let x_pos = self.v[x] as usize % DISPLAY_X;
        let y_pos = self.v[y] as usize % DISPLAY_Y;

        // Only the origin wraps; the sprite itself is clipped at the edges
        let row_count = std::cmp::min(usize::from(n), DISPLAY_Y - y_pos);
        let col_count = std::cmp::min(8, DISPLAY_X - x_pos);

        // Read the whole sprite first so a bad address leaves the display untouched
        let mut sprite = [0u8; 15];
        for (row, byte) in sprite.iter_mut().take(row_count).enumerate() {
            *byte = *self.mem_get(self.i.wrapping_add(row as u16))?;
        }

        let mut any_erased = false;
        for (row, &sprite_byte) in sprite[..row_count].iter().enumerate() {
            for col in 0..col_count {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let pixel = &mut self.display[y_pos + row][x_pos + col];

                    // Flip the pixel
                    *pixel ^= true;

                    if !*pixel {
                        any_erased = true;
                    }
                }
            }
        }

        self.v[VF] = u8::from(any_erased);
        Ok(Chip8Result::DisplayUpdated)
    }

    fn execute_wait_for_key(&mut self, x: u4) {
        match self.keypad.iter().position(|&pressed| pressed) {
            Some(key) => self.v[x] = key as u8,
            // Repeat this instruction until a key is down
            None => self.pc = self.pc.wrapping_sub(2),
        }
    }
}
