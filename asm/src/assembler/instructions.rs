use crate::{
    ast::{Instruction, Operand},
    error::AsmResult,
    expr::Expr,
    fileman::FileSystem,
    lexer::{Mnemonic, Register, TokenTraits},
    output::Model,
};

use super::{fixup::FixupKind, Assembler};

/// Opcodes of the instructions that take no operands.
fn simple_opcode(mnemonic: Mnemonic) -> Option<&'static [u8]> {
    let opcode: &'static [u8] = match mnemonic {
        Mnemonic::Ccf => &[0x3F],
        Mnemonic::Cpd => &[0xED, 0xA9],
        Mnemonic::Cpdr => &[0xED, 0xB9],
        Mnemonic::Cpi => &[0xED, 0xA1],
        Mnemonic::Cpir => &[0xED, 0xB1],
        Mnemonic::Cpl => &[0x2F],
        Mnemonic::Daa => &[0x27],
        Mnemonic::Di => &[0xF3],
        Mnemonic::Ei => &[0xFB],
        Mnemonic::Exx => &[0xD9],
        Mnemonic::Halt => &[0x76],
        Mnemonic::Ind => &[0xED, 0xAA],
        Mnemonic::Indr => &[0xED, 0xBA],
        Mnemonic::Ini => &[0xED, 0xA2],
        Mnemonic::Inir => &[0xED, 0xB2],
        Mnemonic::Ldd => &[0xED, 0xA8],
        Mnemonic::Lddr => &[0xED, 0xB8],
        Mnemonic::Ldi => &[0xED, 0xA0],
        Mnemonic::Ldir => &[0xED, 0xB0],
        Mnemonic::Neg => &[0xED, 0x44],
        Mnemonic::Nop => &[0x00],
        Mnemonic::Otdr => &[0xED, 0xBB],
        Mnemonic::Otir => &[0xED, 0xB3],
        Mnemonic::Outd => &[0xED, 0xAB],
        Mnemonic::Outi => &[0xED, 0xA3],
        Mnemonic::Reti => &[0xED, 0x4D],
        Mnemonic::Retn => &[0xED, 0x45],
        Mnemonic::Rla => &[0x17],
        Mnemonic::Rlca => &[0x07],
        Mnemonic::Rld => &[0xED, 0x6F],
        Mnemonic::Rra => &[0x1F],
        Mnemonic::Rrca => &[0x0F],
        Mnemonic::Rrd => &[0xED, 0x67],
        Mnemonic::Scf => &[0x37],

        Mnemonic::Lddrx => &[0xED, 0xBC],
        Mnemonic::Lddx => &[0xED, 0xAC],
        Mnemonic::Ldirx => &[0xED, 0xB4],
        Mnemonic::Ldix => &[0xED, 0xA4],
        Mnemonic::Ldpirx => &[0xED, 0xB7],
        Mnemonic::Ldws => &[0xED, 0xA5],
        Mnemonic::OutInB => &[0xED, 0x90],
        Mnemonic::PixelAd => &[0xED, 0x94],
        Mnemonic::PixelDn => &[0xED, 0x93],
        Mnemonic::SetAE => &[0xED, 0x95],
        Mnemonic::SwapNib => &[0xED, 0x23],
        _ => return None,
    };
    Some(opcode)
}

/// The `alu` field of the 8-bit arithmetic group.
fn alu_index(mnemonic: Mnemonic) -> u8 {
    match mnemonic {
        Mnemonic::Add => 0,
        Mnemonic::Adc => 1,
        Mnemonic::Sub => 2,
        Mnemonic::Sbc => 3,
        Mnemonic::And => 4,
        Mnemonic::Xor => 5,
        Mnemonic::Or => 6,
        _ => 7,
    }
}

/// The operation field of the `CB` rotate and shift group.
fn shift_index(mnemonic: Mnemonic) -> u8 {
    match mnemonic {
        Mnemonic::Rlc => 0,
        Mnemonic::Rrc => 1,
        Mnemonic::Rl => 2,
        Mnemonic::Rr => 3,
        Mnemonic::Sla => 4,
        Mnemonic::Sra => 5,
        Mnemonic::Sll => 6,
        _ => 7,
    }
}

#[inline]
fn is_std8(reg: Register) -> bool {
    reg.is_reg8_std()
}

/// The `r` field of an 8-bit register, `(hl)` excluded.
#[inline]
fn r(reg: Register) -> u8 {
    reg.reg8_index().unwrap_or(0)
}

/// The `rr` field of a register pair.
#[inline]
fn rr(reg: Register) -> u8 {
    reg.reg16_index().unwrap_or(0) << 4
}

#[inline]
fn prefix(reg: Register) -> u8 {
    reg.index_prefix().unwrap_or(0xDD)
}

/// The prefix shared by two 8-bit register operands. An index half cannot
/// be combined with `h`, `l`, or a half of the other index register.
fn pair_prefix(first: Register, second: Register) -> Option<Option<u8>> {
    let plain_hl = |reg: Register| matches!(reg, Register::H | Register::L);
    match (first.index_prefix(), second.index_prefix()) {
        (None, None) => Some(None),
        (Some(prefix), None) if !plain_hl(second) => Some(Some(prefix)),
        (None, Some(prefix)) if !plain_hl(first) => Some(Some(prefix)),
        (Some(a), Some(b)) if a == b => Some(Some(a)),
        _ => None,
    }
}

impl<S: FileSystem> Assembler<'_, S> {
    pub(super) fn instruction(&mut self, instruction: &Instruction) -> AsmResult<()> {
        let mnemonic = instruction.mnemonic;
        let ops = instruction.operands.as_slice();
        if mnemonic.traits().contains(TokenTraits::EXTENDED) {
            self.require_next(mnemonic)?;
        }
        if let Some(opcode) = simple_opcode(mnemonic) {
            if !ops.is_empty() {
                return self.invalid(mnemonic, ops);
            }
            self.emit(opcode);
            return Ok(());
        }

        match mnemonic {
            Mnemonic::Ld => self.ld(ops),
            Mnemonic::Push | Mnemonic::Pop => self.push_pop(mnemonic, ops),
            Mnemonic::Jp => self.jp(ops),
            Mnemonic::Jr => self.jr(ops),
            Mnemonic::Djnz => match ops {
                [Operand::Expr(target)] => self.relative(0x10, target),
                _ => self.invalid(mnemonic, ops),
            },
            Mnemonic::Call => self.call(ops),
            Mnemonic::Ret => match ops {
                [] => self.emit_ok(&[0xC9]),
                [cc] => match cc.condition() {
                    Some(cc) => self.emit_ok(&[0xC0 | cc.index() << 3]),
                    None => self.invalid(mnemonic, ops),
                },
                _ => self.invalid(mnemonic, ops),
            },
            Mnemonic::Rst => self.rst(ops),
            Mnemonic::Im => self.im(ops),
            Mnemonic::Ex => self.ex(ops),
            Mnemonic::In => self.port_in(ops),
            Mnemonic::Out => self.port_out(ops),
            Mnemonic::Add
            | Mnemonic::Adc
            | Mnemonic::Sub
            | Mnemonic::Sbc
            | Mnemonic::And
            | Mnemonic::Xor
            | Mnemonic::Or
            | Mnemonic::Cp => self.alu(mnemonic, ops),
            Mnemonic::Inc | Mnemonic::Dec => self.inc_dec(mnemonic, ops),
            Mnemonic::Rlc
            | Mnemonic::Rrc
            | Mnemonic::Rl
            | Mnemonic::Rr
            | Mnemonic::Sla
            | Mnemonic::Sra
            | Mnemonic::Sll
            | Mnemonic::Srl => self.shift(mnemonic, ops),
            Mnemonic::Bit | Mnemonic::Res | Mnemonic::Set => self.bit_op(mnemonic, ops),
            _ => self.next_instruction(mnemonic, ops),
        }
    }

    fn require_next(&self, mnemonic: Mnemonic) -> AsmResult<()> {
        if self.model == Model::Next {
            Ok(())
        } else {
            asm_err!(
                self.loc,
                "Z0414",
                "\"{mnemonic}\" is available only with the Next model"
            )
        }
    }

    fn invalid(&self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        if ops.is_empty() {
            asm_err!(self.loc, "Z0401", "\"{mnemonic}\" needs operands")
        } else {
            asm_err!(
                self.loc,
                "Z0604",
                "Invalid operands for \"{mnemonic}\""
            )
        }
    }

    #[inline]
    fn emit_ok(&mut self, bytes: &[u8]) -> AsmResult<()> {
        self.emit(bytes);
        Ok(())
    }

    fn displacement(&mut self, offset: Option<&Expr>) -> AsmResult<()> {
        match offset {
            Some(offset) => self.emit_byte_expr(offset),
            None => self.emit_ok(&[0]),
        }
    }

    /// `prefix opcode d`
    fn indexed(&mut self, reg: Register, opcode: u8, offset: Option<&Expr>) -> AsmResult<()> {
        self.emit(&[prefix(reg), opcode]);
        self.displacement(offset)
    }

    /// `prefix CB d opcode`
    fn indexed_cb(&mut self, reg: Register, offset: Option<&Expr>, opcode: u8) -> AsmResult<()> {
        self.emit(&[prefix(reg), 0xCB]);
        self.displacement(offset)?;
        self.emit_ok(&[opcode])
    }

    /// A relative jump measured from the end of the instruction.
    fn relative(&mut self, opcode: u8, target: &Expr) -> AsmResult<()> {
        match self.eval_int_late(target)? {
            Some(target) => {
                let distance = target - (self.line_address + 2);
                if !(-128..=127).contains(&distance) {
                    return asm_err!(
                        self.loc,
                        "Z0403",
                        "Relative jump distance should be between -128 and 127, not {distance}"
                    );
                }
                self.emit_ok(&[opcode, distance as u8])
            }
            None => {
                self.emit(&[opcode]);
                self.fixup(FixupKind::Jr, target);
                self.emit_ok(&[0])
            }
        }
    }

    fn ld(&mut self, ops: &[Operand]) -> AsmResult<()> {
        use Register::*;
        match ops {
            [Operand::Reg(dst), Operand::Reg(src)] => self.ld_reg(*dst, *src, ops),

            [Operand::Reg(A), Operand::RegIndirect(Bc)] => self.emit_ok(&[0x0A]),
            [Operand::Reg(A), Operand::RegIndirect(De)] => self.emit_ok(&[0x1A]),
            [Operand::Reg(dst), Operand::RegIndirect(Hl)] if is_std8(*dst) => {
                self.emit_ok(&[0x46 | r(*dst) << 3])
            }
            [Operand::Reg(dst), Operand::IndexedIndirect { reg, offset }] if is_std8(*dst) => {
                self.indexed(*reg, 0x46 | r(*dst) << 3, offset.as_ref())
            }
            [Operand::Reg(A), Operand::MemIndirect(addr)] => {
                self.emit(&[0x3A]);
                self.emit_word_expr(addr)
            }
            [Operand::Reg(Hl), Operand::MemIndirect(addr)] => {
                self.emit(&[0x2A]);
                self.emit_word_expr(addr)
            }
            [Operand::Reg(dst @ (Bc | De | Sp)), Operand::MemIndirect(addr)] => {
                self.emit(&[0xED, 0x4B | rr(*dst)]);
                self.emit_word_expr(addr)
            }
            [Operand::Reg(dst @ (Ix | Iy)), Operand::MemIndirect(addr)] => {
                self.emit(&[prefix(*dst), 0x2A]);
                self.emit_word_expr(addr)
            }

            [Operand::Reg(dst), Operand::Expr(value)] if is_std8(*dst) => {
                self.emit(&[0x06 | r(*dst) << 3]);
                self.emit_byte_expr(value)
            }
            [Operand::Reg(dst), Operand::Expr(value)] if dst.is_reg8_idx() => {
                self.emit(&[prefix(*dst), 0x06 | r(*dst) << 3]);
                self.emit_byte_expr(value)
            }
            [Operand::Reg(dst @ (Bc | De | Hl | Sp)), Operand::Expr(value)] => {
                self.emit(&[0x01 | rr(*dst)]);
                self.emit_word_expr(value)
            }
            [Operand::Reg(dst @ (Ix | Iy)), Operand::Expr(value)] => {
                self.emit(&[prefix(*dst), 0x21]);
                self.emit_word_expr(value)
            }

            [Operand::RegIndirect(Bc), Operand::Reg(A)] => self.emit_ok(&[0x02]),
            [Operand::RegIndirect(De), Operand::Reg(A)] => self.emit_ok(&[0x12]),
            [Operand::RegIndirect(Hl), Operand::Reg(src)] if is_std8(*src) => {
                self.emit_ok(&[0x70 | r(*src)])
            }
            [Operand::RegIndirect(Hl), Operand::Expr(value)] => {
                self.emit(&[0x36]);
                self.emit_byte_expr(value)
            }
            [Operand::IndexedIndirect { reg, offset }, Operand::Reg(src)] if is_std8(*src) => {
                self.indexed(*reg, 0x70 | r(*src), offset.as_ref())
            }
            [Operand::IndexedIndirect { reg, offset }, Operand::Expr(value)] => {
                self.indexed(*reg, 0x36, offset.as_ref())?;
                self.emit_byte_expr(value)
            }
            [Operand::MemIndirect(addr), Operand::Reg(A)] => {
                self.emit(&[0x32]);
                self.emit_word_expr(addr)
            }
            [Operand::MemIndirect(addr), Operand::Reg(Hl)] => {
                self.emit(&[0x22]);
                self.emit_word_expr(addr)
            }
            [Operand::MemIndirect(addr), Operand::Reg(src @ (Bc | De | Sp))] => {
                self.emit(&[0xED, 0x43 | rr(*src)]);
                self.emit_word_expr(addr)
            }
            [Operand::MemIndirect(addr), Operand::Reg(src @ (Ix | Iy))] => {
                self.emit(&[prefix(*src), 0x22]);
                self.emit_word_expr(addr)
            }

            _ => self.invalid(Mnemonic::Ld, ops),
        }
    }

    fn ld_reg(&mut self, dst: Register, src: Register, ops: &[Operand]) -> AsmResult<()> {
        use Register::*;
        match (dst, src) {
            (A, I) => self.emit_ok(&[0xED, 0x57]),
            (A, R) => self.emit_ok(&[0xED, 0x5F]),
            (I, A) => self.emit_ok(&[0xED, 0x47]),
            (R, A) => self.emit_ok(&[0xED, 0x4F]),
            (Sp, Hl) => self.emit_ok(&[0xF9]),
            (Sp, Ix | Iy) => self.emit_ok(&[prefix(src), 0xF9]),
            _ if (is_std8(dst) || dst.is_reg8_idx()) && (is_std8(src) || src.is_reg8_idx()) => {
                match pair_prefix(dst, src) {
                    Some(Some(prefix)) => self.emit_ok(&[prefix, 0x40 | r(dst) << 3 | r(src)]),
                    Some(None) => self.emit_ok(&[0x40 | r(dst) << 3 | r(src)]),
                    None => self.invalid(Mnemonic::Ld, ops),
                }
            }
            _ => self.invalid(Mnemonic::Ld, ops),
        }
    }

    fn push_pop(&mut self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        let push = mnemonic == Mnemonic::Push;
        let base = if push { 0xC5 } else { 0xC1 };
        match ops {
            [Operand::Reg(reg @ (Register::Af | Register::Bc | Register::De | Register::Hl))] => {
                self.emit_ok(&[base | rr(*reg)])
            }
            [Operand::Reg(reg @ (Register::Ix | Register::Iy))] => {
                self.emit_ok(&[prefix(*reg), base | 0x20])
            }
            [Operand::Expr(value)] if push => {
                self.require_next(mnemonic)?;
                self.emit(&[0xED, 0x8A]);
                self.emit_expr(FixupKind::Bit16Be, value)
            }
            [Operand::Expr(_)] => asm_err!(self.loc, "Z0412", "\"pop\" cannot take a value"),
            [] => self.invalid(mnemonic, ops),
            _ => asm_err!(
                self.loc,
                "Z0413",
                "\"{mnemonic}\" takes af, bc, de, hl, ix, or iy"
            ),
        }
    }

    fn jp(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::Expr(target)] => {
                self.emit(&[0xC3]);
                self.emit_word_expr(target)
            }
            [Operand::RegIndirect(Register::Hl)] => self.emit_ok(&[0xE9]),
            [Operand::IndexedIndirect { reg, offset: None }] => {
                self.emit_ok(&[prefix(*reg), 0xE9])
            }
            [Operand::CPort] => {
                self.require_next(Mnemonic::Jp)?;
                self.emit_ok(&[0xED, 0x98])
            }
            [cc, Operand::Expr(target)] => match cc.condition() {
                Some(cc) => {
                    self.emit(&[0xC2 | cc.index() << 3]);
                    self.emit_word_expr(target)
                }
                None => self.invalid(Mnemonic::Jp, ops),
            },
            _ => self.invalid(Mnemonic::Jp, ops),
        }
    }

    fn jr(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::Expr(target)] => self.relative(0x18, target),
            [cc, Operand::Expr(target)] => match cc.condition() {
                Some(cc) if cc.is_relative() => self.relative(0x20 | cc.index() << 3, target),
                Some(cc) => asm_err!(self.loc, "Z0402", "\"jr\" cannot use the condition \"{cc}\""),
                None => self.invalid(Mnemonic::Jr, ops),
            },
            _ => self.invalid(Mnemonic::Jr, ops),
        }
    }

    fn call(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::Expr(target)] => {
                self.emit(&[0xCD]);
                self.emit_word_expr(target)
            }
            [cc, Operand::Expr(target)] => match cc.condition() {
                Some(cc) => {
                    self.emit(&[0xC4 | cc.index() << 3]);
                    self.emit_word_expr(target)
                }
                None => self.invalid(Mnemonic::Call, ops),
            },
            _ => self.invalid(Mnemonic::Call, ops),
        }
    }

    fn rst(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::Expr(target)] => {
                let target = self.eval_int(target)?;
                if (0..=0x38).contains(&target) && target % 8 == 0 {
                    self.emit_ok(&[0xC7 | target as u8])
                } else {
                    asm_err!(self.loc, "Z0404", "Invalid \"rst\" target {target:#04X}")
                }
            }
            _ => self.invalid(Mnemonic::Rst, ops),
        }
    }

    fn im(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::Expr(mode)] => match self.eval_int(mode)? {
                0 => self.emit_ok(&[0xED, 0x46]),
                1 => self.emit_ok(&[0xED, 0x56]),
                2 => self.emit_ok(&[0xED, 0x5E]),
                mode => asm_err!(self.loc, "Z0405", "Invalid interrupt mode {mode}"),
            },
            _ => self.invalid(Mnemonic::Im, ops),
        }
    }

    fn ex(&mut self, ops: &[Operand]) -> AsmResult<()> {
        use Register::*;
        match ops {
            [Operand::Reg(Af), Operand::Reg(AfPrime)] => self.emit_ok(&[0x08]),
            [Operand::Reg(De), Operand::Reg(Hl)] => self.emit_ok(&[0xEB]),
            [Operand::RegIndirect(Sp), Operand::Reg(Hl)] => self.emit_ok(&[0xE3]),
            [Operand::RegIndirect(Sp), Operand::Reg(reg @ (Ix | Iy))] => {
                self.emit_ok(&[prefix(*reg), 0xE3])
            }
            _ => self.invalid(Mnemonic::Ex, ops),
        }
    }

    fn port_in(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::Reg(Register::A), Operand::MemIndirect(port)] => {
                self.emit(&[0xDB]);
                self.emit_byte_expr(port)
            }
            [Operand::Reg(dst), Operand::CPort] if is_std8(*dst) => {
                self.emit_ok(&[0xED, 0x40 | r(*dst) << 3])
            }
            [Operand::CPort] => self.emit_ok(&[0xED, 0x70]),
            _ => self.invalid(Mnemonic::In, ops),
        }
    }

    fn port_out(&mut self, ops: &[Operand]) -> AsmResult<()> {
        match ops {
            [Operand::MemIndirect(port), Operand::Reg(Register::A)] => {
                self.emit(&[0xD3]);
                self.emit_byte_expr(port)
            }
            [Operand::CPort, Operand::Reg(src)] if is_std8(*src) => {
                self.emit_ok(&[0xED, 0x41 | r(*src) << 3])
            }
            [Operand::CPort, Operand::Expr(value)] => match self.eval_int(value)? {
                0 => self.emit_ok(&[0xED, 0x71]),
                _ => asm_err!(self.loc, "Z0406", "Only \"out (c),0\" can output a value"),
            },
            _ => self.invalid(Mnemonic::Out, ops),
        }
    }

    fn alu(&mut self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        use Register::*;
        match (mnemonic, ops) {
            (Mnemonic::Add, [Operand::Reg(Hl), Operand::Reg(src)]) if src.is_reg16_std() => {
                return self.emit_ok(&[0x09 | rr(*src)])
            }
            (Mnemonic::Adc, [Operand::Reg(Hl), Operand::Reg(src)]) if src.is_reg16_std() => {
                return self.emit_ok(&[0xED, 0x4A | rr(*src)])
            }
            (Mnemonic::Sbc, [Operand::Reg(Hl), Operand::Reg(src)]) if src.is_reg16_std() => {
                return self.emit_ok(&[0xED, 0x42 | rr(*src)])
            }
            (Mnemonic::Add, [Operand::Reg(dst @ (Ix | Iy)), Operand::Reg(src)])
                if matches!(src, Bc | De | Sp) || src == dst =>
            {
                return self.emit_ok(&[prefix(*dst), 0x09 | rr(*src)])
            }
            (Mnemonic::Add, [Operand::Reg(dst @ (Hl | De | Bc)), Operand::Reg(A)]) => {
                self.require_next(mnemonic)?;
                let opcode = match dst {
                    Hl => 0x31,
                    De => 0x32,
                    _ => 0x33,
                };
                return self.emit_ok(&[0xED, opcode]);
            }
            (Mnemonic::Add, [Operand::Reg(dst @ (Hl | De | Bc)), Operand::Expr(value)]) => {
                self.require_next(mnemonic)?;
                let opcode = match dst {
                    Hl => 0x34,
                    De => 0x35,
                    _ => 0x36,
                };
                self.emit(&[0xED, opcode]);
                return self.emit_word_expr(value);
            }
            _ => {}
        }

        let source = match ops {
            [source] | [Operand::Reg(A), source] => source,
            [Operand::Reg(dst), _]
                if dst.is_reg8() && matches!(mnemonic, Mnemonic::Add | Mnemonic::Adc | Mnemonic::Sbc) =>
            {
                return asm_err!(
                    self.loc,
                    "Z0409",
                    "\"{mnemonic}\" cannot use \"{dst}\" as its first operand"
                )
            }
            [_, _] if !matches!(mnemonic, Mnemonic::Add | Mnemonic::Adc | Mnemonic::Sbc) => {
                return asm_err!(
                    self.loc,
                    "Z0408",
                    "The first operand of \"{mnemonic}\" must be \"a\""
                )
            }
            _ => return self.invalid(mnemonic, ops),
        };

        let alu = alu_index(mnemonic) << 3;
        match source {
            Operand::Reg(src) if is_std8(*src) => self.emit_ok(&[0x80 | alu | r(*src)]),
            Operand::Reg(src) if src.is_reg8_idx() => {
                self.emit_ok(&[prefix(*src), 0x80 | alu | r(*src)])
            }
            Operand::RegIndirect(Hl) => self.emit_ok(&[0x86 | alu]),
            Operand::IndexedIndirect { reg, offset } => {
                self.indexed(*reg, 0x86 | alu, offset.as_ref())
            }
            Operand::Expr(value) => {
                self.emit(&[0xC6 | alu]);
                self.emit_byte_expr(value)
            }
            _ => self.invalid(mnemonic, ops),
        }
    }

    fn inc_dec(&mut self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        let dec = (mnemonic == Mnemonic::Dec) as u8;
        match ops {
            [Operand::Reg(reg)] if is_std8(*reg) => self.emit_ok(&[0x04 | dec | r(*reg) << 3]),
            [Operand::Reg(reg)] if reg.is_reg8_idx() => {
                self.emit_ok(&[prefix(*reg), 0x04 | dec | r(*reg) << 3])
            }
            [Operand::Reg(reg)] if reg.is_reg16_std() => {
                self.emit_ok(&[0x03 | dec << 3 | rr(*reg)])
            }
            [Operand::Reg(reg)] if reg.is_reg16_idx() => {
                self.emit_ok(&[prefix(*reg), 0x23 | dec << 3])
            }
            [Operand::RegIndirect(Register::Hl)] => self.emit_ok(&[0x34 | dec]),
            [Operand::IndexedIndirect { reg, offset }] => {
                self.indexed(*reg, 0x34 | dec, offset.as_ref())
            }
            _ => self.invalid(mnemonic, ops),
        }
    }

    fn shift(&mut self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        let op = shift_index(mnemonic) << 3;
        match ops {
            [Operand::Reg(reg)] if is_std8(*reg) => self.emit_ok(&[0xCB, op | r(*reg)]),
            [Operand::RegIndirect(Register::Hl)] => self.emit_ok(&[0xCB, op | 6]),
            [Operand::IndexedIndirect { reg, offset }] => {
                self.indexed_cb(*reg, offset.as_ref(), op | 6)
            }
            [Operand::IndexedIndirect { reg, offset }, Operand::Reg(dst)] if is_std8(*dst) => {
                self.indexed_cb(*reg, offset.as_ref(), op | r(*dst))
            }
            _ => self.invalid(mnemonic, ops),
        }
    }

    fn bit_op(&mut self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        let base = match mnemonic {
            Mnemonic::Bit => 0x40,
            Mnemonic::Res => 0x80,
            _ => 0xC0,
        };
        let (bit, target, copy) = match ops {
            [Operand::Expr(bit), target] => (bit, target, None),
            [Operand::Expr(bit), target, Operand::Reg(copy)]
                if mnemonic != Mnemonic::Bit && is_std8(*copy) =>
            {
                (bit, target, Some(*copy))
            }
            _ => return self.invalid(mnemonic, ops),
        };
        let bit = self.eval_int(bit)?;
        if !(0..=7).contains(&bit) {
            return asm_err!(self.loc, "Z0407", "The bit index must be between 0 and 7, not {bit}");
        }
        let op = base | (bit as u8) << 3;

        match (target, copy) {
            (Operand::Reg(reg), None) if is_std8(*reg) => self.emit_ok(&[0xCB, op | r(*reg)]),
            (Operand::RegIndirect(Register::Hl), None) => self.emit_ok(&[0xCB, op | 6]),
            (Operand::IndexedIndirect { reg, offset }, copy) => {
                let low = copy.map_or(6, r);
                self.indexed_cb(*reg, offset.as_ref(), op | low)
            }
            _ => self.invalid(mnemonic, ops),
        }
    }

    /// Next instructions that take operands, or may.
    fn next_instruction(&mut self, mnemonic: Mnemonic, ops: &[Operand]) -> AsmResult<()> {
        use Register::*;
        match (mnemonic, ops) {
            (Mnemonic::Mul, [] | [Operand::Reg(D), Operand::Reg(E)]) => {
                self.emit_ok(&[0xED, 0x30])
            }
            (Mnemonic::Mirror, [] | [Operand::Reg(A)]) => self.emit_ok(&[0xED, 0x24]),
            (
                Mnemonic::Bsla | Mnemonic::Bsra | Mnemonic::Bsrl | Mnemonic::Bsrf | Mnemonic::Brlc,
                [] | [Operand::Reg(De), Operand::Reg(B)],
            ) => {
                let opcode = match mnemonic {
                    Mnemonic::Bsla => 0x28,
                    Mnemonic::Bsra => 0x29,
                    Mnemonic::Bsrl => 0x2A,
                    Mnemonic::Bsrf => 0x2B,
                    _ => 0x2C,
                };
                self.emit_ok(&[0xED, opcode])
            }
            (Mnemonic::Test, [Operand::Expr(value)]) => {
                self.emit(&[0xED, 0x27]);
                self.emit_byte_expr(value)
            }
            (Mnemonic::NextReg, [Operand::Expr(reg), Operand::Expr(value)]) => {
                self.emit(&[0xED, 0x91]);
                self.emit_byte_expr(reg)?;
                self.emit_byte_expr(value)
            }
            (Mnemonic::NextReg, [Operand::Expr(reg), Operand::Reg(A)]) => {
                self.emit(&[0xED, 0x92]);
                self.emit_byte_expr(reg)
            }
            _ => self.invalid(mnemonic, ops),
        }
    }
}
