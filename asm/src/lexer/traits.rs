use super::{
    names::{Condition, Mnemonic, Register},
    Punct, TokenKind,
};

bitflags::bitflags! {
    /// Parser-facing classification of a token kind.
    pub struct TokenTraits: u32 {
        const REG = 0x0001;
        const REG8 = 0x0002;
        const REG8_SPEC = 0x0004;
        const REG8_IDX = 0x0008;
        const REG16 = 0x0010;
        const REG16_SPEC = 0x0020;
        const REG16_IDX = 0x0040;
        const INSTRUCTION = 0x0080;
        const SIMPLE = 0x0100;
        const CONDITION = 0x0200;
        const REL_CONDITION = 0x0400;
        const EXPR_START = 0x0800;
        const MACRO_TIME_FN = 0x1000;
        const EXTENDED = 0x2000;
        const PRAGMA = 0x4000;
        const STATEMENT = 0x8000;
        const DIRECTIVE = 0x1_0000;
    }
}

impl Mnemonic {
    pub fn traits(&self) -> TokenTraits {
        let instruction = TokenTraits::INSTRUCTION;
        let simple = TokenTraits::INSTRUCTION | TokenTraits::SIMPLE;
        let extended = TokenTraits::INSTRUCTION | TokenTraits::EXTENDED;
        let simple_extended = simple | TokenTraits::EXTENDED;
        match self {
            Self::Ccf
            | Self::Cpd
            | Self::Cpdr
            | Self::Cpi
            | Self::Cpir
            | Self::Cpl
            | Self::Daa
            | Self::Di
            | Self::Ei
            | Self::Exx
            | Self::Halt
            | Self::Ind
            | Self::Indr
            | Self::Ini
            | Self::Inir
            | Self::Ldd
            | Self::Lddr
            | Self::Ldi
            | Self::Ldir
            | Self::Neg
            | Self::Nop
            | Self::Otdr
            | Self::Otir
            | Self::Outd
            | Self::Outi
            | Self::Reti
            | Self::Retn
            | Self::Rla
            | Self::Rlca
            | Self::Rld
            | Self::Rra
            | Self::Rrca
            | Self::Rrd
            | Self::Scf => simple,

            Self::Lddrx
            | Self::Lddx
            | Self::Ldirx
            | Self::Ldix
            | Self::Ldpirx
            | Self::Ldws
            | Self::OutInB
            | Self::PixelAd
            | Self::PixelDn
            | Self::SetAE
            | Self::SwapNib => simple_extended,

            Self::Brlc
            | Self::Bsla
            | Self::Bsra
            | Self::Bsrf
            | Self::Bsrl
            | Self::Mirror
            | Self::Mul
            | Self::NextReg
            | Self::Test => extended,

            _ => instruction,
        }
    }
}

impl Register {
    pub fn traits(&self) -> TokenTraits {
        let reg = TokenTraits::REG;
        match self {
            Self::A | Self::B | Self::D | Self::E | Self::H | Self::L => reg | TokenTraits::REG8,
            Self::C => {
                reg | TokenTraits::REG8 | TokenTraits::CONDITION | TokenTraits::REL_CONDITION
            }
            Self::I | Self::R => reg | TokenTraits::REG8_SPEC,
            Self::Xh | Self::Xl | Self::Yh | Self::Yl => reg | TokenTraits::REG8_IDX,
            Self::Af | Self::AfPrime => reg | TokenTraits::REG16_SPEC,
            Self::Bc | Self::De | Self::Hl | Self::Sp => reg | TokenTraits::REG16,
            Self::Ix | Self::Iy => reg | TokenTraits::REG16_IDX,
        }
    }
}

impl Condition {
    pub fn traits(&self) -> TokenTraits {
        if self.is_relative() {
            TokenTraits::CONDITION | TokenTraits::REL_CONDITION
        } else {
            TokenTraits::CONDITION
        }
    }
}

impl TokenKind {
    pub fn traits(&self) -> TokenTraits {
        match self {
            Self::Mnemonic(mnemonic) => mnemonic.traits(),
            Self::Register(register) => register.traits(),
            Self::Condition(condition) => condition.traits(),
            Self::Pragma(_) => TokenTraits::PRAGMA,
            Self::Statement(_) => TokenTraits::STATEMENT,
            Self::Directive(_) => TokenTraits::DIRECTIVE,
            Self::MacroFn(_) => TokenTraits::EXPR_START | TokenTraits::MACRO_TIME_FN,
            Self::Identifier
            | Self::Number(_)
            | Self::Real(_)
            | Self::Bool(_)
            | Self::Str(_)
            | Self::TextFn(_)
            | Self::CurrentAddress
            | Self::LoopCounter
            | Self::MacroParam(_) => TokenTraits::EXPR_START,
            Self::Punct(
                Punct::ParenOpen
                | Punct::BracketOpen
                | Punct::Plus
                | Punct::Minus
                | Punct::Tilde
                | Punct::Bang
                | Punct::DoubleColon,
            ) => TokenTraits::EXPR_START,
            Self::Punct(_) | Self::Eol => TokenTraits::empty(),
        }
    }
}
