use std::fmt::{self, Display, Formatter};

/// Declares a case-insensitive keyword enum. The first text of each entry is
/// the canonical spelling, the rest are aliases.
macro_rules! keywords {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal $(| $alias:literal)*),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub fn parse(name: &str) -> Option<Self> {
                match name.to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Some(Self::$variant),)*
                    _ => None,
                }
            }

            #[inline]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),*
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

keywords!(Mnemonic {
    Adc => "adc",
    Add => "add",
    And => "and",
    Bit => "bit",
    Brlc => "brlc",
    Bsla => "bsla",
    Bsra => "bsra",
    Bsrf => "bsrf",
    Bsrl => "bsrl",
    Call => "call",
    Ccf => "ccf",
    Cp => "cp",
    Cpd => "cpd",
    Cpdr => "cpdr",
    Cpi => "cpi",
    Cpir => "cpir",
    Cpl => "cpl",
    Daa => "daa",
    Dec => "dec",
    Di => "di",
    Djnz => "djnz",
    Ei => "ei",
    Ex => "ex",
    Exx => "exx",
    Halt => "halt",
    Im => "im",
    In => "in",
    Inc => "inc",
    Ind => "ind",
    Indr => "indr",
    Ini => "ini",
    Inir => "inir",
    Jp => "jp",
    Jr => "jr",
    Ld => "ld",
    Ldd => "ldd",
    Lddr => "lddr",
    Lddrx => "lddrx" | "ldrx",
    Lddx => "lddx",
    Ldi => "ldi",
    Ldir => "ldir",
    Ldirx => "ldirx" | "lirx",
    Ldix => "ldix",
    Ldpirx => "ldpirx" | "lprx",
    Ldws => "ldws",
    Mirror => "mirror",
    Mul => "mul",
    Neg => "neg",
    NextReg => "nextreg",
    Nop => "nop",
    Or => "or",
    Otdr => "otdr",
    Otir => "otir",
    Out => "out",
    Outd => "outd",
    Outi => "outi",
    OutInB => "outinb" | "otib",
    PixelAd => "pixelad" | "pxad",
    PixelDn => "pixeldn" | "pxdn",
    Pop => "pop",
    Push => "push",
    Res => "res",
    Ret => "ret",
    Reti => "reti",
    Retn => "retn",
    Rl => "rl",
    Rla => "rla",
    Rlc => "rlc",
    Rlca => "rlca",
    Rld => "rld",
    Rr => "rr",
    Rra => "rra",
    Rrc => "rrc",
    Rrca => "rrca",
    Rrd => "rrd",
    Rst => "rst",
    Sbc => "sbc",
    Scf => "scf",
    Set => "set",
    SetAE => "setae" | "stae",
    Sla => "sla",
    Sll => "sll" | "sl1",
    Sra => "sra",
    Srl => "srl",
    Sub => "sub",
    SwapNib => "swapnib" | "swap",
    Test => "test",
    Xor => "xor",
});

keywords!(Register {
    A => "a",
    B => "b",
    C => "c",
    D => "d",
    E => "e",
    H => "h",
    L => "l",
    I => "i",
    R => "r",
    Xh => "xh" | "ixh",
    Xl => "xl" | "ixl",
    Yh => "yh" | "iyh",
    Yl => "yl" | "iyl",
    Af => "af",
    AfPrime => "af'",
    Bc => "bc",
    De => "de",
    Hl => "hl",
    Ix => "ix",
    Iy => "iy",
    Sp => "sp",
});

impl Register {
    /// The 3-bit encoding of an 8-bit register in the `r` opcode field.
    #[inline]
    pub fn reg8_index(&self) -> Option<u8> {
        match self {
            Self::B => Some(0),
            Self::C => Some(1),
            Self::D => Some(2),
            Self::E => Some(3),
            Self::H | Self::Xh | Self::Yh => Some(4),
            Self::L | Self::Xl | Self::Yl => Some(5),
            Self::A => Some(7),
            _ => None,
        }
    }

    /// The 2-bit encoding of a register pair in the `rr` opcode field.
    #[inline]
    pub fn reg16_index(&self) -> Option<u8> {
        match self {
            Self::Bc => Some(0),
            Self::De => Some(1),
            Self::Hl | Self::Ix | Self::Iy => Some(2),
            Self::Sp | Self::Af => Some(3),
            _ => None,
        }
    }

    /// The prefix byte that selects an index register, if any.
    #[inline]
    pub fn index_prefix(&self) -> Option<u8> {
        match self {
            Self::Ix | Self::Xh | Self::Xl => Some(0xDD),
            Self::Iy | Self::Yh | Self::Yl => Some(0xFD),
            _ => None,
        }
    }

    #[inline]
    pub fn is_reg8_std(&self) -> bool {
        matches!(
            self,
            Self::A | Self::B | Self::C | Self::D | Self::E | Self::H | Self::L
        )
    }

    #[inline]
    pub fn is_reg8_spec(&self) -> bool {
        matches!(self, Self::I | Self::R)
    }

    #[inline]
    pub fn is_reg8_idx(&self) -> bool {
        matches!(self, Self::Xh | Self::Xl | Self::Yh | Self::Yl)
    }

    #[inline]
    pub fn is_reg8(&self) -> bool {
        self.is_reg8_std() || self.is_reg8_spec() || self.is_reg8_idx()
    }

    #[inline]
    pub fn is_reg16_std(&self) -> bool {
        matches!(self, Self::Bc | Self::De | Self::Hl | Self::Sp)
    }

    #[inline]
    pub fn is_reg16_idx(&self) -> bool {
        matches!(self, Self::Ix | Self::Iy)
    }
}

keywords!(Condition {
    Nz => "nz",
    Z => "z",
    Nc => "nc",
    C => "c",
    Po => "po",
    Pe => "pe",
    P => "p",
    M => "m",
});

impl Condition {
    /// The 3-bit encoding in the `cc` opcode field.
    #[inline]
    pub fn index(&self) -> u8 {
        match self {
            Self::Nz => 0,
            Self::Z => 1,
            Self::Nc => 2,
            Self::C => 3,
            Self::Po => 4,
            Self::Pe => 5,
            Self::P => 6,
            Self::M => 7,
        }
    }

    /// Conditions usable with `jr`.
    #[inline]
    pub fn is_relative(&self) -> bool {
        matches!(self, Self::Nz | Self::Z | Self::Nc | Self::C)
    }
}

keywords!(PragmaName {
    Org => "org",
    Xorg => "xorg",
    Ent => "ent",
    Xent => "xent",
    Disp => "disp",
    Equ => "equ",
    Var => "var",
    Bank => "bank",
    Skip => "skip",
    Defb => "defb" | "db",
    Defw => "defw" | "dw",
    Defm => "defm" | "dm",
    Defn => "defn" | "dn",
    Defc => "defc" | "dc",
    Defh => "defh" | "dh",
    Defs => "defs" | "ds",
    Fillb => "fillb",
    Fillw => "fillw",
    Defg => "defg" | "dg",
    Defgx => "defgx" | "dgx",
    Model => "model",
    Align => "align",
    Error => "error",
    IncludeBin => "includebin" | "include_bin",
    Trace => "trace",
    TraceHex => "tracehex",
    RndSeed => "rndseed",
    CompareBin => "comparebin",
});

keywords!(StatementName {
    Macro => "macro",
    Endm => "endm" | "mend",
    Proc => "proc",
    Endp => "endp" | "pend",
    Loop => "loop",
    Endl => "endl" | "lend",
    Repeat => "repeat",
    Until => "until",
    While => "while",
    Endw => "endw" | "wend",
    If => "if",
    IfUsed => "ifused",
    IfNUsed => "ifnused",
    Elif => "elif",
    Else => "else",
    Endif => "endif",
    For => "for",
    To => "to",
    Step => "step",
    Next => "next",
    Break => "break",
    Continue => "continue",
    Module => "module" | "scope",
    EndModule => "endmodule" | "endscope" | "moduleend" | "scopeend",
    Struct => "struct",
    Ends => "ends",
    Local => "local",
});

impl StatementName {
    /// Statements that may be written without the leading dot.
    #[inline]
    pub fn allows_bare(&self) -> bool {
        matches!(
            self,
            Self::Endm
                | Self::Proc
                | Self::Endp
                | Self::Loop
                | Self::Endl
                | Self::Repeat
                | Self::Until
                | Self::While
                | Self::Endw
                | Self::Elif
                | Self::Else
                | Self::Endif
                | Self::To
                | Self::Step
                | Self::Next
                | Self::Break
                | Self::Continue
                | Self::Ends
        )
    }
}

keywords!(DirectiveName {
    Define => "define",
    Undef => "undef",
    If => "if",
    IfDef => "ifdef",
    IfNDef => "ifndef",
    IfMod => "ifmod",
    IfNMod => "ifnmod",
    Else => "else",
    Elif => "elif",
    Endif => "endif",
    Include => "include",
    Line => "line",
});

keywords!(MacroFn {
    Def => "def",
    IsReg8 => "isreg8",
    IsReg8Std => "isreg8std",
    IsReg8Spec => "isreg8spec",
    IsReg8Idx => "isreg8idx",
    IsReg16 => "isreg16",
    IsReg16Std => "isreg16std",
    IsReg16Idx => "isreg16idx",
    IsRegIndirect => "isregindirect",
    IsCPort => "iscport",
    IsIndexedAddr => "isindexedaddr",
    IsCondition => "iscondition",
    IsExpr => "isexpr",
    IsRegA => "isrega",
    IsRegAf => "isregaf",
    IsRegB => "isregb",
    IsRegC => "isregc",
    IsRegBc => "isregbc",
    IsRegD => "isregd",
    IsRegE => "isrege",
    IsRegDe => "isregde",
    IsRegH => "isregh",
    IsRegL => "isregl",
    IsRegHl => "isreghl",
    IsRegI => "isregi",
    IsRegR => "isregr",
    IsRegXh => "isregxh",
    IsRegXl => "isregxl",
    IsRegIx => "isregix",
    IsRegYh => "isregyh",
    IsRegYl => "isregyl",
    IsRegIy => "isregiy",
    IsRegSp => "isregsp",
});

impl MacroFn {
    /// The register tested by the `isreg<name>` family.
    pub fn register(&self) -> Option<Register> {
        match self {
            Self::IsRegA => Some(Register::A),
            Self::IsRegAf => Some(Register::Af),
            Self::IsRegB => Some(Register::B),
            Self::IsRegC => Some(Register::C),
            Self::IsRegBc => Some(Register::Bc),
            Self::IsRegD => Some(Register::D),
            Self::IsRegE => Some(Register::E),
            Self::IsRegDe => Some(Register::De),
            Self::IsRegH => Some(Register::H),
            Self::IsRegL => Some(Register::L),
            Self::IsRegHl => Some(Register::Hl),
            Self::IsRegI => Some(Register::I),
            Self::IsRegR => Some(Register::R),
            Self::IsRegXh => Some(Register::Xh),
            Self::IsRegXl => Some(Register::Xl),
            Self::IsRegIx => Some(Register::Ix),
            Self::IsRegYh => Some(Register::Yh),
            Self::IsRegYl => Some(Register::Yl),
            Self::IsRegIy => Some(Register::Iy),
            Self::IsRegSp => Some(Register::Sp),
            _ => None,
        }
    }
}

keywords!(TextFn {
    TextOf => "textof",
    LTextOf => "ltextof",
});
