use crate::{
    error::AssemblerError,
    expr::Expr,
    lexer::{Condition, MacroFn, Mnemonic, Register},
    source::SourceLoc,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// An omitted operand, such as an empty macro argument.
    None,
    Reg(Register),
    /// `(bc)`, `(de)`, `(hl)`, `(sp)`
    RegIndirect(Register),
    /// `(c)`
    CPort,
    /// `(ix)`, `(iy+d)`, `(ix-d)`. A negative displacement is already negated.
    IndexedIndirect {
        reg: Register,
        offset: Option<Expr>,
    },
    /// `(nn)`
    MemIndirect(Expr),
    Expr(Expr),
    Condition(Condition),
}

impl Operand {
    #[inline]
    pub fn reg(&self) -> Option<Register> {
        match self {
            Self::Reg(reg) => Some(*reg),
            _ => None,
        }
    }

    /// The condition named by the operand. `c` lexes as a register.
    #[inline]
    pub fn condition(&self) -> Option<Condition> {
        match self {
            Self::Condition(condition) => Some(*condition),
            Self::Reg(Register::C) => Some(Condition::C),
            _ => None,
        }
    }
}

impl MacroFn {
    /// Inspects the shape of an operand.
    pub fn test(&self, operand: &Operand) -> bool {
        if let Some(register) = self.register() {
            return operand.reg() == Some(register);
        }
        match self {
            Self::Def => match operand {
                Operand::None => false,
                Operand::Expr(expr) => expr.as_str_literal() != Some(""),
                _ => true,
            },
            Self::IsReg8 => operand.reg().map_or(false, |reg| reg.is_reg8()),
            Self::IsReg8Std => operand.reg().map_or(false, |reg| reg.is_reg8_std()),
            Self::IsReg8Spec => operand.reg().map_or(false, |reg| reg.is_reg8_spec()),
            Self::IsReg8Idx => operand.reg().map_or(false, |reg| reg.is_reg8_idx()),
            Self::IsReg16 => operand
                .reg()
                .map_or(false, |reg| reg.is_reg16_std() || reg.is_reg16_idx()),
            Self::IsReg16Std => operand.reg().map_or(false, |reg| reg.is_reg16_std()),
            Self::IsReg16Idx => operand.reg().map_or(false, |reg| reg.is_reg16_idx()),
            Self::IsRegIndirect => matches!(
                operand,
                Operand::RegIndirect(Register::Bc | Register::De | Register::Hl)
            ),
            Self::IsCPort => matches!(operand, Operand::CPort),
            Self::IsIndexedAddr => matches!(operand, Operand::IndexedIndirect { .. }),
            Self::IsCondition => operand.condition().is_some(),
            Self::IsExpr => matches!(operand, Operand::Expr(_)),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pragma {
    Org(Expr),
    Xorg(Expr),
    Ent(Expr),
    Xent(Expr),
    Disp(Expr),
    Equ(Expr),
    Var(Expr),
    Bank {
        bank: Expr,
        offset: Option<Expr>,
    },
    Skip {
        target: Expr,
        fill: Option<Expr>,
    },
    Defb(Vec<Expr>),
    Defw(Vec<Expr>),
    Defm(Expr),
    Defn(Expr),
    Defc(Expr),
    Defh(Expr),
    Defs {
        count: Expr,
        fill: Option<Expr>,
    },
    Fillb {
        count: Expr,
        value: Expr,
    },
    Fillw {
        count: Expr,
        value: Expr,
    },
    Defg(String),
    Defgx(Expr),
    Model(String),
    Align(Option<Expr>),
    Error(Expr),
    IncludeBin {
        path: Expr,
        offset: Option<Expr>,
        length: Option<Expr>,
    },
    /// `.trace` and `.tracehex`
    Trace {
        hex: bool,
        values: Vec<Expr>,
    },
    RndSeed(Option<Expr>),
    CompareBin {
        path: Expr,
        offset: Option<Expr>,
        length: Option<Expr>,
    },
}

impl Pragma {
    /// Pragmas allowed in struct bodies and field assignments.
    pub fn emits_bytes(&self) -> bool {
        matches!(
            self,
            Self::Defb(_)
                | Self::Defw(_)
                | Self::Defm(_)
                | Self::Defn(_)
                | Self::Defc(_)
                | Self::Defh(_)
                | Self::Defs { .. }
                | Self::Fillb { .. }
                | Self::Fillw { .. }
                | Self::Defg(_)
                | Self::Defgx(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SymbolRef {
    pub name: String,
    pub root: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Macro(Vec<String>),
    Endm,
    Proc,
    Endp,
    Loop(Expr),
    Endl,
    Repeat,
    Until(Expr),
    While(Expr),
    Endw,
    If(Expr),
    IfUsed(SymbolRef),
    IfNUsed(SymbolRef),
    Elif(Expr),
    Else,
    Endif,
    For {
        var: String,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
    },
    Next,
    Break,
    Continue,
    Module(Option<String>),
    EndModule,
    Struct,
    Ends,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MacroArg {
    pub operand: Operand,
    /// Source text of the argument as the caller wrote it.
    pub text: String,
    pub loc: SourceLoc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<MacroArg>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Instruction(Instruction),
    Pragma(Pragma),
    Statement(Statement),
    Invocation(Invocation),
    FieldAssignment(Pragma),
    /// A line that still holds `{{param}}` placeholders.
    Template,
    /// An expanded macro line that does not parse. Reported when reached.
    Invalid(SourceLoc, AssemblerError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub name: String,
    pub loc: SourceLoc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub loc: SourceLoc,
    pub text: String,
    pub label: Option<Label>,
    pub body: Option<Body>,
    pub body_loc: SourceLoc,
}

impl Line {
    #[inline]
    pub fn statement(&self) -> Option<&Statement> {
        match &self.body {
            Some(Body::Statement(statement)) => Some(statement),
            _ => None,
        }
    }
}

/// A preprocessor directive line.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Define(String),
    Undef(String),
    If(Expr),
    IfDef(String),
    IfNDef(String),
    IfMod(String),
    IfNMod(String),
    Elif(Expr),
    Else,
    Endif,
    Include(String),
    Line(Expr),
}

/// A line, or a block statement together with the lines it encloses.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Line(Line),
    /// `.loop`, `.repeat`, `.while`, `.for`, `.module`, `.proc`, and `.struct`.
    Block {
        head: Line,
        body: Vec<Node>,
        end: Line,
    },
    /// `.if`/`.ifused`/`.ifnused` followed by `.elif` and `.else` sections.
    If {
        sections: Vec<(Line, Vec<Node>)>,
        end: Line,
    },
    /// Macro bodies stay as source text until they are invoked.
    Macro {
        head: Line,
        params: Vec<String>,
        body: Vec<Line>,
        end: Line,
    },
}

impl Node {
    pub fn loc(&self) -> SourceLoc {
        match self {
            Self::Line(line) | Self::Block { head: line, .. } | Self::Macro { head: line, .. } => {
                line.loc
            }
            Self::If { sections, end } => sections.first().map_or(end.loc, |(head, _)| head.loc),
        }
    }
}
