mod blocks;


pub use blocks::build_blocks;

use crate::{
    ast::{
        Body, Directive, Instruction, Invocation, Label, Line, MacroArg, Operand, Pragma, Statement,
        SymbolRef,
    },
    error::AsmResult,
    expr::{Expr, ExprNode},
    lexer::{
        DirectiveName, Mnemonic, PragmaName, Punct, Register, StatementName, TextFn, Token, TokenKind,
        TokenStream, TokenTraits,
    },
    source::{FileId, SourceLoc},
};

/// Parses one source line into its label and body.
pub fn parse_line(file: FileId, line: usize, text: &str) -> AsmResult<Line> {
    Parser::new(file, line, text)?.parse()
}

/// Parses a `#` directive line.
pub fn parse_directive(file: FileId, line: usize, text: &str) -> AsmResult<Directive> {
    let mut parser = Parser::new(file, line, text)?;
    let directive = parser.directive()?;
    parser.expect_eol()?;
    Ok(directive)
}

struct Parser<'a> {
    text: &'a str,
    tokens: TokenStream,
    loc: SourceLoc,
}

impl<'a> Parser<'a> {
    fn new(file: FileId, line: usize, text: &'a str) -> AsmResult<Self> {
        Ok(Self {
            text,
            tokens: TokenStream::tokenize(file, line, text)?,
            loc: SourceLoc::new(file, line, 1),
        })
    }

    fn parse(mut self) -> AsmResult<Line> {
        let template = self
            .tokens
            .tokens()
            .iter()
            .any(|token| matches!(token.kind, TokenKind::MacroParam(_)));
        if template {
            return Ok(Line {
                loc: self.loc,
                text: self.text.to_string(),
                label: None,
                body: Some(Body::Template),
                body_loc: self.tokens.peek().loc,
            });
        }
        if let Some(token) = self
            .tokens
            .tokens()
            .iter()
            .find(|token| token.is_punct(Punct::DoubleBraceOpen))
        {
            return asm_err!(token.loc, "Z0006", "Expected \"}}}}\" to close the macro parameter");
        }

        let label = self.label();
        let body_loc = self.tokens.peek().loc;
        let body = self.body()?;
        self.expect_eol()?;
        Ok(Line {
            loc: self.loc,
            text: self.text.to_string(),
            label,
            body,
            body_loc,
        })
    }

    #[inline]
    fn peeked_punct(&self, punct: Punct) -> Option<&Token> {
        let token = self.tokens.peek();
        if token.is_punct(punct) {
            Some(token)
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    fn expect_punct(&mut self, punct: Punct, code: &'static str) -> AsmResult<Token> {
        let token = self.tokens.next();
        if token.is_punct(punct) {
            Ok(token)
        } else {
            asm_err!(token.loc, code, "Unexpected {token}, expected \"{punct}\"")
        }
    }

    #[must_use]
    fn expect_identifier(&mut self) -> AsmResult<Token> {
        let token = self.tokens.next();
        match token.kind {
            TokenKind::Identifier => Ok(token),
            _ => asm_err!(token.loc, "Z0007", "Unexpected {token}, expected an identifier"),
        }
    }

    #[must_use]
    fn expect_eol(&mut self) -> AsmResult<()> {
        let token = self.tokens.peek();
        if token.is_eol() {
            Ok(())
        } else {
            asm_err!(token.loc, "Z0008", "Unexpected {token}, expected the end of the line")
        }
    }

    /// An identifier or a keyword used as a plain name.
    #[must_use]
    fn expect_name(&mut self) -> AsmResult<Token> {
        let token = self.tokens.next();
        match token.kind {
            TokenKind::Eol
            | TokenKind::Punct(_)
            | TokenKind::Number(_)
            | TokenKind::Real(_)
            | TokenKind::Bool(_)
            | TokenKind::Str(_) => {
                asm_err!(token.loc, "Z0007", "Unexpected {token}, expected a name")
            }
            _ => Ok(token),
        }
    }

    fn directive(&mut self) -> AsmResult<Directive> {
        let token = self.tokens.next();
        let name = match token.kind {
            TokenKind::Directive(name) => name,
            _ => return asm_err!(token.loc, "Z0002", "Unexpected {token}, expected a directive"),
        };
        let directive = match name {
            DirectiveName::Define => Directive::Define(self.expect_identifier()?.text),
            DirectiveName::Undef => Directive::Undef(self.expect_identifier()?.text),
            DirectiveName::If => Directive::If(self.expr()?),
            DirectiveName::IfDef => Directive::IfDef(self.expect_identifier()?.text),
            DirectiveName::IfNDef => Directive::IfNDef(self.expect_identifier()?.text),
            DirectiveName::IfMod => Directive::IfMod(self.expect_name()?.text),
            DirectiveName::IfNMod => Directive::IfNMod(self.expect_name()?.text),
            DirectiveName::Elif => Directive::Elif(self.expr()?),
            DirectiveName::Else => Directive::Else,
            DirectiveName::Endif => Directive::Endif,
            DirectiveName::Include => {
                let path = self.tokens.next();
                match path.kind {
                    TokenKind::Str(path) => Directive::Include(path),
                    _ => {
                        return asm_err!(path.loc, "Z0105", "Unexpected {path}, expected a file name")
                    }
                }
            }
            DirectiveName::Line => {
                let line = self.expr()?;
                if matches!(self.tokens.peek().kind, TokenKind::Str(_)) {
                    self.tokens.next();
                }
                Directive::Line(line)
            }
        };
        Ok(directive)
    }

    /// A leading identifier not followed by `(` names a label. A Next-only
    /// mnemonic names one when a colon follows it.
    fn label(&mut self) -> Option<Label> {
        let token = self.tokens.peek();
        let is_label = match token.kind {
            TokenKind::Identifier => !self.tokens.ahead(1).is_punct(Punct::ParenOpen),
            _ => is_extended_name(token) && self.tokens.ahead(1).is_punct(Punct::Colon),
        };
        if !is_label {
            return None;
        }
        let token = self.tokens.next();
        if self.peeked_punct(Punct::Colon).is_some() {
            self.tokens.next();
        }
        Some(Label {
            name: token.text,
            loc: token.loc,
        })
    }

    fn body(&mut self) -> AsmResult<Option<Body>> {
        let token = self.tokens.peek().clone();
        let body = match &token.kind {
            TokenKind::Eol => return Ok(None),

            TokenKind::Pragma(name) => {
                self.tokens.next();
                Body::Pragma(self.pragma(*name)?)
            }

            TokenKind::Punct(Punct::Equal | Punct::Assign) => {
                self.tokens.next();
                Body::Pragma(Pragma::Var(self.expr()?))
            }

            TokenKind::Punct(Punct::Arrow) => {
                self.tokens.next();
                let next = self.tokens.next();
                let pragma = match next.kind {
                    TokenKind::Pragma(name) => self.pragma(name)?,
                    _ => {
                        return asm_err!(
                            next.loc,
                            "Z0002",
                            "Unexpected {next}, expected a data pragma after \"->\""
                        )
                    }
                };
                if !pragma.emits_bytes() {
                    return asm_err!(
                        next.loc,
                        "Z0002",
                        "Only data pragmas can be used in a field assignment"
                    );
                }
                Body::FieldAssignment(pragma)
            }

            TokenKind::Mnemonic(mnemonic) => {
                self.tokens.next();
                Body::Instruction(self.instruction(*mnemonic)?)
            }

            TokenKind::Statement(name) => {
                self.tokens.next();
                Body::Statement(self.statement(*name, &token)?)
            }

            TokenKind::Identifier => {
                self.tokens.next();
                self.expect_punct(Punct::ParenOpen, "Z0004")?;
                Body::Invocation(Invocation {
                    name: token.text.clone(),
                    args: self.macro_args()?,
                })
            }

            _ => return asm_err!(token.loc, "Z0002", "Unexpected {token}"),
        };
        Ok(Some(body))
    }

    fn instruction(&mut self, mnemonic: Mnemonic) -> AsmResult<Instruction> {
        let mut operands = Vec::new();
        if mnemonic.traits().contains(TokenTraits::SIMPLE) || self.tokens.is_eol() {
            return Ok(Instruction { mnemonic, operands });
        }
        loop {
            let token = self.tokens.peek().clone();
            if token.is_eol() || token.is_punct(Punct::Comma) {
                return asm_err!(token.loc, "Z0101", "Unexpected {token}, expected an operand");
            }
            operands.push(self.operand()?);
            if self.peeked_punct(Punct::Comma).is_none() {
                break;
            }
            if operands.len() == 3 {
                let token = self.tokens.peek();
                return asm_err!(token.loc, "Z0008", "Too many operands for \"{mnemonic}\"");
            }
            self.tokens.next();
        }
        Ok(Instruction { mnemonic, operands })
    }

    /// Operands in priority order: registers, conditions, indirections, and
    /// then plain expressions.
    fn operand(&mut self) -> AsmResult<Operand> {
        let token = self.tokens.peek().clone();
        match token.kind {
            TokenKind::Register(reg) => {
                self.tokens.next();
                Ok(Operand::Reg(reg))
            }
            TokenKind::Condition(condition) => {
                self.tokens.next();
                Ok(Operand::Condition(condition))
            }
            TokenKind::Punct(Punct::ParenOpen) => self.paren_operand(),
            _ if token.traits().contains(TokenTraits::EXPR_START) || is_extended_name(&token) => {
                Ok(Operand::Expr(self.expr()?))
            }
            _ => asm_err!(token.loc, "Z0101", "Unexpected {token}, expected an operand"),
        }
    }

    fn paren_operand(&mut self) -> AsmResult<Operand> {
        let start = self.tokens.position();
        self.tokens.next();

        if let TokenKind::Register(reg) = self.tokens.peek().kind {
            let reg_token = self.tokens.next();
            return match reg {
                Register::Ix | Register::Iy => {
                    let token = self.tokens.peek().clone();
                    if token.is_punct(Punct::ParenClose) {
                        self.tokens.next();
                        return Ok(Operand::IndexedIndirect { reg, offset: None });
                    }
                    if !token.is_punct(Punct::Plus) && !token.is_punct(Punct::Minus) {
                        return asm_err!(
                            token.loc,
                            "Z0005",
                            "Unexpected {token}, expected \"+\", \"-\" or \")\""
                        );
                    }
                    // The sign is parsed as a unary operator of the displacement
                    let offset = self.expr()?;
                    self.expect_punct(Punct::ParenClose, "Z0005")?;
                    Ok(Operand::IndexedIndirect {
                        reg,
                        offset: Some(offset),
                    })
                }
                Register::C if self.peeked_punct(Punct::ParenClose).is_some() => {
                    self.tokens.next();
                    Ok(Operand::CPort)
                }
                Register::Bc | Register::De | Register::Hl | Register::Sp => {
                    self.expect_punct(Punct::ParenClose, "Z0005")?;
                    Ok(Operand::RegIndirect(reg))
                }
                _ => asm_err!(
                    reg_token.loc,
                    "Z0103",
                    "The register \"{reg}\" cannot be used in an indirection"
                ),
            };
        }

        let mut nodes = Vec::new();
        self.expr_prec_0(&mut nodes)?;
        if self.peeked_punct(Punct::ParenClose).is_some() {
            self.tokens.next();
            let next = self.tokens.peek();
            if next.is_eol() || next.is_punct(Punct::Comma) || next.is_punct(Punct::ParenClose) {
                return Ok(Operand::MemIndirect(Expr::new(nodes)));
            }
        }

        // Something like `(1 + 2) * 3` is an ordinary expression
        self.tokens.rewind(start);
        Ok(Operand::Expr(self.expr()?))
    }

    /// Arguments after the opening parenthesis of an invocation, keeping the
    /// text the caller wrote for each of them.
    fn macro_args(&mut self) -> AsmResult<Vec<MacroArg>> {
        let mut args = Vec::new();
        if self.peeked_punct(Punct::ParenClose).is_some() {
            self.tokens.next();
            return Ok(args);
        }
        loop {
            let start = self.tokens.position();
            let token = self.tokens.peek().clone();
            let operand = if token.is_punct(Punct::Comma) || token.is_punct(Punct::ParenClose) {
                Operand::None
            } else {
                self.operand()?
            };
            let from = self.tokens.offset_of(start);
            let to = if self.tokens.position() == start {
                from
            } else {
                self.tokens.consumed_end()
            };
            args.push(MacroArg {
                operand,
                text: self.text[from..to].trim().to_string(),
                loc: token.loc,
            });

            let token = self.tokens.next();
            match token.kind {
                TokenKind::Punct(Punct::Comma) => {}
                TokenKind::Punct(Punct::ParenClose) => break,
                _ => return asm_err!(token.loc, "Z0005", "Unexpected {token}, expected \")\""),
            }
        }
        Ok(args)
    }

    fn expr_list(&mut self) -> AsmResult<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.peeked_punct(Punct::Comma).is_some() {
            self.tokens.next();
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn optional_expr(&mut self) -> AsmResult<Option<Expr>> {
        if self.peeked_punct(Punct::Comma).is_some() {
            self.tokens.next();
            Ok(Some(self.expr()?))
        } else {
            Ok(None)
        }
    }

    fn pragma(&mut self, name: PragmaName) -> AsmResult<Pragma> {
        let pragma = match name {
            PragmaName::Org => Pragma::Org(self.expr()?),
            PragmaName::Xorg => Pragma::Xorg(self.expr()?),
            PragmaName::Ent => Pragma::Ent(self.expr()?),
            PragmaName::Xent => Pragma::Xent(self.expr()?),
            PragmaName::Disp => Pragma::Disp(self.expr()?),
            PragmaName::Equ => Pragma::Equ(self.expr()?),
            PragmaName::Var => Pragma::Var(self.expr()?),
            PragmaName::Bank => Pragma::Bank {
                bank: self.expr()?,
                offset: self.optional_expr()?,
            },
            PragmaName::Skip => Pragma::Skip {
                target: self.expr()?,
                fill: self.optional_expr()?,
            },
            PragmaName::Defb => Pragma::Defb(self.expr_list()?),
            PragmaName::Defw => Pragma::Defw(self.expr_list()?),
            PragmaName::Defm => Pragma::Defm(self.expr()?),
            PragmaName::Defn => Pragma::Defn(self.expr()?),
            PragmaName::Defc => Pragma::Defc(self.expr()?),
            PragmaName::Defh => Pragma::Defh(self.expr()?),
            PragmaName::Defs => Pragma::Defs {
                count: self.expr()?,
                fill: self.optional_expr()?,
            },
            PragmaName::Fillb | PragmaName::Fillw => {
                let count = self.expr()?;
                self.expect_punct(Punct::Comma, "Z0003")?;
                let value = self.expr()?;
                if name == PragmaName::Fillb {
                    Pragma::Fillb { count, value }
                } else {
                    Pragma::Fillw { count, value }
                }
            }
            PragmaName::Defg => Pragma::Defg(self.tokens.raw_tail().unwrap_or_default().to_string()),
            PragmaName::Defgx => Pragma::Defgx(self.expr()?),
            PragmaName::Model => Pragma::Model(self.expect_name()?.text),
            PragmaName::Align => {
                if self.tokens.is_eol() {
                    Pragma::Align(None)
                } else {
                    Pragma::Align(Some(self.expr()?))
                }
            }
            PragmaName::Error => Pragma::Error(self.expr()?),
            PragmaName::IncludeBin | PragmaName::CompareBin => {
                let path = self.expr()?;
                let offset = self.optional_expr()?;
                let length = if offset.is_some() {
                    self.optional_expr()?
                } else {
                    None
                };
                if name == PragmaName::IncludeBin {
                    Pragma::IncludeBin {
                        path,
                        offset,
                        length,
                    }
                } else {
                    Pragma::CompareBin {
                        path,
                        offset,
                        length,
                    }
                }
            }
            PragmaName::Trace | PragmaName::TraceHex => Pragma::Trace {
                hex: name == PragmaName::TraceHex,
                values: self.expr_list()?,
            },
            PragmaName::RndSeed => {
                if self.tokens.is_eol() {
                    Pragma::RndSeed(None)
                } else {
                    Pragma::RndSeed(Some(self.expr()?))
                }
            }
        };
        Ok(pragma)
    }

    fn symbol_ref(&mut self) -> AsmResult<SymbolRef> {
        let root = self.peeked_punct(Punct::DoubleColon).is_some();
        if root {
            self.tokens.next();
        }
        let token = self.expect_identifier()?;
        Ok(SymbolRef {
            name: token.text,
            root,
        })
    }

    fn statement(&mut self, name: StatementName, token: &Token) -> AsmResult<Statement> {
        let statement = match name {
            StatementName::Macro => {
                let mut params = Vec::new();
                if self.peeked_punct(Punct::ParenOpen).is_some() {
                    self.tokens.next();
                    if self.peeked_punct(Punct::ParenClose).is_none() {
                        loop {
                            params.push(self.expect_identifier()?.text);
                            if self.peeked_punct(Punct::Comma).is_none() {
                                break;
                            }
                            self.tokens.next();
                        }
                    }
                    self.expect_punct(Punct::ParenClose, "Z0005")?;
                }
                Statement::Macro(params)
            }
            StatementName::Endm => Statement::Endm,
            StatementName::Proc => Statement::Proc,
            StatementName::Endp => Statement::Endp,
            StatementName::Loop => Statement::Loop(self.expr()?),
            StatementName::Endl => Statement::Endl,
            StatementName::Repeat => Statement::Repeat,
            StatementName::Until => Statement::Until(self.expr()?),
            StatementName::While => Statement::While(self.expr()?),
            StatementName::Endw => Statement::Endw,
            StatementName::If => Statement::If(self.expr()?),
            StatementName::IfUsed => Statement::IfUsed(self.symbol_ref()?),
            StatementName::IfNUsed => Statement::IfNUsed(self.symbol_ref()?),
            StatementName::Elif => Statement::Elif(self.expr()?),
            StatementName::Else => Statement::Else,
            StatementName::Endif => Statement::Endif,
            StatementName::For => {
                let var = self.expect_identifier()?.text;
                let assign = self.tokens.next();
                if !assign.is_punct(Punct::Equal) && !assign.is_punct(Punct::Assign) {
                    return asm_err!(assign.loc, "Z0002", "Unexpected {assign}, expected \"=\"");
                }
                let from = self.expr()?;
                let to_token = self.tokens.next();
                if !to_token.is_statement(StatementName::To) {
                    return asm_err!(to_token.loc, "Z0107", "Unexpected {to_token}, expected \".to\"");
                }
                let to = self.expr()?;
                let step = if self.tokens.peek().is_statement(StatementName::Step) {
                    self.tokens.next();
                    Some(self.expr()?)
                } else {
                    None
                };
                Statement::For {
                    var,
                    from,
                    to,
                    step,
                }
            }
            StatementName::Next => Statement::Next,
            StatementName::Break => Statement::Break,
            StatementName::Continue => Statement::Continue,
            StatementName::Module => {
                if self.tokens.peek().kind == TokenKind::Identifier {
                    Statement::Module(Some(self.tokens.next().text))
                } else {
                    Statement::Module(None)
                }
            }
            StatementName::EndModule => Statement::EndModule,
            StatementName::Struct => Statement::Struct,
            StatementName::Ends => Statement::Ends,
            StatementName::Local => {
                return asm_err!(token.loc, "Z0002", "\".local\" is not supported")
            }
            StatementName::To | StatementName::Step => {
                return asm_err!(token.loc, "Z0002", "Unexpected {token}")
            }
        };
        Ok(statement)
    }

    #[must_use]
    fn expr(&mut self) -> AsmResult<Expr> {
        let mut nodes = Vec::new();
        self.expr_prec_0(&mut nodes)?;
        Ok(Expr::new(nodes))
    }

    /// Applies `op` for every `punct` that follows an operand of the next
    /// precedence level.
    #[inline]
    fn binary_ops(
        &mut self,
        nodes: &mut Vec<ExprNode>,
        ops: &[(Punct, ExprNode)],
        next: fn(&mut Self, &mut Vec<ExprNode>) -> AsmResult<SourceLoc>,
    ) -> AsmResult<SourceLoc> {
        let loc = next(self, nodes)?;
        'outer: loop {
            for (punct, node) in ops {
                if self.peeked_punct(*punct).is_some() {
                    self.tokens.next();
                    next(self, nodes)?;
                    nodes.push(node.clone());
                    continue 'outer;
                }
            }
            return Ok(loc);
        }
    }

    #[must_use]
    fn expr_prec_0(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        let loc = self.expr_prec_1(nodes)?;
        if self.peeked_punct(Punct::Question).is_some() {
            self.tokens.next();
            self.expr_prec_0(nodes)?;
            self.expect_punct(Punct::Colon, "Z0002")?;
            self.expr_prec_0(nodes)?;
            nodes.push(ExprNode::Ternary);
        }
        Ok(loc)
    }

    #[must_use]
    fn expr_prec_1(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(nodes, &[(Punct::DoublePipe, ExprNode::OrLogical)], Self::expr_prec_2)
    }

    #[must_use]
    fn expr_prec_2(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(
            nodes,
            &[(Punct::DoubleAmpersand, ExprNode::AndLogical)],
            Self::expr_prec_3,
        )
    }

    #[must_use]
    fn expr_prec_3(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(nodes, &[(Punct::Pipe, ExprNode::Or)], Self::expr_prec_4)
    }

    #[must_use]
    fn expr_prec_4(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(nodes, &[(Punct::Caret, ExprNode::Xor)], Self::expr_prec_5)
    }

    #[must_use]
    fn expr_prec_5(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(nodes, &[(Punct::Ampersand, ExprNode::And)], Self::expr_prec_6)
    }

    #[must_use]
    fn expr_prec_6(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(
            nodes,
            &[
                (Punct::DoubleEqual, ExprNode::Equal),
                (Punct::NotEqual, ExprNode::NotEqual),
            ],
            Self::expr_prec_7,
        )
    }

    #[must_use]
    fn expr_prec_7(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(
            nodes,
            &[
                (Punct::LessThan, ExprNode::LessThan),
                (Punct::LessEqual, ExprNode::LessThanEqual),
                (Punct::GreaterThan, ExprNode::GreaterThan),
                (Punct::GreaterEqual, ExprNode::GreaterThanEqual),
            ],
            Self::expr_prec_8,
        )
    }

    #[must_use]
    fn expr_prec_8(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(
            nodes,
            &[
                (Punct::ShiftLeft, ExprNode::ShiftLeft),
                (Punct::ShiftRight, ExprNode::ShiftRight),
            ],
            Self::expr_prec_9,
        )
    }

    #[must_use]
    fn expr_prec_9(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(
            nodes,
            &[(Punct::Plus, ExprNode::Add), (Punct::Minus, ExprNode::Sub)],
            Self::expr_prec_10,
        )
    }

    #[must_use]
    fn expr_prec_10(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        self.binary_ops(
            nodes,
            &[
                (Punct::Star, ExprNode::Mul),
                (Punct::Div, ExprNode::Div),
                (Punct::Mod, ExprNode::Rem),
            ],
            Self::expr_prec_11,
        )
    }

    #[must_use]
    fn expr_prec_11(&mut self, nodes: &mut Vec<ExprNode>) -> AsmResult<SourceLoc> {
        let token = self.tokens.next();
        let loc = token.loc;
        match token.kind {
            TokenKind::Punct(Punct::Minus) => {
                self.expr_prec_11(nodes)?;
                nodes.push(ExprNode::Neg);
            }

            TokenKind::Punct(Punct::Plus) => {
                self.expr_prec_11(nodes)?;
                nodes.push(ExprNode::Plus);
            }

            TokenKind::Punct(Punct::Tilde) => {
                self.expr_prec_11(nodes)?;
                nodes.push(ExprNode::Invert);
            }

            TokenKind::Punct(Punct::Bang) => {
                self.expr_prec_11(nodes)?;
                nodes.push(ExprNode::NotLogical);
            }

            TokenKind::Punct(Punct::ParenOpen) => {
                self.expr_prec_0(nodes)?;
                self.expect_punct(Punct::ParenClose, "Z0005")?;
            }

            TokenKind::Punct(Punct::BracketOpen) => {
                self.expr_prec_0(nodes)?;
                self.expect_punct(Punct::BracketClose, "Z0005")?;
            }

            TokenKind::Number(value) => nodes.push(ExprNode::Value(value)),

            TokenKind::Real(value) => nodes.push(ExprNode::Real(value)),

            TokenKind::Bool(value) => nodes.push(ExprNode::Bool(value)),

            TokenKind::Str(text) => nodes.push(ExprNode::Str(text)),

            TokenKind::CurrentAddress => nodes.push(ExprNode::CurrentAddress),

            TokenKind::LoopCounter => nodes.push(ExprNode::LoopCounter),

            TokenKind::Punct(Punct::DoubleColon) => {
                let name = self.expect_identifier()?.text;
                nodes.push(ExprNode::Symbol { name, root: true });
            }

            TokenKind::Identifier if self.peeked_punct(Punct::ParenOpen).is_some() => {
                self.tokens.next();
                let mut argc = 0;
                if self.peeked_punct(Punct::ParenClose).is_none() {
                    loop {
                        self.expr_prec_0(nodes)?;
                        argc += 1;
                        if self.peeked_punct(Punct::Comma).is_none() {
                            break;
                        }
                        self.tokens.next();
                    }
                }
                self.expect_punct(Punct::ParenClose, "Z0005")?;
                nodes.push(ExprNode::Function(token.text, argc));
            }

            TokenKind::Identifier => nodes.push(ExprNode::Symbol {
                name: token.text,
                root: false,
            }),

            TokenKind::Mnemonic(_) if is_extended_name(&token) => nodes.push(ExprNode::Symbol {
                name: token.text,
                root: false,
            }),

            TokenKind::MacroFn(func) => {
                self.expect_punct(Punct::ParenOpen, "Z0004")?;
                let operand = if self.peeked_punct(Punct::ParenClose).is_some() {
                    Operand::None
                } else {
                    self.operand()?
                };
                self.expect_punct(Punct::ParenClose, "Z0005")?;
                nodes.push(ExprNode::MacroFn(func, Box::new(operand)));
            }

            TokenKind::TextFn(func) => {
                self.expect_punct(Punct::ParenOpen, "Z0004")?;
                let arg = self.tokens.next();
                let text = match arg.kind {
                    TokenKind::Mnemonic(_) | TokenKind::Register(_) | TokenKind::Condition(_) => {
                        arg.text
                    }
                    _ => {
                        return asm_err!(
                            arg.loc,
                            "Z0112",
                            "Unexpected {arg}, expected a mnemonic, register or condition"
                        )
                    }
                };
                self.expect_punct(Punct::ParenClose, "Z0005")?;
                nodes.push(ExprNode::Str(match func {
                    TextFn::TextOf => text.to_ascii_uppercase(),
                    TextFn::LTextOf => text.to_ascii_lowercase(),
                }));
            }

            _ => return asm_err!(loc, "Z0102", "Unexpected {token}, expected an expression"),
        }
        Ok(loc)
    }
}

/// Next-only mnemonics such as `test` stay usable as symbol names in every
/// position an instruction cannot start.
#[inline]
fn is_extended_name(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Mnemonic(mnemonic) if mnemonic.traits().contains(TokenTraits::EXTENDED))
}
