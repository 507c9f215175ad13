mod fixup;
mod instructions;
mod macros;
mod pragmas;
mod statements;

#[cfg(test)]
mod tests;

use std::{collections::BTreeMap, path::PathBuf, rc::Rc};

use fxhash::FxHashMap;
use tracing::{debug, instrument, trace, warn};

use crate::{
    ast::{Body, Label, Line, Node, Statement},
    error::{AsmResult, AssemblerError},
    expr::{EvalContext, EvalResult, Expr, ExprNode, Random, SymbolValue, Value},
    fileman::{FileManager, FileSystem},
    output::{CompilerOptions, ListItem, Model, Segment},
    source::{FileId, SourceFiles, SourceLoc},
    symtab::{ScopeId, ScopeKind, Symbol, SymbolKind, Symtab},
};

use self::{
    fixup::{CompareBin, Fixup, FixupKind},
    macros::{MacroDef, StructDef, StructPatch},
};

/// Default origin when code is emitted before any `.org`.
const DEFAULT_ORIGIN: u16 = 0x8000;

/// Everything the two passes produced.
#[derive(Debug, Default)]
pub struct Assembled {
    pub segments: Vec<Segment>,
    pub symbols: BTreeMap<String, i64>,
    pub list_items: Vec<ListItem>,
    pub entry_address: Option<u16>,
    pub export_entry_address: Option<u16>,
    /// Messages of `.trace` and `.tracehex`, in order.
    pub trace_output: Vec<String>,
    pub errors: Vec<(SourceLoc, AssemblerError)>,
}

/// How control leaves a statement list.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Flow {
    Next,
    Break,
    Continue,
}

/// Symbol lookups as seen from one scope of the table.
struct ScopeContext<'s> {
    symtab: &'s mut Symtab,
    random: &'s mut Random,
    scope: ScopeId,
    address: i64,
    loc: SourceLoc,
}

impl EvalContext for ScopeContext<'_> {
    fn current_address(&self) -> i64 {
        self.address
    }

    fn loop_counter(&self) -> Option<i64> {
        self.symtab.loop_counter(self.scope)
    }

    fn symbol(&mut self, name: &str, root: bool) -> SymbolValue {
        self.symtab.touch(name, self.loc);
        match self.symtab.resolve(self.scope, name, root) {
            Some(Symbol {
                value: Some(value), ..
            }) => SymbolValue::Resolved(value.clone()),
            Some(_) => SymbolValue::Pending,
            None => SymbolValue::Undefined,
        }
    }

    fn random(&mut self) -> Option<&mut Random> {
        Some(&mut *self.random)
    }
}

/// Redirects emission into bytes that were already emitted, for struct
/// field assignments.
#[derive(Debug)]
struct Overwrite {
    offset: usize,
    end: usize,
}

/// Walks the block tree once, emitting code and recording fixups, then
/// patches the fixups once every symbol is known.
pub struct Assembler<'a, S> {
    file_manager: &'a FileManager<S>,
    sources: &'a SourceFiles,
    max_loop_errors: usize,
    model: Model,
    symtab: Symtab,
    scope: ScopeId,
    macros: FxHashMap<String, Rc<MacroDef>>,
    structs: FxHashMap<String, Rc<StructDef>>,
    segments: Vec<Segment>,
    segment: Option<usize>,
    fixups: Vec<Fixup>,
    errors: Vec<(SourceLoc, AssemblerError)>,
    /// Active macro invocations, outermost first.
    invocations: Vec<(String, SourceLoc)>,
    loop_depth: usize,
    hanging: Option<Label>,
    loc: SourceLoc,
    line_address: i64,
    overflowed: bool,
    /// Set while a struct body is sized. Nothing is reported or recorded.
    measuring: bool,
    struct_patch: Option<StructPatch>,
    overwrite: Option<Overwrite>,
    list_items: Vec<ListItem>,
    entry: Option<u16>,
    export_entry: Option<u16>,
    random: Random,
    trace_output: Vec<String>,
    compare_bins: Vec<CompareBin>,
}

impl<'a, S> Assembler<'a, S> {
    pub fn new(
        file_manager: &'a FileManager<S>,
        sources: &'a SourceFiles,
        options: &CompilerOptions,
        model: Model,
    ) -> Self {
        let mut symtab = Symtab::new();
        let root = symtab.root();
        for (name, value) in &options.predefined_symbols {
            symtab.insert(
                root,
                name.clone(),
                Symbol {
                    kind: SymbolKind::Constant,
                    value: Some(Value::Int(*value)),
                },
            );
        }
        Self {
            file_manager,
            sources,
            max_loop_errors: options.max_loop_errors,
            model,
            symtab,
            scope: root,
            macros: FxHashMap::default(),
            structs: FxHashMap::default(),
            segments: Vec::new(),
            segment: None,
            fixups: Vec::new(),
            errors: Vec::new(),
            invocations: Vec::new(),
            loop_depth: 0,
            hanging: None,
            loc: SourceLoc::new(FileId(0), 1, 1),
            line_address: DEFAULT_ORIGIN as i64,
            overflowed: false,
            measuring: false,
            struct_patch: None,
            overwrite: None,
            list_items: Vec::new(),
            entry: None,
            export_entry: None,
            random: Random::from_clock(),
            trace_output: Vec::new(),
            compare_bins: Vec::new(),
        }
    }
}

impl<S: FileSystem> Assembler<'_, S> {
    #[instrument(skip_all)]
    pub fn assemble(mut self, nodes: &[Node]) -> Assembled {
        debug!("First pass over {} top-level nodes", nodes.len());
        self.execute(nodes);

        debug!("Second pass over {} fixups", self.fixups.len());
        self.resolve_fixups();
        if self.errors.is_empty() {
            self.compare_binaries();
        }

        Assembled {
            symbols: self.symtab.exported(),
            trace_output: self.trace_output,
            segments: self.segments,
            list_items: self.list_items,
            entry_address: self.entry,
            export_entry_address: self.export_entry,
            errors: self.errors,
        }
    }

    fn execute(&mut self, nodes: &[Node]) -> Flow {
        let mut flow = Flow::Next;
        for node in nodes {
            flow = match node {
                Node::Line(line) => self.line(line),
                Node::Block { head, body, end } => self.block(head, body, end),
                Node::If { sections, end } => self.if_block(sections, end),
                Node::Macro {
                    head,
                    params,
                    body,
                    end,
                } => {
                    self.define_macro(head, params, body, end);
                    Flow::Next
                }
            };
            if flow != Flow::Next {
                break;
            }
        }
        if let Some(label) = self.hanging.take() {
            warn!("Hanging label \"{}\" bound at the end of its block", label.name);
            self.point_label(&label);
        }
        flow
    }

    fn line(&mut self, line: &Line) -> Flow {
        self.start_line(line.body_loc);
        let mark = self
            .segment
            .map(|index| (index, self.segments[index].emitted_code.len()));

        let flow = match self.line_body(line) {
            Ok(flow) => flow,
            Err(e) => {
                self.report(e);
                Flow::Next
            }
        };

        if !matches!(line.body, Some(Body::Invocation(_))) {
            self.list_item(line, mark);
        }
        flow
    }

    fn line_body(&mut self, line: &Line) -> AsmResult<Flow> {
        let body = match &line.body {
            Some(body) => body,
            None => {
                if let Some(label) = &line.label {
                    self.hanging_label(label)?;
                }
                return Ok(Flow::Next);
            }
        };
        if !matches!(body, Body::FieldAssignment(_)) {
            self.struct_patch = None;
        }
        let label = self.take_label(line);

        match body {
            Body::Template => {
                if self.invocations.is_empty() {
                    asm_err!(self.loc, "Z1011", "Macro parameters can be used only in a macro body")
                } else {
                    asm_err!(self.loc, "Z1010", "A macro parameter placeholder was left unreplaced")
                }
            }
            Body::Invalid(loc, e) => Err((*loc, e.clone())),
            Body::FieldAssignment(pragma) => {
                self.field_assignment(label, pragma)?;
                Ok(Flow::Next)
            }
            Body::Pragma(pragma) => {
                self.pragma(label, pragma)?;
                Ok(Flow::Next)
            }
            Body::Instruction(instruction) => {
                self.bind_label(label)?;
                self.instruction(instruction)?;
                Ok(Flow::Next)
            }
            Body::Invocation(invocation) => {
                self.invocation(label, invocation)?;
                Ok(Flow::Next)
            }
            Body::Statement(statement) => {
                self.bind_label(label)?;
                match statement {
                    Statement::Break if self.loop_depth == 0 => {
                        asm_err!(self.loc, "Z0707", "\".break\" can be used only in a loop")
                    }
                    Statement::Continue if self.loop_depth == 0 => {
                        asm_err!(self.loc, "Z0708", "\".continue\" can be used only in a loop")
                    }
                    Statement::Break => Ok(Flow::Break),
                    Statement::Continue => Ok(Flow::Continue),
                    _ => Ok(Flow::Next),
                }
            }
        }
    }

    #[inline]
    fn start_line(&mut self, loc: SourceLoc) {
        self.loc = loc;
        self.line_address = self.address();
        self.overflowed = false;
    }

    fn list_item(&mut self, line: &Line, mark: Option<(usize, usize)>) {
        if self.measuring {
            return;
        }
        let index = match self.segment {
            Some(index) => index,
            None => return,
        };
        let code_start = match mark {
            Some((marked, len)) if marked == index => len,
            _ => 0,
        };
        let segment = &self.segments[index];
        let len = segment.emitted_code.len();
        if len > code_start {
            self.list_items.push(ListItem {
                file: line.loc.file,
                line: line.loc.line,
                address: (segment.start_address as usize + code_start) as u16,
                segment: index,
                code_start,
                code_length: len - code_start,
            });
        }
    }
}

// Labels and scopes
impl<S: FileSystem> Assembler<'_, S> {
    /// A label on a line of its own waits for the next line with a body.
    fn hanging_label(&mut self, label: &Label) -> AsmResult<()> {
        if self.structs.contains_key(&label.name) {
            return asm_err!(
                label.loc,
                "Z1013",
                "The struct \"{}\" must be invoked with parentheses",
                label.name
            );
        }
        if self.macros.contains_key(&label.name) {
            return asm_err!(
                label.loc,
                "Z1014",
                "The macro \"{}\" must be invoked with parentheses",
                label.name
            );
        }
        if let Some(previous) = self.hanging.replace(label.clone()) {
            self.point_label(&previous);
        }
        Ok(())
    }

    /// The label that belongs to a line with a body: its own, or the hanging
    /// one. A hanging label replaced by the line's own label is bound here.
    fn take_label(&mut self, line: &Line) -> Option<Label> {
        let hanging = self.hanging.take();
        match (&line.label, hanging) {
            (Some(label), Some(hanging)) => {
                self.point_label(&hanging);
                Some(label.clone())
            }
            (Some(label), None) => Some(label.clone()),
            (None, hanging) => hanging,
        }
    }

    #[inline]
    fn bind_label(&mut self, label: Option<Label>) -> AsmResult<()> {
        match label {
            Some(label) => {
                let address = self.address();
                self.define_label(&label, address)
            }
            None => Ok(()),
        }
    }

    /// Binds a label to the current address, reporting any failure.
    fn point_label(&mut self, label: &Label) {
        let address = self.address();
        if let Err(e) = self.define_label(label, address) {
            self.report(e);
        }
    }

    /// Closes the open back-tick label zone, if any.
    fn leave_temporary(&mut self) -> ScopeId {
        if *self.symtab.kind(self.scope) == ScopeKind::Temporary {
            self.scope = self.symtab.parent(self.scope).unwrap_or(self.symtab.root());
        }
        self.scope
    }

    fn define_label(&mut self, label: &Label, value: i64) -> AsmResult<()> {
        if self.measuring {
            return Ok(());
        }
        let temporary = label.name.starts_with('`');
        let target = if temporary {
            self.scope
        } else {
            self.leave_temporary()
        };

        if let Some(existing) = self.symtab.get_local(target, &label.name) {
            let same = existing.kind != SymbolKind::Variable
                && existing.value == Some(Value::Int(value));
            if !same {
                return asm_err!(
                    label.loc,
                    "Z0501",
                    "The label \"{}\" is already defined",
                    label.name
                );
            }
        } else {
            trace!("Label {} = {value:#06X}", label.name);
            self.symtab.insert(
                target,
                label.name.clone(),
                Symbol {
                    kind: SymbolKind::Label,
                    value: Some(Value::Int(value)),
                },
            );
        }

        if !temporary {
            self.scope = self.symtab.open(target, ScopeKind::Temporary);
        }
        Ok(())
    }

    /// Defines a constant in the scope that owns the current one.
    fn define_constant(
        &mut self,
        name: &str,
        value: Option<Value>,
        loc: SourceLoc,
    ) -> AsmResult<ScopeId> {
        let target = if name.starts_with('`') {
            self.scope
        } else {
            self.symtab.owner(self.scope)
        };
        if let Some(existing) = self.symtab.get_local(target, name) {
            let same = existing.kind == SymbolKind::Constant
                && value.is_some()
                && existing.value == value;
            if same {
                return Ok(target);
            }
            return asm_err!(loc, "Z0501", "The symbol \"{name}\" is already defined");
        }
        self.symtab.insert(
            target,
            name.to_string(),
            Symbol {
                kind: SymbolKind::Constant,
                value,
            },
        );
        Ok(target)
    }

    #[inline]
    fn in_global_scope(&self) -> bool {
        self.symtab.owner(self.scope) == self.symtab.root()
    }

    /// The directory binary files named in `file` are looked up from.
    fn source_dir(&self, file: FileId) -> PathBuf {
        self.sources
            .get(file)
            .and_then(|source| source.path().parent())
            .map(|dir| dir.to_path_buf())
            .unwrap_or_default()
    }
}

/// Records `e` after one Z1012 per active invocation, innermost first.
fn push_error(
    errors: &mut Vec<(SourceLoc, AssemblerError)>,
    invocations: &[(String, SourceLoc)],
    loc: SourceLoc,
    e: AssemblerError,
) {
    for (name, at) in invocations.iter().rev() {
        errors.push((
            *at,
            AssemblerError::new("Z1012", format!("Error in the invocation of macro \"{name}\"")),
        ));
    }
    errors.push((loc, e));
}

// Evaluation and errors
impl<S: FileSystem> Assembler<'_, S> {
    fn report(&mut self, (loc, e): (SourceLoc, AssemblerError)) {
        if self.measuring {
            return;
        }
        trace!("Error at {loc}: {} {e}", e.code());
        push_error(&mut self.errors, &self.invocations, loc, e);
    }

    #[inline]
    fn report_code(&mut self, code: &'static str, message: String) {
        self.report((self.loc, AssemblerError::new(code, message)));
    }

    /// Evaluates in the current scope. `Ok(None)` means a fixup has to wait
    /// for a symbol defined later.
    fn eval(&mut self, expr: &Expr, late_binding: bool) -> AsmResult<Option<Value>> {
        if self.invocations.is_empty() {
            let macro_fn = expr.nodes().iter().find_map(|node| match node {
                ExprNode::MacroFn(func, _) => Some(*func),
                _ => None,
            });
            if let Some(func) = macro_fn {
                return asm_err!(
                    self.loc,
                    "Z1009",
                    "The macro-time function \"{func}\" can be used only in a macro body"
                );
            }
        }
        let mut ctx = ScopeContext {
            symtab: &mut self.symtab,
            random: &mut self.random,
            scope: self.scope,
            address: self.line_address,
            loc: self.loc,
        };
        match expr.evaluate(&mut ctx, late_binding) {
            EvalResult::Resolved(value) => Ok(Some(value)),
            EvalResult::Deferred => Ok(None),
            EvalResult::Error(e) => Err((self.loc, e.into())),
        }
    }

    /// A value that must be known now.
    #[inline]
    fn eval_now(&mut self, expr: &Expr) -> AsmResult<Value> {
        Ok(self.eval(expr, false)?.unwrap_or(Value::Int(0)))
    }

    fn eval_int(&mut self, expr: &Expr) -> AsmResult<i64> {
        match self.eval_now(expr)?.as_int() {
            Some(value) => Ok(value),
            None => asm_err!(self.loc, "Z0603", "A numeric value is expected, not a string"),
        }
    }

    fn eval_int_late(&mut self, expr: &Expr) -> AsmResult<Option<i64>> {
        match self.eval(expr, true)? {
            Some(value) => match value.as_int() {
                Some(value) => Ok(Some(value)),
                None => asm_err!(self.loc, "Z0603", "A numeric value is expected, not a string"),
            },
            None => Ok(None),
        }
    }

    fn condition(&mut self, expr: &Expr) -> AsmResult<bool> {
        Ok(self.eval_int(expr)? != 0)
    }
}

// Segments and emission
impl<S: FileSystem> Assembler<'_, S> {
    /// The address of the next byte, shifted by `.disp`.
    fn address(&self) -> i64 {
        match self.segment {
            Some(index) => {
                let segment = &self.segments[index];
                segment.current_address() as i64 + segment.displacement.unwrap_or(0)
            }
            None => DEFAULT_ORIGIN as i64,
        }
    }

    fn ensure_segment(&mut self) -> usize {
        match self.segment {
            Some(index) => index,
            None => self.open_segment(Segment::new(
                DEFAULT_ORIGIN,
                0x10000 - DEFAULT_ORIGIN as usize,
            )),
        }
    }

    fn open_segment(&mut self, segment: Segment) -> usize {
        trace!("Segment {} opened at {:#06X}", self.segments.len(), segment.start_address);
        self.segments.push(segment);
        let index = self.segments.len() - 1;
        self.segment = Some(index);
        index
    }

    /// The offset the next byte is written to.
    fn write_offset(&mut self) -> (usize, usize) {
        let index = self.ensure_segment();
        let offset = match &self.overwrite {
            Some(overwrite) => overwrite.offset,
            None => self.segments[index].emitted_code.len(),
        };
        (index, offset)
    }

    fn emit(&mut self, bytes: &[u8]) {
        let index = self.ensure_segment();
        if let Some(overwrite) = &mut self.overwrite {
            let code = &mut self.segments[index].emitted_code;
            let mut overflow = false;
            for byte in bytes {
                if overwrite.offset < overwrite.end && overwrite.offset < code.len() {
                    code[overwrite.offset] = *byte;
                } else {
                    overflow = true;
                }
                overwrite.offset += 1;
            }
            if overflow && !self.overflowed {
                self.overflowed = true;
                self.report_code("Z0801", "The field assignment writes past the end of the struct".into());
            }
            return;
        }

        let segment = &mut self.segments[index];
        let room = segment
            .max_code_length
            .saturating_sub(segment.emitted_code.len());
        if bytes.len() <= room {
            segment.emitted_code.extend_from_slice(bytes);
            return;
        }
        segment.emitted_code.extend_from_slice(&bytes[..room]);
        let max = segment.max_code_length;
        if !self.overflowed {
            self.overflowed = true;
            self.report_code(
                "Z0411",
                format!("The code does not fit into the segment of {max:#06X} bytes"),
            );
        }
    }

    fn fixup(&mut self, kind: FixupKind, expr: &Expr) {
        if self.measuring {
            return;
        }
        let (segment, offset) = match kind {
            FixupKind::Ent | FixupKind::Xent | FixupKind::Equ { .. } => (0, 0),
            _ => self.write_offset(),
        };
        trace!("Fixup {kind:?} at segment {segment} offset {offset}");
        self.fixups.push(Fixup {
            kind,
            loc: self.loc,
            segment,
            offset,
            address: self.line_address,
            scope: self.scope,
            expr: expr.clone(),
            invocations: self.invocations.clone(),
        });
    }

    /// Emits an operand, or zeros and a fixup when it is not known yet.
    fn emit_expr(&mut self, kind: FixupKind, expr: &Expr) -> AsmResult<()> {
        let value = match self.eval_int_late(expr)? {
            Some(value) => value,
            None => {
                self.fixup(kind.clone(), expr);
                0
            }
        };
        match kind {
            FixupKind::Bit16 => self.emit(&(value as u16).to_le_bytes()),
            FixupKind::Bit16Be => self.emit(&(value as u16).to_be_bytes()),
            _ => self.emit(&[value as u8]),
        }
        Ok(())
    }

    #[inline]
    fn emit_byte_expr(&mut self, expr: &Expr) -> AsmResult<()> {
        self.emit_expr(FixupKind::Bit8, expr)
    }

    #[inline]
    fn emit_word_expr(&mut self, expr: &Expr) -> AsmResult<()> {
        self.emit_expr(FixupKind::Bit16, expr)
    }
}
