use tracing::{debug, trace};

use crate::{
    ast::{Label, Line, Node, Statement},
    error::{AsmResult, AssemblerError},
    expr::{Expr, Value},
    fileman::FileSystem,
    source::SourceLoc,
    symtab::{ScopeId, ScopeKind, Symbol, SymbolKind},
};

use super::{Assembler, Flow};

/// Upper bound of `.loop` counts and of the iterations of the other loops.
const MAX_ITERATIONS: i64 = 0xFFFF;

/// State saved when a loop starts.
struct LoopFrame {
    outer: ScopeId,
    scope: ScopeId,
    errors: usize,
    head: SourceLoc,
}

impl<S: FileSystem> Assembler<'_, S> {
    pub(super) fn block(&mut self, head: &Line, body: &[Node], end: &Line) -> Flow {
        self.start_line(head.body_loc);
        self.struct_patch = None;
        let label = self.take_label(head);
        let result = match head.statement() {
            Some(Statement::Loop(count)) => self.loop_block(label, count, body, end),
            Some(Statement::Repeat) => self.repeat_block(label, body, end),
            Some(Statement::While(condition)) => self.while_block(label, condition, body, end),
            Some(Statement::For {
                var,
                from,
                to,
                step,
            }) => self.for_block(label, var, (from, to, step.as_ref()), body, end),
            Some(Statement::Module(name)) => self.module_block(label, name.as_deref(), body, end),
            Some(Statement::Proc) => self.proc_block(label, body, end),
            Some(Statement::Struct) => self.define_struct(label, body, end),
            _ => Ok(Flow::Next),
        };
        match result {
            Ok(flow) => flow,
            Err(e) => {
                self.report(e);
                Flow::Next
            }
        }
    }

    fn enter_loop(&mut self) -> LoopFrame {
        let outer = self.scope;
        let scope = self.symtab.open(outer, ScopeKind::Loop);
        self.loop_depth += 1;
        LoopFrame {
            outer,
            scope,
            errors: self.errors.len(),
            head: self.loc,
        }
    }

    #[inline]
    fn leave_loop(&mut self, frame: LoopFrame) {
        self.scope = frame.outer;
        self.loop_depth -= 1;
    }

    fn open_iteration(&mut self, frame: &LoopFrame, counter: i64) {
        let scope = self.symtab.open(frame.scope, ScopeKind::Iteration);
        self.symtab.set_counter(scope, counter);
        self.scope = scope;
        trace!("Iteration {counter}");
    }

    /// Runs the body in the open iteration scope. A label on the closing
    /// line marks the address after the iteration.
    fn run_iteration(&mut self, body: &[Node], end: &Line) -> Flow {
        let flow = self.execute(body);
        if let Some(label) = &end.label {
            self.start_line(end.body_loc);
            self.point_label(label);
        }
        flow
    }

    /// Aborts a loop that keeps failing.
    fn too_many_errors(&mut self, frame: &LoopFrame) -> bool {
        if self.errors.len() - frame.errors <= self.max_loop_errors {
            return false;
        }
        self.report((
            frame.head,
            AssemblerError::new(
                "Z0703",
                format!(
                    "The loop reported more than {} errors and was stopped",
                    self.max_loop_errors
                ),
            ),
        ));
        true
    }

    fn too_many_iterations(&mut self, frame: &LoopFrame) {
        self.report((
            frame.head,
            AssemblerError::new(
                "Z0702",
                format!("The loop exceeded {MAX_ITERATIONS:#06X} iterations"),
            ),
        ));
    }

    fn loop_block(
        &mut self,
        label: Option<Label>,
        count: &Expr,
        body: &[Node],
        end: &Line,
    ) -> AsmResult<Flow> {
        self.bind_label(label)?;
        let mut count = self.eval_int(count)?;
        if count > MAX_ITERATIONS {
            self.report_code(
                "Z0702",
                format!("The loop count must be less than 0x10000, not {count:#X}"),
            );
            count = 1;
        }
        debug!("Loop of {count} iterations");

        let frame = self.enter_loop();
        for counter in 1..=count {
            self.open_iteration(&frame, counter);
            let flow = self.run_iteration(body, end);
            if flow == Flow::Break || self.too_many_errors(&frame) {
                break;
            }
        }
        self.leave_loop(frame);
        Ok(Flow::Next)
    }

    fn repeat_block(&mut self, label: Option<Label>, body: &[Node], end: &Line) -> AsmResult<Flow> {
        self.bind_label(label)?;
        let until = match end.statement() {
            Some(Statement::Until(until)) => until,
            _ => return Ok(Flow::Next),
        };

        let frame = self.enter_loop();
        let mut counter = 0;
        loop {
            counter += 1;
            self.open_iteration(&frame, counter);
            let flow = self.run_iteration(body, end);
            if flow == Flow::Break || self.too_many_errors(&frame) {
                break;
            }
            self.start_line(end.body_loc);
            match self.condition(until) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    self.report(e);
                    break;
                }
            }
            if counter >= MAX_ITERATIONS {
                self.too_many_iterations(&frame);
                break;
            }
        }
        self.leave_loop(frame);
        Ok(Flow::Next)
    }

    fn while_block(
        &mut self,
        label: Option<Label>,
        condition: &Expr,
        body: &[Node],
        end: &Line,
    ) -> AsmResult<Flow> {
        self.bind_label(label)?;

        let frame = self.enter_loop();
        let mut counter = 0;
        loop {
            counter += 1;
            if counter > MAX_ITERATIONS {
                self.too_many_iterations(&frame);
                break;
            }
            self.open_iteration(&frame, counter);
            self.start_line(frame.head);
            match self.condition(condition) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.report(e);
                    break;
                }
            }
            let flow = self.run_iteration(body, end);
            if flow == Flow::Break || self.too_many_errors(&frame) {
                break;
            }
        }
        self.leave_loop(frame);
        Ok(Flow::Next)
    }

    fn for_block(
        &mut self,
        label: Option<Label>,
        var: &str,
        (from, to, step): (&Expr, &Expr, Option<&Expr>),
        body: &[Node],
        end: &Line,
    ) -> AsmResult<Flow> {
        self.bind_label(label)?;
        let from = self.eval_int(from)?;
        let to = self.eval_int(to)?;
        let step = match step {
            Some(step) => self.eval_int(step)?,
            None => 1,
        };
        if step == 0 {
            return asm_err!(self.loc, "Z0706", "The step of a \".for\" loop cannot be zero");
        }
        if self.symtab.resolve(self.scope, var, false).is_some() {
            return asm_err!(
                self.loc,
                "Z0502",
                "The loop variable \"{var}\" is already defined"
            );
        }
        debug!("For {var} = {from} to {to} step {step}");

        let frame = self.enter_loop();
        let mut value = from;
        let mut counter = 0;
        while (step > 0 && value <= to) || (step < 0 && value >= to) {
            counter += 1;
            if counter > MAX_ITERATIONS {
                self.too_many_iterations(&frame);
                break;
            }
            self.symtab.insert(
                frame.scope,
                var.to_string(),
                Symbol {
                    kind: SymbolKind::Variable,
                    value: Some(Value::Int(value)),
                },
            );
            self.open_iteration(&frame, counter);
            let flow = self.run_iteration(body, end);
            if flow == Flow::Break || self.too_many_errors(&frame) {
                break;
            }
            value = match value.checked_add(step) {
                Some(value) => value,
                None => break,
            };
        }
        self.leave_loop(frame);
        Ok(Flow::Next)
    }

    fn module_block(
        &mut self,
        label: Option<Label>,
        name: Option<&str>,
        body: &[Node],
        end: &Line,
    ) -> AsmResult<Flow> {
        let name = match (name, label) {
            (Some(name), label) => {
                self.bind_label(label)?;
                name.to_string()
            }
            (None, Some(label)) => label.name,
            (None, None) => {
                return asm_err!(self.loc, "Z0901", "A \".module\" needs a name or a label")
            }
        };
        if name.starts_with('`') {
            return asm_err!(self.loc, "Z0902", "\"{name}\" cannot be used as a module name");
        }
        let outer = self.leave_temporary();
        if self.symtab.module(outer, &name).is_some() {
            return asm_err!(self.loc, "Z0903", "The module \"{name}\" is already defined");
        }

        debug!("Module {name}");
        self.scope = self.symtab.open(outer, ScopeKind::Module(name));
        let flow = self.execute(body);
        if let Some(label) = &end.label {
            self.start_line(end.body_loc);
            self.point_label(label);
        }
        self.scope = outer;
        Ok(flow)
    }

    fn proc_block(&mut self, label: Option<Label>, body: &[Node], end: &Line) -> AsmResult<Flow> {
        self.bind_label(label)?;
        let outer = self.scope;
        self.scope = self.symtab.open(outer, ScopeKind::Proc);
        let flow = self.execute(body);
        if let Some(label) = &end.label {
            self.start_line(end.body_loc);
            self.point_label(label);
        }
        self.scope = outer;
        Ok(flow)
    }

    /// Runs the first section whose condition holds. Every section line is
    /// still checked for labels, including a label left hanging right before
    /// it.
    pub(super) fn if_block(&mut self, sections: &[(Line, Vec<Node>)], end: &Line) -> Flow {
        let mut flow = Flow::Next;
        let mut taken = false;
        for (index, (head, body)) in sections.iter().enumerate() {
            self.start_line(head.body_loc);
            if index == 0 {
                self.struct_patch = None;
                let label = self.take_label(head);
                if let Err(e) = self.bind_label(label) {
                    self.report(e);
                }
            } else {
                let hanging = match sections[index - 1].1.last() {
                    Some(Node::Line(line)) if line.body.is_none() => line.label.as_ref(),
                    _ => None,
                };
                for label in hanging.into_iter().chain(head.label.as_ref()) {
                    self.report((
                        label.loc,
                        AssemblerError::new(
                            "Z0503",
                            format!("The label \"{}\" cannot be used on this line", label.name),
                        ),
                    ));
                }
            }
            if taken {
                continue;
            }

            let holds = match head.statement() {
                Some(Statement::If(condition) | Statement::Elif(condition)) => {
                    match self.condition(condition) {
                        Ok(holds) => holds,
                        Err(e) => {
                            self.report(e);
                            false
                        }
                    }
                }
                Some(Statement::IfUsed(symbol)) => self.symtab.first_reference(&symbol.name).is_some(),
                Some(Statement::IfNUsed(symbol)) => self.symtab.first_reference(&symbol.name).is_none(),
                Some(Statement::Else) => true,
                _ => false,
            };
            if holds {
                taken = true;
                flow = self.execute(body);
            }
        }
        if let Some(label) = &end.label {
            self.start_line(end.body_loc);
            self.point_label(label);
        }
        flow
    }
}
