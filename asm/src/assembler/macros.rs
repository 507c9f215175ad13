use std::{ops::Range, rc::Rc};

use fxhash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    ast::{Body, Invocation, Label, Line, Node, Operand, Pragma},
    error::{AsmResult, AssemblerError},
    expr::Value,
    fileman::FileSystem,
    output::Segment,
    parser::{build_blocks, parse_line},
    source::SourceLoc,
    symtab::{ScopeKind, Symbol, SymbolKind},
};

use super::{Assembler, Overwrite};

/// Invocations nested deeper than this are taken as runaway recursion.
const MAX_INVOCATION_DEPTH: usize = 64;

#[derive(Debug)]
pub(super) struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub lines: Vec<Line>,
    pub end_label: Option<Label>,
}

#[derive(Debug)]
pub(super) struct StructDef {
    pub name: String,
    pub size: usize,
    pub fields: FxHashMap<String, usize>,
    /// The byte-emitting lines replayed by every invocation.
    pub lines: Vec<(SourceLoc, Pragma)>,
}

/// The struct instance that field assignments write into.
#[derive(Debug)]
pub(super) struct StructPatch {
    pub def: Rc<StructDef>,
    pub segment: usize,
    pub start: usize,
    pub cursor: usize,
}

/// Finds the `{{name}}` placeholders of a line, string literals included.
/// The comment is left alone.
fn placeholders(text: &str) -> Vec<(Range<usize>, &str)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => match text[i + 2..].find("}}") {
                Some(close) => {
                    let end = i + 2 + close + 2;
                    found.push((i..end, text[i + 2..end - 2].trim()));
                    i = end;
                    continue;
                }
                None => break,
            },
            b'\\' if quoted => i += 1,
            b'"' => quoted = !quoted,
            b';' if !quoted => break,
            _ => {}
        }
        i += 1;
    }
    found
}

/// Replaces every placeholder with the text bound to its parameter.
fn substitute(text: &str, params: &[String], replacements: &[String]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for (range, name) in placeholders(text) {
        result.push_str(&text[last..range.start]);
        match params.iter().position(|param| param == name) {
            Some(index) => result.push_str(&replacements[index]),
            None => result.push_str(&text[range.clone()]),
        }
        last = range.end;
    }
    result.push_str(&text[last..]);
    result
}

// Macros
impl<S: FileSystem> Assembler<'_, S> {
    pub(super) fn define_macro(&mut self, head: &Line, params: &[String], body: &[Line], end: &Line) {
        self.start_line(head.body_loc);
        self.struct_patch = None;
        if let Err(e) = self.register_macro(head, params, body, end) {
            self.report(e);
        }
    }

    fn register_macro(
        &mut self,
        head: &Line,
        params: &[String],
        body: &[Line],
        end: &Line,
    ) -> AsmResult<()> {
        let name = match self.take_label(head) {
            Some(label) => label.name,
            None => return asm_err!(self.loc, "Z1002", "A macro definition needs a label"),
        };
        if name.starts_with('`') {
            return asm_err!(self.loc, "Z1003", "\"{name}\" cannot be used as a macro name");
        }
        if self.macros.contains_key(&name) || self.structs.contains_key(&name) {
            return asm_err!(self.loc, "Z1004", "\"{name}\" is already defined");
        }

        let mut failed = false;
        for (index, param) in params.iter().enumerate() {
            if params[..index].contains(param) {
                self.report_code("Z1001", format!("Duplicate macro parameter \"{param}\""));
                failed = true;
            }
        }
        for line in body {
            for (_, placeholder) in placeholders(&line.text) {
                if !params.iter().any(|param| param == placeholder) {
                    self.report((
                        line.loc,
                        AssemblerError::new(
                            "Z1006",
                            format!("The macro has no parameter named \"{placeholder}\""),
                        ),
                    ));
                    failed = true;
                }
            }
        }
        if failed {
            return Ok(());
        }

        debug!("Macro {name}({})", params.join(", "));
        self.macros.insert(
            name.clone(),
            Rc::new(MacroDef {
                name,
                params: params.to_vec(),
                lines: body.to_vec(),
                end_label: end.label.clone(),
            }),
        );
        Ok(())
    }

    pub(super) fn invocation(&mut self, label: Option<Label>, invocation: &Invocation) -> AsmResult<()> {
        if let Some(def) = self.structs.get(&invocation.name).cloned() {
            return self.invoke_struct(label, invocation, def);
        }
        let def = match self.macros.get(&invocation.name) {
            Some(def) => def.clone(),
            None => {
                return asm_err!(self.loc, "Z1007", "Unknown macro \"{}\"", invocation.name)
            }
        };
        if invocation.args.len() > def.params.len() {
            return asm_err!(
                self.loc,
                "Z1008",
                "The macro \"{}\" takes {} arguments, not {}",
                def.name,
                def.params.len(),
                invocation.args.len()
            );
        }
        if self.invocations.len() >= MAX_INVOCATION_DEPTH {
            return asm_err!(
                self.loc,
                "Z1015",
                "Macro invocations are nested deeper than {MAX_INVOCATION_DEPTH}"
            );
        }
        self.bind_label(label)?;

        let mut failures = Vec::new();
        for arg in &invocation.args {
            let expr = match &arg.operand {
                Operand::Expr(expr) | Operand::MemIndirect(expr) => expr,
                Operand::IndexedIndirect {
                    offset: Some(expr), ..
                } => expr,
                _ => continue,
            };
            if let Err((_, e)) = self.eval(expr, true) {
                failures.push((arg.loc, e));
            }
        }

        self.invocations.push((def.name.clone(), self.loc));
        if failures.is_empty() {
            self.expand(&def, invocation);
        } else {
            for failure in failures {
                self.report(failure);
            }
        }
        self.invocations.pop();
        Ok(())
    }

    /// Re-parses the macro body with the arguments spliced in and runs it in
    /// a scope of its own. A line that no longer parses fails only if it is
    /// reached.
    fn expand(&mut self, def: &MacroDef, invocation: &Invocation) {
        let replacements: Vec<String> = def
            .params
            .iter()
            .enumerate()
            .map(|(index, _)| match invocation.args.get(index) {
                Some(arg) => match &arg.operand {
                    Operand::None => String::new(),
                    Operand::Expr(expr) => match expr.as_str_literal() {
                        Some(text) => text.to_string(),
                        None => arg.text.clone(),
                    },
                    _ => arg.text.clone(),
                },
                None => String::new(),
            })
            .collect();
        trace!("Expanding {} with {replacements:?}", def.name);

        let lines: Vec<_> = def
            .lines
            .iter()
            .map(|line| {
                let text = substitute(&line.text, &def.params, &replacements);
                match parse_line(line.loc.file, line.loc.line, &text) {
                    Ok(line) => line,
                    Err((loc, e)) => Line {
                        loc: line.loc,
                        text,
                        label: None,
                        body: Some(Body::Invalid(loc, e)),
                        body_loc: line.body_loc,
                    },
                }
            })
            .collect();
        let (nodes, errors) = build_blocks(lines);
        if !errors.is_empty() {
            for e in errors {
                self.report(e);
            }
            return;
        }

        let outer = self.scope;
        let loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.scope = self.symtab.open(outer, ScopeKind::Macro(def.name.clone()));
        let address = self.address();
        self.symtab.insert(
            self.scope,
            def.name.clone(),
            Symbol {
                kind: SymbolKind::Label,
                value: Some(Value::Int(address)),
            },
        );

        self.execute(&nodes);
        if let Some(label) = &def.end_label {
            self.point_label(label);
        }
        self.scope = outer;
        self.loop_depth = loop_depth;
    }
}

// Structs
impl<S: FileSystem> Assembler<'_, S> {
    pub(super) fn define_struct(
        &mut self,
        label: Option<Label>,
        body: &[Node],
        end: &Line,
    ) -> AsmResult<super::Flow> {
        let name = match label {
            Some(label) => label.name,
            None => return asm_err!(self.loc, "Z0804", "A struct definition needs a label"),
        };
        if name.starts_with('`') {
            return asm_err!(self.loc, "Z0805", "\"{name}\" cannot be used as a struct name");
        }
        if self.macros.contains_key(&name) || self.structs.contains_key(&name) {
            return asm_err!(self.loc, "Z0806", "\"{name}\" is already defined");
        }
        if let Some(label) = &end.label {
            self.report((
                label.loc,
                AssemblerError::new("Z0807", "The \".ends\" line cannot have a label"),
            ));
        }

        let mut problems = Vec::new();
        let mut fields = FxHashMap::default();
        let mut lines = Vec::new();

        let head = self.loc;
        let saved_segment = self.segment;
        let saved_scope = self.scope;
        let scratch = self.open_segment(Segment::new(0, 0x10000));
        self.measuring = true;
        for node in body {
            let line = match node {
                Node::Line(line) => line,
                other => {
                    problems.push((
                        other.loc(),
                        AssemblerError::new("Z0808", "Only byte-emitting pragmas can be used in a struct"),
                    ));
                    continue;
                }
            };
            self.start_line(line.body_loc);
            if let Some(field) = &line.label {
                let offset = self.segments[scratch].emitted_code.len();
                if fields.insert(field.name.clone(), offset).is_some() {
                    problems.push((
                        field.loc,
                        AssemblerError::new(
                            "Z0810",
                            format!("Duplicate struct field \"{}\"", field.name),
                        ),
                    ));
                }
            }
            match &line.body {
                None => {}
                Some(Body::Pragma(pragma)) if pragma.emits_bytes() => {
                    if let Err(e) = self.pragma(None, pragma) {
                        problems.push(e);
                    }
                    lines.push((line.body_loc, pragma.clone()));
                }
                Some(_) => problems.push((
                    line.body_loc,
                    AssemblerError::new("Z0808", "Only byte-emitting pragmas can be used in a struct"),
                )),
            }
        }
        self.measuring = false;
        let size = self.segments[scratch].emitted_code.len();
        self.segments.truncate(scratch);
        self.segment = saved_segment;
        self.scope = saved_scope;
        self.start_line(head);

        let failed = !problems.is_empty();
        for problem in problems {
            self.report(problem);
        }
        if failed {
            return Ok(super::Flow::Next);
        }

        debug!("Struct {name} of {size} bytes");
        self.define_constant(&name, Some(Value::Int(size as i64)), head)?;
        let mut names: Vec<_> = fields.iter().collect();
        names.sort();
        for (field, offset) in names {
            self.define_constant(&format!("{name}.{field}"), Some(Value::Int(*offset as i64)), head)?;
        }
        self.structs.insert(
            name.clone(),
            Rc::new(StructDef {
                name,
                size,
                fields,
                lines,
            }),
        );
        Ok(super::Flow::Next)
    }

    fn invoke_struct(
        &mut self,
        label: Option<Label>,
        invocation: &Invocation,
        def: Rc<StructDef>,
    ) -> AsmResult<()> {
        if !invocation.args.is_empty() {
            return asm_err!(
                self.loc,
                "Z0809",
                "The struct \"{}\" cannot be invoked with arguments",
                def.name
            );
        }
        self.bind_label(label)?;
        let (segment, start) = self.write_offset();
        let loc = self.loc;
        for (at, pragma) in &def.lines {
            self.loc = *at;
            if let Err(e) = self.pragma(None, pragma) {
                self.report(e);
            }
        }
        self.loc = loc;
        trace!("Struct {} placed at offset {start}", def.name);
        self.struct_patch = Some(StructPatch {
            def,
            segment,
            start,
            cursor: start,
        });
        Ok(())
    }

    /// A byte-emitting pragma under a struct invocation overwrites the bytes
    /// of that instance, optionally starting at a named field.
    pub(super) fn field_assignment(&mut self, label: Option<Label>, pragma: &Pragma) -> AsmResult<()> {
        let (def, segment, start, mut cursor) = match &self.struct_patch {
            Some(patch) => (patch.def.clone(), patch.segment, patch.start, patch.cursor),
            None => {
                return asm_err!(
                    self.loc,
                    "Z0803",
                    "A field assignment must follow a struct invocation"
                )
            }
        };
        if let Some(label) = label {
            match def.fields.get(&label.name) {
                Some(offset) => cursor = start + offset,
                None => {
                    return asm_err!(
                        label.loc,
                        "Z0802",
                        "The struct \"{}\" has no field \"{}\"",
                        def.name,
                        label.name
                    )
                }
            }
        }

        let saved_segment = self.segment.replace(segment);
        self.overwrite = Some(Overwrite {
            offset: cursor,
            end: start + def.size,
        });
        let result = self.pragma(None, pragma);
        let written = self.overwrite.take().map_or(cursor, |overwrite| overwrite.offset);
        self.segment = saved_segment;
        if let Some(patch) = &mut self.struct_patch {
            patch.cursor = written;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_skip_comments() {
        let found: Vec<_> = placeholders("ld {{ a }},{{b}} ; {{c}}")
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(vec!["a", "b"], found);
    }

    #[test]
    fn substitution() {
        let params = vec!["dst".to_string(), "src".to_string()];
        let replacements = vec!["(ix+2)".to_string(), "b".to_string()];
        assert_eq!(
            "ld (ix+2),b",
            substitute("ld {{dst}},{{ src }}", &params, &replacements)
        );
        assert_eq!(
            ".defm \"b\" ; {{src}}",
            substitute(".defm \"{{src}}\" ; {{src}}", &params, &replacements)
        );
    }
}
