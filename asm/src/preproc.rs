use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::{
    ast::{Body, Directive, Line, Pragma},
    error::{AssemblerError, AsmResult},
    expr::{EvalContext, EvalResult, Expr, SymbolValue, Value},
    fileman::{FileManager, FileSystem},
    lexer::DirectiveName,
    output::{CompilerOptions, Model, SourceLine},
    parser::{parse_directive, parse_line},
    source::{FileId, SourceFiles, SourceLoc},
};

/// One open `#if*` block.
#[derive(Debug)]
struct Frame {
    active: bool,
    taken: bool,
    parent_active: bool,
    has_else: bool,
}

/// Evaluates `#if` conditions. Only condition symbols are visible and nothing
/// can be deferred.
struct ConditionContext<'a> {
    symbols: &'a BTreeMap<String, i64>,
}

impl EvalContext for ConditionContext<'_> {
    fn current_address(&self) -> i64 {
        0
    }

    fn loop_counter(&self) -> Option<i64> {
        None
    }

    fn symbol(&mut self, name: &str, _root: bool) -> SymbolValue {
        match self.symbols.get(name) {
            Some(value) => SymbolValue::Resolved(Value::Int(*value)),
            None => SymbolValue::Undefined,
        }
    }
}

/// Everything that survived preprocessing.
#[derive(Debug, Default)]
pub struct Preprocessed {
    pub lines: Vec<Line>,
    pub source_lines: Vec<SourceLine>,
    pub condition_symbols: BTreeSet<String>,
    pub model: Option<Model>,
    pub errors: Vec<(SourceLoc, AssemblerError)>,
}

/// Filters the source through the `#` directives, follows includes, and
/// parses every line that remains active.
pub struct Preprocessor<'a, S> {
    file_manager: &'a FileManager<S>,
    sources: &'a mut SourceFiles,
    symbols: BTreeMap<String, i64>,
    frames: Vec<Frame>,
    default_model: Model,
    output: Preprocessed,
}

impl<'a, S: FileSystem> Preprocessor<'a, S> {
    pub fn new(
        file_manager: &'a FileManager<S>,
        sources: &'a mut SourceFiles,
        options: &CompilerOptions,
    ) -> Self {
        Self {
            file_manager,
            sources,
            symbols: options.predefined_symbols.clone(),
            frames: Vec::new(),
            default_model: options.current_model,
            output: Preprocessed::default(),
        }
    }

    #[inline]
    fn active(&self) -> bool {
        self.frames
            .last()
            .map_or(true, |frame| frame.active && frame.parent_active)
    }

    #[inline]
    fn model(&self) -> Model {
        self.output.model.unwrap_or(self.default_model)
    }

    #[inline]
    fn error(&mut self, e: (SourceLoc, AssemblerError)) {
        trace!("Preprocessor error at {}: {}", e.0, e.1);
        self.output.errors.push(e);
    }

    pub fn process(&mut self, file: FileId, text: &str) {
        let depth = self.frames.len();
        let mut last_loc = SourceLoc::new(file, 1, 1);
        for (index, line_text) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line_text.trim_start();
            let loc = SourceLoc::new(file, line_no, line_text.len() - trimmed.len() + 1);
            last_loc = loc;

            match directive_name(trimmed) {
                Some(Ok(name)) => {
                    if let Err(e) = self.directive(file, line_no, line_text, loc, name) {
                        self.error(e);
                    }
                }
                Some(Err(word)) => {
                    if self.active() {
                        self.error((
                            loc,
                            AssemblerError::new("Z0210", format!("Unknown directive \"#{word}\"")),
                        ));
                    }
                }
                None if self.active() => self.line(file, line_no, line_text),
                None => {}
            }
        }

        if self.frames.len() > depth {
            self.error((
                last_loc,
                AssemblerError::new("Z0205", "Missing \"#endif\" at the end of the file"),
            ));
            self.frames.truncate(depth);
        }
    }

    fn line(&mut self, file: FileId, line_no: usize, text: &str) {
        self.output.source_lines.push(SourceLine {
            file,
            line: line_no,
            text: text.to_string(),
        });
        match parse_line(file, line_no, text) {
            Ok(line) => {
                if let Some(Body::Pragma(Pragma::Model(name))) = &line.body {
                    if let Err(e) = self.model_pragma(line.body_loc, name) {
                        self.error(e);
                    }
                }
                self.output.lines.push(line);
            }
            Err(e) => self.error(e),
        }
    }

    fn model_pragma(&mut self, loc: SourceLoc, name: &str) -> AsmResult<()> {
        if self.output.model.is_some() {
            return asm_err!(loc, "Z0302", "The \".model\" pragma can be used only once");
        }
        match Model::parse(name) {
            Some(model) => {
                debug!("Model set to {model}");
                self.output.model = Some(model);
                Ok(())
            }
            None => asm_err!(loc, "Z0303", "Unknown model \"{name}\""),
        }
    }

    fn condition(&mut self, expr: &Expr, loc: SourceLoc) -> AsmResult<bool> {
        let mut ctx = ConditionContext {
            symbols: &self.symbols,
        };
        match expr.evaluate(&mut ctx, false) {
            EvalResult::Resolved(value) => Ok(value.is_true()),
            EvalResult::Deferred => Ok(false),
            EvalResult::Error(e) => Err((loc, e.into())),
        }
    }

    fn open(&mut self, active: bool) {
        let parent_active = self.active();
        self.frames.push(Frame {
            active,
            taken: active,
            parent_active,
            has_else: false,
        });
    }

    fn directive(
        &mut self,
        file: FileId,
        line_no: usize,
        text: &str,
        loc: SourceLoc,
        name: DirectiveName,
    ) -> AsmResult<()> {
        let structural = matches!(
            name,
            DirectiveName::If
                | DirectiveName::IfDef
                | DirectiveName::IfNDef
                | DirectiveName::IfMod
                | DirectiveName::IfNMod
                | DirectiveName::Elif
                | DirectiveName::Else
                | DirectiveName::Endif
        );
        if !self.active() {
            // Inactive lines are never tokenized, only the nesting is tracked
            match name {
                DirectiveName::Else | DirectiveName::Elif | DirectiveName::Endif => {}
                _ if structural => {
                    self.open(false);
                    return Ok(());
                }
                _ => return Ok(()),
            }
            let parent_active = self.frames.last().map_or(true, |frame| frame.parent_active);
            if !parent_active {
                if name == DirectiveName::Endif {
                    self.frames.pop();
                }
                return Ok(());
            }
        }

        let directive = match parse_directive(file, line_no, text) {
            Ok(directive) => directive,
            Err(e) => {
                if structural && !matches!(name, DirectiveName::Else | DirectiveName::Elif | DirectiveName::Endif) {
                    self.open(false);
                }
                return Err(e);
            }
        };

        match directive {
            Directive::Define(symbol) => {
                trace!("#define {symbol}");
                self.symbols.insert(symbol, 1);
            }

            Directive::Undef(symbol) => {
                self.symbols.remove(&symbol);
            }

            Directive::If(expr) => {
                let result = self.condition(&expr, loc);
                self.open(*result.as_ref().unwrap_or(&false));
                result?;
            }

            Directive::IfDef(symbol) => self.open(self.symbols.contains_key(&symbol)),

            Directive::IfNDef(symbol) => self.open(!self.symbols.contains_key(&symbol)),

            Directive::IfMod(model) | Directive::IfNMod(model) => {
                let negate = matches!(name, DirectiveName::IfNMod);
                match Model::parse(&model) {
                    Some(model) => self.open((model == self.model()) != negate),
                    None => {
                        self.open(false);
                        return asm_err!(loc, "Z0206", "Unknown model \"{model}\"");
                    }
                }
            }

            Directive::Elif(expr) => {
                let (taken, parent_active) = match self.frames.last() {
                    Some(frame) if !frame.has_else => (frame.taken, frame.parent_active),
                    Some(_) => return asm_err!(loc, "Z0209", "\"#elif\" cannot follow \"#else\""),
                    None => return asm_err!(loc, "Z0209", "\"#elif\" without \"#if\""),
                };
                if let Some(frame) = self.frames.last_mut() {
                    frame.active = false;
                }
                if parent_active && !taken && self.condition(&expr, loc)? {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.active = true;
                        frame.taken = true;
                    }
                }
            }

            Directive::Else => match self.frames.last_mut() {
                Some(frame) if !frame.has_else => {
                    frame.active = !frame.taken;
                    frame.taken = true;
                    frame.has_else = true;
                }
                Some(_) => return asm_err!(loc, "Z0207", "Duplicate \"#else\""),
                None => return asm_err!(loc, "Z0207", "Unexpected \"#else\""),
            },

            Directive::Endif => {
                if self.frames.pop().is_none() {
                    return asm_err!(loc, "Z0208", "Unexpected \"#endif\"");
                }
            }

            Directive::Include(path) => self.include(file, loc, &path)?,

            Directive::Line(_) => {}
        }
        Ok(())
    }

    fn include(&mut self, parent: FileId, loc: SourceLoc, path: &str) -> AsmResult<()> {
        let dir = self
            .sources
            .get(parent)
            .and_then(|source| source.path().parent())
            .map(|dir| dir.to_path_buf())
            .unwrap_or_default();
        let resolved = match self.file_manager.search(&dir, path) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return asm_err!(loc, "Z0201", "Cannot find the included file \"{path}\""),
            Err(e) => return asm_err!(loc, "Z0204", "Cannot read the included file \"{path}\": {e}"),
        };
        if self.sources.is_ancestor(parent, &resolved) {
            return asm_err!(loc, "Z0203", "Circular inclusion of \"{path}\"");
        }
        let id = match self.sources.insert_include(parent, &resolved) {
            Some(id) => id,
            None => return asm_err!(loc, "Z0202", "\"{path}\" is already included by this file"),
        };
        let text = match self.file_manager.read_to_string(&resolved) {
            Ok(text) => text,
            Err(e) => return asm_err!(loc, "Z0204", "Cannot read the included file \"{path}\": {e}"),
        };
        debug!("Including {}", resolved.display());
        self.process(id, &text);
        Ok(())
    }

    pub fn finish(mut self) -> Preprocessed {
        self.output.condition_symbols = self.symbols.keys().cloned().collect();
        self.output
    }
}

/// Recognizes a `#word` line. Hexadecimal literals such as `#FF` are not
/// directives. Unknown words are returned as errors.
fn directive_name(trimmed: &str) -> Option<Result<DirectiveName, String>> {
    let rest = trimmed.strip_prefix('#')?;
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if word.is_empty() || !word.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    match DirectiveName::parse(&word) {
        Some(name) => Some(Ok(name)),
        None if word.chars().all(|c| c.is_ascii_hexdigit()) => None,
        None => Some(Err(word)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::fileman::tests::StringFileSystem;

    fn preprocess_with(
        files: &[(&str, &str)],
        source: &str,
        options: &CompilerOptions,
    ) -> (Preprocessed, SourceFiles) {
        let file_manager = FileManager::new(StringFileSystem::new(files));
        let mut sources = SourceFiles::new();
        let root = sources.insert_root("/src/main.asm");
        let mut preprocessor = Preprocessor::new(&file_manager, &mut sources, options);
        preprocessor.process(root, source);
        let output = preprocessor.finish();
        (output, sources)
    }

    fn preprocess(source: &str) -> Preprocessed {
        preprocess_with(&[], source, &CompilerOptions::default()).0
    }

    fn codes(output: &Preprocessed) -> Vec<&'static str> {
        output.errors.iter().map(|(_, e)| e.code()).collect()
    }

    #[test]
    fn undefined_ifdef_drops_block() {
        let output = preprocess("nop\n#ifdef MySymbol\nld a,b\nld a,c\n#endif\nhalt");
        assert!(output.errors.is_empty());
        let texts: Vec<_> = output.source_lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(vec!["nop", "halt"], texts);
    }

    #[test]
    fn nested_conditions() {
        let cases = [
            ("#define OUTER\n#define INNER\n", 3),
            ("#define OUTER\n", 2),
            ("#define INNER\n", 3),
            ("", 3),
        ];
        for (defines, expected) in cases {
            let source = format!(
                "{defines}#ifdef OUTER\nnop\n#ifdef INNER\nnop\nnop\n#else\nnop\n#endif\n#else\nnop\nnop\nnop\n#endif"
            );
            let output = preprocess(&source);
            assert!(output.errors.is_empty());
            assert_eq!(expected, output.lines.len(), "{defines:?}");
        }
    }

    #[test]
    fn elif_chain() {
        let output = preprocess("#if 0\nnop\n#elif 1\nhalt\n#elif 1\ndi\n#else\nei\n#endif");
        let texts: Vec<_> = output.source_lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(vec!["halt"], texts);
    }

    #[test]
    fn predefined_symbols_in_conditions() {
        let mut options = CompilerOptions::default();
        options.predefined_symbols.insert("LEVEL".into(), 3);
        let (output, _) = preprocess_with(&[], "#if LEVEL > 2\nnop\n#endif", &options);
        assert_eq!(1, output.lines.len());
        assert!(output.condition_symbols.contains("LEVEL"));

        let output = preprocess("#if Missing\nnop\n#endif");
        assert_eq!(vec!["Z0605"], codes(&output));
        assert!(output.lines.is_empty());
    }

    #[test]
    fn misplaced_directives_are_all_reported() {
        let output = preprocess("#else\nnop\n#endif\n#ifdef DEBUG\n#else\n#else\n#endif\n#elif 1");
        assert_eq!(vec!["Z0207", "Z0208", "Z0207", "Z0209"], codes(&output));
        let lines: Vec<_> = output.errors.iter().map(|(loc, _)| loc.line).collect();
        assert_eq!(vec![1, 3, 6, 8], lines);
    }

    #[test]
    fn missing_endif() {
        let output = preprocess("#ifdef DEBUG\nnop");
        assert_eq!(vec!["Z0205"], codes(&output));
    }

    #[test]
    fn models() {
        let output = preprocess("#ifmod Spectrum48\nnop\n#endif\n#ifnmod NEXT\nhalt\n#endif");
        assert_eq!(2, output.lines.len());

        let output = preprocess(".model Next\n#ifmod next\nnop\n#endif");
        assert_eq!(Some(Model::Next), output.model);
        assert_eq!(2, output.lines.len());

        let output = preprocess("#ifmod Amiga\nnop\n#endif\n.model Next\n.model Next");
        assert_eq!(vec!["Z0206", "Z0302"], codes(&output));
    }

    #[test]
    fn unknown_directive() {
        let output = preprocess("#pragma once\n#ifdef X\n#bogus\n#endif");
        assert_eq!(vec!["Z0210"], codes(&output));
    }

    #[test]
    fn includes() {
        let files = [
            ("/src/lib/util.asm", "ld a,b\n#include \"../common.asm\""),
            ("/src/common.asm", "halt"),
        ];
        let (output, sources) = preprocess_with(
            &files,
            "nop\n#include \"lib/util.asm\"\n#ifdef Never\n#include \"missing.asm\"\n#endif",
            &CompilerOptions::default(),
        );
        assert!(output.errors.is_empty());
        let texts: Vec<_> = output.source_lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(vec!["nop", "ld a,b", "halt"], texts);
        assert_eq!(
            vec![
                PathBuf::from("/src/main.asm"),
                PathBuf::from("/src/lib/util.asm"),
                PathBuf::from("/src/common.asm"),
            ],
            sources.paths()
        );
    }

    #[test]
    fn include_errors() {
        let files = [
            ("/src/self.asm", "#include \"self.asm\""),
            ("/src/twice.asm", "nop"),
        ];
        let (output, _) = preprocess_with(
            &files,
            "#include \"missing.asm\"\n#include \"self.asm\"\n#include \"twice.asm\"\n#include \"twice.asm\"",
            &CompilerOptions::default(),
        );
        assert_eq!(vec!["Z0201", "Z0203", "Z0202"], codes(&output));
    }
}
