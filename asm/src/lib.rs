#[macro_use]
mod error;

mod assembler;
mod ast;
mod expr;
mod fileman;
mod lexer;
mod output;
mod parser;
mod preproc;
mod source;
mod symtab;

use std::{
    env,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument};

pub use crate::{
    error::AssemblerError,
    fileman::{FileSystem, RealFileSystem},
    output::{
        AssemblerOutput, CompilerOptions, CompilerOutput, Diagnostic, ListItem, Model, Segment,
        SimpleOutput, SourceLine,
    },
    source::{FileId, SourceLoc},
};

use crate::{
    assembler::Assembler,
    fileman::FileManager,
    parser::build_blocks,
    preproc::Preprocessor,
    source::SourceFiles,
};

/// The file name in-memory source is registered under.
const SOURCE_NAME: &str = "<source>";

/// Compiles in-memory source. Includes are resolved against the current
/// directory.
pub fn compile(source: &str, options: &CompilerOptions) -> CompilerOutput {
    let cwd = env::current_dir().unwrap_or_default();
    Compiler::new(RealFileSystem::new()).compile_source(cwd, source, options)
}

/// Reads and compiles the file at `path`.
pub fn compile_file<P: AsRef<Path>>(path: P, options: &CompilerOptions) -> CompilerOutput {
    let cwd = env::current_dir().unwrap_or_default();
    Compiler::new(RealFileSystem::new()).compile_file(cwd, path, options)
}

/// One compilation over a file system. Every compilation owns its own
/// symbol table and segments.
pub struct Compiler<S> {
    file_manager: FileManager<S>,
}

impl<S: FileSystem> Compiler<S> {
    #[inline]
    pub fn new(file_system: S) -> Self {
        Self {
            file_manager: FileManager::new(file_system),
        }
    }

    #[instrument(skip_all)]
    pub fn compile_source<C: AsRef<Path>>(
        self,
        cwd: C,
        source: &str,
        options: &CompilerOptions,
    ) -> CompilerOutput {
        let root = cwd.as_ref().join(SOURCE_NAME);
        self.compile_root(cwd.as_ref(), root, source, options)
    }

    #[instrument(skip_all)]
    pub fn compile_file<C: AsRef<Path>, P: AsRef<Path>>(
        self,
        cwd: C,
        path: P,
        options: &CompilerOptions,
    ) -> CompilerOutput {
        let cwd = cwd.as_ref();
        let path = match self.file_manager.absolute(cwd, path.as_ref()) {
            Ok(path) => path,
            Err(e) => return file_error(path.as_ref(), "Z0204", format!("Cannot read the file: {e}")),
        };
        match self.file_manager.read_to_string(&path) {
            Ok(text) => self.compile_root(cwd, path, &text, options),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                file_error(&path, "Z0201", format!("The file \"{}\" is not found", path.display()))
            }
            Err(e) => file_error(&path, "Z0204", format!("Cannot read the file: {e}")),
        }
    }

    fn compile_root(
        mut self,
        cwd: &Path,
        root_path: PathBuf,
        source: &str,
        options: &CompilerOptions,
    ) -> CompilerOutput {
        for dir in &options.include_paths {
            if let Err(e) = self.file_manager.add_search_path(cwd, dir) {
                return file_error(
                    &root_path,
                    "Z0201",
                    format!("Cannot use the include directory \"{}\": {e}", dir.display()),
                );
            }
        }

        let mut sources = SourceFiles::new();
        let root = sources.insert_root(&root_path);
        debug!("Compiling {}", root_path.display());

        let mut preprocessor = Preprocessor::new(&self.file_manager, &mut sources, options);
        preprocessor.process(root, source);
        let preprocessed = preprocessor.finish();
        let model = preprocessed.model.unwrap_or(options.current_model);

        let mut base = SimpleOutput {
            errors: Vec::new(),
            source_files: sources.paths(),
            preprocessed_lines: preprocessed.source_lines,
            condition_symbols: preprocessed.condition_symbols,
            trace_output: Vec::new(),
        };
        if !preprocessed.errors.is_empty() {
            base.errors = diagnostics(&sources, preprocessed.errors);
            return CompilerOutput::Simple(base);
        }

        let (nodes, errors) = build_blocks(preprocessed.lines);
        if !errors.is_empty() {
            base.errors = diagnostics(&sources, errors);
            return CompilerOutput::Simple(base);
        }

        let assembled = Assembler::new(&self.file_manager, &sources, options, model).assemble(&nodes);
        base.errors = diagnostics(&sources, assembled.errors);
        base.trace_output = assembled.trace_output;
        CompilerOutput::WithSegments(AssemblerOutput {
            base,
            segments: assembled.segments,
            symbols: assembled.symbols,
            list_items: assembled.list_items,
            model,
            entry_address: assembled.entry_address,
            export_entry_address: assembled.export_entry_address,
        })
    }
}

fn diagnostics(
    sources: &SourceFiles,
    errors: Vec<(SourceLoc, AssemblerError)>,
) -> Vec<Diagnostic> {
    errors
        .into_iter()
        .map(|(loc, e)| Diagnostic {
            code: e.code(),
            message: e.message().to_string(),
            file: sources
                .get(loc.file)
                .map(|source| source.path().to_path_buf())
                .unwrap_or_default(),
            line: loc.line,
            column: loc.column,
        })
        .collect()
}

/// A compilation that failed before any line was read.
fn file_error(path: &Path, code: &'static str, message: String) -> CompilerOutput {
    CompilerOutput::Simple(SimpleOutput {
        errors: vec![Diagnostic {
            code,
            message,
            file: path.to_path_buf(),
            line: 0,
            column: 0,
        }],
        source_files: vec![path.to_path_buf()],
        ..SimpleOutput::default()
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::fileman::tests::StringFileSystem;

    fn compile_with(files: &[(&str, &str)], source: &str, options: &CompilerOptions) -> CompilerOutput {
        Compiler::new(StringFileSystem::new(files)).compile_source("/src", source, options)
    }

    #[test_log::test]
    fn compiles_to_segments() {
        let output = compile_with(
            &[("/src/lib.asm", "Value: .equ 7")],
            "#include \"lib.asm\"\n    .org $6000\nMain: ld a,Value\n    .ent Main",
            &CompilerOptions::default(),
        );
        assert!(!output.has_errors(), "{:?}", output.errors());
        assert_eq!(vec![0x3E, 0x07], output.code());

        let assembled = output.assembled().unwrap();
        assert_eq!(Model::Spectrum48, assembled.model);
        assert_eq!(Some(0x6000), assembled.entry_address);
        assert_eq!(Some(&0x6000), assembled.symbols.get("Main"));
        assert_eq!(
            vec![PathBuf::from("/src/<source>"), PathBuf::from("/src/lib.asm")],
            output.source_files()
        );
        assert_eq!(4, output.preprocessed_lines().len());
        assert_eq!(1, assembled.list_items.len());
    }

    #[test_log::test]
    fn syntax_errors_stop_before_emission() {
        let output = compile_with(&[], " nop\n ld a,", &CompilerOptions::default());
        assert!(output.assembled().is_none());
        assert!(output.segments().is_empty());
        let error = &output.errors()[0];
        assert_eq!(PathBuf::from("/src/<source>"), error.file);
        assert_eq!(2, error.line);
    }

    #[test_log::test]
    fn unmatched_blocks_stop_before_emission() {
        let output = compile_with(&[], " .loop 2\n nop", &CompilerOptions::default());
        assert!(output.assembled().is_none());
        assert_eq!(vec!["Z0701"], codes(&output));
    }

    #[test_log::test]
    fn diagnostics_carry_locations() {
        let output = compile_with(&[], " nop\n   jp Nowhere", &CompilerOptions::default());
        assert!(output.assembled().is_some());
        let error = &output.errors()[0];
        assert_eq!("Z0605", error.code);
        assert_eq!(2, error.line);
        assert_eq!(4, error.column);
    }

    #[test_log::test]
    fn predefined_symbols() {
        let mut options = CompilerOptions::default();
        options.predefined_symbols.insert("DEBUG".to_string(), 3);
        let output = compile_with(
            &[],
            "#ifdef DEBUG\n    .defb DEBUG\n#else\n    .defb 0\n#endif",
            &options,
        );
        assert_eq!(vec![0x03], output.code());
        assert!(output.condition_symbols().contains("DEBUG"));
    }

    #[test_log::test]
    fn model_pragma_overrides_the_option() {
        let options = CompilerOptions {
            current_model: Model::Spectrum128,
            ..CompilerOptions::default()
        };
        let output = compile_with(&[], " .model Next\n nextreg 7,0", &options);
        assert!(!output.has_errors(), "{:?}", output.errors());
        assert_eq!(Model::Next, output.assembled().unwrap().model);
    }

    #[test_log::test]
    fn include_directories() {
        let options = CompilerOptions {
            include_paths: vec![PathBuf::from("/shared")],
            ..CompilerOptions::default()
        };
        let output = compile_with(
            &[("/shared/defs.asm", " .defb 5")],
            "#include \"defs.asm\"",
            &options,
        );
        assert_eq!(vec![0x05], output.code());

        let options = CompilerOptions {
            include_paths: vec![PathBuf::from("/src/lib.asm")],
            ..CompilerOptions::default()
        };
        let output = compile_with(&[("/src/lib.asm", "")], " nop", &options);
        assert_eq!(vec!["Z0201"], codes(&output));
    }

    #[test_log::test]
    fn missing_files() {
        let output = Compiler::new(StringFileSystem::new(&[])).compile_file(
            "/src",
            "main.asm",
            &CompilerOptions::default(),
        );
        assert_eq!(vec!["Z0201"], codes(&output));
        assert_eq!(PathBuf::from("/src/main.asm"), output.errors()[0].file);
    }

    #[test_log::test]
    fn output_is_deterministic() {
        let source = "Start: ld hl,End\n .loop 3\n .defb $cnt\n .endl\nEnd: ret";
        let first = compile_with(&[], source, &CompilerOptions::default());
        let second = compile_with(&[], source, &CompilerOptions::default());
        assert_eq!(first.code(), second.code());
        assert_eq!(
            first.assembled().unwrap().symbols,
            second.assembled().unwrap().symbols
        );
    }

    #[test_log::test]
    fn trace_output() {
        let output = compile_with(&[], " .trace \"at \", $\n nop", &CompilerOptions::default());
        assert!(!output.has_errors(), "{:?}", output.errors());
        assert_eq!(vec!["at 32768".to_string()], output.trace_output().to_vec());
    }

    fn codes(output: &CompilerOutput) -> Vec<&'static str> {
        output.errors().iter().map(|e| e.code).collect()
    }
}
