mod instructions;
mod macros;

use super::{Assembled, Assembler};
use crate::{
    fileman::{tests::StringFileSystem, FileManager},
    output::{CompilerOptions, Model},
    parser::build_blocks,
    preproc::Preprocessor,
    source::SourceFiles,
};

/// Runs both passes over `/src/main.asm`. The source must preprocess and
/// parse cleanly.
fn assemble_with(files: &[(&str, &str)], source: &str, options: &CompilerOptions) -> Assembled {
    let file_manager = FileManager::new(StringFileSystem::new(files));
    let mut sources = SourceFiles::new();
    let root = sources.insert_root("/src/main.asm");
    let mut preprocessor = Preprocessor::new(&file_manager, &mut sources, options);
    preprocessor.process(root, source);
    let preprocessed = preprocessor.finish();
    assert!(preprocessed.errors.is_empty(), "{:?}", preprocessed.errors);

    let (nodes, errors) = build_blocks(preprocessed.lines);
    assert!(errors.is_empty(), "{errors:?}");
    let model = preprocessed.model.unwrap_or(options.current_model);
    Assembler::new(&file_manager, &sources, options, model).assemble(&nodes)
}

fn assemble(source: &str) -> Assembled {
    assemble_with(&[], source, &CompilerOptions::default())
}

fn assemble_next(source: &str) -> Assembled {
    let options = CompilerOptions {
        current_model: Model::Next,
        ..CompilerOptions::default()
    };
    assemble_with(&[], source, &options)
}

/// The bytes of every segment, in order.
fn bytes(assembled: &Assembled) -> Vec<u8> {
    assert!(assembled.errors.is_empty(), "{:?}", assembled.errors);
    assembled
        .segments
        .iter()
        .flat_map(|segment| segment.emitted_code.iter().copied())
        .collect()
}

fn code(source: &str) -> Vec<u8> {
    bytes(&assemble(source))
}

fn error_codes(assembled: &Assembled) -> Vec<&'static str> {
    assembled.errors.iter().map(|(_, e)| e.code()).collect()
}

fn errors(source: &str) -> Vec<&'static str> {
    error_codes(&assemble(source))
}
