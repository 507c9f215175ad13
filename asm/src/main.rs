use std::{
    error::Error,
    fs::File,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use tracing::Level;
use zmasm::{compile_file, CompilerOptions, Model};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to input assembly file
    #[clap(parse(from_os_str), value_name = "FILE")]
    file: PathBuf,

    /// Path to output binary file (Default: stdout)
    #[clap(parse(from_os_str), short, long)]
    output: Option<PathBuf>,

    /// Paths to search for included files
    #[clap(parse(from_os_str), short = 'I', long)]
    include: Vec<PathBuf>,

    /// Target model: Spectrum48, Spectrum128, SpectrumP3, or Next
    #[clap(short, long, parse(try_from_str = parse_model))]
    model: Option<Model>,

    /// Pre-defined symbols (repeatable). The value defaults to 1
    #[clap(short = 'D', long, value_name = "NAME[=VALUE]", parse(try_from_str = parse_define))]
    define: Vec<(String, i64)>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[clap(short, long, default_value_t = Level::WARN)]
    log_level: Level,
}

fn parse_model(s: &str) -> Result<Model, String> {
    Model::parse(s).ok_or_else(|| format!("unknown model `{s}`"))
}

fn parse_define(s: &str) -> Result<(String, i64), Box<dyn Error + Send + Sync + 'static>> {
    match s.find('=') {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].parse()?)),
        None => Ok((s.to_string(), 1)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    let mut options = CompilerOptions {
        include_paths: args.include,
        predefined_symbols: args.define.into_iter().collect(),
        ..CompilerOptions::default()
    };
    if let Some(model) = args.model {
        options.current_model = model;
    }

    let compiled = compile_file(&args.file, &options);
    for message in compiled.trace_output() {
        eprintln!("{message}");
    }
    if compiled.has_errors() {
        for diagnostic in compiled.errors() {
            eprintln!("{diagnostic}");
        }
        return ExitCode::FAILURE;
    }

    let mut output: Box<dyn Write> = if let Some(path) = args.output {
        let result = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.clone());
        match result {
            Err(e) => {
                eprintln!("Cannot open file \"{}\" for writing: {e}", path.display());
                return ExitCode::FAILURE;
            }
            Ok(file) => Box::new(file),
        }
    } else {
        Box::new(io::stdout())
    };

    if let Err(e) = output.write_all(&compiled.code()) {
        eprintln!("Cannot write the output: {e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
