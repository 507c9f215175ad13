use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
    path::PathBuf,
};

use crate::source::FileId;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum Model {
    #[default]
    Spectrum48,
    Spectrum128,
    SpectrumP3,
    Next,
}

impl Model {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "spectrum48" => Some(Self::Spectrum48),
            "spectrum128" => Some(Self::Spectrum128),
            "spectrump3" => Some(Self::SpectrumP3),
            "next" => Some(Self::Next),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spectrum48 => "Spectrum48",
            Self::Spectrum128 => "Spectrum128",
            Self::SpectrumP3 => "SpectrumP3",
            Self::Next => "Next",
        }
    }

    /// The highest bank number `.bank` accepts, if the model has banks.
    #[inline]
    pub fn max_bank(&self) -> Option<i64> {
        match self {
            Self::Spectrum48 => None,
            Self::Spectrum128 | Self::SpectrumP3 => Some(7),
            Self::Next => Some(111),
        }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct CompilerOptions {
    /// Seeds the `#ifdef` symbols and the global constants.
    pub predefined_symbols: BTreeMap<String, i64>,
    pub current_model: Model,
    pub include_paths: Vec<PathBuf>,
    /// Errors a single loop may report before it gives up.
    pub max_loop_errors: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            predefined_symbols: BTreeMap::new(),
            current_model: Model::default(),
            include_paths: Vec::new(),
            max_loop_errors: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.code,
            self.message
        )
    }
}

/// A line that survived preprocessing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLine {
    pub file: FileId,
    pub line: usize,
    pub text: String,
}

/// A contiguous run of emitted bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub bank: Option<u8>,
    pub bank_offset: u16,
    pub start_address: u16,
    /// Set by `.disp`; labels and `$` are shifted by this amount.
    pub displacement: Option<i64>,
    /// Set by `.xorg`; the address the segment is exported to.
    pub xorg: Option<u16>,
    pub emitted_code: Vec<u8>,
    pub(crate) max_code_length: usize,
}

impl Segment {
    pub(crate) fn new(start_address: u16, max_code_length: usize) -> Self {
        Self {
            start_address,
            max_code_length,
            ..Self::default()
        }
    }

    #[inline]
    pub fn current_address(&self) -> u16 {
        (self.start_address as usize + self.emitted_code.len()) as u16
    }
}

/// Emitted code of one source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListItem {
    pub file: FileId,
    pub line: usize,
    pub address: u16,
    pub segment: usize,
    pub code_start: usize,
    pub code_length: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SimpleOutput {
    pub errors: Vec<Diagnostic>,
    pub source_files: Vec<PathBuf>,
    pub preprocessed_lines: Vec<SourceLine>,
    pub condition_symbols: BTreeSet<String>,
    /// Messages of `.trace` and `.tracehex`.
    pub trace_output: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AssemblerOutput {
    pub base: SimpleOutput,
    pub segments: Vec<Segment>,
    pub symbols: BTreeMap<String, i64>,
    pub list_items: Vec<ListItem>,
    pub model: Model,
    pub entry_address: Option<u16>,
    pub export_entry_address: Option<u16>,
}

/// The result of a compilation. `Simple` means compilation stopped before
/// any code was emitted.
#[derive(Clone, Debug)]
pub enum CompilerOutput {
    Simple(SimpleOutput),
    WithSegments(AssemblerOutput),
}

impl CompilerOutput {
    #[inline]
    fn base(&self) -> &SimpleOutput {
        match self {
            Self::Simple(output) => output,
            Self::WithSegments(output) => &output.base,
        }
    }

    #[inline]
    pub fn errors(&self) -> &[Diagnostic] {
        &self.base().errors
    }

    #[inline]
    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        match self {
            Self::Simple(_) => &[],
            Self::WithSegments(output) => &output.segments,
        }
    }

    #[inline]
    pub fn source_files(&self) -> &[PathBuf] {
        &self.base().source_files
    }

    #[inline]
    pub fn preprocessed_lines(&self) -> &[SourceLine] {
        &self.base().preprocessed_lines
    }

    #[inline]
    pub fn condition_symbols(&self) -> &BTreeSet<String> {
        &self.base().condition_symbols
    }

    #[inline]
    pub fn trace_output(&self) -> &[String] {
        &self.base().trace_output
    }

    #[inline]
    pub fn assembled(&self) -> Option<&AssemblerOutput> {
        match self {
            Self::Simple(_) => None,
            Self::WithSegments(output) => Some(output),
        }
    }

    /// All segment bytes back to back.
    pub fn code(&self) -> Vec<u8> {
        self.segments()
            .iter()
            .flat_map(|segment| segment.emitted_code.iter().copied())
            .collect()
    }
}
