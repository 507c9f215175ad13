use tracing::{debug, trace};

use crate::{
    error::{AsmResult, AssemblerError},
    expr::{EvalResult, Expr, Value},
    fileman::FileSystem,
    source::SourceLoc,
    symtab::ScopeId,
};

use super::{push_error, Assembler, ScopeContext};

#[derive(Clone, Debug, PartialEq)]
pub enum FixupKind {
    Bit8,
    Bit16,
    /// A word stored high byte first, as `push nn` expects.
    Bit16Be,
    Jr,
    Ent,
    Xent,
    /// A constant whose defining expression referenced a later symbol.
    Equ {
        name: String,
        target: ScopeId,
    },
}

/// A value that could not be computed in the first pass.
#[derive(Clone, Debug)]
pub struct Fixup {
    pub kind: FixupKind,
    pub loc: SourceLoc,
    pub segment: usize,
    pub offset: usize,
    /// `$` of the line that recorded the fixup.
    pub address: i64,
    pub scope: ScopeId,
    pub expr: Expr,
    /// The macro invocations active when the fixup was recorded, outermost
    /// first.
    pub invocations: Vec<(String, SourceLoc)>,
}

impl Fixup {
    #[inline]
    fn is_equ(&self) -> bool {
        matches!(self.kind, FixupKind::Equ { .. })
    }
}

/// A `.comparebin` check, run once every fixup is patched.
#[derive(Clone, Debug)]
pub struct CompareBin {
    pub loc: SourceLoc,
    pub scope: ScopeId,
    pub address: i64,
    pub path: Expr,
    pub offset: Option<Expr>,
    pub length: Option<Expr>,
    /// The segment current at the pragma, and how many bytes it held then.
    pub segment: Option<usize>,
    pub segment_length: usize,
    pub invocations: Vec<(String, SourceLoc)>,
}

impl<S: FileSystem> Assembler<'_, S> {
    /// Evaluates `expr` as it would have been seen at `loc`.
    fn eval_at(
        &mut self,
        expr: &Expr,
        scope: ScopeId,
        address: i64,
        loc: SourceLoc,
        late_binding: bool,
    ) -> EvalResult {
        let mut ctx = ScopeContext {
            symtab: &mut self.symtab,
            random: &mut self.random,
            scope,
            address,
            loc,
        };
        expr.evaluate(&mut ctx, late_binding)
    }

    #[inline]
    fn fixup_value(&mut self, fixup: &Fixup, late_binding: bool) -> EvalResult {
        self.eval_at(&fixup.expr, fixup.scope, fixup.address, fixup.loc, late_binding)
    }

    /// Second pass. Constants are settled first, since other fixups may read
    /// them, then every remaining value is patched into its segment.
    pub(super) fn resolve_fixups(&mut self) {
        let (mut equs, others): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.fixups).into_iter().partition(Fixup::is_equ);
        trace!("Resolving {} constants and {} fixups", equs.len(), others.len());

        loop {
            let before = equs.len();
            let mut pending = Vec::new();
            for fixup in equs {
                match self.fixup_value(&fixup, true) {
                    EvalResult::Resolved(value) => self.settle_constant(&fixup, value),
                    EvalResult::Deferred => pending.push(fixup),
                    EvalResult::Error(e) => self.fixup_error(&fixup, e.into()),
                }
            }
            equs = pending;
            if equs.is_empty() || equs.len() == before {
                break;
            }
        }
        for fixup in equs {
            if let EvalResult::Error(e) = self.fixup_value(&fixup, false) {
                self.fixup_error(&fixup, e.into());
            }
        }

        for fixup in others {
            match self.fixup_value(&fixup, false) {
                EvalResult::Resolved(value) => match value.as_int() {
                    Some(value) => self.patch(&fixup, value),
                    None => self.fixup_error(
                        &fixup,
                        AssemblerError::new("Z0603", "A numeric value is expected, not a string"),
                    ),
                },
                EvalResult::Deferred => {}
                EvalResult::Error(e) => self.fixup_error(&fixup, e.into()),
            }
        }
    }

    /// Reports against the invocation chain that was active in the first
    /// pass.
    #[inline]
    fn fixup_error(&mut self, fixup: &Fixup, e: AssemblerError) {
        push_error(&mut self.errors, &fixup.invocations, fixup.loc, e);
    }

    fn settle_constant(&mut self, fixup: &Fixup, value: Value) {
        if let FixupKind::Equ { name, target } = &fixup.kind {
            trace!("Constant {name} settled to {value}");
            if let Some(symbol) = self.symtab.get_local_mut(*target, name) {
                symbol.value = Some(value);
            }
        }
    }

    fn patch(&mut self, fixup: &Fixup, value: i64) {
        let code = match self.segments.get_mut(fixup.segment) {
            Some(segment) => &mut segment.emitted_code,
            None => return,
        };
        match &fixup.kind {
            FixupKind::Bit8 => {
                if let Some(byte) = code.get_mut(fixup.offset) {
                    *byte = value as u8;
                }
            }
            FixupKind::Bit16 | FixupKind::Bit16Be => {
                let bytes = if fixup.kind == FixupKind::Bit16 {
                    (value as u16).to_le_bytes()
                } else {
                    (value as u16).to_be_bytes()
                };
                if let Some(slot) = code.get_mut(fixup.offset..fixup.offset + 2) {
                    slot.copy_from_slice(&bytes);
                }
            }
            FixupKind::Jr => {
                let distance = value - (fixup.address + 2);
                if !(-128..=127).contains(&distance) {
                    self.fixup_error(
                        fixup,
                        AssemblerError::new(
                            "Z0403",
                            format!("Relative jump distance should be between -128 and 127, not {distance}"),
                        ),
                    );
                    return;
                }
                if let Some(byte) = code.get_mut(fixup.offset) {
                    *byte = distance as u8;
                }
            }
            FixupKind::Ent => self.entry = Some(value as u16),
            FixupKind::Xent => self.export_entry = Some(value as u16),
            FixupKind::Equ { .. } => {}
        }
    }
}

// Binary comparisons
impl<S: FileSystem> Assembler<'_, S> {
    pub(super) fn compare_binaries(&mut self) {
        for check in std::mem::take(&mut self.compare_bins) {
            if let Err((loc, e)) = self.compare_binary(&check) {
                push_error(&mut self.errors, &check.invocations, loc, e);
            }
        }
    }

    fn compare_value(&mut self, check: &CompareBin, expr: &Expr) -> AsmResult<Value> {
        match self.eval_at(expr, check.scope, check.address, check.loc, false) {
            EvalResult::Resolved(value) => Ok(value),
            EvalResult::Deferred => Ok(Value::Int(0)),
            EvalResult::Error(e) => Err((check.loc, e.into())),
        }
    }

    fn compare_binary(&mut self, check: &CompareBin) -> AsmResult<()> {
        let loc = check.loc;
        let path = match self.compare_value(check, &check.path)? {
            Value::Str(path) => path,
            _ => return asm_err!(loc, "Z0326", "The \".comparebin\" file name must be a string"),
        };
        let offset = match &check.offset {
            Some(expr) => match self.compare_value(check, expr)? {
                Value::Int(offset) if offset < 0 => {
                    return asm_err!(loc, "Z0327", "The offset {offset} is negative")
                }
                Value::Int(offset) => offset as usize,
                _ => return asm_err!(loc, "Z0603", "An integer value is expected"),
            },
            None => 0,
        };
        let length = match &check.length {
            Some(expr) => match self.compare_value(check, expr)? {
                Value::Int(length) if length < 0 => {
                    return asm_err!(loc, "Z0328", "The length {length} is negative")
                }
                Value::Int(length) => length as usize,
                _ => return asm_err!(loc, "Z0603", "An integer value is expected"),
            },
            None => 0,
        };

        let dir = self.source_dir(loc.file);
        let contents = match self.file_manager.search(&dir, &path) {
            Ok(Some(resolved)) => match self.file_manager.read_bytes(&resolved) {
                Ok(contents) => contents,
                Err(e) => return asm_err!(loc, "Z0329", "Cannot read \"{path}\": {e}"),
            },
            Ok(None) => return asm_err!(loc, "Z0329", "Cannot find \"{path}\""),
            Err(e) => return asm_err!(loc, "Z0329", "Cannot read \"{path}\": {e}"),
        };
        if offset >= contents.len() {
            return asm_err!(
                loc,
                "Z0327",
                "The offset {offset} is outside of the {} bytes of \"{path}\"",
                contents.len()
            );
        }
        // A zero length compares everything after the offset.
        let length = if length == 0 {
            contents.len() - offset
        } else {
            length
        };
        if offset + length > contents.len() {
            return asm_err!(
                loc,
                "Z0327",
                "The length {length} exceeds the {} bytes after the offset",
                contents.len() - offset
            );
        }

        let segment = match check.segment {
            Some(index) => &self.segments[index],
            None => return asm_err!(loc, "Z0330", "There is no output segment to compare"),
        };
        if check.segment_length > length {
            return asm_err!(
                loc,
                "Z0330",
                "The binary has only {length} bytes to compare, but the segment has {}",
                check.segment_length
            );
        }
        let expected = &contents[offset..offset + check.segment_length];
        let actual = &segment.emitted_code[..check.segment_length.min(segment.emitted_code.len())];
        if let Some((index, (out, bin))) = actual
            .iter()
            .zip(expected)
            .enumerate()
            .find(|(_, (out, bin))| out != bin)
        {
            return asm_err!(
                loc,
                "Z0330",
                "The output segment at offset {index} is {out:#04X}, but in \"{path}\" it is {bin:#04X}"
            );
        }
        debug!("{} bytes match \"{path}\"", check.segment_length);
        Ok(())
    }
}
