use tracing::{debug, trace};

use crate::{
    ast::{Label, Pragma},
    error::AsmResult,
    expr::{Expr, Random, Value},
    fileman::FileSystem,
    output::{Model, Segment},
    symtab::{Symbol, SymbolKind},
};

use super::{
    fixup::{CompareBin, FixupKind},
    Assembler,
};

impl<S: FileSystem> Assembler<'_, S> {
    pub(super) fn pragma(&mut self, label: Option<Label>, pragma: &Pragma) -> AsmResult<()> {
        match pragma {
            Pragma::Org(expr) => {
                let address = self.eval_int(expr)? as u16;
                self.org(address);
                self.bind_label(label)
            }

            Pragma::Xorg(expr) => {
                let address = self.eval_int(expr)? as u16;
                let index = self.ensure_segment();
                let segment = &mut self.segments[index];
                if !segment.emitted_code.is_empty() && segment.xorg.is_some() {
                    return asm_err!(
                        self.loc,
                        "Z0314",
                        "The \".xorg\" of this segment is already set"
                    );
                }
                segment.xorg = Some(address);
                self.bind_label(label)
            }

            Pragma::Ent(expr) | Pragma::Xent(expr) => {
                self.bind_label(label)?;
                if !self.in_global_scope() {
                    return asm_err!(
                        self.loc,
                        "Z0310",
                        "Entry addresses can be set only in the global scope"
                    );
                }
                let export = matches!(pragma, Pragma::Xent(_));
                match self.eval_int_late(expr)? {
                    Some(value) if export => self.export_entry = Some(value as u16),
                    Some(value) => self.entry = Some(value as u16),
                    None if export => self.fixup(FixupKind::Xent, expr),
                    None => self.fixup(FixupKind::Ent, expr),
                }
                Ok(())
            }

            Pragma::Disp(expr) => {
                let displacement = self.eval_int(expr)?;
                let index = self.ensure_segment();
                self.segments[index].displacement = Some(displacement);
                self.bind_label(label)
            }

            Pragma::Equ(expr) => self.equ(label, expr),

            Pragma::Var(expr) => self.var(label, expr),

            Pragma::Bank { bank, offset } => {
                if let Some(label) = label {
                    return asm_err!(label.loc, "Z0305", "The \".bank\" pragma cannot have a label");
                }
                self.bank(bank, offset.as_ref())
            }

            Pragma::Skip { target, fill } => {
                self.bind_label(label)?;
                let target = self.eval_int(target)?;
                let fill = match fill {
                    Some(fill) => self.eval_int(fill)? as u8,
                    None => 0xFF,
                };
                let current = self.address();
                if target < current {
                    return asm_err!(
                        self.loc,
                        "Z0313",
                        "Cannot skip back from {current:#06X} to {target:#06X}"
                    );
                }
                self.emit(&vec![fill; fill_count(target - current)]);
                Ok(())
            }

            Pragma::Defb(values) | Pragma::Defw(values) => {
                self.bind_label(label)?;
                let word = matches!(pragma, Pragma::Defw(_));
                for expr in values {
                    self.data_value(expr, word)?;
                }
                Ok(())
            }

            Pragma::Defm(expr) | Pragma::Defn(expr) | Pragma::Defc(expr) => {
                self.bind_label(label)?;
                let mut bytes = match self.eval_now(expr)? {
                    Value::Str(text) => text.chars().map(|c| c as u32 as u8).collect::<Vec<_>>(),
                    _ => {
                        return asm_err!(self.loc, "Z0315", "The pragma expects a string value")
                    }
                };
                match pragma {
                    Pragma::Defn(_) => bytes.push(0),
                    Pragma::Defc(_) => {
                        if let Some(last) = bytes.last_mut() {
                            *last |= 0x80;
                        }
                    }
                    _ => {}
                }
                self.emit(&bytes);
                Ok(())
            }

            Pragma::Defh(expr) => {
                self.bind_label(label)?;
                let text = match self.eval_now(expr)? {
                    Value::Str(text) => text,
                    _ => {
                        return asm_err!(self.loc, "Z0316", "\".defh\" expects a string value")
                    }
                };
                let bytes = match hex_bytes(&text) {
                    Some(bytes) => bytes,
                    None => {
                        return asm_err!(
                            self.loc,
                            "Z0317",
                            "\"{text}\" is not an even number of hexadecimal digits"
                        )
                    }
                };
                self.emit(&bytes);
                Ok(())
            }

            Pragma::Defs { count, fill } => {
                self.bind_label(label)?;
                let count = self.eval_int(count)?;
                let fill = match fill {
                    Some(fill) => self.eval_int(fill)? as u8,
                    None => 0,
                };
                self.emit(&vec![fill; fill_count(count)]);
                Ok(())
            }

            Pragma::Fillb { count, value } => {
                self.bind_label(label)?;
                let count = self.eval_int(count)?;
                let value = self.eval_int(value)? as u8;
                self.emit(&vec![value; fill_count(count)]);
                Ok(())
            }

            Pragma::Fillw { count, value } => {
                self.bind_label(label)?;
                let count = self.eval_int(count)?;
                let value = (self.eval_int(value)? as u16).to_le_bytes();
                let bytes: Vec<u8> = (0..fill_count(count)).flat_map(|_| value).collect();
                self.emit(&bytes);
                Ok(())
            }

            Pragma::Defg(pattern) => {
                self.bind_label(label)?;
                let bytes = self.graphics(pattern, false)?;
                self.emit(&bytes);
                Ok(())
            }

            Pragma::Defgx(expr) => {
                self.bind_label(label)?;
                let pattern = match self.eval_now(expr)? {
                    Value::Str(pattern) => pattern,
                    _ => {
                        return asm_err!(self.loc, "Z0324", "\".defgx\" expects a string value")
                    }
                };
                let bytes = self.graphics(&pattern, true)?;
                self.emit(&bytes);
                Ok(())
            }

            Pragma::Model(_) => self.bind_label(label),

            Pragma::Align(alignment) => {
                self.bind_label(label)?;
                let alignment = match alignment {
                    Some(alignment) => self.eval_int(alignment)?,
                    None => 0x100,
                };
                if !(1..=0x4000).contains(&alignment) {
                    return asm_err!(
                        self.loc,
                        "Z0318",
                        "The alignment must be between 1 and 0x4000, not {alignment:#X}"
                    );
                }
                let current = self.address();
                let padding = (alignment - current.rem_euclid(alignment)) % alignment;
                self.emit(&vec![0; padding as usize]);
                Ok(())
            }

            Pragma::Error(expr) => {
                self.bind_label(label)?;
                let message = self.eval_now(expr)?;
                asm_err!(self.loc, "Z2000", "{message}")
            }

            Pragma::IncludeBin {
                path,
                offset,
                length,
            } => {
                self.bind_label(label)?;
                self.include_bin(path, offset.as_ref(), length.as_ref())
            }

            Pragma::Trace { hex, values } => {
                self.bind_label(label)?;
                let mut message = String::new();
                for expr in values {
                    let value = self.eval_now(expr)?;
                    message.push_str(&trace_text(&value, *hex));
                }
                debug!("Trace: {message}");
                self.trace_output.push(message);
                Ok(())
            }

            Pragma::RndSeed(seed) => {
                self.bind_label(label)?;
                self.random = match seed {
                    Some(seed) => Random::new(self.eval_int(seed)?),
                    None => Random::from_clock(),
                };
                Ok(())
            }

            Pragma::CompareBin {
                path,
                offset,
                length,
            } => {
                self.bind_label(label)?;
                if !matches!(self.eval_now(path)?, Value::Str(_)) {
                    return asm_err!(self.loc, "Z0319", "\".comparebin\" expects a file name");
                }
                let segment_length = self
                    .segment
                    .map_or(0, |index| self.segments[index].emitted_code.len());
                self.compare_bins.push(CompareBin {
                    loc: self.loc,
                    scope: self.scope,
                    address: self.line_address,
                    path: path.clone(),
                    offset: offset.clone(),
                    length: length.clone(),
                    segment: self.segment,
                    segment_length,
                    invocations: self.invocations.clone(),
                });
                Ok(())
            }
        }
    }

    /// Starts the following code at `address`. An empty segment is moved
    /// rather than left behind.
    fn org(&mut self, address: u16) {
        debug!("Origin {address:#06X}");
        if let Some(index) = self.segment {
            let segment = &mut self.segments[index];
            if segment.emitted_code.is_empty() {
                segment.start_address = address;
                if segment.bank.is_none() {
                    segment.max_code_length = 0x10000 - address as usize;
                }
                return;
            }
        }
        self.open_segment(Segment::new(address, 0x10000 - address as usize));
    }

    fn bank(&mut self, bank: &Expr, offset: Option<&Expr>) -> AsmResult<()> {
        let max_bank = match self.model.max_bank() {
            Some(max_bank) => max_bank,
            None => {
                return asm_err!(
                    self.loc,
                    "Z0308",
                    "The {} model has no banks",
                    Model::Spectrum48
                )
            }
        };
        let bank = self.eval_int(bank)?;
        if !(0..=max_bank).contains(&bank) {
            return asm_err!(
                self.loc,
                "Z0306",
                "The bank must be between 0 and {max_bank}, not {bank}"
            );
        }
        let offset = match offset {
            Some(offset) => self.eval_int(offset)?,
            None => 0,
        };
        if !(0..=0x3FFF).contains(&offset) {
            return asm_err!(
                self.loc,
                "Z0307",
                "The bank offset must be between 0 and 0x3FFF, not {offset:#X}"
            );
        }
        if self.model != Model::Next
            && self.segments.iter().any(|segment| segment.bank == Some(bank as u8))
        {
            return asm_err!(self.loc, "Z0309", "The bank {bank} is already used");
        }

        debug!("Bank {bank} at offset {offset:#06X}");
        let mut segment = Segment::new(0xC000 + offset as u16, 0x4000 - offset as usize);
        segment.bank = Some(bank as u8);
        segment.bank_offset = offset as u16;
        match self.segment {
            Some(index)
                if self.segments[index].emitted_code.is_empty()
                    && self.segments[index].bank.is_none() =>
            {
                self.segments[index] = segment;
            }
            _ => {
                self.open_segment(segment);
            }
        }
        Ok(())
    }

    fn equ(&mut self, label: Option<Label>, expr: &Expr) -> AsmResult<()> {
        let label = match label {
            Some(label) => label,
            None => return asm_err!(self.loc, "Z0304", "The \".equ\" pragma needs a label"),
        };
        let value = self.eval(expr, true)?;
        let deferred = value.is_none();
        let target = self.define_constant(&label.name, value, label.loc)?;
        if deferred {
            trace!("Constant {} waits for pass 2", label.name);
            self.fixup(
                FixupKind::Equ {
                    name: label.name,
                    target,
                },
                expr,
            );
        }
        Ok(())
    }

    fn var(&mut self, label: Option<Label>, expr: &Expr) -> AsmResult<()> {
        let label = match label {
            Some(label) => label,
            None => return asm_err!(self.loc, "Z0311", "A variable assignment needs a name"),
        };
        let value = self.eval_now(expr)?;
        if let Some(scope) = self.symtab.find_variable(self.scope, &label.name) {
            if let Some(symbol) = self.symtab.get_local_mut(scope, &label.name) {
                symbol.value = Some(value);
            }
            return Ok(());
        }
        if self.symtab.resolve(self.scope, &label.name, false).is_some() {
            return asm_err!(
                label.loc,
                "Z0312",
                "\"{}\" is not a variable and cannot be reassigned",
                label.name
            );
        }
        let target = if label.name.starts_with('`') {
            self.scope
        } else {
            self.symtab.owner(self.scope)
        };
        trace!("Variable {} = {value}", label.name);
        self.symtab.insert(
            target,
            label.name,
            Symbol {
                kind: SymbolKind::Variable,
                value: Some(value),
            },
        );
        Ok(())
    }

    fn data_value(&mut self, expr: &Expr, word: bool) -> AsmResult<()> {
        let value = match self.eval(expr, true)? {
            Some(Value::Str(_)) => {
                return asm_err!(
                    self.loc,
                    "Z0601",
                    "Strings cannot be used in \".defb\" or \".defw\""
                )
            }
            value => value.and_then(|value| value.as_int()),
        };
        let kind = if word {
            FixupKind::Bit16
        } else {
            FixupKind::Bit8
        };
        let value = match value {
            Some(value) => value,
            None => {
                self.fixup(kind, expr);
                0
            }
        };
        if word {
            self.emit(&(value as u16).to_le_bytes());
        } else {
            self.emit(&[value as u8]);
        }
        Ok(())
    }

    /// Converts a pixel pattern into bytes, eight pixels per byte.
    fn graphics(&self, pattern: &str, directional: bool) -> AsmResult<Vec<u8>> {
        let trimmed = pattern.trim();
        let (pad_left, pixels) = match trimmed.chars().next() {
            Some('>') if directional => (true, &trimmed[1..]),
            Some('<') if directional => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let mut bits: Vec<bool> = pixels
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| !matches!(c, '.' | '-' | '_'))
            .collect();
        if bits.is_empty() {
            return asm_err!(self.loc, "Z0325", "The graphics pattern is empty");
        }
        let padding = (8 - bits.len() % 8) % 8;
        if pad_left {
            bits.splice(0..0, std::iter::repeat(false).take(padding));
        } else {
            bits.extend(std::iter::repeat(false).take(padding));
        }
        Ok(bits
            .chunks(8)
            .map(|chunk| chunk.iter().fold(0u8, |byte, bit| byte << 1 | *bit as u8))
            .collect())
    }

    fn include_bin(
        &mut self,
        path: &Expr,
        offset: Option<&Expr>,
        length: Option<&Expr>,
    ) -> AsmResult<()> {
        let path = match self.eval_now(path)? {
            Value::Str(path) => path,
            _ => {
                return asm_err!(self.loc, "Z0319", "\".includebin\" expects a file name")
            }
        };
        let offset = match offset {
            Some(offset) => self.binary_argument(offset)?,
            None => 0,
        };
        let length = match length {
            Some(length) => Some(self.binary_argument(length)?),
            None => None,
        };

        let dir = self.source_dir(self.loc.file);
        let bytes = match self.file_manager.search(&dir, &path) {
            Ok(Some(resolved)) => match self.file_manager.read_bytes(&resolved) {
                Ok(bytes) => bytes,
                Err(e) => return asm_err!(self.loc, "Z0322", "Cannot read \"{path}\": {e}"),
            },
            Ok(None) => return asm_err!(self.loc, "Z0322", "Cannot find \"{path}\""),
            Err(e) => return asm_err!(self.loc, "Z0322", "Cannot read \"{path}\": {e}"),
        };

        if offset < 0 || offset as usize > bytes.len() {
            return asm_err!(
                self.loc,
                "Z0320",
                "The offset {offset} is outside of the {} bytes of \"{path}\"",
                bytes.len()
            );
        }
        let rest = &bytes[offset as usize..];
        let length = match length {
            Some(length) if length < 0 || length as usize > rest.len() => {
                return asm_err!(
                    self.loc,
                    "Z0321",
                    "The length {length} exceeds the {} bytes after the offset",
                    rest.len()
                )
            }
            Some(length) => length as usize,
            None => rest.len(),
        };

        let index = self.ensure_segment();
        let segment = &self.segments[index];
        let room = segment.max_code_length.saturating_sub(segment.emitted_code.len());
        if length > room {
            return asm_err!(
                self.loc,
                "Z0323",
                "The {length} bytes of \"{path}\" do not fit into the segment"
            );
        }
        debug!("Including {length} bytes of {path}");
        self.emit(&rest[..length]);
        Ok(())
    }

    fn binary_argument(&mut self, expr: &Expr) -> AsmResult<i64> {
        match self.eval_now(expr)?.as_int() {
            Some(value) => Ok(value),
            None => asm_err!(self.loc, "Z0602", "A numeric value is expected, not a string"),
        }
    }
}

/// How `.trace` shows a value. In hex mode integers take four digits, or
/// eight above 0x10000, and strings show their bytes.
fn trace_text(value: &Value, hex: bool) -> String {
    match value {
        Value::Int(value) if hex && *value > 0x10000 => format!("{value:08x}"),
        Value::Int(value) if hex => format!("{value:04x}"),
        Value::Str(text) if hex => text.chars().map(|c| format!("{:02x}", c as u32 as u8)).collect(),
        value => value.to_string(),
    }
}

/// Clamps a repeat count to what a segment can hold.
#[inline]
fn fill_count(count: i64) -> usize {
    count.clamp(0, 0x10000) as usize
}

/// Decodes a string of hexadecimal digit pairs.
fn hex_bytes(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}
