// src/logdata/parsers.rs
//
// Field parsers for compiled log formats. Each parser atom consumes a fixed
// or variable number of bytes from the front of a frame; sym and enum atoms
// additionally resolve their value against the symbol table.

use std::fmt;

use crate::logdata::LogDataset;

/// Pre-compiled parser atom. String atoms in the symbol table map to these
/// at load time; `["enum", name]` carries the enum name along.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldParser {
    Int32,
    Uint32,
    Int64,
    Uint64,
    Double,
    Pointer,
    Bytes,
    Str,
    Sym,
    Enum(String),
}

impl FieldParser {
    /// Atom name as it appears in the symbol table (used in error notes).
    pub fn name(&self) -> &str {
        match self {
            FieldParser::Int32 => "int32",
            FieldParser::Uint32 => "uint32",
            FieldParser::Int64 => "int64",
            FieldParser::Uint64 => "uint64",
            FieldParser::Double => "double",
            FieldParser::Pointer => "pointer",
            FieldParser::Bytes => "bytes",
            FieldParser::Str => "string",
            FieldParser::Sym => "sym",
            FieldParser::Enum(_) => "enum",
        }
    }
}

/// One parsed field value.
#[derive(Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "{}", v),
            Arg::Uint(v) => write!(f, "{}", v),
            Arg::Float(v) => write!(f, "{}", v),
            Arg::Str(s) => write!(f, "{:?}", s),
            Arg::Bytes(b) => write!(f, "{}", hex_spaced(b)),
        }
    }
}

/// Render bytes as space-separated lowercase hex pairs.
pub fn hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render bytes as contiguous lowercase hex.
pub fn hex_compact(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Extraction
// ============================================================================

/// Walk `parsers` against `frame`, consuming from the front. Returns the
/// parsed values, or an error note when a parser runs out of bytes or bytes
/// remain after the last parser.
pub fn extract_args(
    frame: &[u8],
    parsers: &[FieldParser],
    dataset: &LogDataset,
) -> Result<Vec<Arg>, String> {
    let mut rest = frame;
    let mut args = Vec::with_capacity(parsers.len());

    for parser in parsers {
        let (value, remainder) = apply(parser, rest, dataset).ok_or_else(|| {
            format!(
                "Unable to decode parameter: {} near: {}",
                parser.name(),
                hex_spaced(rest)
            )
        })?;
        args.push(value);
        rest = remainder;
    }

    if !rest.is_empty() {
        return Err(format!("Extra data in frame {}", hex_spaced(rest)));
    }
    Ok(args)
}

fn apply<'a>(
    parser: &FieldParser,
    rest: &'a [u8],
    dataset: &LogDataset,
) -> Option<(Arg, &'a [u8])> {
    match parser {
        FieldParser::Int32 => take4(rest).map(|(b, r)| (Arg::Int(i32::from_le_bytes(b) as i64), r)),
        FieldParser::Uint32 | FieldParser::Pointer => {
            take4(rest).map(|(b, r)| (Arg::Uint(u32::from_le_bytes(b) as u64), r))
        }
        FieldParser::Int64 => take8(rest).map(|(b, r)| (Arg::Int(i64::from_le_bytes(b)), r)),
        FieldParser::Uint64 => take8(rest).map(|(b, r)| (Arg::Uint(u64::from_le_bytes(b)), r)),
        FieldParser::Double => take8(rest).map(|(b, r)| (Arg::Float(f64::from_le_bytes(b)), r)),
        FieldParser::Bytes => Some((Arg::Bytes(rest.to_vec()), &rest[rest.len()..])),
        FieldParser::Str => {
            let nul = rest.iter().position(|&b| b == 0)?;
            let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
            Some((Arg::Str(text), &rest[nul + 1..]))
        }
        FieldParser::Sym => {
            let (b, r) = take4(rest)?;
            let addr = u32::from_le_bytes(b);
            Some((Arg::Str(resolve_sym(dataset, addr)), r))
        }
        FieldParser::Enum(name) => {
            let (b, r) = take4(rest)?;
            let value = i32::from_le_bytes(b) as i64;
            Some((Arg::Str(resolve_enum(dataset, name, value)), r))
        }
    }
}

fn take4(rest: &[u8]) -> Option<([u8; 4], &[u8])> {
    if rest.len() < 4 {
        return None;
    }
    Some((rest[..4].try_into().unwrap(), &rest[4..]))
}

fn take8(rest: &[u8]) -> Option<([u8; 8], &[u8])> {
    if rest.len() < 8 {
        return None;
    }
    Some((rest[..8].try_into().unwrap(), &rest[8..]))
}

// ============================================================================
// Symbol resolution
// ============================================================================

/// Variable lookups only match within this distance of the symbol address.
const VAR_WINDOW: u32 = 0x3000;

/// Resolve a 32-bit address: function range first (Thumb bit masked off),
/// then nearest-preceding variable, then bare hex.
pub fn resolve_sym(dataset: &LogDataset, addr: u32) -> String {
    let masked = addr & !1;
    for func in &dataset.functions {
        if masked >= func.low && masked < func.high {
            return format!("{}+0x{:x}", func.name, masked - func.low);
        }
    }

    if let Some((&base, name)) = dataset.variables.range(..=addr).next_back() {
        if addr - base < VAR_WINDOW {
            return format!("{}+0x{:x}", name, addr - base);
        }
    }

    format!("0x{:08x}", addr)
}

/// Resolve an enum member: named enums first, typedef enums as fallback.
/// A known enum with an unknown member renders `<name:value>`; an unknown
/// enum renders `<!name:value>`.
pub fn resolve_enum(dataset: &LogDataset, name: &str, value: i64) -> String {
    let table = dataset
        .enums
        .get(name)
        .or_else(|| dataset.tdenums.get(name));
    match table {
        Some(members) => members
            .get(&value)
            .cloned()
            .unwrap_or_else(|| format!("<{}:{}>", name, value)),
        None => format!("<!{}:{}>", name, value),
    }
}
