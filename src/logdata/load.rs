// src/logdata/load.rs
//
// Symbol-table loading. The table is a single CBOR map mixing maps keyed by
// strings, integers, and 2-arrays (function address ranges); each shape gets
// its own typed container, and anything structurally unexpected is a load
// error rather than a best-effort guess.

use std::collections::{BTreeMap, HashMap};

use minicbor::data::Type;
use minicbor::Decoder;

use crate::error::IoError;
use crate::logdata::parsers::FieldParser;
use crate::logdata::{FormatRecord, FuncRange, LogDataset};

/// Parse a symbol table from raw CBOR bytes.
pub fn load_from_cbor(data: &[u8]) -> Result<LogDataset, IoError> {
    let mut d = Decoder::new(data);
    let entries = map_len(&mut d, "symbol table")?;

    let mut enums = None;
    let mut tdenums = None;
    let mut variables = None;
    let mut functions = None;
    let mut saddr = None;
    let mut fmts = None;

    for _ in 0..entries {
        let key = d
            .str()
            .map_err(|e| bad("symbol table key", e))?
            .to_string();
        match key.as_str() {
            "enums" => enums = Some(read_enum_maps(&mut d, "enums")?),
            "tdenums" => tdenums = Some(read_enum_maps(&mut d, "tdenums")?),
            "vars" => variables = Some(read_variables(&mut d)?),
            "fns" => functions = Some(read_functions(&mut d)?),
            "saddr" => saddr = Some(d.u32().map_err(|e| bad("saddr", e))?),
            "fmts" => fmts = Some(read_formats(&mut d)?),
            _ => {
                // Newer table generators may add sections; ignore them.
                d.skip().map_err(|e| bad(&key, e))?;
            }
        }
    }

    Ok(LogDataset {
        enums: enums.ok_or_else(|| missing("enums"))?,
        tdenums: tdenums.ok_or_else(|| missing("tdenums"))?,
        variables: variables.ok_or_else(|| missing("vars"))?,
        functions: functions.ok_or_else(|| missing("fns"))?,
        saddr: saddr.ok_or_else(|| missing("saddr"))?,
        fmts: fmts.ok_or_else(|| missing("fmts"))?,
    })
}

// ============================================================================
// Sections
// ============================================================================

fn read_enum_maps(
    d: &mut Decoder<'_>,
    what: &str,
) -> Result<HashMap<String, HashMap<i64, String>>, IoError> {
    let n = map_len(d, what)?;
    let mut out = HashMap::with_capacity(n);
    for _ in 0..n {
        let name = d.str().map_err(|e| bad(what, e))?.to_string();
        let members = map_len(d, what)?;
        let mut mapping = HashMap::with_capacity(members);
        for _ in 0..members {
            let value = d.i64().map_err(|e| bad(what, e))?;
            let member = d.str().map_err(|e| bad(what, e))?.to_string();
            mapping.insert(value, member);
        }
        out.insert(name, mapping);
    }
    Ok(out)
}

fn read_variables(d: &mut Decoder<'_>) -> Result<BTreeMap<u32, String>, IoError> {
    let n = map_len(d, "vars")?;
    let mut out = BTreeMap::new();
    for _ in 0..n {
        let addr = d.u32().map_err(|e| bad("vars", e))?;
        let name = d.str().map_err(|e| bad("vars", e))?.to_string();
        out.insert(addr, name);
    }
    Ok(out)
}

fn read_functions(d: &mut Decoder<'_>) -> Result<Vec<FuncRange>, IoError> {
    let n = map_len(d, "fns")?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        // Keys arrive as 2-arrays [low, high).
        let parts = array_len(d, "fns")?;
        if parts != 2 {
            return Err(IoError::symbol_table(format!(
                "fns: expected 2-element range key, got {} elements",
                parts
            )));
        }
        let low = d.u32().map_err(|e| bad("fns", e))?;
        let high = d.u32().map_err(|e| bad("fns", e))?;
        let name = d.str().map_err(|e| bad("fns", e))?.to_string();
        out.push(FuncRange { low, high, name });
    }
    out.sort_by_key(|f| f.low);
    Ok(out)
}

fn read_formats(d: &mut Decoder<'_>) -> Result<HashMap<u32, FormatRecord>, IoError> {
    let n = map_len(d, "fmts")?;
    let mut out = HashMap::with_capacity(n);
    for _ in 0..n {
        let addr = d.u32().map_err(|e| bad("fmts", e))?;
        let parts = array_len(d, "fmts")?;
        let record = match parts {
            3 => {
                let level = read_level(d)?;
                let file = d.str().map_err(|e| bad("fmts", e))?.to_string();
                let line = d.u32().map_err(|e| bad("fmts", e))?;
                FormatRecord::Bare { level, file, line }
            }
            5 => {
                let level = read_level(d)?;
                let file = d.str().map_err(|e| bad("fmts", e))?.to_string();
                let line = d.u32().map_err(|e| bad("fmts", e))?;
                let format = d.str().map_err(|e| bad("fmts", e))?.to_string();
                let count = array_len(d, "fmts parsers")?;
                let mut parsers = Vec::with_capacity(count);
                for _ in 0..count {
                    parsers.push(read_parser(d)?);
                }
                FormatRecord::Compiled {
                    level,
                    file,
                    line,
                    format,
                    parsers,
                }
            }
            other => {
                return Err(IoError::symbol_table(format!(
                    "fmts 0x{:08x}: expected 3 or 5 fields, got {}",
                    addr, other
                )))
            }
        };
        out.insert(addr, record);
    }
    Ok(out)
}

fn read_level(d: &mut Decoder<'_>) -> Result<Option<i64>, IoError> {
    if d.datatype().map_err(|e| bad("level", e))? == Type::Null {
        d.null().map_err(|e| bad("level", e))?;
        Ok(None)
    } else {
        Ok(Some(d.i64().map_err(|e| bad("level", e))?))
    }
}

/// Parser atoms are strings from the fixed set, or `["enum", name]`.
fn read_parser(d: &mut Decoder<'_>) -> Result<FieldParser, IoError> {
    match d.datatype().map_err(|e| bad("parser atom", e))? {
        Type::String => {
            let atom = d.str().map_err(|e| bad("parser atom", e))?;
            match atom {
                "int32" => Ok(FieldParser::Int32),
                "uint32" => Ok(FieldParser::Uint32),
                "int64" => Ok(FieldParser::Int64),
                "uint64" => Ok(FieldParser::Uint64),
                "double" => Ok(FieldParser::Double),
                "pointer" => Ok(FieldParser::Pointer),
                "bytes" => Ok(FieldParser::Bytes),
                "string" => Ok(FieldParser::Str),
                "sym" => Ok(FieldParser::Sym),
                other => Err(IoError::symbol_table(format!(
                    "unknown parser atom {:?}",
                    other
                ))),
            }
        }
        Type::Array => {
            let parts = array_len(d, "parser atom")?;
            let tag = d.str().map_err(|e| bad("parser atom", e))?;
            if parts != 2 || tag != "enum" {
                return Err(IoError::symbol_table(format!(
                    "unknown parser atom [{:?}; {}]",
                    tag, parts
                )));
            }
            let name = d.str().map_err(|e| bad("parser atom", e))?.to_string();
            Ok(FieldParser::Enum(name))
        }
        other => Err(IoError::symbol_table(format!(
            "unexpected parser atom type {:?}",
            other
        ))),
    }
}

// ============================================================================
// Decode helpers
// ============================================================================

fn map_len(d: &mut Decoder<'_>, what: &str) -> Result<usize, IoError> {
    match d.map().map_err(|e| bad(what, e))? {
        Some(n) => Ok(n as usize),
        None => Err(IoError::symbol_table(format!(
            "{}: indefinite-length map not supported",
            what
        ))),
    }
}

fn array_len(d: &mut Decoder<'_>, what: &str) -> Result<usize, IoError> {
    match d.array().map_err(|e| bad(what, e))? {
        Some(n) => Ok(n as usize),
        None => Err(IoError::symbol_table(format!(
            "{}: indefinite-length array not supported",
            what
        ))),
    }
}

fn bad(what: &str, e: impl std::fmt::Display) -> IoError {
    IoError::symbol_table(format!("{}: {}", what, e))
}

fn missing(what: &str) -> IoError {
    IoError::symbol_table(format!("missing {:?} section", what))
}

// ============================================================================
// Test table builder
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testtable::{Atom, Fmt, Table};
    use super::*;

    #[test]
    fn test_load_full_table() {
        let table = Table {
            enums: vec![("Color", vec![(0, "RED"), (1, "GREEN")])],
            tdenums: vec![("state_t", vec![(-1, "IDLE")])],
            vars: vec![(0x2000_0000, "main.c:g_ticks")],
            fns: vec![(0x0800_1000, 0x0800_1100, "boot_main")],
            saddr: 0x0070_0000,
            fmts: vec![
                (
                    0x0070_1000,
                    Fmt::Compiled(Some(0), "a.c", 42, "v=%d", vec![Atom::Name("int32")]),
                ),
                (0x0070_1010, Fmt::Bare(Some(1), "b.c", 7)),
            ],
        };

        let ds = load_from_cbor(&table.encode()).unwrap();
        assert_eq!(ds.enums["Color"][&1], "GREEN");
        assert_eq!(ds.tdenums["state_t"][&-1], "IDLE");
        assert_eq!(ds.variables[&0x2000_0000], "main.c:g_ticks");
        assert_eq!(ds.functions.len(), 1);
        assert_eq!(ds.functions[0].name, "boot_main");
        assert_eq!(ds.saddr, 0x0070_0000);

        match &ds.fmts[&0x0070_1000] {
            FormatRecord::Compiled {
                level,
                file,
                line,
                format,
                parsers,
            } => {
                assert_eq!(*level, Some(0));
                assert_eq!(file, "a.c");
                assert_eq!(*line, 42);
                assert_eq!(format, "v=%d");
                assert_eq!(parsers.as_slice(), &[FieldParser::Int32]);
            }
            other => panic!("unexpected record: {:?}", other),
        }
        assert!(matches!(
            ds.fmts[&0x0070_1010],
            FormatRecord::Bare { level: Some(1), .. }
        ));
    }

    #[test]
    fn test_enum_atom_compiles() {
        let table = Table {
            fmts: vec![(
                0x10,
                Fmt::Compiled(
                    Some(0),
                    "c.c",
                    1,
                    "%s",
                    vec![Atom::Enum("Color"), Atom::Name("sym")],
                ),
            )],
            ..Default::default()
        };
        let ds = load_from_cbor(&table.encode()).unwrap();
        match &ds.fmts[&0x10] {
            FormatRecord::Compiled { parsers, .. } => {
                assert_eq!(
                    parsers.as_slice(),
                    &[FieldParser::Enum("Color".to_string()), FieldParser::Sym]
                );
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_atom() {
        let table = Table {
            fmts: vec![(
                0x10,
                Fmt::Compiled(Some(0), "c.c", 1, "%d", vec![Atom::Name("int128")]),
            )],
            ..Default::default()
        };
        assert!(matches!(
            load_from_cbor(&table.encode()),
            Err(IoError::SymbolTable(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_input() {
        let table = Table::default();
        let bytes = table.encode();
        assert!(load_from_cbor(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_rejects_missing_section() {
        // A map with only "saddr" is structurally incomplete.
        let mut buf = Vec::new();
        let mut e = minicbor::Encoder::new(&mut buf);
        e.map(1).unwrap();
        e.str("saddr").unwrap();
        e.u32(7).unwrap();
        assert!(matches!(
            load_from_cbor(&buf),
            Err(IoError::SymbolTable(_))
        ));
    }
}
