// src/logdata/mod.rs
//
// Symbolic log-frame decoder. A LogData instance loads one target's CBOR
// symbol table and turns raw (target, address, payload) log frames into
// structured records: the address selects a compiled format, the format's
// parser atoms consume the payload, and the format string renders the text.

mod load;
pub(crate) mod parsers;
mod printf;

pub use parsers::{Arg, FieldParser};
pub use printf::FormatError;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::IoError;
use crate::mux::{LOG_TYPE_BASIC, LOG_TYPE_MEM, TARGET_DIGIT_SHIFT};
use parsers::{extract_args, hex_compact, hex_spaced};

/// Log level names indexed by the level field of a format record.
pub const LEVEL_NAMES: [&str; 6] = ["INFO", "TRACE ", "WARN ", "ERROR", "FATAL", "PANIC"];

// ============================================================================
// Dataset
// ============================================================================

/// One function's address range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncRange {
    pub low: u32,
    pub high: u32,
    pub name: String,
}

/// One entry of the format-string section.
#[derive(Clone, Debug, PartialEq)]
pub enum FormatRecord {
    /// 3-field entry: metadata without parsers; passed through undecoded.
    Bare {
        level: Option<i64>,
        file: String,
        line: u32,
    },
    /// 5-field entry with a pre-compiled parser list.
    Compiled {
        level: Option<i64>,
        file: String,
        line: u32,
        format: String,
        parsers: Vec<FieldParser>,
    },
}

/// The immutable symbol-table bundle, loaded once at construction.
#[derive(Debug)]
pub struct LogDataset {
    /// Named enums: name -> value -> member.
    pub enums: HashMap<String, HashMap<i64, String>>,
    /// Typedef enums, searched as fallback.
    pub tdenums: HashMap<String, HashMap<i64, String>>,
    /// Variable addresses, searched by nearest-preceding address.
    pub variables: BTreeMap<u32, String>,
    /// Function ranges, sorted by low address.
    pub functions: Vec<FuncRange>,
    /// Table base address; bits 20..23 are the target id.
    pub saddr: u32,
    /// Format records keyed by clean record address.
    pub fmts: HashMap<u32, FormatRecord>,
}

// ============================================================================
// Records
// ============================================================================

/// One decoded log record.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    /// Running frame count for this decoder instance (first record is 1).
    pub count: u64,
    /// Seconds since the decoder was constructed, millisecond resolution.
    pub timestamp: f64,
    /// Level name from [`LEVEL_NAMES`], "RAW" for undecoded frames.
    pub level: String,
    /// Source file of the logging site, "?" for undecoded frames.
    pub file: String,
    /// Source line of the logging site, 0 for undecoded frames.
    pub line: u32,
    /// Rendered message text.
    pub text: String,
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:6} {:10.3} {} {}:{} {}",
            self.count, self.timestamp, self.level, self.file, self.line, self.text
        )
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Symbol-table-driven decoder for one target's log frames.
pub struct LogData {
    dataset: LogDataset,
    start: Instant,
    count: AtomicU64,
}

impl LogData {
    /// Load a symbol table from a `.cbor` / `.logdata` file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| IoError::symbol_table(format!("{}: {}", path.display(), e)))?;
        let decoder = Self::from_cbor(&data)?;
        log::info!(
            "loaded symbol table {} (target {})",
            path.display(),
            decoder.target()
        );
        Ok(decoder)
    }

    /// Load a symbol table from raw CBOR bytes.
    pub fn from_cbor(data: &[u8]) -> Result<Self, IoError> {
        Ok(LogData {
            dataset: load::load_from_cbor(data)?,
            start: Instant::now(),
            count: AtomicU64::new(0),
        })
    }

    /// Target id this table was built for: bits 20..23 of the base address.
    pub fn target(&self) -> u8 {
        ((self.dataset.saddr >> TARGET_DIGIT_SHIFT) & 0xF) as u8
    }

    pub fn dataset(&self) -> &LogDataset {
        &self.dataset
    }

    /// Decode one log frame into a record. Never fails: frames the table
    /// cannot explain come back as UNDECODED records.
    pub fn decode(&self, target: u8, addr: u32, frame: &[u8]) -> LogRecord {
        let kind = (addr & 3) as u8;
        let clean = addr & !3;
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let timestamp = (self.start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;

        let compiled = match self.dataset.fmts.get(&clean) {
            Some(FormatRecord::Compiled {
                level: Some(level),
                file,
                line,
                format,
                parsers,
            }) if kind == LOG_TYPE_BASIC || kind == LOG_TYPE_MEM => {
                (*level, file, *line, format, parsers)
            }
            _ => {
                return LogRecord {
                    count,
                    timestamp,
                    level: "RAW".to_string(),
                    file: "?".to_string(),
                    line: 0,
                    text: format!(
                        "UNDECODED: TGT={} ADDR=0x{:08x} FRAME={}",
                        target,
                        addr,
                        hex_compact(frame)
                    ),
                };
            }
        };
        let (level, file, line, format, parsers) = compiled;

        // Memory dumps share the format text but carry a fixed field layout.
        let mem_parsers = [FieldParser::Pointer, FieldParser::Bytes];
        let parsers: &[FieldParser] = if kind == LOG_TYPE_MEM {
            &mem_parsers
        } else {
            parsers
        };

        let text = match extract_args(frame, parsers, &self.dataset) {
            Ok(args) => {
                if kind == LOG_TYPE_MEM {
                    match args.as_slice() {
                        [Arg::Uint(ptr), Arg::Bytes(bytes)] => {
                            format!("{} {:08x}: {}", format, ptr, hex_spaced(bytes))
                        }
                        _ => format!("{} (FORMATTING FAILED) {:?}", format, args),
                    }
                } else {
                    match printf::format_message(format, &args) {
                        Ok(text) => text,
                        Err(_) => format!("{} (FORMATTING FAILED) {:?}", format, args),
                    }
                }
            }
            Err(error) => format!("{} [{} - {}]", format, hex_compact(frame), error),
        };

        LogRecord {
            count,
            timestamp,
            level: level_name(level),
            file: file.clone(),
            line,
            text,
        }
    }
}

fn level_name(level: i64) -> String {
    usize::try_from(level)
        .ok()
        .and_then(|i| LEVEL_NAMES.get(i).copied())
        .map(str::to_string)
        .unwrap_or_else(|| "<bad level>".to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::load::testtable::{Atom, Fmt, Table};
    use super::*;

    fn decoder(table: Table) -> LogData {
        LogData::from_cbor(&table.encode()).unwrap()
    }

    fn simple_table() -> Table {
        Table {
            enums: vec![("Color", vec![(0, "RED"), (1, "GREEN")])],
            tdenums: vec![("retcode_t", vec![(0, "OK"), (-5, "EIO")])],
            vars: vec![(0x2000_0000, "main.c:g_ticks")],
            fns: vec![(0x2000, 0x2100, "foo")],
            saddr: 0x0070_0000,
            fmts: vec![
                (
                    0x1000,
                    Fmt::Compiled(Some(0), "a.c", 42, "v=%d", vec![Atom::Name("int32")]),
                ),
                (
                    0x1010,
                    Fmt::Compiled(Some(2), "b.c", 9, "at %s", vec![Atom::Name("sym")]),
                ),
                (
                    0x1020,
                    Fmt::Compiled(Some(0), "c.c", 1, "color=%s", vec![Atom::Enum("Color")]),
                ),
                (
                    0x1030,
                    Fmt::Compiled(Some(0), "d.c", 2, "rc=%s", vec![Atom::Enum("Missing")]),
                ),
                (0x1040, Fmt::Bare(Some(0), "e.c", 3)),
                (
                    0x1050,
                    Fmt::Compiled(None, "f.c", 4, "quiet", vec![]),
                ),
                (
                    0x1060,
                    Fmt::Compiled(Some(9), "g.c", 5, "odd", vec![]),
                ),
                (
                    0x1070,
                    Fmt::Compiled(Some(0), "h.c", 6, "mem", vec![]),
                ),
            ],
        }
    }

    #[test]
    fn test_decode_happy_path() {
        let dec = decoder(simple_table());
        let rec = dec.decode(0, 0x1000, &(-7i32).to_le_bytes());
        assert_eq!(rec.count, 1);
        assert_eq!(rec.level, "INFO");
        assert_eq!(rec.file, "a.c");
        assert_eq!(rec.line, 42);
        assert_eq!(rec.text, "v=-7");
        assert!(rec.timestamp >= 0.0);

        // Counts keep climbing per decoded frame.
        let rec = dec.decode(0, 0x1000, &(5i32).to_le_bytes());
        assert_eq!(rec.count, 2);
        assert_eq!(rec.text, "v=5");
    }

    #[test]
    fn test_decode_sym_in_function_range() {
        let dec = decoder(simple_table());
        // Thumb bit set: 0x2049 masks to 0x2048, inside foo's range.
        let rec = dec.decode(0, 0x1010, &0x2049u32.to_le_bytes());
        assert_eq!(rec.text, "at foo+0x48");
        assert_eq!(rec.level, "WARN ");
    }

    #[test]
    fn test_decode_sym_variable_and_unknown() {
        let dec = decoder(simple_table());
        let rec = dec.decode(0, 0x1010, &0x2000_0010u32.to_le_bytes());
        assert_eq!(rec.text, "at main.c:g_ticks+0x10");

        // Outside the 0x3000 variable window and any function range.
        let rec = dec.decode(0, 0x1010, &0x9000u32.to_le_bytes());
        assert_eq!(rec.text, "at 0x00009000");
    }

    #[test]
    fn test_decode_enum_hit_miss_unknown() {
        let dec = decoder(simple_table());
        let rec = dec.decode(0, 0x1020, &1i32.to_le_bytes());
        assert_eq!(rec.text, "color=GREEN");

        let rec = dec.decode(0, 0x1020, &2i32.to_le_bytes());
        assert_eq!(rec.text, "color=<Color:2>");

        let rec = dec.decode(0, 0x1030, &5i32.to_le_bytes());
        assert_eq!(rec.text, "rc=<!Missing:5>");
    }

    #[test]
    fn test_decode_tdenum_fallback() {
        let table = Table {
            fmts: vec![(
                0x10,
                Fmt::Compiled(Some(0), "a.c", 1, "%s", vec![Atom::Enum("retcode_t")]),
            )],
            ..simple_table()
        };
        let dec = decoder(table);
        let rec = dec.decode(0, 0x10, &(-5i32).to_le_bytes());
        assert_eq!(rec.text, "EIO");
    }

    #[test]
    fn test_undecoded_paths() {
        let dec = decoder(simple_table());

        // Unknown address.
        let rec = dec.decode(3, 0x9990, &[0xAB, 0xCD]);
        assert_eq!(rec.level, "RAW");
        assert_eq!(rec.file, "?");
        assert_eq!(rec.line, 0);
        assert_eq!(rec.text, "UNDECODED: TGT=3 ADDR=0x00009990 FRAME=abcd");

        // Bare (3-field) record, null level, reserved kind.
        assert_eq!(dec.decode(0, 0x1040, &[]).level, "RAW");
        assert_eq!(dec.decode(0, 0x1050, &[]).level, "RAW");
        assert_eq!(dec.decode(0, 0x1000 | 2, &[]).level, "RAW");
    }

    #[test]
    fn test_parser_failure_brackets() {
        let dec = decoder(simple_table());

        // Two bytes cannot satisfy an int32.
        let rec = dec.decode(0, 0x1000, &[0x01, 0x02]);
        assert_eq!(rec.level, "INFO");
        assert!(rec.text.starts_with("v=%d [0102 - "));
        assert!(rec.text.contains("int32"));

        // Trailing bytes after the last parser.
        let mut frame = 1i32.to_le_bytes().to_vec();
        frame.push(0xFF);
        let rec = dec.decode(0, 0x1000, &frame);
        assert!(rec.text.starts_with("v=%d [01000000ff - Extra data"));
    }

    #[test]
    fn test_formatting_failure_fallback() {
        let table = Table {
            fmts: vec![(
                0x10,
                Fmt::Compiled(Some(0), "a.c", 1, "%d %d", vec![Atom::Name("int32")]),
            )],
            ..Table::default()
        };
        let dec = decoder(table);
        let rec = dec.decode(0, 0x10, &7i32.to_le_bytes());
        assert_eq!(rec.text, "%d %d (FORMATTING FAILED) [7]");
    }

    #[test]
    fn test_memory_dump_kind() {
        let dec = decoder(simple_table());
        let mut frame = 0x2000_1000u32.to_le_bytes().to_vec();
        frame.extend_from_slice(&[0xAA, 0xBB]);
        let rec = dec.decode(0, 0x1070 | u32::from(LOG_TYPE_MEM), &frame);
        assert_eq!(rec.text, "mem 20001000: aa bb");
    }

    #[test]
    fn test_bad_level() {
        let dec = decoder(simple_table());
        let rec = dec.decode(0, 0x1060, &[]);
        assert_eq!(rec.level, "<bad level>");
        assert_eq!(rec.text, "odd");
    }

    #[test]
    fn test_string_parser() {
        let table = Table {
            fmts: vec![(
                0x10,
                Fmt::Compiled(
                    Some(0),
                    "a.c",
                    1,
                    "name=%s id=%d",
                    vec![Atom::Name("string"), Atom::Name("int32")],
                ),
            )],
            ..Table::default()
        };
        let dec = decoder(table);

        let mut frame = b"probe".to_vec();
        frame.push(0);
        frame.extend_from_slice(&3i32.to_le_bytes());
        let rec = dec.decode(0, 0x10, &frame);
        assert_eq!(rec.text, "name=probe id=3");

        // No NUL in the remainder: parser failure.
        let rec = dec.decode(0, 0x10, b"probe");
        assert!(rec.text.contains("Unable to decode parameter: string"));
    }

    #[test]
    fn test_target_extraction() {
        let dec = decoder(simple_table());
        assert_eq!(dec.target(), 7);
    }

    #[test]
    fn test_level_names_cover_table() {
        let names: Vec<String> = (0..6).map(level_name).collect();
        assert_eq!(
            names,
            ["INFO", "TRACE ", "WARN ", "ERROR", "FATAL", "PANIC"]
        );
        assert_eq!(level_name(-1), "<bad level>");
        assert_eq!(level_name(6), "<bad level>");
    }
}
