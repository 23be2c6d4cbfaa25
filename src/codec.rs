//! Byte-level parsing and formatting of individual GFF3 lines: escaping,
//! the nine-column feature line, the attribute column, and `##directive`
//! lines.
//!
//! Every function here is pure: it takes text, returns text or a
//! [`CodecError`], and touches no I/O. [`crate::parser::Parser`] is the
//! only caller that attaches source/line context.

use std::collections::HashMap;
use std::fmt;

use memchr::memchr;

use crate::model::Attributes;
use crate::strand::{Phase, Strand};

/// Attribute keys emitted first, in this order, ahead of the remaining
/// keys (lexicographic). Load-bearing for byte-stable formatting output.
const KEY_PRIORITY: [&str; 4] = ["ID", "Name", "Alias", "Parent"];

fn needs_escape(byte: u8) -> bool {
    matches!(byte, 0x00..=0x1F | 0x7F..=0xFF | b';' | b'=' | b'%' | b'&' | b',')
}

// A byte that appeared where UTF-8 text was expected but wasn't part of a
// valid sequence is remapped to one codepoint in this private-use range
// (spec §4.2: non-UTF-8 input passes through unchanged) so it survives as
// a `String` instead of becoming U+FFFD. `escape`/`unescape` know to treat
// a codepoint in this range as the literal byte rather than text.
const RAW_BYTE_BASE: u32 = 0xF780;

fn raw_byte_of(ch: char) -> Option<u8> {
    let code = ch as u32;
    (RAW_BYTE_BASE..RAW_BYTE_BASE + 0x100)
        .contains(&code)
        .then(|| (code - RAW_BYTE_BASE) as u8)
}

/// Decodes `bytes` into a `String`, preserving every byte: a malformed
/// byte is mapped one-for-one into a private-use codepoint instead of
/// being replaced by U+FFFD, so [`escape`] can still emit the original
/// byte unchanged (spec §4.2).
pub(crate) fn decode_lossless(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => {
            let mut out = String::with_capacity(bytes.len());
            let mut rest = bytes;
            loop {
                match std::str::from_utf8(rest) {
                    Ok(s) => {
                        out.push_str(s);
                        break;
                    }
                    Err(err) => {
                        let valid_up_to = err.valid_up_to();
                        out.push_str(std::str::from_utf8(&rest[..valid_up_to]).expect("validated prefix"));
                        let bad_byte = rest[valid_up_to];
                        out.push(char::from_u32(RAW_BYTE_BASE + bad_byte as u32).expect("in scalar range"));
                        rest = &rest[valid_up_to + 1..];
                    }
                }
            }
            out
        }
    }
}

/// Inverts [`decode_lossless`]: encodes `s` back to the exact original
/// bytes, turning each private-use stand-in codepoint back into its
/// single raw byte instead of its UTF-8 encoding. Used by callers (spec
/// §4.5's sync-marker pass) that copy a decoded line back out verbatim
/// rather than routing it through [`escape`].
pub(crate) fn encode_lossless(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut char_buf = [0u8; 4];
    for ch in s.chars() {
        match raw_byte_of(ch) {
            Some(byte) => out.push(byte),
            None => out.extend_from_slice(ch.encode_utf8(&mut char_buf).as_bytes()),
        }
    }
    out
}

/// Percent-encodes the reserved byte set (control bytes, non-ASCII bytes,
/// tab/LF/CR, and `; = % & ,`). Everything else passes through unchanged.
/// A codepoint produced by [`decode_lossless`] is unwrapped back to its
/// original byte before the same escaping rule is applied to it.
pub fn escape(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut char_buf = [0u8; 4];
    for ch in input.chars() {
        if let Some(byte) = raw_byte_of(ch) {
            out.push(b'%');
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
            continue;
        }
        for &byte in ch.encode_utf8(&mut char_buf).as_bytes() {
            if needs_escape(byte) {
                out.push(b'%');
                out.extend_from_slice(format!("{byte:02X}").as_bytes());
            } else {
                out.push(byte);
            }
        }
    }
    // Escaping only ever narrows the byte set to ASCII, so this is always
    // valid UTF-8 when `input` was.
    String::from_utf8(out).expect("escape output is always ASCII-safe UTF-8")
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Inverts [`escape`]. Malformed `%` sequences (not followed by two hex
/// digits) are passed through unchanged, as is any other text.
pub fn unescape(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0usize;
    while pos < bytes.len() {
        match memchr(b'%', &bytes[pos..]) {
            Some(rel) => {
                let found = pos + rel;
                out.extend_from_slice(&bytes[pos..found]);
                match (
                    bytes.get(found + 1).copied().and_then(hex_digit),
                    bytes.get(found + 2).copied().and_then(hex_digit),
                ) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        pos = found + 3;
                    }
                    _ => {
                        out.push(b'%');
                        pos = found + 1;
                    }
                }
            }
            None => {
                out.extend_from_slice(&bytes[pos..]);
                pos = bytes.len();
            }
        }
    }
    decode_lossless(&out)
}

/// True if `line` (trailing newline already stripped or not, either way)
/// is exactly three `#` followed only by optional whitespace — a sync
/// marker.
pub(crate) fn is_sync_marker(line: &str) -> bool {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    match trimmed.strip_prefix("###") {
        Some(rest) => !rest.starts_with('#') && rest.trim().is_empty(),
        None => false,
    }
}

/// A pure parse/format error: no source name or line number attached.
/// [`crate::parser::Parser`] wraps this into a [`crate::error::ParserError`]
/// with that context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    /// Human-readable cause, e.g. "expected 9 tab-separated fields, found 6".
    pub cause: String,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cause)
    }
}

impl CodecError {
    fn new(cause: impl Into<String>) -> Self {
        CodecError { cause: cause.into() }
    }
}

fn unescape_field(field: &str) -> Option<String> {
    if field == "." {
        None
    } else {
        Some(unescape(field))
    }
}

/// The nine columns of a feature line, parsed and unescaped but not yet
/// wired into a [`crate::model::Feature`] — that step belongs to the
/// parser, which owns the shared child-list allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeatureLine {
    /// Column 1.
    pub seq_id: Option<String>,
    /// Column 2.
    pub source: Option<String>,
    /// Column 3.
    pub feature_type: Option<String>,
    /// Column 4.
    pub start: Option<u64>,
    /// Column 5.
    pub end: Option<u64>,
    /// Column 6, kept as its original lexical text (not reparsed into
    /// `f64`) since GFF3 scores round-trip through their written digits —
    /// `0.0` and `0` are distinct columns even though they're the same
    /// number.
    pub score: Option<String>,
    /// Column 7.
    pub strand: Option<Strand>,
    /// Column 8.
    pub phase: Option<Phase>,
    /// Column 9, parsed.
    pub attributes: Attributes,
}

/// Parses one feature line (nine tab-separated columns). `line` should
/// already have its trailing `\n`/`\r\n` stripped by the caller, but a
/// trailing newline is tolerated here too.
pub fn parse_feature_line(line: &str) -> Result<ParsedFeatureLine, CodecError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 9 {
        return Err(CodecError::new(format!(
            "expected 9 tab-separated fields, found {}",
            fields.len()
        )));
    }

    let start = match unescape_field(fields[3]) {
        None => None,
        Some(s) => Some(
            s.parse::<u64>()
                .map_err(|_| CodecError::new(format!("invalid start coordinate: {s:?}")))?,
        ),
    };
    let end = match unescape_field(fields[4]) {
        None => None,
        Some(s) => Some(
            s.parse::<u64>()
                .map_err(|_| CodecError::new(format!("invalid end coordinate: {s:?}")))?,
        ),
    };
    let score = match unescape_field(fields[5]) {
        None => None,
        Some(s) => {
            s.parse::<f64>()
                .map_err(|_| CodecError::new(format!("invalid score: {s:?}")))?;
            Some(s)
        }
    };
    let strand = match unescape_field(fields[6]) {
        None => None,
        Some(s) => {
            Some(Strand::parse(&s).ok_or_else(|| CodecError::new(format!("invalid strand: {s:?}")))?)
        }
    };
    let phase = match unescape_field(fields[7]) {
        None => None,
        Some(s) => {
            Some(Phase::parse(&s).ok_or_else(|| CodecError::new(format!("invalid phase: {s:?}")))?)
        }
    };

    Ok(ParsedFeatureLine {
        seq_id: unescape_field(fields[0]),
        source: unescape_field(fields[1]),
        feature_type: unescape_field(fields[2]),
        start,
        end,
        score,
        strand,
        phase,
        attributes: parse_attributes(fields[8]),
    })
}

/// Parses the raw column-9 text into a name -> values mapping.
///
/// `.` or empty input yields an empty mapping. Tokens with no `=` are
/// discarded; values are comma-split and each piece unescaped.
pub fn parse_attributes(column: &str) -> Attributes {
    let mut attributes: Attributes = HashMap::new();
    if column.is_empty() || column == "." {
        return attributes;
    }
    let bytes = column.as_bytes();
    let len = bytes.len();
    let mut pos = 0usize;
    while pos < len {
        let token_end = match memchr(b';', &bytes[pos..len]) {
            Some(rel) => pos + rel,
            None => len,
        };
        let token = &column[pos..token_end];
        pos = token_end + 1;
        if token.is_empty() {
            continue;
        }
        let Some(eq) = memchr(b'=', token.as_bytes()) else { continue };
        let name = &token[..eq];
        let raw_values = &token[eq + 1..];
        if name.is_empty() {
            continue;
        }
        let values = attributes.entry(name.to_owned()).or_default();
        for piece in raw_values.split(',') {
            values.push(unescape(piece));
        }
    }
    attributes
}

fn key_rank(key: &str) -> (usize, &str) {
    match KEY_PRIORITY.iter().position(|&k| k == key) {
        Some(rank) => (rank, key),
        None => (KEY_PRIORITY.len(), key),
    }
}

/// Formats an attribute mapping into column-9 text, or `"."` if empty.
///
/// Keys are emitted `ID, Name, Alias, Parent` first (in that order), then
/// the rest lexicographically. A key whose value list is empty after
/// escaping is omitted.
pub fn format_attributes(attributes: &Attributes) -> String {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort_by(|a, b| key_rank(a).cmp(&key_rank(b)));

    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        let values = &attributes[key];
        if values.is_empty() {
            continue;
        }
        let escaped: Vec<String> = values.iter().map(|v| escape(v)).collect();
        parts.push(format!("{key}={}", escaped.join(",")));
    }
    if parts.is_empty() {
        ".".to_owned()
    } else {
        parts.join(";")
    }
}

fn format_field(field: &Option<String>) -> String {
    match field {
        Some(value) => escape(value),
        None => ".".to_owned(),
    }
}

/// Formats a parsed feature line back into a single LF-terminated GFF3
/// line.
pub fn format_feature_line(fields: &ParsedFeatureLine) -> String {
    let start = fields.start.map(|v| v.to_string()).unwrap_or_else(|| ".".to_owned());
    let end = fields.end.map(|v| v.to_string()).unwrap_or_else(|| ".".to_owned());
    let strand = fields
        .strand
        .map(|v| v.to_string())
        .unwrap_or_else(|| ".".to_owned());
    let phase = fields
        .phase
        .map(|v| v.to_string())
        .unwrap_or_else(|| ".".to_owned());

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
        format_field(&fields.seq_id),
        format_field(&fields.source),
        format_field(&fields.feature_type),
        start,
        end,
        format_field(&fields.score),
        strand,
        phase,
        format_attributes(&fields.attributes),
    )
}

/// A `##directive` line, parsed but not yet wired to a live stream for
/// the `FASTA` case — [`crate::parser::Parser`] attaches that.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDirective {
    /// `##gff-version <value>`
    GffVersion(String),
    /// `##sequence-region <seq_id> <start> <end>`
    SequenceRegion { seq_id: String, start: u64, end: u64 },
    /// `##genome-build <source> <buildname>`
    GenomeBuild { source: String, buildname: String },
    /// `##FASTA`: the parser attaches the remaining stream.
    Fasta,
    /// Any other `##name value`, preserved verbatim.
    Other { name: String, value: String },
}

fn strip_non_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Parses a `##directive` line. Returns `None` if `line` is not shaped
/// like a directive (optional leading whitespace, `##`, a name token,
/// optional whitespace, a payload).
pub fn parse_directive(line: &str) -> Option<ParsedDirective> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("##")?;
    let rest = rest.trim_end_matches(['\n', '\r']);
    let (name, payload) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }

    let fallback = || ParsedDirective::Other {
        name: name.to_owned(),
        value: payload.to_owned(),
    };

    Some(match name {
        "gff-version" => ParsedDirective::GffVersion(payload.to_owned()),
        "sequence-region" => {
            let mut tokens = payload.split_whitespace();
            (|| {
                let seq_id = tokens.next()?.to_owned();
                let start: u64 = strip_non_digits(tokens.next()?).parse().ok()?;
                let end: u64 = strip_non_digits(tokens.next()?).parse().ok()?;
                Some(ParsedDirective::SequenceRegion { seq_id, start, end })
            })()
            .unwrap_or_else(fallback)
        }
        "genome-build" => {
            let mut tokens = payload.split_whitespace();
            (|| {
                let source = tokens.next()?.to_owned();
                let buildname = tokens.next()?.to_owned();
                Some(ParsedDirective::GenomeBuild { source, buildname })
            })()
            .unwrap_or_else(fallback)
        }
        "FASTA" => ParsedDirective::Fasta,
        _ => fallback(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trip_covers_reserved_bytes() {
        let sample: String = (0u8..=255).map(|b| b as char).collect();
        assert_eq!(unescape(&escape(&sample)), sample);
    }

    #[test]
    fn escape_only_emits_ascii() {
        let escaped = escape("caf\u{e9};\t%");
        assert!(escaped.is_ascii());
    }

    #[test]
    fn unescape_passes_through_malformed_percent() {
        assert_eq!(unescape("100%"), "100%");
        assert_eq!(unescape("100%2"), "100%2");
        assert_eq!(unescape("100%zz"), "100%zz");
    }

    #[test]
    fn parse_attributes_accumulates_duplicate_names() {
        let attrs = parse_attributes("Note=a;Note=b;Parent=p1,p2");
        assert_eq!(attrs["Note"], vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(attrs["Parent"], vec!["p1".to_owned(), "p2".to_owned()]);
    }

    #[test]
    fn parse_attributes_discards_tokens_without_equals() {
        let attrs = parse_attributes("junk;ID=g1");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["ID"], vec!["g1".to_owned()]);
    }

    #[test]
    fn parse_attributes_empty_column() {
        assert!(parse_attributes(".").is_empty());
        assert!(parse_attributes("").is_empty());
    }

    #[test]
    fn format_attributes_orders_priority_keys_first() {
        let mut attrs: Attributes = HashMap::new();
        attrs.insert("Zebra".to_owned(), vec!["z".to_owned()]);
        attrs.insert("Name".to_owned(), vec!["n".to_owned()]);
        attrs.insert("ID".to_owned(), vec!["i".to_owned()]);
        attrs.insert("Alias".to_owned(), vec!["a".to_owned()]);
        attrs.insert("Parent".to_owned(), vec!["p".to_owned()]);
        assert_eq!(format_attributes(&attrs), "ID=i;Name=n;Alias=a;Parent=p;Zebra=z");
    }

    #[test]
    fn feature_line_round_trip() {
        let line = "FooSeq\tbarsource\tmatch\t234\t234\t0.0\t+\t.\tID=Beep%2Cbonk%3B+Foo\n";
        let parsed = parse_feature_line(line).unwrap();
        assert_eq!(parsed.seq_id.as_deref(), Some("FooSeq"));
        assert_eq!(parsed.attributes["ID"], vec!["Beep,bonk;+Foo".to_owned()]);
        assert!(parsed.phase.is_none());
        assert_eq!(format_feature_line(&parsed), line);
    }

    #[test]
    fn feature_line_escape_in_seqid() {
        let line = "Noggin%2C%2B-%25Foo%09bar\tbarsource\tmatch\t234\t234\t0.0\t+\t.\t.\n";
        let parsed = parse_feature_line(line).unwrap();
        assert_eq!(parsed.seq_id.as_deref(), Some("Noggin,+-%Foo\tbar"));
        assert!(parsed.attributes.is_empty());
        assert_eq!(format_feature_line(&parsed), line);
    }

    #[test]
    fn feature_line_rejects_too_few_fields() {
        let err = parse_feature_line("a\tb\tc\n").unwrap_err();
        assert!(err.cause.contains("9 tab-separated fields"));
    }

    #[test]
    fn directive_parses_known_kinds() {
        assert_eq!(
            parse_directive("##gff-version 3"),
            Some(ParsedDirective::GffVersion("3".to_owned()))
        );
        assert_eq!(
            parse_directive("##sequence-region chr1 1 1000"),
            Some(ParsedDirective::SequenceRegion {
                seq_id: "chr1".to_owned(),
                start: 1,
                end: 1000,
            })
        );
        assert_eq!(
            parse_directive("##genome-build NCBI B36"),
            Some(ParsedDirective::GenomeBuild {
                source: "NCBI".to_owned(),
                buildname: "B36".to_owned(),
            })
        );
        assert_eq!(parse_directive("##FASTA"), Some(ParsedDirective::Fasta));
    }

    #[test]
    fn directive_preserves_unknown_verbatim() {
        assert_eq!(
            parse_directive("##custom-thing some payload"),
            Some(ParsedDirective::Other {
                name: "custom-thing".to_owned(),
                value: "some payload".to_owned(),
            })
        );
    }

    #[test]
    fn directive_rejects_non_directive_lines() {
        assert_eq!(parse_directive("# just a comment"), None);
        assert_eq!(parse_directive("chr\t.\tgene\t1\t10\t.\t+\t.\tID=g1"), None);
    }
}
