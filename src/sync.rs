//! `###` synchronization-marker insertion: a backward, two-pass algorithm
//! over one temp file (spec §4.5).

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};

use crate::codec;
use crate::error::SyncResult;
use crate::linesource::{LineSource, LineSourceInput};

fn read_all_lines(inputs: Vec<LineSourceInput>) -> std::io::Result<Vec<String>> {
    let mut source = LineSource::open(inputs)?;
    let mut lines = Vec::new();
    while let Some(line) = source.next_line()? {
        lines.push(line);
    }
    Ok(lines)
}

fn split_lines_keeping_terminators(content: &[u8]) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(content);
    let mut lines = Vec::new();
    loop {
        let mut buf = Vec::new();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        lines.push(codec::decode_lossless(&buf));
    }
    Ok(lines)
}

/// Given the concatenation of `inputs`, writes the same content to `out`
/// with `###` markers inserted at every safe point and any pre-existing
/// `###` lines dropped.
pub fn insert_markers(inputs: Vec<LineSourceInput>, out: &mut impl Write) -> SyncResult<()> {
    let forward_lines = read_all_lines(inputs)?;

    let mut temp = tempfile::NamedTempFile::new()?;
    let mut open_refs: HashSet<String> = HashSet::new();

    for line in forward_lines.iter().rev() {
        if codec::is_sync_marker(line) {
            continue;
        }

        let trimmed = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() >= 9 {
            let attrs = codec::parse_attributes(fields[8]);
            if let Some(parents) = attrs.get("Parent") {
                open_refs.extend(parents.iter().cloned());
            }
            if let Some(derives) = attrs.get("Derives_from") {
                open_refs.extend(derives.iter().cloned());
            }
            if let Some(ids) = attrs.get("ID") {
                for id in ids {
                    open_refs.remove(id);
                }
            }
        }

        temp.write_all(&codec::encode_lossless(line))?;
        if !line.ends_with('\n') {
            temp.write_all(b"\n")?;
        }
        if open_refs.is_empty() {
            temp.write_all(b"###\n")?;
        }
    }
    temp.flush()?;

    let file = temp.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    let temp_lines = split_lines_keeping_terminators(&content)?;

    let mut seen_data = false;
    for line in temp_lines.iter().rev() {
        if codec::is_sync_marker(line) {
            if seen_data {
                out.write_all(&codec::encode_lossless(line))?;
            }
            continue;
        }
        out.write_all(&codec::encode_lossless(line))?;
        seen_data = true;
    }

    Ok(())
}

/// Builder ergonomics around [`insert_markers`], mirroring the teacher's
/// `ReaderBuilder` shape.
#[derive(Default)]
pub struct SyncInserter {
    inputs: Vec<LineSourceInput>,
}

impl SyncInserter {
    /// Creates an empty inserter with no inputs yet.
    pub fn new() -> Self {
        SyncInserter::default()
    }

    /// Appends a path input.
    pub fn add_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inputs.push(LineSourceInput::Path(path.into()));
        self
    }

    /// Appends an already-open reader input, named for diagnostics.
    pub fn add_reader(mut self, name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        self.inputs.push(LineSourceInput::reader(name, reader));
        self
    }

    /// Runs the algorithm over every input added so far, writing to `out`.
    pub fn run(self, out: &mut impl Write) -> SyncResult<()> {
        insert_markers(self.inputs, out)
    }
}
