//! The streaming, hierarchy-reconstructing parser: drives a
//! [`LineSource`], dispatches each line to [`crate::codec`], maintains a
//! [`TempStore`], and yields the next completed [`Item`] on demand.

use std::io::{Cursor, Read};
use std::path::PathBuf;

use crate::codec::{self, CodecError, ParsedDirective, ParsedFeatureLine};
use crate::error::{ParserError, ParserResult};
use crate::linesource::{LineSource, LineSourceInput};
use crate::model::{Directive, Feature, FeatureLine, Item, RefKind};
use crate::tempstore::{MemoryTempStore, TempStore};

fn build_line(
    parsed: &ParsedFeatureLine,
    children: &std::rc::Rc<std::cell::RefCell<Vec<Feature>>>,
    derived: &std::rc::Rc<std::cell::RefCell<Vec<Feature>>>,
) -> FeatureLine {
    FeatureLine::with_shared(
        parsed.seq_id.clone(),
        parsed.source.clone(),
        parsed.feature_type.clone(),
        parsed.start,
        parsed.end,
        parsed.score.clone(),
        parsed.strand,
        parsed.phase,
        parsed.attributes.clone(),
        children.clone(),
        derived.clone(),
    )
}

/// Drives a [`LineSource`] and a [`TempStore`] to produce a lazy sequence
/// of [`Item`]s (spec §4.4). Generic over the `TempStore` implementation
/// so a caller can swap in [`crate::tempstore::DiskTempStore`] without
/// the parser boxing a trait object per record — the same choice the
/// teacher's `Reader<F>` makes for its record format.
pub struct Parser<S: TempStore = MemoryTempStore> {
    line_source: LineSource,
    store: S,
    closed: bool,
}

impl Parser<MemoryTempStore> {
    /// Opens a parser over the given inputs, backed by the default
    /// in-memory [`TempStore`].
    pub fn open(inputs: Vec<LineSourceInput>) -> ParserResult<Self> {
        Parser::open_with_store(inputs, MemoryTempStore::new())
    }

    /// Opens a parser over the given paths.
    pub fn open_paths(paths: Vec<PathBuf>) -> ParserResult<Self> {
        Parser::open(paths.into_iter().map(LineSourceInput::Path).collect())
    }
}

impl<S: TempStore> Parser<S> {
    /// Opens a parser over the given inputs, backed by a caller-supplied
    /// [`TempStore`] implementation.
    pub fn open_with_store(inputs: Vec<LineSourceInput>, store: S) -> ParserResult<Self> {
        Ok(Parser {
            line_source: LineSource::open(inputs)?,
            store,
            closed: false,
        })
    }

    /// Returns the next item, or `None` once inputs are exhausted and the
    /// output queue has drained. After a fatal error the parser is
    /// closed: all subsequent calls return `Ok(None)`.
    pub fn next_item(&mut self) -> ParserResult<Option<Item>> {
        if self.closed {
            return Ok(None);
        }
        if let Err(err) = self.pump_lines() {
            self.closed = true;
            return Err(err);
        }
        Ok(self.store.out_pop())
    }

    fn pump_lines(&mut self) -> ParserResult<()> {
        loop {
            if self.store.out_len() > 0 {
                return Ok(());
            }
            let source_name = self.line_source.current_name().unwrap_or("<input>").to_owned();
            let line_number = self.line_source.current_line_number() + 1;
            match self.line_source.next_line()? {
                None => {
                    self.flush(&source_name, line_number)?;
                    return Ok(());
                }
                Some(raw_line) => {
                    self.dispatch_line(&raw_line, &source_name, line_number)?;
                }
            }
        }
    }

    fn dispatch_line(&mut self, raw_line: &str, source_name: &str, line_number: usize) -> ParserResult<()> {
        let trimmed = raw_line.trim_end_matches(['\n', '\r']);

        if trimmed.trim().is_empty() {
            return Ok(());
        }

        if trimmed.starts_with('>') {
            log::debug!("{source_name}:{line_number}: implicit FASTA start");
            self.flush(source_name, line_number)?;
            let stream = self.take_remaining_including(raw_line);
            self.store.out_push(Item::Directive(Directive::Fasta(stream)));
            return Ok(());
        }

        if let Some(hash_rest) = trimmed.strip_prefix('#') {
            let hashes = 1 + hash_rest.chars().take_while(|&c| c == '#').count();
            let after_hashes = &trimmed[hashes..];

            if hashes == 3 && after_hashes.trim().is_empty() {
                log::trace!("{source_name}:{line_number}: sync marker");
                self.flush(source_name, line_number)?;
                return Ok(());
            }

            if hashes == 2 {
                return self.dispatch_directive(trimmed, source_name, line_number);
            }

            let text = trimmed.trim_start_matches('#').trim().to_owned();
            self.store.out_push(Item::Comment(crate::model::Comment { text }));
            return Ok(());
        }

        self.dispatch_feature_line(trimmed, source_name, line_number)
    }

    fn dispatch_directive(&mut self, line: &str, source_name: &str, line_number: usize) -> ParserResult<()> {
        match codec::parse_directive(line) {
            Some(ParsedDirective::Fasta) => {
                log::debug!("{source_name}:{line_number}: ##FASTA directive");
                self.flush(source_name, line_number)?;
                let stream = self.line_source.take_remaining().unwrap_or_else(|| Box::new(std::io::empty()));
                self.store.out_push(Item::Directive(Directive::Fasta(stream)));
                Ok(())
            }
            Some(ParsedDirective::GffVersion(value)) => {
                self.store.out_push(Item::Directive(Directive::GffVersion(value)));
                Ok(())
            }
            Some(ParsedDirective::SequenceRegion { seq_id, start, end }) => {
                self.store
                    .out_push(Item::Directive(Directive::SequenceRegion { seq_id, start, end }));
                Ok(())
            }
            Some(ParsedDirective::GenomeBuild { source, buildname }) => {
                self.store
                    .out_push(Item::Directive(Directive::GenomeBuild { source, buildname }));
                Ok(())
            }
            Some(ParsedDirective::Other { name, value }) => {
                self.store.out_push(Item::Directive(Directive::Other { name, value }));
                Ok(())
            }
            None => {
                // Malformed under a `##` prefix: preserve verbatim rather
                // than failing the parse (spec §7: unknown directive is
                // not an error).
                self.store.out_push(Item::Directive(Directive::Other {
                    name: String::new(),
                    value: line.trim_start_matches('#').trim().to_owned(),
                }));
                Ok(())
            }
        }
    }

    fn dispatch_feature_line(&mut self, line: &str, source_name: &str, line_number: usize) -> ParserResult<()> {
        let parsed = codec::parse_feature_line(line)
            .map_err(|CodecError { cause }| ParserError::line_parse(source_name, line_number, line, cause))?;

        let ids = parsed.attributes.get("ID").cloned().unwrap_or_default();
        let parents = parsed.attributes.get("Parent").cloned().unwrap_or_default();
        let derives = parsed.attributes.get("Derives_from").cloned().unwrap_or_default();

        if ids.is_empty() && parents.is_empty() && derives.is_empty() {
            let feature = Feature::new(|children, derived| build_line(&parsed, children, derived));
            self.store.out_push(Item::Feature(feature));
            return Ok(());
        }

        let mut target: Option<Feature> = None;
        let mut merged_id: Option<&String> = None;
        for id in &ids {
            if let Some(existing) = self.store.uc_get(id) {
                match (&target, merged_id) {
                    (None, _) => {
                        target = Some(existing);
                        merged_id = Some(id);
                    }
                    (Some(current), Some(tid)) if !self.store.uc_same(tid, id) => {
                        current.absorb(&existing);
                    }
                    _ => {}
                }
            }
        }

        let feature = match &target {
            Some(existing) => {
                existing.push_line(|children, derived| build_line(&parsed, children, derived));
                existing.clone()
            }
            None => Feature::new(|children, derived| build_line(&parsed, children, derived)),
        };

        let is_top_level = parents.is_empty() && derives.is_empty();
        for id in &ids {
            self.store.uc_put(id, feature.clone(), is_top_level);
        }

        for id in &ids {
            if let Some(waiting) = self.store.orphans_get(id) {
                for (kind, waiter) in waiting {
                    feature.attach(kind, id, waiter);
                }
                self.store.uc_update(id, feature.clone());
            }
        }

        for (kind, target_ids) in [(RefKind::Parent, &parents), (RefKind::DerivesFrom, &derives)] {
            for target_id in target_ids {
                match self.store.uc_get(target_id) {
                    Some(parent) => {
                        parent.attach(kind, target_id, feature.clone());
                        self.store.uc_update(target_id, parent);
                    }
                    None => self.store.orphans_add(target_id, kind, feature.clone()),
                }
            }
        }

        Ok(())
    }

    fn flush(&mut self, source_name: &str, line_number: usize) -> ParserResult<()> {
        if let Some(unresolved) = self.store.flush() {
            return Err(ParserError::orphans(source_name, line_number, unresolved));
        }
        Ok(())
    }

    fn take_remaining_including(&mut self, consumed_line: &str) -> Box<dyn Read + Send> {
        let prefix = Cursor::new(codec::encode_lossless(consumed_line));
        match self.line_source.take_remaining() {
            Some(tail) => Box::new(prefix.chain(tail)),
            None => Box::new(prefix),
        }
    }
}

impl<S: TempStore> Iterator for Parser<S> {
    type Item = ParserResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
