use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::rc::Rc;

use crate::strand::{Phase, Strand};

/// Ordered-by-value, unordered-by-key mapping from an attribute name to its
/// (non-empty) list of values, in encounter order.
///
/// An absent or `.` attribute column parses to an empty `Attributes`.
pub type Attributes = HashMap<String, Vec<String>>;

/// The two outgoing-reference attributes the hierarchy step understands.
///
/// `spec.md` §4.4 only ever resolves `Parent` and `Derives_from` as
/// cross-references; every other attribute is inert data carried on the
/// line itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `Parent=...`
    Parent,
    /// `Derives_from=...`
    DerivesFrom,
}

impl RefKind {
    /// The attribute name this reference kind resolves.
    pub(crate) fn attr_name(self) -> &'static str {
        match self {
            RefKind::Parent => "Parent",
            RefKind::DerivesFrom => "Derives_from",
        }
    }
}

type SharedFeatures = Rc<RefCell<Vec<Feature>>>;

/// One physical row of a GFF3 feature line.
pub struct FeatureLine {
    /// Column 1, or `None` if the column was `.`.
    pub seq_id: Option<String>,
    /// Column 2, or `None` if the column was `.`.
    pub source: Option<String>,
    /// Column 3, or `None` if the column was `.`.
    pub feature_type: Option<String>,
    /// Column 4, 1-based inclusive start, or `None` if the column was `.`.
    pub start: Option<u64>,
    /// Column 5, 1-based inclusive end, or `None` if the column was `.`.
    pub end: Option<u64>,
    /// Column 6, kept as its original lexical text so `0` and `0.0` stay
    /// distinct, or `None` if the column was `.`.
    pub score: Option<String>,
    /// Column 7, or `None` if the column was `.`.
    pub strand: Option<Strand>,
    /// Column 8, or `None` if the column was `.`.
    pub phase: Option<Phase>,
    /// Column 9, parsed into a name -> values mapping.
    pub attributes: Attributes,
    child_features: SharedFeatures,
    derived_features: SharedFeatures,
}

impl FeatureLine {
    /// Creates a standalone `FeatureLine` with fresh, empty child lists.
    ///
    /// Used for lines with no `ID`/`Parent`/`Derives_from` (spec.md §4.4
    /// Case A), which never join a `Feature` and are pushed to the output
    /// queue directly.
    pub(crate) fn standalone(
        seq_id: Option<String>,
        source: Option<String>,
        feature_type: Option<String>,
        start: Option<u64>,
        end: Option<u64>,
        score: Option<String>,
        strand: Option<Strand>,
        phase: Option<Phase>,
        attributes: Attributes,
    ) -> Self {
        FeatureLine {
            seq_id,
            source,
            feature_type,
            start,
            end,
            score,
            strand,
            phase,
            attributes,
            child_features: Rc::new(RefCell::new(Vec::new())),
            derived_features: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Creates a `FeatureLine` wired to the given shared child/derived
    /// lists, cloning the `Rc`s so every line of one `Feature` observes
    /// the same underlying lists (invariant 2). Used by
    /// [`Feature::new`]/[`Feature::push_line`].
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_shared(
        seq_id: Option<String>,
        source: Option<String>,
        feature_type: Option<String>,
        start: Option<u64>,
        end: Option<u64>,
        score: Option<String>,
        strand: Option<Strand>,
        phase: Option<Phase>,
        attributes: Attributes,
        child_features: SharedFeatures,
        derived_features: SharedFeatures,
    ) -> Self {
        FeatureLine {
            seq_id,
            source,
            feature_type,
            start,
            end,
            score,
            strand,
            phase,
            attributes,
            child_features,
            derived_features,
        }
    }

    /// Returns the shared list of child features (invariant 2: the same
    /// `Rc` is handed to every line of the owning `Feature`).
    pub fn child_features(&self) -> Ref<'_, Vec<Feature>> {
        self.child_features.borrow()
    }

    /// Returns the shared list of derived features.
    pub fn derived_features(&self) -> Ref<'_, Vec<Feature>> {
        self.derived_features.borrow()
    }

    pub(crate) fn shared_list(&self, kind: RefKind) -> &SharedFeatures {
        match kind {
            RefKind::Parent => &self.child_features,
            RefKind::DerivesFrom => &self.derived_features,
        }
    }
}

impl fmt::Debug for FeatureLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureLine")
            .field("seq_id", &self.seq_id)
            .field("source", &self.source)
            .field("feature_type", &self.feature_type)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("score", &self.score)
            .field("strand", &self.strand)
            .field("phase", &self.phase)
            .field("attributes", &self.attributes)
            .field("child_count", &self.child_features.borrow().len())
            .field("derived_count", &self.derived_features.borrow().len())
            .finish()
    }
}

struct FeatureInner {
    lines: RefCell<Vec<FeatureLine>>,
    child_features: SharedFeatures,
    derived_features: SharedFeatures,
    /// `(target_id, attr)` pairs this feature has already been attached
    /// under, scoped to this feature so a multi-id `Feature` is never
    /// attached twice to the same parent/derivation target (spec.md §4.4).
    completed: RefCell<HashSet<(String, &'static str)>>,
}

/// A logical feature: one or more `FeatureLine`s that share at least one
/// `ID` attribute value.
///
/// `Feature` is a cheap-to-clone handle (a reference-counted pointer): two
/// clones observe the same lines and the same child/derived lists
/// (invariants 2 and 4).
#[derive(Clone)]
pub struct Feature(Rc<FeatureInner>);

impl Feature {
    /// Creates a new under-construction `Feature` containing exactly `line`.
    ///
    /// `line` must have been built against this feature's shared child
    /// lists; use [`Feature::new_line`] to construct one.
    pub(crate) fn new(line_builder: impl FnOnce(&SharedFeatures, &SharedFeatures) -> FeatureLine) -> Self {
        let child_features: SharedFeatures = Rc::new(RefCell::new(Vec::new()));
        let derived_features: SharedFeatures = Rc::new(RefCell::new(Vec::new()));
        let line = line_builder(&child_features, &derived_features);
        Feature(Rc::new(FeatureInner {
            lines: RefCell::new(vec![line]),
            child_features,
            derived_features,
            completed: RefCell::new(HashSet::new()),
        }))
    }

    /// Appends another physical line to this feature, wired to the same
    /// shared child/derived lists.
    pub(crate) fn push_line(&self, line_builder: impl FnOnce(&SharedFeatures, &SharedFeatures) -> FeatureLine) {
        let line = line_builder(&self.0.child_features, &self.0.derived_features);
        self.0.lines.borrow_mut().push(line);
    }

    /// Returns this feature's lines, in the order they were parsed.
    pub fn lines(&self) -> Ref<'_, Vec<FeatureLine>> {
        self.0.lines.borrow()
    }

    /// Returns the first `ID` value found among this feature's lines, if
    /// any.
    pub fn primary_id(&self) -> Option<String> {
        self.0
            .lines
            .borrow()
            .iter()
            .find_map(|line| line.attributes.get("ID").and_then(|v| v.first().cloned()))
    }

    /// Returns true if `self` and `other` are the same underlying feature.
    pub fn ptr_eq(&self, other: &Feature) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity for this feature's backing allocation, for use
    /// as a dedup key (e.g. a feature reachable under more than one of
    /// its own top-level ids).
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Merges `other` into `self`: every line of `other` is re-homed onto
    /// `self`'s shared child/derived lists, and `other`'s own children and
    /// derivations are appended to `self`'s. Used when two ids on the same
    /// feature line collide with distinct already-under-construction
    /// `Feature`s (spec.md §4.4: "features sharing any id become one").
    pub(crate) fn absorb(&self, other: &Feature) {
        if self.ptr_eq(other) {
            return;
        }
        let other_lines: Vec<_> = other
            .0
            .lines
            .borrow()
            .iter()
            .map(|line| {
                (
                    line.seq_id.clone(),
                    line.source.clone(),
                    line.feature_type.clone(),
                    line.start,
                    line.end,
                    line.score.clone(),
                    line.strand,
                    line.phase,
                    line.attributes.clone(),
                )
            })
            .collect();
        for (seq_id, source, feature_type, start, end, score, strand, phase, attributes) in other_lines {
            self.push_line(|children, derived| {
                FeatureLine::with_shared(
                    seq_id,
                    source,
                    feature_type,
                    start,
                    end,
                    score,
                    strand,
                    phase,
                    attributes,
                    children.clone(),
                    derived.clone(),
                )
            });
        }
        for child in other.0.child_features.borrow().iter() {
            self.0.child_features.borrow_mut().push(child.clone());
        }
        for derived in other.0.derived_features.borrow().iter() {
            self.0.derived_features.borrow_mut().push(derived.clone());
        }
    }

    /// Attaches `child` to `self`'s `kind` list, unless `child` is `self`
    /// (invariant 3) or was already attached under `(target_id, kind)`
    /// (the per-feature completion set from spec.md §4.4).
    ///
    /// Returns `true` if the attachment happened.
    pub(crate) fn attach(&self, kind: RefKind, target_id: &str, child: Feature) -> bool {
        if self.ptr_eq(&child) {
            return false;
        }
        let key = (target_id.to_owned(), kind.attr_name());
        if !child.0.completed.borrow_mut().insert(key) {
            return false;
        }
        let list = match kind {
            RefKind::Parent => &self.0.child_features,
            RefKind::DerivesFrom => &self.0.derived_features,
        };
        list.borrow_mut().push(child);
        true
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.0.lines.borrow();
        f.debug_struct("Feature")
            .field("ids", &lines.iter().find_map(|l| l.attributes.get("ID")))
            .field("line_count", &lines.len())
            .field("child_count", &self.0.child_features.borrow().len())
            .field("derived_count", &self.0.derived_features.borrow().len())
            .finish()
    }
}

/// A `##directive` line, with `sequence-region`, `genome-build`, and
/// `FASTA` further parsed per spec.md §3.
pub enum Directive {
    /// `##gff-version <value>`
    GffVersion(String),
    /// `##sequence-region <seq_id> <start> <end>`
    SequenceRegion {
        /// The sequence identifier.
        seq_id: String,
        /// The 1-based inclusive start coordinate.
        start: u64,
        /// The 1-based inclusive end coordinate.
        end: u64,
    },
    /// `##genome-build <source> <buildname>`
    GenomeBuild {
        /// The build source (e.g. `NCBI`).
        source: String,
        /// The build name.
        buildname: String,
    },
    /// `##FASTA` or an implicit `>` start: carries the remaining input.
    Fasta(Box<dyn Read + Send>),
    /// Any other `##directive value`, preserved verbatim.
    Other {
        /// The directive name (without the leading `##`).
        name: String,
        /// The raw tail of the line, trailing whitespace trimmed.
        value: String,
    },
}

impl fmt::Debug for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::GffVersion(v) => f.debug_tuple("GffVersion").field(v).finish(),
            Directive::SequenceRegion { seq_id, start, end } => f
                .debug_struct("SequenceRegion")
                .field("seq_id", seq_id)
                .field("start", start)
                .field("end", end)
                .finish(),
            Directive::GenomeBuild { source, buildname } => f
                .debug_struct("GenomeBuild")
                .field("source", source)
                .field("buildname", buildname)
                .finish(),
            Directive::Fasta(_) => f.write_str("Fasta(<stream>)"),
            Directive::Other { name, value } => f
                .debug_struct("Other")
                .field("name", name)
                .field("value", value)
                .finish(),
        }
    }
}

/// A comment line, leading `#`s and trailing whitespace stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// The comment text.
    pub text: String,
}

/// The sum type emitted by [`crate::parser::Parser`].
pub enum Item {
    /// A completed, top-level logical feature.
    Feature(Feature),
    /// A `##directive` line.
    Directive(Directive),
    /// A comment line.
    Comment(Comment),
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Feature(feature) => f.debug_tuple("Feature").field(feature).finish(),
            Item::Directive(directive) => f.debug_tuple("Directive").field(directive).finish(),
            Item::Comment(comment) => f.debug_tuple("Comment").field(comment).finish(),
        }
    }
}
