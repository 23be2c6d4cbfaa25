//! Pluggable in-flight storage for a parse window: the ID -> Feature
//! index, the top-level emission order, the orphan-reference table, and
//! the output queue. [`MemoryTempStore`] is the default; [`DiskTempStore`]
//! (feature `disk-store`) spills the ID -> Feature index to disk while
//! satisfying the same contract.

use std::collections::{HashMap, VecDeque};

use crate::model::{Feature, Item, RefKind};

/// The shared contract both `TempStore` implementations satisfy (spec
/// §4.3). Not object-safe by design: `Parser` is generic over one
/// concrete implementation per parse, the way the teacher's `Reader<F>`
/// is generic over one concrete format per reader rather than boxing a
/// trait object per record.
pub trait TempStore {
    /// Appends `item` to the output queue.
    fn out_push(&mut self, item: Item);
    /// Pops the next emittable item, if any.
    fn out_pop(&mut self) -> Option<Item>;
    /// The number of items currently queued for emission.
    fn out_len(&self) -> usize;

    /// Retrieves the under-construction `Feature` bound to `id`, if any.
    fn uc_get(&mut self, id: &str) -> Option<Feature>;
    /// Inserts or overwrites the `id -> feature` binding. When
    /// `is_top_level` is true the id is also recorded in the ordered
    /// top-level list used for flush ordering.
    fn uc_put(&mut self, id: &str, feature: Feature, is_top_level: bool);
    /// Updates a binding without touching the top-level order.
    fn uc_update(&mut self, id: &str, feature: Feature);
    /// Returns true if `a` and `b` are both currently bound and bound to
    /// the same underlying feature. Used instead of fetching both and
    /// comparing handles, since a disk-backed store hands back a fresh
    /// deserialization on every `uc_get` — two such copies of the same
    /// feature are never the same handle even though they're the same
    /// feature.
    fn uc_same(&mut self, a: &str, b: &str) -> bool;

    /// Retrieves the pending references waiting on `id`, if any.
    fn orphans_get(&mut self, id: &str) -> Option<Vec<(RefKind, Feature)>>;
    /// Appends a pending reference for `id`.
    fn orphans_add(&mut self, id: &str, kind: RefKind, feature: Feature);

    /// Moves every top-level feature (insertion order) to the output
    /// queue, then clears the ID index, top-level order, and orphan
    /// table. Returns the still-pending orphan table (`target_id ->
    /// attribute names`) if non-empty, which the caller turns into a
    /// [`crate::error::ParserError::Orphans`].
    fn flush(&mut self) -> Option<std::collections::BTreeMap<String, Vec<String>>>;
}

/// The default, in-memory [`TempStore`].
#[derive(Default)]
pub struct MemoryTempStore {
    output: VecDeque<Item>,
    under_construction: HashMap<String, Feature>,
    top_level_order: Vec<String>,
    orphans: HashMap<String, Vec<(RefKind, Feature)>>,
}

impl MemoryTempStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryTempStore::default()
    }
}

impl TempStore for MemoryTempStore {
    fn out_push(&mut self, item: Item) {
        self.output.push_back(item);
    }

    fn out_pop(&mut self) -> Option<Item> {
        self.output.pop_front()
    }

    fn out_len(&self) -> usize {
        self.output.len()
    }

    fn uc_get(&mut self, id: &str) -> Option<Feature> {
        self.under_construction.get(id).cloned()
    }

    fn uc_put(&mut self, id: &str, feature: Feature, is_top_level: bool) {
        self.under_construction.insert(id.to_owned(), feature);
        if is_top_level {
            self.top_level_order.push(id.to_owned());
        }
    }

    fn uc_update(&mut self, id: &str, feature: Feature) {
        self.under_construction.insert(id.to_owned(), feature);
    }

    fn uc_same(&mut self, a: &str, b: &str) -> bool {
        match (self.under_construction.get(a), self.under_construction.get(b)) {
            (Some(x), Some(y)) => x.ptr_eq(y),
            _ => false,
        }
    }

    fn orphans_get(&mut self, id: &str) -> Option<Vec<(RefKind, Feature)>> {
        self.orphans.remove(id)
    }

    fn orphans_add(&mut self, id: &str, kind: RefKind, feature: Feature) {
        self.orphans.entry(id.to_owned()).or_default().push((kind, feature));
    }

    fn flush(&mut self) -> Option<std::collections::BTreeMap<String, Vec<String>>> {
        let mut seen_top_level = std::collections::HashSet::new();
        for id in self.top_level_order.drain(..) {
            if let Some(feature) = self.under_construction.get(&id) {
                // A feature may be reachable under more than one of its
                // own ids; emit it once.
                if seen_top_level.insert(feature_identity(feature)) {
                    self.output.push_back(Item::Feature(feature.clone()));
                }
            }
        }
        self.under_construction.clear();

        let orphans = std::mem::take(&mut self.orphans);
        if orphans.is_empty() {
            None
        } else {
            let unresolved = orphans
                .into_iter()
                .map(|(id, refs)| {
                    let attrs = refs.iter().map(|(kind, _)| kind.attr_name().to_owned()).collect();
                    (id, attrs)
                })
                .collect();
            Some(unresolved)
        }
    }
}

fn feature_identity(feature: &Feature) -> usize {
    feature.identity()
}

#[cfg(feature = "disk-store")]
pub use disk::DiskTempStore;

#[cfg(feature = "disk-store")]
mod disk {
    use super::*;
    use crate::model::Feature as ModelFeature;
    use crate::strand::{Phase, Strand};
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    /// A flat, serializable view of one physical feature line, used to
    /// reconstruct a [`Feature`]'s shared child lists after a disk
    /// round-trip.
    #[derive(serde::Serialize, serde::Deserialize)]
    struct LineDto {
        seq_id: Option<String>,
        source: Option<String>,
        feature_type: Option<String>,
        start: Option<u64>,
        end: Option<u64>,
        score: Option<String>,
        strand: Option<u8>,
        phase: Option<u8>,
        attributes: StdHashMap<String, Vec<String>>,
    }

    /// A flat, serializable view of one node in a Feature subgraph:
    /// `node` index of self, lines, and child/derived node indices into
    /// the same blob.
    #[derive(serde::Serialize, serde::Deserialize)]
    struct NodeDto {
        lines: Vec<LineDto>,
        child_indices: Vec<usize>,
        derived_indices: Vec<usize>,
    }

    /// A serialized connected subgraph rooted at one top-level ancestor.
    #[derive(serde::Serialize, serde::Deserialize)]
    struct SubgraphDto {
        nodes: Vec<NodeDto>,
        root: usize,
    }

    fn strand_to_u8(s: Strand) -> u8 {
        match s {
            Strand::Forward => 0,
            Strand::Reverse => 1,
            Strand::Unknown => 2,
            Strand::NotApplicable => 3,
        }
    }

    fn u8_to_strand(b: u8) -> Strand {
        match b {
            0 => Strand::Forward,
            1 => Strand::Reverse,
            2 => Strand::Unknown,
            _ => Strand::NotApplicable,
        }
    }

    fn phase_to_u8(p: Phase) -> u8 {
        match p {
            Phase::Zero => 0,
            Phase::One => 1,
            Phase::Two => 2,
        }
    }

    fn u8_to_phase(b: u8) -> Phase {
        match b {
            0 => Phase::Zero,
            1 => Phase::One,
            _ => Phase::Two,
        }
    }

    /// Flattens the connected subgraph reachable from `root` (through
    /// `child_features`/`derived_features`) into a `SubgraphDto`, assigning
    /// each distinct feature a stable node index.
    fn flatten(root: &ModelFeature) -> SubgraphDto {
        let mut indices: StdHashMap<usize, usize> = StdHashMap::new();
        let mut nodes: Vec<NodeDto> = Vec::new();
        let mut stack = vec![root.clone()];

        fn identity(f: &ModelFeature) -> usize {
            super::feature_identity(f)
        }

        while let Some(feature) = stack.pop() {
            let id = identity(&feature);
            if indices.contains_key(&id) {
                continue;
            }
            let node_index = nodes.len();
            indices.insert(id, node_index);
            nodes.push(NodeDto {
                lines: Vec::new(),
                child_indices: Vec::new(),
                derived_indices: Vec::new(),
            });

            let lines = feature.lines();
            let mut line_dtos = Vec::with_capacity(lines.len());
            let mut children = Vec::new();
            let mut derived = Vec::new();
            for line in lines.iter() {
                line_dtos.push(LineDto {
                    seq_id: line.seq_id.clone(),
                    source: line.source.clone(),
                    feature_type: line.feature_type.clone(),
                    start: line.start,
                    end: line.end,
                    score: line.score.clone(),
                    strand: line.strand.map(strand_to_u8),
                    phase: line.phase.map(phase_to_u8),
                    attributes: line.attributes.clone(),
                });
                for child in line.child_features().iter() {
                    children.push(child.clone());
                }
                for d in line.derived_features().iter() {
                    derived.push(d.clone());
                }
            }
            drop(lines);

            nodes[node_index].lines = line_dtos;
            for child in &children {
                stack.push(child.clone());
            }
            for d in &derived {
                stack.push(d.clone());
            }
            // Indices are patched in a second pass once every feature has
            // a node index, since children may not have been visited yet.
            nodes[node_index].child_indices = children.iter().map(identity).collect();
            nodes[node_index].derived_indices = derived.iter().map(identity).collect();
        }

        // Remap identity-keyed indices to node indices now that every
        // feature has been assigned one.
        for node in &mut nodes {
            node.child_indices = node.child_indices.iter().map(|raw_id| indices[raw_id]).collect();
            node.derived_indices = node.derived_indices.iter().map(|raw_id| indices[raw_id]).collect();
        }

        SubgraphDto {
            root: indices[&identity(root)],
            nodes,
        }
    }

    /// Reconstructs the subgraph, memoizing per node index so a feature
    /// reachable from more than one parent within this call comes back as
    /// one shared handle (invariant 2/4 preserved within the call).
    fn unflatten(dto: &SubgraphDto) -> ModelFeature {
        let mut built: StdHashMap<usize, ModelFeature> = StdHashMap::new();
        build_node(dto, dto.root, &mut built)
    }

    fn build_node(dto: &SubgraphDto, index: usize, built: &mut StdHashMap<usize, ModelFeature>) -> ModelFeature {
        if let Some(existing) = built.get(&index) {
            return existing.clone();
        }
        let node = &dto.nodes[index];
        let mut lines_iter = node.lines.iter();
        let first = lines_iter.next().expect("a feature always has at least one line");
        let feature = ModelFeature::new(|children, derived| line_from_dto(first, children.clone(), derived.clone()));
        built.insert(index, feature.clone());

        for line in lines_iter {
            feature.push_line(|children, derived| line_from_dto(line, children.clone(), derived.clone()));
        }

        for &child_index in &node.child_indices {
            let child = build_node(dto, child_index, built);
            for line in feature.lines().iter() {
                line.shared_list(RefKind::Parent).borrow_mut().push(child.clone());
            }
        }
        for &derived_index in &node.derived_indices {
            let derived = build_node(dto, derived_index, built);
            for line in feature.lines().iter() {
                line.shared_list(RefKind::DerivesFrom).borrow_mut().push(derived.clone());
            }
        }

        feature
    }

    fn line_from_dto(
        dto: &LineDto,
        child_features: std::rc::Rc<RefCell<Vec<ModelFeature>>>,
        derived_features: std::rc::Rc<RefCell<Vec<ModelFeature>>>,
    ) -> crate::model::FeatureLine {
        crate::model::FeatureLine::with_shared(
            dto.seq_id.clone(),
            dto.source.clone(),
            dto.feature_type.clone(),
            dto.start,
            dto.end,
            dto.score.clone(),
            dto.strand.map(u8_to_strand),
            dto.phase.map(u8_to_phase),
            dto.attributes.clone(),
            child_features,
            derived_features,
        )
    }

    /// A disk-backed [`TempStore`]: the ID -> Feature index is spilled to
    /// a temp file, keyed by the id's top-level ancestor (spec §9's
    /// simpler of the two documented strategies). Every `uc_get` loads a
    /// fresh copy from the file, so nothing stays resident between calls.
    /// A single-slot cache on the last spilled feature avoids writing the
    /// same subgraph to disk twice when a line binds more than one id to
    /// it before the caller moves on.
    pub struct DiskTempStore {
        output: VecDeque<Item>,
        file: RefCell<NamedTempFile>,
        // id -> (offset, length) of its ancestor's serialized blob.
        offsets: HashMap<String, (u64, u64)>,
        top_level_order: Vec<String>,
        orphans: HashMap<String, Vec<(RefKind, Feature)>>,
        // identity of the last feature spilled, and where it landed, so a
        // line that binds the same live feature to several ids (or that
        // re-puts it right after an `attach`) doesn't re-serialize it.
        last_spilled: Option<(usize, (u64, u64))>,
    }

    impl DiskTempStore {
        /// Creates a store backed by a fresh temp file in the platform
        /// temp directory, removed when the store is dropped.
        pub fn new() -> std::io::Result<Self> {
            Ok(DiskTempStore {
                output: VecDeque::new(),
                file: RefCell::new(NamedTempFile::new()?),
                offsets: HashMap::new(),
                top_level_order: Vec::new(),
                orphans: HashMap::new(),
                last_spilled: None,
            })
        }

        fn spill(&self, root: &ModelFeature) -> std::io::Result<(u64, u64)> {
            let dto = flatten(root);
            let bytes = bincode::serialize(&dto).map_err(std::io::Error::other)?;
            let mut file = self.file.borrow_mut();
            let offset = file.as_file().metadata()?.len();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&bytes)?;
            Ok((offset, bytes.len() as u64))
        }

        fn load(&self, offset: u64, len: u64) -> std::io::Result<ModelFeature> {
            let mut file = self.file.borrow_mut();
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; len as usize];
            file.read_exact(&mut buf)?;
            let dto: SubgraphDto = bincode::deserialize(&buf).map_err(std::io::Error::other)?;
            Ok(unflatten(&dto))
        }

        // Spills `feature`, reusing the last spilled location when `id`'s
        // binding is the same live feature as the previous call *and*
        // `reuse_cache` allows it. `reuse_cache` must be false whenever the
        // feature may have been mutated (e.g. via `attach`) since it was
        // last spilled — the cache key is the feature's address, which
        // does not change across interior mutation, so a stale hit would
        // silently drop the mutation. Records the id -> location binding
        // unconditionally.
        fn put(&mut self, id: &str, feature: &Feature, reuse_cache: bool) {
            let identity = super::feature_identity(feature);
            let loc = match self.last_spilled {
                Some((last_identity, loc)) if reuse_cache && last_identity == identity => loc,
                _ => match self.spill(feature) {
                    Ok(loc) => {
                        self.last_spilled = Some((identity, loc));
                        loc
                    }
                    Err(err) => {
                        log::warn!("failed to spill feature {id:?} to disk: {err}");
                        return;
                    }
                },
            };
            self.offsets.insert(id.to_owned(), loc);
        }
    }

    impl TempStore for DiskTempStore {
        fn out_push(&mut self, item: Item) {
            self.output.push_back(item);
        }

        fn out_pop(&mut self) -> Option<Item> {
            self.output.pop_front()
        }

        fn out_len(&self) -> usize {
            self.output.len()
        }

        fn uc_get(&mut self, id: &str) -> Option<Feature> {
            let (offset, len) = *self.offsets.get(id)?;
            self.load(offset, len).ok()
        }

        fn uc_put(&mut self, id: &str, feature: Feature, is_top_level: bool) {
            self.put(id, &feature, true);
            if is_top_level {
                self.top_level_order.push(id.to_owned());
            }
        }

        fn uc_update(&mut self, id: &str, feature: Feature) {
            self.put(id, &feature, false);
        }

        fn uc_same(&mut self, a: &str, b: &str) -> bool {
            match (self.offsets.get(a), self.offsets.get(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }

        fn orphans_get(&mut self, id: &str) -> Option<Vec<(RefKind, Feature)>> {
            self.orphans.remove(id)
        }

        fn orphans_add(&mut self, id: &str, kind: RefKind, feature: Feature) {
            self.orphans.entry(id.to_owned()).or_default().push((kind, feature));
        }

        fn flush(&mut self) -> Option<std::collections::BTreeMap<String, Vec<String>>> {
            let mut seen_locs = std::collections::HashSet::new();
            for id in self.top_level_order.drain(..) {
                if let Some(&loc) = self.offsets.get(&id) {
                    if seen_locs.insert(loc) {
                        if let Ok(feature) = self.load(loc.0, loc.1) {
                            self.output.push_back(Item::Feature(feature));
                        }
                    }
                }
            }
            self.offsets.clear();
            self.last_spilled = None;

            let orphans = std::mem::take(&mut self.orphans);
            if orphans.is_empty() {
                None
            } else {
                let unresolved = orphans
                    .into_iter()
                    .map(|(id, refs)| {
                        let attrs = refs.iter().map(|(kind, _)| kind.attr_name().to_owned()).collect();
                        (id, attrs)
                    })
                    .collect();
                Some(unresolved)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureLine;
    use std::collections::HashMap as StdHashMap;

    fn leaf(id: &str) -> Feature {
        Feature::new(|_c, _d| {
            let mut attrs: StdHashMap<String, Vec<String>> = HashMap::new();
            attrs.insert("ID".to_owned(), vec![id.to_owned()]);
            FeatureLine::standalone(None, None, None, None, None, None, None, None, attrs)
        })
    }

    fn run_contract(mut store: impl TempStore) {
        assert_eq!(store.out_len(), 0);
        let g1 = leaf("g1");
        store.uc_put("g1", g1.clone(), true);
        assert!(store.uc_get("g1").is_some());
        assert!(store.uc_get("missing").is_none());

        store.orphans_add("m1", RefKind::Parent, leaf("exon1"));
        let orphans = store.orphans_get("m1").unwrap();
        assert_eq!(orphans.len(), 1);
        assert!(store.orphans_get("m1").is_none());

        let unresolved = store.flush();
        assert!(unresolved.is_none());
        assert_eq!(store.out_len(), 1);
        assert!(store.out_pop().is_some());
        assert!(store.uc_get("g1").is_none());
    }

    fn run_flush_reports_residual_orphans(mut store: impl TempStore) {
        store.orphans_add("missing", RefKind::Parent, leaf("exon1"));
        let unresolved = store.flush().expect("residual orphan expected");
        assert_eq!(unresolved.get("missing"), Some(&vec!["Parent".to_owned()]));
    }

    #[test]
    fn memory_store_satisfies_contract() {
        run_contract(MemoryTempStore::new());
        run_flush_reports_residual_orphans(MemoryTempStore::new());
    }

    #[cfg(feature = "disk-store")]
    #[test]
    fn disk_store_satisfies_contract() {
        run_contract(disk::DiskTempStore::new().unwrap());
        run_flush_reports_residual_orphans(disk::DiskTempStore::new().unwrap());
    }
}
