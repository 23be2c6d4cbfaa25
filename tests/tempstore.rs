use std::io::Cursor;

use gff3::{Item, LineSourceInput, MemoryTempStore, Parser};

const INPUT: &str = "\
chr\t.\tgene\t1\t100\t.\t+\t.\tID=g1
chr\t.\tmRNA\t1\t100\t.\t+\t.\tID=m1;Parent=g1
chr\t.\texon\t1\t50\t.\t+\t.\tParent=m1
chr\t.\texon\t60\t100\t.\t+\t.\tParent=m1
chr\t.\tgene\t200\t300\t.\t+\t.\tID=g2
";

fn reader(content: &str) -> LineSourceInput {
    LineSourceInput::reader("t", Cursor::new(content.as_bytes().to_vec()))
}

#[test]
fn memory_store_is_the_default_and_flushes_both_top_level_genes() {
    let parser = Parser::open(vec![reader(INPUT)]).unwrap();
    let items: Vec<Item> = parser.map(|i| i.unwrap()).collect();
    let ids: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Item::Feature(f) => f.primary_id(),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["g1".to_string(), "g2".to_string()]);
}

#[test]
fn explicit_memory_store_behaves_the_same_as_the_default() {
    let parser = Parser::open_with_store(vec![reader(INPUT)], MemoryTempStore::default()).unwrap();
    let items: Vec<Item> = parser.map(|i| i.unwrap()).collect();
    assert_eq!(
        items
            .iter()
            .filter(|item| matches!(item, Item::Feature(_)))
            .count(),
        2
    );
}

#[cfg(feature = "disk-store")]
#[test]
fn disk_backed_store_reproduces_the_same_hierarchy() {
    use gff3::DiskTempStore;

    let store = DiskTempStore::new().expect("temp file should be creatable");
    let parser = Parser::open_with_store(vec![reader(INPUT)], store).unwrap();
    let items: Vec<Item> = parser.map(|i| i.unwrap()).collect();
    let features: Vec<&gff3::Feature> = items
        .iter()
        .filter_map(|item| match item {
            Item::Feature(f) => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(features.len(), 2);

    let g1 = features[0];
    assert_eq!(g1.primary_id().as_deref(), Some("g1"));
    let lines = g1.lines();
    let children = lines[0].child_features();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].primary_id().as_deref(), Some("m1"));
    let m1_lines = children[0].lines();
    assert_eq!(m1_lines[0].child_features().len(), 2);
}
