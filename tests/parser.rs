use std::io::{Cursor, Read};

use gff3::{Directive, Item, LineSourceInput, Parser};

fn parse_all(input: &str) -> Vec<Item> {
    let parser = Parser::open(vec![LineSourceInput::reader("test", Cursor::new(input.as_bytes().to_vec()))])
        .expect("open should succeed");
    parser.map(|item| item.expect("no parse error expected")).collect()
}

fn feature_id(item: &Item) -> Option<String> {
    match item {
        Item::Feature(f) => f.primary_id(),
        _ => None,
    }
}

#[test]
fn s3_hierarchy_across_lines() {
    let input = "\
##gff-version 3
chr\t.\tgene\t1\t100\t.\t+\t.\tID=g1
chr\t.\tmRNA\t1\t100\t.\t+\t.\tID=m1;Parent=g1
chr\t.\texon\t1\t50\t.\t+\t.\tParent=m1
chr\t.\texon\t60\t100\t.\t+\t.\tParent=m1
";
    let items = parse_all(input);

    assert!(matches!(items[0], Item::Directive(Directive::GffVersion(_))));
    let features: Vec<&Item> = items.iter().filter(|i| matches!(i, Item::Feature(_))).collect();
    assert_eq!(features.len(), 1, "only the top-level gene should be emitted directly");

    let Item::Feature(g1) = features[0] else { unreachable!() };
    assert_eq!(g1.primary_id().as_deref(), Some("g1"));
    let g1_lines = g1.lines();
    let children = g1_lines[0].child_features();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].primary_id().as_deref(), Some("m1"));

    let m1_lines = children[0].lines();
    let exons = m1_lines[0].child_features();
    assert_eq!(exons.len(), 2);
}

#[test]
fn s4_forward_reference_resolves() {
    let input = "\
chr\t.\texon\t1\t50\t.\t+\t.\tParent=m1
chr\t.\tmRNA\t1\t100\t.\t+\t.\tID=m1
";
    let items = parse_all(input);
    assert_eq!(items.len(), 1);
    let Item::Feature(m1) = &items[0] else {
        panic!("expected a feature");
    };
    assert_eq!(m1.primary_id().as_deref(), Some("m1"));
    let lines = m1.lines();
    assert_eq!(lines[0].child_features().len(), 1);
}

#[test]
fn s5_sync_mark_flushes_and_detects_residual_orphans() {
    let input = "\
chr\t.\tgene\t1\t10\t.\t+\t.\tID=g1
###
chr\t.\tgene\t20\t30\t.\t+\t.\tID=g2
";
    let items = parse_all(input);
    assert_eq!(items.len(), 2);
    assert_eq!(feature_id(&items[0]).as_deref(), Some("g1"));
    assert_eq!(feature_id(&items[1]).as_deref(), Some("g2"));

    // A dangling Parent reference at a sync boundary is a parse error.
    let bad_input = "chr\t.\texon\t1\t10\t.\t+\t.\tParent=missing\n###\n";
    let mut parser = Parser::open(vec![LineSourceInput::reader(
        "test",
        Cursor::new(bad_input.as_bytes().to_vec()),
    )])
    .unwrap();
    let err = parser.next_item().unwrap_err();
    assert!(matches!(err, gff3::ParserError::Orphans { .. }));
}

#[test]
fn s6_fasta_handoff() {
    let input = "chr\t.\tregion\t1\t10\t.\t+\t.\t.\n##FASTA\n>a\nACGT\n";
    let mut parser = Parser::open(vec![LineSourceInput::reader("test", Cursor::new(input.as_bytes().to_vec()))])
        .unwrap();

    let first = parser.next_item().unwrap().unwrap();
    assert!(matches!(first, Item::Feature(_)));

    let second = parser.next_item().unwrap().unwrap();
    let Item::Directive(Directive::Fasta(mut stream)) = second else {
        panic!("expected FASTA directive");
    };
    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();
    assert_eq!(out, ">a\nACGT\n");

    assert!(parser.next_item().unwrap().is_none());
}

#[test]
fn implicit_fasta_start_also_hands_off() {
    let input = "chr\t.\tregion\t1\t10\t.\t+\t.\t.\n>a\nACGT\n";
    let mut parser = Parser::open(vec![LineSourceInput::reader("test", Cursor::new(input.as_bytes().to_vec()))])
        .unwrap();

    assert!(matches!(parser.next_item().unwrap().unwrap(), Item::Feature(_)));
    let Item::Directive(Directive::Fasta(mut stream)) = parser.next_item().unwrap().unwrap() else {
        panic!("expected FASTA directive");
    };
    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();
    assert_eq!(out, ">a\nACGT\n");
}

#[test]
fn invariant_shared_child_lists_are_the_same_instance() {
    let input = "\
chr\t.\tgene\t1\t100\t.\t+\t.\tID=g1
chr\t.\tgene\t150\t200\t.\t+\t.\tID=g1
chr\t.\texon\t1\t10\t.\t+\t.\tParent=g1
";
    let items = parse_all(input);
    let Item::Feature(g1) = &items[0] else {
        panic!("expected a feature");
    };
    let lines = g1.lines();
    assert_eq!(lines.len(), 2, "both lines with ID=g1 belong to one Feature");
    assert_eq!(lines[0].child_features().len(), 1);
    assert_eq!(lines[1].child_features().len(), 1);
    assert_eq!(
        lines[0].child_features()[0].primary_id(),
        lines[1].child_features()[0].primary_id()
    );
}

#[test]
fn invariant_self_reference_is_dropped_but_other_parents_still_attach() {
    let input = "\
chr\t.\tgene\t1\t10\t.\t+\t.\tID=p0
chr\t.\tgene\t1\t10\t.\t+\t.\tID=g1;Parent=g1,p0
";
    let items = parse_all(input);
    let Item::Feature(p0) = &items[0] else {
        panic!("expected a feature");
    };
    let p0_lines = p0.lines();
    let children = p0_lines[0].child_features();
    assert_eq!(children.len(), 1, "g1 attaches to p0");
    assert_eq!(children[0].primary_id().as_deref(), Some("g1"));
}

#[test]
fn comment_and_directive_items_preserve_order() {
    let input = "# leading note\n##custom foo bar\nchr\t.\tgene\t1\t10\t.\t+\t.\tID=g1\n";
    let items = parse_all(input);
    assert!(matches!(items[0], Item::Comment(_)));
    assert!(matches!(items[1], Item::Directive(Directive::Other { .. })));
    assert_eq!(feature_id(&items[2]).as_deref(), Some("g1"));
}
