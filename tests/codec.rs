use gff3::codec::{
    escape, format_attributes, format_feature_line, parse_attributes, parse_directive, parse_feature_line,
    ParsedDirective,
};

#[test]
fn s1_line_round_trips_through_parse_and_format() {
    let line = "chr1\tsource\tgene\t1\t100\t.\t+\t.\tID=g1;Name=foo\n";
    let parsed = parse_feature_line(line).expect("valid line");
    let formatted = format_feature_line(&parsed);
    let reparsed = parse_feature_line(&formatted).expect("valid line");
    assert_eq!(parsed, reparsed);
}

#[test]
fn s2_escape_in_seqid_round_trips() {
    let line = "chr%3B1\tsrc\tgene\t1\t10\t.\t+\t.\tID=g1\n";
    let parsed = parse_feature_line(line).expect("valid line");
    assert_eq!(parsed.seq_id.as_deref(), Some("chr;1"));
    let formatted = format_feature_line(&parsed);
    assert!(formatted.starts_with("chr%3B1\t"));
}

#[test]
fn rejects_lines_with_too_few_fields() {
    let line = "chr1\tsrc\tgene\t1\t100\n";
    assert!(parse_feature_line(line).is_err());
}

#[test]
fn dot_fields_become_none() {
    let line = "chr\t.\tgene\t1\t10\t.\t.\t.\t.\n";
    let parsed = parse_feature_line(line).expect("valid line");
    assert!(parsed.source.is_none());
    assert!(parsed.score.is_none());
    assert!(parsed.strand.is_none());
    assert!(parsed.phase.is_none());
    assert!(parsed.attributes.is_empty());
}

#[test]
fn attribute_values_accumulate_across_duplicate_keys() {
    let attrs = parse_attributes("Parent=p1;Parent=p2;Note=a,b");
    assert_eq!(attrs.get("Parent").unwrap(), &vec!["p1".to_string(), "p2".to_string()]);
    assert_eq!(attrs.get("Note").unwrap(), &vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn malformed_tokens_without_equals_are_discarded() {
    let attrs = parse_attributes("ID=g1;garbage;Name=foo");
    assert!(attrs.contains_key("ID"));
    assert!(attrs.contains_key("Name"));
    assert_eq!(attrs.len(), 2);
}

#[test]
fn formatting_orders_known_keys_before_lexicographic_rest() {
    let attrs = parse_attributes("Zeta=1;Parent=p1;ID=g1;Alpha=2;Name=n1");
    let formatted = format_attributes(&attrs);
    let id_pos = formatted.find("ID=").unwrap();
    let name_pos = formatted.find("Name=").unwrap();
    let parent_pos = formatted.find("Parent=").unwrap();
    let alpha_pos = formatted.find("Alpha=").unwrap();
    let zeta_pos = formatted.find("Zeta=").unwrap();
    assert!(id_pos < name_pos);
    assert!(name_pos < parent_pos);
    assert!(parent_pos < alpha_pos);
    assert!(alpha_pos < zeta_pos);
}

#[test]
fn escape_covers_reserved_bytes() {
    let escaped = escape(";=%&, \ttab");
    assert!(!escaped.contains(';'));
    assert!(escaped.contains("%3B"));
}

#[test]
fn parse_directive_recognizes_known_forms() {
    assert!(matches!(
        parse_directive("##gff-version 3"),
        Some(ParsedDirective::GffVersion(v)) if v == "3"
    ));
    assert!(matches!(
        parse_directive("##sequence-region chr1 1 1000"),
        Some(ParsedDirective::SequenceRegion { seq_id, start: 1, end: 1000 }) if seq_id == "chr1"
    ));
    assert!(matches!(parse_directive("##FASTA"), Some(ParsedDirective::Fasta)));
    assert!(matches!(parse_directive("##custom-thing payload"), Some(ParsedDirective::Other { .. })));
}

#[test]
fn malformed_known_directive_payload_degrades_to_other() {
    let result = parse_directive("##sequence-region chr1 notanumber");
    assert!(matches!(result, Some(ParsedDirective::Other { .. })));
}

#[test]
fn non_directive_lines_return_none() {
    assert!(parse_directive("# just a comment").is_none());
    assert!(parse_directive("chr1\tsrc\tgene\t1\t10\t.\t+\t.\t.").is_none());
}
