//! Parse tree shape tests

use nbhist_parser::{parse, ParseError, ParseItem, ParseTree, Position};

fn leaves(tree: &ParseTree, out: &mut Vec<String>) {
    if let Some(literal) = &tree.literal {
        out.push(literal.clone());
    }
    for child in tree.children() {
        leaves(child, out);
    }
}

#[test]
fn test_literals_in_source_order() {
    let tree = parse("total = price * (1 + rate)\nshow(total, 'eur')").unwrap();
    let mut out = Vec::new();
    leaves(&tree, &mut out);
    assert_eq!(
        out,
        vec!["total", "price", "1", "rate", "show", "total", "'eur'"]
    );
}

#[test]
fn test_blank_lines_shift_positions() {
    let tree = parse("a = 1\n\n\nb = 2\n").unwrap();
    let second = tree.children().nth(1).unwrap();
    assert_eq!(second.start, Position::new(3, 0));
    assert_eq!(tree.end, Position::new(4, 0));
}

#[test]
fn test_tokens_are_not_structural() {
    let tree = parse("f(1)").unwrap();
    let call = tree.children().next().unwrap().children().next().unwrap();
    let tokens = call
        .content
        .iter()
        .filter(|item| matches!(item, ParseItem::Token(_)))
        .count();
    assert_eq!(tokens, 2);
    assert_eq!(call.children().count(), 2);
}

#[test]
fn test_parse_tree_json_round_trip() {
    let tree = parse("x = -(y / 2)").unwrap();
    let json = serde_json::to_string(&tree).unwrap();
    let back: ParseTree = serde_json::from_str(&json).unwrap();
    assert_eq!(back, tree);
}

#[test]
fn test_invalid_character() {
    let err = parse("x = 1\ny = @").unwrap_err();
    assert_eq!(
        err,
        ParseError::InvalidToken {
            pos: Position::new(1, 4),
            offset: 10
        }
    );
}

#[cfg(feature = "pretty-errors")]
#[test]
fn test_report_mentions_message() {
    let source = "x = = 1";
    let err = parse(source).unwrap_err();
    let report = err.report("cell", source);
    assert!(report.contains("expected expression"));
}
