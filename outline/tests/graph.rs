use outline::entity::{BlockEntity, Children};
use outline::parser::graph::{GraphPage, parse_graph};

const DOCUMENT: &str = "\
# Projects/Alpha

status:: active
tags:: [[rust]], #cli

- first
  - nested
    - deeper
  - nested sibling
- id:: fixed-uuid
  second
  owner:: ada

# 2024-03-15

- journal entry
";

fn parse(source: &str) -> Vec<GraphPage> {
    parse_graph(source, 0).unwrap_or_else(|e| panic!("parse failed: {}", e))
}

fn children(block: &BlockEntity) -> &[BlockEntity] {
    match &block.children {
        Children::Expanded(items) => items,
        Children::CountOnly(n) => panic!("expected expanded children, got a count of {}", n),
    }
}

#[test]
fn pages_in_document_order() {
    let pages = parse(DOCUMENT);
    let names: Vec<&str> = pages.iter().map(|p| p.entity.original_name.as_str()).collect();
    assert_eq!(names, ["Projects/Alpha", "2024-03-15"]);
    assert_eq!(pages[0].entity.name, "projects/alpha");
}

#[test]
fn page_properties_come_from_the_leading_paragraph() {
    let pages = parse(DOCUMENT);
    let props = &pages[0].entity.properties;
    assert_eq!(props["status"].text, "active");
    assert_eq!(props["tags"].refs, ["rust", "cli"]);
    assert!(pages[1].entity.properties.is_empty());
}

#[test]
fn journal_pages_carry_their_day() {
    let pages = parse(DOCUMENT);
    assert_eq!(pages[0].entity.journal_day, None);
    assert_eq!(pages[1].entity.journal_day, Some(20240315));
}

#[test]
fn blocks_nest_by_indentation() {
    let pages = parse(DOCUMENT);
    let top = &pages[0].blocks;
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].content, "first");

    let nested = children(&top[0]);
    assert_eq!(nested.len(), 2);
    assert_eq!(nested[0].content, "nested");
    assert_eq!(nested[1].content, "nested sibling");
    assert_eq!(children(&nested[0])[0].content, "deeper");
}

#[test]
fn ids_follow_document_order() {
    let pages = parse(DOCUMENT);
    let alpha = &pages[0];
    assert_eq!(alpha.entity.id, 1);

    let first = &alpha.blocks[0];
    let nested = children(first);
    let deeper = &children(&nested[0])[0];
    assert_eq!(
        [first.id, nested[0].id, deeper.id, nested[1].id, alpha.blocks[1].id],
        [2, 3, 4, 5, 6]
    );
    assert_eq!(pages[1].entity.id, 7);
    assert_eq!(pages[1].blocks[0].id, 8);
}

#[test]
fn parent_and_left_links() {
    let pages = parse(DOCUMENT);
    let first = &pages[0].blocks[0];
    let nested = children(first);

    assert_eq!((first.parent, first.left), (None, None));
    assert_eq!(pages[0].blocks[1].left, Some(first.id));

    assert_eq!(nested[0].parent, Some(first.id));
    assert_eq!(nested[0].left, Some(first.id));
    assert_eq!(nested[1].left, Some(nested[0].id));
}

#[test]
fn id_property_becomes_the_uuid() {
    let pages = parse(DOCUMENT);
    let block = &pages[0].blocks[1];
    assert_eq!(block.uuid, "fixed-uuid");
    assert_eq!(block.content, "second\nowner:: ada");
    assert!(block.property("id").is_none());
    assert_eq!(block.property("Owner").map(|v| v.text.as_str()), Some("ada"));
}

#[test]
fn generated_uuids_are_unique() {
    let pages = parse(DOCUMENT);
    let first = &pages[0].blocks[0];
    let nested = children(first);
    assert_ne!(first.uuid, nested[0].uuid);
    assert_ne!(pages[0].entity.uuid, pages[1].entity.uuid);
}

#[test]
fn blocks_know_their_page() {
    let pages = parse(DOCUMENT);
    let deeper = &children(&children(&pages[0].blocks[0])[0])[0];
    assert_eq!(deeper.page.original_name, "Projects/Alpha");
}

#[test]
fn multiline_blocks_are_dedented() {
    let pages = parse("# Page\n\n- ``{\n    x = 1\n  }``\n  done\n");
    assert_eq!(pages[0].blocks[0].content, "``{\n  x = 1\n}``\ndone");
}

#[test]
fn block_before_any_page_is_an_error() {
    let err = parse_graph("intro\n\n- loose\n", 0).unwrap_err();
    assert_eq!(err.message, "text outside of a page");

    let err = parse_graph("- loose\n", 0).unwrap_err();
    assert_eq!(err.message, "block outside of a page");
    assert_eq!((err.line, err.column), (1, 1));
    assert!(err.notes[0].contains("# Page"));
}

#[test]
fn empty_document_has_no_pages() {
    assert!(parse("").is_empty());
}
