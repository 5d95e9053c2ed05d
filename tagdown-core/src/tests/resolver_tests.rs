use super::{child_tags, parse, parse_with, warnings};
use crate::document::LeafKind;
use crate::error::ParseError;
use crate::grammar::{Attachment, Grammar, TagDefinition};
use crate::parse_document;
use crate::resource::PassThrough;

#[test]
fn test_text_lands_in_text_only_tag() {
    let mut grammar = Grammar::new();
    grammar
        .add_custom_tag(TagDefinition::new("#warn").with_attachment(Attachment::TextOnly))
        .unwrap();

    let parsed = parse_with(&mut grammar, "#warn;\nhello");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#warn"]);

    let warn = doc.children(doc.root())[0];
    assert_eq!(doc.plain_text(warn), "hello");
    assert!(doc.children(warn).is_empty());
    assert!(warnings(&parsed).is_empty());
}

#[test]
fn test_list_items_are_siblings() {
    let parsed = parse("- a\n- b");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#ul"]);

    let list = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, list), ["#li", "#li"]);
    let items = doc.children(list);
    assert_eq!(doc.plain_text(items[0]).trim(), "a");
    assert_eq!(doc.plain_text(items[1]).trim(), "b");
    assert!(doc.children(items[0]).is_empty());
}

#[test]
fn test_nested_list_goes_under_item() {
    let parsed = parse("- a\n  - b");
    let doc = &parsed.document;
    let outer = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, outer), ["#li"]);

    let first = doc.children(outer)[0];
    assert_eq!(doc.plain_text(first).trim(), "a");
    assert_eq!(child_tags(doc, first), ["#ul"]);

    let inner = doc.children(first)[0];
    assert_eq!(doc.node(inner).indent, 2);
    let nested = doc.children(inner)[0];
    assert_eq!(doc.plain_text(nested).trim(), "b");
}

#[test]
fn test_nested_items_at_same_indent_share_list() {
    let parsed = parse("- a\n  - b\n  - c\n- d");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#ul"]);
    let outer = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, outer), ["#li", "#li"]);

    let first = doc.children(outer)[0];
    assert_eq!(child_tags(doc, first), ["#ul"]);
    let inner = doc.children(first)[0];
    let items: Vec<_> = doc.children(inner).iter().map(|&c| doc.plain_text(c)).collect();
    assert_eq!(items.iter().map(|t| t.trim()).collect::<Vec<_>>(), ["b", "c"]);
    assert_eq!(doc.plain_text(doc.children(outer)[1]).trim(), "d");
}

#[test]
fn test_nested_list_kind_change_stays_under_item() {
    let parsed = parse("- a\n  - b\n  + c");
    let doc = &parsed.document;
    let outer = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, outer), ["#li"]);
    let first = doc.children(outer)[0];
    assert_eq!(child_tags(doc, first), ["#ul", "#ol"]);
}

#[test]
fn test_list_kind_change_starts_new_list() {
    let parsed = parse("- a\n+ b");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#ul", "#ol"]);
}

#[test]
fn test_table_rows_and_cells() {
    let parsed = parse("|A|B|\n|1|2|\n\n");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#p", "#table"]);

    let table = doc.children(doc.root())[1];
    let header: Vec<_> = doc
        .header_cells(table)
        .into_iter()
        .map(|c| doc.plain_text(c))
        .collect();
    assert_eq!(header, ["A", "B"]);
    assert_eq!(doc.column_count(table), 2);

    let rows = doc.body_rows(table);
    assert_eq!(rows.len(), 1);
    let body: Vec<_> = doc.children(rows[0]).iter().map(|&c| doc.plain_text(c)).collect();
    assert_eq!(body, ["1", "2"]);
    assert_eq!(doc.node(table).counters.get("Table"), Some(&1));

    insta::assert_snapshot!(doc.dump(), @r#"
    #root
      #p
      #table
        #thead
          #thead-row
            #thead-cell
              "A"
            #thead-cell
              "B"
        #tbody
          #tbody-row
            #tbody-cell
              "1"
            #tbody-cell
              "2"
    "#);
}

#[test]
fn test_table_colspan() {
    let parsed = parse("|A||\n|1|2|\n\n");
    let doc = &parsed.document;
    let table = doc.find_all(doc.root(), &["#table"])[0];
    let header = doc.header_cells(table);
    assert_eq!(header.len(), 1);
    assert_eq!(doc.node(header[0]).colspan, 2);
    assert_eq!(doc.children(doc.body_rows(table)[0]).len(), 2);
}

#[test]
fn test_unknown_tag_uses_paragraph_definition() {
    let parsed = parse("#bogus hello");
    let doc = &parsed.document;
    let node = doc.children(doc.root())[0];
    assert_eq!(doc.node(node).tag, "#bogus");
    assert_eq!(doc.node(node).definition.name, "#p");
    assert_eq!(doc.plain_text(node), "hello");
    assert_eq!(warnings(&parsed), ["Unknown tag type '#bogus'"]);

    insta::assert_snapshot!(doc.dump(), @r#"
    #root
      #bogus (as #p)
        "hello"
    "#);
}

#[test]
fn test_malformed_utf8_aborts() {
    let err = parse_document(b"#p ok \xFF more", &mut Grammar::new(), &mut PassThrough).unwrap_err();
    match err {
        ParseError::Lexical(err) => {
            assert!(err.message.contains("UTF-8"));
            assert_eq!(err.range.line, 1);
        }
        other => panic!("expected lexical error, got {other:?}"),
    }

    let err = parse_document(b"#p a\x00b", &mut Grammar::new(), &mut PassThrough).unwrap_err();
    assert!(matches!(err, ParseError::Lexical(_)));
}

#[test]
fn test_lexical_error_wins_over_directive_error() {
    let input = b"#define:#bad\nParents: \"#missing\"\n\n<b>\xFF</b>\n";
    let mut grammar = Grammar::new();
    let err = parse_document(input, &mut grammar, &mut PassThrough).unwrap_err();
    assert!(matches!(err, ParseError::Lexical(_)));
}

#[test]
fn test_indented_tags_nest_under_quote() {
    let parsed = parse(">\n  #p inside\n#p outside");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), [">", "#p"]);

    let quote = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, quote), ["#p"]);
    assert_eq!(doc.plain_text(doc.children(quote)[0]).trim(), "inside");
    assert_eq!(doc.plain_text(doc.children(doc.root())[1]), "outside");
}

#[test]
fn test_blank_line_separates_paragraphs() {
    let parsed = parse("one\ncontinued\n\ntwo");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#p", "#p"]);

    let first = doc.children(doc.root())[0];
    assert_eq!(doc.plain_text(first).trim_end(), "one\ncontinued");
    assert_eq!(doc.plain_text(doc.children(doc.root())[1]), "two");
}

#[test]
fn test_comment_lines_are_skipped() {
    let parsed = parse("% a comment\n#p text");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#p"]);
    assert_eq!(doc.plain_text(doc.children(doc.root())[0]), "text");
}

#[test]
fn test_term_becomes_definition_list() {
    let parsed = parse("Term:\n  Definition");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#dl"]);

    let list = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, list), ["#dt", "#dd"]);
    let term = doc.children(list)[0];
    let description = doc.children(list)[1];
    assert_eq!(doc.plain_text(term), "Term:");
    assert_eq!(child_tags(doc, description), ["#p"]);
    assert_eq!(doc.plain_text(doc.children(description)[0]), "Definition");
}

#[test]
fn test_unindented_definition_leaves_list() {
    let parsed = parse("Term:\nDefinition");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#dl", "#p"]);

    let list = doc.children(doc.root())[0];
    let description = doc.children(list)[1];
    assert!(!doc.node(description).has_content());
}

#[test]
fn test_explicit_term_is_not_rewritten() {
    let parsed = parse("#dt Term:");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#dl"]);

    let list = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, list), ["#dt"]);
    assert_eq!(doc.plain_text(doc.children(list)[0]), "Term:");
}

#[test]
fn test_first_child_splits_parent_once() {
    let mut grammar = Grammar::new();
    grammar
        .add_custom_tag(
            TagDefinition::new("#section")
                .with_attachment(Attachment::Root)
                .with_counter("Section"),
        )
        .unwrap();
    grammar
        .add_custom_tag(
            TagDefinition::new("#title")
                .with_default_parent("#section")
                .with_parents(["#section"])
                .with_attachment(Attachment::TextOnly)
                .with_first_child(true),
        )
        .unwrap();

    let parsed = parse_with(&mut grammar, "#title A\n\n#title B");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#section", "#section"]);

    let sections = doc.children(doc.root());
    assert_eq!(doc.node(sections[0]).counters.get("Section"), Some(&1));
    assert_eq!(doc.node(sections[1]).counters.get("Section"), Some(&2));
    assert_eq!(child_tags(doc, sections[0]), ["#title"]);
    assert_eq!(child_tags(doc, sections[1]), ["#title"]);

    let second = doc.children(sections[1])[0];
    assert_eq!(doc.plain_text(second), "B");
    assert_eq!(doc.node(second).counters.get("Section"), Some(&2));
}

#[test]
fn test_default_root_wraps_content() {
    let mut grammar = Grammar::new();
    grammar
        .add_custom_tag(TagDefinition::new("#main").with_attachment(Attachment::DefaultRoot))
        .unwrap();

    let parsed = parse_with(&mut grammar, "hello\n\nworld");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#main"]);

    let main = doc.children(doc.root())[0];
    assert_eq!(child_tags(doc, main), ["#p", "#p"]);
    assert_eq!(doc.plain_text(doc.children(main)[1]), "world");
}

#[test]
fn test_attributes_and_default_attribute() {
    let parsed = parse("#p;class:wide;boxed;label:intro text");
    let doc = &parsed.document;
    let p = doc.children(doc.root())[0];
    let attributes = &doc.node(p).attributes;
    assert_eq!(attributes.class(), "wide");
    assert!(attributes.has_class("boxed"));
    assert_eq!(doc.node_by_id(doc.root(), "intro"), Some(p));
    assert_eq!(doc.plain_text(p), "text");

    let parsed = parse("#code:rust\n  let x = 1;\n");
    let doc = &parsed.document;
    let code = doc.children(doc.root())[0];
    assert_eq!(doc.node(code).attributes.get("class"), Some("rust"));
    assert_eq!(doc.leaves(code).len(), 1);

    let parsed = parse("#ul:x");
    assert_eq!(warnings(&parsed), ["The tag #ul has no default attribute"]);
}

#[test]
fn test_frontmatter_and_line_numbers() {
    let parsed = parse("---\ntitle: Demo\n---\n#bogus x");
    let frontmatter = parsed.frontmatter.as_ref().unwrap();
    assert_eq!(frontmatter.get("title").and_then(|v| v.as_str()), Some("Demo"));

    let warning = &parsed.diagnostics[0];
    assert_eq!(warning.range.line, 4);
    assert_eq!(warning.range.column, 0);
}

#[test]
fn test_byte_order_mark_is_stripped() {
    let mut input = b"\xEF\xBB\xBF".to_vec();
    input.extend_from_slice(b"#p text");
    let parsed = parse_document(&input, &mut Grammar::new(), &mut PassThrough).unwrap();
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#p"]);
    assert_eq!(doc.plain_text(doc.children(doc.root())[0]), "text");
}

#[test]
fn test_code_block_runs_to_outdented_line() {
    let parsed = parse("#code\n  a\n\n  b\n#p x");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#code", "#p"]);

    let code = doc.children(doc.root())[0];
    let leaves = doc.leaves(code);
    assert_eq!(leaves.len(), 1);
    assert!(matches!(&doc.leaf(leaves[0]).kind, LeafKind::Code(text) if text == "\n  a\n\n  b\n"));
    assert_eq!(doc.node(code).counters.get("Sample"), Some(&1));
    assert_eq!(doc.plain_text(doc.children(doc.root())[1]), "x");
}

#[test]
fn test_code_block_ends_at_blank_line_before_outdent() {
    let parsed = parse("#code\n  a\n\nafter");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#code", "#p"]);

    let code = doc.children(doc.root())[0];
    let leaf = doc.leaves(code)[0];
    assert!(matches!(&doc.leaf(leaf).kind, LeafKind::Code(text) if text == "\n  a\n\n"));
    assert_eq!(doc.plain_text(doc.children(doc.root())[1]), "after");
}

#[test]
fn test_math_block_spans_blank_lines() {
    let parsed = parse("#math\n  x^2\n\n  + y\n\n#p z");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#math", "#p"]);

    let math = doc.children(doc.root())[0];
    let leaf = doc.leaves(math)[0];
    assert!(matches!(&doc.leaf(leaf).kind, LeafKind::Math(text) if text == "\n  x^2\n\n  + y\n\n"));
    assert_eq!(doc.node(math).counters.get("Equation"), Some(&1));
    assert!(doc.has_math(doc.root()));
}

#[test]
fn test_media_section_drops_inline_content() {
    let mut grammar = Grammar::new();
    let input = "#define:#gallery\nMode: media\n\n<div>{{.Content}}</div>\n\n#gallery\nignored `c` text\n\n#p kept";
    let parsed = parse_with(&mut grammar, input);
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#gallery", "#p"]);

    let gallery = doc.children(doc.root())[0];
    assert!(!doc.node(gallery).has_content());
    assert_eq!(doc.plain_text(doc.children(doc.root())[1]), "kept");
}

#[test]
fn test_first_child_splits_parent_holding_text() {
    let mut grammar = Grammar::new();
    grammar
        .add_custom_tag(
            TagDefinition::new("#box")
                .with_attachment(Attachment::TextOnly)
                .with_counter("Box"),
        )
        .unwrap();
    grammar
        .add_custom_tag(
            TagDefinition::new("#cap")
                .with_default_parent("#box")
                .with_parents(["#box"])
                .with_attachment(Attachment::TextOnly)
                .with_first_child(true),
        )
        .unwrap();

    let parsed = parse_with(&mut grammar, "#box intro\n#cap C");
    let doc = &parsed.document;
    assert_eq!(child_tags(doc, doc.root()), ["#box", "#box"]);

    let boxes = doc.children(doc.root());
    assert_eq!(doc.plain_text(boxes[0]).trim(), "intro");
    assert!(doc.children(boxes[0]).is_empty());
    assert_eq!(child_tags(doc, boxes[1]), ["#cap"]);
    assert_eq!(doc.node(boxes[1]).counters.get("Box"), Some(&2));
    assert_eq!(doc.plain_text(doc.children(boxes[1])[0]), "C");
}
