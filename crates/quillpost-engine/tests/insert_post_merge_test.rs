//! `insert_post` merges a foreign document at a cursor position with a
//! single-pass visitor: first markerable leaf merges into the cursor
//! section, later content creates new sections, cards force line breaks,
//! and list items are unwrapped/rewrapped based on nesting.

use quillpost_engine::{Editor, EditorOptions, Owner, Position, Post, Range, SimpleDom};
use serde_json::json;

fn editor_with_text(dom: &mut SimpleDom, text: &str) -> Editor<SimpleDom> {
    let mut editor = Editor::new(EditorOptions::default());
    editor.run(dom, |pe| {
        pe.insert_text(Position::Blank, text);
    });
    editor
}

fn foreign_paragraphs(texts: &[&str]) -> Post {
    let mut post = Post::new();
    for text in texts {
        let section = post.create_markup_section("p");
        let marker = post.create_marker(text, vec![]);
        post.append_inline(section, marker);
        post.append_section(Owner::TopLevel, section);
    }
    post
}

fn foreign_list(tag: &str, items: &[&str]) -> Post {
    let mut post = Post::new();
    let list = post.create_list_section(tag);
    post.append_section(Owner::TopLevel, list);
    for text in items {
        let item = post.create_list_item();
        let marker = post.create_marker(text, vec![]);
        post.append_inline(item, marker);
        post.append_section(Owner::List(list), item);
    }
    post
}

fn leaf_texts(editor: &Editor<SimpleDom>) -> Vec<String> {
    editor
        .post()
        .leaf_sections()
        .into_iter()
        .map(|sid| editor.post().section_text(sid))
        .collect()
}

#[test]
fn single_paragraph_merges_into_cursor_section() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "abcd");
    let section = editor.post().leaf_sections()[0];
    let foreign = foreign_paragraphs(&["XY"]);

    let end = editor.run(&mut dom, |pe| {
        pe.insert_post(Position::new(section, 2), &foreign)
    });

    assert_eq!(leaf_texts(&editor), vec!["abXYcd"]);
    assert_eq!(end, Position::new(section, 4), "cursor after inserted text");
    assert_eq!(editor.range().head, end, "range scheduled at insertion end");
}

#[test]
fn second_paragraph_creates_a_new_section_mid_split() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "abcd");
    let section = editor.post().leaf_sections()[0];
    let foreign = foreign_paragraphs(&["XX", "YY"]);

    editor.run(&mut dom, |pe| {
        pe.insert_post(Position::new(section, 2), &foreign)
    });

    // First merges at the cursor, second forces a split and lands between
    // the halves.
    assert_eq!(leaf_texts(&editor), vec!["abXX", "YY", "cd"]);
}

#[test]
fn heading_keeps_its_tag_when_inserted_as_new_section() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "intro");
    let section = editor.post().leaf_sections()[0];

    let mut foreign = Post::new();
    let lead = foreign.create_markup_section("p");
    let m = foreign.create_marker("lead", vec![]);
    foreign.append_inline(lead, m);
    foreign.append_section(Owner::TopLevel, lead);
    let heading = foreign.create_markup_section("h2");
    let m = foreign.create_marker("Title", vec![]);
    foreign.append_inline(heading, m);
    foreign.append_section(Owner::TopLevel, heading);

    editor.run(&mut dom, |pe| {
        let tail = pe.post().tail_position();
        pe.insert_post(tail, &foreign)
    });

    assert_eq!(leaf_texts(&editor), vec!["introlead", "Title"]);
    let last = *editor.post().sections().last().unwrap();
    assert_eq!(editor.post().section(last).tag(), Some("h2"));
}

#[test]
fn list_pasted_into_paragraph_merges_first_item_and_rewraps_rest() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "ab");
    let foreign = foreign_list("ul", &["x", "y"]);

    editor.run(&mut dom, |pe| {
        let tail = pe.post().tail_position();
        pe.insert_post(tail, &foreign)
    });

    // First item's content merges into the paragraph; the second is
    // rewrapped into a fresh list after it.
    assert_eq!(leaf_texts(&editor), vec!["abx", "y"]);
    let sections = editor.post().sections().to_vec();
    assert_eq!(sections.len(), 2);
    assert_eq!(editor.post().section(sections[1]).tag(), Some("ul"));
}

#[test]
fn items_pasted_inside_a_list_item_stay_in_the_list() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "ab");
    editor.run(&mut dom, |pe| {
        let range = Range::collapsed(pe.post().head_position());
        pe.toggle_section("ul", range);
    });
    let item = editor.post().leaf_sections()[0];
    let foreign = foreign_list("ul", &["x", "y"]);

    editor.run(&mut dom, |pe| {
        pe.insert_post(Position::new(item, 1), &foreign)
    });

    // First item merges at the cursor, second becomes a sibling item.
    assert_eq!(leaf_texts(&editor), vec!["axb", "y"]);
    let sections = editor.post().sections().to_vec();
    assert_eq!(sections.len(), 1, "everything stays inside the one list");
    assert_eq!(
        editor.post().list_items(sections[0]).len(),
        2,
        "two items in the list"
    );
}

#[test]
fn card_insertion_splits_the_cursor_section() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "abcd");
    let section = editor.post().leaf_sections()[0];

    let mut foreign = Post::new();
    let card = foreign.create_card_section("embed", json!({"url": "x"}));
    foreign.append_section(Owner::TopLevel, card);

    let end = editor.run(&mut dom, |pe| {
        pe.insert_post(Position::new(section, 2), &foreign)
    });

    let sections = editor.post().sections().to_vec();
    assert_eq!(sections.len(), 3);
    assert_eq!(editor.post().section_text(sections[0]), "ab");
    assert!(editor.post().section(sections[1]).is_card());
    assert_eq!(editor.post().section_text(sections[2]), "cd");
    assert_eq!(end, Position::new(sections[1], 1), "cursor after the card");
}

#[test]
fn card_replaces_a_blank_cursor_section() {
    let mut dom = SimpleDom::new();
    let mut editor = Editor::new(EditorOptions::default());

    let mut foreign = Post::new();
    let card = foreign.create_card_section("embed", json!(null));
    foreign.append_section(Owner::TopLevel, card);

    editor.run(&mut dom, |pe| {
        pe.insert_post(Position::Blank, &foreign)
    });

    let sections = editor.post().sections().to_vec();
    assert_eq!(sections.len(), 1, "the bootstrap blank paragraph is gone");
    assert!(editor.post().section(sections[0]).is_card());
}

#[test]
fn breaking_out_of_a_list_splits_it_around_the_insertion() {
    let mut dom = SimpleDom::new();
    let mut editor = Editor::new(EditorOptions::default());
    editor.run(&mut dom, |pe| {
        let end = pe.insert_text(Position::Blank, "ab");
        pe.toggle_section("ul", Range::collapsed(end));
    });
    let item = editor.post().leaf_sections()[0];
    editor.run(&mut dom, |pe| {
        // Add a second item so the split is interior.
        pe.split_section(Position::tail_of(pe.post(), item));
    });
    let items = editor.post().leaf_sections();
    editor.run(&mut dom, |pe| {
        pe.insert_text(Position::head_of(items[1]), "cd");
    });

    let mut foreign = Post::new();
    let card = foreign.create_card_section("embed", json!(null));
    foreign.append_section(Owner::TopLevel, card);

    // Insert the card in the middle of the first item: the list splits,
    // and the card stands between the halves.
    let first_item = editor.post().leaf_sections()[0];
    editor.run(&mut dom, |pe| {
        pe.insert_post(Position::new(first_item, 1), &foreign)
    });

    let sections = editor.post().sections().to_vec();
    assert_eq!(sections.len(), 3);
    assert_eq!(editor.post().section(sections[0]).tag(), Some("ul"));
    assert!(editor.post().section(sections[1]).is_card());
    assert_eq!(editor.post().section(sections[2]).tag(), Some("ul"));
    assert_eq!(leaf_texts(&editor), vec!["a", "b", "cd"]);
}

#[test]
fn inserting_a_blank_post_is_a_no_op() {
    let mut dom = SimpleDom::new();
    let mut editor = editor_with_text(&mut dom, "abc");
    let section = editor.post().leaf_sections()[0];
    let foreign = Post::new();

    let end = editor.run(&mut dom, |pe| {
        pe.insert_post(Position::new(section, 1), &foreign)
    });

    assert_eq!(leaf_texts(&editor), vec!["abc"]);
    assert_eq!(end, Position::new(section, 1));
}
