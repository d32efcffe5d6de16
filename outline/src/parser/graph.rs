//! Markdown graph documents: `# Page` headings, `key:: value` page
//! properties, and nested `-` bullets as blocks.

use std::ops::Range;

use chrono::NaiveDate;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd};

use crate::context::page::date_to_journal_day;
use crate::entity::{
    BlockEntity, Children, PageEntity, Properties, PropertyValue, parse_property_line,
    properties_from_content,
};
use crate::parser::error::ParseError;

/// One page of a graph document with its top-level blocks.
#[derive(Debug, Clone)]
pub struct GraphPage {
    pub entity: PageEntity,
    pub blocks: Vec<BlockEntity>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a graph document. Ids are assigned in document order starting at 1.
pub fn parse_graph(source: &str, file_id: usize) -> Result<Vec<GraphPage>, ParseError> {
    let parser = CmarkParser::new_ext(source, Options::empty());
    let events: Vec<(Event<'_>, Range<usize>)> = parser.into_offset_iter().collect();

    let mut state = ParseState::new(source, file_id);
    state.process_events(&events)?;
    Ok(state.finalize())
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct ParseState<'a> {
    source: &'a str,
    file_id: usize,
    pages: Vec<PageBuilder>,
    /// Items being built. Innermost = current block.
    item_stack: Vec<ItemBuilder>,
}

struct PageBuilder {
    name: String,
    properties: Properties,
    items: Vec<RawItem>,
}

struct ItemBuilder {
    start: usize,
    /// End of the item's own text; moved up to the first nested list.
    content_end: usize,
    children: Vec<RawItem>,
}

struct RawItem {
    content: String,
    children: Vec<RawItem>,
}

impl<'a> ParseState<'a> {
    fn new(source: &'a str, file_id: usize) -> Self {
        ParseState {
            source,
            file_id,
            pages: Vec::new(),
            item_stack: Vec::new(),
        }
    }

    fn process_events(&mut self, events: &[(Event<'_>, Range<usize>)]) -> Result<(), ParseError> {
        let mut i = 0;

        while i < events.len() {
            let (ref ev, ref range) = events[i];

            match ev {
                Event::Start(Tag::Heading {
                    level: HeadingLevel::H1,
                    ..
                }) if self.item_stack.is_empty() => {
                    i += 1;
                    let name = collect_heading_text(events, &mut i);
                    self.pages.push(PageBuilder {
                        name: name.split_whitespace().collect::<Vec<_>>().join(" "),
                        properties: Properties::new(),
                        items: Vec::new(),
                    });
                }

                // Property lines directly below a heading
                Event::Start(Tag::Paragraph) if self.item_stack.is_empty() => {
                    let text = &self.source[range.clone()];
                    let page = self.pages.last_mut().ok_or_else(|| {
                        ParseError::error("text outside of a page", range.clone(), self.file_id)
                            .locate(self.source)
                    })?;
                    if page.items.is_empty() {
                        for (key, value) in text.lines().filter_map(parse_property_line) {
                            page.properties
                                .insert(key.to_string(), PropertyValue::parse(value));
                        }
                    }
                }

                Event::Start(Tag::Item) => {
                    if self.pages.is_empty() {
                        return Err(ParseError::error(
                            "block outside of a page",
                            range.clone(),
                            self.file_id,
                        )
                        .with_note("start the document with a `# Page` heading")
                        .locate(self.source));
                    }
                    self.item_stack.push(ItemBuilder {
                        start: range.start,
                        content_end: range.end,
                        children: Vec::new(),
                    });
                }

                Event::Start(Tag::List(_)) => {
                    if let Some(item) = self.item_stack.last_mut() {
                        item.content_end = item.content_end.min(range.start);
                    }
                }

                Event::End(TagEnd::Item) => {
                    if let Some(item) = self.item_stack.pop() {
                        let raw = RawItem {
                            content: item_content(&self.source[item.start..item.content_end]),
                            children: item.children,
                        };
                        match self.item_stack.last_mut() {
                            Some(parent) => parent.children.push(raw),
                            None => {
                                if let Some(page) = self.pages.last_mut() {
                                    page.items.push(raw);
                                }
                            }
                        }
                    }
                }

                _ => {}
            }

            i += 1;
        }

        Ok(())
    }

    fn finalize(self) -> Vec<GraphPage> {
        let mut next_id = 1i64;
        let mut pages = Vec::new();

        for builder in self.pages {
            let id = next_id;
            next_id += 1;
            let journal_day = NaiveDate::parse_from_str(&builder.name, "%Y-%m-%d")
                .ok()
                .map(date_to_journal_day);
            let entity = PageEntity {
                id,
                uuid: builder
                    .properties
                    .get("id")
                    .map(|v| v.text.clone())
                    .unwrap_or_else(new_uuid),
                name: builder.name.to_lowercase(),
                original_name: builder.name,
                journal_day,
                properties: builder.properties,
            };
            let blocks = build_blocks(builder.items, &entity, None, &mut next_id);
            pages.push(GraphPage { entity, blocks });
        }

        pages
    }
}

fn build_blocks(
    items: Vec<RawItem>,
    page: &PageEntity,
    parent: Option<i64>,
    next_id: &mut i64,
) -> Vec<BlockEntity> {
    let mut blocks: Vec<BlockEntity> = Vec::with_capacity(items.len());
    let mut left = parent;

    for item in items {
        let id = *next_id;
        *next_id += 1;
        let mut properties = properties_from_content(&item.content);
        let uuid = properties
            .remove("id")
            .map(|v| v.text)
            .unwrap_or_else(new_uuid);
        let content = item
            .content
            .lines()
            .filter(|line| !matches!(parse_property_line(line), Some(("id", _))))
            .collect::<Vec<_>>()
            .join("\n");
        let children = build_blocks(item.children, page, Some(id), next_id);

        blocks.push(BlockEntity {
            id,
            uuid,
            content,
            properties,
            page: page.clone(),
            parent,
            left,
            children: Children::Expanded(children),
        });
        left = Some(id);
    }

    blocks
}

fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn collect_heading_text(events: &[(Event<'_>, Range<usize>)], i: &mut usize) -> String {
    let mut text = String::new();
    while *i < events.len() {
        match &events[*i].0 {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
        *i += 1;
    }
    text.trim().to_string()
}

/// Strip the bullet marker and dedent continuation lines.
fn item_content(raw: &str) -> String {
    let raw = raw.trim_end();
    let mut lines = raw.lines();
    let first = lines
        .next()
        .unwrap_or_default()
        .trim_start()
        .trim_start_matches(['-', '*', '+'])
        .strip_prefix(' ')
        .map(str::to_string)
        .unwrap_or_default();

    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut content = first;
    for line in rest {
        content.push('\n');
        content.push_str(line.get(indent..).unwrap_or_else(|| line.trim_start()));
    }
    content.trim_end().to_string()
}
