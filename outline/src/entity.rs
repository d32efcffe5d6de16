//! Entities as returned by the host store's fetch layer.
//!
//! These mirror what a graph store hands over; the Context Model maps them
//! into snapshots and the Render Engine never touches them directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Properties keyed by their original name, in a stable order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A property value in its two host representations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    /// Raw text as written after `key::`.
    pub text: String,
    /// Normalized names of pages referenced by the value.
    #[serde(default)]
    pub refs: Vec<String>,
}

impl PropertyValue {
    /// Build a value from its raw text, collecting `[[page]]` and `#tag`
    /// references as lowercase page names.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim().to_string();
        let mut refs = Vec::new();
        let mut rest = text.as_str();
        while let Some(start) = rest.find("[[") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("]]") else { break };
            push_unique(&mut refs, after[..end].trim().to_lowercase());
            rest = &after[end + 2..];
        }
        for word in text.split(|c: char| c.is_whitespace() || c == ',') {
            if let Some(tag) = word.strip_prefix('#') {
                let tag = tag.trim_start_matches("[[").trim_end_matches("]]");
                if !tag.is_empty() {
                    push_unique(&mut refs, tag.to_lowercase());
                }
            }
        }
        if refs.is_empty() && text.contains(',') {
            for part in text.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    push_unique(&mut refs, part.to_lowercase());
                }
            }
        }
        PropertyValue { text, refs }
    }
}

fn push_unique(refs: &mut Vec<String>, name: String) {
    if !name.is_empty() && !refs.contains(&name) {
        refs.push(name);
    }
}

/// Split a `key:: value` property line. Returns `None` for ordinary text.
pub fn parse_property_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim().split_once("::")?;
    let key = key.trim();
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    Some((key, value.trim()))
}

/// Collect the property lines of a block's raw content.
pub fn properties_from_content(content: &str) -> Properties {
    content
        .lines()
        .filter_map(parse_property_line)
        .map(|(k, v)| (k.to_string(), PropertyValue::parse(v)))
        .collect()
}

/// Children as delivered by the fetch layer.
///
/// The fetch layer states the representation explicitly: either the full
/// child entities or only how many there are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Children<T> {
    Expanded(Vec<T>),
    CountOnly(usize),
}

impl<T> Children<T> {
    pub fn len(&self) -> usize {
        match self {
            Children::Expanded(items) => items.len(),
            Children::CountOnly(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Children<T> {
    fn default() -> Self {
        Children::Expanded(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEntity {
    pub id: i64,
    pub uuid: String,
    /// Lowercase lookup name.
    pub name: String,
    /// Display name as written by the user.
    pub original_name: String,
    /// Journal date as `yyyymmdd`.
    #[serde(default)]
    pub journal_day: Option<i32>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntity {
    pub id: i64,
    pub uuid: String,
    pub content: String,
    #[serde(default)]
    pub properties: Properties,
    pub page: PageEntity,
    /// Parent block id; `None` for top-level blocks of a page.
    #[serde(default)]
    pub parent: Option<i64>,
    /// Previous sibling id.
    #[serde(default)]
    pub left: Option<i64>,
    #[serde(default)]
    pub children: Children<BlockEntity>,
}

impl BlockEntity {
    /// Look up a property by name, ignoring case.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).or_else(|| {
            self.properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}
