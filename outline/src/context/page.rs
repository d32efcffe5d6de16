use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::context::{NAMESPACE_SEPARATOR, property_maps};
use crate::entity::PageEntity;

/// Hierarchical decomposition of a page name like `a/b/c`.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    /// `["a", "b", "c"]`
    pub parts: Vec<String>,
    /// `"a/b"`
    pub prefix: String,
    /// `"c"`
    pub leaf: String,
    /// `["a", "a/b"]`
    pub ancestors: Vec<String>,
}

impl Namespace {
    /// Decompose `name`; `None` unless it contains the separator.
    pub fn parse(name: &str) -> Option<Namespace> {
        if !name.contains(NAMESPACE_SEPARATOR) {
            return None;
        }
        let parts: Vec<String> = name
            .split(NAMESPACE_SEPARATOR)
            .map(|p| p.trim().to_string())
            .collect();
        let leaf = parts.last().cloned().unwrap_or_default();
        let mut ancestors = Vec::with_capacity(parts.len().saturating_sub(1));
        for i in 1..parts.len() {
            ancestors.push(parts[..i].join(&NAMESPACE_SEPARATOR.to_string()));
        }
        let prefix = ancestors.last().cloned().unwrap_or_default();
        Some(Namespace {
            parts,
            prefix,
            leaf,
            ancestors,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    pub id: i64,
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// Normalized lookup key.
    pub key: String,
    pub namespace: Option<Namespace>,
    /// Set for journal pages.
    pub day: Option<NaiveDate>,
    pub props: BTreeMap<String, String>,
    pub prop_refs: BTreeMap<String, Vec<String>>,
}

impl PageContext {
    pub fn from_entity(entity: &PageEntity) -> Self {
        let name = if entity.original_name.is_empty() {
            entity.name.clone()
        } else {
            entity.original_name.clone()
        };
        let (props, prop_refs) = property_maps(&entity.properties);
        PageContext {
            id: entity.id,
            uuid: entity.uuid.clone(),
            key: name.to_lowercase(),
            namespace: Namespace::parse(&name),
            day: entity.journal_day.and_then(journal_day_to_date),
            name,
            props,
            prop_refs,
        }
    }
}

impl From<PageEntity> for PageContext {
    fn from(entity: PageEntity) -> Self {
        PageContext::from_entity(&entity)
    }
}

/// Decode a `yyyymmdd` journal day.
pub fn journal_day_to_date(day: i32) -> Option<NaiveDate> {
    if day <= 0 {
        return None;
    }
    let year = day / 10_000;
    let month = (day / 100 % 100) as u32;
    let dom = (day % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, dom)
}

/// Encode a date as a `yyyymmdd` journal day.
pub fn date_to_journal_day(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}
