//! The Context Model: read-only snapshots exposed to template code.
//!
//! Every constructor here is a pure `entity -> snapshot` mapping. The
//! per-node `self` slot is not part of [`Context`]; the Render Engine builds
//! a [`SelfContext`] for each visited node and passes it alongside.

pub mod args;
pub mod block;
pub mod page;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use args::{ArgValue, ArgsContext};
pub use block::{BlockContext, BlockRef};
pub use page::{Namespace, PageContext};

use crate::entity::{BlockEntity, Properties};

/// Reserved identifiers visible to compiled template code.
pub const RESERVED_NAMES: [&str; 6] = ["config", "page", "block", "args", "template", "self"];

/// Separator splitting page names into namespaces.
pub const NAMESPACE_SEPARATOR: char = '/';

/// Normalize a property name so it can be used as an identifier:
/// lowercase, with `-` and spaces folded to `_`.
pub fn normalize_property_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Text and reference-list property maps keyed by both the original and the
/// normalized property name.
pub(crate) fn property_maps(
    properties: &Properties,
) -> (BTreeMap<String, String>, BTreeMap<String, Vec<String>>) {
    let mut props = BTreeMap::new();
    let mut refs = BTreeMap::new();
    for (key, value) in properties {
        let normalized = normalize_property_name(key);
        props.insert(key.clone(), value.text.clone());
        refs.insert(key.clone(), value.refs.clone());
        if normalized != *key {
            props.insert(normalized.clone(), value.text.clone());
            refs.insert(normalized, value.refs.clone());
        }
    }
    (props, refs)
}

/// Host facts exposed as `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigContext {
    pub version: String,
    pub graph: String,
    /// chrono `strftime` pattern used when dates are printed as page links.
    pub date_format: String,
    pub today: NaiveDate,
    pub language: String,
}

impl ConfigContext {
    pub fn with_today(today: NaiveDate) -> Self {
        ConfigContext {
            version: env!("CARGO_PKG_VERSION").to_string(),
            graph: String::new(),
            date_format: "%b %-d, %Y".to_string(),
            today,
            language: "en".to_string(),
        }
    }
}

impl Default for ConfigContext {
    fn default() -> Self {
        ConfigContext::with_today(chrono::Local::now().date_naive())
    }
}

/// Self-descriptive metadata about the template being rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateContext {
    pub name: String,
    pub including_parent: bool,
    /// How the template was located: `page`, `name` or `reference`.
    pub accessed_via: String,
    pub uuid: Option<String>,
    pub props: BTreeMap<String, String>,
}

/// The `self` slot: the template node currently being rendered.
#[derive(Debug, Clone, Copy)]
pub struct SelfContext<'a> {
    pub uuid: Option<&'a str>,
    pub page: &'a PageContext,
    /// Depth below the template root (root = 0).
    pub level: usize,
}

/// The snapshot handed to one render.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ConfigContext,
    pub page: PageContext,
    pub block: BlockContext,
    pub args: ArgsContext,
    pub template: TemplateContext,
}

impl Context {
    /// Snapshot everything visible to a render into `destination`.
    pub fn for_destination(
        config: ConfigContext,
        destination: &BlockEntity,
        args: ArgsContext,
        template: TemplateContext,
    ) -> Self {
        Context {
            config,
            page: PageContext::from_entity(&destination.page),
            block: BlockContext::from_entity(destination),
            args,
            template,
        }
    }
}
