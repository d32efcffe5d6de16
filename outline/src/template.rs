use std::collections::BTreeMap;
use std::fmt;

use crate::context::{PageContext, TemplateContext, normalize_property_name};
use crate::entity::{BlockEntity, Children, PageEntity, parse_property_line};
use crate::node::OutlineNode;

/// Property naming a template block.
pub const TEMPLATE_PROPERTY: &str = "template";
/// Property overriding whether the root block's own content is rendered.
pub const INCLUDING_PARENT_PROPERTY: &str = "template-including-parent";

/// How a template was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessedVia {
    /// The whole page is the template.
    Page,
    /// A block carrying `template:: name`.
    Name,
    /// A direct block reference.
    Reference,
}

impl AccessedVia {
    /// Whether the root's own content is rendered when the template does not
    /// say so explicitly.
    pub fn default_including_parent(self) -> bool {
        match self {
            AccessedVia::Page => false,
            AccessedVia::Name => true,
            AccessedVia::Reference => false,
        }
    }
}

impl fmt::Display for AccessedVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessedVia::Page => write!(f, "page"),
            AccessedVia::Name => write!(f, "name"),
            AccessedVia::Reference => write!(f, "reference"),
        }
    }
}

/// A template as fetched from the store, before initialization.
///
/// Only [`TemplateSource::init`] turns it into a renderable [`Template`].
#[derive(Debug, Clone)]
pub struct TemplateSource {
    root: OutlineNode,
    name: String,
    accessed_via: AccessedVia,
    page: PageContext,
}

impl TemplateSource {
    /// A template rooted at a block (with its children expanded).
    pub fn from_block(entity: &BlockEntity, accessed_via: AccessedVia) -> Self {
        let name = entity
            .property(TEMPLATE_PROPERTY)
            .map(|v| v.text.clone())
            .unwrap_or_else(|| entity.uuid.clone());
        TemplateSource {
            root: node_from_entity(entity),
            name,
            accessed_via,
            page: PageContext::from_entity(&entity.page),
        }
    }

    /// A whole page as template: an empty root over its top-level blocks.
    pub fn from_page(page: &PageEntity, blocks: &[BlockEntity]) -> Self {
        let root = OutlineNode::with_children(
            String::new(),
            blocks.iter().map(node_from_entity).collect(),
        );
        let page = PageContext::from_entity(page);
        TemplateSource {
            root,
            name: page.name.clone(),
            accessed_via: AccessedVia::Page,
            page,
        }
    }

    /// Strip bookkeeping properties and unwrap long-form fenced bodies.
    pub fn init(self) -> Template {
        let TemplateSource {
            mut root,
            name,
            accessed_via,
            page,
        } = self;

        let mut including_parent = None;
        let mut props = BTreeMap::new();
        let mut kept = Vec::new();
        for line in root.content.lines() {
            match parse_property_line(line) {
                Some((key, value)) if key.eq_ignore_ascii_case(TEMPLATE_PROPERTY) => {
                    props.insert(normalize_property_name(key), value.to_string());
                }
                Some((key, value)) if key.eq_ignore_ascii_case(INCLUDING_PARENT_PROPERTY) => {
                    including_parent = parse_yes_no(value);
                    props.insert(normalize_property_name(key), value.to_string());
                }
                Some((key, value)) => {
                    props.insert(normalize_property_name(key), value.to_string());
                    kept.push(line);
                }
                None => kept.push(line),
            }
        }
        root.content = kept.join("\n");
        unwrap_fenced_bodies(&mut root);

        Template {
            including_parent: including_parent
                .unwrap_or_else(|| accessed_via.default_including_parent()),
            root,
            name,
            accessed_via,
            page,
            props,
        }
    }
}

/// An initialized template, ready to render.
#[derive(Debug, Clone)]
pub struct Template {
    root: OutlineNode,
    name: String,
    including_parent: bool,
    accessed_via: AccessedVia,
    page: PageContext,
    props: BTreeMap<String, String>,
}

impl Template {
    pub fn root(&self) -> &OutlineNode {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn including_parent(&self) -> bool {
        self.including_parent
    }

    pub fn accessed_via(&self) -> AccessedVia {
        self.accessed_via
    }

    /// The page the template lives on.
    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// True when rendering would produce nothing.
    pub fn is_empty(&self) -> bool {
        let children_blank = self.root.children.iter().all(OutlineNode::is_blank);
        if self.including_parent {
            self.root.content.trim().is_empty() && children_blank
        } else {
            children_blank
        }
    }

    pub fn context(&self) -> TemplateContext {
        TemplateContext {
            name: self.name.clone(),
            including_parent: self.including_parent,
            accessed_via: self.accessed_via.to_string(),
            uuid: self.root.data.origin.clone(),
            props: self.props.clone(),
        }
    }
}

fn node_from_entity(entity: &BlockEntity) -> OutlineNode {
    let children = match &entity.children {
        Children::Expanded(items) => items.iter().map(node_from_entity).collect(),
        Children::CountOnly(_) => Vec::new(),
    };
    let mut node = OutlineNode::with_children(entity.content.clone(), children);
    node.data.origin = Some(entity.uuid.clone());
    node
}

fn parse_yes_no(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "true" | "y" => Some(true),
        "no" | "false" | "n" => Some(false),
        _ => None,
    }
}

fn unwrap_fenced_bodies(node: &mut OutlineNode) {
    if let Some(body) = unwrap_fenced_body(&node.content) {
        node.content = body;
    }
    for child in &mut node.children {
        unwrap_fenced_bodies(child);
    }
}

/// A block written entirely as a fenced code block holding one statement
/// tag (for editor highlighting) renders as the tag alone.
fn unwrap_fenced_body(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let after_open = trimmed.strip_prefix("```")?;
    let (_info, rest) = after_open.split_once('\n')?;
    let body = rest.strip_suffix("```")?.trim_end_matches(['\n', '\r']);
    let inner = body.trim();
    if inner.starts_with("``{") && inner.ends_with("}``") {
        Some(body.to_string())
    } else {
        None
    }
}
