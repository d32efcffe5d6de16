//! The Render Engine: walks a template tree depth-first, executing every
//! node's compiled text and applying the state it leaves behind.

use outline::context::{Context, SelfContext};
use outline::node::{CURSOR_MARKER, OutlineNode};
use outline::parser::Compiler;
use outline::tags::TagTable;
use outline::template::Template;
use tracing::{debug, info};

use crate::bindings::{bind_context, bind_self, page_value};
use crate::environment::Environment;
use crate::error::RenderError;
use crate::executor::{Rendered, execute_program};
use crate::helpers::Helpers;
use crate::runtime_value::RuntimeValue;

/// Render `template` with the default tag table.
pub fn render(
    template: &Template,
    context: &Context,
    helpers: &Helpers,
) -> Result<Vec<OutlineNode>, RenderError> {
    let tags = TagTable::default();
    Renderer::new(&tags, helpers).render(template, context)
}

/// A render engine bound to one tag table and helper registry.
pub struct Renderer<'a> {
    compiler: Compiler<'a>,
    helpers: &'a Helpers,
}

impl<'a> Renderer<'a> {
    pub fn new(tags: &'a TagTable, helpers: &'a Helpers) -> Self {
        Renderer {
            compiler: Compiler::new(tags),
            helpers,
        }
    }

    pub fn render(
        &self,
        template: &Template,
        context: &Context,
    ) -> Result<Vec<OutlineNode>, RenderError> {
        let mut env = Environment::new();
        bind_context(&mut env, context);

        let mut walk = Walk {
            renderer: self,
            template,
            context,
            env,
            template_page: page_value(template.page()),
            appends: Vec::new(),
        };
        // The root sits at index 0 of a one-element forest so that appends
        // to it become top-level siblings.
        let root = walk.render_node(template.root(), vec![0], 0)?;
        let mut forest = vec![root];
        apply_appends(&mut forest, walk.appends);

        let mut nodes = if template.including_parent() {
            forest
        } else {
            let mut top = forest.into_iter();
            let mut nodes = top.next().map(|root| root.children).unwrap_or_default();
            nodes.extend(top);
            nodes
        };
        for node in &mut nodes {
            extract_cursors(node);
            trim_tree(node);
        }

        info!(
            template = template.name(),
            accessed_via = %template.accessed_via(),
            nodes = nodes.len(),
            "rendered template"
        );
        Ok(nodes)
    }
}

/// A pending append: the path of the node that asked for it, and the nodes.
type Append = (Vec<usize>, Vec<OutlineNode>);

struct Walk<'w, 'a> {
    renderer: &'w Renderer<'a>,
    template: &'w Template,
    context: &'w Context,
    env: Environment,
    template_page: RuntimeValue,
    appends: Vec<Append>,
}

impl Walk<'_, '_> {
    /// Render `node`, found at `path` in the output forest.
    fn render_node(
        &mut self,
        node: &OutlineNode,
        path: Vec<usize>,
        level: usize,
    ) -> Result<OutlineNode, RenderError> {
        let program = self
            .renderer
            .compiler
            .compile(&node.content, 0)
            .map_err(|source| RenderError::Compile {
                template: self.template.name().to_string(),
                source,
            })?;
        debug!(?path, instructions = program.instructions.len(), "compiled node");

        let this = SelfContext {
            uuid: node.data.origin.as_deref(),
            page: self.template.page(),
            level,
        };
        bind_self(&mut self.env, &this, &self.template_page);

        let Rendered { text, state } = execute_program(
            &program,
            &mut self.env,
            self.renderer.helpers,
            &self.context.config,
        )
        .map_err(|source| RenderError::Execution {
            template: self.template.name().to_string(),
            source,
        })?;

        let mut out = OutlineNode::new(text);
        out.data.origin = node.data.origin.clone();
        out.data.uuid = state.uuid;

        let spawned = state.spawned.len();
        out.children = state.spawned;
        if !state.appended.is_empty() {
            self.appends.push((path.clone(), state.appended));
        }

        for (i, child) in node.children.iter().enumerate() {
            let mut child_path = path.clone();
            child_path.push(spawned + i);
            let rendered = self.render_node(child, child_path, level + 1)?;
            out.children.push(rendered);
        }

        Ok(out)
    }
}

/// Insert deferred appends in the order they were recorded. Each insertion
/// shifts the recorded paths after it so every append still lands right
/// after the node that asked for it.
fn apply_appends(forest: &mut Vec<OutlineNode>, mut appends: Vec<Append>) {
    for i in 0..appends.len() {
        let (path, nodes) = std::mem::take(&mut appends[i]);
        let Some((&index, parent)) = path.split_last() else {
            continue;
        };
        let Some(siblings) = siblings_mut(forest, parent) else {
            continue;
        };
        let inserted = nodes.len();
        let at = (index + 1).min(siblings.len());
        siblings.splice(at..at, nodes);

        let depth = parent.len();
        for (later, _) in &mut appends[i + 1..] {
            if later.len() > depth && later.starts_with(parent) && later[depth] > index {
                later[depth] += inserted;
            }
        }
    }
}

fn siblings_mut<'f>(
    forest: &'f mut Vec<OutlineNode>,
    parent: &[usize],
) -> Option<&'f mut Vec<OutlineNode>> {
    match parent.split_first() {
        None => Some(forest),
        Some((&first, rest)) => Some(&mut forest.get_mut(first)?.get_mut(rest)?.children),
    }
}

/// Remove up to two cursor markers from every node, recording their char
/// offsets. Variables and spawned or appended text carry markers anywhere.
fn extract_cursors(node: &mut OutlineNode) {
    for _ in 0..2 {
        let Some(at) = node.content.find(CURSOR_MARKER) else {
            break;
        };
        node.data.cursor.push(node.content[..at].chars().count());
        node.content.replace_range(at..at + CURSOR_MARKER.len(), "");
    }
    for child in &mut node.children {
        extract_cursors(child);
    }
}

/// Trim every node's content, moving cursor offsets with the left trim.
fn trim_tree(node: &mut OutlineNode) {
    let leading = node.content.len() - node.content.trim_start().len();
    let shift = node.content[..leading].chars().count();
    node.content = node.content.trim().to_string();
    let len = node.content.chars().count();
    for offset in &mut node.data.cursor {
        *offset = offset.saturating_sub(shift).min(len);
    }
    for child in &mut node.children {
        trim_tree(child);
    }
}
