//! Locating a template in the host store, rendering it into a destination
//! block, and handing the result back for persistence.

use std::fmt;

use outline::context::{ArgsContext, ConfigContext, Context};
use outline::entity::{BlockEntity, PageEntity};
use outline::node::OutlineNode;
use outline::tags::TagTable;
use outline::template::{AccessedVia, Template, TemplateSource};
use tracing::{info, instrument, warn};

use crate::error::{InvokeError, StoreError};
use crate::helpers::Helpers;
use crate::lock::RenderLocks;
use crate::render::Renderer;

/// The host graph store, as far as rendering needs it.
pub trait Store {
    fn page(&self, name: &str) -> Result<Option<PageEntity>, StoreError>;

    /// Top-level blocks of a page, children expanded.
    fn page_blocks(&self, name: &str) -> Result<Vec<BlockEntity>, StoreError>;

    /// A block by uuid, children expanded.
    fn block(&self, uuid: &str) -> Result<Option<BlockEntity>, StoreError>;

    /// The block carrying `template:: name`.
    fn template_block(&self, name: &str) -> Result<Option<BlockEntity>, StoreError>;

    /// Persist rendered nodes as children of the destination block.
    fn insert(&self, destination: &str, nodes: &[OutlineNode]) -> Result<(), StoreError>;
}

/// How the caller names a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    /// A whole page.
    Page(String),
    /// A block with `template:: name`.
    Name(String),
    /// A block by uuid.
    Block(String),
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateRef::Page(name) => write!(f, "page:{}", name),
            TemplateRef::Name(name) => write!(f, "{}", name),
            TemplateRef::Block(uuid) => write!(f, "(({}))", uuid),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(Vec<OutlineNode>),
    /// The template had nothing to render.
    Empty,
    /// Another render into the same destination was still running.
    Skipped,
}

/// Renders templates from a store into destination blocks.
pub struct Invocation<'a, S: Store> {
    store: &'a S,
    helpers: &'a Helpers,
    tags: &'a TagTable,
    locks: &'a RenderLocks,
    config: ConfigContext,
}

impl<'a, S: Store> Invocation<'a, S> {
    pub fn new(
        store: &'a S,
        helpers: &'a Helpers,
        tags: &'a TagTable,
        locks: &'a RenderLocks,
        config: ConfigContext,
    ) -> Self {
        Invocation {
            store,
            helpers,
            tags,
            locks,
            config,
        }
    }

    /// Find and initialize a template.
    pub fn resolve(&self, template: &TemplateRef) -> Result<Template, InvokeError> {
        let source = match template {
            TemplateRef::Page(name) => {
                let page = self
                    .store
                    .page(name)
                    .map_err(InvokeError::Store)?
                    .ok_or_else(|| InvokeError::not_found("page", name))?;
                let blocks = self.store.page_blocks(name).map_err(InvokeError::Store)?;
                TemplateSource::from_page(&page, &blocks)
            }
            TemplateRef::Name(name) => {
                let block = self
                    .store
                    .template_block(name)
                    .map_err(InvokeError::Store)?
                    .ok_or_else(|| InvokeError::not_found("template", name))?;
                TemplateSource::from_block(&block, AccessedVia::Name)
            }
            TemplateRef::Block(uuid) => {
                let block = self
                    .store
                    .block(uuid)
                    .map_err(InvokeError::Store)?
                    .ok_or_else(|| InvokeError::not_found("block", uuid))?;
                TemplateSource::from_block(&block, AccessedVia::Reference)
            }
        };
        Ok(source.init())
    }

    /// Render `template` for the block `destination` and persist the result.
    #[instrument(skip(self, template, args), fields(template = %template))]
    pub fn invoke(
        &self,
        template: &TemplateRef,
        destination: &str,
        args: &[String],
    ) -> Result<RenderOutcome, InvokeError> {
        let Some(guard) = self.locks.acquire(destination) else {
            warn!(destination, "render already in progress, skipping");
            return Ok(RenderOutcome::Skipped);
        };

        let target = self
            .store
            .block(destination)
            .map_err(InvokeError::Store)?
            .ok_or_else(|| InvokeError::not_found("block", destination))?;

        let template = self.resolve(template)?;
        if template.is_empty() {
            info!(template = template.name(), "template is empty");
            return Ok(RenderOutcome::Empty);
        }

        let context = Context::for_destination(
            self.config.clone(),
            &target,
            ArgsContext::parse(args),
            template.context(),
        );
        let nodes = Renderer::new(self.tags, self.helpers).render(&template, &context)?;

        self.store
            .insert(guard.key(), &nodes)
            .map_err(InvokeError::Store)?;
        info!(destination = guard.key(), nodes = nodes.len(), "inserted rendered nodes");
        Ok(RenderOutcome::Rendered(nodes))
    }
}
