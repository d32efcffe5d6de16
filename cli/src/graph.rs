//! An in-memory graph loaded from a Markdown document, serving both the
//! render store and the page query store.

use std::collections::BTreeMap;

use interpreter::{Store, StoreError};
use outline::entity::{BlockEntity, Children, PageEntity};
use outline::node::OutlineNode;
use outline::parser::ParseError;
use outline::parser::graph::{GraphPage, parse_graph};
use outline::template::TEMPLATE_PROPERTY;
use parking_lot::RwLock;
use query::{Query, QueryStore};
use tracing::debug;

#[derive(Debug)]
pub struct GraphStore {
    pages: Vec<GraphPage>,
    /// Rendered output per destination uuid, in insertion order.
    inserted: RwLock<BTreeMap<String, Vec<OutlineNode>>>,
}

impl GraphStore {
    pub fn new(pages: Vec<GraphPage>) -> Self {
        GraphStore {
            pages,
            inserted: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn load(source: &str, file_id: usize) -> Result<Self, ParseError> {
        Ok(GraphStore::new(parse_graph(source, file_id)?))
    }

    /// Every block in document order, nested ones included.
    pub fn blocks(&self) -> Vec<&BlockEntity> {
        let mut out = Vec::new();
        for page in &self.pages {
            for block in &page.blocks {
                walk(block, &mut out);
            }
        }
        out
    }

    /// Nodes persisted into `destination` so far.
    pub fn inserted(&self, destination: &str) -> Vec<OutlineNode> {
        self.inserted
            .read()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    fn find_page(&self, name: &str) -> Option<&GraphPage> {
        let key = name.trim().to_lowercase();
        self.pages.iter().find(|p| p.entity.name == key)
    }
}

fn walk<'b>(block: &'b BlockEntity, out: &mut Vec<&'b BlockEntity>) {
    out.push(block);
    if let Children::Expanded(children) = &block.children {
        for child in children {
            walk(child, out);
        }
    }
}

impl Store for GraphStore {
    fn page(&self, name: &str) -> Result<Option<PageEntity>, StoreError> {
        Ok(self.find_page(name).map(|p| p.entity.clone()))
    }

    fn page_blocks(&self, name: &str) -> Result<Vec<BlockEntity>, StoreError> {
        Ok(self
            .find_page(name)
            .map(|p| p.blocks.clone())
            .unwrap_or_default())
    }

    fn block(&self, uuid: &str) -> Result<Option<BlockEntity>, StoreError> {
        Ok(self
            .blocks()
            .into_iter()
            .find(|b| b.uuid == uuid)
            .cloned())
    }

    fn template_block(&self, name: &str) -> Result<Option<BlockEntity>, StoreError> {
        let wanted = name.trim();
        Ok(self
            .blocks()
            .into_iter()
            .find(|b| {
                b.property(TEMPLATE_PROPERTY)
                    .is_some_and(|v| v.text.eq_ignore_ascii_case(wanted))
            })
            .cloned())
    }

    fn insert(&self, destination: &str, nodes: &[OutlineNode]) -> Result<(), StoreError> {
        debug!(destination, nodes = nodes.len(), "inserting rendered nodes");
        self.inserted
            .write()
            .entry(destination.to_string())
            .or_default()
            .extend_from_slice(nodes);
        Ok(())
    }
}

impl QueryStore for GraphStore {
    fn pages(&self, query: &Query) -> Result<Vec<PageEntity>, StoreError> {
        Ok(self
            .pages
            .iter()
            .filter(|p| query.matches(&p.entity))
            .map(|p| p.entity.clone())
            .collect())
    }
}
