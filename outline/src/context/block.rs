use std::collections::BTreeMap;

use crate::context::page::PageContext;
use crate::context::property_maps;
use crate::entity::{BlockEntity, Children};

/// Identity-only reference to a neighbouring block. Snapshots never embed
/// their parent or previous sibling in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockContext {
    pub id: i64,
    pub uuid: String,
    pub content: String,
    pub props: BTreeMap<String, String>,
    pub prop_refs: BTreeMap<String, Vec<String>>,
    pub page: PageContext,
    pub parent: Option<BlockRef>,
    pub prev: Option<BlockRef>,
    /// Nesting depth relative to the snapshot root.
    pub level: usize,
    pub children: Children<BlockContext>,
}

impl BlockContext {
    /// Snapshot `entity` as the root (level 0).
    pub fn from_entity(entity: &BlockEntity) -> Self {
        Self::from_entity_at(entity, 0)
    }

    pub fn from_entity_at(entity: &BlockEntity, level: usize) -> Self {
        let (props, prop_refs) = property_maps(&entity.properties);
        let children = match &entity.children {
            Children::Expanded(items) => Children::Expanded(
                items
                    .iter()
                    .map(|child| BlockContext::from_entity_at(child, level + 1))
                    .collect(),
            ),
            Children::CountOnly(n) => Children::CountOnly(*n),
        };
        // The host links a first child's `left` to its parent.
        let prev = entity
            .left
            .filter(|left| Some(*left) != entity.parent)
            .map(|id| BlockRef { id });
        BlockContext {
            id: entity.id,
            uuid: entity.uuid.clone(),
            content: entity.content.clone(),
            props,
            prop_refs,
            page: PageContext::from_entity(&entity.page),
            parent: entity.parent.map(|id| BlockRef { id }),
            prev,
            level,
            children,
        }
    }
}
