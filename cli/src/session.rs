//! Everything one CLI run renders with: the loaded graph, helpers, tags,
//! locks and host config.

use std::path::Path;

use interpreter::{Helpers, InvokeError, Invocation, RenderLocks, RenderOutcome, TemplateRef};
use outline::context::ConfigContext;
use outline::tags::TagTable;

use crate::graph::GraphStore;

pub struct Session {
    store: GraphStore,
    helpers: Helpers,
    tags: TagTable,
    locks: RenderLocks,
    config: ConfigContext,
}

impl Session {
    pub fn new(store: GraphStore, config: ConfigContext) -> Self {
        Session {
            store,
            helpers: Helpers::default(),
            tags: TagTable::default(),
            locks: RenderLocks::new(),
            config,
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    pub fn invoke(
        &self,
        template: &TemplateRef,
        target: &str,
        args: &[String],
    ) -> Result<RenderOutcome, InvokeError> {
        Invocation::new(
            &self.store,
            &self.helpers,
            &self.tags,
            &self.locks,
            self.config.clone(),
        )
        .invoke(template, target, args)
    }
}

/// `page:Name` names a page, `((uuid))` a block, anything else a template
/// name.
pub fn parse_template_ref(text: &str) -> TemplateRef {
    let text = text.trim();
    if let Some(page) = text.strip_prefix("page:") {
        return TemplateRef::Page(page.trim().to_string());
    }
    if let Some(uuid) = text
        .strip_prefix("((")
        .and_then(|rest| rest.strip_suffix("))"))
    {
        return TemplateRef::Block(uuid.trim().to_string());
    }
    TemplateRef::Name(text.to_string())
}

/// Load host config from an optional TOML file. Missing fields keep their
/// defaults; an empty graph name falls back to the graph file's stem.
pub fn load_config(path: Option<&Path>, graph: &Path) -> Result<ConfigContext, String> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
            toml::from_str::<ConfigContext>(&text)
                .map_err(|e| format!("invalid config '{}': {}", path.display(), e))?
        }
        None => ConfigContext::default(),
    };
    if config.graph.is_empty() {
        config.graph = graph
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }
    Ok(config)
}
