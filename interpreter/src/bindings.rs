//! Context snapshots as runtime values under their reserved names.

use std::collections::BTreeMap;
use std::sync::Arc;

use outline::context::{
    BlockContext, BlockRef, ConfigContext, Context, Namespace, PageContext, SelfContext,
    TemplateContext,
};
use outline::entity::Children;

use crate::environment::Environment;
use crate::runtime_value::{Record, RecordKind, RuntimeValue};

/// Bind `config`, `page`, `block`, `args` and `template`. `self` is bound
/// per node with [`bind_self`].
pub fn bind_context(env: &mut Environment, context: &Context) {
    env.set_global("config", config_value(&context.config));
    env.set_global("page", page_value(&context.page));
    env.set_global("block", block_value(&context.block));
    env.set_global("args", RuntimeValue::Args(Arc::new(context.args.clone())));
    env.set_global("template", template_value(&context.template));
}

pub fn bind_self(env: &mut Environment, this: &SelfContext<'_>, page: &RuntimeValue) {
    let mut fields = BTreeMap::new();
    fields.insert("uuid".to_string(), RuntimeValue::optional_string(this.uuid));
    fields.insert("page".to_string(), page.clone());
    fields.insert("level".to_string(), RuntimeValue::Number(this.level as f64));
    env.set_global("self", RuntimeValue::Record(Record::new(RecordKind::Block, fields)));
}

pub fn config_value(config: &ConfigContext) -> RuntimeValue {
    let mut fields = BTreeMap::new();
    fields.insert("version".to_string(), config.version.as_str().into());
    fields.insert("graph".to_string(), config.graph.as_str().into());
    fields.insert("date_format".to_string(), config.date_format.as_str().into());
    fields.insert("today".to_string(), RuntimeValue::Date(config.today));
    fields.insert("language".to_string(), config.language.as_str().into());
    RuntimeValue::Record(Record::new(RecordKind::Plain, fields))
}

pub fn page_value(page: &PageContext) -> RuntimeValue {
    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), RuntimeValue::Number(page.id as f64));
    fields.insert("uuid".to_string(), page.uuid.as_str().into());
    fields.insert("name".to_string(), page.name.as_str().into());
    fields.insert("key".to_string(), page.key.as_str().into());
    fields.insert(
        "namespace".to_string(),
        page.namespace.as_ref().map_or(RuntimeValue::Null, namespace_value),
    );
    fields.insert(
        "day".to_string(),
        page.day.map_or(RuntimeValue::Null, RuntimeValue::Date),
    );
    fields.insert("props".to_string(), text_map(&page.props));
    fields.insert("prop_refs".to_string(), refs_map(&page.prop_refs));
    RuntimeValue::Record(Record::new(RecordKind::Page, fields))
}

pub fn block_value(block: &BlockContext) -> RuntimeValue {
    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), RuntimeValue::Number(block.id as f64));
    fields.insert("uuid".to_string(), block.uuid.as_str().into());
    fields.insert("content".to_string(), block.content.as_str().into());
    fields.insert("props".to_string(), text_map(&block.props));
    fields.insert("prop_refs".to_string(), refs_map(&block.prop_refs));
    fields.insert("page".to_string(), page_value(&block.page));
    fields.insert("parent".to_string(), block_ref_value(block.parent));
    fields.insert("prev".to_string(), block_ref_value(block.prev));
    fields.insert("level".to_string(), RuntimeValue::Number(block.level as f64));
    let children = match &block.children {
        Children::Expanded(children) => RuntimeValue::List(children.iter().map(block_value).collect()),
        Children::CountOnly(_) => RuntimeValue::Null,
    };
    fields.insert("children".to_string(), children);
    fields.insert(
        "children_count".to_string(),
        RuntimeValue::Number(block.children.len() as f64),
    );
    RuntimeValue::Record(Record::new(RecordKind::Block, fields))
}

pub fn template_value(template: &TemplateContext) -> RuntimeValue {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), template.name.as_str().into());
    fields.insert(
        "including_parent".to_string(),
        RuntimeValue::Boolean(template.including_parent),
    );
    fields.insert("accessed_via".to_string(), template.accessed_via.as_str().into());
    fields.insert(
        "uuid".to_string(),
        RuntimeValue::optional_string(template.uuid.as_deref()),
    );
    fields.insert("props".to_string(), text_map(&template.props));
    RuntimeValue::Record(Record::new(RecordKind::Plain, fields))
}

fn namespace_value(namespace: &Namespace) -> RuntimeValue {
    let strings = |items: &[String]| {
        RuntimeValue::List(items.iter().map(|s| s.as_str().into()).collect())
    };
    let mut fields = BTreeMap::new();
    fields.insert("parts".to_string(), strings(&namespace.parts));
    fields.insert("prefix".to_string(), namespace.prefix.as_str().into());
    fields.insert("leaf".to_string(), namespace.leaf.as_str().into());
    fields.insert("ancestors".to_string(), strings(&namespace.ancestors));
    RuntimeValue::Record(Record::new(RecordKind::Plain, fields))
}

fn block_ref_value(block: Option<BlockRef>) -> RuntimeValue {
    match block {
        Some(BlockRef { id }) => {
            let mut fields = BTreeMap::new();
            fields.insert("id".to_string(), RuntimeValue::Number(id as f64));
            RuntimeValue::Record(Record::new(RecordKind::Plain, fields))
        }
        None => RuntimeValue::Null,
    }
}

fn text_map(map: &BTreeMap<String, String>) -> RuntimeValue {
    let fields = map
        .iter()
        .map(|(k, v)| (k.clone(), RuntimeValue::String(v.clone())))
        .collect();
    RuntimeValue::Record(Record::new(RecordKind::Plain, fields))
}

fn refs_map(map: &BTreeMap<String, Vec<String>>) -> RuntimeValue {
    let fields = map
        .iter()
        .map(|(k, refs)| {
            let list = refs.iter().map(|r| RuntimeValue::String(r.clone())).collect();
            (k.clone(), RuntimeValue::List(list))
        })
        .collect();
    RuntimeValue::Record(Record::new(RecordKind::Plain, fields))
}
