use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use interpreter::bindings::bind_context;
use interpreter::environment::Environment;
use interpreter::{
    Helpers, Invocation, InvokeError, RenderError, RenderLocks, RenderOutcome, RuntimeError,
    Store, StoreError, TemplateRef,
};
use outline::context::{ArgsContext, ConfigContext, Context, TemplateContext};
use outline::entity::{BlockEntity, Children, PageEntity, properties_from_content};
use outline::node::OutlineNode;
use outline::parser::Compiler;
use outline::tags::TagTable;
use outline::template::{AccessedVia, Template, TemplateSource};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn config() -> ConfigContext {
    // A Friday
    ConfigContext::with_today(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
}

fn page(name: &str) -> PageEntity {
    PageEntity {
        id: 1,
        uuid: format!("{}-uuid", name.to_lowercase()),
        name: name.to_lowercase(),
        original_name: name.to_string(),
        journal_day: None,
        properties: BTreeMap::new(),
    }
}

fn block(id: i64, content: &str, children: Vec<BlockEntity>) -> BlockEntity {
    BlockEntity {
        id,
        uuid: format!("block-{}", id),
        content: content.to_string(),
        properties: properties_from_content(content),
        page: page("Templates"),
        parent: None,
        left: None,
        children: Children::Expanded(children),
    }
}

fn destination() -> BlockEntity {
    let mut dest = block(100, "", Vec::new());
    dest.page = page("Journal Notes");
    dest
}

fn context(args: &[&str]) -> Context {
    Context::for_destination(
        config(),
        &destination(),
        ArgsContext::parse(args),
        TemplateContext {
            name: "test".to_string(),
            including_parent: true,
            accessed_via: "name".to_string(),
            uuid: None,
            props: BTreeMap::new(),
        },
    )
}

/// Compile and execute a single template text.
fn run_with(source: &str, args: &[&str]) -> String {
    let tags = TagTable::default();
    let program = Compiler::new(&tags).compile(source, 0).expect("compile failed");
    let mut env = Environment::new();
    bind_context(&mut env, &context(args));
    interpreter::execute_program(&program, &mut env, &Helpers::default(), &config())
        .expect("execution failed")
        .text
}

fn run(source: &str) -> String {
    run_with(source, &[])
}

fn run_error(source: &str) -> RuntimeError {
    let tags = TagTable::default();
    let program = Compiler::new(&tags).compile(source, 0).expect("compile failed");
    let mut env = Environment::new();
    bind_context(&mut env, &context(&[]));
    interpreter::execute_program(&program, &mut env, &Helpers::default(), &config())
        .expect_err("execution should fail")
        .error
}

/// A page template: the root is discarded, its blocks become top level.
fn page_template(blocks: Vec<BlockEntity>) -> Template {
    TemplateSource::from_page(&page("Templates"), &blocks).init()
}

fn render(template: &Template) -> Vec<OutlineNode> {
    interpreter::render(template, &context(&[]), &Helpers::default()).expect("render failed")
}

fn contents(nodes: &[OutlineNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.content.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[test]
fn arithmetic() {
    assert_eq!(run("``2 + 3``"), "5");
    assert_eq!(run("``10 - 4``"), "6");
    assert_eq!(run("``3 * 7``"), "21");
    assert_eq!(run("``15 / 3``"), "5");
    assert_eq!(run("``10 % 3``"), "1");
    assert_eq!(run("``7 / 2``"), "3.5");
}

#[test]
fn filtered_tag_between_literals() {
    assert_eq!(run("A``1+2``B"), "A3B");
}

#[test]
fn operator_precedence() {
    assert_eq!(run("``2 + 3 * 4``"), "14");
    assert_eq!(run("``(2 + 3) * 4``"), "20");
    assert_eq!(run("``-5 + 10``"), "5");
    assert_eq!(run("``!false``"), "true");
}

#[test]
fn logic_yields_operands() {
    assert_eq!(run("``'' || 'fallback'``"), "fallback");
    assert_eq!(run("``'a' && 'b'``"), "b");
    assert_eq!(run("``null ?? 'none'``"), "none");
    assert_eq!(run("``'set' ?? 'none'``"), "set");
    assert_eq!(run("``3 > 5 ? 'yes' : 'no'``"), "no");
}

#[test]
fn strings_and_interpolation() {
    assert_eq!(run("``'a' + 1``"), "a1");
    assert_eq!(run("``\"double\"``"), "double");
    assert_eq!(run("``'it\\'s'``"), "it's");
    assert_eq!(run("```n = ${1 + 1}```"), "n = 2");
}

#[test]
fn lists_and_indexing() {
    assert_eq!(run("``[1, 2, 3]``"), "1, 2, 3");
    assert_eq!(run("``[1, 2, 3][1]``"), "2");
    assert_eq!(run("``[1, 2, 3].length``"), "3");
    assert_eq!(run("``'hello'[0]``"), "h");
}

#[test]
fn numbers_compare_with_their_text() {
    assert_eq!(run_with("``args.count == 3 ? 'three' : 'other'``", &[":count 3"]), "three");
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[test]
fn statement_tags_assign_variables() {
    assert_eq!(run("``{ let x = 2\n y = x * 3 }``value ``y``"), "value 6");
    assert_eq!(run("``let z = 4``z=``z``"), "z=4");
    assert_eq!(run("``{ a = 1; b = a + 1 }````b``"), "2");
}

#[test]
fn statement_tags_trim_following_text() {
    assert_eq!(run("``{ x = 1 }``\nnext"), "next");
    assert_eq!(run("``{ x = 1 }``\n\nnext"), "\nnext");
    assert_eq!(run("``{_ x = 1 }``\n\n   next"), "next");
}

#[test]
fn if_statements() {
    let source = "``{ if args.flag { label = 'on' } else { label = 'off' } }````label``";
    assert_eq!(run(source), "off");
    assert_eq!(run_with(source, &[":flag"]), "on");
    assert_eq!(
        run("``{\n  n = 5\n  if n > 3 {\n    size = 'big'\n  }\n  else {\n    size = 'small'\n  }\n}``\n``size``"),
        "big"
    );
}

#[test]
fn let_does_not_leak_out_of_branches() {
    let err = run_error("``{ if true { let inner = 1 } }````inner``");
    assert!(matches!(err, RuntimeError::UndefinedVariable(name) if name == "inner"));
}

#[test]
fn reserved_names_are_read_only() {
    let err = run_error("``{ page = 1 }``");
    assert!(matches!(err, RuntimeError::ReadOnly(name) if name == "page"));
}

#[test]
fn undefined_function_is_an_error() {
    let err = run_error("``nope(1)``");
    assert!(matches!(err, RuntimeError::UndefinedFunction(name) if name == "nope"));
}

#[test]
fn comments_are_ignored() {
    assert_eq!(run("``{ x = 1 // one\n /* two */ x = x + 1 }````x``"), "2");
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[test]
fn args_by_name_and_ordinal() {
    let args = &["Hello", ":mood happy"];
    assert_eq!(run_with("``args.$1``", args), "Hello");
    assert_eq!(run_with("``args.mood``", args), "happy");
    assert_eq!(run_with("``$2``", args), "happy");
    assert_eq!(run_with("``args.mood$2``", args), "happy");
    assert_eq!(run_with("[``args.missing``]", args), "[]");
}

#[test]
fn pages_and_blocks_print_as_links() {
    assert_eq!(run("``page``"), "[[Journal Notes]]");
    assert_eq!(run("``block``"), "((block-100))");
    assert_eq!(run("``page.key``"), "journal notes");
    assert_eq!(run("``[[Some Page]]``"), "[[Some Page]]");
    assert_eq!(run("``((abc-123))``"), "((abc-123))");
}

#[test]
fn template_context_is_visible() {
    assert_eq!(run("``template.name``/``template.accessed_via``"), "test/name");
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[test]
fn date_helpers() {
    assert_eq!(run("``@tomorrow``"), "[[Mar 16, 2024]]");
    assert_eq!(run("``@next monday``"), "[[Mar 18, 2024]]");
    assert_eq!(run("``date.today()``"), "[[Mar 15, 2024]]");
    assert_eq!(run("``date.format(date.today(), '%Y/%m/%d')``"), "2024/03/15");
    assert_eq!(run("``date.nlp('in 2 weeks').day``"), "29");
    assert_eq!(run("``config.today - 1``"), "[[Mar 14, 2024]]");
}

#[test]
fn text_helpers() {
    assert_eq!(run("``upper('abc')``"), "ABC");
    assert_eq!(run("``'abc'.upper()``"), "ABC");
    assert_eq!(run("``zeros(7, 3)``"), "007");
    assert_eq!(run("``fill('x', '-', 3, 'left')``"), "x--");
    assert_eq!(run("``join(['a', 'b'], ' | ')``"), "a | b");
    assert_eq!(run("``when('Bob', 'Hi $1', 'nobody')``"), "Hi Bob");
    assert_eq!(run("``when('', 'Hi $1', 'nobody')``"), "nobody");
    assert_eq!(run("``bool('yes')``"), "true");
    assert_eq!(run("``len('héllo')``"), "5");
}

#[test]
fn padding_width_is_bounded() {
    assert!(matches!(
        run_error("``zeros(1, 99999999999999999999)``"),
        RuntimeError::Helper { name, .. } if name == "zeros"
    ));
    assert!(matches!(
        run_error("``space('a', '1e30', 'left')``"),
        RuntimeError::Helper { name, .. } if name == "space"
    ));
    assert!(matches!(
        run_error("``fill('a', '-', -2)``"),
        RuntimeError::Helper { .. }
    ));
    assert_eq!(run("``zeros(5, '3')``"), "005");
}

#[test]
fn host_helpers_can_be_registered() {
    let mut helpers = Helpers::empty();
    helpers.register("answer", |_, _| Ok(42.0.into()));
    let tags = TagTable::default();
    let program = Compiler::new(&tags).compile("``answer()``", 0).unwrap();
    let mut env = Environment::new();
    let rendered = interpreter::execute_program(&program, &mut env, &helpers, &config()).unwrap();
    assert_eq!(rendered.text, "42");
}

// ---------------------------------------------------------------------------
// Render engine
// ---------------------------------------------------------------------------

#[test]
fn text_without_tags_renders_unchanged() {
    let template = page_template(vec![block(
        1,
        "  plain text, with **markup**  ",
        vec![block(2, "child\nsecond line", vec![])],
    )]);
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["plain text, with **markup**"]);
    assert_eq!(nodes[0].children[0].content, "child\nsecond line");
}

#[test]
fn including_parent_keeps_the_root() {
    let template = TemplateSource::from_block(
        &block(1, "template:: daily\nRoot ``1 + 1``", vec![block(2, "child", vec![])]),
        AccessedVia::Name,
    )
    .init();
    assert!(template.including_parent());
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["Root 2"]);
    assert_eq!(contents(&nodes[0].children), vec!["child"]);
}

#[test]
fn excluded_root_still_runs_its_statements() {
    let template = TemplateSource::from_block(
        &block(
            1,
            "template-including-parent:: no\n``{ who = 'root' }``",
            vec![block(2, "set by ``who``", vec![])],
        ),
        AccessedVia::Name,
    )
    .init();
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["set by root"]);
}

#[test]
fn cursor_offset_is_measured_after_trimming() {
    let template = page_template(vec![block(1, "  ``cursor()``hello", vec![])]);
    let nodes = render(&template);
    assert_eq!(nodes[0].content, "hello");
    assert_eq!(nodes[0].data.cursor, vec![0]);
}

#[test]
fn two_cursor_markers_make_a_selection() {
    let template = page_template(vec![block(1, "a``cursor()``bc``cursor()``d", vec![])]);
    let nodes = render(&template);
    assert_eq!(nodes[0].content, "abcd");
    assert_eq!(nodes[0].data.cursor, vec![1, 3]);
}

#[test]
fn cursor_carried_by_a_variable_lands_where_it_is_printed() {
    let template = page_template(vec![
        block(1, "``{ c = cursor() }``first", vec![]),
        block(2, "here``c``", vec![]),
    ]);
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["first", "here"]);
    assert!(nodes[0].data.cursor.is_empty());
    assert_eq!(nodes[1].data.cursor, vec![4]);
}

#[test]
fn cursor_inside_spawned_and_appended_nodes() {
    let template = page_template(vec![block(
        1,
        "P ``spawn('x' + cursor())`` ``append(cursor() + 'y')``",
        vec![],
    )]);
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["P", "y"]);
    assert!(nodes[0].data.cursor.is_empty());
    assert_eq!(nodes[0].children[0].content, "x");
    assert_eq!(nodes[0].children[0].data.cursor, vec![1]);
    assert_eq!(nodes[1].data.cursor, vec![0]);
    assert!(!nodes[1].content.contains(outline::node::CURSOR_MARKER));
}

#[test]
fn forced_uuid_lands_on_the_node() {
    let template = page_template(vec![block(1, "``set_uuid('fixed-id')``text", vec![])]);
    let nodes = render(&template);
    assert_eq!(nodes[0].content, "text");
    assert_eq!(nodes[0].data.uuid.as_deref(), Some("fixed-id"));
}

#[test]
fn self_tracks_depth() {
    let template = page_template(vec![block(
        1,
        "level ``self.level``",
        vec![block(2, "level ``self.level`` of ``self``", vec![])],
    )]);
    let nodes = render(&template);
    assert_eq!(nodes[0].content, "level 1");
    assert_eq!(nodes[0].children[0].content, "level 2 of ((block-2))");
}

#[test]
fn spawned_nodes_precede_children() {
    let template = page_template(vec![block(
        1,
        "P``spawn('s1', 's2')``",
        vec![block(2, "c``append('c2')``", vec![])],
    )]);
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["P"]);
    assert_eq!(contents(&nodes[0].children), vec!["s1", "s2", "c", "c2"]);
}

#[test]
fn deferred_appends_land_after_their_nodes() {
    let template = page_template(vec![
        block(
            1,
            "A``append('A1')``",
            vec![block(2, "ax``append('AX1', 'AX2')``", vec![])],
        ),
        block(3, "B``append('B1')``", vec![]),
    ]);
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["A", "A1", "B", "B1"]);
    assert_eq!(contents(&nodes[0].children), vec!["ax", "AX1", "AX2"]);
}

#[test]
fn root_appends_follow_the_top_level() {
    let template = TemplateSource::from_block(
        &block(
            1,
            "template-including-parent:: false\n``append('tail')``",
            vec![block(2, "x", vec![])],
        ),
        AccessedVia::Reference,
    )
    .init();
    let nodes = render(&template);
    assert_eq!(contents(&nodes), vec!["x", "tail"]);
}

#[test]
fn execution_failure_names_the_template() {
    let template = page_template(vec![block(1, "ok", vec![]), block(2, "``missing``", vec![])]);
    let err = interpreter::render(&template, &context(&[]), &Helpers::default()).unwrap_err();
    assert!(matches!(&err, RenderError::Execution { template, .. } if template == "Templates"));
    assert!(err.to_string().contains("undefined variable: missing"));
}

#[test]
fn compile_failure_names_the_template() {
    let template = page_template(vec![block(1, "fine\n``1 +``", vec![])]);
    let err = interpreter::render(&template, &context(&[]), &Helpers::default()).unwrap_err();
    match err {
        RenderError::Compile { template, source } => {
            assert_eq!(template, "Templates");
            assert_eq!(source.line, 2);
        }
        other => panic!("expected compile error, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    blocks: Vec<BlockEntity>,
    inserted: Mutex<Vec<(String, Vec<OutlineNode>)>>,
}

fn find<'a>(blocks: &'a [BlockEntity], uuid: &str) -> Option<&'a BlockEntity> {
    blocks.iter().find_map(|b| {
        if b.uuid == uuid {
            return Some(b);
        }
        match &b.children {
            Children::Expanded(children) => find(children, uuid),
            Children::CountOnly(_) => None,
        }
    })
}

impl Store for MemoryStore {
    fn page(&self, name: &str) -> Result<Option<PageEntity>, StoreError> {
        Ok(self
            .blocks
            .iter()
            .find(|b| b.page.name == name.to_lowercase())
            .map(|b| b.page.clone()))
    }

    fn page_blocks(&self, name: &str) -> Result<Vec<BlockEntity>, StoreError> {
        Ok(self
            .blocks
            .iter()
            .filter(|b| b.page.name == name.to_lowercase())
            .cloned()
            .collect())
    }

    fn block(&self, uuid: &str) -> Result<Option<BlockEntity>, StoreError> {
        Ok(find(&self.blocks, uuid).cloned())
    }

    fn template_block(&self, name: &str) -> Result<Option<BlockEntity>, StoreError> {
        Ok(self
            .blocks
            .iter()
            .find(|b| b.property("template").is_some_and(|v| v.text == name))
            .cloned())
    }

    fn insert(&self, destination: &str, nodes: &[OutlineNode]) -> Result<(), StoreError> {
        self.inserted
            .lock()
            .map_err(|e| e.to_string())?
            .push((destination.to_string(), nodes.to_vec()));
        Ok(())
    }
}

fn store() -> MemoryStore {
    MemoryStore {
        blocks: vec![
            block(1, "template:: greet\nHello ``args.$1``", vec![]),
            block(2, "template:: blank", vec![]),
            destination(),
        ],
        ..Default::default()
    }
}

#[test]
fn invocation_renders_and_persists() {
    let store = store();
    let helpers = Helpers::default();
    let tags = TagTable::default();
    let locks = RenderLocks::new();
    let invocation = Invocation::new(&store, &helpers, &tags, &locks, config());

    let outcome = invocation
        .invoke(&TemplateRef::Name("greet".into()), "block-100", &["World".into()])
        .unwrap();
    let RenderOutcome::Rendered(nodes) = outcome else {
        panic!("expected rendered outcome");
    };
    assert_eq!(contents(&nodes), vec!["Hello World"]);

    let inserted = store.inserted.lock().unwrap();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].0, "block-100");
    assert!(!locks.is_held("block-100"));
}

#[test]
fn invocation_reports_missing_and_empty_templates() {
    let store = store();
    let helpers = Helpers::default();
    let tags = TagTable::default();
    let locks = RenderLocks::new();
    let invocation = Invocation::new(&store, &helpers, &tags, &locks, config());

    let err = invocation
        .invoke(&TemplateRef::Name("nope".into()), "block-100", &[])
        .unwrap_err();
    assert!(matches!(err, InvokeError::NotFound { kind: "template", .. }));

    let outcome = invocation
        .invoke(&TemplateRef::Name("blank".into()), "block-100", &[])
        .unwrap();
    assert_eq!(outcome, RenderOutcome::Empty);
    assert!(store.inserted.lock().unwrap().is_empty());
}

#[test]
fn concurrent_render_into_same_destination_is_skipped() {
    let store = store();
    let helpers = Helpers::default();
    let tags = TagTable::default();
    let locks = RenderLocks::new();
    let invocation = Invocation::new(&store, &helpers, &tags, &locks, config());

    let guard = locks.acquire("block-100").unwrap();
    assert_eq!(guard.key(), "block-100");
    let outcome = invocation
        .invoke(&TemplateRef::Name("greet".into()), "block-100", &[])
        .unwrap();
    assert_eq!(outcome, RenderOutcome::Skipped);
    drop(guard);

    let outcome = invocation
        .invoke(&TemplateRef::Name("greet".into()), "block-100", &[])
        .unwrap();
    assert!(matches!(outcome, RenderOutcome::Rendered(_)));
}
