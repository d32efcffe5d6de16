use outline::context::PageContext;
use outline::entity::{PageEntity, PropertyValue};
use query::{Query, QueryBuilder, QueryError, QueryStore, StoreError, TextFilter, TextOp, sample};
use rand::SeedableRng;
use rand::rngs::StdRng;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn page(id: i64, title: &str, properties: &[(&str, &str)]) -> PageEntity {
    PageEntity {
        id,
        uuid: format!("page-{}", id),
        name: title.to_lowercase(),
        original_name: title.to_string(),
        journal_day: None,
        properties: properties
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::parse(v)))
            .collect(),
    }
}

struct Pages(Vec<PageEntity>);

impl QueryStore for Pages {
    fn pages(&self, query: &Query) -> Result<Vec<PageEntity>, StoreError> {
        Ok(self.0.iter().filter(|p| query.matches(p)).cloned().collect())
    }
}

struct Broken;

impl QueryStore for Broken {
    fn pages(&self, _query: &Query) -> Result<Vec<PageEntity>, StoreError> {
        Err("connection lost".into())
    }
}

fn graph() -> Pages {
    Pages(vec![
        page(1, "Projects/Alpha", &[("status", "done"), ("priority", "3"), ("tags", "[[rust]], [[cli]]")]),
        page(2, "Projects/Beta", &[("status", ""), ("priority", "1"), ("tags", "[[rust]]")]),
        page(3, "Projects/Alpha/Notes", &[("status", "draft")]),
        page(4, "Journal", &[]),
        page(5, "Proposals", &[("status", "done"), ("priority", "high")]),
    ])
}

fn titles(pages: Vec<PageEntity>) -> Vec<String> {
    pages.into_iter().map(|p| p.original_name).collect()
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

#[test]
fn title_property_value_chain() {
    let builder = QueryBuilder::pages()
        .title("starts with", "Proj")
        .unwrap()
        .property("status")
        .value("=", "done")
        .unwrap();
    assert_eq!(builder.len(), 3);

    let text = builder.query().text;
    assert!(text.starts_with(
        "[:find (pull ?p [*]) :where [?p :block/name ?name] [?p :block/original-name ?title]"
    ));
    assert!(text.ends_with(']'));

    let title = text
        .find("[(clojure.string/starts-with? ?title \"Proj\")]")
        .unwrap();
    let property = text.find("[(get ?props :status) ?prop-status]").unwrap();
    let value = text.find("[(= ?prop-status-text \"done\")]").unwrap();
    assert!(title < property && property < value);
}

#[test]
fn value_filters_need_a_property() {
    let base = QueryBuilder::pages().title("=", "Home").unwrap();

    for _ in 0..2 {
        let err = base.clone().value("=", "x").unwrap_err();
        assert!(matches!(err, QueryError::MissingProperty { filter: "value" }));
    }
    assert!(matches!(
        base.empty().unwrap_err(),
        QueryError::MissingProperty { filter: "empty" }
    ));
    assert!(matches!(
        base.reference("includes", &["a"]).unwrap_err(),
        QueryError::MissingProperty { filter: "reference" }
    ));
    assert_eq!(base.len(), 1);
    assert_eq!(base.focus(), None);
}

#[test]
fn builders_do_not_share_state() {
    let base = QueryBuilder::pages().property("status");
    let empty = base.empty().unwrap();
    let filled = base.non_empty().unwrap();

    assert_eq!(base.len(), 1);
    assert_eq!(empty.len(), 2);
    assert_eq!(filled.len(), 2);
    assert!(empty.query().text.contains("[(= ?prop-status-text \"\")]"));
    assert!(filled.query().text.contains("[(not= ?prop-status-text \"\")]"));
}

#[test]
fn reselecting_a_property_adds_nothing() {
    let builder = QueryBuilder::pages()
        .property("status")
        .property("priority")
        .property("Status");
    assert_eq!(builder.len(), 2);
    assert_eq!(builder.focus(), Some("status"));
}

#[test]
fn operator_and_integer_errors() {
    let base = QueryBuilder::pages().property("priority");
    assert!(matches!(
        base.integer(">", "high").unwrap_err(),
        QueryError::InvalidInteger(v) if v == "high"
    ));
    assert!(matches!(
        base.integer("~", "1").unwrap_err(),
        QueryError::UnknownOperator { kind: "integer", .. }
    ));
    assert!(matches!(
        base.value("sounds like", "x").unwrap_err(),
        QueryError::UnknownOperator { kind: "text", .. }
    ));
    assert!(matches!(
        base.value("regex", "(").unwrap_err(),
        QueryError::InvalidPattern(_)
    ));
    assert_eq!(base.len(), 1);
}

#[test]
fn text_filter_names() {
    let parsed: TextFilter = "not starts with".parse().unwrap();
    assert_eq!(parsed, TextFilter::not(TextOp::StartsWith));
    let parsed: TextFilter = "!=".parse().unwrap();
    assert_eq!(parsed, TextFilter::not(TextOp::Equals));
    let parsed: TextFilter = "Includes".parse().unwrap();
    assert_eq!(parsed, TextFilter::new(TextOp::Includes));
}

#[test]
fn negated_filters_wrap_in_not() {
    let text = QueryBuilder::pages()
        .title("not includes", "draft")
        .unwrap()
        .query()
        .text;
    assert!(text.contains("(not [(clojure.string/includes? ?title \"draft\")])"));
}

#[test]
fn integer_clause() {
    let text = QueryBuilder::pages()
        .property("priority")
        .integer(">=", "2")
        .unwrap()
        .query()
        .text;
    assert!(text.contains("[(parse-long ?prop-priority-text) ?int-1] [(>= ?int-1 2)]"));
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

#[test]
fn namespaces() {
    let store = graph();
    let all: Vec<PageEntity> = QueryBuilder::pages()
        .namespace("Projects")
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(
        titles(all),
        ["Projects/Alpha", "Projects/Beta", "Projects/Alpha/Notes"]
    );

    let inner: Vec<PageEntity> = QueryBuilder::pages()
        .inner_namespace("projects/")
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(titles(inner), ["Projects/Alpha", "Projects/Beta"]);
}

#[test]
fn property_filters() {
    let store = graph();
    let done: Vec<PageEntity> = QueryBuilder::pages()
        .title("starts with", "Pro")
        .unwrap()
        .property("status")
        .value("=", "done")
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(titles(done), ["Projects/Alpha", "Proposals"]);

    let blank: Vec<PageEntity> = QueryBuilder::pages()
        .property("status")
        .empty()
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(titles(blank), ["Projects/Beta"]);

    // "high" does not parse, so Proposals drops out
    let urgent: Vec<PageEntity> = QueryBuilder::pages()
        .property("priority")
        .integer(">", "2")
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(titles(urgent), ["Projects/Alpha"]);
}

#[test]
fn reference_filters() {
    let store = graph();
    let any: Vec<PageEntity> = QueryBuilder::pages()
        .property("tags")
        .reference("includes", &["[[Rust]]"])
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(titles(any), ["Projects/Alpha", "Projects/Beta"]);

    let only: Vec<PageEntity> = QueryBuilder::pages()
        .property("tags")
        .reference("includes only", &["rust"])
        .unwrap()
        .execute(&store)
        .unwrap();
    assert_eq!(titles(only), ["Projects/Beta"]);
}

#[test]
fn results_wrap_into_page_snapshots() {
    let store = graph();
    let first: Option<PageContext> = QueryBuilder::pages()
        .title("=", "Journal")
        .unwrap()
        .get_first(&store)
        .unwrap();
    let first = first.unwrap();
    assert_eq!(first.name, "Journal");
    assert_eq!(first.key, "journal");
}

#[test]
fn store_failures_surface() {
    let err = QueryBuilder::pages()
        .execute::<PageEntity, _>(&Broken)
        .unwrap_err();
    assert!(matches!(err, QueryError::Store(_)));
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

#[test]
fn sample_is_bounded_by_the_pool() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut pool: Vec<u32> = (0..10).collect();
    sample(&mut pool, 3, &mut rng);
    assert_eq!(pool.len(), 3);
    let mut seen = pool.clone();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
    assert!(pool.iter().all(|n| *n < 10));
}

#[test]
fn oversized_sample_is_a_permutation() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut pool: Vec<u32> = (0..6).collect();
    sample(&mut pool, 20, &mut rng);
    let mut sorted = pool.clone();
    sorted.sort();
    assert_eq!(sorted, (0..6).collect::<Vec<_>>());
}

#[test]
fn random_pages() {
    let store = graph();
    let mut rng = StdRng::seed_from_u64(1);
    let projects = QueryBuilder::pages().namespace("projects").unwrap();

    let picked: Option<PageEntity> = projects.get_random_with(&store, &mut rng).unwrap();
    assert!(picked.unwrap().name.starts_with("projects/"));

    let sampled: Vec<PageEntity> = projects.get_sample_with(&store, 5, &mut rng).unwrap();
    assert_eq!(sampled.len(), 3);

    let none: Option<PageEntity> = QueryBuilder::pages()
        .title("=", "Missing")
        .unwrap()
        .get_random_with(&store, &mut rng)
        .unwrap();
    assert!(none.is_none());
}
