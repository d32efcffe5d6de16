use std::collections::BTreeSet;
use std::fmt;

use outline::context::NAMESPACE_SEPARATOR;
use outline::entity::PageEntity;
use rand::Rng;
use tracing::debug;

use crate::error::{QueryError, StoreError};
use crate::filter::{Field, Filter, IntOp, RefOp, TextFilter, TextOp, TextTest, property_key};
use crate::sample::sample;

const PREAMBLE: &str =
    "[:find (pull ?p [*]) :where [?p :block/name ?name] [?p :block/original-name ?title]";

/// A finished page query: the query text and the filters it was built from.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub filters: Vec<Filter>,
}

impl Query {
    /// Whether `page` passes every filter.
    pub fn matches(&self, page: &PageEntity) -> bool {
        self.filters.iter().all(|f| f.matches(page))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Something that can run a page query.
pub trait QueryStore {
    fn pages(&self, query: &Query) -> Result<Vec<PageEntity>, StoreError>;
}

/// A page query under construction.
///
/// Every method returns a new builder and leaves the receiver untouched, so
/// a partial chain can be reused as the base of several queries.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    filters: Vec<Filter>,
    bound: BTreeSet<String>,
    /// The property the next value filter applies to.
    focus: Option<String>,
}

impl QueryBuilder {
    pub fn pages() -> Self {
        QueryBuilder::default()
    }

    /// Number of fragment groups so far.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The property selected by the last `property(..)` call.
    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    fn with(&self, filter: Filter) -> Self {
        let mut next = self.clone();
        next.filters.push(filter);
        next
    }

    fn focused(&self, filter: &'static str) -> Result<String, QueryError> {
        self.focus
            .clone()
            .ok_or(QueryError::MissingProperty { filter })
    }

    // -----------------------------------------------------------------------
    // Page filters
    // -----------------------------------------------------------------------

    pub fn title(&self, filter: &str, text: &str) -> Result<Self, QueryError> {
        let test = TextTest::new(filter.parse()?, text)?;
        Ok(self.with(Filter::Text {
            field: Field::Title,
            test,
        }))
    }

    /// Pages anywhere below `namespace`.
    pub fn namespace(&self, namespace: &str) -> Result<Self, QueryError> {
        let pattern = format!(
            "^{}{}",
            regex::escape(&namespace_key(namespace)),
            NAMESPACE_SEPARATOR
        );
        self.name_pattern(&pattern)
    }

    /// Pages directly inside `namespace`, one level down.
    pub fn inner_namespace(&self, namespace: &str) -> Result<Self, QueryError> {
        let pattern = format!(
            "^{}{sep}[^{sep}]+$",
            regex::escape(&namespace_key(namespace)),
            sep = NAMESPACE_SEPARATOR
        );
        self.name_pattern(&pattern)
    }

    fn name_pattern(&self, pattern: &str) -> Result<Self, QueryError> {
        let test = TextTest::new(TextFilter::new(TextOp::Regex), pattern)?;
        Ok(self.with(Filter::Text {
            field: Field::Name,
            test,
        }))
    }

    // -----------------------------------------------------------------------
    // Property filters
    // -----------------------------------------------------------------------

    /// Select `name` as the property later value filters apply to.
    /// Selecting an already bound property adds no fragment.
    pub fn property(&self, name: &str) -> Self {
        let key = property_key(name);
        let mut next = if self.bound.contains(&key) {
            self.clone()
        } else {
            let mut next = self.with(Filter::Property(key.clone()));
            next.bound.insert(key.clone());
            next
        };
        next.focus = Some(key);
        next
    }

    pub fn empty(&self) -> Result<Self, QueryError> {
        let property = self.focused("empty")?;
        Ok(self.with(Filter::Empty(property)))
    }

    pub fn non_empty(&self) -> Result<Self, QueryError> {
        let property = self.focused("non empty")?;
        Ok(self.with(Filter::NonEmpty(property)))
    }

    pub fn integer(&self, op: &str, value: &str) -> Result<Self, QueryError> {
        let property = self.focused("integer")?;
        let op: IntOp = op.parse()?;
        let value = value
            .trim()
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidInteger(value.to_string()))?;
        Ok(self.with(Filter::Integer {
            property,
            op,
            value,
        }))
    }

    pub fn value(&self, filter: &str, text: &str) -> Result<Self, QueryError> {
        let property = self.focused("value")?;
        let test = TextTest::new(filter.parse()?, text)?;
        Ok(self.with(Filter::Text {
            field: Field::Property(property),
            test,
        }))
    }

    pub fn reference<S: AsRef<str>>(&self, op: &str, names: &[S]) -> Result<Self, QueryError> {
        let property = self.focused("reference")?;
        let op: RefOp = op.parse()?;
        let mut unique = Vec::with_capacity(names.len());
        for name in names {
            let name = name
                .as_ref()
                .trim()
                .trim_start_matches("[[")
                .trim_end_matches("]]")
                .to_lowercase();
            if !name.is_empty() && !unique.contains(&name) {
                unique.push(name);
            }
        }
        Ok(self.with(Filter::Reference {
            property,
            op,
            names: unique,
        }))
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// The query text: preamble, then each fragment group in order.
    pub fn query(&self) -> Query {
        let mut text = String::from(PREAMBLE);
        for (i, filter) in self.filters.iter().enumerate() {
            text.push(' ');
            text.push_str(&filter.clause(i));
        }
        text.push(']');
        Query {
            text,
            filters: self.filters.clone(),
        }
    }

    pub fn execute<T, S>(&self, store: &S) -> Result<Vec<T>, QueryError>
    where
        T: From<PageEntity>,
        S: QueryStore + ?Sized,
    {
        Ok(self.fetch(store)?.into_iter().map(T::from).collect())
    }

    pub fn get_first<T, S>(&self, store: &S) -> Result<Option<T>, QueryError>
    where
        T: From<PageEntity>,
        S: QueryStore + ?Sized,
    {
        Ok(self.fetch(store)?.into_iter().next().map(T::from))
    }

    pub fn get_random<T, S>(&self, store: &S) -> Result<Option<T>, QueryError>
    where
        T: From<PageEntity>,
        S: QueryStore + ?Sized,
    {
        self.get_random_with(store, &mut rand::thread_rng())
    }

    pub fn get_random_with<T, S, R>(&self, store: &S, rng: &mut R) -> Result<Option<T>, QueryError>
    where
        T: From<PageEntity>,
        S: QueryStore + ?Sized,
        R: Rng + ?Sized,
    {
        Ok(self.get_sample_with(store, 1, rng)?.into_iter().next())
    }

    pub fn get_sample<T, S>(&self, store: &S, n: usize) -> Result<Vec<T>, QueryError>
    where
        T: From<PageEntity>,
        S: QueryStore + ?Sized,
    {
        self.get_sample_with(store, n, &mut rand::thread_rng())
    }

    pub fn get_sample_with<T, S, R>(
        &self,
        store: &S,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<T>, QueryError>
    where
        T: From<PageEntity>,
        S: QueryStore + ?Sized,
        R: Rng + ?Sized,
    {
        let mut pool = self.fetch(store)?;
        sample(&mut pool, n, rng);
        Ok(pool.into_iter().map(T::from).collect())
    }

    fn fetch<S: QueryStore + ?Sized>(&self, store: &S) -> Result<Vec<PageEntity>, QueryError> {
        let query = self.query();
        debug!(query = %query, "running page query");
        let pages = store.pages(&query).map_err(QueryError::Store)?;
        debug!(found = pages.len(), "page query finished");
        Ok(pages)
    }
}

fn namespace_key(namespace: &str) -> String {
    namespace
        .trim()
        .trim_end_matches(NAMESPACE_SEPARATOR)
        .to_lowercase()
}
