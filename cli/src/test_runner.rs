//! Runner for `.test.md` files: TOML frontmatter between `---` lines, then a
//! graph document to render from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use interpreter::{InvokeError, RenderError, RenderOutcome};
use outline::context::ConfigContext;
use outline::node::forest_to_markdown;
use serde::Deserialize;

use crate::graph::GraphStore;
use crate::session::{Session, parse_template_ref};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Template to render: a name, `page:Name`, or `((uuid))`.
    pub template: String,

    /// Uuid of the destination block.
    pub target: String,

    /// Raw invocation arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Pinned `config.today`, as `yyyy-mm-dd`.
    #[serde(default)]
    pub today: Option<String>,

    /// Expected rendered outline, as Markdown bullets (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected failure; its message must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// If true, the graph document or the template must fail to parse.
    #[serde(default)]
    pub expect_parse_error: bool,
}

/// Split a `.test.md` file into its frontmatter and graph document.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let close = rest
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;
    let frontmatter = rest[..close].trim_end_matches('\r');
    let after = &rest[close + 4..];
    let document = after
        .strip_prefix("\r\n")
        .or_else(|| after.strip_prefix('\n'))
        .unwrap_or(after);

    let config = toml::from_str(frontmatter).map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, document))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("?")
        })
    }
}

/// What a render produced, reduced to what expectations compare against.
enum Run {
    ParseFailed(String),
    Failed(String),
    Output(String),
}

fn render_document(config: &TestConfig, document: &str) -> Result<Run, String> {
    let store = match GraphStore::load(document, 0) {
        Ok(store) => store,
        Err(e) => return Ok(Run::ParseFailed(e.locate(document).to_string())),
    };

    let mut host = ConfigContext::default();
    if let Some(today) = &config.today {
        host.today = today
            .parse::<NaiveDate>()
            .map_err(|e| format!("invalid today '{}': {}", today, e))?;
    }
    host.graph = "test".to_string();

    let session = Session::new(store, host);
    let template = parse_template_ref(&config.template);
    Ok(match session.invoke(&template, &config.target, &config.args) {
        Ok(RenderOutcome::Rendered(nodes)) => Run::Output(forest_to_markdown(&nodes)),
        Ok(RenderOutcome::Empty) => Run::Output(String::new()),
        Ok(RenderOutcome::Skipped) => Run::Failed("render was skipped".to_string()),
        Err(InvokeError::Render(e @ RenderError::Compile { .. })) => {
            Run::ParseFailed(e.to_string())
        }
        Err(e) => Run::Failed(e.to_string()),
    })
}

/// Compare a run against the test's expectations. `None` means pass.
fn check(config: &TestConfig, run: Run) -> Option<String> {
    if config.expect_parse_error {
        return match run {
            Run::ParseFailed(_) => None,
            Run::Failed(e) => Some(format!("expected parse error, got: {}", e)),
            Run::Output(_) => Some("expected parse error, but parsing succeeded".into()),
        };
    }

    match (&config.expect_error, run) {
        (_, Run::ParseFailed(e)) => Some(format!("unexpected parse error: {}", e)),
        (Some(expected), Run::Failed(actual)) => {
            if actual.contains(expected.as_str()) {
                None
            } else {
                Some(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, actual
                ))
            }
        }
        (Some(expected), Run::Output(_)) => Some(format!(
            "expected error containing \"{}\", but rendering succeeded",
            expected
        )),
        (None, Run::Failed(e)) => Some(format!("unexpected error: {}", e)),
        (None, Run::Output(actual)) => {
            let expected = config.expect_output.as_deref()?.trim();
            let actual = actual.trim();
            if actual == expected {
                None
            } else {
                Some(format!(
                    "output mismatch\n  expected:\n{}\n  actual:\n{}",
                    indent(expected),
                    indent(actual)
                ))
            }
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn run_single_test(path: &Path) -> TestResult {
    let result = |description: Option<String>, outcome| TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return result(None, TestOutcome::Fail(format!("cannot read file: {}", e))),
    };
    let (config, document) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return result(None, TestOutcome::Fail(format!("frontmatter error: {}", e))),
    };

    let description = config.description.clone();
    let outcome = match render_document(&config, document) {
        Ok(run) => match check(&config, run) {
            None => TestOutcome::Pass,
            Some(reason) => TestOutcome::Fail(reason),
        },
        Err(reason) => TestOutcome::Fail(reason),
    };
    result(description, outcome)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// `.test.md` files under `root`, grouped by their folder relative to it.
/// Files directly in `root` land in category "".
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".test.md"));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Keep the requested categories and their subfolders.
fn select<'c>(
    all: &'c BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'c str, &'c [PathBuf]> {
    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let nested = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&nested) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                available.join(", ")
            );
        }
    }
    selected
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

struct Report {
    no_color: bool,
    passed: usize,
    failures: Vec<TestResult>,
}

impl Report {
    fn new(no_color: bool) -> Self {
        Report {
            no_color,
            passed: 0,
            failures: Vec::new(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn header(&self, category: &str) {
        eprintln!();
        eprintln!("{}", self.paint(category_label(category), "1"));
    }

    fn record(&mut self, result: TestResult) {
        match result.outcome {
            TestOutcome::Pass => {
                self.passed += 1;
                eprintln!("  {}  {}", self.paint("PASS", "32"), result.label());
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", self.paint("FAIL", "31"), result.label());
                self.failures.push(result);
            }
        }
    }

    /// Print failure details and the summary line; returns the exit code.
    fn finish(self) -> i32 {
        if !self.failures.is_empty() {
            eprintln!();
            eprintln!("failures:");
            for failure in &self.failures {
                eprintln!();
                eprintln!("  --- {} ---", failure.path.display());
                if let TestOutcome::Fail(reason) = &failure.outcome {
                    for line in reason.lines() {
                        eprintln!("  {}", line);
                    }
                }
            }
        }

        eprintln!();
        let failed = self.failures.len();
        if failed == 0 {
            eprintln!(
                "test result: {}. {} passed, 0 failed",
                self.paint("ok", "32"),
                self.passed
            );
            0
        } else {
            eprintln!(
                "test result: {}. {} passed, {} failed (of {})",
                self.paint("FAILED", "31"),
                self.passed,
                failed,
                self.passed + failed
            );
            1
        }
    }
}

/// Run every `.test.md` file under `path`, or `path` itself when it is a
/// file. A non-empty `categories` restricts the run to those folders.
/// Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let mut report = Report::new(no_color);

    if path.is_file() {
        report.record(run_single_test(path));
        return report.finish();
    }

    let all = discover_categorized(path);
    if all.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return 1;
    }
    let selected = if categories.is_empty() {
        all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect()
    } else {
        select(&all, categories)
    };
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    for (category, files) in selected {
        report.header(category);
        for file in files {
            report.record(run_single_test(file));
        }
    }
    report.finish()
}
