mod graph;
mod session;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use outline::entity::PageEntity;
use outline::node::forest_to_markdown;
use outline::parser::Compiler;
use query::QueryBuilder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use interpreter::{InvokeError, RenderError, RenderOutcome};

use crate::graph::GraphStore;
use crate::session::{Session, load_config, parse_template_ref};

#[derive(Parser)]
#[command(name = "outline", version, about = "Outline template renderer")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template into a block of a graph document
    Render(RenderArgs),

    /// Compile every block of a graph document and report errors
    Check(CheckArgs),

    /// Find pages with a chain of filters
    Query(QueryArgs),

    /// Run .test.md test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Markdown graph document
    graph: PathBuf,

    /// Template: a template name, `page:Name`, or `((uuid))`
    #[arg(short, long)]
    template: String,

    /// Uuid of the destination block
    #[arg(long)]
    target: String,

    /// Host config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the rendered nodes as JSON
    #[arg(long)]
    json: bool,

    /// Template arguments (after --)
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Markdown graph document
    graph: PathBuf,

    /// Print the compiled instructions of every block with tags
    #[arg(long)]
    listing: bool,
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Markdown graph document
    graph: PathBuf,

    /// Filter step, `|` separated: `title|starts with|Proj`, `property|status`,
    /// `value|=|done`, `integer|>|2`, `reference|includes|a,b`, `empty`. Repeatable.
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    /// Only the first match
    #[arg(long, conflicts_with_all = ["random", "sample"])]
    first: bool,

    /// One random match
    #[arg(long, conflicts_with = "sample")]
    random: bool,

    /// Up to N random matches
    #[arg(long)]
    sample: Option<usize>,

    /// Seed for --random and --sample
    #[arg(long)]
    seed: Option<u64>,

    /// Print the query text instead of running it
    #[arg(long)]
    show_query: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Command::Render(args) => do_render(args, color_choice),
        Command::Check(args) => do_check(args, color_choice),
        Command::Query(args) => do_query(args),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Load a graph document, reporting parse errors against its source.
fn load_graph(path: &Path, color_choice: ColorChoice) -> GraphStore {
    let source = read_source(path);
    let mut files = SimpleFiles::new();
    let file_id = files.add(path.display().to_string(), source.clone());
    match GraphStore::load(&source, file_id) {
        Ok(store) => store,
        Err(error) => {
            emit(&files, &error.to_diagnostic(), color_choice);
            process::exit(1);
        }
    }
}

fn emit(files: &SimpleFiles<String, String>, diagnostic: &Diagnostic<usize>, color: ColorChoice) {
    let writer = StandardStream::stderr(color);
    let config = term::Config::default();
    let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, diagnostic);
}

// ---------------------------------------------------------------------------
// render
// ---------------------------------------------------------------------------

fn do_render(args: RenderArgs, color_choice: ColorChoice) {
    let config = match load_config(args.config.as_deref(), &args.graph) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    let store = load_graph(&args.graph, color_choice);
    let session = Session::new(store, config);
    let template = parse_template_ref(&args.template);

    match session.invoke(&template, &args.target, &args.args) {
        Ok(RenderOutcome::Rendered(_)) => {
            let nodes = session.store().inserted(&args.target);
            if args.json {
                match serde_json::to_string_pretty(&nodes) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("error: cannot serialize output: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                print!("{}", forest_to_markdown(&nodes));
            }
        }
        Ok(RenderOutcome::Empty) => {
            eprintln!("warning: template '{}' is empty", template);
        }
        Ok(RenderOutcome::Skipped) => {
            eprintln!("warning: a render into '{}' is already running", args.target);
        }
        Err(error) => {
            report_invoke_error(&error);
            process::exit(1);
        }
    }
}

fn report_invoke_error(error: &InvokeError) {
    eprintln!("error: {}", error);
    if let InvokeError::Render(render) = error {
        let notes = match render {
            RenderError::Compile { source, .. } => source.notes.clone(),
            RenderError::Execution { .. } => Vec::new(),
        };
        for note in notes {
            eprintln!("  = {}", note);
        }
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn do_check(args: CheckArgs, color_choice: ColorChoice) {
    let store = load_graph(&args.graph, color_choice);
    let session = Session::new(store, Default::default());
    let compiler = Compiler::new(session.tags());

    let mut files = SimpleFiles::new();
    let mut failures = 0usize;
    let mut checked = 0usize;

    for block in session.store().blocks() {
        checked += 1;
        let name = format!("{} (({}))", block.page.original_name, block.uuid);
        let file_id = files.add(name.clone(), block.content.clone());
        match compiler.compile(&block.content, file_id) {
            Ok(program) => {
                if args.listing && !program.is_static() {
                    println!("{}", name);
                    print!("{}", program.listing(&block.content));
                }
            }
            Err(error) => {
                failures += 1;
                emit(&files, &error.to_diagnostic(), color_choice);
            }
        }
    }

    info!(checked, failures, "check finished");
    if failures > 0 {
        eprintln!("{} of {} blocks failed to compile", failures, checked);
        process::exit(1);
    }
    eprintln!("ok: {} blocks compiled", checked);
}

// ---------------------------------------------------------------------------
// query
// ---------------------------------------------------------------------------

fn do_query(args: QueryArgs) {
    let store = load_graph(&args.graph, ColorChoice::Never);

    let mut builder = QueryBuilder::pages();
    for step in &args.filters {
        builder = match apply_filter(&builder, step) {
            Ok(next) => next,
            Err(e) => {
                eprintln!("error: filter '{}': {}", step, e);
                process::exit(1);
            }
        };
    }

    if args.show_query {
        println!("{}", builder.query());
        return;
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let result: Result<Vec<PageEntity>, _> = if args.first {
        builder
            .get_first::<PageEntity, _>(&store)
            .map(|p| p.into_iter().collect())
    } else if args.random {
        builder
            .get_random_with::<PageEntity, _, _>(&store, &mut rng)
            .map(|p| p.into_iter().collect())
    } else if let Some(n) = args.sample {
        builder.get_sample_with(&store, n, &mut rng)
    } else {
        builder.execute(&store)
    };

    match result {
        Ok(pages) => {
            for page in pages {
                println!("{}", page.original_name);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Apply one `kind|operator|value` step to `builder`.
fn apply_filter(builder: &QueryBuilder, step: &str) -> Result<QueryBuilder, String> {
    let parts: Vec<&str> = step.split('|').map(str::trim).collect();
    let result = match parts.as_slice() {
        ["title", op, text] => builder.title(op, text),
        ["namespace", ns] => builder.namespace(ns),
        ["inner namespace" | "inner_namespace", ns] => builder.inner_namespace(ns),
        ["property", name] => Ok(builder.property(name)),
        ["empty"] => builder.empty(),
        ["non empty" | "non_empty"] => builder.non_empty(),
        ["integer", op, value] => builder.integer(op, value),
        ["value", op, text] => builder.value(op, text),
        ["reference", op, names] => {
            let names: Vec<&str> = names.split(',').collect();
            builder.reference(op, &names)
        }
        _ => return Err("unrecognized filter step".to_string()),
    };
    result.map_err(|e| e.to_string())
}
