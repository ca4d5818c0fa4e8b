mod display;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tariffa_ai::{HeuristicOracle, HttpCompletion, LlmOracle, ReasoningOracle};
use tariffa_core::vocab::keywords;
use tariffa_core::{EngineConfig, NarrowingQuestion, OracleSettings, normalize_code};
use tariffa_duty::{DutyResolver, ProgramTable};
use tariffa_engine::{AnswerRound, ClassifyOutcome, ClassifyRequest, Engine};
use tariffa_store::ingest::{build_nodes, usitc_rows_from_str};
use tariffa_store::{DuckStore, MemoryStore, Taxonomy, TaxonomyRow, TaxonomySearch, TaxonomyStore};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tariffa", version)]
#[command(about = "Classify product descriptions into tariff codes and resolve their duty")]
struct Cli {
    /// Taxonomy: native rows JSON, a USITC HTS JSON export, or a DuckDB file from `import`
    #[arg(long, env = "TARIFFA_TAXONOMY", global = true)]
    taxonomy: Option<PathBuf>,

    /// Trade-remedy program table (JSON keyed by origin)
    #[arg(long, env = "TARIFFA_PROGRAMS", global = true)]
    programs: Option<PathBuf>,

    /// Engine config (TOML)
    #[arg(long, env = "TARIFFA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a product description
    #[command(after_help = "\
Examples:
  tariffa classify 'ceramic coffee mug' --origin CN
  tariffa classify 'ceramic coffee mug' --answer material=Ceramic --json
  tariffa classify 'rubber ring worn on finger' --interactive")]
    Classify {
        description: String,

        /// Material hint
        #[arg(long)]
        material: Option<String>,

        /// Intended-use hint
        #[arg(long = "use")]
        intended_use: Option<String>,

        /// Country of origin (ISO code) for duty programs
        #[arg(long)]
        origin: Option<String>,

        /// One answer round, as attribute=value. Repeatable.
        #[arg(long = "answer", value_name = "ATTR=VALUE", value_parser = parse_answer)]
        answers: Vec<(String, String)>,

        /// Ask narrowing questions on the terminal until settled
        #[arg(long, short)]
        interactive: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        /// Use the keyword heuristics instead of the language model
        #[arg(long)]
        offline: bool,

        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[arg(long, env = "TARIFFA_MODEL")]
        model: Option<String>,
    },

    /// Search taxonomy descriptions
    Search {
        /// Free-text terms
        #[arg(required = true)]
        terms: Vec<String>,

        /// Restrict to codes under this prefix
        #[arg(long)]
        within: Option<String>,

        /// Only classifiable leaves
        #[arg(long)]
        leaves: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one code with its path and children
    Lookup { code: String },

    /// Resolve the duty for a code and origin
    Duty {
        code: String,

        #[arg(long)]
        origin: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Load a JSON taxonomy into a DuckDB file
    Import {
        /// Native rows JSON or USITC HTS JSON export
        source: PathBuf,

        /// Target DuckDB file
        #[arg(long, default_value = "tariffa.duckdb")]
        db: PathBuf,
    },
}

fn parse_answer(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
            Ok((k.trim().to_string(), v.trim().to_string()))
        }
        _ => Err(format!("expected ATTR=VALUE, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Classify {
            description,
            material,
            intended_use,
            origin,
            answers,
            interactive,
            json,
            offline,
            api_key,
            model,
        } => {
            let taxonomy = open_taxonomy(cli.taxonomy.as_deref())?;
            let programs = load_programs(cli.programs.as_deref())?;
            let oracle = build_oracle(offline, api_key, model, &config.oracle);
            let engine = Engine::new(taxonomy, oracle, programs, config)?;

            let mut request = ClassifyRequest {
                description,
                material,
                intended_use,
                origin,
                answers: Vec::new(),
            };
            if !answers.is_empty() {
                request.answers.push(answers.into_iter().collect());
            }
            cmd_classify(&engine, request, interactive, json).await
        }
        Commands::Search {
            terms,
            within,
            leaves,
            limit,
        } => {
            let taxonomy = open_taxonomy(cli.taxonomy.as_deref())?;
            cmd_search(&taxonomy, &terms.join(" "), within.as_deref(), leaves, limit)
        }
        Commands::Lookup { code } => {
            let taxonomy = open_taxonomy(cli.taxonomy.as_deref())?;
            cmd_lookup(&taxonomy, &code)
        }
        Commands::Duty { code, origin, json } => {
            let taxonomy = open_taxonomy(cli.taxonomy.as_deref())?;
            let programs = load_programs(cli.programs.as_deref())?;
            let resolver = DutyResolver::new(taxonomy, programs)?;
            let duty = resolver
                .resolve(&code, origin.as_deref())
                .with_context(|| format!("resolving duty for {code}"))?;
            if json {
                print_json(&duty)?;
            } else {
                display::print_duty_card(&duty);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Import { source, db } => cmd_import(&source, &db),
    }
}

// ── Commands ──

async fn cmd_classify(
    engine: &Engine,
    mut request: ClassifyRequest,
    interactive: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    loop {
        let outcome = engine.classify(&request).await?;
        let questions = outcome.questions().to_vec();
        let rounds_left = request.answers.len() < engine.config().narrowing.max_rounds;

        if interactive && !questions.is_empty() && rounds_left {
            display::print_questions(&questions);
            let round = ask(&questions)?;
            if round.is_empty() {
                eprintln!("No answers given; showing the best result so far.");
            } else {
                request.answers.push(round);
                continue;
            }
        }

        if json {
            print_json(&Envelope {
                generated_at: chrono::Utc::now().to_rfc3339(),
                request: &request,
                outcome: &outcome,
            })?;
        } else {
            display::print_outcome(&outcome);
        }
        return Ok(match outcome {
            ClassifyOutcome::NoMatch { .. } => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        });
    }
}

/// Read one answer per question from stdin. Blank skips; a number picks an option.
fn ask(questions: &[NarrowingQuestion]) -> anyhow::Result<AnswerRound> {
    let stdin = io::stdin();
    let mut round = AnswerRound::new();
    for q in questions {
        print!("{} > ", q.question_text);
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let answer = line.trim();
        if answer.is_empty() {
            continue;
        }
        let value = match answer.parse::<usize>() {
            Ok(n) if (1..=q.options.len()).contains(&n) => q.options[n - 1].clone(),
            _ => answer.to_string(),
        };
        round.insert(q.attribute.clone(), value);
    }
    Ok(round)
}

fn cmd_search(
    taxonomy: &Taxonomy,
    text: &str,
    within: Option<&str>,
    leaves: bool,
    limit: usize,
) -> anyhow::Result<ExitCode> {
    let mut query = TaxonomySearch::terms(keywords(text)).limit(limit);
    if let Some(prefix) = within {
        query = query.within(&normalize_code(prefix)?);
    }
    if leaves {
        query = query.leaves();
    }
    let nodes = taxonomy.store().search(&query)?;
    if nodes.is_empty() {
        eprintln!("No matches.");
        return Ok(ExitCode::FAILURE);
    }
    display::print_node_list(&nodes);
    Ok(ExitCode::SUCCESS)
}

fn cmd_lookup(taxonomy: &Taxonomy, code: &str) -> anyhow::Result<ExitCode> {
    let Some(node) = taxonomy.node(code)? else {
        eprintln!("No node {code}.");
        return Ok(ExitCode::FAILURE);
    };
    let path = taxonomy.path(&node.code)?;
    let children = taxonomy.store().children(&node.code)?;
    display::print_node_card(&node, &path, &children);
    Ok(ExitCode::SUCCESS)
}

fn cmd_import(source: &Path, db: &Path) -> anyhow::Result<ExitCode> {
    let rows = read_taxonomy_rows(source)?;
    let nodes = build_nodes(rows).with_context(|| format!("validating {}", source.display()))?;
    let store = DuckStore::open_persistent(db).with_context(|| format!("opening {}", db.display()))?;
    store.load_nodes(&nodes)?;
    eprintln!("  Imported {} nodes into {}", nodes.len(), db.display());
    Ok(ExitCode::SUCCESS)
}

// ── Setup ──

fn open_taxonomy(path: Option<&Path>) -> anyhow::Result<Arc<Taxonomy>> {
    let path = path.context("no taxonomy given; pass --taxonomy or set TARIFFA_TAXONOMY")?;
    let store: Arc<dyn TaxonomyStore> = match path.extension().and_then(|e| e.to_str()) {
        Some("duckdb" | "db") => {
            let store = DuckStore::open_persistent(path).with_context(|| format!("opening {}", path.display()))?;
            if !store.has_table() {
                bail!("{} has no taxonomy table; run `tariffa import` first", path.display());
            }
            Arc::new(store)
        }
        _ => Arc::new(MemoryStore::from_rows(read_taxonomy_rows(path)?)?),
    };
    info!(path = %path.display(), nodes = store.len()?, "taxonomy loaded");
    Ok(Arc::new(Taxonomy::new(store)))
}

/// Native rows or a USITC export, told apart by the USITC `htsno` key.
fn read_taxonomy_rows(path: &Path) -> anyhow::Result<Vec<TaxonomyRow>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if text.contains("\"htsno\"") {
        Ok(usitc_rows_from_str(&text)?)
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

fn load_programs(path: Option<&Path>) -> anyhow::Result<ProgramTable> {
    match path {
        Some(path) => Ok(ProgramTable::load(path)?),
        None => Ok(ProgramTable::new()),
    }
}

fn build_oracle(
    offline: bool,
    api_key: Option<String>,
    model: Option<String>,
    settings: &OracleSettings,
) -> Arc<dyn ReasoningOracle> {
    match api_key.filter(|k| !offline && !k.trim().is_empty()) {
        Some(key) => {
            let model = model.unwrap_or_else(|| settings.model.clone());
            info!(%model, "using language-model oracle");
            Arc::new(LlmOracle::new(HttpCompletion::new(key, model), settings.clone()))
        }
        None => {
            if !offline {
                warn!("ANTHROPIC_API_KEY not set; using the heuristic oracle");
            }
            Arc::new(HeuristicOracle)
        }
    }
}

// ── Output ──

#[derive(Serialize)]
struct Envelope<'a> {
    generated_at: String,
    request: &'a ClassifyRequest,
    outcome: &'a ClassifyOutcome,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
