//! `cartographer`: command-line front end for the analysis dashboard.
//!
//! Every subcommand drives the [`Dashboard`] controller, then prints the
//! resulting views. Notices go to stderr and a failed operation exits non-zero.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use cartographer::api::Operation;
use cartographer::store::{Event, NoticeLevel};
use cartographer::table::SortField;
use cartographer::ui_model::SamplingStrategy;
use cartographer_client::{render, AnalysisClient, ApiError, ClientConfig, Dashboard};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cartographer",
    author,
    version,
    about = "Inspect transformer activations, concepts and bias through a NeuroCartographer backend"
)]
struct Cli {
    /// Backend base URL (overrides config and CARTOGRAPHER_API_URL).
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,
    /// Config file to use instead of the one in the user config directory.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read or replace the stored concept library.
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Analyze a query, then run bias analysis, bias scoring and recommendations as configured.
    Analyze(AnalyzeArgs),
    /// Compare two bias concepts for a query.
    Bias {
        query: String,
        #[command(flatten)]
        concepts: ConceptArgs,
    },
    /// Score the selected concepts for bias.
    Score {
        #[command(flatten)]
        concepts: ConceptArgs,
    },
    /// Analyze a query, then generate text grounded in the analysis.
    Rag {
        query: String,
        /// Context file to use instead of the analysis summary.
        #[arg(long, value_name = "FILE")]
        context: Option<PathBuf>,
        #[command(flatten)]
        concepts: ConceptArgs,
    },
    /// Fetch recommendations for a query.
    Recommend { query: String },
    /// Ask the backend to pull an external GitLab repository.
    RepoUpdate { url: String },
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    /// Print the stored library.
    Get,
    /// Replace the library with one concept per line from FILE (`-` for stdin).
    Save { file: String },
}

#[derive(Args, Debug, Default)]
struct ConceptArgs {
    /// Select a concept (repeatable).
    #[arg(long = "concept", value_name = "NAME")]
    concepts: Vec<String>,
    /// Extra comma-separated concepts not in the library.
    #[arg(long, value_name = "A,B")]
    extra: Option<String>,
    /// Mark a selected concept as a bias to compare (exactly two for bias analysis).
    #[arg(long = "bias", value_name = "NAME")]
    biases: Vec<String>,
    /// Load the stored library first (its concepts start selected).
    #[arg(long)]
    from_library: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    query: String,
    /// Model to analyze.
    #[arg(long)]
    model: Option<String>,
    #[command(flatten)]
    concepts: ConceptArgs,
    /// Maximum nodes in the interactive graph (50..=2000, step 50).
    #[arg(long, value_name = "N")]
    max_nodes: Option<u32>,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Case-insensitive filter over token, layer and cluster.
    #[arg(long)]
    filter: Option<String>,
    #[arg(long, value_enum)]
    sort: Option<SortArg>,
    /// Sort ascending (default descending).
    #[arg(long)]
    asc: bool,
    #[arg(long, value_name = "N")]
    page_size: Option<usize>,
    /// 1-based table page.
    #[arg(long, value_name = "N")]
    page: Option<usize>,
    /// Write delivered charts as PNG files into DIR.
    #[arg(long, value_name = "DIR")]
    charts_dir: Option<PathBuf>,
    /// Select the graph node for a table row and show its details.
    #[arg(long, value_name = "LAYER:TOKEN")]
    view: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Top,
    Random,
}

impl From<StrategyArg> for SamplingStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Top => SamplingStrategy::TopByActivation,
            StrategyArg::Random => SamplingStrategy::Random,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Layer,
    TokenIdx,
    Token,
    ActivationScore,
    ClusterId,
}

impl From<SortArg> for SortField {
    fn from(v: SortArg) -> Self {
        match v {
            SortArg::Layer => SortField::Layer,
            SortArg::TokenIdx => SortField::TokenIdx,
            SortArg::Token => SortField::Token,
            SortArg::ActivationScore => SortField::ActivationScore,
            SortArg::ClusterId => SortField::ClusterId,
        }
    }
}

type CliDashboard = Dashboard<AnalysisClient>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }
    let client = AnalysisClient::new(&config.base_url)?;
    info!("Using backend {}", client.base_url());
    let dashboard = Dashboard::new(client, &config);

    let outcome = match cli.command {
        Command::Library { action } => {
            let text = match &action {
                LibraryAction::Get => None,
                LibraryAction::Save { file } => Some(read_input(file)?),
            };
            library(&dashboard, text).await
        }
        Command::Analyze(args) => analyze(&dashboard, args).await,
        Command::Bias { query, concepts } => {
            dashboard.dispatch(Event::QueryChanged(query)).await;
            apply_concepts(&dashboard, &concepts).await;
            let r = dashboard.bias_analysis().await;
            print_state(&dashboard).await;
            r
        }
        Command::Score { concepts } => {
            apply_concepts(&dashboard, &concepts).await;
            let r = dashboard.bias_scoring().await;
            print_state(&dashboard).await;
            r
        }
        Command::Rag {
            query,
            context,
            concepts,
        } => rag(&dashboard, query, context, concepts).await,
        Command::Recommend { query } => {
            let r = dashboard.recommendations(&query).await;
            let s = dashboard.snapshot().await;
            if s.recommendations.is_empty() && r.is_ok() {
                println!("No recommendations.");
            }
            print!("{}", render::recommendation_list(&s.recommendations));
            r
        }
        Command::RepoUpdate { url } => {
            dashboard.dispatch(Event::RepoUrlChanged(url)).await;
            dashboard.repo_update().await
        }
    };

    report_notices(&dashboard).await;
    // Validation failures were already reported as notices.
    outcome.map_err(|e| match e {
        ApiError::Validation(_) => anyhow!("request not sent"),
        other => anyhow!(other).context("backend request failed"),
    })
}

/// `None` prints the stored library; `Some(text)` replaces it.
async fn library(dashboard: &CliDashboard, replacement: Option<String>) -> Result<(), ApiError> {
    match replacement {
        None => {
            dashboard.load_library().await?;
            let s = dashboard.snapshot().await;
            for c in s.concepts.library_concepts() {
                println!("{c}");
            }
            Ok(())
        }
        Some(text) => {
            dashboard.dispatch(Event::LibraryTextChanged(text)).await;
            dashboard.save_library().await
        }
    }
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(file).with_context(|| format!("failed to read {file}"))
    }
}

async fn apply_concepts(dashboard: &CliDashboard, args: &ConceptArgs) {
    if args.from_library {
        // Failure is logged by the controller; the run continues with an empty library.
        let _ = dashboard.load_library().await;
    }
    if let Some(extra) = &args.extra {
        dashboard
            .dispatch(Event::ExtraConceptsChanged(extra.clone()))
            .await;
    }
    for c in &args.concepts {
        let already = dashboard.snapshot().await.concepts.is_selected(c);
        if !already {
            dashboard.dispatch(Event::ConceptToggled(c.clone())).await;
        }
    }
    if !args.biases.is_empty() {
        dashboard
            .dispatch(Event::BiasesChosen(args.biases.clone()))
            .await;
    }
}

async fn analyze(dashboard: &CliDashboard, args: AnalyzeArgs) -> Result<(), ApiError> {
    dashboard.dispatch(Event::QueryChanged(args.query.clone())).await;
    if let Some(model) = &args.model {
        dashboard.dispatch(Event::ModelSelected(model.clone())).await;
    }
    if let Some(n) = args.max_nodes {
        dashboard.dispatch(Event::MaxNodesChanged(n)).await;
    }
    if let Some(strategy) = args.strategy {
        dashboard
            .dispatch(Event::SamplingChanged(strategy.into()))
            .await;
    }
    apply_concepts(dashboard, &args.concepts).await;

    let failed_follow_ups = dashboard.analyze().await?;

    if let Some(filter) = &args.filter {
        dashboard
            .dispatch(Event::TableFilterChanged(filter.clone()))
            .await;
    }
    if let Some(field) = args.sort {
        let field = SortField::from(field);
        if dashboard.snapshot().await.table.sort_field != field {
            dashboard.dispatch(Event::TableSortToggled(field)).await;
        }
    }
    if args.asc {
        let field = dashboard.snapshot().await.table.sort_field;
        dashboard.dispatch(Event::TableSortToggled(field)).await;
    }
    if let Some(size) = args.page_size {
        dashboard.dispatch(Event::TablePageSizeChanged(size)).await;
    }
    for _ in 1..args.page.unwrap_or(1) {
        dashboard.dispatch(Event::TableNextPage).await;
    }
    if let Some(row_ref) = &args.view {
        match parse_row_ref(row_ref) {
            Some((layer, token)) => {
                dashboard
                    .dispatch(Event::RowViewRequested { layer, token })
                    .await;
            }
            None => eprintln!("Ignoring --view {row_ref:?}: expected LAYER:TOKEN"),
        }
    }

    let s = dashboard.snapshot().await;
    print!("{}", render::library(&s.concepts));
    print_state(dashboard).await;
    if let (Some(focus), Some(node)) = (s.pending_focus, &s.selected_neuron) {
        println!(
            "Graph focus: node {} at ({}, {}) zoom {}x over {} ms",
            node.id,
            cartographer::fmt::opt(focus.x),
            cartographer::fmt::opt(focus.y),
            focus.zoom,
            focus.duration_ms
        );
    } else if args.view.is_some() {
        println!("No graph node matches {:?}", args.view.as_deref().unwrap_or_default());
    }

    if let Some(dir) = &args.charts_dir {
        let mut charts = Vec::new();
        if let Some(a) = &s.analysis {
            charts.push(("analysis", a.charts.present()));
        }
        if let Some(b) = &s.bias_analysis {
            charts.push(("bias_analysis", b.charts.present()));
        }
        if let Some(b) = &s.bias_scoring {
            charts.push(("bias_scoring", b.charts.present()));
        }
        for (prefix, set) in charts {
            match render::save_charts(dir, prefix, &set) {
                Ok(paths) => {
                    for p in paths {
                        println!("Wrote {}", p.display());
                    }
                }
                Err(e) => eprintln!("Could not write charts to {}: {}", dir.display(), e),
            }
        }
    }
    // The views above already show what succeeded.
    first_failure(failed_follow_ups)
}

async fn rag(
    dashboard: &CliDashboard,
    query: String,
    context: Option<PathBuf>,
    concepts: ConceptArgs,
) -> Result<(), ApiError> {
    dashboard.dispatch(Event::QueryChanged(query)).await;
    apply_concepts(dashboard, &concepts).await;
    let failed_follow_ups = dashboard.analyze().await?;

    if let Some(path) = context {
        match fs::read_to_string(&path) {
            Ok(text) => dashboard.dispatch(Event::RagInputChanged(text)).await,
            Err(e) => eprintln!("Could not read {}: {}; using the analysis summary", path.display(), e),
        }
    }
    let r = dashboard.rag().await;
    if let Some(out) = dashboard.snapshot().await.rag {
        print!("{}", render::rag(&out));
    }
    r?;
    first_failure(failed_follow_ups)
}

/// A command whose main request succeeded still fails when a follow-up did.
fn first_failure(failed: Vec<(Operation, ApiError)>) -> Result<(), ApiError> {
    match failed.into_iter().next() {
        Some((op, e)) => {
            info!(operation = op.label(), "Reporting follow-up failure");
            Err(e)
        }
        None => Ok(()),
    }
}

async fn print_state(dashboard: &CliDashboard) {
    let s = dashboard.snapshot().await;
    print!("{}", render::dashboard(&s));
    if let (Some(node), Some(a)) = (&s.selected_neuron, &s.analysis) {
        let linked = a
            .interactive_graph
            .links
            .iter()
            .filter(|l| l.source == node.id || l.target == node.id)
            .count();
        println!("Links touching {}: {}", node.display_name(), linked);
    }
}

async fn report_notices(dashboard: &CliDashboard) {
    for n in dashboard.take_notices().await {
        match n.level {
            NoticeLevel::Info => eprintln!("{}", n.message),
            NoticeLevel::Error => eprintln!("! {}", n.message),
        }
    }
}

/// `7:doctor` → (7, "doctor"). The token may itself contain ':'.
fn parse_row_ref(row_ref: &str) -> Option<(i64, String)> {
    let (layer, token) = row_ref.split_once(':')?;
    let layer = layer.trim().parse().ok()?;
    if token.is_empty() {
        return None;
    }
    Some((layer, token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_refs_parse() {
        assert_eq!(parse_row_ref("7:doctor"), Some((7, "doctor".to_string())));
        assert_eq!(parse_row_ref("0::"), Some((0, ":".to_string())));
        assert_eq!(parse_row_ref("x:doctor"), None);
        assert_eq!(parse_row_ref("7:"), None);
        assert_eq!(parse_row_ref("7"), None);
    }

    #[test]
    fn failed_follow_up_fails_the_command() {
        assert!(first_failure(Vec::new()).is_ok());

        let err = first_failure(vec![
            (
                Operation::BiasScoring,
                ApiError::http(422, Some("unknown concept".into())),
            ),
            (Operation::Recommendations, ApiError::http(500, None)),
        ])
        .unwrap_err();
        assert_eq!(err.reason(), "unknown concept");
    }

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "cartographer",
            "--api-url",
            "http://gpu:8000",
            "analyze",
            "She is a doctor.",
            "--concept",
            "male",
            "--concept",
            "female",
            "--bias",
            "male",
            "--bias",
            "female",
            "--sort",
            "token-idx",
            "--asc",
            "--page-size",
            "50",
            "--view",
            "4:doctor",
        ])
        .unwrap();

        assert_eq!(cli.api_url.as_deref(), Some("http://gpu:8000"));
        match cli.command {
            Command::Analyze(a) => {
                assert_eq!(a.concepts.concepts, vec!["male", "female"]);
                assert_eq!(a.concepts.biases.len(), 2);
                assert!(matches!(a.sort, Some(SortArg::TokenIdx)));
                assert!(a.asc);
                assert_eq!(a.page_size, Some(50));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["cartographer", "analyze", "q", "--strategy", "best"]).is_err());
    }
}
