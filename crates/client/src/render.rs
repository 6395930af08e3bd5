//! Plain-text views of the dashboard for the terminal.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cartographer::concepts::ConceptSet;
use cartographer::fmt::{self, MISSING};
use cartographer::graph::{self, NeuronDetails};
use cartographer::model::{AnalysisResult, BiasAnalysisResult, BiasScoringResult, ChartImage, RagResult};
use cartographer::recommendation::Recommendation;
use cartographer::store::DashboardState;
use cartographer::table::{self, TableView};
use cartographer::ui_model::{self, Section};
use tracing::warn;

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n== {title} ==");
}

pub fn library(concepts: &ConceptSet) -> String {
    let mut out = String::new();
    heading(&mut out, Section::ConceptVectors.label());
    for c in concepts.available() {
        let mark = if concepts.is_selected(c) { "[x]" } else { "[ ]" };
        let _ = writeln!(out, "{mark} {c}");
    }
    for stale in concepts.stale_selections() {
        let _ = writeln!(out, "[x] {stale} (not in library)");
    }
    if !concepts.biases().is_empty() {
        let _ = writeln!(out, "Biases: {}", concepts.biases().join(" vs "));
    }
    out
}

pub fn analysis(result: &AnalysisResult, view: &TableView) -> String {
    let mut out = String::new();

    heading(&mut out, Section::Results.label());
    let _ = writeln!(out, "Query:   {}", result.query);
    if !result.tokens.is_empty() {
        let _ = writeln!(out, "Tokens:  {}", result.tokens.join(" | "));
    }
    let _ = writeln!(out, "Layers:  {}   Tokens: {}", result.num_layers, result.num_tokens);
    let _ = writeln!(
        out,
        "Highest bias layer: {} (score {})",
        fmt::value(result.highest_bias_layer.as_ref()),
        fmt::score(result.highest_bias_score)
    );

    if !result.tda_features.is_empty() {
        let _ = writeln!(out, "\nTopological features:");
        for (key, value) in &result.tda_features {
            let _ = writeln!(out, "  {}: {}", fmt::title_case_key(key), fmt::tda_value(value));
        }
    }

    let clusters = graph::cluster_summaries(result);
    if !clusters.is_empty() {
        let _ = writeln!(out, "\nClusters:");
        for (id, label, sentence) in clusters {
            let _ = writeln!(out, "  #{id} {label}: \"{sentence}\"");
        }
    }

    if !result.cluster_cav_table.is_empty() {
        let _ = writeln!(out, "\nCluster ↔ concept similarity:");
        for row in &result.cluster_cav_table {
            let _ = writeln!(
                out,
                "  {:>4}  {:<24} {:<16} {}",
                fmt::opt(row.cluster_id),
                row.label.as_deref().unwrap_or(MISSING),
                row.related_concept.as_deref().unwrap_or(MISSING),
                fmt::score(row.similarity_score)
            );
        }
    }

    let sims = result.similarity_rows();
    if !sims.is_empty() {
        let names: Vec<&str> = result.layer_similarities.keys().map(String::as_str).collect();
        let _ = writeln!(out, "\nLayer similarity ({}):", names.join(", "));
        for (layer, values) in sims {
            let cells: Vec<String> = values.into_iter().map(fmt::score).collect();
            let _ = writeln!(out, "  L{layer:<3} {}", cells.join("  "));
        }
    }

    if !result.top_neurons.is_empty() {
        let _ = writeln!(out, "\nTop neurons:");
        for n in &result.top_neurons {
            let _ = writeln!(
                out,
                "  {:>3}. layer {} token {:<12} score {} cluster {}",
                fmt::opt(n.rank),
                fmt::opt(n.layer),
                n.token.as_deref().unwrap_or(MISSING),
                fmt::score(n.activation_score),
                fmt::opt(n.cluster_id)
            );
        }
    }

    out.push_str(&neuron_table(result, view));

    let charts = result.charts.present();
    if !charts.is_empty() {
        let names: Vec<&str> = charts.iter().map(|(name, _)| *name).collect();
        let _ = writeln!(out, "\nCharts: {}", names.join(", "));
    }
    out
}

pub fn neuron_table(result: &AnalysisResult, view: &TableView) -> String {
    let mut out = String::new();
    heading(&mut out, Section::NeuronTable.label());

    let page = table::project(&result.activation_table, view);
    if !view.filter.is_empty() {
        let _ = writeln!(out, "Filter: {:?} ({} rows)", view.filter, page.matching_rows);
    }
    let arrow = |field: table::SortField| {
        if view.sort_field == field {
            match view.direction {
                table::SortDirection::Asc => " ▲",
                table::SortDirection::Desc => " ▼",
            }
        } else {
            ""
        }
    };
    let _ = writeln!(
        out,
        "{:<8} {:<8} {:<16} {:<12} {}",
        format!("Layer{}", arrow(table::SortField::Layer)),
        format!("Index{}", arrow(table::SortField::TokenIdx)),
        format!("Token{}", arrow(table::SortField::Token)),
        format!("Score{}", arrow(table::SortField::ActivationScore)),
        format!("Cluster{}", arrow(table::SortField::ClusterId)),
    );
    for row in &page.rows {
        let _ = writeln!(
            out,
            "{:<8} {:<8} {:<16} {:<12} {}",
            row.layer,
            row.token_idx,
            row.token,
            fmt::score(row.activation_score),
            fmt::opt(row.cluster_id)
        );
    }
    let _ = writeln!(
        out,
        "Page {} of {}",
        if page.total_pages == 0 { 0 } else { page.page + 1 },
        page.total_pages
    );
    out
}

pub fn neuron(details: &NeuronDetails) -> String {
    let mut out = String::new();
    heading(&mut out, "Selected neuron");
    let _ = writeln!(out, "Token:      {}", details.token);
    let _ = writeln!(out, "Layer:      {}", details.layer);
    let _ = writeln!(out, "Cluster:    {}", details.cluster);
    let _ = writeln!(out, "Activation: {}", fmt::score(details.activation));
    let _ = writeln!(out, "Label:      {}", details.cluster_label);
    let _ = writeln!(out, "Example:    {}", details.cluster_description);
    out
}

pub fn bias_analysis(result: &BiasAnalysisResult) -> String {
    let mut out = String::new();
    let (a, b) = (result.bias_name(0), result.bias_name(1));
    heading(&mut out, &format!("{} ({a} vs {b})", Section::BiasAnalysis.label()));

    let s = &result.summary;
    let _ = writeln!(out, "{a} average: {}", fmt::score(s.bias1_avg));
    let _ = writeln!(out, "{b} average: {}", fmt::score(s.bias2_avg));
    let _ = writeln!(out, "Average ratio: {}", fmt::score(s.ratio_avg));
    let _ = writeln!(out, "Most biased layer: {}", fmt::value(s.max_bias_layer.as_ref()));

    if !result.layer_bias_activations.is_empty() {
        let _ = writeln!(out, "\n{:<6} {:<12} {:<12} Ratio", "Layer", a, b);
        for l in &result.layer_bias_activations {
            let _ = writeln!(
                out,
                "{:<6} {:<12} {:<12} {}",
                fmt::opt(l.layer),
                fmt::score(l.bias1_activation),
                fmt::score(l.bias2_activation),
                fmt::score(l.ratio)
            );
        }
    }
    out.push_str(&recommendation_list(&result.recommendations));
    out
}

pub fn bias_scoring(result: &BiasScoringResult) -> String {
    let mut out = String::new();
    heading(&mut out, "Bias Scores");
    let _ = writeln!(
        out,
        "Max: {}   Average: {}",
        fmt::score(result.summary.max_bias_score),
        fmt::score(result.summary.avg_bias_score)
    );

    if !result.bias_scores_detailed.is_empty() {
        let _ = writeln!(out, "\n{:<20} {:<12} {:<12} {:<12} Normalized", "Concept", "Score", "Group 0", "Group 1");
        for row in &result.bias_scores_detailed {
            let concept = row.concept.as_deref().unwrap_or(MISSING);
            let _ = writeln!(
                out,
                "{:<20} {:<12} {:<12} {:<12} {}",
                concept,
                fmt::score(row.bias_score),
                fmt::score(row.group_0_mean),
                fmt::score(row.group_1_mean),
                fmt::score(result.normalized_score(concept))
            );
        }
    }

    if !result.bias_metrics.is_empty() {
        let _ = writeln!(out, "\nMetrics:");
        for (concept, m) in &result.bias_metrics {
            let _ = writeln!(
                out,
                "  {concept}: abs {} rel {} log-ratio {} parity {}",
                fmt::score(m.absolute_difference),
                fmt::score(m.relative_difference),
                fmt::score(m.log_ratio),
                fmt::score(m.statistical_parity)
            );
        }
    }
    out.push_str(&recommendation_list(&result.recommendations));
    out
}

pub fn rag(result: &RagResult) -> String {
    let mut out = String::new();
    heading(&mut out, Section::Rag.label());
    let _ = writeln!(out, "{}", result.generated_text);
    out
}

pub fn recommendation_list(items: &[Recommendation]) -> String {
    let mut out = String::new();
    if items.is_empty() {
        return out;
    }
    heading(&mut out, Section::Recommendations.label());
    for r in items {
        let _ = writeln!(out, "[{}] {}", r.priority.label(), r.title);
        if !r.description.is_empty() {
            let _ = writeln!(out, "    {}", r.description);
        }
        for d in &r.details {
            let _ = writeln!(out, "    - {d}");
        }
    }
    out
}

/// Everything the dashboard currently shows, in section order.
pub fn dashboard(state: &DashboardState) -> String {
    let mut out = String::new();
    let model = ui_model::model_label(&state.model).unwrap_or(state.model.as_str());
    let _ = writeln!(
        out,
        "Model: {model}   Graph: {} nodes, {}",
        state.max_nodes,
        state.sampling.label()
    );

    if let Some(a) = &state.analysis {
        out.push_str(&analysis(a, &state.table));
        let _ = writeln!(
            out,
            "Graph: {} nodes, {} links",
            a.interactive_graph.nodes.len(),
            a.interactive_graph.links.len()
        );
    }
    if let Some(node) = &state.selected_neuron {
        out.push_str(&neuron(&graph::neuron_details(node, state.analysis.as_ref())));
    }
    if let Some(b) = &state.bias_analysis {
        out.push_str(&bias_analysis(b));
    }
    if let Some(s) = &state.bias_scoring {
        out.push_str(&bias_scoring(s));
    }
    if let Some(r) = &state.rag {
        out.push_str(&rag(r));
    }
    out.push_str(&recommendation_list(&state.recommendations));
    out
}

/// Decode every delivered chart into `dir` as `<prefix>_<name>.png`.
/// Charts that fail to decode are skipped with a warning.
pub fn save_charts(
    dir: &Path,
    prefix: &str,
    charts: &[(&'static str, &ChartImage)],
) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (name, chart) in charts {
        match chart.decode() {
            Ok(bytes) => {
                let path = dir.join(format!("{prefix}_{name}.png"));
                fs::write(&path, bytes)?;
                written.push(path);
            }
            Err(e) => warn!("Skipping chart {}: {}", name, e),
        }
    }
    Ok(written)
}
