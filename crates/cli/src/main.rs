//! `flowcheck` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`      — start the API server.
//! - `migrate`    — run pending database migrations.
//! - `eval-run`   — evaluate a flow run and print the verdict.
//! - `show-graph` — print a flow's structure without evaluating.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::repository::nodes as node_repo;
use db::{DbPool, SqlStorage};
use engine::{layering, EvalOptions, FlowGraph, Orchestrator, RunStatus};
use eval::Evaluator;

mod graph_render;

use graph_render::render_graph;

#[derive(Parser)]
#[command(
    name = "flowcheck",
    about = "End-to-end correctness audits for instrumented business flows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:13370")]
        bind: String,
    },
    /// Run pending database migrations.
    Migrate,
    /// Evaluate a flow run: did its events follow the declared graph?
    EvalRun {
        /// Run to evaluate.
        run_id: String,
        /// Flow the run belongs to.
        flow: String,
        /// Start evaluation from a specific node (subgraph).
        #[arg(long)]
        start_node: Option<String>,
        /// Output the result as JSON.
        #[arg(long)]
        json_output: bool,
        /// Verbose output with per-node execution details.
        #[arg(short, long)]
        verbose: bool,
        /// Show an ASCII graph visualization.
        #[arg(short = 'g', long)]
        show_graph: bool,
    },
    /// Show a flow's graph definition without running an evaluation.
    ShowGraph {
        /// Flow to display; omit to list available flows.
        flow: Option<String>,
        /// Only list node names.
        #[arg(long)]
        nodes_only: bool,
    },
}

fn database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://flowcheck.db".to_string())
}

fn node_eval_timeout() -> Duration {
    std::env::var("FLOWCHECK_NODE_EVAL_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(engine::orchestrator::DEFAULT_NODE_EVAL_TIMEOUT)
}

async fn connect() -> anyhow::Result<DbPool> {
    let pool = db::pool::create_pool(&database_url(), 5).await?;
    db::pool::run_migrations(&pool).await?;
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => {
            let pool = connect().await?;
            let api_key =
                std::env::var("FLOWCHECK_API_KEY").unwrap_or_else(|_| "secret".to_string());
            info!("Starting API server on {bind}");
            let state = api::AppState::new(pool, Evaluator::with_defaults(), api_key);
            api::serve(&bind, state).await?;
        }

        Command::Migrate => {
            connect().await?;
            println!("✓ Migrations completed successfully");
        }

        Command::EvalRun {
            run_id,
            flow,
            start_node,
            json_output,
            verbose,
            show_graph,
        } => {
            let pool = connect().await?;
            let orchestrator = Orchestrator::new(
                Arc::new(SqlStorage::new(pool)),
                Arc::new(Evaluator::with_defaults()),
            );

            let opts = EvalOptions {
                start_node_id: start_node,
                node_eval_timeout: node_eval_timeout(),
                ..EvalOptions::default()
            };

            let output = orchestrator.eval_flow_run(&run_id, &flow, opts).await?;

            if json_output {
                let doc = serde_json::json!({
                    "run_id": run_id,
                    "flow": flow,
                    "status": output.status,
                    "elapsed_ns": output.elapsed_ns,
                    "elapsed_ms": output.elapsed_ns as f64 / 1_000_000.0,
                    "graph": output.graph,
                    "exec_info": output.exec_info,
                    "ev_ids": output.ev_ids,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_human_result(&output, verbose, show_graph);
            }
        }

        Command::ShowGraph { flow, nodes_only } => {
            let pool = connect().await?;

            let Some(flow) = flow else {
                let all = node_repo::list_active_nodes(&pool).await?;
                if all.is_empty() {
                    println!("No flows found in database");
                    return Ok(());
                }
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for def in &all {
                    *counts.entry(def.flow.as_str()).or_default() += 1;
                }
                let mut flows: Vec<_> = counts.into_iter().collect();
                flows.sort();
                println!("Available flows:");
                for (name, count) in flows {
                    println!("  {name} ({count} nodes)");
                }
                return Ok(());
            };

            let defs: Vec<_> = node_repo::get_nodes_by_flow(&pool, &flow)
                .await?
                .into_iter()
                .filter(|d| d.deleted_at.is_none())
                .collect();

            if defs.is_empty() {
                println!("No nodes found for flow: {flow}");
                return Ok(());
            }

            println!("{}", "=".repeat(60));
            println!("Flow: {flow}");
            println!("Nodes: {}", defs.len());
            println!("{}", "=".repeat(60));

            if nodes_only {
                println!("Nodes:");
                for def in &defs {
                    let deps = if def.dep_ids.is_empty() {
                        String::new()
                    } else {
                        format!(" (depends on: {})", def.dep_ids.join(", "))
                    };
                    let type_tag = format!("[{}]", type_name(&def.node_type));
                    println!("  {type_tag:12} {}{deps}", def.id);
                }
                return Ok(());
            }

            let graph = FlowGraph::build(&defs)?;
            let layered = layering::layers(&graph)?;

            println!("Flow Graph:");
            println!("{}", "-".repeat(60));
            let pending: HashMap<String, RunStatus> = defs
                .iter()
                .map(|d| (d.id.clone(), RunStatus::Pending))
                .collect();
            println!("{}", render_graph(&graph.snapshot(), &pending));
            println!("{}", "-".repeat(60));

            println!("\nExecution Layers:");
            for (idx, layer) in layered.iter().enumerate() {
                println!("  Layer {idx}: {}", layer.join(", "));
            }

            println!("\nNode Details:");
            for def in &defs {
                println!("\n  {}:", def.id);
                println!("    Type: {}", type_name(&def.node_type));
                println!("    Source: {}", source_name(&def.source));
                if !def.dep_ids.is_empty() {
                    println!("    Dependencies: {}", def.dep_ids.join(", "));
                }
                if let Some(description) = &def.description {
                    println!("    Description: {description}");
                }
                if let Some(filter) = &def.filter {
                    println!("    Filter: {}", filter.script);
                }
                if let Some(validator) = &def.validator {
                    println!("    Validator: {}", validator.script);
                }
                for condition in &def.conditions {
                    if let Some(timeout_ms) = condition.timeout_ms {
                        println!("    Timeout: {timeout_ms}ms");
                    }
                }
            }
        }
    }

    Ok(())
}

fn type_name(t: &engine::NodeType) -> String {
    serde_json::to_value(t)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn source_name(s: &engine::NodeSource) -> String {
    serde_json::to_value(s)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn print_human_result(output: &engine::BaseEvalOutput, verbose: bool, show_graph: bool) {
    println!("{}", "=".repeat(60));
    println!("Status: {}", output.status.to_string().to_uppercase());
    println!("Elapsed: {:.2}ms", output.elapsed_ns as f64 / 1_000_000.0);
    println!("Events processed: {}", output.ev_ids.len());
    println!("Graph nodes: {}", output.graph.len());
    println!("{}", "=".repeat(60));

    if show_graph {
        let statuses: HashMap<String, RunStatus> = output
            .exec_info
            .iter()
            .map(|i| (i.node_id.clone(), i.status))
            .collect();

        println!("\nFlow Graph:");
        println!("{}", "-".repeat(60));
        println!("{}", render_graph(&output.graph, &statuses));
        println!("{}", "-".repeat(60));
    }

    if verbose {
        println!("\nExecution Details:");
        println!("{}", "-".repeat(60));
        for item in &output.exec_info {
            println!("\nNode: {}", item.node_id);
            println!("  Status: {}", item.status);
            if !item.dep_node_ids.is_empty() {
                println!("  Dependencies: {}", item.dep_node_ids.join(", "));
            }
            if let Some(message) = &item.message {
                println!("  Message: {message}");
            }
            if let Some(error) = &item.error {
                println!("  Error: {error}");
            }
            println!("  Events: {}", item.ev_ids.len());
            println!("  Upstream events: {}", item.upstream_ev_ids.len());
            println!("  Elapsed: {:.2}ms", item.elapsed_ns as f64 / 1_000_000.0);
        }
        println!("{}", "-".repeat(60));
    } else {
        let count = |s: RunStatus| output.exec_info.iter().filter(|i| i.status == s).count();
        let failed = count(RunStatus::Failed) + count(RunStatus::Error) + count(RunStatus::TimedOut);

        println!("Summary:");
        println!("  ✓ Passed: {}", count(RunStatus::Passed));
        if failed > 0 {
            println!("  ✗ Failed: {failed}");
        }
        if count(RunStatus::Skipped) > 0 {
            println!("  ⊘ Skipped: {}", count(RunStatus::Skipped));
        }

        if failed > 0 {
            println!("\nFailed nodes:");
            for item in &output.exec_info {
                if matches!(
                    item.status,
                    RunStatus::Failed | RunStatus::Error | RunStatus::TimedOut
                ) {
                    println!("  - {}", item.node_id);
                    if let Some(error) = item.error.as_deref().or(item.message.as_deref()) {
                        println!("    {error}");
                    }
                }
            }
        }

        println!("\nUse --verbose for detailed execution info");
    }
}
