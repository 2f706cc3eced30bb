//! Binary entry point for the devtree CLI.
#![forbid(unsafe_code)]

#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use devtree::{
    config::TreeConfig, logging, manifest::Manifest, ElementKind, NodeId, NodeSnapshot, Tree,
};
use serde::Serialize;

use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "devtree",
    version,
    about = "Inspect device trees described by TOML manifests",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "DEVTREE_CONFIG",
        help = "Configuration file (defaults to <config dir>/devtree/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        env = "DEVTREE_LOG",
        help = "Log filter, overrides [logging].level"
    )]
    log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Colour theme for text output"
    )]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print the tree with addresses and links")]
    Show {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },

    #[command(about = "Resolve addresses against the tree")]
    Resolve {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,
    },

    #[command(about = "Check structural invariants of the tree")]
    Verify {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct ShowReport {
    root: String,
    nodes: Vec<NodeSnapshot>,
}

#[derive(Serialize)]
struct Resolution {
    address: String,
    node: Option<NodeId>,
    canonical: Option<String>,
    kind: Option<ElementKind>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    if let Command::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "devtree", &mut io::stdout());
        return Ok(0);
    }

    let config = TreeConfig::load(cli.config.clone())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    logging::init_logging(&level)?;
    let ui = Ui::new(cli.theme);

    match &cli.command {
        Command::Show { manifest } => {
            let tree = load_tree(manifest, &config)?;
            let report = ShowReport {
                root: tree.root_identifier().to_string(),
                nodes: attached_nodes(&tree),
            };
            emit(cli.format, &report, || print_tree(&ui, &tree, &report))?;
            Ok(0)
        }
        Command::Resolve {
            manifest,
            addresses,
        } => {
            let tree = load_tree(manifest, &config)?;
            let resolutions: Vec<Resolution> = addresses
                .iter()
                .map(|address| resolve(&tree, address))
                .collect();
            emit(cli.format, &resolutions, || {
                print_resolutions(&ui, &resolutions)
            })?;
            let unresolved = resolutions.iter().filter(|r| r.node.is_none()).count();
            Ok(if unresolved == 0 { 0 } else { 2 })
        }
        Command::Verify { manifest } => {
            let tree = load_tree(manifest, &config)?;
            let report = tree.verify()?;
            emit(cli.format, &report, || print_verify_text(&ui, &report))?;
            Ok(if report.success { 0 } else { 2 })
        }
        Command::Completions { .. } => Ok(0),
    }
}

fn load_tree(path: &Path, config: &TreeConfig) -> Result<Tree, Box<dyn Error>> {
    let manifest = Manifest::from_path(path)?;
    Ok(manifest.build(config.tree_options())?)
}

fn attached_nodes(tree: &Tree) -> Vec<NodeSnapshot> {
    let root = tree.root();
    std::iter::once(root)
        .chain(tree.descendants(root).unwrap_or_default())
        .filter_map(|id| tree.node(id))
        .collect()
}

fn resolve(tree: &Tree, address: &str) -> Resolution {
    let node = tree.get_element_by_address(address);
    Resolution {
        address: address.to_string(),
        node,
        canonical: node.and_then(|id| tree.address(id).ok()),
        kind: node.and_then(|id| tree.kind(id).ok()),
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_tree(ui: &Ui, tree: &Tree, report: &ShowReport) {
    let mut stack = vec![(tree.root(), 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let Some(node) = report.nodes.iter().find(|n| n.id == id) else {
            continue;
        };
        ui.element(
            depth,
            node.identifier.as_str(),
            &format!("[{}] {}", node.kind, node.address),
        );
        for link in node.links() {
            let target = tree
                .address(link.target())
                .unwrap_or_else(|_| link.target().to_string());
            ui.link(depth + 1, link.identifier().as_str(), &target);
        }
        let children: Vec<NodeId> = node.children().map(|r| r.target()).collect();
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }
}

fn print_resolutions(ui: &Ui, resolutions: &[Resolution]) {
    for resolution in resolutions {
        match (&resolution.node, &resolution.canonical, &resolution.kind) {
            (Some(node), Some(canonical), Some(kind)) => ui.success(&format!(
                "{} => {canonical} ({node}, {kind})",
                resolution.address
            )),
            _ => ui.warn(&format!("{} not found", resolution.address)),
        }
    }
}

fn print_verify_text(ui: &Ui, report: &devtree::VerifyReport) {
    ui.section(
        "Verify",
        [
            ("success", report.success.to_string()),
            ("nodes", report.counts.nodes.to_string()),
            ("child edges", report.counts.child_edges.to_string()),
            ("link edges", report.counts.link_edges.to_string()),
            ("detached", report.counts.detached_roots.to_string()),
        ],
    );
    ui.list(
        "Findings",
        report
            .findings
            .iter()
            .map(|finding| format!("{}: {}", finding.node, finding.message)),
    );
    if report.truncated {
        ui.warn("findings truncated");
    }
}
