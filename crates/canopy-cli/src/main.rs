use anyhow::{Result, bail};
use canopy_api::AppEventPayload;
use canopy_app::{FetchOutcome, RelationshipStore, TreeController, ViewSettings};
use canopy_core::Orientation;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrientationArg {
    Vertical,
    Horizontal,
}

impl From<OrientationArg> for Orientation {
    fn from(value: OrientationArg) -> Self {
        match value {
            OrientationArg::Vertical => Orientation::Vertical,
            OrientationArg::Horizontal => Orientation::Horizontal,
        }
    }
}

/// Lay out a relationship dataset as a tidy tree and print the render graph.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file with parent_item, child_item, sequence_no and level columns
    #[arg(long)]
    csv: PathBuf,

    /// Root to open; defaults to the first root in the dataset
    #[arg(long)]
    root: Option<String>,

    /// JSON view settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    orientation: Option<OrientationArg>,

    /// Children fetched per expansion
    #[arg(long, conflicts_with = "all")]
    page_limit: Option<u32>,

    /// Fetch every child on each expansion
    #[arg(long)]
    all: bool,

    /// Expand every node down to this depth
    #[arg(short, long)]
    depth: Option<u32>,

    /// Node to expand (repeatable)
    #[arg(long)]
    expand: Vec<String>,

    /// Node to load another page for (repeatable)
    #[arg(long)]
    more: Vec<String>,

    /// Node to reveal by expanding the path from the root
    #[arg(long)]
    reveal: Option<String>,
}

fn load_settings(args: &Args) -> Result<ViewSettings> {
    let mut settings = match &args.config {
        Some(path) => ViewSettings::load(path)?,
        None => ViewSettings::default(),
    };
    if let Some(orientation) = args.orientation {
        settings.orientation = orientation.into();
    }
    if args.all {
        settings.page_limit = None;
    } else if args.page_limit.is_some() {
        settings.page_limit = args.page_limit;
    }
    settings.validate()?;
    Ok(settings)
}

fn check(node_id: &str, outcome: FetchOutcome) -> Result<()> {
    match outcome {
        FetchOutcome::Applied(report) => {
            tracing::debug!("{}: {} children added", node_id, report.added.len());
            Ok(())
        }
        FetchOutcome::Failed(err) => bail!("fetching children of {node_id} failed: {err}"),
        FetchOutcome::Missing => bail!("node {node_id} is not in the view"),
        FetchOutcome::Stale => Ok(()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = load_settings(&args)?;
    let store = RelationshipStore::from_csv_path(&args.csv)?;
    tracing::info!(
        "Loaded {} relationships from {:?} ({} roots)",
        store.row_count(),
        args.csv,
        store.roots().len()
    );

    let controller = TreeController::new(Arc::new(store), settings);
    let events = controller.events();

    match &args.root {
        Some(root) => check(root, controller.open_view(root)?)?,
        None => {
            let root = controller.open_first_root()?;
            tracing::info!("Opened first root {}", root);
        }
    }

    if let Some(depth) = args.depth {
        controller.expand_to_depth(depth)?;
    }
    for node_id in &args.expand {
        if !controller.is_expanded(node_id) {
            check(node_id, controller.expand_node(node_id, controller.settings().page_limit)?)?;
        }
    }
    for node_id in &args.more {
        check(node_id, controller.load_more(node_id)?)?;
    }
    if let Some(target) = &args.reveal {
        controller.reveal(target)?;
    }

    for event in events.try_iter() {
        if let AppEventPayload::MergeRejected { node_id, child_ids } = &event {
            tracing::warn!("{} rejected children {:?}", node_id.0, child_ids);
        }
        tracing::debug!("{:?}", event);
    }

    let graph = controller.render()?;
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}
