use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use taxa_amatrix_rs::build_a_matrix;
use taxa_amatrix_rs::error::Result;
use taxa_amatrix_rs::taxtable::parse_feature_table;
use taxa_amatrix_rs::types::AMatrixConfig;

/// Build the taxonomic aggregation tree and A matrix of a feature table
#[derive(Parser, Debug)]
#[command(name = "taxa-amatrix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Taxonomy TSV: feature id followed by kingdom..species (.gz accepted)
    #[arg(short, long)]
    taxonomy: PathBuf,

    /// Where to write the A matrix (dense TSV, nodes x features)
    #[arg(short, long, default_value = "a_matrix.tsv")]
    output: PathBuf,

    /// Also write the tree in Newick format
    #[arg(long)]
    newick: Option<PathBuf>,

    /// Also write the indented tree report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Also write the normalized lineages, one per feature
    #[arg(long)]
    lineages: Option<PathBuf>,

    /// Keep a row for the root node
    #[arg(long)]
    include_root: bool,

    /// Keep internal nodes that have a single child
    #[arg(long)]
    no_collapse: bool,

    /// Separator between lineage segments
    #[arg(long, default_value = "::")]
    delimiter: String,

    /// Label of the root node
    #[arg(long, default_value = "Life")]
    root_label: String,
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg);
    spinner
}

fn run(cli: Cli) -> Result<()> {
    let config = AMatrixConfig::default()
        .with_delimiter(cli.delimiter)
        .with_root_label(cli.root_label)
        .with_root(cli.include_root)
        .with_collapse(!cli.no_collapse);

    // 1. Load the taxonomy
    let bar = spinner("blue", "Reading taxonomy table...");
    let table = parse_feature_table(&cli.taxonomy)?;
    bar.finish_with_message(format!("Read {} feature(s).", table.len()));

    // 2. Lineages, tree and A matrix
    let bar = spinner("green", "Building aggregation tree...");
    let results = build_a_matrix(&table, &config)?;
    let (rows, cols) = results.a_matrix.shape();
    bar.finish_with_message(format!(
        "Tree has {} node(s); A matrix is {} x {}.",
        results.tree.len(),
        rows,
        cols
    ));

    // 3. Outputs
    let bar = spinner("yellow", "Writing output files...");
    let file = fs::File::create(&cli.output)?;
    results.a_matrix.to_tsv(std::io::BufWriter::new(file))?;

    if let Some(path) = &cli.newick {
        fs::write(path, results.get_newick() + "\n")?;
    }
    if let Some(path) = &cli.report {
        fs::write(path, results.get_tree_report())?;
    }
    if let Some(path) = &cli.lineages {
        fs::write(path, results.get_lineages_text())?;
    }
    bar.finish_with_message("Output files created.");

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
