//! Print saved sweep results as tables
use anyhow::bail;
use clap::Parser;
use cli_table::{Cell, Table, print_stdout};
use hwsweep::{
    AggregatedResult, BinnedBest, RankedBest, SweepTable, ask_for_label, ask_for_sweep_name,
    get_best_path, get_binned_best_path, get_results_dir, get_table_path, list_labels, load_json,
};
use size::Size;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Sweep name under sweeps/, chosen interactively when omitted
    #[arg(short, long)]
    sweep_name: Option<String>,

    /// Result label such as icache or bpred_gshare, chosen interactively when omitted
    #[arg(short, long)]
    label: Option<String>,

    /// Also print every measured configuration
    #[arg(short, long)]
    all: bool,

    /// Print the best configuration of every label instead of one label in detail
    #[arg(long)]
    summary: bool,
}

fn format_size(bytes: u64) -> String {
    Size::from_bytes(bytes).to_string()
}

fn row(result: &AggregatedResult) -> Vec<cli_table::CellStruct> {
    vec![
        format_size(result.size).cell(),
        format!("{:.2} %", result.metric).cell(),
        result.configuration.to_string().cell(),
    ]
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let sweep_name = match args.sweep_name {
        Some(name) => name,
        None => ask_for_sweep_name()?,
    };
    let results_dir = get_results_dir(&sweep_name);

    if args.summary {
        let mut table = vec![];
        for label in list_labels(&results_dir)? {
            let Some(best) = load_json::<RankedBest, _>(get_best_path(&results_dir, &label))? else {
                continue;
            };
            // ascending by metric, the last one is the best
            if let Some(top) = best.iter().last() {
                let mut cells = vec![label.cell()];
                cells.extend(row(top));
                table.push(cells);
            }
        }
        let table = table.table().title(vec![
            "Sweep".cell(),
            "Size".cell(),
            "Metric".cell(),
            "Configuration".cell(),
        ]);
        print_stdout(table)?;
        return Ok(());
    }

    let label = match args.label {
        Some(label) => label,
        None => ask_for_label(&results_dir)?,
    };

    let Some(binned) = load_json::<BinnedBest, _>(get_binned_best_path(&results_dir, &label))?
    else {
        bail!("No binned results for {} in {}", label, results_dir.display());
    };
    println!("Best configuration per size bin:");
    let table: Vec<_> = binned
        .0
        .iter()
        .map(|(bin, result)| {
            let mut cells = vec![format!("<= {}", format_size(*bin)).cell()];
            cells.extend(row(result));
            cells
        })
        .collect();
    let table = table.table().title(vec![
        "Bin".cell(),
        "Size".cell(),
        "Metric".cell(),
        "Configuration".cell(),
    ]);
    print_stdout(table)?;

    if let Some(best) = load_json::<RankedBest, _>(get_best_path(&results_dir, &label))? {
        println!("Best configurations:");
        let table: Vec<_> = best.iter().map(row).collect();
        let table = table
            .table()
            .title(vec!["Size".cell(), "Metric".cell(), "Configuration".cell()]);
        print_stdout(table)?;
    }

    if args.all {
        if let Some(sweep) = load_json::<SweepTable, _>(get_table_path(&results_dir, &label))? {
            println!("All {} configurations:", sweep.len());
            let table: Vec<_> = sweep.results().iter().map(row).collect();
            let table = table
                .table()
                .title(vec!["Size".cell(), "Metric".cell(), "Configuration".cell()]);
            print_stdout(table)?;
        }
    }

    Ok(())
}
