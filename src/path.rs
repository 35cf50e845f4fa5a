// sweep folder structure:
// sweeps/
// \- {sweep-name}/
//    |- sweep.json
//    \- results/
//       |- {label}.log
//       |- {label}_table.json
//       |- {label}_binned_best.json
//       \- {label}_best.json
//
// label is one of icache, dcache, bpred_{kind} or bpred_combined

use anyhow::bail;
use skim::{
    Skim,
    prelude::{SkimItemReader, SkimOptionsBuilder},
};
use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

pub fn get_sweep_dir<P: AsRef<Path>>(sweep_name: P) -> PathBuf {
    PathBuf::from("sweeps").join(sweep_name)
}

pub fn get_sweep_path<P: AsRef<Path>>(sweep_name: P) -> PathBuf {
    get_sweep_dir(sweep_name).join("sweep.json")
}

pub fn get_results_dir<P: AsRef<Path>>(sweep_name: P) -> PathBuf {
    get_sweep_dir(sweep_name).join("results")
}

pub fn get_log_path(results_dir: &Path, label: &str) -> PathBuf {
    results_dir.join(format!("{}.log", label))
}

pub fn get_table_path(results_dir: &Path, label: &str) -> PathBuf {
    results_dir.join(format!("{}_table.json", label))
}

pub fn get_binned_best_path(results_dir: &Path, label: &str) -> PathBuf {
    results_dir.join(format!("{}_binned_best.json", label))
}

pub fn get_best_path(results_dir: &Path, label: &str) -> PathBuf {
    results_dir.join(format!("{}_best.json", label))
}

/// Labels with a saved table under `results_dir`, sorted
pub fn list_labels(results_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut labels = vec![];
    for entry in std::fs::read_dir(results_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(label) = name.to_str().and_then(|n| n.strip_suffix("_table.json")) {
            labels.push(label.to_string());
        }
    }
    labels.sort();
    Ok(labels)
}

fn get_selection(selections: Vec<String>, prompt: &str) -> anyhow::Result<String> {
    if selections.is_empty() {
        bail!("Nothing to choose from for \"{}\"", prompt.trim());
    }

    let options = SkimOptionsBuilder::default()
        .height(String::from("50%"))
        .prompt(prompt.to_string())
        .build()?;

    let input = selections.join("\n");

    let item_reader = SkimItemReader::default();
    let items = item_reader.of_bufread(Cursor::new(input));

    let Some(output) = Skim::run_with(&options, Some(items)) else {
        bail!("Selector exited unexpectedly")
    };
    if output.is_abort {
        bail!("User cancelled the selection")
    }

    match output.selected_items.first() {
        Some(item) => Ok(item.output().to_string()),
        None => bail!("Nothing selected"),
    }
}

pub fn ask_for_sweep_name() -> anyhow::Result<String> {
    let mut names = vec![];
    for entry in std::fs::read_dir(PathBuf::from("sweeps"))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    get_selection(names, "Choose sweep: ")
}

pub fn ask_for_label(results_dir: &Path) -> anyhow::Result<String> {
    get_selection(list_labels(results_dir)?, "Choose sweep result: ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let results = get_results_dir("rv32");
        assert_eq!(results, PathBuf::from("sweeps/rv32/results"));
        assert_eq!(get_sweep_path("rv32"), PathBuf::from("sweeps/rv32/sweep.json"));
        assert_eq!(
            get_binned_best_path(&results, "bpred_gshare"),
            PathBuf::from("sweeps/rv32/results/bpred_gshare_binned_best.json")
        );
    }

    #[test]
    fn test_list_labels() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["icache_table.json", "icache_best.json", "bpred_local_table.json", "icache.log"] {
            std::fs::write(dir.path().join(file), b"{}").unwrap();
        }
        assert_eq!(list_labels(dir.path()).unwrap(), vec!["bpred_local", "icache"]);
    }
}
