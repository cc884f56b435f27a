use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use nbhist_history::{CellSummary, History};

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// History file written by `nbhist replay`
    pub history: String,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn summary(args: SummaryArgs) -> Result<()> {
    let history = History::load(&args.history)
        .with_context(|| format!("Cannot load history {}", args.history))?;
    let summary = history.summary()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} {} notebook versions, {} runs",
        "📓".bold(),
        summary.notebook_versions,
        summary.runs
    );
    for cell in &summary.cells {
        println!("  {}", describe(&history, cell)?);
    }

    if !summary.deleted.is_empty() {
        println!();
        println!("{}", "Deleted".dimmed());
        for cell in &summary.deleted {
            println!("  {}", describe(&history, cell)?.dimmed());
        }
    }
    Ok(())
}

fn describe(history: &History, cell: &CellSummary) -> Result<String> {
    let label = history.label(&cell.cell.at(0))?;
    let mut line = format!(
        "{:<14} {:<8} {} versions",
        label,
        cell.latest.to_string(),
        cell.versions
    );
    if let Some(outputs) = cell.output_versions {
        line.push_str(&format!(", {outputs} outputs"));
    }
    if cell.staged {
        line.push_str(&format!(" {}", "(edited)".yellow()));
    }
    Ok(line)
}
