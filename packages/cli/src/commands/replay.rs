use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use nbhist_history::{
    CellSource, HistoryError, Identity, LocalParser, NotebookSession, OutputRecord,
    RepairOutcome,
};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Script describing the notebook and the events to replay
    pub script: String,

    /// Where to write the history (defaults to the script name + historySuffix)
    #[arg(short, long)]
    pub output: Option<String>,
}

/// A notebook plus the editor events applied to it, in order
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub cells: Vec<CellSource>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One editor event. `cell` and `index` refer to positions in the live
/// cell list at the time the step runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    Edit {
        cell: usize,
        text: String,
    },
    Run {
        cell: usize,
        #[serde(default)]
        output: Option<OutputRecord>,
    },
    Save,
    Insert {
        index: usize,
        cell: CellSource,
    },
    Delete {
        cell: usize,
    },
    Move {
        from: usize,
        to: usize,
    },
    Switch {
        index: usize,
        cell: CellSource,
    },
}

type Session = NotebookSession<LocalParser>;

pub async fn replay(args: ReplayArgs, config: &Config) -> Result<()> {
    let content = fs::read_to_string(&args.script)
        .with_context(|| format!("Cannot read script {}", args.script))?;
    let script: Script = serde_json::from_str(&content)
        .with_context(|| format!("Invalid script {}", args.script))?;

    println!("{}", "▶ Replaying notebook events...".bright_blue().bold());

    let sources = script.cells.clone();
    let session = NotebookSession::open(LocalParser, script.cells)
        .await
        .map_err(|err| describe_open_error(err, &sources))?;

    for (number, step) in script.steps.into_iter().enumerate() {
        let number = number + 1;
        match apply(&session, &step).await {
            Ok(message) => println!("  {} {:>3} {}", "✓".green(), number, message),
            Err(err) => match err.downcast_ref::<HistoryError>() {
                Some(HistoryError::Parse(parse_error)) => {
                    let text = match &step {
                        Step::Edit { text, .. } => text.as_str(),
                        _ => "",
                    };
                    eprintln!("  {} {:>3} could not update", "⚠".yellow(), number);
                    eprintln!("{}", parse_error.report(&format!("step {number}"), text));
                }
                _ => return Err(err.context(format!("Step {number} failed"))),
            },
        }
    }

    let history = session.into_history();
    let output = args
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| config.history_path(&args.script));
    history.save(&output, config.pretty)?;

    let summary = history.summary()?;
    println!();
    println!(
        "✨ {} {} cells, {} runs, {} notebook versions",
        "Done".green().bold(),
        summary.cells.len(),
        summary.runs,
        summary.notebook_versions
    );
    println!("   Output: {}", output.display());
    Ok(())
}

async fn cell_at(session: &Session, index: usize) -> Result<Identity> {
    session
        .history()
        .await
        .cells()
        .get(index)
        .copied()
        .ok_or_else(|| anyhow!("No cell at index {index}"))
}

async fn apply(session: &Session, step: &Step) -> Result<String> {
    let message = match step {
        Step::Edit { cell, text } => {
            let cell = cell_at(session, *cell).await?;
            let outcome = session.on_cell_edited(cell, text.clone()).await?;
            match outcome {
                RepairOutcome::Unchanged => format!("edit {cell}: unchanged"),
                RepairOutcome::Staged(name) => format!("edit {cell}: staged {name}"),
                RepairOutcome::Discarded => format!("edit {cell}: superseded"),
            }
        }
        Step::Run { cell, output } => {
            let cell = cell_at(session, *cell).await?;
            let (run, name) = session.on_cell_run(cell, output.clone()).await?;
            format!("run {run}: {name}")
        }
        Step::Save => {
            let run = session.on_document_save().await?;
            format!("save {run}")
        }
        Step::Insert { index, cell } => {
            let cell = session.insert_cell(*index, cell.clone()).await?;
            format!("insert {cell} at {index}")
        }
        Step::Delete { cell } => {
            let cell = cell_at(session, *cell).await?;
            session.delete_cell(cell).await?;
            format!("delete {cell}")
        }
        Step::Move { from, to } => {
            session.move_cell(*from, *to).await?;
            format!("move {from} → {to}")
        }
        Step::Switch { index, cell } => {
            let cell = session.switch_cell_type(*index, cell.clone()).await?;
            format!("switch {index} to {cell}")
        }
    };
    Ok(message)
}

fn describe_open_error(err: HistoryError, sources: &[CellSource]) -> anyhow::Error {
    let report = match &err {
        HistoryError::Parse(parse_error) => sources.iter().enumerate().find_map(|(index, cell)| {
            match cell {
                CellSource::Code { source, .. } if nbhist_parser::parse(source).is_err() => {
                    Some(parse_error.report(&format!("cell {index}"), source))
                }
                _ => None,
            }
        }),
        _ => None,
    };
    match report {
        Some(report) => anyhow!("{report}"),
        None => err.into(),
    }
}
