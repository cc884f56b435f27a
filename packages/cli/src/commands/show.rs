use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use nbhist_history::History;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// History file written by `nbhist replay`
    pub history: String,

    /// Node name, e.g. `c.0.1` or `s.4.0`
    pub name: String,
}

pub fn show(args: ShowArgs) -> Result<()> {
    let history = History::load(&args.history)
        .with_context(|| format!("Cannot load history {}", args.history))?;
    let node = history.get_str(&args.name)?;
    let name = node.name;

    println!("{} {}", name.to_string().bold(), history.label(&name)?.dimmed());
    if let Some(parent) = node.parent {
        println!("  parent:  {parent}");
    }
    if let Some(right) = node.right {
        println!("  right:   {right}");
    }
    if let Some(created) = node.created {
        println!("  created: {}", created.to_rfc3339());
    }
    if !node.run.is_empty() {
        let runs: Vec<String> = node.run.iter().map(|run| run.to_string()).collect();
        println!("  runs:    {}", runs.join(", "));
    }
    if let Some(prior) = history.prior_version(&name)? {
        println!("  prior:   {}", prior.name);
    }

    println!();
    println!("{}", history.render(&name)?);
    Ok(())
}
