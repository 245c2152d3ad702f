use std::path::PathBuf;

use clap::Subcommand;

use super::CmdResult;

#[derive(Subcommand)]
pub enum WidgetAction {
    /// Write the widget state file
    Export {
        /// Override the configured state file
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn run(action: WidgetAction) -> CmdResult {
    match action {
        WidgetAction::Export { path } => {
            let (config, store) = super::open()?;
            let (stats, has_entry_today) = super::current_stats(&config, &store)?;
            let (state, written) = super::write_widget(&config, &stats, has_entry_today, path)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            eprintln!("wrote {}", written.display());
        }
    }
    Ok(())
}
