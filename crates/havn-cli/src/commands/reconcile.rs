use chrono::Utc;
use clap::Args;
use havn_core::{DayReconciler, DayWindow, EntryStore, Trigger};

use super::CmdResult;

#[derive(Args)]
pub struct ReconcileArgs {
    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,
}

pub fn run(args: ReconcileArgs) -> CmdResult {
    let (config, store) = super::open()?;

    if args.dry_run {
        let now = Utc::now();
        let zone = config.zone();
        let window = config
            .reconcile
            .window_days
            .map(|days| DayWindow::trailing_days(days, now, &zone));
        let entries = store.fetch_all(window.as_ref())?;
        let plan = DayReconciler::new(zone).reconcile(entries, now);
        println!("{}", serde_json::to_string_pretty(&plan.summary)?);
        eprintln!("{} (dry run)", plan.summary.message());
        return Ok(());
    }

    let outcome = super::pass(&config, &store, Trigger::LocalSave)?;
    println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    eprintln!("{}", outcome.summary.message());
    Ok(())
}
