use clap::Args;

use super::CmdResult;

#[derive(Args)]
pub struct StreakArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: StreakArgs) -> CmdResult {
    let (config, store) = super::open()?;
    let (stats, _) = super::current_stats(&config, &store)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("current: {}", stats.current);
        println!("best: {}", stats.best);
        match stats.last_entry_day {
            Some(day) => println!("last entry: {day}"),
            None => println!("last entry: never"),
        }
    }
    Ok(())
}
