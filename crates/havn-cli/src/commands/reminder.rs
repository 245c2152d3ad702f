use chrono::{Local, Utc};
use clap::Subcommand;
use havn_core::Config;

use super::CmdResult;

#[derive(Subcommand)]
pub enum ReminderAction {
    /// When the daily reminder fires next
    Next,
}

pub fn run(action: ReminderAction) -> CmdResult {
    let config = Config::load()?;
    match action {
        ReminderAction::Next => {
            let schedule = config.reminder_schedule();
            match schedule.next_fire(Utc::now(), &config.zone()) {
                Some(at) => {
                    println!("{}", at.to_rfc3339());
                    eprintln!("local: {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
                }
                None => println!("reminder disabled"),
            }
        }
    }
    Ok(())
}
