use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use havn_core::{Entry, EntryStore, StreakStats, Trigger};
use serde::Serialize;

use super::CmdResult;

#[derive(Subcommand)]
pub enum EntryAction {
    /// Write an entry (defaults to today)
    Add {
        /// Day as YYYY-MM-DD
        #[arg(long)]
        day: Option<NaiveDate>,
        /// Entry text
        #[arg(long)]
        text: Option<String>,
        /// Attach a photo file
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Star the entry
        #[arg(long)]
        star: bool,
        #[arg(long)]
        mood: Option<i16>,
        #[arg(long)]
        energy: Option<i16>,
        #[arg(long)]
        weather: Option<i16>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List entries, oldest day first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import entries delivered by another device (JSON array)
    Import {
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct Added<'a> {
    entry: &'a Entry,
    streak: StreakStats,
}

pub fn run(action: EntryAction) -> CmdResult {
    let (config, store) = super::open()?;
    let zone = config.zone();

    match action {
        EntryAction::Add {
            day,
            text,
            photo,
            star,
            mood,
            energy,
            weather,
            tags,
        } => {
            let now = Utc::now();
            let day = day.unwrap_or_else(|| zone.day_of(now));
            let mut entry = Entry::new(day, &zone, now);
            entry.text = text;
            entry.photo = match photo {
                Some(path) => Some(std::fs::read(&path)?),
                None => None,
            };
            entry.is_starred = star;
            entry.mood_score = mood;
            entry.energy_score = energy;
            entry.weather_score = weather;
            entry.tags = tags.into_iter().collect();
            store.save(std::slice::from_ref(&entry))?;

            let outcome = super::pass(&config, &store, Trigger::LocalSave)?;
            let saved = store.get(entry.id)?.unwrap_or(entry);
            let out = Added {
                entry: &saved,
                streak: outcome.stats,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        EntryAction::List { json } => {
            let mut entries = store.fetch_all(None)?;
            entries.sort_by_key(|e| (e.day_key(&zone), e.updated_at));
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No entries.");
            } else {
                for e in &entries {
                    let day = e
                        .day_key(&zone)
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "????-??-??".into());
                    let star = if e.is_starred { "*" } else { " " };
                    let text = e.text.as_deref().unwrap_or("").lines().next().unwrap_or("");
                    let photo = if e.has_photo() { " [photo]" } else { "" };
                    println!("{day} {star} {}  {text}{photo}", e.id);
                }
            }
        }
        EntryAction::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let entries: Vec<Entry> = serde_json::from_str(&content)?;
            store.save(&entries)?;
            let outcome = super::pass(&config, &store, Trigger::RemoteChange)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}
