//! Tempo cache inspection.

use crate::cache::{CacheEntry, TempoCache};
use crate::config::Config;

/// List the cached tempos, slowest first
pub fn cmd_cache(config: &Config) -> anyhow::Result<()> {
    let cache = TempoCache::load(&config.session.cache_path);
    if cache.is_empty() {
        println!("No tempos cached in {:?} yet.", cache.path());
        return Ok(());
    }

    let mut entries: Vec<&CacheEntry> = cache.entries().collect();
    entries.sort_by(|a, b| a.bpm.total_cmp(&b.bpm));

    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    println!("\n{} tracks in {:?}", entries.len(), cache.path());
    Ok(())
}

fn format_entry(entry: &CacheEntry) -> String {
    let title = if entry.name.is_empty() {
        entry.id.as_str()
    } else {
        entry.name.as_str()
    };
    if entry.artists.is_empty() {
        format!("{:>7.1} bpm  {}", entry.bpm, title)
    } else {
        format!(
            "{:>7.1} bpm  {} - {}",
            entry.bpm,
            title,
            entry.artists.join(", ")
        )
    }
}
