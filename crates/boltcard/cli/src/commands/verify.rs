//! Tap verification

use std::error::Error;

use boltcard_ntag424::{CounterStore, MemoryCounterStore, SunParams, SunVerifier};
use tracing::debug;

use crate::config::Config;
use crate::utils::{KeyArgs, display};

/// Verify a tap URL and check its counter against the last accepted one
///
/// Without explicit keys every card in the config is tried, each with its own
/// configured `last_counter`.
pub fn verify_command(
    config: &Config,
    url: &str,
    keys: &KeyArgs,
    last_counter: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let params = SunParams::from_url(url)?;
    debug!(?params, "Parsed tap");

    let candidates: Vec<(String, _, Option<u32>)> = match keys.key_set(config)? {
        Some(key_set) => {
            let label = keys.card.map_or_else(
                || "command line keys".to_string(),
                |index| config.cards[index].label(index),
            );
            let known = last_counter.or_else(|| keys.card.and_then(|i| config.cards[i].last_counter));
            vec![(label, key_set, known)]
        }
        None => config
            .cards
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                (
                    entry.label(index),
                    entry.key_set(),
                    last_counter.or(entry.last_counter),
                )
            })
            .collect(),
    };
    if candidates.is_empty() {
        return Err("No keys given and no cards in config".into());
    }

    let (matched, info) =
        SunVerifier::new().verify_any(candidates.iter().map(|(_, keys, _)| keys), &params)?;
    let (label, _, known) = &candidates[matched];

    let store = MemoryCounterStore::with_counters(known.map(|counter| (info.uid, counter)));
    store.check_and_advance(&info.uid, info.counter)?;

    println!("{}", display::success("Tap verified"));
    println!(
        "{}",
        display::key_value_box(
            "Tap",
            vec![
                ("Card", label.clone()),
                ("UID", info.uid.to_string()),
                ("Counter", info.counter.to_string()),
            ],
        )
    );
    println!(
        "{}",
        display::info(&format!(
            "Remember last_counter = {} for this card to reject replays",
            info.counter
        ))
    );

    Ok(())
}
