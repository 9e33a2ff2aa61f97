//! Demo data for the in-memory record store.
//!
//! Every campaign gets a brand of its own and five fresh events. Titles and
//! bodies are picked from a fixed word list, so the same seed count always
//! yields the same catalogue.

use pennant_storage::InMemoryRecordStore;

/// Events created per seeded campaign.
pub const EVENTS_PER_CAMPAIGN: i64 = 5;

const WORDS: &[&str] = &[
    "spring", "launch", "summit", "harbor", "signal", "orbit", "meadow", "ember", "vector",
    "canyon", "lantern", "pulse", "atlas", "drift", "quartz", "beacon",
];

const BRANDS: &[&str] = &[
    "Acme", "Globex", "Initech", "Umbrella", "Hooli", "Vandelay", "Stark", "Wayne",
];

fn phrase(seed: i64, words: usize) -> String {
    let mut state = seed as u64;
    let mut out = Vec::with_capacity(words);
    for _ in 0..words {
        // xorshift, so neighbouring seeds do not share prefixes
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push(WORDS[(state % WORDS.len() as u64) as usize]);
    }
    out.join(" ")
}

fn sentence(seed: i64) -> String {
    let mut text = phrase(seed, 4);
    if let Some(first) = text.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    text.push('.');
    text
}

/// Seed `campaigns` campaigns with ids `1..=campaigns`.
///
/// Campaign `n` uses brand `n` and owns events
/// `(n - 1) * EVENTS_PER_CAMPAIGN + 1 ..= n * EVENTS_PER_CAMPAIGN`.
pub fn seed_demo_data(store: &InMemoryRecordStore, campaigns: i64) {
    for n in 1..=campaigns {
        let brand = BRANDS[(n as usize - 1) % BRANDS.len()];
        store.insert_brand(n, format!("{} {}", brand, n));
        store.insert_campaign(n, n, sentence(n), phrase(n * 31, 12));

        for offset in 1..=EVENTS_PER_CAMPAIGN {
            let event_id = (n - 1) * EVENTS_PER_CAMPAIGN + offset;
            store.insert_event(event_id, sentence(event_id * 7 + 3), phrase(event_id * 17, 12));
            store.link_event(n, event_id);
        }
    }
    tracing::info!(campaigns, events = campaigns * EVENTS_PER_CAMPAIGN, "Seeded demo data");
}
