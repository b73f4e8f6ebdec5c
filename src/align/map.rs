use crate::align::aligner::WordRecord;
use crate::spec::TextOverlay;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Minimum subtitle duration in seconds.
const MIN_SUBTITLE_DURATION: f64 = 0.1;

/// Seconds of display time per word for fallback subtitles.
const FALLBACK_SECS_PER_WORD: f64 = 0.3;

fn normalize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Exact match: the first window of consecutive success-words at or after
/// `cursor` whose tokens equal the phrase's tokens. Returns the window's
/// start index.
fn find_exact_match(tokens: &[String], words: &[&WordRecord], cursor: usize) -> Option<usize> {
    if tokens.is_empty() || cursor + tokens.len() > words.len() {
        return None;
    }
    (cursor..=words.len() - tokens.len()).find(|&i| {
        tokens
            .iter()
            .zip(&words[i..i + tokens.len()])
            .all(|(token, word)| normalize(&word.word).first() == Some(token))
    })
}

/// Flexible match: within the lookahead window, greedily collect words
/// whose form appears in the phrase's multiset. Returns the collected
/// records sorted by start time, or None when fewer than ⌈n/2⌉ were found.
fn find_flexible_match<'a>(
    tokens: &[String],
    words: &[&'a WordRecord],
    cursor: usize,
    max_lookahead: usize,
) -> Option<Vec<&'a WordRecord>> {
    if tokens.is_empty() || cursor >= words.len() {
        return None;
    }

    let window_end = (cursor + max_lookahead).min(words.len());
    let mut budget: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        *budget.entry(token.clone()).or_insert(0) += 1;
    }

    let mut collected = Vec::new();
    for word in &words[cursor..window_end] {
        let Some(form) = normalize(&word.word).into_iter().next() else {
            continue;
        };
        if let Some(count) = budget.get_mut(&form) {
            if *count > 0 {
                *count -= 1;
                collected.push(*word);
            }
        }
    }

    let needed = tokens.len().div_ceil(2);
    if collected.len() >= needed {
        collected.sort_by(|a, b| a.start.total_cmp(&b.start));
        Some(collected)
    } else {
        None
    }
}

/// Map each phrase to a span of aligned words, producing subtitle overlays
/// in transcript reading order. Phrases that cannot be located get a
/// fallback overlay so the transcript is never silently dropped.
pub fn map_phrases_to_words(
    phrases: &[String],
    words: &[WordRecord],
    max_lookahead: usize,
) -> Vec<TextOverlay> {
    let success_words: Vec<&WordRecord> = words.iter().filter(|w| w.is_success()).collect();
    if phrases.is_empty() || success_words.is_empty() {
        return Vec::new();
    }

    let mut overlays: Vec<TextOverlay> = Vec::new();
    let mut cursor = 0usize;

    for phrase in phrases {
        let tokens = normalize(phrase);
        if tokens.is_empty() {
            continue;
        }

        if let Some(start_idx) = find_exact_match(&tokens, &success_words, cursor) {
            let span = &success_words[start_idx..start_idx + tokens.len()];
            let start_time = span[0].start;
            let duration = (span[span.len() - 1].end - start_time).max(MIN_SUBTITLE_DURATION);
            overlays.push(TextOverlay {
                text: phrase.clone(),
                start_time,
                duration,
                is_fallback: false,
            });
            cursor = start_idx + tokens.len();
            continue;
        }

        if let Some(collected) = find_flexible_match(&tokens, &success_words, cursor, max_lookahead)
        {
            debug!(
                "flexible match for '{}' using {}/{} words",
                phrase,
                collected.len(),
                tokens.len()
            );
            let start_time = collected[0].start;
            let end_time = collected
                .iter()
                .map(|w| w.end)
                .fold(f64::NEG_INFINITY, f64::max);
            let duration = (end_time - start_time).max(MIN_SUBTITLE_DURATION);
            overlays.push(TextOverlay {
                text: phrase.clone(),
                start_time,
                duration,
                is_fallback: false,
            });
            cursor = (cursor + (collected.len() / 2).max(1)).min(success_words.len());
            continue;
        }

        // Could not place the phrase; estimate a slot and keep moving so the
        // search never stalls.
        warn!("no aligned span found for phrase '{}'", phrase);
        let start_time = overlays
            .last()
            .map(TextOverlay::end_time)
            .or_else(|| success_words.get(cursor).map(|w| w.start))
            .unwrap_or(0.0);
        overlays.push(TextOverlay {
            text: phrase.clone(),
            start_time,
            duration: (tokens.len() as f64 * FALLBACK_SECS_PER_WORD).max(1.0),
            is_fallback: true,
        });
        cursor = (cursor + 1).min(success_words.len());
    }

    repair_overlaps(&mut overlays);
    overlays
}

/// Clip each subtitle's end to its successor's start. Never reorders.
fn repair_overlaps(overlays: &mut [TextOverlay]) {
    for i in 1..overlays.len() {
        let next_start = overlays[i].start_time;
        let prev = &mut overlays[i - 1];
        if prev.end_time() > next_start {
            prev.duration = (next_start - prev.start_time).max(0.0);
        }
    }
}
