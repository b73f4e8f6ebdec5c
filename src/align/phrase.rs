use crate::agent::AgentClient;
use serde::Deserialize;
use tracing::{debug, warn};

/// Subtitle phrase constraints: 2-7 words, at most 35 characters.
pub const MIN_PHRASE_WORDS: usize = 2;
pub const MAX_PHRASE_WORDS: usize = 7;
pub const MAX_PHRASE_CHARS: usize = 35;

/// Conjunctions that mark a natural break point in the fallback splitter.
const BREAK_WORDS: &[&str] = &[
    "and", "or", "but", "so", "because", "when", "if", "while", "although",
];

const PHRASE_SYSTEM_PROMPT: &str = "You are a natural language processing expert. Split the \
given transcript into short natural speech phrases. Each phrase must be a complete semantic \
unit, 2-7 words and at most 35 characters, breaking at natural breath pauses. Never split a \
word. Respond with a JSON object: {\"phrases\": [\"...\"]}.";

#[derive(Debug, Deserialize)]
struct PhraseList {
    phrases: Vec<String>,
}

/// Splits voice-over content into subtitle phrases. Prefers the AI agent;
/// falls back to a deterministic punctuation/conjunction splitter. Either
/// path is post-processed so the constraints hold and no word is dropped.
pub struct PhraseSegmenter {
    agent: AgentClient,
}

impl PhraseSegmenter {
    pub fn new(agent: AgentClient) -> Self {
        Self { agent }
    }

    pub async fn segment(&self, content: &str) -> Vec<String> {
        let content = content.trim();
        if content.is_empty() {
            return Vec::new();
        }

        if self.agent.is_available() {
            let prompt = format!(
                "Split this transcript into natural speech phrases:\n\n\"{}\"",
                content
            );
            match self
                .agent
                .run_json::<PhraseList>(PHRASE_SYSTEM_PROMPT, &prompt)
                .await
            {
                Ok(list) => {
                    let phrases = enforce_constraints(list.phrases);
                    if covers_content(&phrases, content) {
                        debug!("agent produced {} phrases", phrases.len());
                        return phrases;
                    }
                    warn!("agent phrases dropped words, using deterministic splitter");
                }
                Err(e) => {
                    warn!("phrase segmentation agent failed ({}), using fallback", e);
                }
            }
        }

        let phrases = split_fallback(content);
        if phrases.is_empty() || !covers_content(&phrases, content) {
            // Last resort: the whole content as a single phrase.
            return vec![content.to_string()];
        }
        phrases
    }
}

/// Deterministic splitter: clause boundaries at sentence punctuation,
/// commas and leading conjunctions, then words bin-packed under the phrase
/// constraints.
pub fn split_fallback(content: &str) -> Vec<String> {
    let mut clauses: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in content.split_whitespace() {
        let is_break_word = {
            let lowered = word.to_lowercase();
            BREAK_WORDS.contains(&lowered.as_str())
        };
        if is_break_word && !current.is_empty() {
            clauses.push(std::mem::take(&mut current));
        }
        current.push(word);
        if word.ends_with(['.', '!', '?', ',']) {
            clauses.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        clauses.push(current);
    }

    clauses
        .into_iter()
        .flat_map(|clause| pack_words(&clause))
        .collect()
}

/// Greedily pack words into chunks of at most `MAX_PHRASE_WORDS` words and
/// `MAX_PHRASE_CHARS` characters. A dangling single word is merged into the
/// next chunk when it fits, otherwise emitted alone.
pub fn pack_words(words: &[&str]) -> Vec<String> {
    let mut packed = Vec::new();
    let mut remaining: Vec<&str> = words.to_vec();

    while !remaining.is_empty() {
        let mut chunk: Vec<&str> = Vec::new();
        let mut chunk_chars = 0usize;

        while let Some(&next) = remaining.first() {
            if chunk.len() >= MAX_PHRASE_WORDS {
                break;
            }
            let added = next.chars().count() + usize::from(!chunk.is_empty());
            if chunk_chars + added > MAX_PHRASE_CHARS && !chunk.is_empty() {
                break;
            }
            chunk.push(next);
            chunk_chars += added;
            remaining.remove(0);
        }

        if chunk.len() == 1 && !remaining.is_empty() {
            let next_len = remaining[0].chars().count();
            if chunk_chars + next_len + 1 <= MAX_PHRASE_CHARS {
                chunk.push(remaining.remove(0));
            }
        }

        if !chunk.is_empty() {
            packed.push(chunk.join(" "));
        }
    }

    packed
}

/// Re-split any phrase that violates the constraints; well-formed phrases
/// pass through untouched.
pub fn enforce_constraints(phrases: Vec<String>) -> Vec<String> {
    let mut validated = Vec::new();
    for phrase in phrases {
        let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        if phrase.is_empty() {
            continue;
        }
        let word_count = phrase.split_whitespace().count();
        let char_count = phrase.chars().count();
        if (MIN_PHRASE_WORDS..=MAX_PHRASE_WORDS).contains(&word_count)
            && char_count <= MAX_PHRASE_CHARS
        {
            validated.push(phrase);
        } else {
            let words: Vec<&str> = phrase.split_whitespace().collect();
            validated.extend(pack_words(&words));
        }
    }
    validated
}

fn normalize_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect()
}

/// True when the phrases carry exactly the content's words, in order.
pub fn covers_content(phrases: &[String], content: &str) -> bool {
    let phrase_words: Vec<String> = phrases.iter().flat_map(|p| normalize_words(p)).collect();
    phrase_words == normalize_words(content)
}
