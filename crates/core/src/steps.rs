//! Step message normalisation.
//!
//! The service decorates its phase messages with pictograms
//! (`"🔍 Analyzing audio"`, `"✅ Done!"`) and often re-sends an unchanged
//! message alongside a new progress value. Messages are compared after
//! stripping those glyphs so the step log never shows the same step twice
//! in a row.

/// Whether `c` is a pictographic or presentation-only code point.
fn is_decorative(c: char) -> bool {
    matches!(c,
        '\u{1F000}'..='\u{1FAFF}'   // pictographs, emoticons, transport, flags, skin tones
        | '\u{2600}'..='\u{27BF}'   // misc symbols, dingbats
        | '\u{2300}'..='\u{23FF}'   // misc technical (hourglasses, timers)
        | '\u{2B00}'..='\u{2BFF}'   // stars, heavy arrows
        | '\u{FE00}'..='\u{FE0F}'   // variation selectors
        | '\u{200D}'                // zero-width joiner
        | '\u{20E3}'                // combining keycap
        | '\u{E0020}'..='\u{E007F}' // tag sequences
    )
}

/// Strip decorative glyphs and collapse whitespace.
pub fn normalize_message(message: &str) -> String {
    let stripped: String = message.chars().filter(|c| !is_decorative(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Append `message` to `steps` unless its normalised form is empty or equal
/// to the most recent entry. Returns whether a step was appended.
pub fn push_step(steps: &mut Vec<String>, message: &str) -> bool {
    let normalized = normalize_message(message);
    if normalized.is_empty() || steps.last() == Some(&normalized) {
        return false;
    }
    steps.push(normalized);
    true
}
