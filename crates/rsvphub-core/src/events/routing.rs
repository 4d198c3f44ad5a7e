//! Topic-exchange routing key matching.
//!
//! Keys are dot-separated words (`rsvp.created`). In binding patterns
//! `*` matches exactly one word and `#` matches zero or more words.

/// Check whether a routing key is well-formed (non-empty words, no wildcards).
pub fn is_valid_routing_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .split('.')
            .all(|word| !word.is_empty() && word != "*" && word != "#")
}

/// Check whether `key` is routed to a queue bound with `pattern`.
pub fn routing_key_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) if word == "*" || word == head => matches_words(rest, tail),
            _ => false,
        },
    }
}
