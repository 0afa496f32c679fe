use proptest::prelude::*;

/// Strategy for generating a single valid path segment
pub fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,11}"
}

/// Strategy for generating registry keys one to four levels deep
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=4)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Strategy for generating stored values, including empty ones
pub fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :/=._-]{0,32}"
}

/// Strategy for generating a sequence of key/value writes
pub fn writes_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((key_strategy(), value_strategy()), 1..12)
}
