// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Text cleanup.

use std::sync::LazyLock;

use regex::Regex;

// Emoticons, pictographs, transport symbols, flags and everything else
// outside the basic multilingual plane.
static PICTOGRAPHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "[\u{1F600}-\u{1F64F}\u{1F300}-\u{1F5FF}\u{1F680}-\u{1F6FF}\u{1F1E0}-\u{1F1FF}\u{10000}-\u{10FFFF}]+",
    )
    .expect("pictograph pattern is valid")
});

/// Remove emoji and other pictographs from `text`.
pub fn strip_pictographs(text: &str) -> String {
    PICTOGRAPHS.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_pictographs() {
        assert_eq!(strip_pictographs("Buy milk 🥛"), "Buy milk ");
        assert_eq!(strip_pictographs("🚀 Launch 🇺🇸 day 😀😀"), " Launch  day ");
        assert_eq!(strip_pictographs("plain text"), "plain text");
        assert_eq!(strip_pictographs("café – ✓"), "café – ✓");
        assert_eq!(strip_pictographs(""), "");
    }
}
