// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use strsim::levenshtein;

/// Returns the candidate with the smallest Levenshtein distance to `word`,
/// provided it is close enough to be a plausible typo.
pub fn closest_match<'a, I>(word: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let limit = (word.chars().count() / 3).max(1);
    let mut best: Option<(&'a str, usize)> = None;
    for candidate in candidates {
        let distance = levenshtein(&word.to_lowercase(), &candidate.to_lowercase());
        if distance > limit {
            continue;
        }
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((candidate, distance)),
        }
    }
    best.map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_typos_only() {
        let keys = ["baud_rate", "tx_pin", "rx_pin"];
        assert_eq!(closest_match("baudrate", keys), Some("baud_rate"));
        assert_eq!(closest_match("tx_pn", keys), Some("tx_pin"));
        assert_eq!(closest_match("frequency", keys), None);
    }
}
