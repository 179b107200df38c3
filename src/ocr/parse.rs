use anyhow::Result;
use regex::Regex;

use crate::coordinate::Coordinate;

/// Coordinate layouts in priority order: (name, pattern).
/// Every pattern captures x, y, z.
const COORDINATE_PATTERNS: [(&str, &str); 7] = [
    (
        "parenthesized",
        r"\(\s*(\d{4})\s*,\s*(\d{4})\s*,\s*(\d{1,2})\s*\)",
    ),
    ("comma", r"\b(\d{4})\s*,\s*(\d{4})\s*,\s*(\d{1,2})\b"),
    ("colon", r"\b(\d{4})\s*:\s*(\d{4})\s*:\s*(\d{1,2})\b"),
    (
        "labeled",
        r"(?i)x\s*[:=]\s*(\d{4})\W*y\s*[:=]\s*(\d{4})\W*z\s*[:=]\s*(\d{1,2})\b",
    ),
    (
        "bracketed",
        r"\[\s*(\d{4})\s*,\s*(\d{4})\s*,\s*(\d{1,2})\s*\]",
    ),
    ("whitespace", r"\b(\d{4})\s+(\d{4})\s+(\d{1,2})\b"),
    // separators dropped by OCR: "(395836446)"
    ("concatenated", r"(?:\(\s*|\b)(\d{4})(\d{4})(\d{1,2})(?:\s*\)|\b)"),
];

/// Digit runs, split into 4-digit groups when no full layout matches.
const DIGIT_RUNS: &str = r"[0-9]+";

/// Parses coordinate text produced by OCR or typed by the user.
#[derive(Debug, Clone)]
pub struct CoordinateParser {
    patterns: Vec<(&'static str, Regex)>,
    digit_runs: Regex,
}

impl CoordinateParser {
    pub fn new() -> Result<Self> {
        let patterns = COORDINATE_PATTERNS
            .iter()
            .map(|&(name, pattern)| Ok((name, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            digit_runs: Regex::new(DIGIT_RUNS)?,
        })
    }

    /// Every coordinate the text could be read as, best first.
    ///
    /// Matches of the layout patterns come first in pattern priority order.
    /// Only if none match, the first two 4-digit groups are paired as
    /// `(x, y)` with `default_z`.
    pub fn candidates(&self, text: &str, default_z: i32) -> Vec<Coordinate> {
        let mut found = Vec::new();
        for (_, re) in &self.patterns {
            for caps in re.captures_iter(text) {
                let nums: Option<Vec<i32>> =
                    (1..=3).map(|i| caps.get(i)?.as_str().parse().ok()).collect();
                if let Some(n) = nums {
                    let c = Coordinate::new(n[0], n[1], n[2]);
                    if !found.contains(&c) {
                        found.push(c);
                    }
                }
            }
        }

        if found.is_empty() {
            let groups = self.digit_groups(text);
            if groups.len() >= 2 {
                found.push(Coordinate::new(groups[0], groups[1], default_z));
            }
        }

        found
    }

    /// First candidate, if any.
    pub fn parse(&self, text: &str, default_z: i32) -> Option<Coordinate> {
        self.candidates(text, default_z).into_iter().next()
    }

    /// Name of the first layout pattern matching the text.
    pub fn matched_layout(&self, text: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(name, _)| *name)
    }

    /// 4-digit groups, left to right. A run of exactly 4 digits is one
    /// group and a run of exactly 8 is two. Runs of any other length are
    /// skipped rather than split.
    pub fn digit_groups(&self, text: &str) -> Vec<i32> {
        let mut groups = Vec::new();
        for run in self.digit_runs.find_iter(text).map(|m| m.as_str()) {
            let halves = match run.len() {
                4 => vec![run],
                8 => vec![&run[..4], &run[4..]],
                _ => continue,
            };
            groups.extend(halves.into_iter().filter_map(|g| g.parse::<i32>().ok()));
        }
        groups
    }

    /// The consecutive pair of 4-digit groups closest to `expected` on both
    /// axes, if its largest axis difference is within `tolerance`.
    pub fn nearest_pair(
        &self,
        text: &str,
        expected: &Coordinate,
        tolerance: i32,
        default_z: i32,
    ) -> Option<Coordinate> {
        self.digit_groups(text)
            .windows(2)
            .map(|pair| Coordinate::new(pair[0], pair[1], default_z))
            .filter(|c| c.max_axis_delta(expected) <= tolerance)
            .min_by_key(|c| c.max_axis_delta(expected))
    }
}

/// Which digit an OCR'd `B` stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BReading {
    Eight,
    Three,
}

/// Replaces letters OCR commonly confuses with digits.
pub fn correct_lookalikes(text: &str, b_reading: BReading) -> String {
    text.chars()
        .map(|c| match c {
            'O' | 'o' | 'Q' | 'D' => '0',
            'l' | 'I' | '|' | 'i' | '!' => '1',
            'Z' | 'z' => '2',
            'E' => '3',
            'A' | 'h' => '4',
            'S' | 's' => '5',
            'G' | 'b' => '6',
            'T' | 't' => '7',
            'B' => match b_reading {
                BReading::Eight => '8',
                BReading::Three => '3',
            },
            'g' | 'q' => '9',
            other => other,
        })
        .collect()
}

/// Corrected readings of the text, `B -> 8` first. The `B -> 3` reading is
/// only included when it differs.
pub fn corrected_readings(text: &str) -> Vec<String> {
    let eight = correct_lookalikes(text, BReading::Eight);
    let three = correct_lookalikes(text, BReading::Three);
    if eight == three {
        vec![eight]
    } else {
        vec![eight, three]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CoordinateParser {
        CoordinateParser::new().unwrap()
    }

    #[test]
    fn test_parse_layouts() {
        let p = parser();
        let expected = Coordinate::new(3958, 3644, 6);
        for text in [
            "(3958,3644,6)",
            "( 3958, 3644, 6 )",
            "3958,3644,6",
            "3958:3644:6",
            "X: 3958 Y: 3644 Z: 6",
            "x:3958, y:3644, z:6",
            "[3958,3644,6]",
            "3958 3644 6",
        ] {
            assert_eq!(p.parse(text, 6), Some(expected), "failed on '{}'", text);
        }
    }

    #[test]
    fn test_layout_priority() {
        let p = parser();
        assert_eq!(p.matched_layout("(3958,3644,6)"), Some("parenthesized"));
        assert_eq!(p.matched_layout("3958:3644:6"), Some("colon"));
        assert_eq!(p.matched_layout("X=3958 Y=3644 Z=6"), Some("labeled"));
        assert_eq!(p.matched_layout("3958 3644 6"), Some("whitespace"));
        assert_eq!(p.matched_layout("no digits here"), None);
    }

    #[test]
    fn test_four_digit_fallback_uses_default_z() {
        let p = parser();
        assert_eq!(p.parse("3958,3644", 6), Some(Coordinate::new(3958, 3644, 6)));
        assert_eq!(p.parse("pos 39583644", 9), Some(Coordinate::new(3958, 3644, 9)));
        assert_eq!(p.parse("3958", 6), None);
        assert_eq!(p.parse("", 6), None);
    }

    #[test]
    fn test_fallback_only_when_no_layout_matches() {
        let p = parser();
        let found = p.candidates("1111 (3958,3644,6)", 6);
        assert_eq!(found, vec![Coordinate::new(3958, 3644, 6)]);
    }

    #[test]
    fn test_candidates_keep_every_match_in_order() {
        let p = parser();
        let found = p.candidates("(3958,3644,6) (4000,4100,7)", 6);
        assert_eq!(
            found,
            vec![Coordinate::new(3958, 3644, 6), Coordinate::new(4000, 4100, 7)]
        );
    }

    #[test]
    fn test_five_digit_runs_are_not_split_by_layouts() {
        let p = parser();
        // 39581 is not a 4-digit field, so the comma layout must not match "9581,"
        assert_eq!(p.matched_layout("39581,3644,6"), None);
    }

    #[test]
    fn test_fallback_ignores_runs_that_are_not_four_digits() {
        let p = parser();
        assert_eq!(p.parse("39581 3644", 6), None);
        assert_eq!(p.digit_groups("39581 3644 123 1024"), vec![3644, 1024]);
        assert_eq!(p.parse("x 39581 3644 1024", 6), Some(Coordinate::new(3644, 1024, 6)));
    }

    #[test]
    fn test_concatenated_layout_keeps_z() {
        let p = parser();
        assert_eq!(p.parse("(395836443)", 6), Some(Coordinate::new(3958, 3644, 3)));
        assert_eq!(p.parse("( 3958364412 )", 6), Some(Coordinate::new(3958, 3644, 12)));
        assert_eq!(p.matched_layout("395836443"), Some("concatenated"));
        // 8 digits have no z and go through the fallback
        assert_eq!(p.matched_layout("(39583644)"), None);
        assert_eq!(p.parse("(39583644)", 6), Some(Coordinate::new(3958, 3644, 6)));
    }

    #[test]
    fn test_correct_lookalikes() {
        assert_eq!(correct_lookalikes("(395B,S6l4,G)", BReading::Eight), "(3958,5614,6)");
        assert_eq!(correct_lookalikes("(395B,S6l4,G)", BReading::Three), "(3953,5614,6)");
        assert_eq!(correct_lookalikes("(OQDo)", BReading::Eight), "(0000)");
    }

    #[test]
    fn test_corrected_readings() {
        assert_eq!(corrected_readings("3958"), vec!["3958".to_string()]);
        assert_eq!(
            corrected_readings("B644"),
            vec!["8644".to_string(), "3644".to_string()]
        );
    }

    #[test]
    fn test_nearest_pair() {
        let p = parser();
        let expected = Coordinate::new(3958, 3644, 6);
        // Garbage between groups breaks every layout pattern
        let text = "12 1234~3960~3640 z";
        assert_eq!(
            p.nearest_pair(text, &expected, 50, 6),
            Some(Coordinate::new(3960, 3640, 6))
        );
        assert_eq!(p.nearest_pair("1234~5678", &expected, 50, 6), None);
    }
}
