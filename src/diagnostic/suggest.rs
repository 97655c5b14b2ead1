//! "Did you mean" hints for misspelled enumerants.

use std::fmt::Write as _;

/// Candidates further than this from the input aren't suggested.
const MAX_DISTANCE: usize = 5;

/// Levenshtein edit distance between two strings, counted in characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a.chars().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b.chars().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// The closest of `candidates` to `got`, if any is close enough.
///
/// Ties go to the earliest candidate.
pub fn closest<'a>(got: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    if got.is_empty() {
        return None;
    }
    let mut best = None;
    let mut best_distance = MAX_DISTANCE;
    for candidate in candidates {
        let distance = edit_distance(got, candidate);
        if distance < best_distance {
            best = Some(candidate);
            best_distance = distance;
        }
    }
    best
}

/// Append a `Did you mean 'x'?` line (when some candidate is close) and a
/// `Possible values: 'a', 'b'` line to `out`.
pub fn write_alternatives(out: &mut String, got: &str, candidates: &[&str]) {
    if let Some(candidate) = closest(got, candidates.iter().copied()) {
        let _ = writeln!(out, "Did you mean '{candidate}'?");
    }
    out.push_str("Possible values: ");
    for (i, candidate) in candidates.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "'{candidate}'");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("f15", "f16"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn suggestions() {
        let values = ["error", "info", "off", "warning"];
        assert_eq!(closest("warn", values), Some("warning"));
        assert_eq!(closest("", values), None);
        assert_eq!(closest("thisisverydifferent", values), None);

        let mut out = String::new();
        write_alternatives(&mut out, "fatal", &values);
        assert_eq!(out, "Possible values: 'error', 'info', 'off', 'warning'");

        out.clear();
        write_alternatives(&mut out, "f15", &["f16"]);
        assert_eq!(out, "Did you mean 'f16'?\nPossible values: 'f16'");
    }
}
