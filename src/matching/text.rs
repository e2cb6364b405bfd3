//! String primitives for label matching.
//!
//! Normalization, edit distance and an order-preserving longest common
//! subsequence alignment that records where each label character was found in
//! the candidate text.

use serde::{Deserialize, Serialize};

/// A transformation applied to candidate text before alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocess {
    /// Lowercase every character
    Lowercase,
    /// Drop punctuation and other symbols
    StripSymbols,
    /// Drop whitespace
    StripSpaces,
    /// Map full-width ASCII forms (and the ideographic space) to half-width
    Halfwidth,
}

impl Preprocess {
    /// Apply to a string.
    pub fn apply(&self, text: &str) -> String {
        match self {
            Preprocess::Lowercase => text.to_lowercase(),
            Preprocess::StripSymbols => text.chars().filter(|c| !is_symbol(*c)).collect(),
            Preprocess::StripSpaces => text.chars().filter(|c| !c.is_whitespace()).collect(),
            Preprocess::Halfwidth => text.chars().map(to_halfwidth).collect(),
        }
    }
}

/// True for characters that are neither alphanumeric nor whitespace.
pub fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

/// Map a full-width form to its ASCII counterpart.
pub fn to_halfwidth(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

/// Strip symbols and/or whitespace.
///
/// # Examples
///
/// ```
/// use table_oxide::matching::text::normalize;
///
/// assert_eq!(normalize("Unit Price:", true, true), "UnitPrice");
/// assert_eq!(normalize("Unit Price:", false, true), "UnitPrice:");
/// ```
pub fn normalize(text: &str, strip_symbols: bool, strip_spaces: bool) -> String {
    text.chars()
        .filter(|c| !(strip_symbols && is_symbol(*c)))
        .filter(|c| !(strip_spaces && c.is_whitespace()))
        .collect()
}

/// Levenshtein distance counted in characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Longest common subsequence alignment of `label` against `text`.
///
/// Returns matched `(label_index, text_index)` pairs in increasing order. When
/// several optimal alignments exist the earliest text positions are preferred,
/// which is what prefix matching wants; beyond that no tie-break is promised.
pub fn lcs_align(label: &[char], text: &[char]) -> Vec<(usize, usize)> {
    let (n, m) = (label.len(), text.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }
    // dp[i][j] = LCS length of label[i..] and text[j..]
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if label[i] == text[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(dp[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if label[i] == text[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if dp[i][j + 1] >= dp[i + 1][j] {
            j += 1;
        } else {
            i += 1;
        }
    }
    pairs
}

fn fold(c: char) -> char {
    let c = to_halfwidth(c);
    c.to_lowercase().next().unwrap_or(c)
}

/// Map indices into a preprocessed string back onto the original string.
///
/// Characters of `preprocessed` are located greedily, left to right, in
/// `original` (comparing case- and width-insensitively). Returns `None` when
/// the mapping breaks down or the remapped indices are not strictly
/// increasing; callers then keep the unmapped indices.
pub fn realign(indices: &[usize], original: &str, preprocessed: &str) -> Option<Vec<usize>> {
    let orig: Vec<char> = original.chars().map(fold).collect();
    let mut map = Vec::new();
    let mut j = 0;
    for c in preprocessed.chars().map(fold) {
        while j < orig.len() && orig[j] != c {
            j += 1;
        }
        if j == orig.len() {
            return None;
        }
        map.push(j);
        j += 1;
    }

    let remapped: Option<Vec<usize>> = indices.iter().map(|&k| map.get(k).copied()).collect();
    let remapped = remapped?;
    let increasing = remapped.windows(2).all(|w| w[0] < w[1]);
    if remapped.len() == indices.len() && increasing {
        Some(remapped)
    } else {
        None
    }
}
