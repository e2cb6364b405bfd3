//! Label matching.
//!
//! - [`text`]: normalization, edit distance, subsequence alignment
//! - [`bg_item`]: single-label matcher with exact, merge and split modes
//! - [`multi_row`]: labels spanning several lines and fragments

pub mod bg_item;
pub mod multi_row;
pub mod text;

pub use bg_item::{BgItem, BgMatch, MatchMode};
pub use multi_row::{AlignMode, AlignPolicy, MatchLimits, MultiRowLabel, MultiRowMatch};
pub use text::{edit_distance, lcs_align, normalize, Preprocess};

/// Odometer over the Cartesian product of index ranges `0..sizes[i]`.
///
/// The last position varies fastest. An empty `sizes` or any zero size yields
/// nothing.
///
/// # Examples
///
/// ```
/// use table_oxide::matching::Cartesian;
///
/// let all: Vec<Vec<usize>> = Cartesian::new(&[2, 2]).collect();
/// assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
/// ```
#[derive(Debug, Clone)]
pub struct Cartesian {
    sizes: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl Cartesian {
    pub fn new(sizes: &[usize]) -> Self {
        let current = if sizes.is_empty() || sizes.contains(&0) {
            None
        } else {
            Some(vec![0; sizes.len()])
        };
        Self {
            sizes: sizes.to_vec(),
            current,
        }
    }
}

impl Iterator for Cartesian {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.current.take()?;
        let mut next = current.clone();
        let mut i = next.len();
        while i > 0 {
            i -= 1;
            next[i] += 1;
            if next[i] < self.sizes[i] {
                self.current = Some(next);
                break;
            }
            next[i] = 0;
        }
        Some(current)
    }
}
