//! Pure skip-row arithmetic.
//!
//! Row `rn` carries `skip_count(rn)` back-pointers; pointer `k` references
//! row `rn - 2^k`. Everything else (paths, coverage, frontiers) falls out of
//! that rule.

use std::collections::BTreeSet;

/// Number of skip pointers row `rn` carries.
///
/// # Panics
///
/// Panics if `rn == 0`; the sentinel row has no pointers.
pub fn skip_count(rn: u64) -> usize {
    assert!(rn >= 1, "skip_count undefined for row {rn}");
    1 + rn.trailing_zeros() as usize
}

/// Row number referenced by pointer `level` of row `rn`.
///
/// The referenced row may be 0 (the sentinel) at the top level.
///
/// # Panics
///
/// Panics if `level >= skip_count(rn)`.
pub fn referenced_row(rn: u64, level: usize) -> u64 {
    let count = skip_count(rn);
    assert!(
        level < count,
        "level {level} out of bounds for row {rn} ({count} pointers)"
    );
    rn - (1 << level)
}

/// Whether `hi` holds a skip pointer directly referencing `lo`.
pub fn rows_linked(lo: u64, hi: u64) -> bool {
    lo < hi && (hi - lo).is_power_of_two() && (hi - lo).trailing_zeros() < hi.trailing_zeros() + 1
}

/// Pointer level at which `hi` references `lo`, if linked.
pub fn link_level(lo: u64, hi: u64) -> Option<usize> {
    rows_linked(lo, hi).then(|| (hi - lo).trailing_zeros() as usize)
}

/// Number of frontier levels at row `rn` (the bit length of `rn`).
///
/// Level `i` of a frontier at `rn` retains the hash of
/// `level_row_number(rn, i)`; levels at and above the bit length would all
/// collapse onto the sentinel.
pub fn level_count(rn: u64) -> usize {
    (u64::BITS - rn.leading_zeros()) as usize
}

/// Highest row number `<= rn` divisible by `2^level`.
pub fn level_row_number(rn: u64, level: usize) -> u64 {
    assert!(level < u64::BITS as usize);
    rn & !((1u64 << level) - 1)
}

/// Ordered row numbers (ascending) of the shortest hash-linked path from
/// `lo` up to `hi`.
///
/// Constructed from `hi` downward, always taking the largest legal step:
/// the highest pointer of the current row whose referenced row is still
/// `>= lo`.
///
/// # Panics
///
/// Panics if `lo < 1` or `lo > hi`.
pub fn skip_path_numbers(lo: u64, hi: u64) -> Vec<u64> {
    assert!(lo >= 1, "path cannot start below row 1");
    assert!(lo <= hi, "inverted path bounds [{lo}, {hi}]");

    let mut numbers = Vec::with_capacity(2 * (64 - (hi - lo).leading_zeros()) as usize + 1);
    let mut cursor = hi;
    while cursor > lo {
        numbers.push(cursor);
        let mut level = skip_count(cursor) - 1;
        while cursor - (1 << level) < lo {
            level -= 1;
        }
        cursor -= 1 << level;
    }
    numbers.push(lo);
    numbers.reverse();
    numbers
}

/// Union of the skip paths linking every consecutive pair of `targets`,
/// ascending and without duplicates. The result is itself a linked path
/// containing every target.
///
/// # Panics
///
/// Panics if `targets` is empty, unsorted, or contains duplicates or zero.
pub fn stitch(targets: &[u64]) -> Vec<u64> {
    assert!(!targets.is_empty(), "no targets to stitch");
    assert!(
        targets.windows(2).all(|w| w[0] < w[1]),
        "stitch targets must strictly ascend"
    );

    let mut numbers = BTreeSet::new();
    numbers.insert(targets[0]);
    assert!(targets[0] >= 1, "row numbers start at 1");
    for pair in targets.windows(2) {
        numbers.extend(skip_path_numbers(pair[0], pair[1]));
    }
    numbers.into_iter().collect()
}

/// Set of row numbers whose hash is referenced by the union of rows `rns`,
/// including the rows themselves. Contains 0 whenever a top-level pointer
/// reaches the sentinel.
pub fn coverage(rns: &[u64]) -> BTreeSet<u64> {
    let mut covered = BTreeSet::new();
    for &rn in rns {
        covered.insert(rn);
        for level in 0..skip_count(rn) {
            covered.insert(rn - (1 << level));
        }
    }
    covered
}
