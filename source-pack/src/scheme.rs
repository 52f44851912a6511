//! Per-column salting policy.

/// Which cell indices carry salt.
///
/// `indices` is sorted and unique; `positive` says whether the listed
/// indices are the salted ones (`true`) or the unsalted exceptions
/// (`false`). The two sentinels fall out of an empty index list:
/// [`SaltScheme::NO_SALT`] and [`SaltScheme::SALT_ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltScheme {
    indices: Vec<u16>,
    positive: bool,
}

impl SaltScheme {
    /// No cell is salted.
    pub const NO_SALT: Self = Self {
        indices: Vec::new(),
        positive: true,
    };

    /// Every cell is salted.
    pub const SALT_ALL: Self = Self {
        indices: Vec::new(),
        positive: false,
    };

    /// Exactly the listed indices are salted.
    ///
    /// # Panics
    ///
    /// Panics unless `indices` is strictly ascending.
    pub fn positive(indices: Vec<u16>) -> Self {
        Self::checked(indices, true)
    }

    /// Every index except the listed ones is salted.
    ///
    /// # Panics
    ///
    /// Panics unless `indices` is strictly ascending.
    pub fn negative(indices: Vec<u16>) -> Self {
        Self::checked(indices, false)
    }

    fn checked(indices: Vec<u16>, positive: bool) -> Self {
        assert!(
            indices.windows(2).all(|w| w[0] < w[1]),
            "salt indices must strictly ascend"
        );
        Self { indices, positive }
    }

    pub fn is_salted(&self, index: usize) -> bool {
        let listed = u16::try_from(index)
            .map(|i| self.indices.binary_search(&i).is_ok())
            .unwrap_or(false);
        self.positive == listed
    }

    /// Whether any of the first `cell_count` cells is salted.
    pub fn any_salted(&self, cell_count: usize) -> bool {
        (0..cell_count).any(|i| self.is_salted(i))
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn is_positive(&self) -> bool {
        self.positive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        assert!(!SaltScheme::NO_SALT.is_salted(0));
        assert!(!SaltScheme::NO_SALT.any_salted(100));
        assert!(SaltScheme::SALT_ALL.is_salted(0));
        assert!(SaltScheme::SALT_ALL.is_salted(41));
    }

    #[test]
    fn positive_lists_the_salted() {
        let scheme = SaltScheme::positive(vec![1, 3]);
        assert!(!scheme.is_salted(0));
        assert!(scheme.is_salted(1));
        assert!(!scheme.is_salted(2));
        assert!(scheme.is_salted(3));
        assert!(scheme.any_salted(2));
        assert!(!scheme.any_salted(1));
    }

    #[test]
    fn negative_lists_the_exceptions() {
        let scheme = SaltScheme::negative(vec![0]);
        assert!(!scheme.is_salted(0));
        assert!(scheme.is_salted(1));
        assert!(scheme.is_salted(2));
        assert!(!scheme.any_salted(1));
        assert!(scheme.any_salted(2));
    }

    #[test]
    #[should_panic(expected = "strictly ascend")]
    fn unsorted_indices_rejected() {
        SaltScheme::positive(vec![3, 1]);
    }
}
