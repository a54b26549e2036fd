//! Common utilities used across the crate.

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Components that can fan out (the cross-validation folds of one round)
/// take this flag and use `rayon` only when it is `Parallel`. Every fan-out
/// is joined before its results are used, so the order of results never
/// depends on the mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    #[default]
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map in input order, in parallel when allowed.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maybe_par_map_keeps_order() {
        let input: Vec<usize> = (0..64).collect();
        for mode in [Parallelism::Sequential, Parallelism::Parallel] {
            let out = mode.maybe_par_map(input.clone(), |x| x * 2);
            assert_eq!(out, (0..64).map(|x| x * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn maybe_par_map_over_mutable_refs() {
        let mut values = vec![1, 2, 3];
        let doubled = Parallelism::Parallel.maybe_par_map(&mut values, |v| {
            *v *= 2;
            *v
        });
        assert_eq!(doubled, vec![2, 4, 6]);
        assert_eq!(values, vec![2, 4, 6]);
    }
}
