//! Parameter combinations and the lattice operations over them.
//!
//! A combination is a set of parameters with at most one binding per
//! parameter type, kept canonically sorted by `(type, id)`. Combinations
//! form a lattice under set inclusion; slicing algorithms walk that lattice
//! through the operations here. Sub-combination enumeration order is part of
//! the engine's observable behavior (monitor creation order follows it), so
//! it is fixed: strictly decreasing size, ties broken lexicographically by
//! canonical position, the empty combination last.

use std::fmt;

use crate::param::{Param, ParamTypeId};

/// A canonically ordered set of parameters, at most one per type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Combination {
    params: Vec<Param>,
}

impl Combination {
    /// The empty combination, sub of everything.
    #[must_use]
    pub const fn empty() -> Self {
        Self { params: Vec::new() }
    }

    /// Builds a combination from already validated parameters.
    ///
    /// Exact duplicates collapse; two bindings of the same type to different
    /// identities are a caller bug (events are canonicalized through
    /// [`Combination::canonicalize`] before they reach here).
    #[must_use]
    pub fn new(mut params: Vec<Param>) -> Self {
        params.sort();
        params.dedup();
        debug_assert!(
            params.windows(2).all(|w| w[0].ptype() != w[1].ptype()),
            "combination binds one type twice"
        );
        Self { params }
    }

    /// Sorts, deduplicates, and checks the one-binding-per-type rule.
    ///
    /// On conflict returns the offending parameter type so the caller can
    /// name it in a validation error.
    pub fn canonicalize(mut params: Vec<Param>) -> Result<Self, ParamTypeId> {
        params.sort();
        params.dedup();
        if let Some(w) = params.windows(2).find(|w| w[0].ptype() == w[1].ptype()) {
            return Err(w[0].ptype());
        }
        Ok(Self { params })
    }

    /// Number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True for the empty combination.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The parameters in canonical order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Whether `ptype` is bound here.
    #[must_use]
    pub fn binds(&self, ptype: ParamTypeId) -> bool {
        self.param_for(ptype).is_some()
    }

    /// The parameter bound for `ptype`, if any.
    #[must_use]
    pub fn param_for(&self, ptype: ParamTypeId) -> Option<&Param> {
        self.params
            .binary_search_by_key(&ptype, |p| p.ptype())
            .ok()
            .map(|i| &self.params[i])
    }

    /// Two combinations are compatible when no type is bound by both to
    /// different identities.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        let mut a = self.params.iter().peekable();
        let mut b = other.params.iter().peekable();
        while let (Some(&x), Some(&y)) = (a.peek(), b.peek()) {
            match x.ptype().cmp(&y.ptype()) {
                std::cmp::Ordering::Less => {
                    a.next();
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                }
                std::cmp::Ordering::Equal => {
                    if x.id() != y.id() {
                        return false;
                    }
                    a.next();
                    b.next();
                }
            }
        }
        true
    }

    /// Least upper bound: the union of two compatible combinations.
    ///
    /// Returns `None` when the combinations conflict.
    #[must_use]
    pub fn join(&self, other: &Self) -> Option<Self> {
        if !self.is_compatible(other) {
            return None;
        }
        let mut merged = Vec::with_capacity(self.params.len() + other.params.len());
        let mut a = self.params.iter().peekable();
        let mut b = other.params.iter().peekable();
        loop {
            match (a.peek(), b.peek()) {
                (Some(&x), Some(&y)) => match x.cmp(y) {
                    std::cmp::Ordering::Less => {
                        merged.push(x.clone());
                        a.next();
                    }
                    std::cmp::Ordering::Greater => {
                        merged.push(y.clone());
                        b.next();
                    }
                    std::cmp::Ordering::Equal => {
                        merged.push(x.clone());
                        a.next();
                        b.next();
                    }
                },
                (Some(&x), None) => {
                    merged.push(x.clone());
                    a.next();
                }
                (None, Some(&y)) => {
                    merged.push(y.clone());
                    b.next();
                }
                (None, None) => break,
            }
        }
        Some(Self { params: merged })
    }

    /// Whether every parameter of `self` also appears in `other`.
    #[must_use]
    pub fn is_sub_of(&self, other: &Self) -> bool {
        if self.params.len() > other.params.len() {
            return false;
        }
        self.params
            .iter()
            .all(|p| other.param_for(p.ptype()).map(Param::id) == Some(p.id()))
    }

    /// Subset check excluding equality.
    #[must_use]
    pub fn is_strict_sub_of(&self, other: &Self) -> bool {
        self.params.len() < other.params.len() && self.is_sub_of(other)
    }

    /// All strict sub-combinations of `self`, in the engine's fixed order:
    /// strictly decreasing size, ties lexicographic by canonical position,
    /// the empty combination last.
    #[must_use]
    pub fn sub_combinations(&self) -> Vec<Self> {
        let n = self.params.len();
        let mut out = Vec::with_capacity(Self::subs_capacity(n));
        for size in (0..n).rev() {
            self.push_subs_of_size(size, &mut out);
        }
        out
    }

    /// Capacity hint for [`Self::sub_combinations`]: exact below 16
    /// parameters, clamped above so the shift cannot overflow at the
    /// 64-type cap.
    const fn subs_capacity(n: usize) -> usize {
        if n < 16 {
            (1 << n) - 1
        } else {
            1 << 16
        }
    }

    /// Strict sub-combinations of exactly `size` parameters, ties ordered
    /// lexicographically by canonical position.
    fn push_subs_of_size(&self, size: usize, out: &mut Vec<Self>) {
        let n = self.params.len();
        if size >= n {
            return;
        }
        if size == 0 {
            out.push(Self::empty());
            return;
        }
        // Standard lexicographic k-combination walk over positions 0..n.
        let mut idx: Vec<usize> = (0..size).collect();
        loop {
            out.push(Self {
                params: idx.iter().map(|&i| self.params[i].clone()).collect(),
            });
            // Advance to the next combination, rightmost index first.
            let mut i = size;
            loop {
                if i == 0 {
                    return;
                }
                i -= 1;
                if idx[i] != i + n - size {
                    break;
                }
            }
            idx[i] += 1;
            for j in i + 1..size {
                idx[j] = idx[j - 1] + 1;
            }
        }
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromIterator<Param> for Combination {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
