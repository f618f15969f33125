//! The free distributive lattice over an arbitrary atom type.

use std::collections::BTreeSet;
use std::fmt;

use crate::algebra::{HeytingAlgebra, JoinSemiLattice, Lattice, MeetSemiLattice};

/// The free (bounded) distributive lattice over atoms of type `A`.
///
/// Elements are kept in disjunctive normal form: a join of meets of atoms,
/// stored as a set of sets. On top of the lattice identities, distribution
/// holds in both directions:
///
/// - `a ∧ (b ∨ c) = (a ∧ b) ∨ (a ∧ c)`
/// - `a ∨ (b ∧ c) = (a ∨ b) ∧ (a ∨ c)`
///
/// Both security label components (confidentiality and integrity) are
/// elements of this lattice over principals. Ordered sets keep the normal
/// form canonical, so structural equality is semantic equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FreeDistributiveLattice<A: Ord + Clone> {
    join_of_meets: BTreeSet<BTreeSet<A>>,
}

impl<A: Ord + Clone> FreeDistributiveLattice<A> {
    /// Embeds a single atom as a lattice element.
    pub fn atom(element: A) -> Self {
        let mut meet = BTreeSet::new();
        meet.insert(element);
        let mut join = BTreeSet::new();
        join.insert(meet);
        Self {
            join_of_meets: join,
        }
    }

    /// The greatest element: the join containing the empty meet.
    #[must_use]
    pub fn top_element() -> Self {
        let mut join = BTreeSet::new();
        join.insert(BTreeSet::new());
        Self {
            join_of_meets: join,
        }
    }

    /// The least element: the empty join.
    #[must_use]
    pub fn bottom_element() -> Self {
        Self {
            join_of_meets: BTreeSet::new(),
        }
    }

    fn normalized(join_of_meets: BTreeSet<BTreeSet<A>>) -> Self {
        Self {
            join_of_meets: Self::remove_redundant(join_of_meets),
        }
    }

    /// Given `m_1 ∨ ... ∨ m_n`, a meet `m_j` is redundant whenever some other
    /// `m_i` is a subset of it (a weaker conjunction already covers it).
    fn remove_redundant(join_of_meets: BTreeSet<BTreeSet<A>>) -> BTreeSet<BTreeSet<A>> {
        join_of_meets
            .iter()
            .filter(|meet| {
                !join_of_meets
                    .iter()
                    .any(|other| other != *meet && meet.is_superset(other))
            })
            .cloned()
            .collect()
    }

    /// The atoms mentioned anywhere in this element.
    pub fn atoms(&self) -> BTreeSet<&A> {
        self.join_of_meets.iter().flatten().collect()
    }
}

impl<A: Ord + Clone + fmt::Debug + fmt::Display> JoinSemiLattice for FreeDistributiveLattice<A> {
    fn join(&self, other: &Self) -> Self {
        let mut candidates = self.join_of_meets.clone();
        candidates.extend(other.join_of_meets.iter().cloned());
        Self::normalized(candidates)
    }
}

impl<A: Ord + Clone + fmt::Debug + fmt::Display> MeetSemiLattice for FreeDistributiveLattice<A> {
    fn meet(&self, other: &Self) -> Self {
        let mut candidates = BTreeSet::new();
        for meet1 in &self.join_of_meets {
            for meet2 in &other.join_of_meets {
                let mut combined = meet1.clone();
                combined.extend(meet2.iter().cloned());
                candidates.insert(combined);
            }
        }
        Self::normalized(candidates)
    }
}

impl<A: Ord + Clone + fmt::Debug + fmt::Display> Lattice for FreeDistributiveLattice<A> {
    fn top() -> Self {
        Self::top_element()
    }

    fn bottom() -> Self {
        Self::bottom_element()
    }
}

impl<A: Ord + Clone + fmt::Debug + fmt::Display> HeytingAlgebra for FreeDistributiveLattice<A> {
    /// Returns the greatest `x` such that `self ∧ x ≤ that`.
    ///
    /// For a constraint `(A_1 ∨ ... ∨ A_m) ∧ x ≤ B_1 ∨ ... ∨ B_n`, every
    /// meet `A_i ∧ x` on the left must be covered by some meet on the right,
    /// which happens exactly when `x ≤ (B_1 \ A_i) ∨ ... ∨ (B_n \ A_i)`.
    /// Taking the meet of these upper bounds over all `A_i` yields the
    /// greatest solution.
    fn imply(&self, that: &Self) -> Self {
        let mut result = Self::top_element();
        for this_meet in &self.join_of_meets {
            let complements: BTreeSet<BTreeSet<A>> = that
                .join_of_meets
                .iter()
                .map(|that_meet| that_meet.difference(this_meet).cloned().collect())
                .collect();
            result = result.meet(&Self::normalized(complements));
        }
        result
    }
}

impl<A: Ord + Clone + fmt::Display> fmt::Display for FreeDistributiveLattice<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.join_of_meets.is_empty() {
            return write!(f, "\u{22a5}");
        }
        if self.join_of_meets.len() == 1 && self.join_of_meets.contains(&BTreeSet::new()) {
            return write!(f, "\u{22a4}");
        }

        let meets: Vec<String> = self
            .join_of_meets
            .iter()
            .map(|meet| {
                let atoms: Vec<String> = meet.iter().map(ToString::to_string).collect();
                if meet.len() > 1 {
                    format!("({})", atoms.join(" \u{2227} "))
                } else {
                    atoms.join("")
                }
            })
            .collect();
        if meets.len() > 1 {
            write!(f, "({})", meets.join(" \u{2228} "))
        } else {
            write!(f, "{}", meets.join(""))
        }
    }
}

impl<A: Ord + Clone + fmt::Display> fmt::Debug for FreeDistributiveLattice<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::PartialOrder;

    type Fdl = FreeDistributiveLattice<&'static str>;

    #[test]
    fn bounds_are_ordered() {
        assert!(Fdl::bottom_element().less_than_or_equal_to(&Fdl::top_element()));
        assert!(Fdl::bottom_element().less_than_or_equal_to(&Fdl::atom("a")));
        assert!(Fdl::atom("a").less_than_or_equal_to(&Fdl::top_element()));
    }

    #[test]
    fn join_and_meet_absorb() {
        let a = Fdl::atom("a");
        let b = Fdl::atom("b");
        assert_eq!(a.join(&a.meet(&b)), a);
        assert_eq!(a.meet(&a.join(&b)), a);
    }

    #[test]
    fn redundant_meets_are_removed() {
        let a = Fdl::atom("a");
        let b = Fdl::atom("b");
        // a ∨ (a ∧ b) = a
        assert_eq!(a.join(&a.meet(&b)), a);
        // a ∧ (a ∨ b) = a
        assert_eq!(a.meet(&a.join(&b)), a);
    }

    #[test]
    fn distribution_holds() {
        let a = Fdl::atom("a");
        let b = Fdl::atom("b");
        let c = Fdl::atom("c");
        assert_eq!(a.meet(&b.join(&c)), a.meet(&b).join(&a.meet(&c)));
        assert_eq!(a.join(&b.meet(&c)), a.join(&b).meet(&a.join(&c)));
    }

    #[test]
    fn imply_is_residual() {
        let elements = [
            Fdl::bottom_element(),
            Fdl::top_element(),
            Fdl::atom("a"),
            Fdl::atom("b"),
            Fdl::atom("a").join(&Fdl::atom("b")),
            Fdl::atom("a").meet(&Fdl::atom("b")),
        ];
        // x ≤ a → b iff a ∧ x ≤ b
        for a in &elements {
            for b in &elements {
                let residual = a.imply(b);
                for x in &elements {
                    assert_eq!(
                        x.less_than_or_equal_to(&residual),
                        a.meet(x).less_than_or_equal_to(b),
                        "residuation failed for a={a}, b={b}, x={x}"
                    );
                }
            }
        }
    }

    #[test]
    fn imply_identities() {
        let a = Fdl::atom("a");
        let b = Fdl::atom("b");
        assert_eq!(a.imply(&a), Fdl::top_element());
        assert_eq!(Fdl::top_element().imply(&a), a);
        assert_eq!(b.imply(&a.meet(&b)), b.imply(&a));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Fdl::bottom_element().to_string(), "\u{22a5}");
        assert_eq!(Fdl::top_element().to_string(), "\u{22a4}");
        assert_eq!(Fdl::atom("a").to_string(), "a");
        assert_eq!(
            Fdl::atom("a").meet(&Fdl::atom("b")).to_string(),
            "(a \u{2227} b)"
        );
    }
}
