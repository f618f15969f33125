//! The information-flow security lattice.

use std::fmt;

use crate::algebra::{
    FreeDistributiveLattice, JoinSemiLattice, MeetSemiLattice, PartialOrder,
};
use crate::security::Principal;

/// One component (confidentiality or integrity) of a [`Label`].
pub type PrincipalComponent = FreeDistributiveLattice<Principal>;

/// A lattice element for information-flow security: a confidentiality
/// component paired with an integrity component.
///
/// Information flows from less restrictive labels to more restrictive ones.
/// Two orders coexist and must not be confused:
///
/// - the *information-flow* order, with [`Label::flows_to`],
///   [`Label::join`], [`Label::meet`], [`Label::bottom`] (public trusted)
///   and [`Label::top`] (secret untrusted);
/// - the *trust* order, with [`Label::acts_for`], [`Label::and`],
///   [`Label::or`], [`Label::weakest`] and [`Label::strongest`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    confidentiality: PrincipalComponent,
    integrity: PrincipalComponent,
}

impl Label {
    /// Builds a label directly from its two components.
    #[must_use]
    pub fn new(confidentiality: PrincipalComponent, integrity: PrincipalComponent) -> Self {
        Self {
            confidentiality,
            integrity,
        }
    }

    /// The authority label of a single principal: that principal in both
    /// components.
    #[must_use]
    pub fn from_principal(principal: Principal) -> Self {
        let component = PrincipalComponent::atom(principal);
        Self {
            confidentiality: component.clone(),
            integrity: component,
        }
    }

    /// A label with the given confidentiality and minimal integrity.
    #[must_use]
    pub fn from_confidentiality(confidentiality: PrincipalComponent) -> Self {
        Self {
            confidentiality,
            integrity: PrincipalComponent::top_element(),
        }
    }

    /// A label with the given integrity and minimal confidentiality.
    #[must_use]
    pub fn from_integrity(integrity: PrincipalComponent) -> Self {
        Self {
            confidentiality: PrincipalComponent::top_element(),
            integrity,
        }
    }

    /// The least powerful principal: public and untrusted. Unit for
    /// [`Label::and`].
    #[must_use]
    pub fn weakest() -> Self {
        Self {
            confidentiality: PrincipalComponent::top_element(),
            integrity: PrincipalComponent::top_element(),
        }
    }

    /// The most powerful principal: secret and trusted. Unit for
    /// [`Label::or`].
    #[must_use]
    pub fn strongest() -> Self {
        Self {
            confidentiality: PrincipalComponent::bottom_element(),
            integrity: PrincipalComponent::bottom_element(),
        }
    }

    /// The least restrictive data policy: public and trusted. Unit for
    /// [`Label::join`].
    #[must_use]
    pub fn bottom() -> Self {
        Self {
            confidentiality: PrincipalComponent::top_element(),
            integrity: PrincipalComponent::bottom_element(),
        }
    }

    /// The most restrictive data policy: secret and untrusted. Unit for
    /// [`Label::meet`].
    #[must_use]
    pub fn top() -> Self {
        Self {
            confidentiality: PrincipalComponent::bottom_element(),
            integrity: PrincipalComponent::top_element(),
        }
    }

    /// The raw confidentiality component.
    #[must_use]
    pub fn confidentiality_component(&self) -> &PrincipalComponent {
        &self.confidentiality
    }

    /// The raw integrity component.
    #[must_use]
    pub fn integrity_component(&self) -> &PrincipalComponent {
        &self.integrity
    }

    /// The confidentiality projection: same confidentiality, weakest
    /// integrity.
    #[must_use]
    pub fn confidentiality(&self) -> Self {
        Self::from_confidentiality(self.confidentiality.clone())
    }

    /// The integrity projection: same integrity, weakest confidentiality.
    #[must_use]
    pub fn integrity(&self) -> Self {
        Self::from_integrity(self.integrity.clone())
    }

    /// Returns `true` if information may flow from `self` to `that`.
    #[must_use]
    pub fn flows_to(&self, that: &Self) -> bool {
        that.confidentiality()
            .and(&self.integrity())
            .acts_for(&self.confidentiality().and(&that.integrity()))
    }

    /// Returns `true` if `self` has at least the authority of `that`.
    #[must_use]
    pub fn acts_for(&self, that: &Self) -> bool {
        self.confidentiality
            .less_than_or_equal_to(&that.confidentiality)
            && self.integrity.less_than_or_equal_to(&that.integrity)
    }

    /// Least upper bound in the information-flow order.
    #[must_use]
    pub fn join(&self, that: &Self) -> Self {
        Self {
            confidentiality: self.confidentiality.meet(&that.confidentiality),
            integrity: self.integrity.join(&that.integrity),
        }
    }

    /// Greatest lower bound in the information-flow order.
    #[must_use]
    pub fn meet(&self, that: &Self) -> Self {
        Self {
            confidentiality: self.confidentiality.join(&that.confidentiality),
            integrity: self.integrity.meet(&that.integrity),
        }
    }

    /// Conjunction of authority: the combined power of both principals.
    #[must_use]
    pub fn and(&self, that: &Self) -> Self {
        Self {
            confidentiality: self.confidentiality.meet(&that.confidentiality),
            integrity: self.integrity.meet(&that.integrity),
        }
    }

    /// Disjunction of authority: power both principals share.
    #[must_use]
    pub fn or(&self, that: &Self) -> Self {
        Self {
            confidentiality: self.confidentiality.join(&that.confidentiality),
            integrity: self.integrity.join(&that.integrity),
        }
    }

    /// Exchanges the confidentiality and integrity components.
    ///
    /// This is the key ingredient of the non-malleability conditions on
    /// downgrades: robust declassification and transparent endorsement are
    /// both stated through `swap`.
    #[must_use]
    pub fn swap(&self) -> Self {
        Self {
            confidentiality: self.integrity.clone(),
            integrity: self.confidentiality.clone(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expression = if self.confidentiality == self.integrity {
            format!("{}", self.confidentiality)
        } else if self == &self.confidentiality() {
            format!("{}->", self.confidentiality)
        } else if self == &self.integrity() {
            format!("{}<-", self.integrity)
        } else {
            format!("{}-> \u{2227} {}<-", self.confidentiality, self.integrity)
        };
        write!(f, "{{{expression}}}")
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(name: &str) -> Label {
        Label::from_principal(Principal::new(name))
    }

    #[test]
    fn flows_to_is_reflexive() {
        let alice = principal("alice");
        assert!(alice.flows_to(&alice));
        assert!(Label::bottom().flows_to(&alice));
        assert!(alice.flows_to(&Label::top()));
    }

    #[test]
    fn flows_to_rejects_unrelated_principals() {
        let alice = principal("alice");
        let bob = principal("bob");
        assert!(!alice.flows_to(&bob));
        assert!(!bob.flows_to(&alice));
    }

    #[test]
    fn data_flows_up_to_joint_authority() {
        let alice = principal("alice");
        let bob = principal("bob");
        let both = alice.and(&bob);
        // A value owned by alice may flow to a place both trust.
        assert!(alice.confidentiality().flows_to(&both.confidentiality()));
        assert!(both.acts_for(&alice));
        assert!(both.acts_for(&bob));
    }

    #[test]
    fn join_is_least_upper_bound() {
        let alice = principal("alice");
        let bob = principal("bob");
        let joined = alice.join(&bob);
        assert!(alice.flows_to(&joined));
        assert!(bob.flows_to(&joined));
        assert_eq!(alice.join(&Label::bottom()), alice);
    }

    #[test]
    fn meet_is_greatest_lower_bound() {
        let alice = principal("alice");
        let bob = principal("bob");
        let met = alice.meet(&bob);
        assert!(met.flows_to(&alice));
        assert!(met.flows_to(&bob));
        assert_eq!(alice.meet(&Label::top()), alice);
    }

    #[test]
    fn swap_is_involutive() {
        let alice = principal("alice");
        let label = alice.confidentiality().join(&principal("bob").integrity());
        assert_eq!(label.swap().swap(), label);
    }

    #[test]
    fn projections_decompose() {
        let alice = principal("alice");
        assert_eq!(
            alice.confidentiality().and(&alice.integrity()),
            alice.clone()
        );
    }

    #[test]
    fn display_marks_components() {
        let alice = principal("alice");
        assert_eq!(alice.to_string(), "{alice}");
        assert_eq!(alice.confidentiality().to_string(), "{alice->}");
        assert_eq!(alice.integrity().to_string(), "{alice<-}");
    }
}
