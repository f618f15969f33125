//! Name types for the four program namespaces (plus label parameters).
//!
//! Temporaries, object variables, jump labels, and function names are
//! disjoint namespaces; using distinct newtypes keeps them from being mixed
//! up in analysis tables.

use std::fmt;

macro_rules! name_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Creates a name from a string.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// The underlying name.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }
    };
}

name_type! {
    /// A participant in the distributed execution.
    Host
}

name_type! {
    /// An SSA-like temporary, defined exactly once by a let binding.
    Variable
}

name_type! {
    /// A mutable object variable, declared once per scope.
    ObjectVariable
}

name_type! {
    /// A loop identifier that break statements can name.
    JumpLabel
}

name_type! {
    /// The name of a declared function.
    FunctionName
}

name_type! {
    /// A polymorphic label parameter of a function.
    LabelParameter
}

/// The closed set of object methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MethodName {
    /// Read the object's value (with an index for vectors).
    Get,
    /// Overwrite the object's value (with an index for vectors).
    Set,
}
