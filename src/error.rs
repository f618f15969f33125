use thiserror::Error;

use crate::security::Label;
use crate::syntax::{ObjectType, ParameterDirection, SourceLocation, ValueType};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedProgram {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedProgram {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every analysis reports its first violation through one of these variants and aborts; the
/// compiler core is a batch verifier, so no error is recovered from or retried. Variants that
/// point at the input program carry the source location of the offending construct; the
/// information-flow variants additionally carry the two conflicting labels for diagnostics.
///
/// # Error Categories
///
/// ## Name Resolution Errors
/// - [`Error::UndefinedName`] - A name is used with no in-scope declaration
/// - [`Error::NameClash`] - Two declarations of the same name share a scope
///
/// ## Type Errors
/// - [`Error::TypeMismatch`] - An expression has the wrong type
/// - [`Error::IncorrectNumberOfArguments`] - Wrong arity at a call or method
/// - [`Error::UnknownMethod`] - A method does not exist on an object type
/// - [`Error::ParameterDirectionMismatch`] - An `in` argument passed for an `out` parameter
///   or vice versa
///
/// ## Information-Flow Errors
/// - [`Error::InsecureDataFlow`] - A value would flow to a less restrictive label
/// - [`Error::InsecureControlFlow`] - Control flow would leak into a visible effect
/// - [`Error::LabelMismatch`] - Two labels required to be equal differ
/// - [`Error::IntegrityChangingDeclassification`] - Declassification altered integrity
/// - [`Error::ConfidentialityChangingEndorsement`] - Endorsement altered confidentiality
/// - [`Error::MalleableDowngrade`] - A downgrade failed the non-malleability condition
///
/// ## Dataflow Errors
/// - [`Error::OutParameterInitialization`] - An out parameter is not initialized exactly
///   once before use
///
/// ## Protocol Selection Errors
/// - [`Error::NoSelectionSolution`] - No protocol assignment satisfies all constraints;
///   a property of the input program
/// - [`Error::SelectionVerification`] - A chosen assignment failed re-validation; an
///   internal inconsistency in the selection encoding, not an input error
/// - [`Error::InputProtocolMismatch`] - An input statement assigned to a protocol other
///   than its host's local protocol
///
/// ## Pass Errors
/// - [`Error::SpecializationDepthExceeded`] - Monomorphization exceeded the configured
///   recursion bound
///
/// ## Internal Errors
/// - [`Error::MalformedProgram`] - The program tree violates a structural invariant
/// - [`Error::Io`] - Failure while writing a diagnostic export
#[derive(Error, Debug)]
pub enum Error {
    /// A name is used without any in-scope declaration.
    ///
    /// Raised by name analysis for temporaries, object variables, jump labels,
    /// function names, hosts, and label parameters alike.
    #[error("{location}: undefined name `{name}`")]
    UndefinedName {
        /// The name that could not be resolved.
        name: String,
        /// Where the name is used.
        location: SourceLocation,
    },

    /// Two declarations of the same name coexist in one scope.
    #[error("{second}: `{name}` clashes with an earlier declaration at {first}")]
    NameClash {
        /// The name declared twice.
        name: String,
        /// Location of the earlier declaration.
        first: SourceLocation,
        /// Location of the clashing declaration.
        second: SourceLocation,
    },

    /// An expression does not have the type its context requires.
    #[error("{location}: expected type {expected}, found {actual}")]
    TypeMismatch {
        /// The type required by the context.
        expected: ValueType,
        /// The type the expression actually has.
        actual: ValueType,
        /// Where the mismatch occurred.
        location: SourceLocation,
    },

    /// A call or method application has the wrong number of arguments.
    #[error("{location}: expected {expected} arguments, found {actual}")]
    IncorrectNumberOfArguments {
        /// Number of parameters declared.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
        /// Where the call occurred.
        location: SourceLocation,
    },

    /// A query or update method does not exist on the object's type.
    #[error("{location}: type {object_type} has no method `{method}`")]
    UnknownMethod {
        /// The type of the receiving object.
        object_type: ObjectType,
        /// The method name that failed to resolve.
        method: String,
        /// Where the method was invoked.
        location: SourceLocation,
    },

    /// A call argument's direction does not match the callee parameter.
    ///
    /// Expression and object-reference arguments are `in`; out-parameter and
    /// object-declaration arguments are `out`.
    #[error("{location}: parameter `{parameter}` is declared {expected} but the argument is {actual}")]
    ParameterDirectionMismatch {
        /// The callee parameter's name.
        parameter: String,
        /// The direction the parameter declares.
        expected: ParameterDirection,
        /// The direction implied by the argument form.
        actual: ParameterDirection,
        /// Where the call occurred.
        location: SourceLocation,
    },

    /// Information would flow from a label to one that does not protect it.
    #[error("{location}: insecure data flow from {from} to {to}")]
    InsecureDataFlow {
        /// Label of the flowing data.
        from: Label,
        /// Label of the destination.
        to: Label,
        /// Where the flow occurs.
        location: SourceLocation,
    },

    /// The control-flow context would leak through a visible effect.
    #[error("{location}: insecure control flow; pc {pc} does not flow to {to}")]
    InsecureControlFlow {
        /// The program-counter label at the effect.
        pc: Label,
        /// Label of the affected location.
        to: Label,
        /// Where the effect occurs.
        location: SourceLocation,
    },

    /// Two labels that are required to be equal differ.
    #[error("{location}: expected label {expected}, found {actual}")]
    LabelMismatch {
        /// The label required by the context.
        expected: Label,
        /// The label actually inferred.
        actual: Label,
        /// Where the mismatch occurred.
        location: SourceLocation,
    },

    /// A declassification changed the integrity component of its label.
    ///
    /// Declassification may only lower confidentiality; integrity must be
    /// carried through unchanged.
    #[error("{location}: declassification changes integrity; from {from} to {to}")]
    IntegrityChangingDeclassification {
        /// The label being declassified.
        from: Label,
        /// The target label.
        to: Label,
        /// Where the downgrade occurs.
        location: SourceLocation,
    },

    /// An endorsement changed the confidentiality component of its label.
    #[error("{location}: endorsement changes confidentiality; from {from} to {to}")]
    ConfidentialityChangingEndorsement {
        /// The label being endorsed.
        from: Label,
        /// The target label.
        to: Label,
        /// Where the downgrade occurs.
        location: SourceLocation,
    },

    /// A downgrade failed the non-malleability condition.
    ///
    /// Every downgrade from `from` to `to` must satisfy
    /// `from ⊑ swap(from) ⊔ to`, which prevents attacker-influenced values
    /// from steering what gets downgraded.
    #[error("{location}: malleable downgrade from {from} to {to}")]
    MalleableDowngrade {
        /// The label being downgraded.
        from: Label,
        /// The target label.
        to: Label,
        /// Where the downgrade occurs.
        location: SourceLocation,
    },

    /// An out parameter is not deterministically initialized exactly once
    /// before every use and every function exit.
    #[error("{location}: out parameter `{parameter}` {violation}")]
    OutParameterInitialization {
        /// The offending parameter.
        parameter: String,
        /// Which of the initialization rules was broken.
        violation: String,
        /// The statement (or function exit) where the rule broke.
        location: SourceLocation,
    },

    /// No protocol assignment satisfies the selection constraints.
    ///
    /// This is a property of the input program (e.g., a label no available
    /// protocol has the authority to host), as opposed to
    /// [`Error::SelectionVerification`], which signals a compiler defect.
    #[error("no protocol assignment satisfies the selection constraints")]
    NoSelectionSolution,

    /// A solved protocol assignment failed re-validation.
    ///
    /// The chosen assignment violates a constraint the solver claimed to
    /// satisfy. This indicates an inconsistency between the constraint
    /// encoding and the search, i.e. a defect in the compiler rather than in
    /// the input program.
    #[error("protocol assignment failed validation at variable `{variable}`")]
    SelectionVerification {
        /// The decision variable whose assignment is inconsistent.
        variable: String,
    },

    /// An input statement was assigned a protocol other than its host's
    /// local protocol.
    #[error("{location}: input from host `{host}` must run on that host's local protocol, found {protocol}")]
    InputProtocolMismatch {
        /// The host the input reads from.
        host: String,
        /// The protocol actually assigned.
        protocol: String,
        /// Where the input statement is.
        location: SourceLocation,
    },

    /// Function monomorphization exceeded the configured depth bound.
    ///
    /// Recursive calls through distinct calling contexts would otherwise
    /// specialize forever; the bound turns that into a reported error.
    #[error("specialization of `{function}` exceeded the depth limit of {limit}")]
    SpecializationDepthExceeded {
        /// The function whose specialization chain grew past the limit.
        function: String,
        /// The configured limit.
        limit: usize,
    },

    /// The program tree violates a structural invariant.
    ///
    /// Raised when a node reference has an unexpected kind, for example an
    /// operator argument that is not an expression. These indicate a bug in
    /// the producer of the tree, not in the analyzed program.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("malformed program - {file}:{line}: {message}")]
    MalformedProgram {
        /// Description of the violated invariant.
        message: String,
        /// The source file in which this error was detected.
        file: &'static str,
        /// The source line in which this error was detected.
        line: u32,
    },

    /// I/O failure while writing a diagnostic export.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
