/// Blame-chain error model.
///
/// A failed check is described by a `TypeViolation`: the offending value, the
/// expected type text, and an ordered list of frames added as the error
/// crosses call boundaries on its way out. Each frame carries the declared
/// signature text with a caret indicator under the implicated position, plus
/// the location of the declaration that was violated and the location of the
/// party responsible for the value. Chained violations link a specific
/// failure to the enclosing "does not implement protocol" statement.
use miette::Diagnostic;
use thiserror::Error;

use sigil_ast::Location;

use crate::value::Value;

/// Which side of a call boundary is on the hook for a value.
///
/// Arguments flow in (the caller supplied them), return values flow out
/// (the callee produced them). Protocol contexts flip this when an error
/// crosses from the implementation's own contract to the structural one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Responsibility {
    In,
    Out,
}

impl Responsibility {
    pub fn invert(self) -> Self {
        match self {
            Responsibility::In => Responsibility::Out,
            Responsibility::Out => Responsibility::In,
        }
    }
}

/// One step of the blame chain.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Declared signature or type text at this boundary.
    pub declared_type: String,
    /// Caret line marking the implicated position within `declared_type`.
    pub indicator: String,
    /// Where the violated declaration lives.
    pub declared: Option<Location>,
    /// Where the offending value came from.
    pub responsible: Option<Location>,
}

/// A value failed a declared-type check.
///
/// Construction starts from the innermost failing check; execution contexts
/// decorate the violation with frames as it propagates outward.
#[derive(Clone, Debug)]
pub struct TypeViolation {
    given: String,
    given_type: String,
    expected: String,
    header: Option<String>,
    frames: Vec<Frame>,
    notes: Vec<String>,
    responsibility: Responsibility,
    previous: Option<Box<TypeViolation>>,
}

impl TypeViolation {
    pub fn new(given: &Value, expected: impl Into<String>) -> Self {
        TypeViolation {
            given: given.render(),
            given_type: given.type_name(),
            expected: expected.into(),
            header: None,
            frames: Vec::new(),
            notes: Vec::new(),
            responsibility: Responsibility::In,
            previous: None,
        }
    }

    /// A call could not even be bound to the declared signature.
    pub fn call_shape(message: impl Into<String>) -> Self {
        TypeViolation {
            given: String::new(),
            given_type: String::new(),
            expected: String::new(),
            header: Some(message.into()),
            frames: Vec::new(),
            notes: Vec::new(),
            responsibility: Responsibility::In,
            previous: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_inverted_responsibility(mut self) -> Self {
        self.responsibility = self.responsibility.invert();
        self
    }

    pub fn with_previous_chain(mut self, previous: TypeViolation) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn given(&self) -> &str {
        &self.given
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn responsibility(&self) -> Responsibility {
        self.responsibility
    }

    pub fn previous_chain(&self) -> Option<&TypeViolation> {
        self.previous.as_deref()
    }

    /// The declared-type text and caret indicator of the outermost frame,
    /// or the bare expected type when no frame has been attached yet.
    ///
    /// Contexts use this to splice the inner text into the next, wider
    /// signature rendering.
    pub fn next_type_and_indicator(&self) -> (String, String) {
        match self.frames.last() {
            Some(frame) => (frame.declared_type.clone(), frame.indicator.clone()),
            None => (self.expected.clone(), "^".repeat(self.expected.len())),
        }
    }

    /// Outermost frame location of the party the value is blamed on.
    pub fn last_responsible(&self) -> Option<Location> {
        self.frames.iter().rev().find_map(|f| f.responsible.clone())
    }

    /// Outermost frame location of the violated declaration.
    pub fn last_declared(&self) -> Option<Location> {
        self.frames.iter().rev().find_map(|f| f.declared.clone())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(header) = &self.header {
            out.push_str(header);
            out.push('\n');
        }
        let (ty, indicator) = self.next_type_and_indicator();
        if !ty.is_empty() {
            out.push_str(&format!("expected: {ty}\n"));
            if !indicator.trim().is_empty() {
                out.push_str(&format!("          {}\n", indicator.trim_end()));
            }
        }
        if !self.given.is_empty() {
            out.push_str(&format!("given:    {} (of type {})\n", self.given, self.given_type));
        }
        if let Some(declared) = self.last_declared() {
            out.push_str(&format!("declared at {}\n", declared.display()));
        }
        if let Some(responsible) = self.last_responsible() {
            out.push_str(&format!("blamed on   {}\n", responsible.display()));
        }
        for note in &self.notes {
            out.push_str(&format!("note: {note}\n"));
        }
        if let Some(previous) = &self.previous {
            out.push_str("\npart of a wider violation:\n");
            out.push_str(&previous.render());
        }
        out
    }
}

impl std::fmt::Display for TypeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl std::error::Error for TypeViolation {}

/// A declaration itself is ill-formed: partially annotated member,
/// unresolvable annotation, generic arity mismatch, unsupported callable
/// kind. Raised when the declaration is first used, never per call.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct DeclError {
    pub message: String,
    pub location: Option<Location>,
}

impl DeclError {
    pub fn new(message: impl Into<String>) -> Self {
        DeclError {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Everything a check or a checked call can fail with.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckError {
    #[error(transparent)]
    #[diagnostic(code(sigil::decl))]
    Decl(#[from] DeclError),

    #[error(transparent)]
    #[diagnostic(code(sigil::violation))]
    Violation(Box<TypeViolation>),

    #[error("no member '{member}' on {type_name} (called at {site})")]
    #[diagnostic(code(sigil::member))]
    NoSuchMember {
        type_name: String,
        member: String,
        site: Location,
    },

    #[error("condition failed: {message}")]
    #[diagnostic(code(sigil::condition))]
    Condition { message: String },
}

impl From<TypeViolation> for CheckError {
    fn from(violation: TypeViolation) -> Self {
        CheckError::Violation(Box::new(violation))
    }
}

impl CheckError {
    /// The violation payload, when this error is one.
    pub fn violation(&self) -> Option<&TypeViolation> {
        match self {
            CheckError::Violation(v) => Some(v),
            _ => None,
        }
    }
}

/// A link in the per-call context chain.
///
/// Contexts decorate a violation with one frame of information as it
/// propagates outward, and may delegate to a parent context.
pub trait ExecutionContext {
    fn wrap(&self, err: TypeViolation) -> TypeViolation;
}
