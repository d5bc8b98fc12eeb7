/// The uniform checking capability.
use sigil_rt::{CheckError, ExecutionContext, TypeTag, Value};

/// A type checker validates a value against one declared type, possibly
/// returning a different object than it was given (a structural proxy).
pub trait Checker {
    /// Validate `value`; on success return it (or its wrapped stand-in).
    /// Failures are raised through `ctx`, which decorates them with the
    /// frames of the current call boundary.
    fn check_and_wrap(&self, value: &Value, ctx: &dyn ExecutionContext)
    -> Result<Value, CheckError>;

    /// Rendered type text for declarations and error reports.
    fn describe(&self) -> String;

    /// Runtime tags this checker accepts at the outermost level. Union
    /// resolution uses these to dispatch by identity; structural checkers
    /// report the `Structural` sentinel instead of any concrete tag.
    fn base_type(&self) -> Vec<TypeTag>;

    /// True when a successful check returns a different object than it was
    /// given.
    fn may_change_identity(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Checker({})", self.describe())
    }
}
