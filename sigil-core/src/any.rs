/// Pass-through checkers.
use sigil_rt::{CheckError, ExecutionContext, TypeTag, TypeViolation, Value};

use crate::interfaces::Checker;

/// Accepts any value unchanged. Untyped positions resolve to this.
pub struct AnyChecker;

impl Checker for AnyChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        _ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        Ok(value.clone())
    }

    fn describe(&self) -> String {
        "Any".to_string()
    }

    fn base_type(&self) -> Vec<TypeTag> {
        Vec::new()
    }
}

/// Receiver pass-through. Receivers are established by dispatch, not by the
/// caller, so nothing is checked here.
pub struct SelfChecker;

impl Checker for SelfChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        _ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        Ok(value.clone())
    }

    fn describe(&self) -> String {
        "Self".to_string()
    }

    fn base_type(&self) -> Vec<TypeTag> {
        Vec::new()
    }
}

/// Accepts only the unit value; the implicit return type.
pub struct UnitChecker;

impl Checker for UnitChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        match value {
            Value::Unit => Ok(Value::Unit),
            _ => Err(ctx.wrap(TypeViolation::new(value, self.describe())).into()),
        }
    }

    fn describe(&self) -> String {
        "Unit".to_string()
    }

    fn base_type(&self) -> Vec<TypeTag> {
        vec![TypeTag::Unit]
    }
}
