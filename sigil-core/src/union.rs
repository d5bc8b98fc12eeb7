/// Union checking with stable branch selection.
use std::rc::Rc;

use sigil_rt::{CheckError, ExecutionContext, TypeTag, TypeViolation, Value};

use crate::interfaces::Checker;

/// Accepts a value matching any branch, first-declared-branch-first.
///
/// Nominal branches dispatch by runtime identity: the first branch whose
/// `base_type` covers the value's tag wins outright. Structural branches
/// never identity-match (they report the `Structural` sentinel), so a
/// concrete class cannot satisfy two structural branches by accident; they
/// are tried as explicit conformance attempts, in declared order, after
/// identity dispatch has had its chance.
pub struct UnionChecker {
    branches: Vec<Rc<dyn Checker>>,
}

impl UnionChecker {
    pub fn new(branches: Vec<Rc<dyn Checker>>) -> Self {
        UnionChecker { branches }
    }
}

impl Checker for UnionChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        let tag = value.type_tag();
        for branch in &self.branches {
            if branch.base_type().contains(&tag) {
                return branch.check_and_wrap(value, ctx);
            }
        }
        for branch in &self.branches {
            let tags = branch.base_type();
            // Nominal branches already had their identity chance.
            if !tags.is_empty() && !tags.contains(&TypeTag::Structural) {
                continue;
            }
            match branch.check_and_wrap(value, ctx) {
                Ok(wrapped) => return Ok(wrapped),
                Err(CheckError::Violation(_)) => continue,
                // Definition errors in a branch are never swallowed.
                Err(other) => return Err(other),
            }
        }
        Err(ctx.wrap(TypeViolation::new(value, self.describe())).into())
    }

    fn describe(&self) -> String {
        self.branches
            .iter()
            .map(|b| b.describe())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn base_type(&self) -> Vec<TypeTag> {
        self.branches.iter().flat_map(|b| b.base_type()).collect()
    }

    fn may_change_identity(&self) -> bool {
        self.branches.iter().any(|b| b.may_change_identity())
    }
}
