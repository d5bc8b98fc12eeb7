/// Nominal membership checkers.
use std::rc::Rc;

use sigil_ast::Prim;
use sigil_rt::{CheckError, ClassDef, ExecutionContext, TypeTag, TypeViolation, Value};

use crate::interfaces::Checker;

fn prim_tag(prim: Prim) -> TypeTag {
    match prim {
        Prim::Bool => TypeTag::Bool,
        Prim::Int => TypeTag::Int,
        Prim::Float => TypeTag::Float,
        Prim::Str => TypeTag::Str,
    }
}

/// Accepts exactly one primitive kind.
pub struct PrimChecker {
    prim: Prim,
}

impl PrimChecker {
    pub fn new(prim: Prim) -> Self {
        PrimChecker { prim }
    }
}

impl Checker for PrimChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        if value.type_tag() == prim_tag(self.prim) {
            Ok(value.clone())
        } else {
            Err(ctx.wrap(TypeViolation::new(value, self.describe())).into())
        }
    }

    fn describe(&self) -> String {
        self.prim.display().to_string()
    }

    fn base_type(&self) -> Vec<TypeTag> {
        vec![prim_tag(self.prim)]
    }
}

/// Accepts instances of a class or any of its subclasses, unchanged.
pub struct InstanceOfChecker {
    class: Rc<ClassDef>,
}

impl InstanceOfChecker {
    pub fn new(class: &Rc<ClassDef>) -> Self {
        InstanceOfChecker {
            class: class.clone(),
        }
    }
}

impl Checker for InstanceOfChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        if value.is_instance_of(&self.class) {
            Ok(value.clone())
        } else {
            Err(ctx.wrap(TypeViolation::new(value, self.describe())).into())
        }
    }

    fn describe(&self) -> String {
        self.class.name().to_string()
    }

    fn base_type(&self) -> Vec<TypeTag> {
        vec![TypeTag::Class(self.class.id())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallsiteContext;
    use sigil_ast::Location;

    #[test]
    fn test_prim_checker() {
        let ctx = CallsiteContext::new(Location::new("t.sg", 1));
        let checker = PrimChecker::new(Prim::Int);
        assert!(checker.check_and_wrap(&Value::Int(1), &ctx).is_ok());
        let err = checker
            .check_and_wrap(&Value::Str("no".to_string()), &ctx)
            .unwrap_err();
        assert_eq!(err.violation().unwrap().expected(), "Int");
    }

    #[test]
    fn test_instance_of_walks_parents() {
        let ctx = CallsiteContext::new(Location::new("t.sg", 2));
        let base = ClassDef::builder("B").location(Location::new("lib.sg", 1)).build();
        let derived = ClassDef::builder("C")
            .parent(&base)
            .location(Location::new("lib.sg", 5))
            .build();
        let checker = InstanceOfChecker::new(&base);
        let value = Value::obj(&derived);
        assert!(checker.check_and_wrap(&value, &ctx).is_ok());

        let unrelated = ClassDef::builder("A").location(Location::new("lib.sg", 9)).build();
        let err = checker
            .check_and_wrap(&Value::obj(&unrelated), &ctx)
            .unwrap_err();
        assert_eq!(err.violation().unwrap().expected(), "B");
    }
}
