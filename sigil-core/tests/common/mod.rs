#![allow(dead_code)]

use std::rc::Rc;

use sigil_ast::Location;
use sigil_core::{CallsiteContext, ResolveCtx, TypeRegistry};
use sigil_rt::ClassDef;

/// A call-site location in the fixture program.
pub fn call_site(line: u32) -> Location {
    Location::new("main.sg", line)
}

pub fn ctx_at(line: u32) -> CallsiteContext {
    CallsiteContext::new(call_site(line))
}

/// Registry seeded with the class hierarchy the suites check against:
/// `A` (unrelated), `ParentB`, and `B` deriving from `ParentB`.
pub struct Fixture {
    pub registry: Rc<TypeRegistry>,
    pub a: Rc<ClassDef>,
    pub parent_b: Rc<ClassDef>,
    pub b: Rc<ClassDef>,
}

impl Fixture {
    pub fn resolve(&self) -> ResolveCtx {
        ResolveCtx::new(self.registry.clone())
    }
}

pub fn fixture() -> Fixture {
    let registry = Rc::new(TypeRegistry::new());
    let a = ClassDef::builder("A").location(Location::new("lib.sg", 1)).build();
    let parent_b = ClassDef::builder("ParentB")
        .location(Location::new("lib.sg", 4))
        .build();
    let b = ClassDef::builder("B")
        .parent(&parent_b)
        .location(Location::new("lib.sg", 7))
        .build();
    registry.register_class(&a);
    registry.register_class(&parent_b);
    registry.register_class(&b);
    Fixture {
        registry,
        a,
        parent_b,
        b,
    }
}
