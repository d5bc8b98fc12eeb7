/// Annotation resolution.
///
/// The registry maps names to classes and protocol declarations; a
/// `ResolveCtx` carries the registry plus the generic bindings in scope and
/// turns `TypeExpr`s into checkers. Resolution happens once per declaration
/// use; the resulting checkers are held for the lifetime of whatever table
/// they land in.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sigil_ast::TypeExpr;
use sigil_rt::{CheckError, ClassDef, DeclError, ExecutionContext, ProtocolDecl, TypeTag, Value};

use crate::any::{AnyChecker, UnitChecker};
use crate::instance::{InstanceOfChecker, PrimChecker};
use crate::interfaces::Checker;
use crate::protocol::ProtocolChecker;
use crate::union::UnionChecker;

/// Name-keyed registration of classes and protocol declarations.
///
/// Names are unique across both tables; classes shadow protocols when a
/// name is registered twice.
#[derive(Default)]
pub struct TypeRegistry {
    classes: RefCell<BTreeMap<String, Rc<ClassDef>>>,
    protocols: RefCell<BTreeMap<String, Rc<ProtocolDecl>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register_class(&self, class: &Rc<ClassDef>) {
        self.classes
            .borrow_mut()
            .insert(class.name().to_string(), class.clone());
    }

    pub fn register_protocol(&self, decl: &Rc<ProtocolDecl>) {
        self.protocols
            .borrow_mut()
            .insert(decl.name().to_string(), decl.clone());
    }

    pub fn class(&self, name: &str) -> Option<Rc<ClassDef>> {
        self.classes.borrow().get(name).cloned()
    }

    pub fn protocol(&self, name: &str) -> Option<Rc<ProtocolDecl>> {
        self.protocols.borrow().get(name).cloned()
    }
}

/// A generic parameter bound to its resolution.
///
/// Delegates checking to the resolved checker; only the rendering differs,
/// so error reports show which parameter the substituted type came from.
pub struct BoundVarChecker {
    name: String,
    inner: Rc<dyn Checker>,
}

impl BoundVarChecker {
    pub fn new(name: impl Into<String>, inner: Rc<dyn Checker>) -> Self {
        BoundVarChecker {
            name: name.into(),
            inner,
        }
    }
}

impl Checker for BoundVarChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        self.inner.check_and_wrap(value, ctx)
    }

    fn describe(&self) -> String {
        format!("~{}={}", self.name, self.inner.describe())
    }

    fn base_type(&self) -> Vec<TypeTag> {
        self.inner.base_type()
    }

    fn may_change_identity(&self) -> bool {
        self.inner.may_change_identity()
    }
}

/// Resolution context: registry handle plus the generic bindings in scope.
#[derive(Clone)]
pub struct ResolveCtx {
    registry: Rc<TypeRegistry>,
    bindings: Vec<(String, Rc<dyn Checker>)>,
}

impl ResolveCtx {
    pub fn new(registry: Rc<TypeRegistry>) -> Self {
        ResolveCtx {
            registry,
            bindings: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Rc<TypeRegistry> {
        &self.registry
    }

    /// Derive a child context with additional generic bindings. Inner
    /// bindings shadow outer ones of the same name.
    pub fn with_typevars(&self, bindings: Vec<(String, Rc<dyn Checker>)>) -> ResolveCtx {
        let mut merged = bindings;
        for (name, checker) in &self.bindings {
            if !merged.iter().any(|(n, _)| n == name) {
                merged.push((name.clone(), checker.clone()));
            }
        }
        ResolveCtx {
            registry: self.registry.clone(),
            bindings: merged,
        }
    }

    /// A binding-free sibling context. Implementer-side annotations resolve
    /// in their own namespace, not under the contract's generic bindings.
    pub fn fresh(&self) -> ResolveCtx {
        ResolveCtx::new(self.registry.clone())
    }

    pub fn binding(&self, name: &str) -> Option<Rc<dyn Checker>> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, checker)| checker.clone())
    }

    /// Resolve an annotation to a checker.
    ///
    /// `Ok(None)` means the annotation is not supported in this context
    /// (unknown name, unbound generic parameter, `Self` outside a
    /// declaration); callers turn that into a definition-time error naming
    /// the position.
    pub fn find_checker(
        &self,
        annotation: &TypeExpr,
    ) -> Result<Option<Rc<dyn Checker>>, CheckError> {
        let checker: Rc<dyn Checker> = match annotation {
            TypeExpr::Any => Rc::new(AnyChecker),
            TypeExpr::Unit => Rc::new(UnitChecker),
            TypeExpr::Prim(prim) => Rc::new(PrimChecker::new(*prim)),
            // Resolved by the enclosing declaration, which knows its own type.
            TypeExpr::SelfTy => return Ok(None),
            TypeExpr::Var(name) => match self.binding(name) {
                Some(bound) => bound,
                None => return Ok(None),
            },
            TypeExpr::Named(name) => {
                if let Some(class) = self.registry.class(name) {
                    Rc::new(InstanceOfChecker::new(&class))
                } else if let Some(proto) = self.registry.protocol(name) {
                    Rc::new(ProtocolChecker::new(&proto, Vec::new(), self)?)
                } else {
                    return Ok(None);
                }
            }
            TypeExpr::Applied { name, args } => {
                let Some(proto) = self.registry.protocol(name) else {
                    return Ok(None);
                };
                let mut resolved = Vec::new();
                for arg in args {
                    resolved.push(build_checker(arg, self)?);
                }
                Rc::new(ProtocolChecker::new(&proto, resolved, self)?)
            }
            TypeExpr::Union(items) => {
                let mut branches = Vec::new();
                for item in items {
                    branches.push(build_checker(item, self)?);
                }
                Rc::new(UnionChecker::new(branches))
            }
        };
        Ok(Some(checker))
    }
}

/// Resolve an annotation, rejecting anything the context cannot support.
///
/// The single entry point for turning a declared type into a checker.
pub fn build_checker(
    annotation: &TypeExpr,
    ctx: &ResolveCtx,
) -> Result<Rc<dyn Checker>, CheckError> {
    match ctx.find_checker(annotation)? {
        Some(checker) => Ok(checker),
        None => Err(DeclError::new(format!(
            "unsupported type annotation: {}",
            annotation.display()
        ))
        .into()),
    }
}
