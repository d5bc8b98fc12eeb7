/// Structural ("protocol") checking.
///
/// A protocol declaration is checked at the call boundary: `check_and_wrap`
/// hands back a proxy whose members re-validate every invocation against the
/// declared contract. The member table is built once per checker, the proxy
/// class once per concrete implementing class; both are cached for the
/// checker's lifetime. Failures carry a blame chain ending in a "does not
/// implement protocol" statement wrapped at the site the value crossed the
/// contract boundary.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sigil_ast::{Location, TypeExpr};
use sigil_rt::{
    CallArgs, CheckError, ClassDef, Condition, DeclError, ExecutionContext, Frame, Instance,
    Method, ProtocolDecl, Responsibility, Sig, TypeTag, TypeViolation, Value, MEMBER_BLACKLIST,
};

use crate::any::{AnyChecker, SelfChecker, UnitChecker};
use crate::context::{ArgumentContext, ReturnContext};
use crate::interfaces::Checker;
use crate::registry::{BoundVarChecker, ResolveCtx};
use crate::wrapped::{bind_or_shape_error, check_bound, TypedFunction, WrappedCallable};

/// Self-position termination: a member referring to its own protocol checks
/// shallowly, by member-name presence, instead of re-expanding the contract.
pub struct SelfRefChecker {
    decl: Rc<ProtocolDecl>,
}

impl SelfRefChecker {
    pub fn new(decl: &Rc<ProtocolDecl>) -> Self {
        SelfRefChecker { decl: decl.clone() }
    }
}

impl Checker for SelfRefChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        let missing = match value.instance() {
            Some(inst) => self
                .decl
                .methods()
                .iter()
                .find(|m| !MEMBER_BLACKLIST.contains(&m.name.as_str()) && !inst.class().has_member(&m.name)),
            None => None,
        };
        match (value.instance(), missing) {
            (Some(_), None) => Ok(value.clone()),
            _ => Err(ctx.wrap(TypeViolation::new(value, self.describe())).into()),
        }
    }

    fn describe(&self) -> String {
        self.decl.name().to_string()
    }

    fn base_type(&self) -> Vec<TypeTag> {
        vec![TypeTag::Structural]
    }
}

/// One member's resolved obligations: the declared signature plus a checker
/// per position, referentially stable for the table's lifetime.
pub(crate) struct MemberEntry {
    pub(crate) name: String,
    pub(crate) sig: Sig,
    pub(crate) location: Location,
    pub(crate) checkers: Vec<(String, Rc<dyn Checker>)>,
    pub(crate) ret: Rc<dyn Checker>,
    pub(crate) condition: Option<Condition>,
}

type MemberTable = Rc<Vec<Rc<MemberEntry>>>;

fn is_self_reference(annotation: &TypeExpr, decl: &ProtocolDecl) -> bool {
    match annotation {
        TypeExpr::SelfTy => true,
        TypeExpr::Named(name) => name == decl.name(),
        TypeExpr::Applied { name, .. } => name == decl.name(),
        _ => false,
    }
}

/// Build the member table: per member, resolve every parameter and the
/// return position to a checker.
///
/// A member with no annotations anywhere is fully untyped and accepts
/// anything; a member with any annotation must annotate every non-receiver
/// parameter. Both rules, and unresolvable annotations, surface as
/// definition-time errors when the protocol is first used.
fn build_member_table(decl: &Rc<ProtocolDecl>, ctx: &ResolveCtx) -> Result<Vec<Rc<MemberEntry>>, CheckError> {
    let mut table = Vec::new();
    for method in decl.methods() {
        if MEMBER_BLACKLIST.contains(&method.name.as_str()) {
            continue;
        }

        let mut checkers: Vec<(String, Rc<dyn Checker>)> = Vec::new();
        let ret: Rc<dyn Checker>;
        if !method.sig.is_typed() {
            for (i, param) in method.sig.params.iter().enumerate() {
                let checker: Rc<dyn Checker> = if i == 0 && param.name == "self" {
                    Rc::new(SelfChecker)
                } else {
                    Rc::new(AnyChecker)
                };
                checkers.push((param.name.clone(), checker));
            }
            ret = Rc::new(AnyChecker);
        } else {
            for (i, param) in method.sig.params.iter().enumerate() {
                let checker: Rc<dyn Checker> = if i == 0 && param.name == "self" {
                    Rc::new(SelfChecker)
                } else {
                    match &param.annotation {
                        None => {
                            return Err(DeclError::new(format!(
                                "missing annotation for argument '{}' of function '{}' in protocol '{}'",
                                param.name,
                                method.name,
                                decl.name()
                            ))
                            .at(method.location.clone())
                            .into());
                        }
                        Some(annotation) if is_self_reference(annotation, decl) => {
                            Rc::new(SelfRefChecker::new(decl))
                        }
                        Some(annotation) => ctx.find_checker(annotation)?.ok_or_else(|| {
                            CheckError::from(
                                DeclError::new(format!(
                                    "unsupported type annotation: {} for argument '{}' of function '{}' in protocol '{}'",
                                    annotation.display(),
                                    param.name,
                                    method.name,
                                    decl.name()
                                ))
                                .at(method.location.clone()),
                            )
                        })?,
                    }
                };
                checkers.push((param.name.clone(), checker));
            }
            ret = match &method.sig.ret {
                None => Rc::new(UnitChecker),
                Some(annotation) if is_self_reference(annotation, decl) => {
                    Rc::new(SelfRefChecker::new(decl))
                }
                Some(annotation) => ctx.find_checker(annotation)?.ok_or_else(|| {
                    CheckError::from(
                        DeclError::new(format!(
                            "unsupported type annotation: {} for return value of function '{}' in protocol '{}'",
                            annotation.display(),
                            method.name,
                            decl.name()
                        ))
                        .at(method.location.clone()),
                    )
                })?,
            };
        }

        table.push(Rc::new(MemberEntry {
            name: method.name.clone(),
            sig: method.sig.clone(),
            location: method.location.clone(),
            checkers,
            ret,
            condition: method.condition.clone(),
        }));
    }
    Ok(table)
}

/// The structural-type checker: declaration plus resolved generic bindings,
/// a lazily-built member table, and a proxy-class cache keyed by the
/// concrete implementing class.
pub struct ProtocolChecker {
    decl: Rc<ProtocolDecl>,
    ctx: ResolveCtx,
    bindings: Vec<(String, Rc<dyn Checker>)>,
    members: RefCell<Option<MemberTable>>,
    wrappers: RefCell<HashMap<TypeTag, Rc<ClassDef>>>,
    altname: Option<String>,
}

impl ProtocolChecker {
    /// Bind `args` to the declaration's generic parameters, arity-checked.
    pub fn new(
        decl: &Rc<ProtocolDecl>,
        args: Vec<Rc<dyn Checker>>,
        ctx: &ResolveCtx,
    ) -> Result<ProtocolChecker, CheckError> {
        if args.len() != decl.generics().len() {
            return Err(DeclError::new(format!(
                "protocol '{}' expects {} generic argument(s), got {}",
                decl.name(),
                decl.generics().len(),
                args.len()
            ))
            .at(decl.location().clone())
            .into());
        }
        let bindings: Vec<(String, Rc<dyn Checker>)> = decl
            .generics()
            .iter()
            .zip(args)
            .map(|(name, arg)| {
                (
                    name.clone(),
                    Rc::new(BoundVarChecker::new(name.clone(), arg)) as Rc<dyn Checker>,
                )
            })
            .collect();
        Ok(ProtocolChecker {
            decl: decl.clone(),
            ctx: ctx.with_typevars(bindings.clone()),
            bindings,
            members: RefCell::new(None),
            wrappers: RefCell::new(HashMap::new()),
            altname: None,
        })
    }

    /// Display-name override for anonymous or ad-hoc structural types.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.altname = Some(name.into());
        self
    }

    pub fn decl(&self) -> &Rc<ProtocolDecl> {
        &self.decl
    }

    fn members(&self) -> Result<MemberTable, CheckError> {
        if let Some(table) = self.members.borrow().as_ref() {
            return Ok(table.clone());
        }
        let table: MemberTable = Rc::new(build_member_table(&self.decl, &self.ctx)?);
        *self.members.borrow_mut() = Some(table.clone());
        Ok(table)
    }

    fn conformance_violation(&self, original: &Value, note: String) -> TypeViolation {
        TypeViolation::new(original, self.describe())
            .with_header(format!(
                "{} does not meet the requirements of protocol {}.",
                original.type_name(),
                self.decl.name()
            ))
            .with_note(note)
    }

    /// Build the proxy class for one concrete implementing class.
    ///
    /// Conformance (member presence, signature width, callable kind) is
    /// checked here, once per concrete class, never per call.
    fn synthesize(
        &self,
        original: &Value,
        concrete: &Rc<ClassDef>,
        members: &MemberTable,
        ctx: &dyn ExecutionContext,
    ) -> Result<Rc<ClassDef>, CheckError> {
        let mut builder = ClassDef::builder(format!("{}For{}", self.decl.name(), concrete.name()))
            .location(self.decl.location().clone())
            .proxy(true);

        for entry in members.iter() {
            let Some(imp) = concrete.find_method(&entry.name) else {
                return Err(ctx
                    .wrap(self.conformance_violation(
                        original,
                        format!("it is missing the function '{}'", entry.name),
                    ))
                    .into());
            };
            if imp.is_async {
                return Err(DeclError::new(format!(
                    "unsupported callable kind: method '{}' of {} is asynchronous",
                    entry.name,
                    concrete.name()
                ))
                .at(imp.location.clone())
                .into());
            }
            for param in &entry.sig.params {
                if imp.sig.param(&param.name).is_none() {
                    return Err(ctx
                        .wrap(self.conformance_violation(
                            original,
                            format!(
                                "the signature of '{}' does not match; missing required parameter '{}'",
                                entry.name, param.name
                            ),
                        ))
                        .into());
                }
            }

            // The implementation's own contract, enforced independently.
            let inner = if imp.sig.is_typed() {
                Some(TypedFunction::build(&imp, Some(concrete), &self.ctx.fresh())?)
            } else {
                None
            };

            let member = Rc::new(WrappedMember {
                entry: entry.clone(),
                imp: imp.clone(),
                inner,
                proto_name: self.decl.name().to_string(),
            });
            let closure_member = member.clone();
            builder = builder.method(Method::raw(
                entry.name.clone(),
                entry.sig.clone(),
                entry.location.clone(),
                Rc::new(move |site, recv, args| closure_member.invoke(site, recv, args)),
            ));
        }
        Ok(builder.build())
    }
}

impl std::fmt::Debug for ProtocolChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolChecker")
            .field("protocol", &self.decl.name())
            .field("generics", &self.decl.generics())
            .finish()
    }
}

impl Checker for ProtocolChecker {
    fn check_and_wrap(
        &self,
        value: &Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<Value, CheckError> {
        // Idempotent wrapping: always start from the innermost original.
        let original = value.unwrap_proxies();
        let Some(inst) = original.instance() else {
            return Err(ctx
                .wrap(self.conformance_violation(
                    &original,
                    "only class instances can implement protocols".to_string(),
                ))
                .into());
        };

        let members = self.members()?;
        let tag = original.type_tag();
        let cached = self.wrappers.borrow().get(&tag).cloned();
        let proxy_class = match cached {
            Some(class) => class,
            None => {
                let class = self.synthesize(&original, inst.class(), &members, ctx)?;
                self.wrappers.borrow_mut().insert(tag, class.clone());
                class
            }
        };

        let chain = ctx.wrap(TypeViolation::new(&original, self.describe()).with_header(format!(
            "{} does not implement protocol {} correctly.",
            original.type_name(),
            self.describe()
        )));
        Ok(Value::Instance(Instance::new_proxy(
            &proxy_class,
            original.clone(),
            chain,
        )))
    }

    /// `Name[~T=..]` with the resolved generic parameters listed once each,
    /// in declaration order of first use; just `Name` when no generic
    /// parameter participates in any member.
    fn describe(&self) -> String {
        if let Some(name) = &self.altname {
            return name.clone();
        }
        let mut resolved: Vec<String> = Vec::new();
        let mut record = |annotation: &Option<TypeExpr>| {
            if let Some(TypeExpr::Var(var)) = annotation {
                if let Some((_, bound)) = self.bindings.iter().find(|(name, _)| name == var) {
                    let text = bound.describe();
                    if !resolved.contains(&text) {
                        resolved.push(text);
                    }
                }
            }
        };
        for method in self.decl.methods() {
            for param in &method.sig.params {
                record(&param.annotation);
            }
            record(&method.sig.ret);
        }
        if resolved.is_empty() {
            self.decl.name().to_string()
        } else {
            format!("{}[{}]", self.decl.name(), resolved.join(", "))
        }
    }

    fn base_type(&self) -> Vec<TypeTag> {
        // The sentinel keeps union branches from matching by identity.
        vec![TypeTag::Structural]
    }

    fn may_change_identity(&self) -> bool {
        true
    }
}

/// A proxy member: the protocol's obligations around one concrete
/// implementation method, plus the implementation's own obligations when it
/// is typed. Lives as long as the proxy class.
struct WrappedMember {
    entry: Rc<MemberEntry>,
    imp: Rc<Method>,
    inner: Option<Rc<TypedFunction>>,
    proto_name: String,
}

impl WrappedMember {
    /// One checked call: bind, pre-hook, check arguments against the
    /// protocol, re-bind and check against the implementation's own typed
    /// signature, invoke, check the return inward then outward.
    fn invoke(
        self: &Rc<Self>,
        site: &Location,
        proxy: Value,
        args: CallArgs,
    ) -> Result<Value, CheckError> {
        let state = proxy
            .instance()
            .and_then(|inst| inst.proxy().cloned())
            .ok_or_else(|| {
                CheckError::from(DeclError::new(format!(
                    "method '{}' of a protocol proxy invoked without its wrapped value",
                    self.entry.name
                )))
            })?;
        let inner_object = state.inner.clone();
        let chain = state.conformance_chain;

        let wc: Rc<dyn WrappedCallable> = self.clone();
        let ctxprv = {
            let wc = wc.clone();
            let site = site.clone();
            move |name: &str| -> Box<dyn ExecutionContext> {
                Box::new(ArgumentContext::new(wc.clone(), Some(site.clone()), name))
            }
        };
        let mut bound = bind_or_shape_error(self.as_ref(), Some(inner_object.clone()), &args, &ctxprv)?;
        if let Some(condition) = &self.entry.condition {
            condition.check_pre(&bound)?;
        }
        check_bound(self.as_ref(), &mut bound, &ctxprv)?;

        let call_bound = match &self.inner {
            Some(inner) => {
                let (receiver, keywords) =
                    bound.split_receiver(self.entry.sig.has_receiver(), &inner_object);
                let ctxprv = {
                    let member = self.clone();
                    let chain = chain.clone();
                    move |name: &str| -> Box<dyn ExecutionContext> {
                        Box::new(ProtocolArgumentContext {
                            member: member.clone(),
                            arg_name: name.to_string(),
                            chain: chain.clone(),
                        })
                    }
                };
                let mut bound =
                    bind_or_shape_error(inner.as_ref(), Some(receiver), &CallArgs::keywords(keywords), &ctxprv)?;
                check_bound(inner.as_ref(), &mut bound, &ctxprv)?;
                bound
            }
            None => bound.clone(),
        };

        let imp_has_receiver = match &self.inner {
            Some(inner) => inner.sig().has_receiver(),
            None => self.imp.sig.has_receiver(),
        };
        let (receiver, keywords) = call_bound.split_receiver(imp_has_receiver, &inner_object);
        let mut ret = (self.imp.imp)(site, receiver, CallArgs::keywords(keywords))?;

        if let Some(inner) = &self.inner {
            let ctx = ProtocolReturnContext {
                member: self.clone(),
                invert: Responsibility::In,
                chain: chain.clone(),
            };
            ret = inner.return_checker().check_and_wrap(&ret, &ctx)?;
        }
        if let Some(condition) = &self.entry.condition {
            condition.check_post(&ret, &bound)?;
        }
        let ctx = ProtocolReturnContext {
            member: self.clone(),
            invert: Responsibility::Out,
            chain,
        };
        self.entry.ret.check_and_wrap(&ret, &ctx)
    }
}

impl WrappedCallable for WrappedMember {
    fn name(&self) -> &str {
        &self.entry.name
    }

    fn sig(&self) -> &Sig {
        &self.entry.sig
    }

    fn checker_for(&self, param: &str) -> Option<Rc<dyn Checker>> {
        self.entry
            .checkers
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, checker)| checker.clone())
    }

    fn return_checker(&self) -> Rc<dyn Checker> {
        self.entry.ret.clone()
    }

    fn declared(&self) -> Location {
        self.entry.location.clone()
    }

    fn located(&self) -> Location {
        self.imp.location.clone()
    }
}

/// An argument failed the implementation's own contract inside a protocol
/// call. The frame renders the protocol's signature with the
/// implementation's stricter annotation spliced in, blames the
/// implementation, and chains the "does not implement protocol" statement.
struct ProtocolArgumentContext {
    member: Rc<WrappedMember>,
    arg_name: String,
    chain: TypeViolation,
}

impl ExecutionContext for ProtocolArgumentContext {
    fn wrap(&self, err: TypeViolation) -> TypeViolation {
        let (impl_expected, _) = err.next_type_and_indicator();
        let wc: Rc<dyn WrappedCallable> = self.member.clone();
        let err = ArgumentContext::new(wc, None, &self.arg_name).wrap(err);

        let (declared_type, indicator) = err.next_type_and_indicator();
        let mut err = err.with_frame(Frame {
            declared_type,
            indicator,
            declared: Some(self.member.declared()),
            responsible: Some(self.member.located()),
        });
        if let Some(outer) = self.member.checker_for(&self.arg_name) {
            err = err
                .with_note(format!(
                    "argument '{}' of method '{}' violates the type declared by protocol '{}'",
                    self.arg_name,
                    self.member.name(),
                    self.member.proto_name
                ))
                .with_note(format!(
                    "annotation '{}' is incompatible with the protocol's annotation '{}'",
                    impl_expected,
                    outer.describe()
                ));
        }
        err.with_previous_chain(self.chain.clone())
    }
}

/// A return value failed inside a protocol call.
///
/// The inward pass (`invert = In`) reports an implementation bug and stops
/// at the implementation's frame; the outward pass (`invert = Out`) inverts
/// responsibility onto the implementation, notes the incompatibility when
/// the implementation carries its own return annotation, and chains the
/// "does not implement protocol" statement.
struct ProtocolReturnContext {
    member: Rc<WrappedMember>,
    invert: Responsibility,
    chain: TypeViolation,
}

impl ExecutionContext for ProtocolReturnContext {
    fn wrap(&self, err: TypeViolation) -> TypeViolation {
        let wc: Rc<dyn WrappedCallable> = self.member.clone();
        let err = ReturnContext::new(wc).wrap(err);
        if err.responsibility() == self.invert {
            return err;
        }

        let (declared_type, indicator) = err.next_type_and_indicator();
        let mut err = err.with_inverted_responsibility().with_frame(Frame {
            declared_type,
            indicator,
            declared: Some(self.member.declared()),
            responsible: Some(self.member.located()),
        });
        if let Some(inner) = &self.member.inner {
            err = err
                .with_note(format!(
                    "the return value of method '{}' violates protocol '{}'",
                    self.member.name(),
                    self.member.proto_name
                ))
                .with_note(format!(
                    "annotation '{}' is incompatible with the protocol's annotation '{}'",
                    inner.return_checker().describe(),
                    self.member.return_checker().describe()
                ));
        }
        err.with_previous_chain(self.chain.clone())
    }
}
