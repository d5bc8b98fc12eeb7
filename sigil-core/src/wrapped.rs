/// Checked-callable machinery shared by typed functions and structural
/// proxy members: signature rendering with a caret under the implicated
/// position, argument binding with call-shape errors, and the ordered
/// bind-check pipeline.
use std::rc::Rc;

use sigil_ast::{Location, TypeExpr};
use sigil_rt::{
    BoundArgs, CallArgs, CheckError, ClassDef, DeclError, ExecutionContext, Method, Sig,
    TypeViolation, Value,
};

use crate::any::{SelfChecker, UnitChecker};
use crate::context::{ArgumentContext, ReturnContext};
use crate::instance::InstanceOfChecker;
use crate::interfaces::Checker;
use crate::registry::ResolveCtx;

/// Which position of a rendered signature the inner error text is spliced
/// into.
pub enum Focus<'a> {
    None,
    Param(&'a str),
    Return,
}

/// A callable with resolved per-position checkers: a structural member or a
/// typed function. Contexts render signatures and pick blame locations
/// through this view.
pub trait WrappedCallable {
    fn name(&self) -> &str;
    fn sig(&self) -> &Sig;
    fn checker_for(&self, param: &str) -> Option<Rc<dyn Checker>>;
    fn return_checker(&self) -> Rc<dyn Checker>;
    /// Where the contract was declared.
    fn declared(&self) -> Location;
    /// Where the implementation lives.
    fn located(&self) -> Location;
}

fn pad_to(indicator: &mut String, len: usize) {
    while indicator.len() < len {
        indicator.push(' ');
    }
}

/// Render `name(param: Type, ...) -> Ret` with the focused position replaced
/// by `inner.0` and `inner.1` aligned beneath it as the caret line.
pub fn render_signature(
    wf: &dyn WrappedCallable,
    focus: Focus<'_>,
    inner: (&str, &str),
) -> (String, String) {
    let mut text = format!("{}(", wf.name());
    let mut indicator = String::new();
    pad_to(&mut indicator, text.len());

    for (i, param) in wf.sig().params.iter().enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        text.push_str(&param.name);
        text.push_str(": ");
        pad_to(&mut indicator, text.len());
        let focused = matches!(focus, Focus::Param(name) if name == param.name);
        if focused {
            text.push_str(inner.0);
            indicator.push_str(inner.1);
        } else {
            let described = wf
                .checker_for(&param.name)
                .map(|c| c.describe())
                .unwrap_or_else(|| "Any".to_string());
            text.push_str(&described);
        }
        pad_to(&mut indicator, text.len());
    }

    text.push_str(") -> ");
    pad_to(&mut indicator, text.len());
    if matches!(focus, Focus::Return) {
        text.push_str(inner.0);
        indicator.push_str(inner.1);
    } else {
        text.push_str(&wf.return_checker().describe());
    }
    pad_to(&mut indicator, text.len());

    (text, indicator)
}

/// Bind a call against the callable's signature, turning shape failures
/// into violations (with the missing-receiver hint when the declaration
/// lacks `self`).
pub fn bind_or_shape_error(
    wf: &dyn WrappedCallable,
    recv: Option<Value>,
    args: &CallArgs,
    ctxprv: &dyn Fn(&str) -> Box<dyn ExecutionContext>,
) -> Result<BoundArgs, CheckError> {
    match wf.sig().bind(recv, args) {
        Ok(bound) => Ok(bound),
        Err(failure) => {
            let mut err = TypeViolation::call_shape(failure.message);
            if !wf.sig().has_receiver() {
                err = err.with_note("hint: the 'self' parameter may have been omitted in the declaration");
            }
            Err(ctxprv("").wrap(err).into())
        }
    }
}

/// Check every bound argument in declared order, receiver first. The first
/// failing parameter aborts the rest; order decides which failure is
/// reported.
pub fn check_bound(
    wf: &dyn WrappedCallable,
    bound: &mut BoundArgs,
    ctxprv: &dyn Fn(&str) -> Box<dyn ExecutionContext>,
) -> Result<(), CheckError> {
    for index in 0..bound.len() {
        let name = bound.name_at(index).to_string();
        let Some(checker) = wf.checker_for(&name) else {
            continue;
        };
        let ctx = ctxprv(&name);
        let value = bound.value_at(index).clone();
        let checked = checker.check_and_wrap(&value, ctx.as_ref())?;
        bound.set(index, checked);
    }
    Ok(())
}

/// A callable wrapped with its own declared type obligations.
///
/// Built from any method whose signature is typed; every call is bound,
/// argument-checked, invoked, and return-checked. Also serves as the inner
/// obligation when a structural proxy delegates to a typed implementation.
pub struct TypedFunction {
    method: Rc<Method>,
    checkers: Vec<(String, Rc<dyn Checker>)>,
    ret: Rc<dyn Checker>,
}

impl TypedFunction {
    /// Resolve the method's annotations into checkers. Partially annotated
    /// signatures and unresolvable annotations are definition-time errors.
    /// `owner` resolves `Self` annotations for bound methods.
    pub fn build(
        method: &Rc<Method>,
        owner: Option<&Rc<ClassDef>>,
        ctx: &ResolveCtx,
    ) -> Result<Rc<TypedFunction>, CheckError> {
        if method.is_async {
            return Err(DeclError::new(format!(
                "unsupported callable kind: '{}' is asynchronous",
                method.name
            ))
            .at(method.location.clone())
            .into());
        }

        let resolve_self = |position: &str| -> Result<Rc<dyn Checker>, CheckError> {
            match owner {
                Some(class) => Ok(Rc::new(InstanceOfChecker::new(class))),
                None => Err(DeclError::new(format!(
                    "'Self' annotation on {position} of function '{}' outside a class",
                    method.name
                ))
                .at(method.location.clone())
                .into()),
            }
        };

        let mut checkers: Vec<(String, Rc<dyn Checker>)> = Vec::new();
        for (i, param) in method.sig.params.iter().enumerate() {
            let receiver = i == 0 && param.name == "self";
            let checker: Rc<dyn Checker> = if receiver {
                Rc::new(SelfChecker)
            } else {
                match &param.annotation {
                    None => {
                        return Err(DeclError::new(format!(
                            "missing annotation for argument '{}' of function '{}'",
                            param.name, method.name
                        ))
                        .at(method.location.clone())
                        .into());
                    }
                    Some(TypeExpr::SelfTy) => {
                        resolve_self(&format!("argument '{}'", param.name))?
                    }
                    Some(annotation) => ctx.find_checker(annotation)?.ok_or_else(|| {
                        CheckError::from(
                            DeclError::new(format!(
                                "unsupported type annotation: {} for argument '{}' of function '{}'",
                                annotation.display(),
                                param.name,
                                method.name
                            ))
                            .at(method.location.clone()),
                        )
                    })?,
                }
            };
            checkers.push((param.name.clone(), checker));
        }

        let ret: Rc<dyn Checker> = match &method.sig.ret {
            None => Rc::new(UnitChecker),
            Some(TypeExpr::SelfTy) => resolve_self("return value")?,
            Some(annotation) => ctx.find_checker(annotation)?.ok_or_else(|| {
                CheckError::from(
                    DeclError::new(format!(
                        "unsupported type annotation: {} for return value of function '{}'",
                        annotation.display(),
                        method.name
                    ))
                    .at(method.location.clone()),
                )
            })?,
        };

        Ok(Rc::new(TypedFunction {
            method: method.clone(),
            checkers,
            ret,
        }))
    }

    pub fn method(&self) -> &Rc<Method> {
        &self.method
    }

    /// A fully checked call: bind, check arguments, invoke, check return.
    pub fn call(
        self: &Rc<Self>,
        site: &Location,
        recv: Option<Value>,
        args: CallArgs,
    ) -> Result<Value, CheckError> {
        let wf: Rc<dyn WrappedCallable> = self.clone();
        let prv_wf = wf.clone();
        let prv_site = site.clone();
        let ctxprv = move |name: &str| -> Box<dyn ExecutionContext> {
            Box::new(ArgumentContext::new(prv_wf.clone(), Some(prv_site.clone()), name))
        };
        let mut bound = bind_or_shape_error(self.as_ref(), recv, &args, &ctxprv)?;
        check_bound(self.as_ref(), &mut bound, &ctxprv)?;

        let (receiver, keywords) =
            bound.split_receiver(self.method.sig.has_receiver(), &Value::Unit);
        let ret = (self.method.imp)(site, receiver, CallArgs::keywords(keywords))?;

        let rctx = ReturnContext::new(wf);
        self.ret.check_and_wrap(&ret, &rctx)
    }
}

impl std::fmt::Debug for TypedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedFunction")
            .field("name", &self.method.name)
            .field("ret", &self.ret.describe())
            .finish()
    }
}

impl WrappedCallable for TypedFunction {
    fn name(&self) -> &str {
        &self.method.name
    }

    fn sig(&self) -> &Sig {
        &self.method.sig
    }

    fn checker_for(&self, param: &str) -> Option<Rc<dyn Checker>> {
        self.checkers
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, checker)| checker.clone())
    }

    fn return_checker(&self) -> Rc<dyn Checker> {
        self.ret.clone()
    }

    fn declared(&self) -> Location {
        self.method.location.clone()
    }

    fn located(&self) -> Location {
        self.method.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use sigil_ast::Prim;

    fn resolve_ctx() -> ResolveCtx {
        ResolveCtx::new(Rc::new(TypeRegistry::new()))
    }

    fn double_fn() -> Rc<Method> {
        Method::native(
            "double",
            Sig::builder()
                .typed_arg("x", TypeExpr::Prim(Prim::Int))
                .returns(TypeExpr::Prim(Prim::Int))
                .build(),
            Location::new("lib.sg", 4),
            |_recv, args| match &args[0] {
                Value::Int(x) => Ok(Value::Int(x * 2)),
                other => Ok(other.clone()),
            },
        )
    }

    #[test]
    fn test_typed_function_checks_arguments() {
        let tf = TypedFunction::build(&double_fn(), None, &resolve_ctx()).unwrap();
        let site = Location::new("main.sg", 20);
        let out = tf
            .call(&site, None, CallArgs::positional(vec![Value::Int(21)]))
            .unwrap();
        assert_eq!(out, Value::Int(42));

        let err = tf
            .call(&site, None, CallArgs::positional(vec![Value::Str("no".to_string())]))
            .unwrap_err();
        let violation = err.violation().unwrap();
        let (ty, ind) = violation.next_type_and_indicator();
        assert_eq!(ty, "double(x: Int) -> Int");
        assert_eq!(ind.trim_end(), "          ^^^");
        assert_eq!(violation.last_responsible().unwrap().display(), "main.sg:20");
        assert_eq!(violation.last_declared().unwrap().display(), "lib.sg:4");
    }

    #[test]
    fn test_partial_annotations_rejected() {
        let method = Method::native(
            "half",
            Sig::builder()
                .arg("x")
                .returns(TypeExpr::Prim(Prim::Int))
                .build(),
            Location::new("lib.sg", 9),
            |_recv, _args| Ok(Value::Unit),
        );
        let err = TypedFunction::build(&method, None, &resolve_ctx()).unwrap_err();
        assert!(matches!(err, CheckError::Decl(_)));
        assert!(err.to_string().contains("missing annotation for argument 'x'"));
    }

    #[test]
    fn test_async_rejected() {
        let method = Method::native_async(
            "fetch",
            Sig::builder()
                .typed_arg("x", TypeExpr::Prim(Prim::Int))
                .returns(TypeExpr::Prim(Prim::Int))
                .build(),
            Location::new("lib.sg", 14),
            |_recv, _args| Ok(Value::Unit),
        );
        let err = TypedFunction::build(&method, None, &resolve_ctx()).unwrap_err();
        assert!(err.to_string().contains("unsupported callable kind"));
    }

    #[test]
    fn test_shape_error_hint_without_receiver() {
        let tf = TypedFunction::build(&double_fn(), None, &resolve_ctx()).unwrap();
        let site = Location::new("main.sg", 30);
        let err = tf
            .call(
                &site,
                None,
                CallArgs::positional(vec![Value::Int(1), Value::Int(2)]),
            )
            .unwrap_err();
        let violation = err.violation().unwrap();
        assert!(violation.header().unwrap().contains("too many positional arguments"));
        assert!(violation.notes().iter().any(|n| n.contains("'self' parameter may have been omitted")));
    }

    #[test]
    fn test_render_signature_focus_positions() {
        let tf = TypedFunction::build(&double_fn(), None, &resolve_ctx()).unwrap();
        let (text, ind) = render_signature(tf.as_ref(), Focus::Return, ("Int", "^^^"));
        assert_eq!(text, "double(x: Int) -> Int");
        assert_eq!(ind.trim_end(), "                  ^^^");
    }
}
