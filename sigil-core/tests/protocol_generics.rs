/// Integration tests for parameterized protocols: generic binding,
/// description rendering with substituted parameters, and checking through
/// bound generic positions.
mod common;

use std::rc::Rc;

use common::{call_site, ctx_at, fixture, Fixture};
use sigil_ast::{Location, TypeExpr};
use sigil_core::{build_checker, Checker};
use sigil_rt::{CallArgs, CheckError, ClassDef, Method, MethodDecl, ProtocolDecl, Sig, Value};

fn returns_generic(fx: &Fixture) -> Rc<ProtocolDecl> {
    let decl = ProtocolDecl::builder("ReturnsGeneric")
        .location(Location::new("proto.sg", 1))
        .generic("T")
        .method(MethodDecl::new(
            "meth",
            Sig::builder().receiver().returns(TypeExpr::var("T")).build(),
            Location::new("proto.sg", 2),
        ))
        .build();
    fx.registry.register_protocol(&decl);
    decl
}

fn receives_generic(fx: &Fixture) -> Rc<ProtocolDecl> {
    let decl = ProtocolDecl::builder("ReceivesGeneric")
        .location(Location::new("proto.sg", 5))
        .generic("T")
        .method(MethodDecl::new(
            "meth",
            Sig::builder()
                .receiver()
                .typed_arg("b", TypeExpr::var("T"))
                .returns(TypeExpr::Unit)
                .build(),
            Location::new("proto.sg", 6),
        ))
        .build();
    fx.registry.register_protocol(&decl);
    decl
}

#[test]
fn test_description_renders_substitution() {
    let fx = fixture();
    returns_generic(&fx);
    let checker = build_checker(
        &TypeExpr::applied("ReturnsGeneric", vec![TypeExpr::named("B")]),
        &fx.resolve(),
    )
    .unwrap();
    assert_eq!(checker.describe(), "ReturnsGeneric[~T=B]");
}

#[test]
fn test_description_without_generic_participation() {
    let fx = fixture();
    // A generic parameter declared but unused by any member does not show.
    let decl = ProtocolDecl::builder("Phantom")
        .location(Location::new("proto.sg", 10))
        .generic("T")
        .method(MethodDecl::new(
            "ping",
            Sig::builder().receiver().returns(TypeExpr::Unit).build(),
            Location::new("proto.sg", 11),
        ))
        .build();
    fx.registry.register_protocol(&decl);
    let checker = build_checker(
        &TypeExpr::applied("Phantom", vec![TypeExpr::named("B")]),
        &fx.resolve(),
    )
    .unwrap();
    assert_eq!(checker.describe(), "Phantom");
}

#[test]
fn test_generic_return_checked_against_binding() {
    let fx = fixture();
    returns_generic(&fx);
    let checker = build_checker(
        &TypeExpr::applied("ReturnsGeneric", vec![TypeExpr::named("B")]),
        &fx.resolve(),
    )
    .unwrap();

    let a = fx.a.clone();
    let concrete = ClassDef::builder("GivesA")
        .location(Location::new("impl.sg", 1))
        .method(Method::native(
            "meth",
            Sig::builder().receiver().build(),
            Location::new("impl.sg", 2),
            move |_recv, _args| Ok(Value::obj(&a)),
        ))
        .build();

    let proxy = checker.check_and_wrap(&Value::obj(&concrete), &ctx_at(10)).unwrap();
    let err = proxy.call("meth", CallArgs::none(), call_site(11)).unwrap_err();
    let violation = err.violation().unwrap();
    let (text, indicator) = violation.next_type_and_indicator();
    assert_eq!(text, "meth(self: Self) -> ~T=B");
    assert_eq!(indicator.trim_end(), "                    ^^^^");
}

#[test]
fn test_generic_argument_checked_against_binding() {
    let fx = fixture();
    receives_generic(&fx);
    let checker = build_checker(
        &TypeExpr::applied("ReceivesGeneric", vec![TypeExpr::named("B")]),
        &fx.resolve(),
    )
    .unwrap();

    let concrete = ClassDef::builder("TakesAnything")
        .location(Location::new("impl.sg", 5))
        .method(Method::native(
            "meth",
            Sig::builder().receiver().arg("b").build(),
            Location::new("impl.sg", 6),
            |_recv, _args| Ok(Value::Unit),
        ))
        .build();

    let proxy = checker.check_and_wrap(&Value::obj(&concrete), &ctx_at(20)).unwrap();
    let ok = proxy
        .call("meth", CallArgs::positional(vec![Value::obj(&fx.b)]), call_site(21))
        .unwrap();
    assert_eq!(ok, Value::Unit);

    let err = proxy
        .call("meth", CallArgs::positional(vec![Value::obj(&fx.a)]), call_site(22))
        .unwrap_err();
    let violation = err.violation().unwrap();
    let (text, _) = violation.next_type_and_indicator();
    assert_eq!(text, "meth(self: Self, b: ~T=B) -> Unit");
    assert_eq!(violation.last_responsible().unwrap().display(), "main.sg:22");
    assert_eq!(violation.last_declared().unwrap().display(), "proto.sg:6");
}

#[test]
fn test_missing_member_names_parameterized_protocol() {
    let fx = fixture();
    returns_generic(&fx);
    let checker = build_checker(
        &TypeExpr::applied("ReturnsGeneric", vec![TypeExpr::named("B")]),
        &fx.resolve(),
    )
    .unwrap();

    let no_meth = ClassDef::builder("NoMeth")
        .location(Location::new("impl.sg", 10))
        .build();
    let err = checker.check_and_wrap(&Value::obj(&no_meth), &ctx_at(30)).unwrap_err();
    let violation = err.violation().unwrap();
    let (text, indicator) = violation.next_type_and_indicator();
    assert_eq!(text, "ReturnsGeneric[~T=B]");
    assert_eq!(indicator.trim_end(), "^".repeat(text.len()));
}

#[test]
fn test_generic_arity_errors() {
    let fx = fixture();
    returns_generic(&fx);

    // Unparameterized use of a generic protocol.
    let err = build_checker(&TypeExpr::named("ReturnsGeneric"), &fx.resolve()).unwrap_err();
    assert!(matches!(err, CheckError::Decl(_)));
    assert!(err
        .to_string()
        .contains("protocol 'ReturnsGeneric' expects 1 generic argument(s), got 0"));

    // Too many arguments.
    let err = build_checker(
        &TypeExpr::applied(
            "ReturnsGeneric",
            vec![TypeExpr::named("B"), TypeExpr::named("A")],
        ),
        &fx.resolve(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("got 2"));
}

#[test]
fn test_shared_parameter_listed_once() {
    let fx = fixture();
    let decl = ProtocolDecl::builder("Pipe")
        .location(Location::new("proto.sg", 15))
        .generic("T")
        .method(MethodDecl::new(
            "read",
            Sig::builder().receiver().returns(TypeExpr::var("T")).build(),
            Location::new("proto.sg", 16),
        ))
        .method(MethodDecl::new(
            "write",
            Sig::builder()
                .receiver()
                .typed_arg("item", TypeExpr::var("T"))
                .returns(TypeExpr::Unit)
                .build(),
            Location::new("proto.sg", 17),
        ))
        .build();
    fx.registry.register_protocol(&decl);

    let checker = build_checker(
        &TypeExpr::applied("Pipe", vec![TypeExpr::named("B")]),
        &fx.resolve(),
    )
    .unwrap();
    assert_eq!(checker.describe(), "Pipe[~T=B]");
}
