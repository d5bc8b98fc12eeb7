/// Signature schemas and structural-type declarations.
///
/// Contracts are expressed as explicit, introspectable data: an ordered
/// parameter list (name, optional annotation, optional default) plus an
/// optional return annotation. The leading parameter named `self` is the
/// receiver and never requires an annotation.
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use sigil_ast::{ConstValue, Location, TypeExpr};

use crate::error::CheckError;
use crate::value::Value;

/// Lifecycle and attribute-hook member names that are never part of a
/// structural contract.
pub const MEMBER_BLACKLIST: &[&str] = &[
    "new",
    "drop",
    "class",
    "getattr",
    "setattr",
    "subclasshook",
    "dir",
];

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub default: Option<ConstValue>,
}

/// An ordered, introspectable call signature.
#[derive(Clone, Debug, PartialEq)]
pub struct Sig {
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
}

impl Sig {
    pub fn builder() -> SigBuilder {
        SigBuilder {
            params: Vec::new(),
            ret: None,
        }
    }

    /// Whether the leading parameter is the receiver.
    pub fn has_receiver(&self) -> bool {
        self.params.first().is_some_and(|p| p.name == "self")
    }

    /// A signature is typed as soon as any non-receiver parameter or the
    /// return position carries an annotation. Receivers do not count.
    pub fn is_typed(&self) -> bool {
        let params_typed = self
            .params
            .iter()
            .skip(if self.has_receiver() { 1 } else { 0 })
            .any(|p| p.annotation.is_some());
        params_typed || self.ret.is_some()
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Bind call arguments against this signature, applying defaults.
    ///
    /// When the signature lacks a receiver but one is supplied, the receiver
    /// is treated as a leading positional argument; the resulting arity
    /// failure is what earns the missing-`self` hint upstream.
    pub fn bind(&self, recv: Option<Value>, args: &CallArgs) -> Result<BoundArgs, BindFailure> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        let mut positional: VecDeque<Value> = args.positional.iter().cloned().collect();
        let mut keywords: Vec<(String, Value)> = args.keywords.clone();

        let mut params = self.params.iter();
        if self.has_receiver() {
            let receiver = params.next().expect("has_receiver checked");
            match recv {
                Some(value) => entries.push((receiver.name.clone(), value)),
                None => {
                    return Err(BindFailure {
                        message: "missing receiver for bound call".to_string(),
                    });
                }
            }
        } else if let Some(value) = recv {
            positional.push_front(value);
        }

        for param in params {
            if let Some(value) = positional.pop_front() {
                if keywords.iter().any(|(k, _)| k == &param.name) {
                    return Err(BindFailure {
                        message: format!("got multiple values for argument '{}'", param.name),
                    });
                }
                entries.push((param.name.clone(), value));
            } else if let Some(idx) = keywords.iter().position(|(k, _)| k == &param.name) {
                let (name, value) = keywords.remove(idx);
                entries.push((name, value));
            } else if let Some(default) = &param.default {
                entries.push((param.name.clone(), Value::from(default)));
            } else {
                return Err(BindFailure {
                    message: format!("missing required argument '{}'", param.name),
                });
            }
        }

        if !positional.is_empty() {
            return Err(BindFailure {
                message: format!(
                    "too many positional arguments: expected at most {}, got {}",
                    self.params.len(),
                    entries.len() + positional.len()
                ),
            });
        }
        if let Some((name, _)) = keywords.first() {
            return Err(BindFailure {
                message: format!("unexpected keyword argument '{name}'"),
            });
        }

        Ok(BoundArgs { entries })
    }
}

pub struct SigBuilder {
    params: Vec<Param>,
    ret: Option<TypeExpr>,
}

impl SigBuilder {
    /// Add the receiver parameter.
    pub fn receiver(mut self) -> Self {
        self.params.push(Param {
            name: "self".to_string(),
            annotation: None,
            default: None,
        });
        self
    }

    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            annotation: None,
            default: None,
        });
        self
    }

    pub fn typed_arg(mut self, name: impl Into<String>, annotation: TypeExpr) -> Self {
        self.params.push(Param {
            name: name.into(),
            annotation: Some(annotation),
            default: None,
        });
        self
    }

    pub fn defaulted_arg(
        mut self,
        name: impl Into<String>,
        annotation: Option<TypeExpr>,
        default: ConstValue,
    ) -> Self {
        self.params.push(Param {
            name: name.into(),
            annotation,
            default: Some(default),
        });
        self
    }

    pub fn returns(mut self, annotation: TypeExpr) -> Self {
        self.ret = Some(annotation);
        self
    }

    pub fn build(self) -> Sig {
        Sig {
            params: self.params,
            ret: self.ret,
        }
    }
}

/// Positional plus keyword arguments of one call.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn none() -> Self {
        CallArgs::default()
    }

    pub fn positional(values: Vec<Value>) -> Self {
        CallArgs {
            positional: values,
            keywords: Vec::new(),
        }
    }

    pub fn keywords(pairs: Vec<(String, Value)>) -> Self {
        CallArgs {
            positional: Vec::new(),
            keywords: pairs,
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keywords.push((name.into(), value));
        self
    }
}

/// Arguments bound to declared parameter names, receiver first.
#[derive(Clone, Debug)]
pub struct BoundArgs {
    entries: Vec<(String, Value)>,
}

impl BoundArgs {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn name_at(&self, index: usize) -> &str {
        &self.entries[index].0
    }

    pub fn value_at(&self, index: usize) -> &Value {
        &self.entries[index].1
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.entries[index].1 = value;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Split into receiver and the remaining named arguments.
    ///
    /// `fallback` is used as the receiver when the bound signature had none.
    pub fn split_receiver(&self, has_receiver: bool, fallback: &Value) -> (Value, Vec<(String, Value)>) {
        if has_receiver && !self.entries.is_empty() {
            (
                self.entries[0].1.clone(),
                self.entries[1..].to_vec(),
            )
        } else {
            (fallback.clone(), self.entries.clone())
        }
    }
}

/// A call's shape did not fit the declared signature.
#[derive(Clone, Debug)]
pub struct BindFailure {
    pub message: String,
}

/// Optional contract-style hooks run around a member call, independent of
/// type checking. Failures propagate unmapped.
#[derive(Clone, Default)]
pub struct Condition {
    pre: Option<Rc<dyn Fn(&BoundArgs) -> Result<(), CheckError>>>,
    post: Option<Rc<dyn Fn(&Value, &BoundArgs) -> Result<(), CheckError>>>,
}

impl Condition {
    pub fn new() -> Self {
        Condition::default()
    }

    pub fn pre(mut self, hook: impl Fn(&BoundArgs) -> Result<(), CheckError> + 'static) -> Self {
        self.pre = Some(Rc::new(hook));
        self
    }

    pub fn post(
        mut self,
        hook: impl Fn(&Value, &BoundArgs) -> Result<(), CheckError> + 'static,
    ) -> Self {
        self.post = Some(Rc::new(hook));
        self
    }

    pub fn check_pre(&self, bound: &BoundArgs) -> Result<(), CheckError> {
        match &self.pre {
            Some(hook) => hook(bound),
            None => Ok(()),
        }
    }

    pub fn check_post(&self, ret: &Value, bound: &BoundArgs) -> Result<(), CheckError> {
        match &self.post {
            Some(hook) => hook(ret, bound),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

/// One member of a structural-type declaration.
#[derive(Clone, Debug)]
pub struct MethodDecl {
    pub name: String,
    pub sig: Sig,
    pub location: Location,
    pub condition: Option<Condition>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>, sig: Sig, location: Location) -> Self {
        MethodDecl {
            name: name.into(),
            sig,
            location,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A structural-type ("protocol") declaration: a name, generic parameters,
/// and an ordered set of member signatures. Immutable once built.
#[derive(Debug)]
pub struct ProtocolDecl {
    name: String,
    location: Location,
    generics: Vec<String>,
    methods: Vec<MethodDecl>,
}

impl ProtocolDecl {
    pub fn builder(name: impl Into<String>) -> ProtocolBuilder {
        ProtocolBuilder {
            name: name.into(),
            location: Location::new("<unknown>", 0),
            generics: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn generics(&self) -> &[String] {
        &self.generics
    }

    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }
}

pub struct ProtocolBuilder {
    name: String,
    location: Location,
    generics: Vec<String>,
    methods: Vec<MethodDecl>,
}

impl ProtocolBuilder {
    pub fn location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn generic(mut self, name: impl Into<String>) -> Self {
        self.generics.push(name.into());
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Rc<ProtocolDecl> {
        Rc::new(ProtocolDecl {
            name: self.name,
            location: self.location,
            generics: self.generics,
            methods: self.methods,
        })
    }
}
