/// Dynamic runtime object model.
///
/// Checks run against `Value`s: a handful of primitives plus class
/// instances. Classes are explicit dispatch tables built at runtime;
/// structural proxies are ordinary classes flagged as such, holding the
/// wrapped original and delegating non-contract access to it.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use sigil_ast::{ConstValue, Location};

use crate::decl::{CallArgs, Sig};
use crate::error::{CheckError, TypeViolation};

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, stable identity of a class. Proxy caches key on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The outermost runtime type of a value.
///
/// `Structural` never tags a value; it is the sentinel structural checkers
/// report from `base_type()`, so a concrete class can never satisfy a
/// structural union branch by identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Class(ClassId),
    Structural,
}

#[derive(Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Instance(Rc<Instance>),
}

impl Value {
    pub fn obj(class: &Rc<ClassDef>) -> Value {
        Value::Instance(Instance::new(class))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Unit => TypeTag::Unit,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::Instance(inst) => TypeTag::Class(inst.class.id),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Unit => "Unit".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Str(_) => "Str".to_string(),
            Value::Instance(inst) => inst.class.name.clone(),
        }
    }

    /// Short rendering for error reports.
    pub fn render(&self) -> String {
        match self {
            Value::Unit => "Unit".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => format!("{s:?}"),
            Value::Instance(inst) => format!("{} instance", inst.class.name),
        }
    }

    pub fn instance(&self) -> Option<&Rc<Instance>> {
        match self {
            Value::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn is_instance_of(&self, class: &Rc<ClassDef>) -> bool {
        match self {
            Value::Instance(inst) => inst.class.derives_from(class.id),
            _ => false,
        }
    }

    /// Strip structural proxies down to the innermost original value.
    pub fn unwrap_proxies(&self) -> Value {
        let mut current = self.clone();
        loop {
            let inner = match &current {
                Value::Instance(inst) => inst.proxy().map(|p| p.inner.clone()),
                _ => None,
            };
            match inner {
                Some(v) => current = v,
                None => return current,
            }
        }
    }

    /// Invoke a named method. Dispatch walks the class chain; on a proxy,
    /// names outside the contract fall through to the wrapped original.
    pub fn call(&self, name: &str, args: CallArgs, site: Location) -> Result<Value, CheckError> {
        match self {
            Value::Instance(inst) => {
                if let Some(method) = inst.class.find_method(name) {
                    (method.imp)(&site, self.clone(), args)
                } else if let Some(proxy) = inst.proxy() {
                    proxy.inner.call(name, args, site)
                } else {
                    Err(CheckError::NoSuchMember {
                        type_name: self.type_name(),
                        member: name.to_string(),
                        site,
                    })
                }
            }
            _ => Err(CheckError::NoSuchMember {
                type_name: self.type_name(),
                member: name.to_string(),
                site,
            }),
        }
    }

    /// Read an attribute; proxies delegate unknown names to the original.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Instance(inst) => {
                if let Some(value) = inst.fields.borrow().get(name) {
                    return Some(value.clone());
                }
                inst.proxy().and_then(|p| p.inner.get_attr(name))
            }
            _ => None,
        }
    }

    /// Write an attribute; proxies write through to the original.
    pub fn set_attr(&self, name: &str, value: Value) -> Result<(), CheckError> {
        match self {
            Value::Instance(inst) => {
                if let Some(proxy) = inst.proxy() {
                    return proxy.inner.set_attr(name, value);
                }
                inst.fields.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(CheckError::NoSuchMember {
                type_name: self.type_name(),
                member: name.to_string(),
                site: Location::new("<attribute>", 0),
            }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&ConstValue> for Value {
    fn from(constant: &ConstValue) -> Value {
        match constant {
            ConstValue::Unit => Value::Unit,
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::Int(i) => Value::Int(*i),
            ConstValue::Float(x) => Value::Float(*x),
            ConstValue::Str(s) => Value::Str(s.clone()),
        }
    }
}

pub type MethodImpl = Rc<dyn Fn(&Location, Value, CallArgs) -> Result<Value, CheckError>>;

/// A named member of a class: signature, declaration site and the
/// implementation closure.
pub struct Method {
    pub name: String,
    pub sig: Sig,
    pub location: Location,
    pub is_async: bool,
    pub imp: MethodImpl,
}

impl Method {
    /// A host-implemented method. Arguments are bound against `sig` (with
    /// defaults applied) before the closure runs; the closure receives the
    /// receiver and the bound non-receiver arguments in declared order.
    pub fn native<F>(name: impl Into<String>, sig: Sig, location: Location, f: F) -> Rc<Method>
    where
        F: Fn(Value, &[Value]) -> Result<Value, CheckError> + 'static,
    {
        Method::native_inner(name.into(), sig, location, false, f)
    }

    /// Same as `native`, but marks the member as asynchronous. Structural
    /// checking rejects these at proxy-synthesis time.
    pub fn native_async<F>(name: impl Into<String>, sig: Sig, location: Location, f: F) -> Rc<Method>
    where
        F: Fn(Value, &[Value]) -> Result<Value, CheckError> + 'static,
    {
        Method::native_inner(name.into(), sig, location, true, f)
    }

    fn native_inner<F>(name: String, sig: Sig, location: Location, is_async: bool, f: F) -> Rc<Method>
    where
        F: Fn(Value, &[Value]) -> Result<Value, CheckError> + 'static,
    {
        let bind_sig = sig.clone();
        let imp: MethodImpl = Rc::new(move |_site, recv, args| {
            let receiver = if bind_sig.has_receiver() {
                Some(recv.clone())
            } else {
                None
            };
            let bound = bind_sig
                .bind(receiver, &args)
                .map_err(|failure| CheckError::from(TypeViolation::call_shape(failure.message)))?;
            let skip = if bind_sig.has_receiver() { 1 } else { 0 };
            let tail: Vec<Value> = bound.entries()[skip..]
                .iter()
                .map(|(_, v)| v.clone())
                .collect();
            f(recv, &tail)
        });
        Rc::new(Method {
            name,
            sig,
            location,
            is_async,
            imp,
        })
    }

    /// A method whose closure handles binding itself. Used for synthesized
    /// proxy members, which bind against the contract signature instead.
    pub fn raw(name: impl Into<String>, sig: Sig, location: Location, imp: MethodImpl) -> Rc<Method> {
        Rc::new(Method {
            name: name.into(),
            sig,
            location,
            is_async: false,
            imp,
        })
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.sig.params.len())
            .field("is_async", &self.is_async)
            .finish()
    }
}

/// A runtime class: identity, optional parent, ordered method table.
pub struct ClassDef {
    id: ClassId,
    name: String,
    location: Location,
    parent: Option<Rc<ClassDef>>,
    methods: Vec<Rc<Method>>,
    proxy: bool,
}

impl ClassDef {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            name: name.into(),
            location: Location::new("<unknown>", 0),
            parent: None,
            methods: Vec::new(),
            proxy: false,
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn parent(&self) -> Option<&Rc<ClassDef>> {
        self.parent.as_ref()
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    pub fn derives_from(&self, id: ClassId) -> bool {
        if self.id == id {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.derives_from(id),
            None => false,
        }
    }

    /// Method lookup, parents included.
    pub fn find_method(&self, name: &str) -> Option<Rc<Method>> {
        self.methods
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_method(name)))
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.find_method(name).is_some()
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("methods", &self.methods.iter().map(|m| &m.name).collect::<Vec<_>>())
            .field("proxy", &self.proxy)
            .finish()
    }
}

pub struct ClassBuilder {
    name: String,
    location: Location,
    parent: Option<Rc<ClassDef>>,
    methods: Vec<Rc<Method>>,
    proxy: bool,
}

impl ClassBuilder {
    pub fn location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn parent(mut self, parent: &Rc<ClassDef>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn method(mut self, method: Rc<Method>) -> Self {
        self.methods.push(method);
        self
    }

    /// Mark the class as a structural proxy. Set by proxy synthesis only.
    pub fn proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn build(self) -> Rc<ClassDef> {
        Rc::new(ClassDef {
            id: ClassId::next(),
            name: self.name,
            location: self.location,
            parent: self.parent,
            methods: self.methods,
            proxy: self.proxy,
        })
    }
}

/// Proxy bookkeeping attached to an instance of a proxy class.
#[derive(Clone, Debug)]
pub struct ProxyState {
    /// The wrapped original (never itself a proxy).
    pub inner: Value,
    /// Pre-wrapped "does not implement protocol … correctly" template,
    /// carrying the frames of the context the wrap happened under.
    pub conformance_chain: TypeViolation,
}

/// A class instance: named fields plus, for proxies, the wrapped original.
pub struct Instance {
    class: Rc<ClassDef>,
    fields: RefCell<BTreeMap<String, Value>>,
    proxy: Option<ProxyState>,
}

impl Instance {
    pub fn new(class: &Rc<ClassDef>) -> Rc<Instance> {
        Rc::new(Instance {
            class: class.clone(),
            fields: RefCell::new(BTreeMap::new()),
            proxy: None,
        })
    }

    pub fn with_fields(class: &Rc<ClassDef>, fields: Vec<(String, Value)>) -> Rc<Instance> {
        Rc::new(Instance {
            class: class.clone(),
            fields: RefCell::new(fields.into_iter().collect()),
            proxy: None,
        })
    }

    pub fn new_proxy(
        class: &Rc<ClassDef>,
        inner: Value,
        conformance_chain: TypeViolation,
    ) -> Rc<Instance> {
        Rc::new(Instance {
            class: class.clone(),
            fields: RefCell::new(BTreeMap::new()),
            proxy: Some(ProxyState {
                inner,
                conformance_chain,
            }),
        })
    }

    pub fn class(&self) -> &Rc<ClassDef> {
        &self.class
    }

    pub fn proxy(&self) -> Option<&ProxyState> {
        self.proxy.as_ref()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("proxy", &self.proxy.is_some())
            .finish()
    }
}
