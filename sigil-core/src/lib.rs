#![forbid(unsafe_code)]

mod any;
mod context;
mod instance;
mod interfaces;
mod protocol;
mod registry;
mod union;
mod wrapped;

pub use any::{AnyChecker, SelfChecker, UnitChecker};
pub use context::{ArgumentContext, CallsiteContext, ReturnContext};
pub use instance::{InstanceOfChecker, PrimChecker};
pub use interfaces::Checker;
pub use protocol::{ProtocolChecker, SelfRefChecker};
pub use registry::{build_checker, BoundVarChecker, ResolveCtx, TypeRegistry};
pub use union::UnionChecker;
pub use wrapped::{render_signature, Focus, TypedFunction, WrappedCallable};
