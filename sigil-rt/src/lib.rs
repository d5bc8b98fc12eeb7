#![forbid(unsafe_code)]

mod decl;
mod error;
mod value;

pub use decl::{
    BindFailure, BoundArgs, CallArgs, Condition, MethodDecl, Param, ProtocolBuilder, ProtocolDecl,
    Sig, SigBuilder, MEMBER_BLACKLIST,
};
pub use error::{CheckError, DeclError, ExecutionContext, Frame, Responsibility, TypeViolation};
pub use value::{
    ClassBuilder, ClassDef, ClassId, Instance, Method, MethodImpl, ProxyState, TypeTag, Value,
};
