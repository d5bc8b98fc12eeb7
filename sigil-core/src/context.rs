/// Execution contexts: the per-call chain that decorates a violation with
/// one frame per boundary as it propagates outward.
use std::rc::Rc;

use sigil_ast::Location;
use sigil_rt::{ExecutionContext, Frame, TypeViolation};

use crate::wrapped::{render_signature, Focus, WrappedCallable};

/// Root context carrying the call site a check was requested from.
pub struct CallsiteContext {
    site: Location,
}

impl CallsiteContext {
    pub fn new(site: Location) -> Self {
        CallsiteContext { site }
    }
}

impl ExecutionContext for CallsiteContext {
    fn wrap(&self, err: TypeViolation) -> TypeViolation {
        let (declared_type, indicator) = err.next_type_and_indicator();
        err.with_frame(Frame {
            declared_type,
            indicator,
            declared: None,
            responsible: Some(self.site.clone()),
        })
    }
}

/// An argument position of a checked callable failed.
///
/// The frame shows the full declared signature with the inner expected type
/// spliced into the failing parameter, blames the call site, and points at
/// the contract declaration.
pub struct ArgumentContext {
    wf: Rc<dyn WrappedCallable>,
    site: Option<Location>,
    param: String,
}

impl ArgumentContext {
    pub fn new(wf: Rc<dyn WrappedCallable>, site: Option<Location>, param: &str) -> Self {
        ArgumentContext {
            wf,
            site,
            param: param.to_string(),
        }
    }
}

impl ExecutionContext for ArgumentContext {
    fn wrap(&self, err: TypeViolation) -> TypeViolation {
        let inner = err.next_type_and_indicator();
        let focus = if self.param.is_empty() {
            Focus::None
        } else {
            Focus::Param(&self.param)
        };
        let (declared_type, indicator) =
            render_signature(self.wf.as_ref(), focus, (&inner.0, &inner.1));
        err.with_frame(Frame {
            declared_type,
            indicator,
            declared: Some(self.wf.declared()),
            responsible: self.site.clone(),
        })
    }
}

/// The return position of a checked callable failed. The implementation is
/// both the declaring and the responsible party.
pub struct ReturnContext {
    wf: Rc<dyn WrappedCallable>,
}

impl ReturnContext {
    pub fn new(wf: Rc<dyn WrappedCallable>) -> Self {
        ReturnContext { wf }
    }
}

impl ExecutionContext for ReturnContext {
    fn wrap(&self, err: TypeViolation) -> TypeViolation {
        let inner = err.next_type_and_indicator();
        let (declared_type, indicator) =
            render_signature(self.wf.as_ref(), Focus::Return, (&inner.0, &inner.1));
        err.with_frame(Frame {
            declared_type,
            indicator,
            declared: Some(self.wf.located()),
            responsible: Some(self.wf.located()),
        })
    }
}
