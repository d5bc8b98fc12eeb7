/// Property tests for call-argument binding.
///
/// Binding is the front door of every checked call; these pin the shape
/// invariants for arbitrary arities.
use proptest::prelude::*;

use sigil_ast::Location;
use sigil_rt::{CallArgs, Sig, Value};

fn sig_with_arity(n: usize) -> Sig {
    let mut builder = Sig::builder().receiver();
    for i in 0..n {
        builder = builder.arg(format!("p{i}"));
    }
    builder.build()
}

proptest! {
    #[test]
    fn bind_accepts_exact_arity(n in 0usize..6) {
        let sig = sig_with_arity(n);
        let args = CallArgs::positional((0..n).map(|i| Value::Int(i as i64)).collect());
        let bound = sig.bind(Some(Value::Unit), &args).unwrap();
        // receiver + declared parameters, in declared order
        prop_assert_eq!(bound.len(), n + 1);
        for i in 0..n {
            prop_assert_eq!(bound.get(&format!("p{i}")), Some(&Value::Int(i as i64)));
        }
    }

    #[test]
    fn bind_rejects_excess_positional(n in 0usize..4, extra in 1usize..4) {
        let sig = sig_with_arity(n);
        let args = CallArgs::positional(vec![Value::Unit; n + extra]);
        let err = sig.bind(Some(Value::Unit), &args).unwrap_err();
        prop_assert!(err.message.contains("too many positional arguments"));
    }

    #[test]
    fn bind_rejects_missing(n in 1usize..5) {
        let sig = sig_with_arity(n);
        let args = CallArgs::positional(vec![Value::Unit; n - 1]);
        let err = sig.bind(Some(Value::Unit), &args).unwrap_err();
        prop_assert!(err.message.contains("missing required argument"));
    }
}

#[test]
fn location_round_trip() {
    let site = Location::new("main.sg", 41);
    assert_eq!(site.display(), "main.sg:41");
}
