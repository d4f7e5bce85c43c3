use std::collections::BTreeSet;

use proptest::prelude::*;
use tracer_fit::domain::{Accuracy, FittingResult, ModelKind, Series};
use tracer_fit::session::registry::Registry;

#[derive(Debug, Clone)]
enum Op {
    Add(u8),
    Delete(Vec<usize>),
    Check(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3).prop_map(Op::Add),
        prop::collection::vec(1usize..8, 0..4).prop_map(Op::Delete),
        (1usize..8).prop_map(Op::Check),
    ]
}

fn result(tag: f64) -> FittingResult {
    FittingResult {
        model_type: ModelKind::Pfm,
        params: vec![tag],
        accuracy: Accuracy::StdError {
            params_accuracy: vec![0.0],
        },
        beta: None,
        mse: tag,
        model_efficiency: 0.0,
        observations: Series::default(),
        output: Series::default(),
        response_function: None,
    }
}

fn assert_invariants(reg: &Registry) {
    let ordinals: Vec<usize> = reg.entries().iter().map(|e| e.ordinal()).collect();
    let expected: Vec<usize> = (1..=reg.count()).collect();
    assert_eq!(ordinals, expected);

    let keys: BTreeSet<String> = reg.entries().iter().map(|e| e.display_name()).collect();
    assert_eq!(keys.len(), reg.count());
    reg.check_invariants().unwrap();
}

proptest! {
    #[test]
    fn ordinals_stay_dense_and_keys_unique(ops in prop::collection::vec(op(), 1..40)) {
        let mut reg = Registry::new();
        let mut counter = 0.0;

        for op in ops {
            match op {
                Op::Add(base) => {
                    counter += 1.0;
                    reg.add(&format!("site{base}"), result(counter));
                }
                Op::Delete(ordinals) => {
                    let ordinals: BTreeSet<usize> = ordinals.into_iter().collect();
                    let before: Vec<f64> = reg.entries().iter().map(|e| e.result().mse).collect();
                    if reg.delete(&ordinals).is_ok() {
                        // Survivors keep their relative order.
                        let expected: Vec<f64> = before
                            .iter()
                            .enumerate()
                            .filter(|(idx, _)| !ordinals.contains(&(idx + 1)))
                            .map(|(_, v)| *v)
                            .collect();
                        let after: Vec<f64> = reg.entries().iter().map(|e| e.result().mse).collect();
                        prop_assert_eq!(after, expected);
                    } else {
                        prop_assert_eq!(reg.count(), before.len());
                    }
                }
                Op::Check(ordinal) => {
                    let _ = reg.set_checked(ordinal, true);
                }
            }
            assert_invariants(&reg);
        }
    }
}
