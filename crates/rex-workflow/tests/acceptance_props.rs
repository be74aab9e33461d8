use proptest::prelude::*;
use rex_workflow::{acceptance_weight, TemperatureLadder};

proptest! {
    #[test]
    fn weight_stays_in_unit_interval(
        beta_a in 0.0f64..1e4,
        beta_b in 0.0f64..1e4,
        energy_a in -1e6f64..1e6,
        energy_b in -1e6f64..1e6,
    ) {
        let w = acceptance_weight(beta_a, energy_a, beta_b, energy_b);
        prop_assert!(w.is_finite());
        prop_assert!(w > 0.0);
        prop_assert!(w <= 1.0);
    }

    #[test]
    fn weight_is_safe_beyond_exp_overflow(product in 700.0f64..1e12, sign in prop::bool::ANY) {
        let energy = if sign { product } else { -product };
        let w = acceptance_weight(1.0, energy, 0.0, 0.0);
        prop_assert!(w.is_finite() && w > 0.0 && w <= 1.0);
        if sign {
            prop_assert_eq!(w, 1.0);
        }
    }

    #[test]
    fn equal_betas_give_unit_weight(
        beta in 0.0f64..1e3,
        energy_a in -1e9f64..1e9,
        energy_b in -1e9f64..1e9,
    ) {
        prop_assert_eq!(acceptance_weight(beta, energy_a, beta, energy_b), 1.0);
    }

    #[test]
    fn geometric_ladder_is_increasing_and_bounded(
        hot in 1e-3f64..5.0,
        span in 1.01f64..100.0,
        n in 1usize..64,
    ) {
        let cold = hot * span;
        let ladder = TemperatureLadder::geometric(hot, cold, n).unwrap();
        prop_assert_eq!(ladder.len(), n);
        prop_assert_eq!(ladder.hot(), hot);
        for beta in ladder.betas() {
            prop_assert!(*beta >= hot && *beta <= cold);
        }
        for pair in ladder.betas().windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        if n > 1 {
            prop_assert_eq!(ladder.cold(), cold);
        }
    }
}
