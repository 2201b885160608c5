//! Property tests for the structural-comparison and codec laws.

use proptest::prelude::*;

use super::generators::{arb_expr, respan};
use crate::serialization::{deserialize_expr, serialize_expr};
use crate::{structural_equal, structural_hash};

proptest! {
    /// Reflexivity in both mapping modes.
    #[test]
    fn equal_to_self(expr in arb_expr()) {
        prop_assert!(structural_equal(&expr, &expr, false));
        prop_assert!(structural_equal(&expr, &expr, true));
    }

    /// Span changes never affect equality or hashes.
    #[test]
    fn span_insensitive(expr in arb_expr()) {
        let stripped = respan(&expr);
        for auto_map in [false, true] {
            prop_assert!(structural_equal(&expr, &stripped, auto_map));
            prop_assert_eq!(
                structural_hash(&expr, auto_map),
                structural_hash(&stripped, auto_map)
            );
        }
    }

    /// decode(encode(e)) is structurally equal to e, and hashes agree
    /// (the `eq => same hash` law exercised through the codec).
    #[test]
    fn codec_roundtrip(expr in arb_expr()) {
        let bytes = serialize_expr(&expr).unwrap();
        let decoded = deserialize_expr(&bytes).unwrap();
        prop_assert!(structural_equal(&expr, &decoded, false));
        prop_assert_eq!(structural_hash(&expr, false), structural_hash(&decoded, false));
    }

    /// Encoding is deterministic for a fixed tree.
    #[test]
    fn encoding_deterministic(expr in arb_expr()) {
        let a = serialize_expr(&expr).unwrap();
        let b = serialize_expr(&expr).unwrap();
        prop_assert_eq!(a, b);
    }
}
