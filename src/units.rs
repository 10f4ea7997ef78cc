use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Converts a length to whole millimeters. Unknown units are treated as
/// centimeters. An unset or zero value yields an empty string, which the
/// marketplace reads as "not specified" rather than zero.
pub fn to_millimeters(value: Option<Decimal>, unit: &str) -> String {
    let value = match value {
        Some(v) if !v.is_zero() => v,
        _ => return String::new(),
    };
    let mm = match unit {
        "m" => value * dec!(1000),
        "cm" => value * dec!(10),
        "mm" => value,
        "in" => value * dec!(25.4),
        "yd" => value * dec!(914.4),
        _ => value * dec!(10),
    };
    round_whole(mm)
}

/// Converts a weight to whole grams. Unknown units are treated as kilograms.
pub fn to_grams(value: Option<Decimal>, unit: &str) -> String {
    let value = match value {
        Some(v) if !v.is_zero() => v,
        _ => return String::new(),
    };
    let g = match unit {
        "kg" => value * dec!(1000),
        "g" => value,
        "lbs" => value * dec!(453.592),
        "oz" => value * dec!(28.3495),
        _ => value * dec!(1000),
    };
    round_whole(g)
}

fn round_whole(value: Decimal) -> String {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn converts_lengths_to_millimeters() {
        assert_eq!("1000", to_millimeters(Some(dec!(1)), "m"));
        assert_eq!("10", to_millimeters(Some(dec!(1)), "cm"));
        assert_eq!("1", to_millimeters(Some(dec!(1)), "mm"));
        assert_eq!("25", to_millimeters(Some(dec!(1)), "in"));
        assert_eq!("914", to_millimeters(Some(dec!(1)), "yd"));
    }

    #[test]
    fn unknown_length_unit_is_treated_as_cm() {
        assert_eq!("120", to_millimeters(Some(dec!(12)), "furlong"));
    }

    #[test]
    fn unset_and_zero_lengths_stay_empty() {
        assert_eq!("", to_millimeters(None, "cm"));
        assert_eq!("", to_millimeters(Some(Decimal::ZERO), "cm"));
        assert_eq!("", to_grams(None, "kg"));
        assert_eq!("", to_grams(Some(Decimal::ZERO), "kg"));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // 0.25 cm -> 2.5 mm -> 3 mm
        assert_eq!("3", to_millimeters(Some(dec!(0.25)), "cm"));
        assert_eq!("13", to_millimeters(Some(dec!(0.5)), "in"));
    }

    #[test]
    fn is_monotonic_in_value() {
        let samples = [dec!(0.1), dec!(1), dec!(2.5), dec!(17), dec!(240)];
        for unit in ["m", "cm", "mm", "in", "yd"] {
            let mut last = -1i64;
            for v in samples {
                let mm: i64 = to_millimeters(Some(v), unit).parse().unwrap();
                assert!(mm >= last, "{unit} not monotonic at {v}");
                last = mm;
            }
        }
    }

    #[test]
    fn converts_weights_to_grams() {
        assert_eq!("1000", to_grams(Some(dec!(1)), "kg"));
        assert_eq!("1", to_grams(Some(dec!(1)), "g"));
        assert_eq!("454", to_grams(Some(dec!(1)), "lbs"));
        assert_eq!("28", to_grams(Some(dec!(1)), "oz"));
        assert_eq!("500", to_grams(Some(dec!(0.5)), "unknown"));
    }
}
