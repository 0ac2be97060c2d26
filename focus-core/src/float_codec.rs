//! Lossless JSON encoding of `f64` arrays.
//!
//! JSON has no literal for infinities or NaN and `serde_json` writes them as
//! `null`. Finite values are written as numbers; the others as the strings
//! `"inf"`, `"-inf"` and `"NaN"`. Use through `#[serde(with = "crate::float_codec")]`
//! on a `Vec<f64>` field, or through [`FloatArray`] / [`FloatVec`] at the top
//! level of a file.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const POSITIVE_INFINITY: &str = "inf";
const NEGATIVE_INFINITY: &str = "-inf";
const NOT_A_NUMBER: &str = "NaN";

#[derive(Serialize)]
#[serde(untagged)]
enum Encoded<'a> {
    Number(f64),
    Special(&'a str),
}

impl Encoded<'static> {
    fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Encoded::Number(value)
        } else if value.is_nan() {
            Encoded::Special(NOT_A_NUMBER)
        } else if value > 0.0 {
            Encoded::Special(POSITIVE_INFINITY)
        } else {
            Encoded::Special(NEGATIVE_INFINITY)
        }
    }
}

fn decode_special<E: serde::de::Error>(text: &str) -> Result<f64, E> {
    match text {
        POSITIVE_INFINITY => Ok(f64::INFINITY),
        NEGATIVE_INFINITY => Ok(f64::NEG_INFINITY),
        NOT_A_NUMBER => Ok(f64::NAN),
        other => Err(E::custom(format!("invalid float literal '{other}'"))),
    }
}

/// Owned string form used while decoding; untagged buffering cannot borrow.
#[derive(Deserialize)]
#[serde(untagged)]
enum Decoded {
    Number(f64),
    Special(String),
}

pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|&v| Encoded::from_value(v)))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    Vec::<Decoded>::deserialize(deserializer)?
        .into_iter()
        .map(|value| match value {
            Decoded::Number(v) => Ok(v),
            Decoded::Special(text) => decode_special::<D::Error>(&text),
        })
        .collect()
}

/// Borrowed array written with the lossless encoding.
#[derive(Serialize)]
#[serde(transparent)]
pub struct FloatArray<'a>(#[serde(serialize_with = "serialize")] pub &'a [f64]);

/// Owned array read with the lossless encoding.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct FloatVec(#[serde(deserialize_with = "deserialize")] pub Vec<f64>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_values_survive() {
        let values = [1.5, f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -0.25];
        let json = serde_json::to_string(&FloatArray(&values)).unwrap();
        assert_eq!(json, r#"[1.5,"inf","-inf","NaN",-0.25]"#);

        let FloatVec(back) = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0], 1.5);
        assert_eq!(back[1], f64::INFINITY);
        assert_eq!(back[2], f64::NEG_INFINITY);
        assert!(back[3].is_nan());
        assert_eq!(back[4], -0.25);
    }

    #[test]
    fn test_plain_arrays_still_load() {
        let FloatVec(back) = serde_json::from_str("[0, 2, 3.25]").unwrap();
        assert_eq!(back, vec![0.0, 2.0, 3.25]);
    }

    #[test]
    fn test_unknown_literal_is_rejected() {
        assert!(serde_json::from_str::<FloatVec>(r#"[1.0, "infinity"]"#).is_err());
        assert!(serde_json::from_str::<FloatVec>("[null]").is_err());
    }
}
