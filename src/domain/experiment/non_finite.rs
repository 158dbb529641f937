//! Serde helpers for `f64` fields that may hold infinities or NaN
//!
//! JSON has no literal for non-finite numbers, so they are written as the
//! strings `"inf"`, `"-inf"` and `"NaN"`. Finite values stay plain numbers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const POSITIVE_INFINITY: &str = "inf";
const NEGATIVE_INFINITY: &str = "-inf";
const NOT_A_NUMBER: &str = "NaN";

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
}

impl Repr {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                POSITIVE_INFINITY => Ok(f64::INFINITY),
                NEGATIVE_INFINITY => Ok(f64::NEG_INFINITY),
                NOT_A_NUMBER => Ok(f64::NAN),
                other => Err(E::custom(format!("invalid floating point value '{}'", other))),
            },
        }
    }
}

fn label(value: f64) -> &'static str {
    if value.is_nan() {
        NOT_A_NUMBER
    } else if value > 0.0 {
        POSITIVE_INFINITY
    } else {
        NEGATIVE_INFINITY
    }
}

pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_str(label(*value))
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Repr::deserialize(deserializer)?.into_f64()
}

struct Lossless(f64);

impl Serialize for Lossless {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(&self.0, serializer)
    }
}

/// Same encoding for `Option<f64>`; `None` stays `null`
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&Lossless(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            Some(repr) => repr.into_f64().map(Some),
            None => Ok(None),
        }
    }
}
