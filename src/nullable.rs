// src/nullable.rs

//! Lets provider documents send `null` where a value is optional.
//!
//! Use as `#[serde(default, deserialize_with = "crate::nullable::deserialize")]`:
//! an absent field and an explicit `null` both yield `T::default()`.

use serde::{Deserialize, Deserializer};

pub(crate) fn deserialize<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}
