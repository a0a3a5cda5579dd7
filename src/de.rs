use serde::de::{Deserialize, Deserializer};

/// Try to deserialize an `Option<T>` but use a default value if that fails
pub fn deserialize_or_default<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let opt: Option<T> = Deserialize::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Deserialize a present field as `Some`, even when its value is `null`.
///
/// Combined with `#[serde(default)]` this separates a missing key (`None`)
/// from an explicit `null` (`Some(Value::Null)`).
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
