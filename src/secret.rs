use serde::Deserialize;
use std::fmt;

const MASK: &str = "*****";

/// A credential that never prints its contents.
///
/// `Display` and `Debug` both render a fixed mask, so the value can sit inside
/// configs that are logged with `{:?}`. Only the session login reads the raw
/// value through [`SecretString::reveal`].
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString({})", MASK)
    }
}
