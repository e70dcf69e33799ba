//! Types that can be instantiated from serialized objects.

use crate::error::{BundleError, BundleResult};

/// An object type the [`ResourceLoader`](crate::ResourceLoader) can produce.
///
/// # Example
///
/// ```
/// use bale_bundles::{Asset, BundleError, BundleResult};
///
/// struct Level {
///     rows: Vec<String>,
/// }
///
/// impl Asset for Level {
///     fn type_name() -> &'static str {
///         "Level"
///     }
///
///     fn from_bytes(name: &str, bytes: &[u8]) -> BundleResult<Self> {
///         let text = std::str::from_utf8(bytes).map_err(|e| BundleError::DecodeError {
///             name: name.to_string(),
///             message: e.to_string(),
///         })?;
///         Ok(Level { rows: text.lines().map(String::from).collect() })
///     }
/// }
/// ```
pub trait Asset: Send + Sync + Sized + 'static {
    /// Human-readable name of the type, used in logs.
    fn type_name() -> &'static str;

    /// Build the object from its serialized bytes.
    fn from_bytes(name: &str, bytes: &[u8]) -> BundleResult<Self>;
}

impl Asset for Vec<u8> {
    fn type_name() -> &'static str {
        "Bytes"
    }

    fn from_bytes(_name: &str, bytes: &[u8]) -> BundleResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl Asset for String {
    fn type_name() -> &'static str {
        "Text"
    }

    fn from_bytes(name: &str, bytes: &[u8]) -> BundleResult<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| BundleError::DecodeError {
            name: name.to_string(),
            message: format!("Invalid UTF-8: {}", e),
        })
    }
}
