//! Bundle naming.
//!
//! The builder and the runtime must agree on the identifier of every bundle
//! without sharing any state, so an identifier is a pure function of the
//! normalized path: the lowercased path is hashed with BLAKE3 and the first
//! 16 bytes are hex-encoded, followed by [`BUNDLE_EXTENSION`].
//!
//! Non-scene asset paths have their extension stripped before hashing, so
//! `Assets/Textures/Rock.png` (what the builder sees) and
//! `Assets/Textures/Rock` (what game code asks for) name the same bundle.
//! Scenes keep their extension.

use crate::alloc::HashMap;
use crate::kind::{self, AssetKind};

/// Suffix appended to every bundle identifier.
pub const BUNDLE_EXTENSION: &str = ".bundle";

/// Number of hash bytes kept in an identifier.
const NAME_HASH_BYTES: usize = 16;

/// Normalize a path for hashing and comparison.
///
/// Backslashes become forward slashes, surrounding whitespace, leading `./`
/// and `/` are removed, repeated and trailing separators are collapsed, and
/// the result is lowercased.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut out = String::with_capacity(unified.len());

    for component in unified.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component);
    }

    out.to_lowercase()
}

/// The key used both as the hash input for file bundles and as the entry
/// name of the asset inside its archive.
pub fn object_key(path: &str) -> String {
    let normalized = normalize_path(path);
    if AssetKind::of(&normalized).is_scene() {
        return normalized;
    }

    match kind::extension(&normalized) {
        Some(ext) => normalized[..normalized.len() - ext.len() - 1].to_string(),
        None => normalized,
    }
}

/// Hash an already-normalized key into a bundle identifier.
///
/// The empty key maps to the empty identifier.
pub fn hash_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }

    let hash = blake3::hash(key.as_bytes());
    let hex = hash.to_hex();
    let mut name = String::with_capacity(NAME_HASH_BYTES * 2 + BUNDLE_EXTENSION.len());
    name.push_str(&hex.as_str()[..NAME_HASH_BYTES * 2]);
    name.push_str(BUNDLE_EXTENSION);
    name
}

/// Identifier of the file bundle holding a single asset.
pub fn bundle_name(path: &str) -> String {
    hash_key(&object_key(path))
}

/// Identifier of the bundle grouping every asset of a directory.
///
/// The trailing separator keeps directory bundles distinct from a file
/// bundle whose extension-stripped path happens to equal the directory.
pub fn directory_bundle_name(dir: &str) -> String {
    let normalized = normalize_path(dir);
    if normalized.is_empty() {
        return hash_key("/");
    }
    hash_key(&format!("{}/", normalized))
}

/// Identifier of a bundle named by an explicit custom tag.
pub fn custom_bundle_name(tag: &str) -> String {
    hash_key(&normalize_path(tag))
}

/// Caching front-end for [`bundle_name`].
///
/// # Example
///
/// ```
/// use bale_core::NameResolver;
///
/// let mut names = NameResolver::new();
/// let a = names.bundle_name("Assets/Textures/MyTexture");
/// let b = names.bundle_name("assets/textures/mytexture");
/// assert_eq!(a, b);
/// assert!(a.ends_with(".bundle"));
/// ```
#[derive(Debug, Default)]
pub struct NameResolver {
    cache: HashMap<String, String>,
}

impl NameResolver {
    /// Create a resolver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the bundle identifier for an asset path.
    ///
    /// Accepts `&str` or `Option<&str>`. Empty and absent paths yield the
    /// empty identifier and are not cached.
    pub fn bundle_name<'a>(&mut self, path: impl Into<Option<&'a str>>) -> String {
        let Some(path) = path.into() else {
            return String::new();
        };
        if path.is_empty() {
            return String::new();
        }

        if let Some(name) = self.cache.get(path) {
            return name.clone();
        }

        let name = bundle_name(path);
        self.cache.insert(path.to_string(), name.clone());
        name
    }

    /// Number of cached paths.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached entry.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("Assets\\Textures\\Rock.PNG"), "assets/textures/rock.png");
        assert_eq!(normalize_path("  ./Assets//Models/  "), "assets/models");
        assert_eq!(normalize_path("/Assets/a"), "assets/a");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_object_key_strips_extension_except_scenes() {
        assert_eq!(object_key("Assets/Textures/Rock.png"), "assets/textures/rock");
        assert_eq!(object_key("Assets/Textures/Rock"), "assets/textures/rock");
        assert_eq!(object_key("Assets/Scenes/Main.unity"), "assets/scenes/main.unity");
        assert_eq!(object_key("Assets/my.folder/Rock"), "assets/my.folder/rock");
    }

    #[test]
    fn test_bundle_name_case_insensitive() {
        assert_eq!(
            bundle_name("Assets/Textures/MyTexture"),
            bundle_name("assets/textures/mytexture")
        );
        assert_eq!(
            bundle_name("Assets/Textures/MyTexture.png"),
            bundle_name("assets/textures/mytexture")
        );
    }

    #[test]
    fn test_bundle_name_format() {
        let name = bundle_name("Assets/Textures/MyTexture");
        assert_eq!(name.len(), NAME_HASH_BYTES * 2 + BUNDLE_EXTENSION.len());
        assert!(name.ends_with(BUNDLE_EXTENSION));
        assert!(name[..32].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_scene_keeps_extension() {
        assert_ne!(bundle_name("Assets/Main.unity"), bundle_name("Assets/Main"));
    }

    #[test]
    fn test_directory_name_differs_from_file_name() {
        assert_ne!(directory_bundle_name("Assets/Textures"), bundle_name("Assets/Textures"));
        assert_eq!(
            directory_bundle_name("Assets/Textures/"),
            directory_bundle_name("assets\\textures")
        );
    }

    #[test]
    fn test_resolver_empty_is_not_cached() {
        let mut resolver = NameResolver::new();
        assert_eq!(resolver.bundle_name(""), "");
        assert_eq!(resolver.bundle_name(None::<&str>), "");
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_resolver_is_idempotent() {
        let mut resolver = NameResolver::new();
        let first = resolver.bundle_name("Assets/Prefabs/Hero.prefab");
        let second = resolver.bundle_name("Assets/Prefabs/Hero.prefab");
        assert_eq!(first, second);
        assert_eq!(first, bundle_name("Assets/Prefabs/Hero.prefab"));
        assert_eq!(resolver.cached(), 1);
    }
}
