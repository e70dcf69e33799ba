//! Asset classification by file extension.

/// Broad asset categories that affect how an asset is bundled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// A scene file. Scenes keep their extension in bundle names and are
    /// visited before every other asset during partitioning.
    Scene,
    /// A material. May be folded into its only referencing scene.
    Material,
    /// A shader or shader graph. Never bundled on its own.
    Shader,
    /// Metadata or source code that is never packed.
    NonPackable,
    /// Everything else.
    Other,
}

/// Extensions (lowercase, without dot) recognised as scenes.
pub const SCENE_EXTENSIONS: &[&str] = &["unity", "scene"];
/// Extensions recognised as materials.
pub const MATERIAL_EXTENSIONS: &[&str] = &["mat"];
/// Extensions recognised as shaders.
pub const SHADER_EXTENSIONS: &[&str] = &["shader", "shadergraph"];
/// Extensions that are never packed into a bundle.
pub const NON_PACKABLE_EXTENSIONS: &[&str] = &["meta", "cs", "js", "dll", "asmdef"];

impl AssetKind {
    /// Classify a path by its extension. Case-insensitive.
    pub fn of(path: &str) -> Self {
        let Some(ext) = extension(path) else {
            return AssetKind::Other;
        };
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();

        if SCENE_EXTENSIONS.contains(&ext) {
            AssetKind::Scene
        } else if MATERIAL_EXTENSIONS.contains(&ext) {
            AssetKind::Material
        } else if SHADER_EXTENSIONS.contains(&ext) {
            AssetKind::Shader
        } else if NON_PACKABLE_EXTENSIONS.contains(&ext) {
            AssetKind::NonPackable
        } else {
            AssetKind::Other
        }
    }

    /// Returns `true` for scene files.
    pub fn is_scene(self) -> bool {
        self == AssetKind::Scene
    }

    /// Returns `true` if assets of this kind may be written into a bundle.
    pub fn is_packable(self) -> bool {
        self != AssetKind::NonPackable
    }
}

/// Extension of the last path component, without the dot.
///
/// Dotfiles (`.gitignore`) and trailing dots have no extension.
pub fn extension(path: &str) -> Option<&str> {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.rfind('.') {
        Some(0) | None => None,
        Some(i) if i + 1 == file.len() => None,
        Some(i) => Some(&file[i + 1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(AssetKind::of("Assets/Main.unity"), AssetKind::Scene);
        assert_eq!(AssetKind::of("Assets/Level.SCENE"), AssetKind::Scene);
        assert_eq!(AssetKind::of("Assets/Rock.mat"), AssetKind::Material);
        assert_eq!(AssetKind::of("Assets/Lit.shadergraph"), AssetKind::Shader);
        assert_eq!(AssetKind::of("Assets/Rock.png.meta"), AssetKind::NonPackable);
        assert_eq!(AssetKind::of("Assets/Rock.png"), AssetKind::Other);
        assert_eq!(AssetKind::of("Assets/README"), AssetKind::Other);
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/c.txt"), Some("txt"));
        assert_eq!(extension("a/b.dir/c"), None);
        assert_eq!(extension("a/.hidden"), None);
        assert_eq!(extension("a/trailing."), None);
        assert_eq!(extension("a\\b\\c.PNG"), Some("PNG"));
    }
}
