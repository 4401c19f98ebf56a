//! Latch Asset Pipeline
//!
//! The renderer never owns imported content: textures, meshes, and
//! materials are produced by an external asset pipeline and handed to
//! the frame graph as opaque, type-tagged pointers. This crate only
//! defines that handle and the shader-bytecode loading seam the core
//! calls into — no importer, registry, or loader lives here.

use std::marker::PhantomData;

/// An opaque, externally-owned resource handle. `T` only tags what kind
/// of content the holder expects — a `AssetPtr<Texture>` and an
/// `AssetPtr<Mesh>` with the same `id` are still distinct types, so a
/// pass declared to read a texture can't be handed a mesh by accident.
#[derive(Debug)]
pub struct AssetPtr<T> {
    id: u64,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AssetPtr<T> {
    pub fn new(id: u64, generation: u32) -> Self {
        Self { id, generation, _marker: PhantomData }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for AssetPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for AssetPtr<T> {}

impl<T> PartialEq for AssetPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}
impl<T> Eq for AssetPtr<T> {}

impl<T> std::hash::Hash for AssetPtr<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.generation.hash(state);
    }
}

/// Opaque compiled shader bytecode returned by a [`ShaderLoader`]. The
/// core neither compiles shaders nor parses reflection data from them;
/// pass bindings are declared explicitly through the frame graph's pass
/// builder instead.
pub struct ShaderBinary(pub Vec<u8>);

/// The core's seam into whatever shader compilation/packaging pipeline
/// an embedder uses. `name` is a logical name (e.g. `"blit.frag"`), not
/// a filesystem path — resolution is entirely up to the implementation.
pub trait ShaderLoader: Send + Sync {
    fn load_spirv(&self, name: &str) -> Result<ShaderBinary, ShaderLoadError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderLoadError {
    #[error("no shader registered under logical name '{0}'")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Texture;
    #[derive(Debug)]
    struct Mesh;

    #[test]
    fn distinct_tag_types_are_distinct_values() {
        let texture: AssetPtr<Texture> = AssetPtr::new(1, 0);
        let mesh: AssetPtr<Mesh> = AssetPtr::new(1, 0);
        assert_eq!(texture.id(), mesh.id());
        // Different types entirely; this just checks the handle itself
        // round-trips id/generation correctly.
        assert_eq!(texture.generation(), 0);
    }

    #[test]
    fn equality_requires_matching_generation() {
        let a: AssetPtr<Texture> = AssetPtr::new(5, 0);
        let b: AssetPtr<Texture> = AssetPtr::new(5, 1);
        assert_ne!(a, b);
    }
}
