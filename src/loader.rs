//! Asset loading: one glTF scene fragment, fetched once at startup.
//!
//! The native viewer reads from disk; the web viewer fetches over HTTP
//! (async, because browser fetch is async). Either way the fetch is
//! fire-and-forget: a failure is logged and the model simply stays absent,
//! which every per-frame path already tolerates.

use anyhow::{Context, Result};
use glam::Mat4;

use crate::geometry::MeshData;
use crate::scene::Material;

/// One renderable piece of a loaded model, with its transform within the
/// fragment.
pub struct ModelMesh {
    pub mesh: MeshData,
    pub transform: Mat4,
    pub material: Material,
}

/// A scene-graph-attachable fragment produced from a glTF document.
pub struct ModelFragment {
    pub meshes: Vec<ModelMesh>,
}

/// Parse a glTF (or GLB) byte buffer into a fragment.
pub fn parse_fragment(bytes: &[u8]) -> Result<ModelFragment> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).context("failed to parse glTF document")?;

    let mut meshes = Vec::new();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .context("glTF document contains no scene")?;

    for node in scene.nodes() {
        collect_meshes(&node, Mat4::IDENTITY, &buffers, &mut meshes);
    }

    tracing::debug!("parsed glTF fragment: {} mesh parts", meshes.len());
    Ok(ModelFragment { meshes })
}

fn collect_meshes(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<ModelMesh>,
) {
    let transform = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));

            let positions: Vec<[f32; 3]> = match reader.read_positions() {
                Some(iter) => iter.collect(),
                None => continue,
            };

            let normals: Vec<[f32; 3]> = match reader.read_normals() {
                Some(iter) => iter.collect(),
                // lighting degrades gracefully for unlit-authored assets
                None => vec![[0.0, 1.0, 0.0]; positions.len()],
            };

            let indices: Vec<u32> = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            let base = primitive
                .material()
                .pbr_metallic_roughness()
                .base_color_factor();

            out.push(ModelMesh {
                mesh: MeshData {
                    positions,
                    normals,
                    indices,
                },
                transform,
                material: Material {
                    color: glam::Vec3::new(base[0], base[1], base[2]),
                    shininess: 0.0,
                    opacity: base[3],
                    unlit: false,
                },
            });
        }
    }

    for child in node.children() {
        collect_meshes(&child, transform, buffers, out);
    }
}

/// Read and parse a model from disk (native viewer).
#[cfg(not(target_arch = "wasm32"))]
pub fn load_fragment(path: &std::path::Path) -> Result<ModelFragment> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read model: {}", path.display()))?;
    // progress is observable but behavior-neutral
    tracing::debug!("read {} bytes from {}", bytes.len(), path.display());
    parse_fragment(&bytes)
}

/// Fetch and parse a model over HTTP (web viewer).
#[cfg(target_arch = "wasm32")]
pub async fn fetch_fragment(url: &str) -> Result<ModelFragment> {
    let bytes = fetch_bytes(url).await?;
    tracing::debug!("fetched {} bytes from {url}", bytes.len());
    parse_fragment(&bytes)
}

#[cfg(target_arch = "wasm32")]
fn js_err(e: wasm_bindgen::JsValue) -> anyhow::Error {
    anyhow::anyhow!("{:?}", e)
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let win = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let resp_val = JsFuture::from(win.fetch_with_str(url))
        .await
        .map_err(js_err)?;
    let resp: web_sys::Response = resp_val.dyn_into().map_err(js_err)?;

    if !resp.ok() {
        anyhow::bail!("HTTP {} {}", resp.status(), resp.status_text());
    }

    let buf_promise = resp.array_buffer().map_err(js_err)?;
    let buf_val = JsFuture::from(buf_promise).await.map_err(js_err)?;
    let u8 = js_sys::Uint8Array::new(&buf_val);
    let mut out = vec![0u8; u8.length() as usize];
    u8.copy_to(&mut out);
    Ok(out)
}
