//! Background removal engines
//!
//! Two interchangeable engines sit behind one adapter: the primary
//! `withoutbg` engine (ONNX Runtime) and the pure-Rust `rembg` fallback
//! (Tract). Engine handles are expensive to build (the model loads on
//! first use), so the adapter keeps one lazily-initialized handle per
//! engine for the lifetime of the process and shares it across requests.

#[cfg(feature = "onnx")]
pub mod onnx;
mod preprocess;
#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;
#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::error::{CutoutError, Result};
use image::{DynamicImage, RgbaImage};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// The two background removal engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Primary engine, backed by ONNX Runtime
    Withoutbg,
    /// Fallback engine, backed by Tract
    Rembg,
}

impl Engine {
    /// The wire name of this engine
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Withoutbg => "withoutbg",
            Self::Rembg => "rembg",
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::Withoutbg
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "withoutbg" => Ok(Self::Withoutbg),
            "rembg" => Ok(Self::Rembg),
            other => Err(CutoutError::UnknownEngine(other.to_string())),
        }
    }
}

/// A loaded engine handle
///
/// Implementations own whatever runtime state their inference needs and
/// must be shareable across concurrent requests.
pub trait RemovalBackend: Send + Sync {
    /// Remove the background from an image, returning the transparent
    /// foreground
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Adapter over the two engines with process-wide handle caching
///
/// Each handle is constructed at most once, under mutual exclusion; every
/// caller after the first reuses the cached handle. A failed
/// initialization leaves the slot empty so a later request retries.
pub struct Remover {
    withoutbg_model: PathBuf,
    rembg_model: PathBuf,
    withoutbg: OnceCell<Arc<dyn RemovalBackend>>,
    rembg: OnceCell<Arc<dyn RemovalBackend>>,
}

impl Remover {
    /// Create an adapter that loads each engine from its model file on
    /// first use
    #[must_use]
    pub fn new(withoutbg_model: impl Into<PathBuf>, rembg_model: impl Into<PathBuf>) -> Self {
        Self {
            withoutbg_model: withoutbg_model.into(),
            rembg_model: rembg_model.into(),
            withoutbg: OnceCell::new(),
            rembg: OnceCell::new(),
        }
    }

    /// Create an adapter with pre-built engine handles (no lazy loading)
    ///
    /// The injection seam for tests and embedders that construct backends
    /// themselves.
    #[must_use]
    pub fn with_backends(
        withoutbg: Arc<dyn RemovalBackend>,
        rembg: Arc<dyn RemovalBackend>,
    ) -> Self {
        Self {
            withoutbg_model: PathBuf::new(),
            rembg_model: PathBuf::new(),
            withoutbg: OnceCell::new_with(Some(withoutbg)),
            rembg: OnceCell::new_with(Some(rembg)),
        }
    }

    /// Remove the background from an image with the selected engine
    ///
    /// The first call per engine performs the slow model load; inference
    /// itself runs on the blocking thread pool.
    pub async fn process(&self, image: &DynamicImage, engine: Engine) -> Result<RgbaImage> {
        let backend = self.handle(engine).await?;
        let image = image.clone();
        tokio::task::spawn_blocking(move || backend.remove_background(&image))
            .await
            .map_err(|e| CutoutError::processing(format!("Inference task failed: {e}")))?
    }

    async fn handle(&self, engine: Engine) -> Result<Arc<dyn RemovalBackend>> {
        let handle = match engine {
            Engine::Withoutbg => {
                self.withoutbg
                    .get_or_try_init(|| load_backend(self.withoutbg_model.clone(), load_withoutbg))
                    .await?
            },
            Engine::Rembg => {
                self.rembg
                    .get_or_try_init(|| load_backend(self.rembg_model.clone(), load_rembg))
                    .await?
            },
        };
        Ok(Arc::clone(handle))
    }
}

impl fmt::Debug for Remover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remover")
            .field("withoutbg_model", &self.withoutbg_model)
            .field("rembg_model", &self.rembg_model)
            .field("withoutbg_loaded", &self.withoutbg.initialized())
            .field("rembg_loaded", &self.rembg.initialized())
            .finish()
    }
}

async fn load_backend(
    path: PathBuf,
    loader: fn(&Path) -> Result<Arc<dyn RemovalBackend>>,
) -> Result<Arc<dyn RemovalBackend>> {
    tokio::task::spawn_blocking(move || loader(&path))
        .await
        .map_err(|e| CutoutError::processing(format!("Engine initialization task failed: {e}")))?
}

#[cfg(feature = "onnx")]
fn load_withoutbg(path: &Path) -> Result<Arc<dyn RemovalBackend>> {
    Ok(Arc::new(OnnxBackend::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_withoutbg(_path: &Path) -> Result<Arc<dyn RemovalBackend>> {
    Err(CutoutError::model(
        "withoutbg engine unavailable: built without the 'onnx' feature",
    ))
}

#[cfg(feature = "tract")]
fn load_rembg(path: &Path) -> Result<Arc<dyn RemovalBackend>> {
    Ok(Arc::new(TractBackend::load(path)?))
}

#[cfg(not(feature = "tract"))]
fn load_rembg(_path: &Path) -> Result<Arc<dyn RemovalBackend>> {
    Err(CutoutError::model(
        "rembg engine unavailable: built without the 'tract' feature",
    ))
}

/// Encode an image as PNG bytes
///
/// Used where handlers return raw bytes rather than a filesystem path.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image.write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Backend that marks every pixel half-transparent
    struct HalfAlphaBackend;

    impl RemovalBackend for HalfAlphaBackend {
        fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
            let mut rgba = image.to_rgba8();
            for pixel in rgba.pixels_mut() {
                pixel.0[3] = 128;
            }
            Ok(rgba)
        }
    }

    struct FailingBackend;

    impl RemovalBackend for FailingBackend {
        fn remove_background(&self, _image: &DynamicImage) -> Result<RgbaImage> {
            Err(CutoutError::processing("segmentation diverged"))
        }
    }

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn test_engine_parsing() {
        assert_eq!("withoutbg".parse::<Engine>().unwrap(), Engine::Withoutbg);
        assert_eq!("rembg".parse::<Engine>().unwrap(), Engine::Rembg);
        assert_eq!(Engine::default(), Engine::Withoutbg);

        let err = "gimp".parse::<Engine>().unwrap_err();
        assert!(matches!(err, CutoutError::UnknownEngine(name) if name == "gimp"));
    }

    #[tokio::test]
    async fn test_process_uses_selected_backend() {
        let remover = Remover::with_backends(
            Arc::new(HalfAlphaBackend),
            Arc::new(FailingBackend),
        );

        let result = remover
            .process(&test_image(), Engine::Withoutbg)
            .await
            .unwrap();
        assert!(result.pixels().all(|pixel| pixel.0[3] == 128));

        let err = remover.process(&test_image(), Engine::Rembg).await;
        assert!(matches!(err, Err(CutoutError::Processing(_))));
    }

    #[test]
    fn test_encode_png_roundtrip() {
        let rgba = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
        let bytes = encode_png(&rgba).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([1, 2, 3, 4]));
    }
}
