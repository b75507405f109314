#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]

//! # Cutout Server
//!
//! A small web service for background removal: upload an image, strip its
//! background with one of two pluggable engines, optionally composite the
//! transparent cutout over a solid color or a backdrop image, and download
//! results singly or as a ZIP archive. Stored files are swept after a
//! retention window.
//!
//! ## Engines
//!
//! - **withoutbg** (primary): ONNX Runtime inference (`ort`), ISNet-style
//!   segmentation model
//! - **rembg** (fallback): pure-Rust inference (`tract`), U2Net-style
//!   segmentation model
//!
//! Engine handles load their model lazily on first use and are cached for
//! the lifetime of the process.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cutout_server::{ServiceConfig, start_server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::builder()
//!     .media_root("/srv/cutout/media")
//!     .withoutbg_model("/srv/cutout/models/withoutbg.onnx")
//!     .rembg_model("/srv/cutout/models/rembg.onnx")
//!     .build()?;
//! start_server(config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Or in-process, without HTTP:
//!
//! ```rust,no_run
//! use cutout_server::{Engine, Remover};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let remover = Remover::new("models/withoutbg.onnx", "models/rembg.onnx");
//! let image = image::open("photo.jpg")?;
//! let foreground = remover.process(&image, Engine::Withoutbg).await?;
//! foreground.save("cutout.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `onnx` (default): ONNX Runtime backend for the `withoutbg` engine
//! - `tract` (default): pure-Rust backend for the `rembg` engine

pub mod cli;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;
pub mod storage;

// Public API exports
pub use compositor::{composite_backdrop, parse_hex_color, Backdrop};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use engine::{encode_png, Engine, RemovalBackend, Remover};
pub use error::{CutoutError, Result};
pub use server::{create_router, start_server, AppContext};
pub use storage::{MediaStore, SweepReport};
