//! Native accelerator library loading
//!
//! The accelerator is an optional shared library exposing a tiny C ABI:
//!
//! - `tickcull_should_cull(d, s, c, max_d, s_th, c_th) -> i32` (1 = cull)
//! - `tickcull_cull_batch(d*, s*, c*, len, max_d, s_th, c_th, out*) -> i32`
//! - `tickcull_cull_batch_by_type(d*, s*, c*, codes*, len, thresholds*,
//!   code_count, out*) -> i32`
//!
//! Batch calls return 0 on success; any other status discards the batch.
//! Loading is attempted once at startup and every failure is non-fatal:
//! the service falls back to the software strategy.

use std::path::{Path, PathBuf};

use libloading::Library;

use crate::config::AcceleratorConfig;

pub type ShouldCullFn = unsafe extern "C" fn(f64, f64, f64, f64, f64, f64) -> i32;
pub type CullBatchFn = unsafe extern "C" fn(
    *const f64,
    *const f64,
    *const f64,
    usize,
    f64,
    f64,
    f64,
    *mut u8,
) -> i32;
pub type CullBatchByTypeFn = unsafe extern "C" fn(
    *const f64,
    *const f64,
    *const f64,
    *const u32,
    usize,
    *const f64,
    usize,
    *mut u8,
) -> i32;

#[derive(Debug, thiserror::Error)]
pub enum AccelError {
    #[error("accelerator disabled in configuration")]
    Disabled,
    #[error("accelerator library not found at {0}")]
    Missing(PathBuf),
    #[error("failed to load accelerator library: {0}")]
    Load(#[from] libloading::Error),
    #[error("accelerator download has no url configured")]
    NoUrl,
    #[error("accelerator checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "accel-download")]
    #[error("accelerator download failed: {0}")]
    Download(#[from] reqwest::Error),
}

/// Bound accelerator entry points, resolved once into raw fn pointers.
/// The library handle is leaked on load; accelerators live for the rest
/// of the process, so the pointers never dangle.
#[derive(Debug, Clone)]
pub struct AccelLibrary {
    path: PathBuf,
    pub should_cull: ShouldCullFn,
    pub cull_batch: CullBatchFn,
    pub cull_batch_by_type: CullBatchByTypeFn,
}

/// Per-OS default file name under `natives/`
pub fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "culling_accel.dll"
    } else if cfg!(target_os = "macos") {
        "libculling_accel.dylib"
    } else {
        "libculling_accel.so"
    }
}

fn resolve_path(config: &AcceleratorConfig, base_dir: &Path) -> PathBuf {
    match &config.library_path {
        Some(p) if !p.is_empty() => base_dir.join(p),
        _ => base_dir.join("natives").join(default_library_name()),
    }
}

impl AccelLibrary {
    /// Load and bind the accelerator, downloading it first when configured.
    pub fn load(config: &AcceleratorConfig, base_dir: &Path) -> Result<Self, AccelError> {
        if !config.enabled {
            return Err(AccelError::Disabled);
        }
        let path = resolve_path(config, base_dir);
        if !path.exists() {
            if config.download.enabled {
                download(config, &path)?;
            } else {
                return Err(AccelError::Missing(path));
            }
        }

        // SAFETY: the library is trusted native code selected by the
        // operator; symbol signatures are fixed by the published ABI.
        let lib: &'static Library = Box::leak(Box::new(unsafe { Library::new(&path)? }));
        let should_cull = unsafe { *lib.get::<ShouldCullFn>(b"tickcull_should_cull\0")? };
        let cull_batch = unsafe { *lib.get::<CullBatchFn>(b"tickcull_cull_batch\0")? };
        let cull_batch_by_type =
            unsafe { *lib.get::<CullBatchByTypeFn>(b"tickcull_cull_batch_by_type\0")? };

        tracing::info!(path = %path.display(), "Accelerator library bound");
        Ok(Self::from_raw(path, should_cull, cull_batch, cull_batch_by_type))
    }

    /// Assemble from already-resolved entry points. The pointers must stay
    /// valid for the lifetime of the process.
    pub fn from_raw(
        path: PathBuf,
        should_cull: ShouldCullFn,
        cull_batch: CullBatchFn,
        cull_batch_by_type: CullBatchByTypeFn,
    ) -> Self {
        Self {
            path,
            should_cull,
            cull_batch,
            cull_batch_by_type,
        }
    }

    /// Like [`Self::load`] but logs and swallows failures
    pub fn try_load(config: &AcceleratorConfig, base_dir: &Path) -> Option<Self> {
        match Self::load(config, base_dir) {
            Ok(lib) => Some(lib),
            Err(AccelError::Disabled) => None,
            Err(e) => {
                tracing::warn!("Accelerator unavailable, using software strategy: {e}");
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(feature = "accel-download")]
fn download(config: &AcceleratorConfig, target: &Path) -> Result<(), AccelError> {
    let url = config.download.url.as_deref().ok_or(AccelError::NoUrl)?;
    tracing::info!(url, "Downloading accelerator library");
    let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;

    if let Some(expected) = config.download.sha256.as_deref() {
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(AccelError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, &bytes)?;
    Ok(())
}

#[cfg(not(feature = "accel-download"))]
fn download(_config: &AcceleratorConfig, target: &Path) -> Result<(), AccelError> {
    tracing::warn!("Accelerator download requested but the feature is compiled out");
    Err(AccelError::Missing(target.to_path_buf()))
}

#[cfg(feature = "accel-download")]
fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = ring::digest::digest(&ring::digest::SHA256, bytes);
    let mut out = String::with_capacity(64);
    for b in digest.as_ref() {
        let _ = write!(out, "{b:02x}");
    }
    out
}
