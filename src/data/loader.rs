// ============================================================
// Layer 4 — Volume Loader
// ============================================================
// Reads one modality file from disk into an ImageVolume.
//
// Scanner exports are not always clean: masked regions are
// sometimes stored as NaN and a bad rescale can leave ±Inf.
// Either would poison the min-max normalization downstream,
// so every non-finite voxel becomes 0.0 here.
//
// The loader knows nothing about jobs. A failure is returned
// as LoadError and the pipeline decides what it means.
//
// Reference: Rust Book §9 (Error Handling)

use std::path::Path;

use crate::data::nifti;
use crate::domain::error::LoadError;
use crate::domain::volume::ImageVolume;

/// Loads NIfTI-1 volumes (.nii / .nii.gz).
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeLoader;

impl VolumeLoader {
    pub fn new() -> Self {
        Self
    }

    /// Read and sanitize one volume.
    pub fn load(&self, path: &Path) -> Result<ImageVolume, LoadError> {
        if !path.is_file() {
            return Err(LoadError::new(path, "file not found"));
        }

        let mut volume = nifti::read_volume(path).map_err(|e| LoadError::new(path, e))?;

        let replaced = sanitize(&mut volume);
        if replaced > 0 {
            tracing::debug!(
                "Replaced {} non-finite voxels in '{}'",
                replaced,
                path.display()
            );
        }

        tracing::debug!("Loaded '{}' with shape {:?}", path.display(), volume.shape());
        Ok(volume)
    }
}

/// Replace NaN / ±Inf with 0.0, returning how many voxels changed.
pub fn sanitize(volume: &mut ImageVolume) -> usize {
    let mut replaced = 0;
    volume.map_inplace(|v| {
        if !v.is_finite() {
            *v = 0.0;
            replaced += 1;
        }
    });
    replaced
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::nifti::testing::write_volume;
    use ndarray::Array3;

    #[test]
    fn test_missing_path_is_load_error() {
        let err = VolumeLoader::new()
            .load(Path::new("/definitely/not/here/t1.nii.gz"))
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here/t1.nii.gz"));
        assert!(err.cause.contains("not found"));
    }

    #[test]
    fn test_non_finite_values_become_zero() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("flair.nii.gz");
        let mut vol = Array3::<f32>::from_elem((2, 2, 2), 5.0);
        vol[[0, 0, 0]] = f32::NAN;
        vol[[0, 1, 0]] = f32::INFINITY;
        vol[[1, 1, 1]] = f32::NEG_INFINITY;
        write_volume(&path, &vol, true);

        let out = VolumeLoader::new().load(&path).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[0, 1, 0]], 0.0);
        assert_eq!(out[[1, 1, 1]], 0.0);
        assert_eq!(out[[1, 0, 0]], 5.0);
    }

    #[test]
    fn test_unparseable_file_is_load_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2.nii");
        std::fs::write(&path, b"this is not a volume").unwrap();
        let err = VolumeLoader::new().load(&path).unwrap_err();
        assert!(err.cause.contains("NIfTI"));
    }
}
