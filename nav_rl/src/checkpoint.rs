//! Saving and restoring trained policies.
//!
//! A checkpoint is a burn record (`<stem>.bin`) plus a JSON sidecar
//! (`<stem>.json`) with everything needed to rebuild the network before the
//! record is loaded into it.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::agents::PolicyArchitecture;
use crate::error::{Error, Result};
use crate::files::{read_json, write_json};
use crate::ppo::{NetworkShape, PolicyNet, PpoSettings};

/// Sidecar stored next to every saved policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub architecture: PolicyArchitecture,
    pub shape: NetworkShape,
    pub settings: PpoSettings,
    /// Timesteps the policy had been trained for when saved.
    pub num_timesteps: u64,
}

/// Sidecar path for a record path.
pub fn meta_path(record: &Path) -> PathBuf {
    record.with_extension("json")
}

/// Write `model` to `path` (extension `.bin`) and its sidecar.
pub fn save_policy<B: Backend>(
    model: &PolicyNet<B>,
    meta: &CheckpointMeta,
    path: &Path,
) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| Error::Recorder(e.to_string()))?;
    write_json(&meta_path(path), meta)
}

/// Rebuild a policy saved by [`save_policy`].
pub fn load_policy<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(PolicyNet<B>, CheckpointMeta)> {
    if !path.is_file() {
        return Err(Error::NotFound {
            what: "policy record".into(),
            path: path.to_path_buf(),
        });
    }
    let meta: CheckpointMeta = read_json(&meta_path(path))?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = PolicyNet::new(&meta.architecture, &meta.shape, device)?
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| Error::Recorder(e.to_string()))?;
    Ok((model, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Activation;
    use crate::env::ActionSpace;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn meta() -> CheckpointMeta {
        let space = ActionSpace::Continuous {
            low: vec![0.0, -1.0],
            high: vec![0.3, 1.0],
        };
        CheckpointMeta {
            architecture: PolicyArchitecture::mlp(&[16], &[8], &[8], Activation::Tanh),
            shape: NetworkShape::new(6, 4, &space),
            settings: PpoSettings::default(),
            num_timesteps: 4096,
        }
    }

    #[test]
    fn test_save_and_load_reproduces_outputs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent").join("best_model.bin");
        let device = Default::default();
        let meta = meta();
        let model = PolicyNet::<TestBackend>::new(&meta.architecture, &meta.shape, &device).unwrap();

        save_policy(&model, &meta, &path).unwrap();
        assert!(path.is_file());
        assert!(meta_path(&path).is_file());

        let (loaded, loaded_meta) = load_policy::<TestBackend>(&path, &device).unwrap();
        assert_eq!(loaded_meta, meta);

        let obs = Tensor::<TestBackend, 2>::ones([2, 6], &device);
        let a = model.values(obs.clone()).into_data().to_vec::<f32>().unwrap();
        let b = loaded.values(obs).into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_record() {
        let dir = TempDir::new().unwrap();
        let err = load_policy::<TestBackend>(&dir.path().join("none.bin"), &Default::default());
        assert!(matches!(err, Err(Error::NotFound { .. })));
    }
}
