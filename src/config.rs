//! Cascade and training hyperparameters.
//!
//! A [`Config`] is loaded once from a JSON document at process start and then
//! passed by reference to everything that needs it. Every key of the document
//! is required; there is no implicit defaulting. The only fields that change
//! after loading are the resume checkpoint indices, which can be written back
//! to the same document with [`Config::save_checkpoint`].
//!
//! Like the JSON spec itself, numbers are read as doubles: integer keys such
//! as `T` or `x_step` accept `20` and `20.0` alike, but reject `20.5`.
//!
//! ```json
//! {
//!   "T": 5, "K": 1080, "landmark_n": 5, "tree_depth": 4, "random_shift": 0.05,
//!   "phase": "train",
//!   "current_stage_idx": 0, "current_cart_idx": -1, "tmp_model": "../model/tmp.model",
//!   "image_size": { "multi_scale": true, "origin_w": 80, "origin_h": 80,
//!                   "half_w": 56, "half_h": 56, "quarter_w": 40, "quarter_h": 40 },
//!   "hard_negative_mining": { "x_step": 20, "y_step": 20, "scale": 1.3 },
//!   "stages": { "feature_pool_size": [...], "neg_pos_ratio": [...],
//!               "random_sample_radius": [...], "classification_p": [...],
//!               "recall": [...] },
//!   "data": { "face": "../data/face.txt", "background": "../data/bg.txt" }
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Where the trainer looks for its configuration when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "../config.json";

const TEST_POS_TXT: &str = "../data/test.txt";
const TEST_NEG_TXT: &str = "../data/test_nega.txt";
const DETECTION_TXT: &str = "../data/detection.txt";

/// Machine epsilon used by the mining driver when comparing scores.
const ESP: f64 = 2.2e-16;

/// Whether the run is training a model or evaluating one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    Train,
    Test,
}

impl From<String> for Phase {
    fn from(s: String) -> Self {
        if s == "train" {
            Phase::Train
        } else {
            Phase::Test
        }
    }
}

impl From<Phase> for String {
    fn from(p: Phase) -> Self {
        match p {
            Phase::Train => "train".into(),
            Phase::Test => "test".into(),
        }
    }
}

/// Dimensions of the three pyramid levels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ImageSize {
    pub multi_scale: bool,
    #[serde(deserialize_with = "integral::deserialize")]
    pub origin_w: u32,
    #[serde(deserialize_with = "integral::deserialize")]
    pub origin_h: u32,
    #[serde(deserialize_with = "integral::deserialize")]
    pub half_w: u32,
    #[serde(deserialize_with = "integral::deserialize")]
    pub half_h: u32,
    #[serde(deserialize_with = "integral::deserialize")]
    pub quarter_w: u32,
    #[serde(deserialize_with = "integral::deserialize")]
    pub quarter_h: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct MiningFile {
    #[serde(deserialize_with = "integral::deserialize")]
    x_step: u32,
    #[serde(deserialize_with = "integral::deserialize")]
    y_step: u32,
    scale: f64,
}

/// Sliding-window parameters for hard negative mining.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiningParams {
    pub x_step: u32,
    pub y_step: u32,
    pub scale_factor: f64,
    /// Worker count for the mining pool. Never read from the file; taken
    /// from the machine's available concurrency on every load.
    pub mining_pool_size: usize,
    pub esp: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct StagesFile {
    #[serde(deserialize_with = "integral::vec::deserialize")]
    feature_pool_size: Vec<usize>,
    neg_pos_ratio: Vec<f64>,
    random_sample_radius: Vec<f64>,
    classification_p: Vec<f64>,
    recall: Vec<f64>,
}

/// Parameters of a single cascade stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParams {
    pub feature_pool_size: usize,
    pub neg_pos_ratio: f64,
    pub random_sample_radius: f64,
    pub classification_p: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct DataFile {
    face: PathBuf,
    background: PathBuf,
}

/// Sample list locations.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub train_pos_txt: PathBuf,
    pub train_neg_txt: PathBuf,
    pub test_pos_txt: PathBuf,
    pub test_neg_txt: PathBuf,
    pub detection_txt: PathBuf,
}

/// Resume point of an interrupted training run.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub stage_idx: i32,
    pub cart_idx: i32,
    pub tmp_model: PathBuf,
}

/// On-disk layout. Field names are the JSON keys.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(rename = "T", deserialize_with = "integral::deserialize")]
    t: usize,
    #[serde(rename = "K", deserialize_with = "integral::deserialize")]
    k: usize,
    #[serde(deserialize_with = "integral::deserialize")]
    landmark_n: usize,
    #[serde(deserialize_with = "integral::deserialize")]
    tree_depth: usize,
    random_shift: f64,
    phase: Phase,
    #[serde(deserialize_with = "integral::deserialize")]
    current_stage_idx: i32,
    #[serde(deserialize_with = "integral::deserialize")]
    current_cart_idx: i32,
    tmp_model: PathBuf,
    image_size: ImageSize,
    hard_negative_mining: MiningFile,
    stages: StagesFile,
    data: DataFile,
}

/// Process-wide cascade configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of cascade stages.
    pub t: usize,
    /// Carts per stage.
    pub k: usize,
    pub landmark_n: usize,
    pub tree_depth: usize,
    pub shift_size: f64,
    pub image_size: ImageSize,
    pub mining: MiningParams,
    pub feats: Vec<usize>,
    pub nps: Vec<f64>,
    pub radius: Vec<f64>,
    pub probs: Vec<f64>,
    pub recall: Vec<f64>,
    pub data: DataPaths,
    pub phase: Phase,
    checkpoint: Checkpoint,
}

impl Config {
    /// Load and validate the configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a configuration document held in memory.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(text)?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        if file.t == 0 {
            return Err(Error::InvalidConfig("T must be positive".into()));
        }
        if file.landmark_n == 0 {
            return Err(Error::InvalidConfig("landmark_n must be positive".into()));
        }
        let size = &file.image_size;
        let dims = [
            size.origin_w,
            size.origin_h,
            size.half_w,
            size.half_h,
            size.quarter_w,
            size.quarter_h,
        ];
        if dims.contains(&0) {
            return Err(Error::InvalidConfig(
                "image_size dimensions must be positive".into(),
            ));
        }

        let stages = file.stages;
        let t = file.t;
        check_stage_len("feature_pool_size", stages.feature_pool_size.len(), t)?;
        check_stage_len("neg_pos_ratio", stages.neg_pos_ratio.len(), t)?;
        check_stage_len("random_sample_radius", stages.random_sample_radius.len(), t)?;
        check_stage_len("classification_p", stages.classification_p.len(), t)?;
        check_stage_len("recall", stages.recall.len(), t)?;

        Ok(Self {
            t,
            k: file.k,
            landmark_n: file.landmark_n,
            tree_depth: file.tree_depth,
            shift_size: file.random_shift,
            image_size: file.image_size,
            mining: MiningParams {
                x_step: file.hard_negative_mining.x_step,
                y_step: file.hard_negative_mining.y_step,
                scale_factor: file.hard_negative_mining.scale,
                mining_pool_size: num_cpus::get().max(1),
                esp: ESP,
            },
            feats: stages.feature_pool_size,
            nps: stages.neg_pos_ratio,
            radius: stages.random_sample_radius,
            probs: stages.classification_p,
            recall: stages.recall,
            data: DataPaths {
                train_pos_txt: file.data.face,
                train_neg_txt: file.data.background,
                test_pos_txt: TEST_POS_TXT.into(),
                test_neg_txt: TEST_NEG_TXT.into(),
                detection_txt: DETECTION_TXT.into(),
            },
            phase: file.phase,
            checkpoint: Checkpoint {
                stage_idx: file.current_stage_idx,
                cart_idx: file.current_cart_idx,
                tmp_model: file.tmp_model,
            },
        })
    }

    /// Parameters of stage `idx`, or `None` past the last stage.
    pub fn stage(&self, idx: usize) -> Option<StageParams> {
        if idx >= self.t {
            return None;
        }
        Some(StageParams {
            feature_pool_size: self.feats[idx],
            neg_pos_ratio: self.nps[idx],
            random_sample_radius: self.radius[idx],
            classification_p: self.probs[idx],
            recall: self.recall[idx],
        })
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Check that the stored resume point lies inside the cascade.
    ///
    /// A stage index must be in `0..T`; a cart index in `-1..K`, where `-1`
    /// means no cart of that stage has been trained yet.
    pub fn validate_checkpoint(&self) -> Result<()> {
        let cp = &self.checkpoint;
        if cp.stage_idx < 0 || cp.stage_idx as usize >= self.t {
            return Err(Error::InvalidConfig(format!(
                "current_stage_idx {} outside 0..{}",
                cp.stage_idx, self.t
            )));
        }
        if cp.cart_idx < -1 || cp.cart_idx >= self.k as i32 {
            return Err(Error::InvalidConfig(format!(
                "current_cart_idx {} outside -1..{}",
                cp.cart_idx, self.k
            )));
        }
        Ok(())
    }

    /// Record the stage/cart the trainer has reached.
    pub fn set_checkpoint(&mut self, stage_idx: i32, cart_idx: i32) {
        self.checkpoint.stage_idx = stage_idx;
        self.checkpoint.cart_idx = cart_idx;
    }

    /// Write the resume keys back into the document at `path`.
    ///
    /// All other keys are left as they are in the file.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut doc: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        let obj = doc.as_object_mut().ok_or_else(|| {
            Error::InvalidConfig(format!("{} is not a JSON object", path.display()))
        })?;
        obj.insert(
            "current_stage_idx".into(),
            Value::from(self.checkpoint.stage_idx),
        );
        obj.insert(
            "current_cart_idx".into(),
            Value::from(self.checkpoint.cart_idx),
        );
        obj.insert(
            "tmp_model".into(),
            Value::from(self.checkpoint.tmp_model.to_string_lossy().into_owned()),
        );

        // Replace the file in one rename so a crash never leaves it truncated.
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Integer keys read through `f64`, the way JSON numbers are defined.
mod integral {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;

    fn check<E: Error, T: TryFrom<i64>>(v: f64) -> Result<T, E> {
        if v.fract() != 0.0 {
            return Err(E::custom(format!("expected an integer, found {v}")));
        }
        T::try_from(v as i64).map_err(|_| E::custom(format!("{v} is out of range")))
    }

    pub fn deserialize<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i64>,
    {
        check(f64::deserialize(d)?)
    }

    pub mod vec {
        use super::*;

        pub fn deserialize<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
        where
            D: Deserializer<'de>,
            T: TryFrom<i64>,
        {
            Vec::<f64>::deserialize(d)?.into_iter().map(check).collect()
        }
    }
}

fn check_stage_len(key: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::StageLength {
            key,
            actual,
            expected,
        });
    }
    Ok(())
}
