use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Weight file required by the landmark extractor.
pub struct ModelFile {
    pub name: &'static str,
    pub purpose: &'static str,
}

/// Tiny face detector, 68-point landmark net and recognition net, each as a
/// weights manifest plus its binary shards.
pub const MODELS: &[ModelFile] = &[
    ModelFile {
        name: "tiny_face_detector_model-weights_manifest.json",
        purpose: "face detector",
    },
    ModelFile {
        name: "tiny_face_detector_model-shard1",
        purpose: "face detector",
    },
    ModelFile {
        name: "face_landmark_68_model-weights_manifest.json",
        purpose: "68-point landmarks",
    },
    ModelFile {
        name: "face_landmark_68_model-shard1",
        purpose: "68-point landmarks",
    },
    ModelFile {
        name: "face_recognition_model-weights_manifest.json",
        purpose: "128-d descriptor",
    },
    ModelFile {
        name: "face_recognition_model-shard1",
        purpose: "128-d descriptor",
    },
    ModelFile {
        name: "face_recognition_model-shard2",
        purpose: "128-d descriptor",
    },
];

/// Name of the pinned-digest file kept alongside the weights.
pub const CHECKSUMS_FILE: &str = "checksums.toml";

/// Contents of `checksums.toml`: file name → lowercase hex SHA-256.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: String, path: PathBuf },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: String,
        path: PathBuf,
        expected: String,
        got: String,
    },

    #[error("invalid checksums.toml: {0}")]
    Manifest(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lowercase hex SHA-256 of everything `reader` yields.
pub fn sha256_hex<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    sha256_hex(std::io::BufReader::new(file)).map_err(|source| ModelIntegrityError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn existing_file(model_dir: &Path, name: &str) -> Result<PathBuf, ModelIntegrityError> {
    let path = model_dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelIntegrityError::MissingModel {
            name: name.to_string(),
            path,
        })
    }
}

/// Read `checksums.toml` from a model directory, if present.
pub fn load_checksums(model_dir: &Path) -> Result<Option<Checksums>, ModelIntegrityError> {
    let path = model_dir.join(CHECKSUMS_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ModelIntegrityError::Read { path, source }),
    };
    toml::from_str(&text)
        .map(Some)
        .map_err(|e| ModelIntegrityError::Manifest(e.to_string()))
}

/// Check that every required weight file exists and, when a
/// `checksums.toml` is present, that every pinned digest matches.
pub fn verify_models_dir(model_dir: &Path) -> Result<(), ModelIntegrityError> {
    for model in MODELS {
        existing_file(model_dir, model.name)?;
    }

    let Some(checksums) = load_checksums(model_dir)? else {
        return Ok(());
    };
    for (name, expected) in &checksums.files {
        let path = existing_file(model_dir, name)?;
        let got = sha256_file_hex(&path)?;
        if !got.eq_ignore_ascii_case(expected) {
            return Err(ModelIntegrityError::ChecksumMismatch {
                name: name.clone(),
                path,
                expected: expected.clone(),
                got,
            });
        }
    }

    Ok(())
}

/// Hash every required weight file and write `checksums.toml`.
pub fn pin_checksums(model_dir: &Path) -> Result<Checksums, ModelIntegrityError> {
    let mut checksums = Checksums::default();
    for model in MODELS {
        let path = existing_file(model_dir, model.name)?;
        checksums
            .files
            .insert(model.name.to_string(), sha256_file_hex(&path)?);
    }

    let text = toml::to_string_pretty(&checksums)
        .map_err(|e| ModelIntegrityError::Manifest(e.to_string()))?;
    let path = model_dir.join(CHECKSUMS_FILE);
    fs::write(&path, text).map_err(|source| ModelIntegrityError::Write { path, source })?;

    Ok(checksums)
}
