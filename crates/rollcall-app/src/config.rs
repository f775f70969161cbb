use rollcall_core::features::{CHANNELS, DEFAULT_FACE_HEIGHT, DEFAULT_FACE_WIDTH};
use rollcall_store::pinecone::{PineconeConfig, DEFAULT_CONTROL_URL};
use rollcall_store::Collections;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Secrets file read when no path is given and `ROLLCALL_SECRETS` is unset.
pub const DEFAULT_SECRETS_FILE: &str = "secrets.toml";

const API_KEY: &str = "PINECONE_API_KEY";
const REGION: &str = "PINECONE_ENVIRONMENT";
const CONTROL_URL: &str = "PINECONE_CONTROL_URL";
const FACE_INDEX: &str = "FACE_INDEX_NAME";
const ATTENDANCE_INDEX: &str = "ATTENDANCE_INDEX_NAME";
const VECTOR_DIMENSION: &str = "VECTOR_DIMENSION";
const SCORE_THRESHOLD: &str = "SCORE_THRESHOLD";
const IMAGE_WIDTH: &str = "IMAGE_WIDTH";
const IMAGE_HEIGHT: &str = "IMAGE_HEIGHT";
const DETECTOR_MODEL: &str = "DETECTOR_MODEL";
const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
const SAMPLE_INTERVAL: &str = "SAMPLE_INTERVAL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not found; set it in the secrets file or the environment")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("VECTOR_DIMENSION is {dimension} but IMAGE_WIDTH x IMAGE_HEIGHT x 3 is {expected}")]
    DimensionMismatch { dimension: usize, expected: usize },
    #[error("cannot read secrets file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse secrets file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration: a TOML secrets file overlaid by environment
/// variables of the same names.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    /// Control-plane base URL of the vector service.
    pub control_url: String,
    /// Serverless region for newly created collections.
    pub region: String,
    pub face_index: String,
    pub attendance_index: String,
    pub vector_dimension: usize,
    /// Face crops are resized to `image_width` × `image_height` before flattening.
    pub image_width: u32,
    pub image_height: u32,
    /// Minimum cosine score for a positive match, within `-1.0..=1.0`.
    pub score_threshold: f32,
    /// Path to the cascade detector model.
    pub detector_model: PathBuf,
    pub request_timeout_secs: u64,
    /// Live enrollment keeps faces from every Nth frame.
    pub sample_interval: usize,
}

impl Config {
    /// Load from `secrets_path`, else `$ROLLCALL_SECRETS`, else
    /// [`DEFAULT_SECRETS_FILE`] if present, then apply environment overrides.
    pub fn load(secrets_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = secrets_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("ROLLCALL_SECRETS").ok().map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_SECRETS_FILE);
                default.exists().then_some(default)
            });

        let secrets = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "reading secrets file");
                Some(read_secrets(&path)?)
            }
            None => None,
        };

        Self::from_sources(secrets.as_ref(), |key| std::env::var(key).ok())
    }

    /// Resolve every setting from a parsed secrets table and an environment lookup.
    pub fn from_sources(
        secrets: Option<&toml::Table>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| -> Option<String> {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| secrets.and_then(|t| t.get(key)).and_then(toml_scalar))
        };

        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_key = required(API_KEY)?;
        let vector_dimension: usize = parse(VECTOR_DIMENSION, required(VECTOR_DIMENSION)?)?;
        let score_threshold: f32 = parse(SCORE_THRESHOLD, required(SCORE_THRESHOLD)?)?;
        let image_width: u32 = parse(IMAGE_WIDTH, or_default(IMAGE_WIDTH, &DEFAULT_FACE_WIDTH.to_string()))?;
        let image_height: u32 = parse(IMAGE_HEIGHT, or_default(IMAGE_HEIGHT, &DEFAULT_FACE_HEIGHT.to_string()))?;
        let request_timeout_secs: u64 = parse(REQUEST_TIMEOUT_SECS, or_default(REQUEST_TIMEOUT_SECS, "30"))?;
        let sample_interval: usize = parse(SAMPLE_INTERVAL, or_default(SAMPLE_INTERVAL, "10"))?;

        let expected = image_width as usize * image_height as usize * CHANNELS;
        if vector_dimension != expected {
            return Err(ConfigError::DimensionMismatch {
                dimension: vector_dimension,
                expected,
            });
        }
        if !(-1.0..=1.0).contains(&score_threshold) {
            return Err(ConfigError::Invalid {
                key: SCORE_THRESHOLD,
                value: score_threshold.to_string(),
            });
        }
        if sample_interval == 0 {
            return Err(ConfigError::Invalid {
                key: SAMPLE_INTERVAL,
                value: "0".into(),
            });
        }

        Ok(Self {
            api_key,
            control_url: or_default(CONTROL_URL, DEFAULT_CONTROL_URL),
            region: or_default(REGION, "us-east-1"),
            face_index: or_default(FACE_INDEX, "face-and-name-data"),
            attendance_index: or_default(ATTENDANCE_INDEX, "attendance-data"),
            vector_dimension,
            image_width,
            image_height,
            score_threshold,
            detector_model: PathBuf::from(or_default(DETECTOR_MODEL, "model/seeta_fd_frontal_v1.0.bin")),
            request_timeout_secs,
            sample_interval,
        })
    }

    pub fn pinecone(&self) -> PineconeConfig {
        PineconeConfig {
            api_key: self.api_key.clone(),
            control_url: self.control_url.clone(),
            region: self.region.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn collections(&self) -> Collections {
        Collections {
            face: self.face_index.clone(),
            attendance: self.attendance_index.clone(),
            dimension: self.vector_dimension,
        }
    }
}

fn read_secrets(path: &Path) -> Result<toml::Table, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Secrets may hold numbers either as TOML numbers or as quoted strings.
fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table(src: &str) -> toml::Table {
        toml::from_str(src).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    const MINIMAL: &str = r#"
        PINECONE_API_KEY = "pk-test"
        VECTOR_DIMENSION = 7500
        SCORE_THRESHOLD = 0.8
    "#;

    #[test]
    fn test_defaults_from_minimal_secrets() {
        let cfg = Config::from_sources(Some(&table(MINIMAL)), no_env).unwrap();
        assert_eq!(cfg.api_key, "pk-test");
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.face_index, "face-and-name-data");
        assert_eq!(cfg.attendance_index, "attendance-data");
        assert_eq!(cfg.vector_dimension, 7500);
        assert_eq!((cfg.image_width, cfg.image_height), (50, 50));
        assert!((cfg.score_threshold - 0.8).abs() < 1e-6);
        assert_eq!(cfg.sample_interval, 10);
        assert_eq!(cfg.control_url, DEFAULT_CONTROL_URL);
    }

    #[test]
    fn test_quoted_numbers_accepted() {
        let src = r#"
            PINECONE_API_KEY = "k"
            VECTOR_DIMENSION = "7500"
            SCORE_THRESHOLD = "0.75"
        "#;
        let cfg = Config::from_sources(Some(&table(src)), no_env).unwrap();
        assert_eq!(cfg.vector_dimension, 7500);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> =
            [("FACE_INDEX_NAME", "faces-dev"), ("SCORE_THRESHOLD", "0.9")].into();
        let cfg = Config::from_sources(Some(&table(MINIMAL)), |k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.face_index, "faces-dev");
        assert!((cfg.score_threshold - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_missing_api_key() {
        let src = "VECTOR_DIMENSION = 7500\nSCORE_THRESHOLD = 0.8";
        let err = Config::from_sources(Some(&table(src)), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PINECONE_API_KEY")));
    }

    #[test]
    fn test_missing_everything() {
        let err = Config::from_sources(None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_invalid_threshold() {
        let src = "PINECONE_API_KEY = 'k'\nVECTOR_DIMENSION = 7500\nSCORE_THRESHOLD = 'high'";
        let err = Config::from_sources(Some(&table(src)), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SCORE_THRESHOLD", .. }));
    }

    #[test]
    fn test_threshold_outside_cosine_range() {
        for value in ["NaN", "inf", "5.0", "-3", "1.01"] {
            let env: HashMap<&str, &str> = [("SCORE_THRESHOLD", value)].into();
            let err = Config::from_sources(Some(&table(MINIMAL)), |k| env.get(k).map(|v| v.to_string()))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "SCORE_THRESHOLD", .. }),
                "{value}: {err}"
            );
        }
        for value in ["-1", "0", "1"] {
            let env: HashMap<&str, &str> = [("SCORE_THRESHOLD", value)].into();
            assert!(Config::from_sources(Some(&table(MINIMAL)), |k| env.get(k).map(|v| v.to_string())).is_ok());
        }
    }

    #[test]
    fn test_dimension_must_match_image_size() {
        let src = "PINECONE_API_KEY = 'k'\nVECTOR_DIMENSION = 512\nSCORE_THRESHOLD = 0.8";
        let err = Config::from_sources(Some(&table(src)), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::DimensionMismatch { dimension: 512, expected: 7500 }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let secrets = read_secrets(&path).unwrap();
        let cfg = Config::from_sources(Some(&secrets), no_env).unwrap();
        assert_eq!(cfg.collections().dimension, 7500);
        assert_eq!(cfg.pinecone().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_unreadable_file() {
        let err = Config::load(Some(Path::new("/nonexistent/secrets.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
