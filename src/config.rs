use std::ffi::OsStr;
use std::fs::File;

use anyhow::{anyhow, Context, Result};
use justconfig::item::ValueExtractor;
use justconfig::processors::Trim;
use justconfig::sources::env::Env;
use justconfig::sources::text::ConfigText;
use justconfig::ConfPath;
use justconfig::Config;

use crate::config_processors::Unquote;
use crate::error::RetrievalError;
use crate::io::DatasetPosition;
use crate::sknn::{RetrievalConfig, DEFAULT_MAX_SAMPLES, DEFAULT_THRESHOLD};

// Set some default values
const DEFAULT_K_VALUES: &str = "20,40";
const DEFAULT_START_POSITION: u32 = 0;
const DEFAULT_SIMILARITY: &str = "cosine";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_OUTPUT_DIR: &str = ".";

pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub log: LogConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
}

pub struct RuntimeConfig {
    pub num_workers: usize,
}

pub struct LogConfig {
    pub level: String,
}

pub struct DataConfig {
    pub dataset_path: String,
    pub canonical_path: String,
    pub output_dir: String,
}

pub struct ModelConfig {
    pub k_values: Vec<usize>,
    pub threshold: f64,
    pub max_samples: usize,
    pub start_position: u32,
    pub similarity: String,
}

impl AppConfig {
    pub fn new(config_path: String) -> Result<AppConfig> {
        // Initialize config object
        let mut conf = Config::default();

        // Check if there is a config file
        if let Ok(config_file) = File::open(&config_path) {
            let config_text = ConfigText::new(config_file, &config_path)
                .map_err(|e| anyhow!("loading configuration file {} failed: {}", config_path, e))?;
            conf.add_source(config_text);
        }

        // Define config params from environment variables
        let config_env = Env::new(&[
            (
                ConfPath::from(&["data", "dataset_path"]),
                OsStr::new("DATASET"),
            ),
            (
                ConfPath::from(&["data", "canonical_path"]),
                OsStr::new("CANONICAL_SESSIONS"),
            ),
            (
                ConfPath::from(&["runtime", "num_workers"]),
                OsStr::new("NUM_WORKERS"),
            ),
        ]);
        conf.add_source(config_env);

        // Parse into custom config struct
        AppConfig::parse(conf)
    }

    fn parse(conf: justconfig::Config) -> Result<AppConfig> {
        Ok(AppConfig {
            runtime: RuntimeConfig::parse(&conf, ConfPath::from(&["runtime"])),
            log: LogConfig::parse(&conf, ConfPath::from(&["log"])),
            data: DataConfig::parse(&conf, ConfPath::from(&["data"]))?,
            model: ModelConfig::parse(&conf, ConfPath::from(&["model"]))?,
        })
    }
}

impl RuntimeConfig {
    fn parse(conf: &Config, path: ConfPath) -> RuntimeConfig {
        RuntimeConfig {
            num_workers: conf
                .get(path.push("num_workers"))
                .trim()
                .value()
                // Detect number of CPUs
                .unwrap_or_else(|_| {
                    sys_info::cpu_num()
                        .ok()
                        .and_then(|cpus| cpus.try_into().ok())
                        .unwrap_or(1)
                }),
        }
    }
}

impl LogConfig {
    fn parse(conf: &Config, path: ConfPath) -> LogConfig {
        LogConfig {
            level: conf
                .get(path.push("level"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_LOG_LEVEL)),
        }
    }
}

impl DataConfig {
    fn parse(conf: &Config, path: ConfPath) -> Result<DataConfig> {
        Ok(DataConfig {
            dataset_path: conf
                .get(path.push("dataset_path"))
                .unquote()
                .value()
                .map_err(|e| anyhow!("data.dataset_path: {}", e))?,
            canonical_path: conf
                .get(path.push("canonical_path"))
                .unquote()
                .value()
                .map_err(|e| anyhow!("data.canonical_path: {}", e))?,
            output_dir: conf
                .get(path.push("output_dir"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_OUTPUT_DIR)),
        })
    }
}

impl ModelConfig {
    fn parse(conf: &Config, path: ConfPath) -> Result<ModelConfig> {
        let k_values: String = conf
            .get(path.push("k_values"))
            .unquote()
            .value()
            .unwrap_or_else(|_| String::from(DEFAULT_K_VALUES));

        Ok(ModelConfig {
            k_values: parse_k_values(&k_values)?,
            threshold: conf
                .get(path.push("threshold"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_THRESHOLD),
            max_samples: conf
                .get(path.push("max_samples"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_MAX_SAMPLES),
            start_position: conf
                .get(path.push("start_position"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_START_POSITION),
            similarity: conf
                .get(path.push("similarity"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_SIMILARITY)),
        })
    }

    /// Validated retrieval settings for one value of k.
    pub fn retrieval_config(&self, k: usize) -> Result<RetrievalConfig, RetrievalError> {
        RetrievalConfig::new(
            k,
            self.threshold,
            self.max_samples,
            DatasetPosition(self.start_position),
            self.similarity.parse()?,
        )
    }

    /// Fails on the first k that does not yield a valid configuration.
    pub fn retrieval_configs(&self) -> Result<Vec<RetrievalConfig>, RetrievalError> {
        self.k_values
            .iter()
            .map(|k| self.retrieval_config(*k))
            .collect()
    }
}

fn parse_k_values(raw: &str) -> Result<Vec<usize>> {
    let k_values = raw
        .split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            k.parse::<usize>()
                .with_context(|| format!("model.k_values: '{}' is not a number", k))
        })
        .collect::<Result<Vec<_>>>()?;
    if k_values.is_empty() {
        return Err(anyhow!("model.k_values: at least one k is required"));
    }
    Ok(k_values)
}

#[cfg(test)]
mod config_test {
    use std::fs;

    use super::*;
    use crate::sknn::similarity::SimilarityMeasure;

    #[test]
    fn should_parse_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("retrieval.toml");
        fs::write(
            &config_path,
            "[log]\nlevel = \"debug\"\n\n\
             [runtime]\nnum_workers = 3\n\n\
             [data]\ndataset_path = \"all_train_seq.tsv\"\ncanonical_path = \"unaug.tsv\"\n\n\
             [model]\nk_values = \"20, 40,60\"\nthreshold = 0.6\nmax_samples = 250\nsimilarity = \"jaccard\"\n",
        )
        .unwrap();

        let config = AppConfig::new(config_path.display().to_string()).unwrap();
        assert_eq!("debug", config.log.level);
        assert_eq!(3, config.runtime.num_workers);
        assert_eq!("unaug.tsv", config.data.canonical_path);
        assert_eq!(DEFAULT_OUTPUT_DIR, config.data.output_dir);
        assert_eq!(vec![20, 40, 60], config.model.k_values);
        assert_eq!(250, config.model.max_samples);
        assert_eq!(DEFAULT_START_POSITION, config.model.start_position);

        let retrieval = config.model.retrieval_config(40).unwrap();
        assert_eq!(40, retrieval.k());
        assert_eq!(0.6, retrieval.threshold());
        assert_eq!(SimilarityMeasure::Jaccard, retrieval.measure());
    }

    #[test]
    fn should_reject_invalid_model_settings() {
        let model = ModelConfig {
            k_values: vec![20, 0],
            threshold: DEFAULT_THRESHOLD,
            max_samples: DEFAULT_MAX_SAMPLES,
            start_position: 0,
            similarity: String::from("cosine"),
        };
        assert!(matches!(
            model.retrieval_configs(),
            Err(RetrievalError::Configuration(_))
        ));

        let model = ModelConfig {
            k_values: vec![20],
            threshold: DEFAULT_THRESHOLD,
            max_samples: DEFAULT_MAX_SAMPLES,
            start_position: 0,
            similarity: String::from("euclidean"),
        };
        assert!(model.retrieval_configs().is_err());
    }

    #[test]
    fn should_parse_k_values() {
        assert_eq!(vec![20, 40], parse_k_values("20,40").unwrap());
        assert_eq!(vec![5], parse_k_values(" 5 ,").unwrap());
        assert!(parse_k_values("20,abc").is_err());
        assert!(parse_k_values("").is_err());
    }
}
