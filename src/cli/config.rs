//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CollectArgs, PreprocessArgs};
use crate::{
    collect::Query,
    config::{CollectConfig, PreprocessConfig},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to job configurations
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `CollectConfig` from the optional config file plus flag overrides
    pub(crate) fn collect_config(args: &CollectArgs) -> Result<CollectConfig> {
        let mut config = match &args.config {
            Some(path) => CollectConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => CollectConfig::default(),
        };

        if !args.queries.is_empty() {
            config.queries = args.queries.iter().map(|q| Query::new(q.as_str())).collect();
        } else if config.queries.is_empty() {
            config.queries = Query::defaults();
        }
        if let Some(dir) = &args.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(workers) = args.workers {
            config.workers = workers;
        }
        if let Some(pages) = args.max_pages {
            config.max_pages = pages;
        }
        if let Some(template) = &args.search_url {
            config.search_url.clone_from(template);
        }
        if args.keep_existing {
            config.clear_existing = false;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build a `PreprocessConfig` from CLI arguments
    pub(crate) fn preprocess_config(args: &PreprocessArgs) -> Result<PreprocessConfig> {
        let config = PreprocessConfig::builder()
            .input_dir(&args.input)
            .output_dir(&args.output)
            .log_path(&args.log)
            .canvas(args.width, args.height)
            .pattern(args.pattern.as_str())
            .jpeg_quality(args.jpeg_quality)
            .preserve_hierarchy(args.preserve_hierarchy)
            .build()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::main_impl::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_collect_defaults_use_builtin_queries() {
        let Command::Collect(args) = parse(&["car-dataset", "collect"]) else {
            panic!("expected collect");
        };
        let config = CliConfigBuilder::collect_config(&args).unwrap();
        assert_eq!(config.queries, Query::defaults());
        assert_eq!(config.workers, 32);
        assert!(config.clear_existing);
    }

    #[test]
    fn test_collect_flags_override() {
        let Command::Collect(args) = parse(&[
            "car-dataset",
            "collect",
            "-q",
            "BMW i8",
            "-q",
            "Audi R8",
            "--workers",
            "4",
            "--data-dir",
            "cars",
            "--keep-existing",
        ]) else {
            panic!("expected collect");
        };
        let config = CliConfigBuilder::collect_config(&args).unwrap();
        assert_eq!(config.queries.len(), 2);
        assert_eq!(config.queries[1].text(), "Audi R8");
        assert_eq!(config.workers, 4);
        assert_eq!(config.data_dir, PathBuf::from("cars"));
        assert!(!config.clear_existing);
    }

    #[test]
    fn test_collect_flags_override_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("collect.json");
        std::fs::write(&path, r#"{"queries": ["Ferrari F40"], "workers": 8}"#).unwrap();

        let Command::Collect(args) = parse(&[
            "car-dataset",
            "collect",
            "--config",
            path.to_str().unwrap(),
            "--workers",
            "2",
        ]) else {
            panic!("expected collect");
        };
        let config = CliConfigBuilder::collect_config(&args).unwrap();
        assert_eq!(config.queries, vec![Query::new("Ferrari F40")]);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_collect_rejects_zero_workers() {
        let Command::Collect(args) = parse(&["car-dataset", "collect", "--workers", "0"]) else {
            panic!("expected collect");
        };
        assert!(CliConfigBuilder::collect_config(&args).is_err());
    }

    #[test]
    fn test_preprocess_defaults() {
        let Command::Preprocess(args) = parse(&["car-dataset", "preprocess"]) else {
            panic!("expected preprocess");
        };
        let config = CliConfigBuilder::preprocess_config(&args).unwrap();
        assert_eq!(config, PreprocessConfig::default());
    }

    #[test]
    fn test_preprocess_rejects_bad_quality() {
        let Command::Preprocess(args) =
            parse(&["car-dataset", "preprocess", "--jpeg-quality", "0"])
        else {
            panic!("expected preprocess");
        };
        assert!(CliConfigBuilder::preprocess_config(&args).is_err());
    }
}
