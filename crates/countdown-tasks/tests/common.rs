#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use countdown_core::config::Config;
use countdown_core::{Result, Unit};
use countdown_tasks::{Pipeline, Platform, TestNameSource, UnitSource};
use tempfile::TempDir;

/// Every selector expands to the same fixed universe
pub struct StaticUnits(pub Vec<&'static str>);

#[async_trait]
impl UnitSource for StaticUnits {
    async fn list_units(&self, _selectors: &[String]) -> Result<Vec<Unit>> {
        Ok(self.0.iter().map(|u| Unit::new(*u)).collect())
    }
}

/// Every unit has the same candidate tests
pub struct StaticNames(pub Vec<&'static str>);

#[async_trait]
impl TestNameSource for StaticNames {
    async fn candidate_names(&self, _unit: &Unit) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|n| n.to_string()).collect())
    }
}

/// A workspace with a fake tool script and a config pointing at it
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(script: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tool.sh"), script).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.tool.command = vec![
            "sh".to_string(),
            self.path().join("tool.sh").display().to_string(),
        ];
        config.tool.stagger = "0".to_string();
        config.tool.workers = Some(2);
        config.reports.dir = PathBuf::from("reports");
        config
    }

    pub fn pipeline(&self, config: Config, units: Vec<&'static str>, names: Vec<&'static str>) -> Pipeline {
        Pipeline::new(config, Arc::new(StaticUnits(units)), Arc::new(StaticNames(names)))
            .with_platform(Platform::new("linux", "amd64", false))
            .with_current_dir(self.path())
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path().join(relative)).unwrap_or_default()
    }

    pub fn populate(&self, relative: &str, binaries: &[(&str, &str)]) -> PathBuf {
        let dir = self.path().join(relative);
        std::fs::create_dir_all(&dir).unwrap();
        for (name, content) in binaries {
            std::fs::write(dir.join(name), content).unwrap();
        }
        dir
    }
}

pub fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
