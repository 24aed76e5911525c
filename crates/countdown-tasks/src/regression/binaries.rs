//! Binary sets and the mixed binary directory

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use countdown_core::config::builtin_binsets;
use countdown_core::{ConfigError, RegressionError};
use tracing::{debug, info};

/// Names of the binaries held out from one provenance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySet(BTreeSet<String>);

impl BinarySet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Look up a named preset; configured sets shadow the built-in ones
    pub fn preset(name: &str, custom: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        if let Some(names) = custom.get(name) {
            return Ok(Self::new(names.iter().cloned()));
        }
        builtin_binsets()
            .into_iter()
            .find(|(preset, _)| *preset == name)
            .map(|(_, names)| Self::new(names.iter().copied()))
            .ok_or_else(|| ConfigError::UnknownBinSet(name.to_string()))
    }

    /// Parse a comma-separated list, ignoring blanks
    pub fn parse_list(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn assemble_error(path: &Path) -> impl FnOnce(std::io::Error) -> RegressionError {
    let path = path.to_path_buf();
    move |source| RegressionError::Assemble { path, source }
}

fn list_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>, RegressionError> {
    let dir = std::fs::canonicalize(dir).map_err(assemble_error(dir))?;
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(assemble_error(&dir))? {
        let entry = entry.map_err(assemble_error(&dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    Ok(entries)
}

#[cfg(unix)]
fn link(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(not(unix))]
fn link(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::copy(src, dst).map(|_| ())
}

/// Populate `out` with every binary of `in2`, then with the binaries of `in1`
/// that are in `take1` or missing from `in2`.
///
/// `out` is recreated from scratch. Returns where each binary was taken from.
pub fn assemble_binaries(
    in1: &Path,
    in2: &Path,
    out: &Path,
    take1: &BinarySet,
) -> Result<BTreeMap<String, PathBuf>, RegressionError> {
    match std::fs::remove_dir_all(out) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(assemble_error(out)(e)),
    }
    std::fs::create_dir_all(out).map_err(assemble_error(out))?;

    let mut binaries: BTreeMap<String, PathBuf> = list_dir(in2)?.into_iter().collect();
    for (name, path) in list_dir(in1)? {
        if take1.contains(&name) || !binaries.contains_key(&name) {
            binaries.insert(name, path);
        }
    }

    // held-out binaries first so they stand out in the log
    for holdout in [true, false] {
        for (name, src) in binaries.iter().filter(|(n, _)| take1.contains(n) == holdout) {
            let dst = out.join(name);
            link(src, &dst).map_err(assemble_error(&dst))?;
            if holdout {
                info!(binary = %name, from = %src.display(), "using held-out binary");
            } else {
                debug!(binary = %name, from = %src.display(), "using binary");
            }
        }
    }
    Ok(binaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(dir: &Path, names: &[&str], content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }

    #[test]
    fn test_presets() {
        let custom = BTreeMap::from([("mine".to_string(), vec!["foo".to_string()])]);

        let set = BinarySet::preset("agentdevice", &custom).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["agentd", "deviced"]);
        assert_eq!(BinarySet::preset("prodservices", &custom).unwrap().len(), 7);
        assert!(BinarySet::preset("mine", &custom).unwrap().contains("foo"));
        assert!(matches!(
            BinarySet::preset("everything", &custom),
            Err(ConfigError::UnknownBinSet(_))
        ));
    }

    #[test]
    fn test_parse_list() {
        let set = BinarySet::parse_list("agentd, deviced,,");
        assert_eq!(set, BinarySet::new(["agentd", "deviced"]));
    }

    #[test]
    fn test_assemble_takes_holdouts_from_first() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("old");
        let new = temp.path().join("new");
        let out = temp.path().join("out");
        populate(&old, &["agentd", "deviced", "legacyd"], "old");
        populate(&new, &["agentd", "deviced", "mounttabled"], "new");

        let sources = assemble_binaries(&old, &new, &out, &BinarySet::new(["agentd"])).unwrap();

        let read = |name: &str| std::fs::read_to_string(out.join(name)).unwrap();
        assert_eq!(read("agentd"), "old");
        assert_eq!(read("deviced"), "new");
        assert_eq!(read("mounttabled"), "new");
        // only the first provenance has it
        assert_eq!(read("legacyd"), "old");
        assert_eq!(sources.len(), 4);
    }

    #[test]
    fn test_assemble_recreates_output() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let out = temp.path().join("out");
        populate(&a, &["agentd"], "a");
        populate(&b, &["agentd"], "b");
        populate(&out, &["stale"], "stale");

        assemble_binaries(&a, &b, &out, &BinarySet::default()).unwrap();

        assert!(!out.join("stale").exists());
        assert_eq!(std::fs::read_to_string(out.join("agentd")).unwrap(), "b");
    }

    #[test]
    fn test_assemble_missing_input() {
        let temp = TempDir::new().unwrap();
        let err = assemble_binaries(
            &temp.path().join("missing"),
            temp.path(),
            &temp.path().join("out"),
            &BinarySet::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RegressionError::Assemble { .. }));
    }
}
