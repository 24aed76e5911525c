//! Exclusion rules: which tests of which units must not run

use countdown_core::config::{compile_pattern, ExclusionConfig};
use countdown_core::{ConfigError, Unit};
use regex::Regex;
use tracing::debug;

/// The host the rules are evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system, in the tool's naming (`linux`, `darwin`, ...)
    pub os: String,
    /// Architecture, in the tool's naming (`amd64`, `arm64`, ...)
    pub arch: String,
    /// Whether we run under continuous integration
    pub ci: bool,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, ci: bool) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            ci,
        }
    }

    /// Detect the current host; `GOARCH` overrides the architecture
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = std::env::var("GOARCH")
            .ok()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| go_arch(std::env::consts::ARCH).to_string());
        let ci = std::env::var("CI").is_ok_and(|v| !v.is_empty() && v != "false");
        Self::new(os, arch, ci)
    }

    /// Case-name suffix such as `[GoTest - linux,amd64]`
    pub fn suffix(&self, base: &str) -> String {
        if base.is_empty() {
            format!("[{},{}]", self.os, self.arch)
        } else {
            format!("[{} - {},{}]", base, self.os, self.arch)
        }
    }
}

fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// A compiled exclusion rule
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    unit_pattern: Regex,
    name_pattern: Regex,
    active: bool,
}

impl ExclusionRule {
    pub fn new(unit_pattern: Regex, name_pattern: Regex, active: bool) -> Self {
        Self {
            unit_pattern,
            name_pattern,
            active,
        }
    }

    /// Compile a configured rule, deciding once whether it is active here
    pub fn compile(config: &ExclusionConfig, platform: &Platform) -> Result<Self, ConfigError> {
        let active = config.enabled
            && (config.os.is_empty() || config.os.iter().any(|os| *os == platform.os))
            && (config.arch.is_empty() || config.arch.iter().any(|a| *a == platform.arch))
            && config.ci.map_or(true, |ci| ci == platform.ci);
        Ok(Self::new(
            compile_pattern(&config.unit)?,
            compile_pattern(&config.name)?,
            active,
        ))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether this rule excludes `name` within `unit`
    pub fn excludes(&self, unit: &Unit, name: &str) -> bool {
        self.active && self.unit_pattern.is_match(unit.as_str()) && self.name_pattern.is_match(name)
    }
}

/// Result of filtering one unit's candidate tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    /// Whether the unit should run at all
    pub include: bool,
    /// Tests to select, `None` meaning all of them
    pub names_to_run: Option<Vec<String>>,
    /// Tests suppressed by a rule
    pub excluded: Vec<String>,
}

/// Immutable table of exclusion rules
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    rules: Vec<ExclusionRule>,
}

impl ExclusionRules {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    /// Compile configured rules against `platform`
    pub fn from_config(configs: &[ExclusionConfig], platform: &Platform) -> Result<Self, ConfigError> {
        let rules = configs
            .iter()
            .map(|c| ExclusionRule::compile(c, platform))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            total = rules.len(),
            active = rules.iter().filter(|r| r.active).count(),
            "compiled exclusion rules"
        );
        Ok(Self { rules })
    }

    /// A new table holding these rules followed by `other`'s
    pub fn chain(&self, other: &ExclusionRules) -> Self {
        let mut rules = self.rules.clone();
        rules.extend(other.rules.iter().cloned());
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Active rules as `unit: <re>, name: <re>`
    pub fn describe_active(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.active)
            .map(|r| format!("unit: {}, name: {}", r.unit_pattern, r.name_pattern))
            .collect()
    }

    /// Decide what to run of `unit` given its candidate test names
    pub fn filter(&self, unit: &Unit, candidates: &[String]) -> Filtered {
        let excluded: Vec<String> = candidates
            .iter()
            .filter(|name| self.rules.iter().any(|r| r.excludes(unit, name)))
            .cloned()
            .collect();

        if excluded.is_empty() {
            return Filtered {
                include: true,
                names_to_run: None,
                excluded,
            };
        }

        let remaining: Vec<String> = candidates
            .iter()
            .filter(|name| !excluded.contains(name))
            .cloned()
            .collect();

        if remaining.is_empty() {
            Filtered {
                include: false,
                names_to_run: None,
                excluded,
            }
        } else {
            Filtered {
                include: true,
                names_to_run: Some(remaining),
                excluded,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(unit: &str, name: &str, active: bool) -> ExclusionRule {
        ExclusionRule::new(Regex::new(unit).unwrap(), Regex::new(name).unwrap(), active)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_exclusions_runs_everything() {
        let rules = ExclusionRules::new(vec![rule("^other$", ".*", true)]);
        let filtered = rules.filter(&Unit::new("pkg"), &names(&["TestA", "TestB"]));
        assert_eq!(
            filtered,
            Filtered {
                include: true,
                names_to_run: None,
                excluded: Vec::new()
            }
        );
    }

    #[test]
    fn test_partial_exclusion() {
        let rules = ExclusionRules::new(vec![rule("^golang.org/x/tools$", "^TestCheck$", true)]);
        let filtered = rules.filter(
            &Unit::new("golang.org/x/tools"),
            &names(&["TestCheck", "TestRun"]),
        );
        assert!(filtered.include);
        assert_eq!(filtered.names_to_run, Some(names(&["TestRun"])));
        assert_eq!(filtered.excluded, names(&["TestCheck"]));
    }

    #[test]
    fn test_full_exclusion() {
        let rules = ExclusionRules::new(vec![rule("^golang.org/x/mobile", ".*", true)]);
        let filtered = rules.filter(&Unit::new("golang.org/x/mobile/app"), &names(&["TestA", "TestB"]));
        assert!(!filtered.include);
        assert_eq!(filtered.names_to_run, None);
        assert_eq!(filtered.excluded, names(&["TestA", "TestB"]));
    }

    #[test]
    fn test_inactive_rule_never_excludes() {
        let rules = ExclusionRules::new(vec![rule(".*", ".*", false)]);
        let filtered = rules.filter(&Unit::new("pkg"), &names(&["TestA"]));
        assert!(filtered.include);
        assert!(filtered.excluded.is_empty());
    }

    #[test]
    fn test_empty_candidates() {
        let rules = ExclusionRules::new(vec![rule(".*", ".*", true)]);
        let filtered = rules.filter(&Unit::new("pkg"), &[]);
        assert!(filtered.include);
        assert_eq!(filtered.names_to_run, None);
    }

    #[test]
    fn test_compile_platform_conditions() {
        let linux = Platform::new("linux", "amd64", false);
        let darwin_only = ExclusionConfig::new("^github.com/howeyc/fsnotify$", ".*")
            .with_os(vec!["darwin".to_string()]);
        assert!(!ExclusionRule::compile(&darwin_only, &linux).unwrap().is_active());

        let disabled = ExclusionConfig::new("x", ".*").with_enabled(false);
        assert!(!ExclusionRule::compile(&disabled, &linux).unwrap().is_active());

        let mut ci_only = ExclusionConfig::new("^golang.org/x/net/icmp$", "^TestPingGoogle$");
        ci_only.ci = Some(true);
        assert!(!ExclusionRule::compile(&ci_only, &linux).unwrap().is_active());
        let ci = Platform::new("linux", "amd64", true);
        assert!(ExclusionRule::compile(&ci_only, &ci).unwrap().is_active());
    }

    #[test]
    fn test_describe_active_and_chain() {
        let base = ExclusionRules::new(vec![rule("^a$", ".*", true), rule("^b$", ".*", false)]);
        let race = ExclusionRules::new(vec![rule("^v.io/x/devtools/v23$", "^TestV23Generate$", true)]);
        let all = base.chain(&race);

        assert_eq!(all.len(), 3);
        assert_eq!(
            all.describe_active(),
            vec![
                "unit: ^a$, name: .*".to_string(),
                "unit: ^v.io/x/devtools/v23$, name: ^TestV23Generate$".to_string()
            ]
        );
    }

    #[test]
    fn test_platform_suffix() {
        let platform = Platform::new("linux", "amd64", false);
        assert_eq!(platform.suffix("GoTest"), "[GoTest - linux,amd64]");
        assert_eq!(platform.suffix(""), "[linux,amd64]");
    }
}
