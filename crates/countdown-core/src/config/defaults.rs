//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "countdown.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "countdown.yaml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".countdown.toml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ALT_CONFIG_FILE,
        ".countdown.yaml",
    ]
}

/// Binaries a single agent test needs
pub const BINSET_AGENT_ONLY: &[&str] = &["agentd"];

/// Agent plus device manager
pub const BINSET_AGENT_DEVICE: &[&str] = &["agentd", "deviced"];

/// Every production service
pub const BINSET_PROD_SERVICES: &[&str] = &[
    "agentd",
    "deviced",
    "applicationd",
    "binaryd",
    "identityd",
    "proxyd",
    "mounttabled",
];

/// Built-in binary set presets, by name
pub fn builtin_binsets() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        ("agentonly", BINSET_AGENT_ONLY),
        ("agentdevice", BINSET_AGENT_DEVICE),
        ("prodservices", BINSET_PROD_SERVICES),
    ]
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Countdown Configuration

[tool]
command = ["go"]
stagger = "30s"

[units]
defaults = ["./..."]

[build]
bin_dir = "bin"
timeout = "10m"

[test]
timeout = "5m"
suffix = true

[race]
timeout = "15m"
args = ["-race"]

[bench]
timeout = "5m"
args = ["-bench", ".", "-run", "XXX"]

[coverage]
timeout = "5m"

[integration]
timeout = "5m"
run_pattern = "^TestV23"
non_test_args = ["-v23.tests"]

[regression]
tests = "^TestV23Hello.*"
binset = "prodservices"
days = 1

[reports]
dir = "."

# [[exclusions]]
# unit = "^example.com/flaky$"
# name = "^TestSometimes$"
# os = ["windows"]
# reason = "fails intermittently on windows"
"#;
