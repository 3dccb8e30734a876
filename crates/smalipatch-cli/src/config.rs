use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Keep applying after a directive fails.
    pub skip_failed: bool,
    /// Print a unified diff for every changed file.
    pub show_diff: bool,
    pub log_level: String,
    /// Directory names never scanned by FIND_REPLACE or `generate`.
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_failed: false,
            show_diff: true,
            log_level: "info".to_string(),
            exclude: vec![
                ".git".to_string(),
                "build".to_string(),
                "dist".to_string(),
                "original".to_string(),
            ],
        }
    }
}

const CONFIG_HEADER: &str = "# smalipatch settings; command-line flags take precedence.\n\n";

impl Config {
    pub fn level_filter(&self) -> Option<LevelFilter> {
        self.log_level.parse().ok()
    }

    /// `config.toml` in the platform config directory, or the current
    /// directory when none is known.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "smalipatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Writes the built-in defaults to `path`, creating parent directories,
    /// and returns them.
    pub fn write_default(path: &Path) -> Result<Self> {
        let config = Self::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = toml::to_string_pretty(&config).context("Failed to serialize default config")?;
        fs::write(path, format!("{}{}", CONFIG_HEADER, body))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(after_help = r#"EXAMPLES:
    # Apply a patch set to a decompiled tree
    smalipatch ./services ./signature-bypass.smalipatch

    # Check what would change without writing anything
    smalipatch --dry-run --skip-failed ./services ./fixes.smalipatch

    # Read the patch from stdin
    cat fixes.smalipatch | smalipatch ./services

    # Generate a patch from two trees
    smalipatch generate ./original ./modified -o fixes.smalipatch --credit "me"

EXIT CODES:
    0  every directive applied
    1  a directive failed or the patch did not parse
    2  bad arguments or missing input

CONFIG:
    Default config location: ~/.config/smalipatch/config.toml
    Use --ignore-config to use built-in defaults instead."#)]
pub struct Args {
    #[arg(
        short,
        long,
        global = true,
        help = "Path to config file [default: ~/.config/smalipatch/config.toml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Use built-in defaults, ignore config file")]
    pub ignore_config: bool,

    #[arg(short, long, global = true, conflicts_with = "quiet", help = "Show locator and parser decisions")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Only print warnings and errors")]
    pub quiet: bool,

    #[arg(help = "Directory the patch paths are relative to")]
    pub work_dir: Option<PathBuf>,

    #[arg(help = "The .smalipatch file [default: read from stdin]")]
    pub patch_file: Option<PathBuf>,

    #[arg(long, help = "Report every outcome without writing any file")]
    pub dry_run: bool,

    #[arg(long, help = "Continue after a failed directive [default: from config]")]
    pub skip_failed: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build a .smalipatch document from two trees or two files.
    Generate {
        #[arg(help = "Original directory or file")]
        old: PathBuf,

        #[arg(help = "Modified directory or file")]
        new: PathBuf,

        #[arg(short, long, help = "Write the patch here [default: stdout]")]
        output: Option<PathBuf>,

        #[arg(long, value_name = "TEXT", help = "Add a CREDIT line (repeatable)")]
        credit: Vec<String>,

        #[arg(
            long,
            value_name = "REL",
            help = "Target path when comparing two files [default: the new file's name]"
        )]
        path: Option<PathBuf>,
    },
}

/// Resolves the config for this run. A missing file is created with the
/// defaults so users have something to edit.
pub fn load_config(args: &Args) -> Result<Config> {
    if args.ignore_config {
        return Ok(Config::default());
    }

    let path = args.config.clone().unwrap_or_else(Config::default_path);
    if path.exists() {
        Config::load(&path)
    } else {
        let config = Config::write_default(&path)?;
        eprintln!("smalipatch: wrote default config to {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert!(!config.skip_failed);
        assert!(config.show_diff);
        assert_eq!(config.level_filter(), Some(LevelFilter::Info));
        assert!(config.exclude.contains(&".git".to_string()));
    }

    #[test]
    fn test_config_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("skip_failed = true\nlog_level = \"debug\"").unwrap();
        assert!(config.skip_failed);
        assert!(config.show_diff);
        assert_eq!(config.level_filter(), Some(LevelFilter::Debug));
        assert_eq!(config.exclude, Config::default().exclude);
    }

    #[test]
    fn test_invalid_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert_eq!(config.level_filter(), None);
    }

    #[test]
    fn test_load_config_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let path_str = path.to_str().unwrap();

        let config = load_config(&args(&["smalipatch", "-c", path_str, "work"])).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        std::fs::write(&path, "show_diff = false\n").unwrap();
        let config = load_config(&args(&["smalipatch", "-c", path_str, "work"])).unwrap();
        assert!(!config.show_diff);
    }

    #[test]
    fn test_write_default_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("config.toml");

        let written = Config::write_default(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# smalipatch settings"));
        assert_eq!(Config::load(&path).unwrap(), written);
        assert!(Config::default_path().ends_with("config.toml"));
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "skip_failed = \"maybe\"").unwrap();
        assert!(load_config(&args(&["smalipatch", "-c", path.to_str().unwrap(), "work"])).is_err());
    }

    #[test]
    fn test_ignore_config_skips_file() {
        let config = load_config(&args(&["smalipatch", "--ignore-config", "-c", "/nonexistent/x.toml", "w"])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_args_apply_and_generate() {
        let a = args(&["smalipatch", "--dry-run", "-v", "tree", "fix.smalipatch"]);
        assert_eq!(a.work_dir, Some(PathBuf::from("tree")));
        assert_eq!(a.patch_file, Some(PathBuf::from("fix.smalipatch")));
        assert!(a.dry_run && a.verbose);
        assert!(a.command.is_none());

        let g = args(&["smalipatch", "generate", "old", "new", "--credit", "a", "--credit", "b"]);
        match g.command {
            Some(Command::Generate { old, new, credit, output, path }) => {
                assert_eq!(old, PathBuf::from("old"));
                assert_eq!(new, PathBuf::from("new"));
                assert_eq!(credit, vec!["a", "b"]);
                assert!(output.is_none() && path.is_none());
            }
            None => panic!("expected generate"),
        }
        assert!(g.work_dir.is_none());

        assert!(Args::try_parse_from(["smalipatch", "-v", "-q", "tree"]).is_err());
    }
}
