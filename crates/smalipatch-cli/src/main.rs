mod config;
mod report;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use config::{load_config, Args, Command, Config};
use env_logger::WriteStyle;
use log::{error, info, warn, LevelFilter};
use smalipatch_core::{
    apply_document, diff_file, diff_trees, parse, render, ApplyOptions, DiskTree, FileEdit, PatchDocument,
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

const PATCH_EXTENSION: &str = "smalipatch";

fn main() {
    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            process::exit(2);
        }
    };
    let color = use_color();
    init_logger(&args, &config, color);

    let result = match args.command.clone() {
        Some(Command::Generate {
            old,
            new,
            output,
            credit,
            path,
        }) => generate(&config, &old, &new, output.as_deref(), credit, path),
        None => apply(&args, &config, color),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            process::exit(2);
        }
    }
}

/// Colour unless `NO_COLOR` is set or stderr is not a terminal.
fn use_color() -> bool {
    let disabled = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
    !disabled && atty::is(atty::Stream::Stderr)
}

fn init_logger(args: &Args, config: &Config, color: bool) {
    let configured = config.level_filter().unwrap_or(LevelFilter::Info);
    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        configured
    };

    env_logger::Builder::new()
        .filter_level(level)
        .write_style(if color { WriteStyle::Always } else { WriteStyle::Never })
        .format(|buf, record| match record.level() {
            log::Level::Info => writeln!(buf, "{}", record.args()),
            other => {
                let style = buf.default_level_style(other);
                writeln!(
                    buf,
                    "{style}{}{style:#}: {}",
                    other.as_str().to_lowercase(),
                    record.args()
                )
            }
        })
        .parse_default_env()
        .init();

    if config.level_filter().is_none() {
        warn!("unknown log_level {:?} in config, using info", config.log_level);
    }
}

/// Exit code 0 when every directive applied, 1 otherwise.
fn apply(args: &Args, config: &Config, color: bool) -> Result<i32> {
    let Some(work_dir) = args.work_dir.as_deref() else {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "the <WORK_DIR> argument is required")
            .exit();
    };
    if !work_dir.is_dir() {
        bail!("Work directory not found: {}", work_dir.display());
    }

    let (name, content) = read_patch(args.patch_file.as_deref())?;
    if content.trim().is_empty() {
        bail!("Empty patch content");
    }

    let document = match parse(&content) {
        Ok(document) => document,
        Err(e) => {
            error!("Failed to parse {}: {}", name, e);
            return Ok(1);
        }
    };
    if document.is_empty() {
        warn!("No directives found in {}", name);
        return Ok(0);
    }

    let options = ApplyOptions {
        skip_failed: args.skip_failed || config.skip_failed,
        dry_run: args.dry_run,
    };
    report::banner(&name, &document, options.dry_run);

    let mut tree = DiskTree::new(work_dir).with_exclude(config.exclude.clone());
    let outcome = apply_document(&document, &mut tree, options);

    report::outcomes(&outcome);
    if config.show_diff && !args.quiet {
        report::diffs(&outcome.changes, color);
    }
    report::summary(&outcome, document.directive_count(), options.dry_run);

    Ok(if outcome.is_success() { 0 } else { 1 })
}

fn read_patch(patch_file: Option<&Path>) -> Result<(String, String)> {
    if let Some(path) = patch_file {
        if !path.is_file() {
            bail!("Patch file not found at '{}'", path.display());
        }
        if path.extension().and_then(|e| e.to_str()) != Some(PATCH_EXTENSION) {
            warn!("{} does not have the .{} extension", path.display(), PATCH_EXTENSION);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read patch file {:?}", path))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        return Ok((name, content));
    }

    if atty::is(atty::Stream::Stdin) {
        Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "no patch file specified and no data piped from stdin",
            )
            .exit();
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read patch from stdin")?;
    Ok(("<stdin>".to_string(), buffer))
}

fn generate(
    config: &Config,
    old: &Path,
    new: &Path,
    output: Option<&Path>,
    credits: Vec<String>,
    path: Option<PathBuf>,
) -> Result<i32> {
    let mut document = if old.is_dir() && new.is_dir() {
        let old_tree = DiskTree::new(old).with_exclude(config.exclude.clone());
        let new_tree = DiskTree::new(new).with_exclude(config.exclude.clone());
        let generated = diff_trees(&old_tree, &new_tree)
            .with_context(|| format!("Failed to compare {:?} with {:?}", old, new))?;
        if !generated.warnings.is_empty() {
            warn!(
                "{} file(s) may not round-trip exactly; review the output",
                generated.warnings.len()
            );
        }
        generated.document
    } else if old.is_file() && new.is_file() {
        let target = match path {
            Some(path) => path,
            None => PathBuf::from(new.file_name().context("New file has no file name")?),
        };
        let before = fs::read_to_string(old).with_context(|| format!("Failed to read {:?}", old))?;
        let after = fs::read_to_string(new).with_context(|| format!("Failed to read {:?}", new))?;
        let mut document = PatchDocument::default();
        if before != after {
            let diff = diff_file(&target, &before, &after)?;
            if let Some(warning) = diff.warning {
                warn!("{}", warning);
            }
            if !diff.directives.is_empty() {
                document.edits.push(FileEdit::file(target, diff.directives));
            }
        }
        document
    } else {
        bail!(
            "{} and {} must both be directories or both be files",
            old.display(),
            new.display()
        );
    };
    document.credits = credits;

    if document.is_empty() {
        warn!("No differences found");
    } else {
        info!(
            "Generated {} block(s) with {} directive(s)",
            document.edits.len(),
            document.directive_count()
        );
    }

    let text = render(&document);
    match output {
        Some(file) => {
            fs::write(file, &text).with_context(|| format!("Failed to write {:?}", file))?;
            info!("Wrote {}", file.display());
        }
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("Failed to write patch to stdout")?,
    }
    Ok(0)
}
