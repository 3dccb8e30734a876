//! Console reporting for apply runs.

use diffy::PatchFormatter;
use log::{error, info, warn};
use smalipatch_core::{ApplyReport, FileChange, PatchDocument};

pub fn banner(name: &str, document: &PatchDocument, dry_run: bool) {
    info!("smalipatch {}", env!("CARGO_PKG_VERSION"));
    info!("Patch set: {}", name);
    if dry_run {
        info!("Mode:      dry run (no files will be written)");
    }
    for credit in &document.credits {
        info!("Credit:    {}", credit);
    }
    info!(
        "{} block(s), {} directive(s)",
        document.edits.len(),
        document.directive_count()
    );
}

pub fn outcomes(report: &ApplyReport) {
    let mut current_block = 0;
    for outcome in &report.outcomes {
        if outcome.block != current_block {
            current_block = outcome.block;
            info!("");
            info!("[{}] {}", outcome.block, outcome.target);
        }
        let subject = if outcome.subject.is_empty() {
            String::new()
        } else {
            format!(" {}", outcome.subject)
        };
        match &outcome.error {
            None => info!("  ✓ {}{}", outcome.kind, subject),
            Some(e) => error!("  ✗ {}{}: {}", outcome.kind, subject, e),
        }
    }
}

pub fn diffs(changes: &[FileChange], color: bool) {
    for change in changes {
        let before = change.before.as_deref().unwrap_or("");
        let after = change.after.as_deref().unwrap_or("");
        info!("");
        info!("--- {}", change.path.display());
        info!("{}", unified_diff(before, after, color).trim_end());
    }
}

fn unified_diff(before: &str, after: &str, color: bool) -> String {
    let patch = diffy::create_patch(before, after);
    let formatter = if color {
        PatchFormatter::new().with_color()
    } else {
        PatchFormatter::new()
    };
    let rendered = formatter.fmt_patch(&patch).to_string();
    rendered
}

pub fn summary(report: &ApplyReport, total: usize, dry_run: bool) {
    info!("");
    info!("--- Summary ---");
    info!("Total directives:     {}", total);
    info!("Successfully applied: {}", report.succeeded());
    info!("Failed to apply:      {}", report.failed());
    let skipped = total.saturating_sub(report.outcomes.len());
    if skipped > 0 {
        warn!("Not attempted:        {} (stopped at first failure)", skipped);
    }
    if dry_run {
        info!("Dry run: no files were modified.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_diff_colour_is_optional() {
        let before = "    const/4 v0, 0x0\n";
        let after = "    const/4 v0, 0x1\n";

        let plain = unified_diff(before, after, false);
        assert!(plain.contains("-    const/4 v0, 0x0"));
        assert!(plain.contains("+    const/4 v0, 0x1"));
        assert!(!plain.contains('\x1b'));

        let coloured = unified_diff(before, after, true);
        assert!(coloured.contains('\x1b'));
        assert!(coloured.contains("const/4 v0, 0x1"));
    }
}
