//! User-facing output: per-type preview blocks and the end-of-run summary.
//!
//! This output is the product of a dry run, so it goes to stdout through a
//! [`PreviewSink`] rather than through tracing. Tests plug in a sink that
//! captures the text.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;

use crate::types::{DeletionStats, Resource};

/// Destination for preview blocks and the run summary.
pub trait PreviewSink: Send + Sync {
    fn write(&self, text: &str) -> Result<()>;
}

/// Default sink, writes to stdout.
pub struct StdoutPreviewSink;

impl PreviewSink for StdoutPreviewSink {
    fn write(&self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

/// Render the block printed for one type before any of it is destroyed.
///
/// ```text
/// aws_subnet (2)
///   subnet-0a1b
///     created: 2024-01-02T03:04:05Z
///     tags: Name=public-a, env=dev
///   subnet-0c2d
/// ```
pub fn render_preview(resource_type: &str, resources: &[Resource]) -> String {
    let mut block = format!("{resource_type} ({})\n", resources.len());

    for resource in resources {
        let _ = writeln!(block, "  {}", resource.id);
        if let Some(created_at) = resource.created_at {
            let _ = writeln!(
                block,
                "    created: {}",
                created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            );
        }
        if !resource.tags.is_empty() {
            let tags = resource
                .tags
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(block, "    tags: {tags}");
        }
    }

    block
}

pub fn render_summary(stats: &DeletionStats, dry_run: bool) -> String {
    if dry_run {
        format!(
            "{} resources would be deleted\n",
            stats.stats_matched_resources
        )
    } else {
        format!(
            "{} resources deleted ({} failed)\n",
            stats.stats_deleted_resources, stats.stats_failed_resources
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn preview_lists_ids_time_and_sorted_tags() {
        let resources = vec![
            Resource::new("aws_subnet", "subnet-1")
                .with_tag("env", "dev")
                .with_tag("Name", "public-a")
                .with_created_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            Resource::new("aws_subnet", "subnet-2"),
        ];

        assert_eq!(
            render_preview("aws_subnet", &resources),
            "aws_subnet (2)\n\
             \x20 subnet-1\n\
             \x20   created: 2024-01-02T03:04:05Z\n\
             \x20   tags: Name=public-a, env=dev\n\
             \x20 subnet-2\n"
        );
    }

    #[test]
    fn summary_wording() {
        let stats = DeletionStats {
            stats_matched_resources: 5,
            stats_deleted_resources: 3,
            stats_failed_resources: 2,
        };
        assert_eq!(render_summary(&stats, true), "5 resources would be deleted\n");
        assert_eq!(
            render_summary(&stats, false),
            "3 resources deleted (2 failed)\n"
        );
    }
}
