//! Partition table discovery via an external enumeration tool
//!
//! Invokes a Sleuth Kit style enumeration tool (`mmls` by default) on a
//! disk image and parses its line-oriented output. Absence of the tool or
//! of any parsable lines is a legitimate outcome, not a failure: many
//! valid images carry no partition table at all.

use imgrecon_core::{Partition, ToolRunner, SECTOR_SIZE};
use std::path::Path;
use std::sync::Arc;

/// Default enumeration tool
pub const DEFAULT_TOOL: &str = "mmls";

/// Discovers partitions in a disk image
pub struct PartitionScanner {
    runner: Arc<dyn ToolRunner>,
    tool: String,
}

impl PartitionScanner {
    /// Create a scanner using the default tool name
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self::with_tool(runner, DEFAULT_TOOL)
    }

    /// Create a scanner invoking a specific tool
    pub fn with_tool(runner: Arc<dyn ToolRunner>, tool: impl Into<String>) -> Self {
        Self {
            runner,
            tool: tool.into(),
        }
    }

    /// Enumerate partitions using the default 512-byte sector size
    pub fn scan(&self, image: &Path) -> Vec<Partition> {
        self.scan_with_sector_size(image, SECTOR_SIZE)
    }

    /// Enumerate partitions, deriving byte offsets at `sector_size`
    ///
    /// Returns an empty list if the tool is missing, fails, or emits no
    /// parsable partition lines.
    pub fn scan_with_sector_size(&self, image: &Path, sector_size: u64) -> Vec<Partition> {
        let image_arg = image.display().to_string();
        let output = match self.runner.run(&self.tool, &[&image_arg]) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %self.tool, error = %e, "partition enumeration unavailable");
                return Vec::new();
            }
        };

        if !output.success() {
            tracing::debug!(
                tool = %self.tool,
                exit_code = ?output.exit_code,
                diagnostic = output.diagnostic(),
                "enumeration tool reported failure; parsing whatever it printed"
            );
        }

        parse_table(&output.stdout, sector_size)
    }
}

/// Parse enumeration-tool output into ordered partition records
///
/// Each candidate line has the shape
/// `"<index>: <start> <end> <length> <description>"` with base-10 numeric
/// fields. Lines that do not match (headers, footers, blanks) are skipped
/// silently; a line with a malformed numeric field is skipped with a log
/// entry and never aborts parsing of the rest of the table.
pub fn parse_table(text: &str, sector_size: u64) -> Vec<Partition> {
    text.lines()
        .filter_map(|line| match parse_line(line, sector_size) {
            Ok(partition) => partition,
            Err(reason) => {
                tracing::debug!(line, reason, "skipping malformed partition line");
                None
            }
        })
        .collect()
}

/// Parse one line; `Ok(None)` means "not a partition line at all"
fn parse_line(line: &str, sector_size: u64) -> Result<Option<Partition>, &'static str> {
    let line = line.trim();
    let Some((index_part, rest)) = line.split_once(':') else {
        return Ok(None);
    };
    let index_part = index_part.trim();
    if index_part.is_empty() || !index_part.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let mut fields = rest.split_whitespace();
    let Some(start_field) = fields.next() else {
        return Ok(None);
    };

    // From here on the line claims to be a partition entry, so failures
    // are malformed lines rather than headers.
    let index: u64 = index_part.parse().map_err(|_| "index out of range")?;
    let start_sector: u64 = start_field.parse().map_err(|_| "non-numeric start sector")?;
    let end_sector: u64 = fields
        .next()
        .ok_or("missing end sector")?
        .parse()
        .map_err(|_| "non-numeric end sector")?;
    let length_sectors: u64 = fields
        .next()
        .ok_or("missing length")?
        .parse()
        .map_err(|_| "non-numeric length")?;
    let description = fields.collect::<Vec<_>>().join(" ");
    if description.is_empty() {
        return Err("missing description");
    }

    match Partition::new(
        index,
        start_sector,
        end_sector,
        length_sectors,
        description,
        sector_size,
    ) {
        Ok(partition) => Ok(Some(partition)),
        Err(_) => Err("inconsistent sector fields"),
    }
}
