//! imgrecon CLI - disk-image partition discovery and extraction
//!
//! One-shot commands over raw disk images: list partitions, mount a
//! partition read-only through the loopback device, or extract its
//! contents into a directory without privileges.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use imgrecon_core::{Partition, SystemToolRunner, SECTOR_SIZE};
use imgrecon_extract::NtfsBinding;
use imgrecon_mount::MountDriver;
use imgrecon_session::{ActivateRequest, Coordinator, SessionMode};
use imgrecon_table::PartitionScanner;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "imgrecon", version, about = "Disk-image partition discovery and extraction")]
struct Cli {
    /// Log filter (e.g. "info", "imgrecon_extract=debug")
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List partitions discovered in an image
    Partitions {
        /// Path to the raw disk image
        image: PathBuf,

        /// Sector size for byte-offset derivation
        #[arg(long, default_value_t = SECTOR_SIZE)]
        sector_size: u64,

        /// Enumeration tool to invoke
        #[arg(long, default_value = imgrecon_table::DEFAULT_TOOL)]
        tool: String,
    },

    /// Loopback-mount an image region (requires privileges)
    Mount {
        /// Path to the raw disk image
        image: PathBuf,

        /// Mount point (created if absent)
        target: PathBuf,

        /// Partition index to mount; omit for the whole image
        #[arg(long)]
        partition: Option<u64>,

        /// Extra byte offset added on top of the partition offset
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Mount read-only (pass `--read-only false` for read-write)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        read_only: bool,
    },

    /// Copy an image region's filesystem contents into a directory
    Extract {
        /// Path to the raw disk image
        image: PathBuf,

        /// Destination directory (created if absent)
        dest: PathBuf,

        /// Partition index to extract; omit for the whole image
        #[arg(long)]
        partition: Option<u64>,

        /// Extra byte offset added on top of the partition offset
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Unmount a previously mounted target
    Release {
        /// Mount point to release
        target: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .init();

    let runner = Arc::new(SystemToolRunner::new());

    match cli.command {
        Command::Partitions {
            image,
            sector_size,
            tool,
        } => {
            let scanner = PartitionScanner::with_tool(runner, tool);
            let partitions = scanner.scan_with_sector_size(&image, sector_size);
            print_partitions(&partitions);
        }

        Command::Mount {
            image,
            target,
            partition,
            offset,
            read_only,
        } => {
            let coordinator = coordinator(runner.clone());
            let mut request = ActivateRequest::new(&image, &target, SessionMode::Mounted)
                .with_extra_offset(offset)
                .with_read_only(read_only);
            if let Some(index) = partition {
                request = request.with_partition(select_partition(&coordinator, &image, index)?);
            }

            let session = coordinator.activate(request).await.map_err(|e| {
                if e.is_privilege() {
                    anyhow::anyhow!("{e}\nhint: try `imgrecon extract`, which needs no privileges")
                } else {
                    e.into()
                }
            })?;
            println!(
                "mounted {} at {} (offset {})",
                session.image_path.display(),
                session.target_path.display(),
                session.offset_bytes
            );
        }

        Command::Extract {
            image,
            dest,
            partition,
            offset,
        } => {
            let coordinator = coordinator(runner.clone());
            let mut request = ActivateRequest::new(&image, &dest, SessionMode::Extracted)
                .with_extra_offset(offset);
            if let Some(index) = partition {
                request = request.with_partition(select_partition(&coordinator, &image, index)?);
            }

            let session = coordinator.activate(request).await?;
            let report = session
                .extract_report
                .as_ref()
                .context("extraction produced no report")?;

            println!(
                "extracted {} files / {} directories ({}) to {}",
                report.files_copied,
                report.directories_created,
                format_bytes(report.bytes_copied),
                session.target_path.display()
            );
            if !report.skipped.is_empty() {
                println!("skipped {} entries:", report.skipped.len());
                for entry in &report.skipped {
                    println!("  {}  ({})", entry.path, entry.reason);
                }
            }
        }

        Command::Release { target } => {
            // The session registry does not outlive the process, so release
            // adopts the mount into a fresh driver and unmounts it there.
            let driver = MountDriver::new(runner);
            driver.adopt(&target)?;
            driver.release(&target)?;
            println!("released {}", target.display());
        }
    }

    Ok(())
}

fn coordinator(runner: Arc<SystemToolRunner>) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(runner, Arc::new(NtfsBinding::new())))
}

fn select_partition(
    coordinator: &Arc<Coordinator>,
    image: &PathBuf,
    index: u64,
) -> Result<Partition> {
    let partitions = coordinator.list_partitions_blocking(image);
    match partitions.into_iter().find(|p| p.index == index) {
        Some(partition) => Ok(partition),
        None => bail!("no partition with index {index} in {}", image.display()),
    }
}

fn print_partitions(partitions: &[Partition]) {
    if partitions.is_empty() {
        println!("No partitions found.");
        println!("This may be an unpartitioned volume; offset 0 still works.");
        return;
    }

    println!(
        "{:<6} {:<12} {:<12} {:<14} {}",
        "Index", "Start", "Length", "Offset", "Description"
    );
    println!("{}", "-".repeat(70));
    for partition in partitions {
        println!(
            "{:<6} {:<12} {:<12} {:<14} {}",
            partition.index,
            partition.start_sector,
            partition.length_sectors,
            format_bytes(partition.byte_offset),
            partition.description
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_flags_parse() {
        let cli = Cli::try_parse_from([
            "imgrecon",
            "mount",
            "disk.dd",
            "/mnt/ev",
            "--partition",
            "2",
            "--offset",
            "512",
            "--read-only",
            "false",
        ])
        .unwrap();
        match cli.command {
            Command::Mount {
                partition,
                offset,
                read_only,
                ..
            } => {
                assert_eq!(partition, Some(2));
                assert_eq!(offset, 512);
                assert!(!read_only);
            }
            _ => panic!("expected mount"),
        }
    }

    #[test]
    fn test_mount_defaults_to_read_only() {
        let cli = Cli::try_parse_from(["imgrecon", "mount", "disk.dd", "/mnt/ev"]).unwrap();
        match cli.command {
            Command::Mount {
                read_only, offset, ..
            } => {
                assert!(read_only);
                assert_eq!(offset, 0);
            }
            _ => panic!("expected mount"),
        }
    }

    #[test]
    fn test_release_subcommand_parses() {
        let cli = Cli::try_parse_from(["imgrecon", "release", "/mnt/ev"]).unwrap();
        assert!(matches!(cli.command, Command::Release { .. }));
    }

    #[test]
    fn test_extract_takes_offset_flag() {
        let cli = Cli::try_parse_from([
            "imgrecon", "extract", "disk.dd", "out", "--offset", "1048576",
        ])
        .unwrap();
        match cli.command {
            Command::Extract { offset, .. } => assert_eq!(offset, 1_048_576),
            _ => panic!("expected extract"),
        }
    }
}
