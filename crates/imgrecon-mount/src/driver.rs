//! Loopback mount driver
//!
//! Maps a byte region of a disk image into the mount namespace with the
//! OS mount primitive and `loop,offset=<N>[,ro]` options. Privileges are
//! the caller's problem: the command runner is injected, so a wrapper
//! that prepends `sudo` (or a fake for tests) slots in without changes
//! here.

use imgrecon_core::{Error, Result, ToolRunner};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Build the combined mount-options string for a loopback mount
pub fn mount_options(offset_bytes: u64, read_only: bool) -> String {
    if read_only {
        format!("loop,offset={},ro", offset_bytes)
    } else {
        format!("loop,offset={}", offset_bytes)
    }
}

/// Phrases in mount diagnostics that indicate a privilege problem
const PRIVILEGE_MARKERS: &[&str] = &["permission denied", "only root", "must be superuser"];

/// Performs privileged loopback mounts and unmounts
///
/// Tracks its own active targets so a second activation of a mounted
/// target is refused rather than silently remounted; a double mount
/// would leave the later unmount ambiguous.
pub struct MountDriver {
    runner: Arc<dyn ToolRunner>,
    mount_tool: String,
    umount_tool: String,
    active: Mutex<HashSet<PathBuf>>,
}

impl MountDriver {
    /// Create a driver using the system `mount`/`umount` commands
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self::with_tools(runner, "mount", "umount")
    }

    /// Create a driver with custom mount/unmount command names
    pub fn with_tools(
        runner: Arc<dyn ToolRunner>,
        mount_tool: impl Into<String>,
        umount_tool: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            mount_tool: mount_tool.into(),
            umount_tool: umount_tool.into(),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Mount `image` at `offset_bytes` onto `target`
    ///
    /// Creates the target directory if absent. On tool failure the tool's
    /// own diagnostic is surfaced unmodified.
    ///
    /// # Errors
    ///
    /// - `ImageNotFound` if the image is missing or empty
    /// - `ResourceBusy` if `target` is already an active mount
    /// - `PrivilegeDenied` / `ToolFailed` on mount failure
    pub fn activate(
        &self,
        image: &Path,
        offset_bytes: u64,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        let image_len = std::fs::metadata(image)
            .map_err(|_| Error::image_not_found(image.display().to_string()))?
            .len();
        if image_len == 0 {
            return Err(Error::image_not_found(format!(
                "{} is empty",
                image.display()
            )));
        }
        if offset_bytes >= image_len {
            return Err(Error::offset_invalid(format!(
                "offset {} beyond image end {}",
                offset_bytes, image_len
            )));
        }

        // Claim the target before any I/O so concurrent activations of
        // the same target cannot race past each other.
        {
            let mut active = self.active.lock().expect("mount registry poisoned");
            if !active.insert(target.to_path_buf()) {
                return Err(Error::resource_busy(target.display().to_string()));
            }
        }

        match self.run_mount(image, offset_bytes, target, read_only) {
            Ok(()) => {
                tracing::info!(
                    image = %image.display(),
                    target = %target.display(),
                    offset_bytes,
                    read_only,
                    "mounted image region"
                );
                Ok(())
            }
            Err(e) => {
                self.forget(target);
                Err(e)
            }
        }
    }

    fn run_mount(
        &self,
        image: &Path,
        offset_bytes: u64,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        std::fs::create_dir_all(target)?;

        let options = mount_options(offset_bytes, read_only);
        let image_arg = image.display().to_string();
        let target_arg = target.display().to_string();
        let output = self
            .runner
            .run(&self.mount_tool, &["-o", &options, &image_arg, &target_arg])?;

        if output.success() {
            return Ok(());
        }

        let diagnostic = output.diagnostic().to_string();
        let lowered = diagnostic.to_lowercase();
        if PRIVILEGE_MARKERS.iter().any(|m| lowered.contains(m)) {
            Err(Error::PrivilegeDenied(diagnostic))
        } else {
            Err(Error::tool_failed(self.mount_tool.clone(), diagnostic))
        }
    }

    /// Unmount `target`; the sole inverse of [`activate`](Self::activate)
    ///
    /// # Errors
    ///
    /// - `NotFound` if `target` is not an active mount of this driver
    /// - `ToolFailed` with the tool's verbatim diagnostic otherwise
    pub fn release(&self, target: &Path) -> Result<()> {
        {
            let active = self.active.lock().expect("mount registry poisoned");
            if !active.contains(target) {
                return Err(Error::not_found(format!(
                    "{} is not an active mount",
                    target.display()
                )));
            }
        }

        let target_arg = target.display().to_string();
        let output = self.runner.run(&self.umount_tool, &[&target_arg])?;
        if !output.success() {
            return Err(Error::tool_failed(
                self.umount_tool.clone(),
                output.diagnostic().to_string(),
            ));
        }

        self.forget(target);
        tracing::info!(target = %target.display(), "unmounted");
        Ok(())
    }

    /// Register a mount made by an earlier process so it can be released
    ///
    /// # Errors
    ///
    /// `ResourceBusy` if the target is already tracked.
    pub fn adopt(&self, target: &Path) -> Result<()> {
        let mut active = self.active.lock().expect("mount registry poisoned");
        if !active.insert(target.to_path_buf()) {
            return Err(Error::resource_busy(target.display().to_string()));
        }
        Ok(())
    }

    /// True if `target` is an active mount of this driver
    pub fn is_active(&self, target: &Path) -> bool {
        self.active
            .lock()
            .expect("mount registry poisoned")
            .contains(target)
    }

    fn forget(&self, target: &Path) {
        self.active
            .lock()
            .expect("mount registry poisoned")
            .remove(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgrecon_core::ToolOutput;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    /// Records invocations and replays canned exit codes / stderr
    struct ScriptedRunner {
        calls: StdMutex<Vec<(String, Vec<String>)>>,
        exit_code: i32,
        stderr: &'static str,
    }

    impl ScriptedRunner {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                exit_code: 0,
                stderr: "",
            })
        }

        fn failing(stderr: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                exit_code: 32,
                stderr,
            })
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push((
                program.to_string(),
                args.iter().map(|s| s.to_string()).collect(),
            ));
            Ok(ToolOutput {
                stdout: String::new(),
                stderr: self.stderr.to_string(),
                exit_code: Some(self.exit_code),
            })
        }
    }

    fn fixture_image(dir: &tempfile::TempDir) -> PathBuf {
        let image = dir.path().join("disk.dd");
        std::fs::write(&image, vec![0u8; 4096]).unwrap();
        image
    }

    #[test]
    fn test_mount_options_string() {
        assert_eq!(mount_options(1048576, true), "loop,offset=1048576,ro");
        assert_eq!(mount_options(0, false), "loop,offset=0");
    }

    #[test]
    fn test_activate_invokes_mount_with_options() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");

        let runner = ScriptedRunner::succeeding();
        let driver = MountDriver::new(runner.clone());
        driver.activate(&image, 1024, &target, true).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "mount");
        assert_eq!(calls[0].1[0], "-o");
        assert_eq!(calls[0].1[1], "loop,offset=1024,ro");
        assert!(target.is_dir());
        assert!(driver.is_active(&target));
    }

    #[test]
    fn test_second_activate_on_same_target_is_busy() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");

        let driver = MountDriver::new(ScriptedRunner::succeeding());
        driver.activate(&image, 0, &target, true).unwrap();

        let second = driver.activate(&image, 0, &target, true);
        assert!(matches!(second, Err(Error::ResourceBusy(_))));
    }

    #[test]
    fn test_failure_surfaces_tool_diagnostic_verbatim() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");

        let driver = MountDriver::new(ScriptedRunner::failing(
            "mount: /mnt: wrong fs type, bad option, bad superblock",
        ));
        let err = driver.activate(&image, 0, &target, true).unwrap_err();
        match err {
            Error::ToolFailed { tool, diagnostic } => {
                assert_eq!(tool, "mount");
                assert_eq!(
                    diagnostic,
                    "mount: /mnt: wrong fs type, bad option, bad superblock"
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        // A failed activation releases the claim
        assert!(!driver.is_active(&target));
    }

    #[test]
    fn test_privilege_failure_is_classified() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");

        let driver =
            MountDriver::new(ScriptedRunner::failing("mount: only root can do that"));
        let err = driver.activate(&image, 0, &target, true).unwrap_err();
        assert!(err.is_privilege());
        assert!(err.to_string().contains("only root can do that"));
    }

    #[test]
    fn test_missing_image_is_rejected_before_mounting() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::succeeding();
        let driver = MountDriver::new(runner.clone());

        let err = driver
            .activate(
                &dir.path().join("absent.dd"),
                0,
                &dir.path().join("mnt"),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ImageNotFound(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_offset_beyond_image_end() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let driver = MountDriver::new(ScriptedRunner::succeeding());

        let err = driver
            .activate(&image, 1 << 20, &dir.path().join("mnt"), true)
            .unwrap_err();
        assert!(matches!(err, Error::OffsetInvalid(_)));
    }

    #[test]
    fn test_release_runs_umount_and_clears_state() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");

        let runner = ScriptedRunner::succeeding();
        let driver = MountDriver::new(runner.clone());
        driver.activate(&image, 0, &target, true).unwrap();
        driver.release(&target).unwrap();

        let calls = runner.calls();
        assert_eq!(calls[1].0, "umount");
        assert_eq!(calls[1].1, vec![target.display().to_string()]);
        assert!(!driver.is_active(&target));
    }

    #[test]
    fn test_adopted_mount_can_be_released() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("mnt");

        let runner = ScriptedRunner::succeeding();
        let driver = MountDriver::new(runner.clone());
        driver.adopt(&target).unwrap();
        assert!(matches!(
            driver.adopt(&target),
            Err(Error::ResourceBusy(_))
        ));

        driver.release(&target).unwrap();
        assert_eq!(runner.calls()[0].0, "umount");
    }

    #[test]
    fn test_release_of_unknown_target_fails() {
        let dir = tempdir().unwrap();
        let driver = MountDriver::new(ScriptedRunner::succeeding());
        let err = driver.release(&dir.path().join("mnt")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
