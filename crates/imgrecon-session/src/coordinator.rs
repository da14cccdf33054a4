//! Acquisition coordination
//!
//! The [`Coordinator`] is the subsystem facade: list partitions, activate
//! a target by mounting or extracting, release it again. It owns the
//! session registry (target path -> session) and serializes activation
//! per target: the registry slot is claimed under the lock before any
//! I/O starts, so two concurrent activations of the same target resolve
//! as one success and one `ResourceBusy`.

use crate::session::{ActivateRequest, Session, SessionMode, SessionState};
use imgrecon_core::{Error, FsBinding, Partition, Result, ToolRunner};
use imgrecon_extract::ExtractionWalker;
use imgrecon_mount::MountDriver;
use imgrecon_table::PartitionScanner;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Facade over partition discovery, mounting, and extraction
pub struct Coordinator {
    scanner: PartitionScanner,
    mounts: MountDriver,
    binding: Arc<dyn FsBinding>,
    registry: Mutex<HashMap<PathBuf, Session>>,
    // One cancel flag per in-flight extraction, keyed like the registry
    cancels: Mutex<HashMap<PathBuf, Arc<AtomicBool>>>,
}

impl Coordinator {
    /// Create a coordinator over an injected tool runner and filesystem
    /// binding
    pub fn new(runner: Arc<dyn ToolRunner>, binding: Arc<dyn FsBinding>) -> Self {
        Self {
            scanner: PartitionScanner::new(runner.clone()),
            mounts: MountDriver::new(runner),
            binding,
            registry: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Cancel the extraction running on `target`
    ///
    /// Each activation walks with its own flag, so cancelling one target
    /// never touches another. Returns false when no extraction is in
    /// flight there.
    pub fn cancel(&self, target: &Path) -> bool {
        match self
            .cancels
            .lock()
            .expect("cancel map poisoned")
            .get(target)
        {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Enumerate partitions of an image; empty when none are found
    pub fn list_partitions_blocking(&self, image: &Path) -> Vec<Partition> {
        self.scanner.scan(image)
    }

    /// Activate a session: mount or extract, per the request's mode
    ///
    /// # Errors
    ///
    /// `ResourceBusy` if the target already has a session (in any
    /// non-idle state); otherwise whatever the chosen strategy reports.
    /// There is no fallback between strategies.
    pub fn activate_blocking(&self, request: ActivateRequest) -> Result<Session> {
        let offset_bytes = request.effective_offset()?;
        let target = request.target_path.clone();

        // Claim the slot before any I/O; this is the per-target
        // serialization point.
        {
            let mut registry = self.registry.lock().expect("session registry poisoned");
            if registry.contains_key(&target) {
                return Err(Error::resource_busy(target.display().to_string()));
            }
            registry.insert(target.clone(), Session::activating(&request, offset_bytes));
        }

        let outcome = self.perform_activation(&request, offset_bytes);
        self.cancels
            .lock()
            .expect("cancel map poisoned")
            .remove(&target);

        let mut registry = self.registry.lock().expect("session registry poisoned");
        match outcome {
            Ok(report) => {
                let session = registry
                    .get_mut(&target)
                    .ok_or_else(|| Error::session_state("session vanished during activation"))?;
                session.state = SessionState::Active;
                session.extract_report = report;
                tracing::info!(session = %session, "session activated");
                Ok(session.clone())
            }
            Err(e) => {
                // Failed activation returns the target to Idle
                registry.remove(&target);
                Err(e)
            }
        }
    }

    fn perform_activation(
        &self,
        request: &ActivateRequest,
        offset_bytes: u64,
    ) -> Result<Option<imgrecon_core::ExtractReport>> {
        match request.mode {
            SessionMode::Mounted => {
                self.mounts.activate(
                    &request.image_path,
                    offset_bytes,
                    &request.target_path,
                    request.read_only,
                )?;
                Ok(None)
            }
            SessionMode::Extracted => {
                let walker = ExtractionWalker::new();
                self.cancels
                    .lock()
                    .expect("cancel map poisoned")
                    .insert(request.target_path.clone(), walker.cancel_flag());
                let mut volume = self.binding.open(&request.image_path, offset_bytes)?;
                let report = walker.extract(volume.as_mut(), &request.target_path)?;
                Ok(Some(report))
            }
        }
    }

    /// Release the session on `target`; the only way out of `Active`
    ///
    /// Unmounts mounted sessions; extracted destinations stay on disk,
    /// only the session record is dropped.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown target, `SessionState` when the session
    /// is not `Active`, and the unmount tool's failure otherwise (the
    /// session then stays `Active`).
    pub fn release_blocking(&self, target: &Path) -> Result<Session> {
        let mode = {
            let mut registry = self.registry.lock().expect("session registry poisoned");
            let session = registry
                .get_mut(target)
                .ok_or_else(|| Error::not_found(format!("no session for {}", target.display())))?;
            if session.state != SessionState::Active {
                return Err(Error::session_state(format!(
                    "session for {} is {:?}, not Active",
                    target.display(),
                    session.state
                )));
            }
            session.state = SessionState::Releasing;
            session.mode
        };

        if mode == SessionMode::Mounted {
            if let Err(e) = self.mounts.release(target) {
                let mut registry = self.registry.lock().expect("session registry poisoned");
                if let Some(session) = registry.get_mut(target) {
                    session.state = SessionState::Active;
                }
                return Err(e);
            }
        }

        let mut registry = self.registry.lock().expect("session registry poisoned");
        let mut session = registry
            .remove(target)
            .ok_or_else(|| Error::session_state("session vanished during release"))?;
        session.state = SessionState::Idle;
        tracing::info!(target = %target.display(), "session released");
        Ok(session)
    }

    /// Look up the session registered on `target`
    pub fn lookup(&self, target: &Path) -> Option<Session> {
        self.registry
            .lock()
            .expect("session registry poisoned")
            .get(target)
            .cloned()
    }

    /// Snapshot of all registered sessions
    pub fn sessions(&self) -> Vec<Session> {
        self.registry
            .lock()
            .expect("session registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Async facade: partition listing off the caller's thread
    pub async fn list_partitions(self: &Arc<Self>, image: PathBuf) -> Vec<Partition> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.list_partitions_blocking(&image))
            .await
            .unwrap_or_default()
    }

    /// Async facade: activation off the caller's thread
    pub async fn activate(self: &Arc<Self>, request: ActivateRequest) -> Result<Session> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.activate_blocking(request))
            .await
            .map_err(|e| Error::session_state(format!("activation worker failed: {e}")))?
    }

    /// Async facade: release off the caller's thread
    pub async fn release(self: &Arc<Self>, target: PathBuf) -> Result<Session> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.release_blocking(&target))
            .await
            .map_err(|e| Error::session_state(format!("release worker failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgrecon_core::{ToolOutput, SECTOR_SIZE};
    use imgrecon_extract::{MemoryBinding, MemoryVolume};
    use std::collections::BTreeSet;
    use std::sync::mpsc;
    use tempfile::{tempdir, TempDir};

    /// Runner that simulates mmls/mount/umount; its fake mount populates
    /// the target with the same top-level names the memory volume holds
    struct FakeTools {
        mount_entries: Vec<(&'static str, bool)>,
        fail_mount_with: Option<&'static str>,
    }

    impl FakeTools {
        fn working() -> Arc<Self> {
            Arc::new(Self {
                mount_entries: vec![("readme.txt", false), ("Documents", true)],
                fail_mount_with: None,
            })
        }

        fn broken_mount(stderr: &'static str) -> Arc<Self> {
            Arc::new(Self {
                mount_entries: Vec::new(),
                fail_mount_with: Some(stderr),
            })
        }
    }

    impl ToolRunner for FakeTools {
        fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let mut exit_code = 0;
            match program {
                "mmls" => {
                    stdout = "000: 0 2047 2048 FAT(0x0c)\n001: 2048 4095 2048 NTFS(0x07)\n"
                        .to_string();
                }
                "mount" => {
                    if let Some(msg) = self.fail_mount_with {
                        stderr = msg.to_string();
                        exit_code = 32;
                    } else {
                        let target = Path::new(args[3]);
                        for (name, is_dir) in &self.mount_entries {
                            let path = target.join(name);
                            if *is_dir {
                                std::fs::create_dir_all(path).unwrap();
                            } else {
                                std::fs::write(path, b"mounted").unwrap();
                            }
                        }
                    }
                }
                "umount" => {}
                other => panic!("unexpected tool {other}"),
            }
            Ok(ToolOutput {
                stdout,
                stderr,
                exit_code: Some(exit_code),
            })
        }
    }

    /// Runner whose mount blocks until told to proceed, pinning the
    /// session in `Activating` for the duration
    struct GatedTools {
        started: Mutex<mpsc::Sender<()>>,
        proceed: Mutex<mpsc::Receiver<()>>,
    }

    impl ToolRunner for GatedTools {
        fn run(&self, program: &str, _args: &[&str]) -> Result<ToolOutput> {
            if program == "mount" {
                self.started.lock().expect("gate poisoned").send(()).ok();
                let _ = self.proceed.lock().expect("gate poisoned").recv();
            }
            Ok(ToolOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    fn fixture_binding() -> Arc<MemoryBinding> {
        let mut volume = MemoryVolume::new().with_pseudo_entries();
        volume.add_file("readme.txt", b"notes");
        volume.add_dir("Documents");
        volume.add_file("Documents/report.doc", b"contents");
        Arc::new(MemoryBinding::new(volume))
    }

    fn fixture_image(dir: &TempDir) -> PathBuf {
        let image = dir.path().join("disk.dd");
        std::fs::write(&image, vec![0u8; 4096]).unwrap();
        image
    }

    fn coordinator(runner: Arc<FakeTools>) -> Arc<Coordinator> {
        Arc::new(Coordinator::new(runner, fixture_binding()))
    }

    fn top_level_names(dir: &Path) -> BTreeSet<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_list_partitions() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let coordinator = coordinator(FakeTools::working());

        let partitions = coordinator.list_partitions_blocking(&image);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[1].byte_offset, 2048 * 512);
    }

    #[test]
    fn test_extract_session_lifecycle() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("out");
        let coordinator = coordinator(FakeTools::working());

        let request =
            ActivateRequest::new(&image, &target, SessionMode::Extracted);
        let session = coordinator.activate_blocking(request).unwrap();

        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.mode, SessionMode::Extracted);
        let report = session.extract_report.as_ref().unwrap();
        assert_eq!(report.files_copied, 2);
        assert!(target.join("Documents/report.doc").exists());

        assert!(coordinator.lookup(&target).is_some());
        let released = coordinator.release_blocking(&target).unwrap();
        assert_eq!(released.state, SessionState::Idle);
        assert!(coordinator.lookup(&target).is_none());
        // Extracted content stays on disk after release
        assert!(target.join("readme.txt").exists());
    }

    #[test]
    fn test_mount_and_extract_agree_on_top_level_names() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let mount_target = dir.path().join("mnt");
        let extract_target = dir.path().join("out");
        let coordinator = coordinator(FakeTools::working());

        coordinator
            .activate_blocking(ActivateRequest::new(
                &image,
                &mount_target,
                SessionMode::Mounted,
            ))
            .unwrap();
        coordinator
            .activate_blocking(ActivateRequest::new(
                &image,
                &extract_target,
                SessionMode::Extracted,
            ))
            .unwrap();

        assert_eq!(
            top_level_names(&mount_target),
            top_level_names(&extract_target)
        );
    }

    #[test]
    fn test_same_target_twice_is_busy() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("out");
        let coordinator = coordinator(FakeTools::working());

        coordinator
            .activate_blocking(ActivateRequest::new(&image, &target, SessionMode::Extracted))
            .unwrap();
        let second = coordinator
            .activate_blocking(ActivateRequest::new(&image, &target, SessionMode::Extracted));
        assert!(matches!(second, Err(Error::ResourceBusy(_))));
    }

    #[test]
    fn test_concurrent_activations_one_wins() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("out");
        let coordinator = coordinator(FakeTools::working());

        let results: Vec<Result<Session>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let coordinator = Arc::clone(&coordinator);
                    let request =
                        ActivateRequest::new(&image, &target, SessionMode::Extracted);
                    scope.spawn(move || coordinator.activate_blocking(request))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let busy = results
            .iter()
            .filter(|r| matches!(r, Err(Error::ResourceBusy(_))))
            .count();
        assert_eq!((ok, busy), (1, 1));
    }

    #[test]
    fn test_failed_mount_returns_target_to_idle_without_fallback() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");
        let coordinator = coordinator(FakeTools::broken_mount(
            "mount: permission denied",
        ));

        let err = coordinator
            .activate_blocking(ActivateRequest::new(&image, &target, SessionMode::Mounted))
            .unwrap_err();
        assert!(err.is_privilege());

        // No silent fallback to extraction, and the slot is free again
        assert!(coordinator.lookup(&target).is_none());
        assert!(top_level_names(&target).is_empty());
        coordinator
            .activate_blocking(ActivateRequest::new(&image, &target, SessionMode::Extracted))
            .unwrap();
    }

    #[test]
    fn test_release_unknown_target_fails() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator(FakeTools::working());
        let err = coordinator
            .release_blocking(&dir.path().join("nothing"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_release_during_activation_is_refused() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("mnt");

        let (started_tx, started_rx) = mpsc::channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let runner = Arc::new(GatedTools {
            started: Mutex::new(started_tx),
            proceed: Mutex::new(proceed_rx),
        });
        let coordinator = Arc::new(Coordinator::new(runner, fixture_binding()));

        std::thread::scope(|scope| {
            let worker = {
                let coordinator = Arc::clone(&coordinator);
                let request = ActivateRequest::new(&image, &target, SessionMode::Mounted);
                scope.spawn(move || coordinator.activate_blocking(request))
            };

            // The mount tool is blocked, so the session sits in Activating
            started_rx.recv().unwrap();
            let err = coordinator.release_blocking(&target).unwrap_err();
            assert!(matches!(err, Error::SessionState(_)));

            proceed_tx.send(()).unwrap();
            worker.join().unwrap().unwrap();
        });

        // Once Active, release succeeds
        coordinator.release_blocking(&target).unwrap();
    }

    #[test]
    fn test_cancellation_is_scoped_to_one_target() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let coordinator = coordinator(FakeTools::working());

        coordinator
            .activate_blocking(ActivateRequest::new(&image, &first, SessionMode::Extracted))
            .unwrap();
        // The finished walk's flag is gone; there is nothing to cancel
        assert!(!coordinator.cancel(&first));
        assert!(!coordinator.cancel(&second));

        // A later activation walks with its own clear flag
        let session = coordinator
            .activate_blocking(ActivateRequest::new(&image, &second, SessionMode::Extracted))
            .unwrap();
        assert_eq!(session.extract_report.as_ref().unwrap().files_copied, 2);
    }

    #[test]
    fn test_partition_and_extra_offset_recorded_distinctly() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("out");
        let coordinator = coordinator(FakeTools::working());

        let partition =
            Partition::new(1, 2, 3, 2, "FAT(0x0c)".into(), SECTOR_SIZE).unwrap();
        let session = coordinator
            .activate_blocking(
                ActivateRequest::new(&image, &target, SessionMode::Extracted)
                    .with_partition(partition)
                    .with_extra_offset(512),
            )
            .unwrap();

        assert_eq!(session.offset_bytes, 2 * 512 + 512);
        assert_eq!(session.extra_offset_bytes, 512);
        assert_eq!(session.partition.as_ref().unwrap().byte_offset, 1024);
    }

    #[tokio::test]
    async fn test_async_facade_round_trip() {
        let dir = tempdir().unwrap();
        let image = fixture_image(&dir);
        let target = dir.path().join("out");
        let coordinator = coordinator(FakeTools::working());

        let partitions = coordinator.list_partitions(image.clone()).await;
        assert_eq!(partitions.len(), 2);

        let session = coordinator
            .activate(ActivateRequest::new(&image, &target, SessionMode::Extracted))
            .await
            .unwrap();
        assert_eq!(session.state, SessionState::Active);

        coordinator.release(target.clone()).await.unwrap();
        assert!(coordinator.lookup(&target).is_none());
    }
}
