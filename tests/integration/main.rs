//! Integration tests for tmpsync

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn tmpsync() -> Command {
        cargo_bin_cmd!("tmpsync")
    }

    #[test]
    fn help_displays() {
        tmpsync()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("tmpfs volumes synchronized on release"));
    }

    #[test]
    fn version_displays() {
        tmpsync()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("tmpsync"));
    }

    #[test]
    fn corrupt_config_is_fatal() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("tmpsync.json"), "{\"volumes\":").unwrap();

        tmpsync()
            .arg("--root")
            .arg(root.path())
            .arg("--socket")
            .arg(root.path().join("plugin.sock"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unknown_driver_option_is_rejected() {
        let root = TempDir::new().unwrap();

        tmpsync()
            .arg("--root")
            .arg(root.path())
            .args(["-o", "color=blue"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid option (color = blue)"));
    }
}

mod lifecycle_tests {
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tmpsync::config::{ConfigStore, DriverOptions};
    use tmpsync::mount::MountPlatform;
    use tmpsync::sync::Synchronizer;
    use tmpsync::{TmpsyncDriver, TmpsyncError};

    /// Mount primitive that only tracks mount points in memory
    #[derive(Default, Clone)]
    struct FakePlatform {
        mounted: Arc<Mutex<HashSet<PathBuf>>>,
    }

    impl FakePlatform {
        fn is_mounted_now(&self, path: &Path) -> bool {
            self.mounted.lock().unwrap().contains(path)
        }
    }

    #[async_trait]
    impl MountPlatform for FakePlatform {
        async fn mount_tmpfs(&self, target: &Path, data: &str) -> io::Result<()> {
            assert!(data.is_empty() || data.starts_with("size="));
            self.mounted.lock().unwrap().insert(target.to_path_buf());
            Ok(())
        }

        async fn unmount_recursive(&self, target: &Path) -> io::Result<()> {
            self.mounted
                .lock()
                .unwrap()
                .retain(|mount| !mount.starts_with(target));
            Ok(())
        }

        async fn is_mounted(&self, target: &Path) -> io::Result<bool> {
            Ok(self.is_mounted_now(target))
        }

        fn platform_name(&self) -> &'static str {
            "fake"
        }
    }

    /// Transfer tool that logs its arguments and exits with `code`
    fn fake_rsync(dir: &Path, code: i32) -> (PathBuf, PathBuf) {
        let log = dir.join("rsync-args.log");
        let program = dir.join("fake-rsync");
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\necho 'rsync error: simulated' >&2\nexit {}\n",
            log.display(),
            code
        );
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        (program, log)
    }

    async fn driver(root: &Path, program: &Path, platform: FakePlatform) -> TmpsyncDriver {
        TmpsyncDriver::with_components(
            DriverOptions::new(root).unwrap(),
            Synchronizer::with_program(program.to_string_lossy()),
            Box::new(platform),
        )
        .await
        .unwrap()
    }

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn failed_sync_leaves_volume_mounted() {
        let root = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let (program, log) = fake_rsync(tools.path(), 23);
        let platform = FakePlatform::default();
        let driver = driver(root.path(), &program, platform.clone()).await;

        driver
            .create("v1", &opts(&[("size", "64m"), ("target", "/backup/v1")]))
            .await
            .unwrap();
        let mountpoint = driver.root().join("v1");
        assert!(mountpoint.is_dir());
        assert_eq!(driver.get("v1").await.unwrap().mountpoint, mountpoint);

        assert_eq!(driver.mount("v1", "c1").await.unwrap(), mountpoint);
        assert_eq!(driver.path("v1").await.unwrap(), mountpoint);

        let err = driver.unmount("v1", "c1").await.unwrap_err();
        match err {
            TmpsyncError::SyncFailed { output, .. } => assert!(output.contains("simulated")),
            other => panic!("unexpected error: {other}"),
        }

        let args = std::fs::read_to_string(&log).unwrap();
        assert_eq!(args.lines().last(), Some("/backup/v1"));
        assert!(platform.is_mounted_now(&mountpoint));
    }

    #[tokio::test]
    async fn successful_sync_unmounts() {
        let root = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let (program, log) = fake_rsync(tools.path(), 0);
        let platform = FakePlatform::default();
        let driver = driver(root.path(), &program, platform.clone()).await;

        driver
            .create(
                "v1",
                &opts(&[
                    ("target", "backup@host:/srv/v1"),
                    ("opmode", "archive,compress,delete"),
                    ("sshkey", "/keys/id_ed25519"),
                ]),
            )
            .await
            .unwrap();
        driver.mount("v1", "c1").await.unwrap();
        driver.unmount("v1", "c1").await.unwrap();

        let mountpoint = driver.root().join("v1");
        assert!(!platform.is_mounted_now(&mountpoint));

        let logged = std::fs::read_to_string(&log).unwrap();
        let args: Vec<&str> = logged.lines().collect();
        let source = format!("{}/", mountpoint.display());
        assert_eq!(
            args,
            [
                "--archive",
                "--compress",
                "--delete",
                "--recursive",
                "-e",
                "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o LogLevel=quiet -i /keys/id_ed25519",
                source.as_str(),
                "backup@host:/srv/v1",
            ]
        );
    }

    #[tokio::test]
    async fn remove_unknown_leaves_state_unchanged() {
        let root = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let (program, _) = fake_rsync(tools.path(), 0);
        let driver = driver(root.path(), &program, FakePlatform::default()).await;

        driver.create("v1", &HashMap::new()).await.unwrap();
        let config_path = root.path().join("tmpsync.json");
        let before = std::fs::read(&config_path).unwrap();

        let err = driver.remove("v2").await.unwrap_err();
        assert!(matches!(err, TmpsyncError::NotFound(_)));

        assert_eq!(std::fs::read(&config_path).unwrap(), before);
        assert_eq!(driver.list().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_are_all_persisted() {
        const N: usize = 16;
        let root = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let (program, _) = fake_rsync(tools.path(), 0);
        let driver = Arc::new(driver(root.path(), &program, FakePlatform::default()).await);

        let creates = (0..N).map(|i| {
            let driver = Arc::clone(&driver);
            async move { driver.create(&format!("vol-{}", i), &HashMap::new()).await }
        });
        for result in join_all(creates).await {
            result.unwrap();
        }

        assert_eq!(driver.list().await.len(), N);

        let persisted = ConfigStore::new(driver.root()).load().await.unwrap().unwrap();
        assert_eq!(persisted.volumes.len(), N);
        for i in 0..N {
            assert!(persisted.volumes.contains_key(&format!("vol-{}", i)));
        }
    }

    #[tokio::test]
    async fn registry_roundtrips_through_restart() {
        let root = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let (program, _) = fake_rsync(tools.path(), 0);

        let first = driver(root.path(), &program, FakePlatform::default()).await;
        first
            .create(
                "v1",
                &opts(&[
                    ("size", "1g"),
                    ("target", "/backup/v1"),
                    ("opmode", "archive,recursive"),
                    ("sshkey", "/keys/id"),
                ]),
            )
            .await
            .unwrap();
        first.create("v2", &opts(&[("size", "50%")])).await.unwrap();
        first.remove("v2").await.unwrap();
        let before = ConfigStore::new(first.root()).load().await.unwrap().unwrap();
        drop(first);

        let second = driver(root.path(), &program, FakePlatform::default()).await;
        let names: Vec<String> = second.list().await.into_iter().map(|v| v.name).collect();
        assert_eq!(names, ["v1"]);
        assert!(!root.path().join("v2").exists());

        let after = ConfigStore::new(second.root()).load().await.unwrap().unwrap();
        assert_eq!(after, before);

        let v1 = &after.volumes["v1"];
        assert_eq!(v1.fssize.as_ref().map(|s| s.as_str()), Some("1g"));
        assert_eq!(v1.target.as_deref(), Some("/backup/v1"));
        assert!(v1.opmode.archive && v1.opmode.recursive);
        assert_eq!(v1.sshkey, Some(PathBuf::from("/keys/id")));
    }
}
