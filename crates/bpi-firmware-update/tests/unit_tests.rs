//! Unit tests for the public API of the firmware update crate

mod error_tests {
    use bpi_firmware_update::prelude::*;

    #[test]
    fn test_descriptions_are_non_empty() {
        for kind in ErrorKind::ALL {
            assert!(!error_string(kind.code()).is_empty());
            assert_eq!(kind.to_string(), error_string(kind.code()));
            assert!(kind.code() < 0);
        }
    }

    #[test]
    fn test_constructors() {
        assert_eq!(FirmwareUpdateError::invalid("x").code(), -1);
        assert_eq!(
            FirmwareUpdateError::system("x").kind(),
            ErrorKind::SystemCommandFailed
        );
    }

    #[test]
    fn test_result_code_of_bank_failure() {
        let failed: Result<(), FirmwareUpdateError> =
            Err(FirmwareUpdateError::BankDetectionFailed("no root=".to_string()));
        assert_eq!(bpi_firmware_update::result_code(&failed), -9);
    }
}

mod bank_tests {
    use bpi_firmware_update::bank::{KERNEL_A, KERNEL_B, ROOTFS_A, ROOTFS_B};
    use bpi_firmware_update::prelude::*;
    use bpi_firmware_update::detect_active_bank;

    #[test]
    fn test_fixed_topology() {
        assert_eq!(ROOTFS_A, "/dev/mmcblk0p4");
        assert_eq!(ROOTFS_B, "/dev/mmcblk0p8");
        assert_eq!(KERNEL_A, "/dev/mmcblk0p3");
        assert_eq!(KERNEL_B, "/dev/mmcblk0p7");
    }

    #[test]
    fn test_passive_indices_follow_cmdline() -> Result<(), FirmwareUpdateError> {
        let on_a = detect_active_bank("root=/dev/mmcblk0p4 console=ttyS0", BankFallback::Strict)?;
        assert_eq!(on_a.other().kernel_image_index(), 7);
        assert_eq!(on_a.other().rootfs_image_index(), 8);

        let on_b = detect_active_bank("console=ttyS0 root=/dev/mmcblk0p8", BankFallback::Strict)?;
        assert_eq!(on_b.other().kernel_image_index(), 3);
        assert_eq!(on_b.other().rootfs_image_index(), 4);
        Ok(())
    }

    #[test]
    fn test_root_prefix_is_not_a_match() {
        let result = detect_active_bank("root=/dev/mmcblk0p40", BankFallback::Strict);
        assert!(matches!(result, Err(FirmwareUpdateError::BankDetectionFailed(_))));
    }
}

mod config_tests {
    use bpi_firmware_update::prelude::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_yaml_file() -> Result<(), Box<dyn std::error::Error>> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "staging_device: /dev/sdb1\n")?;
        let config = UpdateConfig::from_yaml_file(file.path())?;
        assert_eq!(config.staging_device, PathBuf::from("/dev/sdb1"));
        assert_eq!(config.staging_mount, PathBuf::from("/staging"));
        Ok(())
    }

    #[test]
    fn test_missing_yaml_file() {
        let result = UpdateConfig::from_yaml_file(std::path::Path::new("/nonexistent/bpifw.yaml"));
        assert!(matches!(result, Err(FirmwareUpdateError::FileNotFound(_))));
    }

    #[test]
    fn test_progress_callback_is_shared_by_clones() {
        let counter = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&counter);
        let config = UpdateConfig::default().with_progress(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        let copy = config.clone();
        assert_eq!(format!("{:?}", copy.progress), "Some(ProgressCallback(..))");

        let progress = UpdateProgress {
            stage: ProgressStage::Update,
            percent: 10,
            message: "Environment setup complete".to_string(),
        };
        for callback in [&config.progress, &copy.progress].into_iter().flatten() {
            callback.call(&progress);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}

mod updater_tests {
    use bpi_firmware_update::prelude::*;
    use bpi_firmware_update::updater::{EXTRA_LIBRARY_PATH, EXTRA_SEARCH_PATH};
    use bpi_firmware_update::{BlockMount, CommandError, ExecOptions, SystemCommand};
    use std::path::Path;
    use std::sync::Arc;

    struct InertPlatform;

    #[async_trait::async_trait]
    impl Platform for InertPlatform {
        async fn execute(&self, _: &SystemCommand, _: &ExecOptions) -> Result<(), CommandError> {
            Ok(())
        }
        async fn mount(&self, _: &BlockMount) -> Result<(), CommandError> {
            Ok(())
        }
        async fn unmount(&self, _: &Path) -> Result<(), CommandError> {
            Ok(())
        }
        async fn unmount_device(&self, _: &Path) -> Result<(), CommandError> {
            Ok(())
        }
        async fn sync(&self) -> Result<(), CommandError> {
            Ok(())
        }
        async fn reboot(&self) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[test]
    fn test_setup_environment_extends_paths() -> Result<(), FirmwareUpdateError> {
        let mut updater = FirmwareUpdater::new(Arc::new(InertPlatform));
        assert!(matches!(
            updater.setup_environment(),
            Err(FirmwareUpdateError::InvalidParameter(_))
        ));

        updater.init(None)?;
        updater.setup_environment()?;
        let exec = updater.exec_options();
        let path = exec.search_path.clone().unwrap_or_default();
        let library = exec.library_path.clone().unwrap_or_default();
        assert!(path.to_string_lossy().ends_with(EXTRA_SEARCH_PATH));
        assert!(library.to_string_lossy().ends_with(EXTRA_LIBRARY_PATH));
        assert!(!path.to_string_lossy().starts_with(':'));
        Ok(())
    }

    #[test]
    fn test_init_applies_command_timeout() -> Result<(), FirmwareUpdateError> {
        let mut updater = FirmwareUpdater::new(Arc::new(InertPlatform));
        let config = UpdateConfig {
            command_timeout_secs: Some(900),
            ..UpdateConfig::default()
        };
        updater.init(Some(config))?;
        assert_eq!(
            updater.exec_options().timeout,
            Some(std::time::Duration::from_secs(900))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_requires_init() {
        let updater = FirmwareUpdater::new(Arc::new(InertPlatform));
        let bank = BankInfo {
            active_bank: Bank::A,
            passive_rootfs: "/dev/mmcblk0p8".into(),
            passive_kernel: "/dev/mmcblk0p7".into(),
            passive_kernel_partition_index: 7,
            passive_rootfs_partition_index: 8,
            passive_kernel_offset: 0,
            passive_rootfs_offset: 0,
        };
        let result = updater.verify_kernel(&bank).await;
        assert!(matches!(result, Err(FirmwareUpdateError::InvalidParameter(_))));
        let result = updater.update_kernel_partition(&bank).await;
        assert!(matches!(result, Err(FirmwareUpdateError::InvalidParameter(_))));
    }
}
