//! Integration tests for CLI commands

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run the ketchup binary with an isolated config directory
fn ketchup(args: &[&str], home: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ketchup"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute ketchup")
}

/// Kubeconfig pointing at a port nothing listens on
fn unreachable_kubeconfig(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("kubeconfig");
    std::fs::write(
        &path,
        r#"apiVersion: v1
kind: Config
clusters:
- name: nowhere
  cluster:
    server: https://127.0.0.1:1
    insecure-skip-tls-verify: true
contexts:
- name: nowhere
  context:
    cluster: nowhere
    user: nobody
current-context: nowhere
users:
- name: nobody
  user:
    token: not-a-token
"#,
    )
    .unwrap();
    path
}

mod cli_surface {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let home = TempDir::new().unwrap();
        let output = ketchup(&["--help"], home.path());

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("collect"));
        assert!(stdout.contains("inspect"));
    }

    #[test]
    fn test_collect_help_lists_flags() {
        let home = TempDir::new().unwrap();
        let output = ketchup(&["collect", "--help"], home.path());

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        for flag in [
            "--kubeconfig",
            "--namespaces",
            "--format",
            "--compression",
            "--include-custom-resources",
            "--raw",
            "--disable-detection",
            "--deadline",
            "--signatures",
        ] {
            assert!(stdout.contains(flag), "missing {flag}");
        }
    }

    #[test]
    fn test_missing_kubeconfig_flag_is_usage_error() {
        let home = TempDir::new().unwrap();
        let output = ketchup(&["collect"], home.path());
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_invalid_format_is_usage_error() {
        let home = TempDir::new().unwrap();
        let output = ketchup(
            &["collect", "--kubeconfig", "/nonexistent", "--format", "xml"],
            home.path(),
        );

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("xml"));
    }
}

mod collect_command {
    use super::*;

    #[test]
    fn test_unreadable_kubeconfig_is_session_error() {
        let home = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let output = ketchup(
            &[
                "collect",
                "--kubeconfig",
                "/nonexistent/kubeconfig",
                "--output",
                out.path().to_str().unwrap(),
            ],
            home.path(),
        );

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unreachable_server_is_session_error() {
        let home = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let kubeconfig = unreachable_kubeconfig(home.path());
        let output = ketchup(
            &[
                "collect",
                "--kubeconfig",
                kubeconfig.to_str().unwrap(),
                "--output",
                out.path().to_str().unwrap(),
                "--timeout",
                "2",
            ],
            home.path(),
        );

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_zero_concurrency_is_config_error() {
        let home = TempDir::new().unwrap();
        let kubeconfig = unreachable_kubeconfig(home.path());
        let output = ketchup(
            &[
                "collect",
                "--kubeconfig",
                kubeconfig.to_str().unwrap(),
                "--concurrency",
                "0",
            ],
            home.path(),
        );

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_invalid_config_file_is_config_error() {
        let home = TempDir::new().unwrap();
        let kubeconfig = unreachable_kubeconfig(home.path());
        let config = home.path().join("ketchup.yaml");
        std::fs::write(&config, "pageSize: 0\n").unwrap();

        let output = ketchup(
            &[
                "collect",
                "--kubeconfig",
                kubeconfig.to_str().unwrap(),
                "--config",
                config.to_str().unwrap(),
            ],
            home.path(),
        );

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_invalid_signature_file_is_config_error() {
        let home = TempDir::new().unwrap();
        let kubeconfig = unreachable_kubeconfig(home.path());
        let signatures = home.path().join("signatures.yaml");
        std::fs::write(&signatures, "maxScore: 0\n").unwrap();

        let output = ketchup(
            &[
                "collect",
                "--kubeconfig",
                kubeconfig.to_str().unwrap(),
                "--signatures",
                signatures.to_str().unwrap(),
            ],
            home.path(),
        );

        assert_eq!(output.status.code(), Some(2));
    }
}

mod inspect_command {
    use super::*;
    use ketchup_core::output::SUMMARY_STEM;
    use ketchup_core::{
        CollectionRun, CollectionSummary, CompressionMode, OutputOrganizer, SanitizeFailurePolicy,
        create_archive,
    };

    /// Build an archive holding an empty run
    fn empty_run_archive(dir: &Path) -> (CollectionRun, std::path::PathBuf) {
        let run = CollectionRun::new(dir).with_compression(CompressionMode::Compressed);
        let organizer = OutputOrganizer::create(&run).unwrap();
        let mut summary = CollectionSummary::new(&run, SanitizeFailurePolicy::IncludeRaw);
        summary.finalize(run.started_at);
        organizer.write_document(SUMMARY_STEM, &summary).unwrap();
        let info = create_archive(organizer.run_dir(), &run.archive_path()).unwrap();
        (run, info.path)
    }

    #[test]
    fn test_inspect_prints_summary() {
        let home = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let (run, archive) = empty_run_archive(out.path());

        let output = ketchup(&["inspect", archive.to_str().unwrap(), "--files"], home.path());

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains(&run.run_id));
        assert!(stdout.contains("collection-summary.yaml"));
        assert!(stdout.contains("0 resources"));
    }

    #[test]
    fn test_inspect_raw_prints_document() {
        let home = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let (_, archive) = empty_run_archive(out.path());

        let output = ketchup(&["inspect", archive.to_str().unwrap(), "--raw"], home.path());

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let summary = CollectionSummary::parse(&stdout).unwrap();
        assert!(summary.status.empty);
    }

    #[test]
    fn test_inspect_missing_archive_is_archive_error() {
        let home = TempDir::new().unwrap();
        let output = ketchup(&["inspect", "/nonexistent/run.tar.gz"], home.path());
        assert_eq!(output.status.code(), Some(4));
    }
}
