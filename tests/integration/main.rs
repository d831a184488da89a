//! Integration tests for mlpipe

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Isolate config and state from the host user's directories
    fn mlpipe(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("mlpipe");
        cmd.env("HOME", home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("XDG_STATE_HOME", home.join(".local/state"))
            .env_remove("MLPIPE_CONFIG")
            .current_dir(home);
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        mlpipe(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Container pipeline"))
            .stdout(predicate::str::contains("prepare-data"))
            .stdout(predicate::str::contains("process-data"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        mlpipe(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mlpipe"));
    }

    #[test]
    fn config_path_honours_flag() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("custom.toml");
        mlpipe(home.path())
            .args(["config", "path", "-c"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_prints_defaults() {
        let home = TempDir::new().unwrap();
        mlpipe(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[image]"))
            .stdout(predicate::str::contains("python:3.12.2-bookworm"))
            .stdout(predicate::str::contains("lead_model"));
    }

    #[test]
    fn local_config_overrides_global() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join(".mlpipe.toml"),
            "[registry]\nalias = \"production\"\n",
        )
        .unwrap();

        mlpipe(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("alias = \"production\""));

        mlpipe(home.path())
            .args(["--no-local", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("alias = \"staging\""));
    }

    #[test]
    fn config_init_writes_file() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("conf").join("config.toml");

        mlpipe(home.path())
            .args(["config", "init", "-c"])
            .arg(&path)
            .assert()
            .success();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[dataset]"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("bad.toml");
        std::fs::write(&path, "[engine]\nreuse_layers = \"sometimes\"\n").unwrap();

        mlpipe(home.path())
            .args(["config", "show", "-c"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join(".mlpipe.toml"),
            "[engine]\nprogram = \"containerd\"\n",
        )
        .unwrap();

        mlpipe(home.path())
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown container engine"));
    }

    #[test]
    fn missing_source_dir_fails() {
        let home = TempDir::new().unwrap();
        mlpipe(home.path())
            .args(["build-env", "--src", "does-not-exist"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn cache_help() {
        let home = TempDir::new().unwrap();
        mlpipe(home.path())
            .args(["cache", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("clear"));
    }
}
