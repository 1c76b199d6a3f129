use assert_cmd::Command;
use predicates::prelude::*;

fn ctl() -> Command {
    let mut cmd = Command::cargo_bin("disposablesctl").unwrap();
    cmd.env_remove("DISPOSABLES_ENGINE")
        .env_remove("DISPOSABLES_DLC_IMAGE")
        .env_remove("DISPOSABLES_DLC_VOLUME");
    cmd
}

#[test]
fn given_help_flag_then_all_subcommands_are_listed() {
    ctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("bootstrap"))
        .stdout(predicate::str::contains("context"))
        .stdout(predicate::str::contains("logs"));
}

#[test]
fn given_malformed_env_flag_when_run_then_usage_error() {
    ctl()
        .args(["run", "nginx", "-e", "NOVALUE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[cfg(unix)]
mod with_fake_engine {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Engine that accepts anything and echoes its arguments back.
    fn echo_engine(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("engine");
        fs::write(&path, "#!/bin/sh\necho \"$@\"\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn given_explicit_options_when_context_then_json_reflects_them() {
        let dir = TempDir::new().unwrap();
        let engine = echo_engine(&dir);

        let output = ctl()
            .args(["context", "--agent-image", "registry.test/dlc:1", "--volume", "v1"])
            .arg("--engine")
            .arg(&engine)
            .env("DISPOSABLES_DLC_VOLUME", "ignored")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(summary["engine"], engine.to_str().unwrap());
        assert_eq!(summary["agentImage"], "registry.test/dlc:1");
        assert_eq!(summary["volume"], "v1");
        assert_eq!(summary["installDirectory"], "/dlc/registry_test_dlc_1");
    }

    #[test]
    fn given_engine_env_when_context_then_env_engine_is_used() {
        let dir = TempDir::new().unwrap();
        let engine = echo_engine(&dir);

        ctl()
            .arg("context")
            .env("DISPOSABLES_ENGINE", &engine)
            .assert()
            .success()
            .stdout(predicate::str::contains(engine.to_str().unwrap()));
    }

    #[test]
    fn given_follow_flag_when_logs_then_engine_output_is_passed_through() {
        let dir = TempDir::new().unwrap();
        let engine = echo_engine(&dir);

        ctl()
            .args(["logs", "-f", "3f1c2a9d", "--engine"])
            .arg(&engine)
            .assert()
            .success()
            .stdout("logs -f 3f1c2a9d\n");
    }

    #[test]
    fn given_unusable_engine_when_bootstrap_then_failure_names_the_cause() {
        ctl()
            .args(["bootstrap", "--engine", "/nonexistent/disposables/engine"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to resolve container engine"));
    }
}
