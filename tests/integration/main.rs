//! Integration tests for Stencil

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn stencil() -> Command {
        cargo_bin_cmd!("stencil")
    }

    /// Config file whose cache and generator roots all live under `root`
    fn write_config(root: &Path) -> PathBuf {
        let path = root.join("config.toml");
        let config = format!(
            r#"
[cache]
artifact_dir = "{root}/artifacts"
staging_dir = "{root}/staging"
lock_timeout_secs = 5
lock_poll_ms = 10

[generators]
search_roots = ["{root}/generators"]
generation_timeout_secs = 30

[install]
install_dir = "{root}/downloaded"
"#,
            root = root.display()
        );
        std::fs::write(&path, config).unwrap();
        path
    }

    #[cfg(unix)]
    fn install_generator(root: &Path, package: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let dir = root.join("generators").join(package).join("generators/app");
        std::fs::create_dir_all(&dir).unwrap();
        let entry = dir.join("run");
        std::fs::write(&entry, script).unwrap();
        std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn fingerprint_of(config: &Path, args: &[&str]) -> String {
        let output = stencil()
            .arg("--config")
            .arg(config)
            .arg("fingerprint")
            .args(args)
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    #[test]
    fn help_displays() {
        stencil()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache for"));
    }

    #[test]
    fn version_displays() {
        stencil()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stencil"));
    }

    #[test]
    fn fingerprint_is_stable_and_order_independent() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        let a = fingerprint_of(&config, &["webapp", "-o", "name=orders", "-o", "port=8080"]);
        let b = fingerprint_of(&config, &["webapp", "-o", "port=8080", "-o", "name=orders"]);
        let c = fingerprint_of(&config, &["webapp", "-o", "name=billing", "-o", "port=8080"]);

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_requires_generator() {
        stencil().arg("fingerprint").assert().failure();
    }

    #[test]
    fn poll_unbuilt_fingerprint_is_not_ready() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["poll", &"ab".repeat(32)])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("not ready"));
    }

    #[test]
    fn poll_rejects_malformed_fingerprint() {
        stencil()
            .args(["poll", "../../etc/passwd"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid fingerprint"));
    }

    #[test]
    fn config_path() {
        stencil()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_path_follows_env() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        stencil()
            .env("STENCIL_CONFIG", &config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(temp.path().to_string_lossy().as_ref()));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("lock_poll_ms = 10"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[cache]\nlock_timeout_secs = \"later\"\n").unwrap();

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn generate_missing_generator_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["generate", "missing-pkg"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Generator not found: missing-pkg"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[cfg(unix)]
    #[test]
    fn generate_then_poll() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        install_generator(
            temp.path(),
            "webapp",
            "#!/bin/sh\nmkdir -p src\necho \"$1\" > src/name.txt\n",
        );

        let output = stencil()
            .arg("--config")
            .arg(&config)
            .args(["generate", "webapp", "-o", "name=orders", "--", "orders-svc"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let path = PathBuf::from(String::from_utf8(output.stdout).unwrap().trim());
        assert!(path.is_file());
        assert!(path.starts_with(temp.path().join("artifacts")));

        let fp = fingerprint_of(&config, &["webapp", "-o", "name=orders", "--", "orders-svc"]);
        assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("{fp}.zip"));

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["poll", &fp])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("{fp}.zip")));

        let staging = temp.path().join("staging");
        let leftovers = std::fs::read_dir(&staging).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn start_waits_and_prints_fingerprint() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        install_generator(temp.path(), "webapp", "#!/bin/sh\necho ok > README.md\n");

        let fp = fingerprint_of(&config, &["webapp"]);

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["start", "webapp"])
            .assert()
            .success()
            .stdout(predicate::str::contains(fp.as_str()));

        assert!(temp.path().join("artifacts").join(format!("{fp}.zip")).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn failing_generator_leaves_no_artifact() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        install_generator(
            temp.path(),
            "broken",
            "#!/bin/sh\necho 'template missing' >&2\nexit 3\n",
        );

        stencil()
            .arg("--config")
            .arg(&config)
            .args(["generate", "broken"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("template missing"));

        let fp = fingerprint_of(&config, &["broken"]);
        assert!(!temp.path().join("artifacts").join(format!("{fp}.zip")).exists());
    }

    #[cfg(unix)]
    #[test]
    fn detached_start_builds_the_printed_fingerprint() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        install_generator(temp.path(), "webapp", "#!/bin/sh\necho ok > README.md\n");

        let request = temp.path().join("request.json");
        std::fs::write(
            &request,
            r#"{"generator": "webapp", "options": {"a=b": "c"}, "answers": {"": "blank"}}"#,
        )
        .unwrap();
        let request_arg = request.to_string_lossy().to_string();
        let expected = fingerprint_of(&config, &["--request", &request_arg]);

        let output = stencil()
            .arg("--config")
            .arg(&config)
            .args(["start", "--detach", "--request", &request_arg])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), expected);

        let deadline = Instant::now() + Duration::from_secs(20);
        loop {
            let status = stencil()
                .arg("--config")
                .arg(&config)
                .args(["poll", &expected])
                .output()
                .unwrap()
                .status;
            if status.success() {
                break;
            }
            assert_eq!(status.code(), Some(2));
            assert!(Instant::now() < deadline, "detached build never finished");
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_processes_build_once() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let counter = temp.path().join("invocations.txt");
        install_generator(
            temp.path(),
            "webapp",
            &format!(
                "#!/bin/sh\necho run >> '{}'\nsleep 1\necho ok > README.md\n",
                counter.display()
            ),
        );

        let builders: Vec<_> = (0..2)
            .map(|_| {
                let config = config.clone();
                std::thread::spawn(move || {
                    stencil()
                        .arg("--config")
                        .arg(&config)
                        .args(["generate", "webapp", "-o", "name=orders"])
                        .output()
                        .unwrap()
                })
            })
            .collect();

        let paths: Vec<String> = builders
            .into_iter()
            .map(|builder| {
                let output = builder.join().unwrap();
                assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
                String::from_utf8(output.stdout).unwrap().trim().to_string()
            })
            .collect();

        assert_eq!(paths[0], paths[1]);
        assert!(Path::new(&paths[0]).is_file());
        let runs = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(runs.lines().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn killed_builder_does_not_keep_the_lock() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let started = temp.path().join("started");
        install_generator(
            temp.path(),
            "webapp",
            &format!(
                "#!/bin/sh\nif [ -e '{m}' ]; then echo ok > README.md; exit 0; fi\ntouch '{m}'\nexec sleep 5\n",
                m = started.display()
            ),
        );

        let mut holder = std::process::Command::new(env!("CARGO_BIN_EXE_stencil"))
            .arg("--config")
            .arg(&config)
            .args(["generate", "webapp"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !started.exists() {
            assert!(Instant::now() < deadline, "first builder never started");
            std::thread::sleep(Duration::from_millis(20));
        }
        holder.kill().unwrap();
        holder.wait().unwrap();

        let fp = fingerprint_of(&config, &["webapp"]);
        let artifacts = temp.path().join("artifacts");
        assert!(artifacts.join(format!("{fp}.zip.lock")).exists());
        assert!(!artifacts.join(format!("{fp}.zip")).exists());

        let output = stencil()
            .arg("--config")
            .arg(&config)
            .args(["generate", "webapp"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(artifacts.join(format!("{fp}.zip")).is_file());
    }
}
