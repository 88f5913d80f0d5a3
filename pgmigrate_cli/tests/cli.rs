mod cli {
    use assert_cmd::prelude::*;
    use predicates::str::contains;
    use std::process::Command;

    // `pgmigrate` with no args should exit with a non-zero code.
    #[test]
    fn cli_no_args() {
        Command::cargo_bin("pgmigrate").unwrap().assert().failure();
    }

    #[test]
    fn cli_version() {
        Command::cargo_bin("pgmigrate")
            .unwrap()
            .args(["-V"])
            .assert()
            .stdout(contains(env!("CARGO_PKG_VERSION")));
    }

    // `pgmigrate status` against a config file that doesn't exist should
    // fail with a message naming the missing path, not panic.
    #[test]
    fn status_with_missing_config_fails() {
        Command::cargo_bin("pgmigrate")
            .unwrap()
            .args(["--config", "/no/such/migrate.yaml", "status"])
            .assert()
            .failure()
            .stderr(contains("migrate.yaml"));
    }

    // An unknown subcommand is a clap usage error, not a runtime one.
    #[test]
    fn unknown_subcommand_fails() {
        Command::cargo_bin("pgmigrate")
            .unwrap()
            .args(["frobnicate"])
            .assert()
            .failure();
    }
}
