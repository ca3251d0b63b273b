use assert_cmd::Command;
use predicates::prelude::*;

fn micmac() -> Command {
    Command::cargo_bin("micmac").unwrap()
}

#[test]
fn runs_without_arguments() {
    micmac()
        .assert()
        .success()
        .stdout(predicate::str::contains("micmac v"));
}

#[test]
fn runs_store_program() {
    micmac()
        .args(["run", "--minimal", "--dump", "100", "tests/files/store.mac"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PC 3\nSP 4096\nAC 5\nDEPTH 0\n"))
        .stdout(predicate::str::contains("M[100] 5"));
}

#[test]
fn runs_path_shorthand() {
    micmac()
        .arg("tests/files/store.mac")
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed"));
}

#[test]
fn runs_subroutine() {
    micmac()
        .args(["run", "-m", "-d", "0xb", "tests/files/sum.mac"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PC 8\nSP 4096\nAC 7\nDEPTH 0\n"))
        .stdout(predicate::str::contains("M[11] 7"))
        .stdout(predicate::str::contains("halted after 11 steps"));
}

#[test]
fn echoes_lines_and_directives() {
    micmac()
        .args(["run", "--echo", "--minimal", "tests/files/sum.mac"])
        .assert()
        .success()
        .stdout(predicate::str::contains("   6:         CALL add"))
        .stdout(predicate::str::contains("sum is in ac"))
        .stdout(predicate::str::contains("  12:         ADDL 2"));
}

#[test]
fn reads_stdin() {
    micmac()
        .args(["run", "--minimal", "-"])
        .write_stdin("LOCO 9\nx: JUMP x\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("AC 9"));
}

#[test]
fn runtime_error_names_line() {
    micmac()
        .args(["run", "--minimal", "tests/files/underflow.mac"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("PC 1"))
        .stderr(predicate::str::contains("on line 2: POP"))
        .stderr(predicate::str::contains("underflows the stack"));
}

#[test]
fn dump_keeps_runtime_error() {
    micmac()
        .args(["run", "--minimal", "--dump", "4095", "tests/files/underflow.mac"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("M[4095] 0"))
        .stderr(predicate::str::contains("underflows the stack"));
}

#[test]
fn dump_rejects_address_outside_memory() {
    micmac()
        .args(["run", "--dump", "5000", "tests/files/store.mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside memory"));
    micmac()
        .args(["run", "--dump", "0x1000", "tests/files/store.mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside memory"));
    micmac()
        .args(["run", "--minimal", "--dump", "0xfff", "tests/files/store.mac"])
        .assert()
        .success()
        .stdout(predicate::str::contains("M[4095] 0"));
}

#[test]
fn step_limit_stops_endless_loop() {
    micmac()
        .args(["run", "--limit", "10", "tests/files/forever.mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did not halt within 10 steps"));
}

#[test]
fn step_limit_from_environment() {
    micmac()
        .env("MICMAC_STEP_LIMIT", "25")
        .args(["run", "tests/files/forever.mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("within 25 steps"));
}

#[test]
fn check_success() {
    micmac()
        .args(["check", "tests/files/sum.mac"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no errors found!"));
}

#[test]
fn check_undefined_label() {
    micmac()
        .args(["check", "tests/files/undefined_label.mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error on line 2"))
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn check_duplicate_label() {
    micmac()
        .args(["check", "tests/files/duplicate_label.mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error on line 3"))
        .stderr(predicate::str::contains("first defined on line 1"));
}

#[test]
fn lists_numbered() {
    micmac()
        .args(["list", "tests/files/store.mac"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "   1: ; store five at address 100\n   2: start:\n   3:     LOCO 5\n",
        ));
}

#[test]
fn lists_baudet() {
    let expected = format!(
        "; store five at address 100\n000 7005 {:<20} LOCO 5\n001 1064 {:<20} STOD 100\n002 6002 {:<20} JUMP halt\n",
        "start:", "", "halt:"
    );
    micmac()
        .args(["list", "--format", "baudet", "tests/files/store.mac"])
        .assert()
        .success()
        .stdout(predicate::str::diff(expected));
}
