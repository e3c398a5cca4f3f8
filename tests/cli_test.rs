mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

const HEADER: &str = "op, escrow, account, recipient, amount, required, signers, deadline, action, decision";

#[test]
fn test_consensus_release_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "fund, , 10, , 1000, , , , , ").unwrap();
    writeln!(file, "open, 1, 10, 20, 100, 2, 3|4|5, 50, refund, ").unwrap();
    writeln!(file, "decide, 1, 3, , , , , , , accepted").unwrap();
    writeln!(file, "decide, 1, 4, , , , , , , accepted").unwrap();

    let mut cmd = Command::new(cargo_bin!("escrowd"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("account,balance,frozen"))
        .stdout(predicate::str::contains("10,900,false"))
        .stdout(predicate::str::contains("20,100,false"));
}

#[test]
fn test_deadline_refund_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "fund, , 10, , 1000, , , , , ").unwrap();
    writeln!(file, "open, 1, 10, 20, 100, 2, 3|4|5, 50, refund, ").unwrap();
    writeln!(file, "decide, 1, 3, , , , , , , accepted").unwrap();
    writeln!(file, "advance, , , , , , , 50, , ").unwrap();

    let mut cmd = Command::new(cargo_bin!("escrowd"));
    cmd.arg(file.path());

    // One accept out of two required: the deadline refund applies.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("10,1000,false"));
}

#[test]
fn test_split_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "fund, , 10, , 1000, , , , , ").unwrap();
    writeln!(file, "open, 1, 10, 20, 100, 3, 3|4|5, 50, split, ").unwrap();
    writeln!(file, "decide, 1, 3, , , , , , , accepted").unwrap();
    writeln!(file, "decide, 1, 4, , , , , , , rejected").unwrap();
    writeln!(file, "advance, , , , , , , 50, , ").unwrap();

    let mut cmd = Command::new(cargo_bin!("escrowd"));
    cmd.arg(file.path());

    // 100 * 1 / 2 = 50 each way.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("10,950,false"))
        .stdout(predicate::str::contains("20,50,false"));
}

#[test]
fn test_dump_escrows_projection() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "fund, , 10, , 1000, , , , , ").unwrap();
    writeln!(file, "open, 1, 10, 20, 100, 2, 3|4|5, 50, undecided, ").unwrap();
    writeln!(file, "decide, 1, 3, , , , , , , accepted").unwrap();

    let mut cmd = Command::new(cargo_bin!("escrowd"));
    cmd.arg(file.path()).arg("--dump-escrows");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"deadline_action\":\"undecided\""))
        .stdout(predicate::str::contains("\"status\":\"active\""))
        .stdout(predicate::str::contains(
            "\"decisions\":[{\"account\":3,\"decision\":\"accepted\"}]",
        ));
}

#[test]
fn test_generated_workload_conserves_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload.csv");
    common::generate_consensus_workload(&path, 200).expect("failed to generate workload");
    let total = common::workload_total(&path);

    let mut cmd = Command::new(cargo_bin!("escrowd"));
    cmd.arg(&path);

    // Every escrow reaches accepted consensus: the recipient ends up with
    // every funded planck and the sender with none.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,0,false"))
        .stdout(predicate::str::contains(format!("2,{total},false")));
}
