use rand::Rng;
use std::fs::File;
use std::io::Error;
use std::path::Path;

/// Writes a command CSV that funds a sender, opens `escrows` escrows, and
/// drives each to accepted consensus. Escrow `i` uses sender `1`, recipient
/// `2`, and signers `10` and `11`.
pub fn generate_consensus_workload(path: &Path, escrows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record([
        "op", "escrow", "account", "recipient", "amount", "required", "signers", "deadline",
        "action", "decision",
    ])?;

    let mut rng = rand::thread_rng();
    for i in 1..=escrows {
        let amount: u64 = rng.gen_range(1..=1_000);
        wtr.write_record([
            "fund",
            "",
            "1",
            "",
            &amount.to_string(),
            "",
            "",
            "",
            "",
            "",
        ])?;
        wtr.write_record([
            "open",
            &i.to_string(),
            "1",
            "2",
            &amount.to_string(),
            "2",
            "10|11",
            "1000",
            "refund",
            "",
        ])?;
    }
    for i in 1..=escrows {
        for signer in ["10", "11"] {
            wtr.write_record([
                "decide",
                &i.to_string(),
                signer,
                "",
                "",
                "",
                "",
                "",
                "",
                "accepted",
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Total planck the workload above deposits into escrow; recomputed by
/// re-reading the generated file so tests don't depend on generator RNG.
pub fn workload_total(path: &Path) -> u64 {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .expect("failed to open generated CSV");
    let mut total = 0;
    for record in reader.records() {
        let record = record.expect("failed to read record");
        if &record[0] == "open" {
            total += record[4].parse::<u64>().expect("bad amount");
        }
    }
    total
}
