use clap::Parser;
use escrowd::application::engine::{EscrowEngine, OpenEscrow};
use escrowd::domain::ports::Ledger;
use escrowd::error::Result;
use escrowd::infrastructure::in_memory::{
    InMemoryDecisionStore, InMemoryEscrowStore, InMemoryLedger,
};
use escrowd::interfaces::csv::command_reader::{Command, CommandReader, CommandType};
use escrowd::interfaces::csv::report_writer::ReportWriter;
use miette::{IntoDiagnostic, Result as MietteResult};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command CSV file
    input: PathBuf,

    /// Path to persistent escrow database. If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Print remaining active escrows as JSON lines after the run.
    #[arg(long)]
    dump_escrows: bool,
}

async fn execute(engine: &EscrowEngine, ledger: &InMemoryLedger, cmd: &Command) -> Result<()> {
    match cmd.op {
        CommandType::Fund => {
            ledger.credit(cmd.account()?, cmd.amount()?).await?;
        }
        CommandType::Open => {
            engine
                .open(OpenEscrow {
                    id: cmd.escrow_id()?,
                    sender: cmd.account()?,
                    recipient: cmd.recipient()?,
                    amount_planck: cmd.amount()?,
                    required_signers: cmd.required()?,
                    signers: cmd.signer_list()?,
                    deadline_epoch: cmd.deadline()?,
                    deadline_action: cmd.action()?,
                })
                .await?;
        }
        CommandType::Decide => {
            engine
                .decide(cmd.escrow_id()?, cmd.account()?, cmd.decision_value()?)
                .await?;
        }
        CommandType::Advance => {
            let epoch = cmd.deadline()?;
            ledger.set_epoch(epoch).await;
            engine.advance_to(epoch).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> MietteResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let ledger = InMemoryLedger::new();

    #[cfg(feature = "storage-rocksdb")]
    let engine = if let Some(db_path) = &cli.db_path {
        let store = escrowd::infrastructure::rocksdb::RocksDbStore::open(db_path)
            .into_diagnostic()?;
        EscrowEngine::new(
            Box::new(store.clone()),
            Box::new(store),
            Box::new(ledger.clone()),
        )
    } else {
        EscrowEngine::new(
            Box::new(InMemoryEscrowStore::new()),
            Box::new(InMemoryDecisionStore::new()),
            Box::new(ledger.clone()),
        )
    };
    #[cfg(not(feature = "storage-rocksdb"))]
    let engine = EscrowEngine::new(
        Box::new(InMemoryEscrowStore::new()),
        Box::new(InMemoryDecisionStore::new()),
        Box::new(ledger.clone()),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for cmd_result in reader.commands() {
        match cmd_result {
            Ok(cmd) => {
                if let Err(e) = execute(&engine, &ledger, &cmd).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer
        .write_balances(ledger.balances().await)
        .into_diagnostic()?;

    if cli.dump_escrows {
        for view in engine.active_escrows().await.into_diagnostic()? {
            println!("{}", serde_json::to_string(&view).into_diagnostic()?);
        }
    }

    Ok(())
}
