use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;

use streamcap::commands::Cli;
use streamcap::commands::Commands;
use streamcap::handlers;
use streamcap::telemetry::init_tracing;
use streamcap_core::RecordError;
use streamcap_ipc::StoreError;

fn main() {
    if let Err(e) = run() {
        if let Some(record_error) = e.downcast_ref::<RecordError>() {
            eprintln!("Error: {record_error}");
            std::process::exit(exit_code_for_record_error(record_error));
        } else if let Some(store_error) = e.downcast_ref::<StoreError>() {
            eprintln!("Error: {store_error}");
            std::process::exit(74); // EX_IOERR
        } else {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn exit_code_for_record_error(error: &RecordError) -> i32 {
    match error {
        RecordError::UnsupportedFormat(_) => 64, // EX_USAGE
        RecordError::NotLive => 69,              // EX_UNAVAILABLE
        RecordError::Resolve(_) => 75,           // EX_TEMPFAIL
        RecordError::Spawn { .. }
        | RecordError::AbnormalExit { .. }
        | RecordError::PostProcess(_)
        | RecordError::Io(_) => 74, // EX_IOERR
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _telemetry = init_tracing("info");

    match cli.command {
        Commands::Record { capture } => handlers::handle_record(capture),
        Commands::Monitor { interval, capture } => handlers::handle_monitor(interval, capture),
        Commands::List { prune, json } => handlers::handle_list(prune, json),
        Commands::Stop { id, url, all } => handlers::handle_stop(id, url, all),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "streamcap", &mut std::io::stdout());
            Ok(())
        }
    }
}
