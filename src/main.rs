use log::{error, info};
use novespace_stream::configuration::config::ReceiverArgs;
use novespace_stream::controller::controller_handler::{shutdown_signal, Controller};
use novespace_stream::session_management::session::StopOutcome;
use tokio::io::BufReader;

#[tokio::main]
async fn main() {
    let args = ReceiverArgs::from_args();

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    let level = match config.log_filter() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG still wins over the configured level
    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .parse_default_env()
        .init();

    println!(
        "
==============================================================================
        novespace-stream {} : parabolic flight data unit recorder
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    info!("Configuration imported successfully");

    let controller = Controller::new(&config);

    if args.interactive {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = controller.run_console(stdin, tokio::io::stdout()).await {
            error!("Control console failed: {}", e);
            controller.shutdown().await;
            std::process::exit(1);
        }
        return;
    }

    println!("to stop recording use: CTRL+C or send a TERM signal");

    match controller.record_until(shutdown_signal()).await {
        Ok(StopOutcome::Stopped(report)) => info!(
            "{} record(s) written to {}",
            report.records_written,
            report.output_path.display()
        ),
        Ok(StopOutcome::NothingToStop) => info!("The stream had already ended"),
        Err(e) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
    }
}
