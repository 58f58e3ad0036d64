use log::{error, info};
use novespace_stream::configuration::config::EmulatorArgs;
use novespace_stream::controller::controller_handler::shutdown_signal;
use novespace_stream::emulator::replayer::{ReplayOutcome, Replayer};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args = EmulatorArgs::from_args();

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

    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .parse_default_env()
        .init();

    let replayer = Replayer::new(&config.emulator);

    println!("stream source: {}", replayer.source());
    println!("to stop streaming use: CTRL+C or send a TERM signal");

    let (interrupt, interrupted) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = interrupt.send(true);
    });

    match replayer.run(interrupted).await {
        Ok(ReplayOutcome::Completed { sent }) => info!("Replay complete, {} row(s) sent", sent),
        Ok(ReplayOutcome::Interrupted { sent }) => info!("Replay interrupted, {} row(s) sent", sent),
        Err(e) => {
            error!("Replay failed: {}", e);
            std::process::exit(1);
        }
    }
}
