use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use scrub::controller::Controller;
use scrub::domain::{ScrubConfig, ScrubError};
use scrub::session::{Event, Session, Status};
use scrub::ui;

#[derive(Parser)]
#[command(version, about = "Inspect, filter, clean and chart tabular data.")]
struct Cli {
    /// CSV, parquet or arrow file to load on startup
    path: Option<String>,

    /// Log file; the terminal is owned by the UI
    #[arg(long, default_value = "scrub.log")]
    log: PathBuf,
}

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            ratatui::restore();
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing(path: &PathBuf) -> Result<(), ScrubError> {
    let log = Arc::new(File::create(path)?);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(log))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run() -> Result<(), ScrubError> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;
    info!("Starting scrub");

    let config = ScrubConfig::default();
    let mut session = Session::new(config.clone());
    if let Some(raw) = cli.path {
        let path = shellexpand::full(&raw)
            .map_err(|e| ScrubError::Source(e.to_string()))?
            .into_owned();
        session.apply(Event::LoadPath(path.into()));
    }

    let mut controller = Controller::new(&config);
    let mut terminal = ratatui::init();

    while session.status != Status::Quitting {
        let model = session.view();
        terminal.draw(|f| ui::draw(f, &model, controller.prompt()))?;

        // Handle events and map each to at most one reducer event.
        if let Some(event) = controller.handle_event()? {
            session.apply(event);
        }
    }

    Ok(())
}
