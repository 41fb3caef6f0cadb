use anyhow::Context;
use hems::client::{
    Fanout, LogSink, SerialSessionFactory, Supervisor, SupervisorSettings, WattGauge,
};
use hems::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("invalid configuration")?;
    log::info!(
        "starting on {} at {} baud",
        config.serial_device,
        config.baud_rate
    );

    let factory = SerialSessionFactory::new(config.session_builder())?;
    let gauge = Arc::new(WattGauge::new());
    let sink = Fanout::new().with(Arc::new(LogSink)).with(gauge.clone());

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown_signal(), cancel.clone()));

    let mut supervisor = Supervisor::new(SupervisorSettings::default());
    match supervisor.run(&factory, &sink, &cancel).await {
        Ok(()) => {
            log::info!(
                "stopped after {} readings, last {} W",
                gauge.samples(),
                gauge.watts()
            );
            Ok(())
        }
        Err(e) => {
            log::error!("unrecoverable failure, exiting: {}", e);
            std::process::exit(1);
        }
    }
}

/// Cancel `cancel` once `signal` reports a shutdown signal
///
/// If the handlers cannot be installed the process keeps running without
/// them; it can still be stopped by the default signal disposition.
async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = std::io::Result<&'static str>>,
{
    match signal.await {
        Ok(name) => {
            log::info!("received {}, shutting down", name);
            cancel.cancel();
        }
        Err(e) => log::error!("cannot listen for shutdown signals, running without them: {}", e),
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
