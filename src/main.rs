#[macro_use]
extern crate tracing;

use std::{path::PathBuf, sync::Arc};

use structopt::StructOpt;
use tokio::{runtime::Builder, signal, sync::mpsc};

use edgelight::{
    capture::{self, BackendError, CaptureManager, CaptureResult, ComputeBackend, GpuBackend, SoftwareBackend},
    models::{BackendKind, Config},
    sink::Sink,
};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    #[structopt(long)]
    dump_config: bool,
    /// Reduce frames on the CPU instead of the GPU
    #[structopt(long)]
    software: bool,
}

async fn load_config(opts: &Opts) -> color_eyre::eyre::Result<Config> {
    if let Some(config_path) = opts.config_path.as_deref() {
        return Ok(Config::load_file(config_path).await?);
    }

    match Config::default_path() {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "loading configuration");
            Ok(Config::load_file(&path).await?)
        }
        _ => Ok(Config::default()),
    }
}

async fn open_backend(kind: BackendKind) -> Result<Box<dyn ComputeBackend>, BackendError> {
    match kind {
        BackendKind::Gpu => match GpuBackend::new().await {
            Ok(backend) => Ok(Box::new(backend)),
            Err(BackendError::NoCompute) | Err(BackendError::NoAdapter(_)) => {
                warn!("no compute-capable graphics adapter, using the software backend");
                Ok(Box::new(SoftwareBackend::new()))
            }
            Err(error) => Err(error),
        },
        BackendKind::Software => Ok(Box::new(SoftwareBackend::new())),
    }
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let mut config = load_config(&opts).await?;

    if opts.software {
        config.capture.backend = BackendKind::Software;
    }

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    let mut sink = Sink::new(config.sink.clone())?;

    let source = capture::source::from_config(&config.capture.source);
    let backend = open_backend(config.capture.backend).await;

    let (manager, handle) =
        CaptureManager::initialize(config.zones.clone(), config.capture.zone_capture, source, backend);

    if !handle.is_capture_supported() {
        return Err(color_eyre::eyre::eyre!("capture is not supported on this system"));
    }

    // Results are handed to the sink task, dropped if the sink falls behind
    let (tx, mut rx) = mpsc::channel::<Arc<CaptureResult>>(1);
    handle.subscribe(move |result| {
        if tx.try_send(result.clone()).is_err() {
            trace!("sink busy, dropping result");
        }
    });

    let sink_task = tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            if let Err(error) = sink.write_result(&result).await {
                error!(error = %error, "sink error");
            }
        }
    });

    let capture_task = tokio::spawn(manager.run());

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("interrupted, stopping capture");
        }
        _ = handle.closed() => {}
    }

    handle.stop().await;
    capture_task.await?;

    // The sink stops once the manager dropped its subscriber
    drop(handle);
    sink_task.await?;

    Ok(())
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("EDGELIGHT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "edgelight=info,edgelightd=info",
            1 => "edgelight=debug,edgelightd=debug",
            _ => "edgelight=trace,edgelightd=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}
