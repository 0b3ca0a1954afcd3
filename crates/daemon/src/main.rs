use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use daemon::config::Config;
use daemon::ingest::{FeedReader, FeedWorker};
use daemon::injector::InjectorServer;
use daemon::lifecycle::LifecycleTask;
use daemon::persistence::{FileSnapshotStore, SnapshotStore};
use daemon::query::QueryServer;
use daemon::supervisor;
use daemon::Context;

/// RDT InfoPlus DVS daemon.
#[derive(Debug, Parser)]
#[command(name = "dvs-daemon", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Restore the station index from the snapshot directory at startup.
    #[arg(long)]
    load_stations: bool,

    /// Restore the train index from the snapshot directory at startup.
    #[arg(long)]
    load_trains: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(why) => {
            log::error!("cannot load {}: {}", cli.config.display(), why);
            process::exit(1);
        }
    };

    let ctx = Context::new(&config);
    let snapshots = config
        .persistence
        .as_ref()
        .map(|persistence| FileSnapshotStore::new(persistence.directory.clone()));

    restore(&ctx, snapshots.as_ref(), cli.load_stations, cli.load_trains).await;

    let shutdown = CancellationToken::new();

    // the serving sockets bind before the feed starts; a bad binding is a
    // configuration error and therefore fatal
    let query =
        match QueryServer::bind(&config.bindings.client_server, ctx.clone(), shutdown.clone())
            .await
        {
            Ok(server) => server,
            Err(why) => {
                log::error!(
                    "cannot bind client server {}: {}",
                    config.bindings.client_server,
                    why
                );
                process::exit(1);
            }
        };
    let injector = match InjectorServer::bind(
        &config.bindings.injector_server,
        ctx.clone(),
        shutdown.clone(),
    )
    .await
    {
        Ok(server) => server,
        Err(why) => {
            log::error!(
                "cannot bind injector server {}: {}",
                config.bindings.injector_server,
                why
            );
            process::exit(1);
        }
    };

    let (queue_tx, queue_rx) = tokio::sync::mpsc::unbounded_channel();
    let tasks = vec![
        supervisor::spawn(
            LifecycleTask::new(ctx.clone(), &config, shutdown.clone()),
            shutdown.clone(),
        ),
        supervisor::spawn(
            FeedReader::new(&config, queue_tx, shutdown.clone()),
            shutdown.clone(),
        ),
        supervisor::spawn(
            FeedWorker::new(queue_rx, ctx.clone(), shutdown.clone()),
            shutdown.clone(),
        ),
        supervisor::spawn(query, shutdown.clone()),
        supervisor::spawn(injector, shutdown.clone()),
    ];

    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("termination signal received, shutting down"),
        Err(why) => log::error!("cannot wait for termination signal: {}", why),
    }
    shutdown.cancel();

    // no task may hold up shutdown longer than one lifecycle tick
    let drain = futures::future::join_all(tasks);
    if tokio::time::timeout(Duration::from_secs(60), drain).await.is_err() {
        log::warn!("tasks did not stop in time, abandoning them");
    }

    if let Some(adapter) = snapshots {
        let by_station = ctx.store.dump_by_station().await;
        let by_train = ctx.store.dump_by_train().await;
        match adapter.save(&by_station, &by_train) {
            Ok(()) => log::info!("store snapshots saved"),
            Err(why) => log::error!("cannot save store snapshots: {}", why),
        }
    }
}

/// Restore indices from the snapshot directory when asked to. A failed
/// restore is logged and skipped; the daemon starts empty instead.
async fn restore(
    ctx: &Context,
    snapshots: Option<&FileSnapshotStore>,
    load_stations: bool,
    load_trains: bool,
) {
    if !load_stations && !load_trains {
        return;
    }
    let Some(adapter) = snapshots else {
        log::error!("snapshot restore requested but no persistence directory configured");
        return;
    };

    if load_stations {
        match adapter.load_station_index() {
            Ok(index) => {
                log::info!("restored {} station buckets", index.len());
                ctx.store.restore_station_index(index).await;
            }
            Err(why) => log::error!("cannot restore station index: {}", why),
        }
    }
    if load_trains {
        match adapter.load_train_index() {
            Ok(index) => {
                log::info!("restored {} train buckets", index.len());
                ctx.store.restore_train_index(index).await;
            }
            Err(why) => log::error!("cannot restore train index: {}", why),
        }
    }
}
