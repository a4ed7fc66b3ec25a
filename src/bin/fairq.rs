//! fairq CLI — run consumer workers or enqueue demo tasks.

use clap::{Parser, Subcommand};
use fairq::config::Config;
use fairq::handler::LogHandler;
use fairq::producer::Producer;
use fairq::shutdown::{Shutdown, install_signal_handlers};
use fairq::store::RedisStore;
use fairq::worker::{Worker, WorkerConfig};
use rand::seq::SliceRandom;
use secrecy::ExposeSecret;
use tracing::{Instrument, info, info_span};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fairq", about = "Fair multi-tenant task queue on Redis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run consumer workers until signaled
    Serve {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
    /// Enqueue tasks for a range of demo clients
    Enqueue {
        /// Number of clients to enqueue for
        #[arg(long, short, default_value_t = 1000)]
        clients: u32,
        /// Number of messages to enqueue for each client
        #[arg(long, short, default_value_t = 10)]
        messages: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    match cli.command {
        Command::Serve { workers } => cmd_serve(&config, workers).await,
        Command::Enqueue { clients, messages } => cmd_enqueue(&config, clients, messages).await,
    }
}

async fn cmd_serve(config: &Config, workers: usize) -> anyhow::Result<()> {
    if workers < 1 {
        anyhow::bail!("worker count must be a positive integer");
    }

    let shutdown = Shutdown::new();
    install_signal_handlers(&shutdown)?;

    println!("Worker started.");

    // Each worker gets its own store connection; coordination happens only
    // through the store's lock and set primitives.
    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let store = RedisStore::connect(config.redis_url.expose_secret())?;
        let worker = Worker::new(
            store,
            LogHandler,
            WorkerConfig::from(config),
            shutdown.clone(),
        );
        handles.push(tokio::spawn(async move {
            worker.run().instrument(info_span!("worker", id)).await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    println!("Worker terminated gracefully.");
    Ok(())
}

async fn cmd_enqueue(config: &Config, clients: u32, messages: u32) -> anyhow::Result<()> {
    if clients < 1 {
        anyhow::bail!("client count must be a positive integer");
    }
    if messages < 1 {
        anyhow::bail!("message count must be a positive integer");
    }

    println!("Started enqueueing...");

    let store = RedisStore::connect(config.redis_url.expose_secret())?;
    let producer = Producer::new(store);

    let mut client_ids: Vec<u32> = (1..=clients).collect();
    client_ids.shuffle(&mut rand::thread_rng());

    for client_id in client_ids {
        let batch = (1..=messages).map(|m| m.to_string()).collect();
        producer.enqueue(client_id, batch).await?;
        info!(client_id, "enqueued tasks");
    }

    println!("Enqueueing finished.");
    Ok(())
}
