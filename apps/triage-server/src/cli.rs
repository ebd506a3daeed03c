use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures_util::{pin_mut, StreamExt};

use triage_core::codec::{decode, decode_raw};
use triage_runtime::{tail, TailOptions, TriageRuntime};

#[derive(Debug, Parser)]
#[command(name = "triage-server", about = "Incident report triage service")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Read a result stream through a consumer group, acking what is printed
    Tail(TailArgs),
}

#[derive(Debug, Args, Clone)]
struct ServeArgs {
    #[arg(long, default_value = "configs/triage.yaml")]
    config: PathBuf,
    /// Overrides server.host/server.port
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[derive(Debug, Args, Clone)]
struct TailArgs {
    #[arg(long, default_value = "configs/triage.yaml")]
    config: PathBuf,
    #[arg(long)]
    stream: String,
    #[arg(long, default_value = "triage-tail")]
    group: String,
    #[arg(long, default_value = "tail-1")]
    consumer: String,
    #[arg(long, default_value_t = 10)]
    count: usize,
    /// Keep following the stream, waiting this long per read
    #[arg(long)]
    block_ms: Option<u64>,
    /// Take over entries pending for at least this long first
    #[arg(long)]
    reclaim_idle_ms: Option<u64>,
    /// Print every field as its stored text
    #[arg(long)]
    raw: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve(args) => crate::run_server(args.config, args.listen).await,
            Command::Tail(args) => run_tail(args).await,
        }
    }
}

async fn run_tail(args: TailArgs) -> anyhow::Result<()> {
    let runtime = TriageRuntime::from_config_path(&args.config)
        .await
        .with_context(|| format!("build runtime from '{}' failed", args.config.display()))?;
    let stream = runtime.stream();

    let mut options = TailOptions::new(args.group.clone(), args.consumer.clone());
    options.count = args.count;
    options.block = args.block_ms.map(Duration::from_millis);
    options.reclaim_idle = args.reclaim_idle_ms.map(Duration::from_millis);

    let records = tail(stream.clone(), args.stream.clone(), options);
    pin_mut!(records);
    while let Some(record) = records.next().await {
        let record = record.context("stream read failed")?;
        let fields = if args.raw {
            decode_raw(&record.fields)
        } else {
            decode(&record.fields)
        };
        println!("{} {}", record.id, serde_json::Value::Object(fields));
        stream
            .ack(&args.stream, &args.group, record.id)
            .await
            .context("ack failed")?;
    }
    Ok(())
}
