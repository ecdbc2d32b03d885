use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tether_core::harness::await_condition_async;
use tether_core::{
    Envelope, Exception, ExitReason, InvokeError, PoolConfig, Timeout, exit, invoke, parallel_map,
    spawn_linked,
};
use tracing_subscriber::{EnvFilter, fmt};

/// tether: run work in isolation the way the pool test harness does
#[derive(Debug, Parser)]
#[command(name = "tether", version, about)]
struct App {
    /// Verbosity level (use -v, -vv, -vvv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sleep once per element concurrently and print results in input order
    Map {
        /// Per-element delays, e.g. 30,20,10
        #[arg(long, value_delimiter = ',', default_value = "30,20,10")]
        delays_ms: Vec<u64>,
    },

    /// Run one isolated invocation and print its envelope
    Invoke {
        #[arg(long, default_value_t = 10)]
        sleep_ms: u64,

        /// No bound when omitted
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long, value_enum, default_value_t = Outcome::Return)]
        outcome: Outcome,
    },

    /// Load and validate a pool configuration file
    CheckConfig { path: PathBuf },

    /// Wait until a TCP listener accepts connections
    WaitReady {
        /// host:port
        addr: String,

        #[arg(long, default_value_t = 50)]
        poll_ms: u64,

        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
}

/// How the demo task ends.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Outcome {
    Return,
    Raise,
    Crash,
    Exit,
    /// A linked subordinate crashes while the task waits
    LinkedCrash,
}

impl App {
    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = match self.verbose {
                0 => "warn",
                1 => "tether_core=debug",
                2 => "tether_core=trace",
                _ => "trace",
            };
            EnvFilter::new(directive)
        });

        fmt()
            .without_time()
            .with_env_filter(filter)
            .with_target(self.verbose != 0)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    app.init_tracing();

    match app.command {
        Command::Map { delays_ms } => run_map(delays_ms).await,
        Command::Invoke {
            sleep_ms,
            timeout_ms,
            outcome,
        } => run_invoke(sleep_ms, timeout_ms, outcome).await,
        Command::CheckConfig { path } => {
            let config = PoolConfig::load(&path)
                .with_context(|| format!("checking {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::WaitReady {
            addr,
            poll_ms,
            timeout_ms,
        } => {
            let probe = || {
                let addr = addr.clone();
                async move { tokio::net::TcpStream::connect(addr).await.is_ok() }
            };
            await_condition_async(
                probe,
                Duration::from_millis(poll_ms),
                Duration::from_millis(timeout_ms),
            )
            .await
            .with_context(|| format!("waiting for {addr}"))?;
            println!("{addr} is ready");
            Ok(())
        }
    }
}

async fn run_map(delays_ms: Vec<u64>) -> anyhow::Result<()> {
    let results = parallel_map(
        |(index, ms): (usize, u64)| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            tracing::info!(index, ms, "element done");
            (index, ms)
        },
        delays_ms.into_iter().enumerate(),
    )
    .await?;

    for (index, ms) in results {
        println!("[{index}] slept {ms}ms");
    }
    Ok(())
}

async fn run_invoke(
    sleep_ms: u64,
    timeout_ms: Option<u64>,
    outcome: Outcome,
) -> anyhow::Result<()> {
    let timeout = Timeout::from(timeout_ms.map(Duration::from_millis));
    let result = invoke(
        move || async move {
            if let Outcome::LinkedCrash = outcome {
                spawn_linked(crash_after(sleep_ms));
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            finish(outcome, sleep_ms)
        },
        timeout,
    )
    .await;

    let report = match result {
        Ok(slept) => serde_json::to_value(Envelope::<u64, Exception>::Success(slept))?,
        Err(InvokeError::Raised(e)) => serde_json::to_value(Envelope::<u64, _>::Raised(e))?,
        Err(InvokeError::Exit(reason)) => {
            serde_json::to_value(Envelope::<u64, Exception>::Exit(reason))?
        }
        Err(InvokeError::Timeout(after)) => json!({
            "kind": "timeout",
            "after_ms": after.as_millis() as u64,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn crash_after(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    exit(ExitReason::custom("subordinate crashed"))
}

fn finish(outcome: Outcome, slept: u64) -> Result<u64, Exception> {
    match outcome {
        Outcome::Return | Outcome::LinkedCrash => Ok(slept),
        Outcome::Raise => Err(Exception::transient(json!({ "slept_ms": slept }))),
        Outcome::Crash => panic!("task crashed after {slept}ms"),
        Outcome::Exit => exit(ExitReason::custom("task exited")),
    }
}
