use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde_json::json;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use burrow::{
  classify, Config, ControlReply, HttpNetwork, Method, RequestDescriptor, Router, SqliteQueue,
  SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(about = "Offline-first HTTP cache router")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/burrow/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the static manifest and sweep stale generations
  Install,
  /// Sweep cache generations left over from previous versions
  Activate,
  /// Print the total size of cached response bodies
  Size,
  /// Drop every generation except the current static one
  Clear,
  /// Deliver queued sync payloads to the remote API
  Sync,
  /// Print the routing category for a request shape
  Classify {
    path: String,
    #[arg(long, default_value = "GET")]
    method: String,
    #[arg(long)]
    accept: Option<String>,
  },
  /// Route a single request through the cache router
  Fetch {
    path: String,
    #[arg(long)]
    accept: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  // Classification needs no stores or network
  if let Command::Classify {
    path,
    method,
    accept,
  } = &args.command
  {
    let mut request = RequestDescriptor::get(path);
    request.method = Method::from_str(method)?;
    if let Some(accept) = accept {
      request = request.with_accept(accept);
    }

    let category = classify(&request, &config.routes.rules);
    println!("{:?}", category);
    return Ok(());
  }

  let sync_tag = config.sync.tag.clone();
  let network = HttpNetwork::new(&config.network.base_url)?;
  let router = Router::new(
    config,
    SqliteStore::open_default()?,
    SqliteQueue::open_default()?,
    network,
  );

  match args.command {
    Command::Install => {
      router.install().await?;
      let swept = router.activate()?;
      println!("installed; swept {} stale generation(s)", swept.len());
    }
    Command::Activate => {
      let swept = router.activate()?;
      for name in &swept {
        println!("swept {}", name);
      }
      println!("{} stale generation(s) removed", swept.len());
    }
    Command::Size => {
      let reply = router
        .handle_message(&json!({"type": "get-cache-size"}))
        .await?;
      if let Some(ControlReply::CacheSize { payload }) = reply {
        println!("{} bytes", payload);
      }
    }
    Command::Clear => {
      router.handle_message(&json!({"type": "clear-cache"})).await?;
      println!("cache cleared");
    }
    Command::Sync => {
      if let Some(report) = router.handle_sync(&sync_tag).await? {
        println!(
          "delivered {}, {} still queued",
          report.delivered, report.remaining
        );
      }
    }
    Command::Fetch { path, accept } => {
      let mut request = RequestDescriptor::get(&path);
      if let Some(accept) = &accept {
        request = request.with_accept(accept);
      }

      let response = router.handle_fetch(&request).await?;
      println!("{} ({} bytes)", response.status, response.body.len());
    }
    Command::Classify { .. } => unreachable!("handled above"),
  }

  Ok(())
}
