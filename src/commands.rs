//! Command-line subcommands.

use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderName, HeaderValue, ORIGIN};
use reqwest::Method;
use std::io::Write;
use std::sync::Arc;

use crate::cache::{CacheStore, SqliteStorage};
use crate::config::Config;
use crate::http::{Credentials, Request, RequestMode};
use crate::interceptor::Interceptor;
use crate::proxy::{OfflineFallback, OfflineProxy};
use crate::transport::HttpTransport;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Send one request through the proxy and print the response body
  Fetch(FetchArgs),
  /// Seed the offline page and precache list, then drop stale partitions
  Install,
  /// Inspect or clear cache partitions
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
  /// Absolute URL, or a path resolved against the configured origin
  pub url: String,

  /// HTTP method
  #[arg(short = 'X', long, default_value = "GET")]
  pub method: String,

  /// Extra request header, as 'Name: value' (repeatable)
  #[arg(short = 'H', long = "header")]
  pub headers: Vec<String>,

  /// Request body
  #[arg(short, long)]
  pub data: Option<String>,

  /// Treat the request as a top-level page load (same as --mode navigate)
  #[arg(long)]
  pub navigate: bool,

  /// Request mode: navigate, same-origin, no-cors or cors
  #[arg(long)]
  pub mode: Option<RequestMode>,

  /// Credentials mode: omit, same-origin or include
  #[arg(long)]
  pub credentials: Option<Credentials>,

  /// Value for the Origin header
  #[arg(long)]
  pub origin: Option<String>,

  /// Print the status line and headers before the body
  #[arg(short, long)]
  pub include: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// List partitions, or the entries of one partition
  List { partition: Option<String> },
  /// Delete one partition, or all of them
  Clear { partition: Option<String> },
}

pub async fn run(command: Command, config: &Config, store: CacheStore<SqliteStorage>) -> Result<()> {
  match command {
    Command::Fetch(args) => fetch(&args, config, store).await,
    Command::Install => install(config, store).await,
    Command::Cache(CacheCommand::List { partition }) => list(&store, partition.as_deref()).await,
    Command::Cache(CacheCommand::Clear { partition }) => clear(&store, partition.as_deref()).await,
  }
}

fn build_proxy(
  config: &Config,
  store: CacheStore<SqliteStorage>,
) -> Result<OfflineProxy<HttpTransport, SqliteStorage>> {
  let transport = HttpTransport::new(&config.transport)?;
  let offline = OfflineFallback::load(config)?;
  Ok(OfflineProxy::new(config, transport, store, offline))
}

async fn fetch(args: &FetchArgs, config: &Config, store: CacheStore<SqliteStorage>) -> Result<()> {
  let request = build_request(args, config)?;
  let proxy = Arc::new(build_proxy(config, store)?);
  let interceptor = Interceptor::spawn(Arc::clone(&proxy));

  let mut response = interceptor.fetch(request).await?;
  // Let background cache writes land before the process exits
  proxy.flush().await;

  let mut out = std::io::stdout().lock();
  if args.include {
    writeln!(
      out,
      "HTTP {} {}",
      response.status().as_u16(),
      response.status_text()
    )?;
    for (name, value) in response.headers() {
      writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
    }
    writeln!(out)?;
  }
  out.write_all(&response.read_body()?)?;
  out.flush()?;

  Ok(())
}

fn build_request(args: &FetchArgs, config: &Config) -> Result<Request> {
  let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
    .map_err(|_| eyre!("Invalid HTTP method: {}", args.method))?;
  let url = config.resolve_url(&args.url)?;

  let mut request = Request::new(method, url);
  for raw in &args.headers {
    let (name, value) = parse_header(raw)?;
    request = request.with_header(name, value);
  }
  if let Some(origin) = &args.origin {
    let value =
      HeaderValue::from_str(origin).map_err(|e| eyre!("Invalid origin '{}': {}", origin, e))?;
    request = request.with_header(ORIGIN, value).with_mode(RequestMode::Cors);
  }
  if let Some(mode) = args.mode {
    request = request.with_mode(mode);
  }
  if args.navigate {
    request = request.with_mode(RequestMode::Navigate);
  }
  if let Some(credentials) = args.credentials {
    request = request.with_credentials(credentials);
  }
  if let Some(data) = &args.data {
    request = request.with_body(data.clone());
  }

  Ok(request)
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| eyre!("Header must look like 'Name: value', got '{}'", raw))?;

  let name = HeaderName::from_bytes(name.trim().as_bytes())
    .map_err(|e| eyre!("Invalid header name in '{}': {}", raw, e))?;
  let value = HeaderValue::from_str(value.trim())
    .map_err(|e| eyre!("Invalid header value in '{}': {}", raw, e))?;

  Ok((name, value))
}

async fn install(config: &Config, store: CacheStore<SqliteStorage>) -> Result<()> {
  let precache = config
    .precache
    .iter()
    .map(|u| config.resolve_url(u))
    .collect::<Result<Vec<_>>>()?;

  let proxy = build_proxy(config, store)?;
  let report = proxy.install(&precache).await?;
  let removed = proxy.activate().await?;

  for url in &report.cached {
    println!("cached  {}", url);
  }
  for (url, reason) in &report.failed {
    println!("failed  {} ({})", url, reason);
  }
  for name in &removed {
    println!("removed partition {}", name);
  }

  Ok(())
}

async fn list(store: &CacheStore<SqliteStorage>, partition: Option<&str>) -> Result<()> {
  match partition {
    Some(name) => {
      let entries = store.open(name).entries().await?;
      if entries.is_empty() {
        println!("{} is empty", name);
      }
      for entry in entries {
        println!(
          "{}  {}  {:>8}B  {}",
          entry.response.status,
          entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
          entry.response.body.len(),
          entry.key
        );
      }
    }
    None => {
      let names = store.partitions().await?;
      if names.is_empty() {
        println!("No cache partitions");
      }
      for name in names {
        let count = store.open(&name).entries().await?.len();
        println!("{}  ({} entries)", name, count);
      }
    }
  }

  Ok(())
}

async fn clear(store: &CacheStore<SqliteStorage>, partition: Option<&str>) -> Result<()> {
  let targets = match partition {
    Some(name) => vec![name.to_string()],
    None => store.partitions().await?,
  };

  for name in targets {
    if store.delete(&name).await? {
      println!("Deleted {}", name);
    } else {
      println!("No partition named {}", name);
    }
  }

  Ok(())
}
