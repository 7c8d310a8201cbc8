//! CLI: ingest text documents into a word-count schema and read features back.
//!
//! Usage:
//!   featureflow ingest <TEXT>            (or --file <PATH>)
//!   featureflow read <ID> <FEATURE>
//!   featureflow ids
//!   featureflow events [--after <EVENT_ID>] [--follow]
//!
//! Set RUST_LOG=featureflow=trace for per-node events.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use featureflow::event_log::{Channel, EventLog, InMemoryChannel, RedisChannel};
use featureflow::nodes::{ByteStream, Tokenizer, WordCount};
use featureflow::storage::{FileSystemDatabase, UserSpecifiedIdProvider};
use featureflow::{Feature, FlowError, Inputs, Persistence, Schema, SchemaBuilder};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DATA_DIR: &str = ".featureflow";
const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Parser, Debug)]
#[command(name = "featureflow")]
#[command(
  after_help = r#"Environment variables (override the matching flags when set):
  FEATUREFLOW_DB          Data directory (default: .featureflow)
  FEATUREFLOW_CHUNK_SIZE  Ingestion chunk size in bytes (default: 4096)
  FEATUREFLOW_REDIS       Redis URL; event notifications go to the `featureflow` stream

Examples:
  featureflow ingest "humpty dumpty sat on a wall"
  featureflow read 3f2a... count"#
)]
struct Args {
  /// Data directory holding the feature store and the event log.
  #[arg(long, value_name = "DIR", default_value = DATA_DIR)]
  db: PathBuf,

  /// Bytes per chunk when streaming input.
  #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
  chunk_size: usize,

  /// Publish and follow events through this Redis server.
  #[arg(long, value_name = "URL")]
  redis: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Ingest a document and print its id.
  Ingest {
    /// Document text.
    #[arg(required_unless_present = "file")]
    text: Option<String>,

    /// Read the document from a file instead.
    #[arg(long, value_name = "PATH", conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Use this id instead of a random one.
    #[arg(long)]
    id: Option<String>,
  },
  /// Print one feature of an entity.
  Read { id: String, feature: String },
  /// List stored entity ids.
  Ids,
  /// Print event log entries.
  Events {
    /// Only entries after this event id.
    #[arg(long)]
    after: Option<String>,

    /// Keep waiting for new entries.
    #[arg(long)]
    follow: bool,
  },
}

fn channel(redis: Option<&str>) -> Result<Arc<dyn Channel>, String> {
  match redis {
    Some(url) => Ok(Arc::new(
      RedisChannel::open(url, "featureflow").map_err(|e| e.to_string())?,
    )),
    None => Ok(Arc::new(InMemoryChannel::default())),
  }
}

fn schema(
  dir: &Path,
  chunk_size: usize,
  channel: Arc<dyn Channel>,
  id: Option<&str>,
) -> Result<Schema, String> {
  let database = FileSystemDatabase::open(dir.join("store")).map_err(|e| e.to_string())?;
  let log = EventLog::open(dir.join("events"), channel).map_err(|e| e.to_string())?;
  let mut persistence = Persistence::new(database).with_event_log(Arc::new(log));
  if id.is_some() {
    persistence = persistence.with_id_provider(UserSpecifiedIdProvider::new("id"));
  }
  SchemaBuilder::new("document", persistence)
    .feature(
      "stream",
      Feature::new(move || ByteStream::new(chunk_size)).store(true),
    )
    .feature("words", Feature::new(Tokenizer::new).needs(["stream"]))
    .feature(
      "count",
      Feature::new(WordCount::aggregator)
        .needs(["words"])
        .store(true)
        .json::<BTreeMap<String, usize>>(),
    )
    .build()
    .map_err(|e| e.to_string())
}

fn render(schema: &Schema, id: &str, feature: &str) -> Result<String, FlowError> {
  let value = schema.entity(id).get_any(feature)?;
  if let Some(counts) = value.downcast_ref::<BTreeMap<String, usize>>() {
    return Ok(serde_json::to_string_pretty(counts).unwrap_or_default());
  }
  if let Some(bytes) = value.downcast_ref::<Bytes>() {
    return Ok(String::from_utf8_lossy(bytes).into_owned());
  }
  if let Some(text) = value.downcast_ref::<String>() {
    return Ok(text.clone());
  }
  Ok(format!("{value:?}"))
}

fn fail(message: impl std::fmt::Display) -> ! {
  eprintln!("Error: {message}");
  process::exit(1);
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  // Env vars override flags.
  let data_dir = env::var("FEATUREFLOW_DB")
    .ok()
    .map(PathBuf::from)
    .unwrap_or_else(|| args.db.clone());
  let chunk_size = env::var("FEATUREFLOW_CHUNK_SIZE")
    .ok()
    .and_then(|v| v.parse::<usize>().ok())
    .unwrap_or(args.chunk_size);
  let redis = env::var("FEATUREFLOW_REDIS").ok().or_else(|| args.redis.clone());
  info!(data_dir = %data_dir.display(), chunk_size, redis = ?redis, "options (env or flags)");
  let channel = channel(redis.as_deref()).unwrap_or_else(|e| fail(e));

  match args.command {
    Command::Ingest { text, file, id } => {
      let schema = schema(&data_dir, chunk_size, channel, id.as_deref()).unwrap_or_else(|e| fail(e));
      let mut inputs = match (file, text) {
        (Some(path), _) => Inputs::new().with("stream", path),
        (None, Some(text)) => Inputs::new().with("stream", text),
        (None, None) => fail("nothing to ingest"),
      };
      if let Some(id) = id {
        inputs = inputs.with("id", id);
      }
      let id = schema.process(inputs).unwrap_or_else(|e| fail(e));
      println!("{id}");
    }
    Command::Read { id, feature } => {
      let schema = schema(&data_dir, chunk_size, channel, None).unwrap_or_else(|e| fail(e));
      match render(&schema, &id, &feature) {
        Ok(text) => println!("{text}"),
        Err(e) if e.is_unavailable() => fail(format!("{feature} is not available for {id}: {e}")),
        Err(e) => fail(e),
      }
    }
    Command::Ids => {
      let schema = schema(&data_dir, chunk_size, channel, None).unwrap_or_else(|e| fail(e));
      let entities = schema.entities().unwrap_or_else(|e| fail(e));
      for entity in entities {
        println!("{}", entity.id());
      }
    }
    Command::Events { after, follow } => {
      let log = EventLog::open(data_dir.join("events"), channel).unwrap_or_else(|e| fail(e));
      if !follow {
        for event in log.since(after.as_deref()).unwrap_or_else(|e| fail(e)) {
          println!("{} {}", event.id, event.data);
        }
        return;
      }
      // Without --redis, appends from other processes are never seen here.
      let mut events = log.subscribe(after.as_deref());
      while let Some(event) = events.next().await {
        match event {
          Ok(event) => println!("{} {}", event.id, event.data),
          Err(e) => fail(e),
        }
      }
    }
  }
}
