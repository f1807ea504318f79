//! dix-client binary: distributed index CLI
//!
//! Run with:
//! ```bash
//! cargo run -p dix-client -- --config client.json put '<1:1>' 6b6579=76616c
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dix_client::{DixClient, DixIndex, DixRequest, ReqState};
use dix_core::{ClientConfig, HashFunction, Imask, IndexId, LayoutDescriptor, Record, TargetRouter};

#[derive(Parser, Debug)]
#[command(name = "dix-client")]
#[command(about = "Operate on distributed indices")]
struct Args {
    /// Client configuration (JSON)
    #[arg(long, default_value = "./dix/client.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the layout meta-indices
    MetaCreate,
    /// Check that the meta-indices exist
    MetaCheck,
    /// Delete the meta-indices
    MetaDestroy,
    /// Create an index with an explicit layout
    Create {
        index: IndexId,
        #[arg(long)]
        pool_version: u64,
        #[arg(long, default_value = "fnv1")]
        hash: HashFunction,
    },
    /// Delete an index
    Delete { index: IndexId },
    /// Insert records given as hex `key=value` pairs
    Put {
        index: IndexId,
        records: Vec<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Fetch values of hex keys
    Get { index: IndexId, keys: Vec<String> },
    /// Scan records from a hex start key
    Next {
        index: IndexId,
        start: String,
        #[arg(long, default_value = "10")]
        count: u32,
    },
    /// Remove hex keys
    Del { index: IndexId, keys: Vec<String> },
    /// List indices recorded in the layout meta-index
    List {
        #[arg(long, default_value = "0:0")]
        start: IndexId,
        #[arg(long, default_value = "100")]
        count: u32,
    },
    /// Print the redundancy group of a hex key
    Locate {
        key: String,
        #[arg(long)]
        pool_version: u64,
        #[arg(long, default_value = "fnv1")]
        hash: HashFunction,
        /// Print the group as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dix_client=info".parse()?))
        .init();

    let args = Args::parse();
    let config = ClientConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let client = DixClient::builder().config(&config).build()?;

    match args.command {
        Command::MetaCreate => {
            client.meta_create().await?;
            println!("[OK] meta-indices created");
        }
        Command::MetaCheck => {
            let exists = client.meta_check().await?;
            println!("meta-indices {}", if exists { "present" } else { "missing" });
        }
        Command::MetaDestroy => {
            client.meta_destroy().await?;
            println!("[OK] meta-indices deleted");
        }
        Command::Create {
            index,
            pool_version,
            hash,
        } => {
            let descr = LayoutDescriptor::new(pool_version, hash, Imask::empty());
            let mut req = client.request();
            req.create(vec![DixIndex::new(index).with_descriptor(descr)])?;
            settle(&mut req).await?;
            println!("[OK] created {}", index);
        }
        Command::Delete { index } => {
            let mut req = client.request();
            req.delete(vec![DixIndex::new(index)])?;
            settle(&mut req).await?;
            println!("[OK] deleted {}", index);
        }
        Command::Put {
            index,
            records,
            overwrite,
        } => {
            let records = records
                .iter()
                .map(|r| parse_record(r))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let mut req = client.request();
            req.put(&DixIndex::new(index), records, overwrite)?;
            report_items(&mut req).await?;
        }
        Command::Get { index, keys } => {
            let keys = parse_keys(&keys)?;
            let mut req = client.request();
            req.get(&DixIndex::new(index), keys.clone())?;
            if req.wait().await == ReqState::Failed {
                req.generic_result()?;
            }
            for (key, value) in keys.iter().zip(req.take_get_replies()?) {
                match value {
                    Ok(v) => println!("{} = {}", hex::encode(key), hex::encode(v)),
                    Err(e) => println!("{}: {}", hex::encode(key), e),
                }
            }
        }
        Command::Next { index, start, count } => {
            let start = hex::decode(&start).context("start key")?;
            let mut req = client.request();
            req.next(&DixIndex::new(index), vec![start], vec![count])?;
            if req.wait().await == ReqState::Failed {
                req.generic_result()?;
            }
            for window in req.take_next_replies()? {
                let window = window?;
                for record in &window.records {
                    println!("{} = {}", hex::encode(&record.key), hex::encode(&record.val));
                }
                if let Some(terminal) = &window.terminal {
                    println!("({} records, then {})", window.records.len(), terminal);
                }
            }
        }
        Command::Del { index, keys } => {
            let mut req = client.request();
            req.del(&DixIndex::new(index), parse_keys(&keys)?)?;
            report_items(&mut req).await?;
        }
        Command::List { start, count } => {
            for id in client.index_list(start, count).await? {
                println!("{}", id);
            }
        }
        Command::Locate {
            key,
            pool_version,
            hash,
            json,
        } => {
            let key = hex::decode(&key).context("key")?;
            let descr = LayoutDescriptor::new(pool_version, hash, Imask::empty());
            let router = TargetRouter::new(client.pools());
            let group = router.route(&descr, &key)?;
            if json {
                println!("{}", serde_json::to_string_pretty(group.targets())?);
                return Ok(());
            }
            for target in group.targets() {
                println!(
                    "unit {:>3}  device {:>3}  {:<6}  {}  ({})",
                    target.unit, target.device, target.kind, target.service, target.state
                );
            }
        }
    }

    Ok(())
}

async fn settle(req: &mut DixRequest) -> anyhow::Result<()> {
    req.wait().await;
    req.generic_result()?;
    Ok(())
}

async fn report_items(req: &mut DixRequest) -> anyhow::Result<()> {
    if req.wait().await == ReqState::Failed {
        req.generic_result()?;
    }
    let mut failed = 0;
    for i in 0..req.item_count() {
        if let Err(e) = req.item_result(i) {
            println!("item {}: {}", i, e);
            failed += 1;
        }
    }
    println!("[OK] {} of {} items done", req.item_count() - failed, req.item_count());
    Ok(())
}

fn parse_record(s: &str) -> anyhow::Result<Record> {
    let (key, val) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got {}", s))?;
    Ok(Record::new(hex::decode(key)?, hex::decode(val)?))
}

fn parse_keys(keys: &[String]) -> anyhow::Result<Vec<Vec<u8>>> {
    keys.iter()
        .map(|k| hex::decode(k).with_context(|| format!("key {}", k)))
        .collect()
}
