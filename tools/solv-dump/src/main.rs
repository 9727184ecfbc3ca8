//! Dump the contents of a `.solv` file: header statistics, the key and
//! schema tables, and every solvable with its attributes.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use solvstore::{
    add_solv, add_solv_file, id, Dataiterator, KeyType, Pool, SEARCH_CHECKSUMS, SEARCH_FILES,
    SEARCH_SUB,
};

#[derive(Debug, Parser)]
#[command(version, about = "print a .solv repository file", long_about = None)]
struct Opt {
    /// The .solv file to dump
    file: PathBuf,

    /// Page the vertical data on demand instead of slurping it
    #[arg(long)]
    paged: bool,

    /// Only print the header counts and key/schema tables
    #[arg(short, long)]
    summary: bool,

    /// Log verbosity (-v, -vv)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    let level = match opt.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut pool = Pool::new();
    let rid = pool.add_repo(
        opt.file
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string())
            .as_str(),
    );

    let dataid = if opt.paged {
        let f = File::open(&opt.file).with_context(|| format!("open {}", opt.file.display()))?;
        add_solv_file(&mut pool, rid, f).context("parse .solv (paged)")?
    } else {
        let mut f =
            File::open(&opt.file).with_context(|| format!("open {}", opt.file.display()))?;
        add_solv(&mut pool, rid, &mut f).context("parse .solv")?
    };

    {
        let repo = pool.repo(rid);
        let data = repo.data(dataid);
        println!("# solvables: {}", repo.nsolvables);
        println!("# keys: {}", data.nkeys().saturating_sub(1));
        println!("# schemata: {}", data.nschemata().saturating_sub(1));
        if !data.userdata.is_empty() {
            println!("# userdata: {} bytes", data.userdata.len());
        }
        println!();
        for i in 1..data.nkeys() {
            let key = data.key(i);
            println!(
                "key {:3}: {} type {} size {} storage {:?}",
                i,
                pool.id2str(key.name),
                pool.id2str(key.typ.keyname()),
                key.size,
                key.storage,
            );
        }
        println!();
    }

    if opt.summary {
        return Ok(());
    }

    let mut di = Dataiterator::new(
        &pool,
        Some(rid),
        0,
        id::ID_NULL,
        None,
        SEARCH_SUB | SEARCH_FILES | SEARCH_CHECKSUMS,
    )
    .map_err(anyhow::Error::msg)?;
    let mut last_solvid = -1;
    while di.step() {
        if di.solvid() != last_solvid {
            last_solvid = di.solvid();
            let s = pool.solvable(last_solvid);
            println!(
                "solvable {} {}-{}.{}:",
                last_solvid,
                pool.id2str(s.name),
                pool.id2str(s.evr),
                pool.id2str(s.arch),
            );
        }
        let key = *di.key();
        let keyname = pool.id2str(key.name).to_string();
        match key.typ {
            KeyType::Id | KeyType::ConstantId => {
                let v = di.value_id();
                println!("  {keyname}: {}", pool.dep2str(v));
            }
            KeyType::IdArray | KeyType::RelIdArray => {
                let v = di.value_id();
                println!("  {keyname}[{}]: {}", di.value_entry(), pool.dep2str(v));
            }
            KeyType::Num | KeyType::U32 => {
                println!("  {keyname}: {}", di.value_num());
            }
            KeyType::Void => println!("  {keyname}: (void)"),
            KeyType::Constant => println!("  {keyname}: {}", key.size),
            KeyType::Str => {
                let v = di.value_str().unwrap_or_default();
                println!("  {keyname}: {v}");
            }
            KeyType::DirStrArray => {
                if let Some(v) = di.value_str() {
                    println!("  {keyname}[{}]: {v}", di.value_entry());
                }
            }
            KeyType::DirNumNumArray => {
                println!(
                    "  {keyname}[{}]: dir {} {} {}",
                    di.value_entry(),
                    di.value_id().0,
                    di.value_num(),
                    di.value_num2(),
                );
            }
            t if t.is_checksum() => {
                if let Some(v) = di.value_str() {
                    println!("  {keyname}: {v}");
                }
            }
            KeyType::FixArray | KeyType::FlexArray => {
                println!("  {keyname}: [{} elements]", di.value_num());
            }
            _ => {}
        }
    }
    Ok(())
}
