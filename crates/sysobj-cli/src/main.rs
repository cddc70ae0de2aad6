//! sysobj command-line browser.
//!
//! Usage:
//!   sysobj show /sys/class/power_supply/BAT0
//!   sysobj ls :/sysobj
//!   sysobj crawl /sys/class --threads 4 --filter '-*/power' --limit 50
//!   sysobj watch :/sysobj/elapsed --interval 0.5 --count 10
//!
//!   # Against a captured snapshot
//!   sysobj --root /srv/snapshots/host1 crawl /sys

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use sysobj::{
    CrawlOptions, Engine, EngineConfig, FilterRule, FormatFlags, Node, PinList, crawl,
};

/// Browse /sys, /proc and sysobj's virtual objects as one typed tree.
#[derive(Parser, Debug)]
#[command(name = "sysobj", version)]
#[command(about = "Browse /sys, /proc and virtual objects as one typed tree")]
struct Args {
    /// Resolve real paths below this directory instead of /
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: <config dir>/sysobj/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show one node in full
    Show {
        path: String,
        /// Skip class formatters
        #[arg(long)]
        raw: bool,
    },

    /// List a directory's children with one-line values
    Ls {
        #[arg(default_value = ":/")]
        path: String,
        /// Filter rules (-glob, +glob, -!glob, +!glob) on child names
        #[arg(short, long = "filter", allow_hyphen_values = true)]
        filters: Vec<String>,
    },

    /// Walk the tree and print every node
    Crawl {
        /// Starting paths (default: from config)
        roots: Vec<String>,
        /// Worker threads
        #[arg(short, long)]
        threads: Option<usize>,
        /// Filter rules on full paths
        #[arg(short, long = "filter", allow_hyphen_values = true)]
        filters: Vec<String>,
        /// Stop after this many nodes
        #[arg(short, long)]
        limit: Option<u64>,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Poll nodes and show value, min and max
    Watch {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Seconds between polls
        #[arg(short, long, default_value_t = 1.0)]
        interval: f64,
        /// Stop after this many rounds
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
}

#[derive(Serialize)]
struct NodeLine<'a> {
    path: &'a str,
    canonical: &'a str,
    class: Option<&'a str>,
    exists: bool,
    dir: bool,
    value: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };
    if let Some(root) = &args.root {
        config.alt_root = Some(root.clone());
    }
    let engine = Engine::new(config).context("failed to start engine")?;

    match args.command {
        Command::Show { path, raw } => show(&engine, &path, raw),
        Command::Ls { path, filters } => ls(&engine, &path, &filters),
        Command::Crawl {
            roots,
            threads,
            filters,
            limit,
            json,
        } => run_crawl(&engine, roots, threads, &filters, limit, json),
        Command::Watch {
            paths,
            interval,
            count,
        } => watch(&engine, &paths, interval, count),
    }
}

fn show(engine: &Engine, path: &str, raw: bool) -> Result<()> {
    let mut node = engine.resolve(path, None);
    let flags = if raw { FormatFlags::RAW } else { FormatFlags::empty() };
    let value = engine.format(&mut node, flags);

    println!("path:      {}", node.path_req());
    if node.via_symlink() {
        println!("canonical: {}", node.path());
    }
    if let Some(class) = engine.class_of(&node) {
        println!("class:     {}", class.tag());
    }
    if let Some(label) = engine.label(&node) {
        println!("label:     {label}");
    }
    let perms = node.permissions();
    println!(
        "access:    root {}{} / others {}{}",
        if perms.root_can_read { "r" } else { "-" },
        if perms.root_can_write { "w" } else { "-" },
        if perms.others_can_read { "r" } else { "-" },
        if perms.others_can_write { "w" } else { "-" },
    );
    if let Some(base) = node.data().num_base() {
        println!("base:      {base}");
    }
    println!("{value}");
    Ok(())
}

fn ls(engine: &Engine, path: &str, filters: &[String]) -> Result<()> {
    let rules = sysobj::filter::parse_rules(filters)?;
    let dir = engine.resolve(path, None);
    if !dir.exists() {
        anyhow::bail!("{path}: not found");
    }
    if !dir.is_dir() {
        anyhow::bail!("{path}: not a directory");
    }
    let names = engine.children(&dir, &rules);
    let width = names.iter().map(String::len).max().unwrap_or(0);
    for name in names {
        let mut child = engine.resolve(dir.path(), Some(&name));
        let value = engine.format(&mut child, FormatFlags::LIST);
        let marker = if child.is_dir() { "/" } else { "" };
        println!("{:width$}  {value}", format!("{name}{marker}"), width = width + 1);
    }
    Ok(())
}

fn run_crawl(
    engine: &Engine,
    roots: Vec<String>,
    threads: Option<usize>,
    filters: &[String],
    limit: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut options = CrawlOptions::from_config(&engine.config().crawl);
    if !roots.is_empty() {
        options.roots = roots;
    }
    if let Some(threads) = threads {
        options.threads = Some(threads);
    }
    let mut rules: Vec<FilterRule> = engine.config().crawl.filters.clone();
    rules.extend(sysobj::filter::parse_rules(filters)?);

    let report = crawl::foreach(engine, &rules, &options, |node: &Node, stats| {
        print_node(engine, node, json);
        limit.is_none_or(|limit| stats.visited < limit)
    });

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        eprintln!(
            "{} visited, {} filtered, {} threads, {:.2}s ({})",
            report.stats.visited,
            report.stats.filtered,
            report.stats.threads,
            report.stats.elapsed.as_secs_f64(),
            report.end
        );
    }
    Ok(())
}

fn print_node(engine: &Engine, node: &Node, json: bool) {
    let mut node = node.clone();
    engine.classify(&mut node);
    let value = engine.format(&mut node, FormatFlags::LIST);
    let class = engine.class_of(&node).map(|c| c.tag());
    if json {
        let line = NodeLine {
            path: node.path_req(),
            canonical: node.path(),
            class,
            exists: node.exists(),
            dir: node.is_dir(),
            value,
        };
        match serde_json::to_string(&line) {
            Ok(s) => println!("{s}"),
            Err(err) => tracing::warn!(%err, "cannot encode node"),
        }
    } else {
        println!("{}  [{}]  {}", node.path_req(), class.unwrap_or("-"), value);
    }
}

fn watch(engine: &Engine, paths: &[String], interval: f64, count: Option<u64>) -> Result<()> {
    if !interval.is_finite() || interval < 0.0 {
        anyhow::bail!("interval must be a non-negative number of seconds");
    }
    let interval = Duration::from_secs_f64(interval);
    let mut pins = PinList::new(engine.config().pins.history_len);
    for path in paths {
        pins.add(engine, path, interval);
    }

    let mut round = 0u64;
    loop {
        pins.update_all(engine, round == 0);
        for pin in pins.iter() {
            let value = pin.value().unwrap_or("-");
            let min = pin.min().map_or("-", |s| s.value.as_str());
            let max = pin.max().map_or("-", |s| s.value.as_str());
            println!("{:>8.1}s  {}  {value}  (min {min}, max {max})", pins.elapsed().as_secs_f64(), pin.path());
        }
        round += 1;
        if count.is_some_and(|n| round >= n) || interval.is_zero() {
            return Ok(());
        }
        thread::sleep(pins.shortest_interval().unwrap_or(interval));
    }
}
