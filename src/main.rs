use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use log::{info, warn};
use psiwatch::config::Config;
use psiwatch::util::human::fmt_record;
use psiwatch::{Notification, PressureMonitor, ProcPressure, PsiFs, Resource, Scope, Trigger};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "psiwatch", about = "Linux pressure stall monitor", version = "0.1")]
struct Cli {
    /// Resource to watch: cpu, io, memory
    #[arg(short, long)]
    resource: Option<Resource>,

    /// Print one snapshot and exit
    #[arg(long)]
    once: bool,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,

    /// Trigger scope: some, full
    #[arg(short, long)]
    scope: Option<Scope>,

    /// Stall time that fires the trigger, in milliseconds
    #[arg(long)]
    threshold_ms: Option<u64>,

    /// Window the threshold is measured over, in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Read <DIR>/<resource>.pressure from a cgroup v2 directory
    #[arg(long, value_name = "DIR")]
    cgroup: Option<PathBuf>,

    /// Print config file path and current values, then exit
    #[arg(long)]
    config: bool,

    /// Print shell completions and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "psiwatch", &mut io::stdout());
        return Ok(());
    }

    let cfg = Config::load();
    if cli.config {
        return run_print_config(&cfg);
    }

    let resource = cli.resource.unwrap_or(cfg.general.resource);
    let fs: Arc<dyn PsiFs> = match &cli.cgroup {
        Some(dir) => Arc::new(ProcPressure::cgroup(dir)),
        None      => Arc::new(ProcPressure::new(&cfg.general.pressure_root)),
    };
    let mut monitor = PressureMonitor::with_fs(fs, resource)
        .with_context(|| format!("cannot watch {} pressure", resource))?
        .with_options(cfg.notifier.options());

    let out = Output { json: cli.json || cfg.general.json, lenient: cfg.general.lenient };

    if cli.once {
        return out.snapshot(&mut monitor, None);
    }

    run_watch(monitor, triggers(&cli, &cfg), out)
}

/// Command-line trigger flags replace the configured list; missing flags
/// fall back to the first configured trigger.
fn triggers(cli: &Cli, cfg: &Config) -> Vec<Trigger> {
    if cli.scope.is_none() && cli.threshold_ms.is_none() && cli.window_ms.is_none() {
        return cfg.triggers.iter().map(|t| t.to_trigger()).collect();
    }
    let base = cfg.triggers.first().map(|t| t.to_trigger()).unwrap_or(Trigger::new(
        Scope::Some,
        Duration::from_millis(100),
        Duration::from_secs(2),
    ));
    vec![Trigger {
        scope:     cli.scope.unwrap_or(base.scope),
        threshold: cli.threshold_ms.map(Duration::from_millis).unwrap_or(base.threshold),
        window:    cli.window_ms.map(Duration::from_millis).unwrap_or(base.window),
    }]
}

fn run_watch(mut monitor: PressureMonitor, triggers: Vec<Trigger>, out: Output) -> Result<()> {
    if triggers.is_empty() {
        anyhow::bail!("no triggers configured");
    }

    // One forwarding thread per notifier merges all streams into one channel.
    let (tx, rx) = mpsc::channel();
    for trigger in &triggers {
        let notifier = monitor
            .register_trigger(*trigger)
            .with_context(|| format!("cannot arm trigger '{}' on {}", trigger, monitor.path().display()))?;
        let tx = tx.clone();
        let trigger = *trigger;
        std::thread::spawn(move || {
            for n in notifier.iter() {
                if tx.send((trigger, n)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    info!(
        "watching {} pressure at {} ({} trigger(s))",
        monitor.resource(), monitor.path().display(), triggers.len()
    );

    for (trigger, n) in rx {
        match n {
            Notification::Crossed => {
                if let Err(e) = out.snapshot(&mut monitor, Some(&trigger)) {
                    warn!("snapshot after crossing failed: {:#}", e);
                }
            }
            Notification::Failed(e) => {
                return Err(e).with_context(|| format!("trigger '{}' stopped", trigger));
            }
        }
    }
    Ok(())
}

struct Output {
    json:    bool,
    lenient: bool,
}

impl Output {
    fn snapshot(&self, monitor: &mut PressureMonitor, trigger: Option<&Trigger>) -> Result<()> {
        let records = if self.lenient { monitor.snapshot_lenient()? } else { monitor.snapshot()? };
        let now = chrono::Local::now();

        if self.json {
            let line = serde_json::json!({
                "timestamp": now.to_rfc3339(),
                "resource":  monitor.resource(),
                "trigger":   trigger.map(|t| t.to_string()),
                "records":   records,
            });
            println!("{}", serde_json::to_string(&line)?);
            return Ok(());
        }

        match trigger {
            Some(t) => println!("{} {} pressure crossed {}", now.format("%H:%M:%S"), monitor.resource(), t),
            None    => println!("{} {} pressure", now.format("%H:%M:%S"), monitor.resource()),
        }
        for rec in &records {
            println!("  {}", fmt_record(rec));
        }
        Ok(())
    }
}

fn run_print_config(cfg: &Config) -> Result<()> {
    let path = Config::config_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("Config: {}", path);
    println!();
    println!("[general]");
    println!("  resource      = {}", cfg.general.resource);
    println!("  pressure_root = {}", cfg.general.pressure_root.display());
    println!("  json          = {}", cfg.general.json);
    println!("  lenient       = {}", cfg.general.lenient);
    println!();
    println!("[notifier]");
    println!("  max_consecutive_failures = {}", cfg.notifier.max_consecutive_failures);
    println!("  retry_delay_ms           = {}ms", cfg.notifier.retry_delay_ms);
    println!();
    if cfg.triggers.is_empty() {
        println!("[[triggers]] (none)");
    }
    for t in &cfg.triggers {
        println!("[[triggers]]");
        println!("  scope = {}  threshold = {}ms  window = {}ms", t.scope, t.threshold_ms, t.window_ms);
    }
    Ok(())
}
