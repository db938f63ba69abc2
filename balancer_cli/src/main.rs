#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions)]
//! Binary entry point: argument parsing, logging setup, and command dispatch.

mod cli;
mod error_fmt;
mod rt;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use eyre::WrapErr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() {
    let code = match try_main() {
        Ok(()) => 0,
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            error_fmt::exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn try_main() -> eyre::Result<()> {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);
    let _ = color_eyre::install();

    let text = std::fs::read_to_string(&args.config)
        .wrap_err_with(|| format!("read config {}", args.config.display()))?;
    let cfg = balancer_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {e}", args.config.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid config {}", args.config.display()))?;

    init_tracing(args.json, &args.log_level, &cfg.logging);

    match args.cmd {
        Commands::Run {
            ticks,
            stats,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            let shutdown = make_shutdown_flag()?;
            let opts = run::RunOpts {
                ticks,
                rt,
                rt_prio,
                rt_lock,
                rt_cpu,
            };
            let result = run::run_balance(&cfg, opts, shutdown)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "complete",
                        "ticks": result.ticks,
                        "overruns": result.overruns,
                    })
                );
            } else {
                println!(
                    "run complete: {} ticks, {} overruns",
                    result.ticks, result.overruns
                );
            }
            if stats {
                let pct = if result.ticks == 0 {
                    0.0
                } else {
                    100.0 * result.overruns as f64 / result.ticks as f64
                };
                eprintln!(
                    "stats: rate={} Hz period={}us overrun_rate={pct:.2}%",
                    cfg.timing.sample_rate_hz,
                    balancer_core::util::period_us(cfg.timing.sample_rate_hz),
                );
            }
        }
        Commands::Diag { interval_ms, ticks } => {
            let shutdown = make_shutdown_flag()?;
            let result = run::run_diag(&cfg, interval_ms, ticks, shutdown)?;
            println!(
                "diag complete: {} ticks, {} overruns",
                result.ticks, result.overruns
            );
        }
        Commands::SelfCheck => {
            run::self_check(&cfg)?;
            if args.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("self-check ok");
            }
        }
    }
    Ok(())
}

fn make_shutdown_flag() -> eyre::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .wrap_err("install Ctrl-C handler")?;
    Ok(shutdown)
}

/// Console logging per CLI flags plus an optional JSON file sink from
/// `[logging]`. The non-blocking writer guard lives for the whole process.
fn init_tracing(json: bool, level: &str, logging: &balancer_config::Logging) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };
    let file_layer = logging.file.as_deref().map(|path| {
        let p = std::path::Path::new(path);
        let dir = p
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let name = p
            .file_name()
            .map_or_else(|| std::ffi::OsString::from("balancer.log"), |n| n.to_os_string());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_writer(writer).with_ansi(false).boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
}
