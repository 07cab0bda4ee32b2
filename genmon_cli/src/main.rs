mod cli;
mod client;
mod config;
mod error_fmt;
mod logging;
mod notify;
mod run;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use genmon_config::load_alarm_catalog;
use std::process::ExitCode;

fn main() -> ExitCode {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    match real_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&e));
            } else {
                eprintln!("{}", error_fmt::humanize(&e));
            }
            tracing::debug!(error = ?e, "exiting with error");
            let code = error_fmt::exit_code_for_error(&e);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = config::load(&cli.config)?;
    logging::init(cli.json, cli.log_level.as_deref(), &cfg.logging)?;

    match cli.cmd {
        Commands::Run => run::run_daemon(cfg, &cli.config),
        Commands::Query { item, wait_secs } => {
            let out = run::run_query(cfg, &cli.config, &item, wait_secs, cli.json)?;
            println!("{out}");
            Ok(())
        }
        Commands::Check => check(&cfg, cli.json),
        Commands::Client {
            host,
            port,
            commands,
        } => {
            let host = host.unwrap_or_else(|| match cfg.server.bind.as_str() {
                "0.0.0.0" | "::" => "127.0.0.1".to_string(),
                bind => bind.to_string(),
            });
            client::run_client(&host, port.unwrap_or(cfg.server.port), &commands)
        }
    }
}

fn check(cfg: &genmon_config::Config, json: bool) -> eyre::Result<()> {
    let alarms = match &cfg.paths.alarm_file {
        Some(path) => Some(load_alarm_catalog(path)?.len()),
        None => None,
    };
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "site": cfg.site.name,
                "transport": format!("{:?}", cfg.transport.kind).to_lowercase(),
                "server_port": cfg.server.port,
                "alarm_entries": alarms,
            })
        );
    } else {
        println!("Config OK");
        println!("  site: {}", cfg.site.name);
        println!("  transport: {:?}", cfg.transport.kind);
        println!("  command socket: {}:{}", cfg.server.bind, cfg.server.port);
        if let Some(n) = alarms {
            println!("  alarm entries: {n}");
        }
    }
    Ok(())
}
