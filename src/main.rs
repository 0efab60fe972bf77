use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use tracing_subscriber::EnvFilter;

use arduino_serial::Connection;
use arduino_serial::port::{SerialTransport, Transport};

mod cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    match args.cmd {
        cli::Cmd::Ports => ports(),
        cli::Cmd::Run(opts) => run(opts),
    }
}

fn ports() -> Result<()> {
    for name in SerialTransport.ports().context("listing serial ports")? {
        println!("{name}");
    }
    Ok(())
}

fn run(opts: cli::RunOpts) -> Result<()> {
    let conn = Connection::with_serial(opts.to_config()?);
    for (name, initial) in &opts.commands {
        conn.register_command(name, *initial)?;
    }
    conn.register_listener(|msg: &str| println!("[rx] {msg}"));
    conn.open()
        .with_context(|| format!("opening {}", opts.ser.dev))?;

    eprintln!("type NAME=VALUE to update a command, `quit` or EOF to exit");
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") {
            break;
        }
        match cli::parse_assignment(line) {
            Ok((name, value)) => {
                if let Err(e) = conn.update_command(&name, value) {
                    eprintln!("[tx] {e}");
                }
            }
            Err(e) => eprintln!("[tx] {e}"),
        }
    }

    conn.close();
    Ok(())
}
