//! Interactive client: parses line commands, submits them to the naming
//! server, and follows redirects to storage nodes for data transfers.

use anyhow::{Context, Result};
use clap::Parser;
use nameplane::client::{parse_command, DataSession, NamingSession, RequestOutcome};
use nameplane::logging::init_logging;
use nameplane::wire::{AckKind, ClientRequest, RequestType};
use std::io::{BufRead, Write};

#[derive(Parser, Debug)]
#[command(name = "client", about = "Interactive file-store client")]
struct Cli {
    /// Naming server client endpoint.
    #[arg(long, default_value = "127.0.0.1:8080")]
    naming: String,

    /// env_logger-style filter string; overrides RUST_LOG and defaults.
    #[arg(long)]
    log_filter: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());
    let mut session = NamingSession::connect(&cli.naming)
        .with_context(|| format!("connecting to naming server at {}", cli.naming))?;
    println!("connected to naming server at {}", cli.naming);
    println!("commands: CREATE_FILE <dir> <name>, CREATE_DIR <dir> <name>,");
    println!("          READ_FILE <path>, WRITE_FILE <path>, FILE_INFO <path>,");
    println!("          LIST_ALL <dir>, DELETE_FILE <path>, DELETE_DIR <dir>");
    println!("blank line exits.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        let request = match parse_command(&line) {
            Ok(request) => request,
            Err(err) => {
                println!("invalid request: {err}");
                continue;
            }
        };
        match session.submit(&request) {
            Ok(RequestOutcome::Done(ack)) => match ack.ack {
                AckKind::Success => println!("ok"),
                AckKind::Stop => {
                    println!("server asked to stop");
                    break;
                }
                _ => println!("request failed: {:?}", ack.error),
            },
            Ok(RequestOutcome::Redirect { host, data_port }) => {
                if let Err(err) = run_data_exchange(&host, data_port, &request, &mut lines) {
                    println!("data transfer failed: {err}");
                }
            }
            Err(err) => {
                println!("connection to naming server lost: {err}");
                break;
            }
        }
    }
    Ok(())
}

fn run_data_exchange(
    host: &str,
    data_port: u16,
    request: &ClientRequest,
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
) -> Result<()> {
    let mut data = DataSession::connect(host, data_port)
        .with_context(|| format!("connecting to storage node at {host}:{data_port}"))?;
    match request.request_type {
        RequestType::ReadFile => {
            let contents = data.read_file(request)?;
            println!("{}", String::from_utf8_lossy(&contents));
        }
        RequestType::WriteFile => {
            println!("enter content, end with a single '.' line:");
            let mut contents = String::new();
            for line in lines {
                let line = line?;
                if line == "." {
                    break;
                }
                contents.push_str(&line);
                contents.push('\n');
            }
            data.write_file(request, contents.as_bytes())?;
            println!("ok, wrote {} bytes", contents.len());
        }
        RequestType::FileInfo | RequestType::ListAll => {
            println!("{}", data.fetch_text(request)?);
        }
        // Mutations are proxied by the naming server, never redirected.
        _ => println!("unexpected redirect for {}", request.request_type.command_word()),
    }
    Ok(())
}
