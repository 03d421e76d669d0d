//! TCP frontend. Each connection sends `'\0'`-terminated SQL statements and
//! receives pipe-delimited rows, a status line, and a `'\0'` terminator per
//! statement. Statements from different connections run concurrently; one
//! connection runs one statement at a time.

use anyhow::Result;
use clap::Parser;
use common::Config;
use database::{Database, ExecutionResult};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "paxdb-server", about = "Columnar teaching database server")]
struct Args {
    /// Directory for table data, the catalog, the log, and spilled text.
    #[arg(long, default_value = "./db_data")]
    data_dir: PathBuf,

    /// TCP listen address.
    #[arg(long, default_value = "127.0.0.1:6789")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::builder()
        .data_dir(args.data_dir)
        .listen_addr(args.listen.clone())
        .build();
    let database = Database::open(config)?;

    let listener = TcpListener::bind(&args.listen).await?;
    info!(addr = %args.listen, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "connected");
        let database = database.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, database).await {
                warn!(%peer, error = %err, "connection closed with error");
            }
            info!(%peer, "disconnected");
        });
    }
}

async fn serve_connection(mut stream: TcpStream, database: Database) -> Result<()> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut read_buf = [0u8; 4096];

    loop {
        let statement = loop {
            match protocol::take_statement(&mut buffer) {
                Ok(Some(statement)) => break Some(statement),
                Ok(None) => {}
                Err(err) => {
                    let reply = format!("{}\0", protocol::failure_line(&err));
                    stream.write_all(reply.as_bytes()).await?;
                    return Ok(());
                }
            }
            let n = stream.read(&mut read_buf).await?;
            if n == 0 {
                break None;
            }
            buffer.extend_from_slice(&read_buf[..n]);
        };
        let statement = match statement {
            Some(statement) => statement,
            None => return Ok(()),
        };
        if statement.trim().is_empty() {
            stream
                .write_all(format!("{}\0", protocol::success_line()).as_bytes())
                .await?;
            continue;
        }

        let database = database.clone();
        let sql = statement.clone();
        let result = tokio::task::spawn_blocking(move || database.execute_sql(&sql)).await;

        let reply = match result {
            Ok(Ok(result)) => render_result(result),
            Ok(Err(err)) => protocol::failure_line(&err),
            Err(join_err) => {
                error!(error = %join_err, "statement task failed");
                protocol::failure_line(&common::DbError::Internal(
                    "statement execution aborted".into(),
                ))
            }
        };
        stream.write_all(reply.as_bytes()).await?;
        stream.write_all(&[protocol::MESSAGE_DELIMITER]).await?;
    }
}

fn render_result(result: ExecutionResult) -> String {
    match result {
        ExecutionResult::Rows { schema, chunks } => {
            let mut out = protocol::format_header(&schema);
            out.push('\n');
            for chunk in &chunks {
                out.push_str(&protocol::format_chunk(chunk));
            }
            out
        }
        ExecutionResult::State(state) if state.is_empty() => {
            protocol::success_line().to_string()
        }
        ExecutionResult::State(state) => {
            let mut out = state;
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out
        }
    }
}
