// courier — relay server and client front end

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_core::{codec, DiskSink, Envelope, RelayClient, RelayConfig, RelayServer, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Named-client TCP message relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Address to listen on
        #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
        bind: SocketAddr,
        /// Directory for received files (defaults to the desktop)
        #[arg(long)]
        inbox: Option<PathBuf>,
    },
    /// Register a name and print every message the relay delivers
    Listen {
        /// Relay address, e.g. 127.0.0.1:12345
        server: String,
        /// Display name to register
        name: String,
    },
    /// Send one text message (fire-and-forget; offline receivers miss it)
    Send {
        /// Relay address, e.g. 127.0.0.1:12345
        server: String,
        /// Display name to send as
        name: String,
        /// Registered name of the receiver
        receiver: String,
        /// Message text
        message: String,
    },
    /// Send a file to be stored on the relay host
    SendFile {
        /// Relay address, e.g. 127.0.0.1:12345
        server: String,
        /// Display name to send as
        name: String,
        /// Registered name of the receiver
        receiver: String,
        /// Path of the file to send
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { bind, inbox } => cmd_serve(bind, inbox).await,
        Commands::Listen { server, name } => cmd_listen(&server, &name).await,
        Commands::Send {
            server,
            name,
            receiver,
            message,
        } => cmd_send(&server, &name, &receiver, &message).await,
        Commands::SendFile {
            server,
            name,
            receiver,
            path,
        } => cmd_send_file(&server, &name, &receiver, &path).await,
    }
}

async fn cmd_serve(bind: SocketAddr, inbox: Option<PathBuf>) -> Result<()> {
    let sink = match inbox {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create inbox directory {}", dir.display()))?;
            DiskSink::new(dir)
        }
        None => DiskSink::desktop(),
    };
    info!("storing received files in {}", sink.dir().display());

    let config = RelayConfig {
        bind_addr: bind,
        ..RelayConfig::default()
    };
    let server = RelayServer::bind_with_sink(config, Arc::new(sink))
        .await
        .with_context(|| format!("cannot bind relay on {bind}"))?;

    server.run().await;
    Ok(())
}

async fn cmd_listen(server: &str, name: &str) -> Result<()> {
    let mut client = connect_as(server, name).await?;
    println!("Registered as {name:?}; waiting for messages (Ctrl-C to quit)");

    loop {
        let envelope = client
            .next_envelope()
            .await
            .context("connection to relay lost")?;
        match envelope {
            Envelope::Text { sender, data, .. } => match codec::decode(&data) {
                Ok(bytes) => println!("[{sender}] {}", String::from_utf8_lossy(&bytes)),
                Err(e) => println!("[{sender}] <payload not decodable: {e}>"),
            },
            other => println!("<ignoring {} envelope>", other.kind()),
        }
    }
}

async fn cmd_send(server: &str, name: &str, receiver: &str, message: &str) -> Result<()> {
    let mut client = connect_as(server, name).await?;
    client
        .send_text(receiver, message)
        .await
        .context("sending text failed")?;
    println!("Handed to the relay for {receiver:?}");
    Ok(())
}

async fn cmd_send_file(server: &str, name: &str, receiver: &str, path: &Path) -> Result<()> {
    let mut client = connect_as(server, name).await?;
    client
        .send_file(receiver, path)
        .await
        .with_context(|| format!("sending {} failed", path.display()))?;
    println!("Handed {} to the relay for {receiver:?}", path.display());
    Ok(())
}

async fn connect_as(server: &str, name: &str) -> Result<RelayClient> {
    let mut client = RelayClient::connect(server)
        .await
        .with_context(|| format!("cannot connect to relay at {server}"))?;
    client
        .register(name)
        .await
        .context("registering name failed")?;
    Ok(client)
}
