// In-process demo: one relay, two clients, one message.
//
// Run with: cargo run -p courier-core --example relay_demo

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use courier_core::{codec, DiskSink, Envelope, RelayClient, RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let inbox = tempfile::tempdir()?;
    let config = RelayConfig {
        bind_addr: "127.0.0.1:0".parse()?,
        ..RelayConfig::default()
    };
    let server =
        RelayServer::bind_with_sink(config, Arc::new(DiskSink::new(inbox.path()))).await?;
    let addr = server.local_addr()?;
    let registry = server.registry();
    tokio::spawn(server.run());

    let mut alice = RelayClient::connect(addr).await?;
    alice.register("alice").await?;
    let mut bob = RelayClient::connect(addr).await?;
    bob.register("bob").await?;

    // Registration is asynchronous on the relay side.
    while registry.lookup("alice").is_none() || registry.lookup("bob").is_none() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    alice.send_text("bob", "hello over the relay").await?;

    if let Envelope::Text { sender, data, .. } = bob.next_envelope().await? {
        let text = String::from_utf8(codec::decode(&data)?)?;
        println!("bob received {text:?} from {sender:?}");
    }

    Ok(())
}
