//! Wallet-side CLI demo: joins a dApp's handshake via a `wc:` pairing URI,
//! approves the session and auto-responds to every inbound call request.
//!
//! This client is for demonstration purposes only; a complete wallet would
//! also let a human operator review each call before responding, and would
//! persist the session across restarts rather than relying solely on the
//! in-memory store.

use {
    anyhow::Result,
    bridge_connector::{
        client::{EVENT_CONNECT, EVENT_DISCONNECT, EVENT_SESSION_REQUEST},
        dispatcher::CALL_REQUEST,
        rpc::PeerMeta,
        Client, ClientOptions,
    },
    clap::Parser,
    std::sync::Arc,
    tokio::sync::mpsc,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// `wc:` pairing URI printed by the dApp.
    pairing_uri: String,

    /// Chain id to approve the session with.
    #[arg(short, long, default_value_t = 1)]
    chain_id: i64,

    /// Account to approve the session with.
    #[arg(short, long, default_value = "0xBA5BA3955463ADcc7aa3E33bbdfb8A68e0933dD8")]
    account: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let wallet = Client::new(ClientOptions {
        uri: Some(args.pairing_uri),
        client_meta: PeerMeta {
            name: "bridge_connector example wallet".to_owned(),
            description: String::new(),
            url: "https://example.com".to_owned(),
            icons: vec![],
        },
        ..Default::default()
    })
    .await?;

    // Register every listener before triggering anything that could emit,
    // since `approve_session` emits `EVENT_CONNECT` synchronously.
    let (session_request_tx, mut session_request_rx) = mpsc::unbounded_channel();
    wallet.on(
        EVENT_SESSION_REQUEST,
        Arc::new(move |event| {
            let _ = session_request_tx.send(event);
        }),
    );
    wallet.on(
        EVENT_CONNECT,
        Arc::new(|event| println!("connect event: {event}")),
    );
    wallet.on(
        EVENT_DISCONNECT,
        Arc::new(|_| {
            println!("session terminated by peer");
            std::process::exit(0);
        }),
    );

    let responder = wallet.clone();
    wallet.on(
        CALL_REQUEST,
        Arc::new(move |event| {
            let id = event["id"].as_u64().expect("call carries an id");
            println!("call request: {event}");
            if let Err(e) = responder.respond_call(id, serde_json::json!("0xdeadbeef")) {
                println!("failed to respond to call: {e}");
            }
        }),
    );

    let proposal = session_request_rx.recv().await.expect("dapp proposes a session");
    println!("session request from: {proposal}");

    wallet
        .approve_session(args.chain_id, vec![args.account])
        .await?;
    println!("session approved, connected to dapp");

    // Keep the process alive to keep handling call requests until the dApp
    // kills the session.
    std::future::pending::<()>().await;
    Ok(())
}
