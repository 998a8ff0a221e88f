//! Binary to connect to the Kite ticker WebSocket, subscribe to NIFTY 50
//! (256265) and INFY (408065), and print live data for inspection.
//!
//! # Usage
//!
//! ```sh
//! export KITE_USER_ID="your-user-id"
//! export KITE_ENCTOKEN="your-enctoken"
//! cargo run --bin ticker_check --features cli
//! ```

use std::env;

use kiteticker_rs::{Mode, Ticker};

#[tokio::main]
async fn main() -> kiteticker_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let user_id = env::var("KITE_USER_ID").expect("set KITE_USER_ID env var before running");
    let enctoken = env::var("KITE_ENCTOKEN").expect("set KITE_ENCTOKEN env var before running");

    let mut ticker = Ticker::new(user_id, enctoken);
    let handle = ticker.handle();

    ticker.on_connect(move || {
        println!("Connected — subscribing to NIFTY 50 (LTP) and INFY (Full)…");
        if let Err(e) = handle.subscribe(&[256265, 408065]) {
            eprintln!("subscribe failed: {e}");
        }
        if let Err(e) = handle.set_mode(Mode::Ltp, &[256265]) {
            eprintln!("set_mode failed: {e}");
        }
        if let Err(e) = handle.set_mode(Mode::Full, &[408065]) {
            eprintln!("set_mode failed: {e}");
        }
    });
    ticker.on_tick(|tick| match serde_json::to_string_pretty(&tick) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("tick serialization failed: {e}"),
    });
    ticker.on_order_update(|order| {
        println!("Order update: {} → {}", order.order_id, order.status);
    });
    ticker.on_close(|code, reason| println!("Closed: code={code} reason={reason}"));
    ticker.on_error(|err| eprintln!("Error: {err}"));
    ticker.on_reconnect(|attempt, delay| {
        println!("Reconnect attempt {attempt} in {:.2}s", delay.as_secs_f64());
    });
    ticker.on_no_reconnect(|attempt| {
        println!("Giving up after {attempt} reconnect attempts");
    });

    println!("Serving — press Ctrl-C to stop.");
    println!("(Note: data only arrives during market hours 9:15–15:30 IST)\n");

    let result = ticker
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nCtrl-C received — shutting down…");
        })
        .await;

    println!("Done.");
    result
}
