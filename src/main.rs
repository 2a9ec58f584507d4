//! Headless session driver.
//!
//! Connects a messaging session to a live backend and realtime feed and
//! keeps its state current until interrupted. Configuration comes from the
//! environment: `RALLYCHAT_API_URL`, `RALLYCHAT_FEED_URL`, and
//! `RALLYCHAT_USER_ID`.

use std::error::Error;

use tokio::sync::broadcast;

use rallychat::backend::HttpBackend;
use rallychat::config::{SessionConfig, EVENT_CHANNEL_CAPACITY};
use rallychat::feed::feed_listen_loop;
use rallychat::logging;
use rallychat::rlog;
use rallychat::session::{session_loop, ChatSession};

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    logging::init();

    let config = SessionConfig::from_env().ok_or(
        "set RALLYCHAT_API_URL, RALLYCHAT_FEED_URL and RALLYCHAT_USER_ID",
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (events_tx, events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(feed_listen_loop(config.feed_url.clone(), events_tx));

        let backend = HttpBackend::new(config.api_url.clone());
        let mut session = ChatSession::new(backend, &config);
        if let Err(e) = session.refresh_inbox() {
            rlog!("startup: inbox refresh failed, continuing with empty list: {e}");
        }
        rlog!(
            "session started for {} ({} conversation(s))",
            logging::user_id(&config.self_id.0),
            session.inbox().summaries().len()
        );

        session_loop(&mut session, events_rx).await;
    });

    Ok(())
}
