mod args;
mod demo;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use hdesk_bot::RoomDispatcher;
use hdesk_bus::{InMemoryHub, SharedTransport};
use hdesk_core::{ChannelName, StaticFaqCatalog, StaticTextBundle};
use hdesk_session::{BotTimings, SessionConfig, SessionDeps, store_from_env};
use tracing::info;

use crate::args::RunnerArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = RunnerArgs::parse();
    let _telemetry = hdesk_telemetry::install("hdesk-runner")?;

    let faq = StaticFaqCatalog::from_path(&args.faq)?;
    let texts = StaticTextBundle::from_path(&args.texts)?.with_fallback_language("en");
    info!(blocks = faq.len(), faq = %args.faq.display(), "faq catalog loaded");

    let bot = ChannelName::user(&args.bot_id);
    let faculty = ChannelName::faculty(&args.faculty);
    let hub = args.in_memory.then(InMemoryHub::new);
    let transport: SharedTransport = match &hub {
        Some(hub) => Arc::new(hub.transport(bot.clone()).await),
        None => connect_nats(&args, bot.clone()).await?,
    };

    let timings = BotTimings::from_env();
    let deps = SessionDeps {
        transport: Arc::clone(&transport),
        store: store_from_env().await?,
        faq: faq.shared(),
        texts: texts.shared(),
    };
    let config = SessionConfig {
        language: args.language.clone(),
        faculty: Some(faculty.clone()),
        timings,
    };

    let dispatcher = RoomDispatcher::new(deps, config);
    let events = transport.listen();
    dispatcher
        .join_lobby()
        .await
        .context("subscribe to faculty lobby")?;
    info!(%bot, lobby = %faculty, in_memory = args.in_memory, "bot ready");
    let run = Arc::clone(&dispatcher).run(events);

    match &hub {
        Some(hub) => {
            let pace = timings.opening_delay + timings.stagger * 3;
            tokio::select! {
                result = run => result?,
                result = demo::run(hub, &faculty, pace.max(Duration::from_secs(1))) => {
                    result?;
                    info!(rooms = ?dispatcher.rooms(), "demo conversation finished");
                }
            }
        }
        None => {
            tokio::select! {
                result = run => result?,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("wait for ctrl-c")?;
                    info!("shutting down");
                }
            }
        }
    }
    Ok(())
}

#[cfg(feature = "nats")]
async fn connect_nats(args: &RunnerArgs, bot: ChannelName) -> Result<SharedTransport> {
    let transport = hdesk_bus::NatsTransport::connect(&args.nats_url, bot, &args.subject_prefix)
        .await
        .with_context(|| format!("connect to NATS at {}", args.nats_url))?;
    info!(url = %args.nats_url, prefix = %args.subject_prefix, "connected to NATS");
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "nats"))]
async fn connect_nats(_args: &RunnerArgs, _bot: ChannelName) -> Result<SharedTransport> {
    anyhow::bail!("built without the `nats` feature; run with --in-memory")
}
