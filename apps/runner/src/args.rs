use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Helpdesk FAQ bot runner")]
pub struct RunnerArgs {
    /// NATS server to connect to.
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// Subject prefix used for chat channels on NATS.
    #[arg(long, env = "HDESK_SUBJECT_PREFIX", default_value = "hdesk")]
    pub subject_prefix: String,

    /// Use a process-local transport and play a scripted client conversation.
    #[arg(long)]
    pub in_memory: bool,

    /// Faculty whose lobby channel announces new conversations.
    #[arg(long, env = "HDESK_FACULTY")]
    pub faculty: String,

    /// Id of the bot user; its UUID is `user#<id>`.
    #[arg(long, env = "HDESK_BOT_ID", default_value = "faq-bot")]
    pub bot_id: String,

    /// Language of bot-authored texts.
    #[arg(long, env = "HDESK_LANGUAGE", default_value = "en")]
    pub language: String,

    /// FAQ catalog (YAML or JSON).
    #[arg(long, env = "HDESK_FAQ_FILE", default_value = "apps/runner/data/faq.yaml")]
    pub faq: PathBuf,

    /// Text bundle (YAML).
    #[arg(long, env = "HDESK_TEXTS_FILE", default_value = "apps/runner/data/texts.yaml")]
    pub texts: PathBuf,
}
