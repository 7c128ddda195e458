pub mod anti_link;
pub mod cache;
pub mod commands;
pub mod community;
pub mod config;
pub mod db;
pub mod economy;
pub mod handlers;
pub mod jobs;
pub mod reply;
pub mod scheduler;
pub mod services;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub http_client: reqwest::Client,
    pub db: db::Database,
    /// Per-user cooldowns for passive message points
    pub cooldowns: cache::CooldownCache,
    /// Recent guild messages for edit and delete logs
    pub messages: cache::MessageCache,
    pub link_filter: anti_link::LinkFilter,
    pub mutes: jobs::MuteManager,
    pub tickets: jobs::TicketCloser,
}

impl Data {
    pub fn community(&self) -> &community::CommunityConfig {
        &self.config.community
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type ApplicationContext<'a> = poise::ApplicationContext<'a, Data, Error>;
