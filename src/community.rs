//! Community settings: channel/role ids, thresholds and message templates.
//!
//! Loaded from a TOML file. Every section has defaults so a partial file (or no
//! file at all) still yields a usable, if inert, configuration: unset channel and
//! role ids simply disable the features that need them.

use serde::Deserialize;

/// An embed color written as `#RRGGBB` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color(pub u32);

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return Err(format!("invalid color '{value}', expected #RRGGBB"));
        }
        u32::from_str_radix(hex, 16)
            .map(Color)
            .map_err(|_| format!("invalid color '{value}', expected #RRGGBB"))
    }
}

impl From<Color> for poise::serenity_prelude::Colour {
    fn from(color: Color) -> Self {
        poise::serenity_prelude::Colour::new(color.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub embeds: EmbedColors,
    pub channels: Channels,
    pub roles: Roles,
    pub points: PointsSettings,
    pub leaderboard: LeaderboardSettings,
    pub ads: AdSettings,
    pub suggestions: SuggestionSettings,
    pub moderation: ModerationSettings,
    pub anti_link: AntiLinkSettings,
    pub tickets: TicketSettings,
    pub role_selectors: Vec<RoleSelector>,
    pub reaction_roles: ReactionRoleSettings,
    pub memes: MemeSettings,
}

impl CommunityConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbedColors {
    pub main: Color,
    pub accepted: Color,
    pub denied: Color,
    pub warning: Color,
}

impl Default for EmbedColors {
    fn default() -> Self {
        Self {
            main: Color(0x5865F2),
            accepted: Color(0x57F287),
            denied: Color(0xED4245),
            warning: Color(0xFFA500),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Channels {
    pub logging: Option<u64>,
    pub daily: Option<u64>,
    pub transcripts: Option<u64>,
    pub warnings_log: Option<u64>,
    pub mute_log: Option<u64>,
    pub ban_log: Option<u64>,
    pub anti_link_log: Option<u64>,
    /// Edited and deleted messages
    pub message_log: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Roles {
    pub staff: Option<u64>,
    pub mute: Option<u64>,
    pub support: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointsSettings {
    pub daily_amount: i64,
    pub streak_bonus_min: i64,
    pub streak_bonus_max: i64,
    pub booster_bonus_min: i64,
    pub booster_bonus_max: i64,
    pub message_cooldown_secs: u64,
    pub message_chance: f64,
    pub roll_win_chance: f64,
}

impl Default for PointsSettings {
    fn default() -> Self {
        Self {
            daily_amount: 10,
            streak_bonus_min: 1,
            streak_bonus_max: 5,
            booster_bonus_min: 5,
            booster_bonus_max: 10,
            message_cooldown_secs: 60,
            message_chance: 0.3,
            roll_win_chance: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardSettings {
    pub display_limit: usize,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self { display_limit: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdSettings {
    pub cost: i64,
    pub global_cooldown_secs: i64,
    pub max_length: u16,
    pub channels: Vec<u64>,
    pub rules: String,
}

impl Default for AdSettings {
    fn default() -> Self {
        Self {
            cost: 50,
            global_cooldown_secs: 3600,
            max_length: 1000,
            channels: Vec::new(),
            rules: "No IPs, Discord invites or NSFW content.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuggestionSettings {
    pub channel: Option<u64>,
    pub ping_role: Option<u64>,
    pub upvote_emoji: String,
    pub downvote_emoji: String,
    pub accepted_tag: Option<u64>,
    pub denied_tag: Option<u64>,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            channel: None,
            ping_role: None,
            upvote_emoji: "👍".to_string(),
            downvote_emoji: "👎".to_string(),
            accepted_tag: None,
            denied_tag: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reason {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub emoji: Option<String>,
}

impl Reason {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            emoji: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub max_warnings: usize,
    pub warning_expiration_days: i64,
    pub auto_mute_duration_hours: i64,
    pub default_mute_hours: i64,
    pub warning_reasons: Vec<Reason>,
    pub mute_reasons: Vec<Reason>,
    pub ban_reasons: Vec<Reason>,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            max_warnings: 3,
            warning_expiration_days: 30,
            auto_mute_duration_hours: 24,
            default_mute_hours: 1,
            warning_reasons: vec![
                Reason::new("Spam", "Repeated or flooding messages"),
                Reason::new("Disrespect", "Harassing or insulting members"),
                Reason::new("Advertising", "Unsolicited promotion"),
            ],
            mute_reasons: vec![
                Reason::new("Spam", "Repeated or flooding messages"),
                Reason::new("Disrespect", "Harassing or insulting members"),
                Reason::new(OTHER_REASON, "Specify a custom reason"),
            ],
            ban_reasons: vec![
                Reason::new("Raiding", "Coordinated disruption"),
                Reason::new("Scamming", "Attempting to defraud members"),
            ],
        }
    }
}

/// Reason title that prompts for a free-form reason instead.
pub const OTHER_REASON: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkAction {
    Delete,
    Warn,
    Mute,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AntiLinkSettings {
    pub enabled: bool,
    pub blocked_domains: Vec<String>,
    pub exempt_roles: Vec<u64>,
    pub exempt_channels: Vec<u64>,
    pub action: LinkAction,
}

impl Default for AntiLinkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            blocked_domains: Vec::new(),
            exempt_roles: Vec::new(),
            exempt_channels: Vec::new(),
            action: LinkAction::Delete,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketQuestion {
    pub label: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub paragraph: bool,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketCategory {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    /// Channel name template; `<username>` is replaced by the opener's name.
    pub channel_name: String,
    #[serde(default)]
    pub ping_role: Option<u64>,
    #[serde(default)]
    pub questions: Vec<TicketQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TicketMessages {
    pub ticket_created: String,
    pub ticket_closing: String,
    pub ticket_closed: String,
    pub limit_reached: String,
    pub invalid_category: String,
    pub no_permission: String,
    pub user_added: String,
    pub user_removed: String,
    pub creator_left: String,
    pub inactivity_alert: String,
    pub inactivity_dm: String,
}

impl Default for TicketMessages {
    fn default() -> Self {
        Self {
            ticket_created: "Your ticket has been created!".to_string(),
            ticket_closing: "This ticket will be closed in a few seconds.".to_string(),
            ticket_closed: "Your ticket has been closed.".to_string(),
            limit_reached: "You have reached the maximum number of open tickets. Please close one before opening another.".to_string(),
            invalid_category: "That ticket category does not exist.".to_string(),
            no_permission: "You do not have permission to do that.".to_string(),
            user_added: "{user} has been added to the ticket.".to_string(),
            user_removed: "{user} has been removed from the ticket.".to_string(),
            creator_left: "{user} has left the server. This ticket can be closed.".to_string(),
            inactivity_alert: "{user} If this ticket has no activity by {time}, it will be automatically closed. If you're finished with this ticket, click the close button below.".to_string(),
            inactivity_dm: "Your ticket {ticket} may be resolved or has shown inactivity. If no response is received by {time}, the ticket will be automatically closed.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TicketSettings {
    pub category: Option<u64>,
    pub max_tickets_per_user: usize,
    pub close_delay_secs: u64,
    pub finish_close_hours: i64,
    /// How long `/alert` waits for activity before closing the ticket.
    pub inactivity_timeout_minutes: i64,
    pub panel_title: String,
    pub panel_description: String,
    pub categories: Vec<TicketCategory>,
    pub messages: TicketMessages,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            category: None,
            max_tickets_per_user: 1,
            close_delay_secs: 5,
            finish_close_hours: 24,
            inactivity_timeout_minutes: 24 * 60,
            panel_title: "Support Tickets".to_string(),
            panel_description: "Select a category below to open a ticket.".to_string(),
            categories: Vec::new(),
            messages: TicketMessages::default(),
        }
    }
}

impl TicketSettings {
    pub fn find_category(&self, value: &str) -> Option<&TicketCategory> {
        self.categories.iter().find(|c| c.value == value)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleSelector {
    pub id: String,
    pub label: String,
    pub role_id: u64,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionRole {
    pub emoji: String,
    pub role_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReactionRoleSettings {
    pub embed_title: String,
    pub message_ids: Vec<u64>,
    pub roles: Vec<ReactionRole>,
}

impl Default for ReactionRoleSettings {
    fn default() -> Self {
        Self {
            embed_title: "Reaction Roles".to_string(),
            message_ids: Vec::new(),
            roles: Vec::new(),
        }
    }
}

impl ReactionRoleSettings {
    pub fn role_for_emoji(&self, emoji: &str) -> Option<u64> {
        self.roles
            .iter()
            .find(|r| r.emoji == emoji)
            .map(|r| r.role_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemeSettings {
    pub channel: Option<u64>,
    pub subreddit: String,
    pub fallback_subreddit: String,
}

impl Default for MemeSettings {
    fn default() -> Self {
        Self {
            channel: None,
            subreddit: "MinecraftMemes".to_string(),
            fallback_subreddit: "minecraft".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = CommunityConfig::from_toml("").unwrap();
        assert_eq!(config.points.daily_amount, 10);
        assert_eq!(config.moderation.max_warnings, 3);
        assert_eq!(config.tickets.finish_close_hours, 24);
        assert_eq!(config.tickets.inactivity_timeout_minutes, 1440);
        assert!(config.channels.message_log.is_none());
        assert_eq!(config.anti_link.action, LinkAction::Delete);
        assert!(!config.anti_link.enabled);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let toml = r##"
            [embeds]
            main = "#123456"

            [points]
            daily_amount = 25

            [anti_link]
            enabled = true
            blocked_domains = ["discord.gg"]
            action = "warn"

            [[tickets.categories]]
            value = "support"
            label = "Support"
            channel_name = "support-<username>"

            [[tickets.categories.questions]]
            label = "What do you need?"
            paragraph = true
        "##;
        let config = CommunityConfig::from_toml(toml).unwrap();
        assert_eq!(config.embeds.main, Color(0x123456));
        assert_eq!(config.embeds.denied, Color(0xED4245));
        assert_eq!(config.points.daily_amount, 25);
        assert_eq!(config.points.message_cooldown_secs, 60);
        assert_eq!(config.anti_link.action, LinkAction::Warn);

        let category = config.tickets.find_category("support").unwrap();
        assert_eq!(category.questions.len(), 1);
        assert!(category.questions[0].required);
        assert!(config.tickets.find_category("billing").is_none());
    }

    #[test]
    fn test_invalid_color_is_rejected() {
        let toml = "[embeds]\nmain = \"#12345G\"\n";
        assert!(CommunityConfig::from_toml(toml).is_err());
        assert!(Color::try_from("#fff".to_string()).is_err());
        assert_eq!(Color::try_from("ffffff".to_string()), Ok(Color(0xFFFFFF)));
    }

    #[test]
    fn test_reaction_role_lookup() {
        let toml = r#"
            [reaction_roles]
            message_ids = [1, 2]
            roles = [{ emoji = "🎮", role_id = 10 }, { emoji = "📢", role_id = 20 }]
        "#;
        let config = CommunityConfig::from_toml(toml).unwrap();
        assert_eq!(config.reaction_roles.role_for_emoji("📢"), Some(20));
        assert_eq!(config.reaction_roles.role_for_emoji("❓"), None);
        assert_eq!(config.reaction_roles.embed_title, "Reaction Roles");
    }
}
