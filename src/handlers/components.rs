//! Routing for persistent buttons and select menus.
//!
//! Components that belong to a running command (blackjack, reason prompts) are
//! consumed by that command's collector; everything else lands here, keyed by
//! its custom id, so panels keep working across restarts.

use crate::commands::tickets;
use crate::reply;
use crate::services::tickets::TicketTopic;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{info, warn};

const MANUAL_CLOSE_REASON: &str = "Ticket closed manually.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentRoute {
    CreateTicket,
    CloseTicket,
    FinishCancel,
    FinishCloseNow,
    /// Carries the configured role selector id, not the role id.
    ToggleRole(String),
    DmUser(u64),
    ReportAd(u64),
}

impl ComponentRoute {
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            "create_ticket" => return Some(Self::CreateTicket),
            "close_ticket" => return Some(Self::CloseTicket),
            "finish:cancel" => return Some(Self::FinishCancel),
            "finish:close_now" => return Some(Self::FinishCloseNow),
            _ => {}
        }
        if let Some(id) = custom_id.strip_prefix("dm_user_") {
            return id.parse().ok().map(Self::DmUser);
        }
        if let Some(id) = custom_id.strip_prefix("report_ad_") {
            return id.parse().ok().map(Self::ReportAd);
        }
        custom_id
            .strip_prefix("role_")
            .filter(|id| !id.is_empty())
            .map(|id| Self::ToggleRole(id.to_string()))
    }

    pub fn custom_id(&self) -> String {
        match self {
            Self::CreateTicket => "create_ticket".to_string(),
            Self::CloseTicket => "close_ticket".to_string(),
            Self::FinishCancel => "finish:cancel".to_string(),
            Self::FinishCloseNow => "finish:close_now".to_string(),
            Self::ToggleRole(id) => format!("role_{}", id),
            Self::DmUser(id) => format!("dm_user_{}", id),
            Self::ReportAd(id) => format!("report_ad_{}", id),
        }
    }
}

/// Whether the bot may hand out a role, given its own effective permissions and
/// the position of its highest role.
pub fn check_role_manageable(
    bot_permissions: serenity::Permissions,
    bot_top_position: u16,
    role_position: u16,
) -> Result<(), &'static str> {
    if !bot_permissions.manage_roles() && !bot_permissions.administrator() {
        return Err("❌ I don't have permission to manage roles! Please contact an administrator.");
    }
    if role_position >= bot_top_position {
        return Err("❌ I can't manage this role due to role hierarchy! Please contact an administrator.");
    }
    Ok(())
}

pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let Some(route) = ComponentRoute::parse(&interaction.data.custom_id) else {
        return Ok(());
    };

    match route {
        ComponentRoute::CreateTicket => {
            let value = match &interaction.data.kind {
                serenity::ComponentInteractionDataKind::StringSelect { values } => {
                    values.first().cloned().unwrap_or_default()
                }
                _ => String::new(),
            };
            tickets::open_ticket(ctx, data, interaction.clone(), &value).await
        }
        ComponentRoute::CloseTicket => close_ticket(ctx, data, interaction, None).await,
        ComponentRoute::FinishCloseNow => {
            close_ticket(ctx, data, interaction, Some(MANUAL_CLOSE_REASON)).await
        }
        ComponentRoute::FinishCancel => cancel_closure(ctx, data, interaction).await,
        ComponentRoute::ToggleRole(id) => toggle_role(ctx, data, interaction, &id).await,
        ComponentRoute::DmUser(user_id) => dm_user(ctx, interaction, user_id).await,
        ComponentRoute::ReportAd(user_id) => report_ad(ctx, data, interaction, user_id).await,
    }
}

async fn is_ticket_channel(ctx: &serenity::Context, channel_id: serenity::ChannelId) -> bool {
    match channel_id.to_channel(ctx).await {
        Ok(channel) => channel
            .guild()
            .and_then(|c| c.topic)
            .filter(|t| t.contains('|'))
            .and_then(|t| TicketTopic::parse(&t))
            .is_some(),
        Err(_) => false,
    }
}

async fn close_ticket(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
    reason: Option<&str>,
) -> Result<(), Error> {
    if !is_ticket_channel(ctx, interaction.channel_id).await {
        interaction
            .create_response(
                ctx,
                reply::ephemeral_response("❌ This button only works in ticket channels."),
            )
            .await?;
        return Ok(());
    }
    interaction
        .create_response(ctx, reply::ephemeral_response("🔒 Closing this ticket..."))
        .await?;
    data.tickets
        .close(interaction.channel_id, Some(interaction.user.id), reason)
        .await?;
    Ok(())
}

async fn cancel_closure(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let was_pending = data.tickets.cancel(interaction.channel_id.get()).await?;
    let description = if was_pending {
        format!("Ticket closure has been cancelled by {}.", interaction.user)
    } else {
        "This ticket had no pending closure.".to_string()
    };
    let embed = reply::embed(data.community().embeds.warning)
        .title("Ticket Finished")
        .description(description);
    interaction
        .create_response(
            ctx,
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(vec![]),
            ),
        )
        .await?;
    info!(
        "Closure of ticket {} cancelled by {}",
        interaction.channel_id, interaction.user.name
    );
    Ok(())
}

async fn toggle_role(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
    selector_id: &str,
) -> Result<(), Error> {
    let (Some(guild_id), Some(member)) = (interaction.guild_id, interaction.member.as_ref()) else {
        return Ok(());
    };
    let Some(selector) = data
        .community()
        .role_selectors
        .iter()
        .find(|s| s.id == selector_id)
    else {
        interaction
            .create_response(
                ctx,
                reply::ephemeral_response("❌ Role not found! Please contact an administrator."),
            )
            .await?;
        return Ok(());
    };
    let role_id = serenity::RoleId::new(selector.role_id);

    let roles = guild_id.roles(ctx).await?;
    let Some(role) = roles.get(&role_id) else {
        interaction
            .create_response(
                ctx,
                reply::ephemeral_response("❌ Role not found! Please contact an administrator."),
            )
            .await?;
        return Ok(());
    };

    let bot_id = ctx.cache.current_user().id;
    let bot = guild_id.member(ctx, bot_id).await?;
    let everyone = roles
        .get(&guild_id.everyone_role())
        .map(|r| r.permissions)
        .unwrap_or_else(serenity::Permissions::empty);
    let (bot_permissions, bot_top) = bot
        .roles
        .iter()
        .filter_map(|id| roles.get(id))
        .fold((everyone, 0u16), |(perms, top), r| {
            (perms | r.permissions, top.max(r.position))
        });
    if let Err(message) = check_role_manageable(bot_permissions, bot_top, role.position) {
        interaction
            .create_response(ctx, reply::ephemeral_response(message))
            .await?;
        return Ok(());
    }

    let had_role = member.roles.contains(&role_id);
    let content = if had_role {
        ctx.http
            .remove_member_role(guild_id, member.user.id, role_id, Some("Role selection"))
            .await?;
        format!("✅ Removed the {} role!", role.name)
    } else {
        ctx.http
            .add_member_role(guild_id, member.user.id, role_id, Some("Role selection"))
            .await?;
        format!("✅ Added the {} role!", role.name)
    };
    interaction
        .create_response(ctx, reply::ephemeral_response(content))
        .await?;
    info!(
        "{} role {} for {}",
        if had_role { "Removed" } else { "Added" },
        role.name,
        member.user.name
    );
    Ok(())
}

async fn dm_user(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    user_id: u64,
) -> Result<(), Error> {
    let content = match serenity::UserId::new(user_id).to_user(ctx).await {
        Ok(user) => format!(
            "Click their name to DM them <@{}> or add them as a friend ({})",
            user_id,
            user.tag()
        ),
        Err(e) => {
            warn!("Failed to fetch advertiser {}: {}", user_id, e);
            "❌ There was an error fetching the user information.".to_string()
        }
    };
    interaction
        .create_response(ctx, reply::ephemeral_response(content))
        .await?;
    Ok(())
}

async fn report_ad(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
    user_id: u64,
) -> Result<(), Error> {
    let modal = serenity::CreateQuickModal::new("Report Advertisement")
        .timeout(Duration::from_secs(300))
        .field(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Paragraph,
                "Reason for Report",
                "report_reason",
            )
            .placeholder("Please explain why you are reporting this advertisement")
            .required(true),
        );
    let Some(response) = interaction.quick_modal(ctx, modal).await? else {
        return Ok(());
    };
    let reason = response.inputs.first().cloned().unwrap_or_default();

    let community = data.community();
    let embed = reply::embed(community.embeds.denied)
        .title("🚨 Advertisement Reported")
        .field("Reported User", format!("<@{}>", user_id), true)
        .field("Reported By", interaction.user.to_string(), true)
        .field(
            "Reason",
            reply::truncate(&reason, crate::config::EMBED_FIELD_LIMIT),
            false,
        );
    reply::send_log(&ctx.http, community.channels.logging, embed).await;
    info!("{} reported the ad of {}", interaction.user.name, user_id);

    response
        .interaction
        .create_response(
            ctx,
            reply::ephemeral_response("✅ Report submitted successfully. Our moderators will review it."),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_routes() {
        assert_eq!(ComponentRoute::parse("create_ticket"), Some(ComponentRoute::CreateTicket));
        assert_eq!(ComponentRoute::parse("close_ticket"), Some(ComponentRoute::CloseTicket));
        assert_eq!(ComponentRoute::parse("finish:cancel"), Some(ComponentRoute::FinishCancel));
        assert_eq!(
            ComponentRoute::parse("finish:close_now"),
            Some(ComponentRoute::FinishCloseNow)
        );
    }

    #[test]
    fn test_parse_parameterized_routes() {
        assert_eq!(
            ComponentRoute::parse("dm_user_123456789"),
            Some(ComponentRoute::DmUser(123456789))
        );
        assert_eq!(
            ComponentRoute::parse("report_ad_42"),
            Some(ComponentRoute::ReportAd(42))
        );
        assert_eq!(
            ComponentRoute::parse("role_announcements"),
            Some(ComponentRoute::ToggleRole("announcements".to_string()))
        );
        assert_eq!(
            ComponentRoute::ToggleRole("changelog".to_string()).custom_id(),
            "role_changelog"
        );
    }

    #[test]
    fn test_collector_ids_are_not_routed() {
        assert_eq!(ComponentRoute::parse("bj_hit"), None);
        assert_eq!(ComponentRoute::parse("reason_select"), None);
        assert_eq!(ComponentRoute::parse("dm_user_notanumber"), None);
        assert_eq!(ComponentRoute::parse("role_"), None);
    }

    #[test]
    fn test_role_manageable() {
        let manage = serenity::Permissions::MANAGE_ROLES;
        assert!(check_role_manageable(manage, 10, 5).is_ok());
        assert!(check_role_manageable(manage, 5, 5).is_err());
        assert!(check_role_manageable(serenity::Permissions::empty(), 10, 5).is_err());
        assert!(check_role_manageable(serenity::Permissions::ADMINISTRATOR, 10, 1).is_ok());
    }
}
