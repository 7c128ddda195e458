use crate::commands::Answer;
use crate::config::{EMBED_FIELD_LIMIT, EMBED_TITLE_LIMIT};
use crate::db::TicketAlertRecord;
use crate::handlers::components::ComponentRoute;
use crate::reply;
use crate::services::tickets::{self, TicketTopic};
use crate::{Context, Data, Error};
use chrono::{Duration, Utc};
use poise::serenity_prelude as serenity;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

const MODAL_TIMEOUT: StdDuration = StdDuration::from_secs(600);
const MODAL_TITLE_LIMIT: usize = 45;
const MAX_QUESTIONS: usize = 5;

pub fn close_button() -> serenity::CreateActionRow {
    serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new(
        ComponentRoute::CloseTicket.custom_id(),
    )
    .label("Close Ticket")
    .style(serenity::ButtonStyle::Danger)])
}

fn ticket_permissions() -> serenity::Permissions {
    serenity::Permissions::VIEW_CHANNEL
        | serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::ATTACH_FILES
        | serenity::Permissions::EMBED_LINKS
}

/// Returns the ticket metadata if the command runs inside a ticket channel,
/// telling the user otherwise.
async fn require_ticket(ctx: Context<'_>) -> Result<Option<TicketTopic>, Error> {
    let topic = ctx
        .guild_channel()
        .await
        .and_then(|c| c.topic)
        .filter(|t| t.contains('|'))
        .and_then(|t| TicketTopic::parse(&t));
    if topic.is_none() {
        reply::ephemeral(ctx, "❌ This command can only be used in ticket channels.").await?;
    }
    Ok(topic)
}

/// Display the ticket panel
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn panel(ctx: Context<'_>) -> Result<(), Error> {
    let community = ctx.data().community();
    let settings = &community.tickets;
    if settings.categories.is_empty() {
        reply::ephemeral(ctx, "❌ No ticket categories are configured.").await?;
        return Ok(());
    }

    let options = settings
        .categories
        .iter()
        .take(25)
        .map(|category| {
            let mut option =
                serenity::CreateSelectMenuOption::new(&category.label, &category.value);
            if let Some(description) = &category.description {
                option = option.description(reply::truncate(description, 100));
            }
            if let Some(emoji) = category
                .emoji
                .as_deref()
                .and_then(|e| serenity::ReactionType::try_from(e).ok())
            {
                option = option.emoji(emoji);
            }
            option
        })
        .collect();
    let menu = serenity::CreateSelectMenu::new(
        ComponentRoute::CreateTicket.custom_id(),
        serenity::CreateSelectMenuKind::String { options },
    )
    .placeholder("Select a ticket category");

    let embed = reply::embed(community.embeds.main)
        .title(&settings.panel_title)
        .description(&settings.panel_description);
    ctx.channel_id()
        .send_message(
            ctx.serenity_context(),
            serenity::CreateMessage::new()
                .embed(embed)
                .components(vec![serenity::CreateActionRow::SelectMenu(menu)]),
        )
        .await?;

    reply::ephemeral(ctx, "✅ Panel sent successfully.").await
}

/// Close the current ticket
#[poise::command(slash_command, guild_only)]
pub async fn close(ctx: Context<'_>) -> Result<(), Error> {
    if require_ticket(ctx).await?.is_none() {
        return Ok(());
    }
    reply::ephemeral(ctx, "🔒 Closing this ticket...").await?;
    ctx.data()
        .tickets
        .close(ctx.channel_id(), Some(ctx.author().id), None)
        .await?;
    Ok(())
}

/// Mark the ticket as finished and close it automatically later
#[poise::command(slash_command, guild_only)]
pub async fn finish(ctx: Context<'_>) -> Result<(), Error> {
    if require_ticket(ctx).await?.is_none() {
        return Ok(());
    }
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let community = ctx.data().community();
    let close_at = Utc::now() + Duration::hours(community.tickets.finish_close_hours);

    ctx.data()
        .tickets
        .schedule(ctx.channel_id().get(), guild_id.get(), close_at)
        .await?;

    let embed = reply::embed(community.embeds.accepted)
        .title("Ticket Finished")
        .description(format!(
            "This ticket has been marked as finished by {}. It will be automatically closed {}.",
            ctx.author(),
            reply::relative_time(close_at)
        ))
        .footer(serenity::CreateEmbedFooter::new(
            "You can use the buttons below to close it now or cancel the closure.",
        ));
    let buttons = serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(ComponentRoute::FinishCancel.custom_id())
            .label("Cancel Closure")
            .style(serenity::ButtonStyle::Secondary),
        serenity::CreateButton::new(ComponentRoute::FinishCloseNow.custom_id())
            .label("Close Now")
            .style(serenity::ButtonStyle::Danger),
    ]);
    ctx.send(
        poise::CreateReply::default()
            .embed(embed)
            .components(vec![buttons]),
    )
    .await?;
    Ok(())
}

/// Set an inactivity alert for the ticket
#[poise::command(slash_command, guild_only)]
pub async fn alert(ctx: Context<'_>) -> Result<(), Error> {
    let Some(topic) = require_ticket(ctx).await? else {
        return Ok(());
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let community = ctx.data().community();
    let settings = &community.tickets;
    let close_at = Utc::now()
        + Duration::minutes(settings.inactivity_timeout_minutes.clamp(1, 60 * 24 * 365));

    let creator = serenity::UserId::new(topic.creator_id);
    let mention = format!("<@{}>", creator);
    let ticket = ctx
        .guild_channel()
        .await
        .map(|c| format!("#{}", c.name))
        .unwrap_or_else(|| format!("<#{}>", ctx.channel_id()));

    let dm = reply::embed(community.embeds.main)
        .title("Ticket Alert")
        .description(tickets::fill_alert(&settings.messages.inactivity_dm, &mention, &ticket, close_at));
    reply::dm_best_effort(&ctx.serenity_context().http, creator, dm).await;

    let embed = reply::embed(community.embeds.main)
        .title("Inactivity Alert")
        .description(tickets::fill_alert(&settings.messages.inactivity_alert, &mention, &ticket, close_at));
    let handle = ctx
        .send(
            poise::CreateReply::default()
                .content(mention)
                .embed(embed)
                .components(vec![close_button()]),
        )
        .await?;
    let message = handle.message().await?;

    ctx.data()
        .tickets
        .raise_alert(TicketAlertRecord {
            channel_id: ctx.channel_id().get(),
            guild_id: guild_id.get(),
            alert_message_id: message.id.get(),
            requested_by: ctx.author().id.get(),
            close_at,
        })
        .await?;
    Ok(())
}

/// Claim a ticket to show you're handling it
#[poise::command(slash_command, guild_only)]
pub async fn claim(ctx: Context<'_>) -> Result<(), Error> {
    let community = ctx.data().community();
    let is_support = match (community.roles.support, ctx.author_member().await) {
        (Some(role), Some(member)) => member.roles.contains(&serenity::RoleId::new(role)),
        _ => false,
    };
    if !is_support {
        reply::ephemeral(ctx, &community.tickets.messages.no_permission).await?;
        return Ok(());
    }
    if require_ticket(ctx).await?.is_none() {
        return Ok(());
    }

    let topic = ctx
        .guild_channel()
        .await
        .and_then(|c| c.topic)
        .unwrap_or_default();
    ctx.channel_id()
        .edit(
            ctx.serenity_context(),
            serenity::EditChannel::new().topic(tickets::claimed_topic(&topic, &ctx.author().name)),
        )
        .await?;

    let embed = reply::embed(community.embeds.main)
        .description(format!("Ticket claimed by {}", ctx.author()));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Add a user to the ticket
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "The user to add to the ticket"] user: serenity::User,
) -> Result<(), Error> {
    if require_ticket(ctx).await?.is_none() {
        return Ok(());
    }
    ctx.channel_id()
        .create_permission(
            ctx.serenity_context(),
            serenity::PermissionOverwrite {
                allow: serenity::Permissions::VIEW_CHANNEL
                    | serenity::Permissions::SEND_MESSAGES
                    | serenity::Permissions::READ_MESSAGE_HISTORY,
                deny: serenity::Permissions::empty(),
                kind: serenity::PermissionOverwriteType::Member(user.id),
            },
        )
        .await?;

    let community = ctx.data().community();
    let embed = reply::embed(community.embeds.main).description(tickets::fill_user(
        &community.tickets.messages.user_added,
        &user.to_string(),
    ));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Remove a user from the ticket
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "The user to remove from the ticket"] user: serenity::User,
) -> Result<(), Error> {
    if require_ticket(ctx).await?.is_none() {
        return Ok(());
    }
    ctx.channel_id()
        .delete_permission(
            ctx.serenity_context(),
            serenity::PermissionOverwriteType::Member(user.id),
        )
        .await?;

    let community = ctx.data().community();
    let embed = reply::embed(community.embeds.main).description(tickets::fill_user(
        &community.tickets.messages.user_removed,
        &user.to_string(),
    ));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Opens a ticket for the category picked on the panel.
pub async fn open_ticket(
    ctx: &serenity::Context,
    data: &Data,
    interaction: serenity::ComponentInteraction,
    category_value: &str,
) -> Result<(), Error> {
    let settings = &data.community().tickets;
    let guild_id = interaction.guild_id.ok_or("Must be run in a guild")?;
    let user = interaction.user.clone();

    let Some(category) = settings.find_category(category_value) else {
        interaction
            .create_response(
                ctx,
                reply::ephemeral_response(&settings.messages.invalid_category),
            )
            .await?;
        return Ok(());
    };
    let Some(parent) = settings.category.map(serenity::ChannelId::new) else {
        interaction
            .create_response(
                ctx,
                reply::ephemeral_response("❌ Tickets are not set up on this server."),
            )
            .await?;
        return Ok(());
    };

    let channels = guild_id.channels(ctx).await?;
    let open = tickets::count_open_tickets(
        channels
            .values()
            .filter(|c| c.parent_id == Some(parent) && c.kind == serenity::ChannelType::Text)
            .filter_map(|c| c.topic.as_deref()),
        user.id.get(),
    );
    if open >= settings.max_tickets_per_user {
        interaction
            .create_response(
                ctx,
                reply::ephemeral_response(&settings.messages.limit_reached),
            )
            .await?;
        return Ok(());
    }

    let (answers, answer) = if category.questions.is_empty() {
        (Vec::new(), Answer::Select(interaction))
    } else {
        let title = reply::truncate(&format!("{} Ticket", category.label), MODAL_TITLE_LIMIT);
        let mut modal = serenity::CreateQuickModal::new(title).timeout(MODAL_TIMEOUT);
        for (i, question) in category.questions.iter().take(MAX_QUESTIONS).enumerate() {
            let style = if question.paragraph {
                serenity::InputTextStyle::Paragraph
            } else {
                serenity::InputTextStyle::Short
            };
            let mut input =
                serenity::CreateInputText::new(style, &question.label, format!("question_{}", i))
                    .required(question.required);
            if let Some(placeholder) = &question.placeholder {
                input = input.placeholder(placeholder);
            }
            modal = modal.field(input);
        }
        let Some(response) = interaction.quick_modal(ctx, modal).await? else {
            return Ok(());
        };
        (response.inputs, Answer::Modal(response.interaction))
    };
    answer.defer_ephemeral(ctx).await?;

    let staff_role = category.ping_role.or(data.community().roles.support);
    let mut overwrites = vec![
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::empty(),
            deny: serenity::Permissions::VIEW_CHANNEL,
            kind: serenity::PermissionOverwriteType::Role(guild_id.everyone_role()),
        },
        serenity::PermissionOverwrite {
            allow: ticket_permissions(),
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(user.id),
        },
    ];
    if let Some(role) = staff_role {
        overwrites.push(serenity::PermissionOverwrite {
            allow: ticket_permissions(),
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Role(serenity::RoleId::new(role)),
        });
    }

    let name = tickets::channel_name(&category.channel_name, &user.name);
    let topic = TicketTopic::new(user.id.get(), Utc::now()).render();
    let channel = guild_id
        .create_channel(
            ctx,
            serenity::CreateChannel::new(name)
                .kind(serenity::ChannelType::Text)
                .category(parent)
                .topic(topic)
                .permissions(overwrites),
        )
        .await?;

    let mut embed = reply::embed(data.community().embeds.main)
        .title(reply::truncate(&format!("{} Ticket", category.label), EMBED_TITLE_LIMIT))
        .description(format!("Ticket opened by {}", user));
    for (question, value) in category.questions.iter().zip(answers.iter()) {
        let value = if value.trim().is_empty() {
            "No answer provided".to_string()
        } else {
            reply::truncate(value, EMBED_FIELD_LIMIT)
        };
        embed = embed.field(reply::truncate(&question.label, EMBED_TITLE_LIMIT), value, false);
    }

    let content = match staff_role {
        Some(role) => format!("<@&{}> | {}", role, user),
        None => user.to_string(),
    };
    if let Err(e) = channel
        .id
        .send_message(
            ctx,
            serenity::CreateMessage::new()
                .content(content)
                .embed(embed)
                .components(vec![close_button()]),
        )
        .await
    {
        warn!("Failed to post ticket details in {}: {}", channel.id, e);
    }

    info!("{} opened {} ticket {}", user.name, category.value, channel.id);
    answer
        .finish(
            ctx,
            format!("{} <#{}>", settings.messages.ticket_created, channel.id),
            None,
        )
        .await
}
