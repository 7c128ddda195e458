pub mod admin;
pub mod ads;
pub mod blackjack;
pub mod fun;
pub mod moderation;
pub mod points;
pub mod roles;
pub mod suggestions;
pub mod tickets;

use crate::community::{Reason, OTHER_REASON};
use crate::{reply, Context, Data, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;

/// How long a moderator has to pick a reason from the select menu.
const REASON_TIMEOUT: Duration = Duration::from_secs(60);
const REASON_SELECT: &str = "reason_select";

/// Every command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        admin::shutdown(),
        ads::ad(),
        ads::ads(),
        blackjack::blackjack(),
        fun::meme(),
        moderation::warn(),
        moderation::warn_user(),
        moderation::warn_message(),
        moderation::mute(),
        moderation::mute_message(),
        moderation::unmute(),
        moderation::ban(),
        moderation::ban_message(),
        points::daily(),
        points::roll(),
        points::points(),
        points::pointsview(),
        points::pointstop(),
        points::pointsadmin(),
        roles::roles(),
        suggestions::suggestion(),
        suggestions::accept(),
        suggestions::deny(),
        tickets::panel(),
        tickets::close(),
        tickets::finish(),
        tickets::alert(),
        tickets::claim(),
        tickets::add(),
        tickets::remove(),
    ]
}

/// Staff are members with the configured staff role, plus the guild owner.
pub async fn is_staff(ctx: Context<'_>) -> Result<bool, Error> {
    let owner_id = ctx.guild().map(|g| g.owner_id);
    if owner_id == Some(ctx.author().id) {
        return Ok(true);
    }

    let staff_role = ctx.data().community().roles.staff;
    if let (Some(role), Some(member)) = (staff_role, ctx.author_member().await) {
        if member.roles.contains(&serenity::RoleId::new(role)) {
            return Ok(true);
        }
    }

    reply::ephemeral(ctx, "❌ You do not have permission to use this command.").await?;
    Ok(false)
}

/// The interaction that answered a reason prompt; the final result is written through it.
pub enum Answer {
    Select(serenity::ComponentInteraction),
    Modal(serenity::ModalInteraction),
}

impl Answer {
    /// Acknowledges the answer; the prompt is replaced later by [`Answer::finish`].
    pub async fn defer(&self, ctx: &serenity::Context) -> Result<(), Error> {
        match self {
            Answer::Select(i) => i.defer(ctx).await?,
            Answer::Modal(i) => i.defer(ctx).await?,
        }
        Ok(())
    }

    /// Acknowledges the answer with a pending ephemeral reply.
    pub async fn defer_ephemeral(&self, ctx: &serenity::Context) -> Result<(), Error> {
        match self {
            Answer::Select(i) => i.defer_ephemeral(ctx).await?,
            Answer::Modal(i) => i.defer_ephemeral(ctx).await?,
        }
        Ok(())
    }

    /// Writes the outcome over the deferred response.
    pub async fn finish(
        &self,
        ctx: &serenity::Context,
        content: impl Into<String>,
        embed: Option<serenity::CreateEmbed>,
    ) -> Result<(), Error> {
        let edit = serenity::EditInteractionResponse::new()
            .content(content)
            .embeds(embed.into_iter().collect())
            .components(vec![]);
        match self {
            Answer::Select(i) => i.edit_response(ctx, edit).await?,
            Answer::Modal(i) => i.edit_response(ctx, edit).await?,
        };
        Ok(())
    }
}

pub struct PickedReason {
    pub title: String,
    pub description: String,
    pub emoji: Option<String>,
    pub answer: Answer,
}

impl PickedReason {
    /// Title and description as shown in logs and DMs.
    pub fn full_text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.description)
        }
    }
}

fn reason_menu(reasons: &[Reason], placeholder: &str) -> serenity::CreateActionRow {
    let options = reasons
        .iter()
        .take(25)
        .map(|reason| {
            let mut option = serenity::CreateSelectMenuOption::new(&reason.title, &reason.title);
            if !reason.description.is_empty() {
                option = option.description(reply::truncate(&reason.description, 100));
            }
            if let Some(emoji) = reason
                .emoji
                .as_deref()
                .and_then(|e| serenity::ReactionType::try_from(e).ok())
            {
                option = option.emoji(emoji);
            }
            option
        })
        .collect();
    serenity::CreateActionRow::SelectMenu(
        serenity::CreateSelectMenu::new(
            REASON_SELECT,
            serenity::CreateSelectMenuKind::String { options },
        )
        .placeholder(placeholder),
    )
}

/// Shows `embed` with a reason select menu and waits for the moderator's pick.
///
/// Choosing [`OTHER_REASON`] opens a modal for a free-form reason. Returns `None`
/// when the prompt times out or the modal is dismissed.
pub async fn pick_reason(
    ctx: Context<'_>,
    embed: serenity::CreateEmbed,
    reasons: &[Reason],
    placeholder: &str,
) -> Result<Option<PickedReason>, Error> {
    if reasons.is_empty() {
        reply::ephemeral(ctx, "❌ No reasons are configured for this action.").await?;
        return Ok(None);
    }

    let handle = ctx
        .send(
            poise::CreateReply::default()
                .embed(embed)
                .components(vec![reason_menu(reasons, placeholder)])
                .ephemeral(true),
        )
        .await?;
    let message = handle.message().await?;

    let Some(interaction) = message
        .await_component_interaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .custom_ids(vec![REASON_SELECT.to_string()])
        .timeout(REASON_TIMEOUT)
        .await
    else {
        handle
            .edit(
                ctx,
                poise::CreateReply::default()
                    .content("⏳ No reason selected, action cancelled.")
                    .components(vec![]),
            )
            .await?;
        return Ok(None);
    };

    let selected = match &interaction.data.kind {
        serenity::ComponentInteractionDataKind::StringSelect { values } => {
            values.first().cloned().unwrap_or_default()
        }
        _ => String::new(),
    };
    let Some(reason) = reasons.iter().find(|r| r.title == selected) else {
        interaction
            .create_response(
                ctx.serenity_context(),
                reply::ephemeral_response("❌ That reason is no longer available."),
            )
            .await?;
        return Ok(None);
    };

    if reason.title != OTHER_REASON {
        return Ok(Some(PickedReason {
            title: reason.title.clone(),
            description: reason.description.clone(),
            emoji: reason.emoji.clone(),
            answer: Answer::Select(interaction),
        }));
    }

    let modal = serenity::CreateQuickModal::new("Custom Reason")
        .timeout(Duration::from_secs(300))
        .paragraph_field("Please specify the reason");
    let Some(response) = interaction.quick_modal(ctx.serenity_context(), modal).await? else {
        return Ok(None);
    };
    let custom = response
        .inputs
        .first()
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if custom.is_empty() {
        response
            .interaction
            .create_response(
                ctx.serenity_context(),
                reply::ephemeral_response("❌ A reason is required."),
            )
            .await?;
        return Ok(None);
    }

    Ok(Some(PickedReason {
        title: custom,
        description: String::new(),
        emoji: None,
        answer: Answer::Modal(response.interaction),
    }))
}
