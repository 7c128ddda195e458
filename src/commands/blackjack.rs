use crate::community::EmbedColors;
use crate::economy::blackjack::{format_hand, Game, Outcome};
use crate::economy::PointsError;
use crate::reply;
use crate::services::points::PointsService;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{error, info};

const TURN_TIMEOUT: Duration = Duration::from_secs(30);
const PLAY_AGAIN_TIMEOUT: Duration = Duration::from_secs(300);

const HIT: &str = "bj_hit";
const STAND: &str = "bj_stand";
const INFO: &str = "bj_info";
const BACK: &str = "bj_back";
const PLAY_AGAIN: &str = "bj_play_again";

fn game_embed(game: &Game, colors: &EmbedColors, balance: Option<i64>) -> serenity::CreateEmbed {
    let (dealer_cards, dealer_value) = game.dealer_display();
    let color = match game.outcome() {
        Some(outcome) if outcome.is_win() => colors.accepted,
        Some(Outcome::Bust | Outcome::Loss) => colors.denied,
        _ => colors.main,
    };

    let mut embed = reply::embed(color)
        .title("🃏 Blackjack")
        .field(
            format!("Your Hand ({})", game.player_value()),
            format_hand(&game.player),
            false,
        )
        .field(format!("Dealer Hand ({})", dealer_value), dealer_cards, false)
        .field("Bet", game.bet.to_string(), true);

    if let Some(balance) = balance {
        embed = embed.field("Balance", balance.to_string(), true);
    }
    if let Some(outcome) = game.outcome() {
        let mut description = format!("**{}**", outcome.describe(game.is_booster));
        if !game.is_booster && outcome != Outcome::Abandoned {
            description.push_str("\n*💎 Boost the server for bigger payouts!*");
        }
        embed = embed.description(description);
    }
    embed
}

fn rules_embed(colors: &EmbedColors) -> serenity::CreateEmbed {
    reply::embed(colors.main)
        .title("🃏 How to play Blackjack")
        .description(
            "Get closer to 21 than the dealer without going over.\n\n\
             • Number cards are worth their value, J/Q/K are worth 10\n\
             • Aces are worth 1 or 11\n\
             • **Hit** draws a card, **Stand** ends your turn\n\
             • The dealer draws until reaching 17\n\n\
             **Payouts**\n\
             • Blackjack: 2.5x bet (3x for boosters)\n\
             • Win: 2x bet (2.5x for boosters)\n\
             • Push: bet returned",
        )
}

fn play_buttons() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(HIT)
            .label("Hit")
            .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new(STAND)
            .label("Stand")
            .style(serenity::ButtonStyle::Secondary),
        serenity::CreateButton::new(INFO)
            .label("Info")
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

fn back_button() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(BACK)
            .label("Back to Game")
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

fn play_again_button() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(PLAY_AGAIN)
            .label("Play Again")
            .style(serenity::ButtonStyle::Success),
    ])]
}

async fn update(
    ctx: Context<'_>,
    interaction: &serenity::ComponentInteraction,
    embed: serenity::CreateEmbed,
    components: Vec<serenity::CreateActionRow>,
) -> Result<(), Error> {
    interaction
        .create_response(
            ctx.serenity_context(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(components),
            ),
        )
        .await?;
    Ok(())
}

/// Whose points a table plays with.
struct Player {
    service: PointsService,
    user_id: u64,
    guild_id: u64,
}

impl Player {
    /// Credits the payout of a finished hand and returns the new balance.
    async fn credit(&self, game: &Game) -> Result<i64, Error> {
        let payout = game.payout();
        let balance = if payout > 0 {
            self.service.give(self.user_id, self.guild_id, payout).await?
        } else {
            self.service.standing(self.user_id, self.guild_id).await?.points
        };
        info!(
            "Blackjack for {}: {:?}, bet {}, paid {}",
            self.user_id,
            game.outcome(),
            game.bet,
            payout
        );
        Ok(balance)
    }
}

/// A dealt hand whose bet is held in escrow. It is paid out exactly once.
struct Table {
    game: Game,
    settled: bool,
}

impl Table {
    fn new(game: Game) -> Self {
        Self {
            game,
            settled: false,
        }
    }

    async fn settle(&mut self, player: &Player) -> Result<i64, Error> {
        let balance = player.credit(&self.game).await?;
        self.settled = true;
        Ok(balance)
    }

    /// Pays out an interrupted hand; an unfinished one returns the bet.
    async fn close_out(&mut self, player: &Player) -> Result<(), Error> {
        if self.settled {
            return Ok(());
        }
        self.game.abandon();
        self.settle(player).await.map(|_| ())
    }
}

/// Play a hand of blackjack
#[poise::command(slash_command, guild_only)]
pub async fn blackjack(
    ctx: Context<'_>,
    #[description = "Points to bet"]
    #[min = 1]
    bet: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let is_booster = ctx
        .author_member()
        .await
        .map(|m| reply::is_booster(&m))
        .unwrap_or(false);
    let player = Player {
        service: PointsService::new(ctx.data().db.clone(), ctx.data().community().points.clone()),
        user_id: ctx.author().id.get(),
        guild_id,
    };

    // The bet is held until the hand settles
    match player.service.take(player.user_id, guild_id, bet).await {
        Ok(_) => {}
        Err(PointsError::InsufficientPoints { balance, .. }) => {
            reply::ephemeral(
                ctx,
                format!("❌ You don't have enough points. Balance: **{}**", balance),
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let mut rng = StdRng::from_entropy();
    let mut table = Table::new(Game::deal(bet, is_booster, &mut rng));
    if let Err(e) = play(ctx, &player, &mut table, &mut rng).await {
        if let Err(refund) = table.close_out(&player).await {
            error!("Failed to return blackjack bet of {}: {}", player.user_id, refund);
        }
        return Err(e);
    }
    Ok(())
}

async fn play(
    ctx: Context<'_>,
    player: &Player,
    table: &mut Table,
    rng: &mut StdRng,
) -> Result<(), Error> {
    let colors = ctx.data().community().embeds.clone();
    let (bet, is_booster) = (table.game.bet, table.game.is_booster);

    let (embed, components) = if table.game.is_finished() {
        let balance = table.settle(player).await?;
        (game_embed(&table.game, &colors, Some(balance)), play_again_button())
    } else {
        (game_embed(&table.game, &colors, None), play_buttons())
    };
    let handle = ctx
        .send(poise::CreateReply::default().embed(embed).components(components))
        .await?;
    let mut message = handle.into_message().await?;

    loop {
        while !table.game.is_finished() {
            let Some(interaction) = message
                .await_component_interaction(ctx.serenity_context())
                .author_id(ctx.author().id)
                .timeout(TURN_TIMEOUT)
                .await
            else {
                table.close_out(player).await?;
                message
                    .edit(
                        ctx.serenity_context(),
                        serenity::EditMessage::new()
                            .embed(game_embed(&table.game, &colors, None))
                            .components(vec![]),
                    )
                    .await?;
                return Ok(());
            };

            match interaction.data.custom_id.as_str() {
                HIT => {
                    table.game.hit(rng);
                }
                STAND => {
                    table.game.stand(rng);
                }
                INFO => {
                    update(ctx, &interaction, rules_embed(&colors), back_button()).await?;
                    continue;
                }
                _ => {
                    update(
                        ctx,
                        &interaction,
                        game_embed(&table.game, &colors, None),
                        play_buttons(),
                    )
                    .await?;
                    continue;
                }
            }

            if table.game.is_finished() {
                let balance = table.settle(player).await?;
                update(
                    ctx,
                    &interaction,
                    game_embed(&table.game, &colors, Some(balance)),
                    play_again_button(),
                )
                .await?;
            } else {
                update(
                    ctx,
                    &interaction,
                    game_embed(&table.game, &colors, None),
                    play_buttons(),
                )
                .await?;
            }
        }

        let Some(interaction) = message
            .await_component_interaction(ctx.serenity_context())
            .author_id(ctx.author().id)
            .custom_ids(vec![PLAY_AGAIN.to_string()])
            .timeout(PLAY_AGAIN_TIMEOUT)
            .await
        else {
            message
                .edit(ctx.serenity_context(), serenity::EditMessage::new().components(vec![]))
                .await?;
            return Ok(());
        };

        if let Err(e) = player.service.take(player.user_id, player.guild_id, bet).await {
            let text = match e {
                PointsError::InsufficientPoints { balance, .. } => format!(
                    "❌ You don't have enough points to play again. Balance: **{}**",
                    balance
                ),
                other => return Err(other.into()),
            };
            interaction
                .create_response(ctx.serenity_context(), reply::ephemeral_response(text))
                .await?;
            message
                .edit(ctx.serenity_context(), serenity::EditMessage::new().components(vec![]))
                .await?;
            return Ok(());
        }

        *table = Table::new(Game::deal(bet, is_booster, rng));
        if table.game.is_finished() {
            let balance = table.settle(player).await?;
            update(
                ctx,
                &interaction,
                game_embed(&table.game, &colors, Some(balance)),
                play_again_button(),
            )
            .await?;
        } else {
            update(
                ctx,
                &interaction,
                game_embed(&table.game, &colors, None),
                play_buttons(),
            )
            .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::PointsSettings;
    use crate::db::Database;

    fn player_with(points: i64) -> Player {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        if points > 0 {
            db.add_points(1, 2, points).unwrap();
        }
        Player {
            service: PointsService::new(db, PointsSettings::default()),
            user_id: 1,
            guild_id: 2,
        }
    }

    /// Deals until the hand is still in play (no natural on the deal).
    fn open_game(bet: i64) -> Game {
        (0..)
            .map(|seed| Game::deal(bet, false, &mut StdRng::seed_from_u64(seed)))
            .find(|game| !game.is_finished())
            .unwrap()
    }

    async fn balance(player: &Player) -> i64 {
        player.service.standing(1, 2).await.unwrap().points
    }

    #[tokio::test]
    async fn test_interrupted_hand_returns_bet() {
        let player = player_with(100);
        player.service.take(1, 2, 30).await.unwrap();

        let mut table = Table::new(open_game(30));
        table.close_out(&player).await.unwrap();

        assert_eq!(table.game.outcome(), Some(Outcome::Abandoned));
        assert_eq!(balance(&player).await, 100);
    }

    #[tokio::test]
    async fn test_settled_hand_is_not_paid_twice() {
        let player = player_with(100);
        player.service.take(1, 2, 30).await.unwrap();

        let mut table = Table::new(open_game(30));
        table.game.stand(&mut StdRng::seed_from_u64(7));
        let payout = table.game.payout();
        let settled = table.settle(&player).await.unwrap();
        assert_eq!(settled, 70 + payout);

        table.close_out(&player).await.unwrap();
        assert_eq!(balance(&player).await, 70 + payout);
    }

    #[tokio::test]
    async fn test_finished_but_unpaid_hand_keeps_its_outcome() {
        let player = player_with(100);
        player.service.take(1, 2, 30).await.unwrap();

        let mut table = Table::new(open_game(30));
        let outcome = table.game.stand(&mut StdRng::seed_from_u64(3));
        table.close_out(&player).await.unwrap();

        assert_eq!(table.game.outcome(), Some(outcome));
        assert_eq!(balance(&player).await, 70 + table.game.payout());
    }
}
