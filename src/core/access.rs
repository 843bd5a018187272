use std::sync::Arc;

use serde::Serialize;

use crate::common::types::{GuildId, UserId};
use crate::gateway::DiscordGateway;

/// Outcome of a co-location check. Computed per request, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub in_voice_channel: bool,
    pub same_channel_as_bot: bool,
    /// User-facing explanation when control is denied.
    pub message: Option<String>,
}

impl AccessDecision {
    pub fn allowed(&self) -> bool {
        self.in_voice_channel && self.same_channel_as_bot
    }

    fn granted() -> Self {
        Self {
            in_voice_channel: true,
            same_channel_as_bot: true,
            message: None,
        }
    }

    fn denied(in_voice_channel: bool, message: impl Into<String>) -> Self {
        Self {
            in_voice_channel,
            same_channel_as_bot: false,
            message: Some(message.into()),
        }
    }

    pub fn denial_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "You are not allowed to control the radio right now.".to_string())
    }
}

/// Decides whether a user may issue control actions against a guild's
/// session: the user must share the bot's current voice channel. Fails
/// closed on anything unresolvable; never errors to the caller.
pub struct AccessGuard {
    discord: Arc<dyn DiscordGateway>,
}

impl AccessGuard {
    pub fn new(discord: Arc<dyn DiscordGateway>) -> Self {
        Self { discord }
    }

    pub async fn can_control(&self, guild_id: &GuildId, user_id: &UserId) -> AccessDecision {
        if !self.discord.is_ready() {
            return AccessDecision::denied(false, "The radio is offline right now, try again soon.");
        }

        let user_channel = self.discord.member_voice_channel(guild_id, user_id).await;
        let bot_channel = self.discord.bot_voice_channel(guild_id).await;

        let Some(user_channel) = user_channel else {
            return AccessDecision::denied(
                false,
                "You must join a voice channel to control the radio.",
            );
        };

        let Some(bot_channel) = bot_channel else {
            return AccessDecision::denied(
                true,
                "The radio is not connected to a voice channel. Run setup first.",
            );
        };

        if user_channel != bot_channel {
            let name = self
                .discord
                .channel_name(guild_id, &bot_channel)
                .await
                .unwrap_or_else(|| "the radio voice channel".to_string());
            return AccessDecision::denied(
                true,
                format!("You must be in {} to control the radio.", name),
            );
        }

        AccessDecision::granted()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
