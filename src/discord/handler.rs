//! Serenity event handler feeding the normalizer.

use std::sync::Arc;

use serenity::async_trait;
use serenity::cache::Cache;
use serenity::gateway::ChunkGuildFilter;
use serenity::model::channel::Message;
use serenity::model::event::{GuildMemberUpdateEvent, GuildMembersChunkEvent};
use serenity::model::gateway::{Presence, Ready};
use serenity::model::guild::Member;
use serenity::model::id::{GuildId, UserId};
use serenity::model::user::OnlineStatus;
use serenity::prelude::*;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::common::error::LookupError;
use crate::discord::normalize::{self, GuildDirectory, IncomingMessage, MemberInfo, Normalizer};

fn member_info(member: &Member) -> MemberInfo {
    MemberInfo {
        user_id: member.user.id.get(),
        discriminator: member.user.discriminator.map(|d| d.get()),
        username: member.user.name.clone(),
        nick: member.nick.clone(),
        is_bot: member.user.bot,
    }
}

/// Invisible users look offline to everyone else.
fn is_online(status: OnlineStatus) -> bool {
    !matches!(status, OnlineStatus::Offline | OnlineStatus::Invisible)
}

/// Guild lookups against serenity's gateway cache.
struct CacheDirectory<'a> {
    cache: &'a Cache,
    guild_id: GuildId,
}

impl GuildDirectory for CacheDirectory<'_> {
    fn is_online(&self, user_id: u64) -> Result<bool, LookupError> {
        let guild = self
            .cache
            .guild(self.guild_id)
            .ok_or(LookupError::GuildNotCached {
                guild_id: self.guild_id.get(),
            })?;
        let presence = guild
            .presences
            .get(&UserId::new(user_id))
            .ok_or(LookupError::PresenceNotFound { user_id })?;
        Ok(is_online(presence.status))
    }

    fn member(&self, user_id: u64) -> Result<MemberInfo, LookupError> {
        let guild = self
            .cache
            .guild(self.guild_id)
            .ok_or(LookupError::GuildNotCached {
                guild_id: self.guild_id.get(),
            })?;
        guild
            .members
            .get(&UserId::new(user_id))
            .map(member_info)
            .ok_or(LookupError::MemberNotFound { user_id })
    }
}

/// Gateway callbacks for the bridged guild.
#[derive(Clone)]
pub struct BridgeHandler {
    guild_id: GuildId,
    normalizer: Arc<Normalizer>,
    /// Fired on the first `ready` only.
    ready_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl BridgeHandler {
    pub fn new(guild_id: u64, normalizer: Normalizer, ready_tx: oneshot::Sender<()>) -> Self {
        Self {
            guild_id: GuildId::new(guild_id),
            normalizer: Arc::new(normalizer),
            ready_tx: Arc::new(Mutex::new(Some(ready_tx))),
        }
    }

    async fn signal_ready(&self) {
        if let Some(tx) = self.ready_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    fn directory<'a>(&self, ctx: &'a Context) -> CacheDirectory<'a> {
        CacheDirectory {
            cache: &ctx.cache,
            guild_id: self.guild_id,
        }
    }

    fn handle_presence(&self, ctx: &Context, presence: &Presence) {
        if presence.guild_id.is_some_and(|id| id != self.guild_id) {
            return;
        }
        self.normalizer.handle_presence_update(
            &self.directory(ctx),
            presence.user.id.get(),
            is_online(presence.status),
        );
    }
}

#[async_trait]
impl EventHandler for BridgeHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        let own_user_id = ctx.cache.current_user().id;
        if msg.author.id == own_user_id {
            return;
        }

        if normalize::is_ping(&msg.content) {
            if let Err(e) = msg.channel_id.say(&ctx.http, "Pong!").await {
                debug!("Failed to answer ping: {}", e);
            }
        }

        let display_name = normalize::display_name(
            msg.member.as_ref().and_then(|m| m.nick.as_deref()),
            &msg.author.name,
        );

        let incoming = IncomingMessage {
            author_id: msg.author.id.get(),
            guild_id: msg.guild_id.map(|id| id.get()),
            channel_id: msg.channel_id.get(),
            webhook_id: msg.webhook_id.map(|id| id.get()),
            display_name,
            content: msg.content_safe(&ctx.cache),
            attachment_urls: msg.attachments.iter().map(|a| a.url.clone()).collect(),
        };
        self.normalizer.handle_message(own_user_id.get(), incoming);
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
        self.signal_ready().await;

        if !ready.guilds.iter().any(|g| g.id == self.guild_id) {
            warn!("Bot is not a member of guild {}", self.guild_id);
            return;
        }

        // replayed members arrive through guild_members_chunk
        ctx.shard
            .chunk_guild(self.guild_id, None, false, ChunkGuildFilter::None, None);
    }

    async fn guild_members_chunk(&self, ctx: Context, chunk: GuildMembersChunkEvent) {
        if chunk.guild_id != self.guild_id {
            return;
        }
        debug!(
            "Member chunk {}/{} with {} members",
            chunk.chunk_index + 1,
            chunk.chunk_count,
            chunk.members.len()
        );

        let directory = self.directory(&ctx);
        for member in chunk.members.values() {
            self.normalizer
                .handle_member_update(&directory, member_info(member));
        }
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Member>,
        new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if event.guild_id != self.guild_id {
            return;
        }

        let member = match new {
            Some(member) => member_info(&member),
            None => MemberInfo {
                user_id: event.user.id.get(),
                discriminator: event.user.discriminator.map(|d| d.get()),
                username: event.user.name.clone(),
                nick: event.nick.clone(),
                is_bot: event.user.bot,
            },
        };
        self.normalizer
            .handle_member_update(&self.directory(&ctx), member);
    }

    async fn presence_update(&self, ctx: Context, new_data: Presence) {
        self.handle_presence(&ctx, &new_data);
    }

    async fn presence_replace(&self, ctx: Context, presences: Vec<Presence>) {
        for presence in &presences {
            self.handle_presence(&ctx, presence);
        }
    }
}
