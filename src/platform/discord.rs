//! Discord client via serenity's gateway + REST (spec.md §4.1, §4.5.1).

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId as SerenityChannelId, Context, CreateAttachment, CreateMessage, EditMessage,
    EventHandler, GatewayIntents, Message as DiscordMessage, MessageId, MessageReference,
    MessageReferenceKind, MessageUpdateEvent, Ready,
};
use serenity::Client;
use tokio::sync::mpsc::UnboundedSender;

use crate::channel_id::{ChannelId, Platform};
use crate::config::{DiscordConfig, NickStyle};
use crate::model::{CanonicalMessage, File, FileKind, ReplyRef};
use crate::queue::{InternalTask, QueueItem};
use crate::store::MessageStore;

use super::{MessagingPlatform, OutgoingMessage, SentMessage};

fn display_nick(msg: &DiscordMessage, style: NickStyle) -> String {
    match style {
        NickStyle::Nickname => msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.name.clone()),
        NickStyle::Username | NickStyle::Name => msg.author.name.clone(),
    }
}

fn file_kind_for(content_type: Option<&str>) -> FileKind {
    match content_type {
        Some(ct) if ct.starts_with("image/gif") => FileKind::Gif,
        Some(ct) if ct.starts_with("image/") => FileKind::Image,
        Some(ct) if ct.starts_with("video/") => FileKind::Video,
        Some(ct) if ct.starts_with("audio/") => FileKind::Voice,
        Some(_) => FileKind::Document,
        None => FileKind::Unsupported,
    }
}

struct Handler {
    config: DiscordConfig,
    tx: UnboundedSender<QueueItem>,
    store: Arc<MessageStore>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(bot = %ready.user.name, "discord gateway connected");
    }

    async fn message(&self, _ctx: Context, msg: DiscordMessage) {
        if msg.author.bot {
            return;
        }

        let group = ChannelId::new(Platform::Discord, msg.channel_id.get().to_string());

        if let Some(task) = crate::commands::parse(&msg.content).map(|cmd| crate::commands::to_internal_task(group.clone(), cmd)) {
            let _ = self.tx.send(QueueItem::Internal(task));
            return;
        }

        let nick = display_nick(&msg, self.config.nick_style);

        let reply_to = match msg.referenced_message.as_ref() {
            Some(referenced) => self
                .store
                .find_by_member(&group, &referenced.id.get().to_string())
                .ok()
                .flatten()
                .map(|record| ReplyRef {
                    record_id: record.id,
                    bridge_messages: record.bridge_messages.clone(),
                    text: record.text.clone(),
                    from_nick: record.from_nick.clone(),
                }),
            None => None,
        };

        let files: Vec<File> = msg
            .attachments
            .iter()
            .map(|a| {
                let mut file = File::new(file_kind_for(a.content_type.as_deref()), "");
                file.public_url = a.url.clone();
                file.metadata.filename = Some(a.filename.clone());
                file.metadata.size = Some(a.size as u64);
                file.metadata.width = a.width.map(|w| w as u32);
                file.metadata.height = a.height.map(|h| h as u32);
                file
            })
            .collect();

        let created_at: DateTime<Utc> = *msg.timestamp;

        let canonical = CanonicalMessage::from_discord(
            group,
            msg.author.id.get().to_string(),
            nick,
            msg.id.get(),
            msg.content.clone(),
            created_at,
            self.config.platform_prefix.clone(),
            None,
            reply_to,
            files,
        );

        if self.tx.send(QueueItem::Forward(canonical)).is_err() {
            tracing::warn!("event queue closed, dropping discord message");
        }
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old: Option<DiscordMessage>,
        _new: Option<DiscordMessage>,
        event: MessageUpdateEvent,
    ) {
        let Some(new_text) = event.content else { return };
        let group = ChannelId::new(Platform::Discord, event.channel_id.get().to_string());
        let _ = self.tx.send(QueueItem::Internal(InternalTask::Edit {
            group,
            native_message_id: event.id.get().to_string(),
            new_text,
        }));
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: SerenityChannelId,
        message_id: MessageId,
        _guild_id: Option<serenity::all::GuildId>,
    ) {
        let group = ChannelId::new(Platform::Discord, channel_id.get().to_string());
        let _ = self.tx.send(QueueItem::Internal(InternalTask::Delete {
            deletions: vec![(group, message_id.get().to_string())],
        }));
    }

    /// Discord may fire both `message_delete` and `message_delete_bulk` for
    /// the same message (spec.md §9 Open Question); the worker's delete
    /// path is idempotent so both paths are enqueued unconditionally.
    async fn message_delete_bulk(
        &self,
        _ctx: Context,
        channel_id: SerenityChannelId,
        message_ids: Vec<MessageId>,
        _guild_id: Option<serenity::all::GuildId>,
    ) {
        let group = ChannelId::new(Platform::Discord, channel_id.get().to_string());
        let deletions: Vec<(ChannelId, String)> = message_ids
            .into_iter()
            .map(|id| (group.clone(), id.get().to_string()))
            .collect();
        if !deletions.is_empty() {
            let _ = self.tx.send(QueueItem::Internal(InternalTask::Delete { deletions }));
        }
    }
}

pub struct DiscordPlatform {
    http: Arc<serenity::http::Http>,
}

impl DiscordPlatform {
    pub async fn connect(
        config: DiscordConfig,
        tx: UnboundedSender<QueueItem>,
        store: Arc<MessageStore>,
    ) -> Result<Self> {
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::DIRECT_MESSAGES;

        let mut client = Client::builder(&config.token, intents)
            .event_handler(Handler {
                config: config.clone(),
                tx,
                store,
            })
            .await
            .context("building discord client")?;

        let http = client.http.clone();

        tokio::spawn(async move {
            if let Err(err) = client.start().await {
                tracing::error!(error = %err, "discord gateway loop exited");
            }
        });

        Ok(Self { http })
    }
}

#[async_trait]
impl MessagingPlatform for DiscordPlatform {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, msg: &OutgoingMessage) -> Result<SentMessage> {
        let channel = SerenityChannelId::new(
            msg.group
                .native_id()
                .parse()
                .context("discord channel id is not numeric")?,
        );

        let mut builder = CreateMessage::new().content(&msg.text);
        if let Some(reply_id) = msg.reply_to_native.as_deref().and_then(|s| s.parse::<u64>().ok()) {
            builder = builder.reference_message(MessageReference::new(
                MessageReferenceKind::Default,
                MessageId::new(reply_id),
            ));
        }
        for file in &msg.files {
            if file.is_empty() {
                continue;
            }
            let mut attachment = CreateAttachment::path(&file.local_path)
                .await
                .with_context(|| format!("reading attachment {}", file.local_path))?;
            if file.metadata.is_spoiler {
                attachment.filename = format!("SPOILER_{}", attachment.filename);
            }
            builder = builder.add_file(attachment);
        }

        let sent = channel
            .send_message(&self.http, builder)
            .await
            .context("discord send_message")?;

        Ok(SentMessage {
            native_message_id: Some(sent.id.get().to_string()),
            sent_at: Utc::now(),
        })
    }

    async fn edit(&self, group: &ChannelId, native_message_id: &str, new_text: &str) -> Result<()> {
        let channel = SerenityChannelId::new(group.native_id().parse().context("discord channel id")?);
        let message_id = MessageId::new(native_message_id.parse().context("discord message id")?);
        channel
            .edit_message(&self.http, message_id, EditMessage::new().content(new_text))
            .await
            .context("discord edit_message")?;
        Ok(())
    }

    async fn delete(&self, group: &ChannelId, native_message_id: &str) -> Result<()> {
        let channel = SerenityChannelId::new(group.native_id().parse().context("discord channel id")?);
        let message_id = MessageId::new(native_message_id.parse().context("discord message id")?);
        channel
            .delete_message(&self.http, message_id)
            .await
            .context("discord delete_message")?;
        Ok(())
    }

    fn supports_edit(&self) -> bool {
        true
    }

    async fn download_media(&self, refs: &[String]) -> Vec<File> {
        let client = reqwest::Client::new();
        let mut out = Vec::new();
        for url in refs {
            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let path = format!("{}/{}", std::env::temp_dir().display(), uuid::Uuid::new_v4());
                    match resp.bytes().await {
                        Ok(bytes) => match tokio::fs::write(&path, &bytes).await {
                            Ok(()) => {
                                let mut file = File::new(FileKind::Unsupported, path);
                                file.public_url = url.clone();
                                out.push(file);
                            }
                            Err(err) => {
                                tracing::warn!(url, error = %err, "failed to persist downloaded attachment");
                                out.push(File::new(FileKind::Unsupported, ""));
                            }
                        },
                        Err(err) => {
                            tracing::warn!(url, error = %err, "failed to read attachment body");
                            out.push(File::new(FileKind::Unsupported, ""));
                        }
                    }
                }
                _ => out.push(File::new(FileKind::Unsupported, "")),
            }
        }
        out
    }

    async fn health_check(&self) -> bool {
        self.http.get_current_user().await.is_ok()
    }
}
