//! `ircnames` / `ircwhois` / `ircwhowas` command tasks (spec.md §4.5
//! "Command tasks", §6.4). These are the one case where the Worker talks
//! back to a platform it didn't receive the triggering event from: a
//! Discord or Telegram user asks a question about an IRC channel, so the
//! reply has to travel through the bridge topology the other way.

use std::collections::HashMap;
use std::sync::Arc;

use crate::channel_id::{ChannelId, Platform};
use crate::platform::irc::IrcPlatform;
use crate::platform::{MessagingPlatform, OutgoingMessage};
use crate::queue::InternalTask;
use crate::topology::Topology;

/// A command recognized in a plain-text platform message (spec.md §6.4).
/// Slash-command handling on Discord maps to the same variants; this parser
/// covers the "platform messages" half of "Invoked from Discord (slash) or
/// platform messages".
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Names(Option<String>),
    Whois(String),
    Whowas(String),
}

pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("ircnames") {
        let target = rest.trim();
        return Some(Command::Names(if target.is_empty() { None } else { Some(target.to_string()) }));
    }
    if let Some(rest) = text.strip_prefix("ircwhowas ") {
        let nick = rest.trim();
        return (!nick.is_empty()).then(|| Command::Whowas(nick.to_string()));
    }
    if let Some(rest) = text.strip_prefix("ircwhois ") {
        let nick = rest.trim();
        return (!nick.is_empty()).then(|| Command::Whois(nick.to_string()));
    }
    None
}

/// Turns a parsed `Command` into the queue item a listener should enqueue
/// in place of a normal forward.
pub fn to_internal_task(requester: ChannelId, command: Command) -> InternalTask {
    match command {
        Command::Names(target) => InternalTask::IrcNames { requester, target },
        Command::Whois(nick) => InternalTask::IrcWhois { requester, nick },
        Command::Whowas(nick) => InternalTask::IrcWhowas { requester, nick },
    }
}

/// Only channels bridged to at least one IRC channel may run these
/// commands (spec.md §6.4); this is also how a bare `ircnames` with no
/// explicit target picks a channel to query.
fn linked_irc_channel(topology: &Topology, requester: &ChannelId) -> Option<ChannelId> {
    topology
        .peers(requester)
        .iter()
        .find(|peer| peer.platform() == Platform::Irc)
        .cloned()
}

async fn reply(platforms: &HashMap<Platform, Arc<dyn MessagingPlatform>>, requester: &ChannelId, text: String) {
    let Some(platform) = platforms.get(&requester.platform()) else {
        tracing::warn!(requester = %requester, "no platform registered to answer irc command");
        return;
    };
    let outgoing = OutgoingMessage {
        group: requester.clone(),
        text,
        files: Vec::new(),
        reply_to_native: None,
    };
    if let Err(err) = platform.send(&outgoing).await {
        tracing::warn!(requester = %requester, error = %err, "failed to deliver irc command reply");
    }
}

pub async fn dispatch(
    irc: Option<&IrcPlatform>,
    platforms: &HashMap<Platform, Arc<dyn MessagingPlatform>>,
    topology: &Topology,
    task: InternalTask,
) {
    match task {
        InternalTask::IrcWhois { requester, nick } => {
            lookup(irc, platforms, topology, &requester, &nick, true).await;
        }
        InternalTask::IrcWhowas { requester, nick } => {
            lookup(irc, platforms, topology, &requester, &nick, false).await;
        }
        InternalTask::IrcNames { requester, target } => {
            names(irc, platforms, topology, &requester, target.as_deref()).await;
        }
        InternalTask::Edit { .. } | InternalTask::Delete { .. } => {
            // Not routed here; the Worker dispatches these itself.
        }
    }
}

async fn lookup(
    irc: Option<&IrcPlatform>,
    platforms: &HashMap<Platform, Arc<dyn MessagingPlatform>>,
    topology: &Topology,
    requester: &ChannelId,
    nick: &str,
    is_whois: bool,
) {
    let command = if is_whois { "ircwhois" } else { "ircwhowas" };
    let Some(_irc_channel) = linked_irc_channel(topology, requester) else {
        reply(platforms, requester, format!("{command}: {requester} is not bridged to an IRC channel")).await;
        return;
    };
    let Some(irc) = irc else {
        reply(platforms, requester, format!("{command}: IRC is not connected")).await;
        return;
    };

    let result = if is_whois { irc.whois(nick).await } else { irc.whowas(nick).await };
    let text = match result {
        Some(info) => info,
        None => format!("{nick}: no such nick"),
    };
    reply(platforms, requester, text).await;
}

async fn names(
    irc: Option<&IrcPlatform>,
    platforms: &HashMap<Platform, Arc<dyn MessagingPlatform>>,
    topology: &Topology,
    requester: &ChannelId,
    target: Option<&str>,
) {
    let Some(irc_channel) = linked_irc_channel(topology, requester) else {
        reply(platforms, requester, "ircnames: not bridged to an IRC channel".to_string()).await;
        return;
    };
    let Some(irc) = irc else {
        reply(platforms, requester, "ircnames: IRC is not connected".to_string()).await;
        return;
    };

    let channel = target.unwrap_or_else(|| irc_channel.native_id());
    let names = irc.names(channel).await;
    let text = if names.is_empty() {
        format!("{channel}: no names (or channel does not exist)")
    } else {
        format!("{channel}: {}", names.join(", "))
    };
    reply(platforms, requester, text).await;
}
