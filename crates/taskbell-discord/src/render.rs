// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message to Discord payload conversion, clamped to Discord's limits.

use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::model::Timestamp;
use taskbell_core::{Embed, Message};

pub const MAX_CONTENT_CHARS: usize = 2000;
pub const MAX_TITLE_CHARS: usize = 256;
pub const MAX_DESCRIPTION_CHARS: usize = 4096;
pub const MAX_FIELDS: usize = 25;
pub const MAX_FIELD_VALUE_CHARS: usize = 1024;

/// Cuts `text` to at most `max` characters, ending with an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new()
        .title(truncate(&embed.title, MAX_TITLE_CHARS))
        .description(truncate(&embed.description, MAX_DESCRIPTION_CHARS))
        .colour(embed.color);
    for field in embed.fields.iter().take(MAX_FIELDS) {
        builder = builder.field(
            truncate(&field.name, MAX_TITLE_CHARS),
            truncate(&field.value, MAX_FIELD_VALUE_CHARS),
            field.inline,
        );
    }
    if let Some(ts) = embed
        .timestamp
        .and_then(|t| Timestamp::from_unix_timestamp(t.timestamp()).ok())
    {
        builder = builder.timestamp(ts);
    }
    builder
}

/// Plain content always; the embed only for rich messages.
pub fn create_message(message: &Message) -> CreateMessage {
    let content = match &message.payload.subject {
        Some(subject) if message.payload.embed.is_none() => {
            format!("**{subject}**\n{}", message.payload.content)
        }
        _ => message.payload.content.clone(),
    };
    let builder = CreateMessage::new().content(truncate(&content, MAX_CONTENT_CHARS));
    match (&message.payload.embed, message.options.rich) {
        (Some(embed), true) => builder.embed(create_embed(embed)),
        _ => builder,
    }
}
