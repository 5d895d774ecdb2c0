use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::player::queue::QueueSnapshot;
use crate::player::Enqueued;
use crate::sources::Track;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Aria Music";

fn track_fields(embed: CreateEmbed, track: &Track) -> CreateEmbed {
    embed
        .field("⏱️ Duración", &track.duration, true)
        .field("👤 Solicitado por", &track.requested_by, true)
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
}

/// Crea un embed para el resultado de un enqueue: reproducción inmediata
/// o posición en la cola
pub fn create_enqueued_embed(enqueued: &Enqueued) -> CreateEmbed {
    if enqueued.position == 0 {
        return create_now_playing_embed(&enqueued.track);
    }

    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** agregada a la cola (posición {})",
            enqueued.track.title, enqueued.position
        ))
        .color(colors::INFO_BLUE);

    track_fields(embed, &enqueued.track)
}

/// Crea un embed para mostrar la canción saltada
pub fn create_skipped_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("⏭️ Canción Saltada")
        .description(format!("**{}**", track.title))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con el estado completo de la cola de la guild
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if snapshot.is_empty() {
        return embed.description("La cola está vacía. Usa `/play` para agregar música.");
    }

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            "🎵 Sonando ahora",
            format!("**{}** ({}) — {}", current.title, current.duration, current.requested_by),
            false,
        );
    }

    if !snapshot.pending.is_empty() {
        let listing = snapshot
            .pending
            .iter()
            .enumerate()
            .take(10)
            .map(|(i, t)| format!("`{}.` **{}** ({})", i + 1, t.title, t.duration))
            .collect::<Vec<_>>()
            .join("\n");

        let name = if snapshot.pending.len() > 10 {
            format!("⏳ En espera ({} en total)", snapshot.pending.len())
        } else {
            "⏳ En espera".to_string()
        };

        embed = embed.field(name, listing, false);
    }

    embed
}

/// Crea un embed de error con mensaje en español
pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.to_string())
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de despedida al detener la reproducción
pub fn create_stopped_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("⏹️ Reproducción Detenida")
        .description("Cola vaciada y sesión de voz cerrada. ¡Hasta la próxima!")
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
