use serenity::model::id::ChannelId;
use std::collections::VecDeque;

use crate::sources::Track;

/// Estado de cola de una guild. Una instancia vive desde el primer enqueue
/// hasta el teardown; solo el gestor de reproducción la muta, siempre bajo
/// el candado por-guild.
#[derive(Debug, Default)]
pub struct RoomQueue {
    current: Option<Track>,
    pending: VecDeque<Track>,
    /// Número de secuencia del play en curso; las señales de fin/error
    /// llegan etiquetadas con él para descartar las obsoletas.
    current_seq: u64,
    next_seq: u64,
}

impl RoomQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encola al final, FIFO estricto.
    pub fn push_pending(&mut self, track: Track) {
        self.pending.push_back(track);
    }

    pub fn pop_pending(&mut self) -> Option<Track> {
        self.pending.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn set_current(&mut self, track: Track, seq: u64) {
        self.current = Some(track);
        self.current_seq = seq;
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Extrae el track en curso invalidando sus señales pendientes: las
    /// secuencias empiezan en 1, así que 0 nunca vuelve a coincidir.
    pub fn take_current(&mut self) -> Option<Track> {
        self.current_seq = 0;
        self.current.take()
    }

    /// Reencola al frente (reinicio tras una mudanza de canal).
    pub fn requeue_front(&mut self, track: Track) {
        self.pending.push_front(track);
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Reserva el siguiente número de secuencia para un intento de play.
    pub fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// ¿Corresponde esta señal al play actualmente en curso?
    pub fn matches_current(&self, seq: u64) -> bool {
        self.current.is_some() && self.current_seq == seq
    }

    pub fn pending_tracks(&self) -> Vec<Track> {
        self.pending.iter().cloned().collect()
    }
}

/// Vista de solo lectura de la cola de una guild, para mostrar al usuario.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub pending: Vec<Track>,
    pub bound_channel: Option<ChannelId>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}
