use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlayerError;

/// Filtros de audio disponibles. Conjunto cerrado: cada filtro mapea a
/// un filtergraph de ffmpeg que se aplica al re-decodificar el stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFilter {
    ThreeD,
    Bassboost,
    Echo,
    Flanger,
    Gate,
    Haas,
    Karaoke,
    Nightcore,
    Reverse,
    Vaporwave,
    Mcompand,
    Phaser,
    Tremolo,
    Surround,
    Earwax,
}

impl AudioFilter {
    /// Todos los filtros reconocidos, en orden estable.
    pub const ALL: [AudioFilter; 15] = [
        AudioFilter::ThreeD,
        AudioFilter::Bassboost,
        AudioFilter::Echo,
        AudioFilter::Flanger,
        AudioFilter::Gate,
        AudioFilter::Haas,
        AudioFilter::Karaoke,
        AudioFilter::Nightcore,
        AudioFilter::Reverse,
        AudioFilter::Vaporwave,
        AudioFilter::Mcompand,
        AudioFilter::Phaser,
        AudioFilter::Tremolo,
        AudioFilter::Surround,
        AudioFilter::Earwax,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AudioFilter::ThreeD => "3d",
            AudioFilter::Bassboost => "bassboost",
            AudioFilter::Echo => "echo",
            AudioFilter::Flanger => "flanger",
            AudioFilter::Gate => "gate",
            AudioFilter::Haas => "haas",
            AudioFilter::Karaoke => "karaoke",
            AudioFilter::Nightcore => "nightcore",
            AudioFilter::Reverse => "reverse",
            AudioFilter::Vaporwave => "vaporwave",
            AudioFilter::Mcompand => "mcompand",
            AudioFilter::Phaser => "phaser",
            AudioFilter::Tremolo => "tremolo",
            AudioFilter::Surround => "surround",
            AudioFilter::Earwax => "earwax",
        }
    }

    /// Fragmento de filtergraph de ffmpeg para este filtro.
    pub fn ffmpeg_arg(&self) -> &'static str {
        match self {
            AudioFilter::ThreeD => "apulsator=hz=0.125",
            AudioFilter::Bassboost => "bass=g=10",
            AudioFilter::Echo => "aecho=0.8:0.9:1000:0.3",
            AudioFilter::Flanger => "flanger",
            AudioFilter::Gate => "agate",
            AudioFilter::Haas => "haas",
            AudioFilter::Karaoke => "stereotools=mlev=0.1",
            AudioFilter::Nightcore => "asetrate=48000*1.25,aresample=48000,bass=g=5",
            AudioFilter::Reverse => "areverse",
            AudioFilter::Vaporwave => "asetrate=48000*0.8,aresample=48000,atempo=1.1",
            AudioFilter::Mcompand => "mcompand",
            AudioFilter::Phaser => "aphaser=in_gain=0.4",
            AudioFilter::Tremolo => "tremolo",
            AudioFilter::Surround => "surround",
            AudioFilter::Earwax => "earwax",
        }
    }

    /// Combina un conjunto de filtros en un único filtergraph.
    pub fn chain(filters: &[AudioFilter]) -> String {
        filters
            .iter()
            .map(|f| f.ffmpeg_arg())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioFilter {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioFilter::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| PlayerError::InvalidInput(format!("filtro desconocido: {s}")))
    }
}
