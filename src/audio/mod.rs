//! # Audio Module
//!
//! Transformación de audio previa al transporte de voz.
//!
//! Dos piezas:
//!
//! ### [`filters`] - Filtros declarativos
//! - Conjunto cerrado de filtros con su filtergraph de ffmpeg
//! - Se combinan en cadena en orden de activación
//!
//! ### [`pipeline`] - Pipeline de decodificación
//! - Contrato [`pipeline::AudioPipeline`]: `Song` + offset + filtros → stream
//! - Implementación por defecto sobre ffmpeg (ogg/opus 48kHz estéreo)
//! - Passthrough directo de URL cuando no hay nada que transformar

pub mod filters;
pub mod pipeline;

pub use filters::AudioFilter;
pub use pipeline::{AudioPipeline, FfmpegPipeline, MediaStream, RawStream};
