//! Bit-level wire encoding shared by the window buffers and the decoder.
//!
//! | Module  | Purpose                                                   |
//! |---------|-----------------------------------------------------------|
//! | `bits`  | Accumulator-based bit writer / reader, big-endian bytes    |
//! | `coord` | Delta coordinate / dimension codec against a cached value |
//! | `int`   | Four-width signed integer codec with saturation           |

pub mod bits;
pub mod coord;
pub mod int;

pub use bits::{BitReader, BitWriter};
pub use coord::{CoordKind, Dim, Precision};
