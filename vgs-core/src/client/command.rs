//! Drawing commands and their bit-stream encoding.
//!
//! Only the primitives needed to exercise the stream are modelled; each
//! is an opcode followed by its operands in declaration order.

use crate::client::pen::{PenState, selector};
use crate::encoding::bits::{BitReader, BitWriter};
use crate::encoding::coord::{self, CoordKind, Precision};
use crate::encoding::int;
use crate::error::VgsError;
use crate::message::{OPCODE_BITS, Opcode};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenWindow { id: u32 },
    CloseWindow { id: u32 },
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    Circle { x: f64, y: f64, radius: f64 },
    Rect { x: f64, y: f64, width: f64, height: f64 },
    SetColor(u32),
    SetPen(u32),
    SetFont(u32),
    SetMode(u32),
    Text { x: f64, y: f64, height: f64, text: String },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::OpenWindow { .. } => Opcode::OpenWindow,
            Command::CloseWindow { .. } => Opcode::CloseWindow,
            Command::MoveTo { .. } => Opcode::MoveTo,
            Command::LineTo { .. } => Opcode::LineTo,
            Command::Circle { .. } => Opcode::Circle,
            Command::Rect { .. } => Opcode::Rect,
            Command::SetColor(_) => Opcode::SetColor,
            Command::SetPen(_) => Opcode::SetPen,
            Command::SetFont(_) => Opcode::SetFont,
            Command::SetMode(_) => Opcode::SetMode,
            Command::Text { .. } => Opcode::Text,
        }
    }

    /// Append this command to `w`, updating `pen` to match what a decoder
    /// will hold afterwards.
    pub fn encode(&self, pen: &mut PenState, precision: Precision, w: &mut BitWriter) {
        use CoordKind::{Extent, Position};

        w.put(self.opcode() as u32, OPCODE_BITS);
        match self {
            Command::OpenWindow { id } | Command::CloseWindow { id } => {
                int::encode(w, i64::from(*id));
            }
            Command::MoveTo { x, y } | Command::LineTo { x, y } => {
                coord::encode(w, precision, Position, &mut pen.x, *x);
                coord::encode(w, precision, Position, &mut pen.y, *y);
            }
            Command::Circle { x, y, radius } => {
                coord::encode(w, precision, Position, &mut pen.x, *x);
                coord::encode(w, precision, Position, &mut pen.y, *y);
                coord::encode(w, precision, Extent, &mut pen.radius, *radius);
            }
            Command::Rect {
                x,
                y,
                width,
                height,
            } => {
                coord::encode(w, precision, Position, &mut pen.x, *x);
                coord::encode(w, precision, Position, &mut pen.y, *y);
                coord::encode(w, precision, Extent, &mut pen.width, *width);
                coord::encode(w, precision, Extent, &mut pen.height, *height);
            }
            Command::SetColor(v) => {
                pen.color = *v;
                int::encode(w, i64::from(*v));
            }
            Command::SetPen(v) => {
                pen.pen = *v;
                int::encode(w, i64::from(*v));
            }
            Command::SetFont(v) => {
                pen.font = *v;
                int::encode(w, i64::from(*v));
            }
            Command::SetMode(v) => {
                pen.mode = *v;
                int::encode(w, i64::from(*v));
            }
            Command::Text { x, y, height, text } => {
                coord::encode(w, precision, Position, &mut pen.x, *x);
                coord::encode(w, precision, Position, &mut pen.y, *y);
                coord::encode(w, precision, Extent, &mut pen.height, *height);
                int::encode(w, text.len() as i64);
                w.put_bytes(text.as_bytes());
            }
        }
    }

    /// Decode the operands of `opcode`; values come back in user units,
    /// quantized exactly as the sender's cache holds them.
    pub fn decode(
        opcode: Opcode,
        pen: &mut PenState,
        precision: Precision,
        r: &mut BitReader<'_>,
    ) -> Result<Self, VgsError> {
        use CoordKind::{Extent, Position};

        let value = |kind: CoordKind, dim: &mut coord::Dim, r: &mut BitReader<'_>| {
            coord::decode(r, precision, kind, dim).map(|q| precision.to_user(q))
        };

        let cmd = match opcode {
            Opcode::OpenWindow => Command::OpenWindow {
                id: selector(int::decode(r)?)?,
            },
            Opcode::CloseWindow => Command::CloseWindow {
                id: selector(int::decode(r)?)?,
            },
            Opcode::MoveTo => Command::MoveTo {
                x: value(Position, &mut pen.x, r)?,
                y: value(Position, &mut pen.y, r)?,
            },
            Opcode::LineTo => Command::LineTo {
                x: value(Position, &mut pen.x, r)?,
                y: value(Position, &mut pen.y, r)?,
            },
            Opcode::Circle => Command::Circle {
                x: value(Position, &mut pen.x, r)?,
                y: value(Position, &mut pen.y, r)?,
                radius: value(Extent, &mut pen.radius, r)?,
            },
            Opcode::Rect => Command::Rect {
                x: value(Position, &mut pen.x, r)?,
                y: value(Position, &mut pen.y, r)?,
                width: value(Extent, &mut pen.width, r)?,
                height: value(Extent, &mut pen.height, r)?,
            },
            Opcode::SetColor => {
                pen.color = selector(int::decode(r)?)?;
                Command::SetColor(pen.color)
            }
            Opcode::SetPen => {
                pen.pen = selector(int::decode(r)?)?;
                Command::SetPen(pen.pen)
            }
            Opcode::SetFont => {
                pen.font = selector(int::decode(r)?)?;
                Command::SetFont(pen.font)
            }
            Opcode::SetMode => {
                pen.mode = selector(int::decode(r)?)?;
                Command::SetMode(pen.mode)
            }
            Opcode::Text => {
                let x = value(Position, &mut pen.x, r)?;
                let y = value(Position, &mut pen.y, r)?;
                let height = value(Extent, &mut pen.height, r)?;
                let len = usize::try_from(int::decode(r)?)
                    .map_err(|_| VgsError::field("text", "negative length"))?;
                let mut bytes = Vec::with_capacity(len);
                for _ in 0..len {
                    bytes.push(r.get(8)? as u8);
                }
                let text = String::from_utf8(bytes)
                    .map_err(|_| VgsError::field("text", "not UTF-8"))?;
                Command::Text { x, y, height, text }
            }
            Opcode::Nop | Opcode::RestorePen => {
                return Err(VgsError::ProtocolViolation("not a drawing command"));
            }
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn through_wire(cmds: &[Command]) -> Vec<Command> {
        let p = Precision::default();
        let mut pen = PenState::for_window(1);
        let mut w = BitWriter::new();
        for cmd in cmds {
            cmd.encode(&mut pen, p, &mut w);
        }
        let bytes = w.take();

        let mut decoded_pen = PenState::for_window(1);
        let mut r = BitReader::new(&bytes);
        let mut out = Vec::new();
        while r.remaining() >= OPCODE_BITS as usize {
            let op = Opcode::try_from(r.get(OPCODE_BITS).unwrap()).unwrap();
            if op == Opcode::Nop {
                continue;
            }
            out.push(Command::decode(op, &mut decoded_pen, p, &mut r).unwrap());
        }
        assert_eq!(decoded_pen, pen);
        out
    }

    #[test]
    fn polyline_and_text_survive_the_wire() {
        let cmds = vec![
            Command::SetColor(4),
            Command::MoveTo { x: 0.5, y: -0.25 },
            Command::LineTo { x: 0.75, y: -0.25 },
            Command::LineTo { x: 10.0, y: 3.0 },
            Command::Circle {
                x: 10.0,
                y: 3.0,
                radius: 0.125,
            },
            Command::Text {
                x: 1.0,
                y: 1.0,
                height: 0.5,
                text: "t = 0.25".into(),
            },
        ];
        assert_eq!(through_wire(&cmds), cmds);
    }

    #[test]
    fn unquantizable_values_come_back_quantized() {
        let p = Precision::default();
        let cmds = vec![Command::MoveTo { x: 0.1, y: 0.2 }];
        let out = through_wire(&cmds);
        let expected_x = p.to_user(p.quantize(0.1, CoordKind::Position));
        assert_eq!(out[0], Command::MoveTo { x: expected_x, y: p.to_user(p.quantize(0.2, CoordKind::Position)) });
    }
}
